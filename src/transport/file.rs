use super::{BatchTransport, Sender, TransportError, TransportOptions};
use crate::domain::LogEntry;
use chrono::{DateTime, Datelike, Local};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use std::path::PathBuf;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const DEFAULT_MAX_FILES: usize = 5;

/// Calendar period after which the live file is rotated. Weekly periods use
/// ISO week numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotateInterval {
    #[default]
    None,
    Hourly,
    Daily,
    Weekly,
}

impl RotateInterval {
    fn period_key(&self, now: DateTime<Local>) -> Option<String> {
        match self {
            Self::None => None,
            Self::Hourly => Some(now.format("%Y-%m-%d-%H").to_string()),
            Self::Daily => Some(now.format("%Y-%m-%d").to_string()),
            Self::Weekly => {
                let week = now.iso_week();
                Some(format!("{}-W{:02}", week.year(), week.week()))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileSenderConfig {
    pub path: PathBuf,
    /// Rotate before a write would push the live file past this many bytes.
    pub max_size: u64,
    /// Rotated generations kept on disk; older ones are deleted.
    pub max_files: usize,
    /// Gzip generation 1 during rotation.
    pub compress: bool,
    pub rotate_interval: RotateInterval,
}

impl FileSenderConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_size: DEFAULT_MAX_SIZE,
            max_files: DEFAULT_MAX_FILES,
            compress: false,
            rotate_interval: RotateInterval::None,
        }
    }
}

/// Appends newline-delimited JSON to a file, rotating on size and calendar
/// period. Rotated files are named `<path>.<N>` (oldest = highest N), or
/// `<path>.<period>.<N>` under time-based rotation, with `.gz` when
/// compressed.
pub struct FileSender {
    config: FileSenderConfig,
    file: Option<File>,
    bytes_written: u64,
    open_period: Option<String>,
}

impl FileSender {
    pub fn new(config: FileSenderConfig) -> Result<Self, TransportError> {
        if config.path.as_os_str().is_empty() {
            return Err(TransportError::InvalidConfig(
                "File transport requires a path".to_string(),
            ));
        }
        Ok(Self {
            config,
            file: None,
            bytes_written: 0,
            open_period: None,
        })
    }

    async fn open_live_file(&mut self) -> Result<(), TransportError> {
        if let Some(parent) = self.config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            // Recursive and idempotent.
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.path)
            .await?;
        self.bytes_written = file.metadata().await?.len();
        self.open_period = self.config.rotate_interval.period_key(Local::now());
        self.file = Some(file);
        Ok(())
    }

    fn encode(entries: &[LogEntry]) -> Result<Vec<u8>, TransportError> {
        let mut buf = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }
        Ok(buf)
    }

    fn needs_rotation(&self, pending: u64) -> bool {
        let period_changed = self.config.rotate_interval != RotateInterval::None
            && self.open_period != self.config.rotate_interval.period_key(Local::now());
        let size_exceeded =
            self.bytes_written > 0 && self.bytes_written + pending > self.config.max_size;
        period_changed || size_exceeded
    }

    fn rotated_path(&self, generation: usize, suffix: Option<&str>, gz: bool) -> PathBuf {
        let base = self.config.path.display();
        let ext = if gz { ".gz" } else { "" };
        match suffix {
            Some(period) => PathBuf::from(format!("{base}.{period}.{generation}{ext}")),
            None => PathBuf::from(format!("{base}.{generation}{ext}")),
        }
    }

    async fn rotate(&mut self) -> Result<(), TransportError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }

        // Rotated files carry the period of the data they contain.
        let suffix = match self.config.rotate_interval {
            RotateInterval::None => None,
            _ => self.open_period.clone(),
        };
        let suffix = suffix.as_deref();

        // Drop the generation that falls out of retention, then shift the
        // rest up by one.
        for gz in [false, true] {
            let expired = self.rotated_path(self.config.max_files, suffix, gz);
            if fs::try_exists(&expired).await? {
                fs::remove_file(&expired).await?;
            }
        }
        for generation in (1..self.config.max_files).rev() {
            for gz in [false, true] {
                let from = self.rotated_path(generation, suffix, gz);
                if fs::try_exists(&from).await? {
                    fs::rename(&from, self.rotated_path(generation + 1, suffix, gz)).await?;
                }
            }
        }

        // Live file becomes generation 1. Compress before deleting the
        // original so a crash mid-rotation cannot lose data.
        if self.config.max_files > 0 {
            if self.config.compress {
                let target = self.rotated_path(1, suffix, true);
                gzip_file(&self.config.path, &target).await?;
                fs::remove_file(&self.config.path).await?;
            } else {
                fs::rename(&self.config.path, self.rotated_path(1, suffix, false)).await?;
            }
        } else {
            fs::remove_file(&self.config.path).await?;
        }

        self.prune_rotated().await?;

        debug!(path = %self.config.path.display(), "rotated log file");
        self.open_live_file().await
    }

    /// Delete rotated siblings beyond `max_files`, oldest first. Under
    /// time-based rotation this also retires files from earlier periods.
    async fn prune_rotated(&self) -> Result<(), TransportError> {
        let Some(parent) = self.config.path.parent() else {
            return Ok(());
        };
        let parent = if parent.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            parent.to_path_buf()
        };
        let Some(live_name) = self.config.path.file_name().map(|n| n.to_string_lossy().to_string())
        else {
            return Ok(());
        };
        let prefix = format!("{live_name}.");

        let mut rotated: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
        let mut dir = fs::read_dir(&parent).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&prefix) {
                let modified = entry
                    .metadata()
                    .await?
                    .modified()
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                rotated.push((entry.path(), modified));
            }
        }

        if rotated.len() <= self.config.max_files {
            return Ok(());
        }
        rotated.sort_by_key(|(_, modified)| *modified);
        let excess = rotated.len() - self.config.max_files;
        for (path, _) in rotated.into_iter().take(excess) {
            warn!(path = %path.display(), "deleting rotated log beyond retention");
            fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

impl Sender for FileSender {
    async fn init(&mut self) -> Result<Vec<LogEntry>, TransportError> {
        self.open_live_file().await?;
        Ok(Vec::new())
    }

    async fn send(&mut self, entries: &[LogEntry]) -> Result<(), TransportError> {
        let buf = Self::encode(entries)?;

        if self.file.is_none() {
            self.open_live_file().await?;
        }
        if self.needs_rotation(buf.len() as u64) {
            self.rotate().await?;
        }

        let Some(file) = self.file.as_mut() else {
            return Err(TransportError::Destroyed);
        };
        file.write_all(&buf).await?;
        file.flush().await?;
        self.bytes_written += buf.len() as u64;
        Ok(())
    }

    /// Flushes and syncs before closing the handle, so no buffered line is
    /// lost on graceful shutdown.
    async fn shutdown(&mut self) -> Result<(), TransportError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}

async fn gzip_file(source: &std::path::Path, target: &std::path::Path) -> Result<(), TransportError> {
    let data = fs::read(source).await?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(&data)?;
    let compressed = encoder.finish()?;

    let mut out = File::create(target).await?;
    out.write_all(&compressed).await?;
    out.sync_all().await?;
    Ok(())
}

/// File transport: batching from [`BatchTransport`], NDJSON append with
/// rotation via [`FileSender`]. Server-side only.
pub type FileTransport = BatchTransport<FileSender>;

impl FileTransport {
    pub fn create(
        config: FileSenderConfig,
        options: TransportOptions,
    ) -> Result<Self, TransportError> {
        Ok(BatchTransport::new(FileSender::new(config)?, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_keys_use_iso_weeks() {
        use chrono::TimeZone;
        let thursday = Local.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(
            RotateInterval::Weekly.period_key(thursday).unwrap(),
            "2026-W01"
        );
        assert_eq!(
            RotateInterval::Daily.period_key(thursday).unwrap(),
            "2026-01-01"
        );
        assert_eq!(RotateInterval::None.period_key(thursday), None);
    }

    #[test]
    fn rotated_paths_carry_period_and_compression_suffixes() {
        let sender = FileSender::new(FileSenderConfig::new("/var/log/app.log")).unwrap();
        assert_eq!(
            sender.rotated_path(1, None, false),
            PathBuf::from("/var/log/app.log.1")
        );
        assert_eq!(
            sender.rotated_path(2, Some("2026-01-01"), true),
            PathBuf::from("/var/log/app.log.2026-01-01.2.gz")
        );
    }

    #[test]
    fn empty_path_is_rejected() {
        let result = FileSender::new(FileSenderConfig::new(""));
        assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
    }

    #[test]
    fn encodes_one_json_object_per_line() {
        use crate::domain::{LogLevel, Runtime};
        let entries = vec![
            LogEntry::new(LogLevel::Info, "one", Runtime::Server),
            LogEntry::new(LogLevel::Warn, "two", Runtime::Server),
        ];
        let buf = FileSender::encode(&entries).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.trim_end().split('\n').collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("message").is_some());
        }
    }
}
