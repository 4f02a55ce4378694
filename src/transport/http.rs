use super::{BatchTransport, Sender, TransportError, TransportOptions};
use crate::domain::LogEntry;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use url::Url;

/// Typed error hierarchy for HTTP delivery, used to decide retryability.
///
/// Every failure raised by the underlying request mechanism is wrapped into
/// this type, so callers only ever observe one error shape. `status_code()`
/// follows the transport's wire taxonomy: `0` for network errors, `408` for
/// a locally synthesized timeout, otherwise the response status.
#[derive(Error, Debug)]
pub enum HttpTransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Client error: HTTP {status}")]
    Client { status: u16 },

    #[error("Server error: HTTP {status}")]
    Server { status: u16 },
}

impl HttpTransportError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Network(_) => 0,
            Self::Timeout(_) => 408,
            Self::Client { status } | Self::Server { status } => *status,
        }
    }

    /// Network errors, timeouts and 5xx responses are retryable; 4xx are not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Client { .. })
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Client { .. })
    }

    fn from_status(status: u16) -> Self {
        if (400..500).contains(&status) {
            Self::Client { status }
        } else {
            Self::Server { status }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Post,
    Put,
}

/// Caller-supplied payload shaping hook, e.g. to wrap `{logs: entries, ...}`.
pub type TransformFn = Box<dyn Fn(&[LogEntry]) -> serde_json::Value + Send + Sync>;

#[derive(Debug, Clone)]
pub struct HttpSenderConfig {
    pub url: String,
    pub method: HttpMethod,
    /// Merged over the default `Content-Type: application/json`.
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSenderConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: HttpMethod::Post,
            headers: Vec::new(),
            timeout: Duration::from_secs(30),
            user_agent: format!("vestig/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpSenderConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Sends each batch as one HTTP request with a JSON payload.
pub struct HttpSender {
    client: reqwest::Client,
    config: HttpSenderConfig,
    url: Url,
    headers: HeaderMap,
    transform: Option<TransformFn>,
}

impl HttpSender {
    pub fn new(config: HttpSenderConfig) -> Result<Self, TransportError> {
        let url: Url = config
            .url
            .parse()
            .map_err(|e| TransportError::InvalidConfig(format!("Invalid endpoint URL: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                TransportError::InvalidConfig(format!("Invalid header name {name:?}: {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                TransportError::InvalidConfig(format!("Invalid header value: {e}"))
            })?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                TransportError::InvalidConfig(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            config,
            url,
            headers,
            transform: None,
        })
    }

    pub fn with_transform(
        mut self,
        transform: impl Fn(&[LogEntry]) -> serde_json::Value + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Box::new(transform));
        self
    }

    fn payload(&self, entries: &[LogEntry]) -> Result<Vec<u8>, TransportError> {
        let value = match &self.transform {
            Some(transform) => transform(entries),
            None => serde_json::to_value(entries)?,
        };
        Ok(serde_json::to_vec(&value)?)
    }

    async fn deliver(&self, entries: &[LogEntry]) -> Result<(), TransportError> {
        let body = self.payload(entries)?;

        let builder = match self.config.method {
            HttpMethod::Post => self.client.post(self.url.clone()),
            HttpMethod::Put => self.client.put(self.url.clone()),
        };
        let request = builder.headers(self.headers.clone()).body(body);

        let response = timeout(self.config.timeout, request.send())
            .await
            .map_err(|_| HttpTransportError::Timeout(self.config.timeout))?
            .map_err(|e| {
                if e.is_timeout() {
                    HttpTransportError::Timeout(self.config.timeout)
                } else {
                    HttpTransportError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(HttpTransportError::from_status(status.as_u16()).into())
        }
    }
}

impl Sender for HttpSender {
    async fn send(&mut self, entries: &[LogEntry]) -> Result<(), TransportError> {
        self.deliver(entries).await
    }
}

/// HTTP transport: batching, retry and drop policy from [`BatchTransport`],
/// delivery via [`HttpSender`].
pub type HttpTransport = BatchTransport<HttpSender>;

impl HttpTransport {
    pub fn create(
        config: HttpSenderConfig,
        options: TransportOptions,
    ) -> Result<Self, TransportError> {
        Ok(BatchTransport::new(HttpSender::new(config)?, options))
    }
}
