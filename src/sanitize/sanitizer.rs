use super::patterns;
use super::rules::{DEFAULT_SENSITIVE_FIELDS, FieldRule};
use serde_json::{Map, Value};

/// Replacement marker for wholly redacted fields.
pub const REDACTED: &str = "[REDACTED]";

/// Replacement marker for nodes beyond the traversal depth bound.
pub const MAX_DEPTH_MARKER: &str = "[MAX_DEPTH]";

/// Default maximum traversal depth. A defensive bound, not a correctness
/// requirement for normal payloads.
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// Configurable PII sanitizer over JSON-like values.
///
/// Given an arbitrary `serde_json::Value`, produces a structurally identical
/// deep copy in which values matching sensitive field rules are replaced with
/// [`REDACTED`] and string values have recognizable sensitive patterns
/// (emails, card numbers, JWTs) masked in place. The input is never mutated
/// and every container in the output is freshly allocated.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    rules: Vec<FieldRule>,
    max_depth: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::with_default_fields()
    }
}

impl Sanitizer {
    /// Build from an explicit rule set, without the built-in field list.
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self {
            rules,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// The built-in sensitive-field list only.
    pub fn with_default_fields() -> Self {
        Self::new(default_rules())
    }

    /// Built-in list plus caller-supplied additional field names.
    pub fn with_additional_fields<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = default_rules();
        rules.extend(extra.into_iter().map(|s| FieldRule::name(s.as_ref())));
        Self::new(rules)
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sanitize a value, returning a redacted deep copy.
    pub fn sanitize(&self, value: &Value) -> Value {
        let mut path = Vec::new();
        self.walk(value, &mut path, 0)
    }

    /// Convenience for metadata/context maps.
    pub fn sanitize_map(&self, map: &Map<String, Value>) -> Map<String, Value> {
        match self.sanitize(&Value::Object(map.clone())) {
            Value::Object(clean) => clean,
            // walk() always maps objects to objects below the depth bound
            _ => Map::new(),
        }
    }

    fn walk(&self, value: &Value, path: &mut Vec<String>, depth: usize) -> Value {
        if depth > self.max_depth {
            return Value::String(MAX_DEPTH_MARKER.to_string());
        }

        match value {
            Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
            Value::String(s) => match patterns::scrub(s) {
                Some(masked) => Value::String(masked),
                None => value.clone(),
            },
            // Array indices do not extend the rule path.
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.walk(item, path, depth + 1))
                    .collect(),
            ),
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    if self.is_sensitive(path, key) {
                        out.insert(key.clone(), Value::String(REDACTED.to_string()));
                    } else {
                        path.push(key.clone());
                        let clean = self.walk(child, path, depth + 1);
                        path.pop();
                        out.insert(key.clone(), clean);
                    }
                }
                Value::Object(out)
            }
        }
    }

    fn is_sensitive(&self, path: &[String], key: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(path, key))
    }
}

fn default_rules() -> Vec<FieldRule> {
    DEFAULT_SENSITIVE_FIELDS
        .iter()
        .map(|name| FieldRule::name(*name))
        .collect()
}

/// Sanitize with the built-in sensitive-field list.
pub fn sanitize(value: &Value) -> Value {
    Sanitizer::with_default_fields().sanitize(value)
}

/// Sanitize with the built-in list plus additional field names.
pub fn sanitize_with(value: &Value, additional_fields: &[&str]) -> Value {
    Sanitizer::with_additional_fields(additional_fields).sanitize(value)
}

/// Build a reusable sanitizing closure combining defaults with custom fields.
pub fn create_sanitizer(
    additional_fields: Vec<String>,
) -> impl Fn(&Value) -> Value + Send + Sync {
    let sanitizer = Sanitizer::with_additional_fields(additional_fields);
    move |value| sanitizer.sanitize(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_default_sensitive_fields() {
        let clean = sanitize(&json!({"password": "secret123", "username": "jane"}));
        assert_eq!(clean, json!({"password": REDACTED, "username": "jane"}));
    }

    #[test]
    fn redacted_fields_are_not_recursed_into() {
        let clean = sanitize(&json!({"credentials": {"inner": "x"}, "auth": {"a": 1}}));
        assert_eq!(clean["credentials"], json!(REDACTED));
        assert_eq!(clean["auth"], json!(REDACTED));
    }

    #[test]
    fn masks_email_values_in_place() {
        let clean = sanitize(&json!({"email": "john.doe@example.com"}));
        assert_eq!(clean, json!({"email": "jo***@example.com"}));
    }

    #[test]
    fn masks_patterns_inside_plain_strings() {
        let clean = sanitize(&json!("Card: 1234-5678-9012-3456"));
        assert_eq!(clean, json!("Card: ****3456"));
    }

    #[test]
    fn safe_data_is_structurally_equal() {
        let input = json!({
            "a": 1,
            "b": [true, null, {"c": "plain"}],
            "d": {"e": 2.5}
        });
        assert_eq!(sanitize(&input), input);
    }

    #[test]
    fn path_rule_redacts_only_the_nested_occurrence() {
        let sanitizer = Sanitizer::new(vec![FieldRule::path("user.credentials.myValue")]);
        let clean = sanitizer.sanitize(&json!({
            "user": {"credentials": {"myValue": "x", "other": "y"}},
            "myValue": "z"
        }));
        assert_eq!(
            clean,
            json!({
                "user": {"credentials": {"myValue": REDACTED, "other": "y"}},
                "myValue": "z"
            })
        );
    }

    #[test]
    fn arrays_do_not_extend_the_path() {
        let sanitizer = Sanitizer::new(vec![FieldRule::path("users.name")]);
        let clean = sanitizer.sanitize(&json!({"users": [{"name": "a"}, {"name": "b"}]}));
        assert_eq!(
            clean,
            json!({"users": [{"name": REDACTED}, {"name": REDACTED}]})
        );
    }

    #[test]
    fn additional_fields_extend_the_defaults() {
        let clean = sanitize_with(&json!({"favorite_color": "red"}), &["favorite_color"]);
        assert_eq!(clean, json!({"favorite_color": REDACTED}));
    }

    #[test]
    fn create_sanitizer_returns_reusable_closure() {
        let scrub = create_sanitizer(vec!["internal_id".into()]);
        assert_eq!(
            scrub(&json!({"internal_id": 7})),
            json!({"internal_id": REDACTED})
        );
        assert_eq!(
            scrub(&json!({"password": "x"})),
            json!({"password": REDACTED})
        );
    }

    #[test]
    fn deep_structures_are_truncated_not_overflowed() {
        let mut value = json!("leaf");
        for _ in 0..100 {
            value = json!({ "nested": value });
        }
        let clean = Sanitizer::with_default_fields().max_depth(10).sanitize(&value);

        // Nodes at depth 11 are replaced with the truncation marker.
        let mut cursor = &clean;
        for _ in 0..11 {
            cursor = &cursor["nested"];
        }
        assert_eq!(cursor, &json!(MAX_DEPTH_MARKER));
    }
}
