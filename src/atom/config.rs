use crate::foundation::core::{Filter, Wrap};
use crate::foundation::error::{GraphError, GraphResult};

/// Static configuration of one atom: a JSON object read during `initialize`.
///
/// Keys may be flat (`"shader.vtx.name"`) or nested (`{"shader": {"vtx": {"name": ..}}}`);
/// the flat spelling wins when both are present.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct AtomConfig {
    values: serde_json::Map<String, serde_json::Value>,
}

impl AtomConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: serde_json::Value) -> GraphResult<Self> {
        match value {
            serde_json::Value::Object(values) => Ok(Self { values }),
            serde_json::Value::Null => Ok(Self::default()),
            other => Err(GraphError::config(format!(
                "atom config must be an object, got {other}"
            ))),
        }
    }

    /// Builder-style insert, mostly for tests and programmatic assembly.
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        if let Some(v) = self.values.get(key) {
            return Some(v);
        }
        let mut parts = key.split('.');
        let mut cur = self.values.get(parts.next()?)?;
        for part in parts {
            cur = cur.as_object()?.get(part)?;
        }
        Some(cur)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get_str(&self, key: &str) -> GraphResult<Option<&str>> {
        match self.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(invalid(key, "a string", other)),
        }
    }

    pub fn require_str(&self, key: &str) -> GraphResult<&str> {
        self.get_str(key)?
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GraphError::config(format!("missing required key '{key}'")))
    }

    /// Booleans accept JSON `true`/`false` or the strings `"true"`/`"false"`.
    pub fn get_bool(&self, key: &str, default: bool) -> GraphResult<bool> {
        match self.get(key) {
            None | Some(serde_json::Value::Null) => Ok(default),
            Some(serde_json::Value::Bool(b)) => Ok(*b),
            Some(serde_json::Value::String(s)) if s == "true" => Ok(true),
            Some(serde_json::Value::String(s)) if s == "false" => Ok(false),
            Some(other) => Err(invalid(key, "a boolean", other)),
        }
    }

    pub fn get_u32(&self, key: &str, default: u32) -> GraphResult<u32> {
        match self.get(key) {
            None | Some(serde_json::Value::Null) => Ok(default),
            Some(v) => v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
                .ok_or_else(|| invalid(key, "an unsigned integer", v)),
        }
    }

    pub fn get_f64(&self, key: &str, default: f64) -> GraphResult<f64> {
        match self.get(key) {
            None | Some(serde_json::Value::Null) => Ok(default),
            Some(v) => v
                .as_f64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
                .ok_or_else(|| invalid(key, "a number", v)),
        }
    }

    pub fn get_filter(&self, key: &str) -> GraphResult<Filter> {
        self.get_str(key)?
            .map(Filter::parse)
            .transpose()
            .map(Option::unwrap_or_default)
    }

    pub fn get_wrap(&self, key: &str) -> GraphResult<Wrap> {
        self.get_str(key)?
            .map(Wrap::parse)
            .transpose()
            .map(Option::unwrap_or_default)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

fn invalid(key: &str, expected: &str, got: &serde_json::Value) -> GraphError {
    GraphError::config(format!("key '{key}' must be {expected}, got {got}"))
}

#[cfg(test)]
#[path = "../../tests/unit/atom/config.rs"]
mod tests;
