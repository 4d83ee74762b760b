use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Chat completion body as forwarded by the host. Fields the filter does not
/// read are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub metadata: RequestMetadata,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    #[cfg(test)]
    pub(crate) fn new(role: &str, content: impl Into<String>) -> Self {
        let mut extra = Map::new();
        extra.insert("role".to_owned(), Value::String(role.to_owned()));
        Self {
            content: Some(Value::String(content.into())),
            extra,
        }
    }

    /// Text content of the message, `None` when absent or not a string.
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMetadata {
    #[serde(default)]
    pub files: Option<Vec<FileEntry>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An attached file. Only `file.data.content` is read; everything else is
/// opaque to the filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileEntry(pub Value);

impl FileEntry {
    #[cfg(test)]
    pub(crate) fn with_content(content: impl Into<String>) -> Self {
        Self(serde_json::json!({
            "file": { "data": { "content": content.into() } }
        }))
    }

    /// Embedded text of the file.
    ///
    /// `Ok(None)` when the entry lacks the `file.data.content` nesting,
    /// `Err` with the offending value when the content is not a string.
    pub fn content(&self) -> Result<Option<&str>, &Value> {
        let Some(content) = self
            .0
            .get("file")
            .and_then(|file| file.get("data"))
            .and_then(|data| data.get("content"))
        else {
            return Ok(None);
        };
        match content {
            Value::String(text) => Ok(Some(text.as_str())),
            other => Err(other),
        }
    }
}

/// Outcome of a single scanner call.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    pub sanitized: String,
    pub is_valid: bool,
    pub risk_score: f64,
}

impl ScanResult {
    pub fn valid(text: impl Into<String>) -> Self {
        Self {
            sanitized: text.into(),
            is_valid: true,
            risk_score: 0.0,
        }
    }

    pub fn invalid(text: impl Into<String>, risk_score: f64) -> Self {
        Self {
            sanitized: text.into(),
            is_valid: false,
            risk_score,
        }
    }
}
