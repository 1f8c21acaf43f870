//! Retrieval Citations
//!
//! A citation is one retrieval result the backend attached to an answer. The
//! whole list arrives once, at the head of the answer stream, and is replaced
//! wholesale whenever a turn is regenerated. Fields are never merged.

use serde::{Deserialize, Deserializer, Serialize};

/// A retrieval result referenced by an assistant answer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Identifier, unique within one response
    pub id: String,
    /// Source hyperlink
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Creation timestamp as sent by the backend
    #[serde(default, deserialize_with = "null_as_empty")]
    pub created_at: String,
    /// Last update timestamp as sent by the backend
    #[serde(default, deserialize_with = "null_as_empty")]
    pub updated_at: String,
    /// Rendered HTML snippet of the matched chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_html: Option<String>,
    /// Free-form metadata owned by the backend (title, author, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Citation {
    /// Create a bare citation with only an identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            link: None,
            created_at: String::new(),
            updated_at: String::new(),
            chunk_html: None,
            metadata: None,
        }
    }

    /// Set the hyperlink
    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Set the metadata object
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Look up a metadata field by key
    pub fn metadata_field(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.as_ref()?.get(key)
    }

    /// The `title` metadata field, when it is a string
    pub fn title(&self) -> Option<&str> {
        self.metadata_field("title")?.as_str()
    }

    /// Best human-readable label: title, then link, then id
    pub fn label(&self) -> &str {
        self.title()
            .or(self.link.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Timestamps may be sent as `null`; treat that like a missing field
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
