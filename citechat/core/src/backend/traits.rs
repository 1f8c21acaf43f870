//! Chat Backend Traits
//!
//! The driver talks to the retrieval-augmented chat service only through
//! [`ChatBackend`]. Implementations own request construction, auth headers and
//! endpoints; the driver only sees topics, fragment streams and errors.

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::session::{Topic, TopicId};
use crate::streaming::FragmentStream;
use crate::timeline::{Turn, TurnRole};

/// Retrieval strategy the backend uses to find citations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// Keyword search
    Fulltext,
    /// Embedding search
    Semantic,
    /// Keyword and embedding combined
    Hybrid,
    /// BM25 ranking
    Bm25,
}

impl FromStr for SearchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fulltext" => Ok(Self::Fulltext),
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            "bm25" => Ok(Self::Bm25),
            other => Err(format!(
                "unknown search type '{other}' (expected fulltext, semantic, hybrid or bm25)"
            )),
        }
    }
}

/// Generation settings forwarded to the backend's LLM
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmOptions {
    /// System prompt override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Ask the backend to send the completion before citations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_first: Option<bool>,
}

impl LlmOptions {
    /// Whether nothing is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Per-request retrieval and generation options
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageOptions {
    /// Retrieval strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_type: Option<SearchType>,
    /// Number of chunks to retrieve
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    /// Search with all user messages of the topic, not just the last one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concat_user_messages_query: Option<bool>,
    /// End-user identifier for backend analytics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// LLM settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_options: Option<LlmOptions>,
}

/// A stored message as returned by the history endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Position in the topic
    pub sort_order: u32,
    /// Author role as a free-form string (`user`, `assistant`, `system`)
    pub role: String,
    /// Message text
    pub content: String,
    /// Backend message id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Creation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl HistoryMessage {
    /// Convert to a timeline turn; roles other than user/assistant are dropped
    #[must_use]
    pub fn into_turn(self) -> Option<Turn> {
        let role = match self.role.as_str() {
            "user" => TurnRole::User,
            "assistant" => TurnRole::Assistant,
            _ => return None,
        };
        Some(Turn {
            sort_order: self.sort_order,
            role,
            content: self.content,
            citations: None,
        })
    }
}

/// Transport to a citation-annotated chat backend
///
/// Streaming operations return a [`FragmentStream`] of raw answer text in the
/// `<citations-json>||<text>` wire format. Dropping the stream must release
/// the underlying connection.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name for logs (e.g., "Trieve")
    fn name(&self) -> &str;

    /// Create a topic seeded with the first user message
    async fn create_topic(
        &self,
        owner_id: &str,
        first_user_message: &str,
    ) -> Result<Topic, TransportError>;

    /// Send a new user message and stream the answer
    async fn create_message(
        &self,
        topic_id: &TopicId,
        content: &str,
        options: &MessageOptions,
    ) -> Result<FragmentStream, TransportError>;

    /// Replace the message at `sort_order` (and everything after it) and
    /// stream the new answer
    async fn edit_message(
        &self,
        topic_id: &TopicId,
        sort_order: u32,
        content: &str,
        options: &MessageOptions,
    ) -> Result<FragmentStream, TransportError>;

    /// Discard the last answer of the topic and stream a new one
    async fn regenerate_message(
        &self,
        topic_id: &TopicId,
        options: &MessageOptions,
    ) -> Result<FragmentStream, TransportError>;

    /// Fetch the stored messages of a topic
    async fn history(&self, topic_id: &TopicId) -> Result<Vec<HistoryMessage>, TransportError>;
}
