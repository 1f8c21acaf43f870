//! Trieve Backend Implementation
//!
//! HTTP client for a Trieve retrieval-augmented chat server.
//!
//! # Trieve API
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | `POST` | `/api/topic` | create a topic from the first user message |
//! | `POST` | `/api/message` | add a message, stream the answer |
//! | `PUT` | `/api/message` | edit the message at `message_sort_order`, stream the answer |
//! | `PATCH` | `/api/message` | regenerate the last answer |
//! | `GET` | `/api/message/{topic_id}` | stored messages of a topic |
//!
//! Every request carries `Authorization: <api key>` and `TR-Dataset: <dataset id>`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;

use super::traits::{ChatBackend, HistoryMessage, MessageOptions};
use crate::config::BackendSettings;
use crate::error::TransportError;
use crate::session::{Topic, TopicId};
use crate::streaming::FragmentStream;

/// Body shared by the create, edit and regenerate message calls
#[derive(Serialize)]
struct MessageBody<'a> {
    topic_id: &'a TopicId,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_message_content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_sort_order: Option<u32>,
    #[serde(flatten)]
    options: &'a MessageOptions,
}

#[derive(Serialize)]
struct TopicBody<'a> {
    owner_id: &'a str,
    first_user_message: &'a str,
}

/// Trieve chat backend client
#[derive(Clone)]
pub struct TrieveBackend {
    /// API root, without trailing slash
    base_url: String,
    /// Value of the `Authorization` header
    api_key: Option<String>,
    /// Value of the `TR-Dataset` header
    dataset_id: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl std::fmt::Debug for TrieveBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrieveBackend")
            .field("base_url", &self.base_url)
            .field("dataset_id", &self.dataset_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl TrieveBackend {
    /// Create a backend for the given API root and dataset
    pub fn new(base_url: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self::with_connect_timeout(base_url, dataset_id, Duration::from_secs(10))
    }

    fn with_connect_timeout(
        base_url: impl Into<String>,
        dataset_id: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            dataset_id: dataset_id.into(),
            http_client: reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Create from resolved configuration
    #[must_use]
    pub fn from_settings(settings: &BackendSettings) -> Self {
        let mut backend = Self::with_connect_timeout(
            settings.api_url.clone(),
            settings.dataset_id.clone(),
            settings.connect_timeout,
        );
        backend.api_key.clone_from(&settings.api_key);
        backend
    }

    /// Set the API key sent in the `Authorization` header
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// The API root this backend talks to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .http_client
            .request(method, self.url(path))
            .header("TR-Dataset", &self.dataset_id);
        if let Some(ref key) = self.api_key {
            builder = builder.header(reqwest::header::AUTHORIZATION, key);
        }
        builder
    }

    async fn open_stream(
        &self,
        method: Method,
        body: &MessageBody<'_>,
    ) -> Result<FragmentStream, TransportError> {
        tracing::debug!(
            method = %method,
            topic_id = %body.topic_id,
            sort_order = ?body.message_sort_order,
            "Opening answer stream"
        );

        let response = self
            .request(method, "/api/message")
            .json(body)
            .send()
            .await?;
        let response = check_status(response)?;

        Ok(FragmentStream::from_bytes(response.bytes_stream()))
    }
}

/// Map a non-success status to a transport error
fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
    tracing::warn!(status = status.as_u16(), reason = %reason, "Backend rejected request");
    Err(TransportError::Status {
        status: status.as_u16(),
        reason,
    })
}

#[async_trait]
impl ChatBackend for TrieveBackend {
    fn name(&self) -> &str {
        "Trieve"
    }

    async fn create_topic(
        &self,
        owner_id: &str,
        first_user_message: &str,
    ) -> Result<Topic, TransportError> {
        let response = self
            .request(Method::POST, "/api/topic")
            .json(&TopicBody {
                owner_id,
                first_user_message,
            })
            .send()
            .await?;

        let topic: Topic = check_status(response)?.json().await?;
        Ok(topic)
    }

    async fn create_message(
        &self,
        topic_id: &TopicId,
        content: &str,
        options: &MessageOptions,
    ) -> Result<FragmentStream, TransportError> {
        let body = MessageBody {
            topic_id,
            new_message_content: Some(content),
            message_sort_order: None,
            options,
        };
        self.open_stream(Method::POST, &body).await
    }

    async fn edit_message(
        &self,
        topic_id: &TopicId,
        sort_order: u32,
        content: &str,
        options: &MessageOptions,
    ) -> Result<FragmentStream, TransportError> {
        let body = MessageBody {
            topic_id,
            new_message_content: Some(content),
            message_sort_order: Some(sort_order),
            options,
        };
        self.open_stream(Method::PUT, &body).await
    }

    async fn regenerate_message(
        &self,
        topic_id: &TopicId,
        options: &MessageOptions,
    ) -> Result<FragmentStream, TransportError> {
        let body = MessageBody {
            topic_id,
            new_message_content: None,
            message_sort_order: None,
            options,
        };
        self.open_stream(Method::PATCH, &body).await
    }

    async fn history(&self, topic_id: &TopicId) -> Result<Vec<HistoryMessage>, TransportError> {
        let response = self
            .request(Method::GET, &format!("/api/message/{topic_id}"))
            .send()
            .await?;

        let messages: Vec<HistoryMessage> = check_status(response)?.json().await?;
        Ok(messages)
    }
}
