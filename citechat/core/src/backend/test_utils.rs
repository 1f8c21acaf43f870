//! Scripted Backend for Tests
//!
//! An in-memory [`ChatBackend`] that replays scripted answers instead of
//! calling a server. Every call is recorded so tests can assert on what the
//! driver asked for.
//!
//! # Usage
//!
//! ```ignore
//! use citechat_core::backend::test_utils::{ScriptedBackend, ScriptedReply};
//!
//! let backend = ScriptedBackend::new()
//!     .with_reply(ScriptedReply::fragments(["[]|", "|I'm ", "fine"]));
//!
//! // ... drive a round trip ...
//!
//! assert_eq!(backend.requests().len(), 2); // topic + message
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::traits::{ChatBackend, HistoryMessage, MessageOptions};
use crate::error::{Cancelled, TransportError};
use crate::session::{Topic, TopicId};
use crate::streaming::{bridge, FragmentSink, FragmentStream};

/// A request the driver made, as seen by the backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedRequest {
    /// `create_topic`
    CreateTopic {
        /// Owner the topic was created for
        owner_id: String,
        /// Message the topic was seeded with
        first_user_message: String,
    },
    /// `create_message`
    Create {
        /// Target topic
        topic_id: TopicId,
        /// New user message
        content: String,
    },
    /// `edit_message`
    Edit {
        /// Target topic
        topic_id: TopicId,
        /// Sort order of the replacement user message
        sort_order: u32,
        /// Replacement user message
        content: String,
    },
    /// `regenerate_message`
    Regenerate {
        /// Target topic
        topic_id: TopicId,
    },
    /// `history`
    History {
        /// Target topic
        topic_id: TopicId,
    },
}

/// What the next streaming request answers with
#[derive(Debug)]
pub enum ScriptedReply {
    /// Deliver these fragments, then end the stream
    Fragments(Vec<String>),
    /// Deliver these fragments, then fail the stream
    FailAfter {
        /// Fragments delivered before the failure
        fragments: Vec<String>,
        /// Failure reason
        reason: String,
    },
    /// Reject the request before any streaming
    Reject(TransportError),
    /// Hand out a stream the test feeds itself
    Stream(FragmentStream),
    /// Deliver these fragments, then keep the stream open until cancelled
    HoldOpen(Vec<String>),
}

impl ScriptedReply {
    /// Shorthand for [`ScriptedReply::Fragments`]
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fragments(fragments.into_iter().map(Into::into).collect())
    }
}

/// In-memory backend replaying [`ScriptedReply`] values in order
#[derive(Debug)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<ScriptedReply>>,
    history: Mutex<Vec<HistoryMessage>>,
    topic_name: String,
    topic_failure: Option<TransportError>,
    requests: Mutex<Vec<RecordedRequest>>,
    released: Arc<AtomicUsize>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    /// Create a backend with no scripted replies
    #[must_use]
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            history: Mutex::new(Vec::new()),
            topic_name: "New chat".to_string(),
            topic_failure: None,
            requests: Mutex::new(Vec::new()),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue a reply for the next streaming request
    #[must_use]
    pub fn with_reply(self, reply: ScriptedReply) -> Self {
        self.push_reply(reply);
        self
    }

    /// Queue a reply after construction
    pub fn push_reply(&self, reply: ScriptedReply) {
        self.replies.lock().push_back(reply);
    }

    /// Set the messages returned by `history`
    #[must_use]
    pub fn with_history(self, history: Vec<HistoryMessage>) -> Self {
        *self.history.lock() = history;
        self
    }

    /// Name given to created topics
    #[must_use]
    pub fn with_topic_name(mut self, name: impl Into<String>) -> Self {
        self.topic_name = name.into();
        self
    }

    /// Make `create_topic` fail
    #[must_use]
    pub fn fail_topic_creation(mut self, error: TransportError) -> Self {
        self.topic_failure = Some(error);
        self
    }

    /// All requests received so far
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Number of scripted streams whose consumer cancelled before the end
    #[must_use]
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn record(&self, request: RecordedRequest) {
        self.requests.lock().push(request);
    }

    fn next_stream(&self) -> Result<FragmentStream, TransportError> {
        let reply = self.replies.lock().pop_front();
        let Some(reply) = reply else {
            return Err(TransportError::Status {
                status: 500,
                reason: "no scripted reply".to_string(),
            });
        };

        match reply {
            ScriptedReply::Reject(error) => Err(error),
            ScriptedReply::Stream(stream) => Ok(stream),
            ScriptedReply::Fragments(fragments) => Ok(self.spawn(fragments, Ending::Close)),
            ScriptedReply::FailAfter { fragments, reason } => {
                Ok(self.spawn(fragments, Ending::Fail(reason)))
            }
            ScriptedReply::HoldOpen(fragments) => Ok(self.spawn(fragments, Ending::Hold)),
        }
    }

    fn spawn(&self, fragments: Vec<String>, ending: Ending) -> FragmentStream {
        let (sink, stream) = bridge::channel();
        let released = Arc::clone(&self.released);
        tokio::spawn(async move {
            if replay(sink, fragments, ending).await.is_err() {
                released.fetch_add(1, Ordering::SeqCst);
            }
        });
        stream
    }
}

enum Ending {
    Close,
    Fail(String),
    Hold,
}

/// Push fragments through the sink; `Err` means the consumer went away first
async fn replay(
    sink: FragmentSink,
    fragments: Vec<String>,
    ending: Ending,
) -> Result<(), Cancelled> {
    for fragment in fragments {
        sink.push(fragment).await?;
    }
    match ending {
        Ending::Close => Ok(()),
        Ending::Fail(reason) => sink.fail(reason).await,
        Ending::Hold => {
            sink.cancelled().await;
            Err(Cancelled)
        }
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn create_topic(
        &self,
        owner_id: &str,
        first_user_message: &str,
    ) -> Result<Topic, TransportError> {
        self.record(RecordedRequest::CreateTopic {
            owner_id: owner_id.to_string(),
            first_user_message: first_user_message.to_string(),
        });
        if let Some(ref error) = self.topic_failure {
            return Err(error.clone());
        }
        Ok(Topic {
            id: TopicId::new(),
            name: self.topic_name.clone(),
        })
    }

    async fn create_message(
        &self,
        topic_id: &TopicId,
        content: &str,
        _options: &MessageOptions,
    ) -> Result<FragmentStream, TransportError> {
        self.record(RecordedRequest::Create {
            topic_id: *topic_id,
            content: content.to_string(),
        });
        self.next_stream()
    }

    async fn edit_message(
        &self,
        topic_id: &TopicId,
        sort_order: u32,
        content: &str,
        _options: &MessageOptions,
    ) -> Result<FragmentStream, TransportError> {
        self.record(RecordedRequest::Edit {
            topic_id: *topic_id,
            sort_order,
            content: content.to_string(),
        });
        self.next_stream()
    }

    async fn regenerate_message(
        &self,
        topic_id: &TopicId,
        _options: &MessageOptions,
    ) -> Result<FragmentStream, TransportError> {
        self.record(RecordedRequest::Regenerate {
            topic_id: *topic_id,
        });
        self.next_stream()
    }

    async fn history(&self, topic_id: &TopicId) -> Result<Vec<HistoryMessage>, TransportError> {
        self.record(RecordedRequest::History {
            topic_id: *topic_id,
        });
        Ok(self.history.lock().clone())
    }
}
