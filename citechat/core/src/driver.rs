//! Timeline Driver
//!
//! Runs round trips against a [`ChatBackend`] and folds the decoded answer into
//! a [`ChatSession`]'s timeline, one event at a time.
//!
//! # Round Trip
//!
//! ```text
//!  rewrite timeline ──► mark running ──► backend request ──► decode ──► apply ──► ...
//!  (optimistic)                          (may reject)         (pull)    (publish)
//! ```
//!
//! | Operation | Timeline rewrite | Backend call |
//! |---|---|---|
//! | [`append`](TimelineDriver::append) | push user + placeholder | `create_topic` (first time), `create_message` |
//! | [`edit_at`](TimelineDriver::edit_at) | truncate through parent, push | `edit_message(sort_order)` |
//! | [`regenerate_last`](TimelineDriver::regenerate_last) | clear last turn | `regenerate_message` |
//!
//! Failures never roll back the rewrite: a rejected request leaves the empty
//! placeholder, a broken stream leaves whatever text already arrived.
//!
//! Operations take `&mut ChatSession`, so a second round trip on the same
//! session cannot start while one is in flight. Dropping an operation's future
//! drops the answer stream, which cancels the bridge and releases the
//! connection; the running flag is cleared either way.

use std::pin::pin;

use futures::StreamExt;

use crate::backend::{ChatBackend, HistoryMessage, MessageOptions};
use crate::config::{CitechatConfig, DEFAULT_OWNER_ID};
use crate::error::ChatError;
use crate::session::{ChatSession, Topic, TopicId};
use crate::streaming::{decode_stream, FragmentStream, StreamEvent};
use crate::timeline::Timeline;

/// Drives conversation round trips for any number of sessions
#[derive(Debug)]
pub struct TimelineDriver<B> {
    backend: B,
    options: MessageOptions,
    owner_id: String,
}

impl<B: ChatBackend> TimelineDriver<B> {
    /// Create a driver with default message options
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            options: MessageOptions::default(),
            owner_id: DEFAULT_OWNER_ID.to_string(),
        }
    }

    /// Create a driver using the chat defaults and owner from configuration
    pub fn from_config(backend: B, config: &CitechatConfig) -> Self {
        Self::new(backend)
            .with_options(config.chat.to_message_options())
            .with_owner_id(config.backend.owner_id.clone())
    }

    /// Options sent with every message
    #[must_use]
    pub fn with_options(mut self, options: MessageOptions) -> Self {
        self.options = options;
        self
    }

    /// Owner recorded on topics this driver creates
    #[must_use]
    pub fn with_owner_id(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = owner_id.into();
        self
    }

    /// The backend
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Options sent with every message
    #[must_use]
    pub fn options(&self) -> &MessageOptions {
        &self.options
    }

    /// Send a new user message and stream the answer into a fresh assistant turn
    ///
    /// Creates the backend topic on the first message of a session.
    ///
    /// # Errors
    ///
    /// - [`ChatError::Transport`] if topic creation or the request fails; the
    ///   new user turn and empty placeholder stay in the timeline
    /// - [`ChatError::StreamInterrupted`] if the answer breaks off; partial
    ///   content stays
    pub async fn append(&self, session: &mut ChatSession, text: &str) -> Result<(), ChatError> {
        let sort_order = session.mutate(|timeline| Ok(timeline.push_exchange(text)))?;
        let mut session = session.begin_round_trip();
        tracing::info!(backend = self.backend.name(), sort_order, "Appending message");

        let result = match self.open_message(&mut session, text).await {
            Ok(fragments) => self.stream_into_last(&mut session, fragments).await,
            Err(e) => Err(e),
        };

        log_outcome("append", result)
    }

    /// Replace everything after `parent` with a new user message and stream
    /// the answer
    ///
    /// `parent` is the id of the last turn to keep; `None` edits the very
    /// first message.
    ///
    /// # Errors
    ///
    /// - [`ChatError::NoActiveTopic`] before the first message
    /// - [`ChatError::TurnNotFound`] if `parent` matches no turn; nothing changes
    /// - [`ChatError::Transport`] / [`ChatError::StreamInterrupted`] as for
    ///   [`append`](Self::append)
    pub async fn edit_at(
        &self,
        session: &mut ChatSession,
        text: &str,
        parent: Option<&str>,
    ) -> Result<(), ChatError> {
        let topic_id = active_topic(session)?;
        let sort_order = session.mutate(|timeline| {
            timeline.truncate_through(parent)?;
            Ok(timeline.push_exchange(text))
        })?;
        let mut session = session.begin_round_trip();
        tracing::info!(
            backend = self.backend.name(),
            parent = parent.unwrap_or("-"),
            sort_order,
            "Editing message"
        );

        let result = match self
            .backend
            .edit_message(&topic_id, sort_order, text, &self.options)
            .await
        {
            Ok(fragments) => self.stream_into_last(&mut session, fragments).await,
            Err(e) => Err(e.into()),
        };

        log_outcome("edit", result)
    }

    /// Clear the last turn and stream a new answer into it
    ///
    /// The timeline keeps its length and numbering.
    ///
    /// # Errors
    ///
    /// - [`ChatError::NoActiveTopic`] before the first message
    /// - [`ChatError::EmptyTimeline`] if there is nothing to regenerate
    /// - [`ChatError::Transport`] / [`ChatError::StreamInterrupted`] as for
    ///   [`append`](Self::append)
    pub async fn regenerate_last(&self, session: &mut ChatSession) -> Result<(), ChatError> {
        let topic_id = active_topic(session)?;
        session.mutate(Timeline::reset_last)?;
        let mut session = session.begin_round_trip();
        tracing::info!(backend = self.backend.name(), "Regenerating last answer");

        let result = match self
            .backend
            .regenerate_message(&topic_id, &self.options)
            .await
        {
            Ok(fragments) => self.stream_into_last(&mut session, fragments).await,
            Err(e) => Err(e.into()),
        };

        log_outcome("regenerate", result)
    }

    /// Apply one event to the session's last turn and publish the change
    ///
    /// # Errors
    ///
    /// [`ChatError::EmptyTimeline`] if the session has no turns.
    pub fn apply(&self, session: &mut ChatSession, event: StreamEvent) -> Result<(), ChatError> {
        session.mutate(|timeline| timeline.apply(event))
    }

    /// Rebuild a session for an existing topic from the backend's history
    ///
    /// # Errors
    ///
    /// [`ChatError::Transport`] if the history cannot be fetched.
    pub async fn resume(&self, topic_id: TopicId) -> Result<ChatSession, ChatError> {
        let history = self.backend.history(&topic_id).await?;
        let timeline =
            Timeline::from_turns(history.into_iter().filter_map(HistoryMessage::into_turn));
        tracing::info!(topic_id = %topic_id, turns = timeline.len(), "Resumed topic");

        let topic = Topic {
            id: topic_id,
            name: String::new(),
        };
        Ok(ChatSession::with_topic(topic, timeline))
    }

    /// Create the topic if needed, then send the message
    async fn open_message(
        &self,
        session: &mut ChatSession,
        text: &str,
    ) -> Result<FragmentStream, ChatError> {
        let topic_id = match session.topic() {
            Some(topic) => topic.id,
            None => {
                let topic = self.backend.create_topic(&self.owner_id, text).await?;
                tracing::info!(topic_id = %topic.id, title = %topic.name, "Created topic");
                let id = topic.id;
                session.set_topic(topic);
                id
            }
        };

        let fragments = self
            .backend
            .create_message(&topic_id, text, &self.options)
            .await?;
        Ok(fragments)
    }

    /// Decode `fragments` and apply each event to the last turn as it arrives
    async fn stream_into_last(
        &self,
        session: &mut ChatSession,
        fragments: FragmentStream,
    ) -> Result<(), ChatError> {
        let mut events = pin!(decode_stream(fragments));
        let mut received = 0usize;

        while let Some(event) = events.next().await {
            let event = event?;
            match event {
                StreamEvent::Citations(ref citations) => {
                    tracing::debug!(count = citations.len(), "Citations resolved");
                }
                StreamEvent::TextDelta(ref delta) => received += delta.len(),
            }
            self.apply(session, event)?;
        }

        tracing::debug!(bytes = received, "Answer stream complete");
        Ok(())
    }
}

fn active_topic(session: &ChatSession) -> Result<TopicId, ChatError> {
    session
        .topic()
        .map(|topic| topic.id)
        .ok_or(ChatError::NoActiveTopic)
}

fn log_outcome(operation: &str, result: Result<(), ChatError>) -> Result<(), ChatError> {
    match result {
        Ok(()) => tracing::info!(operation, "Round trip complete"),
        Err(ref e) => tracing::warn!(operation, error = %e, "Round trip failed"),
    }
    result
}
