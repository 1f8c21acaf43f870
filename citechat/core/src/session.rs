//! Chat Session
//!
//! A session bundles everything one conversation needs between round trips:
//! the backend topic, the timeline, and the "is running" flag. It is passed
//! explicitly to every driver operation instead of living in globals.
//!
//! # Observing
//!
//! Each mutation publishes a fresh [`SessionSnapshot`] on a watch channel
//! before the mutating call returns. A surface that redraws on every change
//! sees answer text arrive live:
//!
//! ```ignore
//! let mut updates = session.subscribe();
//! while updates.changed().await.is_ok() {
//!     render(&updates.borrow_and_update());
//! }
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::ChatError;
use crate::timeline::{Timeline, Turn};

/// Backend identifier of a conversation topic
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(Uuid);

impl TopicId {
    /// Generate a fresh random id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TopicId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TopicId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A conversation topic as known to the backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    /// Topic identifier
    pub id: TopicId,
    /// Display name chosen by the backend
    pub name: String,
}

/// Read-only view of a session handed to renderers
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionSnapshot {
    /// Turns in timeline order
    pub turns: Vec<Turn>,
    /// Whether a round trip is in flight
    pub is_running: bool,
    /// Topic name, once a topic exists
    pub title: Option<String>,
    /// Increments with every published change
    pub version: u64,
}

/// One conversation's mutable state
#[derive(Debug)]
pub struct ChatSession {
    topic: Option<Topic>,
    timeline: Timeline,
    running: bool,
    version: u64,
    updates: watch::Sender<SessionSnapshot>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    /// Create an empty session with no topic yet
    #[must_use]
    pub fn new() -> Self {
        let (updates, _) = watch::channel(SessionSnapshot::default());
        Self {
            topic: None,
            timeline: Timeline::new(),
            running: false,
            version: 0,
            updates,
        }
    }

    /// Create a session for an existing topic and its history
    #[must_use]
    pub fn with_topic(topic: Topic, timeline: Timeline) -> Self {
        let mut session = Self::new();
        session.topic = Some(topic);
        session.timeline = timeline;
        session.publish();
        session
    }

    /// The backend topic, if one has been created
    #[must_use]
    pub fn topic(&self) -> Option<&Topic> {
        self.topic.as_ref()
    }

    /// Topic name, if any (resumed topics may have none)
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.topic
            .as_ref()
            .map(|t| t.name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// The timeline (read-only)
    #[must_use]
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Whether a round trip is in flight
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Subscribe to snapshots published after every change
    ///
    /// Round trips publish synchronously when their future is dropped, so a
    /// `borrow()` (or the `Ref` returned by `wait_for`) must not be held
    /// across the point where a round-trip future is dropped. Clone or map
    /// the snapshot first.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    /// Synchronous read of the current state
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            turns: self.timeline.turns().to_vec(),
            is_running: self.running,
            title: self.title().map(String::from),
            version: self.version,
        }
    }

    pub(crate) fn set_topic(&mut self, topic: Topic) {
        self.topic = Some(topic);
        self.publish();
    }

    /// Run a timeline mutation, publishing only if it succeeds
    pub(crate) fn mutate<R>(
        &mut self,
        f: impl FnOnce(&mut Timeline) -> Result<R, ChatError>,
    ) -> Result<R, ChatError> {
        let result = f(&mut self.timeline)?;
        self.publish();
        Ok(result)
    }

    /// Mark a round trip as running until the returned guard drops
    pub(crate) fn begin_round_trip(&mut self) -> RunningGuard<'_> {
        self.running = true;
        self.publish();
        RunningGuard { session: self }
    }

    fn publish(&mut self) {
        self.version += 1;
        let snapshot = self.snapshot();
        self.updates.send_replace(snapshot);
    }
}

/// Clears the running flag when a round trip ends, including by cancellation
#[derive(Debug)]
pub(crate) struct RunningGuard<'a> {
    session: &'a mut ChatSession,
}

impl Deref for RunningGuard<'_> {
    type Target = ChatSession;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl DerefMut for RunningGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.session.running = false;
        self.session.publish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::StreamEvent;

    #[test]
    fn test_session_creation() {
        let session = ChatSession::new();
        assert!(session.topic().is_none());
        assert!(session.timeline().is_empty());
        assert!(!session.is_running());
        assert_eq!(session.snapshot().version, 0);
    }

    #[test]
    fn test_mutation_publishes_snapshot() {
        let mut session = ChatSession::new();
        let mut updates = session.subscribe();

        session
            .mutate(|timeline| Ok(timeline.push_exchange("hi")))
            .unwrap();

        assert!(updates.has_changed().unwrap());
        let snapshot = updates.borrow_and_update().clone();
        assert_eq!(snapshot.turns.len(), 2);
        assert_eq!(snapshot.version, 1);
    }

    #[test]
    fn test_failed_mutation_publishes_nothing() {
        let mut session = ChatSession::new();
        session
            .mutate(|timeline| Ok(timeline.push_exchange("hi")))
            .unwrap();
        let mut updates = session.subscribe();
        updates.mark_unchanged();

        let err = session
            .mutate(|timeline| timeline.truncate_through(Some("42")))
            .unwrap_err();
        assert_eq!(err, ChatError::TurnNotFound { id: "42".to_string() });
        assert!(!updates.has_changed().unwrap());
        assert_eq!(session.timeline().len(), 2);
    }

    #[test]
    fn test_running_guard_resets_on_drop() {
        let mut session = ChatSession::new();
        let updates = session.subscribe();
        {
            let mut guard = session.begin_round_trip();
            assert!(guard.is_running());
            assert!(updates.borrow().is_running);
            guard
                .mutate(|timeline| {
                    timeline.push_exchange("q");
                    timeline.apply(StreamEvent::TextDelta("a".to_string()))
                })
                .unwrap();
        }
        assert!(!session.is_running());
        assert!(!updates.borrow().is_running);
        assert_eq!(updates.borrow().turns[1].content, "a");
    }

    #[test]
    fn test_topic_id_round_trip() {
        let id = TopicId::new();
        let parsed: TopicId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<TopicId>().is_err());
    }

    #[test]
    fn test_with_topic_sets_title() {
        let topic = Topic {
            id: TopicId::new(),
            name: "Shipping policy".to_string(),
        };
        let session = ChatSession::with_topic(topic, Timeline::new());
        assert_eq!(session.title(), Some("Shipping policy"));
        assert_eq!(session.snapshot().title.as_deref(), Some("Shipping policy"));
    }
}
