//! Conversation Timeline
//!
//! The ordered list of turns in one conversation. Turns are numbered by
//! `sort_order`, gapless from 1, alternating user/assistant. Only the last
//! turn is ever mutated by streaming events.
//!
//! Three rewrites reshape the timeline before a round trip:
//!
//! | Operation | Effect |
//! |---|---|
//! | append | push user + empty assistant at the end |
//! | edit at `k` | truncate to turns `1..=k`, then append |
//! | regenerate | clear content and citations of the last turn in place |

use serde::{Deserialize, Serialize};

use crate::citation::Citation;
use crate::error::ChatError;
use crate::streaming::StreamEvent;

/// Who authored a turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The person asking
    User,
    /// The backend's answer
    Assistant,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in the timeline
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Position in the conversation, starting at 1
    pub sort_order: u32,
    /// Author
    pub role: TurnRole,
    /// Accumulated text (empty until the first delta arrives)
    pub content: String,
    /// Citations, unset until a citations event is applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
}

impl Turn {
    /// Create a user turn
    pub fn user(sort_order: u32, content: impl Into<String>) -> Self {
        Self {
            sort_order,
            role: TurnRole::User,
            content: content.into(),
            citations: None,
        }
    }

    /// Create an empty assistant turn waiting for a stream
    #[must_use]
    pub fn assistant_placeholder(sort_order: u32) -> Self {
        Self {
            sort_order,
            role: TurnRole::Assistant,
            content: String::new(),
            citations: None,
        }
    }

    /// Identifier used by edit requests: the decimal sort order
    #[must_use]
    pub fn id(&self) -> String {
        self.sort_order.to_string()
    }

    /// Apply one decoded stream event to this turn
    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Citations(citations) => self.citations = Some(citations),
            StreamEvent::TextDelta(delta) => self.content.push_str(&delta),
        }
    }
}

/// Ordered conversation log
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    turns: Vec<Turn>,
}

impl Timeline {
    /// Create an empty timeline
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a timeline from stored turns, ordered by sort order
    pub fn from_turns(turns: impl IntoIterator<Item = Turn>) -> Self {
        let mut turns: Vec<Turn> = turns.into_iter().collect();
        turns.sort_by_key(|t| t.sort_order);
        Self { turns }
    }

    /// All turns in order
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the timeline has no turns
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The last turn, the only one streaming may touch
    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Find a turn by its identifier
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Turn> {
        self.turns.iter().find(|t| t.id() == id)
    }

    /// Append a user turn and its empty assistant placeholder
    ///
    /// Returns the user turn's sort order.
    pub fn push_exchange(&mut self, user_text: impl Into<String>) -> u32 {
        let user_order = self.next_sort_order();
        self.turns.push(Turn::user(user_order, user_text));
        self.turns.push(Turn::assistant_placeholder(user_order + 1));
        user_order
    }

    /// Keep only the prefix ending at `parent` (inclusive)
    ///
    /// `None` truncates to empty. Returns the new length.
    ///
    /// # Errors
    ///
    /// [`ChatError::TurnNotFound`] if no turn matches; the timeline is untouched.
    pub fn truncate_through(&mut self, parent: Option<&str>) -> Result<usize, ChatError> {
        let keep = match parent {
            None => 0,
            Some(id) => {
                let idx = self
                    .turns
                    .iter()
                    .position(|t| t.id() == id)
                    .ok_or_else(|| ChatError::TurnNotFound { id: id.to_string() })?;
                idx + 1
            }
        };

        self.turns.truncate(keep);
        Ok(keep)
    }

    /// Clear the last turn's content and citations in place
    ///
    /// # Errors
    ///
    /// [`ChatError::EmptyTimeline`] if there is no turn to reset.
    pub fn reset_last(&mut self) -> Result<(), ChatError> {
        let last = self.turns.last_mut().ok_or(ChatError::EmptyTimeline)?;
        last.content.clear();
        last.citations = None;
        Ok(())
    }

    /// Apply a stream event to the last turn
    ///
    /// # Errors
    ///
    /// [`ChatError::EmptyTimeline`] if there is no turn to receive it.
    pub fn apply(&mut self, event: StreamEvent) -> Result<(), ChatError> {
        self.turns
            .last_mut()
            .ok_or(ChatError::EmptyTimeline)?
            .apply(event);
        Ok(())
    }

    fn next_sort_order(&self) -> u32 {
        u32::try_from(self.turns.len()).unwrap_or(u32::MAX - 1) + 1
    }
}
