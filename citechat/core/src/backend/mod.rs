//! Chat Backend Integration
//!
//! This module provides access to citation-annotated chat services through
//! a common trait interface.
//!
//! # Available Backends
//!
//! - **Trieve**: retrieval-augmented chat over HTTP (default)
//! - **Scripted**: in-memory replay for tests, see [`test_utils`]
//!
//! # Usage
//!
//! ```ignore
//! use citechat_core::backend::{ChatBackend, MessageOptions, TrieveBackend};
//!
//! let backend = TrieveBackend::new("https://api.trieve.ai", "my-dataset").with_api_key(key);
//! let topic = backend.create_topic("owner", "Hello!").await?;
//! let fragments = backend.create_message(&topic.id, "Hello!", &MessageOptions::default()).await?;
//! ```

pub mod test_utils;
mod traits;
mod trieve;

pub use traits::{ChatBackend, HistoryMessage, LlmOptions, MessageOptions, SearchType};
pub use trieve::TrieveBackend;
