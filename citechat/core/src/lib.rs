//! Citechat Core - Streaming Conversation Engine for Citation-Annotated Chat
//!
//! This crate holds everything between a retrieval-augmented chat backend and
//! whatever renders the conversation. It has no UI dependency and can drive a
//! terminal, a web view, or a headless test.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Surfaces                                  │
//! │        ┌────────────┐        ┌─────────────────────────┐         │
//! │        │  CLI REPL  │        │  other / headless tests │         │
//! │        └─────┬──────┘        └────────────┬────────────┘         │
//! │              └──── SessionSnapshot (watch) ◄───┐                 │
//! └──────────────────────────────────────────────────┼───────────────┘
//!                                                    │
//! ┌──────────────────────────────────────────────────┼───────────────┐
//! │                       CITECHAT CORE              │               │
//! │  ┌────────────────┐   events   ┌─────────────────┴─────────────┐ │
//! │  │ StreamDecoder  │ ─────────► │ TimelineDriver ─► ChatSession │ │
//! │  └───────▲────────┘            └───────────────┬───────────────┘ │
//! │          │ fragments (pull)                    │ requests        │
//! │  ┌───────┴────────┐                    ┌───────▼───────┐         │
//! │  │  bridge + utf8 │ ◄──── bytes ────── │  ChatBackend  │         │
//! │  └────────────────┘       (push)       └───────────────┘         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`TimelineDriver`]: runs append / edit / regenerate round trips
//! - [`ChatSession`]: one conversation's topic, timeline and running flag
//! - [`StreamDecoder`]: splits `<citations-json>||<text>` into events
//! - [`ChatBackend`]: the transport seam; [`TrieveBackend`] talks HTTP
//!
//! # Quick Start
//!
//! ```ignore
//! use citechat_core::{load_config, ChatSession, TimelineDriver, TrieveBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     config.validate()?;
//!
//!     let backend = TrieveBackend::from_settings(&config.backend);
//!     let driver = TimelineDriver::from_config(backend, &config);
//!
//!     let mut session = ChatSession::new();
//!     driver.append(&mut session, "What is the refund window?").await?;
//!
//!     let answer = session.timeline().last().unwrap();
//!     println!("{}", answer.content);
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`streaming`]: decoder, UTF-8 reassembly and the push-to-pull bridge
//! - [`timeline`]: turns and the ordered conversation log
//! - [`session`]: per-conversation state and snapshot publishing
//! - [`driver`]: round-trip orchestration
//! - [`backend`]: chat backend trait and implementations
//! - [`citation`]: retrieval results attached to answers
//! - [`config`]: TOML / environment / CLI configuration
//! - [`error`]: error taxonomy

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod citation;
pub mod config;
pub mod driver;
pub mod error;
pub mod session;
pub mod streaming;
pub mod timeline;

// Re-exports for convenience
pub use backend::{
    ChatBackend, HistoryMessage, LlmOptions, MessageOptions, SearchType, TrieveBackend,
};
pub use citation::Citation;
pub use driver::TimelineDriver;
pub use error::{Cancelled, ChatError, StreamFailure, TransportError};
pub use session::{ChatSession, SessionSnapshot, Topic, TopicId};
pub use streaming::{
    decode_stream, DecoderState, FragmentPermit, FragmentSink, FragmentStream, StreamDecoder,
    StreamEvent, UnresolvedPolicy,
};
pub use timeline::{Timeline, Turn, TurnRole};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, BackendSettings, ChatSettings,
    CitechatConfig, CitechatToml, ConfigError, ConfigOverrides, ConfigSource,
};
