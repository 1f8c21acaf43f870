//! Answer Streaming
//!
//! Everything between the raw bytes the backend sends and the typed events the
//! timeline consumes.
//!
//! # Data Flow
//!
//! ```text
//! ┌───────────┐  bytes   ┌──────────────────┐ fragments ┌───────────────┐ events
//! │ transport │ ───────► │ bridge (+ utf8)  │ ────────► │    decoder    │ ───────►  driver
//! └───────────┘  (push)  └──────────────────┘  (pull)   └───────────────┘
//! ```
//!
//! - [`bridge`]: push-to-pull adapter with a single-slot buffer and cancellation
//! - [`utf8`]: incremental UTF-8 decoding for split byte chunks
//! - [`decoder`]: the `<citations-json>||<text>` demultiplexer
//!
//! # Example
//!
//! ```ignore
//! use citechat_core::streaming::{bridge, decode_stream, StreamEvent};
//! use futures::StreamExt;
//!
//! let (sink, fragments) = bridge::channel();
//! tokio::spawn(async move {
//!     sink.push("[]|").await.ok();
//!     sink.push("|Hello").await.ok();
//! });
//!
//! let mut events = std::pin::pin!(decode_stream(fragments));
//! while let Some(event) = events.next().await {
//!     println!("{:?}", event?);
//! }
//! ```

pub mod bridge;
pub mod decoder;
pub mod utf8;

pub use bridge::{FragmentPermit, FragmentSink, FragmentStream};
pub use decoder::{
    decode_stream, decode_stream_with, DecoderState, StreamDecoder, StreamEvent,
    UnresolvedPolicy, DELIMITER,
};
pub use utf8::Utf8Decoder;
