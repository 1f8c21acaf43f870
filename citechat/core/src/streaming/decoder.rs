//! Citation Stream Decoder
//!
//! Demultiplexes the backend's answer stream into typed events. The wire shape
//! is a JSON array of citations, a literal `||`, then free answer text:
//!
//! ```text
//! [{"id":"a",...},{"id":"b",...}]||The answer text, which may contain || too
//! ```
//!
//! Fragments arrive at arbitrary boundaries, so the delimiter itself may be
//! split across two fragments and the JSON may contain `||` inside a string
//! value (a URL, say). The decoder is a two-state automaton:
//!
//! - `ResolvingCitations`: fragments accumulate in a buffer. Each `||` found in
//!   the buffer is a candidate; the prefix before it is parsed as a citation
//!   array. A failed parse is an ordinary [`ParseOutcome::Incomplete`] and the
//!   search moves on to the next candidate.
//! - `StreamingText`: every fragment is emitted verbatim as a text delta.
//!
//! Any JSON array before a delimiter resolves the citations. Elements that do
//! not look like citation records are dropped, so one odd field never pushes
//! the payload into the answer text.
//!
//! If the stream ends while still resolving, a stream that never contained a
//! delimiter is plain text and is flushed as such; a stream whose delimiters
//! all failed to parse carried a malformed payload and is discarded.
//!
//! Retrying against the whole buffer makes pathological inputs quadratic, which
//! is fine for citation payloads of a few kilobytes.

use std::collections::VecDeque;

use futures::{stream, Stream, StreamExt};

use crate::citation::Citation;
use crate::error::{ChatError, StreamFailure};

/// Separator between the citation payload and the answer text
pub const DELIMITER: &str = "||";

/// A decoded event from the answer stream
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// The citation list for this answer (at most once, before any text)
    Citations(Vec<Citation>),
    /// An increment of answer text
    TextDelta(String),
}

impl StreamEvent {
    /// Text carried by a `TextDelta`, if this is one
    pub fn as_text_delta(&self) -> Option<&str> {
        match self {
            Self::TextDelta(text) => Some(text),
            Self::Citations(_) => None,
        }
    }
}

/// Current phase of the decoder
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderState {
    /// Still accumulating the citation payload
    ResolvingCitations,
    /// Citations resolved; everything else is answer text
    StreamingText,
}

/// What to do with the buffer if the stream ends before citations resolve
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnresolvedPolicy {
    /// Emit the buffer as one trailing text delta when no delimiter was ever
    /// seen; drop it when a delimiter was seen but the payload never parsed
    #[default]
    FlushAsText,
    /// Always drop the buffered input
    Discard,
}

/// Result of trying one delimiter candidate
#[derive(Debug)]
enum ParseOutcome {
    Resolved(Vec<Citation>),
    Incomplete,
}

/// Incremental decoder for the `<citations-json>||<text>` wire format
#[derive(Debug)]
pub struct StreamDecoder {
    state: DecoderState,
    /// Unparsed input while resolving citations
    buffer: String,
    /// Byte offset in `buffer` where the next delimiter search begins
    scan_from: usize,
    /// Delimiter candidates rejected so far
    false_positives: usize,
    policy: UnresolvedPolicy,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    /// Create a decoder that flushes delimiter-free input as text at end of stream
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(UnresolvedPolicy::default())
    }

    /// Create a decoder with an explicit end-of-stream policy
    #[must_use]
    pub fn with_policy(policy: UnresolvedPolicy) -> Self {
        Self {
            state: DecoderState::ResolvingCitations,
            buffer: String::new(),
            scan_from: 0,
            false_positives: 0,
            policy,
        }
    }

    /// Current phase
    #[must_use]
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Number of `||` candidates that turned out to be inside the payload
    #[must_use]
    pub fn false_positives(&self) -> usize {
        self.false_positives
    }

    /// Feed one fragment and collect the events it completes
    ///
    /// Returns at most two events: the citations and the first text delta
    /// when the payload resolves, or a single text delta afterwards.
    pub fn feed(&mut self, fragment: &str) -> Vec<StreamEvent> {
        if self.state == DecoderState::StreamingText {
            return vec![StreamEvent::TextDelta(fragment.to_owned())];
        }

        self.buffer.push_str(fragment);

        while let Some(pos) = find_delimiter(self.buffer.as_bytes(), self.scan_from) {
            match parse_citations(&self.buffer[..pos]) {
                ParseOutcome::Resolved(citations) => {
                    let remainder = self.buffer.split_off(pos + DELIMITER.len());
                    self.buffer = String::new();
                    self.scan_from = 0;
                    self.state = DecoderState::StreamingText;

                    tracing::debug!(
                        citations = citations.len(),
                        false_positives = self.false_positives,
                        "Citations resolved"
                    );

                    return vec![
                        StreamEvent::Citations(citations),
                        StreamEvent::TextDelta(remainder),
                    ];
                }
                ParseOutcome::Incomplete => {
                    self.false_positives += 1;
                    self.scan_from = pos + DELIMITER.len();
                }
            }
        }

        // Back off one byte so a delimiter split across fragments is still found
        let tail = self.buffer.len().saturating_sub(DELIMITER.len() - 1);
        self.scan_from = self.scan_from.max(tail);
        Vec::new()
    }

    /// Signal end of input
    ///
    /// If citations never resolved, the buffered input is handled according
    /// to the decoder's [`UnresolvedPolicy`]. No citations event is produced,
    /// and a malformed payload (a delimiter that never parsed) is always
    /// dropped.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if self.state == DecoderState::StreamingText {
            return None;
        }

        let buffered = std::mem::take(&mut self.buffer);
        self.scan_from = 0;
        self.state = DecoderState::StreamingText;

        tracing::debug!(
            bytes = buffered.len(),
            false_positives = self.false_positives,
            policy = ?self.policy,
            "Stream ended before citations resolved"
        );

        let plain_text = self.false_positives == 0 && !buffered.is_empty();
        match self.policy {
            UnresolvedPolicy::FlushAsText if plain_text => Some(StreamEvent::TextDelta(buffered)),
            _ => None,
        }
    }
}

fn find_delimiter(haystack: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(DELIMITER.len())
        .position(|window| window == DELIMITER.as_bytes())
        .map(|offset| from + offset)
}

fn parse_citations(candidate: &str) -> ParseOutcome {
    let Ok(records) = serde_json::from_str::<Vec<serde_json::Value>>(candidate) else {
        return ParseOutcome::Incomplete;
    };

    let total = records.len();
    let citations: Vec<Citation> = records
        .into_iter()
        .filter_map(|record| serde_json::from_value(record).ok())
        .collect();
    if citations.len() < total {
        tracing::debug!(
            dropped = total - citations.len(),
            "Skipped malformed citation records"
        );
    }
    ParseOutcome::Resolved(citations)
}

/// Decode a fragment stream into a lazy stream of events
///
/// Fragments are pulled one at a time, only once the events produced by the
/// previous fragment have been consumed. An upstream failure is yielded as
/// [`ChatError::StreamInterrupted`] and ends the stream.
pub fn decode_stream<S>(fragments: S) -> impl Stream<Item = Result<StreamEvent, ChatError>>
where
    S: Stream<Item = Result<String, StreamFailure>> + Unpin,
{
    decode_stream_with(fragments, StreamDecoder::new())
}

/// [`decode_stream`] with a caller-supplied decoder
pub fn decode_stream_with<S>(
    fragments: S,
    decoder: StreamDecoder,
) -> impl Stream<Item = Result<StreamEvent, ChatError>>
where
    S: Stream<Item = Result<String, StreamFailure>> + Unpin,
{
    struct Pump<S> {
        fragments: S,
        decoder: StreamDecoder,
        pending: VecDeque<StreamEvent>,
        done: bool,
    }

    let pump = Pump {
        fragments,
        decoder,
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(pump, |mut pump| async move {
        loop {
            if let Some(event) = pump.pending.pop_front() {
                return Some((Ok(event), pump));
            }
            if pump.done {
                return None;
            }
            match pump.fragments.next().await {
                Some(Ok(fragment)) => pump.pending.extend(pump.decoder.feed(&fragment)),
                Some(Err(failure)) => {
                    pump.done = true;
                    return Some((Err(ChatError::from(failure)), pump));
                }
                None => {
                    pump.done = true;
                    pump.pending.extend(pump.decoder.finish());
                }
            }
        }
    })
}
