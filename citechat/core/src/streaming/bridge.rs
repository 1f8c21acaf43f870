//! Push-to-Pull Fragment Bridge
//!
//! The transport delivers text whenever the network does; the timeline driver
//! wants to pull one fragment at a time. The bridge sits between them:
//!
//! ```text
//!   producer ──push()──► [ slot: 1 ] ──poll_next()──► consumer
//!       ▲                                                │
//!       └──────────── CancellationToken ◄── drop/cancel ─┘
//! ```
//!
//! - At most one fragment waits ahead of the consumer; `push` suspends until
//!   the slot frees up. Producers that pull from a source use `reserve` so
//!   the next fragment is only read once the slot is free.
//! - Dropping the sink ends the stream; `fail` ends it with an error.
//! - Dropping or cancelling the [`FragmentStream`] trips the token, so the
//!   producer stops and releases whatever it was reading from.

use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::utf8::Utf8Decoder;
use crate::error::{Cancelled, StreamFailure};

type Slot = Result<String, StreamFailure>;

/// Create a connected sink/stream pair with a single-fragment buffer
#[must_use]
pub fn channel() -> (FragmentSink, FragmentStream) {
    let (tx, rx) = mpsc::channel(1);
    let token = CancellationToken::new();
    (
        FragmentSink {
            tx,
            token: token.clone(),
        },
        FragmentStream {
            rx,
            token,
            finished: false,
        },
    )
}

/// Producer half of the bridge
#[derive(Debug)]
pub struct FragmentSink {
    tx: mpsc::Sender<Slot>,
    token: CancellationToken,
}

impl FragmentSink {
    /// Deliver a fragment, waiting while the previous one is unconsumed
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] once the consumer has cancelled or gone away.
    pub async fn push(&self, fragment: impl Into<String>) -> Result<(), Cancelled> {
        let fragment = fragment.into();
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Cancelled),
            sent = self.tx.send(Ok(fragment)) => sent.map_err(|_| Cancelled),
        }
    }

    /// End the stream with an error
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if nobody is listening any more.
    pub async fn fail(self, reason: impl Into<String>) -> Result<(), Cancelled> {
        let failure = StreamFailure::new(reason);
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Cancelled),
            sent = self.tx.send(Err(failure)) => sent.map_err(|_| Cancelled),
        }
    }

    /// Wait for the slot to free up, without committing a fragment yet
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] once the consumer has cancelled or gone away.
    pub async fn reserve(&self) -> Result<FragmentPermit<'_>, Cancelled> {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Cancelled),
            permit = self.tx.reserve() => permit
                .map(|permit| FragmentPermit { permit })
                .map_err(|_| Cancelled),
        }
    }

    /// Resolves when the consumer cancels or drops its stream
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Whether the consumer has cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A reserved slot in the bridge; dropping it gives the slot back
#[derive(Debug)]
pub struct FragmentPermit<'a> {
    permit: mpsc::Permit<'a, Slot>,
}

impl FragmentPermit<'_> {
    /// Fill the slot with a fragment
    pub fn send(self, fragment: impl Into<String>) {
        self.permit.send(Ok(fragment.into()));
    }

    /// Fill the slot with a terminal error
    pub fn fail(self, reason: impl Into<String>) {
        self.permit.send(Err(StreamFailure::new(reason)));
    }
}

/// Consumer half of the bridge, pulled as a `Stream` of text fragments
#[derive(Debug)]
pub struct FragmentStream {
    rx: mpsc::Receiver<Slot>,
    token: CancellationToken,
    finished: bool,
}

impl FragmentStream {
    /// Read a raw byte stream in a background task, decoding UTF-8 across
    /// chunk boundaries
    ///
    /// The task stops reading (and drops `source`) as soon as this stream is
    /// cancelled or dropped.
    pub fn from_bytes<S, B, E>(source: S) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Display + Send + 'static,
    {
        let (sink, stream) = channel();
        tokio::spawn(pump_bytes(source, sink));
        stream
    }

    /// Stop consuming and tell the producer to release its source
    pub fn cancel(&mut self) {
        self.token.cancel();
        self.rx.close();
        self.finished = true;
    }

    /// Whether this stream has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Stream for FragmentStream {
    type Item = Slot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Err(failure))) => {
                this.finished = true;
                Poll::Ready(Some(Err(failure)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl Drop for FragmentStream {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn pump_bytes<S, B, E>(source: S, sink: FragmentSink)
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut source = Box::pin(source);
    let mut utf8 = Utf8Decoder::new();

    loop {
        // The source is only read once the previous fragment has left the slot
        let Ok(permit) = sink.reserve().await else {
            tracing::debug!("Fragment consumer cancelled, releasing byte source");
            return;
        };

        let next = tokio::select! {
            biased;
            () = sink.cancelled() => {
                tracing::debug!("Fragment consumer cancelled, releasing byte source");
                return;
            }
            next = source.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                let text = utf8.decode(bytes.as_ref());
                if !text.is_empty() {
                    permit.send(text);
                }
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Byte source failed mid-stream");
                permit.fail(e.to_string());
                return;
            }
            None => {
                if let Some(tail) = utf8.finish() {
                    permit.send(tail);
                }
                return;
            }
        }
    }
}
