//! Streaming chat completions.
//!
//! A spawned reader task owns the HTTP response, turns `data:` lines into
//! [`CompletionChunk`]s and forwards them through a bounded channel. [`ChunkStream`]
//! is the consumer side: a plain [`futures::Stream`] that can be cancelled at any
//! point with a [`CancellationToken`].

use crate::accumulate::ChunkAccumulator;
use crate::completion::{Completion, CompletionChunk};
use crate::error::{Error, Result, extract_error_message, status_message};
use crate::http::{LineStream, data_payload};
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, trace};

/// Chunks buffered between the reader task and the consumer.
const CHANNEL_CAPACITY: usize = 100;

const DONE_SENTINEL: &str = "[DONE]";

/// How a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    AwaitingHeader,
    Streaming,
    Terminated(Termination),
}

/// Outcome of one line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    /// Comment, keep-alive, non-data field, or anything after termination.
    Skip,
    Chunk(CompletionChunk),
    Done,
}

/// Line-level state machine for a chat completion event stream.
#[derive(Debug)]
pub struct ChunkParser {
    state: StreamState,
}

impl Default for ChunkParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkParser {
    pub fn new() -> Self {
        Self {
            state: StreamState::AwaitingHeader,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.state, StreamState::Terminated(_))
    }

    /// Validate the response status before any line is read.
    pub fn on_header(&mut self, status: StatusCode) -> Result<()> {
        if status.is_success() {
            self.state = StreamState::Streaming;
            return Ok(());
        }

        self.state = StreamState::Terminated(Termination::Failed);
        Err(Error::Server {
            status: status.as_u16(),
            message: status_message(status, b""),
        })
    }

    pub fn on_line(&mut self, line: &str) -> Result<LineEvent> {
        match self.state {
            StreamState::Terminated(_) => return Ok(LineEvent::Skip),
            StreamState::AwaitingHeader => self.state = StreamState::Streaming,
            StreamState::Streaming => {}
        }

        let Some(payload) = data_payload(line) else {
            if !line.is_empty() {
                trace!(line, "Skipping non-data line");
            }
            return Ok(LineEvent::Skip);
        };

        let payload = payload.trim();
        if payload == DONE_SENTINEL {
            self.state = StreamState::Terminated(Termination::Completed);
            return Ok(LineEvent::Done);
        }

        match serde_json::from_str::<CompletionChunk>(payload) {
            Ok(chunk) => Ok(LineEvent::Chunk(chunk)),
            Err(e) => {
                self.state = StreamState::Terminated(Termination::Failed);
                let message = extract_error_message(payload.as_bytes())
                    .unwrap_or_else(|| format!("Invalid chunk: {e}"));
                Err(Error::Stream(message))
            }
        }
    }

    /// End of body. A stream that stops without `[DONE]` still counts as completed.
    pub fn on_end(&mut self) {
        if !self.is_terminated() {
            self.state = StreamState::Terminated(Termination::Completed);
        }
    }

    pub fn fail(&mut self) {
        self.state = StreamState::Terminated(Termination::Failed);
    }
}

/// A cancellable sequence of completion chunks.
///
/// The request starts as soon as the stream is created; chunks are pulled on demand.
/// After cancellation the next poll yields `Err(Error::Cancelled)` once, then `None`.
/// Dropping the stream cancels it and releases the connection.
pub struct ChunkStream {
    rx: mpsc::Receiver<Result<CompletionChunk>>,
    token: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    task: JoinHandle<()>,
    finished: bool,
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("cancelled", &self.token.is_cancelled())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl ChunkStream {
    /// Spawn the reader task over a pending line source.
    ///
    /// `token` is linked as a parent: cancelling it cancels the stream, while cancelling
    /// or dropping the stream leaves the caller's token untouched.
    pub(crate) fn spawn<F>(open: F, token: &CancellationToken) -> Self
    where
        F: Future<Output = Result<LineStream>> + Send + 'static,
    {
        let token = token.child_token();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(read_chunks(open, tx, token.clone()));

        Self {
            rx,
            cancelled: Box::pin(token.clone().cancelled_owned()),
            token,
            task,
            finished: false,
        }
    }

    /// A stream that yields a single error. Used when the request cannot even be built.
    pub(crate) fn failed(error: Error, token: &CancellationToken) -> Self {
        Self::spawn(async move { Err::<LineStream, _>(error) }, token)
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token that cancels this stream.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Drive the stream to its end and merge every chunk into one completion.
    pub async fn collect_completion(mut self) -> Result<Completion> {
        let mut acc = ChunkAccumulator::new();
        while let Some(chunk) = self.next().await {
            acc.push(&chunk?);
        }
        Ok(acc.finish())
    }
}

impl Stream for ChunkStream {
    type Item = Result<CompletionChunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        // Cancellation beats any chunk already queued.
        if this.cancelled.as_mut().poll(cx).is_ready() {
            this.finished = true;
            this.rx.close();
            return Poll::Ready(Some(Err(Error::Cancelled)));
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(item)) => {
                if item.is_err() {
                    this.finished = true;
                }
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        self.token.cancel();
        self.task.abort();
    }
}

/// Send one item unless the stream is cancelled first. Returns false if the reader
/// should stop.
async fn deliver(
    tx: &mpsc::Sender<Result<CompletionChunk>>,
    item: Result<CompletionChunk>,
    token: &CancellationToken,
) -> bool {
    tokio::select! {
        () = token.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

async fn read_chunks<F>(open: F, tx: mpsc::Sender<Result<CompletionChunk>>, token: CancellationToken)
where
    F: Future<Output = Result<LineStream>> + Send,
{
    let mut parser = ChunkParser::new();

    let opened = tokio::select! {
        () = token.cancelled() => {
            debug!("Stream cancelled before response");
            return;
        }
        opened = open => opened,
    };

    let mut lines = match opened {
        Ok(lines) => lines,
        Err(e) => {
            parser.fail();
            debug!(error = %e, "Stream request failed");
            deliver(&tx, Err(e), &token).await;
            return;
        }
    };

    if let Err(e) = parser.on_header(lines.status()) {
        deliver(&tx, Err(e), &token).await;
        return;
    }

    let mut chunks = 0usize;
    loop {
        let next = tokio::select! {
            () = token.cancelled() => {
                debug!(chunks, "Stream cancelled");
                return;
            }
            next = lines.next_line() => next,
        };

        let line = match next {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                parser.fail();
                debug!(chunks, error = %e, "Stream transport failed");
                deliver(&tx, Err(e), &token).await;
                return;
            }
            None => {
                parser.on_end();
                debug!(chunks, "Stream ended without [DONE]");
                return;
            }
        };

        match parser.on_line(&line) {
            Ok(LineEvent::Skip) => {}
            Ok(LineEvent::Chunk(chunk)) => {
                chunks += 1;
                if !deliver(&tx, Ok(chunk), &token).await {
                    return;
                }
            }
            Ok(LineEvent::Done) => {
                debug!(chunks, "Stream completed");
                return;
            }
            Err(e) => {
                debug!(chunks, error = %e, "Stream aborted on malformed chunk");
                deliver(&tx, Err(e), &token).await;
                return;
            }
        }
    }
}
