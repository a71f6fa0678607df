//! Blocking range reads over partially downloaded torrents.
//!
//! Every read walks `Idle -> Translating -> AwaitingPieces -> Assembling ->
//! Done`, or ends in `Failed` on a bad range, a stall, a cancellation, or a
//! store error. The only suspension point is the wait for missing pieces; it
//! is bounded by the caller's timeout and aborted promptly by cancellation.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::priority::{BoostLedger, ReadaheadPlan};
use super::traits::{AvailabilityTracker, PieceStore, PieceWait, StoreError};
use crate::config::StreamingConfig;
use crate::layout::TorrentFile;
use crate::torrent::PieceIndex;
use crate::translate::{PieceSpan, RangeError, translate};

/// Terminal failure of a stream read.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Requested range is invalid for the file.
    #[error("Invalid read range: {0}")]
    Range(#[from] RangeError),

    /// Required pieces did not arrive within the timeout.
    #[error("Stream stalled after {timeout:?}: {} pieces still missing", missing.len())]
    StreamStalled {
        /// Pieces that were still unavailable when the wait gave up.
        missing: Vec<PieceIndex>,
        timeout: Duration,
    },

    /// Caller aborted the wait.
    #[error("Read cancelled")]
    Cancelled,

    /// Piece store failed to return bytes for an available piece.
    #[error("Piece store read failed: {0}")]
    Store(#[from] StoreError),
}

impl StreamError {
    /// Only stalls are worth retrying with a fresh request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StreamError::StreamStalled { .. })
    }

    /// Cancellation is an expected termination rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }
}

/// Position of one read in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReadState {
    Idle,
    Translating,
    AwaitingPieces,
    Assembling,
    Done,
    Failed,
}

/// Counters across every read of one [`StreamReader`].
#[derive(Debug, Default)]
struct ReaderCounters {
    reads_started: AtomicU64,
    reads_completed: AtomicU64,
    bytes_served: AtomicU64,
    range_errors: AtomicU64,
    stalls: AtomicU64,
    cancellations: AtomicU64,
    store_failures: AtomicU64,
}

/// Point-in-time copy of reader counters.
///
/// Cancellations are tracked apart from failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamReaderStats {
    pub reads_started: u64,
    pub reads_completed: u64,
    pub bytes_served: u64,
    pub range_errors: u64,
    pub stalls: u64,
    pub cancellations: u64,
    pub store_failures: u64,
}

impl StreamReaderStats {
    pub fn failures(&self) -> u64 {
        self.range_errors + self.stalls + self.store_failures
    }
}

/// One byte-range read against a file.
#[derive(Debug, Clone)]
pub struct ReadRequest<'a> {
    pub file: &'a TorrentFile,
    pub piece_length: u32,
    /// File-relative byte range, end exclusive.
    pub range: Range<u64>,
    pub timeout: Duration,
}

/// Serves byte ranges of torrent files, blocking until pieces are present.
///
/// Holds no layout state: every call names its file and piece length. Any
/// number of reads may run at once against the same reader.
pub struct StreamReader {
    tracker: Arc<dyn AvailabilityTracker>,
    store: Arc<dyn PieceStore>,
    ledger: Arc<BoostLedger>,
    readahead_pieces: u32,
    counters: ReaderCounters,
}

impl StreamReader {
    /// Creates a reader with its own boost ledger over `tracker`.
    ///
    /// Use [`StreamReader::with_ledger`] when another reader already talks to
    /// the same tracker.
    pub fn new(
        tracker: Arc<dyn AvailabilityTracker>,
        store: Arc<dyn PieceStore>,
        config: &StreamingConfig,
    ) -> Self {
        Self::with_ledger(Arc::new(BoostLedger::new(tracker)), store, config)
    }

    /// Creates a reader sharing `ledger`, and its tracker, with other readers.
    pub fn with_ledger(
        ledger: Arc<BoostLedger>,
        store: Arc<dyn PieceStore>,
        config: &StreamingConfig,
    ) -> Self {
        Self {
            tracker: Arc::clone(ledger.tracker()),
            ledger,
            store,
            readahead_pieces: config.readahead_pieces,
            counters: ReaderCounters::default(),
        }
    }

    /// Overrides the readahead window size.
    pub fn with_readahead(mut self, pieces: u32) -> Self {
        self.readahead_pieces = pieces;
        self
    }

    /// Starts a read without running it, exposing its state machine.
    pub fn session<'a>(&'a self, request: ReadRequest<'a>) -> ReadSession<'a> {
        ReadSession {
            reader: self,
            request,
            state: ReadState::Idle,
            transitions: vec![ReadState::Idle],
        }
    }

    /// Reads `range` of `file`, waiting up to `timeout` for missing pieces.
    ///
    /// # Errors
    ///
    /// - `StreamError::Range` - If the range is empty or past the file end
    /// - `StreamError::StreamStalled` - If pieces are still missing at timeout
    /// - `StreamError::Cancelled` - If `cancel` fires during the wait
    /// - `StreamError::Store` - If the piece store fails
    pub async fn read(
        &self,
        file: &TorrentFile,
        piece_length: u32,
        range: Range<u64>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Bytes, StreamError> {
        self.session(ReadRequest {
            file,
            piece_length,
            range,
            timeout,
        })
        .execute(cancel)
        .await
    }

    pub fn stats(&self) -> StreamReaderStats {
        let counters = &self.counters;
        StreamReaderStats {
            reads_started: counters.reads_started.load(Ordering::Relaxed),
            reads_completed: counters.reads_completed.load(Ordering::Relaxed),
            bytes_served: counters.bytes_served.load(Ordering::Relaxed),
            range_errors: counters.range_errors.load(Ordering::Relaxed),
            stalls: counters.stalls.load(Ordering::Relaxed),
            cancellations: counters.cancellations.load(Ordering::Relaxed),
            store_failures: counters.store_failures.load(Ordering::Relaxed),
        }
    }

    /// Shared boost registry, for inspecting live priority boosts.
    pub fn boost_ledger(&self) -> &Arc<BoostLedger> {
        &self.ledger
    }

    pub fn readahead_pieces(&self) -> u32 {
        self.readahead_pieces
    }
}

/// State machine of a single read.
pub struct ReadSession<'a> {
    reader: &'a StreamReader,
    request: ReadRequest<'a>,
    state: ReadState,
    transitions: Vec<ReadState>,
}

impl ReadSession<'_> {
    pub fn state(&self) -> ReadState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn transitions(&self) -> &[ReadState] {
        &self.transitions
    }

    /// Runs the read to `Done` or `Failed`.
    ///
    /// # Errors
    ///
    /// Same as [`StreamReader::read`].
    pub async fn execute(&mut self, cancel: &CancellationToken) -> Result<Bytes, StreamError> {
        let reader = self.reader;
        reader.counters.reads_started.fetch_add(1, Ordering::Relaxed);

        self.enter(ReadState::Translating);
        let file = self.request.file;
        let span = match translate(
            file,
            self.request.piece_length,
            self.request.range.start,
            self.request.range.end,
        ) {
            Ok(span) => span,
            Err(error) => return Err(self.fail(error.into())),
        };

        self.enter(ReadState::AwaitingPieces);
        let plan = ReadaheadPlan::for_span(
            &span,
            reader.readahead_pieces,
            file.piece_end(),
            |piece| reader.tracker.has_piece(piece),
        );
        let blocking: Vec<PieceIndex> = plan.blocking_pieces().collect();
        {
            let _boosts = reader.ledger.acquire(&plan);
            if !blocking.is_empty() {
                debug!(
                    file = file.index(),
                    missing = blocking.len(),
                    "Waiting for pieces"
                );
                if let Err(error) = self.await_pieces(&blocking, cancel).await {
                    return Err(self.fail(error));
                }
            }
        }

        self.enter(ReadState::Assembling);
        let data = match self.assemble(&span).await {
            Ok(data) => data,
            Err(error) => return Err(self.fail(error.into())),
        };

        self.enter(ReadState::Done);
        reader
            .counters
            .reads_completed
            .fetch_add(1, Ordering::Relaxed);
        reader
            .counters
            .bytes_served
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(data)
    }

    async fn await_pieces(
        &self,
        blocking: &[PieceIndex],
        cancel: &CancellationToken,
    ) -> Result<(), StreamError> {
        let tracker = &self.reader.tracker;
        let timeout = self.request.timeout;
        let waits = join_all(
            blocking
                .iter()
                .map(|&piece| tracker.wait_for_piece(piece, timeout)),
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StreamError::Cancelled),
            outcomes = waits => {
                let missing: Vec<PieceIndex> = blocking
                    .iter()
                    .zip(outcomes)
                    .filter(|(_, outcome)| *outcome == PieceWait::TimedOut)
                    .map(|(&piece, _)| piece)
                    .collect();
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(StreamError::StreamStalled { missing, timeout })
                }
            }
        }
    }

    async fn assemble(&self, span: &PieceSpan) -> Result<Bytes, StoreError> {
        let piece_length = self.request.piece_length;
        let mut chunks: Vec<Bytes> = Vec::with_capacity(span.len() as usize);

        for piece in span.pieces() {
            let Some((offset, length)) = span.piece_slice(piece, piece_length) else {
                continue;
            };
            let chunk = self
                .reader
                .store
                .read_piece_bytes(piece, offset, length)
                .await?;
            if chunk.len() != length as usize {
                return Err(StoreError::ShortRead {
                    piece,
                    expected: length,
                    actual: chunk.len(),
                });
            }
            chunks.push(chunk);
        }

        if let [chunk] = chunks.as_slice() {
            return Ok(chunk.clone());
        }
        // Sized from the bytes the store returned.
        let mut assembled = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
        for chunk in &chunks {
            assembled.extend_from_slice(chunk);
        }
        Ok(assembled.freeze())
    }

    fn enter(&mut self, state: ReadState) {
        tracing::trace!(from = ?self.state, to = ?state, "Read state transition");
        self.state = state;
        self.transitions.push(state);
    }

    fn fail(&mut self, error: StreamError) -> StreamError {
        let counters = &self.reader.counters;
        let counter = match &error {
            StreamError::Range(_) => &counters.range_errors,
            StreamError::StreamStalled { .. } => &counters.stalls,
            StreamError::Cancelled => &counters.cancellations,
            StreamError::Store(_) => &counters.store_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        debug!(
            file = self.request.file.index(),
            start = self.request.range.start,
            end = self.request.range.end,
            from = ?self.state,
            %error,
            "Stream read failed"
        );
        self.enter(ReadState::Failed);
        error
    }
}
