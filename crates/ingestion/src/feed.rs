//! Inbound event feeds.
//!
//! A feed delivers envelopes of one source in arrival order, at least once.
//! Duplicates and replays below the durable cursor are the pipeline's
//! problem, not the feed's.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use events::{OrderingKey, RawEnvelope, SourceId};
use futures_core::Stream;
use futures_util::{FutureExt, StreamExt};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

/// Errors raised by a feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Reading from the transport failed.
    #[error("Feed I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be read as an envelope at all.
    #[error("Undecodable record at line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The transport is temporarily unavailable.
    #[error("Feed unavailable: {0}")]
    Unavailable(String),
}

impl FeedError {
    /// Returns true if pulling again may succeed.
    ///
    /// A record that does not decode, or bytes that are not UTF-8, fail the
    /// same way on every pull.
    pub fn is_transient(&self) -> bool {
        match self {
            FeedError::Io(err) => err.kind() != std::io::ErrorKind::InvalidData,
            FeedError::Decode { .. } => false,
            FeedError::Unavailable(_) => true,
        }
    }
}

/// An ordered, at-least-once source of raw envelopes.
#[async_trait]
pub trait EventFeed: Send {
    /// The source this feed reads.
    fn source_id(&self) -> &SourceId;

    /// Pulls up to `max` envelopes.
    ///
    /// `after` is the last durably committed position; a feed may use it to
    /// resume. `Ok(None)` means the feed is exhausted; `Ok(Some(vec![]))`
    /// means nothing is available yet.
    async fn next_batch(
        &mut self,
        after: Option<OrderingKey>,
        max: usize,
    ) -> Result<Option<Vec<RawEnvelope>>, FeedError>;
}

/// In-memory feed over a fixed list of envelopes.
///
/// Delivers the list in order, duplicates and all. On the first pull,
/// envelopes at or below `after` are skipped.
#[derive(Debug, Clone)]
pub struct VecFeed {
    source_id: SourceId,
    pending: VecDeque<RawEnvelope>,
    resumed: bool,
    failures: usize,
}

impl VecFeed {
    pub fn new(source_id: impl Into<SourceId>, envelopes: Vec<RawEnvelope>) -> Self {
        Self {
            source_id: source_id.into(),
            pending: envelopes.into(),
            resumed: false,
            failures: 0,
        }
    }

    /// Makes the next `count` pulls fail with `Unavailable`.
    pub fn with_failures(mut self, count: usize) -> Self {
        self.failures = count;
        self
    }

    /// Envelopes not yet delivered.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl EventFeed for VecFeed {
    fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    async fn next_batch(
        &mut self,
        after: Option<OrderingKey>,
        max: usize,
    ) -> Result<Option<Vec<RawEnvelope>>, FeedError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(FeedError::Unavailable("injected feed failure".to_string()));
        }
        if !self.resumed {
            self.resumed = true;
            if let Some(after) = after {
                self.pending.retain(|raw| raw.ordering_key() > after);
            }
        }
        if self.pending.is_empty() {
            return Ok(None);
        }
        let take = max.min(self.pending.len());
        Ok(Some(self.pending.drain(..take).collect()))
    }
}

/// Feed over a file holding one JSON envelope per line.
///
/// Blank lines are ignored. A line that is not an envelope is not consumed:
/// the pull returns what came before it, and the next pull fails with
/// [`FeedError::Decode`]. A read error after some lines were taken is
/// likewise held for the next pull.
pub struct NdjsonFeed {
    source_id: SourceId,
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    held: Option<(usize, String)>,
    held_error: Option<std::io::Error>,
    resume_after: Option<Option<OrderingKey>>,
}

impl NdjsonFeed {
    /// Opens the file at `path`.
    pub async fn open(
        source_id: impl Into<SourceId>,
        path: impl AsRef<Path>,
    ) -> Result<Self, FeedError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;
        Ok(Self {
            source_id: source_id.into(),
            path,
            lines: BufReader::new(file).lines(),
            line_no: 0,
            held: None,
            held_error: None,
            resume_after: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn next_line(&mut self) -> Result<Option<(usize, String)>, FeedError> {
        if let Some(held) = self.held.take() {
            return Ok(Some(held));
        }
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            if !line.trim().is_empty() {
                return Ok(Some((self.line_no, line)));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl EventFeed for NdjsonFeed {
    fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    async fn next_batch(
        &mut self,
        after: Option<OrderingKey>,
        max: usize,
    ) -> Result<Option<Vec<RawEnvelope>>, FeedError> {
        if let Some(err) = self.held_error.take() {
            return Err(err.into());
        }
        let resume_after = *self.resume_after.get_or_insert(after);

        let mut batch = Vec::new();
        while batch.len() < max {
            let (line_no, line) = match self.next_line().await {
                Ok(Some(next)) => next,
                Ok(None) => break,
                Err(FeedError::Io(err)) if !batch.is_empty() => {
                    self.held_error = Some(err);
                    break;
                }
                Err(err) => return Err(err),
            };
            let raw: RawEnvelope = match serde_json::from_str(&line) {
                Ok(raw) => raw,
                Err(source) => {
                    self.held = Some((line_no, line));
                    if !batch.is_empty() {
                        break;
                    }
                    return Err(FeedError::Decode {
                        line: line_no,
                        source,
                    });
                }
            };
            if let Some(after) = resume_after
                && raw.ordering_key() <= after
            {
                continue;
            }
            batch.push(raw);
        }

        Ok((!batch.is_empty()).then_some(batch))
    }
}

/// Feed over an async stream, e.g. a channel fed by a chain subscription.
///
/// A pull waits for the first envelope, then takes whatever else is
/// immediately ready, up to `max`. An error behind ready envelopes is held
/// and returned by the next pull.
pub struct StreamFeed {
    source_id: SourceId,
    stream: Pin<Box<dyn Stream<Item = Result<RawEnvelope, FeedError>> + Send>>,
    held_error: Option<FeedError>,
    ended: bool,
}

impl StreamFeed {
    pub fn new<S>(source_id: impl Into<SourceId>, stream: S) -> Self
    where
        S: Stream<Item = Result<RawEnvelope, FeedError>> + Send + 'static,
    {
        Self {
            source_id: source_id.into(),
            stream: Box::pin(stream),
            held_error: None,
            ended: false,
        }
    }
}

#[async_trait]
impl EventFeed for StreamFeed {
    fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    async fn next_batch(
        &mut self,
        _after: Option<OrderingKey>,
        max: usize,
    ) -> Result<Option<Vec<RawEnvelope>>, FeedError> {
        if let Some(err) = self.held_error.take() {
            return Err(err);
        }
        if self.ended {
            return Ok(None);
        }
        let Some(first) = self.stream.next().await else {
            self.ended = true;
            return Ok(None);
        };

        let mut batch = vec![first?];
        while batch.len() < max {
            match self.stream.next().now_or_never() {
                Some(Some(Ok(item))) => batch.push(item),
                Some(Some(Err(err))) => {
                    self.held_error = Some(err);
                    break;
                }
                Some(None) => {
                    self.ended = true;
                    break;
                }
                None => break,
            }
        }
        Ok(Some(batch))
    }
}
