//! Client-side stream consumer.
//!
//! Pulls byte chunks from a search stream, decodes events across arbitrary
//! chunk boundaries and folds them into a [`ResultSet`]. After every applied
//! event the caller gets a plain [`SearchView`] snapshot. An idle watchdog
//! declares the session done if the server goes quiet.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::time::Instant;
use vidseek_core::config::ConsumerConfig;

use crate::protocol::{SseDecoder, StreamEvent, parse_event};
use crate::ranking::{ResultSet, ScoredVideo, SortOrder};

/// Why the consumer stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionReason {
    /// Server sent `complete`
    Complete,
    /// Transport closed without `complete`
    StreamClosed,
    /// Nothing arrived within the watchdog window
    Watchdog,
    /// Server sent `error`
    ServerError(String),
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionReason::Complete => write!(f, "complete"),
            CompletionReason::StreamClosed => write!(f, "stream closed"),
            CompletionReason::Watchdog => write!(f, "stalled"),
            CompletionReason::ServerError(message) => write!(f, "server error: {message}"),
        }
    }
}

/// Snapshot of a search as the user sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchView {
    /// Ranked, filtered records
    pub videos: Vec<ScoredVideo>,
    /// Latency per source in milliseconds
    pub latencies: BTreeMap<String, u64>,
    pub loading: bool,
    pub completed: bool,
    pub total_sources: usize,
    pub completed_sources: usize,
    /// Count reported by the server, before client-side filtering
    pub total_videos_found: usize,
    pub completion: Option<CompletionReason>,
}

/// Incremental consumer of one search stream.
pub struct StreamConsumer<S> {
    body: Option<S>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    results: ResultSet,
    order: SortOrder,
    watchdog: Duration,
    deadline: Instant,
    total_sources: usize,
    completed_sources: usize,
    total_videos_found: usize,
    completion: Option<CompletionReason>,
    terminal_reported: bool,
}

impl<S, E> StreamConsumer<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: fmt::Display,
{
    /// Wraps a byte stream. The watchdog starts counting immediately.
    pub fn new(body: S, query: &str, config: &ConsumerConfig) -> Self {
        Self {
            body: Some(body),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            results: ResultSet::new(query, config.min_similarity),
            order: SortOrder::default(),
            watchdog: config.watchdog,
            deadline: Instant::now() + config.watchdog,
            total_sources: 0,
            completed_sources: 0,
            total_videos_found: 0,
            completion: None,
            terminal_reported: false,
        }
    }

    pub fn with_sort_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Waits for the next applied event and returns the updated view.
    ///
    /// The view carrying the terminal state is returned exactly once;
    /// afterwards this returns `None` and no more I/O happens.
    pub async fn next_view(&mut self) -> Option<SearchView> {
        loop {
            if self.completion.is_some() {
                if self.terminal_reported {
                    return None;
                }
                self.terminal_reported = true;
                return Some(self.view());
            }

            if let Some(payload) = self.pending.pop_front() {
                match parse_event(&payload) {
                    Ok(event) => {
                        self.deadline = Instant::now() + self.watchdog;
                        self.apply(event);
                        if self.completion.is_some() {
                            self.terminal_reported = true;
                        }
                        return Some(self.view());
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, payload = %payload, "Skipping malformed event");
                        continue;
                    }
                }
            }

            let Some(body) = self.body.as_mut() else {
                self.finish(CompletionReason::StreamClosed);
                continue;
            };

            match tokio::time::timeout_at(self.deadline, body.next()).await {
                Ok(Some(Ok(chunk))) => {
                    let frames = self.decoder.push(&chunk);
                    self.pending.extend(frames);
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!(error = %e, "Search stream failed");
                    self.finish(CompletionReason::StreamClosed);
                }
                Ok(None) => {
                    self.body = None;
                    self.pending.extend(self.decoder.finish());
                }
                Err(_) => {
                    tracing::warn!(
                        watchdog_ms = self.watchdog.as_millis() as u64,
                        "No events within watchdog window, giving up on stream"
                    );
                    self.finish(CompletionReason::Watchdog);
                }
            }
        }
    }

    /// Drives the stream to its end, calling `on_view` for every view.
    pub async fn run_to_end<F>(&mut self, mut on_view: F) -> SearchView
    where
        F: FnMut(&SearchView),
    {
        while let Some(view) = self.next_view().await {
            on_view(&view);
        }
        self.view()
    }

    /// Current snapshot.
    pub fn view(&self) -> SearchView {
        SearchView {
            videos: self.results.view(self.order),
            latencies: self.results.latencies().clone(),
            loading: self.completion.is_none(),
            completed: self.completion.is_some(),
            total_sources: self.total_sources,
            completed_sources: self.completed_sources,
            total_videos_found: self.total_videos_found,
            completion: self.completion.clone(),
        }
    }

    /// Accumulated results, including the recorded event log.
    pub fn results(&self) -> &ResultSet {
        &self.results
    }

    pub fn completion(&self) -> Option<&CompletionReason> {
        self.completion.as_ref()
    }

    fn apply(&mut self, event: StreamEvent) {
        self.results.apply(&event);

        match event {
            StreamEvent::Start { total_sources } => self.total_sources = total_sources,
            StreamEvent::Videos {
                completed_sources,
                total_sources,
                ..
            } => {
                self.total_sources = total_sources;
                self.completed_sources = self.completed_sources.max(completed_sources);
            }
            StreamEvent::Progress {
                completed_sources,
                total_sources,
                total_videos_found,
            } => {
                self.total_sources = total_sources;
                self.completed_sources = self.completed_sources.max(completed_sources);
                self.total_videos_found = total_videos_found;
            }
            StreamEvent::Complete {
                total_videos_found,
                total_sources,
                ..
            } => {
                self.total_sources = total_sources;
                self.total_videos_found = total_videos_found;
                self.finish(CompletionReason::Complete);
            }
            StreamEvent::Error { message } => {
                self.finish(CompletionReason::ServerError(message));
            }
        }
    }

    fn finish(&mut self, reason: CompletionReason) {
        if self.completion.is_none() {
            tracing::debug!(reason = %reason, videos = self.results.len(), "Search stream finished");
            self.completion = Some(reason);
        }
        self.body = None;
        self.pending.clear();
    }
}
