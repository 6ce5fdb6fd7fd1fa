//! Fan-out search orchestrator.
//!
//! Each search session runs as a single-writer loop: it owns the task set of
//! in-flight page fetches and the session counters, and is the only place
//! that emits events. Page fetches never fail the session; a failed page is
//! logged and counted as an empty contribution.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, Stream};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;
use vidseek_core::SourceDescriptor;
use vidseek_core::config::SessionConfig;

use crate::errors::FetchError;
use crate::executor::{PageFetcher, PageResult};
use crate::protocol::StreamEvent;
use crate::types::{SearchRequest, ValidatedRequest};

/// Starts streaming search sessions.
#[derive(Clone)]
pub struct SearchOrchestrator {
    fetcher: Arc<dyn PageFetcher>,
    config: SessionConfig,
}

impl SearchOrchestrator {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: SessionConfig) -> Self {
        Self { fetcher, config }
    }

    /// Validates `request` and spawns its session.
    ///
    /// An invalid request yields a single `error` event and a closed
    /// channel; no fetch is started. Dropping the receiver cancels the
    /// session and every fetch it started. Must be called from within a
    /// tokio runtime.
    pub fn start(&self, request: SearchRequest) -> mpsc::Receiver<StreamEvent> {
        let (sender, receiver) = mpsc::channel(self.config.event_buffer.max(1));

        let validated = match request.validate() {
            Ok(validated) => validated,
            Err(e) => {
                tracing::warn!(error = %e, "Rejected search request");
                // Capacity is at least one, so this cannot fail.
                let _ = sender.try_send(StreamEvent::Error {
                    message: e.to_string(),
                });
                return receiver;
            }
        };

        let session = SearchSession::new(validated, self.fetcher.clone(), self.config.clone());
        let span = tracing::info_span!(
            "search_session",
            session = %session.id,
            query = %session.query,
            sources = session.sources.len()
        );
        tokio::spawn(run_session_loop(session, sender).instrument(span));

        receiver
    }

    /// Same as [`start`](Self::start), as a `Stream` of events.
    pub fn stream(&self, request: SearchRequest) -> impl Stream<Item = StreamEvent> + Send + 'static + use<> {
        let receiver = self.start(request);
        futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|event| (event, receiver))
        })
    }
}

/// Outcome of one page task.
#[derive(Debug)]
struct PageSettlement {
    source_index: usize,
    page: u32,
    outcome: Result<PageResult, FetchError>,
}

/// State of one session. Only the session loop touches it.
struct SearchSession {
    id: Uuid,
    query: Arc<str>,
    sources: Vec<Arc<SourceDescriptor>>,
    start_page: u32,
    fetcher: Arc<dyn PageFetcher>,
    config: SessionConfig,
    permits: Option<Arc<Semaphore>>,
    tasks: JoinSet<PageSettlement>,
    /// Source index and page of every task still in `tasks`
    pending: HashMap<Id, (usize, u32)>,
    completed_sources: usize,
    total_videos_found: usize,
    max_page_count: u32,
    pages_fetched: usize,
    pages_failed: usize,
}

impl SearchSession {
    fn new(request: ValidatedRequest, fetcher: Arc<dyn PageFetcher>, config: SessionConfig) -> Self {
        let permits = config
            .max_concurrent_fetches
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));

        Self {
            id: Uuid::new_v4(),
            query: request.query.into(),
            sources: request.sources.into_iter().map(Arc::new).collect(),
            start_page: request.page,
            fetcher,
            config,
            permits,
            tasks: JoinSet::new(),
            pending: HashMap::new(),
            completed_sources: 0,
            total_videos_found: 0,
            max_page_count: 0,
            pages_fetched: 0,
            pages_failed: 0,
        }
    }

    fn total_sources(&self) -> usize {
        self.sources.len()
    }

    fn spawn_page(&mut self, source_index: usize, page: u32) {
        let source = self.sources[source_index].clone();
        let query = self.query.clone();
        let fetcher = self.fetcher.clone();
        let permits = self.permits.clone();

        let handle = self.tasks.spawn(async move {
            let _permit = match permits {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };

            let outcome = AssertUnwindSafe(fetcher.fetch_page(&source, &query, page))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    tracing::error!(source = %source.id, page, "Page task panicked");
                    Err(FetchError::TaskFailed {
                        source_id: source.id.clone(),
                    })
                });

            PageSettlement {
                source_index,
                page,
                outcome,
            }
        });
        self.pending.insert(handle.id(), (source_index, page));
    }

    /// Turns a task that never returned its settlement into a failed page.
    fn recover(&mut self, error: JoinError) -> Option<PageSettlement> {
        let (source_index, page) = self.pending.remove(&error.id())?;
        let source_id = self.sources[source_index].id.clone();
        tracing::warn!(source = %source_id, page, error = %error, "Page task did not finish");
        Some(PageSettlement {
            source_index,
            page,
            outcome: Err(FetchError::TaskFailed { source_id }),
        })
    }

    /// Folds one settlement into the counters and returns the events it
    /// produces: `videos` when the page yielded records, then `progress`.
    fn settle(&mut self, settlement: PageSettlement) -> Vec<StreamEvent> {
        let PageSettlement {
            source_index,
            page,
            outcome,
        } = settlement;
        let source_id = self.sources[source_index].id.clone();

        self.pages_fetched += 1;
        if page == self.start_page {
            self.completed_sources += 1;
        }

        let mut events = Vec::with_capacity(2);
        match outcome {
            Ok(result) => {
                self.max_page_count = self.max_page_count.max(result.page_count);

                if page == self.start_page {
                    let last_page = match self.config.max_pages_per_source {
                        Some(cap) => result.page_count.min(cap),
                        None => result.page_count,
                    };
                    if result.page_count > last_page {
                        tracing::debug!(
                            source = %source_id,
                            reported = result.page_count,
                            fetching_up_to = last_page,
                            "Capping page fan-out"
                        );
                    }
                    for extra in (self.start_page + 1)..=last_page {
                        self.spawn_page(source_index, extra);
                    }
                }

                if !result.videos.is_empty() {
                    self.total_videos_found += result.videos.len();
                    events.push(StreamEvent::Videos {
                        source: source_id,
                        videos: result.videos,
                        completed_sources: self.completed_sources,
                        total_sources: self.total_sources(),
                        latency: result.latency.as_millis() as u64,
                        page,
                    });
                }
            }
            Err(e) => {
                self.pages_failed += 1;
                tracing::warn!(source = %source_id, page, error = %e, "Page contributed nothing");
            }
        }

        events.push(StreamEvent::Progress {
            completed_sources: self.completed_sources,
            total_sources: self.total_sources(),
            total_videos_found: self.total_videos_found,
        });
        events
    }
}

enum LoopStep {
    Settled(PageSettlement),
    Untracked,
    Drained,
    DeadlinePassed,
    Disconnected,
}

async fn run_session_loop(mut session: SearchSession, events: mpsc::Sender<StreamEvent>) {
    let started_at = chrono::Utc::now();
    let total_sources = session.total_sources();
    tracing::info!(started_at = %started_at.to_rfc3339(), "Search session started");

    if events
        .send(StreamEvent::Start { total_sources })
        .await
        .is_err()
    {
        tracing::debug!("Client went away before start");
        return;
    }

    for index in 0..total_sources {
        session.spawn_page(index, session.start_page);
    }

    let deadline = Instant::now() + session.config.session_timeout;

    loop {
        let step = tokio::select! {
            _ = events.closed() => LoopStep::Disconnected,
            joined = tokio::time::timeout_at(deadline, session.tasks.join_next_with_id()) => match joined {
                Ok(Some(Ok((id, settlement)))) => {
                    session.pending.remove(&id);
                    LoopStep::Settled(settlement)
                }
                Ok(Some(Err(e))) => match session.recover(e) {
                    Some(settlement) => LoopStep::Settled(settlement),
                    None => LoopStep::Untracked,
                },
                Ok(None) => LoopStep::Drained,
                Err(_) => LoopStep::DeadlinePassed,
            },
        };

        match step {
            LoopStep::Settled(settlement) => {
                for event in session.settle(settlement) {
                    if events.send(event).await.is_err() {
                        tracing::info!("Client disconnected, cancelling fetches");
                        session.tasks.abort_all();
                        return;
                    }
                }
            }
            LoopStep::Untracked => tracing::error!("Lost a page task that was never tracked"),
            LoopStep::Drained => break,
            LoopStep::DeadlinePassed => {
                tracing::warn!(
                    in_flight = session.tasks.len(),
                    timeout_secs = session.config.session_timeout.as_secs(),
                    "Session deadline passed, completing with partial results"
                );
                session.tasks.abort_all();
                break;
            }
            LoopStep::Disconnected => {
                tracing::info!(
                    in_flight = session.tasks.len(),
                    "Client disconnected, cancelling fetches"
                );
                session.tasks.abort_all();
                return;
            }
        }
    }

    let _ = events
        .send(StreamEvent::Complete {
            total_videos_found: session.total_videos_found,
            total_sources,
            max_page_count: session.max_page_count,
        })
        .await;

    let elapsed = chrono::Utc::now() - started_at;
    tracing::info!(
        videos = session.total_videos_found,
        completed_sources = session.completed_sources,
        pages = session.pages_fetched,
        failed_pages = session.pages_failed,
        elapsed_ms = elapsed.num_milliseconds(),
        "Search session complete"
    );
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::StreamExt;
    use vidseek_core::network::{ScriptedNetworkLayer, ScriptedReply};
    use vidseek_core::{RetryPolicy, RetryStrategy};

    use super::*;
    use crate::executor::SourceExecutor;
    use crate::types::VideoRecord;

    #[derive(Clone)]
    enum Behavior {
        Pages {
            per_page: usize,
            page_count: u32,
            delay: Duration,
        },
        Fail {
            delay: Duration,
        },
        Hang,
        Panic,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct MockFetcher {
        behaviors: HashMap<String, Behavior>,
        calls: Mutex<Vec<(String, u32)>>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        hang_dropped: Arc<AtomicBool>,
    }

    impl MockFetcher {
        fn with(mut self, source: &str, behavior: Behavior) -> Self {
            self.behaviors.insert(source.to_string(), behavior);
            self
        }

        fn calls(&self) -> Vec<(String, u32)> {
            let mut calls = self.calls.lock().unwrap().clone();
            calls.sort();
            calls
        }
    }

    #[async_trait]
    impl PageFetcher for MockFetcher {
        async fn fetch_page(
            &self,
            source: &SourceDescriptor,
            _query: &str,
            page: u32,
        ) -> Result<PageResult, FetchError> {
            self.calls.lock().unwrap().push((source.id.clone(), page));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

            let behavior = self.behaviors.get(&source.id).cloned().unwrap_or(Behavior::Fail {
                delay: Duration::ZERO,
            });
            let result = match behavior {
                Behavior::Pages {
                    per_page,
                    page_count,
                    delay,
                } => {
                    tokio::time::sleep(delay).await;
                    let videos = (0..per_page)
                        .map(|i| VideoRecord::new(format!("{page}-{i}"), "Inception", &source.id))
                        .collect();
                    Ok(PageResult {
                        videos,
                        page_count,
                        latency: delay,
                    })
                }
                Behavior::Fail { delay } => {
                    tokio::time::sleep(delay).await;
                    Err(FetchError::Network {
                        source_id: source.id.clone(),
                        reason: "connection refused".to_string(),
                    })
                }
                Behavior::Hang => {
                    let _flag = DropFlag(self.hang_dropped.clone());
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                Behavior::Panic => panic!("fetcher blew up"),
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn pages(per_page: usize, page_count: u32, delay_ms: u64) -> Behavior {
        Behavior::Pages {
            per_page,
            page_count,
            delay: Duration::from_millis(delay_ms),
        }
    }

    fn sources(ids: &[&str]) -> Vec<SourceDescriptor> {
        ids.iter()
            .map(|id| SourceDescriptor::new(*id, format!("http://{id}.example")))
            .collect()
    }

    fn orchestrator(fetcher: Arc<MockFetcher>, config: SessionConfig) -> SearchOrchestrator {
        SearchOrchestrator::new(fetcher, config)
    }

    async fn run(orchestrator: &SearchOrchestrator, request: SearchRequest) -> Vec<StreamEvent> {
        orchestrator.stream(request).collect().await
    }

    fn progress_counts(events: &[StreamEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::Progress {
                    completed_sources, ..
                } => Some(*completed_sources),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_source_succeeds_other_fails() {
        let fetcher = Arc::new(
            MockFetcher::default()
                .with("a", pages(5, 1, 100))
                .with("b", Behavior::Fail {
                    delay: Duration::from_millis(400),
                }),
        );
        let orchestrator = orchestrator(fetcher, SessionConfig::default());

        let events = run(&orchestrator, SearchRequest::new("Inception", sources(&["a", "b"]))).await;

        assert_eq!(events.len(), 5);
        assert_eq!(events[0], StreamEvent::Start { total_sources: 2 });
        assert!(matches!(
            &events[1],
            StreamEvent::Videos { source, videos, completed_sources: 1, total_sources: 2, latency: 100, page: 1 }
                if source == "a" && videos.len() == 5
        ));
        assert_eq!(
            events[2],
            StreamEvent::Progress {
                completed_sources: 1,
                total_sources: 2,
                total_videos_found: 5
            }
        );
        assert_eq!(
            events[3],
            StreamEvent::Progress {
                completed_sources: 2,
                total_sources: 2,
                total_videos_found: 5
            }
        );
        assert_eq!(
            events[4],
            StreamEvent::Complete {
                total_videos_found: 5,
                total_sources: 2,
                max_page_count: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_extra_pages_fan_out_without_counting_sources() {
        let fetcher = Arc::new(
            MockFetcher::default()
                .with("a", pages(2, 3, 50))
                .with("b", pages(0, 1, 10))
                .with("c", pages(1, 9, 30)),
        );
        let config = SessionConfig {
            max_pages_per_source: Some(4),
            ..SessionConfig::default()
        };
        let orchestrator = orchestrator(fetcher.clone(), config);

        let events = run(&orchestrator, SearchRequest::new("x", sources(&["a", "b", "c"]))).await;

        let counts = progress_counts(&events);
        assert!(counts.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(counts.last(), Some(&3));
        // a: 3 pages, b: 1, c: capped at 4
        assert_eq!(counts.len(), 8);
        assert_eq!(
            fetcher.calls().iter().filter(|(id, _)| id == "c").count(),
            4
        );
        assert_eq!(
            events.last(),
            Some(&StreamEvent::Complete {
                total_videos_found: 2 * 3 + 4,
                total_sources: 3,
                max_page_count: 9
            })
        );
        assert!(
            events
                .iter()
                .filter(|event| matches!(event, StreamEvent::Videos { source, .. } if source == "b"))
                .count()
                == 0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_config_fetches_every_reported_page() {
        let fetcher = Arc::new(MockFetcher::default().with("a", pages(1, 8, 10)));
        let orchestrator = orchestrator(fetcher.clone(), SessionConfig::default());

        let events = run(&orchestrator, SearchRequest::new("x", sources(&["a"]))).await;

        assert_eq!(fetcher.calls().len(), 8);
        assert_eq!(progress_counts(&events), vec![1; 8]);
        assert_eq!(
            events.last(),
            Some(&StreamEvent::Complete {
                total_videos_found: 8,
                total_sources: 1,
                max_page_count: 8
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_page_offsets_fan_out() {
        let fetcher = Arc::new(MockFetcher::default().with("a", pages(1, 3, 10)));
        let orchestrator = orchestrator(fetcher.clone(), SessionConfig::default());

        let events = run(
            &orchestrator,
            SearchRequest::new("x", sources(&["a"])).with_page(2),
        )
        .await;

        assert_eq!(
            fetcher.calls(),
            vec![("a".to_string(), 2), ("a".to_string(), 3)]
        );
        assert_eq!(progress_counts(&events), vec![1, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_request_emits_single_error() {
        let fetcher = Arc::new(MockFetcher::default());
        let orchestrator = orchestrator(fetcher.clone(), SessionConfig::default());

        let events = run(&orchestrator, SearchRequest::new("  ", sources(&["a"]))).await;
        let no_sources = run(&orchestrator, SearchRequest::new("x", vec![])).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Error { message } if message.contains("query")));
        assert!(matches!(no_sources.as_slice(), [StreamEvent::Error { .. }]));
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_fetch_counts_as_failed_page() {
        let fetcher = Arc::new(
            MockFetcher::default()
                .with("a", pages(1, 1, 10))
                .with("boom", Behavior::Panic),
        );
        let orchestrator = orchestrator(fetcher, SessionConfig::default());

        let events = run(&orchestrator, SearchRequest::new("x", sources(&["a", "boom"]))).await;

        assert_eq!(progress_counts(&events).last(), Some(&2));
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Complete {
                total_videos_found: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_start_page_still_counts_its_source() {
        let request = SearchRequest::new("x", sources(&["a"])).validate().unwrap();
        let mut session =
            SearchSession::new(request, Arc::new(MockFetcher::default()), SessionConfig::default());
        let handle = session.tasks.spawn(std::future::pending());
        session.pending.insert(handle.id(), (0, 1));
        handle.abort();

        let error = session.tasks.join_next_with_id().await.unwrap().unwrap_err();
        assert!(error.is_cancelled());
        let settlement = session.recover(error).unwrap();

        assert!(matches!(settlement.outcome, Err(FetchError::TaskFailed { .. })));
        assert_eq!(
            session.settle(settlement),
            vec![StreamEvent::Progress {
                completed_sources: 1,
                total_sources: 1,
                total_videos_found: 0
            }]
        );
        assert!(session.pending.is_empty());
        assert_eq!(session.pages_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_timeout_forces_complete() {
        let fetcher = Arc::new(
            MockFetcher::default()
                .with("a", pages(2, 1, 10))
                .with("stuck", Behavior::Hang),
        );
        let config = SessionConfig {
            session_timeout: Duration::from_secs(2),
            ..SessionConfig::default()
        };
        let orchestrator = orchestrator(fetcher.clone(), config);
        let started = Instant::now();

        let events = run(&orchestrator, SearchRequest::new("x", sources(&["a", "stuck"]))).await;

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(progress_counts(&events), vec![1]);
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Complete {
                total_videos_found: 2,
                total_sources: 2,
                ..
            })
        ));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(fetcher.hang_dropped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_in_flight_fetches() {
        let fetcher = Arc::new(MockFetcher::default().with("stuck", Behavior::Hang));
        let orchestrator = orchestrator(fetcher.clone(), SessionConfig::default());

        let mut receiver = orchestrator.start(SearchRequest::new("x", sources(&["stuck"])));
        assert_eq!(
            receiver.recv().await,
            Some(StreamEvent::Start { total_sources: 1 })
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(receiver);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(fetcher.hang_dropped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit_is_respected() {
        let fetcher = Arc::new(
            MockFetcher::default()
                .with("a", pages(1, 1, 100))
                .with("b", pages(1, 1, 100))
                .with("c", pages(1, 1, 100)),
        );
        let config = SessionConfig {
            max_concurrent_fetches: Some(1),
            ..SessionConfig::default()
        };
        let orchestrator = orchestrator(fetcher.clone(), config);

        let events = run(&orchestrator, SearchRequest::new("x", sources(&["a", "b", "c"]))).await;

        assert_eq!(fetcher.peak_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(progress_counts(&events).last(), Some(&3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_source_is_isolated_within_retry_budget() {
        let layer = Arc::new(ScriptedNetworkLayer::new());
        for id in ["s1", "s2", "s4", "s5"] {
            layer.script(
                format!("{id}.example"),
                vec![ScriptedReply::json(
                    r#"{"code":1,"pagecount":1,"list":[{"vod_id":1,"vod_name":"Inception"}]}"#,
                )
                .after(Duration::from_millis(200))],
            );
        }
        layer.script("s3.example", vec![ScriptedReply::Hang]);
        let policy = RetryPolicy {
            attempt_timeout: Duration::from_secs(8),
            max_retries: 1,
            strategy: RetryStrategy::FixedDelay {
                delay: Duration::from_millis(500),
            },
        };
        let budget = policy.worst_case_duration();
        let orchestrator = SearchOrchestrator::new(
            Arc::new(SourceExecutor::new(layer.clone(), policy)),
            SessionConfig::default(),
        );
        let started = Instant::now();

        let events = run(
            &orchestrator,
            SearchRequest::new("Inception", sources(&["s1", "s2", "s3", "s4", "s5"])),
        )
        .await;

        let delivered: Vec<&str> = events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::Videos { source, .. } => Some(source.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(delivered.len(), 4);
        assert!(!delivered.contains(&"s3"));
        assert_eq!(progress_counts(&events).last(), Some(&5));
        assert!(matches!(events.last(), Some(StreamEvent::Complete { .. })));
        assert!(started.elapsed() <= budget + Duration::from_millis(100));
        assert_eq!(layer.request_count("s3.example"), 2);
    }
}
