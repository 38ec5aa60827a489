//! Hedge dispatcher.
//!
//! # Responsibilities
//! - Launch N identical attempts per inbound request, each on its own task
//! - Resolve to one attempt according to the configured [`RacePolicy`]
//! - Detach or abort the attempts that lost
//!
//! # Design Decisions
//! - `FirstSettled` (default) resolves on the first attempt to finish,
//!   success or failure. A fast failure wins over a slow success.
//! - `FirstSuccess` keeps waiting past failures and only fails once every
//!   attempt has failed.
//! - Losers are detached by default and run to natural completion.
//!   `cancel_losers` aborts them as soon as a winner is chosen, or when the
//!   caller drops the race before it resolves.
//! - Attempts share one `Arc<UpstreamRequest>`; nothing mutable is shared.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use tokio::task::{JoinError, JoinHandle};

use crate::config::{HedgeConfig, RacePolicy};
use crate::hedge::attempt::{AttemptExecutor, AttemptResult};
use crate::hedge::error::{AttemptFailure, HedgeError, TransportError};
use crate::hedge::upstream::{CorrelationId, UpstreamRequest};
use crate::observability::metrics;

type AttemptOutput = Result<AttemptResult, TransportError>;

/// A spawned attempt tagged with its index.
///
/// With `abort_on_drop` set the task dies with its handle, so losers are
/// cancelled both when a winner is picked and when the caller goes away
/// mid-race. Otherwise dropping the handle detaches the task.
struct InFlight {
    attempt: usize,
    handle: JoinHandle<AttemptOutput>,
    abort_on_drop: bool,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.abort_on_drop {
            self.handle.abort();
        }
    }
}

impl Future for InFlight {
    type Output = (usize, Result<AttemptOutput, JoinError>);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let attempt = this.attempt;
        Pin::new(&mut this.handle).poll(cx).map(|joined| (attempt, joined))
    }
}

/// Races N attempts of one upstream request.
#[derive(Clone)]
pub struct HedgeDispatcher {
    executor: Arc<dyn AttemptExecutor>,
    count: usize,
    policy: RacePolicy,
    cancel_losers: bool,
    attempt_timeout: Option<Duration>,
}

impl HedgeDispatcher {
    pub fn new(executor: Arc<dyn AttemptExecutor>, config: &HedgeConfig) -> Self {
        Self {
            executor,
            count: config.count.max(1),
            policy: config.race_policy,
            cancel_losers: config.cancel_losers,
            attempt_timeout: config.attempt_timeout(),
        }
    }

    pub fn hedge_count(&self) -> usize {
        self.count
    }

    pub fn policy(&self) -> RacePolicy {
        self.policy
    }

    /// Fire all attempts and wait for the race to resolve.
    pub async fn dispatch(&self, request: UpstreamRequest) -> Result<AttemptResult, HedgeError> {
        let start = Instant::now();
        let request = Arc::new(request);
        let id = request.id;

        let mut in_flight: FuturesUnordered<InFlight> = (0..self.count)
            .map(|attempt| InFlight {
                attempt,
                handle: tokio::spawn(self.spawn_attempt(request.clone(), attempt)),
                abort_on_drop: self.cancel_losers,
            })
            .collect();

        let mut failures = Vec::new();
        while let Some((attempt, joined)) = in_flight.next().await {
            let settled = joined.unwrap_or_else(|e| {
                Err(TransportError {
                    id,
                    attempt,
                    elapsed: start.elapsed(),
                    source: AttemptFailure::Task(e.to_string()),
                })
            });

            match settled {
                Ok(result) => {
                    self.release_losers(id, in_flight);
                    tracing::info!(
                        id = %id,
                        winner = result.attempt,
                        time_taken_ms = start.elapsed().as_millis() as u64,
                        is_streaming = request.stream,
                        url = %request.url,
                        "Request race finished"
                    );
                    metrics::record_race("success", start);
                    return Ok(result);
                }
                Err(e) if self.policy == RacePolicy::FirstSettled => {
                    self.release_losers(id, in_flight);
                    tracing::info!(
                        id = %id,
                        winner = e.attempt,
                        time_taken_ms = start.elapsed().as_millis() as u64,
                        is_streaming = request.stream,
                        url = %request.url,
                        "Request race settled on a failure"
                    );
                    metrics::record_race("failure", start);
                    return Err(HedgeError::Transport(e));
                }
                Err(e) => failures.push(e),
            }
        }

        tracing::info!(
            id = %id,
            failures = failures.len(),
            time_taken_ms = start.elapsed().as_millis() as u64,
            url = %request.url,
            "Request race exhausted"
        );
        metrics::record_race("failure", start);
        Err(HedgeError::Exhausted(failures))
    }

    fn spawn_attempt(
        &self,
        request: Arc<UpstreamRequest>,
        attempt: usize,
    ) -> impl Future<Output = AttemptOutput> + Send + 'static {
        let id = request.id;
        let timeout = self.attempt_timeout;
        let fut = self.executor.execute(request, attempt);

        async move {
            let Some(limit) = timeout else {
                return fut.await;
            };
            match tokio::time::timeout(limit, fut).await {
                Ok(output) => output,
                Err(_) => {
                    tracing::error!(id = %id, attempt, timeout_ms = limit.as_millis() as u64, "Attempt timed out");
                    metrics::record_attempt("timeout");
                    Err(TransportError {
                        id,
                        attempt,
                        elapsed: limit,
                        source: AttemptFailure::TimedOut(limit),
                    })
                }
            }
        }
    }

    fn release_losers(&self, id: CorrelationId, losers: FuturesUnordered<InFlight>) {
        if losers.is_empty() {
            return;
        }
        if self.cancel_losers {
            tracing::debug!(id = %id, cancelled = losers.len(), "Cancelled losing attempts");
        } else {
            tracing::debug!(id = %id, detached = losers.len(), "Detached losing attempts");
        }
        drop(losers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hedge::attempt::AttemptBody;
    use axum::http::{HeaderMap, Method, StatusCode};
    use bytes::Bytes;
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Attempt `i` sleeps `plan[i].0` ms then succeeds if `plan[i].1`.
    struct Scripted {
        plan: Vec<(u64, bool)>,
        completed: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<Arc<UpstreamRequest>>>>,
    }

    impl Scripted {
        fn new(plan: &[(u64, bool)]) -> Self {
            Self {
                plan: plan.to_vec(),
                completed: Arc::new(AtomicUsize::new(0)),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl AttemptExecutor for Scripted {
        fn execute(
            &self,
            request: Arc<UpstreamRequest>,
            attempt: usize,
        ) -> BoxFuture<'static, Result<AttemptResult, TransportError>> {
            let (delay, ok) = self.plan[attempt];
            let completed = self.completed.clone();
            self.seen.lock().unwrap().push(request.clone());

            async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                completed.fetch_add(1, Ordering::SeqCst);
                if ok {
                    Ok(AttemptResult {
                        id: request.id,
                        attempt,
                        status: StatusCode::OK,
                        headers: HeaderMap::new(),
                        fetch_time: Duration::from_millis(delay),
                        body: AttemptBody::Buffered {
                            bytes: Bytes::from(format!("attempt-{}", attempt)),
                            total_time: Duration::from_millis(delay),
                        },
                    })
                } else {
                    Err(TransportError {
                        id: request.id,
                        attempt,
                        elapsed: Duration::from_millis(delay),
                        source: AttemptFailure::Task("connection reset".into()),
                    })
                }
            }
            .boxed()
        }
    }

    fn request() -> UpstreamRequest {
        UpstreamRequest {
            id: CorrelationId::new(),
            method: Method::POST,
            url: "http://upstream.test/v1/messages".into(),
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"{}"),
            stream: false,
        }
    }

    fn dispatcher(executor: Arc<Scripted>, count: usize, policy: RacePolicy) -> HedgeDispatcher {
        let config = HedgeConfig {
            count,
            race_policy: policy,
            ..HedgeConfig::default()
        };
        HedgeDispatcher::new(executor, &config)
    }

    #[tokio::test]
    async fn latency_tracks_fastest_attempt() {
        let exec = Arc::new(Scripted::new(&[(300, true), (100, true), (500, false)]));
        let d = dispatcher(exec.clone(), 3, RacePolicy::FirstSettled);

        let start = Instant::now();
        let result = d.dispatch(request()).await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(result.attempt, 1);
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(250), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn attempts_share_one_request() {
        let exec = Arc::new(Scripted::new(&[(10, true), (10, true), (10, true)]));
        let req = request();
        let id = req.id;
        dispatcher(exec.clone(), 3, RacePolicy::FirstSettled)
            .dispatch(req)
            .await
            .unwrap();

        let seen = exec.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|r| Arc::ptr_eq(r, &seen[0]) && r.id == id));
    }

    #[tokio::test]
    async fn success_before_failures_wins() {
        let exec = Arc::new(Scripted::new(&[(150, false), (30, true), (200, false)]));
        let result = dispatcher(exec, 3, RacePolicy::FirstSettled)
            .dispatch(request())
            .await
            .unwrap();
        assert_eq!(result.attempt, 1);
    }

    #[tokio::test]
    async fn first_settled_surfaces_fast_failure() {
        let exec = Arc::new(Scripted::new(&[(20, false), (150, true)]));
        let err = dispatcher(exec, 2, RacePolicy::FirstSettled)
            .dispatch(request())
            .await
            .unwrap_err();

        match err {
            HedgeError::Transport(e) => assert_eq!(e.attempt, 0),
            other => panic!("expected first-settled failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn first_success_waits_past_failures() {
        let exec = Arc::new(Scripted::new(&[(20, false), (150, true)]));
        let result = dispatcher(exec, 2, RacePolicy::FirstSuccess)
            .dispatch(request())
            .await
            .unwrap();
        assert_eq!(result.attempt, 1);
    }

    #[tokio::test]
    async fn all_failures_first_settled() {
        let exec = Arc::new(Scripted::new(&[(60, false), (20, false), (40, false)]));
        let err = dispatcher(exec, 3, RacePolicy::FirstSettled)
            .dispatch(request())
            .await
            .unwrap_err();
        assert_eq!(err.failures().len(), 1);
        assert_eq!(err.failures()[0].attempt, 1);
    }

    #[tokio::test]
    async fn all_failures_first_success_exhausts() {
        let exec = Arc::new(Scripted::new(&[(60, false), (20, false), (40, false)]));
        let err = dispatcher(exec.clone(), 3, RacePolicy::FirstSuccess)
            .dispatch(request())
            .await
            .unwrap_err();

        match err {
            HedgeError::Exhausted(failures) => {
                let order: Vec<_> = failures.iter().map(|f| f.attempt).collect();
                assert_eq!(order, vec![1, 2, 0]);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(exec.completed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn losers_detached_by_default() {
        let exec = Arc::new(Scripted::new(&[(10, true), (100, true)]));
        dispatcher(exec.clone(), 2, RacePolicy::FirstSettled)
            .dispatch(request())
            .await
            .unwrap();
        assert_eq!(exec.completed.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(exec.completed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn losers_cancelled_when_configured() {
        let exec = Arc::new(Scripted::new(&[(10, true), (100, true)]));
        let config = HedgeConfig {
            count: 2,
            cancel_losers: true,
            ..HedgeConfig::default()
        };
        HedgeDispatcher::new(exec.clone(), &config)
            .dispatch(request())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(exec.completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abandoned_race_cancels_attempts_when_configured() {
        let exec = Arc::new(Scripted::new(&[(100, true), (150, true)]));
        let config = HedgeConfig {
            count: 2,
            cancel_losers: true,
            ..HedgeConfig::default()
        };
        let d = HedgeDispatcher::new(exec.clone(), &config);

        // caller disconnects before any attempt settles
        let abandoned = tokio::time::timeout(Duration::from_millis(30), d.dispatch(request())).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(exec.seen.lock().unwrap().len(), 2);
        assert_eq!(exec.completed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn abandoned_race_detaches_attempts_by_default() {
        let exec = Arc::new(Scripted::new(&[(100, true), (150, true)]));
        let d = dispatcher(exec.clone(), 2, RacePolicy::FirstSettled);

        let abandoned = tokio::time::timeout(Duration::from_millis(30), d.dispatch(request())).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(exec.completed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn attempt_timeout_settles_as_failure() {
        let exec = Arc::new(Scripted::new(&[(500, true)]));
        let config = HedgeConfig {
            count: 1,
            attempt_timeout_ms: Some(50),
            ..HedgeConfig::default()
        };
        let err = HedgeDispatcher::new(exec, &config)
            .dispatch(request())
            .await
            .unwrap_err();

        let failures = err.failures();
        assert!(matches!(failures[0].source, AttemptFailure::TimedOut(d) if d == Duration::from_millis(50)));
    }

    #[test]
    fn zero_count_is_clamped() {
        let exec = Arc::new(Scripted::new(&[(1, true)]));
        assert_eq!(dispatcher(exec, 0, RacePolicy::FirstSettled).hedge_count(), 1);
    }
}
