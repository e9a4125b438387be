use std::sync::Arc;

use foundation::bounds::BoundsError;
use foundation::ids::Generation;
use parking_lot::Mutex;
use runtime::generation::GenerationClock;
use scene::display::DisplaySet;
use scene::filters::FilterCriteria;
use scene::lod::QueryMode;
use scene::viewport::Viewport;
use tokio_util::sync::CancellationToken;

use crate::protocol::MapQuery;
use crate::state::DisplayCell;
use crate::transport::{QueryTransport, TransportError};

#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Rejected before any request was sent.
    InvalidViewport(BoundsError),
    Transport {
        generation: Generation,
        error: TransportError,
    },
    /// The session was closed; no new queries are accepted.
    Closed,
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::InvalidViewport(e) => write!(f, "invalid viewport: {e}"),
            QueryError::Transport { generation, error } => {
                write!(f, "query {generation} failed: {error}")
            }
            QueryError::Closed => write!(f, "query session closed"),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueryError::InvalidViewport(e) => Some(e),
            QueryError::Transport { error, .. } => Some(error),
            QueryError::Closed => None,
        }
    }
}

/// How a query that did not fail ended.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// The result is now on display; `set` shares its storage with the
    /// displayed snapshot.
    Applied {
        generation: Generation,
        set: DisplaySet,
    },
    /// The result arrived after a newer one had been applied.
    Superseded(Generation),
    /// A newer query (or shutdown) cancelled this one before it completed.
    Cancelled(Generation),
}

impl QueryOutcome {
    pub fn generation(&self) -> Generation {
        match *self {
            QueryOutcome::Applied { generation, .. }
            | QueryOutcome::Superseded(generation)
            | QueryOutcome::Cancelled(generation) => generation,
        }
    }

    /// The applied result set, if this query's result is on display.
    pub fn applied_set(&self) -> Option<&DisplaySet> {
        match self {
            QueryOutcome::Applied { set, .. } => Some(set),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct QueryStats {
    pub issued: u64,
    pub applied: u64,
    pub superseded: u64,
    pub cancelled: u64,
    pub failed: u64,
}

/// A query that has been assigned a generation but not yet executed.
#[derive(Debug)]
pub struct PendingQuery {
    generation: Generation,
    query: MapQuery,
    cancel: CancellationToken,
}

impl PendingQuery {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn query(&self) -> &MapQuery {
        &self.query
    }
}

#[derive(Debug)]
struct LiveQuery {
    generation: Generation,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct SessionInner {
    clock: GenerationClock,
    live: Option<LiveQuery>,
    closed: bool,
    stats: QueryStats,
}

/// Single-flight query execution with latest-wins application.
///
/// Ordering contract:
/// - Generations are assigned by [`Self::begin`] in call order.
/// - Beginning generation `N` cancels the live query of any older generation.
/// - A result is written to the [`DisplayCell`] only if its query was not
///   cancelled and no equal or newer generation was applied first.
/// - Failures leave the display untouched.
pub struct QuerySessionManager {
    transport: Arc<dyn QueryTransport>,
    display: Arc<DisplayCell>,
    inner: Mutex<SessionInner>,
}

impl QuerySessionManager {
    pub fn new(transport: Arc<dyn QueryTransport>, display: Arc<DisplayCell>) -> Self {
        Self {
            transport,
            display,
            inner: Mutex::new(SessionInner::default()),
        }
    }

    pub fn display(&self) -> &Arc<DisplayCell> {
        &self.display
    }

    pub fn stats(&self) -> QueryStats {
        self.inner.lock().stats
    }

    /// Generation of the query currently in flight, if any.
    pub fn live_generation(&self) -> Option<Generation> {
        self.inner.lock().live.as_ref().map(|l| l.generation)
    }

    /// Validates the viewport, assigns the next generation and cancels the
    /// previous live query. No request is sent until [`Self::execute`].
    pub fn begin(
        &self,
        viewport: &Viewport,
        filters: &FilterCriteria,
        mode: QueryMode,
    ) -> Result<PendingQuery, QueryError> {
        viewport
            .bounds()
            .ensure_area()
            .map_err(QueryError::InvalidViewport)?;

        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(QueryError::Closed);
        }
        let generation = inner.clock.issue();
        let cancel = CancellationToken::new();
        let previous = inner.live.replace(LiveQuery {
            generation,
            cancel: cancel.clone(),
        });
        // Cancelled before the lock is released, so `execute` never sees a
        // superseded query as live.
        if let Some(prev) = &previous {
            prev.cancel.cancel();
        }
        inner.stats.issued += 1;
        drop(inner);

        if let Some(prev) = previous {
            tracing::debug!(cancelled = %prev.generation, by = %generation, "superseding live query");
        }
        tracing::debug!(%generation, mode = mode.as_wire_str(), "query issued");

        Ok(PendingQuery {
            generation,
            query: MapQuery::for_viewport(viewport, filters.clone(), mode),
            cancel,
        })
    }

    /// Sends the query and applies its result if it is still current.
    pub async fn execute(&self, pending: PendingQuery) -> Result<QueryOutcome, QueryError> {
        let PendingQuery {
            generation,
            query,
            cancel,
        } = pending;

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            res = self.transport.fetch(query) => Some(res),
        };

        let mut inner = self.inner.lock();
        if inner.live.as_ref().is_some_and(|l| l.generation == generation) {
            inner.live = None;
        }

        // `begin` and `cancel_live` cancel under this lock, so a query cannot
        // be superseded between this check and the apply.
        let result = match fetched {
            Some(result) if !cancel.is_cancelled() => result,
            _ => {
                inner.stats.cancelled += 1;
                tracing::debug!(%generation, "query cancelled");
                return Ok(QueryOutcome::Cancelled(generation));
            }
        };

        match result {
            Ok(set) => {
                let len = set.len();
                if self.display.apply(generation, set.clone()) {
                    inner.stats.applied += 1;
                    tracing::debug!(%generation, len, "result applied");
                    Ok(QueryOutcome::Applied { generation, set })
                } else {
                    inner.stats.superseded += 1;
                    tracing::debug!(%generation, "result superseded");
                    Ok(QueryOutcome::Superseded(generation))
                }
            }
            Err(error) => {
                inner.stats.failed += 1;
                tracing::warn!(%generation, %error, "query failed, keeping previous results");
                Err(QueryError::Transport { generation, error })
            }
        }
    }

    /// [`Self::begin`] followed by [`Self::execute`]. An applied outcome
    /// carries the result set that is now on display.
    pub async fn run(
        &self,
        viewport: &Viewport,
        filters: &FilterCriteria,
        mode: QueryMode,
    ) -> Result<QueryOutcome, QueryError> {
        let pending = self.begin(viewport, filters, mode)?;
        self.execute(pending).await
    }

    /// Cancels the live query, if any. Returns whether one was cancelled.
    pub fn cancel_live(&self) -> bool {
        Self::cancel_locked(&mut self.inner.lock())
    }

    /// Cancels the live query and refuses further ones.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        Self::cancel_locked(&mut inner);
    }

    fn cancel_locked(inner: &mut SessionInner) -> bool {
        match inner.live.take() {
            Some(live) => {
                live.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::pin;
    use std::sync::Arc;
    use std::task::{Context, Poll, Waker};

    use foundation::bounds::LatLng;
    use foundation::ids::Generation;
    use scene::cluster::ClusterCell;
    use scene::display::DisplaySet;
    use scene::filters::FilterCriteria;
    use scene::lod::QueryMode;
    use scene::viewport::Viewport;

    use parking_lot::Mutex;
    use tracing_subscriber::layer::{Context as LayerContext, Layer, SubscriberExt};

    use super::{QueryError, QueryOutcome, QuerySessionManager};
    use crate::state::DisplayCell;
    use crate::testing::{ImmediateTransport, ManualTransport, drain_tasks};
    use crate::transport::TransportError;

    fn viewport(zoom: i32) -> Viewport {
        Viewport::from_corners(LatLng::new(37.4, 126.8), LatLng::new(37.7, 127.2), zoom).unwrap()
    }

    fn cells(label: &str) -> DisplaySet {
        DisplaySet::clusters(vec![ClusterCell::new(label, 12, LatLng::new(37.5, 127.0))])
    }

    fn session() -> (Arc<QuerySessionManager>, crate::testing::ManualCalls) {
        let (transport, calls) = ManualTransport::new();
        let display = Arc::new(DisplayCell::new());
        (
            Arc::new(QuerySessionManager::new(Arc::new(transport), display)),
            calls,
        )
    }

    #[tokio::test]
    async fn applies_result_and_counts_it() {
        let (session, mut calls) = session();
        let s = Arc::clone(&session);
        let task = tokio::spawn(async move {
            s.run(&viewport(8), &FilterCriteria::new(), QueryMode::Clustered)
                .await
        });

        let call = calls.next().await;
        assert_eq!(call.query.mode, QueryMode::Clustered);
        assert_eq!(call.query.zoom_level, Some(8));
        call.respond(Ok(cells("Gangnam-gu")));

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            QueryOutcome::Applied {
                generation: Generation(1),
                set: cells("Gangnam-gu"),
            }
        );
        let shown = outcome.applied_set().unwrap().as_clusters().unwrap();
        assert_eq!((shown[0].label.as_str(), shown[0].count), ("Gangnam-gu", 12));
        assert_eq!(session.display().snapshot().set(), outcome.applied_set().unwrap());
        assert_eq!(session.display().snapshot().generation(), Some(Generation(1)));
        assert_eq!(session.stats().applied, 1);
        assert_eq!(session.live_generation(), None);
    }

    #[tokio::test]
    async fn newer_query_cancels_older_in_flight() {
        let (session, mut calls) = session();
        let filters = FilterCriteria::new();

        let p1 = session.begin(&viewport(8), &filters, QueryMode::Clustered).unwrap();
        let s = Arc::clone(&session);
        let t1 = tokio::spawn(async move { s.execute(p1).await });
        let c1 = calls.next().await;

        let p2 = session.begin(&viewport(10), &filters, QueryMode::Clustered).unwrap();
        assert_eq!(p2.generation(), Generation(2));
        let s = Arc::clone(&session);
        let t2 = tokio::spawn(async move { s.execute(p2).await });
        let c2 = calls.next().await;

        // The older request is abandoned promptly, not merely ignored later.
        assert_eq!(t1.await.unwrap(), Ok(QueryOutcome::Cancelled(Generation(1))));
        assert!(c1.is_abandoned());

        c2.respond(Ok(cells("newer")));
        assert!(matches!(
            t2.await.unwrap(),
            Ok(QueryOutcome::Applied {
                generation: Generation(2),
                ..
            })
        ));
        c1.respond(Ok(cells("older")));

        let snap = session.display().snapshot();
        assert_eq!(snap.generation(), Some(Generation(2)));
        assert_eq!(snap.set().as_clusters().unwrap()[0].label, "newer");

        let stats = session.stats();
        assert_eq!((stats.issued, stats.applied, stats.cancelled), (2, 1, 1));
        assert_eq!(stats.failed, 0);
    }

    /// Runs a callback from inside `begin`, at the point where the
    /// supersession is logged.
    struct OnSupersede<F>(F);

    impl<S: tracing::Subscriber, F: Fn() + Send + Sync + 'static> Layer<S> for OnSupersede<F> {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: LayerContext<'_, S>) {
            if event.metadata().fields().field("cancelled").is_some() {
                (self.0)();
            }
        }
    }

    #[test]
    fn older_response_ready_during_newer_begin_is_not_applied() {
        let display = Arc::new(DisplayCell::new());
        let transport = ImmediateTransport::new(cells("stale"));
        let session = Arc::new(QuerySessionManager::new(Arc::new(transport), display));
        let filters = FilterCriteria::new();

        let older = session.begin(&viewport(8), &filters, QueryMode::Clustered).unwrap();
        let older = Arc::new(Mutex::new(Some(older)));
        let outcome = Arc::new(Mutex::new(None));

        let hook = {
            let session = Arc::clone(&session);
            let older = Arc::clone(&older);
            let outcome = Arc::clone(&outcome);
            OnSupersede(move || {
                let Some(pending) = older.lock().take() else {
                    return;
                };
                // The transport is ready on first poll, so this runs the
                // older query to completion from within `begin`.
                let mut fut = pin!(session.execute(pending));
                let mut cx = Context::from_waker(Waker::noop());
                if let Poll::Ready(result) = fut.as_mut().poll(&mut cx) {
                    *outcome.lock() = Some(result);
                }
            })
        };

        let newer = tracing::subscriber::with_default(tracing_subscriber::registry().with(hook), || {
            session.begin(&viewport(10), &filters, QueryMode::Clustered)
        })
        .unwrap();

        assert_eq!(newer.generation(), Generation(2));
        assert_eq!(
            outcome.lock().take(),
            Some(Ok(QueryOutcome::Cancelled(Generation(1))))
        );
        assert_eq!(session.display().snapshot().generation(), None);
        let stats = session.stats();
        assert_eq!((stats.applied, stats.cancelled), (0, 1));
    }

    #[tokio::test]
    async fn cancellation_is_silent_and_leaves_display_alone() {
        let (session, mut calls) = session();
        let s = Arc::clone(&session);
        let task = tokio::spawn(async move {
            s.run(&viewport(3), &FilterCriteria::new(), QueryMode::Pointwise)
                .await
        });
        let call = calls.next().await;

        assert!(session.cancel_live());
        assert_eq!(task.await.unwrap(), Ok(QueryOutcome::Cancelled(Generation(1))));
        assert!(call.is_abandoned());
        assert_eq!(session.display().snapshot().generation(), None);
        assert_eq!(session.stats().failed, 0);
        assert!(!session.cancel_live());
    }

    #[tokio::test]
    async fn failure_keeps_previous_results() {
        let (session, mut calls) = session();
        let filters = FilterCriteria::new();

        let s = Arc::clone(&session);
        let f = filters.clone();
        let ok = tokio::spawn(async move { s.run(&viewport(8), &f, QueryMode::Clustered).await });
        calls.next().await.respond(Ok(cells("kept")));
        assert!(matches!(ok.await.unwrap(), Ok(QueryOutcome::Applied { .. })));

        let s = Arc::clone(&session);
        let failing =
            tokio::spawn(async move { s.run(&viewport(9), &filters, QueryMode::Clustered).await });
        let error = TransportError::Status {
            status: 503,
            body: "busy".into(),
        };
        calls.next().await.respond(Err(error.clone()));

        assert_eq!(
            failing.await.unwrap(),
            Err(QueryError::Transport {
                generation: Generation(2),
                error
            })
        );
        let snap = session.display().snapshot();
        assert_eq!(snap.generation(), Some(Generation(1)));
        assert_eq!(snap.set().as_clusters().unwrap()[0].label, "kept");
        assert_eq!(session.stats().failed, 1);
    }

    #[tokio::test]
    async fn degenerate_viewport_is_rejected_before_sending() {
        let (session, mut calls) = session();
        let p = LatLng::new(37.5, 127.0);
        let flat = Viewport::from_corners(p, p, 3).unwrap();

        let err = session
            .run(&flat, &FilterCriteria::new(), QueryMode::Pointwise)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidViewport(_)));

        drain_tasks().await;
        assert!(calls.try_next().is_none());
        assert_eq!(session.stats().issued, 0);
    }

    #[tokio::test]
    async fn closed_session_refuses_new_queries() {
        let (session, _calls) = session();
        session.close();
        assert!(session.is_closed());
        let err = session
            .begin(&viewport(8), &FilterCriteria::new(), QueryMode::Clustered)
            .unwrap_err();
        assert_eq!(err, QueryError::Closed);
    }
}
