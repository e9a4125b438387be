use std::sync::Arc;
use std::time::Duration;

use foundation::bounds::BoundsError;
use foundation::ids::Generation;
use parking_lot::Mutex;
use scene::cluster::ClusterCell;
use scene::display::{DisplaySnapshot, SelectionError};
use scene::filters::FilterCriteria;
use scene::lod::LodPolicy;
use scene::viewport::Viewport;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::debounce::DebounceScheduler;
use crate::session::{QueryError, QueryOutcome, QuerySessionManager, QueryStats};
use crate::state::DisplayCell;
use crate::transport::{QueryTransport, TransportError};

pub use scene::lod::DrillDownError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Quiet window before a burst of viewport changes is queried.
    pub debounce_ms: u64,
    pub lod: LodPolicy,
    /// Events buffered for the owner before new ones are dropped.
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            lod: LodPolicy::default(),
            event_capacity: 64,
        }
    }
}

impl PipelineConfig {
    pub fn quiet(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Notifications for whoever owns the pipeline. Cancelled and superseded
/// queries produce no event.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Applied {
        generation: Generation,
    },
    /// The refresh failed; the previous results are still displayed.
    RefreshFailed {
        generation: Generation,
        error: TransportError,
    },
    /// The settled viewport could not be queried.
    Rejected {
        error: BoundsError,
    },
}

#[derive(Debug, Default)]
struct PipelineState {
    viewport: Option<Viewport>,
    filters: FilterCriteria,
}

struct Shared {
    lod: LodPolicy,
    session: QuerySessionManager,
    state: Mutex<PipelineState>,
    events: mpsc::Sender<PipelineEvent>,
}

impl Shared {
    /// Never waits on the owner: when the buffer is full the event is
    /// dropped, the display itself is already up to date.
    fn emit(&self, event: PipelineEvent) {
        match self.events.try_send(event) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(?event, "pipeline event buffer full, dropping event");
            }
        }
    }

    /// Runs on the debounce task once a burst has settled.
    fn settle(self: &Arc<Self>, viewport: Viewport) {
        let filters = self.state.lock().filters.clone();
        let mode = self.lod.select_mode(viewport.zoom_level());

        let pending = match self.session.begin(&viewport, &filters, mode) {
            Ok(pending) => pending,
            Err(QueryError::InvalidViewport(error)) => {
                tracing::warn!(%error, "settled viewport rejected");
                self.emit(PipelineEvent::Rejected { error });
                return;
            }
            Err(_) => return,
        };

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let event = match shared.session.execute(pending).await {
                Ok(QueryOutcome::Applied { generation, .. }) => {
                    PipelineEvent::Applied { generation }
                }
                Ok(_) => return,
                Err(QueryError::Transport { generation, error }) => {
                    PipelineEvent::RefreshFailed { generation, error }
                }
                Err(_) => return,
            };
            shared.emit(event);
        });
    }
}

/// One map view's viewport pipeline: debounce, mode selection, query, apply.
///
/// Every write to the displayed data goes through a single [`DisplayCell`];
/// rendering code reads it via [`Self::snapshot`] or [`Self::subscribe`].
pub struct ViewportPipeline {
    shared: Arc<Shared>,
    scheduler: DebounceScheduler<Viewport>,
}

impl ViewportPipeline {
    /// Starts the pipeline. Must be called from within a tokio runtime.
    ///
    /// The receiver holds at most `config.event_capacity` undelivered events;
    /// an owner that stops reading misses later events but never stalls the
    /// pipeline.
    pub fn spawn(
        config: PipelineConfig,
        transport: Arc<dyn QueryTransport>,
    ) -> (Self, mpsc::Receiver<PipelineEvent>) {
        let (events, events_rx) = mpsc::channel(config.event_capacity.max(1));
        let display = Arc::new(DisplayCell::new());
        let shared = Arc::new(Shared {
            lod: config.lod,
            session: QuerySessionManager::new(transport, display),
            state: Mutex::new(PipelineState::default()),
            events,
        });

        let settle_target = Arc::clone(&shared);
        let scheduler = DebounceScheduler::spawn(config.quiet(), move |viewport| {
            settle_target.settle(viewport)
        });

        (Self { shared, scheduler }, events_rx)
    }

    /// Reports a viewport change from the rendering surface.
    pub fn notify_viewport(&self, viewport: Viewport) {
        self.shared.state.lock().viewport = Some(viewport);
        self.scheduler.notify(viewport);
    }

    /// Replaces the filter criteria. Schedules a requery and returns `true`
    /// only if the criteria changed.
    pub fn set_filters(&self, filters: FilterCriteria) -> bool {
        let viewport = {
            let mut state = self.shared.state.lock();
            if state.filters == filters {
                return false;
            }
            state.filters = filters;
            state.viewport
        };
        if let Some(viewport) = viewport {
            self.scheduler.notify(viewport);
        }
        true
    }

    /// Opens a displayed record for detail display, or clears the selection.
    pub fn select_record(&self, id: Option<&str>) -> Result<(), SelectionError> {
        self.shared.session.display().select(id)
    }

    /// Zooms into `cell` and feeds the resulting viewport back through the
    /// pipeline like any other viewport change.
    pub fn drill_down(&self, cell: &ClusterCell) -> Result<Viewport, DrillDownError> {
        let current = self
            .current_viewport()
            .ok_or(DrillDownError::NoViewport)?;
        let next = self.shared.lod.drill_down(&current, cell)?;
        tracing::debug!(
            cell = %cell.label,
            from = current.zoom_level(),
            to = next.zoom_level(),
            "drill-down"
        );
        self.notify_viewport(next);
        Ok(next)
    }

    /// Latest viewport reported, settled or not.
    pub fn current_viewport(&self) -> Option<Viewport> {
        self.shared.state.lock().viewport
    }

    pub fn filters(&self) -> FilterCriteria {
        self.shared.state.lock().filters.clone()
    }

    pub fn snapshot(&self) -> Arc<DisplaySnapshot> {
        self.shared.session.display().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<DisplaySnapshot>> {
        self.shared.session.display().subscribe()
    }

    pub fn stats(&self) -> QueryStats {
        self.shared.session.stats()
    }

    /// Cancels the pending debounce timer and the live query. The displayed
    /// data stays readable; further notifications are ignored.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        self.shared.session.close();
    }
}

impl Drop for ViewportPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use foundation::bounds::LatLng;
    use foundation::ids::Generation;
    use scene::cluster::ClusterCell;
    use scene::display::DisplaySet;
    use scene::filters::FilterCriteria;
    use scene::lod::QueryMode;
    use scene::point::PointRecord;
    use scene::viewport::Viewport;
    use tokio::sync::mpsc;

    use super::{DrillDownError, PipelineConfig, PipelineEvent, ViewportPipeline};
    use crate::testing::{ManualCalls, ManualTransport, drain_tasks};
    use crate::transport::TransportError;

    const QUIET: Duration = Duration::from_millis(300);

    fn viewport(lat: f64, zoom: i32) -> Viewport {
        Viewport::from_corners(
            LatLng::new(lat, 126.8),
            LatLng::new(lat + 0.3, 127.2),
            zoom,
        )
        .unwrap()
    }

    fn pipeline() -> (ViewportPipeline, mpsc::Receiver<PipelineEvent>, ManualCalls) {
        pipeline_with(PipelineConfig::default())
    }

    fn pipeline_with(
        config: PipelineConfig,
    ) -> (ViewportPipeline, mpsc::Receiver<PipelineEvent>, ManualCalls) {
        let (transport, calls) = ManualTransport::new();
        let (p, events) = ViewportPipeline::spawn(config, Arc::new(transport));
        (p, events, calls)
    }

    fn points(ids: &[&str]) -> DisplaySet {
        DisplaySet::points(
            ids.iter()
                .map(|id| PointRecord::new(*id, LatLng::new(37.5, 127.0)))
                .collect(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn viewport_burst_issues_one_query_for_last_viewport() {
        let (p, mut events, mut calls) = pipeline();

        for i in 0..4 {
            p.notify_viewport(viewport(37.0 + f64::from(i) * 0.01, 4));
            tokio::time::sleep(Duration::from_millis(120)).await;
        }
        assert!(calls.try_next().is_none());

        let call = calls.next().await;
        assert_eq!(call.query.mode, QueryMode::Pointwise);
        let bounds = call.query.bounds.unwrap();
        assert!((bounds.south_west().lat - 37.03).abs() < 1e-9);

        call.respond(Ok(points(&["a", "b"])));
        assert_eq!(
            events.recv().await,
            Some(PipelineEvent::Applied {
                generation: Generation(1)
            })
        );

        tokio::time::sleep(QUIET * 3).await;
        assert!(calls.try_next().is_none());
        assert_eq!(p.stats().issued, 1);
        assert_eq!(p.snapshot().set().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zoom_selects_query_mode() {
        let (p, _events, mut calls) = pipeline();

        p.notify_viewport(viewport(37.4, 8));
        let call = calls.next().await;
        assert_eq!(call.query.mode, QueryMode::Clustered);
        assert_eq!(call.query.zoom_level, Some(8));
        assert_eq!(call.query.bounds, None);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_older_response_never_overwrites_newer() {
        let (p, mut events, mut calls) = pipeline();

        p.notify_viewport(viewport(37.4, 8));
        let first = calls.next().await;

        p.notify_viewport(viewport(37.4, 10));
        let second = calls.next().await;
        drain_tasks().await;
        assert!(first.is_abandoned());

        second.respond(Ok(DisplaySet::clusters(vec![ClusterCell::new(
            "Seoul",
            130,
            LatLng::new(37.55, 126.99),
        )])));
        first.respond(Ok(DisplaySet::clusters(vec![])));

        assert_eq!(
            events.recv().await,
            Some(PipelineEvent::Applied {
                generation: Generation(2)
            })
        );
        drain_tasks().await;

        let snap = p.snapshot();
        assert_eq!(snap.generation(), Some(Generation(2)));
        assert_eq!(snap.set().as_clusters().unwrap()[0].label, "Seoul");

        let stats = p.stats();
        assert_eq!((stats.cancelled, stats.failed), (1, 0));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn drill_down_reenters_pipeline_with_fresh_query() {
        let (p, mut events, mut calls) = pipeline();

        assert_eq!(
            p.drill_down(&ClusterCell::new("x", 1, LatLng::new(37.5, 127.0))),
            Err(DrillDownError::NoViewport)
        );

        p.notify_viewport(
            Viewport::from_corners(LatLng::new(37.0, 126.0), LatLng::new(38.0, 128.0), 8).unwrap(),
        );
        let gangnam = ClusterCell::new("Gangnam-gu", 40, LatLng::new(37.50, 127.03));
        calls
            .next()
            .await
            .respond(Ok(DisplaySet::clusters(vec![gangnam.clone()])));
        events.recv().await;

        let next = p.drill_down(&gangnam).unwrap();
        assert!(next.zoom_level() < 8);
        assert!((next.center().lat - 37.50).abs() < 1e-9);
        assert!((next.center().lng - 127.03).abs() < 1e-9);
        assert_eq!(p.current_viewport(), Some(next));

        let call = calls.next().await;
        assert_eq!(call.query.mode, QueryMode::Pointwise);
        assert_eq!(call.query.bounds, Some(next.bounds()));
        call.respond(Ok(points(&["g-1"])));

        assert_eq!(
            events.recv().await,
            Some(PipelineEvent::Applied {
                generation: Generation(2)
            })
        );
        assert_eq!(p.stats().cancelled, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drill_down_at_finest_level_is_refused() {
        let (p, mut events, mut calls) = pipeline();

        let finest =
            Viewport::from_corners(LatLng::new(37.49, 127.02), LatLng::new(37.51, 127.04), 1)
                .unwrap();
        p.notify_viewport(finest);
        calls.next().await.respond(Ok(points(&["a"])));
        events.recv().await;

        let cell = ClusterCell::new("Yeoksam-dong", 2, LatLng::new(37.50, 127.03));
        assert_eq!(
            p.drill_down(&cell),
            Err(DrillDownError::AtFinestLevel { level: 1 })
        );
        assert_eq!(p.current_viewport(), Some(finest));

        tokio::time::sleep(QUIET * 3).await;
        assert!(calls.try_next().is_none());
        assert_eq!(p.stats().issued, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unread_events_are_bounded_and_display_still_advances() {
        let (p, mut events, mut calls) = pipeline_with(PipelineConfig {
            event_capacity: 1,
            ..PipelineConfig::default()
        });

        p.notify_viewport(viewport(37.4, 3));
        calls.next().await.respond(Ok(points(&["a"])));
        drain_tasks().await;

        p.notify_viewport(viewport(37.5, 3));
        calls.next().await.respond(Ok(points(&["b"])));
        drain_tasks().await;

        assert_eq!(p.stats().applied, 2);
        assert_eq!(p.snapshot().generation(), Some(Generation(2)));
        assert_eq!(
            events.recv().await,
            Some(PipelineEvent::Applied {
                generation: Generation(1)
            })
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn applying_results_clears_selection() {
        let (p, mut events, mut calls) = pipeline();

        p.notify_viewport(viewport(37.4, 3));
        calls.next().await.respond(Ok(points(&["a", "b"])));
        events.recv().await;

        p.select_record(Some("a")).unwrap();
        assert_eq!(p.snapshot().selection().selected_id(), Some("a"));
        assert!(p.select_record(Some("missing")).is_err());

        p.notify_viewport(viewport(37.41, 3));
        calls.next().await.respond(Ok(points(&["c"])));
        events.recv().await;

        assert!(p.snapshot().selection().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_reported_and_display_kept() {
        let (p, mut events, mut calls) = pipeline();

        p.notify_viewport(viewport(37.4, 3));
        calls.next().await.respond(Ok(points(&["a"])));
        events.recv().await;

        p.notify_viewport(viewport(37.5, 3));
        calls
            .next()
            .await
            .respond(Err(TransportError::Network("connection reset".into())));

        assert!(matches!(
            events.recv().await,
            Some(PipelineEvent::RefreshFailed {
                generation: Generation(2),
                ..
            })
        ));
        let snap = p.snapshot();
        assert_eq!(snap.generation(), Some(Generation(1)));
        assert!(snap.set().contains_record("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn degenerate_viewport_is_rejected_without_request() {
        let (p, mut events, mut calls) = pipeline();
        let at = LatLng::new(37.5, 127.0);

        p.notify_viewport(Viewport::from_corners(at, at, 3).unwrap());
        assert!(matches!(
            events.recv().await,
            Some(PipelineEvent::Rejected { .. })
        ));
        drain_tasks().await;
        assert!(calls.try_next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn changed_filters_requery_and_equal_filters_do_not() {
        let (p, mut events, mut calls) = pipeline();

        // No viewport yet: the criteria are stored for the first query.
        assert!(p.set_filters(FilterCriteria::new().with("category", "cafe")));
        p.notify_viewport(viewport(37.4, 8));
        let call = calls.next().await;
        assert_eq!(call.query.filters.get("category"), Some("cafe"));
        call.respond(Ok(DisplaySet::clusters(vec![])));
        events.recv().await;

        assert!(!p.set_filters(FilterCriteria::new().with("category", "cafe")));
        tokio::time::sleep(QUIET * 3).await;
        assert!(calls.try_next().is_none());

        assert!(p.set_filters(FilterCriteria::new().with("category", "bakery")));
        let call = calls.next().await;
        assert_eq!(call.query.filters.get("category"), Some("bakery"));
        assert_eq!(call.query.zoom_level, Some(8));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_timer_and_live_query() {
        let (p, _events, mut calls) = pipeline();

        p.notify_viewport(viewport(37.4, 8));
        let live = calls.next().await;

        p.notify_viewport(viewport(37.5, 8));
        p.shutdown();
        drain_tasks().await;
        assert!(live.is_abandoned());

        tokio::time::sleep(QUIET * 3).await;
        assert!(calls.try_next().is_none());
        assert_eq!(p.snapshot().generation(), None);
        assert_eq!(p.stats().failed, 0);
    }
}
