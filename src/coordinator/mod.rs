//! Render Coordinator: evaluation broadcast and dynamic row dispatch.
//!
//! The coordinator owns the worker pool. Because workers share no memory,
//! every evaluation is broadcast to all of them so each holds its own copy
//! of the scene. A render then runs one driver thread per worker; each
//! driver claims the next unclaimed row from the session, asks its worker
//! for the colors and publishes the line:
//!
//! ```text
//!  render(dims)
//!     │ SceneLoaded
//!     ▼
//!  ┌──────────────┐   claim_row()   ┌────────────┐  compute(row)  ┌──────────┐
//!  │ RenderSession│ ◀────────────── │ driver 0..n│ ─────────────▶ │ worker i │
//!  │ next_row     │                 └─────┬──────┘                └──────────┘
//!  │ cancelled    │                       │ LineComputed
//!  └──────────────┘                       ▼
//!                                    EventBus ──▶ SceneRendered when all drivers exit
//! ```

mod events;
mod session;

pub use events::{EventBus, EventKinds, RenderEvent, SubscriptionId};
pub use session::RenderSession;

use crate::engine::{EngineFactory, OutputSink};
use crate::error::{Error, Result};
use crate::worker::{
    EvalOutcome, PoolConfig, SceneDimensions, StateCallback, Worker, WorkerPool, WorkerState,
};
use log::{debug, info, trace, warn};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// Summary of a finished render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderReport {
    /// Rows published as `LineComputed`.
    pub rows_computed: u32,
    /// Whether the render was cancelled before every row was claimed.
    pub cancelled: bool,
    /// Wall-clock duration of the render.
    pub elapsed: Duration,
}

/// Builder for [`RenderCoordinator`].
pub struct CoordinatorBuilder {
    config: PoolConfig,
    factory: Arc<dyn EngineFactory>,
    on_worker_state: Option<StateCallback>,
}

impl CoordinatorBuilder {
    /// Use `config` for the pool.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of workers.
    #[must_use]
    pub fn workers(mut self, worker_count: usize) -> Self {
        self.config.worker_count = worker_count;
        self
    }

    /// Observe every worker's state from creation on, including the
    /// Loading and Loaded transitions that happen before `build` returns.
    #[must_use]
    pub fn on_worker_state(mut self, callback: impl Fn(usize, WorkerState) + Send + Sync + 'static) -> Self {
        self.on_worker_state = Some(Arc::new(callback));
        self
    }

    /// Spawn the pool and wait for every engine to load.
    pub fn build(self) -> Result<RenderCoordinator> {
        let events = Arc::new(EventBus::new());
        let stdout_events = Arc::clone(&events);
        let output = OutputSink::new(move |text| {
            stdout_events.publish(&RenderEvent::StdoutWritten {
                text: text.to_string(),
            });
        });

        let pool = WorkerPool::spawn(
            &self.config,
            &self.factory,
            &output,
            self.on_worker_state.as_ref(),
        )?;

        Ok(RenderCoordinator {
            pool,
            events,
            active: Mutex::new(None),
        })
    }
}

/// Owns the worker pool and runs evaluate-then-render cycles.
///
/// All methods take `&self`, so the coordinator can be shared (e.g. in an
/// `Arc`) between the thread running [`render`](Self::render) and the one
/// calling [`cancel_render`](Self::cancel_render). Renders must not
/// overlap; starting one while another is active is not prevented, only
/// logged, and interleaves their events.
#[derive(Debug)]
pub struct RenderCoordinator {
    pool: WorkerPool,
    events: Arc<EventBus>,
    active: Mutex<Option<Arc<RenderSession>>>,
}

impl RenderCoordinator {
    /// Start building a coordinator whose workers use `factory`.
    pub fn builder(factory: Arc<dyn EngineFactory>) -> CoordinatorBuilder {
        CoordinatorBuilder {
            config: PoolConfig::default(),
            factory,
            on_worker_state: None,
        }
    }

    /// Coordinator with `config` and no early state observer.
    pub fn new(config: PoolConfig, factory: Arc<dyn EngineFactory>) -> Result<Self> {
        Self::builder(factory).config(config).build()
    }

    /// The event bus render progress is published on.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Number of workers in the pool.
    pub fn worker_count(&self) -> usize {
        self.pool.len()
    }

    /// Worker by index.
    pub fn worker(&self, id: usize) -> Result<&Worker> {
        self.pool.get(id)
    }

    /// Current state of worker `id`.
    pub fn worker_state(&self, id: usize) -> Result<WorkerState> {
        self.pool.get(id).map(Worker::state)
    }

    /// Register the state listener of worker `id`, replacing any previous.
    pub fn subscribe_worker_state(
        &self,
        id: usize,
        listener: impl FnMut(WorkerState) + Send + 'static,
    ) -> Result<()> {
        self.pool.get(id)?.subscribe_state(listener);
        Ok(())
    }

    /// Remove the state listener of worker `id`.
    pub fn unsubscribe_worker_state(&self, id: usize) -> Result<()> {
        self.pool.get(id)?.unsubscribe_state();
        Ok(())
    }

    fn active(&self) -> MutexGuard<'_, Option<Arc<RenderSession>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a render is in progress.
    pub fn is_rendering(&self) -> bool {
        self.active().is_some()
    }

    /// Evaluate `source` on every worker.
    ///
    /// All workers receive the request before any reply is awaited. The
    /// returned outcome is worker 0's. If any worker failed, one
    /// `EvalError` event is published with worker 0's message when it
    /// failed, or the first failing worker's otherwise.
    ///
    /// Only a disconnected worker 0 is an error; other disconnected
    /// workers are logged and left out.
    pub fn evaluate(&self, source: &str) -> Result<EvalOutcome> {
        let mut replies = self.pool.iter().map(|w| w.eval(source)).collect::<Vec<_>>().into_iter();
        let primary = replies.next().ok_or(Error::NoSuchWorker(0))?.wait()?;
        let others: Vec<EvalOutcome> = replies
            .filter_map(|reply| match reply.wait() {
                Ok(outcome) => Some(outcome),
                Err(err) => {
                    warn!("{err}; skipping it for this evaluation");
                    None
                }
            })
            .collect();

        if let Some(message) = std::iter::once(&primary)
            .chain(&others)
            .find_map(EvalOutcome::error)
        {
            debug!("evaluation failed: {message}");
            self.events.publish(&RenderEvent::EvalError {
                message: message.to_string(),
            });
        }

        Ok(primary)
    }

    /// Render a scene every worker already holds.
    ///
    /// Blocks until every row is claimed and computed, or until the render
    /// is cancelled and in-flight rows are done. Publishes exactly one
    /// `SceneLoaded` before any line and one `SceneRendered` after all.
    pub fn render(&self, dimensions: SceneDimensions) -> RenderReport {
        let session = Arc::new(RenderSession::new(dimensions));
        {
            let mut active = self.active();
            if active.is_some() {
                warn!("render started while another render is still active");
            }
            *active = Some(Arc::clone(&session));
        }

        info!(
            "rendering {}x{} on {} workers",
            dimensions.width,
            dimensions.height,
            self.pool.len()
        );
        self.events.publish(&RenderEvent::SceneLoaded {
            width: dimensions.width,
            height: dimensions.height,
        });

        let rows_computed = thread::scope(|scope| {
            let mut drivers = Vec::with_capacity(self.pool.len());
            for worker in &self.pool {
                let session = &session;
                let events = &*self.events;
                let spawned = thread::Builder::new()
                    .name(format!("scanline-driver-{}", worker.id()))
                    .spawn_scoped(scope, move || Self::drive(worker, session, events));
                match spawned {
                    Ok(handle) => drivers.push(handle),
                    Err(err) => warn!("worker {}: failed to spawn driver: {err}", worker.id()),
                }
            }

            if drivers.is_empty() {
                return Self::drive(self.pool.primary(), &session, &self.events);
            }
            drivers
                .into_iter()
                .map(|handle| handle.join().unwrap_or(0))
                .sum()
        });

        let elapsed = session.elapsed();
        let cancelled = session.is_cancelled() && session.rows_remaining() > 0;
        {
            let mut active = self.active();
            if active.as_ref().is_some_and(|a| Arc::ptr_eq(a, &session)) {
                *active = None;
            }
        }

        info!("rendered {rows_computed} rows in {elapsed:?} (cancelled: {cancelled})");
        self.events.publish(&RenderEvent::SceneRendered { elapsed });

        RenderReport {
            rows_computed,
            cancelled,
            elapsed,
        }
    }

    /// One driver: claim, compute, publish, until no rows or cancelled.
    fn drive(worker: &Worker, session: &RenderSession, events: &EventBus) -> u32 {
        let SceneDimensions { width, height } = session.dimensions();
        let mut computed = 0;

        while !session.is_cancelled() {
            let Some(row) = session.claim_row() else {
                break;
            };
            match worker.compute(row).wait() {
                Ok(Some(colors)) => {
                    trace!("worker {}: row {row} done", worker.id());
                    events.publish(&RenderEvent::LineComputed {
                        row,
                        width,
                        height,
                        colors: colors.into(),
                    });
                    computed += 1;
                }
                Ok(None) => trace!("worker {}: no scene, skipping row {row}", worker.id()),
                Err(err) => {
                    warn!("{err}; its driver stops");
                    break;
                }
            }
        }

        debug!("worker {}: driver exits after {computed} rows", worker.id());
        computed
    }

    /// Ask the active render to stop claiming rows.
    ///
    /// Rows already being computed still complete and are published.
    /// Returns whether a render was active.
    pub fn cancel_render(&self) -> bool {
        match self.active().as_ref() {
            Some(session) => {
                debug!("cancelling render");
                session.cancel();
                true
            }
            None => false,
        }
    }

    /// Evaluate `source` and render the scene it describes, if any.
    pub fn run(&self, source: &str) -> Result<EvalOutcome> {
        let outcome = self.evaluate(source)?;
        if let Some(dimensions) = outcome.scene() {
            self.render(dimensions);
        }
        Ok(outcome)
    }

    /// Top-level names known to worker 0, for completion.
    ///
    /// Best effort: any failure yields an empty set.
    pub fn local_names(&self) -> BTreeSet<String> {
        self.pool.primary().local_names().wait().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, Evaluation, SceneEngine, ToyEngine};
    use std::collections::HashSet;

    fn coordinator(workers: usize) -> RenderCoordinator {
        let factory: Arc<dyn EngineFactory> =
            Arc::new(|sink: OutputSink| Ok::<_, EngineError>(ToyEngine::new(sink)));
        RenderCoordinator::new(PoolConfig::with_workers(workers), factory).unwrap()
    }

    #[test]
    fn test_evaluate_without_scene() {
        let coordinator = coordinator(2);
        let outcome = coordinator.evaluate("x = 1").unwrap();
        assert_eq!(
            outcome,
            EvalOutcome::Success {
                text: "1".into(),
                scene: None
            }
        );
    }

    #[test]
    fn test_evaluate_error_publishes_once() {
        let coordinator = coordinator(3);
        let (_, errors) = coordinator.events().channel(EventKinds::EVAL_ERROR);

        let outcome = coordinator.evaluate("raise nope").unwrap();

        assert_eq!(outcome.error(), Some("line 1: nope"));
        assert_eq!(
            errors.try_iter().collect::<Vec<_>>(),
            vec![RenderEvent::EvalError {
                message: "line 1: nope".into()
            }]
        );
    }

    #[test]
    fn test_every_worker_holds_the_scene() {
        let coordinator = coordinator(3);
        coordinator.evaluate("scene 2 2 solid #000000").unwrap();
        for id in 0..3 {
            let colors = coordinator.worker(id).unwrap().compute(1).wait().unwrap();
            assert_eq!(colors, Some(vec![0, 0]));
        }
    }

    #[test]
    fn test_render_covers_every_row_once() {
        let coordinator = coordinator(4);
        let (_, events) = coordinator.events().channel(EventKinds::RENDER);
        let outcome = coordinator.run("scene 3 37 gradient").unwrap();
        assert_eq!(outcome.scene(), Some(SceneDimensions::new(3, 37)));

        let events: Vec<_> = events.try_iter().collect();
        assert_eq!(events.first(), Some(&RenderEvent::SceneLoaded { width: 3, height: 37 }));
        assert!(matches!(events.last(), Some(RenderEvent::SceneRendered { .. })));

        let mut rows = HashSet::new();
        for event in &events[1..events.len() - 1] {
            match event {
                RenderEvent::LineComputed { row, colors, .. } => {
                    assert_eq!(colors.len(), 3);
                    assert!(rows.insert(*row));
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(rows, (0..37).collect());
        assert!(!coordinator.is_rendering());
    }

    #[test]
    fn test_render_report() {
        let coordinator = coordinator(2);
        let outcome = coordinator.evaluate("scene 1 10 gradient").unwrap();
        let report = coordinator.render(outcome.scene().unwrap());
        assert_eq!(report.rows_computed, 10);
        assert!(!report.cancelled);
    }

    #[test]
    fn test_cancel_without_render() {
        let coordinator = coordinator(1);
        assert!(!coordinator.cancel_render());
    }

    #[test]
    fn test_render_without_scene_skips_rows() {
        let coordinator = coordinator(2);
        let (_, events) = coordinator.events().channel(EventKinds::all());
        let report = coordinator.render(SceneDimensions::new(4, 4));

        assert_eq!(report.rows_computed, 0);
        let kinds: Vec<_> = events.try_iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![EventKinds::SCENE_LOADED, EventKinds::SCENE_RENDERED]);
    }

    #[test]
    fn test_stdout_is_published_once() {
        let coordinator = coordinator(3);
        let (_, stdout) = coordinator.events().channel(EventKinds::STDOUT_WRITTEN);
        coordinator.evaluate("print hello").unwrap();

        let text: String = stdout
            .try_iter()
            .map(|e| match e {
                RenderEvent::StdoutWritten { text } => text,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(text, "hello\n");
    }

    #[test]
    fn test_local_names() {
        let coordinator = coordinator(2);
        coordinator.evaluate("width = 4\nheight = 2").unwrap();
        let names: Vec<_> = coordinator.local_names().into_iter().collect();
        assert_eq!(names, vec!["height", "width"]);
    }

    /// Toy engine whose thread dies when asked to evaluate `crash = 1`.
    struct CrashingEngine {
        inner: ToyEngine,
        crashes: bool,
    }

    impl SceneEngine for CrashingEngine {
        fn evaluate(&mut self, source: &str) -> std::result::Result<Evaluation, EngineError> {
            if self.crashes && source == "crash = 1" {
                panic!("engine crashed");
            }
            self.inner.evaluate(source)
        }

        fn local_names(&self) -> std::result::Result<BTreeSet<String>, EngineError> {
            self.inner.local_names()
        }
    }

    #[test]
    fn test_dead_secondary_worker_does_not_break_evaluate() {
        // Engines are built on their worker's thread, so the thread name
        // tells which worker an engine belongs to.
        let factory: Arc<dyn EngineFactory> = Arc::new(|sink: OutputSink| {
            Ok::<_, EngineError>(CrashingEngine {
                inner: ToyEngine::new(sink),
                crashes: thread::current().name() == Some("scanline-worker-1"),
            })
        });
        let coordinator = RenderCoordinator::new(PoolConfig::with_workers(2), factory).unwrap();

        let first = coordinator.evaluate("crash = 1").unwrap();
        assert!(first.is_success());
        assert!(matches!(
            coordinator.worker(1).unwrap().compute(0).wait(),
            Err(Error::Disconnected { worker: 1 })
        ));

        let second = coordinator.evaluate("y = 2").unwrap();
        assert_eq!(
            second,
            EvalOutcome::Success {
                text: "2".into(),
                scene: None
            }
        );

        let report = coordinator.render(
            coordinator
                .evaluate("scene 1 6 gradient")
                .unwrap()
                .scene()
                .unwrap(),
        );
        // Worker 1's driver loses at most the one row it claimed.
        assert!(report.rows_computed >= 5);
        assert!(!report.cancelled);
    }

    #[test]
    fn test_worker_state_accessors() {
        let coordinator = coordinator(2);
        assert_eq!(coordinator.worker_state(1).unwrap(), WorkerState::Loaded);
        assert!(coordinator.subscribe_worker_state(1, |_| {}).is_ok());
        assert!(coordinator.unsubscribe_worker_state(1).is_ok());
        assert!(matches!(
            coordinator.worker_state(2),
            Err(Error::NoSuchWorker(2))
        ));
    }
}
