//! Worker pool construction.

use super::actor::Worker;
use super::state::{WorkerState, DEFAULT_IDLE_DEBOUNCE};
use crate::engine::{EngineFactory, OutputSink};
use crate::error::{Error, Result};
use log::info;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Callback receiving `(worker id, state)` for every reported transition.
pub type StateCallback = Arc<dyn Fn(usize, WorkerState) + Send + Sync>;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of workers. Values below one are raised to one.
    pub worker_count: usize,
    /// Quiescence window before `Idle` is reported.
    pub idle_debounce: Duration,
    /// Worker threads are named `{prefix}-{id}`.
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: thread::available_parallelism().map_or(4, NonZeroUsize::get),
            idle_debounce: DEFAULT_IDLE_DEBOUNCE,
            thread_name_prefix: "scanline-worker".to_string(),
        }
    }
}

impl PoolConfig {
    /// Default configuration with a fixed number of workers.
    pub fn with_workers(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Self::default()
        }
    }
}

/// A fixed set of initialized workers.
///
/// Read-only after construction; dropping the pool shuts every worker
/// down.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    /// Create and initialize `config.worker_count` workers.
    ///
    /// Engines load concurrently. Only worker 0 forwards engine output to
    /// `output`: every worker evaluates the same source, so the others
    /// would only repeat it. Any engine load failure is fatal and returned
    /// as [`Error::Init`].
    pub fn spawn(
        config: &PoolConfig,
        factory: &Arc<dyn EngineFactory>,
        output: &OutputSink,
        on_state: Option<&StateCallback>,
    ) -> Result<Self> {
        let count = config.worker_count.max(1);
        let mut workers = Vec::with_capacity(count);
        let mut pending = Vec::with_capacity(count);

        for id in 0..count {
            let mut worker = Worker::new(
                id,
                config.idle_debounce,
                format!("{}-{id}", config.thread_name_prefix),
            )?;
            if let Some(callback) = on_state {
                let callback = Arc::clone(callback);
                worker.subscribe_state(move |state| callback(id, state));
            }
            let sink = if id == 0 {
                output.clone()
            } else {
                OutputSink::discard()
            };
            pending.push(worker.init(Arc::clone(factory), sink)?);
            workers.push(worker);
        }

        for (id, ready) in pending.into_iter().enumerate() {
            ready.wait()?.map_err(|err| Error::Init {
                worker: id,
                message: err.into_message(),
            })?;
        }

        info!("worker pool ready with {count} workers");
        Ok(Self { workers })
    }

    /// Number of workers (at least one).
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Worker by index.
    pub fn get(&self, id: usize) -> Result<&Worker> {
        self.workers.get(id).ok_or(Error::NoSuchWorker(id))
    }

    /// The canonical reporting worker.
    pub fn primary(&self) -> &Worker {
        &self.workers[0]
    }

    /// Iterate over workers in index order.
    pub fn iter(&self) -> std::slice::Iter<'_, Worker> {
        self.workers.iter()
    }
}

impl<'a> IntoIterator for &'a WorkerPool {
    type Item = &'a Worker;
    type IntoIter = std::slice::Iter<'a, Worker>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, ToyEngine};
    use std::sync::Mutex;

    fn toy_factory() -> Arc<dyn EngineFactory> {
        Arc::new(|sink: OutputSink| Ok::<_, EngineError>(ToyEngine::new(sink)))
    }

    #[test]
    fn test_zero_workers_becomes_one() {
        let pool = WorkerPool::spawn(
            &PoolConfig::with_workers(0),
            &toy_factory(),
            &OutputSink::discard(),
            None,
        )
        .unwrap();
        assert_eq!(pool.len(), 1);
        assert!(!pool.is_empty());
        assert_eq!(pool.primary().id(), 0);
    }

    #[test]
    fn test_workers_have_stable_ids() {
        let pool = WorkerPool::spawn(
            &PoolConfig::with_workers(3),
            &toy_factory(),
            &OutputSink::discard(),
            None,
        )
        .unwrap();
        let ids: Vec<_> = pool.iter().map(Worker::id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(matches!(pool.get(3), Err(Error::NoSuchWorker(3))));
    }

    #[test]
    fn test_init_failure_is_fatal() {
        let factory: Arc<dyn EngineFactory> = Arc::new(|_: OutputSink| {
            Err::<ToyEngine, _>(EngineError::new("engine binary missing"))
        });
        let err = WorkerPool::spawn(&PoolConfig::with_workers(2), &factory, &OutputSink::discard(), None)
            .unwrap_err();
        assert!(matches!(err, Error::Init { worker: 0, .. }));
        assert_eq!(err.to_string(), "worker 0 failed to initialize: engine binary missing");
    }

    #[test]
    fn test_only_primary_forwards_output() {
        let seen = Arc::new(Mutex::new(String::new()));
        let seen_clone = Arc::clone(&seen);
        let output = OutputSink::new(move |t| seen_clone.lock().unwrap().push_str(t));
        let pool = WorkerPool::spawn(&PoolConfig::with_workers(3), &toy_factory(), &output, None).unwrap();

        let replies: Vec<_> = pool.iter().map(|w| w.eval("print hi")).collect();
        for reply in replies {
            reply.wait().unwrap();
        }

        assert_eq!(*seen.lock().unwrap(), "hi\n");
    }

    #[test]
    fn test_state_callback_tags_worker_id() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let callback: StateCallback = Arc::new(move |id, state| seen_clone.lock().unwrap().push((id, state)));
        let _pool = WorkerPool::spawn(
            &PoolConfig::with_workers(2),
            &toy_factory(),
            &OutputSink::discard(),
            Some(&callback),
        )
        .unwrap();

        let seen = seen.lock().unwrap();
        for id in 0..2 {
            assert!(seen.contains(&(id, WorkerState::Loading)));
            assert!(seen.contains(&(id, WorkerState::Loaded)));
        }
    }
}
