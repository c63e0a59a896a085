//! Worker Actor: one thread owning one scene engine.
//!
//! The engine and its retained scene never leave the worker thread. The
//! [`Worker`] handle talks to it through a request channel; each call
//! returns a [`Reply`] the caller can wait on later, so requests to many
//! workers can be in flight at once.

use super::messages::{EvalOutcome, SceneDimensions, WorkerRequest};
use super::state::{StateMachine, WorkerState};
use crate::engine::{EngineError, EngineFactory, OutputSink, Scene, SceneEngine};
use crate::error::{Error, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, trace};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Pending answer to a worker request.
#[must_use = "a reply does nothing unless waited on"]
pub struct Reply<T> {
    worker: usize,
    rx: Receiver<T>,
}

impl<T> Reply<T> {
    /// Block until the worker answers.
    ///
    /// Fails with [`Error::Disconnected`] if the worker thread is gone.
    pub fn wait(self) -> Result<T> {
        self.rx.recv().map_err(|_| Error::Disconnected { worker: self.worker })
    }
}

impl<T> fmt::Debug for Reply<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply").field("worker", &self.worker).finish_non_exhaustive()
    }
}

/// Handle to a worker thread.
pub struct Worker {
    id: usize,
    state: Arc<StateMachine>,
    thread_name: String,
    /// Wrapped in Option so Drop can close the channel before joining.
    request_tx: Option<Sender<WorkerRequest>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Create a worker handle in the `Created` state.
    ///
    /// No thread runs until [`Worker::init`].
    pub fn new(id: usize, idle_debounce: Duration, thread_name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            id,
            state: Arc::new(StateMachine::new(id, idle_debounce)?),
            thread_name: thread_name.into(),
            request_tx: None,
            handle: None,
        })
    }

    /// Stable index of this worker in its pool.
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.state.current()
    }

    /// Register the state listener, replacing any previous one.
    pub fn subscribe_state(&self, listener: impl FnMut(WorkerState) + Send + 'static) {
        self.state.subscribe(listener);
    }

    /// Remove the state listener.
    pub fn unsubscribe_state(&self) {
        self.state.unsubscribe();
    }

    /// Spawn the worker thread and start loading its engine.
    ///
    /// The engine is built on the worker thread by `factory`; text it
    /// writes goes to `output` unbuffered. The returned reply resolves
    /// once the engine is ready, or with the engine's load error.
    pub fn init(
        &mut self,
        factory: Arc<dyn EngineFactory>,
        output: OutputSink,
    ) -> Result<Reply<std::result::Result<(), EngineError>>> {
        let (request_tx, request_rx) = unbounded::<WorkerRequest>();
        let (ready_tx, ready_rx) = bounded(1);
        let state = Arc::clone(&self.state);
        let id = self.id;

        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                state.transition(WorkerState::Loading);
                let engine = match factory.create(output) {
                    Ok(engine) => engine,
                    Err(err) => {
                        debug!("worker {id}: engine failed to load: {err}");
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                state.transition(WorkerState::Loaded);
                debug!("worker {id}: engine loaded");
                let _ = ready_tx.send(Ok(()));

                WorkerLoop {
                    id,
                    engine,
                    scene: None,
                    state: &state,
                }
                .run(&request_rx);
                debug!("worker {id}: shutting down");
            })?;

        self.request_tx = Some(request_tx);
        self.handle = Some(handle);
        Ok(Reply {
            worker: self.id,
            rx: ready_rx,
        })
    }

    /// Send a request built around a fresh reply channel.
    ///
    /// If the worker is not running the request is dropped, which closes
    /// the reply channel and makes [`Reply::wait`] report a disconnect.
    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> WorkerRequest) -> Reply<T> {
        let (tx, rx) = bounded(1);
        let request = make(tx);
        if let Some(request_tx) = &self.request_tx {
            let _ = request_tx.send(request);
        }
        Reply { worker: self.id, rx }
    }

    /// Evaluate `source`; a scene it produces replaces the retained one.
    pub fn eval(&self, source: &str) -> Reply<EvalOutcome> {
        let source = source.to_string();
        self.request(|reply| WorkerRequest::Eval { source, reply })
    }

    /// Colors of `row` in the retained scene, `None` without a scene.
    pub fn compute(&self, row: u32) -> Reply<Option<Vec<u32>>> {
        self.request(|reply| WorkerRequest::Compute { row, reply })
    }

    /// Top-level names of the engine; empty on any engine failure.
    pub fn local_names(&self) -> Reply<BTreeSet<String>> {
        self.request(|reply| WorkerRequest::LocalNames { reply })
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("running", &self.handle.is_some())
            .finish()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        drop(self.request_tx.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// State owned by the worker thread.
struct WorkerLoop<'a> {
    id: usize,
    engine: Box<dyn SceneEngine>,
    scene: Option<Box<dyn Scene>>,
    state: &'a StateMachine,
}

impl WorkerLoop<'_> {
    fn run(mut self, requests: &Receiver<WorkerRequest>) {
        while let Ok(request) = requests.recv() {
            match request {
                WorkerRequest::Eval { source, reply } => {
                    self.state.transition(WorkerState::Eval);
                    let outcome = self.eval(&source);
                    self.state.transition(WorkerState::Idle);
                    let _ = reply.send(outcome);
                }
                WorkerRequest::Compute { row, reply } => {
                    self.state.transition(WorkerState::Compute { row });
                    let colors = self.compute(row);
                    self.state.transition(WorkerState::Idle);
                    let _ = reply.send(colors);
                }
                WorkerRequest::LocalNames { reply } => {
                    let _ = reply.send(self.engine.local_names().unwrap_or_default());
                }
            }
        }
    }

    fn eval(&mut self, source: &str) -> EvalOutcome {
        match self.engine.evaluate(source) {
            Ok(evaluation) => {
                let dimensions = evaluation.scene.map(|scene| {
                    let dimensions = SceneDimensions::new(scene.width(), scene.height());
                    self.scene = Some(scene);
                    dimensions
                });
                debug!("worker {}: evaluated, scene {:?}", self.id, dimensions);
                EvalOutcome::Success {
                    text: evaluation.text,
                    scene: dimensions,
                }
            }
            Err(err) => {
                debug!("worker {}: evaluation failed: {err}", self.id);
                self.scene = None;
                err.into()
            }
        }
    }

    fn compute(&mut self, row: u32) -> Option<Vec<u32>> {
        let scene = self.scene.as_mut()?;
        if row >= scene.height() {
            trace!("worker {}: row {row} out of range", self.id);
            return None;
        }
        Some(scene.row_colors(row))
    }
}
