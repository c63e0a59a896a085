//! # Scanline
//!
//! Distributes the rows of a raster image across a pool of isolated
//! scene-engine workers.
//!
//! Each worker is a thread owning its own engine instance; nothing is
//! shared between workers. The coordinator broadcasts source text to all
//! of them, then hands out rows one at a time to whichever worker is free
//! and publishes each finished row as an event.
//!
//! ## Core Concepts
//!
//! - **Workers**: actors reached only through request/reply channels
//! - **Debounced state**: every piece of real work is reported at once,
//!   `Idle` only after a quiet period
//! - **Dynamic dispatch**: a shared row cursor claimed top-down, so fast
//!   workers simply take more rows
//! - **Cooperative cancellation**: drivers check a flag before each claim
//!
//! ## Example
//!
//! ```rust,no_run
//! use scanline::{Canvas, EngineError, OutputSink, PoolConfig, RenderCoordinator, ToyEngine};
//! use std::sync::Arc;
//!
//! let factory = Arc::new(|sink: OutputSink| Ok::<_, EngineError>(ToyEngine::new(sink)));
//! let coordinator = RenderCoordinator::new(PoolConfig::default(), factory)?;
//! let (_, canvas) = Canvas::attach(coordinator.events());
//!
//! coordinator.run("scene 64 48 gradient")?;
//! canvas.lock().unwrap().save_png("out.png")?;
//! # Ok::<(), scanline::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod canvas;
pub mod color;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod worker;

// Re-exports for convenience
pub use canvas::Canvas;
pub use color::Rgb;
pub use coordinator::{
    CoordinatorBuilder, EventBus, EventKinds, RenderCoordinator, RenderEvent, RenderReport, RenderSession,
    SubscriptionId,
};
pub use engine::{EngineError, EngineFactory, Evaluation, OutputSink, Scene, SceneEngine, ToyEngine};
pub use error::{Error, Result};
pub use worker::{EvalOutcome, PoolConfig, Reply, SceneDimensions, Worker, WorkerPool, WorkerState};
