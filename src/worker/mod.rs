//! Workers: isolated scene-engine actors.
//!
//! Each worker is a dedicated thread that owns exactly one scene engine
//! and the scene it last evaluated. Nothing is shared between workers;
//! the only way in is the worker's request channel:
//!
//! ```text
//!                    WorkerRequest          ┌─────────────────────┐
//! ┌────────────┐  ───────────────────────▶  │ Worker Thread       │
//! │  Worker    │                            │  engine + scene     │
//! │  handle    │  ◀───────────────────────  │                     │
//! └────────────┘     Reply (one-shot)       └──────────┬──────────┘
//!                                                      │ transition
//!                                                      ▼
//!                                           ┌─────────────────────┐
//!                                           │ StateMachine        │
//!                                           │  Debouncer timer ───┼──▶ listener
//!                                           └─────────────────────┘
//! ```

mod actor;
pub mod debounce;
mod messages;
mod pool;
mod state;

pub use actor::{Reply, Worker};
pub use debounce::Debouncer;
pub use messages::{EvalOutcome, SceneDimensions, WorkerRequest};
pub use pool::{PoolConfig, StateCallback, WorkerPool};
pub use state::{StateMachine, WorkerState, DEFAULT_IDLE_DEBOUNCE};
