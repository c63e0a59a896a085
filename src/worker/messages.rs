//! Message types for worker communication.
//!
//! These define the protocol between a [`Worker`](super::Worker) handle and
//! its thread. Every request carries the sender half of a one-shot reply
//! channel.

use crate::engine::EngineError;
use crossbeam_channel::Sender;
use std::collections::BTreeSet;

/// Size of a scene as seen from outside its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneDimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels (number of rows).
    pub height: u32,
}

impl SceneDimensions {
    /// Create dimensions.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Outcome of evaluating source text on a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalOutcome {
    /// The source evaluated.
    Success {
        /// Textual representation of the result.
        text: String,
        /// Present when the result is a renderable scene.
        scene: Option<SceneDimensions>,
    },
    /// The engine rejected the source.
    Failure {
        /// Human-readable error.
        message: String,
    },
}

impl EvalOutcome {
    /// Whether evaluation succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Scene dimensions, if a scene was produced.
    pub const fn scene(&self) -> Option<SceneDimensions> {
        match self {
            Self::Success { scene, .. } => *scene,
            Self::Failure { .. } => None,
        }
    }

    /// Error message, if evaluation failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failure { message } => Some(message),
            Self::Success { .. } => None,
        }
    }
}

impl From<EngineError> for EvalOutcome {
    fn from(err: EngineError) -> Self {
        Self::Failure {
            message: err.into_message(),
        }
    }
}

/// Requests served by a worker thread, in FIFO order.
#[derive(Debug)]
pub enum WorkerRequest {
    /// Evaluate source and retain the resulting scene.
    Eval {
        /// Source text.
        source: String,
        /// Reply channel.
        reply: Sender<EvalOutcome>,
    },

    /// Compute the colors of one row of the retained scene.
    Compute {
        /// Row index.
        row: u32,
        /// Reply channel; `None` when no scene is retained.
        reply: Sender<Option<Vec<u32>>>,
    },

    /// List the engine's top-level names.
    LocalNames {
        /// Reply channel.
        reply: Sender<BTreeSet<String>>,
    },
}
