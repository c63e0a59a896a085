//! Error types.

use thiserror::Error;

/// Errors raised by the worker pool and render coordinator.
///
/// Script evaluation failures are not errors at this level: they are
/// reported as [`EvalOutcome::Failure`](crate::EvalOutcome::Failure) data.
#[derive(Debug, Error)]
pub enum Error {
    /// A worker's scene engine failed to load.
    #[error("worker {worker} failed to initialize: {message}")]
    Init {
        /// Index of the worker that failed.
        worker: usize,
        /// Engine-provided failure message.
        message: String,
    },

    /// A worker thread is gone and can no longer answer requests.
    #[error("worker {worker} disconnected")]
    Disconnected {
        /// Index of the disconnected worker.
        worker: usize,
    },

    /// No worker exists with the given index.
    #[error("no worker with index {0}")]
    NoSuchWorker(usize),

    /// The OS refused to spawn a worker or timer thread.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// Encoding or writing an image failed.
    #[error("image output failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
