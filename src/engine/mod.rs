//! Scene Engine boundary.
//!
//! The scripting VM that turns source text into a scene is an external
//! collaborator. This module only fixes the interface a worker needs from
//! it:
//!
//! - [`SceneEngine::evaluate`] turns source into an [`Evaluation`], which
//!   may or may not carry a renderable [`Scene`]
//! - [`Scene::row_colors`] computes one scanline of packed `0x00RRGGBB`
//!   pixels
//!
//! Engines are built *inside* their worker thread by an [`EngineFactory`],
//! so an engine type does not have to be `Send` (VMs built on `Rc` are
//! fine). Only the factory crosses threads.

pub mod toy;

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;

pub use toy::ToyEngine;

/// Failure reported by a scene engine.
///
/// The message is shown to the user verbatim, so engines should make it
/// human readable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    /// Create an error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Take the message out of the error.
    pub fn into_message(self) -> String {
        self.message
    }
}

/// A renderable scene produced by an evaluation.
///
/// Dimensions are fixed for the lifetime of the scene.
pub trait Scene {
    /// Image width in pixels. Always positive.
    fn width(&self) -> u32;

    /// Image height in pixels. Always positive.
    fn height(&self) -> u32;

    /// Packed colors of one row, `row < height()`.
    ///
    /// Must return exactly `width()` values. Takes `&mut self` so engines
    /// can keep per-scene sampling state (e.g. an RNG).
    fn row_colors(&mut self, row: u32) -> Vec<u32>;
}

/// Result of a successful evaluation.
pub struct Evaluation {
    /// Textual representation of the result.
    pub text: String,
    /// The scene, if the source described one.
    pub scene: Option<Box<dyn Scene>>,
}

impl Evaluation {
    /// An evaluation that produced only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            scene: None,
        }
    }

    /// Attach a scene.
    #[must_use]
    pub fn with_scene(mut self, scene: Box<dyn Scene>) -> Self {
        self.scene = Some(scene);
        self
    }
}

impl fmt::Debug for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluation")
            .field("text", &self.text)
            .field(
                "scene",
                &self.scene.as_ref().map(|s| (s.width(), s.height())),
            )
            .finish()
    }
}

/// An evaluator of scene-description source text.
pub trait SceneEngine {
    /// Evaluate `source`. Bindings may persist across calls.
    fn evaluate(&mut self, source: &str) -> Result<Evaluation, EngineError>;

    /// Names currently bound at top level, for editor completion.
    fn local_names(&self) -> Result<BTreeSet<String>, EngineError>;
}

/// Sink for text an engine writes (e.g. `print` output).
///
/// Text is forwarded as soon as it is written, never buffered.
#[derive(Clone)]
pub struct OutputSink(Arc<dyn Fn(&str) + Send + Sync>);

impl OutputSink {
    /// Forward output to `callback`.
    pub fn new(callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self(Arc::new(callback))
    }

    /// A sink that drops everything.
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    /// Forward `text` to the callback.
    pub fn write_str(&self, text: &str) {
        (self.0)(text);
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OutputSink")
    }
}

impl io::Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_str(&String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Builds one engine per worker, on the worker's own thread.
pub trait EngineFactory: Send + Sync {
    /// Instantiate an engine that writes its output to `output`.
    fn create(&self, output: OutputSink) -> Result<Box<dyn SceneEngine>, EngineError>;
}

impl<F, E> EngineFactory for F
where
    F: Fn(OutputSink) -> Result<E, EngineError> + Send + Sync,
    E: SceneEngine + 'static,
{
    fn create(&self, output: OutputSink) -> Result<Box<dyn SceneEngine>, EngineError> {
        self(output).map(|engine| Box::new(engine) as Box<dyn SceneEngine>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    #[test]
    fn test_output_sink_forwards_unbuffered() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let mut sink = OutputSink::new(move |text| seen_clone.lock().unwrap().push(text.to_string()));

        sink.write_str("hello");
        sink.write_all(b"42").unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["hello".to_string(), "42".to_string()]);
    }

    #[test]
    fn test_closure_factory() {
        let factory = |sink: OutputSink| Ok::<_, EngineError>(ToyEngine::new(sink));
        let mut engine = factory.create(OutputSink::discard()).unwrap();
        let evaluation = engine.evaluate("x = 1").unwrap();
        assert_eq!(evaluation.text, "1");
    }

    #[test]
    fn test_engine_error_message() {
        let err = EngineError::new("boom");
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.into_message(), "boom");
    }
}
