//! Render PNG: evaluate a scene script and write the finished image.
//!
//! Usage: `render_png [SCRIPT] [OUTPUT] [WORKERS]`
//!
//! Without a script a built-in scene is rendered. Engine output and the
//! final timing go to stdout.

use scanline::{Canvas, EngineError, EngineFactory, EventKinds, OutputSink, PoolConfig, RenderCoordinator, RenderEvent, ToyEngine};
use std::sync::Arc;
use std::{env, fs};

const DEFAULT_SCENE: &str = r"# 300x300 sky gradient
size = 300
print rendering a gradient
scene size size gradient
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let source = match args.next() {
        Some(path) => fs::read_to_string(path)?,
        None => DEFAULT_SCENE.to_string(),
    };
    let output = args.next().unwrap_or_else(|| "scene.png".to_string());
    let config = match args.next() {
        Some(workers) => PoolConfig::with_workers(workers.parse()?),
        None => PoolConfig::default(),
    };

    let factory: Arc<dyn EngineFactory> =
        Arc::new(|sink: OutputSink| Ok::<_, EngineError>(ToyEngine::new(sink)));
    let coordinator = RenderCoordinator::new(config, factory)?;
    println!("Started {} workers", coordinator.worker_count());

    coordinator
        .events()
        .subscribe(EventKinds::STDOUT_WRITTEN | EventKinds::EVAL_ERROR, |event| match event {
            RenderEvent::StdoutWritten { text } => print!("{text}"),
            RenderEvent::EvalError { message } => eprintln!("error: {message}"),
            _ => {}
        });
    let (_, canvas) = Canvas::attach(coordinator.events());

    let outcome = coordinator.run(&source)?;
    let Some(scene) = outcome.scene() else {
        println!("Script produced no scene");
        return Ok(());
    };

    let canvas = canvas.lock().map_err(|_| "canvas lock poisoned")?;
    canvas.save_png(&output)?;
    println!(
        "Rendered {}x{} in {:?} -> {output}",
        scene.width,
        scene.height,
        canvas.last_elapsed().unwrap_or_default()
    );
    Ok(())
}
