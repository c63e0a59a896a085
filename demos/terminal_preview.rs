//! Terminal Preview: watch rows arrive as workers finish them.
//!
//! The scene is sized to the terminal, one cell per pixel. The bottom
//! line shows every worker's current state.
//!
//! Press Escape to cancel the render, 'r' to render again, 'q' to quit.

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, queue};
use scanline::{
    EngineError, EngineFactory, EventKinds, OutputSink, RenderCoordinator, RenderEvent, Rgb, ToyEngine,
    WorkerState,
};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

type Render = JoinHandle<scanline::Result<scanline::EvalOutcome>>;

fn scene_source(width: u16, height: u16) -> String {
    format!("scene {width} {height} checker 4 #1e3a5f #f2c14e")
}

fn start_render(coordinator: &Arc<RenderCoordinator>, width: u16, height: u16) -> Render {
    let coordinator = Arc::clone(coordinator);
    let source = scene_source(width, height);
    thread::spawn(move || coordinator.run(&source))
}

fn draw_row(out: &mut impl Write, y: u16, colors: &[u32]) -> io::Result<()> {
    queue!(out, MoveTo(0, y))?;
    for packed in colors {
        let Rgb { r, g, b } = Rgb::from_packed(*packed);
        queue!(out, SetBackgroundColor(Color::Rgb { r, g, b }), Print(' '))?;
    }
    queue!(out, ResetColor)
}

fn draw_status(out: &mut impl Write, y: u16, states: &[WorkerState], note: &str) -> io::Result<()> {
    let summary: Vec<String> = states
        .iter()
        .enumerate()
        .map(|(id, state)| format!("{id}:{state}"))
        .collect();
    queue!(
        out,
        MoveTo(0, y),
        Clear(ClearType::CurrentLine),
        SetForegroundColor(Color::Grey),
        Print(format!("{note} | {}", summary.join(" "))),
        ResetColor
    )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (width, height) = terminal::size()?;
    let scene_height = height.saturating_sub(1).max(1);

    let factory: Arc<dyn EngineFactory> =
        Arc::new(|sink: OutputSink| Ok::<_, EngineError>(ToyEngine::new(sink)));
    let states = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&states);
    let coordinator = Arc::new(
        RenderCoordinator::builder(factory)
            .on_worker_state(move |id, state| {
                let mut states = recorded.lock().unwrap_or_else(PoisonError::into_inner);
                if states.len() <= id {
                    states.resize(id + 1, WorkerState::default());
                }
                states[id] = state;
            })
            .build()?,
    );
    let (_, events) = coordinator.events().channel(EventKinds::RENDER);

    let mut stdout = io::stdout();
    terminal::enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, Hide, Clear(ClearType::All))?;

    let mut render = Some(start_render(&coordinator, width, scene_height));
    let mut note = String::from("rendering");

    loop {
        for event in events.try_iter() {
            match event {
                RenderEvent::SceneLoaded { .. } => {
                    queue!(stdout, Clear(ClearType::All))?;
                    note = String::from("rendering");
                }
                RenderEvent::LineComputed { row, height, colors, .. } => {
                    if let Some(y) = height.checked_sub(row + 1) {
                        draw_row(&mut stdout, u16::try_from(y).unwrap_or(u16::MAX), &colors)?;
                    }
                }
                RenderEvent::SceneRendered { elapsed } => {
                    note = format!("done in {elapsed:?}");
                }
                _ => {}
            }
        }

        if render.as_ref().is_some_and(JoinHandle::is_finished) {
            if let Some(Ok(Err(error))) = render.take().map(JoinHandle::join) {
                note = format!("error: {error}");
            }
        }

        let snapshot = states.lock().unwrap_or_else(PoisonError::into_inner).clone();
        draw_status(&mut stdout, scene_height, &snapshot, &note)?;
        stdout.flush()?;

        if event::poll(Duration::from_millis(16))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Char('q') => break,
                    KeyCode::Esc => {
                        if coordinator.cancel_render() {
                            note = String::from("cancelled");
                        }
                    }
                    KeyCode::Char('r') if render.is_none() => {
                        render = Some(start_render(&coordinator, width, scene_height));
                    }
                    _ => {}
                }
            }
        }
    }

    coordinator.cancel_render();
    if let Some(render) = render {
        let _ = render.join();
    }

    execute!(stdout, Show, LeaveAlternateScreen)?;
    terminal::disable_raw_mode()?;
    Ok(())
}
