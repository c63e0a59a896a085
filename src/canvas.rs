//! Canvas: a display surface fed by render events.
//!
//! The canvas resizes and clears itself on `SceneLoaded`, paints every
//! `LineComputed` row and stops "rendering" on `SceneRendered`. Row 0 is
//! the bottom of the scene, so it lands on the last image line.

use crate::color::Rgb;
use crate::coordinator::{EventBus, EventKinds, RenderEvent, SubscriptionId};
use crate::error::Result;
use image::RgbImage;
use log::debug;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Framebuffer assembled from rendered rows.
#[derive(Debug, Clone)]
pub struct Canvas {
    image: RgbImage,
    painted: Vec<bool>,
    rendering: bool,
    last_elapsed: Option<Duration>,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Canvas {
    /// An empty 0x0 canvas.
    pub fn new() -> Self {
        Self {
            image: RgbImage::new(0, 0),
            painted: Vec::new(),
            rendering: false,
            last_elapsed: None,
        }
    }

    /// Subscribe a shared canvas to `bus`.
    pub fn attach(bus: &EventBus) -> (SubscriptionId, Arc<Mutex<Self>>) {
        let canvas = Arc::new(Mutex::new(Self::new()));
        let target = Arc::clone(&canvas);
        let id = bus.subscribe(EventKinds::RENDER, move |event| {
            target
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .apply(event);
        });
        (id, canvas)
    }

    /// Update the canvas from one event. Non-render events are ignored.
    pub fn apply(&mut self, event: &RenderEvent) {
        match event {
            RenderEvent::SceneLoaded { width, height } => self.reset(*width, *height),
            RenderEvent::LineComputed {
                row,
                width,
                height,
                colors,
            } => {
                if (*width, *height) != self.image.dimensions() {
                    debug!("dropping row {row} of a {width}x{height} scene");
                    return;
                }
                self.paint_row(*row, colors);
            }
            RenderEvent::SceneRendered { elapsed } => {
                self.rendering = false;
                self.last_elapsed = Some(*elapsed);
            }
            RenderEvent::EvalError { .. } | RenderEvent::StdoutWritten { .. } => {}
        }
    }

    fn reset(&mut self, width: u32, height: u32) {
        self.image = RgbImage::new(width, height);
        self.painted = vec![false; height as usize];
        self.rendering = true;
        self.last_elapsed = None;
    }

    /// Paint scene row `row`. Extra colors are ignored, missing ones stay black.
    pub fn paint_row(&mut self, row: u32, colors: &[u32]) {
        let (width, height) = self.image.dimensions();
        if row >= height {
            return;
        }
        let y = height - 1 - row;
        for (x, packed) in (0..width).zip(colors) {
            let Rgb { r, g, b } = Rgb::from_packed(*packed);
            self.image.put_pixel(x, y, image::Rgb([r, g, b]));
        }
        self.painted[row as usize] = true;
    }

    /// Width and height.
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Whether a render is in progress.
    pub const fn is_rendering(&self) -> bool {
        self.rendering
    }

    /// Duration reported by the last `SceneRendered`.
    pub const fn last_elapsed(&self) -> Option<Duration> {
        self.last_elapsed
    }

    /// Number of distinct rows painted since the last reset.
    pub fn rows_painted(&self) -> usize {
        self.painted.iter().filter(|p| **p).count()
    }

    /// Whether every row has been painted.
    pub fn is_complete(&self) -> bool {
        self.painted.iter().all(|p| *p)
    }

    /// Color at image coordinates (`y = 0` is the top line).
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        let (width, height) = self.image.dimensions();
        (x < width && y < height).then(|| {
            let image::Rgb([r, g, b]) = *self.image.get_pixel(x, y);
            Rgb::new(r, g, b)
        })
    }

    /// The framebuffer.
    pub const fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Write the framebuffer as a PNG.
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        self.image
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(Into::into)
    }
}
