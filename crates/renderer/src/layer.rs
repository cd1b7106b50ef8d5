//! Off-screen canvas layer hosting a [`Drawable`].
//!
//! The host map drives the layer through four lifecycle calls: `attach`,
//! `on_resize`, `on_viewport_change` and `detach`. Between them it calls
//! [`CanvasLayer::render`] from its loop and sleeps until
//! [`CanvasLayer::next_deadline`].

use std::time::Instant;

use projection::CoordinateProjector;
use tiny_skia::{Color, Pixmap};
use tracing::debug;

use crate::error::{RenderError, Result};

/// Everything a drawable needs to paint one frame.
pub struct FrameInfo<'a> {
    pub canvas: &'a mut Pixmap,
    pub projector: &'a dyn CoordinateProjector,
    pub now: Instant,
}

/// Something that paints into a canvas layer.
pub trait Drawable {
    /// Paint into `frame.canvas`. Returns true when pixels changed.
    fn draw(&mut self, frame: &mut FrameInfo<'_>) -> Result<bool>;

    /// The map moved or zoomed; cached pixel-space state is invalid.
    fn on_viewport_change(&mut self) {}

    /// The layer left the map.
    fn on_detach(&mut self) {}

    /// Earliest instant at which `draw` has more work to do.
    fn next_deadline(&self) -> Option<Instant> {
        None
    }
}

/// A pixmap sized to the map viewport plus the drawable painting it.
pub struct CanvasLayer<D: Drawable> {
    drawable: D,
    canvas: Option<Pixmap>,
}

impl<D: Drawable> CanvasLayer<D> {
    pub fn new(drawable: D) -> Self {
        Self {
            drawable,
            canvas: None,
        }
    }

    /// Create the backing canvas. Attaching twice replaces it.
    pub fn attach(&mut self, width: u32, height: u32) -> Result<()> {
        self.canvas = Some(new_canvas(width, height)?);
        self.drawable.on_viewport_change();
        debug!(width, height, "canvas layer attached");
        Ok(())
    }

    /// Resize the canvas; contents are discarded.
    pub fn on_resize(&mut self, width: u32, height: u32) -> Result<()> {
        if self.canvas.is_none() {
            return Ok(());
        }
        self.canvas = Some(new_canvas(width, height)?);
        self.drawable.on_viewport_change();
        Ok(())
    }

    /// Clear the canvas and let the drawable rebuild its pixel state.
    pub fn on_viewport_change(&mut self) {
        if let Some(canvas) = self.canvas.as_mut() {
            canvas.fill(Color::TRANSPARENT);
            self.drawable.on_viewport_change();
        }
    }

    pub fn detach(&mut self) {
        if self.canvas.take().is_some() {
            self.drawable.on_detach();
            debug!("canvas layer detached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.canvas.is_some()
    }

    /// Let the drawable paint one frame. A detached layer draws nothing.
    pub fn render(&mut self, projector: &dyn CoordinateProjector, now: Instant) -> Result<bool> {
        let Some(canvas) = self.canvas.as_mut() else {
            return Ok(false);
        };
        let mut frame = FrameInfo {
            canvas,
            projector,
            now,
        };
        self.drawable.draw(&mut frame)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        if self.is_attached() {
            self.drawable.next_deadline()
        } else {
            None
        }
    }

    pub fn canvas(&self) -> Option<&Pixmap> {
        self.canvas.as_ref()
    }

    pub fn drawable(&self) -> &D {
        &self.drawable
    }

    pub fn drawable_mut(&mut self) -> &mut D {
        &mut self.drawable
    }
}

fn new_canvas(width: u32, height: u32) -> Result<Pixmap> {
    Pixmap::new(width, height).ok_or(RenderError::InvalidCanvasSize { width, height })
}
