//! Citation page preview drawn on a ratatui canvas.

use ragchat_core::{OverlayRect, OverlaySurface, PageSize, Zoom};
use ratatui::{
    style::Color,
    symbols::Marker,
    widgets::{
        canvas::{Canvas, Context, Rectangle},
        Block,
    },
};

/// Highlight rectangles kept between frames.
///
/// The projector only calls back into the surface when the box set or the
/// zoom changes, so the last projection is stored here and painted every
/// frame.
#[derive(Debug, Default)]
pub struct CanvasOverlay {
    viewport: (f64, f64),
    rects: Vec<OverlayRect>,
}

impl OverlaySurface for CanvasOverlay {
    fn reset(&mut self, width: f64, height: f64) {
        self.viewport = (width, height);
        self.rects.clear();
    }

    fn draw(&mut self, rect: &OverlayRect) {
        self.rects.push(*rect);
    }
}

impl CanvasOverlay {
    pub fn rects(&self) -> &[OverlayRect] {
        &self.rects
    }

    /// Canvas showing the page outline and its highlights.
    ///
    /// The visible window is the page at [`Zoom::RESET`], anchored top-left,
    /// so zooming in past it clips the bottom and right of the page.
    pub fn canvas<'a>(&'a self, page: PageSize, block: Block<'a>) -> Canvas<'a, impl Fn(&mut Context) + 'a> {
        let window_width = page.width * Zoom::RESET;
        let window_height = page.height * Zoom::RESET;
        let (viewport_width, viewport_height) = self.viewport;

        Canvas::default()
            .block(block)
            .marker(Marker::Braille)
            .x_bounds([0.0, window_width])
            .y_bounds([0.0, window_height])
            .paint(move |ctx| {
                // Canvas y grows upward
                ctx.draw(&Rectangle {
                    x: 0.0,
                    y: window_height - viewport_height,
                    width: viewport_width,
                    height: viewport_height,
                    color: Color::DarkGray,
                });
                ctx.layer();
                for rect in &self.rects {
                    ctx.draw(&Rectangle {
                        x: rect.left,
                        y: window_height - rect.top - rect.height,
                        width: rect.width,
                        height: rect.height,
                        color: Color::Yellow,
                    });
                }
            })
    }
}
