//! Projection of citation bounding boxes onto a rendered page.
//!
//! Boxes arrive in page-native units with the origin at the bottom-left;
//! screens put the origin at the top-left. [`project`] is the pure transform,
//! [`HighlightProjector`] decides when to redraw and drives an
//! [`OverlaySurface`] supplied by the renderer.

use std::sync::OnceLock;

use regex::Regex;

use crate::state::BoundingBox;

/// Page dimensions in native units (PDF points).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    /// US Letter, used when a page does not declare its size
    pub const LETTER: PageSize = PageSize {
        width: 612.0,
        height: 792.0,
    };

    /// Read the first `/MediaBox [x0 y0 x1 y1]` from a PDF document.
    pub fn from_pdf(bytes: &[u8]) -> PageSize {
        static MEDIA_BOX: OnceLock<Regex> = OnceLock::new();
        let pattern = MEDIA_BOX.get_or_init(|| {
            let num = r"(-?\d+(?:\.\d+)?)";
            Regex::new(&format!(
                r"/MediaBox\s*\[\s*{num}\s+{num}\s+{num}\s+{num}\s*\]"
            ))
            .expect("valid regex")
        });

        let text = String::from_utf8_lossy(bytes);
        let size = pattern.captures(&text).and_then(|caps| {
            let coord = |i: usize| caps.get(i)?.as_str().parse::<f64>().ok();
            let (x0, y0, x1, y1) = (coord(1)?, coord(2)?, coord(3)?, coord(4)?);
            let size = PageSize {
                width: x1 - x0,
                height: y1 - y0,
            };
            (size.width > 0.0 && size.height > 0.0).then_some(size)
        });

        size.unwrap_or_else(|| {
            tracing::debug!("page has no usable MediaBox, assuming US Letter");
            PageSize::LETTER
        })
    }
}

/// Rendered viewport plus the page it shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub page_width: f64,
    pub page_height: f64,
}

impl PageGeometry {
    /// Viewport of a page rendered at `scale`.
    pub fn at_scale(page: PageSize, scale: f64) -> Self {
        Self {
            viewport_width: page.width * scale,
            viewport_height: page.height * scale,
            page_width: page.width,
            page_height: page.height,
        }
    }
}

/// Screen-space rectangle, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

pub fn project(geometry: &PageGeometry, boxes: &[BoundingBox]) -> Vec<OverlayRect> {
    let scale_x = geometry.viewport_width / geometry.page_width;
    let scale_y = geometry.viewport_height / geometry.page_height;

    boxes
        .iter()
        .filter_map(|bbox| bbox.rect)
        .map(|[x1, y1, x2, y2]| OverlayRect {
            left: x1 * scale_x,
            top: (geometry.page_height - y2) * scale_y,
            width: (x2 - x1) * scale_x,
            height: (y2 - y1) * scale_y,
        })
        .collect()
}

/// Content-derived identity of a box set.
pub fn boxes_key(boxes: &[BoundingBox]) -> String {
    if boxes.is_empty() {
        return "empty".to_string();
    }
    boxes
        .iter()
        .map(|bbox| match bbox.rect {
            Some(rect) => rect
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(","),
            None => String::new(),
        })
        .collect::<Vec<_>>()
        .join("|")
}

/// Where highlights get drawn. Implemented by the page renderer.
pub trait OverlaySurface {
    /// Remove every previously drawn highlight and size the layer.
    fn reset(&mut self, width: f64, height: f64);
    fn draw(&mut self, rect: &OverlayRect);
}

/// Redraws highlights only when the box set or the zoom changes.
#[derive(Debug, Default)]
pub struct HighlightProjector {
    drawn: Option<(String, f64)>,
}

impl HighlightProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn needs_redraw(&self, boxes: &[BoundingBox], scale: f64) -> bool {
        match &self.drawn {
            Some((key, drawn_scale)) => *drawn_scale != scale || *key != boxes_key(boxes),
            None => true,
        }
    }

    /// Forget what was drawn, e.g. after the page itself was re-rendered.
    pub fn invalidate(&mut self) {
        self.drawn = None;
    }

    /// Returns whether anything was redrawn.
    pub fn render<S: OverlaySurface + ?Sized>(
        &mut self,
        surface: &mut S,
        geometry: &PageGeometry,
        boxes: &[BoundingBox],
        scale: f64,
    ) -> bool {
        if !self.needs_redraw(boxes, scale) {
            return false;
        }

        surface.reset(geometry.viewport_width, geometry.viewport_height);
        let rects = project(geometry, boxes);
        for rect in &rects {
            surface.draw(rect);
        }
        tracing::debug!(count = rects.len(), scale, "drew highlights");

        self.drawn = Some((boxes_key(boxes), scale));
        true
    }
}

/// Zoom level for the page preview.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zoom(f64);

impl Zoom {
    pub const MIN: f64 = 0.5;
    pub const MAX: f64 = 3.0;
    pub const STEP: f64 = 0.25;
    pub const RESET: f64 = 1.5;

    pub fn scale(&self) -> f64 {
        self.0
    }

    pub fn zoom_in(&mut self) {
        self.0 = (self.0 + Self::STEP).min(Self::MAX);
    }

    pub fn zoom_out(&mut self) {
        self.0 = (self.0 - Self::STEP).max(Self::MIN);
    }

    pub fn reset(&mut self) {
        self.0 = Self::RESET;
    }

    pub fn percent(&self) -> u32 {
        (self.0 * 100.0).round() as u32
    }
}

impl Default for Zoom {
    fn default() -> Self {
        Zoom(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        size: Option<(f64, f64)>,
        rects: Vec<OverlayRect>,
        resets: usize,
    }

    impl OverlaySurface for Recorder {
        fn reset(&mut self, width: f64, height: f64) {
            self.size = Some((width, height));
            self.rects.clear();
            self.resets += 1;
        }

        fn draw(&mut self, rect: &OverlayRect) {
            self.rects.push(*rect);
        }
    }

    fn geometry() -> PageGeometry {
        PageGeometry {
            viewport_width: 1200.0,
            viewport_height: 1600.0,
            page_width: 600.0,
            page_height: 800.0,
        }
    }

    #[test]
    fn test_project_flips_vertical_axis() {
        let rects = project(&geometry(), &[BoundingBox::new(100.0, 100.0, 200.0, 200.0)]);
        assert_eq!(
            rects,
            vec![OverlayRect {
                left: 200.0,
                top: 1200.0,
                width: 200.0,
                height: 200.0
            }]
        );
    }

    #[test]
    fn test_project_skips_missing_boxes() {
        let boxes = vec![
            BoundingBox::default(),
            BoundingBox::new(0.0, 700.0, 600.0, 800.0),
        ];
        let rects = project(&geometry(), &boxes);
        assert_eq!(rects.len(), 1);
        assert_eq!(rects[0].top, 0.0);
        assert_eq!(rects[0].width, 1200.0);
    }

    #[test]
    fn test_at_scale() {
        let g = PageGeometry::at_scale(PageSize::LETTER, 1.5);
        assert_eq!(g.viewport_width, 918.0);
        assert_eq!(g.viewport_height, 1188.0);
    }

    #[test]
    fn test_boxes_key() {
        assert_eq!(boxes_key(&[]), "empty");
        let boxes = vec![BoundingBox::new(1.0, 2.0, 3.0, 4.5), BoundingBox::new(0.0, 0.0, 1.0, 1.0)];
        assert_eq!(boxes_key(&boxes), "1,2,3,4.5|0,0,1,1");
    }

    #[test]
    fn test_render_clears_before_drawing() {
        let mut projector = HighlightProjector::new();
        let mut surface = Recorder::default();
        let first = vec![BoundingBox::new(0.0, 0.0, 10.0, 10.0), BoundingBox::new(5.0, 5.0, 6.0, 6.0)];
        let second = vec![BoundingBox::new(1.0, 1.0, 2.0, 2.0)];

        assert!(projector.render(&mut surface, &geometry(), &first, 1.0));
        assert_eq!(surface.rects.len(), 2);

        assert!(projector.render(&mut surface, &geometry(), &second, 1.0));
        assert_eq!(surface.rects.len(), 1);
        assert_eq!(surface.resets, 2);
        assert_eq!(surface.size, Some((1200.0, 1600.0)));
    }

    #[test]
    fn test_render_skips_when_unchanged() {
        let mut projector = HighlightProjector::new();
        let mut surface = Recorder::default();
        let boxes = vec![BoundingBox::new(0.0, 0.0, 10.0, 10.0)];

        assert!(projector.render(&mut surface, &geometry(), &boxes, 1.0));
        // Equal content in a new allocation is the same box set
        assert!(!projector.render(&mut surface, &geometry(), &boxes.clone(), 1.0));
        assert!(projector.render(&mut surface, &geometry(), &boxes, 1.25));
        assert_eq!(surface.resets, 2);

        projector.invalidate();
        assert!(projector.needs_redraw(&boxes, 1.25));
    }

    #[test]
    fn test_zoom_bounds() {
        let mut zoom = Zoom::default();
        for _ in 0..20 {
            zoom.zoom_in();
        }
        assert_eq!(zoom.scale(), 3.0);
        for _ in 0..20 {
            zoom.zoom_out();
        }
        assert_eq!(zoom.scale(), 0.5);
        zoom.reset();
        assert_eq!(zoom.percent(), 150);
    }

    #[test]
    fn test_page_size_from_pdf() {
        let pdf = b"%PDF-1.4\n1 0 obj << /Type /Page /MediaBox [0 0 595.28 841.89] >> endobj";
        let size = PageSize::from_pdf(pdf);
        assert_eq!(size.width, 595.28);
        assert_eq!(size.height, 841.89);
    }

    #[test]
    fn test_page_size_fallback() {
        assert_eq!(PageSize::from_pdf(b"not a pdf"), PageSize::LETTER);
    }
}
