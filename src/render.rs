//! Rendering: draws the full editor scene onto a [`Surface`].
//!
//! [`draw`] is a pure function of its [`Scene`]: it clears the surface and
//! repaints everything, so calling it twice with the same scene produces the
//! same output. It never mutates editor state.
//!
//! Layers, bottom first:
//!
//! 1. clear
//! 2. background image scaled to the canvas (neutral fill when absent)
//! 3. regions in repository order: fill, stroke, optional name at the centroid
//! 4. the draft polygon with a live edge to the pointer, and vertex dots
//! 5. optional grid
//! 6. optional per-point index labels
//!
//! Regions are stored in logical space; every point is scaled to device space
//! here. Line widths and text sizes stay in device pixels so they read the
//! same at any zoom.

#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;

use crate::consts::FALLBACK_CANVAS_SIZE;
use crate::drawing::EditorState;
use crate::geometry::{Point, to_device};
use crate::region::{Region, RegionId};

/// Canvas colour when no background is loaded.
const NEUTRAL_BACKGROUND: &str = "#f0f2f5";

/// Stroke colour of the selected or edited region.
const HIGHLIGHT_COLOR: &str = "#fadb14";

/// Draft strokes and vertex dots.
const DRAFT_COLOR: &str = "#ff4d4f";

const GRID_COLOR: &str = "#ffffff";
const LABEL_COLOR: &str = "#ffffff";
const INDEX_LABEL_COLOR: &str = "#262626";

const FILL_ALPHA: f64 = 0.25;
const DISABLED_FILL_ALPHA: f64 = 0.08;
const DISABLED_STROKE_ALPHA: f64 = 0.45;
const GRID_ALPHA: f64 = 0.3;

const STROKE_WIDTH_PX: f64 = 2.0;
const HIGHLIGHT_WIDTH_PX: f64 = 3.0;
const VERTEX_RADIUS_PX: f64 = 4.0;
const NAME_FONT_PX: f64 = 14.0;
const INDEX_FONT_PX: f64 = 11.0;
/// Offset of a point index label from its vertex.
const INDEX_OFFSET_PX: f64 = 8.0;

/// How a path is painted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paint {
    pub fill: Option<&'static str>,
    pub stroke: Option<&'static str>,
    pub line_width: f64,
    pub dashed: bool,
    pub alpha: f64,
}

impl Paint {
    #[must_use]
    pub fn stroke(color: &'static str, line_width: f64) -> Self {
        Self { fill: None, stroke: Some(color), line_width, dashed: false, alpha: 1.0 }
    }

    #[must_use]
    pub fn fill(color: &'static str, alpha: f64) -> Self {
        Self { fill: Some(color), stroke: None, line_width: 0.0, dashed: false, alpha }
    }

    #[must_use]
    pub fn dashed(mut self) -> Self {
        self.dashed = true;
        self
    }

    #[must_use]
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }
}

/// Drawing target. Coordinates are device pixels.
pub trait Surface {
    type Error;

    /// Reset transforms and clear a `width` × `height` area.
    ///
    /// # Errors
    ///
    /// Backend failure.
    fn clear(&mut self, width: f64, height: f64) -> Result<(), Self::Error>;

    /// Fill the whole canvas with a solid colour.
    ///
    /// # Errors
    ///
    /// Backend failure.
    fn fill_canvas(&mut self, width: f64, height: f64, color: &'static str) -> Result<(), Self::Error>;

    /// Draw the background image stretched to `width` × `height`.
    ///
    /// # Errors
    ///
    /// Backend failure.
    fn background_image(&mut self, width: f64, height: f64) -> Result<(), Self::Error>;

    /// Stroke and/or fill a polyline.
    ///
    /// # Errors
    ///
    /// Backend failure.
    fn path(&mut self, points: &[Point], closed: bool, paint: Paint) -> Result<(), Self::Error>;

    /// Filled circle.
    ///
    /// # Errors
    ///
    /// Backend failure.
    fn dot(&mut self, center: Point, radius: f64, color: &'static str) -> Result<(), Self::Error>;

    /// Text centred on `at`.
    ///
    /// # Errors
    ///
    /// Backend failure.
    fn text(&mut self, text: &str, at: Point, color: &'static str, size_px: f64) -> Result<(), Self::Error>;
}

/// Display toggles.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayOptions {
    pub show_grid: bool,
    pub show_point_labels: bool,
    pub show_names: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self { show_grid: false, show_point_labels: false, show_names: true }
    }
}

/// Read-only view of everything [`draw`] needs.
#[derive(Debug, Clone, Copy)]
pub struct Scene<'a> {
    pub regions: &'a [Region],
    /// Natural size of the background image, if one is loaded.
    pub background: Option<(f64, f64)>,
    pub state: &'a EditorState,
    pub selected: Option<&'a RegionId>,
    pub scale: f64,
    pub display: DisplayOptions,
    /// Grid spacing in logical pixels.
    pub grid_spacing: f64,
}

impl Scene<'_> {
    /// Canvas size in device pixels.
    #[must_use]
    pub fn canvas_size(&self) -> (f64, f64) {
        let (w, h) = self.background.unwrap_or(FALLBACK_CANVAS_SIZE);
        (w * self.scale, h * self.scale)
    }

    fn is_highlighted(&self, id: &RegionId) -> bool {
        let editing = match self.state {
            EditorState::Editing(session) => Some(&session.id),
            _ => None,
        };
        self.selected == Some(id) || editing == Some(id)
    }

    fn device(&self, p: Point) -> Point {
        to_device(p, self.scale)
    }
}

/// Repaint the whole scene.
///
/// # Errors
///
/// The first surface failure; drawing stops there.
pub fn draw<S: Surface>(surface: &mut S, scene: &Scene<'_>) -> Result<(), S::Error> {
    let (width, height) = scene.canvas_size();

    surface.clear(width, height)?;
    if scene.background.is_some() {
        surface.background_image(width, height)?;
    } else {
        surface.fill_canvas(width, height, NEUTRAL_BACKGROUND)?;
    }

    for region in scene.regions {
        draw_region(surface, scene, region)?;
    }

    if let EditorState::Drawing(draft) = scene.state {
        draw_draft(surface, scene, &draft.points, draft.pointer)?;
    }

    if scene.display.show_grid {
        draw_grid(surface, scene, width, height)?;
    }

    if scene.display.show_point_labels {
        draw_point_labels(surface, scene)?;
    }

    Ok(())
}

// =============================================================
// Layers
// =============================================================

fn draw_region<S: Surface>(surface: &mut S, scene: &Scene<'_>, region: &Region) -> Result<(), S::Error> {
    let fields = &region.fields;
    let points: Vec<Point> = fields.shape.vertices().into_iter().map(|p| scene.device(p)).collect();
    if points.is_empty() {
        return Ok(());
    }
    let color = fields.kind.color();

    let fill_alpha = if fields.enabled { FILL_ALPHA } else { DISABLED_FILL_ALPHA };
    surface.path(&points, true, Paint::fill(color, fill_alpha))?;

    let stroke = if scene.is_highlighted(&region.id) {
        Paint::stroke(HIGHLIGHT_COLOR, HIGHLIGHT_WIDTH_PX)
    } else {
        Paint::stroke(color, STROKE_WIDTH_PX)
    };
    let stroke_alpha = if fields.enabled { 1.0 } else { DISABLED_STROKE_ALPHA };
    surface.path(&points, true, stroke.with_alpha(stroke_alpha))?;

    if scene.display.show_names {
        if let Some(c) = fields.shape.centroid() {
            surface.text(&fields.name, scene.device(c), LABEL_COLOR, NAME_FONT_PX)?;
        }
    }
    Ok(())
}

fn draw_draft<S: Surface>(
    surface: &mut S,
    scene: &Scene<'_>,
    points: &[Point],
    pointer: Option<Point>,
) -> Result<(), S::Error> {
    let device: Vec<Point> = points.iter().map(|p| scene.device(*p)).collect();
    let Some(&last) = device.last() else {
        return Ok(());
    };
    let paint = Paint::stroke(DRAFT_COLOR, STROKE_WIDTH_PX).dashed();

    if device.len() >= 2 {
        surface.path(&device, false, paint)?;
    }
    if let Some(pointer) = pointer {
        let live = scene.device(pointer);
        if live != last {
            surface.path(&[last, live], false, paint)?;
        }
    }
    for p in &device {
        surface.dot(*p, VERTEX_RADIUS_PX, DRAFT_COLOR)?;
    }
    Ok(())
}

fn draw_grid<S: Surface>(surface: &mut S, scene: &Scene<'_>, width: f64, height: f64) -> Result<(), S::Error> {
    let step = scene.grid_spacing * scene.scale;
    if !(step.is_finite() && step > 0.0) {
        return Ok(());
    }
    let paint = Paint::stroke(GRID_COLOR, 1.0).with_alpha(GRID_ALPHA);

    let mut x = step;
    while x < width {
        surface.path(&[Point::new(x, 0.0), Point::new(x, height)], false, paint)?;
        x += step;
    }
    let mut y = step;
    while y < height {
        surface.path(&[Point::new(0.0, y), Point::new(width, y)], false, paint)?;
        y += step;
    }
    Ok(())
}

fn draw_point_labels<S: Surface>(surface: &mut S, scene: &Scene<'_>) -> Result<(), S::Error> {
    let draft = match scene.state {
        EditorState::Drawing(draft) => draft.points.clone(),
        _ => Vec::new(),
    };
    let polygons = scene
        .regions
        .iter()
        .map(|r| r.fields.shape.vertices())
        .chain(std::iter::once(draft));

    for vertices in polygons {
        for (i, p) in vertices.into_iter().enumerate() {
            let at = scene.device(p);
            let label = (i + 1).to_string();
            surface.text(
                &label,
                Point::new(at.x + INDEX_OFFSET_PX, at.y - INDEX_OFFSET_PX),
                INDEX_LABEL_COLOR,
                INDEX_FONT_PX,
            )?;
        }
    }
    Ok(())
}
