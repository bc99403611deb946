//! Shared numeric constants for the region editor.

// ── Regions ─────────────────────────────────────────────────────

/// Fewest vertices that can form a region.
pub const MIN_POLYGON_POINTS: usize = 3;

/// Shortest accepted region name, in characters after trimming.
pub const MIN_NAME_CHARS: usize = 2;

/// Longest accepted region name, in characters after trimming.
pub const MAX_NAME_CHARS: usize = 50;

/// Upper bound of the sensitivity knob.
pub const MAX_SENSITIVITY: f64 = 100.0;

// ── Geometry ────────────────────────────────────────────────────

/// Bounding-box extent in logical pixels below which a region is flagged.
pub const MIN_REGION_EXTENT_PX: f64 = 10.0;

// ── Zoom ────────────────────────────────────────────────────────

/// Smallest zoom scale.
pub const MIN_SCALE: f64 = 0.3;

/// Largest zoom scale.
pub const MAX_SCALE: f64 = 3.0;

/// Additive scale change per zoom step.
pub const SCALE_STEP: f64 = 0.1;

// ── Rendering ───────────────────────────────────────────────────

/// Grid spacing in logical pixels.
pub const GRID_SPACING_PX: f64 = 50.0;

/// Canvas size used when no background is loaded.
pub const FALLBACK_CANVAS_SIZE: (f64, f64) = (800.0, 600.0);
