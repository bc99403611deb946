//! Coordinate transforms between pointer events and the logical canvas.
//!
//! Three spaces are involved:
//!
//! - **client**: coordinates reported by pointer events, relative to the page.
//! - **device**: pixels inside the canvas element (client minus the canvas origin).
//! - **logical**: pixels of the background image, invariant under zoom.
//!
//! Region points are always stored in logical space. Zoom only changes the
//! scale used when converting, never the stored points.

#[cfg(test)]
#[path = "viewport_test.rs"]
mod viewport_test;

use crate::consts::{MAX_SCALE, MIN_SCALE, SCALE_STEP};
use crate::geometry::{Point, to_device, to_logical};

/// Origin of the canvas element in client space, as reported by `getBoundingClientRect`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClientRect {
    pub left: f64,
    pub top: f64,
}

impl ClientRect {
    #[must_use]
    pub fn new(left: f64, top: f64) -> Self {
        Self { left, top }
    }
}

/// Bounds and step for zooming.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomLimits {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self { min: MIN_SCALE, max: MAX_SCALE, step: SCALE_STEP }
    }
}

/// Current zoom scale plus the conversions that depend on it.
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    scale: f64,
    limits: ZoomLimits,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(ZoomLimits::default())
    }
}

impl Viewport {
    #[must_use]
    pub fn new(limits: ZoomLimits) -> Self {
        Self { scale: 1.0_f64.clamp(limits.min, limits.max), limits }
    }

    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[must_use]
    pub fn limits(&self) -> ZoomLimits {
        self.limits
    }

    /// Set the scale, clamped to the limits. Returns whether it changed.
    pub fn set_scale(&mut self, scale: f64) -> bool {
        if !scale.is_finite() {
            return false;
        }
        // Round away float drift from repeated steps (0.1 + 0.2 ...), then
        // clamp so the result never leaves the limits.
        let next = ((scale * 1000.0).round() / 1000.0).clamp(self.limits.min, self.limits.max);
        if (next - self.scale).abs() < f64::EPSILON {
            return false;
        }
        self.scale = next;
        true
    }

    pub fn zoom_in(&mut self) -> bool {
        self.set_scale(self.scale + self.limits.step)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.set_scale(self.scale - self.limits.step)
    }

    pub fn reset_zoom(&mut self) -> bool {
        self.set_scale(1.0)
    }

    /// Client coordinates to canvas-relative device pixels.
    #[must_use]
    pub fn device_point(client: Point, rect: ClientRect) -> Point {
        Point::new(client.x - rect.left, client.y - rect.top)
    }

    /// Client coordinates straight to logical coordinates.
    #[must_use]
    pub fn logical_from_event(&self, client: Point, rect: ClientRect) -> Point {
        to_logical(Self::device_point(client, rect), self.scale)
    }

    /// Logical coordinates to canvas-relative device pixels.
    #[must_use]
    pub fn device_from_logical(&self, logical: Point) -> Point {
        to_device(logical, self.scale)
    }

    /// Logical coordinates to client space, for positioning overlays such as tooltips.
    #[must_use]
    pub fn client_from_logical(&self, logical: Point, rect: ClientRect) -> Point {
        let device = self.device_from_logical(logical);
        Point::new(device.x + rect.left, device.y + rect.top)
    }

    /// Device size of a canvas showing a background of the given natural size.
    #[must_use]
    pub fn canvas_size(&self, natural: (f64, f64)) -> (f64, f64) {
        (natural.0 * self.scale, natural.1 * self.scale)
    }
}
