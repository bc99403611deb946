//! Browser implementation of [`Surface`] over a 2D canvas context.
//!
//! This module is the only place that touches
//! [`web_sys::CanvasRenderingContext2d`]. The context is acquired once when
//! the editor mounts and released when it is torn down; every fallible
//! `Canvas2D` call propagates its `JsValue` error.

use std::f64::consts::TAU;

use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement};

use crate::geometry::Point;
use crate::render::{Paint, Surface};
use crate::viewport::ClientRect;

/// Dash segment length in device pixels.
const DASH_PX: f64 = 6.0;

/// An acquired 2D drawing context plus the background image, if any.
pub struct CanvasHandle {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    image: Option<HtmlImageElement>,
}

impl CanvasHandle {
    /// Acquire the 2D context of `canvas`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the browser refuses a 2D context.
    pub fn acquire(canvas: HtmlCanvasElement) -> Result<Self, JsValue> {
        let ctx = canvas
            .get_context("2d")?
            .ok_or_else(|| JsValue::from_str("2d canvas context unavailable"))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(JsValue::from)?;
        Ok(Self { canvas, ctx, image: None })
    }

    /// Replace the background image drawn under the regions.
    pub fn set_image(&mut self, image: Option<HtmlImageElement>) {
        self.image = image;
    }

    /// Match the element's pixel size to the scaled canvas size.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn resize(&self, width: f64, height: f64) {
        let (w, h) = (width.round().max(0.0) as u32, height.round().max(0.0) as u32);
        if self.canvas.width() != w {
            self.canvas.set_width(w);
        }
        if self.canvas.height() != h {
            self.canvas.set_height(h);
        }
    }

    /// Canvas origin in client space, for pointer conversion.
    #[must_use]
    pub fn client_rect(&self) -> ClientRect {
        let rect = self.canvas.get_bounding_client_rect();
        ClientRect::new(rect.left(), rect.top())
    }

    /// Clear the canvas and hand the element back.
    #[must_use]
    pub fn release(self) -> HtmlCanvasElement {
        let (w, h) = (f64::from(self.canvas.width()), f64::from(self.canvas.height()));
        self.ctx.clear_rect(0.0, 0.0, w, h);
        self.canvas
    }
}

impl Surface for CanvasHandle {
    type Error = JsValue;

    fn clear(&mut self, width: f64, height: f64) -> Result<(), JsValue> {
        self.resize(width, height);
        self.ctx.set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)?;
        self.ctx.set_global_alpha(1.0);
        self.ctx.clear_rect(0.0, 0.0, width, height);
        Ok(())
    }

    fn fill_canvas(&mut self, width: f64, height: f64, color: &'static str) -> Result<(), JsValue> {
        self.ctx.set_fill_style_str(color);
        self.ctx.fill_rect(0.0, 0.0, width, height);
        Ok(())
    }

    fn background_image(&mut self, width: f64, height: f64) -> Result<(), JsValue> {
        if let Some(image) = &self.image {
            self.ctx
                .draw_image_with_html_image_element_and_dw_and_dh(image, 0.0, 0.0, width, height)?;
        }
        Ok(())
    }

    fn path(&mut self, points: &[Point], closed: bool, paint: Paint) -> Result<(), JsValue> {
        let Some((first, rest)) = points.split_first() else {
            return Ok(());
        };
        let ctx = &self.ctx;
        ctx.save();
        ctx.set_global_alpha(paint.alpha);
        ctx.begin_path();
        ctx.move_to(first.x, first.y);
        for p in rest {
            ctx.line_to(p.x, p.y);
        }
        if closed {
            ctx.close_path();
        }
        if let Some(fill) = paint.fill {
            ctx.set_fill_style_str(fill);
            ctx.fill();
        }
        if let Some(stroke) = paint.stroke {
            ctx.set_stroke_style_str(stroke);
            ctx.set_line_width(paint.line_width);
            if paint.dashed {
                let dash_array = js_sys::Array::new();
                dash_array.push(&DASH_PX.into());
                dash_array.push(&DASH_PX.into());
                ctx.set_line_dash(&dash_array)?;
            }
            ctx.stroke();
        }
        ctx.restore();
        Ok(())
    }

    fn dot(&mut self, center: Point, radius: f64, color: &'static str) -> Result<(), JsValue> {
        self.ctx.begin_path();
        self.ctx.arc(center.x, center.y, radius, 0.0, TAU)?;
        self.ctx.set_fill_style_str(color);
        self.ctx.fill();
        Ok(())
    }

    fn text(&mut self, text: &str, at: Point, color: &'static str, size_px: f64) -> Result<(), JsValue> {
        self.ctx.set_font(&format!("{size_px:.0}px sans-serif"));
        self.ctx.set_text_align("center");
        self.ctx.set_text_baseline("middle");
        self.ctx.set_fill_style_str(color);
        self.ctx.fill_text(text, at.x, at.y)?;
        Ok(())
    }
}
