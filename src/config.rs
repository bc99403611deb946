//! Editor configuration.
//!
//! Values come from `REGION_EDITOR_*` keys. Native hosts read them from the
//! process environment with [`EditorConfig::from_env`]; the browser host
//! passes its own lookup (for example, data attributes on the mount element)
//! to [`EditorConfig::from_lookup`]. Missing keys fall back to defaults;
//! present but invalid values are an error rather than being ignored.
//!
//! | Key | Default |
//! |-----|---------|
//! | `REGION_EDITOR_API_BASE` | `/api` |
//! | `REGION_EDITOR_MIN_ZOOM` | `0.3` |
//! | `REGION_EDITOR_MAX_ZOOM` | `3.0` |
//! | `REGION_EDITOR_ZOOM_STEP` | `0.1` |
//! | `REGION_EDITOR_MIN_EXTENT_PX` | `10.0` |
//! | `REGION_EDITOR_GRID_SPACING` | `50.0` |

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use crate::consts::{GRID_SPACING_PX, MIN_REGION_EXTENT_PX};
use crate::viewport::ZoomLimits;

pub const API_BASE_KEY: &str = "REGION_EDITOR_API_BASE";
pub const MIN_ZOOM_KEY: &str = "REGION_EDITOR_MIN_ZOOM";
pub const MAX_ZOOM_KEY: &str = "REGION_EDITOR_MAX_ZOOM";
pub const ZOOM_STEP_KEY: &str = "REGION_EDITOR_ZOOM_STEP";
pub const MIN_EXTENT_KEY: &str = "REGION_EDITOR_MIN_EXTENT_PX";
pub const GRID_SPACING_KEY: &str = "REGION_EDITOR_GRID_SPACING";

const DEFAULT_API_BASE: &str = "/api";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: expected a positive number, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("zoom bounds are inverted: min {min} > max {max}")]
    InvertedZoom { min: f64, max: f64 },
    #[error("REGION_EDITOR_API_BASE must not be empty")]
    EmptyApiBase,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditorConfig {
    pub zoom: ZoomLimits,
    /// Regions whose bounding box is narrower or shorter than this are flagged.
    pub min_region_extent_px: f64,
    /// Base URL of the region persistence API, without a trailing slash.
    pub api_base_url: String,
    /// Grid spacing in logical pixels.
    pub grid_spacing: f64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            zoom: ZoomLimits::default(),
            min_region_extent_px: MIN_REGION_EXTENT_PX,
            api_base_url: DEFAULT_API_BASE.to_owned(),
            grid_spacing: GRID_SPACING_PX,
        }
    }
}

impl EditorConfig {
    /// Build from the process environment.
    ///
    /// # Errors
    ///
    /// See [`Self::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| match std::env::var(key) {
            Ok(value) => Some(value),
            Err(_) => None,
        })
    }

    /// Build from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidNumber`] for unparsable, non-finite or
    /// non-positive numbers, [`ConfigError::InvertedZoom`] when the minimum
    /// zoom exceeds the maximum, and [`ConfigError::EmptyApiBase`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let number = |key: &'static str, default: f64| -> Result<f64, ConfigError> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => parse_positive(key, &raw),
            }
        };

        let zoom = ZoomLimits {
            min: number(MIN_ZOOM_KEY, defaults.zoom.min)?,
            max: number(MAX_ZOOM_KEY, defaults.zoom.max)?,
            step: number(ZOOM_STEP_KEY, defaults.zoom.step)?,
        };
        if zoom.min > zoom.max {
            return Err(ConfigError::InvertedZoom { min: zoom.min, max: zoom.max });
        }

        let api_base_url = match lookup(API_BASE_KEY) {
            None => defaults.api_base_url,
            Some(raw) => {
                let trimmed = raw.trim().trim_end_matches('/');
                if trimmed.is_empty() {
                    return Err(ConfigError::EmptyApiBase);
                }
                trimmed.to_owned()
            }
        };

        Ok(Self {
            zoom,
            min_region_extent_px: number(MIN_EXTENT_KEY, defaults.min_region_extent_px)?,
            api_base_url,
            grid_spacing: number(GRID_SPACING_KEY, defaults.grid_spacing)?,
        })
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<f64, ConfigError> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(ConfigError::InvalidNumber { key, value: raw.to_owned() }),
    }
}
