//! Export and import of a camera's region configuration as JSON.
//!
//! Document shape:
//!
//! ```json
//! { "camera": "cam-1", "regions": [ { "id": "...", "name": "...", ... } ], "timestamp": "2024-03-05T14:07:09Z" }
//! ```
//!
//! Import is all-or-nothing: a document with any invalid entry is rejected
//! as a whole and nothing is applied.

#[cfg(test)]
#[path = "config_io_test.rs"]
mod config_io_test;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::region::{Region, RegionFields, RegionId, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to serialize regions: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ImportError {
    #[error("not valid JSON: {0}")]
    Json(String),
    #[error("configuration must be a JSON object")]
    NotObject,
    #[error("configuration has no \"regions\" field")]
    MissingRegions,
    #[error("\"regions\" must be a list")]
    RegionsNotList,
    #[error("region {index} is malformed: {reason}")]
    MalformedRegion { index: usize, reason: String },
    #[error("region {index} is invalid: {source}")]
    InvalidRegion { index: usize, source: ValidationError },
}

/// A file ready for the host to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub filename: String,
    pub contents: String,
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    camera: &'a str,
    regions: &'a [Region],
    timestamp: String,
}

/// One region read from a configuration file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImportedRegion {
    /// Id from the source system; never reused, the gateway assigns new ones.
    #[serde(default)]
    pub id: Option<RegionId>,
    #[serde(flatten)]
    pub fields: RegionFields,
}

/// A validated configuration document.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedConfig {
    pub camera: Option<String>,
    pub timestamp: Option<String>,
    pub regions: Vec<ImportedRegion>,
}

impl ImportedConfig {
    /// Fields of every imported region, in file order.
    #[must_use]
    pub fn into_fields(self) -> Vec<RegionFields> {
        self.regions.into_iter().map(|r| r.fields).collect()
    }
}

/// How imported regions combine with the existing set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Delete every existing region, then create the imported ones.
    Replace,
    /// Create the imported regions alongside the existing ones.
    Append,
}

/// Serialize `regions` for `camera`.
///
/// The filename is `region-config-<camera>-<epochMillis>.json`.
///
/// # Errors
///
/// Serialization or timestamp formatting failure.
pub fn export_config(camera: &str, regions: &[Region], now: OffsetDateTime) -> Result<ExportedFile, ExportError> {
    let doc = ExportDocument { camera, regions, timestamp: now.format(&Rfc3339)? };
    let contents = serde_json::to_string_pretty(&doc)?;
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    Ok(ExportedFile { filename: format!("region-config-{camera}-{millis}.json"), contents })
}

/// Parse and validate a configuration document.
///
/// # Errors
///
/// The first structural problem found, or the first region that is malformed
/// or fails validation (with its index).
pub fn import_config(json: &str) -> Result<ImportedConfig, ImportError> {
    let doc: Value = serde_json::from_str(json).map_err(|e| ImportError::Json(e.to_string()))?;
    let Value::Object(mut doc) = doc else {
        return Err(ImportError::NotObject);
    };
    let entries = match doc.remove("regions") {
        None => return Err(ImportError::MissingRegions),
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(ImportError::RegionsNotList),
    };

    let mut regions = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let region: ImportedRegion = serde_json::from_value(entry)
            .map_err(|e| ImportError::MalformedRegion { index, reason: e.to_string() })?;
        region
            .fields
            .validate()
            .map_err(|source| ImportError::InvalidRegion { index, source })?;
        regions.push(region);
    }

    Ok(ImportedConfig {
        camera: string_field(&doc, "camera"),
        timestamp: string_field(&doc, "timestamp"),
        regions,
    })
}

fn string_field(doc: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    doc.get(key).and_then(Value::as_str).map(str::to_owned)
}
