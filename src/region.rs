//! Region model: detection zones, their parameters, and validation.
//!
//! A saved [`Region`] is an id plus [`RegionFields`]. Drafts never carry an
//! id, so an unsaved region cannot be mistaken for a persisted one. The
//! [`RegionForm`] is the operator-editable working copy used both for the
//! next region to be drawn and for editing an existing one; it only turns
//! into `RegionFields` through validation. [`RegionPatch`] is the sparse
//! update sent to the gateway.

#[cfg(test)]
#[path = "region_test.rs"]
mod region_test;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::consts::{MAX_NAME_CHARS, MAX_SENSITIVITY, MIN_NAME_CHARS, MIN_POLYGON_POINTS};
use crate::geometry::Shape;

/// Gateway-assigned region identifier.
///
/// Backends differ on whether ids are strings or integers; both are accepted
/// on input and the id is always written back as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RegionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Signed(n) => Self(n.to_string()),
            Raw::Unsigned(n) => Self(n.to_string()),
        })
    }
}

/// Zone category. Drives default parameters, label, and render color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Entrance,
    Handwash,
    Sanitize,
    WorkArea,
    Restricted,
    Monitoring,
    Custom,
    Detection,
    Intrusion,
    Loitering,
    Counting,
}

/// Default detection parameters for a kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preset {
    pub sensitivity: f64,
    pub threshold: f64,
}

impl RegionKind {
    /// Every kind, in menu order.
    pub const ALL: [Self; 11] = [
        Self::Entrance,
        Self::Handwash,
        Self::Sanitize,
        Self::WorkArea,
        Self::Restricted,
        Self::Monitoring,
        Self::Custom,
        Self::Detection,
        Self::Intrusion,
        Self::Loitering,
        Self::Counting,
    ];

    /// Wire name, as used in the `type` field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entrance => "entrance",
            Self::Handwash => "handwash",
            Self::Sanitize => "sanitize",
            Self::WorkArea => "work_area",
            Self::Restricted => "restricted",
            Self::Monitoring => "monitoring",
            Self::Custom => "custom",
            Self::Detection => "detection",
            Self::Intrusion => "intrusion",
            Self::Loitering => "loitering",
            Self::Counting => "counting",
        }
    }

    /// Operator-facing label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Entrance => "Entrance",
            Self::Handwash => "Handwash",
            Self::Sanitize => "Sanitize",
            Self::WorkArea => "Work Area",
            Self::Restricted => "Restricted",
            Self::Monitoring => "Monitoring",
            Self::Custom => "Custom",
            Self::Detection => "Detection",
            Self::Intrusion => "Intrusion",
            Self::Loitering => "Loitering",
            Self::Counting => "Counting",
        }
    }

    /// CSS color used for fill and stroke.
    #[must_use]
    pub fn color(self) -> &'static str {
        match self {
            Self::Entrance => "#1890ff",
            Self::Handwash => "#52c41a",
            Self::Sanitize => "#13c2c2",
            Self::WorkArea => "#faad14",
            Self::Restricted => "#f5222d",
            Self::Monitoring => "#722ed1",
            Self::Custom => "#8c8c8c",
            Self::Detection => "#2f54eb",
            Self::Intrusion => "#cf1322",
            Self::Loitering => "#fa8c16",
            Self::Counting => "#eb2f96",
        }
    }

    #[must_use]
    pub fn preset(self) -> Preset {
        let (sensitivity, threshold) = match self {
            Self::Entrance | Self::Detection => (60.0, 0.7),
            Self::Handwash | Self::Sanitize => (70.0, 0.75),
            Self::WorkArea | Self::Monitoring | Self::Counting => (50.0, 0.6),
            Self::Restricted => (85.0, 0.85),
            Self::Custom => (50.0, 0.5),
            Self::Intrusion => (80.0, 0.8),
            Self::Loitering => (55.0, 0.65),
        };
        Preset { sensitivity, threshold }
    }
}

fn default_enabled() -> bool {
    true
}

/// Everything about a region except its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionFields {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RegionKind,
    #[serde(flatten)]
    pub shape: Shape,
    pub sensitivity: f64,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_delay: Option<u32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RegionFields {
    /// Fields for `kind` with its preset parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: RegionKind, shape: Shape) -> Self {
        let preset = kind.preset();
        Self {
            name: name.into(),
            kind,
            shape,
            sensitivity: preset.sensitivity,
            threshold: preset.threshold,
            interval: None,
            min_size: None,
            alert_delay: None,
            enabled: true,
        }
    }

    /// Check the persistence preconditions.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        validate_parameters(self.sensitivity, self.threshold)?;
        let count = self.shape.vertex_count();
        if count < MIN_POLYGON_POINTS {
            return Err(ValidationError::TooFewPoints(count));
        }
        Ok(())
    }
}

/// A persisted region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    #[serde(flatten)]
    pub fields: RegionFields,
}

impl Region {
    #[must_use]
    pub fn new(id: RegionId, fields: RegionFields) -> Self {
        Self { id, fields }
    }
}

/// Form field a validation error belongs to, for inline display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Name,
    Type,
    Points,
    Sensitivity,
    Threshold,
}

/// A violated persistence constraint.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("region name is required")]
    NameEmpty,
    #[error("region name must be 2-50 characters (got {0})")]
    NameLength(usize),
    #[error("region type is required")]
    MissingType,
    #[error("a region needs at least 3 points (got {0})")]
    TooFewPoints(usize),
    #[error("sensitivity must be between 0 and 100 (got {0})")]
    SensitivityOutOfRange(f64),
    #[error("threshold must be between 0 and 1 (got {0})")]
    ThresholdOutOfRange(f64),
}

impl ValidationError {
    #[must_use]
    pub fn field(&self) -> FormField {
        match self {
            Self::NameEmpty | Self::NameLength(_) => FormField::Name,
            Self::MissingType => FormField::Type,
            Self::TooFewPoints(_) => FormField::Points,
            Self::SensitivityOutOfRange(_) => FormField::Sensitivity,
            Self::ThresholdOutOfRange(_) => FormField::Threshold,
        }
    }
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    let len = name.trim().chars().count();
    if len == 0 {
        return Err(ValidationError::NameEmpty);
    }
    if !(MIN_NAME_CHARS..=MAX_NAME_CHARS).contains(&len) {
        return Err(ValidationError::NameLength(len));
    }
    Ok(())
}

fn validate_parameters(sensitivity: f64, threshold: f64) -> Result<(), ValidationError> {
    if !(0.0..=MAX_SENSITIVITY).contains(&sensitivity) {
        return Err(ValidationError::SensitivityOutOfRange(sensitivity));
    }
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ValidationError::ThresholdOutOfRange(threshold));
    }
    Ok(())
}

/// Operator-editable working copy of a region's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionForm {
    pub name: String,
    pub kind: Option<RegionKind>,
    pub sensitivity: f64,
    pub threshold: f64,
    pub interval: Option<u32>,
    pub min_size: Option<u32>,
    pub alert_delay: Option<u32>,
    pub enabled: bool,
}

impl Default for RegionForm {
    fn default() -> Self {
        Self::for_kind(RegionKind::Entrance)
    }
}

impl RegionForm {
    /// Blank form preset for `kind`.
    #[must_use]
    pub fn for_kind(kind: RegionKind) -> Self {
        let preset = kind.preset();
        Self {
            name: String::new(),
            kind: Some(kind),
            sensitivity: preset.sensitivity,
            threshold: preset.threshold,
            interval: None,
            min_size: None,
            alert_delay: None,
            enabled: true,
        }
    }

    /// Working copy of existing fields.
    #[must_use]
    pub fn from_fields(fields: &RegionFields) -> Self {
        Self {
            name: fields.name.clone(),
            kind: Some(fields.kind),
            sensitivity: fields.sensitivity,
            threshold: fields.threshold,
            interval: fields.interval,
            min_size: fields.min_size,
            alert_delay: fields.alert_delay,
            enabled: fields.enabled,
        }
    }

    /// Switch kind and load its preset parameters.
    pub fn apply_kind(&mut self, kind: RegionKind) {
        let preset = kind.preset();
        self.kind = Some(kind);
        self.sensitivity = preset.sensitivity;
        self.threshold = preset.threshold;
    }

    /// Validate and combine with `shape`.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint; the type is checked before the name.
    pub fn build(&self, shape: Shape) -> Result<RegionFields, ValidationError> {
        let kind = self.kind.ok_or(ValidationError::MissingType)?;
        let fields = RegionFields {
            name: self.name.trim().to_owned(),
            kind,
            shape,
            sensitivity: self.sensitivity,
            threshold: self.threshold,
            interval: self.interval,
            min_size: self.min_size,
            alert_delay: self.alert_delay,
            enabled: self.enabled,
        };
        fields.validate()?;
        Ok(fields)
    }
}

/// Sparse update for a region. Only present fields are sent.
#[allow(clippy::option_option)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<RegionKind>,
    #[serde(flatten)]
    pub shape: Option<Shape>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// `Some(None)` clears the value (sent as `null`).
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub interval: Option<Option<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub min_size: Option<Option<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub alert_delay: Option<Option<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// A key that is present deserializes to `Some`, even when its value is `null`.
#[allow(clippy::option_option)]
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl RegionPatch {
    /// Patch that only toggles `enabled`.
    #[must_use]
    pub fn enabled(enabled: bool) -> Self {
        Self { enabled: Some(enabled), ..Self::default() }
    }

    /// Fields that differ between `before` and `after`. A timing field that
    /// `after` clears is carried as `Some(None)`.
    #[must_use]
    pub fn diff(before: &RegionFields, after: &RegionFields) -> Self {
        fn changed<T: PartialEq + Clone>(a: &T, b: &T) -> Option<T> {
            (a != b).then(|| b.clone())
        }
        Self {
            name: changed(&before.name, &after.name),
            kind: changed(&before.kind, &after.kind),
            shape: changed(&before.shape, &after.shape),
            sensitivity: changed(&before.sensitivity, &after.sensitivity),
            threshold: changed(&before.threshold, &after.threshold),
            interval: changed(&before.interval, &after.interval),
            min_size: changed(&before.min_size, &after.min_size),
            alert_delay: changed(&before.alert_delay, &after.alert_delay),
            enabled: changed(&before.enabled, &after.enabled),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply every present field to `fields`.
    pub fn apply_to(&self, fields: &mut RegionFields) {
        if let Some(ref name) = self.name {
            fields.name.clone_from(name);
        }
        if let Some(kind) = self.kind {
            fields.kind = kind;
        }
        if let Some(ref shape) = self.shape {
            fields.shape = shape.clone();
        }
        if let Some(s) = self.sensitivity {
            fields.sensitivity = s;
        }
        if let Some(t) = self.threshold {
            fields.threshold = t;
        }
        if let Some(v) = self.interval {
            fields.interval = v;
        }
        if let Some(v) = self.min_size {
            fields.min_size = v;
        }
        if let Some(v) = self.alert_delay {
            fields.alert_delay = v;
        }
        if let Some(e) = self.enabled {
            fields.enabled = e;
        }
    }
}
