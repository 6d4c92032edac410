//! Transformation requests as they arrive from callers.
//!
//! A [`Transformation`] is a loosely typed value: a kind tag plus a map of
//! named options. It is turned into a validated
//! [`Operation`](crate::imaging::Operation) before any pixel work happens.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, fmt, str::FromStr};

/// Every transformation the engine knows how to apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformationKind {
    Resize,
    Crop,
    Rotate,
    Grayscale,
    Sepia,
    Invert,
    AdjustBrightness,
    AdjustContrast,
    AdjustSaturation,
    Blur,
    Sharpen,
}

impl TransformationKind {
    pub const ALL: [TransformationKind; 11] = [
        Self::Resize,
        Self::Crop,
        Self::Rotate,
        Self::Grayscale,
        Self::Sepia,
        Self::Invert,
        Self::AdjustBrightness,
        Self::AdjustContrast,
        Self::AdjustSaturation,
        Self::Blur,
        Self::Sharpen,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resize => "resize",
            Self::Crop => "crop",
            Self::Rotate => "rotate",
            Self::Grayscale => "grayscale",
            Self::Sepia => "sepia",
            Self::Invert => "invert",
            Self::AdjustBrightness => "adjust-brightness",
            Self::AdjustContrast => "adjust-contrast",
            Self::AdjustSaturation => "adjust-saturation",
            Self::Blur => "blur",
            Self::Sharpen => "sharpen",
        }
    }
}

impl fmt::Display for TransformationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a transformation tag is not one of [`TransformationKind::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported transformation type `{0}`")]
pub struct UnsupportedTransformation(pub String);

impl FromStr for TransformationKind {
    type Err = UnsupportedTransformation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnsupportedTransformation(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for TransformationKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One requested step: a kind plus its named options (`width`, `height`,
/// `angle`, `factor`).
///
/// Options stay as raw JSON values so that a wrong-typed option can be
/// reported against its key instead of failing the whole request body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    #[serde(rename = "type")]
    pub kind: TransformationKind,
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
}

impl Transformation {
    pub fn new(kind: TransformationKind) -> Self {
        Self {
            kind,
            options: BTreeMap::new(),
        }
    }

    /// Parse a kind tag, failing with the offending name.
    pub fn parse(kind: &str) -> Result<Self, UnsupportedTransformation> {
        Ok(Self::new(kind.parse()?))
    }

    /// Builder-style numeric option.
    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.options.insert(key.to_string(), Value::from(value));
        self
    }

    pub fn resize(width: u32, height: u32) -> Self {
        Self::new(TransformationKind::Resize)
            .with("width", f64::from(width))
            .with("height", f64::from(height))
    }
}
