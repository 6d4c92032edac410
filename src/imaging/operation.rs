//! Validated, strongly typed transformation parameters.
//!
//! [`Operation::from_transformation`] is the only place option maps are
//! inspected. Everything downstream (the worker pool, the engine) works on
//! [`Operation`] values and never sees a missing or malformed key.
//!
//! ## Factor convention
//!
//! All `factor` options are percentages where 0 means "no change":
//!
//! | Kind | Range | Effect |
//! |---|---|---|
//! | `adjust-brightness` | -100..=100 | additive shift of `factor * 2.55` levels |
//! | `adjust-contrast` | -100..=100 | `image::imageops::contrast` percentage |
//! | `adjust-saturation` | -100..=500 | chroma scaled by `1 + factor / 100` |
//! | `blur` | (0, 100] | Gaussian sigma |
//! | `sharpen` | (0, 100] | unsharp-mask sigma |

use crate::models::transformation::{Transformation, TransformationKind};
use serde_json::Value;
use thiserror::Error;

/// Largest width/height accepted by resize and crop.
pub const MAX_DIMENSION: u32 = 16_384;

const MAX_SIGMA: f64 = 100.0;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("{kind} requires option `{key}`")]
    MissingOption {
        kind: TransformationKind,
        key: &'static str,
    },
    #[error("{kind} option `{key}` {reason}")]
    InvalidOption {
        kind: TransformationKind,
        key: &'static str,
        reason: String,
    },
    #[error("step {index} ({kind}) failed: {source}")]
    Step {
        index: usize,
        kind: TransformationKind,
        #[source]
        source: Box<TransformError>,
    },
    #[error("{kind} failed: {reason}")]
    Failed {
        kind: TransformationKind,
        reason: String,
    },
}

impl TransformError {
    /// Bad options are the caller's fault; a failing primitive is ours.
    pub fn is_invalid_input(&self) -> bool {
        match self {
            Self::MissingOption { .. } | Self::InvalidOption { .. } => true,
            Self::Step { source, .. } => source.is_invalid_input(),
            Self::Failed { .. } => false,
        }
    }

    pub(crate) fn at_step(self, index: usize, kind: TransformationKind) -> Self {
        Self::Step {
            index,
            kind,
            source: Box::new(self),
        }
    }
}

/// A transformation whose parameters have been checked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operation {
    Resize { width: u32, height: u32 },
    /// Centred crop, clamped to the image bounds.
    Crop { width: u32, height: u32 },
    /// Clockwise, in degrees, within `[0, 360)`.
    Rotate { degrees: f32 },
    Grayscale,
    Sepia,
    Invert,
    Brightness { percent: f32 },
    Contrast { percent: f32 },
    Saturation { percent: f32 },
    Blur { sigma: f32 },
    Sharpen { sigma: f32 },
}

impl Operation {
    pub fn from_transformation(t: &Transformation) -> Result<Self, TransformError> {
        let opts = Options {
            kind: t.kind,
            transformation: t,
        };
        let op = match t.kind {
            TransformationKind::Resize => Self::Resize {
                width: opts.dimension("width")?,
                height: opts.dimension("height")?,
            },
            TransformationKind::Crop => Self::Crop {
                width: opts.dimension("width")?,
                height: opts.dimension("height")?,
            },
            // Reduced before narrowing; huge f64 angles would become inf in f32
            TransformationKind::Rotate => Self::Rotate {
                degrees: opts.number("angle")?.rem_euclid(360.0) as f32,
            },
            TransformationKind::Grayscale => Self::Grayscale,
            TransformationKind::Sepia => Self::Sepia,
            TransformationKind::Invert => Self::Invert,
            TransformationKind::AdjustBrightness => Self::Brightness {
                percent: opts.factor_in(-100.0, 100.0)?,
            },
            TransformationKind::AdjustContrast => Self::Contrast {
                percent: opts.factor_in(-100.0, 100.0)?,
            },
            TransformationKind::AdjustSaturation => Self::Saturation {
                percent: opts.factor_in(-100.0, 500.0)?,
            },
            TransformationKind::Blur => Self::Blur {
                sigma: opts.sigma()?,
            },
            TransformationKind::Sharpen => Self::Sharpen {
                sigma: opts.sigma()?,
            },
        };
        Ok(op)
    }

    pub fn kind(&self) -> TransformationKind {
        match self {
            Self::Resize { .. } => TransformationKind::Resize,
            Self::Crop { .. } => TransformationKind::Crop,
            Self::Rotate { .. } => TransformationKind::Rotate,
            Self::Grayscale => TransformationKind::Grayscale,
            Self::Sepia => TransformationKind::Sepia,
            Self::Invert => TransformationKind::Invert,
            Self::Brightness { .. } => TransformationKind::AdjustBrightness,
            Self::Contrast { .. } => TransformationKind::AdjustContrast,
            Self::Saturation { .. } => TransformationKind::AdjustSaturation,
            Self::Blur { .. } => TransformationKind::Blur,
            Self::Sharpen { .. } => TransformationKind::Sharpen,
        }
    }
}

/// Validate a whole chain up front, reporting the first bad step.
pub fn plan(transformations: &[Transformation]) -> Result<Vec<Operation>, TransformError> {
    transformations
        .iter()
        .enumerate()
        .map(|(index, t)| {
            Operation::from_transformation(t).map_err(|err| err.at_step(index, t.kind))
        })
        .collect()
}

struct Options<'a> {
    kind: TransformationKind,
    transformation: &'a Transformation,
}

impl Options<'_> {
    fn number(&self, key: &'static str) -> Result<f64, TransformError> {
        let value = self
            .transformation
            .options
            .get(key)
            .ok_or(TransformError::MissingOption {
                kind: self.kind,
                key,
            })?;
        match value {
            Value::Number(n) => n
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or_else(|| self.invalid(key, "must be a finite number")),
            other => Err(self.invalid(key, format!("must be a number, got {other}"))),
        }
    }

    /// Truncates toward zero, then checks `1..=MAX_DIMENSION`.
    fn dimension(&self, key: &'static str) -> Result<u32, TransformError> {
        let raw = self.number(key)?.trunc();
        if raw < 1.0 || raw > f64::from(MAX_DIMENSION) {
            return Err(self.invalid(key, format!("must be between 1 and {MAX_DIMENSION}")));
        }
        Ok(raw as u32)
    }

    fn factor_in(&self, min: f64, max: f64) -> Result<f32, TransformError> {
        let v = self.number("factor")?;
        if !(min..=max).contains(&v) {
            return Err(self.invalid("factor", format!("must be between {min} and {max}")));
        }
        Ok(v as f32)
    }

    fn sigma(&self) -> Result<f32, TransformError> {
        let v = self.number("factor")?;
        if v <= 0.0 || v > MAX_SIGMA {
            return Err(self.invalid("factor", format!("must be in (0, {MAX_SIGMA}]")));
        }
        Ok(v as f32)
    }

    fn invalid(&self, key: &'static str, reason: impl Into<String>) -> TransformError {
        TransformError::InvalidOption {
            kind: self.kind,
            key,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn t(kind: TransformationKind) -> Transformation {
        Transformation::new(kind)
    }

    #[test]
    fn resize_missing_height_names_height() {
        let err = Operation::from_transformation(&t(TransformationKind::Resize).with("width", 10.0))
            .unwrap_err();
        assert!(matches!(err, TransformError::MissingOption { key: "height", .. }));
        assert!(err.is_invalid_input());
        assert_eq!(err.to_string(), "resize requires option `height`");
    }

    #[test]
    fn dimensions_are_truncated_not_rounded() {
        let op = Operation::from_transformation(
            &t(TransformationKind::Resize)
                .with("width", 10.9)
                .with("height", 3.2),
        )
        .unwrap();
        assert_eq!(op, Operation::Resize { width: 10, height: 3 });
    }

    #[test]
    fn sub_pixel_dimension_is_rejected() {
        let err = Operation::from_transformation(
            &t(TransformationKind::Crop).with("width", 0.9).with("height", 4.0),
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::InvalidOption { key: "width", .. }));
    }

    #[test]
    fn wrong_typed_option_is_reported_against_its_key() {
        let mut rotate = t(TransformationKind::Rotate);
        rotate.options.insert("angle".into(), json!("ninety"));
        let err = Operation::from_transformation(&rotate).unwrap_err();
        assert!(matches!(err, TransformError::InvalidOption { key: "angle", .. }));
    }

    #[test]
    fn rotation_angle_is_reduced_to_one_turn() {
        for (angle, expected) in [(720.0, 0.0), (-90.0, 270.0), (450.0, 90.0)] {
            let op = Operation::from_transformation(
                &t(TransformationKind::Rotate).with("angle", angle),
            )
            .unwrap();
            assert_eq!(op, Operation::Rotate { degrees: expected }, "{angle}");
        }

        let huge =
            Operation::from_transformation(&t(TransformationKind::Rotate).with("angle", 1e39))
                .unwrap();
        match huge {
            Operation::Rotate { degrees } => assert!((0.0..360.0).contains(&degrees)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn factor_kinds_require_factor() {
        for kind in [
            TransformationKind::AdjustBrightness,
            TransformationKind::AdjustContrast,
            TransformationKind::AdjustSaturation,
            TransformationKind::Blur,
            TransformationKind::Sharpen,
        ] {
            let err = Operation::from_transformation(&t(kind)).unwrap_err();
            assert!(
                matches!(err, TransformError::MissingOption { key: "factor", .. }),
                "{kind}: {err}"
            );
        }
    }

    #[test]
    fn factor_ranges_are_enforced() {
        let bright = t(TransformationKind::AdjustBrightness).with("factor", 101.0);
        assert!(Operation::from_transformation(&bright).is_err());

        let sat = t(TransformationKind::AdjustSaturation).with("factor", 250.0);
        assert_eq!(
            Operation::from_transformation(&sat).unwrap(),
            Operation::Saturation { percent: 250.0 }
        );

        let blur = t(TransformationKind::Blur).with("factor", 0.0);
        assert!(Operation::from_transformation(&blur).is_err());
    }

    #[test]
    fn parameterless_kinds_ignore_options() {
        let op = Operation::from_transformation(&t(TransformationKind::Sepia).with("factor", 3.0))
            .unwrap();
        assert_eq!(op, Operation::Sepia);
    }

    #[test]
    fn plan_reports_failing_step_index_and_kind() {
        let chain = vec![
            Transformation::resize(10, 10),
            t(TransformationKind::Grayscale),
            t(TransformationKind::Rotate),
        ];
        let err = plan(&chain).unwrap_err();
        match &err {
            TransformError::Step { index, kind, .. } => {
                assert_eq!(*index, 2);
                assert_eq!(*kind, TransformationKind::Rotate);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.is_invalid_input());
        assert!(err.to_string().contains("angle"));
    }

    #[test]
    fn plan_preserves_order() {
        let chain = vec![
            t(TransformationKind::Invert),
            Transformation::resize(4, 5),
        ];
        let ops = plan(&chain).unwrap();
        assert_eq!(
            ops,
            vec![Operation::Invert, Operation::Resize { width: 4, height: 5 }]
        );
    }

    #[test]
    fn failed_primitive_is_not_invalid_input() {
        let err = TransformError::Failed {
            kind: TransformationKind::Blur,
            reason: "boom".into(),
        }
        .at_step(0, TransformationKind::Blur);
        assert!(!err.is_invalid_input());
    }
}
