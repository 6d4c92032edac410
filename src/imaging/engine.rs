//! Transformation engine: applies [`Operation`]s to decoded images.
//!
//! The worker pool runs chains through the [`TransformBackend`] trait so the
//! pixel work can be swapped out (tests use gated and recording backends).
//! [`ImageEngine`] is the production implementation.
//!
//! | Operation | Primitive |
//! |---|---|
//! | Resize | `DynamicImage::resize_exact` (Lanczos3) |
//! | Crop | `DynamicImage::crop_imm`, centred |
//! | Rotate (right angles) | `rotate90` / `rotate180` / `rotate270` |
//! | Rotate (other) | `imageproc::geometric_transformations::rotate_about_center` |
//! | Grayscale / Invert | `DynamicImage::grayscale` / `invert` |
//! | Brightness / Contrast | `brighten` / `adjust_contrast` |
//! | Blur / Sharpen | `blur` / `unsharpen` |
//! | Sepia / Saturation | per-pixel colour matrix on RGBA8 |

use super::operation::{Operation, TransformError};
use crate::models::transformation::Transformation;
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};

/// Executes a validated chain on one image.
pub trait TransformBackend: Send + Sync {
    /// Apply `ops` left to right, each consuming the previous output.
    fn apply_chain(
        &self,
        image: DynamicImage,
        ops: &[Operation],
    ) -> Result<DynamicImage, TransformError>;
}

/// Pure Rust engine built on `image` and `imageproc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageEngine;

impl ImageEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn apply_operation(
        &self,
        image: DynamicImage,
        op: &Operation,
    ) -> Result<DynamicImage, TransformError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(TransformError::Failed {
                kind: op.kind(),
                reason: "image has no pixels".into(),
            });
        }
        let out = match *op {
            Operation::Resize { width, height } => {
                image.resize_exact(width, height, FilterType::Lanczos3)
            }
            Operation::Crop { width, height } => {
                let w = width.min(image.width());
                let h = height.min(image.height());
                let x = (image.width() - w) / 2;
                let y = (image.height() - h) / 2;
                image.crop_imm(x, y, w, h)
            }
            Operation::Rotate { degrees } => rotate(image, degrees),
            Operation::Grayscale => image.grayscale(),
            Operation::Invert => {
                let mut image = image;
                image.invert();
                image
            }
            Operation::Brightness { percent } => {
                image.brighten((percent * 2.55).round() as i32)
            }
            Operation::Contrast { percent } => image.adjust_contrast(percent),
            Operation::Saturation { percent } => saturate(&image, 1.0 + percent / 100.0),
            Operation::Sepia => sepia(&image),
            Operation::Blur { sigma } => image.blur(sigma),
            Operation::Sharpen { sigma } => image.unsharpen(sigma, 0),
        };
        Ok(out)
    }
}

impl TransformBackend for ImageEngine {
    fn apply_chain(
        &self,
        image: DynamicImage,
        ops: &[Operation],
    ) -> Result<DynamicImage, TransformError> {
        ops.iter().enumerate().try_fold(image, |img, (index, op)| {
            self.apply_operation(img, op)
                .map_err(|err| err.at_step(index, op.kind()))
        })
    }
}

/// Validate and apply a single caller-supplied transformation.
pub fn apply_one(
    image: DynamicImage,
    transformation: &Transformation,
) -> Result<DynamicImage, TransformError> {
    let op = Operation::from_transformation(transformation)?;
    ImageEngine.apply_operation(image, &op)
}

/// Validate and apply a caller-supplied chain, short-circuiting on the first
/// failing step.
pub fn apply_chain(
    image: DynamicImage,
    transformations: &[Transformation],
) -> Result<DynamicImage, TransformError> {
    let ops = super::operation::plan(transformations)?;
    ImageEngine.apply_chain(image, &ops)
}

fn rotate(image: DynamicImage, degrees: f32) -> DynamicImage {
    let normalized = degrees.rem_euclid(360.0);
    match normalized {
        d if d == 0.0 => image,
        d if d == 90.0 => image.rotate90(),
        d if d == 180.0 => image.rotate180(),
        d if d == 270.0 => image.rotate270(),
        d => DynamicImage::ImageRgba8(rotate_about_center(
            &image.to_rgba8(),
            d.to_radians(),
            Interpolation::Bilinear,
            Rgba([0, 0, 0, 0]),
        )),
    }
}

fn map_rgba(image: &DynamicImage, f: impl Fn([f32; 3]) -> [f32; 3]) -> DynamicImage {
    let mut buf: RgbaImage = image.to_rgba8();
    for px in buf.pixels_mut() {
        let [r, g, b, a] = px.0;
        let [r, g, b] = f([f32::from(r), f32::from(g), f32::from(b)]);
        *px = Rgba([clamp_u8(r), clamp_u8(g), clamp_u8(b), a]);
    }
    DynamicImage::ImageRgba8(buf)
}

fn sepia(image: &DynamicImage) -> DynamicImage {
    map_rgba(image, |[r, g, b]| {
        [
            0.393 * r + 0.769 * g + 0.189 * b,
            0.349 * r + 0.686 * g + 0.168 * b,
            0.272 * r + 0.534 * g + 0.131 * b,
        ]
    })
}

fn saturate(image: &DynamicImage, scale: f32) -> DynamicImage {
    map_rgba(image, |[r, g, b]| {
        let luma = 0.299 * r + 0.587 * g + 0.114 * b;
        [
            luma + (r - luma) * scale,
            luma + (g - luma) * scale,
            luma + (b - luma) * scale,
        ]
    })
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
