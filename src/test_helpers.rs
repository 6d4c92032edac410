//! Shared test utilities: synthetic images and encoded fixtures.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

/// Smooth RGB gradient; compresses well and survives JPEG with small deltas.
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    }))
}

pub fn solid_image(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
}

pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    crate::imaging::codec::encode(image, ImageFormat::Png).unwrap()
}

pub fn jpeg_bytes(image: &DynamicImage) -> Vec<u8> {
    crate::imaging::codec::encode(image, ImageFormat::Jpeg).unwrap()
}
