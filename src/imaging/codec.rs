//! Byte-level codec: raw bytes ⇄ [`DynamicImage`].
//!
//! Only PNG and JPEG are accepted. The format detected on decode is the one
//! used to re-encode, so callers carry it alongside the image.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ImageFormat};
use thiserror::Error;

/// Quality used for every JPEG re-encode.
pub const JPEG_QUALITY: u8 = 90;

const SUPPORTED_FORMATS: [ImageFormat; 2] = [ImageFormat::Png, ImageFormat::Jpeg];

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unsupported image format (expected PNG or JPEG)")]
    Unsupported,
    #[error("failed to decode {format:?} image: {source}")]
    Decode {
        format: ImageFormat,
        #[source]
        source: image::ImageError,
    },
    #[error("cannot encode to {0:?}")]
    UnsupportedEncoding(ImageFormat),
    #[error("failed to encode {format:?} image: {source}")]
    Encode {
        format: ImageFormat,
        #[source]
        source: image::ImageError,
    },
}

impl CodecError {
    /// Decode failures are the caller's fault; encode failures are ours.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::Unsupported | Self::Decode { .. })
    }
}

pub fn is_supported(format: ImageFormat) -> bool {
    SUPPORTED_FORMATS.contains(&format)
}

/// Detect the encoding of `bytes` and decode them.
pub fn decode(bytes: &[u8]) -> Result<(DynamicImage, ImageFormat), CodecError> {
    let format = image::guess_format(bytes).map_err(|_| CodecError::Unsupported)?;
    if !is_supported(format) {
        return Err(CodecError::Unsupported);
    }
    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|source| CodecError::Decode { format, source })?;
    Ok((image, format))
}

/// Encode `image` in `format`, which must be PNG or JPEG.
pub fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    let result = match format {
        ImageFormat::Png => image.write_with_encoder(PngEncoder::new(&mut buf)),
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
            // JPEG has no alpha and no 16-bit samples
            match image.color() {
                ColorType::L8 | ColorType::Rgb8 => image.write_with_encoder(encoder),
                _ => DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder),
            }
        }
        other => return Err(CodecError::UnsupportedEncoding(other)),
    };
    result.map_err(|source| CodecError::Encode { format, source })?;
    Ok(buf)
}

/// MIME type for a supported format.
pub fn content_type(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        _ => "application/octet-stream",
    }
}
