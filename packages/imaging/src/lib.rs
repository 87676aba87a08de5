//! CPU-bound image transforms used by the pipeline.
//!
//! Everything here is synchronous; callers run it on the blocking pool.

mod flip;
mod normalize;
mod resize;

pub use flip::flip_horizontal_png;
pub use normalize::{EncodedImage, normalize_for_removal};
pub use resize::{DEFAULT_MAX_DIMENSION, fit_within};

/// Errors from decoding or re-encoding an image.
#[derive(Debug, thiserror::Error)]
pub enum ImagingError {
    #[error("could not decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("could not encode image as {format}: {source}")]
    Encode {
        format: &'static str,
        #[source]
        source: image::ImageError,
    },

    #[error("unrecognized image format")]
    UnknownFormat,
}

/// Encode `image` in `format` into a fresh buffer.
fn encode(
    image: &image::DynamicImage,
    format: image::ImageFormat,
) -> Result<Vec<u8>, ImagingError> {
    let mut out = std::io::Cursor::new(Vec::new());
    // JPEG has no alpha channel.
    let result = if format == image::ImageFormat::Jpeg {
        image::DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut out, format)
    } else {
        image.write_to(&mut out, format)
    };
    result.map_err(|source| ImagingError::Encode {
        format: format.extensions_str().first().copied().unwrap_or("image"),
        source,
    })?;
    Ok(out.into_inner())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

    /// Left half red, right half blue.
    pub fn split_image(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, _| {
            if x < w / 2 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        }))
    }

    pub fn encoded(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        super::encode(image, format).unwrap()
    }
}
