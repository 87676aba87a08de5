use image::imageops::FilterType;

use crate::{ImagingError, encode};

/// Bounding box used by optimized mode.
pub const DEFAULT_MAX_DIMENSION: u32 = 1500;

/// Shrink an image to fit inside `max_dimension` × `max_dimension`, keeping its
/// aspect ratio and encoding.
///
/// Returns `None` when the image already fits; images are never enlarged.
pub fn fit_within(input: &[u8], max_dimension: u32) -> Result<Option<Vec<u8>>, ImagingError> {
    let format = image::guess_format(input).map_err(|_| ImagingError::UnknownFormat)?;
    let image = image::load_from_memory_with_format(input, format).map_err(ImagingError::Decode)?;

    if image.width() <= max_dimension && image.height() <= max_dimension {
        return Ok(None);
    }

    let resized = image.resize(max_dimension, max_dimension, FilterType::Lanczos3);
    encode(&resized, format).map(Some)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::ImageFormat;

    use super::*;
    use crate::fixtures::{encoded, split_image};

    fn dimensions(bytes: &[u8]) -> (u32, u32) {
        let image = image::load_from_memory(bytes).unwrap();
        (image.width(), image.height())
    }

    #[test]
    fn small_images_are_left_alone() {
        let input = encoded(&split_image(40, 30), ImageFormat::Png);
        assert_eq!(fit_within(&input, 1500).unwrap(), None);
    }

    #[test]
    fn exact_fit_is_left_alone() {
        let input = encoded(&split_image(64, 16), ImageFormat::Png);
        assert_eq!(fit_within(&input, 64).unwrap(), None);
    }

    #[test]
    fn wide_image_shrinks_to_bound() {
        let input = encoded(&split_image(300, 100), ImageFormat::Png);
        let out = fit_within(&input, 150).unwrap().unwrap();
        assert_eq!(dimensions(&out), (150, 50));
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn tall_jpeg_stays_jpeg() {
        let input = encoded(&split_image(60, 240), ImageFormat::Jpeg);
        let out = fit_within(&input, 120).unwrap().unwrap();
        assert_eq!(dimensions(&out), (30, 120));
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn unknown_bytes_are_rejected() {
        assert!(matches!(
            fit_within(b"plain text", 10),
            Err(ImagingError::UnknownFormat)
        ));
    }
}
