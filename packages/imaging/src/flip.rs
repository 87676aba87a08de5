use image::ImageFormat;

use crate::{ImagingError, encode};

/// Mirror an image left-to-right and return it as PNG.
pub fn flip_horizontal_png(input: &[u8]) -> Result<Vec<u8>, ImagingError> {
    let image = image::load_from_memory(input).map_err(ImagingError::Decode)?;
    encode(&image.fliph(), ImageFormat::Png)
}
