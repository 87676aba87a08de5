use image::ImageFormat;

use crate::{ImagingError, encode};

/// Image bytes plus the name and type they should be sent under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
}

/// Prepare an input for the background-removal provider.
///
/// JPEG and PNG pass through untouched. WebP is transcoded to PNG and the filename
/// extension follows.
pub fn normalize_for_removal(
    bytes: &[u8],
    filename: &str,
    mime_type: &str,
) -> Result<EncodedImage, ImagingError> {
    let is_webp = mime_type.eq_ignore_ascii_case("image/webp")
        || image::guess_format(bytes).is_ok_and(|f| f == ImageFormat::WebP);

    if !is_webp {
        return Ok(EncodedImage {
            bytes: bytes.to_vec(),
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
        });
    }

    let image = image::load_from_memory_with_format(bytes, ImageFormat::WebP)
        .map_err(ImagingError::Decode)?;
    Ok(EncodedImage {
        bytes: encode(&image, ImageFormat::Png)?,
        filename: with_png_extension(filename),
        mime_type: "image/png".to_string(),
    })
}

fn with_png_extension(filename: &str) -> String {
    let stem = match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    };
    format!("{stem}.png")
}
