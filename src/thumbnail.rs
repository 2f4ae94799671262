use base64::Engine;
use image::{GenericImageView, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

use crate::validation::IMAGE_DATA_PREFIX;

pub const THUMBNAIL_MAX_EDGE: u32 = 160;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("not an image data URL")]
    NotImageDataUrl,
    #[error("data URL is not base64 encoded")]
    NotBase64,
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
}

pub fn decode_data_url(data_url: &str) -> Result<(&str, Vec<u8>), ThumbnailError> {
    if !data_url.starts_with(IMAGE_DATA_PREFIX) {
        return Err(ThumbnailError::NotImageDataUrl);
    }
    let (header, payload) = data_url.split_once(',').ok_or(ThumbnailError::NotImageDataUrl)?;
    let mime = header
        .trim_start_matches("data:")
        .strip_suffix(";base64")
        .ok_or(ThumbnailError::NotBase64)?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload.trim())?;
    Ok((mime, bytes))
}

/// Renders a PNG data URL no larger than [`THUMBNAIL_MAX_EDGE`] on either side.
pub fn make_thumbnail(data_url: &str) -> Result<String, ThumbnailError> {
    let (_, bytes) = decode_data_url(data_url)?;
    let img = image::load_from_memory(&bytes)?;
    let (w, h) = img.dimensions();
    let thumb = if w > THUMBNAIL_MAX_EDGE || h > THUMBNAIL_MAX_EDGE {
        img.thumbnail(THUMBNAIL_MAX_EDGE, THUMBNAIL_MAX_EDGE)
    } else {
        img
    };

    let mut buf = Vec::new();
    thumb.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(format!("data:image/png;base64,{}", base64::engine::general_purpose::STANDARD.encode(&buf)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn png_data_url(w: u32, h: u32) -> String {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([180, 20, 60])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        format!("data:image/png;base64,{}", base64::engine::general_purpose::STANDARD.encode(&buf))
    }

    fn dimensions_of(data_url: &str) -> (u32, u32) {
        let (mime, bytes) = decode_data_url(data_url).unwrap();
        assert_eq!(mime, "image/png");
        image::load_from_memory(&bytes).unwrap().dimensions()
    }

    #[test]
    fn shrinks_large_uploads_keeping_aspect_ratio() {
        let thumb = make_thumbnail(&png_data_url(400, 200)).unwrap();
        assert_eq!(dimensions_of(&thumb), (160, 80));
    }

    #[test]
    fn small_uploads_are_not_upscaled() {
        let thumb = make_thumbnail(&png_data_url(40, 30)).unwrap();
        assert_eq!(dimensions_of(&thumb), (40, 30));
    }

    #[test]
    fn rejects_non_image_payloads() {
        assert!(matches!(make_thumbnail("https://example.test/a.png"), Err(ThumbnailError::NotImageDataUrl)));
        assert!(matches!(make_thumbnail("data:image/png,rawbytes"), Err(ThumbnailError::NotBase64)));
        assert!(matches!(make_thumbnail("data:image/png;base64,@@@"), Err(ThumbnailError::Base64(_))));
        assert!(matches!(make_thumbnail("data:image/png;base64,aGVsbG8="), Err(ThumbnailError::Image(_))));
    }
}
