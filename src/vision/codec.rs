//! # Frame Codec
//!
//! Browsers send webcam frames as data URLs (`data:image/jpeg;base64,/9j/4AAQ...`).
//! This module turns one of those strings into an interleaved RGB pixel buffer.
//!
//! ## Decode Steps:
//! 1. **Split** once on the first comma, discarding the MIME prefix
//! 2. **Base64** decode the payload (standard alphabet, padding tolerated)
//! 3. **Container** decode (JPEG, PNG, WebP, ...) through the `image` crate
//! 4. **Convert** to 8-bit RGB so the inference backend never sees BGR, alpha or grayscale
//!
//! Pure function of the input: no I/O, no shared state.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbImage;

use super::error::FrameError;

/// Decoded frame: row-major, interleaved `R, G, B` bytes.
#[derive(Debug, Clone)]
pub struct RawImage {
    pixels: RgbImage,
}

impl RawImage {
    pub fn new(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

/// Decode a `"<prefix>,<base64>"` frame.
///
/// ## Errors:
/// - [`FrameError::MalformedFrame`] when there is no comma
/// - [`FrameError::UnsupportedImage`] when the payload is not base64 or not a known image container
pub fn decode_frame(input: &str) -> Result<RawImage, FrameError> {
    let (_, payload) = input
        .split_once(',')
        .ok_or_else(|| FrameError::MalformedFrame("expected '<prefix>,<base64>'".to_string()))?;

    // Some encoders wrap long base64 payloads
    let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    let bytes = STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| FrameError::UnsupportedImage(format!("invalid base64: {}", e)))?;

    let decoded = image::load_from_memory(&bytes)
        .map_err(|e| FrameError::UnsupportedImage(e.to_string()))?;

    Ok(RawImage::new(decoded.to_rgb8()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_data_url(img: &RgbImage) -> String {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(buf))
    }

    #[test]
    fn test_missing_comma_is_malformed() {
        let err = decode_frame("nocomma").unwrap_err();
        assert!(matches!(err, FrameError::MalformedFrame(_)));
    }

    #[test]
    fn test_bad_base64_is_unsupported() {
        let err = decode_frame("data:image/png;base64,@@@not-base64@@@").unwrap_err();
        assert!(matches!(err, FrameError::UnsupportedImage(_)));
    }

    #[test]
    fn test_non_image_bytes_are_unsupported() {
        let payload = STANDARD.encode(b"definitely not an image");
        let err = decode_frame(&format!("data:image/jpeg;base64,{}", payload)).unwrap_err();
        assert!(matches!(err, FrameError::UnsupportedImage(_)));
    }

    #[test]
    fn test_png_decodes_to_rgb_order() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 0, 255]));

        let frame = decode_frame(&png_data_url(&img)).unwrap();
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 1);
        assert_eq!(frame.as_bytes(), &[255, 0, 0, 0, 0, 255]);
    }

    #[test]
    fn test_only_first_comma_splits() {
        let img = RgbImage::from_pixel(1, 1, Rgb([10, 20, 30]));
        let url = png_data_url(&img);
        // Prefix without a comma, payload never contains one
        let frame = decode_frame(&url).unwrap();
        assert_eq!(frame.as_bytes(), &[10, 20, 30]);

        // A comma in the payload makes it invalid base64 rather than silently truncating
        let err = decode_frame(&format!("{},extra", url)).unwrap_err();
        assert!(matches!(err, FrameError::UnsupportedImage(_)));
    }
}
