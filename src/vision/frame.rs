use std::sync::Arc;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

const JPEG_QUALITY: u8 = 80;

/// One captured camera image plus its capture timestamp.
///
/// Frames are immutable once published: the acquisition thread builds a
/// fresh `Frame`, wraps it in an `Arc` and swaps it into the shared slot.
/// Readers clone the `Arc`, never the pixels, so a reader can hold a frame
/// for as long as it likes without blocking acquisition.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Packed RGB bytes, `width * height * 3` of them.
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Seconds since the Unix epoch; 0.0 marks the pre-acquisition placeholder.
    pub timestamp_s: f64,
}

impl Frame {
    /// The zero-filled frame visible before the first real capture.
    pub fn placeholder(width: u32, height: u32) -> Self {
        Self {
            pixels: vec![0u8; (width as usize) * (height as usize) * 3],
            width,
            height,
            timestamp_s: 0.0,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.timestamp_s == 0.0
    }

    /// Encode the frame as JPEG. Deterministic for identical pixel data.
    pub fn encode_jpeg(&self) -> Result<Vec<u8>> {
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
            .write_image(&self.pixels, self.width, self.height, ExtendedColorType::Rgb8)
            .context("encode frame as jpeg")?;
        Ok(jpeg)
    }
}

/// Encoded derivative of the most recent frame, memoized by timestamp.
///
/// The encoded bytes are shared via `Arc` so handing a snapshot to a remote
/// connection is a pointer copy.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub jpeg: Arc<Vec<u8>>,
    /// Timestamp of the frame this snapshot was encoded from.
    pub timestamp_s: f64,
}

impl Snapshot {
    /// Cache seed: an empty snapshot older than every real frame.
    pub(crate) fn empty() -> Self {
        Self {
            jpeg: Arc::new(Vec::new()),
            timestamp_s: -1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_zeroed_and_timestamped_zero() {
        let frame = Frame::placeholder(4, 2);
        assert_eq!(frame.pixels.len(), 4 * 2 * 3);
        assert!(frame.pixels.iter().all(|&p| p == 0));
        assert!(frame.is_placeholder());
    }

    #[test]
    fn jpeg_encoding_is_deterministic() -> Result<()> {
        let mut frame = Frame::placeholder(8, 8);
        for (i, p) in frame.pixels.iter_mut().enumerate() {
            *p = (i % 251) as u8;
        }
        let a = frame.encode_jpeg()?;
        let b = frame.encode_jpeg()?;
        assert!(!a.is_empty());
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn different_pixels_encode_differently() -> Result<()> {
        let dark = Frame::placeholder(8, 8);
        let mut bright = Frame::placeholder(8, 8);
        bright.pixels.iter_mut().for_each(|p| *p = 255);
        assert_ne!(dark.encode_jpeg()?, bright.encode_jpeg()?);
        Ok(())
    }
}
