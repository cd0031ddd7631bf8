//! Frame type and pixel helpers — decoding, grayscale conversion, face crops.

use crate::types::FaceBox;
use image::RgbImage;

/// A decoded 8-bit RGB still image. Never persisted.
#[derive(Clone)]
pub struct Frame {
    /// Interleaved RGB pixel data (width * height * 3 bytes).
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl Frame {
    /// Wrap an interleaved RGB buffer, checking it covers the full raster.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Decode encoded image bytes (PNG, JPEG, ...) into an RGB frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let image = image::load_from_memory(bytes).map_err(|e| FrameError::Decode(e.to_string()))?;
        Ok(Self::from_image(image.to_rgb8()))
    }

    pub fn from_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Iterate over pixels as `[r, g, b]` in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.data.chunks_exact(3).map(|p| [p[0], p[1], p[2]])
    }

    /// Convert to grayscale with BT.601 luma weights (row-major, width * height bytes).
    pub fn grayscale(&self) -> Vec<u8> {
        self.pixels().map(luma).collect()
    }

    /// Crop to a face box, clamped to the frame bounds.
    ///
    /// Returns `None` if the clamped region is empty.
    pub fn crop(&self, face: &FaceBox) -> Option<Frame> {
        let left = face.left.clamp(0, self.width as i32) as usize;
        let right = face.right.clamp(0, self.width as i32) as usize;
        let top = face.top.clamp(0, self.height as i32) as usize;
        let bottom = face.bottom.clamp(0, self.height as i32) as usize;
        if right <= left || bottom <= top {
            return None;
        }

        let stride = self.width as usize * 3;
        let mut data = Vec::with_capacity((right - left) * (bottom - top) * 3);
        for y in top..bottom {
            let row = &self.data[y * stride..(y + 1) * stride];
            data.extend_from_slice(&row[left * 3..right * 3]);
        }

        Some(Frame {
            data,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }
}

/// Integer BT.601 luma with rounding.
fn luma([r, g, b]: [u8; 3]) -> u8 {
    let y = 299 * r as u32 + 587 * g as u32 + 114 * b as u32;
    ((y + 500) / 1000) as u8
}

/// Value channel of the HSV colour space: the brightest of the three components.
pub fn hsv_value([r, g, b]: [u8; 3]) -> u8 {
    r.max(g).max(b)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("image decode failed: {0}")]
    Decode(String),
    #[error("invalid RGB buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
