use ndarray::{Array3, ArrayView3};

use crate::error::RecognitionError;

/// Number of interleaved channels per pixel (RGBA).
pub const CHANNELS: usize = 4;

/// A snapshot of the drawing surface: row-major RGBA, 8 bits per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl RasterImage {
    /// Wrap an RGBA buffer. The buffer must hold exactly `width * height` pixels.
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Result<Self, RecognitionError> {
        if width == 0 || height == 0 {
            return Err(RecognitionError::InvalidInput(format!(
                "image dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let expected = width * height * CHANNELS;
        if data.len() != expected {
            return Err(RecognitionError::InvalidInput(format!(
                "expected {expected} bytes for a {width}x{height} RGBA image, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Convert a cairo ARGB32 buffer (native-endian, premultiplied alpha,
    /// `stride` bytes per row) into straight RGBA.
    pub fn from_argb32(
        width: usize,
        height: usize,
        stride: usize,
        bytes: &[u8],
    ) -> Result<Self, RecognitionError> {
        if stride < width * 4 || bytes.len() < stride * height {
            return Err(RecognitionError::InvalidInput(format!(
                "ARGB32 buffer of {} bytes (stride {stride}) too small for {width}x{height}",
                bytes.len()
            )));
        }

        let mut data = Vec::with_capacity(width * height * CHANNELS);
        for row in bytes.chunks(stride).take(height) {
            for px in row[..width * 4].chunks_exact(4) {
                let argb = u32::from_ne_bytes([px[0], px[1], px[2], px[3]]);
                let a = (argb >> 24) as u8;
                let r = (argb >> 16) as u8;
                let g = (argb >> 8) as u8;
                let b = argb as u8;
                data.extend_from_slice(&[
                    unpremultiply(r, a),
                    unpremultiply(g, a),
                    unpremultiply(b, a),
                    a,
                ]);
            }
        }
        Self::new(width, height, data)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// View as `[height, width, 4]`.
    pub fn view(&self) -> ArrayView3<'_, u8> {
        // Length is checked in `new`, so the shape always fits.
        ArrayView3::from_shape((self.height, self.width, CHANNELS), &self.data)
            .unwrap_or_else(|_| unreachable!("raster buffer length checked at construction"))
    }

    /// The RGB channels as floats, `[height, width, 3]`. Alpha is dropped.
    pub fn to_rgb_tensor(&self) -> Array3<f32> {
        let view = self.view();
        Array3::from_shape_fn((self.height, self.width, 3), |(y, x, c)| {
            f32::from(view[[y, x, c]])
        })
    }
}

fn unpremultiply(c: u8, a: u8) -> u8 {
    match a {
        0 => 0,
        255 => c,
        _ => ((u32::from(c) * 255 + u32::from(a) / 2) / u32::from(a)).min(255) as u8,
    }
}
