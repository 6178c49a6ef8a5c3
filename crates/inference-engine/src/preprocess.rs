//! RGB grid to normalized input tensor

use image::RgbImage;

use crate::InferenceError;

/// Per-channel mean subtracted from raw 0..=255 values
pub const IMAGE_MEAN: f32 = 128.0;
/// Per-channel divisor applied after mean subtraction
pub const IMAGE_STD: f32 = 128.0;

const CHANNELS: usize = 3;

/// Writes `(v - mean) / std` for every channel into one reusable buffer.
///
/// Layout is row-major with interleaved R, G, B (NHWC with N = 1).
#[derive(Debug, Clone)]
pub struct TensorPreprocessor {
    width: u32,
    height: u32,
    mean: f32,
    std: f32,
    buffer: Vec<f32>,
}

impl TensorPreprocessor {
    /// Create a preprocessor for a `width` x `height` input
    pub fn new(width: u32, height: u32, mean: f32, std: f32) -> Self {
        Self {
            width,
            height,
            mean,
            std,
            buffer: vec![0.0; width as usize * height as usize * CHANNELS],
        }
    }

    /// Tensor length in floats
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// NHWC shape of the produced tensor
    pub fn shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, CHANNELS]
    }

    /// Normalize `grid` into the internal buffer and borrow the result
    pub fn process(&mut self, grid: &RgbImage) -> Result<&[f32], InferenceError> {
        if grid.dimensions() != (self.width, self.height) {
            return Err(InferenceError::InvalidInputShape {
                expected: format!("{}x{}", self.width, self.height),
                actual: format!("{}x{}", grid.width(), grid.height()),
            });
        }

        for (dst, pixel) in self.buffer.chunks_exact_mut(CHANNELS).zip(grid.pixels()) {
            for (d, &v) in dst.iter_mut().zip(pixel.0.iter()) {
                *d = (v as f32 - self.mean) / self.std;
            }
        }

        Ok(&self.buffer)
    }
}

impl Default for TensorPreprocessor {
    fn default() -> Self {
        Self::new(224, 224, IMAGE_MEAN, IMAGE_STD)
    }
}
