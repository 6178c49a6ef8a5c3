//! Camera Frame Conversion
//!
//! Turns raw sensor frames into classifier input:
//! - YUV 4:2:0 frames (I420, NV12, NV21) with arbitrary row/pixel strides
//! - BT.601 colour conversion to RGB
//! - Centered square crop and scale to the model's input edge (640x480 -> 224x224)

pub mod converter;
pub mod frame;
pub mod yuv;

pub use converter::{ConverterConfig, CropRegion, FrameConverter, ScaleFilter};
pub use frame::{PixelFormat, Plane, RawFrame, YuvPlanes};

use thiserror::Error;

/// Frame error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame has no image data")]
    InvalidFrame,

    #[error("Frame buffer too small: expected {expected} bytes, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("Invalid frame dimensions: {0}")]
    InvalidDimensions(String),
}
