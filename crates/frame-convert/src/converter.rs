//! Center crop and scale from sensor resolution to model input

use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::frame::RawFrame;
use crate::yuv::convert_planes;
use crate::FrameError;

/// Resampling filter used when scaling the cropped square
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScaleFilter {
    /// Unfiltered sampling, matches a plain affine scale
    #[default]
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ScaleFilter> for FilterType {
    fn from(f: ScaleFilter) -> Self {
        match f {
            ScaleFilter::Nearest => FilterType::Nearest,
            ScaleFilter::Triangle => FilterType::Triangle,
            ScaleFilter::CatmullRom => FilterType::CatmullRom,
            ScaleFilter::Gaussian => FilterType::Gaussian,
            ScaleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Converter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Edge length of the square model input
    pub target_size: u32,
    /// Resampling filter
    pub filter: ScaleFilter,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            target_size: 224,
            filter: ScaleFilter::Nearest,
        }
    }
}

/// Square region cut from the middle of the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub side: u32,
}

impl CropRegion {
    /// Largest centered square; trims side margins on landscape frames
    pub fn center_square(width: u32, height: u32) -> Self {
        let side = width.min(height);
        Self {
            x: (width - side) / 2,
            y: (height - side) / 2,
            side,
        }
    }

    /// Scale factor mapping the crop onto a `target` square
    pub fn scale(&self, target: u32) -> f32 {
        target as f32 / self.side as f32
    }
}

/// Turns raw YUV frames into fixed-size RGB grids
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameConverter {
    config: ConverterConfig,
}

impl FrameConverter {
    /// Create a converter
    pub fn new(config: ConverterConfig) -> Result<Self, FrameError> {
        if config.target_size == 0 {
            return Err(FrameError::InvalidDimensions("target size must be non-zero".into()));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Colour convert, center crop and scale a frame.
    ///
    /// Does not release the frame; that stays with the caller.
    pub fn convert(&self, frame: &RawFrame) -> Result<RgbImage, FrameError> {
        let planes = frame.planes().ok_or(FrameError::InvalidFrame)?;

        let mut rgb = RgbImage::new(frame.width(), frame.height());
        convert_planes(planes, &mut rgb);

        let crop = CropRegion::center_square(frame.width(), frame.height());
        let target = self.config.target_size;
        trace!(
            "Cropping {}x{} at ({}, {}), scale {:.4}",
            crop.side,
            crop.side,
            crop.x,
            crop.y,
            crop.scale(target)
        );

        if crop.side == target && crop.x == 0 && crop.y == 0 {
            return Ok(rgb);
        }

        let square = imageops::crop_imm(&rgb, crop.x, crop.y, crop.side, crop.side);
        Ok(imageops::resize(&*square, target, target, self.config.filter.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use proptest::prelude::*;

    /// I420 frame where every pixel has the given luma and neutral chroma
    fn flat_i420(width: u32, height: u32, luma: u8) -> RawFrame {
        let mut data = vec![luma; (width * height) as usize];
        data.resize(PixelFormat::I420.frame_len(width, height), 128);
        RawFrame::from_packed(data, width, height, PixelFormat::I420).unwrap()
    }

    #[test]
    fn test_center_square_landscape() {
        let crop = CropRegion::center_square(640, 480);
        assert_eq!(crop, CropRegion { x: 80, y: 0, side: 480 });
        assert!((crop.scale(224) - 224.0 / 480.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_center_square_portrait() {
        let crop = CropRegion::center_square(480, 640);
        assert_eq!(crop, CropRegion { x: 0, y: 80, side: 480 });
    }

    #[test]
    fn test_convert_output_size() {
        let converter = FrameConverter::default();
        let grid = converter.convert(&flat_i420(640, 480, 235)).unwrap();
        assert_eq!(grid.dimensions(), (224, 224));
        assert!(grid.pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn test_empty_frame_is_invalid() {
        let converter = FrameConverter::default();
        let frame = RawFrame::empty(640, 480, PixelFormat::Nv21);
        assert!(matches!(converter.convert(&frame), Err(FrameError::InvalidFrame)));
    }

    #[test]
    fn test_side_margins_are_cropped() {
        // White center square with black 80px margins left and right
        let (w, h) = (640u32, 480u32);
        let mut data = vec![0u8; PixelFormat::I420.frame_len(w, h)];
        for y in 0..h {
            for x in 0..w {
                data[(y * w + x) as usize] = if (80..560).contains(&x) { 235 } else { 16 };
            }
        }
        for c in data.iter_mut().skip((w * h) as usize) {
            *c = 128;
        }
        let frame = RawFrame::from_packed(data, w, h, PixelFormat::I420).unwrap();

        let grid = FrameConverter::default().convert(&frame).unwrap();
        assert!(grid.pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn test_zero_target_rejected() {
        let config = ConverterConfig {
            target_size: 0,
            ..Default::default()
        };
        assert!(FrameConverter::new(config).is_err());
    }

    proptest! {
        #[test]
        fn crop_stays_inside_frame(w in 1u32..2000, h in 1u32..2000) {
            let crop = CropRegion::center_square(w, h);
            prop_assert!(crop.x + crop.side <= w);
            prop_assert!(crop.y + crop.side <= h);
            prop_assert_eq!(crop.side, w.min(h));
        }
    }
}
