//! Raw sensor frame types

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::FrameError;

/// YUV 4:2:0 layout delivered by the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Fully planar: Y, then U, then V
    I420,
    /// Semi-planar: Y, then interleaved U/V
    Nv12,
    /// Semi-planar: Y, then interleaved V/U (Android camera default)
    Nv21,
}

impl PixelFormat {
    /// Bytes needed for a tightly packed frame of the given size
    pub fn frame_len(&self, width: u32, height: u32) -> usize {
        let luma = width as usize * height as usize;
        let (cw, ch) = chroma_dims(width, height);
        luma + 2 * cw * ch
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::I420 => "i420",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Nv21 => "nv21",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subsampled chroma plane size for 4:2:0
pub(crate) fn chroma_dims(width: u32, height: u32) -> (usize, usize) {
    (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
}

/// One image plane: a window into a shared buffer with row and pixel strides
#[derive(Clone)]
pub struct Plane {
    data: Arc<[u8]>,
    offset: usize,
    row_stride: usize,
    pixel_stride: usize,
    cols: usize,
    rows: usize,
}

impl Plane {
    /// Create a plane, checking that `rows` x `cols` samples fit in `data`
    pub fn new(
        data: Arc<[u8]>,
        offset: usize,
        row_stride: usize,
        pixel_stride: usize,
        cols: usize,
        rows: usize,
    ) -> Result<Self, FrameError> {
        if pixel_stride == 0 || row_stride < cols.saturating_sub(1) * pixel_stride + 1 {
            return Err(FrameError::InvalidDimensions(format!(
                "row stride {} too small for {} samples with pixel stride {}",
                row_stride, cols, pixel_stride
            )));
        }
        if rows > 0 && cols > 0 {
            let last = offset + (rows - 1) * row_stride + (cols - 1) * pixel_stride;
            if last >= data.len() {
                return Err(FrameError::BufferTooSmall {
                    expected: last + 1,
                    actual: data.len(),
                });
            }
        }
        Ok(Self {
            data,
            offset,
            row_stride,
            pixel_stride,
            cols,
            rows,
        })
    }

    /// Sample at plane coordinates (already subsampled for chroma)
    #[inline]
    pub fn sample(&self, x: usize, y: usize) -> u8 {
        self.data[self.offset + y * self.row_stride + x * self.pixel_stride]
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn pixel_stride(&self) -> usize {
        self.pixel_stride
    }

    /// Samples per row
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    fn ensure_covers(&self, name: &str, cols: usize, rows: usize) -> Result<(), FrameError> {
        if self.cols < cols || self.rows < rows {
            return Err(FrameError::InvalidDimensions(format!(
                "{} plane is {}x{}, frame needs {}x{}",
                name, self.cols, self.rows, cols, rows
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plane")
            .field("len", &self.data.len())
            .field("offset", &self.offset)
            .field("row_stride", &self.row_stride)
            .field("pixel_stride", &self.pixel_stride)
            .field("cols", &self.cols)
            .field("rows", &self.rows)
            .finish()
    }
}

/// Luma and chroma planes of a 4:2:0 frame
#[derive(Debug, Clone)]
pub struct YuvPlanes {
    pub y: Plane,
    pub u: Plane,
    pub v: Plane,
}

type ReleaseHook = Box<dyn FnOnce() + Send + 'static>;

/// Frame as delivered by the camera, before colour conversion.
///
/// A frame may carry a release hook handing its buffer back to the producer.
/// The hook runs exactly once: on [`RawFrame::release`] or, failing that, on drop.
pub struct RawFrame {
    width: u32,
    height: u32,
    format: PixelFormat,
    planes: Option<YuvPlanes>,
    timestamp_ns: u64,
    sequence: u64,
    release: Option<ReleaseHook>,
}

impl RawFrame {
    /// Create a frame from explicit planes.
    ///
    /// Luma must cover `width` x `height` samples and each chroma plane the
    /// subsampled size.
    pub fn from_planes(width: u32, height: u32, format: PixelFormat, planes: YuvPlanes) -> Result<Self, FrameError> {
        check_dims(width, height)?;
        let (cw, ch) = chroma_dims(width, height);
        planes.y.ensure_covers("Y", width as usize, height as usize)?;
        planes.u.ensure_covers("U", cw, ch)?;
        planes.v.ensure_covers("V", cw, ch)?;
        Ok(Self::build(width, height, format, Some(planes)))
    }

    /// Wrap a tightly packed buffer (no row padding) in the given format
    pub fn from_packed(
        data: impl Into<Arc<[u8]>>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, FrameError> {
        check_dims(width, height)?;
        let data: Arc<[u8]> = data.into();
        let expected = format.frame_len(width, height);
        if data.len() < expected {
            return Err(FrameError::BufferTooSmall {
                expected,
                actual: data.len(),
            });
        }

        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = chroma_dims(width, height);
        let luma = w * h;
        let y = Plane::new(data.clone(), 0, w, 1, w, h)?;
        let (u, v) = match format {
            PixelFormat::I420 => (
                Plane::new(data.clone(), luma, cw, 1, cw, ch)?,
                Plane::new(data, luma + cw * ch, cw, 1, cw, ch)?,
            ),
            PixelFormat::Nv12 => (
                Plane::new(data.clone(), luma, 2 * cw, 2, cw, ch)?,
                Plane::new(data, luma + 1, 2 * cw, 2, cw, ch)?,
            ),
            PixelFormat::Nv21 => (
                Plane::new(data.clone(), luma + 1, 2 * cw, 2, cw, ch)?,
                Plane::new(data, luma, 2 * cw, 2, cw, ch)?,
            ),
        };

        Ok(Self::build(width, height, format, Some(YuvPlanes { y, u, v })))
    }

    /// A frame whose image data is missing (e.g. the sensor dropped the buffer)
    pub fn empty(width: u32, height: u32, format: PixelFormat) -> Self {
        Self::build(width, height, format, None)
    }

    fn build(width: u32, height: u32, format: PixelFormat, planes: Option<YuvPlanes>) -> Self {
        Self {
            width,
            height,
            format,
            planes,
            timestamp_ns: 0,
            sequence: 0,
            release: None,
        }
    }

    /// Attach the hook that hands the buffer back to the producer
    pub fn with_release<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.release = Some(Box::new(hook));
        self
    }

    /// Set capture metadata
    pub fn with_timestamp(mut self, timestamp_ns: u64, sequence: u64) -> Self {
        self.timestamp_ns = timestamp_ns;
        self.sequence = sequence;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Image planes, or `None` when the frame has no backing data
    pub fn planes(&self) -> Option<&YuvPlanes> {
        self.planes.as_ref()
    }

    /// Hand the frame back to its producer
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("has_data", &self.planes.is_some())
            .field("sequence", &self.sequence)
            .finish()
    }
}

fn check_dims(width: u32, height: u32) -> Result<(), FrameError> {
    if width == 0 || height == 0 {
        return Err(FrameError::InvalidDimensions(format!("{}x{}", width, height)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let hook_count = count.clone();
        (count, move || {
            hook_count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_release_runs_once_explicit() {
        let (count, hook) = counter();
        let frame = RawFrame::empty(4, 4, PixelFormat::I420).with_release(hook);
        frame.release();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_runs_on_drop() {
        let (count, hook) = counter();
        {
            let _frame = RawFrame::empty(4, 4, PixelFormat::Nv21).with_release(hook);
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(PixelFormat::I420.frame_len(640, 480), 640 * 480 * 3 / 2);
        // Odd sizes round chroma up
        assert_eq!(PixelFormat::Nv12.frame_len(3, 3), 9 + 2 * 4);
    }

    #[test]
    fn test_packed_buffer_too_small() {
        let err = RawFrame::from_packed(vec![0u8; 10], 4, 4, PixelFormat::I420).unwrap_err();
        assert!(matches!(err, FrameError::BufferTooSmall { expected: 24, actual: 10 }));
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let err = RawFrame::from_packed(vec![0u8; 10], 0, 4, PixelFormat::I420).unwrap_err();
        assert!(matches!(err, FrameError::InvalidDimensions(_)));
    }

    #[test]
    fn test_nv21_chroma_order() {
        // 2x2 luma, then one V/U pair
        let data = vec![16, 16, 16, 16, 200, 50];
        let frame = RawFrame::from_packed(data, 2, 2, PixelFormat::Nv21).unwrap();
        let planes = frame.planes().unwrap();
        assert_eq!(planes.v.sample(0, 0), 200);
        assert_eq!(planes.u.sample(0, 0), 50);
    }

    #[test]
    fn test_undersized_planes_rejected() {
        let data: Arc<[u8]> = vec![128u8; 4].into();
        let tiny = Plane::new(data, 0, 2, 1, 2, 2).unwrap();
        let planes = YuvPlanes {
            y: tiny.clone(),
            u: tiny.clone(),
            v: tiny,
        };
        let err = RawFrame::from_planes(640, 480, PixelFormat::I420, planes).unwrap_err();
        assert!(matches!(err, FrameError::InvalidDimensions(_)));
    }

    #[test]
    fn test_undersized_chroma_rejected() {
        let luma: Arc<[u8]> = vec![16u8; 16].into();
        let chroma: Arc<[u8]> = vec![128u8; 2].into();
        let planes = YuvPlanes {
            y: Plane::new(luma, 0, 4, 1, 4, 4).unwrap(),
            u: Plane::new(chroma.clone(), 0, 2, 1, 2, 1).unwrap(),
            v: Plane::new(chroma, 0, 2, 1, 2, 1).unwrap(),
        };
        assert!(RawFrame::from_planes(4, 4, PixelFormat::I420, planes).is_err());
    }

    #[test]
    fn test_from_planes_accepts_strided_planes() {
        // 4x2 luma with 2 bytes of row padding, 2x1 chroma
        let luma: Arc<[u8]> = vec![16u8; 12].into();
        let chroma: Arc<[u8]> = vec![128u8; 2].into();
        let planes = YuvPlanes {
            y: Plane::new(luma, 0, 6, 1, 4, 2).unwrap(),
            u: Plane::new(chroma.clone(), 0, 2, 1, 2, 1).unwrap(),
            v: Plane::new(chroma, 0, 2, 1, 2, 1).unwrap(),
        };
        let frame = RawFrame::from_planes(4, 2, PixelFormat::I420, planes).unwrap();
        assert_eq!(frame.planes().unwrap().y.cols(), 4);
    }

    #[test]
    fn test_plane_bounds_checked() {
        let data: Arc<[u8]> = vec![0u8; 8].into();
        let err = Plane::new(data, 0, 4, 1, 4, 3).unwrap_err();
        assert!(matches!(err, FrameError::BufferTooSmall { expected: 12, actual: 8 }));
    }
}
