//! YUV 4:2:0 to RGB colour conversion (BT.601, limited range)

use image::RgbImage;

use crate::frame::YuvPlanes;

/// Convert one YUV sample to RGB using 8-bit fixed point coefficients
#[inline]
pub fn yuv_to_rgb_pixel(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;

    [clamp(r), clamp(g), clamp(b)]
}

#[inline]
fn clamp(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Write the full frame into `out`, which must already be `width` x `height`
pub fn convert_planes(planes: &YuvPlanes, out: &mut RgbImage) {
    for (y, row) in out.rows_mut().enumerate() {
        let cy = y / 2;
        for (x, pixel) in row.enumerate() {
            let cx = x / 2;
            pixel.0 = yuv_to_rgb_pixel(
                planes.y.sample(x, y),
                planes.u.sample(cx, cy),
                planes.v.sample(cx, cy),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_black_and_white_levels() {
        assert_eq!(yuv_to_rgb_pixel(16, 128, 128), [0, 0, 0]);
        assert_eq!(yuv_to_rgb_pixel(235, 128, 128), [255, 255, 255]);
    }

    #[test]
    fn test_neutral_chroma_is_gray() {
        let [r, g, b] = yuv_to_rgb_pixel(126, 128, 128);
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert_eq!(r, 128);
    }

    #[test]
    fn test_strong_red() {
        // BT.601 red is roughly Y=81, U=90, V=240
        let [r, g, b] = yuv_to_rgb_pixel(81, 90, 240);
        assert!(r > 250, "r={}", r);
        assert!(g < 5, "g={}", g);
        assert!(b < 5, "b={}", b);
    }
}
