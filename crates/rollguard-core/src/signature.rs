//! Signature raster canonicalization and resampling.
//!
//! Signatures arrive as images of arbitrary size. Every raster is
//! canonicalized to a fixed shape at extraction time so that stored samples
//! are directly comparable; [`resample`] handles mismatched pairs coming
//! from any other source.

use crate::types::SignatureRaster;
use image::GrayImage;

/// Canonical edge length for stored signature rasters.
pub const CANONICAL_SIZE: u32 = 256;

/// Canonicalize a decoded grayscale image to the fixed comparison shape.
pub fn canonicalize(gray: &GrayImage) -> SignatureRaster {
    let raster = SignatureRaster::new(gray.as_raw().clone(), gray.width(), gray.height());
    if raster.width == CANONICAL_SIZE && raster.height == CANONICAL_SIZE {
        return raster;
    }
    resample(&raster, CANONICAL_SIZE, CANONICAL_SIZE)
}

/// Bilinearly resample a raster to the given dimensions.
pub fn resample(src: &SignatureRaster, width: u32, height: u32) -> SignatureRaster {
    if src.width == width && src.height == height {
        return src.clone();
    }

    let scale_x = src.width as f32 / width as f32;
    let scale_y = src.height as f32 / height as f32;

    let mut data = Vec::with_capacity((width * height) as usize);

    for y in 0..height {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i64).clamp(0, src.height as i64 - 1) as u32;
        let y1 = (y0 + 1).min(src.height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..width {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i64).clamp(0, src.width as i64 - 1) as u32;
            let x1 = (x0 + 1).min(src.width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = src.pixel(x0, y0) as f32;
            let tr = src.pixel(x1, y0) as f32;
            let bl = src.pixel(x0, y1) as f32;
            let br = src.pixel(x1, y1) as f32;

            let val = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            data.push(val.round().clamp(0.0, 255.0) as u8);
        }
    }

    SignatureRaster::new(data, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_resizes_to_fixed_shape() {
        let gray = GrayImage::from_pixel(100, 40, image::Luma([128]));
        let raster = canonicalize(&gray);
        assert_eq!(raster.width, CANONICAL_SIZE);
        assert_eq!(raster.height, CANONICAL_SIZE);
        assert_eq!(raster.data.len(), (CANONICAL_SIZE * CANONICAL_SIZE) as usize);
    }

    #[test]
    fn test_canonicalize_passthrough_at_canonical_size() {
        let gray = GrayImage::from_fn(CANONICAL_SIZE, CANONICAL_SIZE, |x, y| {
            image::Luma([((x + y) % 256) as u8])
        });
        let raster = canonicalize(&gray);
        assert_eq!(raster.pixel(10, 20), 30);
    }

    #[test]
    fn test_resample_same_shape_is_copy() {
        let src = SignatureRaster::new(vec![1, 2, 3, 4], 2, 2);
        let out = resample(&src, 2, 2);
        assert_eq!(out.data, src.data);
    }

    #[test]
    fn test_resample_uniform_stays_uniform() {
        let src = SignatureRaster::new(vec![128; 50 * 50], 50, 50);
        let out = resample(&src, 100, 100);
        assert!(out.data.iter().all(|&p| p == 128));
    }

    #[test]
    fn test_resample_downscale_dims() {
        let src = SignatureRaster::new(vec![0; 64 * 32], 64, 32);
        let out = resample(&src, 16, 8);
        assert_eq!(out.width, 16);
        assert_eq!(out.height, 8);
        assert_eq!(out.data.len(), 16 * 8);
    }
}
