//! Frame enhancement and face-patch normalization.

use crate::filters::{bilateral_gray, bilateral_rgb, sharpen_rgb, BilateralParams};
use crate::frame::{clahe_enhance, equalize_histogram, rgb_to_ycbcr, to_intensity, ycbcr_to_rgb};
use crate::types::{ReferencePatch, ShapeError, PATCH_SIZE};
use image::imageops::{self, FilterType};
use image::{GrayImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("face patch is empty ({width}x{height})")]
    EmptyPatch { width: u32, height: u32 },
    #[error("descriptor shape: {0}")]
    Shape(#[from] ShapeError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceParams {
    /// CLAHE clip limit, as a multiple of the mean tile bin height.
    pub clahe_clip_limit: f32,
    /// CLAHE grid is `clahe_tiles` × `clahe_tiles`.
    pub clahe_tiles: u32,
    /// Color denoising applied to the whole frame.
    pub frame_denoise: BilateralParams,
    pub sharpen: bool,
    /// Intensity denoising applied to the normalized face patch.
    pub patch_denoise: BilateralParams,
}

impl Default for EnhanceParams {
    fn default() -> Self {
        Self {
            clahe_clip_limit: 3.0,
            clahe_tiles: 8,
            frame_denoise: BilateralParams::default(),
            sharpen: true,
            patch_denoise: BilateralParams::default(),
        }
    }
}

/// A face crop brought to the fixed patch geometry.
#[derive(Debug, Clone)]
pub struct NormalizedFace {
    /// 160×160 color patch.
    pub color: RgbImage,
    /// Globally equalized intensity.
    pub equalized: GrayImage,
    /// `equalized` after edge-preserving denoising.
    pub denoised: GrayImage,
}

impl NormalizedFace {
    pub fn reference_patch(&self) -> Result<ReferencePatch, ShapeError> {
        ReferencePatch::new(self.denoised.as_raw().clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeaturePreprocessor {
    params: EnhanceParams,
}

impl FeaturePreprocessor {
    pub fn new(params: EnhanceParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &EnhanceParams {
        &self.params
    }

    /// Enhance a raw frame: local contrast equalization on luminance only,
    /// color denoising, then a 3×3 sharpening pass.
    pub fn enhance(&self, frame: &RgbImage) -> RgbImage {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return frame.clone();
        }

        let mut luma = Vec::with_capacity((width * height) as usize);
        let mut chroma = Vec::with_capacity((width * height) as usize);
        for px in frame.pixels() {
            let (y, cb, cr) = rgb_to_ycbcr(px[0], px[1], px[2]);
            luma.push(y);
            chroma.push((cb, cr));
        }

        clahe_enhance(&mut luma, width, height, self.params.clahe_tiles, self.params.clahe_clip_limit);

        let mut recombined = RgbImage::new(width, height);
        for ((px, &y), &(cb, cr)) in recombined.pixels_mut().zip(&luma).zip(&chroma) {
            let (r, g, b) = ycbcr_to_rgb(y, cb, cr);
            *px = Rgb([r, g, b]);
        }

        let denoised = bilateral_rgb(&recombined, &self.params.frame_denoise);
        if self.params.sharpen {
            sharpen_rgb(&denoised)
        } else {
            denoised
        }
    }

    /// Resize a face crop to 160×160 and derive its equalized and denoised
    /// intensity channels.
    pub fn normalize(&self, patch: &RgbImage) -> Result<NormalizedFace, ExtractError> {
        let (width, height) = patch.dimensions();
        if width == 0 || height == 0 {
            return Err(ExtractError::EmptyPatch { width, height });
        }

        let color = if (width, height) == (PATCH_SIZE, PATCH_SIZE) {
            patch.clone()
        } else {
            imageops::resize(patch, PATCH_SIZE, PATCH_SIZE, FilterType::Triangle)
        };

        let mut equalized = to_intensity(&color);
        equalize_histogram(&mut equalized);

        let denoised_raw = bilateral_gray(equalized.as_raw(), PATCH_SIZE, PATCH_SIZE, &self.params.patch_denoise);
        let denoised = GrayImage::from_raw(PATCH_SIZE, PATCH_SIZE, denoised_raw)
            .ok_or(ExtractError::EmptyPatch { width, height })?;

        Ok(NormalizedFace { color, equalized, denoised })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x * 255 / w.max(1)) as u8, (y * 255 / h.max(1)) as u8, 90])
        })
    }

    #[test]
    fn test_enhance_preserves_dimensions() {
        let p = FeaturePreprocessor::default();
        let out = p.enhance(&gradient_frame(64, 48));
        assert_eq!(out.dimensions(), (64, 48));
    }

    #[test]
    fn test_enhance_is_deterministic() {
        let p = FeaturePreprocessor::default();
        let frame = gradient_frame(40, 40);
        assert_eq!(p.enhance(&frame), p.enhance(&frame));
    }

    #[test]
    fn test_enhance_empty_frame() {
        let p = FeaturePreprocessor::default();
        assert_eq!(p.enhance(&RgbImage::new(0, 0)).dimensions(), (0, 0));
    }

    #[test]
    fn test_normalize_resizes_to_patch() {
        let p = FeaturePreprocessor::default();
        let face = p.normalize(&gradient_frame(97, 131)).unwrap();
        assert_eq!(face.color.dimensions(), (PATCH_SIZE, PATCH_SIZE));
        assert_eq!(face.equalized.dimensions(), (PATCH_SIZE, PATCH_SIZE));
        assert_eq!(face.denoised.dimensions(), (PATCH_SIZE, PATCH_SIZE));
        assert_eq!(face.reference_patch().unwrap().pixels().len(), 160 * 160);
    }

    #[test]
    fn test_normalize_equalizes_full_range() {
        let p = FeaturePreprocessor::default();
        let face = p.normalize(&gradient_frame(160, 160)).unwrap();
        let max = face.equalized.as_raw().iter().copied().max().unwrap();
        let min = face.equalized.as_raw().iter().copied().min().unwrap();
        assert_eq!(max, 255);
        assert_eq!(min, 0);
    }

    #[test]
    fn test_normalize_empty_patch_fails() {
        let p = FeaturePreprocessor::default();
        let err = p.normalize(&RgbImage::new(0, 10)).unwrap_err();
        assert_eq!(err, ExtractError::EmptyPatch { width: 0, height: 10 });
    }
}
