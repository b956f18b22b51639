//! Hand-crafted face descriptors.
//!
//! Every descriptor is computed on a [`NormalizedFace`] (160×160) and
//! normalized to sum to 1, so two faces are compared distribution to
//! distribution regardless of patch contrast.

use crate::filters::{canny, sobel};
use crate::frame::rgb_to_hsv;
use crate::preprocess::{ExtractError, FeaturePreprocessor, NormalizedFace};
use crate::stats::normalize_histogram;
use crate::types::{Descriptors, FeatureVector, EDGE_BINS, GRADIENT_BINS, PATCH_SIZE};
use image::RgbImage;

const LBP_RADII: [usize; 2] = [1, 2];
const HUE_BINS: usize = 16;
const HUE_RANGE: usize = 180;
const SATURATION_BINS: usize = 16;
const INTENSITY_BINS: usize = 32;
const EDGE_MAP_BINS: usize = 32;
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

/// Half-open pixel rectangle `(x0, y0, x1, y1)`.
type Region = (usize, usize, usize, usize);

/// Four quadrants (TL, TR, BL, BR) followed by the whole patch.
fn regions(w: usize, h: usize) -> [Region; 5] {
    let (hw, hh) = (w / 2, h / 2);
    [
        (0, 0, hw, hh),
        (hw, 0, w, hh),
        (0, hh, hw, h),
        (hw, hh, w, h),
        (0, 0, w, h),
    ]
}

#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    preprocessor: FeaturePreprocessor,
}

impl FeatureExtractor {
    pub fn new(preprocessor: FeaturePreprocessor) -> Self {
        Self { preprocessor }
    }

    pub fn preprocessor(&self) -> &FeaturePreprocessor {
        &self.preprocessor
    }

    /// Normalize an RGB face crop and compute its feature vector.
    pub fn extract(&self, patch: &RgbImage) -> Result<FeatureVector, ExtractError> {
        let face = self.preprocessor.normalize(patch)?;
        self.extract_normalized(&face)
    }

    pub fn extract_normalized(&self, face: &NormalizedFace) -> Result<FeatureVector, ExtractError> {
        let side = PATCH_SIZE as usize;
        let denoised = face.denoised.as_raw();

        let descriptors = Descriptors::new(
            lbp_histogram(denoised, side, side),
            gradient_histogram(denoised, PATCH_SIZE, PATCH_SIZE),
            color_histogram(&face.color),
            gray_histogram(face.equalized.as_raw(), side, side),
            edge_histogram(denoised, PATCH_SIZE, PATCH_SIZE),
        )?;

        Ok(FeatureVector { descriptors, reference: face.reference_patch()? })
    }
}

/// Local binary pattern codes at `radius`. Border pixels without a full
/// neighborhood keep code 0.
fn lbp_codes(img: &[u8], w: usize, h: usize, r: usize) -> Vec<u8> {
    let mut codes = vec![0u8; w * h];
    if w <= 2 * r || h <= 2 * r {
        return codes;
    }

    for y in r..h - r {
        for x in r..w - r {
            let center = img[y * w + x];
            // Clockwise from the top-left corner.
            let neighbors = [
                (y - r, x - r),
                (y - r, x),
                (y - r, x + r),
                (y, x + r),
                (y + r, x + r),
                (y + r, x),
                (y + r, x - r),
                (y, x - r),
            ];
            let mut code = 0u8;
            for (bit, &(ny, nx)) in neighbors.iter().enumerate() {
                if img[ny * w + nx] >= center {
                    code |= 1 << bit;
                }
            }
            codes[y * w + x] = code;
        }
    }
    codes
}

pub(crate) fn lbp_histogram(img: &[u8], w: usize, h: usize) -> Vec<f64> {
    let mut hist = vec![0.0f64; 256 * LBP_RADII.len()];
    for (i, &r) in LBP_RADII.iter().enumerate() {
        let offset = i * 256;
        for code in lbp_codes(img, w, h, r) {
            hist[offset + code as usize] += 1.0;
        }
    }
    normalize_histogram(&mut hist);
    hist
}

/// Gradient magnitude accumulated into 10° orientation bins over 0–360°.
pub(crate) fn gradient_histogram(img: &[u8], width: u32, height: u32) -> Vec<f64> {
    let (gx, gy) = sobel(img, width, height);
    let bin_width = 360.0 / GRADIENT_BINS as f64;
    let mut hist = vec![0.0f64; GRADIENT_BINS];

    for (&dx, &dy) in gx.iter().zip(&gy) {
        let (dx, dy) = (dx as f64, dy as f64);
        let magnitude = dx.hypot(dy);
        if magnitude == 0.0 {
            continue;
        }
        let angle = dy.atan2(dx).to_degrees().rem_euclid(360.0);
        let bin = (angle / bin_width) as usize % GRADIENT_BINS;
        hist[bin] += magnitude;
    }

    normalize_histogram(&mut hist);
    hist
}

/// Per region: 16 hue bins over [0, 180) then 16 saturation bins over [0, 256).
pub(crate) fn color_histogram(patch: &RgbImage) -> Vec<f64> {
    let (w, h) = (patch.width() as usize, patch.height() as usize);
    let hsv: Vec<(u8, u8)> = patch
        .pixels()
        .map(|p| {
            let (hue, sat, _) = rgb_to_hsv(p[0], p[1], p[2]);
            (hue, sat)
        })
        .collect();

    let per_region = HUE_BINS + SATURATION_BINS;
    let mut hist = vec![0.0f64; per_region * 5];
    for (ri, &(x0, y0, x1, y1)) in regions(w, h).iter().enumerate() {
        let base = ri * per_region;
        for y in y0..y1 {
            for &(hue, sat) in &hsv[y * w + x0..y * w + x1] {
                let hb = (hue as usize * HUE_BINS / HUE_RANGE).min(HUE_BINS - 1);
                let sb = sat as usize * SATURATION_BINS / 256;
                hist[base + hb] += 1.0;
                hist[base + HUE_BINS + sb] += 1.0;
            }
        }
    }

    normalize_histogram(&mut hist);
    hist
}

/// Per region: 32 intensity bins over [0, 256).
pub(crate) fn gray_histogram(img: &[u8], w: usize, h: usize) -> Vec<f64> {
    let mut hist = vec![0.0f64; INTENSITY_BINS * 5];
    for (ri, &(x0, y0, x1, y1)) in regions(w, h).iter().enumerate() {
        let base = ri * INTENSITY_BINS;
        for y in y0..y1 {
            for &v in &img[y * w + x0..y * w + x1] {
                hist[base + v as usize * INTENSITY_BINS / 256] += 1.0;
            }
        }
    }
    normalize_histogram(&mut hist);
    hist
}

/// 32-bin histogram of the Canny edge map followed by the edge-pixel
/// density of each quadrant.
pub(crate) fn edge_histogram(img: &[u8], width: u32, height: u32) -> Vec<f64> {
    let (w, h) = (width as usize, height as usize);
    let edges = canny(img, width, height, CANNY_LOW, CANNY_HIGH);

    let mut hist = vec![0.0f64; EDGE_BINS];
    for &e in &edges {
        hist[e as usize * EDGE_MAP_BINS / 256] += 1.0;
    }

    for (qi, &(x0, y0, x1, y1)) in regions(w, h)[..4].iter().enumerate() {
        let area = (x1 - x0) * (y1 - y0);
        if area == 0 {
            continue;
        }
        let count = (y0..y1)
            .map(|y| edges[y * w + x0..y * w + x1].iter().filter(|&&e| e > 0).count())
            .sum::<usize>();
        hist[EDGE_MAP_BINS + qi] = count as f64 / area as f64;
    }

    normalize_histogram(&mut hist);
    hist
}
