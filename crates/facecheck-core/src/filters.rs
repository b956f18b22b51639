//! Spatial filters over 8-bit buffers: bilateral denoising, sharpening,
//! Sobel gradients, Laplacian sharpness, Canny edges.
//!
//! All neighborhood operations mirror the image at its border without
//! repeating the edge pixel (see [`reflect_101`]).

use crate::frame::reflect_101;
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Edge-preserving smoothing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BilateralParams {
    /// Neighborhood radius in pixels (circular window).
    pub radius: u32,
    /// Intensity distance at which a neighbor's weight drops to e^-0.5.
    pub sigma_color: f32,
    /// Spatial distance at which a neighbor's weight drops to e^-0.5.
    pub sigma_space: f32,
}

impl Default for BilateralParams {
    fn default() -> Self {
        Self { radius: 2, sigma_color: 25.0, sigma_space: 2.0 }
    }
}

/// Precomputed spatial taps `(dx, dy, weight)` of a circular window.
fn spatial_taps(params: &BilateralParams) -> Vec<(isize, isize, f32)> {
    let r = params.radius as isize;
    let denom = 2.0 * params.sigma_space.max(f32::EPSILON).powi(2);
    let mut taps = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            let d2 = (dx * dx + dy * dy) as f32;
            if d2 > (r * r) as f32 {
                continue;
            }
            taps.push((dx, dy, (-d2 / denom).exp()));
        }
    }
    taps
}

fn color_weights(params: &BilateralParams, max_distance: usize) -> Vec<f32> {
    let denom = 2.0 * params.sigma_color.max(f32::EPSILON).powi(2);
    (0..=max_distance)
        .map(|d| (-((d * d) as f32) / denom).exp())
        .collect()
}

/// Bilateral filter over a single-channel buffer.
pub fn bilateral_gray(src: &[u8], width: u32, height: u32, params: &BilateralParams) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    if params.radius == 0 || w == 0 || h == 0 {
        return src.to_vec();
    }

    let taps = spatial_taps(params);
    let range = color_weights(params, 255);
    let mut out = vec![0u8; w * h];

    for y in 0..h {
        for x in 0..w {
            let center = src[y * w + x];
            let mut acc = 0.0f32;
            let mut norm = 0.0f32;
            for &(dx, dy, ws) in &taps {
                let sx = reflect_101(x as isize + dx, w);
                let sy = reflect_101(y as isize + dy, h);
                let v = src[sy * w + sx];
                let wgt = ws * range[center.abs_diff(v) as usize];
                acc += wgt * v as f32;
                norm += wgt;
            }
            out[y * w + x] = (acc / norm).round().clamp(0.0, 255.0) as u8;
        }
    }

    out
}

/// Bilateral filter over an RGB image. Color distance is the sum of the
/// per-channel absolute differences.
pub fn bilateral_rgb(src: &RgbImage, params: &BilateralParams) -> RgbImage {
    let (width, height) = src.dimensions();
    let w = width as usize;
    let h = height as usize;
    if params.radius == 0 || w == 0 || h == 0 {
        return src.clone();
    }

    let taps = spatial_taps(params);
    let range = color_weights(params, 255 * 3);
    let raw = src.as_raw();
    let mut out = vec![0u8; raw.len()];

    for y in 0..h {
        for x in 0..w {
            let ci = (y * w + x) * 3;
            let center = &raw[ci..ci + 3];
            let mut acc = [0.0f32; 3];
            let mut norm = 0.0f32;
            for &(dx, dy, ws) in &taps {
                let sx = reflect_101(x as isize + dx, w);
                let sy = reflect_101(y as isize + dy, h);
                let ni = (sy * w + sx) * 3;
                let n = &raw[ni..ni + 3];
                let dist = center[0].abs_diff(n[0]) as usize
                    + center[1].abs_diff(n[1]) as usize
                    + center[2].abs_diff(n[2]) as usize;
                let wgt = ws * range[dist];
                for c in 0..3 {
                    acc[c] += wgt * n[c] as f32;
                }
                norm += wgt;
            }
            for c in 0..3 {
                out[ci + c] = (acc[c] / norm).round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    RgbImage::from_raw(width, height, out).unwrap_or_else(|| src.clone())
}

/// 3×3 sharpening convolution: center weight 9, all neighbors −1.
pub fn sharpen_rgb(src: &RgbImage) -> RgbImage {
    let (width, height) = src.dimensions();
    let w = width as usize;
    let h = height as usize;

    RgbImage::from_fn(width, height, |x, y| {
        let mut px = [0u8; 3];
        for (c, out) in px.iter_mut().enumerate() {
            let mut acc = 0i32;
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    let sx = reflect_101(x as isize + dx, w) as u32;
                    let sy = reflect_101(y as isize + dy, h) as u32;
                    let v = src.get_pixel(sx, sy)[c] as i32;
                    acc += if dx == 0 && dy == 0 { 9 * v } else { -v };
                }
            }
            *out = acc.clamp(0, 255) as u8;
        }
        Rgb(px)
    })
}

/// Horizontal and vertical 3×3 Sobel derivatives.
pub fn sobel(src: &[u8], width: u32, height: u32) -> (Vec<f32>, Vec<f32>) {
    let w = width as usize;
    let h = height as usize;
    let mut gx = vec![0.0f32; w * h];
    let mut gy = vec![0.0f32; w * h];

    let at = |x: isize, y: isize| -> f32 {
        src[reflect_101(y, h) * w + reflect_101(x, w)] as f32
    };

    for y in 0..h as isize {
        for x in 0..w as isize {
            let tl = at(x - 1, y - 1);
            let tc = at(x, y - 1);
            let tr = at(x + 1, y - 1);
            let ml = at(x - 1, y);
            let mr = at(x + 1, y);
            let bl = at(x - 1, y + 1);
            let bc = at(x, y + 1);
            let br = at(x + 1, y + 1);

            let i = y as usize * w + x as usize;
            gx[i] = (tr + 2.0 * mr + br) - (tl + 2.0 * ml + bl);
            gy[i] = (bl + 2.0 * bc + br) - (tl + 2.0 * tc + tr);
        }
    }

    (gx, gy)
}

/// Variance of the 4-neighbor Laplacian response. Low values mean few
/// sharp transitions, i.e. a blurred image.
pub fn laplacian_variance(src: &[u8], width: u32, height: u32) -> f64 {
    let w = width as usize;
    let h = height as usize;
    if w == 0 || h == 0 {
        return 0.0;
    }

    let at = |x: isize, y: isize| -> f64 {
        src[reflect_101(y, h) * w + reflect_101(x, w)] as f64
    };

    let mut responses = Vec::with_capacity(w * h);
    for y in 0..h as isize {
        for x in 0..w as isize {
            let lap = at(x, y - 1) + at(x - 1, y) + at(x + 1, y) + at(x, y + 1) - 4.0 * at(x, y);
            responses.push(lap);
        }
    }

    let n = responses.len() as f64;
    let mean = responses.iter().sum::<f64>() / n;
    responses.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

const TAN_22_5: f32 = 0.414_213_57;
const TAN_67_5: f32 = 2.414_213_6;

/// Canny edge detector: Sobel gradients (L1 magnitude), non-maximum
/// suppression along the quantized gradient direction, then hysteresis
/// between `low` and `high`. Returns a 0/255 edge map.
pub fn canny(src: &[u8], width: u32, height: u32, low: f32, high: f32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let (gx, gy) = sobel(src, width, height);
    let mag: Vec<f32> = gx.iter().zip(&gy).map(|(a, b)| a.abs() + b.abs()).collect();

    let mag_at = |x: isize, y: isize| -> f32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0.0
        } else {
            mag[y as usize * w + x as usize]
        }
    };

    // 0 = suppressed, 1 = weak, 2 = strong
    let mut state = vec![0u8; w * h];
    for y in 0..h as isize {
        for x in 0..w as isize {
            let i = y as usize * w + x as usize;
            let m = mag[i];
            if m <= low {
                continue;
            }

            let ax = gx[i].abs();
            let ay = gy[i].abs();
            let (prev, next) = if ay <= ax * TAN_22_5 {
                (mag_at(x - 1, y), mag_at(x + 1, y))
            } else if ay >= ax * TAN_67_5 {
                (mag_at(x, y - 1), mag_at(x, y + 1))
            } else if gx[i] * gy[i] > 0.0 {
                (mag_at(x - 1, y - 1), mag_at(x + 1, y + 1))
            } else {
                (mag_at(x + 1, y - 1), mag_at(x - 1, y + 1))
            };

            if m > prev && m >= next {
                state[i] = if m > high { 2 } else { 1 };
            }
        }
    }

    let mut edges = vec![0u8; w * h];
    let mut stack: Vec<usize> = state
        .iter()
        .enumerate()
        .filter(|(_, &s)| s == 2)
        .map(|(i, _)| i)
        .collect();
    for &i in &stack {
        edges[i] = 255;
    }

    while let Some(i) = stack.pop() {
        let x = (i % w) as isize;
        let y = (i / w) as isize;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let nx = x + dx;
                let ny = y + dy;
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let ni = ny as usize * w + nx as usize;
                if state[ni] == 1 && edges[ni] == 0 {
                    edges[ni] = 255;
                    stack.push(ni);
                }
            }
        }
    }

    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(w: u32, h: u32, cell: u32, lo: u8, hi: u8) -> Vec<u8> {
        (0..h)
            .flat_map(|y| (0..w).map(move |x| if (x / cell + y / cell) % 2 == 0 { lo } else { hi }))
            .collect()
    }

    #[test]
    fn test_bilateral_uniform_unchanged() {
        let src = vec![120u8; 20 * 20];
        let out = bilateral_gray(&src, 20, 20, &BilateralParams::default());
        assert!(out.iter().all(|&p| p == 120));
    }

    #[test]
    fn test_bilateral_preserves_strong_edge() {
        // Left half 20, right half 220: a 200-level step is far beyond sigma_color.
        let w = 16u32;
        let src: Vec<u8> = (0..w * w).map(|i| if i % w < w / 2 { 20 } else { 220 }).collect();
        let out = bilateral_gray(&src, w, w, &BilateralParams::default());
        assert_eq!(out[(5 * w + 7) as usize], 20);
        assert_eq!(out[(5 * w + 8) as usize], 220);
    }

    #[test]
    fn test_bilateral_smooths_small_noise() {
        let w = 9u32;
        let mut src = vec![100u8; (w * w) as usize];
        src[(4 * w + 4) as usize] = 110;
        let out = bilateral_gray(&src, w, w, &BilateralParams::default());
        assert!(out[(4 * w + 4) as usize] < 110);
    }

    #[test]
    fn test_bilateral_rgb_uniform_unchanged() {
        let src = RgbImage::from_pixel(12, 10, Rgb([10, 200, 30]));
        let out = bilateral_rgb(&src, &BilateralParams::default());
        assert_eq!(out, src);
    }

    #[test]
    fn test_sharpen_uniform_unchanged() {
        let src = RgbImage::from_pixel(8, 8, Rgb([50, 60, 70]));
        assert_eq!(sharpen_rgb(&src), src);
    }

    #[test]
    fn test_sharpen_amplifies_isolated_pixel() {
        let mut src = RgbImage::from_pixel(5, 5, Rgb([100, 100, 100]));
        src.put_pixel(2, 2, Rgb([120, 120, 120]));
        let out = sharpen_rgb(&src);
        // 9*120 - 8*100 = 280 -> clamps to 255
        assert_eq!(out.get_pixel(2, 2)[0], 255);
        // neighbor: 9*100 - 7*100 - 120 = 80
        assert_eq!(out.get_pixel(2, 1)[0], 80);
    }

    #[test]
    fn test_sobel_vertical_edge() {
        let w = 8u32;
        let src: Vec<u8> = (0..w * w).map(|i| if i % w < 4 { 0 } else { 100 }).collect();
        let (gx, gy) = sobel(&src, w, w);
        let i = (3 * w + 3) as usize;
        assert!((gx[i] - 400.0).abs() < 1e-3);
        assert!(gy[i].abs() < 1e-3);
    }

    #[test]
    fn test_laplacian_variance_flat_is_zero() {
        let src = vec![128u8; 32 * 32];
        assert_eq!(laplacian_variance(&src, 32, 32), 0.0);
    }

    #[test]
    fn test_laplacian_variance_checkerboard_is_high() {
        let src = checkerboard(32, 32, 1, 0, 255);
        assert!(laplacian_variance(&src, 32, 32) > 1000.0);
    }

    #[test]
    fn test_canny_flat_has_no_edges() {
        let src = vec![90u8; 24 * 24];
        assert!(canny(&src, 24, 24, 50.0, 150.0).iter().all(|&e| e == 0));
    }

    #[test]
    fn test_canny_finds_step_edge() {
        let w = 24u32;
        let src: Vec<u8> = (0..w * w).map(|i| if i % w < 12 { 0 } else { 200 }).collect();
        let edges = canny(&src, w, w, 50.0, 150.0);
        let row = 10usize;
        let edge_cols: Vec<usize> = (0..w as usize)
            .filter(|&x| edges[row * w as usize + x] == 255)
            .collect();
        assert!(!edge_cols.is_empty());
        assert!(edge_cols.iter().all(|&x| x == 11 || x == 12), "edge columns: {edge_cols:?}");
        assert!(edges.iter().all(|&e| e == 0 || e == 255));
    }
}
