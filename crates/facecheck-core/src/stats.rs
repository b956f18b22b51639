//! Histogram and signal statistics used by the descriptors and the scorer.

/// Bins below this magnitude are treated as empty by the chi-square distance.
const CHI_SQUARE_EPS: f64 = 1e-10;

/// Scale a histogram so its entries sum to 1.
///
/// An all-zero histogram becomes the uniform distribution, which keeps
/// every descriptor a proper distribution even for a featureless patch.
pub fn normalize_histogram(hist: &mut [f64]) {
    if hist.is_empty() {
        return;
    }
    let sum: f64 = hist.iter().sum();
    if sum > 0.0 {
        hist.iter_mut().for_each(|v| *v /= sum);
    } else {
        let uniform = 1.0 / hist.len() as f64;
        hist.iter_mut().for_each(|v| *v = uniform);
    }
}

/// Pearson correlation of two equal-length sequences, in [-1, 1].
///
/// When either side has zero variance the correlation is undefined; the
/// result is then 1.0 for identical inputs and 0.0 otherwise.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }

    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a[..n].iter().zip(&b[..n]) {
        let da = x - mean_a;
        let db = y - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom <= f64::EPSILON {
        return if a[..n] == b[..n] { 1.0 } else { 0.0 };
    }
    (cov / denom).clamp(-1.0, 1.0)
}

/// Chi-square distance `Σ (a − b)² / a` over the bins where `a` is non-empty.
///
/// Not symmetric: `a` is the reference distribution.
pub fn chi_square(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .filter(|(x, _)| x.abs() > CHI_SQUARE_EPS)
        .map(|(x, y)| (x - y).powi(2) / x)
        .sum()
}

/// Mean-subtracted normalized cross-correlation of two same-size images,
/// in [-1, 1].
///
/// Flat images have no defined correlation; the result is 1.0 when the
/// images are identical and 0.0 otherwise.
pub fn ncc(a: &[u8], b: &[u8]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }

    let mean_a = a[..n].iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().map(|&v| v as f64).sum::<f64>() / n as f64;

    let mut num = 0.0;
    let mut ss_a = 0.0;
    let mut ss_b = 0.0;
    for (&x, &y) in a[..n].iter().zip(&b[..n]) {
        let da = x as f64 - mean_a;
        let db = y as f64 - mean_b;
        num += da * db;
        ss_a += da * da;
        ss_b += db * db;
    }

    let denom = (ss_a * ss_b).sqrt();
    if denom <= f64::EPSILON {
        return if a[..n] == b[..n] { 1.0 } else { 0.0 };
    }
    (num / denom).clamp(-1.0, 1.0)
}
