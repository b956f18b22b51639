//! Weighted multi-descriptor similarity.

use crate::stats::{chi_square, ncc, pearson};
use crate::types::FeatureVector;
use serde::{Deserialize, Serialize};

/// Strategy for scoring two feature vectors against each other, in [0, 1].
pub trait Similarity {
    fn compare(&self, a: &FeatureVector, b: &FeatureVector) -> f64;
}

/// Weight of each term in the final score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorWeights {
    pub lbp: f64,
    pub gradient: f64,
    pub color: f64,
    pub gray: f64,
    pub edge: f64,
    pub template: f64,
}

impl Default for DescriptorWeights {
    fn default() -> Self {
        Self { lbp: 0.30, gradient: 0.25, color: 0.15, gray: 0.10, edge: 0.10, template: 0.10 }
    }
}

impl DescriptorWeights {
    pub fn total(&self) -> f64 {
        self.lbp + self.gradient + self.color + self.gray + self.edge + self.template
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringParams {
    pub weights: DescriptorWeights,
    /// Chi-square distance at which the LBP distance sub-score reaches 0.
    pub chi_square_divisor: f64,
    /// Share of Pearson correlation in the LBP term; the rest is the
    /// chi-square sub-score.
    pub lbp_correlation_blend: f64,
    /// Average the chi-square distance over both directions so that
    /// `compare(a, b) == compare(b, a)`.
    pub symmetric: bool,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            weights: DescriptorWeights::default(),
            chi_square_divisor: 100.0,
            lbp_correlation_blend: 0.5,
            symmetric: true,
        }
    }
}

/// Unweighted per-term similarities and the final clamped score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub lbp: f64,
    pub gradient: f64,
    pub color: f64,
    pub gray: f64,
    pub edge: f64,
    pub template: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SimilarityScorer {
    params: ScoringParams,
}

impl SimilarityScorer {
    pub fn new(params: ScoringParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ScoringParams {
        &self.params
    }

    pub fn breakdown(&self, a: &FeatureVector, b: &FeatureVector) -> ScoreBreakdown {
        let p = &self.params;
        let (da, db) = (&a.descriptors, &b.descriptors);

        let chi = if p.symmetric {
            (chi_square(da.lbp(), db.lbp()) + chi_square(db.lbp(), da.lbp())) / 2.0
        } else {
            chi_square(da.lbp(), db.lbp())
        };
        let divisor = p.chi_square_divisor.max(f64::EPSILON);
        let chi_score = 1.0 - (chi / divisor).min(1.0);
        let blend = p.lbp_correlation_blend;
        // Not clamped: a strongly anti-correlated LBP pair pulls the score down.
        let lbp = blend * pearson(da.lbp(), db.lbp()) + (1.0 - blend) * chi_score;

        let gradient = pearson(da.gradient(), db.gradient()).max(0.0);
        let color = pearson(da.color(), db.color()).max(0.0);
        let gray = pearson(da.gray(), db.gray()).max(0.0);
        let edge = pearson(da.edge(), db.edge()).max(0.0);
        let template = ncc(a.reference.pixels(), b.reference.pixels()).max(0.0);

        let w = &p.weights;
        let total = (w.lbp * lbp
            + w.gradient * gradient
            + w.color * color
            + w.gray * gray
            + w.edge * edge
            + w.template * template)
            .clamp(0.0, 1.0);

        ScoreBreakdown { lbp, gradient, color, gray, edge, template, total }
    }
}

impl Similarity for SimilarityScorer {
    fn compare(&self, a: &FeatureVector, b: &FeatureVector) -> f64 {
        self.breakdown(a, b).total
    }
}
