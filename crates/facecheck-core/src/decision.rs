//! Accept / uncertain / reject decision over a scored gallery.

use crate::registry::EntryError;
use crate::scorer::{Similarity, SimilarityScorer};
use crate::types::{ComparisonResult, FeatureVector, Identity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of candidates reported back on rejection.
const REJECT_CANDIDATES: usize = 2;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecisionError {
    #[error("no identities enrolled")]
    EmptyRegistry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionParams {
    /// Minimum best score for a positive identification.
    pub threshold: f64,
    /// Minimum lead of the best score over the runner-up.
    pub ambiguity_gap: f64,
}

impl Default for DecisionParams {
    fn default() -> Self {
        Self { threshold: 0.60, ambiguity_gap: 0.05 }
    }
}

/// Result of a verification attempt. Confidences are percentages (score × 100).
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    NoEnrollments,
    Accept { name: String, confidence: f64 },
    Uncertain { best_name: String, confidence: f64 },
    /// Up to two best candidates; empty when no entry could be scored.
    Reject { top_candidates: Vec<ComparisonResult> },
}

impl Outcome {
    pub fn is_accept(&self) -> bool {
        matches!(self, Outcome::Accept { .. })
    }
}

/// Scored candidates, best first, plus the entries that could not be scored.
#[derive(Debug, Default)]
pub struct Ranking {
    pub candidates: Vec<ComparisonResult>,
    pub skipped: Vec<EntryError>,
}

#[derive(Debug, Clone, Default)]
pub struct DecisionEngine<S = SimilarityScorer> {
    scorer: S,
    params: DecisionParams,
}

impl<S: Similarity> DecisionEngine<S> {
    pub fn new(scorer: S, params: DecisionParams) -> Self {
        Self { scorer, params }
    }

    pub fn params(&self) -> &DecisionParams {
        &self.params
    }

    /// Score `probe` against every loadable entry.
    ///
    /// Entries that failed to load are collected in `skipped` rather than
    /// aborting the ranking.
    pub fn rank(
        &self,
        probe: &FeatureVector,
        enrolled: Vec<Result<Identity, EntryError>>,
    ) -> Result<Ranking, DecisionError> {
        if enrolled.is_empty() {
            return Err(DecisionError::EmptyRegistry);
        }

        let mut ranking = Ranking::default();
        for entry in enrolled {
            match entry {
                Ok(identity) => {
                    let score = self.scorer.compare(probe, &identity.features);
                    tracing::debug!(name = %identity.name, score, "candidate scored");
                    ranking.candidates.push(ComparisonResult { name: identity.name, score });
                }
                Err(e) => ranking.skipped.push(e),
            }
        }

        ranking.candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(ranking)
    }

    pub fn decide(&self, probe: &FeatureVector, enrolled: Vec<Result<Identity, EntryError>>) -> Outcome {
        let ranking = match self.rank(probe, enrolled) {
            Ok(r) => r,
            Err(DecisionError::EmptyRegistry) => {
                tracing::info!("verification attempted with no enrolled identities");
                return Outcome::NoEnrollments;
            }
        };

        for skipped in &ranking.skipped {
            tracing::warn!(name = skipped.name(), reason = %skipped, "skipping registry entry");
        }

        let outcome = self.classify(ranking.candidates);
        tracing::info!(?outcome, "verification decided");
        outcome
    }

    /// Apply threshold and ambiguity rules to candidates.
    pub fn classify(&self, mut candidates: Vec<ComparisonResult>) -> Outcome {
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let Some(best) = candidates.first() else {
            return Outcome::Reject { top_candidates: Vec::new() };
        };

        if best.score < self.params.threshold {
            candidates.truncate(REJECT_CANDIDATES);
            return Outcome::Reject { top_candidates: candidates };
        }

        let confidence = best.score * 100.0;
        match candidates.get(1) {
            Some(second) if best.score - second.score < self.params.ambiguity_gap => {
                Outcome::Uncertain { best_name: best.name.clone(), confidence }
            }
            _ => Outcome::Accept { name: best.name.clone(), confidence },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Descriptors, ReferenceHandle, ReferencePatch, EDGE_BINS, GRADIENT_BINS, LBP_BINS, COLOR_BINS, GRAY_BINS};
    use chrono::NaiveDate;

    fn candidates(scores: &[(&str, f64)]) -> Vec<ComparisonResult> {
        scores
            .iter()
            .map(|(n, s)| ComparisonResult { name: n.to_string(), score: *s })
            .collect()
    }

    fn engine() -> DecisionEngine {
        DecisionEngine::default()
    }

    /// Feature vector tagged through its first LBP bin, read back by `TagScorer`.
    fn tagged(tag: f64) -> FeatureVector {
        let mut lbp = vec![0.0; LBP_BINS];
        lbp[0] = tag;
        FeatureVector {
            descriptors: Descriptors::new(
                lbp,
                vec![0.0; GRADIENT_BINS],
                vec![0.0; COLOR_BINS],
                vec![0.0; GRAY_BINS],
                vec![0.0; EDGE_BINS],
            )
            .unwrap(),
            reference: ReferencePatch::new(vec![0; 160 * 160]).unwrap(),
        }
    }

    struct TagScorer;

    impl Similarity for TagScorer {
        fn compare(&self, _probe: &FeatureVector, b: &FeatureVector) -> f64 {
            b.descriptors.lbp()[0]
        }
    }

    fn identity(name: &str, score: f64) -> Identity {
        Identity {
            name: name.into(),
            features: tagged(score),
            reference: ReferenceHandle(format!("mem:{name}")),
            registered_at: NaiveDate::from_ymd_opt(2024, 1, 1).and_then(|d| d.and_hms_opt(12, 0, 0)),
        }
    }

    #[test]
    fn test_accept_with_clear_gap() {
        let outcome = engine().classify(candidates(&[("best", 0.62), ("other", 0.55)]));
        match outcome {
            Outcome::Accept { name, confidence } => {
                assert_eq!(name, "best");
                assert!((confidence - 62.0).abs() < 1e-9);
            }
            other => panic!("expected Accept, got {other:?}"),
        }
    }

    #[test]
    fn test_uncertain_with_small_gap() {
        let outcome = engine().classify(candidates(&[("other", 0.59), ("best", 0.62)]));
        match outcome {
            Outcome::Uncertain { best_name, confidence } => {
                assert_eq!(best_name, "best");
                assert!((confidence - 62.0).abs() < 1e-9);
            }
            other => panic!("expected Uncertain, got {other:?}"),
        }
    }

    #[test]
    fn test_reject_carries_top_two() {
        let outcome = engine().classify(candidates(&[("c", 0.10), ("a", 0.45), ("b", 0.40)]));
        assert_eq!(
            outcome,
            Outcome::Reject { top_candidates: candidates(&[("a", 0.45), ("b", 0.40)]) }
        );
    }

    #[test]
    fn test_single_candidate_above_threshold_accepts() {
        let outcome = engine().classify(candidates(&[("solo", 0.61)]));
        assert!(outcome.is_accept());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let outcome = engine().classify(candidates(&[("edge", 0.60)]));
        assert!(outcome.is_accept());
    }

    #[test]
    fn test_no_scored_candidates_rejects_empty() {
        assert_eq!(engine().classify(vec![]), Outcome::Reject { top_candidates: vec![] });
    }

    #[test]
    fn test_empty_registry() {
        let engine = DecisionEngine::new(TagScorer, DecisionParams::default());
        assert_eq!(engine.decide(&tagged(0.0), vec![]), Outcome::NoEnrollments);
        assert_eq!(engine.rank(&tagged(0.0), vec![]).unwrap_err(), DecisionError::EmptyRegistry);
    }

    #[test]
    fn test_skipped_entries_do_not_block_accept() {
        let engine = DecisionEngine::new(TagScorer, DecisionParams::default());
        let enrolled = vec![
            Err(EntryError::MissingReferenceArtifact {
                name: "ghost".into(),
                path: "/faces/ghost.png".into(),
                reason: "not found".into(),
            }),
            Ok(identity("alice", 0.8)),
            Ok(identity("bob", 0.3)),
        ];

        let ranking = engine.rank(&tagged(0.0), enrolled.clone()).unwrap();
        assert_eq!(ranking.skipped.len(), 1);
        assert_eq!(ranking.candidates[0].name, "alice");

        match engine.decide(&tagged(0.0), enrolled) {
            Outcome::Accept { name, .. } => assert_eq!(name, "alice"),
            other => panic!("expected Accept, got {other:?}"),
        }
    }

    #[test]
    fn test_all_entries_skipped_rejects_empty() {
        let engine = DecisionEngine::new(TagScorer, DecisionParams::default());
        let enrolled = vec![Err(EntryError::CorruptRegistryEntry {
            name: "broken".into(),
            reason: "hog_hist has 3 values, expected 36".into(),
        })];
        assert_eq!(engine.decide(&tagged(0.0), enrolled), Outcome::Reject { top_candidates: vec![] });
    }
}
