//! Isotonic confidence calibration (spec §4.8): a monotonic mapping from raw
//! candidate scores to calibrated probabilities, fit with the pool-adjacent-
//! violators algorithm (PAVA) and clipped to `[0, 1]`.
//!
//! No isotonic-regression crate exists anywhere in the corpus this workspace
//! was learned from, so the fit is hand-rolled here; the serialized artifact
//! format follows the "opaque JSON blob" convention used elsewhere for
//! process-wide cached state.

use serde::{Deserialize, Serialize};

/// A fitted isotonic model: a step function from raw score to calibrated
/// probability, represented as sorted `(x, y)` knots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsotonicModel {
    knots_x: Vec<f64>,
    knots_y: Vec<f64>,
}

/// One training sample: a raw score, whether it was correct, and how many
/// times this (raw_score, correct) pair occurred (spec §4.8: "pass per-score
/// sample counts as weights to the isotonic fit").
#[derive(Debug, Clone, Copy)]
pub struct WeightedSample {
    pub raw_score: f64,
    pub correct: f64,
    pub weight: f64,
}

impl IsotonicModel {
    /// Fits a monotonically non-decreasing step function to `samples` using
    /// the pool-adjacent-violators algorithm with sample weights.
    ///
    /// Samples are first sorted by `raw_score`; adjacent pools whose means
    /// violate monotonicity are merged (weighted mean) until the whole
    /// sequence is non-decreasing.
    #[must_use]
    pub fn train(samples: &[WeightedSample]) -> Self {
        if samples.is_empty() {
            return Self { knots_x: vec![0.0, 1.0], knots_y: vec![0.0, 1.0] };
        }

        let mut sorted: Vec<WeightedSample> = samples.to_vec();
        sorted.sort_by(|a, b| a.raw_score.partial_cmp(&b.raw_score).unwrap());

        // Each pool starts as a single point: (x bounds, weighted mean y, total weight).
        struct Pool {
            x_min: f64,
            x_max: f64,
            mean: f64,
            weight: f64,
        }

        let mut pools: Vec<Pool> = sorted
            .iter()
            .map(|s| Pool { x_min: s.raw_score, x_max: s.raw_score, mean: s.correct, weight: s.weight.max(1e-9) })
            .collect();

        let mut i = 0;
        while i + 1 < pools.len() {
            if pools[i].mean > pools[i + 1].mean {
                let merged_weight = pools[i].weight + pools[i + 1].weight;
                let merged_mean = (pools[i].mean * pools[i].weight + pools[i + 1].mean * pools[i + 1].weight) / merged_weight;
                let merged = Pool {
                    x_min: pools[i].x_min,
                    x_max: pools[i + 1].x_max,
                    mean: merged_mean,
                    weight: merged_weight,
                };
                pools.splice(i..=i + 1, [merged]);
                i = i.saturating_sub(1);
            } else {
                i += 1;
            }
        }

        let knots_x: Vec<f64> = pools.iter().map(|p| p.x_max).collect();
        let knots_y: Vec<f64> = pools.iter().map(|p| p.mean.clamp(0.0, 1.0)).collect();

        Self { knots_x, knots_y }
    }

    /// Maps a raw score to a calibrated probability by stepping through the
    /// fitted knots; scores beyond the training range clamp to the nearest
    /// knot's value.
    #[must_use]
    pub fn calibrate(&self, raw_score: f64) -> f64 {
        for (x, y) in self.knots_x.iter().zip(self.knots_y.iter()) {
            if raw_score <= *x {
                return *y;
            }
        }
        *self.knots_y.last().unwrap_or(&raw_score.clamp(0.0, 1.0))
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    #[must_use]
    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}

/// Applies `model` if present, otherwise returns the raw score unchanged
/// (spec §4.8: "If no model is present, the pipeline operates on raw scores
/// — no component is allowed to fail due to its absence").
#[must_use]
pub fn calibrate_or_identity(model: Option<&IsotonicModel>, raw_score: f64) -> f64 {
    model.map_or(raw_score, |m| m.calibrate(raw_score))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(raw: f64, correct: f64) -> WeightedSample {
        WeightedSample { raw_score: raw, correct, weight: 1.0 }
    }

    #[test]
    fn identity_when_no_model_present() {
        assert_eq!(calibrate_or_identity(None, 0.73), 0.73);
    }

    #[test]
    fn calibration_output_is_monotonic_in_training_order() {
        let samples = vec![sample(0.1, 0.0), sample(0.3, 0.0), sample(0.5, 1.0), sample(0.7, 0.0), sample(0.9, 1.0)];
        let model = IsotonicModel::train(&samples);
        let mut prev = f64::MIN;
        for x in [0.0, 0.2, 0.4, 0.6, 0.8, 1.0] {
            let y = model.calibrate(x);
            assert!(y >= prev - 1e-9, "calibration output must be non-decreasing");
            prev = y;
        }
    }

    #[test]
    fn calibration_output_is_clipped_to_unit_interval() {
        let samples = vec![sample(0.2, 1.0), sample(0.8, 1.0)];
        let model = IsotonicModel::train(&samples);
        for x in [0.0, 0.5, 1.0] {
            let y = model.calibrate(x);
            assert!((0.0..=1.0).contains(&y));
        }
    }

    #[test]
    fn empty_training_set_yields_identity_like_model() {
        let model = IsotonicModel::train(&[]);
        assert_eq!(model.calibrate(0.5), 0.5);
    }

    #[test]
    fn roundtrips_through_json() {
        let model = IsotonicModel::train(&[sample(0.1, 0.0), sample(0.9, 1.0)]);
        let json = model.to_json().unwrap();
        let back = IsotonicModel::from_json(&json).unwrap();
        assert_eq!(model.calibrate(0.5), back.calibrate(0.5));
    }

    proptest::proptest! {
        #[test]
        fn calibrate_is_monotonic_for_arbitrary_training_sets(
            raws in proptest::collection::vec(0.0..1.0f64, 1..30),
            labels in proptest::collection::vec(0.0..=1.0f64, 1..30),
        ) {
            let n = raws.len().min(labels.len());
            let samples: Vec<WeightedSample> = (0..n).map(|i| sample(raws[i], labels[i].round())).collect();
            let model = IsotonicModel::train(&samples);
            let probes: Vec<f64> = (0..=20).map(|i| i as f64 / 20.0).collect();
            let outputs: Vec<f64> = probes.iter().map(|&p| model.calibrate(p)).collect();
            for w in outputs.windows(2) {
                prop_assert!(w[1] >= w[0] - 1e-9);
            }
        }
    }
}
