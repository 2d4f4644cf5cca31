//! Isolation forest anomaly scorer.
//!
//! Fitted once over the whole telemetry batch, then used read-only. Scores
//! follow the usual convention: `score_samples` lies in `[-1, 0)` with lower
//! values more isolated, and the reported anomaly score is that value minus
//! the contamination percentile of the training scores, so negative means
//! anomalous.

use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};

use crate::config::MonitorConfig;
use crate::error::ScorerError;
use crate::models::{AnomalyLabel, FeatureVector, Reading, ScoredReading, FEATURE_DIM, FEATURE_NAMES};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl From<&MonitorConfig> for ForestParams {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            max_samples: config.max_samples,
            contamination: config.contamination_fraction,
            seed: config.random_seed,
        }
    }
}

impl ForestParams {
    fn validate(&self) -> Result<(), ScorerError> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(ScorerError::InvalidParameter {
                name: "contamination_fraction",
                reason: format!("must be in (0, 0.5], got {}", self.contamination),
            });
        }
        if self.n_estimators == 0 {
            return Err(ScorerError::InvalidParameter {
                name: "n_estimators",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_samples < 2 {
            return Err(ScorerError::InvalidParameter {
                name: "max_samples",
                reason: format!("must be at least 2, got {}", self.max_samples),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

impl Node {
    fn path_length(&self, x: &FeatureVector, depth: usize) -> f64 {
        match self {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if x[*feature] < *threshold {
                    left.path_length(x, depth + 1)
                } else {
                    right.path_length(x, depth + 1)
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<Node>,
    /// Normaliser `c(psi)` for the subsample size each tree was grown on.
    normaliser: f64,
    /// Contamination percentile of the training `score_samples`.
    offset: f64,
}

impl IsolationForest {
    /// Fits the forest over `batch`. Deterministic for a given batch and seed.
    pub fn fit(batch: &[FeatureVector], params: ForestParams) -> Result<Self, ScorerError> {
        params.validate()?;
        if batch.is_empty() {
            return Err(ScorerError::InsufficientData);
        }
        if let Some(row) = batch
            .iter()
            .position(|x| x.iter().any(|value| !value.is_finite()))
        {
            return Err(ScorerError::NonFiniteFeature { row });
        }
        let all_rows: Vec<usize> = (0..batch.len()).collect();
        for (column, name) in FEATURE_NAMES.iter().enumerate() {
            let (lo, hi) = column_range(batch, &all_rows, column);
            if lo == hi {
                return Err(ScorerError::DegenerateFeature { column: *name });
            }
        }

        let psi = params.max_samples.min(batch.len());
        let height_limit = (psi as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(params.seed);

        let trees = (0..params.n_estimators)
            .map(|_| {
                let sample = index::sample(&mut rng, batch.len(), psi).into_vec();
                grow(batch, sample, 0, height_limit, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            normaliser: average_path_length(psi),
            offset: 0.0,
        };

        let training_scores: Vec<f64> = batch.iter().map(|x| forest.score_samples(x)).collect();
        forest.offset = percentile(training_scores, params.contamination * 100.0);

        log::debug!(
            "isolation forest fitted: {} trees, psi={}, offset={:.5}",
            forest.trees.len(),
            psi,
            forest.offset
        );

        Ok(forest)
    }

    /// Raw isolation score in `[-1, 0)`; lower is more anomalous.
    pub fn score_samples(&self, x: &FeatureVector) -> f64 {
        let mean_depth = self
            .trees
            .iter()
            .map(|tree| tree.path_length(x, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        -(2f64.powf(-mean_depth / self.normaliser))
    }

    /// Label plus offset-adjusted score. A vector with any non-finite
    /// feature is labelled anomalous with a NaN score.
    pub fn score(&self, x: &FeatureVector) -> (AnomalyLabel, f64) {
        if x.iter().any(|value| !value.is_finite()) {
            return (AnomalyLabel::Anomalous, f64::NAN);
        }

        let decision = self.score_samples(x) - self.offset;
        let label = if decision < 0.0 {
            AnomalyLabel::Anomalous
        } else {
            AnomalyLabel::Normal
        };
        (label, decision)
    }

    pub fn score_reading(&self, reading: &Reading) -> ScoredReading {
        let (anomaly_label, anomaly_score) = self.score(&reading.features());
        ScoredReading {
            reading: *reading,
            anomaly_label,
            anomaly_score,
        }
    }
}

fn grow(
    batch: &[FeatureVector],
    rows: Vec<usize>,
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= height_limit || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    let candidates: Vec<(usize, f64, f64)> = (0..FEATURE_DIM)
        .map(|column| {
            let (lo, hi) = column_range(batch, &rows, column);
            (column, lo, hi)
        })
        .filter(|(_, lo, hi)| lo < hi)
        .collect();

    if candidates.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = rng.gen_range(lo..hi);

    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
        rows.into_iter().partition(|&row| batch[row][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(batch, left_rows, depth + 1, height_limit, rng)),
        right: Box::new(grow(batch, right_rows, depth + 1, height_limit, rng)),
    }
}

fn column_range(batch: &[FeatureVector], rows: &[usize], column: usize) -> (f64, f64) {
    rows.iter()
        .map(|&row| batch[row][column])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), value| {
            (lo.min(value), hi.max(value))
        })
}

/// Expected path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolation percentile, `q` in `[0, 100]`.
fn percentile(mut values: Vec<f64>, q: f64) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let rank = (q / 100.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (rank - lo as f64)
}
