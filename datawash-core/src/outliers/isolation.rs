//! Isolation forest anomaly scorer.
//!
//! Anomalies are isolated by fewer random axis-aligned splits than normal points, so a
//! short average path length across the ensemble means a high anomaly score. Scores are
//! in `(0, 1]`; values near 1 are anomalous and values well below 0.5 are normal.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::Rng;

/// Euler-Mascheroni constant, used in the harmonic-number approximation.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A fitted ensemble of isolation trees.
#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    /// Fit `n_estimators` trees, each on a subsample of `min(max_samples, rows)` rows
    /// drawn without replacement. The same seed and data always give the same forest.
    pub fn fit(data: &[Vec<f64>], n_estimators: usize, max_samples: usize, seed: u64) -> Self {
        let rows = data.len();
        let sample_size = max_samples.min(rows).max(1);
        let height_limit = (sample_size as f64).log2().ceil().max(1.0) as usize;
        let mut rng = StdRng::seed_from_u64(seed);

        let trees = if rows == 0 {
            Vec::new()
        } else {
            (0..n_estimators)
                .map(|_| {
                    let sample: Vec<usize> =
                        rand::seq::index::sample(&mut rng, rows, sample_size).into_vec();
                    grow(data, sample, 0, height_limit, &mut rng)
                })
                .collect()
        };

        Self { trees, sample_size }
    }

    /// Anomaly score of one point.
    pub fn score(&self, point: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let mean_path = self
            .trees
            .iter()
            .map(|tree| path_length(tree, point, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        let normaliser = average_path_length(self.sample_size);
        if normaliser <= 0.0 {
            return 0.5;
        }
        2f64.powf(-mean_path / normaliser)
    }

    /// Flag the points whose score lies above the `1 - contamination` quantile of the
    /// scores of `data`.
    pub fn flag(&self, data: &[Vec<f64>], contamination: f64) -> Vec<bool> {
        let scores: Vec<f64> = data.iter().map(|row| self.score(row)).collect();
        let mut sorted = scores.clone();
        sorted.sort_by(f64::total_cmp);
        let threshold = quantile(&sorted, 1.0 - contamination.clamp(0.0, 0.5));
        scores.into_iter().map(|s| s > threshold).collect()
    }
}

fn grow(
    data: &[Vec<f64>],
    sample: Vec<usize>,
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= height_limit || sample.len() <= 1 {
        return Node::Leaf { size: sample.len() };
    }

    // Only features that still vary inside this node, over a representable range, can
    // split it.
    let width = data[sample[0]].len();
    let splittable: Vec<(usize, f64, f64)> = (0..width)
        .filter_map(|feature| {
            let (lo, hi) = sample.iter().map(|&r| data[r][feature]).fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), v| (lo.min(v), hi.max(v)),
            );
            (lo < hi && (hi - lo).is_finite()).then_some((feature, lo, hi))
        })
        .collect();
    if splittable.is_empty() {
        return Node::Leaf { size: sample.len() };
    }

    let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
    let threshold = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) =
        sample.into_iter().partition(|&r| data[r][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(data, left, depth + 1, height_limit, rng)),
        right: Box::new(grow(data, right, depth + 1, height_limit, rng)),
    }
}

fn path_length(node: &Node, point: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            let next = if point[*feature] < *threshold { left } else { right };
            path_length(next, point, depth + 1)
        }
    }
}

/// Average path length of an unsuccessful search in a binary search tree of `n` nodes.
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

/// Quantile of sorted data using linear interpolation between closest ranks.
pub(crate) fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}
