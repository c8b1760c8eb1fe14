//! Seeded k-means clustering and silhouette scoring
//!
//! Lloyd's algorithm with k-means++ seeding, a fixed restart count, and an
//! iteration cap. All randomness comes from a caller-supplied seed through
//! `ChaCha8Rng`, so a given (data, k, seed) triple always produces the same
//! labels.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A fitted clustering
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct KMeansFit {
    /// Cluster label per input row
    pub labels: Vec<usize>,
    /// Final centroids
    pub centroids: Vec<Vec<f64>>,
    /// Within-cluster sum of squared distances
    pub inertia: f64,
}

/// Fit k-means, keeping the best of `n_init` seeded restarts
pub(crate) fn fit(
    data: &[Vec<f64>],
    k: usize,
    seed: u64,
    n_init: u32,
    max_iter: u32,
) -> KMeansFit {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut best = fit_once(data, k, &mut rng, max_iter);
    for restart in 1..n_init.max(1) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(restart as u64));
        let fitted = fit_once(data, k, &mut rng, max_iter);
        if fitted.inertia < best.inertia {
            best = fitted;
        }
    }
    best
}

fn fit_once(data: &[Vec<f64>], k: usize, rng: &mut ChaCha8Rng, max_iter: u32) -> KMeansFit {
    let n = data.len();
    let mut centroids = plus_plus_init(data, k, rng);
    let mut labels = vec![0usize; n];

    for _ in 0..max_iter {
        // assignment step; ties go to the lowest cluster index
        let mut changed = false;
        for (i, row) in data.iter().enumerate() {
            let label = nearest_centroid(row, &centroids);
            if label != labels[i] {
                labels[i] = label;
                changed = true;
            }
        }

        // update step
        let mut sums = vec![vec![0.0; data[0].len()]; k];
        let mut counts = vec![0usize; k];
        for (row, &label) in data.iter().zip(&labels) {
            counts[label] += 1;
            for (sum, value) in sums[label].iter_mut().zip(row) {
                *sum += value;
            }
        }
        for (cluster, (sum, &count)) in sums.iter().zip(&counts).enumerate() {
            if count > 0 {
                centroids[cluster] = sum.iter().map(|s| s / count as f64).collect();
            } else {
                // empty cluster: seize the point farthest from its own centroid
                let farthest = (0..n)
                    .max_by(|&a, &b| {
                        let da = squared_distance(&data[a], &centroids[labels[a]]);
                        let db = squared_distance(&data[b], &centroids[labels[b]]);
                        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .unwrap_or(0);
                centroids[cluster] = data[farthest].clone();
            }
        }

        if !changed {
            break;
        }
    }

    let inertia = data
        .iter()
        .zip(&labels)
        .map(|(row, &label)| squared_distance(row, &centroids[label]))
        .sum();

    KMeansFit {
        labels,
        centroids,
        inertia,
    }
}

/// k-means++ seeding: subsequent centers drawn proportionally to their
/// squared distance from the nearest existing center
fn plus_plus_init(data: &[Vec<f64>], k: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
    let n = data.len();
    let mut centroids: Vec<Vec<f64>> = Vec::with_capacity(k);
    centroids.push(data[rng.gen_range(0..n)].clone());

    let mut distances: Vec<f64> = data
        .iter()
        .map(|row| squared_distance(row, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = distances.iter().sum();
        let index = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = n - 1;
            for (i, &distance) in distances.iter().enumerate() {
                target -= distance;
                if target <= 0.0 {
                    chosen = i;
                    break;
                }
            }
            chosen
        } else {
            // all remaining points coincide with a center
            rng.gen_range(0..n)
        };

        centroids.push(data[index].clone());
        for (distance, row) in distances.iter_mut().zip(data) {
            let to_new = squared_distance(row, centroids.last().unwrap_or(&data[index]));
            if to_new < *distance {
                *distance = to_new;
            }
        }
    }

    centroids
}

fn nearest_centroid(row: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (cluster, centroid) in centroids.iter().enumerate() {
        let distance = squared_distance(row, centroid);
        if distance < best_distance {
            best_distance = distance;
            best = cluster;
        }
    }
    best
}

pub(crate) fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Mean silhouette score over all points
///
/// For each point, cohesion `a` is the mean distance to its own cluster and
/// separation `b` the smallest mean distance to any other cluster;
/// `s = (b - a) / max(a, b)`. Points in singleton clusters score 0.
pub(crate) fn silhouette(data: &[Vec<f64>], labels: &[usize], k: usize) -> f64 {
    let n = data.len();
    if k < 2 || n <= k {
        return 0.0;
    }

    let mut cluster_sizes = vec![0usize; k];
    for &label in labels {
        cluster_sizes[label] += 1;
    }

    let mut total = 0.0;
    for i in 0..n {
        let own = labels[i];
        if cluster_sizes[own] <= 1 {
            continue; // singleton scores 0
        }

        let mut sums = vec![0.0; k];
        for j in 0..n {
            if i == j {
                continue;
            }
            sums[labels[j]] += squared_distance(&data[i], &data[j]).sqrt();
        }

        let a = sums[own] / (cluster_sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && cluster_sizes[c] > 0)
            .map(|c| sums[c] / cluster_sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);

        let denom = a.max(b);
        if denom > 0.0 && b.is_finite() {
            total += (b - a) / denom;
        }
    }

    total / n as f64
}
