//! Dual clustering engine over normalized features.
//!
//! Two independent passes run over the same batch and neither affects the
//! other's output:
//! 1. Partition pass: fixed-k centroid clustering, every record assigned
//! 2. Density pass: DBSCAN, unreachable records flagged as noise
//!
//! Both passes are exposed as swappable strategy traits so a different
//! implementation can be dropped in as long as the label semantics hold.
//!
//! Neighborhood queries for the density pass go through an R-tree rather
//! than a pairwise scan.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::normalize::FEATURES;

/// Density label for records that are neither core points nor reachable
/// from one. A sentinel, not an ordinal cluster id.
pub const NOISE: i64 = -1;

const UNVISITED: i64 = -2;

const CONVERGENCE_THRESHOLD: f64 = 1e-4;

/// Per-record pair of cluster labels from the two passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterAssignment {
    pub partition: usize,
    pub density: i64,
}

impl ClusterAssignment {
    /// Whether the density pass flagged this record as an outlier.
    pub fn is_noise(&self) -> bool {
        self.density == NOISE
    }
}

/// Fixed-k partitioning strategy: every feature row gets a cluster id in
/// `[0, k)`, no row is ever unassigned.
pub trait PartitionClusterer {
    fn fit(&self, features: &[[f64; FEATURES]]) -> Vec<usize>;
}

/// Density-based strategy over an `N`-dimensional feature space. Returns one
/// label per row; [`NOISE`] marks outliers.
pub trait DensityClusterer<const N: usize> {
    fn fit(&self, features: &[[f64; N]]) -> Vec<i64>;
}

// ============================================================================
// K-means partitioning
// ============================================================================

/// Lloyd's k-means with seeded k-means++ initialization.
///
/// Deterministic for a fixed seed: centroid initialization draws from a
/// seeded RNG and nearest-centroid ties resolve to the lowest index. When
/// the batch holds fewer rows than `k`, the cluster count clamps to the
/// row count.
#[derive(Debug, Clone)]
pub struct KMeans {
    /// Requested number of clusters.
    pub k: usize,
    /// RNG seed for reproducible initialization.
    pub seed: u64,
    /// Iteration cap for Lloyd's loop.
    pub max_iterations: usize,
}

impl Default for KMeans {
    fn default() -> Self {
        Self {
            k: 3,
            seed: 0,
            max_iterations: 100,
        }
    }
}

impl PartitionClusterer for KMeans {
    fn fit(&self, features: &[[f64; FEATURES]]) -> Vec<usize> {
        let n = features.len();
        if n == 0 {
            return Vec::new();
        }
        let k = self.k.max(1).min(n);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids = init_centroids(features, k, &mut rng);
        let mut assignments = vec![0usize; n];
        let mut prev_inertia = f64::INFINITY;

        for _ in 0..self.max_iterations {
            for (slot, point) in assignments.iter_mut().zip(features) {
                *slot = nearest_centroid(point, &centroids);
            }

            let mut sums = vec![[0.0; FEATURES]; k];
            let mut counts = vec![0usize; k];
            for (point, &cluster) in features.iter().zip(&assignments) {
                for (acc, value) in sums[cluster].iter_mut().zip(point) {
                    *acc += value;
                }
                counts[cluster] += 1;
            }

            for (centroid, (sum, &count)) in
                centroids.iter_mut().zip(sums.iter().zip(&counts))
            {
                if count > 0 {
                    for (slot, acc) in centroid.iter_mut().zip(sum) {
                        *slot = acc / count as f64;
                    }
                } else {
                    // Empty cluster: reseed from a data point.
                    *centroid = features[rng.random_range(0..n)];
                }
            }

            let inertia: f64 = features
                .iter()
                .zip(&assignments)
                .map(|(point, &cluster)| squared_distance(point, &centroids[cluster]))
                .sum();

            if (prev_inertia - inertia).abs() < 1e-10 + CONVERGENCE_THRESHOLD * inertia {
                break;
            }
            prev_inertia = inertia;
        }

        for (slot, point) in assignments.iter_mut().zip(features) {
            *slot = nearest_centroid(point, &centroids);
        }
        assignments
    }
}

/// k-means++ style initialization: first centroid uniform, the rest chosen
/// with probability proportional to squared distance from the nearest
/// already-chosen centroid.
fn init_centroids(
    features: &[[f64; FEATURES]],
    k: usize,
    rng: &mut StdRng,
) -> Vec<[f64; FEATURES]> {
    let n = features.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(features[rng.random_range(0..n)]);

    while centroids.len() < k {
        let weights: Vec<f64> = features
            .iter()
            .map(|point| {
                centroids
                    .iter()
                    .map(|c| squared_distance(point, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = weights.iter().sum();

        if total <= 0.0 {
            // All rows coincide with a centroid already; pick uniformly.
            centroids.push(features[rng.random_range(0..n)]);
            continue;
        }

        let mut threshold = rng.random::<f64>() * total;
        let mut chosen = n - 1;
        for (i, weight) in weights.iter().enumerate() {
            threshold -= weight;
            if threshold <= 0.0 {
                chosen = i;
                break;
            }
        }
        centroids.push(features[chosen]);
    }

    centroids
}

fn nearest_centroid(point: &[f64; FEATURES], centroids: &[[f64; FEATURES]]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let dist = squared_distance(point, centroid);
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best
}

fn squared_distance<const N: usize>(a: &[f64; N], b: &[f64; N]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

// ============================================================================
// DBSCAN density clustering
// ============================================================================

/// DBSCAN over an R-tree index.
///
/// A row is a core point when its `eps`-neighborhood (which includes the row
/// itself) holds at least `min_samples` rows. Clusters grow from core points
/// by breadth-first expansion; everything unreachable ends up as [`NOISE`].
/// If no core point qualifies, every row is noise, never an error.
#[derive(Debug, Clone, Copy)]
pub struct Dbscan {
    /// Neighborhood radius in feature-space units.
    pub eps: f64,
    /// Minimum neighborhood size (self included) for a core point.
    pub min_samples: usize,
}

impl Default for Dbscan {
    fn default() -> Self {
        Self {
            eps: 0.1,
            min_samples: 3,
        }
    }
}

/// A feature row with its batch index, indexed by position.
#[derive(Debug, Clone, Copy)]
struct IndexedPoint<const N: usize> {
    idx: usize,
    pos: [f64; N],
}

impl<const N: usize> RTreeObject for IndexedPoint<N> {
    type Envelope = AABB<[f64; N]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.pos)
    }
}

impl<const N: usize> PointDistance for IndexedPoint<N> {
    fn distance_2(&self, point: &[f64; N]) -> f64 {
        squared_distance(&self.pos, point)
    }
}

impl<const N: usize> DensityClusterer<N> for Dbscan {
    fn fit(&self, features: &[[f64; N]]) -> Vec<i64> {
        let n = features.len();
        if n == 0 {
            return Vec::new();
        }

        let indexed: Vec<IndexedPoint<N>> = features
            .iter()
            .enumerate()
            .map(|(idx, &pos)| IndexedPoint { idx, pos })
            .collect();
        let tree = RTree::bulk_load(indexed);
        let eps_sq = self.eps * self.eps;

        let mut labels = vec![UNVISITED; n];
        let mut cluster_id: i64 = 0;

        for i in 0..n {
            if labels[i] != UNVISITED {
                continue;
            }
            let neighbors = neighbors_of(&tree, &features[i], eps_sq);
            if neighbors.len() < self.min_samples {
                labels[i] = NOISE;
                continue;
            }

            labels[i] = cluster_id;
            let mut queue: VecDeque<usize> =
                neighbors.into_iter().filter(|&j| j != i).collect();

            while let Some(j) = queue.pop_front() {
                if labels[j] == NOISE {
                    // Border point: reachable from a core point, not core itself.
                    labels[j] = cluster_id;
                    continue;
                }
                if labels[j] != UNVISITED {
                    continue;
                }
                labels[j] = cluster_id;
                let expansion = neighbors_of(&tree, &features[j], eps_sq);
                if expansion.len() >= self.min_samples {
                    queue.extend(expansion);
                }
            }

            cluster_id += 1;
        }

        labels
    }
}

fn neighbors_of<const N: usize>(
    tree: &RTree<IndexedPoint<N>>,
    center: &[f64; N],
    eps_sq: f64,
) -> Vec<usize> {
    tree.locate_within_distance(*center, eps_sq)
        .map(|p| p.idx)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kmeans_empty() {
        let labels = PartitionClusterer::fit(&KMeans::default(), &[]);
        assert!(labels.is_empty());
    }

    #[test]
    fn test_kmeans_every_row_assigned_in_range() {
        let features: Vec<[f64; 3]> = (0..20)
            .map(|i| {
                let t = i as f64 / 19.0;
                [t, 1.0 - t, (t * 7.0).fract()]
            })
            .collect();
        let kmeans = KMeans::default();
        let labels = PartitionClusterer::fit(&kmeans, &features);
        assert_eq!(labels.len(), features.len());
        for &label in &labels {
            assert!(label < kmeans.k);
        }
    }

    #[test]
    fn test_kmeans_deterministic_for_fixed_seed() {
        let features: Vec<[f64; 3]> = (0..15)
            .map(|i| {
                let t = i as f64;
                [(t * 0.37).fract(), (t * 0.61).fract(), (t * 0.13).fract()]
            })
            .collect();
        let kmeans = KMeans { k: 3, seed: 42, max_iterations: 100 };
        let first = PartitionClusterer::fit(&kmeans, &features);
        let second = PartitionClusterer::fit(&kmeans, &features);
        assert_eq!(first, second);
    }

    #[test]
    fn test_kmeans_clamps_k_to_row_count() {
        let features = vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]];
        let labels = PartitionClusterer::fit(&KMeans { k: 3, ..KMeans::default() }, &features);
        assert_eq!(labels.len(), 2);
        for &label in &labels {
            assert!(label < 2);
        }
    }

    #[test]
    fn test_kmeans_separates_distant_groups() {
        let features = vec![
            [0.0, 0.0, 0.05],
            [0.02, 0.01, 0.0],
            [0.01, 0.03, 0.02],
            [1.0, 1.0, 0.95],
            [0.98, 0.99, 1.0],
            [0.99, 0.97, 0.98],
        ];
        let labels =
            PartitionClusterer::fit(&KMeans { k: 2, ..KMeans::default() }, &features);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn test_dbscan_empty() {
        let features: [[f64; 2]; 0] = [];
        let labels = DensityClusterer::fit(&Dbscan::default(), &features);
        assert!(labels.is_empty());
    }

    #[test]
    fn test_dbscan_flags_outlier_as_noise() {
        let features: Vec<[f64; 2]> = vec![
            [0.10, 0.10],
            [0.12, 0.11],
            [0.11, 0.13],
            [0.13, 0.12],
            [0.90, 0.90], // far from the pack
        ];
        let dbscan = Dbscan { eps: 0.05, min_samples: 3 };
        let labels = DensityClusterer::fit(&dbscan, &features);
        assert_eq!(labels[4], NOISE);
        for &label in &labels[..4] {
            assert!(label >= 0);
        }
        assert!(labels[..4].iter().all(|&l| l == labels[0]));
    }

    #[test]
    fn test_dbscan_all_noise_without_core_points() {
        let features: Vec<[f64; 2]> = vec![[0.0, 0.0], [0.5, 0.5], [1.0, 1.0]];
        let dbscan = Dbscan { eps: 0.05, min_samples: 3 };
        let labels = DensityClusterer::fit(&dbscan, &features);
        assert!(labels.iter().all(|&l| l == NOISE));
    }

    #[test]
    fn test_dbscan_three_features() {
        let features: Vec<[f64; 3]> = vec![
            [0.1, 0.1, 0.2],
            [0.11, 0.12, 0.21],
            [0.12, 0.11, 0.19],
            [0.9, 0.9, 0.9],
        ];
        let dbscan = Dbscan { eps: 0.08, min_samples: 3 };
        let labels = DensityClusterer::fit(&dbscan, &features);
        assert!(labels[0] >= 0);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], NOISE);
    }

    #[test]
    fn test_dbscan_two_separate_clusters() {
        let features: Vec<[f64; 2]> = vec![
            [0.1, 0.1],
            [0.11, 0.11],
            [0.12, 0.1],
            [0.8, 0.8],
            [0.81, 0.81],
            [0.82, 0.8],
        ];
        let dbscan = Dbscan { eps: 0.05, min_samples: 3 };
        let labels = DensityClusterer::fit(&dbscan, &features);
        assert!(labels[0] >= 0 && labels[3] >= 0);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[3], labels[4]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn test_cluster_assignment_noise_check() {
        assert!(ClusterAssignment { partition: 0, density: NOISE }.is_noise());
        assert!(!ClusterAssignment { partition: 0, density: 2 }.is_noise());
    }
}
