//! Inverted-file (IVF-flat) index.
//!
//! Vectors are partitioned into `nlist` clusters by k-means. A search only
//! scores the vectors of the `nprobe` clusters whose centroids are closest
//! to the query, trading recall for speed. Until a collection reaches
//! `train_threshold` entries the index is untrained and every vector is a
//! candidate, so small collections are searched exhaustively.

use serde::{Deserialize, Serialize};
use tracing::debug;

use haven_core::error::HavenError;
use haven_core::types::DistanceMetric;

/// IVF index parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IvfParams {
    /// Number of clusters.
    pub nlist: usize,
    /// Number of clusters scanned per search.
    pub nprobe: usize,
    /// Entry count that triggers training.
    pub train_threshold: usize,
    /// Lloyd iterations run during training.
    pub iterations: usize,
}

impl Default for IvfParams {
    fn default() -> Self {
        Self {
            nlist: 1024,
            nprobe: 10,
            train_threshold: 40 * 1024,
            iterations: 10,
        }
    }
}

impl IvfParams {
    pub fn validate(&self) -> Result<(), HavenError> {
        if self.nlist == 0 || self.nprobe == 0 {
            return Err(HavenError::Validation(
                "IVF nlist and nprobe must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Upper bound on training points per cluster. Larger collections are
/// subsampled before k-means.
pub const MAX_TRAINING_POINTS_PER_LIST: usize = 64;

/// Cluster assignment over vectors owned by the caller.
///
/// The index stores positions into the caller's entry list rather than
/// copies of the vectors. Training is separate from insertion: callers
/// check [`needs_training`](Self::needs_training), build a trained index
/// with [`IvfIndex::build`] wherever suits them, and swap it in.
#[derive(Debug, Clone)]
pub struct IvfIndex {
    params: IvfParams,
    metric: DistanceMetric,
    centroids: Vec<Vec<f32>>,
    lists: Vec<Vec<usize>>,
}

impl IvfIndex {
    pub fn new(params: IvfParams, metric: DistanceMetric) -> Self {
        Self {
            params,
            metric,
            centroids: Vec::new(),
            lists: Vec::new(),
        }
    }

    /// Train on `entries` and assign every one of them to a list.
    ///
    /// Pure and potentially slow; run it off any lock guarding `entries`.
    pub fn build<V: AsRef<[f32]>>(params: IvfParams, metric: DistanceMetric, entries: &[V]) -> Self {
        let mut index = Self::new(params, metric);
        if entries.is_empty() {
            return index;
        }

        let sample = training_sample(entries, index.params.nlist);
        index.centroids = kmeans(&index.params, metric, &sample);
        index.lists = vec![Vec::new(); index.centroids.len()];
        for (pos, entry) in entries.iter().enumerate() {
            index.add(pos, entry.as_ref());
        }

        debug!(
            entries = entries.len(),
            sampled = sample.len(),
            nlist = index.centroids.len(),
            "IVF index trained"
        );
        index
    }

    pub fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    /// Number of trained clusters (0 while untrained).
    pub fn nlist(&self) -> usize {
        self.centroids.len()
    }

    pub fn params(&self) -> &IvfParams {
        &self.params
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Whether a collection of `total` entries has outgrown exhaustive search.
    pub fn needs_training(&self, total: usize) -> bool {
        !self.is_trained() && total > 0 && total >= self.params.train_threshold
    }

    /// Register `vector` stored at `position`. No-op while untrained, since
    /// every position is a candidate then.
    pub fn add(&mut self, position: usize, vector: &[f32]) {
        if self.is_trained() {
            let list = nearest_centroid(self.metric, &self.centroids, vector);
            self.lists[list].push(position);
        }
    }

    /// Positions worth scoring for `query`, out of `total` stored entries.
    pub fn candidates(&self, query: &[f32], total: usize) -> Vec<usize> {
        if !self.is_trained() {
            return (0..total).collect();
        }

        let mut ranked: Vec<(usize, f64)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, distance(self.metric, query, c)))
            .collect();
        ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        ranked
            .into_iter()
            .take(self.params.nprobe)
            .flat_map(|(i, _)| self.lists[i].iter().copied())
            .collect()
    }

    /// Retrain in place over `entries`.
    pub fn train<V: AsRef<[f32]>>(&mut self, entries: &[V]) {
        *self = Self::build(self.params.clone(), self.metric, entries);
    }
}

/// Evenly spaced subset of `entries` used to fit `nlist` centroids.
pub fn training_sample<V: AsRef<[f32]>>(entries: &[V], nlist: usize) -> Vec<&[f32]> {
    let n = entries.len();
    let cap = nlist.saturating_mul(MAX_TRAINING_POINTS_PER_LIST).max(1);
    if n <= cap {
        return entries.iter().map(|e| e.as_ref()).collect();
    }
    (0..cap).map(|i| entries[i * n / cap].as_ref()).collect()
}

/// Lloyd's k-means. Returns at most `params.nlist` centroids.
fn kmeans(params: &IvfParams, metric: DistanceMetric, points: &[&[f32]]) -> Vec<Vec<f32>> {
    let n = points.len();
    if n == 0 {
        return Vec::new();
    }
    let k = params.nlist.min(n);

    // Evenly spaced seeds keep training deterministic.
    let mut centroids: Vec<Vec<f32>> = (0..k).map(|i| points[i * n / k].to_vec()).collect();

    let mut assignment = vec![0usize; n];
    for _ in 0..params.iterations.max(1) {
        for (pos, point) in points.iter().enumerate() {
            assignment[pos] = nearest_centroid(metric, &centroids, point);
        }
        update_centroids(&mut centroids, points, &assignment);
    }
    centroids
}

fn update_centroids(centroids: &mut [Vec<f32>], points: &[&[f32]], assignment: &[usize]) {
    let dim = centroids[0].len();
    let mut sums = vec![vec![0.0f64; dim]; centroids.len()];
    let mut counts = vec![0usize; centroids.len()];

    for (point, &cluster) in points.iter().zip(assignment) {
        counts[cluster] += 1;
        for (acc, v) in sums[cluster].iter_mut().zip(point.iter()) {
            *acc += *v as f64;
        }
    }

    for (cluster, centroid) in centroids.iter_mut().enumerate() {
        // Empty clusters keep their previous centroid.
        if counts[cluster] == 0 {
            continue;
        }
        let count = counts[cluster] as f64;
        for (c, sum) in centroid.iter_mut().zip(&sums[cluster]) {
            *c = (sum / count) as f32;
        }
    }
}

fn nearest_centroid(metric: DistanceMetric, centroids: &[Vec<f32>], vector: &[f32]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let d = distance(metric, vector, centroid);
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    best
}

/// Euclidean distance between two vectors of equal length.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x as f64) - (*y as f64);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

/// Distance under `metric`; smaller is closer.
pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f64 {
    match metric {
        DistanceMetric::L2 => l2_distance(a, b),
        DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
    }
}

/// Similarity under `metric`; larger is closer. For L2 this is `1 - distance`.
pub fn similarity(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f64 {
    match metric {
        DistanceMetric::L2 => 1.0 - l2_distance(a, b),
        DistanceMetric::Cosine => cosine_similarity(a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params(nlist: usize, nprobe: usize, threshold: usize) -> IvfParams {
        IvfParams {
            nlist,
            nprobe,
            train_threshold: threshold,
            iterations: 5,
        }
    }

    /// Two tight clusters: around (0, 0) and around (10, 10).
    fn two_clusters() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.0],
            vec![10.0, 10.0],
            vec![0.1, 0.0],
            vec![10.1, 10.0],
            vec![0.0, 0.1],
            vec![10.0, 10.1],
        ]
    }

    #[test]
    fn test_l2_distance() {
        assert!((l2_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-9);
        assert_eq!(l2_distance(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_similarity_l2_exact_match_is_one() {
        let v = [0.3f32, 0.4, 0.5];
        assert!((similarity(DistanceMetric::L2, &v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0f32; 100];
        let sim = cosine_similarity(&a, &a);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let mut a = vec![0.0f32; 100];
        let mut b = vec![0.0f32; 100];
        a[0] = 1.0;
        b[1] = 1.0;
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = vec![0.0f32; 100];
        let b = vec![1.0f32; 100];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_untrained_index_returns_all_candidates() {
        let mut index = IvfIndex::new(small_params(2, 1, 100), DistanceMetric::L2);
        let entries = two_clusters();
        for (pos, entry) in entries.iter().enumerate() {
            index.add(pos, entry);
        }
        assert!(!index.is_trained());
        assert_eq!(index.candidates(&[0.0, 0.0], entries.len()).len(), 6);
    }

    #[test]
    fn test_add_never_trains() {
        let mut index = IvfIndex::new(small_params(2, 1, 6), DistanceMetric::L2);
        let entries = two_clusters();
        for (pos, entry) in entries.iter().enumerate() {
            index.add(pos, entry);
        }
        assert!(!index.is_trained());
        assert!(index.needs_training(entries.len()));
        assert!(!index.needs_training(5));
        assert!(!index.needs_training(0));
    }

    #[test]
    fn test_build_trains_and_assigns_every_entry() {
        let entries = two_clusters();
        let index = IvfIndex::build(small_params(2, 2, 6), DistanceMetric::L2, &entries);
        assert!(index.is_trained());
        assert_eq!(index.nlist(), 2);
        assert!(!index.needs_training(entries.len()));

        let mut all = index.candidates(&[0.0, 0.0], entries.len());
        all.sort();
        assert_eq!(all, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_build_on_empty_input_stays_untrained() {
        let entries: Vec<Vec<f32>> = Vec::new();
        let index = IvfIndex::build(small_params(2, 1, 0), DistanceMetric::L2, &entries);
        assert!(!index.is_trained());
    }

    #[test]
    fn test_training_sample_is_capped_and_spread() {
        let entries: Vec<Vec<f32>> = (0..1000).map(|i| vec![i as f32]).collect();

        let sample = training_sample(&entries, 2);
        assert_eq!(sample.len(), 2 * MAX_TRAINING_POINTS_PER_LIST);
        assert_eq!(sample[0], &[0.0][..]);
        assert!(sample[sample.len() - 1][0] > 900.0);

        assert_eq!(training_sample(&entries[..10], 2).len(), 10);
    }

    #[test]
    fn test_subsampled_training_still_separates_clusters() {
        let entries: Vec<Vec<f32>> = (0..2000)
            .map(|i| {
                let base = if i % 2 == 0 { 0.0 } else { 50.0 };
                vec![base + (i % 7) as f32 * 0.01, base]
            })
            .collect();
        let index = IvfIndex::build(small_params(2, 1, 1), DistanceMetric::L2, &entries);

        let near_origin = index.candidates(&[0.0, 0.0], entries.len());
        assert_eq!(near_origin.len(), 1000);
        assert!(near_origin.iter().all(|pos| pos % 2 == 0));
    }

    #[test]
    fn test_search_limited_to_nearest_cluster() {
        let mut index = IvfIndex::new(small_params(2, 1, 6), DistanceMetric::L2);
        let entries = two_clusters();
        index.train(&entries);

        let mut near_origin = index.candidates(&[0.05, 0.05], entries.len());
        near_origin.sort();
        assert_eq!(near_origin, vec![0, 2, 4]);

        let mut far = index.candidates(&[9.9, 9.9], entries.len());
        far.sort();
        assert_eq!(far, vec![1, 3, 5]);
    }

    #[test]
    fn test_post_training_add_joins_nearest_list() {
        let mut index = IvfIndex::new(small_params(2, 1, 6), DistanceMetric::L2);
        let mut entries = two_clusters();
        index.train(&entries);

        entries.push(vec![9.8, 10.2]);
        index.add(6, &entries[6]);

        let candidates = index.candidates(&[10.0, 10.0], entries.len());
        assert!(candidates.contains(&6));
        assert!(!candidates.contains(&0));
    }

    #[test]
    fn test_nlist_capped_by_entry_count() {
        let mut index = IvfIndex::new(small_params(1024, 4, 3), DistanceMetric::L2);
        let entries = vec![vec![0.0f32, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]];
        index.train(&entries);
        assert_eq!(index.nlist(), 3);
        assert_eq!(index.candidates(&[0.0, 1.0], 3).len(), 3);
    }

    #[test]
    fn test_params_validate() {
        assert!(IvfParams::default().validate().is_ok());
        assert!(small_params(0, 1, 1).validate().is_err());
        assert!(small_params(1, 0, 1).validate().is_err());
    }
}
