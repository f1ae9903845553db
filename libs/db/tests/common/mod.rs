//! Shared helpers for the vector index integration tests.

#![allow(dead_code)]

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tempfile::TempDir;

use trellis_db::vector::Distance;
use trellis_db::Storage;

/// Create an initialized storage in a fresh temp dir.
pub fn create_test_storage() -> (TempDir, Storage) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut storage = Storage::readwrite(temp_dir.path());
    storage.ready().expect("Failed to initialize storage");
    (temp_dir, storage)
}

/// Generate deterministic random vectors.
pub fn random_vectors(count: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dim).map(|_| rng.gen::<f32>()).collect())
        .collect()
}

/// Ground truth k-NN by brute force; returns indices into `vectors`.
pub fn brute_force_knn(
    query: &[f32],
    vectors: &[Vec<f32>],
    k: usize,
    distance: Distance,
) -> Vec<usize> {
    let mut distances: Vec<(f32, usize)> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| (distance.compute(query, v), i))
        .collect();
    distances.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    distances.into_iter().take(k).map(|(_, i)| i).collect()
}

/// Recall of `found` external ids against ground-truth ids.
pub fn compute_recall(found: &[String], ground_truth: &[String]) -> f64 {
    let truth: std::collections::HashSet<&String> = ground_truth.iter().collect();
    let hits = found.iter().filter(|id| truth.contains(id)).count();
    hits as f64 / ground_truth.len() as f64
}
