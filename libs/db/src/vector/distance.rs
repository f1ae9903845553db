//! Distance metrics for vector similarity.
//!
//! The metric is fixed when an index is created and cannot be changed
//! per-search, because the HNSW graph structure is optimized for the metric
//! used during construction. The string form doubles as the registry key
//! used by the persisted descriptor; deserialization resolves metrics
//! through `FromStr` instead of reflecting over type names.

use serde::{Deserialize, Serialize};

/// Distance metric for vector similarity computation.
///
/// Every metric is oriented so that lower values mean more similar; the
/// dot product is negated to fit that ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Distance {
    /// `1 - cos(a, b)`, in `[0, 2]`.
    Cosine,

    /// Euclidean norm of `a - b`.
    L2,

    /// `-(a · b)`.
    DotProduct,
}

impl Distance {
    /// Compute distance between two vectors using this metric.
    pub fn compute(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Distance::Cosine => trellis_core::distance::cosine(a, b),
            Distance::L2 => trellis_core::distance::euclidean(a, b),
            Distance::DotProduct => -trellis_core::distance::dot(a, b),
        }
    }

    /// Registry key of the distance metric.
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "cosine",
            Distance::L2 => "l2",
            Distance::DotProduct => "dot",
        }
    }
}

impl std::fmt::Display for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Distance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" | "cos" => Ok(Distance::Cosine),
            "l2" | "euclidean" | "euclid" => Ok(Distance::L2),
            "dot" | "dotproduct" | "dot_product" | "inner" | "ip" => Ok(Distance::DotProduct),
            _ => Err(format!("Unknown distance metric: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_keys_roundtrip() {
        for metric in [Distance::Cosine, Distance::L2, Distance::DotProduct] {
            assert_eq!(metric.as_str().parse::<Distance>().unwrap(), metric);
            assert_eq!(metric.to_string(), metric.as_str());
        }
    }

    #[test]
    fn registry_accepts_aliases() {
        assert_eq!("euclidean".parse::<Distance>().unwrap(), Distance::L2);
        assert_eq!("ip".parse::<Distance>().unwrap(), Distance::DotProduct);
        assert_eq!("COS".parse::<Distance>().unwrap(), Distance::Cosine);
        assert!("manhattan".parse::<Distance>().is_err());
    }

    #[test]
    fn compute_l2_is_root_of_squares() {
        let a = [1.0, 2.0];
        let b = [4.0, 6.0];
        assert!((Distance::L2.compute(&a, &b) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn compute_dot_negates_for_min_ordering() {
        let a = [2.0, 0.0, 1.0];
        let b = [3.0, 5.0, -1.0];
        assert!((Distance::DotProduct.compute(&a, &b) - (-5.0)).abs() < 1e-5);
    }

    #[test]
    fn compute_cosine_of_identical_directions_is_zero() {
        let a = [0.6, 0.8];
        let b = [3.0, 4.0];
        assert!(Distance::Cosine.compute(&a, &b).abs() < 1e-5);
    }
}
