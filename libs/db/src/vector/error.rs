//! Error handling for the vector module.
//!
//! Uses `anyhow::Result` for consistency with the rest of trellis_db.

use anyhow::anyhow;

/// Convenience re-export of anyhow::Result
pub use anyhow::Result;

/// Create a dimension mismatch error
pub fn dimension_mismatch(expected: u32, got: usize) -> anyhow::Error {
    anyhow!("Dimension mismatch: expected {}, got {}", expected, got)
}

/// Create an unknown distance function error
pub fn unknown_distance_function(name: &str) -> anyhow::Error {
    anyhow!("Unknown distance function: {}", name)
}

/// Create an unknown distance comparator error
pub fn unknown_comparator(name: &str) -> anyhow::Error {
    anyhow!("Unknown distance comparator: {}", name)
}

/// Create an unknown index error
pub fn unknown_index(vertex_type: &str) -> anyhow::Error {
    anyhow!("No index found for vertex type '{}'", vertex_type)
}

/// Create an index-already-exists error
pub fn index_exists(vertex_type: &str) -> anyhow::Error {
    anyhow!("An index for vertex type '{}' already exists", vertex_type)
}

/// Bail if vector dimension doesn't match expected
#[inline]
pub fn check_dimension(expected: u32, vector: &[f32]) -> Result<()> {
    if vector.len() != expected as usize {
        return Err(dimension_mismatch(expected, vector.len()));
    }
    Ok(())
}
