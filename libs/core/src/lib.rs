//! Shared primitives for the trellis crates.
//!
//! - `distance` - vector distance kernels (euclidean, cosine, dot)
//! - `telemetry` - tracing subscriber initialization for binaries and tests

pub mod distance;
pub mod telemetry;
