//! Telemetry module providing tracing subscriber initialization.
//!
//! Two initialization functions are provided:
//! - `init_dev_subscriber()` - Simple stderr logging at DEBUG level
//! - `init_env_subscriber()` - Same, but filtered by the `RUST_LOG`
//!   environment variable
//!
//! Call one of these at application startup (not in the library).
//!
//! ```no_run
//! use trellis_core::telemetry;
//!
//! fn main() {
//!     telemetry::init_dev_subscriber();
//!     tracing::info!("Application started");
//! }
//! ```

use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Initialize a compact stderr subscriber for development.
///
/// Shows DEBUG and above with file and line locations.
///
/// # Panics
/// Panics if a global subscriber has already been set.
pub fn init_dev_subscriber() {
    let subscriber = fmt::Subscriber::builder()
        .compact()
        .with_max_level(Level::DEBUG)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("a global tracing subscriber is already installed");
}

/// Initialize a stderr subscriber filtered by `RUST_LOG`.
///
/// Defaults to INFO level when `RUST_LOG` is not set. Unlike
/// `init_dev_subscriber`, this does not panic when a subscriber is
/// already installed, which makes it safe to call from multiple tests.
pub fn init_env_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
