//! Structured logging
//!
//! The library only emits `tracing` events. Binaries decide where they go:
//! [`init`] installs an env-filtered console logger and, optionally, a
//! [`JsonlLayer`] that keeps one JSONL file per client label.
//!
//! ```text
//! logs/
//! ├── 2025-07-01_alice.jsonl
//! └── 2025-07-01_bob.jsonl
//! ```
//!
//! ```bash
//! # every warning across clients, in time order
//! cat logs/*.jsonl | jq -s 'sort_by(.ts) | .[] | select(.level == "warn")'
//! ```

pub mod file;
pub mod layer;
pub mod record;

pub use file::{read_records, ClientLogFile};
pub use layer::JsonlLayer;
pub use record::LogRecord;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `default_filter` applies unless `RUST_LOG` is set. Console output goes to
/// stderr so command output on stdout stays clean.
pub fn init(
    default_filter: &str,
    jsonl: Option<JsonlLayer>,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(jsonl)
        .try_init()
}

/// Filter directive for a `-v` count: 0 → warn, 1 → info, 2 → debug, more → trace.
pub fn verbosity_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}
