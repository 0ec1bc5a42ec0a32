//! Logging setup.
//!
//! One init-once subscriber with the `YYYY-MM-DD HH:MM:SS` timestamp
//! format, optionally teeing into a log file instead of stderr.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Install the global subscriber. Must run before any other tracing
/// call; later invocations fail.
pub fn init(level: tracing::Level, log_file: Option<&Path>) -> Result<()> {
    let writer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_ansi(false)
        .with_max_level(level)
        .with_writer(writer)
        .init();
    Ok(())
}
