/// Crate version, surfaced on startup and in `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
