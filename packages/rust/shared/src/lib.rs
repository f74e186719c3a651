//! Shared error model and configuration for the Errbit notifier.
//!
//! This crate is the foundation depended on by all other notifier crates.
//! It provides:
//! - [`ErrbitError`] — the unified error type
//! - Configuration ([`NotifierConfig`], [`ResolvedConfig`], config loading)

pub mod config;
pub mod error;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    BacktraceFilter, BacktraceFilterConfig, NotifierConfig, ResolvedConfig, WriterKind,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{ErrbitError, Result};

/// Notifier name reported in every notice.
pub const PROJECT_NAME: &str = "errbit-rust";

/// Notifier version reported in every notice.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Notifier homepage reported in every notice.
pub const PROJECT_URL: &str = "https://github.com/errbit/errbit-rust";

/// Notice schema version.
pub const API_VERSION: &str = "2.2";

/// Endpoint path on the collection server.
pub const NOTICES_PATH: &str = "/notifier_api/v2/notices/";
