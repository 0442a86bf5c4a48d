#![forbid(unsafe_code)]
//! correlate-core library.
//!
//! A generic engine for correlating values across two datasets by exact
//! and fuzzy key overlap: build a [`Dataset`] for each side, map values
//! to keys with [`Dataset::set`]/[`Dataset::set_fuzzy`], then hand both
//! to an [`Engine`] and call [`Engine::correlate`].
//!
//! # Conventions
//!
//! - **Errors**: every fallible operation returns `Result<_, CorrelateError>`.
//! - **Logging**: use `tracing` macros (`debug!`, `trace!`) rather than
//!   printing directly; callers wire up their own subscriber.
//! - **Config**: tunables live on [`CorrelateOptions`], which implements
//!   `serde::Deserialize` so callers can load it from a config file.

pub(crate) mod boiler;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod fuzzy;
pub(crate) mod index;
pub mod options;
pub mod result;
pub(crate) mod scoring;
pub mod tokenize;

pub use dataset::Dataset;
pub use engine::Engine;
pub use error::{CorrelateError, ErrorCode};
pub use fuzzy::{FuzzyKey, FuzzyKeyHandle, FuzzyKeyId};
pub use options::{CorrelateOptions, RankingApproach};
pub use result::{CorrelateResult, Match};
pub use tokenize::{str_to_keys, str_to_keys_default, DEFAULT_PUNCTUATION};

/// Emit a one-line `tracing` event confirming the crate initialized.
/// Not required before use; offered for parity with the rest of the
/// workspace's crates, which all expose this as their first log line.
pub fn init() {
    tracing::info!("correlate-core initialized");
}
