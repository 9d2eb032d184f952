//! Reconcile local `.env` files with a remote key-value store.
//!
//! envsync discovers env files in a project tree, records them in a
//! project-level configuration, and keeps their content in step with a
//! remote backend (local disk, Azure Blob Storage, Azure Key Vault or
//! Azure App Configuration). Each tracked file maps to a remote key
//! derived from its project-relative path; content comparison is a plain
//! hash check, so reformatting alone counts as a change.
//!
//! # Example
//!
//! ```rust,no_run
//! use envsync::config::verify_config;
//! use envsync::report::ConsoleReport;
//! use envsync::storage::initialize_storage;
//! use envsync::sync::{Reconciler, SyncOptions};
//!
//! let found = verify_config(".").unwrap();
//! let config = found.config.expect("run `envsync init` first");
//! let storage = initialize_storage(&config.backend, ".".as_ref()).unwrap();
//! let report = ConsoleReport::default();
//!
//! let reconciler = Reconciler::new(&config, storage.as_ref(), &report, ".");
//! reconciler.sync(&SyncOptions::default()).unwrap();
//! ```

pub mod config;
pub mod discover;
pub mod parse;
pub mod report;
pub mod storage;
pub mod sync;

use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Stable content hash used both for remote keys and for change detection.
///
/// Equality-only; nothing here relies on collision resistance.
pub fn stable_hash(input: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(input.as_bytes());
  let digest = hasher.finalize();
  let mut out = String::with_capacity(digest.len() * 2);
  for byte in digest {
    let _ = write!(out, "{:02x}", byte);
  }
  out
}

/// Normalizes a tracked-file path to the form remote keys are derived from.
pub fn leading_slash(path: &str) -> String {
  let normalized = path.replace('\\', "/");
  if normalized.starts_with('/') {
    normalized
  } else {
    format!("/{}", normalized)
  }
}

/// Remote key for a tracked file, derived from its normalized relative path.
pub fn remote_key(path: &str) -> String {
  stable_hash(&leading_slash(path))
}
