//! Reconciliation engine.
//!
//! Decides, for each tracked file, whether local or remote wins and
//! what gets written. State is derived on every run from the local
//! filesystem and the remote store; nothing is cached between
//! invocations. Storage connectivity failures abort the run, per-file
//! problems (missing local file, unparsable content, a failed write)
//! are reported and skipped.
//!
//! # Operations
//!
//! - [`Reconciler::sync`] pulls remote content into local files,
//!   optionally merging local-only keys underneath.
//! - [`Reconciler::update`] pushes normalized local content to the
//!   remote, confirming per file before overwriting.
//! - [`Reconciler::status`] reports up-to-date/out-of-date without
//!   writing, then offers to run a sync.
//! - [`Reconciler::clear`] deletes every tracked remote entry after one
//!   confirmation.
//! - [`rescan`] re-discovers env files and replaces the tracked list
//!   wholesale.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{ConfigError, EnvFileEntry, EnvsyncConfig, create_envsync_config};
use crate::discover::find_env_files;
use crate::parse::{EnvFile, normalize};
use crate::report::{PromptError, Report};
use crate::storage::{Storage, StorageError};
use crate::{leading_slash, remote_key, stable_hash};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
  /// Remote store unreachable; aborts the whole run.
  #[error("Failed to connect to remote storage: {0}")]
  Storage(#[from] StorageError),
  #[error(transparent)]
  Prompt(#[from] PromptError),
  #[error(transparent)]
  Config(#[from] ConfigError),
}

/// Options for `sync` and `status`.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
  /// Force merge semantics for this run; the config default still
  /// applies when unset.
  pub merge: bool,
}

/// Options for `update`.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
  /// Overwrite existing remote entries without asking.
  pub overwrite: bool,
}

/// Drives the per-file reconciliation loops against one config, one
/// storage backend and one project root.
pub struct Reconciler<'a> {
  config: &'a EnvsyncConfig,
  storage: &'a dyn Storage,
  report: &'a dyn Report,
  root: PathBuf,
}

impl<'a> Reconciler<'a> {
  pub fn new(
    config: &'a EnvsyncConfig,
    storage: &'a dyn Storage,
    report: &'a dyn Report,
    root: impl Into<PathBuf>,
  ) -> Self {
    Self {
      config,
      storage,
      report,
      root: root.into(),
    }
  }

  fn local_path(&self, entry: &EnvFileEntry) -> PathBuf {
    self.root.join(&entry.path)
  }

  fn display_paths(&self) -> Vec<String> {
    self
      .config
      .files
      .iter()
      .map(|entry| leading_slash(&entry.path))
      .collect()
  }

  /// Pulls remote content into local files.
  ///
  /// Content equality is a raw-text hash check, so a remote that only
  /// differs in formatting still counts as a change. The written
  /// content is the parsed-then-serialized remote document, with local
  /// entries merged underneath when merging is on.
  pub fn sync(&self, options: &SyncOptions) -> Result<(), SyncError> {
    let merge = options.merge || self.config.merge_env_files;

    self.report.start(&format!(
      "Running sync with backend ({})...",
      self.config.backend.kind()
    ));

    for entry in &self.config.files {
      let key = remote_key(&entry.path);
      let display = leading_slash(&entry.path);

      if !self.storage.has(&key)? {
        self.report.warn(&format!("Remote file not found for: {}", display));
        continue;
      }

      let local_path = self.local_path(entry);
      let local_content = match std::fs::read_to_string(&local_path) {
        Ok(content) => content,
        Err(_) => {
          debug!(file = %entry.path, "local file missing, treated as empty");
          String::new()
        }
      };

      let Some(remote_content) = self.storage.get(&key)? else {
        self.report.warn(&format!("Remote file could not be read: {}", key));
        continue;
      };

      if stable_hash(&local_content) == stable_hash(&remote_content) {
        self.report.success(&format!("Up-to-date: {}", display));
        continue;
      }

      let remote_env: EnvFile = match remote_content.as_str().try_into() {
        Ok(parsed) => parsed,
        Err(error) => {
          self.report.warn(&format!(
            "Remote content is not valid dotenv for {}: {}",
            display, error
          ));
          continue;
        }
      };

      let updated = if merge {
        let local_env: EnvFile = local_content.as_str().try_into().unwrap_or_else(|_| {
          debug!(file = %entry.path, "local content unparsable, merging nothing");
          EnvFile::default()
        });
        remote_env.merge_defaults(&local_env)
      } else {
        remote_env
      };

      self
        .report
        .info(&format!("Updating local file from remote: {}", display));

      if let Err(error) = write_local(&local_path, &updated.to_string()) {
        self.report.error(&format!("Failed to write file: {} ({})", display, error));
        continue;
      }

      self.report.success(&format!("Updated: {}", display));
    }

    Ok(())
  }

  /// Pushes local content to the remote store.
  ///
  /// Local files go through a parse-then-serialize pass first, so the
  /// remote always holds canonical formatting. Existing remote entries
  /// require confirmation unless `overwrite` is set; declining (or
  /// cancelling the prompt) skips that file.
  pub fn update(&self, options: &UpdateOptions) -> Result<(), SyncError> {
    self.report.info(&format!(
      "Running update with backend ({})...",
      self.config.backend.kind()
    ));

    for entry in &self.config.files {
      let key = remote_key(&entry.path);
      let display = leading_slash(&entry.path);

      let has_remote = self.storage.has(&key)?;

      let should_update = if has_remote && !options.overwrite {
        let answer = self
          .report
          .confirm(&format!("Remote already has {}. Overwrite?", display), false)?;
        answer.unwrap_or(false)
      } else {
        true
      };

      if !should_update {
        self.report.info(&format!("Skipped: {}", display));
        continue;
      }

      let local_content = match std::fs::read_to_string(self.local_path(entry)) {
        Ok(content) => content,
        Err(_) => {
          debug!(file = %entry.path, "local file missing, skipping");
          continue;
        }
      };

      let normalized = match normalize(&local_content) {
        Ok(normalized) => normalized,
        Err(error) => {
          self.report.warn(&format!(
            "Local file is not valid dotenv: {} ({})",
            display, error
          ));
          continue;
        }
      };

      if normalized.is_empty() {
        self.report.info(&format!(
          "Local file is empty: {}. Remote will be cleared.",
          display
        ));
      }

      if let Err(error) = self.storage.set(&key, &normalized) {
        self
          .report
          .error(&format!("Failed to write .env file: {} ({})", display, error));
        continue;
      }

      self.report.success(&format!("Updated remote: {}", display));
    }

    Ok(())
  }

  /// Read-only comparison loop; offers a sync when anything is stale.
  pub fn status(&self, options: &SyncOptions) -> Result<(), SyncError> {
    self.report.start(&format!(
      "Running status with backend ({})...",
      self.config.backend.kind()
    ));

    self.report.info("Configured files:");
    self.report.list(&self.display_paths());

    let mut update_needed = false;

    for entry in &self.config.files {
      let key = remote_key(&entry.path);
      let display = leading_slash(&entry.path);

      if !self.storage.has(&key)? {
        self.report.warn(&format!("Remote file not found for: {}", display));
        continue;
      }

      let local_content = match std::fs::read_to_string(self.local_path(entry)) {
        Ok(content) => content,
        Err(_) => {
          debug!(file = %entry.path, "local file missing");
          continue;
        }
      };

      let Some(remote_content) = self.storage.get(&key)? else {
        self.report.warn(&format!("Remote file could not be read: {}", key));
        continue;
      };

      if stable_hash(&local_content) == stable_hash(&remote_content) {
        self.report.success(&format!("Up-to-date: {}", display));
      } else {
        update_needed = true;
        self.report.info(&format!("Out-of-date: {}", display));
      }
    }

    if update_needed {
      let run_sync = self
        .report
        .confirm(
          "Some files seem to be outdated. Do you want to run a sync now?",
          false,
        )?
        .unwrap_or(false);
      if run_sync {
        self.sync(options)?;
      }
    }

    Ok(())
  }

  /// Deletes every tracked file's remote entry after one confirmation.
  /// Declining leaves the remote untouched.
  pub fn clear(&self) -> Result<(), SyncError> {
    let confirmed = self
      .report
      .confirm(
        "This will delete all .env files from the remote storage. Are you sure?",
        false,
      )?
      .unwrap_or(false);

    if !confirmed {
      self.report.info("Clear operation cancelled.");
      return Ok(());
    }

    for entry in &self.config.files {
      let key = remote_key(&entry.path);
      if self.storage.has(&key)? {
        self.storage.delete(&key)?;
        self
          .report
          .success(&format!("Deleted remote: {}", leading_slash(&entry.path)));
      }
    }

    self.report.success("All remote .env files deleted.");
    Ok(())
  }
}

/// Re-runs discovery with the config's settings and wholesale-replaces
/// the tracked file list, persisting the updated config to the project
/// root. Needs no storage connection.
pub fn rescan(
  config: &EnvsyncConfig,
  report: &dyn Report,
  root: impl AsRef<Path>,
  include_suffixes: bool,
) -> Result<(), SyncError> {
  let root = root.as_ref();

  report.start("Searching for .env files...");
  debug!(root = %root.display(), "searching for .env files");

  let found = find_env_files(root, &config.exclude, config.recursive, include_suffixes);

  if found.is_empty() {
    report.info("No .env files found in the project.");
    return Ok(());
  }

  let options: Vec<String> = found
    .iter()
    .map(|path| path.to_string_lossy().into_owned())
    .collect();

  let Some(selected) = report.multi_select("Select .env files to add to config:", &options)?
  else {
    report.info("Rescan cancelled.");
    return Ok(());
  };

  if selected.is_empty() {
    report.info("No files selected. Rescan cancelled.");
    return Ok(());
  }

  let files: Vec<EnvFileEntry> = selected
    .iter()
    .map(|&index| env_file_entry(&found[index], root))
    .collect();

  let new_config = EnvsyncConfig {
    files,
    ..config.clone()
  };
  create_envsync_config(&new_config, root)?;

  report.info("Selected files:");
  report.list(
    &new_config
      .files
      .iter()
      .map(|entry| leading_slash(&entry.path))
      .collect::<Vec<_>>(),
  );
  report.success("Rescan complete!");
  Ok(())
}

/// Builds a tracked-file entry from a discovered path, storing the
/// path relative to the project root with forward slashes.
pub fn env_file_entry(path: &Path, root: &Path) -> EnvFileEntry {
  let name = path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_default();

  // Suffix after the ".env" part, empty for the bare file.
  let extension = name
    .get(4..)
    .and_then(|rest| rest.rfind('.').map(|dot| rest[dot..].to_string()))
    .unwrap_or_default();

  let rel = path
    .strip_prefix(root)
    .unwrap_or(path)
    .to_string_lossy()
    .replace('\\', "/");

  EnvFileEntry {
    name,
    path: rel,
    extension,
  }
}

fn write_local(path: &Path, content: &str) -> std::io::Result<()> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(path, content)
}
