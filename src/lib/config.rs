//! Project configuration (`envsync.json`).
//!
//! The config document records which env files are tracked, how
//! discovery behaves and which storage backend to talk to. It lives
//! either as pretty-printed JSON in the project root or, with
//! `--remote-config`, under the fixed key [`CONFIG_FILENAME`] in the
//! remote store. Absence of a config is not an error here; callers
//! decide whether it is fatal (`init` expects it, everything else
//! bails out).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::{Storage, StorageError};

pub const CONFIG_FILENAME: &str = "envsync.json";

fn default_exclude() -> Vec<String> {
  vec![".git".to_string(), "node_modules".to_string(), "dist".to_string()]
}

/// The persisted configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvsyncConfig {
  pub merge_env_files: bool,
  pub recursive: bool,
  pub include_suffixes: bool,
  pub exclude: Vec<String>,
  pub backend: BackendConfig,
  pub files: Vec<EnvFileEntry>,
}

impl Default for EnvsyncConfig {
  fn default() -> Self {
    Self {
      merge_env_files: true,
      recursive: true,
      include_suffixes: false,
      exclude: default_exclude(),
      backend: BackendConfig::default(),
      files: Vec::new(),
    }
  }
}

/// A tracked env file, path relative to the project root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvFileEntry {
  pub name: String,
  pub path: String,
  pub extension: String,
}

/// Backend selection; the `type` tag decides which connection
/// parameters are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BackendConfig {
  Local {
    #[serde(default)]
    config: LocalOptions,
  },
  AzureStorage {
    config: AzureStorageOptions,
  },
  AzureKeyVault {
    config: AzureKeyVaultOptions,
  },
  AzureAppConfig {
    config: AzureAppConfigOptions,
  },
}

impl Default for BackendConfig {
  fn default() -> Self {
    BackendConfig::Local {
      config: LocalOptions::default(),
    }
  }
}

impl BackendConfig {
  /// The `type` tag as it appears in the config file.
  pub fn kind(&self) -> &'static str {
    match self {
      BackendConfig::Local { .. } => "local",
      BackendConfig::AzureStorage { .. } => "azure-storage",
      BackendConfig::AzureKeyVault { .. } => "azure-key-vault",
      BackendConfig::AzureAppConfig { .. } => "azure-app-config",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalOptions {
  /// Store directory, `.envsync` under the project root by default.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureStorageOptions {
  pub account_name: String,
  pub container_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureKeyVaultOptions {
  pub vault_name: String,
  pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureAppConfigOptions {
  pub app_config_name: String,
  pub endpoint: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub prefix: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
}

/// Partial config used by [`update_envsync_config`]; unset fields keep
/// whatever the existing document has.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvsyncConfigPatch {
  pub merge_env_files: Option<bool>,
  pub recursive: Option<bool>,
  pub include_suffixes: Option<bool>,
  pub exclude: Option<Vec<String>>,
  pub backend: Option<BackendConfig>,
  pub files: Option<Vec<EnvFileEntry>>,
}

/// Result of looking for a config on disk.
#[derive(Debug)]
pub struct FoundConfig {
  /// Parsed config, `None` when no file exists.
  pub config: Option<EnvsyncConfig>,
  /// Where the config lives (or would live).
  pub path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("Failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("Invalid configuration in {path}: {source}")]
  Parse {
    path: PathBuf,
    source: serde_json::Error,
  },
  #[error("Invalid configuration JSON: {0}")]
  Json(#[from] serde_json::Error),
  #[error("Failed to store configuration at remote: {0}")]
  Remote(#[from] StorageError),
}

/// Returns the best available config under `dir`. A missing file is
/// reported as `config: None`; a file that exists but does not parse is
/// an error.
pub fn verify_config(dir: impl AsRef<Path>) -> Result<FoundConfig, ConfigError> {
  let path = dir.as_ref().join(CONFIG_FILENAME);

  if !path.exists() {
    debug!(?path, "no configuration file");
    return Ok(FoundConfig { config: None, path });
  }

  let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
    path: path.clone(),
    source,
  })?;
  let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
    path: path.clone(),
    source,
  })?;

  Ok(FoundConfig {
    config: Some(config),
    path,
  })
}

/// Loads the config stored under [`CONFIG_FILENAME`] in the remote
/// store, if any.
pub fn load_remote_config(storage: &dyn Storage) -> Result<Option<EnvsyncConfig>, ConfigError> {
  match storage.get(CONFIG_FILENAME)? {
    Some(content) => {
      let config = serde_json::from_str(&content)?;
      Ok(Some(config))
    }
    None => Ok(None),
  }
}

/// Persists a config as pretty JSON under `dir`.
pub fn create_envsync_config(
  config: &EnvsyncConfig,
  dir: impl AsRef<Path>,
) -> Result<PathBuf, ConfigError> {
  let path = dir.as_ref().join(CONFIG_FILENAME);
  let serialized = serde_json::to_string_pretty(config)?;
  std::fs::write(&path, serialized).map_err(|source| ConfigError::Write {
    path: path.clone(),
    source,
  })?;
  debug!(?path, "wrote configuration");
  Ok(path)
}

/// Persists a config under [`CONFIG_FILENAME`] in the remote store.
pub fn create_remote_config(
  config: &EnvsyncConfig,
  storage: &dyn Storage,
) -> Result<(), ConfigError> {
  let serialized = serde_json::to_string_pretty(config)?;
  storage.set(CONFIG_FILENAME, &serialized)?;
  Ok(())
}

/// Merges `patch` over whatever parses from `path` (a missing or
/// malformed file counts as the default config) and writes the merged
/// document back.
pub fn update_envsync_config(
  patch: EnvsyncConfigPatch,
  path: impl AsRef<Path>,
) -> Result<EnvsyncConfig, ConfigError> {
  let path = path.as_ref();

  let existing: EnvsyncConfig = std::fs::read_to_string(path)
    .ok()
    .and_then(|content| serde_json::from_str(&content).ok())
    .unwrap_or_default();

  let merged = EnvsyncConfig {
    merge_env_files: patch.merge_env_files.unwrap_or(existing.merge_env_files),
    recursive: patch.recursive.unwrap_or(existing.recursive),
    include_suffixes: patch.include_suffixes.unwrap_or(existing.include_suffixes),
    exclude: patch.exclude.unwrap_or(existing.exclude),
    backend: patch.backend.unwrap_or(existing.backend),
    files: patch.files.unwrap_or(existing.files),
  };

  let serialized = serde_json::to_string_pretty(&merged)?;
  std::fs::write(path, serialized).map_err(|source| ConfigError::Write {
    path: path.to_path_buf(),
    source,
  })?;

  Ok(merged)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_defaults() {
    let config = EnvsyncConfig::default();
    assert!(config.merge_env_files);
    assert!(config.recursive);
    assert!(!config.include_suffixes);
    assert_eq!(config.exclude, vec![".git", "node_modules", "dist"]);
    assert_eq!(config.backend.kind(), "local");
    assert!(config.files.is_empty());
  }

  #[test]
  fn test_backend_tagged_roundtrip() {
    let backend = BackendConfig::AzureStorage {
      config: AzureStorageOptions {
        account_name: "acct".into(),
        container_name: "envs".into(),
      },
    };
    let json = serde_json::to_string(&backend).unwrap();
    assert!(json.contains("\"type\":\"azure-storage\""));
    assert!(json.contains("\"accountName\":\"acct\""));

    let back: BackendConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, backend);
  }

  #[test]
  fn test_local_backend_without_config_block() {
    let backend: BackendConfig = serde_json::from_str(r#"{"type":"local"}"#).unwrap();
    assert_eq!(backend, BackendConfig::default());
  }

  #[test]
  fn test_partial_document_fills_defaults() {
    let config: EnvsyncConfig = serde_json::from_str(r#"{"recursive":false}"#).unwrap();
    assert!(!config.recursive);
    assert!(config.merge_env_files);
    assert_eq!(config.exclude, vec![".git", "node_modules", "dist"]);
  }

  #[test]
  fn test_verify_config_missing_file() {
    let dir = TempDir::new().unwrap();
    let found = verify_config(dir.path()).unwrap();
    assert!(found.config.is_none());
    assert_eq!(found.path, dir.path().join(CONFIG_FILENAME));
  }

  #[test]
  fn test_verify_config_rejects_malformed_json() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILENAME), "{not json").unwrap();
    assert!(verify_config(dir.path()).is_err());
  }

  #[test]
  fn test_create_then_verify_roundtrip() {
    let dir = TempDir::new().unwrap();
    let mut config = EnvsyncConfig::default();
    config.files.push(EnvFileEntry {
      name: ".env".into(),
      path: "apps/web/.env".into(),
      extension: ".env".into(),
    });

    create_envsync_config(&config, dir.path()).unwrap();
    let found = verify_config(dir.path()).unwrap();
    assert_eq!(found.config.unwrap(), config);
  }

  #[test]
  fn test_update_merges_patch_over_existing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILENAME);

    let mut config = EnvsyncConfig::default();
    config.recursive = false;
    create_envsync_config(&config, dir.path()).unwrap();

    let patch = EnvsyncConfigPatch {
      merge_env_files: Some(false),
      ..Default::default()
    };
    let merged = update_envsync_config(patch, &path).unwrap();

    assert!(!merged.merge_env_files);
    assert!(!merged.recursive);

    let found = verify_config(dir.path()).unwrap();
    assert_eq!(found.config.unwrap(), merged);
  }

  #[test]
  fn test_update_treats_malformed_existing_as_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILENAME);
    std::fs::write(&path, "{{{").unwrap();

    let patch = EnvsyncConfigPatch {
      recursive: Some(false),
      ..Default::default()
    };
    let merged = update_envsync_config(patch, &path).unwrap();
    assert!(!merged.recursive);
    assert!(merged.merge_env_files);
  }
}
