//! Remote key-value storage.
//!
//! Every backend exposes the same four operations over string keys and
//! dotenv-text values. [`initialize_storage`] picks the implementation
//! from the configured backend variant and does nothing else; the
//! implementations themselves are thin wrappers over the local
//! filesystem or the Azure REST APIs. Credentials come from the
//! environment, never from the config file.

use std::path::{Path, PathBuf};

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{
  AzureAppConfigOptions, AzureKeyVaultOptions, AzureStorageOptions, BackendConfig,
};

const DEFAULT_LOCAL_STORE_DIR: &str = ".envsync";

const AZURE_STORAGE_TOKEN_VAR: &str = "AZURE_STORAGE_TOKEN";
const AZURE_ACCESS_TOKEN_VAR: &str = "AZURE_ACCESS_TOKEN";

const BLOB_API_VERSION: &str = "2021-08-06";
const KEY_VAULT_API_VERSION: &str = "7.4";
const APP_CONFIG_API_VERSION: &str = "1.0";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
  #[error("Storage I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Storage request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("Remote returned {status} for {url}")]
  Status { status: StatusCode, url: String },
  #[error("Missing credentials: set {0}")]
  MissingCredentials(&'static str),
  #[error("Invalid endpoint URL: {0}")]
  Endpoint(String),
}

/// Uniform interface over a remote key-value backend.
pub trait Storage {
  fn has(&self, key: &str) -> Result<bool, StorageError>;
  fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
  fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
  fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Selects a backend implementation from the config. Pure dispatch;
/// `root` only anchors the local backend's relative store directory.
pub fn initialize_storage(
  backend: &BackendConfig,
  root: &Path,
) -> Result<Box<dyn Storage>, StorageError> {
  match backend {
    BackendConfig::Local { config } => {
      let dir = config
        .dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_STORE_DIR));
      let dir = if dir.is_absolute() { dir } else { root.join(dir) };
      Ok(Box::new(LocalStorage::new(dir)))
    }
    BackendConfig::AzureStorage { config } => Ok(Box::new(AzureBlobStorage::new(config)?)),
    BackendConfig::AzureKeyVault { config } => Ok(Box::new(AzureKeyVault::new(config)?)),
    BackendConfig::AzureAppConfig { config } => Ok(Box::new(AzureAppConfig::new(config)?)),
  }
}

fn bearer_token(var: &'static str) -> Result<String, StorageError> {
  std::env::var(var)
    .ok()
    .filter(|token| !token.is_empty())
    .ok_or(StorageError::MissingCredentials(var))
}

/// One file per key under a store directory. Used both as the `local`
/// backend and as the engine's test double.
pub struct LocalStorage {
  dir: PathBuf,
}

impl LocalStorage {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  fn entry_path(&self, key: &str) -> PathBuf {
    self.dir.join(key)
  }
}

impl Storage for LocalStorage {
  fn has(&self, key: &str) -> Result<bool, StorageError> {
    Ok(self.entry_path(key).exists())
  }

  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    match std::fs::read_to_string(self.entry_path(key)) {
      Ok(content) => Ok(Some(content)),
      Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(error) => Err(error.into()),
    }
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    std::fs::create_dir_all(&self.dir)?;
    std::fs::write(self.entry_path(key), value)?;
    Ok(())
  }

  fn delete(&self, key: &str) -> Result<(), StorageError> {
    match std::fs::remove_file(self.entry_path(key)) {
      Ok(()) => Ok(()),
      Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(error) => Err(error.into()),
    }
  }
}

/// Azure Blob Storage over the blob REST API.
pub struct AzureBlobStorage {
  client: Client,
  base_url: String,
  token: String,
}

impl AzureBlobStorage {
  pub fn new(options: &AzureStorageOptions) -> Result<Self, StorageError> {
    Ok(Self {
      client: Client::new(),
      base_url: format!(
        "https://{}.blob.core.windows.net/{}",
        options.account_name, options.container_name
      ),
      token: bearer_token(AZURE_STORAGE_TOKEN_VAR)?,
    })
  }

  fn blob_url(&self, key: &str) -> String {
    format!("{}/{}", self.base_url, key)
  }

  fn check(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, StorageError> {
    let status = response.status();
    if status.is_success() {
      Ok(response)
    } else {
      Err(StorageError::Status {
        status,
        url: response.url().to_string(),
      })
    }
  }
}

impl Storage for AzureBlobStorage {
  fn has(&self, key: &str) -> Result<bool, StorageError> {
    let response = self
      .client
      .head(self.blob_url(key))
      .bearer_auth(&self.token)
      .header("x-ms-version", BLOB_API_VERSION)
      .send()?;
    match response.status() {
      StatusCode::NOT_FOUND => Ok(false),
      status if status.is_success() => Ok(true),
      status => Err(StorageError::Status {
        status,
        url: response.url().to_string(),
      }),
    }
  }

  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    let response = self
      .client
      .get(self.blob_url(key))
      .bearer_auth(&self.token)
      .header("x-ms-version", BLOB_API_VERSION)
      .send()?;
    if response.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    let response = Self::check(response)?;
    Ok(Some(response.text()?))
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    debug!(key, "putting blob");
    let response = self
      .client
      .put(self.blob_url(key))
      .bearer_auth(&self.token)
      .header("x-ms-version", BLOB_API_VERSION)
      .header("x-ms-blob-type", "BlockBlob")
      .body(value.to_string())
      .send()?;
    Self::check(response).map(|_| ())
  }

  fn delete(&self, key: &str) -> Result<(), StorageError> {
    let response = self
      .client
      .delete(self.blob_url(key))
      .bearer_auth(&self.token)
      .header("x-ms-version", BLOB_API_VERSION)
      .send()?;
    if response.status() == StatusCode::NOT_FOUND {
      return Ok(());
    }
    Self::check(response).map(|_| ())
  }
}

#[derive(Debug, Serialize, Deserialize)]
struct SecretBody {
  value: String,
}

/// Vault secret names only allow alphanumerics and dashes.
fn vault_secret_name(key: &str) -> String {
  key
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
    .collect()
}

/// Azure Key Vault secrets, one secret per tracked file.
pub struct AzureKeyVault {
  client: Client,
  endpoint: String,
  token: String,
}

impl AzureKeyVault {
  pub fn new(options: &AzureKeyVaultOptions) -> Result<Self, StorageError> {
    let endpoint = if options.endpoint.is_empty() {
      format!("https://{}.vault.azure.net", options.vault_name)
    } else {
      options.endpoint.trim_end_matches('/').to_string()
    };
    Ok(Self {
      client: Client::new(),
      endpoint,
      token: bearer_token(AZURE_ACCESS_TOKEN_VAR)?,
    })
  }

  fn secret_url(&self, key: &str) -> String {
    format!(
      "{}/secrets/{}?api-version={}",
      self.endpoint,
      vault_secret_name(key),
      KEY_VAULT_API_VERSION
    )
  }
}

impl Storage for AzureKeyVault {
  fn has(&self, key: &str) -> Result<bool, StorageError> {
    Ok(self.get(key)?.is_some())
  }

  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    let response = self
      .client
      .get(self.secret_url(key))
      .bearer_auth(&self.token)
      .send()?;
    match response.status() {
      StatusCode::NOT_FOUND => Ok(None),
      status if status.is_success() => {
        let body: SecretBody = response.json()?;
        Ok(Some(body.value))
      }
      status => Err(StorageError::Status {
        status,
        url: response.url().to_string(),
      }),
    }
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    debug!(key, "putting vault secret");
    let response = self
      .client
      .put(self.secret_url(key))
      .bearer_auth(&self.token)
      .json(&SecretBody {
        value: value.to_string(),
      })
      .send()?;
    let status = response.status();
    if status.is_success() {
      Ok(())
    } else {
      Err(StorageError::Status {
        status,
        url: response.url().to_string(),
      })
    }
  }

  fn delete(&self, key: &str) -> Result<(), StorageError> {
    let response = self
      .client
      .delete(self.secret_url(key))
      .bearer_auth(&self.token)
      .send()?;
    let status = response.status();
    if status.is_success() || status == StatusCode::NOT_FOUND {
      Ok(())
    } else {
      Err(StorageError::Status {
        status,
        url: response.url().to_string(),
      })
    }
  }
}

/// Azure App Configuration key-values, with optional key prefix and
/// label.
pub struct AzureAppConfig {
  client: Client,
  base: reqwest::Url,
  prefix: String,
  label: String,
  token: String,
}

/// Builds the key-value URL with the prefix and key as an escaped path
/// segment and the label as an escaped query pair, so characters like
/// `?`, `#` or spaces in the config cannot mangle the request.
fn app_config_kv_url(base: &reqwest::Url, prefix: &str, key: &str, label: &str) -> reqwest::Url {
  let mut url = base.clone();
  if let Ok(mut segments) = url.path_segments_mut() {
    segments.push("kv").push(&format!("{}{}", prefix, key));
  }
  url
    .query_pairs_mut()
    .append_pair("label", label)
    .append_pair("api-version", APP_CONFIG_API_VERSION);
  url
}

impl AzureAppConfig {
  pub fn new(options: &AzureAppConfigOptions) -> Result<Self, StorageError> {
    let endpoint = if options.endpoint.is_empty() {
      format!("https://{}.azconfig.io", options.app_config_name)
    } else {
      options.endpoint.trim_end_matches('/').to_string()
    };
    let base = reqwest::Url::parse(&endpoint)
      .map_err(|error| StorageError::Endpoint(format!("{endpoint}: {error}")))?;
    if base.cannot_be_a_base() {
      return Err(StorageError::Endpoint(endpoint));
    }
    Ok(Self {
      client: Client::new(),
      base,
      prefix: options.prefix.clone().unwrap_or_default(),
      label: options.label.clone().unwrap_or_default(),
      token: bearer_token(AZURE_ACCESS_TOKEN_VAR)?,
    })
  }

  fn kv_url(&self, key: &str) -> reqwest::Url {
    app_config_kv_url(&self.base, &self.prefix, key, &self.label)
  }
}

impl Storage for AzureAppConfig {
  fn has(&self, key: &str) -> Result<bool, StorageError> {
    Ok(self.get(key)?.is_some())
  }

  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    let response = self
      .client
      .get(self.kv_url(key))
      .bearer_auth(&self.token)
      .send()?;
    match response.status() {
      StatusCode::NOT_FOUND => Ok(None),
      status if status.is_success() => {
        let body: SecretBody = response.json()?;
        Ok(Some(body.value))
      }
      status => Err(StorageError::Status {
        status,
        url: response.url().to_string(),
      }),
    }
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    debug!(key, "putting app-config key-value");
    let response = self
      .client
      .put(self.kv_url(key))
      .bearer_auth(&self.token)
      .header(
        "Content-Type",
        "application/vnd.microsoft.appconfig.kv+json",
      )
      .json(&SecretBody {
        value: value.to_string(),
      })
      .send()?;
    let status = response.status();
    if status.is_success() {
      Ok(())
    } else {
      Err(StorageError::Status {
        status,
        url: response.url().to_string(),
      })
    }
  }

  fn delete(&self, key: &str) -> Result<(), StorageError> {
    let response = self
      .client
      .delete(self.kv_url(key))
      .bearer_auth(&self.token)
      .send()?;
    let status = response.status();
    if status.is_success() || status == StatusCode::NOT_FOUND {
      Ok(())
    } else {
      Err(StorageError::Status {
        status,
        url: response.url().to_string(),
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_local_storage_roundtrip() {
    let dir = TempDir::new().unwrap();
    let storage = LocalStorage::new(dir.path().join("store"));

    assert!(!storage.has("abc").unwrap());
    assert_eq!(storage.get("abc").unwrap(), None);

    storage.set("abc", "A=1\n").unwrap();
    assert!(storage.has("abc").unwrap());
    assert_eq!(storage.get("abc").unwrap().as_deref(), Some("A=1\n"));

    storage.set("abc", "A=2\n").unwrap();
    assert_eq!(storage.get("abc").unwrap().as_deref(), Some("A=2\n"));

    storage.delete("abc").unwrap();
    assert!(!storage.has("abc").unwrap());
  }

  #[test]
  fn test_local_storage_delete_missing_is_ok() {
    let dir = TempDir::new().unwrap();
    let storage = LocalStorage::new(dir.path());
    storage.delete("never-written").unwrap();
  }

  #[test]
  fn test_initialize_storage_local_dispatch() {
    let dir = TempDir::new().unwrap();
    let storage = initialize_storage(&BackendConfig::default(), dir.path()).unwrap();

    storage.set("abc", "A=1\n").unwrap();
    assert!(dir.path().join(".envsync").join("abc").exists());
  }

  #[test]
  fn test_app_config_url_escapes_prefix_and_label() {
    let base = reqwest::Url::parse("https://example.azconfig.io").unwrap();
    let url = app_config_kv_url(&base, "team env#1/", "abc", "dev env");
    assert_eq!(
      url.as_str(),
      "https://example.azconfig.io/kv/team%20env%231%2Fabc?label=dev+env&api-version=1.0"
    );
  }

  #[test]
  fn test_vault_secret_name_sanitizes() {
    assert_eq!(vault_secret_name("envsync.json"), "envsync-json");
    assert_eq!(vault_secret_name("0a1b2c"), "0a1b2c");
  }
}
