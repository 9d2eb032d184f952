use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::debug;

use envsync::config::{
  AzureAppConfigOptions, AzureKeyVaultOptions, AzureStorageOptions, BackendConfig, CONFIG_FILENAME,
  EnvsyncConfig, FoundConfig, create_envsync_config, create_remote_config, load_remote_config,
  verify_config,
};
use envsync::discover::find_env_files;
use envsync::report::{ConsoleReport, Report};
use envsync::storage::{Storage, initialize_storage};
use envsync::sync::{Reconciler, SyncOptions, UpdateOptions, env_file_entry, rescan};

const LOGO: &str = r"
  ___ _ ____   _____ _   _ _ __   ___
 / _ \ '_ \ \ / / __| | | | '_ \ / __|
|  __/ | | \ V /\__ \ |_| | | | | (__
 \___|_| |_|\_/ |___/\__, |_| |_|\___|
                     |___/
";

#[derive(Parser)]
#[command(
  name = "envsync",
  about = "Share .env files across a team through a remote key-value store",
  version,
  author
)]
struct Cli {
  #[command(subcommand)]
  command: Command,

  /// Suppress ASCII logo on startup
  #[arg(short = 'l', long, global = true)]
  hide_logo: bool,

  /// Verbose output (-v for debug, -vv for trace)
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,
}

#[derive(Subcommand)]
enum Command {
  /// Initialize a new environment sync configuration
  Init(CommonArgs),
  /// Synchronize local environment files from the backend
  Sync(CommonArgs),
  /// Push the configured .env files from disk to the backend
  Update(CommonArgs),
  /// Show whether tracked files are in step with the backend
  Status(CommonArgs),
  /// Delete all tracked .env files from the backend
  Clear(CommonArgs),
  /// Rescan for .env files and update the configuration
  Rescan(CommonArgs),
  /// Print the current configuration
  Config(CommonArgs),
}

#[derive(clap::Args, Debug, Clone)]
struct CommonArgs {
  /// Directory to sync environment files in (defaults to the current directory)
  #[arg(short, long)]
  directory: Option<PathBuf>,

  /// Backend type (local, azure-storage, azure-key-vault, azure-app-config)
  #[arg(short, long)]
  backend_type: Option<String>,

  /// Path to the envsync configuration file
  #[arg(short, long)]
  config_file: Option<PathBuf>,

  /// Overwrite existing remote entries when running update
  #[arg(short, long)]
  overwrite: bool,

  /// Merge remote content with existing local environment files
  #[arg(short, long)]
  merge: bool,

  /// Use configuration stored in the remote location
  #[arg(short, long)]
  remote_config: bool,

  /// Include suffixed .env files (.env.local, .env.production, ...);
  /// those are usually better managed with git
  #[arg(short, long)]
  include_suffixes: bool,

  /// Azure Storage account name
  #[arg(long)]
  azure_storage_account_name: Option<String>,

  /// Azure Storage container name
  #[arg(long)]
  azure_storage_container_name: Option<String>,

  /// Azure Key Vault name
  #[arg(long)]
  azure_key_vault_vault_name: Option<String>,

  /// Azure Key Vault endpoint
  #[arg(long)]
  azure_key_vault_endpoint: Option<String>,

  /// Azure App Configuration name
  #[arg(long)]
  azure_app_config_name: Option<String>,

  /// Azure App Configuration endpoint
  #[arg(long)]
  azure_app_config_endpoint: Option<String>,

  /// Azure App Configuration key prefix
  #[arg(long)]
  azure_app_config_prefix: Option<String>,

  /// Azure App Configuration label
  #[arg(long)]
  azure_app_config_label: Option<String>,
}

fn setup_tracing(verbose: u8) {
  use tracing_subscriber::fmt;
  use tracing_subscriber::prelude::*;

  let log_level = match verbose {
    1 => "debug",
    2 => "trace",
    _ => "info",
  };

  tracing_subscriber::registry()
    .with(fmt::layer())
    .with(tracing_subscriber::EnvFilter::new(
      std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
    ))
    .init();
}

fn main() {
  let cli = Cli::parse();

  setup_tracing(cli.verbose);

  if !cli.hide_logo {
    println!("{}", LOGO);
  }

  if let Err(error) = ctrlc::set_handler(|| {
    eprintln!("Aborted by user.");
    std::process::exit(1);
  }) {
    debug!(%error, "could not install interrupt handler");
  }

  let report = ConsoleReport::default();
  if let Err(error) = run(cli.command, &report) {
    report.error(&error.to_string());
    std::process::exit(1);
  }
}

fn run(command: Command, report: &ConsoleReport) -> Result<(), Box<dyn Error>> {
  match command {
    Command::Init(args) => init(&args, report),
    Command::Sync(args) => {
      let session = connect(&args, report)?;
      let reconciler = Reconciler::new(
        &session.config,
        session.storage.as_ref(),
        report,
        &session.root,
      );
      reconciler.sync(&SyncOptions { merge: args.merge })?;
      Ok(())
    }
    Command::Status(args) => {
      let session = connect(&args, report)?;
      let reconciler = Reconciler::new(
        &session.config,
        session.storage.as_ref(),
        report,
        &session.root,
      );
      reconciler.status(&SyncOptions { merge: args.merge })?;
      Ok(())
    }
    Command::Update(args) => {
      let session = connect(&args, report)?;
      let reconciler = Reconciler::new(
        &session.config,
        session.storage.as_ref(),
        report,
        &session.root,
      );
      reconciler.update(&UpdateOptions {
        overwrite: args.overwrite,
      })?;
      Ok(())
    }
    Command::Clear(args) => {
      let session = connect(&args, report)?;
      let reconciler = Reconciler::new(
        &session.config,
        session.storage.as_ref(),
        report,
        &session.root,
      );
      reconciler.clear()?;
      Ok(())
    }
    Command::Rescan(args) => {
      let root = project_root(&args)?;
      let config = require_config(&args, &root)?;
      rescan(&config, report, &root, args.include_suffixes)?;
      Ok(())
    }
    Command::Config(args) => {
      let root = project_root(&args)?;
      match load_config(&args, &root)? {
        Some(config) => {
          report.info("Current configuration:");
          println!("{}", serde_json::to_string_pretty(&config)?);
        }
        None => report.info("No configuration found."),
      }
      Ok(())
    }
  }
}

struct Session {
  config: EnvsyncConfig,
  storage: Box<dyn Storage>,
  root: PathBuf,
}

fn project_root(args: &CommonArgs) -> Result<PathBuf, Box<dyn Error>> {
  Ok(match &args.directory {
    Some(dir) => dir.clone(),
    None => std::env::current_dir()?,
  })
}

/// Loads the config the way the flags ask for it: an explicit
/// `--config-file`, or `envsync.json` under the project root.
fn load_config(args: &CommonArgs, root: &Path) -> Result<Option<EnvsyncConfig>, Box<dyn Error>> {
  if let Some(path) = &args.config_file {
    if !path.exists() {
      return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    return Ok(Some(serde_json::from_str(&content)?));
  }
  let FoundConfig { config, .. } = verify_config(root)?;
  Ok(config)
}

fn require_config(args: &CommonArgs, root: &Path) -> Result<EnvsyncConfig, Box<dyn Error>> {
  load_config(args, root)?.ok_or_else(|| "No configuration found. Run `envsync init` first.".into())
}

/// Resolves config and storage for a command run, either from the
/// local config file or, with `--remote-config`, from backend flags
/// plus the config stored at the remote.
fn connect(args: &CommonArgs, report: &ConsoleReport) -> Result<Session, Box<dyn Error>> {
  let root = project_root(args)?;

  report.start("Connecting to remote storage");

  if args.remote_config {
    let backend = backend_from_args(args)?;
    let storage = initialize_storage(&backend, &root)?;
    let config = load_remote_config(storage.as_ref())?
      .ok_or("No configuration found at remote")?;
    return Ok(Session {
      config,
      storage,
      root,
    });
  }

  let config = require_config(args, &root)?;
  let storage = initialize_storage(&config.backend, &root)?;
  Ok(Session {
    config,
    storage,
    root,
  })
}

/// Builds a backend config purely from flags; every parameter the
/// selected type needs must be present.
fn backend_from_args(args: &CommonArgs) -> Result<BackendConfig, Box<dyn Error>> {
  let backend_type = args
    .backend_type
    .as_deref()
    .ok_or("Missing required argument for backend type")?;

  match backend_type {
    "local" => Ok(BackendConfig::default()),
    "azure-storage" => {
      let (Some(account_name), Some(container_name)) = (
        args.azure_storage_account_name.clone(),
        args.azure_storage_container_name.clone(),
      ) else {
        return Err("Missing required arguments for Azure Storage backend".into());
      };
      Ok(BackendConfig::AzureStorage {
        config: AzureStorageOptions {
          account_name,
          container_name,
        },
      })
    }
    "azure-key-vault" => {
      let (Some(vault_name), Some(endpoint)) = (
        args.azure_key_vault_vault_name.clone(),
        args.azure_key_vault_endpoint.clone(),
      ) else {
        return Err("Missing required arguments for Azure Key Vault backend".into());
      };
      Ok(BackendConfig::AzureKeyVault {
        config: AzureKeyVaultOptions {
          vault_name,
          endpoint,
        },
      })
    }
    "azure-app-config" => {
      let (Some(app_config_name), Some(endpoint)) = (
        args.azure_app_config_name.clone(),
        args.azure_app_config_endpoint.clone(),
      ) else {
        return Err("Missing required arguments for Azure App Configuration backend".into());
      };
      Ok(BackendConfig::AzureAppConfig {
        config: AzureAppConfigOptions {
          app_config_name,
          endpoint,
          prefix: args.azure_app_config_prefix.clone(),
          label: args.azure_app_config_label.clone(),
        },
      })
    }
    other => Err(format!("Unsupported backend type: {}", other).into()),
  }
}

fn flag_or_prompt(
  flag: &Option<String>,
  report: &ConsoleReport,
  message: &str,
) -> Result<String, Box<dyn Error>> {
  match flag {
    Some(value) => Ok(value.clone()),
    None => Ok(report.input(message, "")?),
  }
}

/// Interactive setup: discover files, pick a backend, assemble and
/// persist the configuration. Any cancelled prompt aborts with no side
/// effects.
fn init(args: &CommonArgs, report: &ConsoleReport) -> Result<(), Box<dyn Error>> {
  let root = project_root(args)?;

  // With --remote-config the backend must come from flags so the
  // existing remote config can be checked before prompting.
  let remote_storage: Option<Box<dyn Storage>> = if args.remote_config {
    report.start("Connecting to remote storage");
    let backend = backend_from_args(args)?;
    Some(initialize_storage(&backend, &root)?)
  } else {
    None
  };

  let existing = match &remote_storage {
    Some(storage) => {
      let config = load_remote_config(storage.as_ref())?;
      if config.is_none() {
        report.warn("No configuration found at remote");
      }
      config
    }
    None => verify_config(&root)?.config,
  };

  if existing.is_some() {
    let overwrite = report
      .confirm(
        "A configuration file already exists. Do you want to overwrite it?",
        false,
      )?
      .unwrap_or(false);
    if !overwrite {
      report.info("Initialization cancelled.");
      return Ok(());
    }
  }

  report.info("Searching for .env files...");
  debug!(root = %root.display(), "searching for .env files");

  let defaults = EnvsyncConfig::default();
  let found = find_env_files(&root, &defaults.exclude, true, args.include_suffixes);

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
    report.info("Initialization cancelled.");
    return Ok(());
  };
  if selected.is_empty() {
    report.info("No files selected. Initialization cancelled.");
    return Ok(());
  }

  report.success("File search complete.");

  let backend_type = match &args.backend_type {
    Some(backend_type) => backend_type.clone(),
    None => {
      let choices = vec![
        "local".to_string(),
        "azure-storage".to_string(),
        "azure-key-vault".to_string(),
        "azure-app-config".to_string(),
      ];
      let Some(index) = report.select("Select backend type:", &choices)? else {
        report.info("Initialization cancelled.");
        return Ok(());
      };
      choices[index].clone()
    }
  };

  let backend = match backend_type.as_str() {
    "azure-storage" => {
      let account_name = flag_or_prompt(
        &args.azure_storage_account_name,
        report,
        "Azure Storage Account Name:",
      )?;
      let container_name = flag_or_prompt(
        &args.azure_storage_container_name,
        report,
        "Azure Storage Container Name:",
      )?;
      BackendConfig::AzureStorage {
        config: AzureStorageOptions {
          account_name,
          container_name,
        },
      }
    }
    "azure-key-vault" => {
      let vault_name = flag_or_prompt(
        &args.azure_key_vault_vault_name,
        report,
        "Azure Key Vault Name:",
      )?;
      let endpoint = flag_or_prompt(
        &args.azure_key_vault_endpoint,
        report,
        "Azure Key Vault Endpoint:",
      )?;
      BackendConfig::AzureKeyVault {
        config: AzureKeyVaultOptions {
          vault_name,
          endpoint,
        },
      }
    }
    "azure-app-config" => {
      let app_config_name = flag_or_prompt(
        &args.azure_app_config_name,
        report,
        "Azure App Configuration Name:",
      )?;
      let endpoint = flag_or_prompt(
        &args.azure_app_config_endpoint,
        report,
        "Azure App Configuration Endpoint:",
      )?;
      let prefix = flag_or_prompt(
        &args.azure_app_config_prefix,
        report,
        "Azure App Configuration Key Prefix (optional):",
      )?;
      let label = flag_or_prompt(
        &args.azure_app_config_label,
        report,
        "Azure App Configuration Label (optional):",
      )?;
      BackendConfig::AzureAppConfig {
        config: AzureAppConfigOptions {
          app_config_name,
          endpoint,
          prefix: Some(prefix).filter(|value| !value.is_empty()),
          label: Some(label).filter(|value| !value.is_empty()),
        },
      }
    }
    _ => BackendConfig::default(),
  };

  let files = selected
    .iter()
    .map(|&index| env_file_entry(&found[index], &root))
    .collect();

  let Some(merge_env_files) = report.confirm("Merge environment files?", true)? else {
    report.info("Initialization cancelled.");
    return Ok(());
  };
  let Some(recursive) = report.confirm("Enable recursive search for .env files?", true)? else {
    report.info("Initialization cancelled.");
    return Ok(());
  };

  let gitignore = root.join(".gitignore");
  let exclude = if gitignore.exists() {
    // Discovery reads the .gitignore directly on every walk.
    debug!(path = %gitignore.display(), "found .gitignore file");
    Vec::new()
  } else {
    let patterns = report.input(
      "Enter patterns to exclude (comma separated, e.g., node_modules,.git):",
      "node_modules,.git,dist",
    )?;
    patterns
      .split(',')
      .map(|pattern| pattern.trim().to_string())
      .filter(|pattern| !pattern.is_empty())
      .collect()
  };

  let config = EnvsyncConfig {
    merge_env_files,
    recursive,
    include_suffixes: args.include_suffixes,
    exclude,
    backend,
    files,
  };

  match &remote_storage {
    Some(storage) => {
      create_remote_config(&config, storage.as_ref())?;
      report.success(&format!("Updated remote: {}", CONFIG_FILENAME));
    }
    None => {
      create_envsync_config(&config, &root)?;
    }
  }

  report.info("Configured .env files:");
  report.list(
    &config
      .files
      .iter()
      .map(|entry| envsync::leading_slash(&entry.path))
      .collect::<Vec<_>>(),
  );
  report.success("Initialization complete!");
  Ok(())
}
