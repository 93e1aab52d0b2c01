//! credvault CLI - encrypted credential storage with ephemeral mounts.
//!
//! Credentials are stored as records encrypted under an SSH RSA key pair and
//! can be shown, edited, rotated, verified, exported as environment
//! variables or mounted as files for a limited time.

mod terminal;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

use credvault_credentials::{IamClient, Prompter, Upstream};
use credvault_mount::{ExposureSession, FuseMounter};
use credvault_vault::{Outcome, Settings, VaultManager, VaultOperations};
use terminal::{shell_quote, ExternalEditor, TerminalPrompter};

/// Passphrase attempts before giving up.
const PASSPHRASE_ATTEMPTS: usize = 3;

#[derive(Parser)]
#[command(name = "credvault")]
#[command(about = "credvault - Encrypted credential vault")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ~/.config/credvault/config.yml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the supported credential types and their capabilities.
    Types,

    /// List stored credentials.
    List {
        /// Regular expressions matched against credential names.
        filters: Vec<String>,
    },

    /// Add a new credential.
    Add {
        /// Credential type.
        #[arg(short, long, default_value = "aws")]
        r#type: String,
    },

    /// Import credentials from an external file.
    Import {
        /// File to import, e.g. ~/.aws/credentials.
        file: PathBuf,

        /// Credential type.
        #[arg(short, long, default_value = "aws")]
        r#type: String,
    },

    /// Show decrypted credentials.
    Show {
        #[arg(required = true)]
        filters: Vec<String>,
    },

    /// Edit credentials in $EDITOR.
    Edit {
        #[arg(required = true)]
        filters: Vec<String>,
    },

    /// Mount credentials as files for a limited time.
    Mount {
        #[arg(required = true)]
        filters: Vec<String>,

        /// Seconds to keep the mount (default from settings).
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Rotate credentials upstream.
    Rotate {
        #[arg(required = true)]
        filters: Vec<String>,
    },

    /// Verify credentials upstream.
    Verify {
        #[arg(required = true)]
        filters: Vec<String>,
    },

    /// Print credentials as shell exports.
    Env {
        #[arg(required = true)]
        filters: Vec<String>,
    },

    /// Delete credentials.
    Delete {
        #[arg(required = true)]
        filters: Vec<String>,
    },

    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => Settings::default_path().context("Could not determine the home directory")?,
    };
    let settings = Settings::load(&config_path)
        .with_context(|| format!("Failed to load settings from {}", config_path.display()))?;

    // Setup logging
    let level = if cli.verbose || settings.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    debug!(config = %config_path.display(), "Settings loaded");
    let manager = VaultManager::new();

    match cli.command {
        Commands::Types => cmd_types(&manager),
        Commands::List { filters } => cmd_list(&manager, &settings, &filters).await,
        Commands::Add { r#type } => cmd_add(&manager, &settings, &r#type).await,
        Commands::Import { file, r#type } => cmd_import(&manager, &settings, &file, &r#type).await,
        Commands::Show { filters } => cmd_show(&manager, &settings, &filters).await,
        Commands::Edit { filters } => cmd_edit(&manager, &settings, &filters).await,
        Commands::Mount { filters, timeout } => {
            cmd_mount(&manager, &settings, &filters, timeout).await
        }
        Commands::Rotate { filters } => cmd_rotate(&manager, &settings, &filters).await,
        Commands::Verify { filters } => cmd_verify(&manager, &settings, &filters).await,
        Commands::Env { filters } => cmd_env(&manager, &settings, &filters).await,
        Commands::Delete { filters } => cmd_delete(&manager, &settings, &filters).await,
        Commands::Config => cmd_config(&settings),
    }
}

/// Open the vault with its key pair.
fn open_vault(manager: &VaultManager, settings: &Settings) -> Result<VaultOperations> {
    manager.open(settings).with_context(|| {
        format!(
            "Failed to open vault at {} (create it with `mkdir -m 700 {}`)",
            settings.store_path.display(),
            settings.store_path.display()
        )
    })
}

/// Ask for the private key passphrase until it unlocks the key.
fn unlock(vault: &VaultOperations, settings: &Settings) -> Result<Zeroizing<Vec<u8>>> {
    if !vault.envelope()?.container().is_protected() {
        return Ok(Zeroizing::new(Vec::new()));
    }

    let key_path = settings.private_key.display().to_string();
    let mut prompter = TerminalPrompter;
    let mut attempt = 1;
    loop {
        let passphrase = prompter.passphrase(&key_path)?;
        match vault.check_passphrase(&passphrase) {
            Ok(()) => return Ok(passphrase),
            Err(e) if e.is_retryable() && attempt < PASSPHRASE_ATTEMPTS => {
                eprintln!("Wrong passphrase, try again.");
                attempt += 1;
            }
            Err(e) => return Err(e).context("Failed to unlock the private key"),
        }
    }
}

/// Cancelled on Ctrl+C or SIGTERM.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => debug!("Received SIGINT"),
                        _ = sigterm.recv() => debug!("Received SIGTERM"),
                    }
                }
                Err(_) => {
                    let _ = ctrl_c.await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        token_clone.cancel();
    });

    token
}

fn cmd_types(manager: &VaultManager) -> Result<()> {
    for type_name in manager.registry().list_types() {
        let description = manager.registry().describe(&type_name)?;
        println!("Credential type \x1b[1m'{}'\x1b[0m\n", type_name);
        println!("{}\n", description);
    }
    Ok(())
}

async fn cmd_list(manager: &VaultManager, settings: &Settings, filters: &[String]) -> Result<()> {
    let vault = manager
        .open_without_keys(settings)
        .context("Failed to open vault")?;

    let keys = vault.list(filters).await.context("Failed to list credentials")?;
    if keys.is_empty() {
        println!("No matches found");
    }
    for key in keys {
        println!("{}", key);
    }
    Ok(())
}

async fn cmd_add(manager: &VaultManager, settings: &Settings, type_name: &str) -> Result<()> {
    let vault = open_vault(manager, settings)?;

    let key = vault
        .add(type_name, &mut TerminalPrompter)
        .await
        .context("Failed to add credential")?;

    info!("Added {}", key);
    Ok(())
}

async fn cmd_import(
    manager: &VaultManager,
    settings: &Settings,
    file: &Path,
    type_name: &str,
) -> Result<()> {
    let vault = open_vault(manager, settings)?;
    let data = Zeroizing::new(
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?,
    );

    for outcome in vault
        .import(type_name, &data)
        .await
        .context("Failed to import credentials")?
    {
        match outcome.outcome {
            Outcome::Done(()) => println!("Imported {}", outcome.key),
            Outcome::Skipped(reason) => println!("{}. Skipping...", reason),
        }
    }
    Ok(())
}

async fn cmd_show(manager: &VaultManager, settings: &Settings, filters: &[String]) -> Result<()> {
    let vault = open_vault(manager, settings)?;
    if vault.list(filters).await?.is_empty() {
        println!("No matches found");
        return Ok(());
    }

    let passphrase = unlock(&vault, settings)?;
    for (_, credential) in vault
        .show(filters, &passphrase)
        .await
        .context("Failed to show credentials")?
    {
        println!("{}", credential.render_text().as_str());
    }
    Ok(())
}

async fn cmd_edit(manager: &VaultManager, settings: &Settings, filters: &[String]) -> Result<()> {
    let vault = open_vault(manager, settings)?;
    let keys = vault.list(filters).await?;
    if keys.is_empty() {
        println!("No matches found");
        return Ok(());
    }

    let passphrase = unlock(&vault, settings)?;
    let mut editor = ExternalEditor::from_env();
    for key in keys {
        let outcome = vault
            .edit_record(&key, &passphrase, &mut editor)
            .await
            .with_context(|| format!("Failed to edit {}", key))?;
        match outcome {
            Outcome::Done(()) => println!("{}: done!", key),
            Outcome::Skipped(reason) => println!("{}. Skipping...", reason),
        }
    }
    Ok(())
}

async fn cmd_mount(
    manager: &VaultManager,
    settings: &Settings,
    filters: &[String],
    timeout: Option<u64>,
) -> Result<()> {
    let vault = open_vault(manager, settings)?;
    if vault.list(filters).await?.is_empty() {
        println!("No matches found");
        return Ok(());
    }

    let passphrase = unlock(&vault, settings)?;
    let collection = vault
        .collect_mount_files(filters, &passphrase)
        .await
        .context("Failed to decrypt credentials")?;
    drop(passphrase);

    for outcome in &collection.outcomes {
        if let Outcome::Skipped(reason) = &outcome.outcome {
            println!("{}. Skipping...", reason);
        }
    }
    if collection.files.is_empty() {
        println!("Nothing to mount");
        return Ok(());
    }

    let timeout = timeout.unwrap_or(settings.mount_timeout);
    println!("Mounting credentials at {}", settings.mountpoint.display());
    println!(
        "Mounted for {} seconds or until Ctrl+C is pressed...",
        timeout
    );

    let cancel = install_signal_handler();
    let mut session = ExposureSession::new(
        &settings.mountpoint,
        Duration::from_secs(timeout),
        std::io::stdout(),
    );
    session
        .run(
            &FuseMounter::new().with_debug(settings.debug),
            collection.files,
            cancel,
        )
        .await
        .context("Mount failed")?;
    Ok(())
}

async fn cmd_rotate(manager: &VaultManager, settings: &Settings, filters: &[String]) -> Result<()> {
    let vault = open_vault(manager, settings)?;
    let keys = vault.list(filters).await?;
    if keys.is_empty() {
        println!("No matches found");
        return Ok(());
    }

    println!("The following credentials are going to be rotated:");
    for key in &keys {
        println!("\t{}", key);
    }

    let passphrase = unlock(&vault, settings)?;
    let upstream = Upstream::new(Arc::new(IamClient::new()?));
    for key in keys {
        print!("Rotating {}... ", key);
        std::io::stdout().flush()?;
        let outcome = vault
            .rotate_record(&key, &passphrase, &upstream)
            .await
            .with_context(|| format!("Failed to rotate {}", key))?;
        match outcome {
            Outcome::Done(()) => println!("done!"),
            Outcome::Skipped(reason) => println!("\n{}. Skipping...", reason),
        }
    }
    Ok(())
}

async fn cmd_verify(manager: &VaultManager, settings: &Settings, filters: &[String]) -> Result<()> {
    let vault = open_vault(manager, settings)?;
    if vault.list(filters).await?.is_empty() {
        println!("No matches found");
        return Ok(());
    }

    let passphrase = unlock(&vault, settings)?;
    let upstream = Upstream::new(Arc::new(IamClient::new()?));
    for outcome in vault
        .verify(filters, &passphrase, &upstream)
        .await
        .context("Failed to verify credentials")?
    {
        match outcome.outcome {
            Outcome::Done(verification) => {
                let mark = if verification.ok { "✔" } else { "✘" };
                println!("{}\t{}, message: {}", mark, outcome.key, verification.message);
            }
            Outcome::Skipped(reason) => println!("{}. Skipping...", reason),
        }
    }
    Ok(())
}

async fn cmd_env(manager: &VaultManager, settings: &Settings, filters: &[String]) -> Result<()> {
    let vault = open_vault(manager, settings)?;
    if vault.list(filters).await?.is_empty() {
        eprintln!("No matches found");
        return Ok(());
    }

    let passphrase = unlock(&vault, settings)?;
    for outcome in vault
        .env(filters, &passphrase)
        .await
        .context("Failed to export credentials")?
    {
        match outcome.outcome {
            Outcome::Done(vars) => {
                for (name, value) in vars {
                    println!("export {}={}", name, shell_quote(&value));
                }
            }
            Outcome::Skipped(reason) => eprintln!("{}. Skipping...", reason),
        }
    }
    Ok(())
}

async fn cmd_delete(manager: &VaultManager, settings: &Settings, filters: &[String]) -> Result<()> {
    let vault = manager
        .open_without_keys(settings)
        .context("Failed to open vault")?;

    let deleted = vault
        .delete(filters)
        .await
        .context("Failed to delete credentials")?;
    if deleted.is_empty() {
        println!("No matches found");
    }
    for key in deleted {
        println!("Deleted {}", key);
    }
    Ok(())
}

fn cmd_config(settings: &Settings) -> Result<()> {
    println!("---\n{}", settings.to_yaml()?);
    Ok(())
}
