use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokenlock_core::paths::config_path;
use tokenlock_core::{KeyManager, KeySettings};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tokenlock")]
#[command(author, version, about = "Unlock login sessions with a USB key device", long_about = None)]
struct Cli {
    /// Configuration file (JSON); defaults to $TOKENLOCK_CONFIG or /etc/tokenlock/config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a new key to a device and bind it to a user (destroys the device's leading bytes)
    Make {
        /// Whole-disk block device, e.g. /dev/sdb
        device: PathBuf,
        /// User the key belongs to
        identity: String,
    },

    /// List users that have a key
    List,

    /// Remove a user's key
    Delete {
        identity: String,
    },

    /// Unlock the active session with the key on a device, then rotate the key
    Unlock {
        device: PathBuf,
    },

    /// Show which user a key device belongs to, without rotating it
    Check {
        device: PathBuf,
    },

    /// Show recent audit events
    Events {
        /// Maximum number of events to retrieve
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config_path(cli.config);
    debug!(config = ?config, "resolved configuration file");
    let settings = KeySettings::load(config.as_deref()).context("load configuration")?;
    let manager = KeyManager::system(settings).context("open key manager")?;

    match cli.command {
        Commands::Make { device, identity } => {
            let fingerprint = manager
                .make(&device, &identity)
                .with_context(|| format!("make key for {identity} on {}", device.display()))?;
            println!("Key for {identity} written to {} ({fingerprint})", device.display());
        }

        Commands::List => {
            for identity in manager.list().context("list keys")? {
                println!("{identity}");
            }
        }

        Commands::Delete { identity } => {
            manager
                .delete(&identity)
                .with_context(|| format!("delete key for {identity}"))?;
            println!("Key for {identity} deleted");
        }

        Commands::Unlock { device } => {
            let outcome = manager
                .unlock(&device)
                .with_context(|| format!("unlock with {}", device.display()))?;
            println!(
                "Session {} unlocked for {}",
                outcome.session_id, outcome.identity
            );
        }

        Commands::Check { device } => {
            match manager
                .check(&device)
                .with_context(|| format!("check {}", device.display()))?
            {
                Some(identity) => println!("{identity}"),
                None => anyhow::bail!("no stored key matches {}", device.display()),
            }
        }

        Commands::Events { limit } => {
            let events = manager.events(Some(limit)).context("read audit log")?;
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
    }

    Ok(())
}
