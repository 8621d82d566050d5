//! Credentials command - manage the credential store

use std::path::PathBuf;

use clap::{Args, Subcommand};
use gitsync_core::{Config, FileCredentialStore};

/// Manage stored credentials
#[derive(Args, Debug)]
pub struct CredentialsArgs {
    #[command(subcommand)]
    pub command: CredentialsCommand,
}

#[derive(Subcommand, Debug)]
pub enum CredentialsCommand {
    /// List stored entries (secrets are never shown)
    List,

    /// Store credentials for a remote URL
    Set {
        /// Remote URL exactly as configured in the repository
        url: String,

        /// Username to store
        #[arg(short, long, required_unless_present = "token")]
        username: Option<String>,

        /// Password to store
        #[arg(long, env = "GITSYNC_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Access token to store instead of username and password
        #[arg(
            long,
            env = "GITSYNC_TOKEN",
            hide_env_values = true,
            conflicts_with_all = ["username", "password"]
        )]
        token: Option<String>,
    },

    /// Remove the entry for a remote URL
    Remove {
        /// Remote URL of the entry
        url: String,
    },
}

impl CredentialsArgs {
    /// Execute the credentials command
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let path = store_path(config)?;
        let mut store = FileCredentialStore::load(&path)?;

        match &self.command {
            CredentialsCommand::List => list(&store),
            CredentialsCommand::Set {
                url,
                username,
                password,
                token,
            } => {
                validate_url(url)?;
                match token {
                    Some(token) => store.upsert_token(url, token),
                    None => store.upsert_user_password(
                        url,
                        username.as_deref().unwrap_or_default(),
                        password.as_deref().unwrap_or_default(),
                    ),
                }
                store.save()?;
                println!("Stored credentials for {}", url);
            }
            CredentialsCommand::Remove { url } => {
                if !store.remove(url) {
                    anyhow::bail!("No stored credentials for {}", url);
                }
                store.save()?;
                println!("Removed credentials for {}", url);
            }
        }

        Ok(())
    }
}

fn store_path(config: &Config) -> anyhow::Result<PathBuf> {
    config.credentials_path().ok_or_else(|| {
        anyhow::anyhow!("No config directory found; pass --credentials-path to locate the store")
    })
}

fn list(store: &FileCredentialStore) {
    let mut any = false;
    for record in store.records() {
        any = true;
        let kind = if record.is_token { "token" } else { "password" };
        let updated = record
            .updated_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        if record.is_token {
            println!("{}  [{}]  updated {}", record.url, kind, updated);
        } else {
            println!(
                "{}  [{}]  user: {}  updated {}",
                record.url, kind, record.username, updated
            );
        }
    }
    if !any {
        println!("No stored credentials in {}", store.path().display());
    }
}

/// Credentials are keyed by the exact remote URL the transport reports
fn validate_url(raw: &str) -> anyhow::Result<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| anyhow::anyhow!("Invalid remote URL '{}': {}", raw, e))?;
    if parsed.password().is_some() {
        anyhow::bail!("Remote URL must not embed a password; pass it with --password instead");
    }
    Ok(())
}
