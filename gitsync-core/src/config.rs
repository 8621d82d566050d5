//! Configuration management for gitsync
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (GITSYNC_*)
//! 3. Config file (~/.config/gitsync/config.toml)
//! 4. Default values

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::git::{
    FastForwardStrategy, FetchSettings, FileConflictStrategy, Identity, MergeSettings,
};
use crate::{Error, Result};

/// Fetch-related configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Remove remote-tracking references that no longer exist on the remote
    pub prune: bool,
}

/// Merge-related configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Create the merge commit automatically when there are no conflicts
    ///
    /// Off by default: a non-fast-forward merge is left staged with its
    /// prepared message so the user commits it.
    pub commit_on_success: bool,

    /// How fast-forwardable merges are handled
    pub fast_forward: FastForwardStrategy,

    /// Which side wins when a file conflicts
    pub file_favor: FileConflictStrategy,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            commit_on_success: false,
            fast_forward: FastForwardStrategy::Default,
            file_favor: FileConflictStrategy::Normal,
        }
    }
}

/// Identity used for merge commits
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SignatureConfig {
    /// Author/committer name (falls back to the repository's user.name)
    pub name: Option<String>,

    /// Author/committer email (falls back to the repository's user.email)
    pub email: Option<String>,
}

/// Credential store configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Override for the credential store location
    pub store_path: Option<PathBuf>,

    /// Preference for editors that schedule background fetches
    ///
    /// Informational only; the library and CLI never fetch on their own.
    pub auto_fetch: bool,
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Fetch configuration
    pub fetch: FetchConfig,

    /// Merge configuration
    pub merge: MergeConfig,

    /// Merge commit identity
    pub signature: SignatureConfig,

    /// Credential store configuration
    pub credentials: CredentialsConfig,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config {}: {}", path.display(), e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/gitsync/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gitsync").join("config.toml"))
    }

    /// Location of the credential store, honoring the configured override
    pub fn credentials_path(&self) -> Option<PathBuf> {
        self.credentials
            .store_path
            .clone()
            .or_else(|| dirs::config_dir().map(|p| p.join("gitsync").join("credentials.toml")))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - GITSYNC_CREDENTIALS_PATH: credential store location
    /// - GITSYNC_PRUNE: "1"/"true" enables pruning on fetch
    /// - GITSYNC_SIGNATURE_NAME / GITSYNC_SIGNATURE_EMAIL: merge commit identity
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("GITSYNC_CREDENTIALS_PATH") {
            self.credentials.store_path = Some(PathBuf::from(path));
        }

        if let Ok(prune) = std::env::var("GITSYNC_PRUNE") {
            self.fetch.prune = parse_flag(&prune);
        }

        if let Ok(name) = std::env::var("GITSYNC_SIGNATURE_NAME") {
            self.signature.name = Some(name);
        }

        if let Ok(email) = std::env::var("GITSYNC_SIGNATURE_EMAIL") {
            self.signature.email = Some(email);
        }

        self
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(
        mut self,
        credentials_path: Option<PathBuf>,
        prune: Option<bool>,
    ) -> Self {
        if let Some(path) = credentials_path {
            self.credentials.store_path = Some(path);
        }

        if let Some(p) = prune {
            self.fetch.prune = p;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(
        credentials_path: Option<PathBuf>,
        prune: Option<bool>,
    ) -> Result<Self> {
        Ok(Self::load()?
            .with_env_overrides()
            .with_cli_overrides(credentials_path, prune))
    }

    /// Fetch settings derived from this configuration
    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            prune: self.fetch.prune,
        }
    }

    /// Commit identity, when both name and email are configured
    pub fn identity(&self) -> Option<Identity> {
        match (&self.signature.name, &self.signature.email) {
            (Some(name), Some(email)) => Some(Identity {
                name: name.clone(),
                email: email.clone(),
            }),
            _ => None,
        }
    }

    /// Merge settings derived from this configuration
    pub fn merge_settings(&self) -> MergeSettings {
        MergeSettings {
            fast_forward: self.merge.fast_forward,
            file_favor: self.merge.file_favor,
            commit_on_success: self.merge.commit_on_success,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
