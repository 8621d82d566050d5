//! CLI command implementations

pub mod credentials;
pub mod fetch;
pub mod pull;
pub mod remotes;

pub use credentials::CredentialsArgs;
pub use fetch::FetchArgs;
pub use pull::PullArgs;
pub use remotes::RemotesArgs;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use gitsync_core::credentials::MemoryCredentialStore;
use gitsync_core::{
    BackgroundOperation, ChannelProgressSink, Config, CredentialProfile, CredentialResolver,
    CredentialStore, FileCredentialStore, GitRepo, RemoteOperationOrchestrator,
};

use crate::render::render_progress;

/// Per-operation credentials
///
/// Anything left empty falls back to the credential store.
#[derive(Args, Debug, Clone, Default)]
pub struct AuthArgs {
    /// Username for the remote
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password for the remote
    #[arg(long, env = "GITSYNC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Access token, used instead of username and password
    #[arg(
        long,
        env = "GITSYNC_TOKEN",
        hide_env_values = true,
        conflicts_with_all = ["username", "password"]
    )]
    pub token: Option<String>,
}

impl AuthArgs {
    pub fn profile(&self) -> CredentialProfile {
        match &self.token {
            Some(token) => CredentialProfile::token(token.clone()),
            None => CredentialProfile::user_password(
                self.username.clone().unwrap_or_default(),
                self.password.clone().unwrap_or_default(),
            ),
        }
    }
}

/// Open the repository at `path`, or the one containing the current directory
pub fn open_repo(path: Option<&PathBuf>) -> anyhow::Result<GitRepo> {
    let path = match path {
        Some(p) => p.clone(),
        None => std::env::current_dir()?,
    };
    Ok(GitRepo::open(&path)?)
}

/// Orchestrator over `repo` wired to the configured credential store
pub fn build_orchestrator(
    repo: GitRepo,
    config: &Config,
    progress: ChannelProgressSink,
) -> anyhow::Result<RemoteOperationOrchestrator<GitRepo>> {
    let store: Arc<dyn CredentialStore> = match config.credentials_path() {
        Some(path) => Arc::new(FileCredentialStore::load(path)?),
        None => Arc::new(MemoryCredentialStore::default()),
    };

    Ok(
        RemoteOperationOrchestrator::new(repo, CredentialResolver::new(store))
            .with_progress(Arc::new(progress))
            .with_identity(config.identity()),
    )
}

/// Wait for a background operation while drawing progress and honoring Ctrl-C
pub async fn drive<T>(
    operation: BackgroundOperation<GitRepo, T>,
    progress: tokio::sync::mpsc::UnboundedReceiver<gitsync_core::ProgressEvent>,
    verbose: bool,
) -> anyhow::Result<T> {
    let renderer = tokio::spawn(render_progress(progress, verbose));

    let cancel = operation.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            cancel.cancel();
        }
    });

    let result = operation.join().await;
    interrupt.abort();

    // Dropping the orchestrator drops the sink, which ends the renderer.
    let (orchestrator, report) = result?;
    drop(orchestrator);
    renderer.await?;

    Ok(report)
}
