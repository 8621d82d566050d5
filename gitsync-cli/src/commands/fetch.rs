//! Fetch command

use std::path::PathBuf;

use clap::Args;
use gitsync_core::{spawn_fetch, ChannelProgressSink, Config, FetchOutcome, FetchRequest};

use super::{build_orchestrator, drive, open_repo, AuthArgs};

/// Fetch from a remote without merging
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Remote to fetch (defaults to the current branch's upstream, then origin)
    pub remote: Option<String>,

    /// Repository path (defaults to the current directory)
    #[arg(short = 'C', long)]
    pub path: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub auth: AuthArgs,
}

impl FetchArgs {
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let repo = open_repo(self.path.as_ref())?;

        let remote = match &self.remote {
            Some(r) => r.clone(),
            None => {
                let tracked = repo
                    .current_branch()?
                    .and_then(|b| repo.upstream_for(&b).ok().flatten())
                    .map(|(remote, _)| remote);
                match tracked {
                    Some(r) => r,
                    None => repo.default_remote()?.name,
                }
            }
        };

        if verbose {
            println!("Fetching from {}", remote);
        }

        let (sink, rx) = ChannelProgressSink::new();
        let orchestrator = build_orchestrator(repo, config, sink)?;
        let operation = spawn_fetch(
            orchestrator,
            FetchRequest {
                remote: remote.clone(),
                profile: self.auth.profile(),
                settings: config.fetch_settings(),
            },
        );
        let report = drive(operation, rx, verbose).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("{}", report.notification.message);
        }

        match report.outcome {
            FetchOutcome::Failed(failure) => {
                anyhow::bail!("fetch from '{}' failed ({})", remote, failure.cause)
            }
            FetchOutcome::Completed | FetchOutcome::Aborted { .. } => Ok(()),
        }
    }
}
