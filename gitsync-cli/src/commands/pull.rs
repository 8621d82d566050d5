//! Pull command

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use gitsync_core::{
    spawn_pull, ChannelProgressSink, Config, FastForwardStrategy, FileConflictStrategy, GitRepo,
    MergeOutcome, MergeSettings, PullRequest,
};

use super::{build_orchestrator, drive, open_repo, AuthArgs};

/// Side that wins a conflicting hunk
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum Favor {
    Normal,
    Ours,
    Theirs,
}

impl From<Favor> for FileConflictStrategy {
    fn from(favor: Favor) -> Self {
        match favor {
            Favor::Normal => FileConflictStrategy::Normal,
            Favor::Ours => FileConflictStrategy::Ours,
            Favor::Theirs => FileConflictStrategy::Theirs,
        }
    }
}

/// Fetch a remote branch and merge it into the current branch
#[derive(Args, Debug)]
pub struct PullArgs {
    /// Remote to pull from (defaults to the current branch's upstream)
    pub remote: Option<String>,

    /// Branch on the remote (defaults to the upstream branch, then the current branch name)
    pub branch: Option<String>,

    /// Repository path (defaults to the current directory)
    #[arg(short = 'C', long)]
    pub path: Option<PathBuf>,

    /// Refuse to merge unless the pull is a fast-forward
    #[arg(long, conflicts_with = "no_ff")]
    pub ff_only: bool,

    /// Create a merge even when a fast-forward is possible
    #[arg(long)]
    pub no_ff: bool,

    /// Which side wins a conflicting hunk
    #[arg(long, value_enum)]
    pub favor: Option<Favor>,

    /// Commit a clean merge instead of leaving it staged
    #[arg(long, conflicts_with = "no_commit")]
    pub commit: bool,

    /// Leave a clean merge staged for the user to commit
    #[arg(long)]
    pub no_commit: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub auth: AuthArgs,
}

impl PullArgs {
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let repo = open_repo(self.path.as_ref())?;
        let (remote, branch) = self.resolve_target(&repo)?;
        let merge = self.merge_settings(config);

        if verbose {
            println!("Pulling {}/{}", remote, branch);
        }

        let (sink, rx) = ChannelProgressSink::new();
        let orchestrator = build_orchestrator(repo, config, sink)?;
        let operation = spawn_pull(
            orchestrator,
            PullRequest {
                remote: remote.clone(),
                branch: branch.clone(),
                profile: self.auth.profile(),
                fetch: config.fetch_settings(),
                merge,
            },
        );
        let report = drive(operation, rx, verbose).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("{}", report.notification.message);
            if let Some(message) = report.pending_commit_message.as_deref() {
                if !message.is_empty() {
                    println!();
                    println!("Pending commit message:");
                    for line in message.lines() {
                        println!("  {}", line);
                    }
                }
            }
            if report.outcome == MergeOutcome::Conflicted {
                println!();
                println!("Resolve the conflicts, then commit the result.");
            }
        }

        match report.outcome {
            MergeOutcome::Failed(failure) => {
                anyhow::bail!("pull from '{}/{}' failed ({})", remote, branch, failure.cause)
            }
            _ => Ok(()),
        }
    }

    /// Remote and branch to pull, filling gaps from the current branch's upstream
    fn resolve_target(&self, repo: &GitRepo) -> anyhow::Result<(String, String)> {
        if let (Some(remote), Some(branch)) = (&self.remote, &self.branch) {
            return Ok((remote.clone(), branch.clone()));
        }

        let current = repo.current_branch()?;
        let upstream = match &current {
            Some(b) => repo.upstream_for(b)?,
            None => None,
        };

        let remote = match (&self.remote, &upstream) {
            (Some(r), _) => r.clone(),
            (None, Some((r, _))) => r.clone(),
            (None, None) => repo.default_remote()?.name,
        };

        let branch = match (&self.branch, upstream, current) {
            (Some(b), _, _) => b.clone(),
            (None, Some((r, b)), _) if r == remote => b,
            (None, _, Some(current)) => current,
            (None, _, None) => anyhow::bail!(
                "HEAD is detached; name the branch to pull, e.g. 'gitsync pull {} main'",
                remote
            ),
        };

        Ok((remote, branch))
    }

    fn merge_settings(&self, config: &Config) -> MergeSettings {
        let mut settings = config.merge_settings();
        if self.ff_only {
            settings.fast_forward = FastForwardStrategy::FastForwardOnly;
        } else if self.no_ff {
            settings.fast_forward = FastForwardStrategy::NoFastForward;
        }
        if let Some(favor) = self.favor {
            settings.file_favor = favor.into();
        }
        if self.commit {
            settings.commit_on_success = true;
        } else if self.no_commit {
            settings.commit_on_success = false;
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        pull: PullArgs,
    }

    #[test]
    fn test_flags_override_config() {
        let args =
            Harness::parse_from(["gitsync", "--ff-only", "--favor", "theirs", "--commit"]).pull;
        let settings = args.merge_settings(&Config::default());
        assert_eq!(settings.fast_forward, FastForwardStrategy::FastForwardOnly);
        assert_eq!(settings.file_favor, FileConflictStrategy::Theirs);
        assert!(settings.commit_on_success);
    }

    #[test]
    fn test_config_used_without_flags() {
        let mut config = Config::default();
        config.merge.commit_on_success = true;
        config.merge.fast_forward = FastForwardStrategy::NoFastForward;

        let args = Harness::parse_from(["gitsync", "--no-commit"]).pull;
        let settings = args.merge_settings(&config);
        assert_eq!(settings.fast_forward, FastForwardStrategy::NoFastForward);
        assert!(!settings.commit_on_success);
    }

    #[test]
    fn test_ff_only_conflicts_with_no_ff() {
        assert!(Harness::try_parse_from(["gitsync", "--ff-only", "--no-ff"]).is_err());
    }
}
