//! Remotes command - list remotes and branches

use std::path::PathBuf;

use clap::Args;
use gitsync_core::{BranchInfo, RemoteInfo, RemoteRepository};
use serde_json::json;

use super::open_repo;

/// List remotes, and optionally branches
#[derive(Args, Debug)]
pub struct RemotesArgs {
    /// Repository path (defaults to the current directory)
    #[arg(short = 'C', long)]
    pub path: Option<PathBuf>,

    /// Also list local and remote-tracking branches
    #[arg(short, long)]
    pub branches: bool,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

impl RemotesArgs {
    pub fn execute(&self, verbose: bool) -> anyhow::Result<()> {
        let repo = open_repo(self.path.as_ref())?;
        let remotes = repo.remotes()?;
        let branches = if self.branches {
            repo.branches()?
        } else {
            Vec::new()
        };

        if verbose {
            println!("Repository: {}", repo.root().display());
        }

        if self.json {
            let value = json!({
                "remotes": remotes,
                "branches": branches,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        print_remotes(&remotes);
        if self.branches {
            println!();
            print_branches(&branches, repo.current_branch()?.as_deref());
        }
        Ok(())
    }
}

fn print_remotes(remotes: &[RemoteInfo]) {
    if remotes.is_empty() {
        println!("No remotes configured.");
        return;
    }
    println!("Remotes:");
    for remote in remotes {
        println!("  {:<12} {}", remote.name, remote.url);
    }
}

fn print_branches(branches: &[BranchInfo], current: Option<&str>) {
    if branches.is_empty() {
        println!("No branches.");
        return;
    }
    println!("Branches:");
    for branch in branches {
        let marker = if Some(branch.friendly_name.as_str()) == current && !branch.is_remote {
            "*"
        } else {
            " "
        };
        match (&branch.remote, branch.is_remote) {
            (Some(remote), false) => {
                println!("  {} {} (tracks {})", marker, branch.friendly_name, remote)
            }
            _ => println!("  {} {}", marker, branch.friendly_name),
        }
    }
}
