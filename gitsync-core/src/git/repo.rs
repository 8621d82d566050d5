//! Git repository detection and inspection

use std::path::{Path, PathBuf};

use git2::{BranchType, Repository};

use super::{BranchInfo, RemoteInfo};
use crate::{Error, Result};

/// A git repository wrapper providing gitsync-specific operations
pub struct GitRepo {
    /// The underlying git2 repository
    pub(super) repo: Repository,
    /// Path to the repository root
    root: PathBuf,
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepo")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl GitRepo {
    /// Open a git repository at the given path
    ///
    /// This will search upward from the given path to find the repository root.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let repo = Repository::discover(path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                Error::Config(format!(
                    "Not a git repository: {}. Run 'git init' first or navigate to a git repository.",
                    path.display()
                ))
            } else {
                Error::Git(e)
            }
        })?;

        Self::from_repository(repo)
    }

    /// Wrap an already opened repository
    pub fn from_repository(repo: Repository) -> Result<Self> {
        // Pulls check out into the working tree, so one must exist.
        let root = repo
            .workdir()
            .ok_or_else(|| Error::Config("Bare repositories are not supported".to_string()))?
            .to_path_buf();

        Ok(Self { repo, root })
    }

    /// Get the repository root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the default remote (usually "origin")
    pub fn default_remote(&self) -> Result<RemoteInfo> {
        let remotes = self.list_remotes()?;

        if let Some(origin) = remotes.iter().find(|r| r.name == "origin") {
            return Ok(origin.clone());
        }

        remotes.into_iter().next().ok_or_else(|| {
            Error::Config(
                "No remotes configured. Add a remote with 'git remote add origin <url>'"
                    .to_string(),
            )
        })
    }

    /// List all remotes that have a URL
    pub fn list_remotes(&self) -> Result<Vec<RemoteInfo>> {
        let remotes = self.repo.remotes()?;

        let mut result = Vec::new();
        for remote_name in remotes.iter().flatten() {
            if let Ok(remote) = self.repo.find_remote(remote_name) {
                if let Some(url) = remote.url() {
                    result.push(RemoteInfo {
                        name: remote_name.to_string(),
                        url: url.to_string(),
                    });
                }
            }
        }

        Ok(result)
    }

    /// Look up a single remote by name
    pub fn find_remote(&self, name: &str) -> Result<RemoteInfo> {
        self.list_remotes()?
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::NotFound(format!("remote '{}'", name)))
    }

    /// List local branches followed by remote-tracking branches
    pub fn list_branches(&self) -> Result<Vec<BranchInfo>> {
        let mut result = Vec::new();

        for kind in [BranchType::Local, BranchType::Remote] {
            for branch in self.repo.branches(Some(kind))? {
                let (branch, _) = branch?;
                let Some(name) = branch.name().ok().flatten().map(str::to_string) else {
                    continue;
                };

                let remote = match kind {
                    BranchType::Local => self
                        .upstream_for(&name)
                        .ok()
                        .flatten()
                        .map(|(remote, _)| remote),
                    BranchType::Remote => branch
                        .get()
                        .name()
                        .and_then(|refname| self.repo.branch_remote_name(refname).ok())
                        .and_then(|buf| buf.as_str().map(str::to_string)),
                };

                // origin/HEAD is a symbolic alias, not a branch
                if kind == BranchType::Remote && name.ends_with("/HEAD") {
                    continue;
                }

                result.push(BranchInfo {
                    friendly_name: name,
                    remote,
                    is_remote: kind == BranchType::Remote,
                });
            }
        }

        Ok(result)
    }

    /// Get the current branch name
    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(h) => h,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                // An unborn HEAD still names the branch it will create.
                let head = self.repo.find_reference("HEAD")?;
                return Ok(head
                    .symbolic_target()
                    .and_then(|t| t.strip_prefix("refs/heads/"))
                    .map(str::to_string));
            }
            Err(e) => return Err(Error::Git(e)),
        };

        if head.is_branch() {
            Ok(head.shorthand().map(|s| s.to_string()))
        } else {
            // Detached HEAD
            Ok(None)
        }
    }

    /// Remote and branch a local branch tracks, if configured
    ///
    /// Returns e.g. `("origin", "main")` for a branch tracking `origin/main`.
    pub fn upstream_for(&self, local_branch: &str) -> Result<Option<(String, String)>> {
        let refname = format!("refs/heads/{}", local_branch);

        let remote = match self.repo.branch_upstream_remote(&refname) {
            Ok(buf) => buf.as_str().map(str::to_string),
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(Error::Git(e)),
        };
        let key = format!("branch.{}.merge", local_branch);
        let merge = match self.repo.config()?.get_string(&key) {
            Ok(value) => Some(value),
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(Error::Git(e)),
        };

        Ok(match (remote, merge) {
            (Some(remote), Some(merge)) => {
                let branch = merge.strip_prefix("refs/heads/").unwrap_or(&merge).to_string();
                Some((remote, branch))
            }
            _ => None,
        })
    }

    /// Get access to the underlying git2 repository
    pub fn inner(&self) -> &Repository {
        &self.repo
    }
}
