//! Git repository access
//!
//! [`RemoteRepository`] is the seam between the orchestrator and the Git
//! library. [`GitRepo`] implements it on top of libgit2; tests substitute
//! scripted doubles.

mod network;
mod repo;

use serde::{Deserialize, Serialize};

use crate::credentials::{Credential, CredentialRequest};
use crate::progress::TransferProgress;
use crate::Result;

pub use repo::GitRepo;

/// Information about a git remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteInfo {
    /// Name of the remote (e.g., "origin")
    pub name: String,
    /// URL of the remote
    pub url: String,
}

/// Information about a local or remote-tracking branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchInfo {
    /// Short name (e.g., "main" or "origin/main")
    pub friendly_name: String,
    /// Remote the branch belongs to or tracks, if any
    pub remote: Option<String>,
    /// Whether this is a remote-tracking branch
    pub is_remote: bool,
}

/// How fast-forwardable merges are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FastForwardStrategy {
    /// Fast-forward when possible, merge otherwise
    #[default]
    Default,
    /// Refuse anything that is not a fast-forward
    FastForwardOnly,
    /// Always create a merge, even when a fast-forward is possible
    NoFastForward,
}

/// Which side wins when both sides changed the same hunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileConflictStrategy {
    /// Leave conflict markers for the user
    #[default]
    Normal,
    Ours,
    Theirs,
}

/// Options for a fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSettings {
    /// Remove remote-tracking references that vanished upstream
    pub prune: bool,
}

/// Options for the merge half of a pull
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSettings {
    pub fast_forward: FastForwardStrategy,
    pub file_favor: FileConflictStrategy,
    /// Commit a clean non-fast-forward merge instead of leaving it staged
    pub commit_on_success: bool,
}

/// Name and email for commits the merge creates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

/// Merge status as reported by the Git library
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawMergeStatus {
    UpToDate,
    FastForward,
    NonFastForward,
    Conflicts,
    /// Anything the library reported that is not one of the above
    Unrecognized(String),
}

/// Result of the merge step of a pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMergeResult {
    pub status: RawMergeStatus,
    /// Commit the branch now points at, when the merge produced or moved to one
    pub commit_id: Option<String>,
}

impl RawMergeResult {
    pub fn new(status: RawMergeStatus) -> Self {
        Self {
            status,
            commit_id: None,
        }
    }

    pub fn with_commit(mut self, commit_id: impl Into<String>) -> Self {
        self.commit_id = Some(commit_id.into());
        self
    }
}

/// Callbacks the repository invokes while a network operation runs
///
/// All calls arrive on the thread driving the operation.
pub trait NetworkHandler {
    /// Answer an authentication challenge; `None` gives up
    fn credentials(&self, request: &CredentialRequest) -> Option<Credential>;

    /// Transfer counters changed; return `false` to stop the transfer
    fn transfer_progress(&self, progress: &TransferProgress) -> bool;

    /// Sideband text from the server; return `false` to stop the transfer
    fn sideband_progress(&self, _message: &str) -> bool {
        true
    }

    /// Working tree checkout advanced
    fn checkout_progress(&self, _path: Option<&str>, _completed: usize, _total: usize) {}
}

/// Repository operations the orchestrator drives
pub trait RemoteRepository: Send {
    /// Configured remotes, in configuration order
    fn remotes(&self) -> Result<Vec<RemoteInfo>>;

    /// Local and remote-tracking branches
    fn branches(&self) -> Result<Vec<BranchInfo>>;

    /// Download objects and update remote-tracking references
    fn fetch(
        &mut self,
        remote: &str,
        settings: &FetchSettings,
        handler: &dyn NetworkHandler,
    ) -> Result<()>;

    /// Merge `remote`/`branch` (already fetched) into the current branch
    fn merge_upstream(
        &mut self,
        remote: &str,
        branch: &str,
        settings: &MergeSettings,
        identity: Option<&Identity>,
        handler: &dyn NetworkHandler,
    ) -> Result<RawMergeResult>;

    /// Message of the operation in progress (e.g. the prepared merge message)
    fn operation_message(&self) -> Option<String>;
}
