//! Terminal outcomes and how they are reported

use std::fmt;

use serde::Serialize;

use super::state::OperationPhase;
use crate::error::Error;
use crate::git::RawMergeStatus;
use crate::notify::Notification;
use crate::progress::TransferProgress;

/// Why an operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The remote declined the credentials offered
    Authentication,
    /// Network or IO failure while transferring objects
    Transfer,
    /// The merge step itself failed
    Merge,
    /// The named remote or upstream branch does not exist
    InvalidTarget,
    /// The library reported a merge status we do not know
    UnrecognizedStatus,
    /// Another operation already holds the repository
    Busy,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureCause::Authentication => "authentication",
            FailureCause::Transfer => "transfer",
            FailureCause::Merge => "merge",
            FailureCause::InvalidTarget => "invalid target",
            FailureCause::UnrecognizedStatus => "unrecognized status",
            FailureCause::Busy => "busy",
        };
        f.write_str(name)
    }
}

/// A classified failure with its diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub cause: FailureCause,
    pub message: String,
}

impl Failure {
    pub fn new(cause: FailureCause, message: impl Into<String>) -> Self {
        Self {
            cause,
            message: message.into(),
        }
    }

    /// Classify an error raised while fetching
    pub(crate) fn from_fetch_error(err: &Error, auth_rejected: bool) -> Self {
        let cause = if auth_rejected || is_auth_error(err) {
            FailureCause::Authentication
        } else if matches!(err, Error::NotFound(_)) {
            FailureCause::InvalidTarget
        } else {
            FailureCause::Transfer
        };
        Self::new(cause, err.to_string())
    }

    /// Classify an error raised while merging
    pub(crate) fn from_merge_error(err: &Error) -> Self {
        let cause = if matches!(err, Error::NotFound(_)) {
            FailureCause::InvalidTarget
        } else {
            FailureCause::Merge
        };
        Self::new(cause, err.to_string())
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.cause)
    }
}

fn is_auth_error(err: &Error) -> bool {
    let Error::Git(e) = err else {
        return false;
    };
    if e.code() == git2::ErrorCode::Auth {
        return true;
    }
    let message = e.message().to_ascii_lowercase();
    matches!(e.class(), git2::ErrorClass::Http | git2::ErrorClass::Ssh)
        && (message.contains("authentication") || message.contains("credentials"))
}

/// Terminal state of a pull
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MergeOutcome {
    UpToDate,
    FastForward,
    NonFastForward,
    Conflicted,
    Aborted { reason: String },
    Failed(Failure),
}

impl MergeOutcome {
    /// Map the library's merge status onto an outcome
    pub fn classify(status: &RawMergeStatus) -> Self {
        match status {
            RawMergeStatus::UpToDate => MergeOutcome::UpToDate,
            RawMergeStatus::FastForward => MergeOutcome::FastForward,
            RawMergeStatus::NonFastForward => MergeOutcome::NonFastForward,
            RawMergeStatus::Conflicts => MergeOutcome::Conflicted,
            RawMergeStatus::Unrecognized(raw) => MergeOutcome::Failed(Failure::new(
                FailureCause::UnrecognizedStatus,
                format!("Unrecognized merge status: {}", raw),
            )),
        }
    }

    /// Whether the working tree waits for the user to commit
    pub fn requires_commit(&self) -> bool {
        matches!(self, MergeOutcome::NonFastForward | MergeOutcome::Conflicted)
    }

    pub fn phase(&self) -> OperationPhase {
        match self {
            MergeOutcome::UpToDate => OperationPhase::UpToDate,
            MergeOutcome::FastForward => OperationPhase::FastForward,
            MergeOutcome::NonFastForward => OperationPhase::NonFastForward,
            MergeOutcome::Conflicted => OperationPhase::Conflicted,
            MergeOutcome::Aborted { .. } => OperationPhase::Aborted,
            MergeOutcome::Failed(_) => OperationPhase::Failed,
        }
    }

    /// Message shown to the user for this outcome
    pub fn notification(&self, operation: &str) -> Notification {
        match self {
            MergeOutcome::UpToDate => Notification::info(format!(
                "Everything is up to date. Nothing to {}.",
                operation.to_lowercase()
            )),
            MergeOutcome::FastForward => Notification::info(format!(
                "{} complete with fast forwarding.",
                capitalize(operation)
            )),
            MergeOutcome::NonFastForward => {
                Notification::info("Do a merge commit in order to push changes.")
            }
            MergeOutcome::Conflicted => Notification::warning("There are merge conflicts!"),
            MergeOutcome::Aborted { reason } => {
                Notification::info(format!("{} aborted: {}", capitalize(operation), reason))
            }
            MergeOutcome::Failed(failure) => {
                Notification::error(format!("{} failed: {}", capitalize(operation), failure))
            }
        }
    }
}

impl fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeOutcome::Aborted { reason } => write!(f, "aborted ({})", reason),
            MergeOutcome::Failed(failure) => write!(f, "failed: {}", failure),
            other => write!(f, "{}", other.phase()),
        }
    }
}

/// Terminal state of a fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    Completed,
    Aborted { reason: String },
    Failed(Failure),
}

impl FetchOutcome {
    pub fn phase(&self) -> OperationPhase {
        match self {
            FetchOutcome::Completed => OperationPhase::Fetched,
            FetchOutcome::Aborted { .. } => OperationPhase::Aborted,
            FetchOutcome::Failed(_) => OperationPhase::Failed,
        }
    }

    pub fn notification(&self, transfer: &TransferProgress) -> Notification {
        match self {
            FetchOutcome::Completed => Notification::info(format!(
                "Fetch complete. Received {} objects ({} bytes).",
                transfer.received_objects, transfer.received_bytes
            )),
            FetchOutcome::Aborted { reason } => {
                Notification::info(format!("Fetch aborted: {}", reason))
            }
            FetchOutcome::Failed(failure) => {
                Notification::error(format!("Fetch failed: {}", failure))
            }
        }
    }
}

/// Everything the caller learns from a pull
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PullReport {
    pub outcome: MergeOutcome,
    /// Commit message the user should commit with, for outcomes awaiting a commit
    pub pending_commit_message: Option<String>,
    /// Commit the branch now points at, when the merge moved it
    pub commit_id: Option<String>,
    /// Last transfer counters seen
    pub transfer: TransferProgress,
    pub notification: Notification,
}

/// Everything the caller learns from a fetch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchReport {
    pub outcome: FetchOutcome,
    pub transfer: TransferProgress,
    pub notification: Notification,
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
