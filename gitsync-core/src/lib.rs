//! gitsync Core - credential resolution and fetch/merge orchestration
//!
//! This crate decides which credentials to present for a remote operation
//! and drives a fetch, optionally followed by a merge, to a terminal outcome
//! the caller can act on.

pub mod cancellation;
pub mod config;
pub mod credentials;
pub mod error;
pub mod git;
pub mod notify;
pub mod orchestrator;
pub mod progress;

pub use cancellation::CancellationToken;
pub use config::Config;
pub use credentials::{
    Credential, CredentialKind, CredentialProfile, CredentialRequest, CredentialResolver,
    CredentialStore, FileCredentialStore, StoredCredentialEntry,
};
pub use error::{Error, Result};
pub use git::{
    BranchInfo, FastForwardStrategy, FetchSettings, FileConflictStrategy, GitRepo, Identity,
    MergeSettings, RemoteInfo, RemoteRepository,
};
pub use notify::{Notification, NotificationSink, Severity, TracingNotifier};
pub use orchestrator::{
    spawn_fetch, spawn_pull, BackgroundOperation, Failure, FailureCause, FetchOutcome,
    FetchReport, FetchRequest, MergeOutcome, OperationLock, OperationPhase, PullReport,
    PullRequest, RemoteOperationOrchestrator,
};
pub use progress::{ChannelProgressSink, ProgressEvent, ProgressSink, TransferProgress};
