//! Running operations on tokio's blocking pool
//!
//! libgit2 network calls block, so the whole operation moves to a blocking
//! worker. Progress still flows through the orchestrator's sink, in order.

use tokio::task::JoinHandle;

use super::{FetchReport, PullReport, RemoteOperationOrchestrator};
use crate::cancellation::CancellationToken;
use crate::credentials::CredentialProfile;
use crate::git::{FetchSettings, MergeSettings, RemoteRepository};
use crate::{Error, Result};

/// Owned arguments for a background fetch
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub remote: String,
    pub profile: CredentialProfile,
    pub settings: FetchSettings,
}

/// Owned arguments for a background pull
#[derive(Debug, Clone)]
pub struct PullRequest {
    pub remote: String,
    pub branch: String,
    pub profile: CredentialProfile,
    pub fetch: FetchSettings,
    pub merge: MergeSettings,
}

/// An operation running on a blocking worker
///
/// The orchestrator is handed back from [`join`](Self::join) so it can run
/// the next operation.
pub struct BackgroundOperation<R, T> {
    cancel: CancellationToken,
    handle: JoinHandle<(RemoteOperationOrchestrator<R>, T)>,
}

impl<R, T> BackgroundOperation<R, T> {
    /// Ask the running operation to stop at its next callback
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the operation to finish
    pub async fn join(self) -> Result<(RemoteOperationOrchestrator<R>, T)> {
        self.handle
            .await
            .map_err(|e| Error::Other(format!("Background operation did not complete: {}", e)))
    }
}

/// Run [`RemoteOperationOrchestrator::start_fetch`] on the blocking pool
pub fn spawn_fetch<R>(
    mut orchestrator: RemoteOperationOrchestrator<R>,
    request: FetchRequest,
) -> BackgroundOperation<R, FetchReport>
where
    R: RemoteRepository + 'static,
{
    let cancel = orchestrator.cancellation_token();
    let handle = tokio::task::spawn_blocking(move || {
        let report =
            orchestrator.start_fetch(&request.remote, &request.profile, request.settings);
        (orchestrator, report)
    });
    BackgroundOperation { cancel, handle }
}

/// Run [`RemoteOperationOrchestrator::start_pull`] on the blocking pool
pub fn spawn_pull<R>(
    mut orchestrator: RemoteOperationOrchestrator<R>,
    request: PullRequest,
) -> BackgroundOperation<R, PullReport>
where
    R: RemoteRepository + 'static,
{
    let cancel = orchestrator.cancellation_token();
    let handle = tokio::task::spawn_blocking(move || {
        let report = orchestrator.start_pull(
            &request.remote,
            &request.branch,
            &request.profile,
            request.fetch,
            request.merge,
        );
        (orchestrator, report)
    });
    BackgroundOperation { cancel, handle }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::testing::ScriptedRepo;
    use super::super::{FetchOutcome, MergeOutcome, OperationPhase};
    use super::*;
    use crate::credentials::CredentialResolver;
    use crate::progress::{ChannelProgressSink, ProgressEvent};

    fn pull_request() -> PullRequest {
        PullRequest {
            remote: "origin".to_string(),
            branch: "main".to_string(),
            profile: CredentialProfile::anonymous(),
            fetch: FetchSettings::default(),
            merge: MergeSettings::default(),
        }
    }

    #[tokio::test]
    async fn test_background_pull_streams_progress_in_order() {
        let (sink, mut rx) = ChannelProgressSink::new();
        let orch =
            RemoteOperationOrchestrator::new(ScriptedRepo::default(), CredentialResolver::default())
                .with_progress(Arc::new(sink));

        let op = spawn_pull(orch, pull_request());
        let (orch, report) = op.join().await.unwrap();
        assert_eq!(report.outcome, MergeOutcome::FastForward);
        assert_eq!(orch.phase(), OperationPhase::FastForward);

        let mut received = Vec::new();
        let mut saw_cleared = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                ProgressEvent::Transfer(t) => received.push(t.received_objects),
                ProgressEvent::Cleared => saw_cleared = true,
                _ => {}
            }
        }
        assert_eq!(received, vec![1, 2]);
        assert!(saw_cleared);
    }

    #[tokio::test]
    async fn test_background_fetch_cancelled() {
        let orch =
            RemoteOperationOrchestrator::new(ScriptedRepo::default(), CredentialResolver::default());
        let token = orch.cancellation_token();
        token.cancel();

        let op = spawn_fetch(
            orch,
            FetchRequest {
                remote: "origin".to_string(),
                profile: CredentialProfile::anonymous(),
                settings: FetchSettings::default(),
            },
        );
        let (orch, report) = op.join().await.unwrap();
        assert!(matches!(report.outcome, FetchOutcome::Aborted { .. }));
        assert_eq!(orch.repository().tracking_tip, "old");
    }
}
