//! Fetch and pull orchestration
//!
//! [`RemoteOperationOrchestrator`] drives one network operation at a time
//! against a [`RemoteRepository`]: it answers credential challenges through
//! the [`CredentialResolver`], relays progress, polls the cancellation token
//! at every callback and turns whatever happens into a terminal report. Errors
//! from the repository never escape a `start_*` call.

mod background;
mod outcome;
mod state;
#[cfg(test)]
mod testing;

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::cancellation::CancellationToken;
use crate::credentials::{Credential, CredentialProfile, CredentialRequest, CredentialResolver};
use crate::error::Error;
use crate::git::{
    BranchInfo, FetchSettings, Identity, MergeSettings, NetworkHandler, RawMergeStatus,
    RemoteInfo, RemoteRepository,
};
use crate::notify::{Notification, NotificationSink, TracingNotifier};
use crate::progress::{
    CheckoutProgress, NullProgressSink, ProgressEvent, ProgressGuard, ProgressSink,
    TransferProgress,
};
use crate::Result;

pub use background::{spawn_fetch, spawn_pull, BackgroundOperation, FetchRequest, PullRequest};
pub use outcome::{Failure, FailureCause, FetchOutcome, FetchReport, MergeOutcome, PullReport};
pub use state::{OperationPhase, PhaseTracker};

const CANCELLED_REASON: &str = "Cancelled by user";

/// Rejects a second network operation while one is running
///
/// Clones share the same flag, so orchestrators over the same repository
/// should share one lock.
#[derive(Debug, Clone, Default)]
pub struct OperationLock {
    busy: Arc<AtomicBool>,
}

impl OperationLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock, or `None` if an operation already holds it
    pub fn try_acquire(&self) -> Option<OperationPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| OperationPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_held(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the [`OperationLock`] when dropped
#[derive(Debug)]
pub struct OperationPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for OperationPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// How an operation stopped before reaching its own terminal state
enum Interrupted {
    Aborted(String),
    Failed(Failure),
}

/// Network callbacks for one operation
struct OperationDriver<'a> {
    resolver: &'a CredentialResolver,
    profile: &'a CredentialProfile,
    progress: &'a dyn ProgressSink,
    cancel: &'a CancellationToken,
    phase: &'a PhaseTracker,
    attempts: Cell<u32>,
    auth_rejected: Cell<bool>,
    cancelled: Cell<bool>,
    last_transfer: Cell<TransferProgress>,
    transfer_logged: Cell<bool>,
}

impl<'a> OperationDriver<'a> {
    fn new(
        resolver: &'a CredentialResolver,
        profile: &'a CredentialProfile,
        progress: &'a dyn ProgressSink,
        cancel: &'a CancellationToken,
        phase: &'a PhaseTracker,
    ) -> Self {
        Self {
            resolver,
            profile,
            progress,
            cancel,
            phase,
            attempts: Cell::new(0),
            auth_rejected: Cell::new(false),
            cancelled: Cell::new(false),
            last_transfer: Cell::new(TransferProgress::default()),
            transfer_logged: Cell::new(false),
        }
    }

    /// Move to `to` unless already there, and tell the progress sink
    fn advance(&self, to: OperationPhase) {
        if self.phase.current() == to {
            return;
        }
        match self.phase.transition_to(to) {
            Ok(()) => self.progress.report(ProgressEvent::Phase { phase: to }),
            Err(e) => warn!(error = %e, "Ignoring phase change"),
        }
    }

    fn finish(&self, to: OperationPhase) {
        self.phase.finish(to);
        self.progress.report(ProgressEvent::Phase { phase: to });
    }

    /// Poll the token; once seen, every later callback refuses too
    fn observe_cancel(&self) -> bool {
        if self.cancel.is_cancelled() {
            if !self.cancelled.replace(true) {
                info!("Cancellation requested, stopping transfer");
            }
            return true;
        }
        self.cancelled.get()
    }

    fn was_cancelled(&self) -> bool {
        self.cancelled.get() || self.cancel.is_cancelled()
    }
}

impl NetworkHandler for OperationDriver<'_> {
    fn credentials(&self, request: &CredentialRequest) -> Option<Credential> {
        if self.observe_cancel() {
            return None;
        }

        let attempt = self.attempts.get() + 1;
        self.attempts.set(attempt);
        // A repeated challenge means the remote turned down what we offered.
        if attempt > 1 {
            warn!(url = %request.url, attempt, "Credentials rejected by remote");
            self.auth_rejected.set(true);
            return None;
        }

        let credential = self.resolver.answer(request, self.profile);
        if credential.is_empty() {
            debug!(url = %request.url, "Offering empty credentials");
        }
        Some(credential)
    }

    fn transfer_progress(&self, progress: &TransferProgress) -> bool {
        if self.observe_cancel() {
            return false;
        }

        self.advance(OperationPhase::Transferring);
        self.last_transfer.set(*progress);
        self.progress.report(ProgressEvent::Transfer(*progress));

        if progress.is_complete() && !self.transfer_logged.replace(true) {
            info!(
                received_objects = progress.received_objects,
                received_bytes = progress.received_bytes,
                "Transfer complete"
            );
        }
        true
    }

    fn sideband_progress(&self, message: &str) -> bool {
        if self.observe_cancel() {
            return false;
        }
        if !message.is_empty() {
            self.progress.report(ProgressEvent::Remote {
                message: message.to_string(),
            });
        }
        true
    }

    fn checkout_progress(&self, path: Option<&str>, completed: usize, total: usize) {
        self.progress.report(ProgressEvent::Checkout(CheckoutProgress {
            path: path.map(str::to_string),
            completed,
            total,
        }));
    }
}

/// Drives fetches and pulls against one repository
pub struct RemoteOperationOrchestrator<R> {
    repo: R,
    resolver: CredentialResolver,
    notifier: Arc<dyn NotificationSink>,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
    lock: OperationLock,
    phase: PhaseTracker,
    identity: Option<Identity>,
}

impl<R> std::fmt::Debug for RemoteOperationOrchestrator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteOperationOrchestrator")
            .field("phase", &self.phase.current())
            .field("busy", &self.lock.is_held())
            .finish_non_exhaustive()
    }
}

impl<R: RemoteRepository> RemoteOperationOrchestrator<R> {
    /// Create an orchestrator that logs notifications and discards progress
    pub fn new(repo: R, resolver: CredentialResolver) -> Self {
        Self {
            repo,
            resolver,
            notifier: Arc::new(TracingNotifier),
            progress: Arc::new(NullProgressSink),
            cancel: CancellationToken::new(),
            lock: OperationLock::new(),
            phase: PhaseTracker::new(),
            identity: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Share a lock with other orchestrators over the same repository
    pub fn with_lock(mut self, lock: OperationLock) -> Self {
        self.lock = lock;
        self
    }

    /// Identity for merge commits; the repository's configured one otherwise
    pub fn with_identity(mut self, identity: Option<Identity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn repository_mut(&mut self) -> &mut R {
        &mut self.repo
    }

    pub fn into_repository(self) -> R {
        self.repo
    }

    pub fn phase(&self) -> OperationPhase {
        self.phase.current()
    }

    /// Token that cancels the running operation
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn lock(&self) -> &OperationLock {
        &self.lock
    }

    pub fn remotes(&self) -> Result<Vec<RemoteInfo>> {
        self.repo.remotes()
    }

    pub fn branches(&self) -> Result<Vec<BranchInfo>> {
        self.repo.branches()
    }

    /// Map a merge status from the repository onto a terminal outcome
    pub fn classify(status: &RawMergeStatus) -> MergeOutcome {
        MergeOutcome::classify(status)
    }

    /// Relay checkout progress and return the completed fraction
    ///
    /// A zero total reports `0.0`.
    pub fn on_checkout_progress(&self, path: Option<&str>, completed: usize, total: usize) -> f32 {
        let progress = CheckoutProgress {
            path: path.map(str::to_string),
            completed,
            total,
        };
        let fraction = progress.fraction();
        self.progress.report(ProgressEvent::Checkout(progress));
        fraction
    }

    /// Fetch from `remote`, updating its remote-tracking references
    pub fn start_fetch(
        &mut self,
        remote: &str,
        profile: &CredentialProfile,
        settings: FetchSettings,
    ) -> FetchReport {
        let Some(_permit) = self.lock.try_acquire() else {
            warn!(remote, "Fetch rejected, another operation is running");
            let outcome = FetchOutcome::Failed(busy_failure());
            let transfer = TransferProgress::default();
            let notification = outcome.notification(&transfer);
            self.notifier.notify(&notification);
            return FetchReport {
                outcome,
                transfer,
                notification,
            };
        };
        let _progress = ProgressGuard::new(Arc::clone(&self.progress));

        let driver = OperationDriver::new(
            &self.resolver,
            profile,
            self.progress.as_ref(),
            &self.cancel,
            &self.phase,
        );
        driver.advance(OperationPhase::Authenticating);

        let outcome = match fetch_stage(&mut self.repo, remote, &settings, &driver) {
            Ok(()) => FetchOutcome::Completed,
            Err(Interrupted::Aborted(reason)) => FetchOutcome::Aborted { reason },
            Err(Interrupted::Failed(failure)) => FetchOutcome::Failed(failure),
        };

        driver.finish(outcome.phase());
        let transfer = driver.last_transfer.get();
        let notification = outcome.notification(&transfer);
        self.notifier.notify(&notification);
        self.cancel.reset();

        FetchReport {
            outcome,
            transfer,
            notification,
        }
    }

    /// Fetch from `remote`, then merge `remote`/`branch` into the current branch
    pub fn start_pull(
        &mut self,
        remote: &str,
        branch: &str,
        profile: &CredentialProfile,
        fetch: FetchSettings,
        merge: MergeSettings,
    ) -> PullReport {
        let Some(_permit) = self.lock.try_acquire() else {
            warn!(remote, branch, "Pull rejected, another operation is running");
            let outcome = MergeOutcome::Failed(busy_failure());
            let notification = outcome.notification("pull");
            self.notifier.notify(&notification);
            return PullReport {
                outcome,
                pending_commit_message: None,
                commit_id: None,
                transfer: TransferProgress::default(),
                notification,
            };
        };
        let _progress = ProgressGuard::new(Arc::clone(&self.progress));

        let driver = OperationDriver::new(
            &self.resolver,
            profile,
            self.progress.as_ref(),
            &self.cancel,
            &self.phase,
        );
        driver.advance(OperationPhase::Authenticating);

        let mut commit_id = None;
        let outcome = match fetch_stage(&mut self.repo, remote, &fetch, &driver) {
            Err(Interrupted::Aborted(reason)) => MergeOutcome::Aborted { reason },
            Err(Interrupted::Failed(failure)) => MergeOutcome::Failed(failure),
            // No merge starts once cancellation was requested.
            Ok(()) if driver.was_cancelled() => {
                info!(remote, branch, "Pull cancelled before merging");
                MergeOutcome::Aborted {
                    reason: CANCELLED_REASON.to_string(),
                }
            }
            Ok(()) => {
                driver.advance(OperationPhase::Merging);
                info!(remote, branch, strategy = ?merge.fast_forward, "Merging upstream");
                match self.repo.merge_upstream(
                    remote,
                    branch,
                    &merge,
                    self.identity.as_ref(),
                    &driver,
                ) {
                    Ok(raw) => {
                        commit_id = raw.commit_id;
                        MergeOutcome::classify(&raw.status)
                    }
                    Err(e) => {
                        error!(remote, branch, error = %e, "Merge failed");
                        MergeOutcome::Failed(Failure::from_merge_error(&e))
                    }
                }
            }
        };

        // A merge committed on success leaves nothing for the user to commit.
        let pending_commit_message = (outcome.requires_commit() && commit_id.is_none())
            .then(|| self.repo.operation_message().unwrap_or_default());

        driver.finish(outcome.phase());
        let notification = match (&outcome, &commit_id) {
            (MergeOutcome::NonFastForward, Some(id)) => {
                Notification::info(format!("Pull complete with merge commit {}.", id))
            }
            _ => outcome.notification("pull"),
        };
        self.notifier.notify(&notification);
        self.cancel.reset();
        info!(remote, branch, outcome = %outcome, "Pull finished");

        PullReport {
            outcome,
            pending_commit_message,
            commit_id,
            transfer: driver.last_transfer.get(),
            notification,
        }
    }
}

fn busy_failure() -> Failure {
    Failure::new(FailureCause::Busy, Error::Busy.to_string())
}

/// Run the fetch and sort out how it ended
fn fetch_stage<R: RemoteRepository>(
    repo: &mut R,
    remote: &str,
    settings: &FetchSettings,
    driver: &OperationDriver<'_>,
) -> std::result::Result<(), Interrupted> {
    match repo.fetch(remote, settings, driver) {
        Ok(()) => {
            // Nothing to download means no transfer callback ran.
            driver.advance(OperationPhase::Transferring);
            Ok(())
        }
        Err(_) if driver.was_cancelled() => {
            info!(remote, "Fetch aborted");
            Err(Interrupted::Aborted(CANCELLED_REASON.to_string()))
        }
        Err(e) => {
            let failure = Failure::from_fetch_error(&e, driver.auth_rejected.get());
            error!(remote, cause = %failure.cause, error = %e, "Fetch failed");
            Err(Interrupted::Failed(failure))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{RecordingSink, ScriptedRepo, REMOTE_URL};
    use super::*;
    use crate::credentials::{EncodedCipher, MemoryCredentialStore, StoredCredentialEntry};
    use crate::notify::{CollectingNotifier, Severity};

    fn orchestrator(repo: ScriptedRepo) -> RemoteOperationOrchestrator<ScriptedRepo> {
        RemoteOperationOrchestrator::new(repo, CredentialResolver::default())
    }

    fn pull(orch: &mut RemoteOperationOrchestrator<ScriptedRepo>) -> PullReport {
        orch.start_pull(
            "origin",
            "main",
            &CredentialProfile::anonymous(),
            FetchSettings::default(),
            MergeSettings::default(),
        )
    }

    #[test]
    fn test_pull_fast_forward() {
        let notifier = Arc::new(CollectingNotifier::default());
        let repo = ScriptedRepo {
            merge_commit: Some("abc123".to_string()),
            ..Default::default()
        };
        let mut orch = orchestrator(repo).with_notifier(notifier.clone());

        let report = pull(&mut orch);
        assert_eq!(report.outcome, MergeOutcome::FastForward);
        assert_eq!(report.pending_commit_message, None);
        assert_eq!(report.commit_id.as_deref(), Some("abc123"));
        assert_eq!(report.transfer.received_objects, 2);
        assert_eq!(orch.phase(), OperationPhase::FastForward);

        let seen = notifier.notifications();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].message, "Pull complete with fast forwarding.");
    }

    #[test]
    fn test_pull_up_to_date() {
        let mut orch = orchestrator(ScriptedRepo {
            merge_status: RawMergeStatus::UpToDate,
            ..Default::default()
        });
        let report = pull(&mut orch);
        assert_eq!(report.outcome, MergeOutcome::UpToDate);
        assert_eq!(report.pending_commit_message, None);
        assert_eq!(
            report.notification.message,
            "Everything is up to date. Nothing to pull."
        );
    }

    #[test]
    fn test_pull_non_fast_forward_surfaces_message() {
        let mut orch = orchestrator(ScriptedRepo {
            merge_status: RawMergeStatus::NonFastForward,
            message: Some("Merge remote-tracking branch 'origin/main'".to_string()),
            ..Default::default()
        });
        let report = pull(&mut orch);
        assert_eq!(report.outcome, MergeOutcome::NonFastForward);
        assert_eq!(
            report.pending_commit_message.as_deref(),
            Some("Merge remote-tracking branch 'origin/main'")
        );
        assert_eq!(report.notification.severity, Severity::Info);
    }

    #[test]
    fn test_pull_conflicts_warn() {
        let mut orch = orchestrator(ScriptedRepo {
            merge_status: RawMergeStatus::Conflicts,
            message: Some("Merge branch 'main'\n\nConflicts:\n\tshared.txt\n".to_string()),
            ..Default::default()
        });
        let report = pull(&mut orch);
        assert_eq!(report.outcome, MergeOutcome::Conflicted);
        assert!(report
            .pending_commit_message
            .as_deref()
            .unwrap()
            .contains("Conflicts"));
        assert_eq!(report.notification.severity, Severity::Warning);
        assert_eq!(orch.phase(), OperationPhase::Conflicted);
    }

    #[test]
    fn test_pending_message_always_set_when_commit_required() {
        let mut orch = orchestrator(ScriptedRepo {
            merge_status: RawMergeStatus::NonFastForward,
            message: None,
            ..Default::default()
        });
        let report = pull(&mut orch);
        assert_eq!(report.pending_commit_message.as_deref(), Some(""));
    }

    #[test]
    fn test_committed_merge_has_no_pending_message() {
        let mut orch = orchestrator(ScriptedRepo {
            merge_status: RawMergeStatus::NonFastForward,
            merge_commit: Some("abc123".to_string()),
            message: Some("Merge remote-tracking branch 'origin/main'".to_string()),
            ..Default::default()
        });
        let report = pull(&mut orch);
        assert_eq!(report.outcome, MergeOutcome::NonFastForward);
        assert_eq!(report.commit_id.as_deref(), Some("abc123"));
        assert_eq!(report.pending_commit_message, None);
        assert_eq!(
            report.notification.message,
            "Pull complete with merge commit abc123."
        );
        assert_eq!(orch.phase(), OperationPhase::NonFastForward);
    }

    #[test]
    fn test_unrecognized_status_fails() {
        let mut orch = orchestrator(ScriptedRepo {
            merge_status: RawMergeStatus::Unrecognized("UNBORN".to_string()),
            ..Default::default()
        });
        let report = pull(&mut orch);
        match report.outcome {
            MergeOutcome::Failed(failure) => {
                assert_eq!(failure.cause, FailureCause::UnrecognizedStatus)
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(report.notification.severity, Severity::Error);
        assert_eq!(orch.phase(), OperationPhase::Failed);
    }

    #[test]
    fn test_cancel_mid_transfer_aborts_without_merge() {
        let mut orch = orchestrator(ScriptedRepo::default());
        let token = orch.cancellation_token();
        orch.repository_mut().cancel_at = Some((1, token));

        let report = pull(&mut orch);
        assert!(matches!(report.outcome, MergeOutcome::Aborted { .. }));
        assert_eq!(report.pending_commit_message, None);
        assert_eq!(orch.repository().merge_calls, 0);
        assert_eq!(orch.repository().tracking_tip, "old");
        assert_eq!(orch.phase(), OperationPhase::Aborted);
        // Only the tick before the cancel was accepted.
        assert_eq!(report.transfer.received_objects, 1);
    }

    #[test]
    fn test_retry_after_cancel_succeeds() {
        let mut orch = orchestrator(ScriptedRepo::default());
        let token = orch.cancellation_token();
        orch.repository_mut().cancel_at = Some((0, token.clone()));

        let first = pull(&mut orch);
        assert!(matches!(first.outcome, MergeOutcome::Aborted { .. }));
        assert!(!token.is_cancelled());

        orch.repository_mut().cancel_at = None;
        let second = pull(&mut orch);
        assert_eq!(second.outcome, MergeOutcome::FastForward);
        assert_eq!(orch.repository().tracking_tip, "new");
        assert_eq!(orch.repository().fetch_calls, 2);
    }

    #[test]
    fn test_cancel_before_start_never_merges() {
        let mut orch = orchestrator(ScriptedRepo {
            challenges: 0,
            transfers: vec![],
            ..Default::default()
        });
        orch.cancellation_token().cancel();

        let report = pull(&mut orch);
        assert!(matches!(report.outcome, MergeOutcome::Aborted { .. }));
        assert_eq!(orch.repository().merge_calls, 0);
    }

    #[test]
    fn test_rejected_credentials_fail_with_authentication() {
        let mut orch = orchestrator(ScriptedRepo {
            challenges: 3,
            ..Default::default()
        });
        let report = pull(&mut orch);
        match report.outcome {
            MergeOutcome::Failed(failure) => {
                assert_eq!(failure.cause, FailureCause::Authentication)
            }
            other => panic!("expected failure, got {other:?}"),
        }
        // Exactly one attempt reached the transport.
        assert_eq!(orch.repository().offered.len(), 1);
        assert_eq!(orch.repository().merge_calls, 0);
    }

    #[test]
    fn test_credentials_resolved_from_store() {
        let store = Arc::new(MemoryCredentialStore::default());
        store.insert(StoredCredentialEntry::user_password(
            REMOTE_URL,
            "alice",
            "secret",
            Arc::new(EncodedCipher),
        ));
        let mut orch = RemoteOperationOrchestrator::new(
            ScriptedRepo::default(),
            CredentialResolver::new(store),
        );

        let report = orch.start_fetch(
            "origin",
            &CredentialProfile::user_password("bob", ""),
            FetchSettings::default(),
        );
        assert_eq!(report.outcome, FetchOutcome::Completed);

        let offered = &orch.repository().offered;
        assert_eq!(offered.len(), 1);
        assert_eq!(offered[0].username(), Some("bob"));
        assert_eq!(offered[0].password(), Some("secret"));
    }

    #[test]
    fn test_transfer_error_is_failure() {
        let mut orch = orchestrator(ScriptedRepo {
            fetch_error: Some("connection reset by peer".to_string()),
            ..Default::default()
        });
        let report = orch.start_fetch(
            "origin",
            &CredentialProfile::anonymous(),
            FetchSettings::default(),
        );
        match report.outcome {
            FetchOutcome::Failed(failure) => {
                assert_eq!(failure.cause, FailureCause::Transfer);
                assert!(failure.message.contains("connection reset"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(orch.phase(), OperationPhase::Failed);
        assert_eq!(orch.repository().tracking_tip, "old");
    }

    #[test]
    fn test_merge_error_is_failure() {
        let mut orch = orchestrator(ScriptedRepo {
            merge_error: Some("Cannot fast-forward".to_string()),
            ..Default::default()
        });
        let report = pull(&mut orch);
        match report.outcome {
            MergeOutcome::Failed(failure) => assert_eq!(failure.cause, FailureCause::Merge),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_fetch_completed_report() {
        let notifier = Arc::new(CollectingNotifier::default());
        let mut orch = orchestrator(ScriptedRepo::default()).with_notifier(notifier.clone());
        let report = orch.start_fetch(
            "origin",
            &CredentialProfile::anonymous(),
            FetchSettings::default(),
        );

        assert_eq!(report.outcome, FetchOutcome::Completed);
        assert_eq!(orch.phase(), OperationPhase::Fetched);
        assert_eq!(orch.repository().merge_calls, 0);
        assert_eq!(
            notifier.notifications()[0].message,
            "Fetch complete. Received 2 objects (200 bytes)."
        );
    }

    #[test]
    fn test_busy_lock_rejects_second_operation() {
        let lock = OperationLock::new();
        let mut orch = orchestrator(ScriptedRepo::default()).with_lock(lock.clone());

        let held = lock.try_acquire().unwrap();
        assert!(lock.try_acquire().is_none());

        let report = pull(&mut orch);
        match report.outcome {
            MergeOutcome::Failed(failure) => assert_eq!(failure.cause, FailureCause::Busy),
            other => panic!("expected busy failure, got {other:?}"),
        }
        assert_eq!(orch.repository().fetch_calls, 0);
        assert_eq!(orch.phase(), OperationPhase::Idle);

        drop(held);
        assert!(!lock.is_held());
        assert_eq!(pull(&mut orch).outcome, MergeOutcome::FastForward);
        assert!(!lock.is_held());
    }

    #[test]
    fn test_event_order_and_progress_cleared() {
        let sink = RecordingSink::new();
        let mut orch = orchestrator(ScriptedRepo {
            sideband: vec!["Counting objects: 2".to_string()],
            checkout_ticks: vec![(Some("a.txt".to_string()), 1, 1)],
            ..Default::default()
        })
        .with_progress(sink.clone());

        pull(&mut orch);

        let events = sink.events();
        assert_eq!(
            events.first(),
            Some(&ProgressEvent::Phase {
                phase: OperationPhase::Authenticating
            })
        );
        assert_eq!(events.last(), Some(&ProgressEvent::Cleared));

        let received: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Transfer(t) => Some(t.received_objects),
                _ => None,
            })
            .collect();
        assert_eq!(received, vec![1, 2]);

        let phases: Vec<OperationPhase> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Phase { phase } => Some(*phase),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                OperationPhase::Authenticating,
                OperationPhase::Transferring,
                OperationPhase::Merging,
                OperationPhase::FastForward,
            ]
        );
        assert!(events.contains(&ProgressEvent::Remote {
            message: "Counting objects: 2".to_string()
        }));
        assert!(events
            .iter()
            .any(|e| matches!(e, ProgressEvent::Checkout(c) if c.completed == 1)));
    }

    #[test]
    fn test_progress_cleared_on_failure() {
        let sink = RecordingSink::new();
        let mut orch = orchestrator(ScriptedRepo {
            fetch_error: Some("boom".to_string()),
            ..Default::default()
        })
        .with_progress(sink.clone());

        pull(&mut orch);
        assert_eq!(sink.events().last(), Some(&ProgressEvent::Cleared));
    }

    #[test]
    fn test_checkout_progress_zero_total() {
        let orch = orchestrator(ScriptedRepo::default());
        assert_eq!(orch.on_checkout_progress(Some("a.txt"), 3, 0), 0.0);
        assert_eq!(orch.on_checkout_progress(None, 1, 4), 0.25);
    }

    #[test]
    fn test_remotes_and_branches_pass_through() {
        let orch = orchestrator(ScriptedRepo::default());
        assert_eq!(orch.remotes().unwrap()[0].url, REMOTE_URL);
        assert_eq!(orch.branches().unwrap()[0].friendly_name, "main");
    }
}
