//! Scripted repository double for orchestrator tests

use std::sync::{Arc, Mutex};

use crate::cancellation::CancellationToken;
use crate::credentials::{Credential, CredentialKind, CredentialRequest};
use crate::git::{
    BranchInfo, FetchSettings, Identity, MergeSettings, NetworkHandler, RawMergeResult,
    RawMergeStatus, RemoteInfo, RemoteRepository,
};
use crate::progress::{ProgressEvent, ProgressSink, TransferProgress};
use crate::{Error, Result};

pub const REMOTE_URL: &str = "https://example.com/org/repo.git";

/// Replays a fixed fetch and merge script through the handler
pub struct ScriptedRepo {
    /// Credential challenges issued before any transfer tick
    pub challenges: usize,
    pub transfers: Vec<TransferProgress>,
    pub sideband: Vec<String>,
    /// Cancel this token just before the transfer tick at the given index
    pub cancel_at: Option<(usize, CancellationToken)>,
    pub fetch_error: Option<String>,
    pub merge_status: RawMergeStatus,
    pub merge_commit: Option<String>,
    pub merge_error: Option<String>,
    pub checkout_ticks: Vec<(Option<String>, usize, usize)>,
    pub message: Option<String>,

    pub offered: Vec<Credential>,
    pub fetch_calls: usize,
    pub merge_calls: usize,
    /// Stand-in for the remote-tracking ref, advanced only by a completed fetch
    pub tracking_tip: String,
}

impl Default for ScriptedRepo {
    fn default() -> Self {
        Self {
            challenges: 1,
            transfers: vec![
                TransferProgress {
                    received_objects: 1,
                    total_objects: 2,
                    received_bytes: 100,
                    indexed_objects: 0,
                },
                TransferProgress {
                    received_objects: 2,
                    total_objects: 2,
                    received_bytes: 200,
                    indexed_objects: 2,
                },
            ],
            sideband: vec![],
            cancel_at: None,
            fetch_error: None,
            merge_status: RawMergeStatus::FastForward,
            merge_commit: None,
            merge_error: None,
            checkout_ticks: vec![],
            message: None,
            offered: vec![],
            fetch_calls: 0,
            merge_calls: 0,
            tracking_tip: "old".to_string(),
        }
    }
}

impl RemoteRepository for ScriptedRepo {
    fn remotes(&self) -> Result<Vec<RemoteInfo>> {
        Ok(vec![RemoteInfo {
            name: "origin".to_string(),
            url: REMOTE_URL.to_string(),
        }])
    }

    fn branches(&self) -> Result<Vec<BranchInfo>> {
        Ok(vec![BranchInfo {
            friendly_name: "main".to_string(),
            remote: Some("origin".to_string()),
            is_remote: false,
        }])
    }

    fn fetch(
        &mut self,
        _remote: &str,
        _settings: &FetchSettings,
        handler: &dyn NetworkHandler,
    ) -> Result<()> {
        self.fetch_calls += 1;

        for _ in 0..self.challenges {
            let request = CredentialRequest::new(REMOTE_URL, CredentialKind::UsernamePassword);
            match handler.credentials(&request) {
                Some(credential) => self.offered.push(credential),
                None => {
                    return Err(Error::Git(git2::Error::new(
                        git2::ErrorCode::Auth,
                        git2::ErrorClass::Http,
                        "authentication failed",
                    )))
                }
            }
        }

        for line in &self.sideband {
            if !handler.sideband_progress(line) {
                return Err(Error::Git(git2::Error::from_str("callback stopped the transfer")));
            }
        }

        for (i, tick) in self.transfers.iter().enumerate() {
            if let Some((at, token)) = &self.cancel_at {
                if *at == i {
                    token.cancel();
                }
            }
            if !handler.transfer_progress(tick) {
                return Err(Error::Git(git2::Error::from_str("callback stopped the transfer")));
            }
        }

        if let Some(message) = &self.fetch_error {
            return Err(Error::Git(git2::Error::new(
                git2::ErrorCode::GenericError,
                git2::ErrorClass::Net,
                message.as_str(),
            )));
        }

        self.tracking_tip = "new".to_string();
        Ok(())
    }

    fn merge_upstream(
        &mut self,
        _remote: &str,
        _branch: &str,
        _settings: &MergeSettings,
        _identity: Option<&Identity>,
        handler: &dyn NetworkHandler,
    ) -> Result<RawMergeResult> {
        self.merge_calls += 1;
        for (path, completed, total) in &self.checkout_ticks {
            handler.checkout_progress(path.as_deref(), *completed, *total);
        }
        if let Some(message) = &self.merge_error {
            return Err(Error::Other(message.clone()));
        }
        let mut result = RawMergeResult::new(self.merge_status.clone());
        result.commit_id = self.merge_commit.clone();
        Ok(result)
    }

    fn operation_message(&self) -> Option<String> {
        self.message.clone()
    }
}

/// Keeps every event it receives
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn clear(&self) {
        self.events.lock().unwrap().push(ProgressEvent::Cleared);
    }
}
