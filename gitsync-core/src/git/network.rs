//! Fetch and merge through libgit2

use std::path::Path;

use git2::build::CheckoutBuilder;
use git2::{
    AnnotatedCommit, CheckoutNotificationType, Cred, CredentialType, ErrorClass, ErrorCode,
    FetchOptions, FetchPrune, FileFavor, Oid, RemoteCallbacks, Signature,
};
use tracing::{debug, info};

use super::repo::GitRepo;
use super::{
    BranchInfo, FastForwardStrategy, FetchSettings, FileConflictStrategy, Identity, MergeSettings,
    NetworkHandler, RawMergeResult, RawMergeStatus, RemoteInfo, RemoteRepository,
};
use crate::credentials::{Credential, CredentialKind, CredentialRequest};
use crate::progress::TransferProgress;
use crate::{Error, Result};

/// Map the credential types libgit2 will accept onto the kind we resolve
fn credential_kind(allowed: CredentialType) -> CredentialKind {
    if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
        CredentialKind::UsernamePassword
    } else if allowed.intersects(
        CredentialType::SSH_KEY
            | CredentialType::SSH_CUSTOM
            | CredentialType::SSH_INTERACTIVE
            | CredentialType::SSH_MEMORY,
    ) {
        CredentialKind::Certificate
    } else {
        CredentialKind::Default
    }
}

/// URL with any embedded password removed, for logging
fn display_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(None);
            parsed.to_string()
        }
        _ => raw.to_string(),
    }
}

fn file_favor(strategy: FileConflictStrategy) -> FileFavor {
    match strategy {
        FileConflictStrategy::Normal => FileFavor::Normal,
        FileConflictStrategy::Ours => FileFavor::Ours,
        FileConflictStrategy::Theirs => FileFavor::Theirs,
    }
}

fn checkout_builder<'a>(handler: &'a dyn NetworkHandler) -> CheckoutBuilder<'a> {
    let mut checkout = CheckoutBuilder::new();
    checkout.safe().allow_conflicts(true).conflict_style_merge(true);
    checkout.progress(move |path: Option<&Path>, completed, total| {
        let path = path.map(|p| p.to_string_lossy().into_owned());
        handler.checkout_progress(path.as_deref(), completed, total);
    });
    checkout.notify_on(CheckoutNotificationType::CONFLICT | CheckoutNotificationType::DIRTY);
    checkout.notify(|why, path, _, _, _| {
        debug!(path = ?path, flags = ?why, "Checkout notification");
        true
    });
    checkout
}

impl GitRepo {
    fn signature(&self, identity: Option<&Identity>) -> Result<Signature<'static>> {
        match identity {
            Some(id) => Ok(Signature::now(&id.name, &id.email)?),
            None => Ok(self.repo.signature()?),
        }
    }

    fn upstream_commit(&self, remote: &str, branch: &str) -> Result<AnnotatedCommit<'_>> {
        let refname = format!("refs/remotes/{}/{}", remote, branch);
        let reference = self.repo.find_reference(&refname).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                Error::NotFound(format!("upstream branch '{}/{}'", remote, branch))
            } else {
                Error::Git(e)
            }
        })?;
        Ok(self.repo.reference_to_annotated_commit(&reference)?)
    }

    /// Point the unborn current branch at `target` and check it out
    fn adopt_upstream(&self, target: Oid, handler: &dyn NetworkHandler) -> Result<()> {
        let head = self.repo.find_reference("HEAD")?;
        let branch_ref = head
            .symbolic_target()
            .ok_or_else(|| Error::Other("HEAD is not symbolic".to_string()))?
            .to_string();

        self.repo
            .reference(&branch_ref, target, false, "gitsync: initial pull")?;
        let mut checkout = checkout_builder(handler);
        checkout.force();
        self.repo.checkout_head(Some(&mut checkout))?;
        Ok(())
    }

    /// Move the current branch forward to `target`
    fn fast_forward(&self, target: Oid, handler: &dyn NetworkHandler) -> Result<()> {
        let object = self.repo.find_object(target, None)?;
        let mut checkout = checkout_builder(handler);
        // Safe checkout refuses to clobber local edits before any ref moves.
        self.repo.checkout_tree(&object, Some(&mut checkout))?;

        let mut head = self.repo.head()?;
        head.set_target(target, "gitsync: fast-forward")?;
        Ok(())
    }

    fn merge_commit(
        &self,
        upstream: &AnnotatedCommit<'_>,
        settings: &MergeSettings,
        identity: Option<&Identity>,
        handler: &dyn NetworkHandler,
    ) -> Result<RawMergeResult> {
        let mut merge_options = git2::MergeOptions::new();
        merge_options.file_favor(file_favor(settings.file_favor));
        let mut checkout = checkout_builder(handler);

        self.repo
            .merge(&[upstream], Some(&mut merge_options), Some(&mut checkout))?;

        let mut index = self.repo.index()?;
        if index.has_conflicts() {
            return Ok(RawMergeResult::new(RawMergeStatus::Conflicts));
        }

        if !settings.commit_on_success {
            return Ok(RawMergeResult::new(RawMergeStatus::NonFastForward));
        }

        let tree = self.repo.find_tree(index.write_tree()?)?;
        let signature = self.signature(identity)?;
        let ours = self.repo.head()?.peel_to_commit()?;
        let theirs = self.repo.find_commit(upstream.id())?;
        let message = self
            .repo
            .message()
            .unwrap_or_else(|_| format!("Merge commit '{}'", upstream.id()));

        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &message,
            &tree,
            &[&ours, &theirs],
        )?;
        self.repo.cleanup_state()?;

        Ok(RawMergeResult::new(RawMergeStatus::NonFastForward).with_commit(oid.to_string()))
    }
}

impl RemoteRepository for GitRepo {
    fn remotes(&self) -> Result<Vec<RemoteInfo>> {
        self.list_remotes()
    }

    fn branches(&self) -> Result<Vec<BranchInfo>> {
        self.list_branches()
    }

    fn fetch(
        &mut self,
        remote_name: &str,
        settings: &FetchSettings,
        handler: &dyn NetworkHandler,
    ) -> Result<()> {
        let mut remote = self.repo.find_remote(remote_name).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                Error::NotFound(format!("remote '{}'", remote_name))
            } else {
                Error::Git(e)
            }
        })?;

        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(|url, username_from_url, allowed| {
            let request = CredentialRequest::new(url, credential_kind(allowed));
            debug!(
                url = %display_url(url),
                username_from_url = ?username_from_url,
                allowed = ?allowed,
                kind = ?request.kind,
                "Credential challenge"
            );

            match handler.credentials(&request) {
                Some(Credential::UsernamePassword { username, password }) => {
                    Cred::userpass_plaintext(&username, &password)
                }
                Some(Credential::Default) => Cred::default(),
                None => Err(git2::Error::new(
                    ErrorCode::Auth,
                    ErrorClass::Http,
                    "credentials were rejected by the remote",
                )),
            }
        });
        callbacks.transfer_progress(|progress| {
            handler.transfer_progress(&TransferProgress::from(progress))
        });
        callbacks.sideband_progress(|data| {
            handler.sideband_progress(String::from_utf8_lossy(data).trim_end())
        });

        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(callbacks);
        if settings.prune {
            fetch_options.prune(FetchPrune::On);
        }

        info!(
            remote = remote_name,
            url = %display_url(remote.url().unwrap_or("")),
            prune = settings.prune,
            "Fetch operation started"
        );

        // Empty refspec list means the remote's configured refspecs
        remote.fetch(&[] as &[&str], Some(&mut fetch_options), None)?;

        let stats = remote.stats();
        info!(
            remote = remote_name,
            received_objects = stats.received_objects(),
            received_bytes = stats.received_bytes(),
            "Fetch operation completed"
        );
        Ok(())
    }

    fn merge_upstream(
        &mut self,
        remote: &str,
        branch: &str,
        settings: &MergeSettings,
        identity: Option<&Identity>,
        handler: &dyn NetworkHandler,
    ) -> Result<RawMergeResult> {
        let upstream = self.upstream_commit(remote, branch)?;
        let target = upstream.id();
        let (analysis, preference) = self.repo.merge_analysis(&[&upstream])?;
        debug!(analysis = ?analysis, preference = ?preference, "Merge analysis");

        if analysis.is_up_to_date() {
            return Ok(RawMergeResult::new(RawMergeStatus::UpToDate));
        }

        if analysis.is_unborn() {
            self.adopt_upstream(target, handler)?;
            return Ok(
                RawMergeResult::new(RawMergeStatus::FastForward).with_commit(target.to_string())
            );
        }

        let ff_only = settings.fast_forward == FastForwardStrategy::FastForwardOnly
            || preference.is_fastforward_only();
        let ff_allowed = settings.fast_forward != FastForwardStrategy::NoFastForward
            && !preference.is_no_fast_forward();

        if analysis.is_fast_forward() && ff_allowed {
            self.fast_forward(target, handler)?;
            return Ok(
                RawMergeResult::new(RawMergeStatus::FastForward).with_commit(target.to_string())
            );
        }

        if analysis.is_normal() || analysis.is_fast_forward() {
            if ff_only {
                return Err(Error::Other(format!(
                    "Cannot fast-forward to {}/{}: histories have diverged",
                    remote, branch
                )));
            }
            return self.merge_commit(&upstream, settings, identity, handler);
        }

        Ok(RawMergeResult::new(RawMergeStatus::Unrecognized(format!(
            "{:?}",
            analysis
        ))))
    }

    fn operation_message(&self) -> Option<String> {
        self.repo.message().ok()
    }
}
