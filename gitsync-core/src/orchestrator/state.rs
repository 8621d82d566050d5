//! Operation phase state machine
//!
//! A fetch or pull walks `Idle → Authenticating → Transferring` and then,
//! for a pull, `Merging` into one of the merge terminals. Cancellation and
//! failure can end the walk from any in-flight phase.

use std::cell::Cell;
use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

/// Where an operation currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationPhase {
    Idle,
    Authenticating,
    Transferring,
    Merging,
    /// Fetch-only operation finished
    Fetched,
    UpToDate,
    FastForward,
    NonFastForward,
    Conflicted,
    Aborted,
    Failed,
}

impl OperationPhase {
    /// Whether no further automatic progress happens from this phase
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationPhase::Fetched
                | OperationPhase::UpToDate
                | OperationPhase::FastForward
                | OperationPhase::NonFastForward
                | OperationPhase::Conflicted
                | OperationPhase::Aborted
                | OperationPhase::Failed
        )
    }

    /// Whether an operation is running in this phase
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            OperationPhase::Authenticating | OperationPhase::Transferring | OperationPhase::Merging
        )
    }

    /// Phases reachable from this one
    pub fn valid_transitions(&self) -> &'static [OperationPhase] {
        use OperationPhase::*;
        match self {
            Idle => &[Authenticating],
            Authenticating => &[Transferring, Aborted, Failed],
            Transferring => &[Merging, Fetched, Aborted, Failed],
            Merging => &[UpToDate, FastForward, NonFastForward, Conflicted, Failed],
            // A terminal phase only leads back to a fresh operation.
            Fetched | UpToDate | FastForward | NonFastForward | Conflicted | Aborted | Failed => {
                &[Authenticating]
            }
        }
    }

    pub fn can_transition_to(&self, to: &OperationPhase) -> bool {
        self.valid_transitions().contains(to)
    }
}

impl fmt::Display for OperationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationPhase::Idle => "idle",
            OperationPhase::Authenticating => "authenticating",
            OperationPhase::Transferring => "transferring",
            OperationPhase::Merging => "merging",
            OperationPhase::Fetched => "fetched",
            OperationPhase::UpToDate => "up to date",
            OperationPhase::FastForward => "fast-forward",
            OperationPhase::NonFastForward => "non-fast-forward",
            OperationPhase::Conflicted => "conflicted",
            OperationPhase::Aborted => "aborted",
            OperationPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks the phase of the operation in flight
///
/// Uses a `Cell` so transport callbacks holding a shared reference can advance it.
#[derive(Debug)]
pub struct PhaseTracker {
    current: Cell<OperationPhase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: Cell::new(OperationPhase::Idle),
        }
    }

    pub fn current(&self) -> OperationPhase {
        self.current.get()
    }

    /// Move to `to`, rejecting transitions the machine does not allow
    pub fn transition_to(&self, to: OperationPhase) -> Result<()> {
        let from = self.current.get();
        if !from.can_transition_to(&to) {
            return Err(Error::Other(format!(
                "Invalid transition from {:?} to {:?}",
                from, to
            )));
        }

        tracing::info!(from = ?from, to = ?to, "Operation phase transition");
        self.current.set(to);
        Ok(())
    }

    /// Move to a terminal phase from wherever the operation stopped
    ///
    /// `Failed` is reachable from every in-flight phase; other terminals go
    /// through the normal transition check first.
    pub fn finish(&self, to: OperationPhase) {
        debug_assert!(to.is_terminal());
        if self.transition_to(to).is_err() {
            tracing::debug!(from = ?self.current.get(), to = ?to, "Forcing terminal phase");
            self.current.set(to);
        }
    }
}
