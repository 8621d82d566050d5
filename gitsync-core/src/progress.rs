//! Progress reporting for network and checkout work
//!
//! Progress is pushed to a [`ProgressSink`] from the thread driving the
//! operation. [`ChannelProgressSink`] forwards events over an unbounded tokio
//! channel so a single consumer elsewhere sees them in order, none dropped.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::orchestrator::OperationPhase;

/// Fraction of `completed` over `total`, in `0.0..=1.0`
///
/// A zero total reports no progress rather than dividing by zero.
pub fn fraction(completed: usize, total: usize) -> f32 {
    if total == 0 {
        return 0.0;
    }
    (completed as f32 / total as f32).clamp(0.0, 1.0)
}

/// Snapshot of a running fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferProgress {
    pub received_objects: usize,
    pub total_objects: usize,
    pub received_bytes: usize,
    pub indexed_objects: usize,
}

impl TransferProgress {
    pub fn fraction(&self) -> f32 {
        fraction(self.received_objects, self.total_objects)
    }

    /// Whole-number percentage, 0 when the total is unknown
    pub fn percent(&self) -> u8 {
        (self.fraction() * 100.0).round() as u8
    }

    /// All announced objects have arrived
    pub fn is_complete(&self) -> bool {
        self.total_objects > 0 && self.received_objects == self.total_objects
    }
}

impl From<git2::Progress<'_>> for TransferProgress {
    fn from(p: git2::Progress<'_>) -> Self {
        Self {
            received_objects: p.received_objects(),
            total_objects: p.total_objects(),
            received_bytes: p.received_bytes(),
            indexed_objects: p.indexed_objects(),
        }
    }
}

/// Snapshot of a running checkout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckoutProgress {
    pub path: Option<String>,
    pub completed: usize,
    pub total: usize,
}

impl CheckoutProgress {
    pub fn fraction(&self) -> f32 {
        fraction(self.completed, self.total)
    }
}

/// Everything an operation reports while it runs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// The operation moved to a new phase
    Phase { phase: OperationPhase },
    /// Object transfer counters
    Transfer(TransferProgress),
    /// Sideband text from the server
    Remote { message: String },
    /// Working tree checkout counters
    Checkout(CheckoutProgress),
    /// The progress display should be torn down
    Cleared,
}

/// Receiver of progress events
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);

    /// Release whatever progress display the sink holds
    fn clear(&self) {}
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn report(&self, _event: ProgressEvent) {}
}

/// Forwards events to a single consumer over a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressSink {
    /// Create a sink and the receiver that drains it
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn report(&self, event: ProgressEvent) {
        // A dropped receiver means nobody is watching any more.
        let _ = self.tx.send(event);
    }

    fn clear(&self) {
        let _ = self.tx.send(ProgressEvent::Cleared);
    }
}

/// Clears the sink when dropped, on every exit path
pub struct ProgressGuard {
    sink: Arc<dyn ProgressSink>,
}

impl ProgressGuard {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self { sink }
    }
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        self.sink.clear();
    }
}
