//! Recompute channel and debounce.
//!
//! Each engine owns exactly one channel carrying a unit `RecomputeRequested`
//! message. Any collaborator holding a [`RecomputeSignal`] can raise it. The
//! receiving side waits for a burst to go quiet for the debounce window, so a
//! pending recompute is always superseded by a newer request instead of running
//! twice.

use std::time::Duration;

use tokio::sync::mpsc;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// The parameter-less "recompute requested" message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecomputeRequested;

/// Sending half handed to collaborators (spacing controller, editor, resize handler).
#[derive(Debug, Clone)]
pub struct RecomputeSignal {
    tx: mpsc::UnboundedSender<RecomputeRequested>,
}

impl RecomputeSignal {
    /// Raises the signal. Returns false once the engine has shut down.
    pub fn request(&self) -> bool {
        self.tx.send(RecomputeRequested).is_ok()
    }
}

pub fn recompute_channel() -> (RecomputeSignal, mpsc::UnboundedReceiver<RecomputeRequested>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RecomputeSignal { tx }, rx)
}

/// Waits for a request, then absorbs further requests until none arrives for
/// `debounce`. Returns false when the channel closed with nothing pending.
pub async fn next_debounced(
    rx: &mut mpsc::UnboundedReceiver<RecomputeRequested>,
    debounce: Duration,
) -> bool {
    if rx.recv().await.is_none() {
        return false;
    }
    loop {
        match tokio::time::timeout(debounce, rx.recv()).await {
            Ok(Some(RecomputeRequested)) => continue,
            Ok(None) | Err(_) => return true,
        }
    }
}
