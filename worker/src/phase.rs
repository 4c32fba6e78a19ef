//! Phase gate: tracks whether a long-running UoW phase is in flight
//!
//! `uow/populate` and `uow/next` ack immediately and run as background
//! tasks; `shard/wait` (barrier phase A) must park until the running phase
//! has finished emitting outbound reify dispatches. With no phase in
//! flight the wait returns immediately.

use tokio::sync::watch;

/// Cooperative gate around a long-running phase.
#[derive(Debug, Clone)]
pub struct PhaseGate {
    // true = idle, false = phase in flight
    state: watch::Sender<bool>,
}

impl PhaseGate {
    /// Gate starting idle.
    pub fn new() -> Self {
        let (state, _) = watch::channel(true);
        Self { state }
    }

    /// Mark a phase as started and return a guard that ends it on drop,
    /// so a panicking phase task cannot wedge the barrier.
    pub fn begin(&self) -> PhaseGuard {
        self.state.send_replace(false);
        PhaseGuard { gate: self.clone() }
    }

    /// True when no phase is running.
    pub fn is_idle(&self) -> bool {
        *self.state.borrow()
    }

    /// Park until the current phase (if any) completes.
    pub async fn wait_idle(&self) {
        let mut rx = self.state.subscribe();
        // cannot fail: self holds the sender for as long as we are waiting
        let _ = rx.wait_for(|idle| *idle).await;
    }

    fn end(&self) {
        self.state.send_replace(true);
    }
}

impl Default for PhaseGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Ends the phase when dropped.
#[derive(Debug)]
pub struct PhaseGuard {
    gate: PhaseGate,
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        self.gate.end();
    }
}
