use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::watch;

/// Phases one mutation passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationPhase {
    Idle,
    Optimistic,
    InFlight,
    ReconcilingSuccess,
    RollingBack,
    Settled,
}

impl MutationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationPhase::Idle => "idle",
            MutationPhase::Optimistic => "optimistic",
            MutationPhase::InFlight => "in_flight",
            MutationPhase::ReconcilingSuccess => "reconciling_success",
            MutationPhase::RollingBack => "rolling_back",
            MutationPhase::Settled => "settled",
        }
    }

    /// Whether `next` may follow this phase.
    pub fn can_advance_to(self, next: MutationPhase) -> bool {
        use MutationPhase::*;
        matches!(
            (self, next),
            (Idle, Optimistic)
                | (Optimistic, InFlight)
                | (Optimistic, Settled)
                | (InFlight, ReconcilingSuccess)
                | (InFlight, RollingBack)
                | (ReconcilingSuccess, Settled)
                | (RollingBack, Settled)
        )
    }
}

impl fmt::Display for MutationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// View-facing status of one mutation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error(String),
}

/// In-flight count and last outcome of one mutation kind, published over a
/// `watch` channel.
#[derive(Debug)]
pub struct MutationTracker {
    in_flight: AtomicUsize,
    status: watch::Sender<MutationStatus>,
}

impl MutationTracker {
    pub fn new() -> Self {
        let (status, _) = watch::channel(MutationStatus::Idle);
        Self {
            in_flight: AtomicUsize::new(0),
            status,
        }
    }

    pub fn begin(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.status.send_replace(MutationStatus::Pending);
        InFlightGuard {
            tracker: Arc::clone(self),
            outcome: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> MutationStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationStatus> {
        self.status.subscribe()
    }

    /// Clears an error the view has already shown.
    pub fn reset(&self) {
        if !self.is_pending() {
            self.status.send_replace(MutationStatus::Idle);
        }
    }

    fn finish(&self, outcome: MutationStatus) {
        let remaining = self.in_flight.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        // 他の同種ミューテーションが実行中なら Pending のまま。ただしエラーは優先して表示する
        if remaining == 0 || matches!(outcome, MutationStatus::Error(_)) {
            self.status.send_replace(outcome);
        }
    }
}

impl Default for MutationTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts one mutation as in flight until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    tracker: Arc<MutationTracker>,
    outcome: Option<MutationStatus>,
}

impl InFlightGuard {
    pub fn succeed(mut self) {
        self.outcome = Some(MutationStatus::Success);
    }

    pub fn fail(mut self, reason: impl Into<String>) {
        self.outcome = Some(MutationStatus::Error(reason.into()));
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| MutationStatus::Error("mutation aborted".to_string()));
        self.tracker.finish(outcome);
    }
}
