use crate::error::StartError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Idle,
    Initializing,
    Running,
    Stopping,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Idle => "idle",
            RunMode::Initializing => "initializing",
            RunMode::Running => "running",
            RunMode::Stopping => "stopping",
        }
    }

    pub fn can_transition_to(self, next: RunMode) -> bool {
        use RunMode::*;
        matches!(
            (self, next),
            (Idle, Initializing)
                | (Initializing, Running)
                | (Initializing, Idle)
                | (Running, Stopping)
                | (Stopping, Idle)
        )
    }
}

/// Current run mode, locked only for checks and transitions
#[derive(Debug)]
pub struct ModeCell {
    mode: Mutex<RunMode>,
}

impl ModeCell {
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(RunMode::Idle),
        }
    }

    pub fn get(&self) -> RunMode {
        *self.mode.lock()
    }

    /// Claim the start slot: IDLE becomes INITIALIZING atomically
    pub fn claim_start(&self) -> Result<(), StartError> {
        let mut mode = self.mode.lock();
        match *mode {
            RunMode::Idle => {
                *mode = RunMode::Initializing;
                Ok(())
            }
            RunMode::Initializing => Err(StartError::StillInitializing),
            RunMode::Running | RunMode::Stopping => Err(StartError::AlreadyRunning),
        }
    }

    /// Move from `from` to `to`. Returns false when the cell is not in `from`.
    pub fn transition(&self, from: RunMode, to: RunMode) -> bool {
        let mut mode = self.mode.lock();
        if *mode != from {
            return false;
        }
        if !from.can_transition_to(to) {
            error!("Illegal run mode transition {:?} -> {:?}", from, to);
            return false;
        }
        *mode = to;
        true
    }
}

impl Default for ModeCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters kept by the processing loop
#[derive(Debug, Default)]
pub struct LoopMetrics {
    pub(super) frames_captured: AtomicU64,
    pub(super) detection_cycles: AtomicU64,
    pub(super) detection_failures: AtomicU64,
    pub(super) consecutive_failures: AtomicU64,
    pub(super) source_errors: AtomicU64,
    pub(super) snapshots_published: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopMetricsSnapshot {
    pub frames_captured: u64,
    pub detection_cycles: u64,
    pub detection_failures: u64,
    pub consecutive_failures: u64,
    pub source_errors: u64,
    pub snapshots_published: u64,
}

impl LoopMetrics {
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        LoopMetricsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            detection_cycles: self.detection_cycles.load(Ordering::Relaxed),
            detection_failures: self.detection_failures.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
            snapshots_published: self.snapshots_published.load(Ordering::Relaxed),
        }
    }

    pub(super) fn reset(&self) {
        for counter in [
            &self.frames_captured,
            &self.detection_cycles,
            &self.detection_failures,
            &self.consecutive_failures,
            &self.source_errors,
            &self.snapshots_published,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub(super) fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use RunMode::*;
        assert!(Idle.can_transition_to(Initializing));
        assert!(Initializing.can_transition_to(Running));
        assert!(Initializing.can_transition_to(Idle));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Idle));

        assert!(!Idle.can_transition_to(Running));
        assert!(!Running.can_transition_to(Idle));
        assert!(!Stopping.can_transition_to(Running));
    }

    #[test]
    fn test_claim_start_rejections() {
        let cell = ModeCell::new();
        assert!(cell.claim_start().is_ok());
        assert_eq!(cell.claim_start(), Err(StartError::StillInitializing));

        assert!(cell.transition(RunMode::Initializing, RunMode::Running));
        assert_eq!(cell.claim_start(), Err(StartError::AlreadyRunning));

        assert!(cell.transition(RunMode::Running, RunMode::Stopping));
        assert_eq!(cell.claim_start(), Err(StartError::AlreadyRunning));
    }

    #[test]
    fn test_transition_requires_expected_mode() {
        let cell = ModeCell::new();
        assert!(!cell.transition(RunMode::Running, RunMode::Stopping));
        assert!(!cell.transition(RunMode::Idle, RunMode::Running));
        assert_eq!(cell.get(), RunMode::Idle);
    }
}
