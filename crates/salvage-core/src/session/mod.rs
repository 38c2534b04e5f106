//! Ephemeral per-scan state
//!
//! A `ScanSession` lives exactly as long as one `perform_full_scan` call. Nothing
//! here is persisted; callers that want to keep results serialize the final
//! `ScanReport` themselves.

pub mod progress;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use uuid::Uuid;

use crate::recovery::ScanReport;
use crate::scanners::ScanRoots;
use crate::RecoverableRecord;

pub use progress::{PhaseProgress, ProgressTracker, ScanProgress};

/// Cooperative cancellation flag shared between a caller and a scan worker
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Stage of a full scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanPhase {
    Initialization,
    IndexedMetadata,
    LiveFilesystem,
    TrashOrCache,
    DeepScan,
    RootScan,
    Merging,
    Completed,
    Cancelled,
}

impl ScanPhase {
    pub fn label(&self) -> &'static str {
        match self {
            ScanPhase::Initialization => "initializing",
            ScanPhase::IndexedMetadata => "scanning media index",
            ScanPhase::LiveFilesystem => "scanning storage",
            ScanPhase::TrashOrCache => "scanning trash and cache",
            ScanPhase::DeepScan => "deep scan",
            ScanPhase::RootScan => "root scan",
            ScanPhase::Merging => "merging results",
            ScanPhase::Completed => "completed",
            ScanPhase::Cancelled => "cancelled",
        }
    }

    /// Slice of the overall `[0, 1]` progress range owned by this phase
    pub fn span(&self) -> (f32, f32) {
        match self {
            ScanPhase::Initialization => (0.0, 0.0),
            ScanPhase::IndexedMetadata => (0.0, 0.10),
            ScanPhase::LiveFilesystem => (0.10, 0.30),
            ScanPhase::TrashOrCache => (0.30, 0.60),
            ScanPhase::DeepScan => (0.60, 0.75),
            ScanPhase::RootScan => (0.75, 0.85),
            ScanPhase::Merging => (0.85, 0.95),
            ScanPhase::Completed | ScanPhase::Cancelled => (1.0, 1.0),
        }
    }
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A scanner that failed during a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerFailure {
    pub scanner: String,
    pub kind: crate::ErrorKind,
    pub message: String,
}

/// Aggregate state for one scan invocation
#[derive(Debug)]
pub struct ScanSession {
    pub id: Uuid,
    pub roots: ScanRoots,
    pub has_root_access: bool,
    pub started_at: DateTime<Utc>,
    pub records: Vec<RecoverableRecord>,
    pub progress: f32,
    pub phase: ScanPhase,
    pub failures: Vec<ScannerFailure>,
}

impl ScanSession {
    pub fn new(roots: ScanRoots, has_root_access: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            roots,
            has_root_access,
            started_at: Utc::now(),
            records: Vec::new(),
            progress: 0.0,
            phase: ScanPhase::Initialization,
            failures: Vec::new(),
        }
    }
}

/// A scan running on its own worker thread
pub struct ScanHandle {
    cancel: CancellationToken,
    join: JoinHandle<ScanReport>,
}

impl ScanHandle {
    pub(crate) fn new(cancel: CancellationToken, join: JoinHandle<ScanReport>) -> Self {
        Self { cancel, join }
    }

    /// Request cancellation; the worker stops at its next checkpoint
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the worker and take its report
    pub fn join(self) -> std::thread::Result<ScanReport> {
        self.join.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let worker = token.clone();
        assert!(!worker.is_cancelled());
        token.cancel();
        assert!(worker.is_cancelled());
    }

    #[test]
    fn test_phase_spans_are_ordered() {
        let phases = [
            ScanPhase::IndexedMetadata,
            ScanPhase::LiveFilesystem,
            ScanPhase::TrashOrCache,
            ScanPhase::DeepScan,
            ScanPhase::RootScan,
            ScanPhase::Merging,
            ScanPhase::Completed,
        ];
        for pair in phases.windows(2) {
            let (_, end) = pair[0].span();
            let (start, _) = pair[1].span();
            assert!(end <= start, "{:?} overlaps {:?}", pair[0], pair[1]);
        }
    }
}
