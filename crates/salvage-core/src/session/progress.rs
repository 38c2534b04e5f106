//! Progress reporting from a scan worker to its caller

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::ScanPhase;

/// One progress notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Overall fraction in `[0, 1]`, never decreasing within a scan
    pub fraction: f32,
    pub phase: ScanPhase,
    pub records_found: usize,
}

impl ScanProgress {
    pub fn phase_label(&self) -> &'static str {
        self.phase.label()
    }
}

pub(crate) type ProgressCallback = Arc<dyn Fn(&ScanProgress) + Send + Sync>;

/// Clamps reported values so the sink only ever sees a non-decreasing sequence
pub struct ProgressTracker {
    callback: Option<ProgressCallback>,
    last: f32,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            last: 0.0,
        }
    }

    pub fn last(&self) -> f32 {
        self.last
    }

    pub fn emit(&mut self, fraction: f32, phase: ScanPhase, records_found: usize) {
        let fraction = fraction.clamp(0.0, 1.0).max(self.last);
        self.last = fraction;
        if let Some(ref callback) = self.callback {
            callback(&ScanProgress {
                fraction,
                phase,
                records_found,
            });
        }
    }

    /// Emit exactly 1.0 for a terminal phase
    pub fn finish(&mut self, phase: ScanPhase, records_found: usize) {
        self.emit(1.0, phase, records_found);
    }

    /// Hand a scanner a view that maps its local `[0, 1]` into `phase`'s span
    ///
    /// `records_before` is the count already found by earlier phases.
    pub fn phase(&mut self, phase: ScanPhase, records_before: usize) -> PhaseProgress<'_> {
        PhaseProgress {
            tracker: self,
            phase,
            records_before,
            records_found: records_before,
        }
    }
}

/// Progress handle given to a single scanner
pub struct PhaseProgress<'a> {
    tracker: &'a mut ProgressTracker,
    phase: ScanPhase,
    records_before: usize,
    records_found: usize,
}

impl PhaseProgress<'_> {
    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    /// Report local completion of the current phase
    pub fn update(&mut self, local: f32) {
        let (start, end) = self.phase.span();
        let fraction = start + (end - start) * local.clamp(0.0, 1.0);
        self.tracker.emit(fraction, self.phase, self.records_found);
    }

    /// Records found so far by the current scanner
    pub fn set_records_found(&mut self, records_found: usize) {
        self.records_found = self.records_before + records_found;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_tracker() -> (ProgressTracker, Arc<Mutex<Vec<f32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let tracker = ProgressTracker::new(Some(Arc::new(move |p: &ScanProgress| {
            sink.lock().unwrap().push(p.fraction);
        })));
        (tracker, seen)
    }

    #[test]
    fn test_progress_never_decreases() {
        let (mut tracker, seen) = recording_tracker();
        tracker.emit(0.5, ScanPhase::TrashOrCache, 0);
        tracker.emit(0.2, ScanPhase::TrashOrCache, 0);
        tracker.finish(ScanPhase::Completed, 0);
        assert_eq!(*seen.lock().unwrap(), vec![0.5, 0.5, 1.0]);
    }

    #[test]
    fn test_phase_progress_maps_into_span() {
        let (mut tracker, seen) = recording_tracker();
        {
            let mut phase = tracker.phase(ScanPhase::LiveFilesystem, 0);
            phase.update(0.0);
            phase.update(0.5);
            phase.update(1.0);
        }
        let seen = seen.lock().unwrap();
        assert!((seen[0] - 0.10).abs() < 1e-6);
        assert!((seen[1] - 0.20).abs() < 1e-6);
        assert!((seen[2] - 0.30).abs() < 1e-6);
    }
}
