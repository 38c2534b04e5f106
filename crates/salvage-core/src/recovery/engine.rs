//! Scan orchestration: run scanners in priority order, then merge and rank
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::error::{ErrorKind, ScanError};
use crate::recovery::confidence::ConfidenceBand;
use crate::scanners::{default_scanners, ScanConfig, ScanContext, ScanRoots, SourceScanner};
use crate::session::progress::ProgressCallback;
use crate::session::{
    CancellationToken, ProgressTracker, ScanPhase, ScanProgress, ScanSession, ScannerFailure,
};
use crate::{FileCategory, RecoverableRecord, RecoverySource};

/// Scan engine
pub struct ScanEngine {
    config: ScanConfig,
    scanners: Option<Vec<Box<dyn SourceScanner>>>,
    progress_callback: Option<ProgressCallback>,
    cancel: CancellationToken,
}

/// Result of one full scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub has_root_access: bool,
    /// The scan stopped early; `records` holds what was merged so far
    pub cancelled: bool,
    /// Deduplicated, ordered by confidence descending
    pub records: Vec<RecoverableRecord>,
    pub statistics: ScanStatistics,
    pub failures: Vec<ScannerFailure>,
}

impl ScanReport {
    pub fn record(&self, id: Uuid) -> Option<&RecoverableRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Records matching any of `categories` (all when empty) at or above `min_confidence`
    pub fn select(&self, categories: &[FileCategory], min_confidence: f32) -> Vec<&RecoverableRecord> {
        self.records
            .iter()
            .filter(|r| categories.is_empty() || categories.contains(&r.category()))
            .filter(|r| r.confidence >= min_confidence)
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStatistics {
    pub total_files: usize,
    pub total_size: u64,
    pub high_confidence_files: usize,
    pub medium_confidence_files: usize,
    pub low_confidence_files: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
}

impl ScanStatistics {
    pub fn from_records(records: &[RecoverableRecord]) -> Self {
        let mut stats = ScanStatistics::default();

        for record in records {
            stats.total_files += 1;
            stats.total_size += record.size_bytes;

            match ConfidenceBand::of(record.confidence) {
                ConfidenceBand::High => stats.high_confidence_files += 1,
                ConfidenceBand::Medium => stats.medium_confidence_files += 1,
                ConfidenceBand::Low => stats.low_confidence_files += 1,
            }

            *stats
                .by_category
                .entry(record.category().name().to_string())
                .or_default() += 1;
            *stats
                .by_source
                .entry(record.recovery_source.to_string())
                .or_default() += 1;
        }

        stats
    }
}

fn phase_for(source: RecoverySource) -> ScanPhase {
    match source {
        RecoverySource::IndexedMetadata => ScanPhase::IndexedMetadata,
        RecoverySource::LiveFilesystem => ScanPhase::LiveFilesystem,
        RecoverySource::TrashOrCache => ScanPhase::TrashOrCache,
        RecoverySource::DeepScan => ScanPhase::DeepScan,
        RecoverySource::RootScan => ScanPhase::RootScan,
    }
}

/// Merge scanner output into the final ranked list
///
/// Records arrive in scanner priority order. RootScan records are dropped
/// without root access, the first record per source key wins, records with
/// no source are never merged, and the stable sort keeps discovery order
/// among equal confidences.
pub fn merge_records(
    records: Vec<RecoverableRecord>,
    has_root_access: bool,
    min_confidence: f32,
) -> Vec<RecoverableRecord> {
    let mut seen = HashSet::new();
    let mut merged: Vec<RecoverableRecord> = records
        .into_iter()
        .filter(|r| has_root_access || r.recovery_source != RecoverySource::RootScan)
        .filter(|r| match r.source_key() {
            Some(key) => seen.insert(key),
            None => true,
        })
        .filter(|r| r.confidence >= min_confidence)
        .collect();

    merged.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    merged
}

impl ScanEngine {
    /// Engine that builds the default scanner set from the roots of each scan
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            scanners: None,
            progress_callback: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Engine with an explicit scanner set; roots are then only recorded in the session
    pub fn with_scanners(config: ScanConfig, scanners: Vec<Box<dyn SourceScanner>>) -> Self {
        Self {
            scanners: Some(scanners),
            ..Self::new(config)
        }
    }

    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: Fn(&ScanProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
    }

    pub fn set_cancellation_token(&mut self, cancel: CancellationToken) {
        self.cancel = cancel;
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Execute a full scan
    pub fn perform_full_scan(&mut self, roots: &ScanRoots, has_root_access: bool) -> ScanReport {
        let clock = Instant::now();
        let mut session = ScanSession::new(roots.clone(), has_root_access);
        let mut tracker = ProgressTracker::new(self.progress_callback.clone());
        tracker.emit(0.0, ScanPhase::Initialization, 0);

        tracing::info!(
            "Starting scan {} (root access: {})",
            session.id,
            has_root_access
        );

        let defaults;
        let scanners: &[Box<dyn SourceScanner>] = match &self.scanners {
            Some(scanners) => scanners,
            None => {
                defaults = default_scanners(roots);
                &defaults
            }
        };

        let mut ordered: Vec<&dyn SourceScanner> = scanners.iter().map(|s| s.as_ref()).collect();
        ordered.sort_by_key(|s| s.source());

        for scanner in ordered {
            if self.cancel.is_cancelled() {
                break;
            }

            let source = scanner.source();
            if source == RecoverySource::RootScan && !has_root_access {
                tracing::info!("Skipping {}: no root access", scanner.name());
                continue;
            }

            let phase = phase_for(source);
            session.phase = phase;
            let before = session.records.len();
            tracker.emit(phase.span().0, phase, before);

            let result = {
                let mut ctx = ScanContext {
                    config: &self.config,
                    cancel: &self.cancel,
                    progress: tracker.phase(phase, before),
                };
                scanner.scan(&mut ctx)
            };

            match result {
                Ok(records) => {
                    let produced = records.len();
                    let (valid, mislabeled): (Vec<_>, Vec<_>) = records
                        .into_iter()
                        .partition(|r| r.recovery_source == source);
                    if !mislabeled.is_empty() {
                        tracing::warn!(
                            "{} returned {} records claiming another source, dropped",
                            scanner.name(),
                            mislabeled.len()
                        );
                        session.failures.push(ScannerFailure {
                            scanner: scanner.name().to_string(),
                            kind: ErrorKind::MislabeledRecords,
                            message: format!(
                                "{} of {} records did not come from {}",
                                mislabeled.len(),
                                produced,
                                source
                            ),
                        });
                    }
                    tracing::debug!("{} produced {} records", scanner.name(), valid.len());
                    session.records.extend(valid);
                }
                // Built-in scanners keep partial results on cancel; others may bail out
                Err(ScanError::Cancelled) => {
                    tracing::debug!("{} cancelled", scanner.name());
                }
                Err(e) => {
                    tracing::warn!("Scanner {} failed: {}", scanner.name(), e);
                    session.failures.push(ScannerFailure {
                        scanner: scanner.name().to_string(),
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }

            tracker.emit(phase.span().1, phase, session.records.len());
        }

        session.phase = ScanPhase::Merging;
        tracker.emit(ScanPhase::Merging.span().0, ScanPhase::Merging, session.records.len());

        let records = merge_records(
            std::mem::take(&mut session.records),
            has_root_access,
            self.config.min_confidence,
        );
        tracker.emit(ScanPhase::Merging.span().1, ScanPhase::Merging, records.len());

        let cancelled = self.cancel.is_cancelled();
        session.phase = if cancelled {
            ScanPhase::Cancelled
        } else {
            ScanPhase::Completed
        };
        tracker.finish(session.phase, records.len());
        session.progress = tracker.last();

        let statistics = ScanStatistics::from_records(&records);
        tracing::info!(
            "Scan {} {}: {} records ({} high confidence), {} scanner failures",
            session.id,
            session.phase,
            records.len(),
            statistics.high_confidence_files,
            session.failures.len()
        );

        ScanReport {
            session_id: session.id,
            started_at: session.started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
            has_root_access,
            cancelled,
            records,
            statistics,
            failures: session.failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceLocation;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct StubScanner {
        source: RecoverySource,
        records: Vec<RecoverableRecord>,
        fail: bool,
        bail_on_cancel: bool,
        cancel_after: Option<CancellationToken>,
        ran: Arc<AtomicBool>,
    }

    impl StubScanner {
        fn new(source: RecoverySource, records: Vec<RecoverableRecord>) -> Self {
            Self {
                source,
                records,
                fail: false,
                bail_on_cancel: false,
                cancel_after: None,
                ran: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl SourceScanner for StubScanner {
        fn name(&self) -> &str {
            "stub"
        }

        fn source(&self) -> RecoverySource {
            self.source
        }

        fn scan(&self, ctx: &mut ScanContext<'_>) -> Result<Vec<RecoverableRecord>, ScanError> {
            self.ran.store(true, Ordering::SeqCst);
            ctx.progress.update(0.5);
            ctx.progress.update(1.0);
            if let Some(ref cancel) = self.cancel_after {
                cancel.cancel();
                if self.bail_on_cancel {
                    return Err(ScanError::Cancelled);
                }
            }
            if self.fail {
                return Err(ScanError::unavailable("stub", "index locked"));
            }
            Ok(self.records.clone())
        }
    }

    fn record(path: &str, source: RecoverySource, confidence: f32) -> RecoverableRecord {
        RecoverableRecord::new(
            path.rsplit('/').next().unwrap_or(path),
            Some(SourceLocation::File(PathBuf::from(path))),
            source,
            confidence,
        )
    }

    fn scan(scanners: Vec<Box<dyn SourceScanner>>, has_root: bool) -> ScanReport {
        ScanEngine::with_scanners(ScanConfig::default(), scanners)
            .perform_full_scan(&ScanRoots::default(), has_root)
    }

    #[test]
    fn test_duplicate_source_keeps_higher_priority_scanner() {
        // Registered lowest priority first to prove the engine reorders
        let report = scan(
            vec![
                Box::new(StubScanner::new(
                    RecoverySource::TrashOrCache,
                    vec![record("/sdcard/a.jpg", RecoverySource::TrashOrCache, 0.85)],
                )),
                Box::new(StubScanner::new(
                    RecoverySource::LiveFilesystem,
                    vec![record("/sdcard/a.jpg", RecoverySource::LiveFilesystem, 0.9)],
                )),
            ],
            false,
        );

        assert_eq!(report.records.len(), 1);
        assert_eq!(
            report.records[0].recovery_source,
            RecoverySource::LiveFilesystem
        );
    }

    #[test]
    fn test_priority_wins_even_with_lower_confidence() {
        let report = scan(
            vec![
                Box::new(StubScanner::new(
                    RecoverySource::IndexedMetadata,
                    vec![record("/sdcard/b.png", RecoverySource::IndexedMetadata, 0.8)],
                )),
                Box::new(StubScanner::new(
                    RecoverySource::LiveFilesystem,
                    vec![record("/sdcard/b.png", RecoverySource::LiveFilesystem, 0.95)],
                )),
            ],
            false,
        );
        assert_eq!(report.records.len(), 1);
        assert_eq!(
            report.records[0].recovery_source,
            RecoverySource::IndexedMetadata
        );
    }

    #[test]
    fn test_ranking_is_descending_and_stable() {
        let report = scan(
            vec![Box::new(StubScanner::new(
                RecoverySource::LiveFilesystem,
                vec![
                    record("/a", RecoverySource::LiveFilesystem, 0.9),
                    record("/b", RecoverySource::LiveFilesystem, 0.95),
                    record("/c", RecoverySource::LiveFilesystem, 0.9),
                ],
            ))],
            false,
        );
        let names: Vec<&str> = report.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_records_without_source_are_never_merged() {
        let orphan = || RecoverableRecord::new("orphan", None, RecoverySource::DeepScan, 0.5);
        let report = scan(
            vec![Box::new(StubScanner::new(
                RecoverySource::DeepScan,
                vec![orphan(), orphan()],
            ))],
            false,
        );
        assert_eq!(report.records.len(), 2);
    }

    #[test]
    fn test_root_scan_is_gated_on_root_access() {
        let root = StubScanner::new(
            RecoverySource::RootScan,
            vec![record("/dev/block/sda@0", RecoverySource::RootScan, 0.7)],
        );
        let ran = Arc::clone(&root.ran);
        let report = scan(vec![Box::new(root)], false);
        assert!(!ran.load(Ordering::SeqCst));
        assert!(report.records.is_empty());

        let root = StubScanner::new(
            RecoverySource::RootScan,
            vec![record("/dev/block/sda@0", RecoverySource::RootScan, 0.7)],
        );
        let report = scan(vec![Box::new(root)], true);
        assert_eq!(report.records.len(), 1);
    }

    #[test]
    fn test_failing_scanner_does_not_abort_scan() {
        let mut broken = StubScanner::new(RecoverySource::IndexedMetadata, Vec::new());
        broken.fail = true;
        let report = scan(
            vec![
                Box::new(broken),
                Box::new(StubScanner::new(
                    RecoverySource::LiveFilesystem,
                    vec![record("/sdcard/c.mp4", RecoverySource::LiveFilesystem, 0.9)],
                )),
            ],
            false,
        );

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, crate::ErrorKind::ScannerUnavailable);
        assert!(!report.cancelled);
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_at_one() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut engine = ScanEngine::with_scanners(
            ScanConfig::default(),
            vec![
                Box::new(StubScanner::new(RecoverySource::IndexedMetadata, Vec::new())),
                Box::new(StubScanner::new(
                    RecoverySource::TrashOrCache,
                    vec![record("/t", RecoverySource::TrashOrCache, 0.6)],
                )),
            ],
        );
        engine.set_progress_callback(move |p| sink.lock().unwrap().push((p.fraction, p.phase)));
        engine.perform_full_scan(&ScanRoots::default(), false);

        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
        let (last_fraction, last_phase) = *seen.last().unwrap();
        assert_eq!(last_fraction, 1.0);
        assert_eq!(last_phase, ScanPhase::Completed);
        assert_eq!(seen.iter().filter(|(f, _)| *f == 1.0).count(), 1);
    }

    #[test]
    fn test_cancellation_returns_partial_results() {
        let cancel = CancellationToken::new();
        let mut first = StubScanner::new(
            RecoverySource::LiveFilesystem,
            vec![record("/sdcard/d.jpg", RecoverySource::LiveFilesystem, 0.9)],
        );
        first.cancel_after = Some(cancel.clone());
        let second = StubScanner::new(
            RecoverySource::TrashOrCache,
            vec![record("/sdcard/e.jpg", RecoverySource::TrashOrCache, 0.85)],
        );
        let second_ran = Arc::clone(&second.ran);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut engine =
            ScanEngine::with_scanners(ScanConfig::default(), vec![Box::new(first), Box::new(second)]);
        engine.set_cancellation_token(cancel);
        engine.set_progress_callback(move |p| sink.lock().unwrap().push((p.fraction, p.phase)));
        let report = engine.perform_full_scan(&ScanRoots::default(), false);

        assert!(report.cancelled);
        assert!(!second_ran.load(Ordering::SeqCst));
        assert_eq!(report.records.len(), 1);
        assert_eq!(*seen.lock().unwrap().last().unwrap(), (1.0, ScanPhase::Cancelled));
    }

    #[test]
    fn test_scanner_bailing_on_cancel_is_not_a_failure() {
        let cancel = CancellationToken::new();
        let mut scanner = StubScanner::new(
            RecoverySource::LiveFilesystem,
            vec![record("/sdcard/f.jpg", RecoverySource::LiveFilesystem, 0.9)],
        );
        scanner.cancel_after = Some(cancel.clone());
        scanner.bail_on_cancel = true;

        let mut engine = ScanEngine::with_scanners(ScanConfig::default(), vec![Box::new(scanner)]);
        engine.set_cancellation_token(cancel);
        let report = engine.perform_full_scan(&ScanRoots::default(), false);

        assert!(report.cancelled);
        assert!(report.records.is_empty());
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_mislabeled_records_are_dropped_not_relabeled() {
        let report = scan(
            vec![Box::new(StubScanner::new(
                RecoverySource::LiveFilesystem,
                vec![
                    record("/sdcard/g.jpg", RecoverySource::LiveFilesystem, 0.9),
                    record("/cache/h.bin", RecoverySource::TrashOrCache, 0.6),
                ],
            ))],
            false,
        );

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].name, "g.jpg");
        assert_eq!(report.records[0].recovery_source, RecoverySource::LiveFilesystem);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, ErrorKind::MislabeledRecords);
    }

    #[test]
    fn test_min_confidence_filters_after_dedup() {
        let mut config = ScanConfig::default();
        config.min_confidence = 0.7;
        let report = ScanEngine::with_scanners(
            config,
            vec![Box::new(StubScanner::new(
                RecoverySource::TrashOrCache,
                vec![
                    record("/cache/x", RecoverySource::TrashOrCache, 0.6),
                    record("/trash/y", RecoverySource::TrashOrCache, 0.85),
                ],
            ))],
        )
        .perform_full_scan(&ScanRoots::default(), false);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].name, "y");
    }

    #[test]
    fn test_statistics_bucket_by_band_and_source() {
        let records = vec![
            record("/a.jpg", RecoverySource::LiveFilesystem, 0.95),
            record("/b.bin", RecoverySource::TrashOrCache, 0.6),
            record("/c.bin", RecoverySource::DeepScan, 0.5),
        ];
        let stats = ScanStatistics::from_records(&records);
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.high_confidence_files, 1);
        assert_eq!(stats.medium_confidence_files, 1);
        assert_eq!(stats.low_confidence_files, 1);
        assert_eq!(stats.by_source.get("deep scan"), Some(&1));
    }
}
