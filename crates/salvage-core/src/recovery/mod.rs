//! Classification, carving, scan orchestration and recovery execution
pub mod carver;
pub mod confidence;
pub mod engine;
pub mod executor;
pub mod signatures;

pub use carver::{carve_at, scan_buffer, CarveOptions, CarvedRegion};

pub use confidence::{calculate_confidence_score, ConfidenceBand, Evidence};

pub use signatures::{
    classify, classify_by_extension, classify_by_mime, classify_by_signature, Classification,
    FileSignature,
};

pub use engine::{merge_records, ScanEngine, ScanReport, ScanStatistics};

pub use executor::{RecoveryConfig, RecoveryExecutor, RecoveryState};
