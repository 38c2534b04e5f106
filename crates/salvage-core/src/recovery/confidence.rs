/// Confidence scoring for recovery reliability
///
/// Each recovery source has a fixed base score. Evidence gathered while
/// scanning (signature verification, a complete carve, an explicit trash
/// location) moves the score within the range allotted to that source.
use serde::{Deserialize, Serialize};

use crate::RecoverySource;

pub const INDEXED_GHOST: f32 = 0.8;
pub const INDEXED_TRASHED: f32 = 0.95;
pub const LIVE_BASE: f32 = 0.9;
pub const LIVE_VERIFIED: f32 = 0.95;
pub const TRASH_EXPLICIT: f32 = 0.85;
pub const TRASH_CACHE: f32 = 0.6;
pub const DEEP_BASE: f32 = 0.5;
pub const DEEP_COMPLETE: f32 = 0.6;
pub const ROOT_BASE: f32 = 0.6;
pub const ROOT_COMPLETE: f32 = 0.7;

/// What a scanner learned about a candidate
#[derive(Debug, Clone, Copy, Default)]
pub struct Evidence {
    /// Content still exists at the recorded location
    pub content_present: bool,
    /// Signature agrees with the name-derived type
    pub signature_verified: bool,
    /// Found in an explicit trash/recycle location rather than a cache
    pub explicit_trash: bool,
    /// A carve found both ends of the file structure
    pub carve_complete: bool,
}

/// Calculate the confidence score for a candidate found by `source`
pub fn calculate_confidence_score(source: RecoverySource, evidence: &Evidence) -> f32 {
    match source {
        RecoverySource::IndexedMetadata => {
            if evidence.content_present {
                INDEXED_TRASHED
            } else {
                INDEXED_GHOST
            }
        }
        RecoverySource::LiveFilesystem => {
            if evidence.signature_verified {
                LIVE_VERIFIED
            } else {
                LIVE_BASE
            }
        }
        RecoverySource::TrashOrCache => {
            if evidence.explicit_trash {
                TRASH_EXPLICIT
            } else {
                TRASH_CACHE
            }
        }
        RecoverySource::DeepScan => {
            if evidence.carve_complete {
                DEEP_COMPLETE
            } else {
                DEEP_BASE
            }
        }
        RecoverySource::RootScan => {
            if evidence.carve_complete {
                ROOT_COMPLETE
            } else {
                ROOT_BASE
            }
        }
    }
}

/// Coarse bucket for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn of(score: f32) -> Self {
        match score {
            s if s >= 0.8 => ConfidenceBand::High,
            s if s >= 0.6 => ConfidenceBand::Medium,
            _ => ConfidenceBand::Low,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scores_stay_in_source_ranges() {
        let all = [
            Evidence::default(),
            Evidence {
                content_present: true,
                signature_verified: true,
                explicit_trash: true,
                carve_complete: true,
            },
        ];
        for evidence in &all {
            let indexed = calculate_confidence_score(RecoverySource::IndexedMetadata, evidence);
            assert!((0.8..=0.95).contains(&indexed));
            let live = calculate_confidence_score(RecoverySource::LiveFilesystem, evidence);
            assert!((0.9..=0.95).contains(&live));
            let trash = calculate_confidence_score(RecoverySource::TrashOrCache, evidence);
            assert!((0.6..=0.85).contains(&trash));
            for raw in [RecoverySource::DeepScan, RecoverySource::RootScan] {
                let score = calculate_confidence_score(raw, evidence);
                assert!((0.5..=0.7).contains(&score));
            }
        }
    }

    #[test]
    fn test_cache_scores_below_explicit_trash() {
        let cache = calculate_confidence_score(RecoverySource::TrashOrCache, &Evidence::default());
        let trash = calculate_confidence_score(
            RecoverySource::TrashOrCache,
            &Evidence {
                explicit_trash: true,
                ..Default::default()
            },
        );
        assert!(cache < trash);
    }

    #[test]
    fn test_bands() {
        assert_eq!(ConfidenceBand::of(0.95), ConfidenceBand::High);
        assert_eq!(ConfidenceBand::of(0.6), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::of(0.5), ConfidenceBand::Low);
    }
}
