/// Source scanners and their shared configuration
///
/// Every scanner is an independent strategy behind `SourceScanner`; the
/// engine only knows the trait, so a platform can swap in its own media
/// index or raw device access without touching the orchestration.
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod common;
pub mod deep;
pub mod indexed;
pub mod live;
pub mod root;
pub mod trash;

use crate::error::ScanError;
use crate::recovery::carver::CarveOptions;
use crate::session::{CancellationToken, PhaseProgress};
use crate::{RecoverableRecord, RecoverySource};

pub use common::BlockDevice;
pub use deep::DeepScanScanner;
pub use indexed::{IndexEntry, IndexedMetadataScanner, MediaIndex, SqliteMediaIndex};
pub use live::LiveFilesystemScanner;
pub use root::RootScanScanner;
pub use trash::TrashOrCacheScanner;

/// Locations to scan, supplied by platform configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanRoots {
    /// MediaStore-style SQLite databases
    pub media_indexes: Vec<PathBuf>,
    /// Public media and app-private directories walked as a live inventory
    pub live_dirs: Vec<PathBuf>,
    /// Explicit trash / recycle directories
    pub trash_dirs: Vec<PathBuf>,
    /// Cache and temp directories
    pub cache_dirs: Vec<PathBuf>,
    /// Directories whose files are carved for embedded content
    pub deep_dirs: Vec<PathBuf>,
    /// Raw block devices or disk images, carved only with root access
    pub devices: Vec<PathBuf>,
}

impl ScanRoots {
    pub fn is_empty(&self) -> bool {
        self.media_indexes.is_empty()
            && self.live_dirs.is_empty()
            && self.trash_dirs.is_empty()
            && self.cache_dirs.is_empty()
            && self.deep_dirs.is_empty()
            && self.devices.is_empty()
    }
}

/// Tunables shared by all scanners
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directory levels below each root visited by walks
    pub max_depth: usize,
    /// Cache files below this size are placeholders or logs
    pub cache_min_size: u64,
    pub sector_size: usize,
    pub max_carve_size: usize,
    /// Leading bytes read from each file for signature checks
    pub header_probe_len: usize,
    /// Records below this confidence are dropped from the report
    pub min_confidence: f32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            cache_min_size: 1024,
            sector_size: 512,
            max_carve_size: 64 * 1024 * 1024, // 64MB
            header_probe_len: crate::recovery::signatures::HEADER_PROBE_LEN,
            min_confidence: 0.0,
        }
    }
}

impl ScanConfig {
    pub(crate) fn carve_options(&self, skip_leading: bool) -> CarveOptions {
        CarveOptions {
            sector_size: self.sector_size,
            max_carve_size: self.max_carve_size,
            skip_leading,
        }
    }
}

/// Everything a scanner may touch while it runs
pub struct ScanContext<'a> {
    pub config: &'a ScanConfig,
    pub cancel: &'a CancellationToken,
    pub progress: PhaseProgress<'a>,
}

/// One scanning strategy
pub trait SourceScanner: Send + Sync {
    fn name(&self) -> &str;

    /// Provenance every record from this scanner must carry
    fn source(&self) -> RecoverySource;

    /// Collect candidates. Unreadable subtrees are skipped internally; an
    /// error means the whole source could not be scanned.
    fn scan(&self, ctx: &mut ScanContext<'_>) -> Result<Vec<RecoverableRecord>, ScanError>;
}

/// Platform check for elevated access; gates RootScan
pub trait RootProbe {
    fn has_root_access(&self) -> bool;
}

/// A probe with a fixed answer
impl RootProbe for bool {
    fn has_root_access(&self) -> bool {
        *self
    }
}

/// Build the canonical scanner set for `roots`, in priority order
pub fn default_scanners(roots: &ScanRoots) -> Vec<Box<dyn SourceScanner>> {
    let indexes = roots
        .media_indexes
        .iter()
        .map(|path| Box::new(SqliteMediaIndex::new(path.clone())) as Box<dyn MediaIndex>)
        .collect();

    vec![
        Box::new(IndexedMetadataScanner::new(indexes)),
        Box::new(LiveFilesystemScanner::new(roots.live_dirs.clone())),
        Box::new(TrashOrCacheScanner::new(
            roots.trash_dirs.clone(),
            roots.cache_dirs.clone(),
        )),
        Box::new(DeepScanScanner::new(roots.deep_dirs.clone())),
        Box::new(RootScanScanner::new(roots.devices.clone())),
    ]
}
