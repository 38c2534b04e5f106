use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use uuid::Uuid;

pub mod error;
pub mod forensics;
pub mod recovery;
pub mod scanners;
pub mod session;

pub use error::{ErrorKind, RecoveryError, ScanError};

// Re-export key recovery types
pub use recovery::{
    classify, Classification, RecoveryConfig, RecoveryExecutor, RecoveryState, ScanEngine,
    ScanReport, ScanStatistics,
};
pub use scanners::{RootProbe, ScanConfig, ScanContext, ScanRoots, SourceScanner};
pub use session::{CancellationToken, ScanHandle, ScanPhase, ScanProgress};

/// Semantic kind of a recoverable file
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Jpeg,
    Png,
    Gif,
    Mp4,
    Mp3,
    Pdf,
    Zip,
    Doc,
    Docx,
    Xls,
    Xlsx,
    /// Image of a format without its own variant
    Image,
    Video,
    Audio,
    Document,
    #[default]
    Unknown,
}

impl FileType {
    pub fn mime_type(&self) -> &'static str {
        match self {
            FileType::Jpeg => "image/jpeg",
            FileType::Png => "image/png",
            FileType::Gif => "image/gif",
            FileType::Mp4 => "video/mp4",
            FileType::Mp3 => "audio/mpeg",
            FileType::Pdf => "application/pdf",
            FileType::Zip => "application/zip",
            FileType::Doc => "application/msword",
            FileType::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            FileType::Xls => "application/vnd.ms-excel",
            FileType::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            FileType::Image => "image/*",
            FileType::Video => "video/*",
            FileType::Audio => "audio/*",
            FileType::Document => "application/octet-stream",
            FileType::Unknown => "application/octet-stream",
        }
    }

    /// Extension used when a record has no name of its own
    pub fn default_extension(&self) -> &'static str {
        match self {
            FileType::Jpeg => "jpg",
            FileType::Png => "png",
            FileType::Gif => "gif",
            FileType::Mp4 => "mp4",
            FileType::Mp3 => "mp3",
            FileType::Pdf => "pdf",
            FileType::Zip => "zip",
            FileType::Doc => "doc",
            FileType::Docx => "docx",
            FileType::Xls => "xls",
            FileType::Xlsx => "xlsx",
            _ => "bin",
        }
    }

    pub fn category(&self) -> FileCategory {
        match self {
            FileType::Jpeg | FileType::Png | FileType::Gif | FileType::Image => {
                FileCategory::Photos
            }
            FileType::Mp4 | FileType::Video => FileCategory::Videos,
            FileType::Mp3 | FileType::Audio => FileCategory::Audio,
            FileType::Pdf
            | FileType::Doc
            | FileType::Docx
            | FileType::Xls
            | FileType::Xlsx
            | FileType::Document => FileCategory::Documents,
            FileType::Zip => FileCategory::Archives,
            FileType::Unknown => FileCategory::Other,
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// Coarse grouping used to filter results ("photos", "videos", ...)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Photos,
    Videos,
    Audio,
    Documents,
    Archives,
    Other,
}

impl FileCategory {
    pub fn all() -> [FileCategory; 6] {
        [
            FileCategory::Photos,
            FileCategory::Videos,
            FileCategory::Audio,
            FileCategory::Documents,
            FileCategory::Archives,
            FileCategory::Other,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            FileCategory::Photos => "photos",
            FileCategory::Videos => "videos",
            FileCategory::Audio => "audio",
            FileCategory::Documents => "documents",
            FileCategory::Archives => "archives",
            FileCategory::Other => "other",
        }
    }
}

impl std::str::FromStr for FileCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileCategory::all()
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}

/// Provenance of a record; the declaration order is the scanner priority
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecoverySource {
    IndexedMetadata,
    LiveFilesystem,
    TrashOrCache,
    DeepScan,
    RootScan,
}

impl RecoverySource {
    /// Raw sources need carving at recovery time instead of a plain copy
    pub fn is_raw(&self) -> bool {
        matches!(self, RecoverySource::DeepScan | RecoverySource::RootScan)
    }
}

impl std::fmt::Display for RecoverySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySource::IndexedMetadata => write!(f, "indexed metadata"),
            RecoverySource::LiveFilesystem => write!(f, "live filesystem"),
            RecoverySource::TrashOrCache => write!(f, "trash/cache"),
            RecoverySource::DeepScan => write!(f, "deep scan"),
            RecoverySource::RootScan => write!(f, "root scan"),
        }
    }
}

/// Where the content of a record was found
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceLocation {
    /// A real filesystem path (live file, trash entry, index reference)
    File(PathBuf),
    /// A byte range inside a raw device, disk image or container file
    DeviceOffset {
        device: PathBuf,
        offset: u64,
        /// 0 when the end of the content is unknown until recovery
        length: u64,
    },
}

impl SourceLocation {
    /// Canonical string used for deduplication and display
    pub fn key(&self) -> String {
        match self {
            SourceLocation::File(path) => path.display().to_string(),
            SourceLocation::DeviceOffset { device, offset, .. } => {
                format!("{}@{}", device.display(), offset)
            }
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            SourceLocation::File(path) => path,
            SourceLocation::DeviceOffset { device, .. } => device,
        }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// A discovered candidate for recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverableRecord {
    pub id: Uuid,
    pub name: String,
    /// None for content carved from memory with no addressable origin
    pub source: Option<SourceLocation>,
    pub size_bytes: u64,
    pub file_type: FileType,
    pub last_modified: DateTime<Utc>,
    pub recovery_source: RecoverySource,
    pub confidence: f32, // 0.0-1.0
    pub is_recoverable: bool,
}

impl RecoverableRecord {
    /// Create a record with a fresh id, discovery-time timestamp and clamped confidence
    pub fn new(
        name: impl Into<String>,
        source: Option<SourceLocation>,
        recovery_source: RecoverySource,
        confidence: f32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source,
            size_bytes: 0,
            file_type: FileType::Unknown,
            last_modified: Utc::now(),
            recovery_source,
            confidence: confidence.clamp(0.0, 1.0),
            is_recoverable: true,
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    pub fn with_file_type(mut self, file_type: FileType) -> Self {
        self.file_type = file_type;
        self
    }

    pub fn with_last_modified(mut self, last_modified: Option<DateTime<Utc>>) -> Self {
        if let Some(ts) = last_modified {
            self.last_modified = ts;
        }
        self
    }

    pub fn source_key(&self) -> Option<String> {
        self.source.as_ref().map(SourceLocation::key)
    }

    pub fn last_modified_epoch_millis(&self) -> i64 {
        self.last_modified.timestamp_millis()
    }

    pub fn category(&self) -> FileCategory {
        self.file_type.category()
    }
}

/// Result of recovering one record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub record_id: Uuid,
    pub status: RecoveryStatus,
}

/// Recovery status for individual files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RecoveryStatus {
    Recovered {
        destination: PathBuf,
        bytes_written: u64,
        sha256: String,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

impl RecoveryOutcome {
    pub fn failed(record_id: Uuid, error: &RecoveryError) -> Self {
        Self {
            record_id,
            status: RecoveryStatus::Failed {
                kind: error.kind(),
                message: error.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, RecoveryStatus::Recovered { .. })
    }

    pub fn destination_path(&self) -> Option<&Path> {
        match &self.status {
            RecoveryStatus::Recovered { destination, .. } => Some(destination),
            RecoveryStatus::Failed { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.status {
            RecoveryStatus::Recovered { .. } => None,
            RecoveryStatus::Failed { kind, .. } => Some(*kind),
        }
    }

    pub fn bytes_written(&self) -> u64 {
        match &self.status {
            RecoveryStatus::Recovered { bytes_written, .. } => *bytes_written,
            RecoveryStatus::Failed { .. } => 0,
        }
    }
}

/// Recovery report with detailed results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub total_files: usize,
    pub recovered_files: usize,
    pub failed_files: usize,
    pub total_bytes_recovered: u64,
    pub output_directory: PathBuf,
    pub outcomes: Vec<RecoveryOutcome>,
}

/// Run every applicable scanner over `roots` and return the ranked, deduplicated records
pub fn perform_full_scan<F>(roots: &ScanRoots, has_root_access: bool, progress: F) -> ScanReport
where
    F: Fn(&ScanProgress) + Send + Sync + 'static,
{
    let mut engine = ScanEngine::new(ScanConfig::default());
    engine.set_progress_callback(progress);
    engine.perform_full_scan(roots, has_root_access)
}

/// Run a full scan on a dedicated worker thread
pub fn spawn_full_scan<F>(
    roots: ScanRoots,
    config: ScanConfig,
    has_root_access: bool,
    progress: F,
) -> std::io::Result<ScanHandle>
where
    F: Fn(&ScanProgress) + Send + Sync + 'static,
{
    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let join = std::thread::Builder::new()
        .name("salvage-scan".to_string())
        .spawn(move || {
            let mut engine = ScanEngine::new(config);
            engine.set_progress_callback(progress);
            engine.set_cancellation_token(worker_cancel);
            engine.perform_full_scan(&roots, has_root_access)
        })?;
    Ok(ScanHandle::new(cancel, join))
}

fn shared_executor() -> &'static RecoveryExecutor {
    static EXECUTOR: OnceLock<RecoveryExecutor> = OnceLock::new();
    EXECUTOR.get_or_init(|| RecoveryExecutor::new(RecoveryConfig::default()))
}

/// Recover a single record into `destination_dir`
pub fn recover_file(record: &RecoverableRecord, destination_dir: &Path) -> RecoveryOutcome {
    shared_executor().recover(record, destination_dir)
}

/// Recover a batch of records, in parallel, into `destination_dir`
pub fn recover_files(records: &[RecoverableRecord], destination_dir: &Path) -> RecoveryReport {
    shared_executor().recover_all(records, destination_dir, |_, _, _| {})
}
