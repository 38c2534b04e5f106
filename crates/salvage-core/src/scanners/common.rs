/// Shared helpers for scanners: device access, bounded directory walks, header probes
use anyhow::Result;
use chrono::{DateTime, Utc};
use memmap2::MmapOptions;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::ScanError;
use crate::recovery::confidence::{calculate_confidence_score, Evidence};
use crate::recovery::signatures::{classify, classify_by_extension, classify_by_signature, Classification};
use crate::session::CancellationToken;
use crate::{FileType, RecoverableRecord, RecoverySource, SourceLocation};

/// Length found by seeking to the end, then rewinding
///
/// Block devices report a zero metadata length, so this is the only size that
/// works for both devices and image files.
pub(crate) fn seek_len<S: Seek>(stream: &mut S) -> std::io::Result<u64> {
    let size = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(0))?;
    Ok(size)
}

/// A memory-mapped device or image for raw access
pub struct BlockDevice {
    _file: File,
    mmap: memmap2::Mmap,
    size: u64,
}

impl BlockDevice {
    /// Open a block device, disk image or container file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;
        let size = seek_len(&mut file)?;
        if size == 0 {
            anyhow::bail!("{} is empty", path.as_ref().display());
        }
        let len = usize::try_from(size)?;

        let mmap = unsafe { MmapOptions::new().len(len).map(&file)? };

        Ok(BlockDevice {
            _file: file,
            mmap,
            size,
        })
    }

    /// Get the size of the device in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn data(&self) -> &[u8] {
        &self.mmap
    }

    /// Read a slice of bytes from the device
    pub fn read_bytes(&self, offset: u64, length: usize) -> Result<&[u8]> {
        let start = usize::try_from(offset)?;
        let end = start
            .checked_add(length)
            .ok_or_else(|| anyhow::anyhow!("Read range overflows at offset {}", offset))?;

        if end > self.mmap.len() {
            anyhow::bail!("Read beyond end of device: {} > {}", end, self.mmap.len());
        }

        Ok(&self.mmap[start..end])
    }

    /// Everything from `offset` to the end of the device
    pub fn tail(&self, offset: u64) -> Result<&[u8]> {
        let start = usize::try_from(offset)?;
        if start >= self.mmap.len() {
            anyhow::bail!("Offset {} beyond end of device", offset);
        }
        Ok(&self.mmap[start..])
    }
}

/// A regular file found by a walk
pub(crate) struct WalkedFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Visit regular files under `root`, at most `max_depth` levels down
///
/// A missing root is skipped. Unreadable subtrees are logged and skipped; only
/// a root that cannot be read at all is an error. Returns `Cancelled`, after
/// visiting what it already reached, when `cancel` fires between entries.
pub(crate) fn walk_files(
    root: &Path,
    max_depth: usize,
    cancel: &CancellationToken,
    mut visit: impl FnMut(WalkedFile),
) -> Result<(), ScanError> {
    if !root.exists() {
        tracing::debug!("Skipping missing root {}", root.display());
        return Ok(());
    }

    let walker = WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        if cancel.is_cancelled() {
            tracing::debug!("Walk of {} cancelled", root.display());
            return Err(ScanError::Cancelled);
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let denied = e
                    .io_error()
                    .map(|io| io.kind() == std::io::ErrorKind::PermissionDenied)
                    .unwrap_or(false);
                if e.depth() == 0 {
                    return Err(if denied {
                        ScanError::PermissionDenied(root.to_path_buf())
                    } else {
                        ScanError::Io(e.into())
                    });
                }
                let at = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                if denied {
                    tracing::warn!("Permission denied, skipping {}", at);
                } else {
                    tracing::debug!("Skipping unreadable entry {}: {}", at, e);
                }
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::debug!("No metadata for {}: {}", entry.path().display(), e);
                continue;
            }
        };

        visit(WalkedFile {
            path: entry.into_path(),
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        });
    }

    Ok(())
}

/// Per-root bookkeeping for scanners that walk several roots
#[derive(Default)]
pub(crate) struct RootWalks {
    readable: usize,
    last_error: Option<ScanError>,
}

impl RootWalks {
    /// Note the result of walking `root`; false once the scan was cancelled
    pub fn record(&mut self, root: &Path, result: Result<(), ScanError>) -> bool {
        match result {
            Ok(()) => {
                self.readable += 1;
                true
            }
            Err(ScanError::Cancelled) => false,
            Err(e) => {
                tracing::warn!("Skipping root {}: {}", root.display(), e);
                self.last_error = Some(e);
                true
            }
        }
    }

    /// The last root error, when no root could be read
    pub fn finish(self) -> Result<(), ScanError> {
        match self.last_error {
            Some(e) if self.readable == 0 => Err(e),
            _ => Ok(()),
        }
    }
}

/// Read up to `len` leading bytes; None when the file cannot be read
pub(crate) fn read_header(path: &Path, len: usize) -> Option<Vec<u8>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!("Cannot read header of {}: {}", path.display(), e);
            return None;
        }
    };
    let mut header = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut header).ok()?;
    Some(header)
}

pub(crate) fn extension_of(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Type of an existing file plus whether its bytes confirm its name
pub(crate) fn classify_existing(
    path: &Path,
    mime: Option<&str>,
    probe_len: usize,
) -> (FileType, bool) {
    let header = read_header(path, probe_len);
    let extension = extension_of(path);
    let file_type = classify(Classification {
        bytes: header.as_deref(),
        extension,
        mime,
    });

    let by_signature = header
        .as_deref()
        .map(classify_by_signature)
        .unwrap_or_default();
    let by_extension = extension.map(classify_by_extension).unwrap_or_default();
    let verified = by_signature != FileType::Unknown && file_type == by_extension;

    (file_type, verified)
}

/// Record for a file that exists on the live filesystem
pub(crate) fn existing_file_record(
    file: &WalkedFile,
    source: RecoverySource,
    evidence: Evidence,
    probe_len: usize,
) -> RecoverableRecord {
    let (file_type, verified) = classify_existing(&file.path, None, probe_len);
    let evidence = Evidence {
        content_present: true,
        signature_verified: verified,
        ..evidence
    };

    RecoverableRecord::new(
        display_name(&file.path),
        Some(SourceLocation::File(file.path.clone())),
        source,
        calculate_confidence_score(source, &evidence),
    )
    .with_size(file.size)
    .with_file_type(file_type)
    .with_last_modified(file.modified)
}
