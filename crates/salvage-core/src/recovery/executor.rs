/// Recovery execution: copy or extract a record's bytes into a destination directory
///
/// Bytes are staged in a temporary file inside the destination directory and
/// only moved to their final name once fully written and synced. Final names
/// are claimed without ever replacing an existing file.
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::RecoveryError;
use crate::forensics::calculate_file_hash;
use crate::recovery::carver::carve_at;
use crate::recovery::signatures::{classify, classify_by_signature, Classification};
use crate::scanners::BlockDevice;
use crate::{
    FileType, RecoverableRecord, RecoveryOutcome, RecoveryReport, RecoveryStatus, SourceLocation,
};

const COPY_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Re-hash the output after it is moved into place
    pub verify_after_copy: bool,
    /// Upper bound when a raw record's length must be re-carved
    pub max_carve_size: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            verify_after_copy: false,
            max_carve_size: 64 * 1024 * 1024, // 64MB
        }
    }
}

/// Lifecycle of a record inside one executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryState {
    Discovered,
    Recovering,
    Recovered,
    Failed,
}

/// Bytes written to a temp file, not yet visible under their final name
struct Staged {
    file: NamedTempFile,
    bytes: u64,
    sha256: String,
}

/// Records whose state is remembered before finished ones are dropped
pub const MAX_TRACKED_STATES: usize = 4096;

pub struct RecoveryExecutor {
    config: RecoveryConfig,
    states: Mutex<HashMap<Uuid, RecoveryState>>,
    dir_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl RecoveryExecutor {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
            dir_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Current state of a record; records never seen are `Discovered`
    ///
    /// Finished states are forgotten, and read as `Discovered` again, once
    /// more than [`MAX_TRACKED_STATES`] records have passed through.
    pub fn state(&self, record_id: Uuid) -> RecoveryState {
        self.states
            .lock()
            .get(&record_id)
            .copied()
            .unwrap_or(RecoveryState::Discovered)
    }

    fn set_state(&self, record_id: Uuid, state: RecoveryState) {
        let mut states = self.states.lock();
        if states.len() >= MAX_TRACKED_STATES && !states.contains_key(&record_id) {
            states.retain(|_, s| *s == RecoveryState::Recovering);
        }
        states.insert(record_id, state);
    }

    /// Recover one record into `destination_dir`
    pub fn recover(&self, record: &RecoverableRecord, destination_dir: &Path) -> RecoveryOutcome {
        self.set_state(record.id, RecoveryState::Recovering);

        match self.try_recover(record, destination_dir) {
            Ok(status) => {
                self.set_state(record.id, RecoveryState::Recovered);
                let outcome = RecoveryOutcome {
                    record_id: record.id,
                    status,
                };
                if let Some(path) = outcome.destination_path() {
                    tracing::info!("Recovered {} -> {}", record.name, path.display());
                }
                outcome
            }
            Err(e) => {
                self.set_state(record.id, RecoveryState::Failed);
                tracing::warn!("Failed to recover {}: {}", record.name, e);
                RecoveryOutcome::failed(record.id, &e)
            }
        }
    }

    /// Recover a batch in parallel
    ///
    /// `progress` receives `(fraction_done, record_name, recovered_so_far)`
    /// after each record, from whichever worker finished it.
    pub fn recover_all<F>(
        &self,
        records: &[RecoverableRecord],
        destination_dir: &Path,
        progress: F,
    ) -> RecoveryReport
    where
        F: Fn(f32, &str, usize) + Send + Sync,
    {
        let total = records.len();
        let done = AtomicUsize::new(0);
        let recovered = AtomicUsize::new(0);

        let outcomes: Vec<RecoveryOutcome> = records
            .par_iter()
            .map(|record| {
                let outcome = self.recover(record, destination_dir);
                if outcome.is_success() {
                    recovered.fetch_add(1, Ordering::SeqCst);
                }
                let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                progress(
                    finished as f32 / total as f32,
                    &record.name,
                    recovered.load(Ordering::SeqCst),
                );
                outcome
            })
            .collect();

        let recovered_files = outcomes.iter().filter(|o| o.is_success()).count();
        let report = RecoveryReport {
            total_files: total,
            recovered_files,
            failed_files: total - recovered_files,
            total_bytes_recovered: outcomes.iter().map(|o| o.bytes_written()).sum(),
            output_directory: destination_dir.to_path_buf(),
            outcomes,
        };

        tracing::info!(
            "Recovered {}/{} files ({} bytes) into {}",
            report.recovered_files,
            report.total_files,
            report.total_bytes_recovered,
            destination_dir.display()
        );
        report
    }

    fn try_recover(
        &self,
        record: &RecoverableRecord,
        destination_dir: &Path,
    ) -> Result<RecoveryStatus, RecoveryError> {
        fs::create_dir_all(destination_dir)
            .map_err(|e| RecoveryError::destination(destination_dir, e))?;

        let staged = match &record.source {
            Some(SourceLocation::File(path)) => stage_file(path, destination_dir)?,
            Some(SourceLocation::DeviceOffset {
                device,
                offset,
                length,
            }) => self.stage_raw(device, *offset, *length, record.file_type, destination_dir)?,
            None if record.recovery_source.is_raw() => {
                return Err(RecoveryError::CarveFailed(
                    "record has no device location".to_string(),
                ))
            }
            None => return Err(RecoveryError::SourceGone(PathBuf::from(&record.name))),
        };

        let bytes = staged.bytes;
        let sha256 = staged.sha256.clone();
        let destination = self.claim_name(staged, destination_dir, record)?;

        if self.config.verify_after_copy {
            let written = calculate_file_hash(&destination)
                .map_err(|e| RecoveryError::destination(&destination, e))?;
            if written.hash != sha256 {
                let _ = fs::remove_file(&destination);
                return Err(RecoveryError::destination(
                    &destination,
                    io::Error::new(io::ErrorKind::InvalidData, "hash mismatch after write"),
                ));
            }
        }

        Ok(RecoveryStatus::Recovered {
            destination,
            bytes_written: bytes,
            sha256,
        })
    }

    fn stage_raw(
        &self,
        device_path: &Path,
        offset: u64,
        length: u64,
        expected: FileType,
        destination_dir: &Path,
    ) -> Result<Staged, RecoveryError> {
        let device = BlockDevice::open(device_path).map_err(|e| {
            RecoveryError::CarveFailed(format!("cannot open {}: {}", device_path.display(), e))
        })?;
        let carve_failed = |e: anyhow::Error| {
            RecoveryError::CarveFailed(format!("{}@{}: {}", device_path.display(), offset, e))
        };

        let bytes = if length > 0 {
            let length = usize::try_from(length).map_err(|e| carve_failed(e.into()))?;
            device.read_bytes(offset, length).map_err(carve_failed)?
        } else {
            let tail = device.tail(offset).map_err(carve_failed)?;
            let (_, carved, _) = carve_at(tail, self.config.max_carve_size).ok_or_else(|| {
                carve_failed(anyhow::anyhow!("no carvable header at offset"))
            })?;
            &tail[..carved]
        };

        if !signature_consistent(expected, bytes) {
            return Err(carve_failed(anyhow::anyhow!(
                "signature no longer matches {}",
                expected
            )));
        }

        write_staged(bytes, destination_dir, |e| carve_failed(e.into()))
    }

    fn dir_lock(&self, dir: &Path) -> (PathBuf, Arc<Mutex<()>>) {
        let key = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let lock = Arc::clone(self.dir_locks.lock().entry(key.clone()).or_default());
        (key, lock)
    }

    /// Drop the map entry once nobody else holds or waits on the lock
    fn release_dir_lock(&self, key: &Path, lock: Arc<Mutex<()>>) {
        let mut locks = self.dir_locks.lock();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    /// Move `staged` to the first free name: `name`, `name_1.ext`, `name_2.ext`, ...
    fn claim_name(
        &self,
        staged: Staged,
        destination_dir: &Path,
        record: &RecoverableRecord,
    ) -> Result<PathBuf, RecoveryError> {
        let (key, lock) = self.dir_lock(destination_dir);
        let claimed = {
            let _guard = lock.lock();
            claim_free_name(staged.file, destination_dir, record)
        };
        self.release_dir_lock(&key, lock);
        claimed
    }
}

/// Persist `file` under the first name in `destination_dir` nobody has taken
fn claim_free_name(
    mut file: NamedTempFile,
    destination_dir: &Path,
    record: &RecoverableRecord,
) -> Result<PathBuf, RecoveryError> {
    let (stem, extension) = output_name(record);
    let mut attempt = 0usize;
    loop {
        let name = match (attempt, &extension) {
            (0, Some(ext)) => format!("{}.{}", stem, ext),
            (0, None) => stem.clone(),
            (n, Some(ext)) => format!("{}_{}.{}", stem, n, ext),
            (n, None) => format!("{}_{}", stem, n),
        };
        let candidate = destination_dir.join(name);
        attempt += 1;

        if candidate.symlink_metadata().is_ok() {
            continue;
        }
        match file.persist_noclobber(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                // Another process took the name between the check and the claim
                file = e.file;
            }
            Err(e) => return Err(RecoveryError::destination(candidate, e.error)),
        }
    }
}

/// Copy an existing file into a staged temp file
fn stage_file(path: &Path, destination_dir: &Path) -> Result<Staged, RecoveryError> {
    let source = File::open(path).map_err(|e| {
        tracing::debug!("Cannot open {}: {}", path.display(), e);
        RecoveryError::SourceGone(path.to_path_buf())
    })?;
    write_staged(source, destination_dir, |e| {
        tracing::debug!("Read of {} failed: {}", path.display(), e);
        RecoveryError::SourceGone(path.to_path_buf())
    })
}

/// Stream `reader` into a temp file in `destination_dir`, hashing as it goes
///
/// On any error the temp file is dropped and removed.
fn write_staged<R: Read>(
    reader: R,
    destination_dir: &Path,
    on_read_error: impl Fn(io::Error) -> RecoveryError,
) -> Result<Staged, RecoveryError> {
    write_staged_with(reader, destination_dir, on_read_error, |file, chunk| {
        file.write_all(chunk)
    })
}

fn write_staged_with<R: Read>(
    mut reader: R,
    destination_dir: &Path,
    on_read_error: impl Fn(io::Error) -> RecoveryError,
    mut write_chunk: impl FnMut(&mut NamedTempFile, &[u8]) -> io::Result<()>,
) -> Result<Staged, RecoveryError> {
    let mut file = NamedTempFile::new_in(destination_dir)
        .map_err(|e| RecoveryError::destination(destination_dir, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; COPY_BUFFER];
    let mut bytes = 0u64;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(on_read_error(e)),
        };
        if let Err(e) = write_chunk(&mut file, &buffer[..n]) {
            return Err(RecoveryError::destination(file.path(), e));
        }
        hasher.update(&buffer[..n]);
        bytes += n as u64;
    }

    file.as_file()
        .sync_all()
        .map_err(|e| RecoveryError::destination(file.path(), e))?;

    Ok(Staged {
        file,
        bytes,
        sha256: format!("{:x}", hasher.finalize()),
    })
}

/// Whether `bytes` still start with a signature of `expected`'s family
fn signature_consistent(expected: FileType, bytes: &[u8]) -> bool {
    let found = classify_by_signature(bytes);
    if found == FileType::Unknown {
        return false;
    }
    if expected == FileType::Unknown {
        return true;
    }
    classify(Classification::bytes(bytes).with_extension(Some(expected.default_extension())))
        == expected
}

/// Sanitized `(stem, extension)` for a record's output file
fn output_name(record: &RecoverableRecord) -> (String, Option<String>) {
    let base = record
        .name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect::<String>();
    let base = base.trim_matches(|c: char| c == '.' || c.is_whitespace());

    let fallback_ext = match record.file_type {
        FileType::Unknown => None,
        file_type => Some(file_type.default_extension().to_string()),
    };

    if base.is_empty() {
        let stem = format!("recovered_{}", &record.id.simple().to_string()[..8]);
        return (stem, fallback_ext);
    }

    let path = Path::new(base);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => (
            stem.to_string_lossy().into_owned(),
            Some(ext.to_string_lossy().into_owned()),
        ),
        _ => (base.to_string(), fallback_ext),
    }
}
