/// Hash-based verification of recovered output
///
/// The executor hashes bytes as it stages them; these helpers re-hash what
/// landed on disk so a caller can prove the output was not altered afterwards.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use uuid::Uuid;

use crate::RecoveryReport;

/// File hash result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHash {
    /// Lowercase hex SHA-256
    pub hash: String,

    pub file_size: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerificationStatus {
    /// Hash matches expected value
    Verified,

    /// Hash does not match, or the file is missing
    Corrupted,

    /// No expected hash to compare against
    NoReference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashVerification {
    pub file_path: String,
    pub expected_hash: Option<String>,
    pub actual_hash: String,
    pub status: VerificationStatus,
}

/// Calculate the SHA-256 of a file
pub fn calculate_file_hash(path: impl AsRef<Path>) -> io::Result<FileHash> {
    let mut file = File::open(path.as_ref())?;
    let file_size = file.metadata()?.len();

    let mut hasher = Sha256::new();
    let mut buffer = vec![0; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(FileHash {
        hash: format!("{:x}", hasher.finalize()),
        file_size,
        calculated_at: Some(Utc::now()),
    })
}

/// Calculate hash from byte slice
pub fn calculate_hash(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Verify file integrity against expected hash
pub fn verify_file_integrity(
    path: impl AsRef<Path>,
    expected_hash: Option<&str>,
) -> io::Result<HashVerification> {
    let actual_hash = calculate_file_hash(&path)?.hash;

    let status = match expected_hash {
        Some(expected) if actual_hash.eq_ignore_ascii_case(expected) => VerificationStatus::Verified,
        Some(_) => VerificationStatus::Corrupted,
        None => VerificationStatus::NoReference,
    };

    Ok(HashVerification {
        file_path: path.as_ref().display().to_string(),
        expected_hash: expected_hash.map(String::from),
        actual_hash,
        status,
    })
}

/// Summary of a manifest check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub total_files: usize,
    pub verified: usize,
    pub corrupted: usize,
    pub verifications: Vec<HashVerification>,
}

/// Hashes of every file written by one recovery run, keyed by file name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashManifest {
    pub manifest_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub files: BTreeMap<String, FileHash>,
}

impl HashManifest {
    pub fn new() -> Self {
        Self {
            manifest_id: Uuid::new_v4(),
            created_at: Utc::now(),
            files: BTreeMap::new(),
        }
    }

    /// Manifest of the successful outcomes in `report`
    pub fn from_report(report: &RecoveryReport) -> Self {
        let mut manifest = Self::new();
        for outcome in &report.outcomes {
            if let crate::RecoveryStatus::Recovered {
                destination,
                bytes_written,
                sha256,
            } = &outcome.status
            {
                let Some(name) = destination.file_name() else {
                    continue;
                };
                manifest.add_file(
                    name.to_string_lossy().into_owned(),
                    FileHash {
                        hash: sha256.clone(),
                        file_size: *bytes_written,
                        calculated_at: Some(manifest.created_at),
                    },
                );
            }
        }
        manifest
    }

    pub fn add_file(&mut self, name: String, hash: FileHash) {
        self.files.insert(name, hash);
    }

    /// Re-hash every listed file under `base_path`
    pub fn verify_all(&self, base_path: impl AsRef<Path>) -> io::Result<VerificationSummary> {
        let mut verifications = Vec::with_capacity(self.files.len());

        for (name, expected) in &self.files {
            let full_path = base_path.as_ref().join(name);
            if !full_path.exists() {
                verifications.push(HashVerification {
                    file_path: full_path.display().to_string(),
                    expected_hash: Some(expected.hash.clone()),
                    actual_hash: String::new(),
                    status: VerificationStatus::Corrupted,
                });
                continue;
            }
            verifications.push(verify_file_integrity(&full_path, Some(&expected.hash))?);
        }

        let verified = verifications
            .iter()
            .filter(|v| v.status == VerificationStatus::Verified)
            .count();
        Ok(VerificationSummary {
            total_files: verifications.len(),
            verified,
            corrupted: verifications.len() - verified,
            verifications,
        })
    }

    pub fn export_json(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    pub fn import_json(path: impl AsRef<Path>) -> io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl Default for HashManifest {
    fn default() -> Self {
        Self::new()
    }
}
