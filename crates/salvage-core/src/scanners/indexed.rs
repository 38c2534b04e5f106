/// Media index scanning: entries the platform still tracks but whose content is gone or trashed
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

use super::common::{classify_existing, display_name, extension_of};
use super::{ScanContext, SourceScanner};
use crate::error::ScanError;
use crate::recovery::confidence::{calculate_confidence_score, Evidence};
use crate::recovery::signatures::{classify_by_extension, classify_by_mime};
use crate::{FileType, RecoverableRecord, RecoverySource, SourceLocation};

const SCANNER_NAME: &str = "indexed-metadata";

/// One row of a media index
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: i64,
    pub path: PathBuf,
    pub display_name: Option<String>,
    pub size: u64,
    pub date_modified: Option<DateTime<Utc>>,
    pub mime_type: Option<String>,
    pub is_trashed: bool,
}

/// A platform content index
pub trait MediaIndex: Send + Sync {
    fn name(&self) -> String;
    fn entries(&self) -> Result<Vec<IndexEntry>, ScanError>;
}

/// MediaStore-style database with a `files` table
pub struct SqliteMediaIndex {
    path: PathBuf,
}

impl SqliteMediaIndex {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn open(&self) -> Result<Connection, ScanError> {
        if !self.path.exists() {
            return Err(ScanError::unavailable(
                SCANNER_NAME,
                format!("media index {} not found", self.path.display()),
            ));
        }
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

impl MediaIndex for SqliteMediaIndex {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn entries(&self) -> Result<Vec<IndexEntry>, ScanError> {
        let conn = self.open()?;
        let trashed_column = if has_column(&conn, "files", "is_trashed")? {
            "is_trashed"
        } else {
            "0"
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT _id, _data, _display_name, _size, date_modified, mime_type, {} FROM files",
            trashed_column
        ))?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<i64>>(6)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, data, display_name, size, modified, mime_type, trashed) = row?;
            let Some(data) = data else {
                tracing::debug!("Index row {} has no path, skipping", id);
                continue;
            };
            entries.push(IndexEntry {
                id,
                path: PathBuf::from(data),
                display_name,
                size: size.unwrap_or(0).max(0) as u64,
                date_modified: modified.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
                mime_type,
                is_trashed: trashed.unwrap_or(0) != 0,
            });
        }

        Ok(entries)
    }
}

pub struct IndexedMetadataScanner {
    indexes: Vec<Box<dyn MediaIndex>>,
}

impl IndexedMetadataScanner {
    pub fn new(indexes: Vec<Box<dyn MediaIndex>>) -> Self {
        Self { indexes }
    }

    fn record_for(&self, entry: &IndexEntry, probe_len: usize) -> Option<RecoverableRecord> {
        let present = entry.path.exists();
        if present && !entry.is_trashed {
            return None;
        }

        let name = entry
            .display_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| display_name(&entry.path));

        let file_type = if present {
            classify_existing(&entry.path, entry.mime_type.as_deref(), probe_len).0
        } else {
            // Content is gone: the declared MIME is the strongest signal left
            let from_mime = entry
                .mime_type
                .as_deref()
                .map(classify_by_mime)
                .unwrap_or_default();
            if from_mime != FileType::Unknown {
                from_mime
            } else {
                extension_of(Path::new(&name))
                    .or_else(|| extension_of(&entry.path))
                    .map(classify_by_extension)
                    .unwrap_or_default()
            }
        };

        let evidence = Evidence {
            content_present: present,
            ..Evidence::default()
        };

        Some(
            RecoverableRecord::new(
                name,
                Some(SourceLocation::File(entry.path.clone())),
                RecoverySource::IndexedMetadata,
                calculate_confidence_score(RecoverySource::IndexedMetadata, &evidence),
            )
            .with_size(entry.size)
            .with_file_type(file_type)
            .with_last_modified(entry.date_modified),
        )
    }
}

impl SourceScanner for IndexedMetadataScanner {
    fn name(&self) -> &str {
        SCANNER_NAME
    }

    fn source(&self) -> RecoverySource {
        RecoverySource::IndexedMetadata
    }

    fn scan(&self, ctx: &mut ScanContext<'_>) -> Result<Vec<RecoverableRecord>, ScanError> {
        let mut records = Vec::new();
        let mut last_error = None;
        let mut readable = 0usize;
        let total = self.indexes.len().max(1) as f32;

        for (i, index) in self.indexes.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                break;
            }

            let entries = match index.entries() {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Media index {} unavailable: {}", index.name(), e);
                    last_error = Some(e);
                    continue;
                }
            };
            readable += 1;
            tracing::debug!("Media index {}: {} entries", index.name(), entries.len());

            for (n, entry) in entries.iter().enumerate() {
                if n % 256 == 0 {
                    if ctx.cancel.is_cancelled() {
                        break;
                    }
                    let local = (i as f32 + n as f32 / entries.len() as f32) / total;
                    ctx.progress.set_records_found(records.len());
                    ctx.progress.update(local);
                }
                if let Some(record) = self.record_for(entry, ctx.config.header_probe_len) {
                    records.push(record);
                }
            }

            ctx.progress.set_records_found(records.len());
            ctx.progress.update((i + 1) as f32 / total);
        }

        // Every configured index failed: the source as a whole is unavailable
        if readable == 0 {
            if let Some(e) = last_error {
                if self.indexes.len() == 1 {
                    return Err(e);
                }
                return Err(ScanError::unavailable(
                    SCANNER_NAME,
                    format!("no media index could be read, last error: {}", e),
                ));
            }
        }

        tracing::info!("Media index: {} recoverable entries", records.len());
        Ok(records)
    }
}
