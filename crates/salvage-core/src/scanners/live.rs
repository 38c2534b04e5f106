/// Inventory of files still present on the live filesystem
use std::path::PathBuf;

use super::common::{existing_file_record, walk_files, RootWalks};
use super::{ScanContext, SourceScanner};
use crate::error::ScanError;
use crate::recovery::confidence::Evidence;
use crate::{RecoverableRecord, RecoverySource};

pub struct LiveFilesystemScanner {
    dirs: Vec<PathBuf>,
}

impl LiveFilesystemScanner {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

impl SourceScanner for LiveFilesystemScanner {
    fn name(&self) -> &str {
        "live-filesystem"
    }

    fn source(&self) -> RecoverySource {
        RecoverySource::LiveFilesystem
    }

    fn scan(&self, ctx: &mut ScanContext<'_>) -> Result<Vec<RecoverableRecord>, ScanError> {
        let config = ctx.config;
        let cancel = ctx.cancel;
        let mut records = Vec::new();
        let mut walks = RootWalks::default();

        for (i, dir) in self.dirs.iter().enumerate() {
            tracing::debug!("Walking {}", dir.display());

            let result = walk_files(dir, config.max_depth, cancel, |file| {
                records.push(existing_file_record(
                    &file,
                    RecoverySource::LiveFilesystem,
                    Evidence::default(),
                    config.header_probe_len,
                ));
            });

            ctx.progress.set_records_found(records.len());
            if !walks.record(dir, result) {
                break;
            }
            ctx.progress.update((i + 1) as f32 / self.dirs.len() as f32);
        }

        walks.finish()?;
        tracing::info!("Live filesystem: {} files", records.len());
        Ok(records)
    }
}
