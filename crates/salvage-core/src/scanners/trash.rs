/// Files sitting in trash, recycle and cache locations
use std::path::PathBuf;

use super::common::{existing_file_record, walk_files, RootWalks};
use super::{ScanContext, SourceScanner};
use crate::error::ScanError;
use crate::recovery::confidence::Evidence;
use crate::{RecoverableRecord, RecoverySource};

pub struct TrashOrCacheScanner {
    trash_dirs: Vec<PathBuf>,
    cache_dirs: Vec<PathBuf>,
}

impl TrashOrCacheScanner {
    pub fn new(trash_dirs: Vec<PathBuf>, cache_dirs: Vec<PathBuf>) -> Self {
        Self {
            trash_dirs,
            cache_dirs,
        }
    }
}

impl SourceScanner for TrashOrCacheScanner {
    fn name(&self) -> &str {
        "trash-cache"
    }

    fn source(&self) -> RecoverySource {
        RecoverySource::TrashOrCache
    }

    fn scan(&self, ctx: &mut ScanContext<'_>) -> Result<Vec<RecoverableRecord>, ScanError> {
        let config = ctx.config;
        let cancel = ctx.cancel;
        let total = (self.trash_dirs.len() + self.cache_dirs.len()).max(1) as f32;
        let mut records = Vec::new();
        let mut walks = RootWalks::default();

        let dirs = self
            .trash_dirs
            .iter()
            .map(|dir| (dir, true))
            .chain(self.cache_dirs.iter().map(|dir| (dir, false)));

        for (i, (dir, explicit_trash)) in dirs.enumerate() {
            let evidence = Evidence {
                explicit_trash,
                ..Evidence::default()
            };
            let mut skipped = 0usize;

            let result = walk_files(dir, config.max_depth, cancel, |file| {
                if !explicit_trash && file.size < config.cache_min_size {
                    skipped += 1;
                    return;
                }
                records.push(existing_file_record(
                    &file,
                    RecoverySource::TrashOrCache,
                    evidence,
                    config.header_probe_len,
                ));
            });

            if skipped > 0 {
                tracing::debug!(
                    "Skipped {} small cache files under {}",
                    skipped,
                    dir.display()
                );
            }

            ctx.progress.set_records_found(records.len());
            if !walks.record(dir, result) {
                break;
            }
            ctx.progress.update((i + 1) as f32 / total);
        }

        walks.finish()?;
        tracing::info!("Trash and cache: {} files", records.len());
        Ok(records)
    }
}
