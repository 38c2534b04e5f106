/// Carving embedded or orphaned content out of accessible container files
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use super::common::{walk_files, BlockDevice, RootWalks};
use super::{ScanContext, SourceScanner};
use crate::error::ScanError;
use crate::recovery::carver::{scan_buffer, CarvedRegion};
use crate::recovery::confidence::{calculate_confidence_score, Evidence};
use crate::{RecoverableRecord, RecoverySource, SourceLocation};

/// Turn carved regions of `device` into records
pub(crate) fn carved_records(
    device: &Path,
    regions: &[CarvedRegion],
    source: RecoverySource,
    name_prefix: &str,
    modified: Option<DateTime<Utc>>,
) -> Vec<RecoverableRecord> {
    regions
        .iter()
        .map(|region| {
            let evidence = Evidence {
                carve_complete: region.complete,
                ..Evidence::default()
            };
            RecoverableRecord::new(
                format!(
                    "{}_{:x}.{}",
                    name_prefix,
                    region.offset,
                    region.file_type.default_extension()
                ),
                Some(SourceLocation::DeviceOffset {
                    device: device.to_path_buf(),
                    offset: region.offset,
                    length: region.length,
                }),
                source,
                calculate_confidence_score(source, &evidence),
            )
            .with_size(region.length)
            .with_file_type(region.file_type)
            .with_last_modified(modified)
        })
        .collect()
}

pub struct DeepScanScanner {
    dirs: Vec<PathBuf>,
}

impl DeepScanScanner {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

impl SourceScanner for DeepScanScanner {
    fn name(&self) -> &str {
        "deep-scan"
    }

    fn source(&self) -> RecoverySource {
        RecoverySource::DeepScan
    }

    fn scan(&self, ctx: &mut ScanContext<'_>) -> Result<Vec<RecoverableRecord>, ScanError> {
        let config = ctx.config;
        let cancel = ctx.cancel;
        let options = config.carve_options(true);
        // Anything smaller cannot hold a hit past the first sector
        let min_size = (config.sector_size * 2) as u64;
        let mut records = Vec::new();
        let mut walks = RootWalks::default();

        for (i, dir) in self.dirs.iter().enumerate() {
            let result = walk_files(dir, config.max_depth, cancel, |file| {
                if file.size < min_size {
                    return;
                }
                let device = match BlockDevice::open(&file.path) {
                    Ok(device) => device,
                    Err(e) => {
                        tracing::debug!("Cannot map {}: {}", file.path.display(), e);
                        return;
                    }
                };

                let regions = scan_buffer(device.data(), 0, &options, cancel, |_| {});
                if regions.is_empty() {
                    return;
                }
                tracing::debug!(
                    "{} embedded files in {}",
                    regions.len(),
                    file.path.display()
                );

                let prefix = file
                    .path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "carved".to_string());
                records.extend(carved_records(
                    &file.path,
                    &regions,
                    RecoverySource::DeepScan,
                    &prefix,
                    file.modified,
                ));
            });

            ctx.progress.set_records_found(records.len());
            if !walks.record(dir, result) {
                break;
            }
            ctx.progress.update((i + 1) as f32 / self.dirs.len() as f32);
        }

        walks.finish()?;
        tracing::info!("Deep scan: {} carved files", records.len());
        Ok(records)
    }
}
