/// Raw carving of block devices and disk images; only scheduled with root access
use std::path::PathBuf;

use super::common::BlockDevice;
use super::deep::carved_records;
use super::{ScanContext, SourceScanner};
use crate::error::ScanError;
use crate::recovery::carver::scan_buffer;
use crate::{RecoverableRecord, RecoverySource};

const SCANNER_NAME: &str = "root-scan";

pub struct RootScanScanner {
    devices: Vec<PathBuf>,
}

impl RootScanScanner {
    pub fn new(devices: Vec<PathBuf>) -> Self {
        Self { devices }
    }
}

impl SourceScanner for RootScanScanner {
    fn name(&self) -> &str {
        SCANNER_NAME
    }

    fn source(&self) -> RecoverySource {
        RecoverySource::RootScan
    }

    fn scan(&self, ctx: &mut ScanContext<'_>) -> Result<Vec<RecoverableRecord>, ScanError> {
        let cancel = ctx.cancel;
        let options = ctx.config.carve_options(false);
        let total = self.devices.len().max(1) as f32;
        let mut records = Vec::new();
        let mut opened = 0usize;
        let mut last_error = None;

        for (i, path) in self.devices.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            let device = match BlockDevice::open(path) {
                Ok(device) => device,
                Err(e) => {
                    tracing::warn!("Cannot open device {}: {}", path.display(), e);
                    last_error = Some(e);
                    continue;
                }
            };
            opened += 1;
            tracing::info!("Carving {} ({} bytes)", path.display(), device.size());

            let progress = &mut ctx.progress;
            let regions = scan_buffer(device.data(), 0, &options, cancel, |local| {
                progress.update((i as f32 + local) / total);
            });

            records.extend(carved_records(
                path,
                &regions,
                RecoverySource::RootScan,
                "carved",
                None,
            ));
            ctx.progress.set_records_found(records.len());
        }

        if opened == 0 {
            if let Some(e) = last_error {
                return Err(ScanError::unavailable(SCANNER_NAME, e.to_string()));
            }
        }

        tracing::info!("Root scan: {} carved files", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::carver::tests::tiny_png;
    use crate::recovery::confidence::ROOT_COMPLETE;
    use crate::scanners::ScanConfig;
    use crate::session::{CancellationToken, ProgressTracker};
    use crate::{FileType, ScanPhase, SourceLocation};
    use std::fs;
    use tempfile::TempDir;

    fn run(scanner: &RootScanScanner) -> Result<Vec<RecoverableRecord>, ScanError> {
        let config = ScanConfig::default();
        let cancel = CancellationToken::new();
        let mut tracker = ProgressTracker::new(None);
        let mut ctx = ScanContext {
            config: &config,
            cancel: &cancel,
            progress: tracker.phase(ScanPhase::RootScan, 0),
        };
        scanner.scan(&mut ctx)
    }

    #[test]
    fn test_image_is_carved_from_offset_zero() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("userdata.img");
        let mut data = tiny_png();
        data.resize(1536, 0);
        fs::write(&image, &data).unwrap();

        let records = run(&RootScanScanner::new(vec![image.clone()])).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "carved_0.png");
        assert_eq!(records[0].file_type, FileType::Png);
        assert_eq!(records[0].confidence, ROOT_COMPLETE);
        assert!(matches!(
            records[0].source,
            Some(SourceLocation::DeviceOffset { offset: 0, .. })
        ));
    }

    #[test]
    fn test_unreadable_devices_make_scanner_unavailable() {
        let err = run(&RootScanScanner::new(vec![PathBuf::from(
            "/nonexistent/dev/block/mmcblk0",
        )]))
        .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ScannerUnavailable);
    }
}
