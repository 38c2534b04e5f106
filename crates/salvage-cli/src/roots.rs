use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use salvage_core::ScanRoots;

const MEDIA_INDEXES: &[&str] = &[
	"/data/data/com.android.providers.media/databases/external.db",
	"/data/data/com.google.android.providers.media.module/databases/external.db",
];

const BLOCK_DEVICES: &[&str] = &["/dev/block/mmcblk0", "/dev/block/sda"];

fn existing(paths: &[&str]) -> Vec<PathBuf> {
	paths.iter().map(PathBuf::from).filter(|p| p.exists()).collect()
}

fn under(root: &Path, dirs: &[&str]) -> Vec<PathBuf> {
	dirs.iter().map(|d| root.join(d)).collect()
}

/// Conventional locations on an Android shared-storage root such as `/sdcard`
pub fn android(storage: &Path) -> ScanRoots {
	ScanRoots {
		media_indexes: existing(MEDIA_INDEXES),
		live_dirs: under(
			storage,
			&["DCIM", "Pictures", "Movies", "Music", "Download", "Documents"],
		),
		trash_dirs: under(storage, &[".Trash", ".trash", "DCIM/.trash"]),
		cache_dirs: under(storage, &["DCIM/.thumbnails", "Pictures/.thumbnails", "Android/data"]),
		deep_dirs: under(storage, &["Android/media", "DCIM/.thumbnails"]),
		devices: existing(BLOCK_DEVICES),
	}
}

/// The current user's media folders, trash and cache on a desktop system
pub fn desktop() -> ScanRoots {
	let live_dirs = [
		dirs::picture_dir(),
		dirs::video_dir(),
		dirs::audio_dir(),
		dirs::document_dir(),
		dirs::download_dir(),
		dirs::desktop_dir(),
	]
	.into_iter()
	.flatten()
	.collect();

	let trash_dirs = [
		dirs::data_local_dir().map(|d| d.join("Trash/files")),
		dirs::home_dir().map(|d| d.join(".Trash")),
	]
	.into_iter()
	.flatten()
	.collect();

	ScanRoots {
		live_dirs,
		trash_dirs,
		cache_dirs: dirs::cache_dir().into_iter().collect(),
		..ScanRoots::default()
	}
}

pub fn load(path: &Path) -> Result<ScanRoots> {
	let json = std::fs::read_to_string(path)
		.with_context(|| format!("reading roots file {}", path.display()))?;
	serde_json::from_str(&json).with_context(|| format!("parsing roots file {}", path.display()))
}

/// Append `other`'s locations, skipping ones already present
pub fn merge(into: &mut ScanRoots, other: ScanRoots) {
	fn extend(dst: &mut Vec<PathBuf>, src: Vec<PathBuf>) {
		for path in src {
			if !dst.contains(&path) {
				dst.push(path);
			}
		}
	}
	extend(&mut into.media_indexes, other.media_indexes);
	extend(&mut into.live_dirs, other.live_dirs);
	extend(&mut into.trash_dirs, other.trash_dirs);
	extend(&mut into.cache_dirs, other.cache_dirs);
	extend(&mut into.deep_dirs, other.deep_dirs);
	extend(&mut into.devices, other.devices);
}
