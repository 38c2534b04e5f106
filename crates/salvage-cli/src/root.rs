use std::path::PathBuf;

use clap::ValueEnum;
use salvage_core::RootProbe;

const SU_BINARIES: &[&str] = &[
	"/system/bin/su",
	"/system/xbin/su",
	"/sbin/su",
	"/su/bin/su",
	"/magisk/.core/bin/su",
];

const SUPERUSER_PACKAGES: &[&str] = &[
	"/system/app/Superuser.apk",
	"/system/app/SuperSU.apk",
	"/system/app/Kinguser.apk",
	"/data/data/eu.chainfire.supersu",
	"/data/data/com.noshufou.android.su",
	"/data/data/com.koushikdutta.superuser",
];

/// Detects root by looking for an `su` binary or a superuser manager
pub struct SuBinaryProbe {
	candidates: Vec<PathBuf>,
}

impl SuBinaryProbe {
	pub fn new() -> Self {
		Self::with_candidates(
			SU_BINARIES
				.iter()
				.chain(SUPERUSER_PACKAGES)
				.map(PathBuf::from)
				.collect(),
		)
	}

	pub fn with_candidates(candidates: Vec<PathBuf>) -> Self {
		Self { candidates }
	}
}

impl Default for SuBinaryProbe {
	fn default() -> Self {
		Self::new()
	}
}

impl RootProbe for SuBinaryProbe {
	fn has_root_access(&self) -> bool {
		match self.candidates.iter().find(|path| path.exists()) {
			Some(found) => {
				tracing::info!("Found root indicator at {}", found.display());
				true
			}
			None => false,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RootAccess {
	/// Probe the device
	Auto,
	Yes,
	No,
}

impl RootAccess {
	pub fn resolve(self, probe: &dyn RootProbe) -> bool {
		match self {
			RootAccess::Auto => probe.has_root_access(),
			RootAccess::Yes => true,
			RootAccess::No => false,
		}
	}
}
