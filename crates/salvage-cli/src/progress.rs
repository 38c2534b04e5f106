use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use salvage_core::ScanProgress;

const SCAN_TICKS: u64 = 1000;
const STEADY_TICK_MS: u64 = 100;

const BAR_TEMPLATE: &str = "[{elapsed_precise}] {prefix:.bold}▕{bar:40.blue}▏{percent:>3}% {wide_msg}";
const FINISH_TEMPLATE: &str = "[{elapsed_precise}] {prefix:.bold} {msg}";

fn new_bar(len: u64, prefix: &'static str) -> Result<ProgressBar> {
	let pb = ProgressBar::new(len);
	pb.set_style(ProgressStyle::with_template(BAR_TEMPLATE)?.progress_chars("█▓▒░  "));
	pb.set_prefix(prefix);
	pb.enable_steady_tick(Duration::from_millis(STEADY_TICK_MS));
	Ok(pb)
}

fn finish(pb: &ProgressBar, message: String) {
	if let Ok(style) = ProgressStyle::with_template(FINISH_TEMPLATE) {
		pb.set_style(style);
	}
	pb.finish_with_message(message);
}

/// Bar driven by the scan's overall fraction
pub struct ScanBar {
	pb: ProgressBar,
}

impl ScanBar {
	pub fn new() -> Result<Self> {
		Ok(Self {
			pb: new_bar(SCAN_TICKS, "scan")?,
		})
	}

	/// Callback to hand to the scan engine
	pub fn sink(&self) -> impl Fn(&ScanProgress) + Send + Sync + 'static {
		let pb = self.pb.clone();
		move |progress: &ScanProgress| {
			pb.set_position((progress.fraction * SCAN_TICKS as f32).round() as u64);
			pb.set_message(format!(
				"{} ({} found)",
				progress.phase_label(),
				progress.records_found
			));
		}
	}

	pub fn finish(&self, message: String) {
		finish(&self.pb, message);
	}
}

/// Bar counting recovered records
pub struct RecoveryBar {
	pb: ProgressBar,
}

impl RecoveryBar {
	pub fn new(total: usize) -> Result<Self> {
		Ok(Self {
			pb: new_bar(total as u64, "recover")?,
		})
	}

	pub fn update(&self, fraction: f32, name: &str, recovered: usize) {
		let total = self.pb.length().unwrap_or(0);
		self.pb.set_position((fraction * total as f32).round() as u64);
		self.pb.set_message(format!("{} recovered, last: {}", recovered, name));
	}

	pub fn finish(&self, message: String) {
		finish(&self.pb, message);
	}
}
