use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use humansize::{format_size, BINARY};
use salvage_core::forensics::{HashManifest, VerificationStatus};
use salvage_core::recovery::signatures::HEADER_PROBE_LEN;
use salvage_core::{
	classify, spawn_full_scan, Classification, FileCategory, RecoverableRecord, RecoveryConfig,
	RecoveryExecutor, RecoveryStatus, ScanConfig, ScanReport, ScanRoots,
};
use tracing_subscriber::EnvFilter;

mod progress;
mod root;
mod roots;

use progress::{RecoveryBar, ScanBar};
use root::{RootAccess, SuBinaryProbe};

const MANIFEST_NAME: &str = "salvage-manifest.json";

#[derive(Parser, Debug)]
#[command(name = "salvage", version, about = "Salvage - deleted media recovery for Android storage")]
struct Cli {
	/// Log per-file decisions
	#[arg(short, long, global = true)]
	verbose: bool,
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Scan storage for recoverable files
	Scan(ScanArgs),
	/// Recover records from a saved scan report
	Recover(RecoverArgs),
	/// Identify the type of a single file
	Classify {
		file: PathBuf,
		/// MIME type reported by whoever indexed the file
		#[arg(long)]
		mime: Option<String>,
	},
}

#[derive(Args, Debug)]
struct ScanArgs {
	/// Directory of live, still-indexed files
	#[arg(long = "live")]
	live_dirs: Vec<PathBuf>,
	/// Trash directory
	#[arg(long = "trash")]
	trash_dirs: Vec<PathBuf>,
	/// Thumbnail or app cache directory
	#[arg(long = "cache")]
	cache_dirs: Vec<PathBuf>,
	/// Directory whose files are carved for embedded content
	#[arg(long = "deep")]
	deep_dirs: Vec<PathBuf>,
	/// MediaStore-style SQLite database
	#[arg(long = "index")]
	media_indexes: Vec<PathBuf>,
	/// Block device or disk image, only read with root access
	#[arg(long = "device")]
	devices: Vec<PathBuf>,
	/// Use the conventional locations under an Android storage root (e.g. /sdcard)
	#[arg(long, value_name = "STORAGE_ROOT")]
	android: Option<PathBuf>,
	/// Use the current user's desktop folders
	#[arg(long)]
	desktop: bool,
	/// JSON file with scan roots
	#[arg(long)]
	roots_file: Option<PathBuf>,
	/// JSON file with scan tunables
	#[arg(long)]
	config: Option<PathBuf>,
	#[arg(long, value_enum, default_value = "auto")]
	root_access: RootAccess,
	/// Only list these categories (photos, videos, audio, documents, archives, other)
	#[arg(long)]
	only: Vec<FileCategory>,
	/// Minimum confidence score (0.0-1.0)
	#[arg(long)]
	min_confidence: Option<f32>,
	/// Write the full scan report as JSON
	#[arg(long)]
	report: Option<PathBuf>,
	/// Rows to print
	#[arg(long, default_value = "20")]
	limit: usize,
}

#[derive(Args, Debug)]
struct RecoverArgs {
	/// Report written by `salvage scan --report`
	#[arg(long)]
	report: PathBuf,
	#[arg(long)]
	out: PathBuf,
	/// Record ids to recover (all selected records when omitted)
	#[arg(long = "id")]
	ids: Vec<String>,
	#[arg(long)]
	only: Vec<FileCategory>,
	#[arg(long, default_value = "0.0")]
	min_confidence: f32,
	/// Re-hash every output against the manifest
	#[arg(long)]
	verify: bool,
}

fn init_logging(verbose: bool) {
	let default = if verbose { "debug" } else { "info" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.without_time()
		.init();
}

fn main() -> Result<()> {
	let cli = Cli::parse();
	init_logging(cli.verbose);

	match cli.command {
		Commands::Scan(args) => scan(args),
		Commands::Recover(args) => recover(args),
		Commands::Classify { file, mime } => classify_file(&file, mime.as_deref()),
	}
}

fn build_roots(args: &mut ScanArgs) -> Result<ScanRoots> {
	let mut scan_roots = ScanRoots {
		media_indexes: std::mem::take(&mut args.media_indexes),
		live_dirs: std::mem::take(&mut args.live_dirs),
		trash_dirs: std::mem::take(&mut args.trash_dirs),
		cache_dirs: std::mem::take(&mut args.cache_dirs),
		deep_dirs: std::mem::take(&mut args.deep_dirs),
		devices: std::mem::take(&mut args.devices),
	};
	if let Some(storage) = &args.android {
		roots::merge(&mut scan_roots, roots::android(storage));
	}
	if args.desktop {
		roots::merge(&mut scan_roots, roots::desktop());
	}
	if let Some(path) = &args.roots_file {
		roots::merge(&mut scan_roots, roots::load(path)?);
	}
	Ok(scan_roots)
}

fn load_config(path: Option<&Path>) -> Result<ScanConfig> {
	let Some(path) = path else {
		return Ok(ScanConfig::default());
	};
	let json = std::fs::read_to_string(path)
		.with_context(|| format!("reading config {}", path.display()))?;
	serde_json::from_str(&json).with_context(|| format!("parsing config {}", path.display()))
}

fn scan(mut args: ScanArgs) -> Result<()> {
	let scan_roots = build_roots(&mut args)?;
	if scan_roots.is_empty() {
		bail!("nothing to scan: pass --live/--trash/--cache/--deep/--index/--device, --android, --desktop or --roots-file");
	}

	let mut config = load_config(args.config.as_deref())?;
	if let Some(min) = args.min_confidence {
		config.min_confidence = min.clamp(0.0, 1.0);
	}
	let min_confidence = config.min_confidence;
	let has_root_access = args.root_access.resolve(&SuBinaryProbe::new());

	let bar = ScanBar::new()?;
	let handle = spawn_full_scan(scan_roots, config, has_root_access, bar.sink())
		.context("starting scan worker")?;
	let report = handle.join().map_err(|_| anyhow!("scan worker panicked"))?;
	bar.finish(format!(
		"{} records in {} ms",
		report.records.len(),
		report.duration_ms
	));

	print_summary(&report);
	print_records(&report.select(&args.only, min_confidence), args.limit);

	if let Some(path) = &args.report {
		let json = serde_json::to_string_pretty(&report)?;
		std::fs::write(path, json).with_context(|| format!("writing report {}", path.display()))?;
		println!("📝 Report written to {}", path.display());
	}
	Ok(())
}

fn print_summary(report: &ScanReport) {
	let stats = &report.statistics;
	println!();
	if report.cancelled {
		println!("⚠️  Scan cancelled, results are partial");
	} else {
		println!("✅ Scan completed");
	}
	println!("📊 Session ID: {}", report.session_id);
	println!("🔑 Root access: {}", if report.has_root_access { "yes" } else { "no" });
	println!("📈 Records: {} ({})", stats.total_files, format_size(stats.total_size, BINARY));
	println!(
		"🎯 Confidence: {} high, {} medium, {} low",
		stats.high_confidence_files, stats.medium_confidence_files, stats.low_confidence_files
	);
	for (source, count) in &stats.by_source {
		println!("   {:<18} {}", source, count);
	}
	for failure in &report.failures {
		println!("❌ {} failed: {}", failure.scanner, failure.message);
	}
}

fn print_records(records: &[&RecoverableRecord], limit: usize) {
	if records.is_empty() {
		return;
	}
	println!();
	println!(
		"{:>5}  {:>10}  {:<10}  {:<16}  {:<36}  NAME",
		"CONF", "SIZE", "CATEGORY", "SOURCE", "ID"
	);
	for record in records.iter().take(limit) {
		println!(
			"{:>5.2}  {:>10}  {:<10}  {:<16}  {:<36}  {}",
			record.confidence,
			format_size(record.size_bytes, BINARY),
			record.category().name(),
			record.recovery_source.to_string(),
			record.id,
			record.name
		);
	}
	if records.len() > limit {
		println!("... and {} more", records.len() - limit);
	}
}

fn recover(args: RecoverArgs) -> Result<()> {
	let json = std::fs::read_to_string(&args.report)
		.with_context(|| format!("reading report {}", args.report.display()))?;
	let report: ScanReport = serde_json::from_str(&json)
		.with_context(|| format!("parsing report {}", args.report.display()))?;

	let records: Vec<RecoverableRecord> = report
		.select(&args.only, args.min_confidence)
		.into_iter()
		.filter(|r| args.ids.is_empty() || args.ids.iter().any(|id| *id == r.id.to_string()))
		.cloned()
		.collect();
	if records.is_empty() {
		println!("Nothing to recover");
		return Ok(());
	}

	std::fs::create_dir_all(&args.out)
		.with_context(|| format!("creating {}", args.out.display()))?;

	let executor = RecoveryExecutor::new(RecoveryConfig {
		verify_after_copy: args.verify,
		..RecoveryConfig::default()
	});
	let bar = RecoveryBar::new(records.len())?;
	let recovery = executor.recover_all(&records, &args.out, |fraction, name, recovered| {
		bar.update(fraction, name, recovered)
	});
	bar.finish(format!(
		"{} of {} recovered ({})",
		recovery.recovered_files,
		recovery.total_files,
		format_size(recovery.total_bytes_recovered, BINARY)
	));

	for outcome in &recovery.outcomes {
		if let RecoveryStatus::Failed { kind, message } = &outcome.status {
			let name = records
				.iter()
				.find(|r| r.id == outcome.record_id)
				.map(|r| r.name.as_str())
				.unwrap_or("?");
			println!("❌ {} ({:?}): {}", name, kind, message);
		}
	}

	let manifest = HashManifest::from_report(&recovery);
	let manifest_path = args.out.join(MANIFEST_NAME);
	manifest
		.export_json(&manifest_path)
		.with_context(|| format!("writing manifest {}", manifest_path.display()))?;
	println!("📝 Manifest written to {}", manifest_path.display());

	if args.verify {
		let summary = manifest.verify_all(&args.out)?;
		for check in &summary.verifications {
			if check.status == VerificationStatus::Corrupted {
				println!("❌ Hash mismatch: {}", check.file_path);
			}
		}
		println!(
			"🔒 Verified {} of {} ({} corrupted)",
			summary.verified, summary.total_files, summary.corrupted
		);
		if summary.corrupted > 0 {
			bail!("{} recovered files failed verification", summary.corrupted);
		}
	}
	Ok(())
}

fn classify_file(path: &Path, mime: Option<&str>) -> Result<()> {
	let mut header = Vec::with_capacity(HEADER_PROBE_LEN);
	std::fs::File::open(path)
		.with_context(|| format!("opening {}", path.display()))?
		.take(HEADER_PROBE_LEN as u64)
		.read_to_end(&mut header)?;

	let extension = path.extension().and_then(|e| e.to_str());
	let file_type = classify(
		Classification::bytes(&header)
			.with_extension(extension)
			.with_mime(mime),
	);
	println!("{}: {:?} ({}, {})", path.display(), file_type, file_type.mime_type(), file_type.category().name());
	Ok(())
}
