//! blobcarve - Locate and carve embedded data objects out of binary blobs
//!
//! This tool scans files for embedded compressed streams and filesystem
//! images, reports the exact byte range of each, and optionally writes the
//! ranges out as separate files ready for a format-specific extractor.

use anyhow::{bail, Context, Result};
use blobcarve_core::{Format, ScanResult, ScanStrategy, Scanner, ScannerConfig};
use clap::{Args, Parser};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Locate and carve embedded data objects out of binary blobs
#[derive(Parser, Debug)]
#[command(name = "blobcarve")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Output directory for carved chunks
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only look for these formats (repeatable; default: all)
    #[arg(long = "format", value_name = "FORMAT", value_parser = parse_format)]
    formats: Vec<Format>,

    /// Maximum number of chunks to report per file (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_chunks: usize,

    /// Write every chunk to the output directory
    #[arg(long)]
    carve: bool,

    /// Print the extraction command for every carved chunk
    #[arg(long, requires = "carve")]
    commands: bool,

    /// Dry run - don't write files, just show what would be carved
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing files without prompting
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single blob to scan
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of blobs to scan
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

fn parse_format(s: &str) -> std::result::Result<Format, String> {
    s.parse::<Format>().map_err(|e| e.to_string())
}

/// Tracks carved chunk contents for deduplication
#[derive(Default)]
struct CarveRegistry {
    /// Content hashes of chunks already written
    seen: HashSet<String>,
    /// Statistics
    stats: RegistryStats,
}

#[derive(Default)]
struct RegistryStats {
    total_found: usize,
    duplicates_skipped: usize,
    written: usize,
}

impl CarveRegistry {
    fn new() -> Self {
        Self::default()
    }

    /// Compute a short hash of the content (first 16 chars of blake3)
    fn content_hash(content: &[u8]) -> String {
        let hash = blake3::hash(content);
        hash.to_hex()[..16].to_string()
    }

    /// Register a chunk; returns false if identical content was already seen
    fn register(&mut self, content_hash: &str) -> bool {
        self.stats.total_found += 1;
        if !self.seen.insert(content_hash.to_string()) {
            debug!("Skipping duplicate chunk (hash: {})", content_hash);
            self.stats.duplicates_skipped += 1;
            return false;
        }
        true
    }

    fn print_summary(&self) {
        info!(
            "Summary: {} chunks found, {} duplicates skipped, {} written",
            self.stats.total_found, self.stats.duplicates_skipped, self.stats.written
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    // Dispatch based on input mode
    if let Some(ref file) = cli.input.file {
        process_single_file(&cli, file)
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(&cli, directory)
    } else {
        bail!("Either --file or --directory must be specified")
    }
}

fn scanner_config(cli: &Cli) -> ScannerConfig {
    let config = ScannerConfig::new().max_chunks(cli.max_chunks);
    if cli.formats.is_empty() {
        config
    } else {
        config.formats(cli.formats.iter().copied())
    }
}

/// Process a single blob
fn process_single_file(cli: &Cli, file: &Path) -> Result<()> {
    if !file.exists() {
        bail!("Input file does not exist: {}", file.display());
    }
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    let mut registry = CarveRegistry::new();
    process_blob(cli, file, &mut registry)?;

    if cli.carve && !cli.dry_run {
        registry.print_summary();
    }

    Ok(())
}

/// Process a directory of blobs recursively
fn process_directory(cli: &Cli, directory: &Path) -> Result<()> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut registry = CarveRegistry::new();
    let mut blobs_processed = 0;

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        // Skip hidden files
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false)
        {
            continue;
        }

        debug!("Processing blob: {}", path.display());
        if let Err(e) = process_blob(cli, path, &mut registry) {
            // Log error but continue with other files
            warn!("Error processing {}: {}", path.display(), e);
        }
        blobs_processed += 1;
    }

    info!("Processed {} blobs", blobs_processed);

    if cli.carve && !cli.dry_run {
        registry.print_summary();
    }

    Ok(())
}

/// File name for a carved chunk: `<stem>_<start>-<end>.<format>`
fn chunk_file_name(blob: &Path, result: &ScanResult) -> String {
    let stem = blob
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("blob");
    format!(
        "{}_{}-{}.{}",
        stem,
        result.chunk.start_offset(),
        result.chunk.end_offset(),
        result.format
    )
}

/// Scan one blob and report or carve its chunks
fn process_blob(cli: &Cli, blob_path: &Path, registry: &mut CarveRegistry) -> Result<()> {
    trace!("Reading {}", blob_path.display());
    let data = fs::read(blob_path)
        .with_context(|| format!("Failed to read input file: {}", blob_path.display()))?;

    trace!("Read {} bytes from {}", data.len(), blob_path.display());

    let scanner = Scanner::with_config(scanner_config(cli));
    let results = scanner
        .scan(&data)
        .with_context(|| format!("Failed to scan blob: {}", blob_path.display()))?;

    if results.is_empty() {
        trace!("No chunks found in {}", blob_path.display());
        return Ok(());
    }

    debug!(
        "Found {} chunk(s) in {}",
        results.len(),
        blob_path.display()
    );

    for result in &results {
        println!(
            "{}\t{}\t{}\t{} bytes",
            blob_path.display(),
            result.format,
            result.chunk,
            result.chunk.len()
        );

        if !cli.carve {
            continue;
        }

        let content = result.slice(&data);
        if !registry.register(&CarveRegistry::content_hash(content)) {
            continue;
        }

        let output_path = cli.output.join(chunk_file_name(blob_path, result));
        if cli.dry_run {
            println!("Would write: {}", output_path.display());
        } else {
            match write_chunk_file(&output_path, content, cli.force) {
                Ok(()) => {
                    println!("Wrote {}", output_path.display());
                    registry.stats.written += 1;
                }
                Err(e) => {
                    error!("Failed to write {}: {}", output_path.display(), e);
                    continue;
                }
            }
        }

        if cli.commands {
            let mut extract_dir = output_path.clone().into_os_string();
            extract_dir.push("_extract");
            let command = result
                .format
                .handler()
                .extraction_command(&output_path, Path::new(&extract_dir));
            println!("{}", render_command(&command));
        }
    }

    Ok(())
}

/// Render an argument list as a single shell-like line
fn render_command(command: &[OsString]) -> String {
    command
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Write a carved chunk to disk
fn write_chunk_file(output_path: &Path, content: &[u8], force: bool) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    if output_path.exists() && !force {
        bail!(
            "File already exists: {} (use --force to overwrite)",
            output_path.display()
        );
    }

    let mut file = fs::File::create(output_path)
        .with_context(|| format!("Failed to create file: {}", output_path.display()))?;

    file.write_all(content)
        .with_context(|| format!("Failed to write file: {}", output_path.display()))?;

    Ok(())
}
