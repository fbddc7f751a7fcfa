//! Thin CLI entrypoint (§1 Non-goal: "the top-level CLI main" is out of
//! scope for the core; this binary is the minimal interface the core is
//! specified by). Parses argv into a [`cratesync::config::SyncConfig`],
//! wires up a console [`Logger`], runs the pipeline, and prints the final
//! summary — the same shape as a teacher `commands/*.rs` leaf command:
//! parse argv, call the real logic, report the `Result`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use owo_colors::OwoColorize;

use cratesync::config::{DupeMovePolicy, SyncConfig};
use cratesync::counters::CountersSnapshot;
use cratesync::dupe_mover::FingerprintMode;
use cratesync::logger::Logger;
use cratesync::orchestrator;
use cratesync::track_index::DedupMode;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DedupModeArg {
    Off,
    Path,
    Filename,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DupeDetectionArg {
    Off,
    NameOnly,
    NameAndSize,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DupeMoveArg {
    Off,
    KeepNewest,
    KeepOldest,
}

/// Sync a music tree into a DJ application's on-disk library (§6.3 option table).
#[derive(Debug, Parser)]
#[command(name = "cratesync", version, about)]
struct Cli {
    /// Root of the filesystem tree to scan for media files.
    music_root: PathBuf,

    /// The host's per-drive library directory.
    library: PathBuf,

    /// Hierarchical parent crate segment (repeat for nested parents, e.g.
    /// `--parent-crate Current --parent-crate DJ`). `%%` is forbidden in any
    /// segment.
    #[arg(long = "parent-crate")]
    parent_crate: Vec<String>,

    /// Take a timestamped backup of the library before syncing.
    #[arg(long)]
    backup: bool,

    /// Destination directory for `--backup` snapshots.
    #[arg(long)]
    backup_root: Option<PathBuf>,

    /// Delete existing Crates/Subcrates/index before writing.
    #[arg(long)]
    clear_before_sync: bool,

    /// Skip tracks already present in the index or an existing crate.
    #[arg(long, value_enum, default_value = "off")]
    dedup_mode: DedupModeArg,

    /// Rebind broken crate track references and repair the index.
    #[arg(long)]
    fix_broken_paths: bool,

    /// Write the sidebar-order manifest after syncing.
    #[arg(long)]
    sort: bool,

    /// Fingerprint used to detect duplicate files before syncing.
    #[arg(long, value_enum, default_value = "off")]
    dupe_detection: DupeDetectionArg,

    /// Whether (and how) to move detected duplicates into quarantine.
    #[arg(long, value_enum, default_value = "off")]
    dupe_move: DupeMoveArg,

    /// Destination root for quarantined duplicates.
    #[arg(long)]
    quarantine_root: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> SyncConfig {
        let dupe_detection = match self.dupe_detection {
            DupeDetectionArg::Off => None,
            DupeDetectionArg::NameOnly => Some(FingerprintMode::NameOnly),
            DupeDetectionArg::NameAndSize => Some(FingerprintMode::NameAndSize),
        };
        let dupe_move = match self.dupe_move {
            DupeMoveArg::Off => DupeMovePolicy::Off,
            DupeMoveArg::KeepNewest => DupeMovePolicy::KeepNewest,
            DupeMoveArg::KeepOldest => DupeMovePolicy::KeepOldest,
        };
        let dedup_mode = match self.dedup_mode {
            DedupModeArg::Off => DedupMode::Off,
            DedupModeArg::Path => DedupMode::Path,
            DedupModeArg::Filename => DedupMode::Filename,
        };

        SyncConfig {
            music_root: self.music_root,
            library: self.library,
            parent_crate_name: self.parent_crate,
            backup: self.backup,
            backup_root: self.backup_root,
            clear_before_sync: self.clear_before_sync,
            skip_existing: dedup_mode != DedupMode::Off,
            dedup_mode,
            fix_broken_paths: self.fix_broken_paths,
            sort: self.sort,
            dupe_scan: dupe_detection.is_some(),
            dupe_detection,
            dupe_move,
            quarantine_root: self.quarantine_root,
        }
    }
}

/// Console logger: `info`/`progress` to stdout, `error`/`fatal` to stderr,
/// `confirm` prompts on stdin. The null-prompt-driver case (non-interactive
/// runs) is left to embedders with their own `Logger`; this one always
/// reads a real terminal answer.
struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn info(&self, msg: &str) {
        println!("{}", msg);
    }

    fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    fn progress(&self, task: &str, current: u64, total: u64) {
        println!("[{task}] {current}/{total}");
    }

    fn fatal(&self, msg: &str) {
        eprintln!("{} {}", "fatal:".red().bold(), msg);
    }

    fn confirm(&self, prompt: &str) -> bool {
        use std::io::Write;
        print!("{prompt} [y/N] ");
        let _ = std::io::stdout().flush();
        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

fn print_summary(snapshot: CountersSnapshot) {
    println!("{}", "sync complete".green().bold());
    println!("  tracks found:      {}", snapshot.tracks_found);
    println!("  crates updated:    {}", snapshot.crates_updated);
    println!("  crates skipped:    {}", snapshot.crates_skipped);
    println!("  paths fixed:       {}", snapshot.paths_fixed);
    println!("  duplicates moved:  {}", snapshot.duplicates_moved);
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let config = cli.into_config();
    let logger = ConsoleLogger;

    match orchestrator::run(&config, &logger) {
        Ok(snapshot) => {
            print_summary(snapshot);
            ExitCode::SUCCESS
        }
        Err(e) => {
            logger.fatal(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
