//! CLI binary for the weft schedule explorer.
//!
//! Runs the built-in demo programs under a search strategy, replays
//! persisted bug records and compares traces.
//!
//! # Usage
//!
//! ```bash
//! # List the built-in programs
//! weft list
//!
//! # Random search, 1000 iterations, stop at the first bug
//! weft run racy-counter --iterations 1000 --fail-fast --bug-dir bugs/
//!
//! # Conflict-guided search with settings from a file
//! weft run lock-order --config weft.json --strategy conflict
//!
//! # Reproduce a recorded bug
//! weft replay bugs/lock-order-deadlock-0003.json
//!
//! # Inspect a record, compare two records
//! weft show bugs/lock-order-deadlock-0003.json
//! weft verify a.json b.json
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use weft_explore::checker::Checker;
use weft_explore::config::{CheckerConfig, StrategyKind};
use weft_explore::programs;
use weft_explore::report::{format_replay, format_report};
use weft_replay::{format_bug_markdown, load_bug_record, BugRecord};
use weft_trace::verifier::DeterminismVerifier;

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Systematic concurrency testing by controlled scheduling")]
#[command(version)]
struct Cli {
    /// Log scheduling decisions (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in demo programs.
    List,

    /// Check a program under a search strategy.
    Run {
        /// Name of a built-in program (see `weft list`).
        program: String,

        /// JSON configuration file; flags below override it.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum number of iterations.
        #[arg(short, long)]
        iterations: Option<u64>,

        /// Search strategy: "random", "conflict" or "replay".
        #[arg(short, long)]
        strategy: Option<StrategyKind>,

        /// Random seed for reproducibility.
        #[arg(long)]
        seed: Option<u64>,

        /// Per-iteration event budget (0 = unlimited).
        #[arg(long)]
        max_events: Option<usize>,

        /// Stop at the first bug.
        #[arg(long)]
        fail_fast: bool,

        /// Directory for bug records and reports.
        #[arg(short, long)]
        bug_dir: Option<PathBuf>,

        /// Bug record followed by the replay strategy.
        #[arg(long)]
        replay_from: Option<PathBuf>,

        /// Max frontier size (conflict strategy).
        #[arg(long)]
        frontier_size: Option<usize>,

        /// Log progress every N iterations.
        #[arg(long)]
        progress_interval: Option<u64>,
    },

    /// Replay a bug record and check that it reproduces.
    Replay {
        /// Path to a bug record (.json).
        record: PathBuf,

        /// Per-iteration event budget (0 = unlimited).
        #[arg(long)]
        max_events: Option<usize>,
    },

    /// Print a bug record as a markdown report.
    Show {
        /// Path to a bug record (.json).
        record: PathBuf,
    },

    /// Compare the traces of two bug records.
    Verify {
        first: PathBuf,
        second: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // A run's config file can turn on verbose logging, so load it before
    // the logger is installed.
    let mut settings = match &cli.command {
        Commands::Run { config: Some(path), .. } => match CheckerConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        _ => CheckerConfig::default(),
    };
    settings.verbose |= cli.verbose;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(settings.log_filter())).init();

    match cli.command {
        Commands::List => cmd_list(),
        Commands::Run {
            program,
            config: _,
            iterations,
            strategy,
            seed,
            max_events,
            fail_fast,
            bug_dir,
            replay_from,
            frontier_size,
            progress_interval,
        } => {
            let mut base = settings;
            base.iterations = iterations.unwrap_or(base.iterations);
            base.strategy = strategy.unwrap_or(base.strategy);
            base.seed = seed.unwrap_or(base.seed);
            base.max_events = max_events.unwrap_or(base.max_events);
            base.fail_fast |= fail_fast;
            base.bug_dir = bug_dir.or(base.bug_dir);
            base.replay_from = replay_from.or(base.replay_from);
            base.frontier_size = frontier_size.unwrap_or(base.frontier_size);
            base.progress_interval = progress_interval.unwrap_or(base.progress_interval);
            cmd_run(&program, base)
        }
        Commands::Replay { record, max_events } => cmd_replay(&record, max_events),
        Commands::Show { record } => cmd_show(&record),
        Commands::Verify { first, second } => cmd_verify(&first, &second),
    }
}

fn cmd_list() {
    for demo in programs::catalog() {
        println!("{:<16} {}", demo.name, demo.description);
    }
}

fn cmd_run(name: &str, config: CheckerConfig) {
    let Some(demo) = programs::find(name) else {
        eprintln!("Error: unknown program '{}'. Use `weft list`.", name);
        std::process::exit(1);
    };

    eprintln!("═══════════════════════════════════════════════════════════════════════");
    eprintln!("  weft");
    eprintln!("═══════════════════════════════════════════════════════════════════════");
    eprintln!();
    eprintln!("Configuration:");
    eprintln!("  Program:        {}", demo.name);
    eprintln!("  Strategy:       {}", config.strategy);
    eprintln!("  Seed:           {}", config.seed);
    eprintln!("  Iterations:     {}", config.iterations);
    eprintln!("  Max events:     {}", config.max_events);
    eprintln!("  Fail fast:      {}", config.fail_fast);
    if let Some(ref dir) = config.bug_dir {
        eprintln!("  Bug dir:        {}", dir.display());
    }
    eprintln!();

    let checker = match Checker::new(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let report = match checker.check(demo.name, demo.program) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Check failed: {}", e);
            std::process::exit(2);
        }
    };

    println!("{}", format_report(&report));

    // Exit with error code if bugs found
    if report.found_bug() {
        std::process::exit(1);
    }
}

fn cmd_replay(path: &Path, max_events: Option<usize>) {
    let record = load_or_exit(path);
    let Some(demo) = programs::find(&record.program) else {
        eprintln!("Error: record refers to unknown program '{}'", record.program);
        std::process::exit(1);
    };

    let mut config = CheckerConfig {
        iterations: 1,
        strategy: StrategyKind::Replay,
        replay_from: Some(path.to_path_buf()),
        ..Default::default()
    };
    config.max_events = max_events.unwrap_or(config.max_events);

    let replay = match Checker::new(config).and_then(|c| c.replay(&record, demo.program)) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Replay failed: {}", e);
            std::process::exit(2);
        }
    };

    println!("{}", format_replay(&record, &replay));
    if !replay.reproduced(&record) {
        std::process::exit(1);
    }
}

fn cmd_show(path: &Path) {
    let record = load_or_exit(path);
    println!("{}", format_bug_markdown(&record));
}

fn cmd_verify(first: &Path, second: &Path) {
    let a = load_or_exit(first);
    let b = load_or_exit(second);
    let result = DeterminismVerifier::compare(&a.trace, &b.trace);
    println!("{}", result);
    if !result.is_deterministic {
        std::process::exit(1);
    }
}

fn load_or_exit(path: &Path) -> BugRecord {
    match load_bug_record(path) {
        Ok(record) => record,
        Err(e) => {
            eprintln!("Error: failed to load {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}
