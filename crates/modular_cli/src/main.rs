//! modular-perf: run a saved patch headlessly and watch its CPU load.
//!
//! Useful for testing a patch without an audio host attached:
//!
//! - `run`: drive the patch with the fallback clock and print periodic
//!   load snapshots
//! - `stats`: run quietly, print one final summary
//! - `validate`: load a patch and report its module/cable counts without
//!   running it at all

use clap::{Parser, Subcommand};
use colored::Colorize;
use modular_cli::config::EngineConfig;
use modular_cli::patch;
use modular_core::fallback_clock::FallbackClock;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

/// Run and monitor a modular synthesizer patch headlessly.
#[derive(Parser)]
#[command(name = "modular-perf")]
#[command(about = "Run a patch and report CPU load / fault statistics")]
#[command(version)]
struct Cli {
    /// Path to an EngineConfig TOML file (sample rate, worker threads, block size)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    sample_rate: Option<f32>,

    #[arg(long, global = true)]
    workers: Option<usize>,

    #[arg(long, global = true)]
    block_frames: Option<usize>,

    #[arg(long, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a patch, printing periodic CPU load snapshots.
    Run {
        patch: PathBuf,

        /// How long to run, in seconds.
        #[arg(long, default_value_t = 10.0)]
        seconds: f32,

        /// How often to print a load snapshot, in milliseconds.
        #[arg(long, default_value_t = 500)]
        report_interval_ms: u64,
    },

    /// Run a patch quietly and print one final load summary.
    Stats {
        patch: PathBuf,

        #[arg(long, default_value_t = 10.0)]
        seconds: f32,
    },

    /// Load a patch and report its module/cable counts without running it.
    Validate { patch: PathBuf },
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let config = match EngineConfig::load(cli.config.as_deref()) {
        Ok(c) => c.with_overrides(cli.sample_rate, cli.workers, cli.block_frames),
        Err(e) => {
            eprintln!("{}", e.red());
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Run {
            patch,
            seconds,
            report_interval_ms,
        } => cmd_run(&patch, &config, seconds, report_interval_ms, cli.format),
        Commands::Stats { patch, seconds } => cmd_stats(&patch, &config, seconds, cli.format),
        Commands::Validate { patch } => cmd_validate(&patch, cli.format),
    }
}

fn print_load_row(label: &str, frames: u64, blocks: u64, average: f32, peak: f32, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            println!(
                "{:>8} frames={:>10} blocks={:>8} avg={:>8} peak={:>8}",
                label,
                frames,
                blocks,
                format!("{:.1}%", average * 100.0).yellow(),
                format!("{:.1}%", peak * 100.0).red(),
            );
        }
        OutputFormat::Json => {
            let obj = serde_json::json!({
                "label": label,
                "frames": frames,
                "blocks": blocks,
                "average": average,
                "peak": peak,
            });
            println!("{obj}");
        }
    }
}

fn cmd_run(patch_path: &PathBuf, config: &EngineConfig, seconds: f32, report_interval_ms: u64, format: OutputFormat) {
    let graph = match patch::load_graph(patch_path, config.sample_rate, config.worker_threads) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("{}", e.red());
            std::process::exit(1);
        }
    };

    println!(
        "Loaded {}: {} modules, {} cables",
        patch_path.display(),
        graph.module_ids().len(),
        graph.cable_ids().len()
    );

    let clock = FallbackClock::spawn_with_block_size(graph.clone(), config.block_frames);

    let total = Duration::from_secs_f32(seconds.max(0.0));
    let interval = Duration::from_millis(report_interval_ms.max(1));
    let mut elapsed = Duration::ZERO;
    while elapsed < total {
        thread::sleep(interval.min(total - elapsed));
        elapsed += interval;
        let load = graph.cpu_load();
        print_load_row("t", graph.frame_count(), graph.block_count(), load.average, load.peak, format);
    }

    clock.stop();
}

fn cmd_stats(patch_path: &PathBuf, config: &EngineConfig, seconds: f32, format: OutputFormat) {
    let graph = match patch::load_graph(patch_path, config.sample_rate, config.worker_threads) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("{}", e.red());
            std::process::exit(1);
        }
    };

    let clock = FallbackClock::spawn_with_block_size(graph.clone(), config.block_frames);
    thread::sleep(Duration::from_secs_f32(seconds.max(0.0)));
    let load = graph.cpu_load();
    clock.stop();

    print_load_row("final", graph.frame_count(), graph.block_count(), load.average, load.peak, format);
}

fn cmd_validate(patch_path: &PathBuf, format: OutputFormat) {
    match patch::describe(patch_path) {
        Ok((modules, cables)) => match format {
            OutputFormat::Table => println!("{} {} modules, {} cables", "OK".green(), modules, cables),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"ok": true, "modules": modules, "cables": cables}))
            }
        },
        Err(e) => {
            match format {
                OutputFormat::Table => println!("{} {}", "FAILED".red(), e),
                OutputFormat::Json => println!("{}", serde_json::json!({"ok": false, "error": e})),
            }
            std::process::exit(1);
        }
    }
}
