//! modular-bench: throughput benchmark harness for the engine.
//!
//! Drives `Graph::step_block` directly rather than through the fallback
//! clock, so timing reflects pure worker-pool throughput rather than the
//! fallback clock's own sleep/deadline pacing. Lets native profiling tools
//! (samply, Instruments, perf) attach without an N-API or cpal dependency.
//!
//! Usage:
//!   modular-bench run patches/sine_to_gain.json --frames 1000000
//!   modular-bench list
//!   samply record ./target/profiling/modular-bench run patches/sine_to_gain.json

use clap::{Parser, Subcommand};
use modular_cli::patch;
use modular_core::Graph;
use std::fs;
use std::hint::black_box;
use std::path::PathBuf;
use std::time::Instant;

#[cfg(feature = "profile")]
use tracing_subscriber::layer::SubscriberExt;

const DEFAULT_SAMPLE_RATE: f32 = 48_000.0;
const DEFAULT_BLOCK_FRAMES: usize = 256;
const DEFAULT_FRAMES: u64 = 48_000 * 10; // 10 seconds at 48kHz
const DEFAULT_WARMUP_FRAMES: u64 = 48_000;

/// Benchmark harness for the modular synthesizer engine
#[derive(Parser)]
#[command(name = "modular-bench")]
#[command(about = "Profile and benchmark the modular synthesizer engine's worker pool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a benchmark against a patch file
    Run {
        /// Path to the patch JSON file
        patch: PathBuf,

        /// Total number of audio frames to process
        #[arg(short, long, default_value_t = DEFAULT_FRAMES)]
        frames: u64,

        /// Sample rate in Hz
        #[arg(short, long, default_value_t = DEFAULT_SAMPLE_RATE)]
        sample_rate: f32,

        /// Frames per `step_block` call
        #[arg(long, default_value_t = DEFAULT_BLOCK_FRAMES)]
        block_frames: usize,

        /// Worker threads in the pool
        #[arg(short, long, default_value_t = 1)]
        workers: usize,

        /// Warmup frames before measurement
        #[arg(long, default_value_t = DEFAULT_WARMUP_FRAMES)]
        warmup: u64,

        /// Print the CPU meter's reading after the run
        #[arg(long)]
        stats: bool,
    },

    /// List available benchmark patches
    List,

    /// Run a quick smoke test with all patches
    Smoke {
        /// Frames per patch for the smoke test
        #[arg(short, long, default_value_t = 4_800)]
        frames: u64,
    },
}

fn main() {
    // Initialize Tracy if the profile feature is enabled.
    #[cfg(feature = "profile")]
    {
        use tracing_subscriber::prelude::*;
        let tracy_layer = tracing_tracy::TracyLayer::default();
        tracing_subscriber::registry().with(tracy_layer).init();
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            patch,
            frames,
            sample_rate,
            block_frames,
            workers,
            warmup,
            stats,
        } => run_benchmark(&patch, frames, sample_rate, block_frames, workers, warmup, stats),
        Commands::List => list_patches(),
        Commands::Smoke { frames } => smoke_test(frames),
    }
}

/// Step `graph` in `block_frames`-sized chunks until `total_frames` have
/// elapsed, discarding the report each block returns except to keep the
/// optimizer from eliding the call entirely.
fn run_blocks(graph: &Graph, total_frames: u64, block_frames: usize) {
    let mut remaining = total_frames;
    while remaining > 0 {
        let this_block = (block_frames as u64).min(remaining).max(1) as usize;
        let report = graph.step_block(this_block);
        black_box(&report);
        remaining -= this_block as u64;
    }
}

#[allow(clippy::too_many_arguments)]
fn run_benchmark(
    patch_path: &PathBuf,
    frames: u64,
    sample_rate: f32,
    block_frames: usize,
    workers: usize,
    warmup: u64,
    print_stats: bool,
) {
    let graph = patch::load_graph(patch_path, sample_rate, workers)
        .unwrap_or_else(|e| panic!("{e}"));

    println!(
        "Loaded patch: {} modules, {} cables",
        graph.module_ids().len(),
        graph.cable_ids().len()
    );

    println!(
        "\nRunning benchmark: {} frames ({:.2}s at {}Hz), block size {}",
        frames,
        frames as f64 / sample_rate as f64,
        sample_rate,
        block_frames,
    );
    println!("  Warmup:  {warmup} frames");
    println!("  Workers: {workers}");

    print!("Warming up...");
    run_blocks(&graph, warmup, block_frames);
    println!(" done");

    print!("Benchmarking...");
    let start = Instant::now();
    run_blocks(&graph, frames, block_frames);
    let elapsed = start.elapsed();
    println!(" done\n");

    let total_ns = elapsed.as_nanos() as f64;
    let ns_per_frame = total_ns / frames as f64;
    let frames_per_sec = 1_000_000_000.0 / ns_per_frame;
    let realtime_budget_ns = 1_000_000_000.0 / sample_rate as f64;
    let budget_usage = (ns_per_frame / realtime_budget_ns) * 100.0;

    println!("Results:");
    println!("  Total time:       {elapsed:?}");
    println!("  Frames:           {frames}");
    println!("  ns/frame:         {ns_per_frame:.2}");
    println!("  frames/sec:       {frames_per_sec:.0}");
    println!("  Real-time budget: {realtime_budget_ns:.2} ns/frame @ {sample_rate}Hz");
    println!("  Budget usage:     {budget_usage:.2}%");

    if budget_usage > 100.0 {
        println!("\n  WARNING: exceeds real-time budget");
    } else {
        println!("\n  within real-time budget ({:.1}x headroom)", 100.0 / budget_usage);
    }

    if print_stats {
        let load = graph.cpu_load();
        println!("\nMeter (block-level EMA / peak over the benchmark run):");
        println!("  average: {:.2}%", load.average * 100.0);
        println!("  peak:    {:.2}%", load.peak * 100.0);
    }
}

fn patches_dir() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()));

    let candidates = [
        PathBuf::from("patches"),
        PathBuf::from("crates/modular_cli/patches"),
        exe_dir.clone().map(|p| p.join("patches")).unwrap_or_default(),
        exe_dir
            .map(|p| p.join("../../../crates/modular_cli/patches"))
            .unwrap_or_default(),
    ];

    for path in &candidates {
        if path.exists() && path.is_dir() {
            return path.clone();
        }
    }

    PathBuf::from("crates/modular_cli/patches")
}

fn json_patch_files(dir: &PathBuf) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
                .collect()
        })
        .unwrap_or_default()
}

fn list_patches() {
    let dir = patches_dir();
    println!("Patches directory: {dir:?}");

    if !dir.exists() {
        println!("  (directory does not exist - create patches here)");
        return;
    }

    let files = json_patch_files(&dir);
    if files.is_empty() {
        println!("  (no .json patches found)");
        return;
    }

    println!("\nAvailable patches:");
    for path in files {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        match patch::describe(&path) {
            Ok((modules, cables)) => println!("  {name} ({modules} modules, {cables} cables)"),
            Err(e) => println!("  {name} (invalid: {e})"),
        }
    }
}

fn smoke_test(frames: u64) {
    let dir = patches_dir();
    println!("Running smoke test with {frames} frames per patch\n");

    if !dir.exists() {
        println!("No patches directory found at {dir:?}");
        return;
    }

    for path in json_patch_files(&dir) {
        let name = path.file_name().unwrap_or_default().to_string_lossy().to_string();
        print!("Testing {name}... ");

        match patch::load_graph(&path, DEFAULT_SAMPLE_RATE, 1) {
            Ok(graph) => {
                let start = Instant::now();
                run_blocks(&graph, frames, DEFAULT_BLOCK_FRAMES);
                let elapsed = start.elapsed();
                let ns_per_frame = elapsed.as_nanos() as f64 / frames as f64;
                println!("OK ({ns_per_frame:.2} ns/frame)");
            }
            Err(e) => println!("FAILED: {e}"),
        }
    }
}
