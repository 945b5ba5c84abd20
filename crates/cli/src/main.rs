//! Heterogeneous simulator CLI.
//!
//! This binary provides a single entry point for driving the simulator from files. It performs:
//! 1. **Check:** Parse and validate a configuration, build the memory system and print its shape.
//! 2. **Run:** Build a simulation, feed its cores from an instruction trace and schedule
//!    external accesses, run to completion and print statistics as JSON on stdout.
//! 3. **Checkpoint:** Optionally restore the memory state before the run and save it after.
//!
//! Diagnostics and the optional human-readable summary go to stderr.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{fs, io, process};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hetsim_core::common::data::AccessKind;
use hetsim_core::core::{Instruction, TraceSource};
use hetsim_core::{Config, SimError, Simulation};

#[derive(Parser, Debug)]
#[command(
    name = "hetsim",
    author,
    version,
    about = "Deterministic cycle-level simulator for coherent heterogeneous memory systems",
    long_about = "Build a memory hierarchy and timing cores from a JSON configuration, drive it with \
instruction traces or scheduled accesses, and report statistics.\n\nExamples:\n  hetsim check -c system.json\n  \
hetsim run -c system.json -t traces.json > stats.json\n  hetsim run -c system.json -a accesses.json --checkpoint warm.json --summary"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a configuration and print the resulting system.
    Check {
        /// Configuration file (JSON).
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Run a simulation.
    Run {
        /// Configuration file (JSON).
        #[arg(short, long)]
        config: PathBuf,

        /// Instruction traces: a JSON object mapping core names to instruction lists.
        #[arg(short, long)]
        trace: Option<PathBuf>,

        /// External accesses: a JSON list of scheduled accesses.
        #[arg(short, long)]
        accesses: Option<PathBuf>,

        /// Override the configured cycle limit.
        #[arg(long)]
        max_cycles: Option<u64>,

        /// Also print a human-readable summary on stderr.
        #[arg(long)]
        summary: bool,

        /// Restore memory state from a checkpoint before running.
        #[arg(long)]
        restore: Option<PathBuf>,

        /// Save memory state to a checkpoint after the run.
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },
}

/// One access of an `--accesses` file.
#[derive(Debug, Deserialize)]
struct ScheduledAccess {
    /// Cycles after the start of the run.
    #[serde(default)]
    delay: i64,
    /// Entry module name.
    module: String,
    /// Access kind.
    kind: AccessKind,
    /// Byte address.
    addr: u64,
    /// Word to store.
    #[serde(default)]
    value: u64,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Check { config } => cmd_check(&config),
        Commands::Run {
            config,
            trace,
            accesses,
            max_cycles,
            summary,
            restore,
            checkpoint,
        } => cmd_run(&RunArgs {
            config,
            trace,
            accesses,
            max_cycles,
            summary,
            restore,
            checkpoint,
        }),
    };

    if let Err(e) = result {
        error!("{e}");
        eprintln!("[!] {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read(path: &Path) -> Result<String, SimError> {
    fs::read_to_string(path)
        .map_err(|e| SimError::InvalidRequest(format!("cannot read {}: {e}", path.display())))
}

fn write(path: &Path, contents: &str) -> Result<(), SimError> {
    fs::write(path, contents)
        .map_err(|e| SimError::InvalidRequest(format!("cannot write {}: {e}", path.display())))
}

fn load_config(path: &Path) -> Result<Config, SimError> {
    Ok(Config::from_json(&read(path)?)?)
}

fn cmd_check(path: &Path) -> Result<(), SimError> {
    let config = load_config(path)?;
    let sim = Simulation::new(config)?;
    let memory = sim.memory();

    println!("Configuration: {}", path.display());
    println!("  Topology: {:?}", memory.network().topology());
    for m in memory.modules() {
        let g = m.geometry();
        let low = m
            .low()
            .and_then(|l| memory.module(l))
            .map_or("-", |l| l.name());
        println!(
            "  {:<12} {:?}  {} sets x {} ways x {} B  low={}",
            m.name(),
            m.kind(),
            g.num_sets,
            g.num_ways,
            g.block_size,
            low
        );
    }
    for c in &sim.config().cores {
        println!("  core {:<7} entry={}", c.name, c.entry);
    }
    println!("[*] OK");
    Ok(())
}

struct RunArgs {
    config: PathBuf,
    trace: Option<PathBuf>,
    accesses: Option<PathBuf>,
    max_cycles: Option<u64>,
    summary: bool,
    restore: Option<PathBuf>,
    checkpoint: Option<PathBuf>,
}

fn cmd_run(args: &RunArgs) -> Result<(), SimError> {
    let mut config = load_config(&args.config)?;
    if args.max_cycles.is_some() {
        config.general.max_cycles = args.max_cycles;
    }

    let mut sim = match &args.restore {
        Some(path) => Simulation::deserialize(config, &read(path)?)?,
        None => Simulation::new(config)?,
    };

    if let Some(path) = &args.trace {
        let traces: BTreeMap<String, Vec<Instruction>> = serde_json::from_str(&read(path)?)
            .map_err(|e| SimError::InvalidRequest(format!("malformed trace file: {e}")))?;
        for (core, insts) in traces {
            info!(core = %core, instructions = insts.len(), "attaching trace");
            sim.attach_source(&core, Box::new(TraceSource::new(insts)))?;
        }
    }

    if let Some(path) = &args.accesses {
        let accesses: Vec<ScheduledAccess> = serde_json::from_str(&read(path)?)
            .map_err(|e| SimError::InvalidRequest(format!("malformed access file: {e}")))?;
        for a in &accesses {
            let _ = sim.schedule_access(a.delay, &a.module, a.kind, a.addr, a.value)?;
        }
    }

    let summary = sim.run()?;
    info!(
        cycle = summary.cycle,
        finish = ?summary.finish,
        events = summary.dispatched,
        "run finished"
    );

    let stats = sim.stats();
    if args.summary {
        stats
            .write_summary(&mut io::stderr().lock())
            .map_err(|e| SimError::InvalidRequest(format!("cannot write summary: {e}")))?;
    }
    let json = serde_json::to_string_pretty(&stats)
        .map_err(|e| SimError::InvalidRequest(format!("cannot encode statistics: {e}")))?;
    println!("{json}");

    if let Some(path) = &args.checkpoint {
        write(path, &sim.serialize()?)?;
        info!(path = %path.display(), "checkpoint written");
    }
    Ok(())
}
