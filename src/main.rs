//! # ptop - Main Entry Point
//!
//! Startup sequencing: preflight → event negotiation (with capability
//! fallback) → ring-buffer mapping → inventory synthesis → initial drain →
//! sampler thread + display loop. The display loop owns the terminal and
//! the only quit path; returning from `run` ends the sampler with the
//! process.

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};

use ptop::cli::Args;
use ptop::context::{SharedContext, TermGeometry};
use ptop::display;
use ptop::domain::ProfilerError;
use ptop::events::negotiator::OpenOptions;
use ptop::events::{self, EventDesc, SamplingConfig, TargetSet};
use ptop::hist::SortSpec;
use ptop::preflight;
use ptop::sampler::Sampler;
use ptop::session::Inventory;
use ptop::symbols::Resolver;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOPERM: i32 = 77;

fn main() {
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_code_for(&e)
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ProfilerError>() {
        Some(ProfilerError::Privilege { .. }) => EXIT_NOPERM,
        _ => EXIT_ERROR,
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::from_default_env().filter_level(level).init();
}

fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    preflight::run_preflight_checks()?;

    // Descriptors: explicit selectors, or the default cycle counter
    let descs = if args.events.is_empty() {
        vec![EventDesc::default_event()]
    } else {
        args.events
            .iter()
            .map(|s| EventDesc::parse(s))
            .collect::<Result<Vec<_>, _>>()?
    };
    let sort = SortSpec::parse(&args.sort)?;

    // Refused before any open attempt
    let modes =
        events::resolve_modes(&descs, SamplingConfig { count: args.count, freq: args.freq })?;

    let targets = TargetSet::all_cpus()?;
    info!("opening {} event(s) on {} CPUs", descs.len(), targets.cpus.len());

    let mut group = events::negotiate(
        descs,
        modes,
        &targets,
        OpenOptions { inherit: args.inherit, group: args.group },
    )?;
    group.map_buffers(args.mmap_pages)?;

    // Baseline inventory before the first sample can arrive
    let inventory = Inventory::synthesize()?;
    let resolver = Resolver::new();

    let (cols, rows) = crossterm::terminal::size().context("failed to read terminal size")?;
    let ctx = Arc::new(SharedContext::new(
        group.events.iter().map(|e| e.desc.name.clone()).collect(),
        sort,
        TermGeometry { rows, cols },
    ));

    let mut sampler = Sampler::new(group, resolver, inventory, Arc::clone(&ctx));
    sampler.prime().context("waiting for initial counter activity")?;

    thread::Builder::new()
        .name("ptop-sampler".into())
        .spawn(move || sampler.run())
        .context("failed to spawn sampler thread")?;

    // Blocks until 'q'; ending it ends the process and the sampler with it
    display::run(&ctx)
}
