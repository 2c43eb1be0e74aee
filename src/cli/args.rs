//! CLI argument definitions

use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(
    name = "ptop",
    about = "Live top-N view of performance counter samples, system-wide",
    after_help = "\
EXAMPLES:
    sudo ptop                          Sample cpu cycles at 1000 Hz
    sudo ptop -F 99                    Gentler sampling frequency
    sudo ptop -e cycles -e cache-misses -g   Two counters as one group
    sudo ptop -c 100000 -s comm        Fixed period, fold by command"
)]
pub struct Args {
    /// Event period to sample (fixed-period mode; overrides -F)
    #[arg(short, long, value_name = "N")]
    pub count: Option<u64>,

    /// Event selector, repeatable (e.g. cycles, cpu-clock, faults, r01c2)
    #[arg(short, long = "event", value_name = "EVENT")]
    pub events: Vec<String>,

    /// Profile at this frequency (Hz)
    #[arg(short = 'F', long, default_value_t = 1000, value_name = "HZ")]
    pub freq: u64,

    /// Put the counters into a counter group
    #[arg(short, long)]
    pub group: bool,

    /// Child tasks inherit counters
    #[arg(short, long)]
    pub inherit: bool,

    /// Number of mmap data pages per counter
    #[arg(short, long, default_value_t = 128, value_name = "PAGES")]
    pub mmap_pages: u32,

    /// Sort by key(s): pid, comm, dso, symbol
    #[arg(short, long, default_value = "comm,dso,symbol", value_name = "KEYS")]
    pub sort: String,

    /// Be more verbose (repeat for debug output)
    #[arg(short, action = ArgAction::Count)]
    pub verbose: u8,
}
