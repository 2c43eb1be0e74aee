//! Event descriptors: selector parsing and sampling-mode resolution.
//!
//! A descriptor names a counter (`type`/`config` pair), how fast to sample it
//! (frequency or fixed period), and, derived at negotiation time, which
//! fields its sample records will carry. Opening descriptors against the
//! kernel lives in [`negotiator`]; the raw ABI in [`sys`].

pub mod negotiator;
pub mod sys;
pub mod targets;

pub use negotiator::{negotiate, EventGroup, OpenedEvent};
pub use targets::TargetSet;

use crate::domain::ProfilerError;

/// One counter to sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDesc {
    pub type_: u32,
    pub config: u64,
    pub name: String,
    /// Explicit fixed period from the selector (`name/period=N/`), which
    /// wins over the global frequency.
    pub period: Option<u64>,
}

/// Exactly one of the two sampling-rate strategies is active per descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    /// Target samples per second; the kernel adjusts the period on the fly.
    Frequency(u64),
    /// Fixed event count between samples.
    Period(u64),
}

/// Global rate options from the command line.
#[derive(Debug, Clone, Copy)]
pub struct SamplingConfig {
    /// `-c`: fixed period. When set (non-zero), frequency is ignored.
    pub count: Option<u64>,
    /// `-F`: sampling frequency in Hz.
    pub freq: u64,
}

impl EventDesc {
    /// The counter used when no `-e` is given.
    pub fn default_event() -> Self {
        Self {
            type_: sys::PERF_TYPE_HARDWARE,
            config: sys::PERF_COUNT_HW_CPU_CYCLES,
            name: "cycles".into(),
            period: None,
        }
    }

    /// The hrtimer-based software clock, always available even without PMU
    /// support. Substituted for the default cycle counter on `ENOENT`.
    pub fn cpu_clock_fallback(&self) -> Self {
        Self {
            type_: sys::PERF_TYPE_SOFTWARE,
            config: sys::PERF_COUNT_SW_CPU_CLOCK,
            name: "cpu-clock".into(),
            period: self.period,
        }
    }

    /// True for the default hardware cycle counter, the only descriptor
    /// eligible for the software fallback.
    pub fn is_default_cycles(&self) -> bool {
        self.type_ == sys::PERF_TYPE_HARDWARE && self.config == sys::PERF_COUNT_HW_CPU_CYCLES
    }

    /// Parse an event selector: a counter name, optionally followed by
    /// `/period=N/` to pin this descriptor to a fixed period.
    pub fn parse(selector: &str) -> Result<Self, ProfilerError> {
        let (name, rest) = match selector.split_once('/') {
            Some((name, rest)) => (name, Some(rest)),
            None => (selector, None),
        };
        let period = match rest {
            None => None,
            Some(rest) => {
                let inner = rest
                    .strip_suffix('/')
                    .and_then(|r| r.strip_prefix("period="))
                    .ok_or_else(|| ProfilerError::UnknownEvent(selector.to_string()))?;
                let n: u64 = inner
                    .parse()
                    .map_err(|_| ProfilerError::UnknownEvent(selector.to_string()))?;
                Some(n)
            }
        };

        let (type_, config) = lookup_named(name)
            .or_else(|| parse_raw(name))
            .ok_or_else(|| ProfilerError::UnknownEvent(selector.to_string()))?;
        Ok(Self { type_, config, name: name.to_string(), period })
    }
}

fn lookup_named(name: &str) -> Option<(u32, u64)> {
    use sys::{PERF_TYPE_HARDWARE as HW, PERF_TYPE_SOFTWARE as SW};
    let pair = match name {
        "cycles" | "cpu-cycles" => (HW, sys::PERF_COUNT_HW_CPU_CYCLES),
        "instructions" => (HW, sys::PERF_COUNT_HW_INSTRUCTIONS),
        "cache-references" => (HW, sys::PERF_COUNT_HW_CACHE_REFERENCES),
        "cache-misses" => (HW, sys::PERF_COUNT_HW_CACHE_MISSES),
        "branches" | "branch-instructions" => (HW, sys::PERF_COUNT_HW_BRANCH_INSTRUCTIONS),
        "branch-misses" => (HW, sys::PERF_COUNT_HW_BRANCH_MISSES),
        "cpu-clock" => (SW, sys::PERF_COUNT_SW_CPU_CLOCK),
        "task-clock" => (SW, sys::PERF_COUNT_SW_TASK_CLOCK),
        "page-faults" | "faults" => (SW, sys::PERF_COUNT_SW_PAGE_FAULTS),
        "minor-faults" => (SW, sys::PERF_COUNT_SW_PAGE_FAULTS_MIN),
        "major-faults" => (SW, sys::PERF_COUNT_SW_PAGE_FAULTS_MAJ),
        "context-switches" | "cs" => (SW, sys::PERF_COUNT_SW_CONTEXT_SWITCHES),
        _ => return None,
    };
    Some(pair)
}

/// `rNNN`: raw hardware event, hex config.
fn parse_raw(name: &str) -> Option<(u32, u64)> {
    let hex = name.strip_prefix('r')?;
    let config = u64::from_str_radix(hex, 16).ok()?;
    Some((sys::PERF_TYPE_RAW, config))
}

/// Resolve each descriptor's sampling mode from the global rate options.
///
/// A `-c` count puts everything without its own period into fixed-period
/// mode; otherwise the frequency applies. Both zero is refused before any
/// open attempt.
pub fn resolve_modes(
    descs: &[EventDesc],
    cfg: SamplingConfig,
) -> Result<Vec<SamplingMode>, ProfilerError> {
    let default = match cfg.count {
        Some(count) if count > 0 => SamplingMode::Period(count),
        _ if cfg.freq > 0 => SamplingMode::Frequency(cfg.freq),
        _ => return Err(ProfilerError::InvalidConfiguration),
    };
    Ok(descs
        .iter()
        .map(|d| d.period.map_or(default, SamplingMode::Period))
        .collect())
}

/// Which fields this descriptor's sample records will carry.
///
/// Instruction pointer and task id are always on. The period travels in the
/// record only in frequency mode, where it varies; in fixed-period mode the
/// weight is known from the descriptor. With several descriptors open, a
/// sample identifier lets records be demuxed back to their owner.
pub fn derive_sample_type(mode: SamplingMode, multiple_events: bool) -> u64 {
    let mut st = sys::PERF_SAMPLE_IP | sys::PERF_SAMPLE_TID;
    if matches!(mode, SamplingMode::Frequency(_)) {
        st |= sys::PERF_SAMPLE_PERIOD;
    }
    if multiple_events {
        st |= sys::PERF_SAMPLE_ID;
    }
    st
}

pub fn derive_read_format(multiple_events: bool) -> u64 {
    if multiple_events {
        sys::PERF_FORMAT_ID
    } else {
        0
    }
}
