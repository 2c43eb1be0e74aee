//! Weighted histogram of execution locations.
//!
//! One table per open event. Insertion accumulates the sample period into
//! the entry keyed by the resolved location; entries are never deleted, only
//! re-ranked. Ranking happens in [`HistTable::collapse_and_resort`], which
//! merges entries that compare equal under the configured sort keys and
//! orders the survivors by descending weight with a deterministic lexical
//! tie-break, so repeated resorts of unchanged data are stable.

pub mod sort;

pub use sort::{SortField, SortSpec};

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::domain::Pid;
use crate::events::sys;

/// Resolved symbol, or the raw sampled address when resolution failed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeySymbol {
    Name(String),
    Addr(u64),
}

impl fmt::Display for KeySymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Addr(addr) => write!(f, "{addr:#018x}"),
        }
    }
}

/// Execution location a sample is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistKey {
    pub pid: Pid,
    pub comm: String,
    pub module: Option<String>,
    pub symbol: KeySymbol,
}

/// One ranked row of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedEntry {
    pub key: HistKey,
    pub weight: u64,
}

/// Slots for per-record-type counters, indexed by the kernel record type.
const RECORD_SLOTS: usize = 16;

#[derive(Default)]
pub struct HistTable {
    entries: HashMap<HistKey, u64>,
    /// Rebuilt by `collapse_and_resort`; stale between resorts by design.
    ranked: Vec<RankedEntry>,
    /// Sum of every period ever aggregated; monotonically non-decreasing.
    pub total_period: u64,
    nr_events: [u64; RECORD_SLOTS],
}

impl HistTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-or-accumulate one sample.
    pub fn record_sample(&mut self, key: HistKey, period: u64) {
        *self.entries.entry(key).or_insert(0) += period;
        self.total_period += period;
        self.bump(sys::PERF_RECORD_SAMPLE);
    }

    /// Count a non-sample record against this table.
    pub fn record_other(&mut self, kind: u32) {
        self.bump(kind);
    }

    fn bump(&mut self, kind: u32) {
        if let Some(slot) = self.nr_events.get_mut(kind as usize) {
            *slot += 1;
        }
    }

    pub fn event_count(&self, kind: u32) -> u64 {
        self.nr_events.get(kind as usize).copied().unwrap_or(0)
    }

    pub fn nr_samples(&self) -> u64 {
        self.event_count(sys::PERF_RECORD_SAMPLE)
    }

    pub fn nr_entries(&self) -> usize {
        self.entries.len()
    }

    /// Merge entries equal under the sort projection, then order by weight
    /// descending. Ties break on the projection itself (ascending), so the
    /// ranking is reproducible for unchanged data.
    pub fn collapse_and_resort(&mut self, sort: &SortSpec) {
        let mut collapsed: BTreeMap<Vec<SortField>, RankedEntry> = BTreeMap::new();
        for (key, &weight) in &self.entries {
            let projection = sort.project(key);
            collapsed
                .entry(projection)
                .and_modify(|e| {
                    e.weight += weight;
                    // deterministic representative for the merged row
                    if representative(key) < representative(&e.key) {
                        e.key = key.clone();
                    }
                })
                .or_insert_with(|| RankedEntry { key: key.clone(), weight });
        }

        // BTreeMap iteration is projection-ascending, which is exactly the
        // tie-break order; the stable sort keeps it for equal weights.
        let mut ranked: Vec<RankedEntry> = collapsed.into_values().collect();
        ranked.sort_by(|a, b| b.weight.cmp(&a.weight));
        self.ranked = ranked;
    }

    /// Top `limit` rows in current ranked order. Does not mutate the table.
    pub fn snapshot(&self, limit: usize) -> Vec<RankedEntry> {
        self.ranked.iter().take(limit).cloned().collect()
    }
}

fn representative(key: &HistKey) -> (String, Option<&String>, &String, i32) {
    (key.symbol.to_string(), key.module.as_ref(), &key.comm, key.pid.0)
}
