//! Process/thread inventory.
//!
//! Symbol resolution needs to know, for any pid a sample points at, the
//! command name and the executable mappings. The inventory is synthesized
//! from /proc once at startup, before the first sample can arrive, and
//! kept current from the COMM, MMAP and FORK records the counters were
//! asked to emit.

use std::collections::HashMap;
use std::fs;

use anyhow::{Context, Result};
use log::info;

use crate::domain::{Pid, Tid};
use crate::symbols::user::{parse_maps, Region};

pub struct Inventory {
    comms: HashMap<Pid, String>,
    regions: HashMap<Pid, Vec<Region>>,
}

impl Inventory {
    /// Scan /proc for every live process: command names and executable
    /// mappings. Processes we may not inspect are skipped silently.
    pub fn synthesize() -> Result<Self> {
        let mut inv = Self { comms: HashMap::new(), regions: HashMap::new() };

        let entries = fs::read_dir("/proc").context("Failed to read /proc")?;
        for entry in entries.filter_map(std::result::Result::ok) {
            let name = entry.file_name();
            let Ok(pid) = name.to_string_lossy().parse::<i32>() else {
                continue;
            };
            let pid = Pid(pid);
            if let Ok(comm) = fs::read_to_string(format!("/proc/{pid}/comm")) {
                inv.comms.insert(pid, comm.trim().to_string());
            }
            if let Ok(maps) = fs::read_to_string(format!("/proc/{pid}/maps")) {
                inv.regions.insert(pid, parse_maps(&maps));
            }
        }

        info!("synthesized inventory for {} processes", inv.comms.len());
        Ok(inv)
    }

    #[cfg(test)]
    pub fn empty() -> Self {
        Self { comms: HashMap::new(), regions: HashMap::new() }
    }

    /// Command name for a pid. Unknown pids get the perf-style ":<pid>"
    /// placeholder, cached so the miss is not re-probed per sample.
    pub fn comm_of(&mut self, pid: Pid) -> String {
        if let Some(comm) = self.comms.get(&pid) {
            return comm.clone();
        }
        let comm = fs::read_to_string(format!("/proc/{pid}/comm"))
            .map_or_else(|_| format!(":{pid}"), |s| s.trim().to_string());
        self.comms.insert(pid, comm.clone());
        comm
    }

    pub fn regions_of(&self, pid: Pid) -> &[Region] {
        self.regions.get(&pid).map_or(&[], Vec::as_slice)
    }

    pub fn record_comm(&mut self, pid: Pid, comm: String) {
        self.comms.insert(pid, comm);
    }

    pub fn record_mmap(&mut self, pid: Pid, region: Region) {
        self.regions.entry(pid).or_default().push(region);
    }

    /// A forked child starts with its parent's identity and mappings.
    pub fn record_fork(&mut self, child: Pid, parent: Pid) {
        if child == parent {
            return; // thread creation, nothing changes
        }
        if let Some(comm) = self.comms.get(&parent).cloned() {
            self.comms.insert(child, comm);
        }
        if let Some(regions) = self.regions.get(&parent).cloned() {
            self.regions.insert(child, regions);
        }
    }
}

// --- wire parsers for the non-sample records the counters emit ---

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_ne_bytes(data.get(at..at + 4)?.try_into().ok()?))
}

fn read_u64(data: &[u8], at: usize) -> Option<u64> {
    Some(u64::from_ne_bytes(data.get(at..at + 8)?.try_into().ok()?))
}

fn read_cstr(data: &[u8], at: usize) -> Option<String> {
    let bytes = data.get(at..)?;
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

/// COMM record payload: `{ pid: u32, tid: u32, comm: char[] }`.
pub fn parse_comm_record(data: &[u8]) -> Option<(Pid, Tid, String)> {
    #[allow(clippy::cast_possible_wrap)]
    let pid = Pid(read_u32(data, 0)? as i32);
    let tid = Tid(read_u32(data, 4)?);
    let comm = read_cstr(data, 8)?;
    Some((pid, tid, comm))
}

/// MMAP record payload:
/// `{ pid: u32, tid: u32, addr: u64, len: u64, pgoff: u64, filename: char[] }`.
pub fn parse_mmap_record(data: &[u8]) -> Option<(Pid, Region)> {
    #[allow(clippy::cast_possible_wrap)]
    let pid = Pid(read_u32(data, 0)? as i32);
    let addr = read_u64(data, 8)?;
    let len = read_u64(data, 16)?;
    let pgoff = read_u64(data, 24)?;
    let filename = read_cstr(data, 32)?;
    if !filename.starts_with('/') {
        return None; // anonymous or special mapping, nothing to resolve in
    }
    Some((
        pid,
        Region { start: addr, end: addr + len, offset: pgoff, path: filename.into() },
    ))
}

/// FORK record payload: `{ pid: u32, ppid: u32, tid: u32, ptid: u32, time: u64 }`.
/// Returns (child, parent).
pub fn parse_fork_record(data: &[u8]) -> Option<(Pid, Pid)> {
    #[allow(clippy::cast_possible_wrap)]
    let pid = Pid(read_u32(data, 0)? as i32);
    #[allow(clippy::cast_possible_wrap)]
    let ppid = Pid(read_u32(data, 4)? as i32);
    Some((pid, ppid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesize_includes_self() {
        let mut inv = Inventory::synthesize().unwrap();
        #[allow(clippy::cast_possible_wrap)]
        let me = Pid(std::process::id() as i32);
        let expected = fs::read_to_string("/proc/self/comm").unwrap().trim().to_string();
        assert_eq!(inv.comm_of(me), expected);
        assert!(!inv.regions_of(me).is_empty());
    }

    #[test]
    fn unknown_pid_gets_placeholder_comm() {
        let mut inv = Inventory::empty();
        assert_eq!(inv.comm_of(Pid(999_999_999)), ":999999999");
    }

    #[test]
    fn comm_record_updates_inventory() {
        let mut data = Vec::new();
        data.extend_from_slice(&77u32.to_ne_bytes());
        data.extend_from_slice(&78u32.to_ne_bytes());
        data.extend_from_slice(b"postmaster\0\0\0\0\0\0");

        let (pid, tid, comm) = parse_comm_record(&data).unwrap();
        assert_eq!((pid, tid), (Pid(77), Tid(78)));
        assert_eq!(comm, "postmaster");

        let mut inv = Inventory::empty();
        inv.record_comm(pid, comm);
        assert_eq!(inv.comm_of(Pid(77)), "postmaster");
    }

    #[test]
    fn mmap_record_parses_region() {
        let mut data = Vec::new();
        data.extend_from_slice(&10u32.to_ne_bytes());
        data.extend_from_slice(&10u32.to_ne_bytes());
        data.extend_from_slice(&0x7f00_0000u64.to_ne_bytes());
        data.extend_from_slice(&0x1000u64.to_ne_bytes());
        data.extend_from_slice(&0x200u64.to_ne_bytes());
        data.extend_from_slice(b"/usr/lib/libz.so.1\0");

        let (pid, region) = parse_mmap_record(&data).unwrap();
        assert_eq!(pid, Pid(10));
        assert_eq!(region.start, 0x7f00_0000);
        assert_eq!(region.end, 0x7f00_1000);
        assert_eq!(region.offset, 0x200);
        assert_eq!(region.module_name(), "libz.so.1");
    }

    #[test]
    fn anonymous_mmap_is_dropped() {
        let mut data = Vec::new();
        data.extend_from_slice(&10u32.to_ne_bytes());
        data.extend_from_slice(&10u32.to_ne_bytes());
        data.extend_from_slice(&[0u8; 24]);
        data.extend_from_slice(b"[vdso]\0");
        assert!(parse_mmap_record(&data).is_none());
    }

    #[test]
    fn fork_clones_parent_state() {
        let mut inv = Inventory::empty();
        inv.record_comm(Pid(1), "init".into());
        inv.record_mmap(
            Pid(1),
            Region { start: 0, end: 0x1000, offset: 0, path: "/sbin/init".into() },
        );

        let mut data = Vec::new();
        data.extend_from_slice(&2u32.to_ne_bytes()); // child pid
        data.extend_from_slice(&1u32.to_ne_bytes()); // parent pid
        data.extend_from_slice(&[0u8; 16]);
        let (child, parent) = parse_fork_record(&data).unwrap();
        inv.record_fork(child, parent);

        assert_eq!(inv.comm_of(Pid(2)), "init");
        assert_eq!(inv.regions_of(Pid(2)).len(), 1);
    }

    #[test]
    fn truncated_records_are_rejected() {
        assert!(parse_comm_record(&[0u8; 6]).is_none());
        assert!(parse_mmap_record(&[0u8; 20]).is_none());
        assert!(parse_fork_record(&[0u8; 4]).is_none());
    }
}
