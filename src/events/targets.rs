//! Sampling targets.
//!
//! ptop samples system-wide: one counter per online CPU, `pid = -1`.
//! The online CPU set comes from /sys, which formats it like "0-3" or
//! "0-3,8-11" on NUMA systems.

use anyhow::{Context, Result};
use std::fs;

use crate::domain::CpuId;

/// The CPU/process enumeration a descriptor set is opened against.
#[derive(Debug, Clone)]
pub struct TargetSet {
    pub cpus: Vec<CpuId>,
}

impl TargetSet {
    /// System-wide targets: every online CPU, all processes.
    pub fn all_cpus() -> Result<Self> {
        let content = fs::read_to_string("/sys/devices/system/cpu/online")
            .context("Failed to read /sys/devices/system/cpu/online")?;
        Ok(Self { cpus: parse_cpu_list(content.trim())? })
    }
}

fn parse_cpu_list(list: &str) -> Result<Vec<CpuId>> {
    let mut cpus = Vec::new();
    for range in list.split(',') {
        if let Some((start, end)) = range.split_once('-') {
            let start: u32 = start.parse()?;
            let end: u32 = end.parse()?;
            for cpu in start..=end {
                cpus.push(CpuId(cpu));
            }
        } else {
            cpus.push(CpuId(range.parse()?));
        }
    }
    Ok(cpus)
}
