//! Kernel symbol table from /proc/kallsyms.
//!
//! Lines look like `ffffffff810b2650 T do_syscall_64 [module]`. Only text
//! symbols are kept. With `kptr_restrict` in effect the kernel reports every
//! address as zero; the table is then useless and treated as absent.

use std::fs;
use std::io;
use std::path::Path;

pub struct KernelSym {
    pub addr: u64,
    pub name: String,
    pub module: Option<String>,
}

pub struct KernelSyms {
    /// Sorted ascending by address. Empty when unavailable or restricted.
    syms: Vec<KernelSym>,
}

impl KernelSyms {
    pub fn load() -> Self {
        Self::load_from(Path::new("/proc/kallsyms")).unwrap_or(Self { syms: Vec::new() })
    }

    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut syms: Vec<KernelSym> = content.lines().filter_map(parse_line).collect();
        syms.sort_by_key(|s| s.addr);
        if syms.last().is_some_and(|s| s.addr == 0) {
            // kptr_restrict: all zeros, nothing to resolve against
            syms.clear();
        }
        Ok(Self { syms })
    }

    /// Floor lookup: the text symbol covering `addr`, if any.
    pub fn resolve(&self, addr: u64) -> Option<&KernelSym> {
        if self.syms.is_empty() || addr < self.syms[0].addr {
            return None;
        }
        let idx = self.syms.partition_point(|s| s.addr <= addr);
        self.syms.get(idx - 1)
    }

    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }
}

fn parse_line(line: &str) -> Option<KernelSym> {
    let mut parts = line.split_whitespace();
    let addr = u64::from_str_radix(parts.next()?, 16).ok()?;
    let kind = parts.next()?;
    if !matches!(kind, "t" | "T" | "w" | "W") {
        return None;
    }
    let name = parts.next()?.to_string();
    let module = parts.next().map(|m| m.trim_matches(['[', ']']).to_string());
    Some(KernelSym { addr, name, module })
}
