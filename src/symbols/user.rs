//! User-space symbol tables.
//!
//! A sampled user address is located through the process's executable
//! mappings, translated to a file-relative address, and looked up in the
//! ELF symbol table of the mapped object (`.symtab`, falling back to
//! `.dynsym` for stripped shared objects). Rust and C++ names are
//! demangled for display.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use object::{Object, ObjectKind, ObjectSymbol};
use rustc_demangle::demangle;

use crate::domain::Pid;

/// One executable mapping of a process, from /proc/<pid>/maps or a
/// later MMAP record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub start: u64,
    pub end: u64,
    /// File offset the mapping starts at.
    pub offset: u64,
    pub path: PathBuf,
}

impl Region {
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Short module name for histogram keys ("libc.so.6", "myapp").
    pub fn module_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| self.path.display().to_string(), |n| n.to_string_lossy().into_owned())
    }
}

/// Parse the executable, file-backed regions out of a maps file.
pub fn parse_maps(content: &str) -> Vec<Region> {
    content
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let range = parts.next()?;
            let perms = parts.next()?;
            let offset = u64::from_str_radix(parts.next()?, 16).ok()?;
            let _dev = parts.next()?;
            let _inode = parts.next()?;
            let path = parts.next()?;
            if !perms.contains('x') || !path.starts_with('/') {
                return None;
            }
            let (start, end) = range.split_once('-')?;
            Some(Region {
                start: u64::from_str_radix(start, 16).ok()?,
                end: u64::from_str_radix(end, 16).ok()?,
                offset,
                path: PathBuf::from(path),
            })
        })
        .collect()
}

pub fn read_process_regions(pid: Pid) -> Result<Vec<Region>> {
    let content = fs::read_to_string(format!("/proc/{pid}/maps"))
        .with_context(|| format!("Failed to read /proc/{pid}/maps"))?;
    Ok(parse_maps(&content))
}

struct Sym {
    addr: u64,
    size: u64,
    name: String,
}

/// Symbol table of one mapped ELF object, addresses sorted ascending.
pub struct ModuleSyms {
    syms: Vec<Sym>,
    /// Position-independent objects are looked up file-relative.
    pie: bool,
}

impl ModuleSyms {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let obj = object::File::parse(&*data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let mut syms: Vec<Sym> = collect_text_symbols(obj.symbols());
        if syms.is_empty() {
            syms = collect_text_symbols(obj.dynamic_symbols());
        }
        syms.sort_by_key(|s| s.addr);

        Ok(Self { syms, pie: obj.kind() == ObjectKind::Dynamic })
    }

    /// Translate a runtime address into this object and resolve it.
    pub fn resolve(&self, addr: u64, region: &Region) -> Option<String> {
        let file_addr = if self.pie { addr - region.start + region.offset } else { addr };
        if self.syms.is_empty() || file_addr < self.syms[0].addr {
            return None;
        }
        let idx = self.syms.partition_point(|s| s.addr <= file_addr);
        let sym = &self.syms[idx - 1];
        // Zero-sized symbols cover everything up to the next entry.
        if sym.size > 0 && file_addr >= sym.addr + sym.size {
            return None;
        }
        Some(format!("{:#}", demangle(&sym.name)))
    }
}

fn collect_text_symbols<'data>(
    symbols: impl Iterator<Item = impl ObjectSymbol<'data>>,
) -> Vec<Sym> {
    symbols
        .filter(|s| s.kind() == object::SymbolKind::Text && s.is_definition())
        .filter_map(|s| {
            Some(Sym { addr: s.address(), size: s.size(), name: s.name().ok()?.to_string() })
        })
        .collect()
}

/// Cache of loaded module symbol tables, keyed by path. Load failures are
/// remembered so a stripped or vanished object is parsed only once.
#[derive(Default)]
pub struct ModuleCache {
    modules: HashMap<PathBuf, Option<Arc<ModuleSyms>>>,
}

impl ModuleCache {
    pub fn get(&mut self, path: &Path) -> Option<Arc<ModuleSyms>> {
        if let Some(cached) = self.modules.get(path) {
            return cached.clone();
        }
        let loaded = match ModuleSyms::load(path) {
            Ok(syms) => Some(Arc::new(syms)),
            Err(err) => {
                log::debug!("no symbols for {}: {err:#}", path.display());
                None
            }
        };
        self.modules.insert(path.to_path_buf(), loaded.clone());
        loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPS: &str = "\
55d0f0a00000-55d0f0a80000 r-xp 00002000 fd:01 123 /usr/bin/myapp
7f2a00000000-7f2a00180000 r-xp 00028000 fd:01 456 /usr/lib/libc.so.6
7f2a00180000-7f2a00190000 rw-p 00000000 00:00 0
7f2a00190000-7f2a001a0000 r--p 00000000 fd:01 789 /usr/lib/libm.so.6
7ffd00000000-7ffd00021000 rw-p 00000000 00:00 0 [stack]
";

    #[test]
    fn keeps_only_executable_file_backed_regions() {
        let regions = parse_maps(MAPS);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].module_name(), "myapp");
        assert_eq!(regions[0].offset, 0x2000);
        assert_eq!(regions[1].module_name(), "libc.so.6");
    }

    #[test]
    fn region_containment() {
        let regions = parse_maps(MAPS);
        assert!(regions[0].contains(0x55d0_f0a0_1234));
        assert!(!regions[0].contains(0x55d0_f0a8_0000));
    }

    #[test]
    fn own_regions_include_test_binary() {
        #[allow(clippy::cast_possible_wrap)]
        let pid = Pid(std::process::id() as i32);
        let regions = read_process_regions(pid).unwrap();
        assert!(!regions.is_empty());
    }

    #[test]
    fn module_cache_remembers_failures() {
        let mut cache = ModuleCache::default();
        let missing = Path::new("/nonexistent/libfoo.so");
        assert!(cache.get(missing).is_none());
        assert!(cache.get(missing).is_none());
        assert_eq!(cache.modules.len(), 1);
    }

    #[test]
    fn resolves_symbols_in_own_executable() {
        let exe = std::env::current_exe().unwrap();
        let syms = ModuleSyms::load(&exe).unwrap();
        // Test binaries carry a symtab; resolution over it should land on
        // some named text symbol for at least one probed address.
        if let Some(first) = syms.syms.first() {
            let region =
                Region { start: 0, end: u64::MAX, offset: 0, path: exe.clone() };
            let resolved = syms.resolve(first.addr, &region);
            assert!(resolved.is_some());
        }
    }
}
