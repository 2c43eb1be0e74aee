//! Symbol resolution: sampled address + context → execution location.
//!
//! Kernel-mode samples resolve through /proc/kallsyms; user-mode samples
//! through the pid's executable mappings and the mapped object's ELF symbol
//! table. Either way the result is the `{symbol, module, command}` triple
//! the histogram keys on, with the symbol left empty when nothing matches
//! so the caller can fall back to the raw address.

pub mod filter;
pub mod kallsyms;
pub mod user;

use crate::domain::Pid;
use crate::events::sys;
use crate::session::Inventory;
use kallsyms::KernelSyms;
use user::ModuleCache;

/// A resolved execution location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub symbol: Option<String>,
    pub module: Option<String>,
    pub comm: String,
}

pub struct Resolver {
    kernel: KernelSyms,
    modules: ModuleCache,
}

impl Resolver {
    pub fn new() -> Self {
        let kernel = KernelSyms::load();
        if kernel.is_empty() {
            log::warn!("kernel symbols unavailable (kptr_restrict?), kernel samples show raw addresses");
        }
        Self { kernel, modules: ModuleCache::default() }
    }

    #[cfg(test)]
    pub fn without_kernel_syms() -> Self {
        Self {
            kernel: KernelSyms::load_from(std::path::Path::new("/dev/null")).unwrap(),
            modules: ModuleCache::default(),
        }
    }

    #[cfg(test)]
    pub fn with_kernel_table(kernel: KernelSyms) -> Self {
        Self { kernel, modules: ModuleCache::default() }
    }

    /// Resolve an instruction pointer. `misc` is the record header's misc
    /// field, whose CPU-mode bits say which side of the kernel boundary the
    /// sample hit.
    pub fn resolve(&mut self, addr: u64, misc: u16, pid: Pid, inventory: &mut Inventory) -> Location {
        let comm = inventory.comm_of(pid);
        let (symbol, module) = match misc & sys::PERF_RECORD_MISC_CPUMODE_MASK {
            sys::PERF_RECORD_MISC_KERNEL => self.resolve_kernel(addr),
            sys::PERF_RECORD_MISC_USER => self.resolve_user(addr, pid, inventory),
            _ => (None, None),
        };
        Location { symbol, module, comm }
    }

    fn resolve_kernel(&self, addr: u64) -> (Option<String>, Option<String>) {
        match self.kernel.resolve(addr) {
            Some(sym) => (
                Some(sym.name.clone()),
                Some(sym.module.clone().unwrap_or_else(|| "[kernel]".to_string())),
            ),
            None => (None, Some("[kernel]".to_string())),
        }
    }

    fn resolve_user(
        &mut self,
        addr: u64,
        pid: Pid,
        inventory: &Inventory,
    ) -> (Option<String>, Option<String>) {
        let Some(region) = inventory.regions_of(pid).iter().find(|r| r.contains(addr)) else {
            return (None, None);
        };
        let module = Some(region.module_name());
        let symbol =
            self.modules.get(&region.path).and_then(|syms| syms.resolve(addr, region));
        (symbol, module)
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}
