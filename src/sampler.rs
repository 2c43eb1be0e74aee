//! Sampling loop.
//!
//! Drives the left-to-right pipeline: drain every ring buffer, decode,
//! resolve, filter, aggregate. The ring reader never blocks; when a full
//! pass aggregates nothing, the loop parks in a bounded `poll(2)` across
//! all counter fds instead of spinning. A wait error is the loop's only
//! exit; in the steady state the process lives until the display loop's
//! quit path ends it.

use std::io;
use std::sync::Arc;

use log::{debug, error};

use crate::context::SharedContext;
use crate::domain::Pid;
use crate::events::{sys, EventGroup};
use crate::hist::{HistKey, KeySymbol};
use crate::sample::parse_sample;
use crate::session::{self, Inventory};
use crate::symbols::{filter, Resolver};

/// Bounded waits: startup settle and idle backoff.
const STARTUP_WAIT_MS: i32 = 100;
const IDLE_WAIT_MS: i32 = 100;

pub struct Sampler {
    group: EventGroup,
    resolver: Resolver,
    inventory: Inventory,
    ctx: Arc<SharedContext>,
    /// Reusable copy of the record being consumed, so nothing borrows a
    /// ring buffer across the aggregation path.
    rec_buf: Vec<u8>,
}

impl Sampler {
    pub fn new(
        group: EventGroup,
        resolver: Resolver,
        inventory: Inventory,
        ctx: Arc<SharedContext>,
    ) -> Self {
        Self { group, resolver, inventory, ctx, rec_buf: Vec::new() }
    }

    /// Startup: wait briefly for initial counter activity, then drain once
    /// so the first render is not empty.
    pub fn prime(&mut self) -> io::Result<()> {
        sys::poll_readable(&self.group.all_fds(), STARTUP_WAIT_MS)?;
        self.drain_all();
        Ok(())
    }

    /// Steady state. Returns only on a wait error.
    pub fn run(mut self) {
        let fds = self.group.all_fds();
        loop {
            let aggregated = self.drain_all();
            if aggregated == 0 {
                if let Err(err) = sys::poll_readable(&fds, IDLE_WAIT_MS) {
                    error!("counter wait failed: {err}; sampling stopped");
                    return;
                }
            }
        }
    }

    /// One pass over every buffer; returns the number of samples aggregated.
    pub fn drain_all(&mut self) -> u64 {
        let mut aggregated = 0;
        for event_idx in 0..self.group.events.len() {
            for buf_idx in 0..self.group.events[event_idx].buffers.len() {
                loop {
                    let (kind, misc) = {
                        let Some(rec) =
                            self.group.events[event_idx].buffers[buf_idx].next()
                        else {
                            break;
                        };
                        self.rec_buf.clear();
                        self.rec_buf.extend_from_slice(rec.data);
                        (rec.kind, rec.misc)
                    };
                    aggregated += consume(
                        &self.group,
                        event_idx,
                        kind,
                        misc,
                        &self.rec_buf,
                        &mut self.resolver,
                        &mut self.inventory,
                        &self.ctx,
                    );
                }
            }
        }
        aggregated
    }
}

/// Dispatch one record. Returns 1 when a sample was aggregated, else 0.
#[allow(clippy::too_many_arguments)]
fn consume(
    group: &EventGroup,
    owner: usize,
    kind: u32,
    misc: u16,
    data: &[u8],
    resolver: &mut Resolver,
    inventory: &mut Inventory,
    ctx: &SharedContext,
) -> u64 {
    match kind {
        sys::PERF_RECORD_SAMPLE => {
            let sample = match parse_sample(data, group.events[owner].sample_type) {
                Ok(sample) => sample,
                Err(err) => {
                    debug!("dropping malformed sample: {err}");
                    return 0;
                }
            };
            // Demux back to the owning descriptor; without ids the buffer's
            // owner is the answer by construction.
            let target = sample.id.and_then(|id| group.event_for_id(id)).unwrap_or(owner);
            let Some(ip) = sample.ip else {
                return 0;
            };
            let pid = sample.pid.unwrap_or(Pid(-1));

            let loc = resolver.resolve(ip, misc, pid, inventory);
            if loc.symbol.as_deref().is_some_and(filter::is_ignorable) {
                return 0;
            }

            let weight = sample.period.unwrap_or_else(|| group.events[target].default_period());
            let key = HistKey {
                pid,
                comm: loc.comm,
                module: loc.module,
                symbol: loc.symbol.map_or(KeySymbol::Addr(ip), KeySymbol::Name),
            };
            lock_table(ctx, target).record_sample(key, weight);
            1
        }
        sys::PERF_RECORD_COMM => {
            if let Some((pid, _tid, comm)) = session::parse_comm_record(data) {
                inventory.record_comm(pid, comm);
            }
            lock_table(ctx, owner).record_other(kind);
            0
        }
        sys::PERF_RECORD_MMAP => {
            if let Some((pid, region)) = session::parse_mmap_record(data) {
                inventory.record_mmap(pid, region);
            }
            lock_table(ctx, owner).record_other(kind);
            0
        }
        sys::PERF_RECORD_FORK => {
            if let Some((child, parent)) = session::parse_fork_record(data) {
                inventory.record_fork(child, parent);
            }
            lock_table(ctx, owner).record_other(kind);
            0
        }
        other => {
            // LOST, EXIT, throttling: bookkeeping only
            lock_table(ctx, owner).record_other(other);
            0
        }
    }
}

fn lock_table(ctx: &SharedContext, idx: usize) -> std::sync::MutexGuard<'_, crate::hist::HistTable> {
    ctx.tables[idx].table.lock().expect("histogram lock poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TermGeometry;
    use crate::domain::CpuId;
    use crate::events::negotiator::{negotiate_with, OpenOptions};
    use crate::events::targets::TargetSet;
    use crate::events::{EventDesc, SamplingMode};
    use crate::hist::SortSpec;
    use crate::symbols::kallsyms::KernelSyms;
    use std::fs::File;
    use std::io::Write as _;
    use std::os::fd::OwnedFd;

    fn test_group(mode: SamplingMode) -> EventGroup {
        negotiate_with(
            vec![EventDesc::parse("cpu-clock").unwrap()],
            vec![mode],
            &TargetSet { cpus: vec![CpuId(0)] },
            OpenOptions::default(),
            &mut |_, _, _, _| Ok(OwnedFd::from(File::open("/dev/null").unwrap())),
        )
        .unwrap()
    }

    fn test_ctx() -> Arc<SharedContext> {
        Arc::new(SharedContext::new(
            vec!["cpu-clock".into()],
            SortSpec::default(),
            TermGeometry { rows: 24, cols: 80 },
        ))
    }

    fn kernel_fixture() -> KernelSyms {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"ffffffff81000000 T hot_function\nffffffff81001000 T native_safe_halt\n",
        )
        .unwrap();
        KernelSyms::load_from(file.path()).unwrap()
    }

    fn resolver_with_fixture() -> Resolver {
        Resolver::with_kernel_table(kernel_fixture())
    }

    fn sample_wire(ip: u64, pid: u32, tid: u32, period: Option<u64>) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&ip.to_ne_bytes());
        buf.extend_from_slice(&pid.to_ne_bytes());
        buf.extend_from_slice(&tid.to_ne_bytes());
        if let Some(p) = period {
            buf.extend_from_slice(&p.to_ne_bytes());
        }
        buf
    }

    #[test]
    fn sample_is_resolved_and_aggregated() {
        let group = test_group(SamplingMode::Frequency(1000));
        let ctx = test_ctx();
        let mut resolver = resolver_with_fixture();
        let mut inventory = Inventory::empty();

        let data = sample_wire(0xffff_ffff_8100_0010, 42, 42, Some(9));
        let n = consume(
            &group,
            0,
            sys::PERF_RECORD_SAMPLE,
            sys::PERF_RECORD_MISC_KERNEL,
            &data,
            &mut resolver,
            &mut inventory,
            &ctx,
        );
        assert_eq!(n, 1);

        let table = ctx.tables[0].table.lock().unwrap();
        assert_eq!(table.total_period, 9);
        assert_eq!(table.nr_samples(), 1);
    }

    #[test]
    fn ignorable_symbol_is_dropped_before_aggregation() {
        let group = test_group(SamplingMode::Frequency(1000));
        let ctx = test_ctx();
        let mut resolver = resolver_with_fixture();
        let mut inventory = Inventory::empty();

        let data = sample_wire(0xffff_ffff_8100_1008, 42, 42, Some(50));
        let n = consume(
            &group,
            0,
            sys::PERF_RECORD_SAMPLE,
            sys::PERF_RECORD_MISC_KERNEL,
            &data,
            &mut resolver,
            &mut inventory,
            &ctx,
        );
        assert_eq!(n, 0, "idle symbol sample must not aggregate");
        assert_eq!(ctx.tables[0].table.lock().unwrap().total_period, 0);
    }

    #[test]
    fn fixed_period_mode_uses_descriptor_weight() {
        let group = test_group(SamplingMode::Period(4000));
        let ctx = test_ctx();
        let mut resolver = resolver_with_fixture();
        let mut inventory = Inventory::empty();

        // fixed-period layout: no period on the wire
        let data = sample_wire(0xffff_ffff_8100_0010, 1, 1, None);
        let n = consume(
            &group,
            0,
            sys::PERF_RECORD_SAMPLE,
            sys::PERF_RECORD_MISC_KERNEL,
            &data,
            &mut resolver,
            &mut inventory,
            &ctx,
        );
        assert_eq!(n, 1);
        assert_eq!(ctx.tables[0].table.lock().unwrap().total_period, 4000);
    }

    #[test]
    fn malformed_sample_is_dropped_quietly() {
        let group = test_group(SamplingMode::Frequency(1000));
        let ctx = test_ctx();
        let mut resolver = resolver_with_fixture();
        let mut inventory = Inventory::empty();

        let n = consume(
            &group,
            0,
            sys::PERF_RECORD_SAMPLE,
            sys::PERF_RECORD_MISC_KERNEL,
            &[0u8; 5],
            &mut resolver,
            &mut inventory,
            &ctx,
        );
        assert_eq!(n, 0);
        let table = ctx.tables[0].table.lock().unwrap();
        assert_eq!(table.nr_samples(), 0);
        assert_eq!(table.total_period, 0);
    }

    #[test]
    fn comm_record_updates_inventory_and_counters() {
        let group = test_group(SamplingMode::Frequency(1000));
        let ctx = test_ctx();
        let mut resolver = resolver_with_fixture();
        let mut inventory = Inventory::empty();

        let mut data = Vec::new();
        data.extend_from_slice(&7u32.to_ne_bytes());
        data.extend_from_slice(&7u32.to_ne_bytes());
        data.extend_from_slice(b"renamed\0");
        let n = consume(
            &group,
            0,
            sys::PERF_RECORD_COMM,
            0,
            &data,
            &mut resolver,
            &mut inventory,
            &ctx,
        );
        assert_eq!(n, 0);
        assert_eq!(inventory.comm_of(Pid(7)), "renamed");
        assert_eq!(
            ctx.tables[0].table.lock().unwrap().event_count(sys::PERF_RECORD_COMM),
            1
        );
    }

    #[test]
    fn lost_records_only_bump_counters() {
        let group = test_group(SamplingMode::Frequency(1000));
        let ctx = test_ctx();
        let mut resolver = resolver_with_fixture();
        let mut inventory = Inventory::empty();

        let n = consume(
            &group,
            0,
            sys::PERF_RECORD_LOST,
            0,
            &[0u8; 16],
            &mut resolver,
            &mut inventory,
            &ctx,
        );
        assert_eq!(n, 0);
        let table = ctx.tables[0].table.lock().unwrap();
        assert_eq!(table.event_count(sys::PERF_RECORD_LOST), 1);
        assert_eq!(table.total_period, 0);
    }
}
