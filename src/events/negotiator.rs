//! Counter negotiation against the kernel.
//!
//! Opens every descriptor on every target CPU, with the one-shot
//! hardware-to-software fallback: a default cycle counter that the kernel
//! rejects with `ENOENT` is substituted once with the hrtimer-based
//! cpu-clock event, keeping the same sampling mode. The substitution is a
//! `Requested -> FallbackAttempted` transition, never a second retry.
//!
//! The actual `perf_event_open` call is injected so the open algorithm is
//! testable without a PMU (or a kernel).

use std::collections::HashMap;
use std::io;
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};

use log::warn;

use crate::domain::{CpuId, Pid, ProfilerError};
use crate::events::sys::{self, PerfEventAttr};
use crate::events::targets::TargetSet;
use crate::events::{derive_read_format, derive_sample_type, EventDesc, SamplingMode};
use crate::preflight;
use crate::ring::RingBuffer;

/// System-wide target process for `perf_event_open`.
const ALL_PROCESSES: Pid = Pid(-1);

/// Options that shape every descriptor's attr.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Child tasks inherit the counters.
    pub inherit: bool,
    /// Open all descriptors as one counter group per CPU.
    pub group: bool,
}

/// One successfully opened descriptor: its (possibly substituted) identity,
/// the negotiated record layout, and one handle per target CPU.
pub struct OpenedEvent {
    pub desc: EventDesc,
    pub mode: SamplingMode,
    pub sample_type: u64,
    pub fds: Vec<(CpuId, OwnedFd)>,
    pub buffers: Vec<RingBuffer>,
}

impl OpenedEvent {
    /// The weight carried by a record that did not negotiate the period
    /// field: the descriptor's fixed period.
    pub fn default_period(&self) -> u64 {
        match self.mode {
            SamplingMode::Period(p) => p,
            SamplingMode::Frequency(_) => 1,
        }
    }
}

/// The whole sampling session: every open descriptor plus the id demux map
/// populated when more than one descriptor is live.
pub struct EventGroup {
    pub events: Vec<OpenedEvent>,
    id_map: HashMap<u64, usize>,
}

impl EventGroup {
    /// Map `pages` ring-buffer data pages for every open handle. Failure is
    /// fatal to the whole command.
    pub fn map_buffers(&mut self, pages: u32) -> Result<(), ProfilerError> {
        for event in &mut self.events {
            for (_, fd) in &event.fds {
                let rb = RingBuffer::map(fd.as_fd(), pages as usize)
                    .map_err(ProfilerError::Mapping)?;
                event.buffers.push(rb);
            }
        }
        Ok(())
    }

    /// Every open handle, for the idle-backoff poll.
    pub fn all_fds(&self) -> Vec<RawFd> {
        self.events
            .iter()
            .flat_map(|e| e.fds.iter().map(|(_, fd)| fd.as_raw_fd()))
            .collect()
    }

    /// Descriptor index owning a sample id, when ids were negotiated.
    pub fn event_for_id(&self, id: u64) -> Option<usize> {
        self.id_map.get(&id).copied()
    }
}

/// Per-descriptor open progress. The fallback fires at most once because
/// `FallbackAttempted` never transitions back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenState {
    Requested,
    FallbackAttempted,
}

enum Failure {
    Privilege(i32),
    Unsupported,
    Exhausted(i32),
    Other(i32),
}

fn classify(err: &io::Error) -> Failure {
    match err.raw_os_error().unwrap_or(0) {
        errno @ (libc::EPERM | libc::EACCES) => Failure::Privilege(errno),
        libc::ENOENT => Failure::Unsupported,
        errno @ (libc::ENOMEM | libc::EMFILE | libc::ENFILE) => Failure::Exhausted(errno),
        errno => Failure::Other(errno),
    }
}

/// Open every descriptor against the kernel counter subsystem.
pub fn negotiate(
    descs: Vec<EventDesc>,
    modes: Vec<SamplingMode>,
    targets: &TargetSet,
    opts: OpenOptions,
) -> Result<EventGroup, ProfilerError> {
    negotiate_with(descs, modes, targets, opts, &mut |attr, pid, cpu, group_fd| {
        #[allow(clippy::cast_possible_wrap)]
        let cpu = cpu.0 as i32;
        sys::perf_event_open(attr, pid.0, cpu, group_fd, sys::PERF_FLAG_FD_CLOEXEC)
    })
}

/// Seam for tests: `opener` stands in for the syscall.
pub fn negotiate_with(
    descs: Vec<EventDesc>,
    modes: Vec<SamplingMode>,
    targets: &TargetSet,
    opts: OpenOptions,
    opener: &mut dyn FnMut(&PerfEventAttr, Pid, CpuId, i32) -> io::Result<OwnedFd>,
) -> Result<EventGroup, ProfilerError> {
    debug_assert_eq!(descs.len(), modes.len());
    let multiple = descs.len() > 1;

    let mut events = Vec::with_capacity(descs.len());
    let mut leaders: HashMap<CpuId, RawFd> = HashMap::new();

    for (idx, (desc, mode)) in descs.into_iter().zip(modes).enumerate() {
        let sample_type = derive_sample_type(mode, multiple);
        let group_leaders = (opts.group && idx > 0).then_some(&leaders);
        let opened = open_descriptor(
            desc,
            mode,
            sample_type,
            derive_read_format(multiple),
            targets,
            opts,
            group_leaders,
            opener,
        )?;
        if opts.group && idx == 0 {
            leaders =
                opened.fds.iter().map(|(cpu, fd)| (*cpu, fd.as_raw_fd())).collect();
        }
        events.push(opened);
    }

    let mut id_map = HashMap::new();
    if multiple {
        for (idx, event) in events.iter().enumerate() {
            for (_, fd) in &event.fds {
                let id = sys::read_counter_id(fd.as_fd()).map_err(open_error)?;
                id_map.insert(id, idx);
            }
        }
    }

    Ok(EventGroup { events, id_map })
}

#[allow(clippy::too_many_arguments)]
fn open_descriptor(
    desc: EventDesc,
    mode: SamplingMode,
    sample_type: u64,
    read_format: u64,
    targets: &TargetSet,
    opts: OpenOptions,
    leaders: Option<&HashMap<CpuId, RawFd>>,
    opener: &mut dyn FnMut(&PerfEventAttr, Pid, CpuId, i32) -> io::Result<OwnedFd>,
) -> Result<OpenedEvent, ProfilerError> {
    let mut desc = desc;
    let mut state = OpenState::Requested;

    'attempt: loop {
        let attr = build_attr(&desc, mode, sample_type, read_format, opts.inherit);
        let mut fds = Vec::with_capacity(targets.cpus.len());

        for &cpu in &targets.cpus {
            let group_fd = leaders.and_then(|l| l.get(&cpu).copied()).unwrap_or(-1);
            match opener(&attr, ALL_PROCESSES, cpu, group_fd) {
                Ok(fd) => fds.push((cpu, fd)),
                Err(err) => match classify(&err) {
                    Failure::Privilege(errno) => {
                        return Err(ProfilerError::Privilege {
                            errno,
                            paranoid: preflight::paranoid_level(),
                        })
                    }
                    Failure::Unsupported
                        if state == OpenState::Requested && desc.is_default_cycles() =>
                    {
                        warn!("cycles event not supported, falling back to cpu-clock");
                        desc = desc.cpu_clock_fallback();
                        state = OpenState::FallbackAttempted;
                        // fds opened for the rejected descriptor close here
                        continue 'attempt;
                    }
                    Failure::Unsupported => {
                        return Err(ProfilerError::UnsupportedEvent { name: desc.name })
                    }
                    Failure::Exhausted(errno) => {
                        return Err(ProfilerError::ResourceExhausted { errno })
                    }
                    Failure::Other(errno) => {
                        return Err(ProfilerError::Open { errno, message: err.to_string() })
                    }
                },
            }
        }

        return Ok(OpenedEvent { desc, mode, sample_type, fds, buffers: Vec::new() });
    }
}

fn build_attr(
    desc: &EventDesc,
    mode: SamplingMode,
    sample_type: u64,
    read_format: u64,
    inherit: bool,
) -> PerfEventAttr {
    let mut attr = PerfEventAttr::zeroed();
    attr.type_ = desc.type_;
    attr.config = desc.config;
    attr.sample_type = sample_type;
    attr.read_format = read_format;
    // mmap/comm records keep the session inventory current
    attr.flags = sys::PERF_ATTR_FLAG_MMAP | sys::PERF_ATTR_FLAG_COMM;
    if inherit {
        attr.flags |= sys::PERF_ATTR_FLAG_INHERIT;
    }
    match mode {
        SamplingMode::Frequency(hz) => {
            attr.flags |= sys::PERF_ATTR_FLAG_FREQ;
            attr.sample_period_or_freq = hz;
        }
        SamplingMode::Period(count) => attr.sample_period_or_freq = count,
    }
    attr
}

fn open_error(err: io::Error) -> ProfilerError {
    ProfilerError::Open { errno: err.raw_os_error().unwrap_or(0), message: err.to_string() }
}
