//! Raw Linux perf_event ABI: types, constants, and syscall wrappers.
//!
//! Only the slice of the ABI this tool negotiates is declared here; the
//! struct layouts match `<linux/perf_event.h>`.

#![allow(unsafe_code)] // syscall/mmap plumbing
#![allow(dead_code)]

use std::io::{Error, Result};
use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use libc::{c_int, c_ulong, pid_t, syscall, SYS_perf_event_open};

// --- Event types ---

pub const PERF_TYPE_HARDWARE: u32 = 0;
pub const PERF_TYPE_SOFTWARE: u32 = 1;
pub const PERF_TYPE_RAW: u32 = 4;

// --- Hardware events ---

pub const PERF_COUNT_HW_CPU_CYCLES: u64 = 0;
pub const PERF_COUNT_HW_INSTRUCTIONS: u64 = 1;
pub const PERF_COUNT_HW_CACHE_REFERENCES: u64 = 2;
pub const PERF_COUNT_HW_CACHE_MISSES: u64 = 3;
pub const PERF_COUNT_HW_BRANCH_INSTRUCTIONS: u64 = 4;
pub const PERF_COUNT_HW_BRANCH_MISSES: u64 = 5;

// --- Software events ---

pub const PERF_COUNT_SW_CPU_CLOCK: u64 = 0;
pub const PERF_COUNT_SW_TASK_CLOCK: u64 = 1;
pub const PERF_COUNT_SW_PAGE_FAULTS: u64 = 2;
pub const PERF_COUNT_SW_CONTEXT_SWITCHES: u64 = 3;
pub const PERF_COUNT_SW_PAGE_FAULTS_MIN: u64 = 5;
pub const PERF_COUNT_SW_PAGE_FAULTS_MAJ: u64 = 6;

// --- sample_type bitmask ---
// Wire layout of a SAMPLE record follows ascending bit order.

pub const PERF_SAMPLE_IP: u64 = 1 << 0;
pub const PERF_SAMPLE_TID: u64 = 1 << 1;
pub const PERF_SAMPLE_ID: u64 = 1 << 6;
pub const PERF_SAMPLE_PERIOD: u64 = 1 << 8;

// --- read_format ---

pub const PERF_FORMAT_ID: u64 = 1 << 2;

// --- attr.flags (bitfield) ---
// On little-endian, bit N is simply (1 << N).

pub const PERF_ATTR_FLAG_DISABLED: u64 = 1 << 0;
pub const PERF_ATTR_FLAG_INHERIT: u64 = 1 << 1;
pub const PERF_ATTR_FLAG_MMAP: u64 = 1 << 8;
pub const PERF_ATTR_FLAG_COMM: u64 = 1 << 9;
pub const PERF_ATTR_FLAG_FREQ: u64 = 1 << 10;

// --- perf_event_open flags ---

pub const PERF_FLAG_FD_CLOEXEC: c_ulong = 1 << 3;

// --- Record types ---

pub const PERF_RECORD_MMAP: u32 = 1;
pub const PERF_RECORD_LOST: u32 = 2;
pub const PERF_RECORD_COMM: u32 = 3;
pub const PERF_RECORD_EXIT: u32 = 4;
pub const PERF_RECORD_THROTTLE: u32 = 5;
pub const PERF_RECORD_UNTHROTTLE: u32 = 6;
pub const PERF_RECORD_FORK: u32 = 7;
pub const PERF_RECORD_READ: u32 = 8;
pub const PERF_RECORD_SAMPLE: u32 = 9;

// --- header.misc CPU mode ---

pub const PERF_RECORD_MISC_CPUMODE_MASK: u16 = 7;
pub const PERF_RECORD_MISC_KERNEL: u16 = 1;
pub const PERF_RECORD_MISC_USER: u16 = 2;

// --- perf_event_attr ---

#[repr(C)]
#[derive(Debug, Clone)]
pub struct PerfEventAttr {
    pub type_: u32,
    pub size: u32,
    pub config: u64,
    /// `sample_period` and `sample_freq` share this slot; `FLAG_FREQ`
    /// selects the interpretation.
    pub sample_period_or_freq: u64,
    pub sample_type: u64,
    pub read_format: u64,
    pub flags: u64,
    pub wakeup_events_or_watermark: u32,
    pub bp_type: u32,
    pub bp_addr_or_config1: u64,
    pub bp_len_or_config2: u64,
    pub branch_sample_type: u64,
    pub sample_regs_user: u64,
    pub sample_stack_user: u32,
    pub clock_id: i32,
    pub sample_regs_intr: u64,
    pub aux_watermark: u32,
    pub sample_max_stack: u16,
    pub __reserved_2: u16,
    pub aux_sample_size: u32,
    pub __reserved_3: u32,
}

impl PerfEventAttr {
    pub fn zeroed() -> Self {
        let mut attr: Self = unsafe { mem::zeroed() };
        attr.size = mem::size_of::<Self>() as u32;
        attr
    }
}

// --- perf_event_mmap_page (ring buffer metadata, first mapped page) ---

#[repr(C)]
pub struct PerfEventMmapPage {
    pub version: u32,
    pub compat_version: u32,
    pub lock: u32,
    pub index: u32,
    pub offset: i64,
    pub time_enabled: u64,
    pub time_running: u64,
    pub capabilities: u64,
    pub pmc_width: u16,
    pub time_shift: u16,
    pub time_mult: u32,
    pub time_offset: u64,
    pub time_zero: u64,
    pub size: u32,
    pub _reserved: [u8; 948], // pad to offset 0x400 = 1024
    pub data_head: u64,
    pub data_tail: u64,
    pub data_offset: u64,
    pub data_size: u64,
}

// --- perf_event_header (precedes each record in the ring) ---

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PerfEventHeader {
    pub type_: u32,
    pub misc: u16,
    pub size: u16,
}

pub const HEADER_SIZE: usize = mem::size_of::<PerfEventHeader>();

// --- Syscall wrappers ---

pub fn perf_event_open(
    attr: &PerfEventAttr,
    pid: pid_t,
    cpu: c_int,
    group_fd: c_int,
    flags: c_ulong,
) -> Result<OwnedFd> {
    let fd = unsafe {
        syscall(
            SYS_perf_event_open,
            std::ptr::from_ref(attr).cast::<libc::c_void>(),
            pid,
            cpu,
            group_fd,
            flags,
        )
    };
    if fd == -1 {
        Err(Error::last_os_error())
    } else {
        #[allow(clippy::cast_possible_truncation)]
        let fd = fd as RawFd;
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }
}

/// Read the kernel-assigned counter id back from an open fd.
///
/// Requires `read_format` to contain exactly `PERF_FORMAT_ID`, which makes
/// the read layout `[value: u64, id: u64]`.
pub fn read_counter_id(fd: BorrowedFd<'_>) -> Result<u64> {
    let mut buf = [0u64; 2];
    let bytes = unsafe {
        libc::read(fd.as_raw_fd(), buf.as_mut_ptr().cast::<libc::c_void>(), mem::size_of_val(&buf))
    };
    if bytes == -1 {
        return Err(Error::last_os_error());
    }
    if (bytes as usize) < mem::size_of_val(&buf) {
        return Err(Error::other("short read of counter id"));
    }
    Ok(buf[1])
}

/// Block up to `timeout_ms` for readability on any of `fds`.
///
/// Returns the number of ready fds (0 on timeout).
pub fn poll_readable(fds: &[RawFd], timeout_ms: i32) -> Result<usize> {
    let mut pollfds: Vec<libc::pollfd> =
        fds.iter().map(|&fd| libc::pollfd { fd, events: libc::POLLIN, revents: 0 }).collect();
    let n = unsafe {
        libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms)
    };
    if n == -1 {
        Err(Error::last_os_error())
    } else {
        #[allow(clippy::cast_sign_loss)]
        let n = n as usize;
        Ok(n)
    }
}

pub unsafe fn mmap(len: usize, fd: BorrowedFd<'_>) -> Result<*mut u8> {
    let ptr = libc::mmap(
        std::ptr::null_mut(),
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED,
        fd.as_raw_fd(),
        0,
    );
    if ptr == libc::MAP_FAILED {
        Err(Error::last_os_error())
    } else {
        Ok(ptr.cast::<u8>())
    }
}

pub unsafe fn munmap(ptr: *mut u8, len: usize) -> Result<()> {
    if libc::munmap(ptr.cast::<libc::c_void>(), len) == -1 {
        Err(Error::last_os_error())
    } else {
        Ok(())
    }
}

pub fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    #[allow(clippy::cast_sign_loss)]
    let size = size as usize;
    size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_matches_abi_size() {
        // PERF_ATTR_SIZE_VER6, the layout this struct declares.
        assert_eq!(mem::size_of::<PerfEventAttr>(), 120);
        assert_eq!(PerfEventAttr::zeroed().size, 120);
    }

    #[test]
    fn mmap_page_data_head_offset() {
        assert_eq!(mem::offset_of!(PerfEventMmapPage, data_head), 1024);
    }
}
