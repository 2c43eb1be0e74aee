//! Kernel-producer / user-consumer ring buffer.
//!
//! Each open counter maps `1 + N` pages: a metadata page carrying the
//! `data_head`/`data_tail` cursors, then `N` data pages the kernel writes
//! records into. The mapping is read-write, so the kernel throttles on our
//! `data_tail`; under sustained overflow it drops records and accounts them
//! as LOST; this reader does not try to detect or recover the gap.
//!
//! [`RingBuffer::next`] is non-blocking and never sleeps: it copies exactly
//! one record out of the shared region into a reusable scratch buffer and
//! advances the consumer cursor. No reference into the shared region
//! survives the call, since the producer may reuse those bytes the moment
//! the cursor moves.

#![allow(unsafe_code)] // mmap'd shared memory access

use std::io;
use std::os::fd::BorrowedFd;
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};

use log::warn;

use crate::events::sys::{self, PerfEventMmapPage, HEADER_SIZE};

/// One record as delivered by the kernel, header split out, payload borrowed
/// from the reader's scratch buffer.
#[derive(Debug)]
pub struct RawRecord<'a> {
    pub kind: u32,
    pub misc: u16,
    pub data: &'a [u8],
}

pub struct RingBuffer {
    base: *mut u8,
    map_len: usize,
    data: *mut u8,
    data_size: usize,
    scratch: Vec<u8>,
}

// The region is owned by this value and only touched through &mut self.
unsafe impl Send for RingBuffer {}

impl RingBuffer {
    /// Map `pages` data pages (plus the metadata page) for an open counter.
    pub fn map(fd: BorrowedFd<'_>, pages: usize) -> io::Result<Self> {
        let page = sys::page_size();
        let map_len = (pages + 1) * page;
        let base = unsafe { sys::mmap(map_len, fd)? };
        Ok(Self {
            base,
            map_len,
            data: unsafe { base.add(page) },
            data_size: pages * page,
            scratch: Vec::new(),
        })
    }

    fn head_cursor(&self) -> *const AtomicU64 {
        let page = self.base.cast::<PerfEventMmapPage>();
        unsafe { std::ptr::addr_of!((*page).data_head).cast::<AtomicU64>() }
    }

    fn tail_cursor(&self) -> *const AtomicU64 {
        let page = self.base.cast::<PerfEventMmapPage>();
        unsafe { std::ptr::addr_of!((*page).data_tail).cast::<AtomicU64>() }
    }

    fn load_head(&self) -> u64 {
        // Pairs with the producer's Release store of data_head.
        unsafe { (*self.head_cursor()).load(Ordering::Acquire) }
    }

    fn load_tail(&self) -> u64 {
        // We are the only tail writer.
        unsafe { (*self.tail_cursor()).load(Ordering::Relaxed) }
    }

    fn store_tail(&self, tail: u64) {
        unsafe { (*self.tail_cursor()).store(tail, Ordering::Release) }
    }

    /// Pop the next unread record, or `None` when the buffer is empty.
    pub fn next(&mut self) -> Option<RawRecord<'_>> {
        let head = self.load_head();
        let tail = self.load_tail();
        if tail == head {
            return None;
        }

        let data = unsafe { slice::from_raw_parts(self.data, self.data_size) };
        #[allow(clippy::cast_possible_truncation)]
        let offset = (tail % self.data_size as u64) as usize;

        let mut header = [0u8; HEADER_SIZE];
        copy_wrapped(data, offset, &mut header);
        let (kind, misc, size) = parse_header(&header);

        if size < HEADER_SIZE || size > self.data_size {
            // Framing is gone; drop everything unread and resynchronize.
            warn!("corrupt record header (size {size}), resetting ring cursor");
            self.store_tail(head);
            return None;
        }

        self.scratch.resize(size, 0);
        copy_wrapped(data, offset, &mut self.scratch);
        self.store_tail(tail + size as u64);

        Some(RawRecord { kind, misc, data: &self.scratch[HEADER_SIZE..] })
    }
}

impl Drop for RingBuffer {
    fn drop(&mut self) {
        if let Err(err) = unsafe { sys::munmap(self.base, self.map_len) } {
            warn!("munmap failed: {err}");
        }
    }
}

/// Copy `out.len()` bytes starting at `offset`, wrapping at the ring edge.
fn copy_wrapped(data: &[u8], offset: usize, out: &mut [u8]) {
    let first = out.len().min(data.len() - offset);
    out[..first].copy_from_slice(&data[offset..offset + first]);
    if first < out.len() {
        let rest = out.len() - first;
        out[first..].copy_from_slice(&data[..rest]);
    }
}

fn parse_header(bytes: &[u8; HEADER_SIZE]) -> (u32, u16, usize) {
    let kind = u32::from_ne_bytes(bytes[0..4].try_into().unwrap());
    let misc = u16::from_ne_bytes(bytes[4..6].try_into().unwrap());
    let size = u16::from_ne_bytes(bytes[6..8].try_into().unwrap());
    (kind, misc, size as usize)
}
