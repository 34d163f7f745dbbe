//! Ring and Entry data model plus the ring fabricator: negotiates the
//! kernel ring, builds the userspace circular list of entries over the
//! mapped region.
//!
//! The kernel's intrusive circular list becomes a `Vec<Entry>` plus a
//! plain cursor index here — `next` is always `(i + 1) % entries.len()`,
//! so there is no cyclic ownership to model.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Error, Result};
use crate::layout::{self, RingLayout};
use crate::socket::Socket;
use crate::tpacket::{self, Tpacket2Hdr};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RingKind {
    Rx,
    Tx,
}

impl RingKind {
    fn sockopt(self) -> libc::c_int {
        match self {
            RingKind::Rx => tpacket::PACKET_RX_RING,
            RingKind::Tx => tpacket::PACKET_TX_RING,
        }
    }
}

/// One kernel frame slot: a raw pointer into mapped memory. Ownership is
/// conveyed purely by `tp_status`; acquire on read, release on
/// write-back, matching the atomic-status idiom real PACKET_MMAP/AF_XDP
/// ring wrappers use for kernel-shared memory.
#[derive(Clone, Copy, Debug)]
pub struct Entry {
    ptr: *mut u8,
}

unsafe impl Send for Entry {}

impl Entry {
    fn status_atomic(&self) -> &AtomicU32 {
        unsafe { &*(self.ptr as *const AtomicU32) }
    }

    pub fn status(&self) -> u32 {
        self.status_atomic().load(Ordering::Acquire)
    }

    pub fn set_status(&self, status: u32) {
        self.status_atomic().store(status, Ordering::Release);
    }

    pub fn header(&self) -> &Tpacket2Hdr {
        unsafe { &*(self.ptr as *const Tpacket2Hdr) }
    }

    pub fn header_mut(&self) -> *mut Tpacket2Hdr {
        self.ptr as *mut Tpacket2Hdr
    }

    pub fn raw(&self) -> *mut u8 {
        self.ptr
    }

    /// Frame bytes, sized to `frame_size`, for VLAN reinsertion and TX
    /// payload copies. `frame_size` must match the ring this entry belongs
    /// to.
    pub unsafe fn frame_mut(&self, frame_size: usize) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.ptr, frame_size)
    }
}

/// One ring (RX or TX) of an instance: layout, base address within the
/// instance's mapped region, and the circular entry list.
#[derive(Debug)]
pub struct Ring {
    pub kind: RingKind,
    pub layout: RingLayout,
    entries: Vec<Entry>,
    cursor: usize,
}

impl Ring {
    /// Negotiates the kernel ring: starting at order 3, shrink by one
    /// order on each `OutOfMemory` until the kernel accepts the layout or
    /// order underflows below 0.
    pub fn negotiate(
        socket: &Socket,
        kind: RingKind,
        snaplen: u32,
        budget_bytes: u64,
        hdr_len: u32,
        page_size: u32,
    ) -> Result<(RingLayout, u64)> {
        let mut order: i32 = 3;
        loop {
            if order < 0 {
                return Err(Error::OutOfMemory(format!(
                    "kernel refused {:?} ring at every order down to 0",
                    kind
                )));
            }
            let planned = layout::plan(snaplen, budget_bytes, hdr_len, order as u32, page_size)?;
            let req = tpacket::TpacketReq {
                tp_block_size: planned.block_size,
                tp_block_nr: planned.block_count,
                tp_frame_size: planned.frame_size,
                tp_frame_nr: planned.frame_count,
            };
            match socket.setsockopt_ring(kind.sockopt(), req) {
                Ok(()) => return Ok((planned, planned.total_size())),
                Err(Error::OutOfMemory(_)) => {
                    log::debug!(
                        "{}: {:?} ring order {} rejected (ENOMEM), retrying smaller",
                        socket.if_name,
                        kind,
                        order
                    );
                    order -= 1;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Builds the circular entry list over the mapped region: entry `i`'s
    /// pointer is `base + block_index*block_size + frame_index*frame_size`.
    pub fn attach(kind: RingKind, layout: RingLayout, base: *mut u8) -> Ring {
        let frames_per_block = layout.block_size / layout.frame_size;
        let mut entries = Vec::with_capacity(layout.frame_count as usize);
        for i in 0..layout.frame_count {
            let block_index = i / frames_per_block;
            let frame_index = i % frames_per_block;
            let offset = block_index as isize * layout.block_size as isize
                + frame_index as isize * layout.frame_size as isize;
            let ptr = unsafe { base.offset(offset) };
            entries.push(Entry { ptr });
        }
        Ring {
            kind,
            layout,
            entries,
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn cursor_entry(&self) -> Entry {
        self.entries[self.cursor]
    }

    pub fn advance_cursor(&mut self) {
        self.cursor = (self.cursor + 1) % self.entries.len();
    }

    pub fn entry(&self, index: usize) -> Entry {
        self.entries[index]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}
