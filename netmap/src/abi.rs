//! Raw netmap kernel ABI: the ioctl request numbers, the `nmreq` passed to
//! `NIOCREGIF`, and the layout of the shared memory region it maps in —
//! `struct netmap_if`, `struct netmap_ring` and `struct netmap_slot` from
//! `net/netmap_user.h`.
//!
//! None of this is exposed through a `-sys` crate on crates.io, so it is
//! hand-mirrored here rather than generated with `bindgen` against a real
//! kernel header.

use std::mem::size_of;

pub const IFNAMSIZ: usize = 16;

/// Packets pulled per RX sync, and the size of the scratch batch the
/// producer hands to its processor. Matches `NETMAP_PACKET_COUNT` in the
/// reference driver.
pub const NETMAP_PACKET_COUNT: usize = 1024;

const fn ioc(dir: u32, ty: u32, nr: u32, size: u32) -> libc::c_ulong {
    ((dir << 30) | (size << 16) | (ty << 8) | nr) as libc::c_ulong
}

const IOC_NONE: u32 = 0;
const IOC_READ_WRITE: u32 = 3;

/// `_IO('i', 148)` — flush queued TX slots to the NIC.
pub fn nioc_txsync() -> libc::c_ulong {
    ioc(IOC_NONE, u32::from(b'i'), 148, 0)
}

/// `_IO('i', 149)` — pick up newly received slots from the NIC.
pub fn nioc_rxsync() -> libc::c_ulong {
    ioc(IOC_NONE, u32::from(b'i'), 149, 0)
}

/// `_IOWR('i', 151, struct nmreq)` — register an interface (or open the
/// host rings, or a pipe endpoint) and map its rings into this process.
pub fn nioc_regif() -> libc::c_ulong {
    ioc(IOC_READ_WRITE, u32::from(b'i'), 151, size_of::<Nmreq>() as u32)
}

/// The request/response struct for `NIOCREGIF`, in the classic (pre-v14)
/// ABI that `nm_open` in the original driver speaks.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Nmreq {
    pub nr_name: [libc::c_char; IFNAMSIZ],
    pub nr_version: u32,
    pub nr_offset: u32,
    pub nr_memsize: u32,
    pub nr_tx_slots: u32,
    pub nr_rx_slots: u32,
    pub nr_tx_rings: u16,
    pub nr_rx_rings: u16,
    pub nr_ringid: u16,
    pub nr_cmd: u16,
    pub nr_arg1: u16,
    pub nr_arg2: u16,
    pub nr_arg3: u32,
    pub nr_flags: u32,
    pub spare2: [libc::c_char; 1],
}

impl Nmreq {
    /// Build a request that asks the kernel to register `ifname` and hand
    /// back its default ring set (`nr_ringid = 0`, i.e. all hardware
    /// rings).
    pub fn for_interface(ifname: &str) -> Self {
        let mut nr_name = [0 as libc::c_char; IFNAMSIZ];
        for (dst, src) in nr_name.iter_mut().zip(ifname.bytes()) {
            *dst = src as libc::c_char;
        }
        Nmreq {
            nr_name,
            nr_version: 14,
            nr_offset: 0,
            nr_memsize: 0,
            nr_tx_slots: 0,
            nr_rx_slots: 0,
            nr_tx_rings: 0,
            nr_rx_rings: 0,
            nr_ringid: 0,
            nr_cmd: 0,
            nr_arg1: 0,
            nr_arg2: 0,
            nr_arg3: 0,
            nr_flags: 0,
            spare2: [0],
        }
    }
}

/// `struct netmap_slot`: one ring entry, naming a buffer in the shared pool.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NetmapSlot {
    pub buf_idx: u32,
    pub len: u16,
    pub flags: u16,
    pub ptr: u64,
}

/// Fixed part of `struct netmap_ring`. The slot array follows immediately
/// after in memory (a C flexible array member), so it is addressed through
/// [`NetmapRingHeader::slot`] rather than a Rust field.
#[repr(C)]
pub struct NetmapRingHeader {
    pub buf_ofs: i64,
    pub num_slots: u32,
    pub nr_buf_size: u32,
    pub ringid: u16,
    pub dir: u16,
    pub head: u32,
    pub cur: u32,
    pub tail: u32,
    pub flags: u32,
    pub ts_sec: i64,
    pub ts_usec: i64,
    sem: [u8; 128],
}

impl NetmapRingHeader {
    /// Pointer to slot `idx` in this ring's flexible slot array.
    ///
    /// # Safety
    /// `self` must be a live pointer into the mapped netmap memory region,
    /// and `idx < self.num_slots`.
    #[must_use]
    pub unsafe fn slot_ptr(&self, idx: u32) -> *mut NetmapSlot {
        unsafe {
            let base = (self as *const Self).add(1).cast::<NetmapSlot>();
            base.add(idx as usize).cast_mut()
        }
    }

    /// Pointer to the start of buffer `buf_idx` in the shared buffer pool,
    /// computed the same way `NETMAP_BUF` does: relative to this ring's own
    /// address plus `buf_ofs`.
    ///
    /// # Safety
    /// Same preconditions as [`Self::slot_ptr`]; `buf_idx` must be a buffer
    /// index the kernel actually handed back in this ring.
    #[must_use]
    pub unsafe fn buf_ptr(&self, buf_idx: u32) -> *mut u8 {
        unsafe {
            let ring_addr = self as *const Self as isize;
            let buf_addr = ring_addr + self.buf_ofs as isize + (buf_idx as isize * self.nr_buf_size as isize);
            buf_addr as *mut u8
        }
    }

    /// True when `cur == tail`: nothing left to read (RX) or no free slot
    /// left to write into (TX).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cur == self.tail
    }

    /// The next ring-buffer index after `idx`, wrapping at `num_slots`.
    #[must_use]
    pub fn next_index(&self, idx: u32) -> u32 {
        let next = idx + 1;
        if next >= self.num_slots { 0 } else { next }
    }
}

/// Fixed part of `struct netmap_if`. `ring_ofs` is a flexible array of
/// `ssize_t` byte offsets (TX rings first, then RX rings) from the start of
/// this struct to each `netmap_ring`.
#[repr(C)]
pub struct NetmapIfHeader {
    pub ni_name: [libc::c_char; IFNAMSIZ],
    pub ni_version: u32,
    pub ni_tx_rings: u32,
    pub ni_rx_rings: u32,
    pub ni_bufs_head: u32,
    pub ni_host_tx_rings: u32,
    pub ni_host_rx_rings: u32,
    ni_padding: [u32; 4],
}

impl NetmapIfHeader {
    /// # Safety
    /// `self` must be a live pointer into the mapped netmap memory region,
    /// and `slot < self.ni_tx_rings + self.ni_rx_rings`.
    #[must_use]
    pub unsafe fn ring_offset(&self, slot: u32) -> isize {
        unsafe {
            let base = (self as *const Self).add(1).cast::<isize>();
            *base.add(slot as usize)
        }
    }
}
