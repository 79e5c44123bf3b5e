//! The receive side of a netmap interface: a [`brilter_packet::Producer`]
//! that round-robins the registered RX rings, batches received slots into
//! scratch [`Packet`](brilter_packet::Packet)s, and hands each batch to the
//! pipeline's processor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use brilter_packet::{Consumer, Packet, Processor, Producer};

use crate::abi::{NETMAP_PACKET_COUNT, nioc_rxsync};
use crate::handle::NetmapHandle;

/// Receive end of a registered netmap interface.
pub struct RxEnd {
    handle: Arc<NetmapHandle>,
    cur_ring: u32,
    shutdown: Arc<AtomicBool>,
    scratch: Vec<Packet<'static>>,
}

impl RxEnd {
    pub(crate) fn new(handle: Arc<NetmapHandle>, shutdown: Arc<AtomicBool>) -> Self {
        let cur_ring = handle.first_rx_ring;
        RxEnd { handle, cur_ring, shutdown, scratch: Vec::with_capacity(NETMAP_PACKET_COUNT) }
    }

    fn rx_poll(&self) -> std::io::Result<()> {
        let mut pfd = libc::pollfd { fd: self.handle.fd, events: libc::POLLIN, revents: 0 };
        let rv = unsafe { libc::poll(&raw mut pfd, 1, 0) };
        if rv == -1 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    fn rx_sync(&self) -> std::io::Result<()> {
        let rv = unsafe { libc::ioctl(self.handle.fd, nioc_rxsync(), std::ptr::null_mut::<libc::c_void>()) };
        if rv == -1 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Producer for RxEnd {
    /// Mirrors `producer_netmap_produce`'s outer loop: walk rings looking
    /// for one that isn't empty, `poll()` once per full sweep to let the
    /// kernel post new slots, then drain up to
    /// [`NETMAP_PACKET_COUNT`] slots into `batch` and hand it to
    /// `processor`.
    fn produce(&mut self, processor: &mut dyn Processor, consumer: &mut dyn Consumer) {
        let first = self.handle.first_rx_ring;
        let last = self.handle.last_rx_ring;
        let mut need_sync = true;

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return;
            }

            let ring = unsafe { self.handle.ring(self.cur_ring, false) };
            if ring.is_empty() {
                if self.cur_ring == last {
                    self.cur_ring = first;
                    if need_sync {
                        if let Err(e) = self.rx_poll() {
                            tracing::error!(error = %e, "rx poll failed");
                            std::process::exit(1);
                        }
                        need_sync = false;
                    } else {
                        need_sync = true;
                    }
                } else {
                    self.cur_ring += 1;
                    need_sync = true;
                }
                continue;
            }

            need_sync = false;

            let ring = unsafe { self.handle.ring_mut(self.cur_ring, false) };
            self.scratch.clear();
            while self.scratch.len() < NETMAP_PACKET_COUNT && !ring.is_empty() {
                let slot = unsafe { &*ring.slot_ptr(ring.cur) };
                let buf = unsafe { ring.buf_ptr(slot.buf_idx) };
                let bytes = unsafe { std::slice::from_raw_parts(buf, slot.len as usize) };
                // Safety: `buf` points into the ring memory mmap'd by
                // `self.handle`, which this `RxEnd` holds an `Arc` to for as
                // long as `scratch` exists; 'static here means "as long as
                // this struct", not literally forever. `scratch` is cleared
                // before it is refilled, so no `Packet` here is ever read
                // past the batch it was built for.
                let bytes: &'static [u8] = unsafe { std::mem::transmute(bytes) };
                self.scratch.push(Packet::new(bytes));
                ring.cur = ring.next_index(ring.cur);
            }

            debug_assert!(!self.scratch.is_empty());
            processor.process(&mut self.scratch, consumer);

            ring.head = ring.cur;
            if let Err(e) = self.rx_sync() {
                tracing::error!(error = %e, "rx sync failed");
                std::process::exit(1);
            }
        }
    }
}
