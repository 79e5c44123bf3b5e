//! The transmit side of a netmap interface: a [`brilter_packet::Consumer`]
//! that copies each outgoing packet into the next free TX slot and flushes
//! with `NIOCTXSYNC`, round-robining rings the same way
//! `consumer_netmap_consume` does.

use std::sync::Arc;

use brilter_packet::{Consumer, Packet};

use crate::abi::nioc_txsync;
use crate::handle::NetmapHandle;

/// Transmit end of a registered netmap interface.
pub struct TxEnd {
    handle: Arc<NetmapHandle>,
    cur_ring: u32,
}

impl TxEnd {
    pub(crate) fn new(handle: Arc<NetmapHandle>) -> Self {
        let cur_ring = handle.first_tx_ring;
        TxEnd { handle, cur_ring }
    }

    fn tx_sync(&self) -> std::io::Result<()> {
        let rv = unsafe { libc::ioctl(self.handle.fd, nioc_txsync(), std::ptr::null_mut::<libc::c_void>()) };
        if rv == -1 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Consumer for TxEnd {
    fn consume(&mut self, batch: &[Packet<'_>]) {
        let first = self.handle.first_tx_ring;
        let last = self.handle.last_tx_ring;
        self.cur_ring = first;

        let mut remaining = batch;
        while !remaining.is_empty() {
            let ring = unsafe { self.handle.ring_mut(self.cur_ring, true) };
            if ring.is_empty() {
                if self.cur_ring == last {
                    self.cur_ring = first;
                    if let Err(e) = self.tx_sync() {
                        tracing::error!(error = %e, "tx sync failed");
                        std::process::exit(1);
                    }
                } else {
                    self.cur_ring += 1;
                }
                continue;
            }

            while !ring.is_empty() {
                let Some((pkt, rest)) = remaining.split_first() else {
                    break;
                };
                let slot = unsafe { &mut *ring.slot_ptr(ring.cur) };
                let bytes = pkt.bytes();
                slot.len = bytes.len() as u16;
                let dst = unsafe { ring.buf_ptr(slot.buf_idx) };
                unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len()) };
                ring.cur = ring.next_index(ring.cur);
                remaining = rest;
            }
            ring.head = ring.cur;

            if let Err(e) = self.tx_sync() {
                tracing::error!(error = %e, "tx flush failed");
                std::process::exit(1);
            }
        }
    }
}
