//! Kernel-bypass NIC I/O on top of netmap.
//!
//! [`consumer`] and [`producer`] are the two entry points, mirroring
//! `netmap_consumer`/`netmap_producer`: both open (or reuse) the same
//! [`handle::NetmapHandle`] for a given interface name, so a pipe that reads
//! from `lan` and writes to `wan` shares nothing with one that reads from
//! `wan` and writes to `lan` except, if named the same, the underlying
//! mapping.

pub mod abi;
mod handle;
pub mod rx;
pub mod tx;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

pub use handle::NetmapError;
pub use rx::RxEnd;
pub use tx::TxEnd;

/// Open the transmit end of `iface`.
pub fn consumer(iface: &str) -> Result<TxEnd, NetmapError> {
    let handle = handle::open(iface)?;
    Ok(TxEnd::new(handle))
}

/// Open the receive end of `iface`. `shutdown` is polled once per ring
/// sweep so the caller's `Producer::produce` loop can be asked to return.
pub fn producer(iface: &str, shutdown: Arc<AtomicBool>) -> Result<RxEnd, NetmapError> {
    let handle = handle::open(iface)?;
    Ok(RxEnd::new(handle, shutdown))
}
