//! Opening a netmap interface and caching the shared handle, mirroring
//! `netmap_handle_open`'s dedup-by-ifname list: a consumer and a producer
//! obtained for the same interface share one mapping and one file
//! descriptor.

use std::collections::HashMap;
use std::ffi::CString;
use std::os::fd::RawFd;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, OnceLock};

use crate::abi::{NetmapIfHeader, NetmapRingHeader, Nmreq, nioc_regif};

#[derive(Debug, thiserror::Error)]
pub enum NetmapError {
    #[error("failed to open /dev/netmap: {0}")]
    OpenDevice(#[source] std::io::Error),
    #[error("NIOCREGIF failed for interface '{iface}': {source}")]
    Register {
        iface: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to mmap netmap memory for interface '{iface}': {source}")]
    Mmap {
        iface: String,
        #[source]
        source: std::io::Error,
    },
    #[error("interface name '{0}' contains a NUL byte")]
    InvalidName(String),
}

/// A netmap mapping shared between a `RxEnd` and a `TxEnd` for the same
/// interface. Holds the mmap'd memory region and the ring geometry the
/// kernel handed back; outlives both ends via `Arc`.
pub struct NetmapHandle {
    pub(crate) fd: RawFd,
    mem: NonNull<u8>,
    mem_len: usize,
    nifp_off: usize,
    pub(crate) first_tx_ring: u32,
    pub(crate) last_tx_ring: u32,
    pub(crate) first_rx_ring: u32,
    pub(crate) last_rx_ring: u32,
}

// The handle is shared read-only geometry plus a bare fd; `RxEnd`/`TxEnd`
// each own their own ring cursor and never touch the other side's rings, so
// concurrent access from the two is safe even though the pointer inside is
// not `Sync` by default.
unsafe impl Send for NetmapHandle {}
unsafe impl Sync for NetmapHandle {}

impl Drop for NetmapHandle {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.mem.as_ptr().cast(), self.mem_len);
            libc::close(self.fd);
        }
    }
}

impl NetmapHandle {
    fn nifp(&self) -> &NetmapIfHeader {
        unsafe { &*self.mem.as_ptr().add(self.nifp_off).cast::<NetmapIfHeader>() }
    }

    /// # Safety
    /// `ring_index` must be within the TX or RX ring count this handle was
    /// registered with, and `is_tx` must match which half of the ring table
    /// it falls in.
    pub(crate) unsafe fn ring(&self, ring_index: u32, is_tx: bool) -> &NetmapRingHeader {
        let nifp = self.nifp();
        let slot = if is_tx {
            ring_index
        } else {
            nifp.ni_tx_rings + nifp.ni_host_tx_rings + ring_index
        };
        unsafe {
            let offset = nifp.ring_offset(slot);
            let ring_addr = (nifp as *const NetmapIfHeader).cast::<u8>().offset(offset);
            &*ring_addr.cast::<NetmapRingHeader>()
        }
    }

    /// # Safety
    /// See [`Self::ring`]; this returns a mutable alias and the caller must
    /// not hold another live reference to the same ring.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn ring_mut(&self, ring_index: u32, is_tx: bool) -> &mut NetmapRingHeader {
        unsafe { &mut *(self.ring(ring_index, is_tx) as *const NetmapRingHeader as *mut NetmapRingHeader) }
    }
}

static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<NetmapHandle>>>> = OnceLock::new();

/// Open (or return the already-open) netmap mapping for `iface`, the way
/// `netmap_handle_open` dedups on `nh_ifname` in its static list.
pub fn open(iface: &str) -> Result<Arc<NetmapHandle>, NetmapError> {
    let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
    let mut table = registry.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

    if let Some(handle) = table.get(iface) {
        return Ok(Arc::clone(handle));
    }

    let handle = Arc::new(open_uncached(iface)?);
    table.insert(iface.to_string(), Arc::clone(&handle));
    Ok(handle)
}

fn open_uncached(iface: &str) -> Result<NetmapHandle, NetmapError> {
    let device_path = CString::new("/dev/netmap").map_err(|_| NetmapError::InvalidName(iface.to_string()))?;

    let fd = unsafe { libc::open(device_path.as_ptr(), libc::O_RDWR) };
    if fd < 0 {
        return Err(NetmapError::OpenDevice(std::io::Error::last_os_error()));
    }

    let mut req = Nmreq::for_interface(iface);
    let rv = unsafe { libc::ioctl(fd, nioc_regif(), std::ptr::addr_of_mut!(req)) };
    if rv != 0 {
        let source = std::io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(NetmapError::Register { iface: iface.to_string(), source });
    }

    let mem = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            req.nr_memsize as usize,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    if mem == libc::MAP_FAILED {
        let source = std::io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(NetmapError::Mmap { iface: iface.to_string(), source });
    }

    let mem = NonNull::new(mem.cast::<u8>()).expect("mmap returned non-null on success");
    let tx_rings = u32::from(req.nr_tx_rings.max(1));
    let rx_rings = u32::from(req.nr_rx_rings.max(1));

    tracing::debug!(iface, tx_rings, rx_rings, memsize = req.nr_memsize, "registered netmap interface");

    Ok(NetmapHandle {
        fd,
        mem,
        mem_len: req.nr_memsize as usize,
        nifp_off: req.nr_offset as usize,
        first_tx_ring: 0,
        last_tx_ring: tx_rings - 1,
        first_rx_ring: 0,
        last_rx_ring: rx_rings - 1,
    })
}
