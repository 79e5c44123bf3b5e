//! A processor backed by a compiled `libpcap` filter expression, mirroring
//! `pcap_filter_processor`/`brilter_processor`: `pcap_open_dead` +
//! `pcap_compile` at construction, `pcap_offline_filter` per packet.

use pcap::{Capture, Linktype};

use brilter_packet::{Consumer, Packet, Processor, process_predicate};

#[derive(Debug, thiserror::Error)]
pub enum BpfError {
    #[error("failed to open dead pcap handle: {0}")]
    OpenDead(#[source] pcap::Error),
    #[error("failed to compile filter {filter:?}: {source}")]
    Compile {
        filter: String,
        #[source]
        source: pcap::Error,
    },
}

/// A processor whose pass/drop decision is a compiled BPF expression,
/// evaluated per packet exactly as `pcap_offline_filter` would against a
/// synthetic capture header carrying only the packet's length.
pub struct BpfProcessor {
    program: pcap::BpfProgram,
}

impl BpfProcessor {
    /// Compile `filter` the way `pcap_open_dead(DLT_EN10MB, 2048)` followed
    /// by `pcap_compile(..., PCAP_NETMASK_UNKNOWN)` does.
    pub fn compile(filter: &str) -> Result<Self, BpfError> {
        let capture = Capture::dead(Linktype::ETHERNET).map_err(BpfError::OpenDead)?;
        let program = capture
            .compile(filter, true)
            .map_err(|source| BpfError::Compile { filter: filter.to_string(), source })?;
        tracing::debug!(filter, "compiled BPF filter");
        Ok(BpfProcessor { program })
    }

    fn pass(&self, packet: &Packet<'_>) -> bool {
        self.program.filter(packet.bytes())
    }
}

impl Processor for BpfProcessor {
    fn process(&mut self, batch: &mut [Packet<'_>], consumer: &mut dyn Consumer) {
        process_predicate(batch, consumer, |pkt| self.pass(pkt));
    }
}
