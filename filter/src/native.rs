//! The host-language rendition of the default directional policy — the
//! `(a)` option in entry-point shape 4.J, offered as an alternative to
//! compiling the same intent down to BPF (option `(b)`, see [`crate::bpf`]).

use brilter_net::eth::EthernetView;
use brilter_net::ipv6::{self, Ipv6View, NEXT_HEADER_ICMPV6, NEXT_HEADER_TCP};
use brilter_net::tcp::TcpView;
use brilter_packet::{Consumer, Packet, Processor, process_predicate};

/// Which side of the filter a packet arrived on, since the default policy's
/// TCP rule is direction-dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Stateless processor implementing §6's default directional policy
/// natively, without going through libpcap.
pub struct DefaultPolicyProcessor {
    direction: Direction,
}

impl DefaultPolicyProcessor {
    #[must_use]
    pub fn new(direction: Direction) -> Self {
        DefaultPolicyProcessor { direction }
    }

    fn pass(&self, packet: &Packet<'_>) -> bool {
        let Some(eth) = EthernetView::parse(packet.bytes()) else {
            return false;
        };
        if !eth.ethertype().is_ipv6() {
            return false;
        }
        let Some(ip6) = Ipv6View::parse(eth.payload()) else {
            return false;
        };
        if ip6.version() != 6 {
            return false;
        }

        let src = ip6.source();
        let dst = ip6.destination();

        if ipv6::is_link_local(&src) && ipv6::is_link_local(&dst) {
            return true;
        }
        if ipv6::is_multicast_with_scope(&dst, 0x02) {
            return true;
        }
        if ip6.next_header() == NEXT_HEADER_ICMPV6 {
            return true;
        }
        if ip6.next_header() == NEXT_HEADER_TCP {
            match self.direction {
                Direction::Outbound => return true,
                Direction::Inbound => {
                    let Some(tcp) = TcpView::parse(ip6.payload()) else {
                        return false;
                    };
                    if !tcp.flags().is_bare_syn() || tcp.destination_port() == 22 {
                        return true;
                    }
                }
            }
        }

        false
    }
}

impl Processor for DefaultPolicyProcessor {
    fn process(&mut self, batch: &mut [Packet<'_>], consumer: &mut dyn Consumer) {
        process_predicate(batch, consumer, |pkt| self.pass(pkt));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingConsumer {
        batches: Vec<usize>,
    }

    impl Consumer for RecordingConsumer {
        fn consume(&mut self, batch: &[Packet<'_>]) {
            self.batches.push(batch.len());
        }
    }

    fn ipv6_tcp_frame(src: [u8; 16], dst: [u8; 16], flags: u8, dport: u16) -> Vec<u8> {
        let mut frame = vec![0u8; 14 + 40 + 20];
        frame[12] = 0x86;
        frame[13] = 0xdd;
        frame[14] = 0x60;
        frame[14 + 6] = NEXT_HEADER_TCP;
        frame[14 + 8..14 + 24].copy_from_slice(&src);
        frame[14 + 24..14 + 40].copy_from_slice(&dst);
        frame[14 + 40 + 2] = (dport >> 8) as u8;
        frame[14 + 40 + 3] = (dport & 0xff) as u8;
        frame[14 + 40 + 13] = flags;
        frame
    }

    #[test]
    fn inbound_bare_syn_to_non_ssh_is_dropped() {
        let frame = ipv6_tcp_frame(
            [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
            [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2],
            0x02,
            80,
        );
        let mut batch = [Packet::new(&frame)];
        let mut consumer = RecordingConsumer { batches: Vec::new() };
        let mut processor = DefaultPolicyProcessor::new(Direction::Inbound);
        processor.process(&mut batch, &mut consumer);
        assert!(consumer.batches.is_empty());
    }

    #[test]
    fn inbound_bare_syn_to_ssh_passes() {
        let frame = ipv6_tcp_frame(
            [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
            [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2],
            0x02,
            22,
        );
        let mut batch = [Packet::new(&frame)];
        let mut consumer = RecordingConsumer { batches: Vec::new() };
        let mut processor = DefaultPolicyProcessor::new(Direction::Inbound);
        processor.process(&mut batch, &mut consumer);
        assert_eq!(consumer.batches, vec![1]);
    }

    #[test]
    fn outbound_tcp_always_passes() {
        let frame = ipv6_tcp_frame(
            [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2],
            [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
            0x02,
            80,
        );
        let mut batch = [Packet::new(&frame)];
        let mut consumer = RecordingConsumer { batches: Vec::new() };
        let mut processor = DefaultPolicyProcessor::new(Direction::Outbound);
        processor.process(&mut batch, &mut consumer);
        assert_eq!(consumer.batches, vec![1]);
    }

    #[test]
    fn ipv4_is_dropped() {
        let mut frame = vec![0u8; 14];
        frame[12] = 0x08;
        frame[13] = 0x00;
        let mut batch = [Packet::new(&frame)];
        let mut consumer = RecordingConsumer { batches: Vec::new() };
        let mut processor = DefaultPolicyProcessor::new(Direction::Outbound);
        processor.process(&mut batch, &mut consumer);
        assert!(consumer.batches.is_empty());
    }

    #[test]
    fn short_frame_is_dropped() {
        let frame = [0u8; 13];
        let mut batch = [Packet::new(&frame)];
        let mut consumer = RecordingConsumer { batches: Vec::new() };
        let mut processor = DefaultPolicyProcessor::new(Direction::Outbound);
        processor.process(&mut batch, &mut consumer);
        assert!(consumer.batches.is_empty());
    }

    #[test]
    fn inbound_link_local_pair_passes_even_as_a_bare_syn() {
        let frame = ipv6_tcp_frame(
            [0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
            [0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2],
            0x02,
            80,
        );
        let mut batch = [Packet::new(&frame)];
        let mut consumer = RecordingConsumer { batches: Vec::new() };
        let mut processor = DefaultPolicyProcessor::new(Direction::Inbound);
        processor.process(&mut batch, &mut consumer);
        assert_eq!(consumer.batches, vec![1]);
    }

    #[test]
    fn inbound_syn_ack_passes_because_it_is_not_a_bare_syn() {
        let frame = ipv6_tcp_frame(
            [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
            [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2],
            0x12,
            80,
        );
        let mut batch = [Packet::new(&frame)];
        let mut consumer = RecordingConsumer { batches: Vec::new() };
        let mut processor = DefaultPolicyProcessor::new(Direction::Inbound);
        processor.process(&mut batch, &mut consumer);
        assert_eq!(consumer.batches, vec![1]);
    }

    #[test]
    fn multicast_icmpv6_passes_either_direction() {
        let mut frame = vec![0u8; 14 + 40];
        frame[12] = 0x86;
        frame[13] = 0xdd;
        frame[14] = 0x60;
        frame[14 + 6] = NEXT_HEADER_ICMPV6;
        frame[14 + 24] = 0xff;
        frame[14 + 25] = 0x02;
        frame[14 + 40 - 1] = 1; // ff02::1
        let mut batch = [Packet::new(&frame)];
        let mut consumer = RecordingConsumer { batches: Vec::new() };
        let mut processor = DefaultPolicyProcessor::new(Direction::Inbound);
        processor.process(&mut batch, &mut consumer);
        assert_eq!(consumer.batches, vec![1]);
    }

    #[test]
    fn outbound_udp_is_dropped() {
        let mut frame = vec![0u8; 14 + 40 + 8];
        frame[12] = 0x86;
        frame[13] = 0xdd;
        frame[14] = 0x60;
        frame[14 + 6] = 17; // UDP
        let mut batch = [Packet::new(&frame)];
        let mut consumer = RecordingConsumer { batches: Vec::new() };
        let mut processor = DefaultPolicyProcessor::new(Direction::Outbound);
        processor.process(&mut batch, &mut consumer);
        assert!(consumer.batches.is_empty());
    }
}
