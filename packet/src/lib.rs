//! Packet and batch types, and the `Producer` / `Consumer` / `Processor`
//! contracts that every pipeline stage composes against.
//!
//! A [`Packet`] never owns its bytes: it borrows a slice out of whatever
//! produced it (typically a NIC ring). A batch is just `&mut [Packet<'_>]` —
//! a processor is free to reorder or compact it in place before handing a
//! prefix to the downstream [`Consumer`].

use std::fmt;

/// A borrowed view over one packet's bytes.
///
/// Cheap to copy (it is a fat pointer), and valid only for as long as the
/// lifetime `'a` it was borrowed for — for packets read off a NIC ring, that
/// is the current RX sync window.
#[derive(Clone, Copy)]
pub struct Packet<'a> {
    bytes: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Wrap a borrowed byte slice as a packet.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Packet { bytes }
    }

    /// The packet's bytes.
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The packet's length, in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true iff the packet has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Packet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet").field("len", &self.len()).finish()
    }
}

/// A sink that transmits packets on an interface.
///
/// `consume` must deliver every packet in `batch`, in order, before
/// returning; it may block while rings drain but must not block
/// indefinitely on a live link.
pub trait Consumer {
    /// Transmit every packet in `batch`, in order.
    fn consume(&mut self, batch: &[Packet<'_>]);
}

/// A stage that transforms or filters a batch, forwarding what survives to
/// a downstream [`Consumer`].
///
/// `process` may call `consumer.consume` zero or one time per invocation.
/// Implementations that filter (rather than transform) packets should use
/// [`process_predicate`], which implements the compact-in-place contract
/// every concrete processor in this codebase relies on.
pub trait Processor {
    /// Transform or filter `batch`, emitting the result (if any) to
    /// `consumer`.
    fn process(&mut self, batch: &mut [Packet<'_>], consumer: &mut dyn Consumer);
}

/// A source that delivers packets received on an interface.
///
/// `produce` drives `processor` with batches of received packets and wires
/// `consumer` through to it. Implementations may run their own unbounded
/// loop internally (as the netmap producer does) or may deliver one batch
/// and return, relying on the pipeline worker's outer loop (see
/// `brilter-pipeline`) to call them again.
pub trait Producer {
    /// Produce batches for `processor`, forwarding `consumer`.
    fn produce(&mut self, processor: &mut dyn Processor, consumer: &mut dyn Consumer);
}

/// Compact `batch` in place to keep exactly the packets for which `pass`
/// returns `true`, preserving their relative order, then — if any
/// survived — call `consumer.consume` with that prefix.
///
/// This is the shared substrate behind the BPF-expression processor and the
/// script-predicate processor: both reduce to "is this one packet allowed?"
/// and get batching, compaction, and the zero-call-on-total-drop rule for
/// free.
pub fn process_predicate<F>(batch: &mut [Packet<'_>], consumer: &mut dyn Consumer, mut pass: F)
where
    F: FnMut(&Packet<'_>) -> bool,
{
    let mut kept = 0;
    for n in 0..batch.len() {
        if !pass(&batch[n]) {
            continue;
        }
        batch[kept] = batch[n];
        kept += 1;
    }

    if kept != 0 {
        consumer.consume(&batch[..kept]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingConsumer {
        seen: Vec<Vec<u8>>,
        calls: usize,
    }

    impl Consumer for RecordingConsumer {
        fn consume(&mut self, batch: &[Packet<'_>]) {
            self.calls += 1;
            self.seen.extend(batch.iter().map(|p| p.bytes().to_vec()));
        }
    }

    fn packets(data: &[&[u8]]) -> Vec<Packet<'_>> {
        data.iter().map(|b| Packet::new(b)).collect()
    }

    #[test]
    fn predicate_preserves_order_of_survivors() {
        let a: &[u8] = b"a";
        let b: &[u8] = b"b";
        let c: &[u8] = b"c";
        let mut batch = packets(&[a, b, c]);
        let mut consumer = RecordingConsumer::default();

        process_predicate(&mut batch, &mut consumer, |p| p.bytes() != b"b");

        assert_eq!(consumer.calls, 1);
        assert_eq!(consumer.seen, vec![a.to_vec(), c.to_vec()]);
    }

    #[test]
    fn predicate_does_not_call_consumer_when_all_dropped() {
        let a: &[u8] = b"a";
        let mut batch = packets(&[a]);
        let mut consumer = RecordingConsumer::default();

        process_predicate(&mut batch, &mut consumer, |_| false);

        assert_eq!(consumer.calls, 0);
        assert!(consumer.seen.is_empty());
    }

    #[test]
    fn predicate_pass_all_yields_batch_unchanged() {
        let a: &[u8] = b"a";
        let b: &[u8] = b"b";
        let mut batch = packets(&[a, b]);
        let mut consumer = RecordingConsumer::default();

        process_predicate(&mut batch, &mut consumer, |_| true);

        assert_eq!(consumer.seen, vec![a.to_vec(), b.to_vec()]);
    }

    proptest::proptest! {
        /// The emitted batch is exactly `[b in B : f(b)]`, order-preserved,
        /// for arbitrary single-byte-tagged batches and an arbitrary
        /// byte-parity predicate — §8's "Predicate helper correctness".
        #[test]
        fn predicate_matches_filter_map(tags in proptest::collection::vec(0u8..8, 0..32), keep_even in proptest::bool::ANY) {
            let owned: Vec<[u8; 1]> = tags.iter().map(|t| [*t]).collect();
            let mut batch: Vec<Packet<'_>> = owned.iter().map(|b| Packet::new(b.as_slice())).collect();
            let mut consumer = RecordingConsumer::default();

            let pass = |p: &Packet<'_>| (p.bytes()[0] % 2 == 0) == keep_even;
            process_predicate(&mut batch, &mut consumer, pass);

            let expected: Vec<Vec<u8>> = tags
                .iter()
                .filter(|t| (**t % 2 == 0) == keep_even)
                .map(|t| vec![*t])
                .collect();

            if expected.is_empty() {
                proptest::prop_assert_eq!(consumer.calls, 0);
            } else {
                proptest::prop_assert_eq!(consumer.calls, 1);
            }
            proptest::prop_assert_eq!(consumer.seen, expected);
        }
    }
}
