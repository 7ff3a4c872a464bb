//! Credit conservation (spec §8 property 4): for a cross-tile source-sink
//! pair, every one of the sink's `sink_capacity` slots is at all times in
//! exactly one of four states — free and known free to the source, a data
//! flit in flight toward the sink, data sitting unread in the sink's
//! buffer, or a credit in flight back to the source for a slot the sink
//! already freed by reading. This drives [`FlowBuffer`]/[`ChannelMapTable`]
//! through exactly that round trip and checks the sum holds at every step.

use tilesim::cmt::{ChannelMapTable, MemoryChannel};
use tilesim::flow::FlowBuffer;
use tilesim::ids::{ChannelId, ComponentId, TileId};

fn dest() -> ChannelId {
    ChannelId::unicast(ComponentId::new(TileId::new(1, 0), 0), 0)
}

/// One side of the credit loop: the source's belief (its CMT credit count)
/// plus whatever it has launched but not yet had credited back.
struct CreditLoop {
    capacity: usize,
    sink: FlowBuffer<u32>,
    source: ChannelMapTable,
    data_in_flight: std::collections::VecDeque<u32>,
    credits_in_flight: usize,
}

impl CreditLoop {
    fn new(capacity: usize) -> Self {
        let mut source = ChannelMapTable::new(1);
        source.write(0, MemoryChannel::single_bank(dest(), 0));
        for _ in 0..capacity {
            source.add_credit(0);
        }
        Self {
            capacity,
            sink: FlowBuffer::new(capacity),
            source,
            data_in_flight: std::collections::VecDeque::new(),
            credits_in_flight: 0,
        }
    }

    /// All `capacity` slots partition across: free-and-known-to-source,
    /// data launched but not yet arrived, data sitting unread at the sink,
    /// and credits earned but not yet delivered back to the source.
    fn assert_conserved(&self) {
        let total = self.source.credits_available(0) as usize
            + self.data_in_flight.len()
            + self.sink.len()
            + self.credits_in_flight;
        assert_eq!(total, self.capacity, "credit conservation violated");
    }

    fn send(&mut self, word: u32) {
        assert!(self.source.credits_available(0) > 0, "sending without a credit would overflow the sink");
        self.source.wait_for_credit(0);
        self.data_in_flight.push_back(word);
    }

    /// The flit in flight arrives and is written into the sink's buffer.
    fn deliver(&mut self) {
        let word = self.data_in_flight.pop_front().expect("nothing in flight to deliver");
        self.sink.write(word);
    }

    /// The sink reads one item, generating a credit that starts its own
    /// transit back to the source.
    fn consume(&mut self) -> u32 {
        let word = self.sink.read();
        assert_eq!(self.sink.take_consumed(), 1);
        self.credits_in_flight += 1;
        word
    }

    /// The in-flight credit arrives back at the source.
    fn credit_arrives(&mut self) {
        assert!(self.credits_in_flight > 0);
        self.credits_in_flight -= 1;
        self.source.add_credit(0);
    }
}

#[test]
fn conservation_holds_through_a_full_send_consume_credit_round_trip() {
    let mut loop_ = CreditLoop::new(3);
    loop_.assert_conserved();

    loop_.send(10);
    loop_.assert_conserved();
    assert_eq!(loop_.source.credits_available(0), 2);

    loop_.deliver();
    loop_.assert_conserved();
    assert_eq!(loop_.sink.len(), 1);

    let word = loop_.consume();
    assert_eq!(word, 10);
    loop_.assert_conserved();

    loop_.credit_arrives();
    loop_.assert_conserved();
    assert_eq!(loop_.source.credits_available(0), 3);
}

#[test]
fn conservation_holds_with_multiple_flits_overlapping_in_flight() {
    let mut loop_ = CreditLoop::new(4);

    loop_.send(1);
    loop_.send(2);
    loop_.assert_conserved();
    assert_eq!(loop_.source.credits_available(0), 2);

    loop_.deliver(); // word 1 arrives
    loop_.assert_conserved();
    loop_.send(3);
    loop_.assert_conserved();

    loop_.deliver(); // word 2 arrives
    loop_.assert_conserved();
    assert_eq!(loop_.sink.len(), 2);

    let _ = loop_.consume();
    loop_.assert_conserved();
    loop_.deliver(); // word 3 arrives
    loop_.assert_conserved();

    loop_.credit_arrives();
    loop_.assert_conserved();
    let _ = loop_.consume();
    let _ = loop_.consume();
    loop_.assert_conserved();
}

#[test]
#[should_panic(expected = "sending without a credit would overflow the sink")]
fn sending_without_a_credit_is_rejected() {
    let mut loop_ = CreditLoop::new(1);
    loop_.send(1);
    loop_.send(2); // no credit left: would overflow the sink's one slot
}
