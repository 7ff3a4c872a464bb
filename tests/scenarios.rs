//! Integration tests transcribing spec §8's lettered scenarios directly
//! against the memory/network components, bypassing full chip-level
//! multi-hop routing so each scenario stays focused on the behaviour it
//! names.

use tilesim::cmt::MemoryChannel;
use tilesim::config::TileParameters;
use tilesim::flit::{Flit, MemoryOpcode};
use tilesim::icu::IntertileUnit;
use tilesim::ids::{ChannelId, ComponentId, TileId};
use tilesim::memory::bank::{BankState, MemoryBank};
use tilesim::network::multicast_bus::MulticastBus;
use tilesim::tile::{ComputeTile, PendingRequest};

fn requester(position: u32) -> ChannelId {
    ChannelId::unicast(ComponentId::new(TileId::new(0, 0), position), 0)
}

fn request_flit(addr: u32, opcode: MemoryOpcode) -> Flit {
    Flit::new(addr, requester(0), opcode, true)
}

/// Scenario A: store then load on the same bank, same address.
#[test]
fn scenario_a_store_then_load_round_trips() {
    let mut bank = MemoryBank::new(0, 64, true, 4);

    // Cold store: misses, fetches the line, then executes once refilled.
    bank.claim(request_flit(0x1000, MemoryOpcode::StoreW), requester(0));
    bank.offer_payload(0xDEAD_BEEF).unwrap();
    let out = bank.step();
    assert!(out.missed);
    assert_eq!(bank.state(), BankState::Allocate);

    let out = bank.step();
    let fetch = out.to_request_network.expect("allocate must request the line");
    assert_eq!(fetch.opcode, Some(MemoryOpcode::FetchLine));
    assert_eq!(fetch.address(), 0x1000);
    assert_eq!(bank.state(), BankState::Idle);
    assert!(bank.awaiting_response());

    bank.begin_refill();
    for word in 0..8 {
        bank.deliver_response(word);
    }
    let out = bank.step(); // REFILL -> REQUEST
    assert!(out.to_response_network.is_none());
    assert_eq!(bank.state(), BankState::Request);

    let out = bank.step(); // executes the parked store
    assert!(out.to_response_network.is_none(), "a store produces no response");
    assert_eq!(bank.state(), BankState::Idle);

    bank.claim(request_flit(0x1000, MemoryOpcode::LoadW), requester(0));
    let out = bank.step();
    let response = out.to_response_network.expect("load must produce a response");
    assert_eq!(response.payload, 0xDEAD_BEEF);
    assert!(response.metadata.end_of_packet);
}

/// Scenario B: associative hit on another bank. Bank 2 is preloaded and
/// claims on cache hit even though the request's pre-selected target is
/// bank 0; bank 0 never starts a fetch.
#[test]
fn scenario_b_associative_hit_on_another_bank() {
    let params = TileParameters::default(); // 4 banks
    let mut tile = ComputeTile::new(TileId::new(0, 0), &params, 0x3F);

    tile.bank_mut(2).magic_write_word(0x2000, 0x1234_5678);

    tile.submit_request(PendingRequest {
        head: request_flit(0x2000, MemoryOpcode::LoadW),
        requester: requester(0),
    });
    tile.step().unwrap();

    assert_eq!(tile.bank(2).state(), BankState::Idle, "bank 2 served the hit and returned to idle");
    assert_eq!(
        tile.bank(0).state(),
        BankState::Idle,
        "bank 0 (the pre-selected but non-owning target) must not start a fetch"
    );

    let response = tile
        .to_network
        .iter()
        .find(|(_, flit)| flit.is_payload())
        .map(|(_, flit)| *flit)
        .expect("bank 2's hit must have produced a response flit");
    assert_eq!(response.payload, 0x1234_5678);
}

/// Scenario C: address 0x3000 hashes to the same line as 0x7000 (both
/// resolve to the same `line_of` value for a 64-line bank); loading 0x3000
/// while that line holds dirty data for 0x7000 must flush the old line
/// before fetching the new one, in the exact order the spec names.
#[test]
fn scenario_c_miss_plus_flush_emits_flush_then_fetch_in_order() {
    let mut bank = MemoryBank::new(0, 64, true, 4);

    // Populate the colliding line with dirty data tagged 0x7000.
    bank.claim(request_flit(0x7000, MemoryOpcode::StoreW), requester(0));
    bank.offer_payload(0xAAAA_AAAA).unwrap();
    bank.step(); // miss, Allocate
    let out = bank.step(); // cold allocate: no flush needed yet, fetch issued
    assert_eq!(out.to_request_network.unwrap().opcode, Some(MemoryOpcode::FetchLine));
    bank.begin_refill();
    for w in 0..8 {
        bank.deliver_response(w);
    }
    bank.step(); // Refill -> Request
    bank.step(); // executes the store, line now dirty, tag 0x7000

    // Now load 0x3000, which collides onto the same line.
    bank.claim(request_flit(0x3000, MemoryOpcode::LoadW), requester(0));
    let out = bank.step();
    assert!(out.missed);
    assert_eq!(bank.state(), BankState::Allocate);

    let out = bank.step(); // needs_flush: emits non-EOP STORE_LINE header tag=0x7000
    let header = out.to_request_network.expect("eviction must emit a STORE_LINE header");
    assert_eq!(header.opcode, Some(MemoryOpcode::StoreLine));
    assert_eq!(header.address(), 0x7000);
    assert!(!header.metadata.end_of_packet);
    assert_eq!(bank.state(), BankState::Flush);

    let mut payloads = Vec::new();
    for _ in 0..8 {
        let out = bank.step();
        payloads.push(out.to_request_network.expect("flush must emit 8 payload flits"));
    }
    assert_eq!(payloads.len(), 8);
    assert!(payloads[..7].iter().all(|f| !f.metadata.end_of_packet));
    assert!(payloads[7].metadata.end_of_packet, "exactly the last flush flit is end-of-packet");

    let out = bank.step(); // flush's word count is satisfied: resume to REQUEST
    assert!(out.to_request_network.is_none());
    assert_eq!(bank.state(), BankState::Request, "flush resumes into REQUEST to retry the miss");

    let out = bank.step(); // misses again (tag still 0x7000), Allocate
    assert!(out.missed);
    let out = bank.step(); // no longer dirty: allocate succeeds, FETCH_LINE for 0x3000
    let fetch = out.to_request_network.expect("second allocate must fetch the new line");
    assert_eq!(fetch.opcode, Some(MemoryOpcode::FetchLine));
    assert_eq!(fetch.address(), 0x3000);
    assert!(bank.awaiting_response());

    // 0x3000 is line-aligned (offset 0), so the word read back by the load
    // is whichever refill word lands first in the line.
    bank.begin_refill();
    bank.deliver_response(0xCAFE_BABE);
    for w in 1..8 {
        bank.deliver_response(w);
    }
    let out = bank.step(); // Refill -> Request
    assert!(out.to_response_network.is_none());
    let out = bank.step(); // executes the resumed load
    let response = out.to_response_network.expect("load must produce exactly one response");
    assert_eq!(response.payload, 0xCAFE_BABE);
}

/// Scenario D: LL/SC with an intervening store from another core. The
/// store, regardless of which core issued it, invalidates the reservation.
#[test]
fn scenario_d_intervening_store_invalidates_reservation() {
    let mut bank = MemoryBank::new(0, 64, true, 4);
    bank.magic_write_word(0x4000, 0); // line present, clean

    let core0 = requester(0);
    let core1 = requester(1);

    bank.claim(request_flit(0x4000, MemoryOpcode::LoadLinked), core0);
    let out = bank.step();
    assert_eq!(out.to_response_network.unwrap().payload, 0);

    bank.claim(request_flit(0x4000, MemoryOpcode::StoreW), core1);
    bank.offer_payload(1).unwrap();
    bank.step();

    bank.claim(request_flit(0x4000, MemoryOpcode::StoreConditional), core0);
    bank.offer_payload(2).unwrap();
    let out = bank.step();
    assert_eq!(out.to_response_network.unwrap().payload, 0, "SC must fail: reservation was cleared");

    assert_eq!(bank.magic_read_word(0x4000), 1, "the intervening store's value must stick");
}

/// Scenario E: multicast fan-out to a coremask, ack-joined before the bus
/// accepts another flit.
#[test]
fn scenario_e_multicast_fans_out_and_joins_on_every_ack() {
    let mut bus = MulticastBus::new();
    assert!(bus.ready());

    let dest = ChannelId::multicast(TileId::new(0, 0), 0b1011, 0);
    let flit = Flit::new(0xAB, dest, MemoryOpcode::LoadW, true);
    bus.inject(flit, 0b1011, 4);
    assert!(!bus.ready());

    let mut targets: Vec<_> = bus.pending_deliveries().iter().map(|(o, _)| *o).collect();
    targets.sort_unstable();
    assert_eq!(targets, vec![0, 1, 3], "coremask 0b1011 selects cores 0, 1 and 3");

    bus.ack(0);
    assert!(!bus.ready(), "bus must not accept a new flit until every target acks");
    bus.ack(1);
    assert!(!bus.ready());
    bus.ack(3);
    assert!(bus.ready(), "bus becomes ready again once the last target acks");
}

/// Scenario F: connection claim / nack / disconnect across three tiles,
/// modeled entirely through tile B's ICU since the ICU is purely a
/// per-tile credit/connection bookkeeper (spec §4.9).
#[test]
fn scenario_f_claim_nack_and_disconnect() {
    let mut icu_b = IntertileUnit::new(2, 4);

    let tile_a = ChannelId::unicast(ComponentId::new(TileId::new(0, 0), 0), 0);
    let tile_c = ChannelId::unicast(ComponentId::new(TileId::new(2, 0), 0), 0);

    let accepted = icu_b.handle_port_claim(0, 2, false, tile_a);
    assert!(accepted, "tile A's claim on core 0 / channel 2 is accepted");
    assert!(icu_b.has_outgoing());
    let credit = icu_b.send_credits().expect("accept generates one credit");
    assert_eq!(credit.destination, tile_a);

    let rejected = icu_b.handle_port_claim(0, 2, false, tile_c);
    assert!(!rejected, "tile C's claim on the already-connected channel is nacked");
    assert!(icu_b.has_outgoing());
    let nack = icu_b.send_credits().expect("rejection generates a nack");
    assert_eq!(nack.destination, tile_c);
    assert!(!icu_b.has_outgoing());

    // Tile A sends data; each flit drained from channel 2's input buffer
    // generates a credit back to tile A (spec §4.2 "data_consumed").
    icu_b.data_consumed(0, 2);
    assert!(icu_b.has_outgoing());
    let credit = icu_b.send_credits().expect("data_consumed generates a credit");
    assert_eq!(credit.destination, tile_a);

    // Tile A disconnects: the final credit clears the channel.
    icu_b.handle_port_claim(0, 2, true, tile_a);
    icu_b.send_credits();
    let accepted_again = icu_b.handle_port_claim(0, 2, false, tile_c);
    assert!(accepted_again, "the channel is free again for a new connection");
}

/// Address hashing: `0x3000` and `0x7000` collide onto the same line for a
/// 64-line bank, which is what makes Scenario C's premise reachable purely
/// by driving the bank through its ordinary store/load protocol.
#[test]
fn addresses_used_in_scenario_c_collide_on_the_same_line() {
    let mut bank = MemoryBank::new(0, 64, true, 4);
    bank.magic_write_word(0x7000, 1);
    assert!(bank.contains(0x7000));
    bank.magic_write_word(0x3000, 2);
    assert!(
        !bank.contains(0x7000),
        "writing 0x3000 must evict 0x7000's line since they hash to the same slot"
    );
}

/// Bank selector with a log_group_size of 0 always resolves to the single
/// mapped destination channel, the common case this scenario suite's
/// `ComputeTile` relies on for cmt wiring.
#[test]
fn single_bank_channel_mapping_resolves_to_itself() {
    let mapping = MemoryChannel::single_bank(requester(3), 0);
    assert_eq!(mapping.log_group_size, 0);
    assert_eq!(mapping.destination, requester(3));
}
