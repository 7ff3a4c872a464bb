//! `ComputeTile` (spec §4.10): owns the memory banks, miss-handling logic,
//! channel map tables, and the intra-tile subnetworks wiring them together.
//! Core ISA execution itself is outside this crate's scope; a core is
//! represented here only by the channel-mapped requests it issues.

use crate::cmt::{BankSelector, ChannelMapTable, MemoryChannel};
use crate::config::TileParameters;
use crate::directory::Directory;
use crate::flit::Flit;
use crate::icu::IntertileUnit;
use crate::ids::{ChannelId, ComponentId, TileId};
use crate::memory::{BankAssociation, L2RequestFilter, MemoryBank, MissHandlingLogic};
use std::collections::VecDeque;

/// A request a core has issued, queued for tile-level dispatch (spec §4.7:
/// "every tile-level L2 request is broadcast to all banks simultaneously").
#[derive(Debug, Clone, Copy)]
pub struct PendingRequest {
    pub head: Flit,
    pub requester: ChannelId,
}

pub struct ComputeTile {
    pub id: TileId,
    banks: Vec<MemoryBank>,
    l2_filter: L2RequestFilter,
    association: BankAssociation,
    mhl: MissHandlingLogic,
    core_cmts: Vec<ChannelMapTable>,
    bank_selector: BankSelector,
    icu: IntertileUnit,

    /// Set by [`Self::submit_request`], cleared once the current broadcast
    /// round resolves (one outstanding broadcast at a time, matching the
    /// original's single in-flight L2 request per tile).
    in_flight: Option<PendingRequest>,
    /// Requests that arrived (from a core, or forwarded from another tile)
    /// while a broadcast round was already in progress.
    inbox: VecDeque<PendingRequest>,
    /// Outgoing flits this tile wants to send to its neighbour in each mesh
    /// direction, staged by [`Self::step`] for the chip to drain.
    pub to_network: Vec<(TileId, Flit)>,
}

impl ComputeTile {
    #[must_use]
    pub fn new(id: TileId, params: &TileParameters, lfsr_seed: u8) -> Self {
        let banks = (0..params.num_memories)
            .map(|i| MemoryBank::new(i, params.memory.lines_per_bank, true, params.memory.buffer_size))
            .collect();
        let directory = Directory::new(params.memory.directory_entries, 10);
        let mhl = MissHandlingLogic::new(directory, lfsr_seed, params.num_memories);
        let core_cmts = (0..params.num_cores)
            .map(|_| ChannelMapTable::new(params.core.channel_map_table_entries))
            .collect();

        Self {
            id,
            banks,
            l2_filter: L2RequestFilter::new(),
            association: BankAssociation::new(params.num_memories),
            mhl,
            core_cmts,
            bank_selector: BankSelector::new(),
            icu: IntertileUnit::new(params.num_cores, params.core.num_input_channels),
            in_flight: None,
            inbox: VecDeque::new(),
            to_network: Vec::new(),
        }
    }

    #[must_use]
    pub fn num_banks(&self) -> usize {
        self.banks.len()
    }

    #[must_use]
    pub fn bank(&self, index: usize) -> &MemoryBank {
        &self.banks[index]
    }

    #[must_use]
    pub fn bank_mut(&mut self, index: usize) -> &mut MemoryBank {
        &mut self.banks[index]
    }

    #[must_use]
    pub fn cmt(&self, core: usize) -> &ChannelMapTable {
        &self.core_cmts[core]
    }

    #[must_use]
    pub fn cmt_mut(&mut self, core: usize) -> &mut ChannelMapTable {
        &mut self.core_cmts[core]
    }

    #[must_use]
    pub fn icu_mut(&mut self) -> &mut IntertileUnit {
        &mut self.icu
    }

    #[must_use]
    pub fn mhl_mut(&mut self) -> &mut MissHandlingLogic {
        &mut self.mhl
    }

    pub fn resolve_destination(&mut self, core: usize, channel: usize, opcode: crate::flit::MemoryOpcode, payload: u32) -> ChannelId {
        let mapping = self
            .core_cmts[core]
            .read(channel)
            .expect("resolve_destination on an unmapped channel");
        self.bank_selector.resolve(mapping, opcode, payload)
    }

    pub fn map_channel(&mut self, core: usize, channel: usize, mapping: MemoryChannel) {
        self.core_cmts[core].write(channel, mapping);
    }

    /// Queue `request` for an L2 broadcast round (spec §4.7). Only one
    /// request is broadcast at a time in this simplified model; later
    /// requests wait in [`Self::inbox`] until the current round resolves.
    pub fn submit_request(&mut self, request: PendingRequest) {
        self.inbox.push_back(request);
    }

    /// Deliver a response word for a bank's parked off-tile request (spec
    /// §4.8 "Incoming"): resolve the owning bank from the flit's return
    /// channel and feed it into that bank's refill path.
    pub fn deliver_response(&mut self, flit: Flit) {
        let bank = MissHandlingLogic::response_target_bank(&flit);
        self.banks[bank].deliver_response(flit.payload);
    }

    /// One cycle's combinational phase (spec §5.1): evaluate the in-flight
    /// broadcast against every bank, claim if resolved, step every bank's
    /// own state machine, and drain the ICU's credit/nack queue.
    ///
    /// Errs with a detail string on a protocol violation (more than one bank
    /// claiming the same request); the chip wraps it into a dated
    /// `Error::Protocol` once it reaches a point that tracks the cycle
    /// (spec §7).
    pub fn step(&mut self) -> Result<(), String> {
        if self.in_flight.is_none() {
            self.in_flight = self.inbox.pop_front();
            if self.in_flight.is_some() {
                self.association.reset();
            }
        }

        if let Some(request) = self.in_flight {
            let target_bank = if request.head.metadata.scratchpad {
                self.mhl.target_bank_for_miss(&request.head, true)
            } else {
                0
            };

            for bank in &mut self.banks {
                if self.association.all_reported() {
                    break;
                }
                let verdict = self.l2_filter.step(bank, &request.head, target_bank, request.requester);
                self.association.record(bank.index, verdict);
            }

            if self.association.all_reported() {
                if let Some(claimant) = self.association.claimant()? {
                    let _ = claimant;
                    self.in_flight = None;
                } else {
                    // No bank hit and no pre-selected target claimed: fall
                    // back to the LFSR-chosen bank. It may still be mid
                    // FLUSH/REFILL from an unrelated request, or flush-
                    // interlocked on this address (spec §4.7); if so, leave
                    // `in_flight` set and retry the same broadcast next cycle
                    // rather than claiming a busy bank.
                    let bank_index = self.mhl.target_bank_for_miss(&request.head, false);
                    let bank = &self.banks[bank_index];
                    if bank.is_idle() && !bank.flushing(request.head.address()) {
                        self.association.reset();
                        self.banks[bank_index].claim(request.head, request.requester);
                        self.in_flight = None;
                    }
                }
            }
        }

        for bank in &mut self.banks {
            let outputs = bank.step();
            if let Some(flit) = outputs.to_request_network {
                match self.mhl.route_outgoing(flit) {
                    crate::memory::mhl::Routing::ConsumedLocally => {}
                    crate::memory::mhl::Routing::Forward { next_tile, rewritten } => {
                        self.to_network.push((next_tile, rewritten));
                    }
                }
            }
            if let Some(flit) = outputs.to_response_network {
                self.to_network.push((flit.destination.tile, flit));
            }
        }

        while self.icu.has_outgoing() {
            if let Some(flit) = self.icu.send_credits() {
                self.to_network.push((flit.destination.tile, flit));
            } else {
                break;
            }
        }

        Ok(())
    }

    /// The debug "magic memory" path (spec §4.10, §9): read/write a bank's
    /// SRAM word bypassing every network. Only valid outside timed
    /// execution.
    pub fn magic_write_word(&mut self, bank: usize, addr: crate::ids::MemoryAddr, value: u32) {
        self.banks[bank].magic_write_word(addr, value);
    }

    #[must_use]
    pub fn magic_read_word(&self, bank: usize, addr: crate::ids::MemoryAddr) -> u32 {
        self.banks[bank].magic_read_word(addr)
    }

    #[must_use]
    pub fn component(&self, position: u32) -> ComponentId {
        ComponentId::new(self.id, position)
    }
}
