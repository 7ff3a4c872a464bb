//! A single in-flight memory operation (spec §9 "Polymorphic memory
//! operations", §3 "activeRequest/missingRequest").
//!
//! Rather than a trait object per opcode (which would mostly be boilerplate
//! delegating to the same handful of primitives), one struct carries the
//! bookkeeping every opcode needs and dispatches on `opcode` at the handful
//! of points where behaviour actually differs. The bank (`bank.rs`) owns the
//! SRAM array and performs the actual reads/writes; this type only tracks
//! the operation's progress through the opcode's multi-cycle protocol.

use crate::flit::MemoryOpcode;
use crate::ids::{ChannelId, MemoryAddr, SramAddress};
use std::collections::VecDeque;

/// Words per cache line (spec §4.6: line ops transfer 8 words).
pub const CACHE_LINE_WORDS: usize = 8;

/// The operation that claimed a request from the L2 filter and is now
/// running to completion on exactly one bank.
#[derive(Debug, Clone)]
pub struct MemoryOperation {
    pub opcode: MemoryOpcode,
    pub address: MemoryAddr,
    pub sram_position: SramAddress,
    /// Where to send result flits (the requester's return channel).
    pub destination: ChannelId,
    /// Set once the operation is forwarded off-tile rather than served
    /// locally (spec §4.6 FORWARD state).
    pub forwarded: bool,
    /// Payload words received so far, for multi-flit stores/atomics.
    pub payload: VecDeque<u32>,
    /// Result words staged for emission on the output network, in order.
    pub results: VecDeque<u32>,
    /// Word cursor for line-granularity operations (0..=CACHE_LINE_WORDS).
    pub cursor: usize,
    pub finished: bool,
}

impl MemoryOperation {
    #[must_use]
    pub fn new(opcode: MemoryOpcode, address: MemoryAddr, sram_position: SramAddress, destination: ChannelId) -> Self {
        Self {
            opcode,
            address,
            sram_position,
            destination,
            forwarded: false,
            payload: VecDeque::new(),
            results: VecDeque::new(),
            cursor: 0,
            finished: false,
        }
    }

    /// How many payload (non-header) flits this opcode expects before it can
    /// execute (spec §4.6 opcode table).
    #[must_use]
    pub fn expected_payload_flits(&self) -> usize {
        match self.opcode {
            MemoryOpcode::StoreW
            | MemoryOpcode::StoreHw
            | MemoryOpcode::StoreB
            | MemoryOpcode::StoreConditional
            | MemoryOpcode::LoadAndAdd
            | MemoryOpcode::LoadAndOr
            | MemoryOpcode::LoadAndAnd
            | MemoryOpcode::LoadAndXor
            | MemoryOpcode::Exchange
            | MemoryOpcode::MemsetLine => 1,
            MemoryOpcode::StoreLine | MemoryOpcode::PushLine => CACHE_LINE_WORDS,
            _ => 0,
        }
    }

    /// Whether the operation still needs more payload flits before it can
    /// run `execute`.
    #[must_use]
    pub fn awaiting_payload(&self) -> bool {
        self.payload.len() < self.expected_payload_flits()
    }

    pub fn push_payload(&mut self, word: u32) {
        assert!(self.awaiting_payload(), "operation received an unexpected payload flit");
        self.payload.push_back(word);
    }

    /// Number of result flits this opcode will ultimately produce.
    #[must_use]
    pub fn expected_results(&self) -> usize {
        if self.opcode == MemoryOpcode::FetchLine {
            CACHE_LINE_WORDS
        } else if self.opcode.produces_result() {
            1
        } else {
            0
        }
    }

    #[must_use]
    pub fn results_to_send(&self) -> usize {
        self.results.len()
    }

    pub fn push_result(&mut self, word: u32) {
        self.results.push_back(word);
    }

    pub fn take_result(&mut self) -> Option<u32> {
        self.results.pop_front()
    }

    /// True once every result the operation owes has been queued and the
    /// bank can release it.
    #[must_use]
    pub fn complete(&self) -> bool {
        self.finished && self.results.is_empty()
    }
}
