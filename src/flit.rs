//! The flit/packet wire format (spec §3 "Flit", §6 "Wire formats").

use crate::ids::{ChannelId, MemoryAddr};
use strum::{Display, EnumIter};

/// Memory opcodes carried by request flits (spec §4.6 "Opcodes").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum MemoryOpcode {
    LoadW,
    LoadHw,
    LoadB,
    StoreW,
    StoreHw,
    StoreB,
    LoadLinked,
    StoreConditional,
    LoadAndAdd,
    LoadAndOr,
    LoadAndAnd,
    LoadAndXor,
    Exchange,
    FetchLine,
    StoreLine,
    MemsetLine,
    PushLine,
    IpkRead,
    ValidateLine,
    PrefetchLine,
    FlushLine,
    InvalidateLine,
    FlushAllLines,
    InvalidateAllLines,
    UpdateDirectoryEntry,
    UpdateDirectoryMask,
    Payload,
    PayloadEop,
}

impl MemoryOpcode {
    /// Opcodes that carry no address/payload of their own and exist purely to
    /// continue a packet already in flight.
    #[must_use]
    pub fn is_payload_only(self) -> bool {
        matches!(self, MemoryOpcode::Payload | MemoryOpcode::PayloadEop)
    }

    /// Atomic read-modify-write opcodes (spec §4.6).
    #[must_use]
    pub fn is_atomic(self) -> bool {
        matches!(
            self,
            MemoryOpcode::LoadAndAdd
                | MemoryOpcode::LoadAndOr
                | MemoryOpcode::LoadAndAnd
                | MemoryOpcode::LoadAndXor
                | MemoryOpcode::Exchange
        )
    }

    /// Whether this opcode produces a result flit back to the requester.
    #[must_use]
    pub fn produces_result(self) -> bool {
        matches!(
            self,
            MemoryOpcode::LoadW
                | MemoryOpcode::LoadHw
                | MemoryOpcode::LoadB
                | MemoryOpcode::LoadLinked
                | MemoryOpcode::StoreConditional
                | MemoryOpcode::FetchLine
                | MemoryOpcode::IpkRead
        ) || self.is_atomic()
    }

    /// Opcodes that are consumed entirely at the directory / MHL and never
    /// reach a memory bank (spec §4.5).
    #[must_use]
    pub fn is_directory_update(self) -> bool {
        matches!(
            self,
            MemoryOpcode::UpdateDirectoryEntry | MemoryOpcode::UpdateDirectoryMask
        )
    }
}

/// Per-flit metadata bits (spec §3, §6 "Wire formats").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Metadata {
    pub end_of_packet: bool,
    /// Connection claim (core-to-core channel allocation), ICU-only.
    pub allocate: bool,
    /// Disconnect marker, paired with `allocate` (ICU-only).
    pub acquired: bool,
    pub scratchpad: bool,
    pub skip_l1: bool,
    pub skip_l2: bool,
    pub return_channel: u8,
    pub return_tile: u8,
}

/// The unit of all network transport (spec §3 "Flit").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flit {
    pub payload: u32,
    pub destination: ChannelId,
    pub opcode: Option<MemoryOpcode>,
    pub metadata: Metadata,
    /// Monotonically assigned, used only for instrumentation/credit matching
    /// — never interpreted by routing logic (spec §3).
    pub message_id: u64,
}

impl Flit {
    #[must_use]
    pub fn new(payload: u32, destination: ChannelId, opcode: MemoryOpcode, end_of_packet: bool) -> Self {
        Self {
            payload,
            destination,
            opcode: Some(opcode),
            metadata: Metadata {
                end_of_packet,
                ..Metadata::default()
            },
            message_id: 0,
        }
    }

    #[must_use]
    pub fn payload_flit(payload: u32, destination: ChannelId, end_of_packet: bool) -> Self {
        let opcode = if end_of_packet {
            MemoryOpcode::PayloadEop
        } else {
            MemoryOpcode::Payload
        };
        Self::new(payload, destination, opcode, end_of_packet)
    }

    #[must_use]
    pub fn is_payload(&self) -> bool {
        self.opcode.map(MemoryOpcode::is_payload_only).unwrap_or(false)
    }

    #[must_use]
    pub fn with_message_id(mut self, id: u64) -> Self {
        self.message_id = id;
        self
    }

    #[must_use]
    pub fn address(&self) -> MemoryAddr {
        self.payload
    }
}

/// A monotonically increasing source of `message_id`s, one per [`crate::chip::Chip`].
#[derive(Debug, Default)]
pub struct MessageIdGenerator(u64);

impl MessageIdGenerator {
    pub fn next(&mut self) -> u64 {
        let id = self.0;
        self.0 += 1;
        id
    }
}
