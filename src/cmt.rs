//! Channel Map Table and Bank Selector (spec §4.4).
//!
//! The CMT holds, per logical channel of a core, the destination the core is
//! currently connected to and a credit counter for flow control back to that
//! destination. The bank selector turns a CMT entry's base mapping plus a
//! request address into the concrete bank that should serve it, grounded in
//! `MemoryBankSelector.cpp`.

use crate::flit::MemoryOpcode;
use crate::ids::{ChannelId, MemoryAddr};

const CACHE_LINE_BYTES: u32 = 32;

/// One entry of the Channel Map Table.
#[derive(Debug, Clone, Copy)]
pub struct MemoryChannel {
    pub destination: ChannelId,
    /// log2 of the number of banks this mapping spans (a "memory group").
    pub log_group_size: u8,
    pub return_channel: u32,
}

impl MemoryChannel {
    #[must_use]
    pub fn single_bank(destination: ChannelId, return_channel: u32) -> Self {
        Self {
            destination,
            log_group_size: 0,
            return_channel,
        }
    }
}

#[derive(Debug)]
struct Entry {
    mapping: MemoryChannel,
    credits: u32,
}

/// Per-core table of logical-channel mappings.
#[derive(Debug)]
pub struct ChannelMapTable {
    entries: Vec<Option<Entry>>,
}

impl ChannelMapTable {
    #[must_use]
    pub fn new(num_entries: usize) -> Self {
        Self {
            entries: (0..num_entries).map(|_| None).collect(),
        }
    }

    #[must_use]
    pub fn read(&self, index: usize) -> Option<MemoryChannel> {
        self.entries[index].as_ref().map(|e| e.mapping)
    }

    /// Replace an entry, resetting its credit counter to zero (spec §4.4).
    pub fn write(&mut self, index: usize, mapping: MemoryChannel) {
        self.entries[index] = Some(Entry { mapping, credits: 0 });
    }

    #[must_use]
    pub fn credits_available(&self, index: usize) -> u32 {
        self.entries[index].as_ref().map_or(0, |e| e.credits)
    }

    /// A credit flit arrived for this channel.
    pub fn add_credit(&mut self, index: usize) {
        let entry = self.entries[index]
            .as_mut()
            .expect("add_credit on an unmapped channel");
        entry.credits += 1;
    }

    /// Consume one credit. Callers must check [`Self::credits_available`]
    /// first (`waitForCredit` in the original blocks until one is present;
    /// here the caller's combinational phase does that check instead).
    pub fn wait_for_credit(&mut self, index: usize) {
        let entry = self.entries[index]
            .as_mut()
            .expect("wait_for_credit on an unmapped channel");
        assert!(entry.credits > 0, "no credit available on channel {index}");
        entry.credits -= 1;
    }
}

/// Resolves a CMT mapping plus a request's address/opcode into the concrete
/// destination channel to send on, tracking the bank offset of a multi-flit
/// request's header so payload flits that carry no address inherit it
/// (`previousOffset` in the original).
#[derive(Debug, Default)]
pub struct BankSelector {
    previous_offset: u32,
}

impl BankSelector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this opcode's payload carries a memory address (as opposed to
    /// being a continuation flit or directory write, which inherit/don't need
    /// the group offset).
    #[must_use]
    fn contains_address(opcode: MemoryOpcode) -> bool {
        !matches!(
            opcode,
            MemoryOpcode::Payload
                | MemoryOpcode::PayloadEop
                | MemoryOpcode::UpdateDirectoryEntry
                | MemoryOpcode::UpdateDirectoryMask
        )
    }

    /// Compute the destination for one flit of a request, given the CMT
    /// mapping in force and, for address-bearing flits, the address itself.
    pub fn resolve(&mut self, mapping: MemoryChannel, opcode: MemoryOpcode, payload: MemoryAddr) -> ChannelId {
        let offset = if mapping.log_group_size == 0 {
            0
        } else if Self::contains_address(opcode) {
            let address: MemoryAddr = payload;
            let cache_line = address / CACHE_LINE_BYTES;
            let mask = (1u32 << mapping.log_group_size) - 1;
            let offset = cache_line & mask;
            self.previous_offset = offset;
            offset
        } else {
            self.previous_offset
        };

        let mut destination = mapping.destination;
        destination.position_or_mask += offset;
        destination
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ComponentId, TileId};

    fn channel(bank: u32) -> ChannelId {
        ChannelId::unicast(ComponentId::new(TileId::new(0, 0), bank), 0)
    }

    #[test]
    fn credits_round_trip() {
        let mut cmt = ChannelMapTable::new(4);
        cmt.write(0, MemoryChannel::single_bank(channel(0), 0));
        assert_eq!(cmt.credits_available(0), 0);
        cmt.add_credit(0);
        cmt.add_credit(0);
        assert_eq!(cmt.credits_available(0), 2);
        cmt.wait_for_credit(0);
        assert_eq!(cmt.credits_available(0), 1);
    }

    #[test]
    fn write_resets_credits() {
        let mut cmt = ChannelMapTable::new(1);
        cmt.write(0, MemoryChannel::single_bank(channel(0), 0));
        cmt.add_credit(0);
        cmt.write(0, MemoryChannel::single_bank(channel(1), 0));
        assert_eq!(cmt.credits_available(0), 0);
    }

    #[test]
    fn group_selects_bank_from_address() {
        let mut selector = BankSelector::new();
        let mapping = MemoryChannel {
            destination: channel(0),
            log_group_size: 2, // 4-bank group
            return_channel: 0,
        };
        // cache line 5 (address 160) selects bank 5 & 0b11 == 1.
        let dest = selector.resolve(mapping, MemoryOpcode::LoadW, 160);
        assert_eq!(dest.position_or_mask, 1);
    }

    #[test]
    fn payload_flit_inherits_previous_offset() {
        let mut selector = BankSelector::new();
        let mapping = MemoryChannel {
            destination: channel(0),
            log_group_size: 2,
            return_channel: 0,
        };
        let header = selector.resolve(mapping, MemoryOpcode::StoreLine, 160);
        let payload = selector.resolve(mapping, MemoryOpcode::Payload, 0xDEAD);
        assert_eq!(header.position_or_mask, payload.position_or_mask);
    }
}
