//! Miss-Handling Logic (spec §4.8), grounded in `MissHandlingLogic.cpp`:
//! the single point per tile through which every off-bank request leaves and
//! every response arrives, including pseudo-random target-bank selection for
//! cache misses.

use crate::directory::Directory;
use crate::flit::{Flit, MemoryOpcode};
use crate::ids::{ChannelId, TileId};

/// 6-bit LFSR with generator polynomial x^6 + x^5 + 1, period 63 (spec
/// §4.8; matches the Verilog `l2_prng.sv` the original source ports).
#[derive(Debug, Clone, Copy)]
struct Lfsr(u8);

impl Lfsr {
    fn new(seed: u8) -> Self {
        Self(seed & 0x3F)
    }

    /// Advance the register one step.
    fn next_state(&mut self) {
        self.0 = (self.0 >> 1) ^ if self.0 & 0x1 != 0 { 0x30 } else { 0x0 };
    }
}

/// Chooses a pseudo-random target bank for a cache miss, holding the choice
/// for the remainder of the packet (spec: "sampled once per new request
/// header and held for the whole packet").
#[derive(Debug)]
pub struct TargetBankSelector {
    lfsr: Lfsr,
    last_target: usize,
    num_banks: usize,
}

impl TargetBankSelector {
    #[must_use]
    pub fn new(seed: u8, num_banks: usize) -> Self {
        assert!(num_banks >= 1);
        Self {
            lfsr: Lfsr::new(seed),
            last_target: 0,
            num_banks,
        }
    }

    /// `nextTargetBank()`: rotate the previous target by 1 and optionally by
    /// a further 1 or 4 positions depending on the LFSR state, then advance
    /// the LFSR (spec §4.8, `MissHandlingLogic::nextTargetBank`).
    pub fn next_target_bank(&mut self) -> usize {
        let n = self.num_banks as isize;
        let mut target = self.last_target as isize;

        target = (target - 1).rem_euclid(n);
        if self.lfsr.0 & 0x1 != 0 {
            target = (target - 1).rem_euclid(n);
        }
        if self.lfsr.0 & 0x4 != 0 {
            target = (target - 4).rem_euclid(n);
        }

        self.lfsr.next_state();
        self.last_target = target as usize;
        self.last_target
    }
}

/// Per-tile miss-handling logic: directory consultation, forwarding and
/// response dispatch.
#[derive(Debug)]
pub struct MissHandlingLogic {
    directory: Directory,
    selector: TargetBankSelector,
}

/// The decision the MHL makes for one outgoing request head flit.
#[derive(Debug)]
pub enum Routing {
    /// Consumed here: the flit was a directory update targeted at this tile.
    ConsumedLocally,
    /// Forward on the tile's request output, rewritten to `next_tile`.
    Forward { next_tile: TileId, rewritten: Flit },
}

impl MissHandlingLogic {
    #[must_use]
    pub fn new(directory: Directory, lfsr_seed: u8, num_banks: usize) -> Self {
        Self {
            directory,
            selector: TargetBankSelector::new(lfsr_seed, num_banks),
        }
    }

    #[must_use]
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    #[must_use]
    pub fn directory_mut(&mut self) -> &mut Directory {
        &mut self.directory
    }

    /// Consult the directory for `head` and decide how to route it (spec
    /// §4.8 "Outgoing").
    pub fn route_outgoing(&mut self, head: Flit) -> Routing {
        let opcode = head.opcode.expect("head flit must carry an opcode");

        if opcode.is_directory_update() {
            match opcode {
                MemoryOpcode::UpdateDirectoryEntry => {
                    self.directory.set_entry(head.address(), head.payload);
                }
                MemoryOpcode::UpdateDirectoryMask => {
                    self.directory.set_mask_lsb(head.address(), head.payload as u8);
                }
                _ => unreachable!(),
            }
            return Routing::ConsumedLocally;
        }

        let address = head.address();
        let next_tile = self.directory.get_next_tile(address);
        let translated = self.directory.update_address(address);

        let mut rewritten = head;
        rewritten.payload = translated;

        Routing::Forward { next_tile, rewritten }
    }

    /// Choose the fallback target bank for a cache-mode miss on this tile
    /// (spec §4.8 "Target bank selection for misses"). Scratchpad mode and
    /// `PUSH_LINE` encode their own target and never call this.
    pub fn choose_target_bank(&mut self) -> usize {
        self.selector.next_target_bank()
    }

    /// Deliver an incoming response packet to the bank identified by its
    /// return channel (spec §4.8 "Incoming").
    #[must_use]
    pub fn response_target_bank(head: &Flit) -> usize {
        head.destination.component().position as usize
    }

    /// Resolve the bank index to use for a new miss, honouring scratchpad
    /// and `PUSH_LINE` address/payload encodings before falling back to the
    /// LFSR-chosen target.
    pub fn target_bank_for_miss(&mut self, head: &Flit, in_scratchpad: bool) -> usize {
        if in_scratchpad {
            return (head.address() as usize) % self.selector.num_banks;
        }
        if head.opcode == Some(MemoryOpcode::PushLine) {
            return (head.payload as usize) & (self.selector.num_banks - 1);
        }
        if head.metadata.skip_l2 {
            return head.destination.component().position as usize;
        }
        self.choose_target_bank()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lfsr_has_expected_period() {
        let mut lfsr = Lfsr::new(0x3F);
        let start = lfsr.0;
        let mut steps = 0;
        loop {
            lfsr.next_state();
            steps += 1;
            if lfsr.0 == start || steps > 100 {
                break;
            }
        }
        assert_eq!(steps, 63);
    }

    #[test]
    fn target_bank_selection_stays_within_range() {
        let mut selector = TargetBankSelector::new(0x3F, 4);
        for _ in 0..200 {
            let target = selector.next_target_bank();
            assert!(target < 4);
        }
    }

    #[test]
    fn directory_update_is_consumed_locally() {
        let directory = Directory::new(4, 10);
        let mut mhl = MissHandlingLogic::new(directory, 0x3F, 4);
        let dest = ChannelId::unicast(crate::ids::ComponentId::new(TileId::new(0, 0), 0), 0);
        let head = Flit::new(0, dest, MemoryOpcode::UpdateDirectoryEntry, false);
        match mhl.route_outgoing(head) {
            Routing::ConsumedLocally => {}
            Routing::Forward { .. } => panic!("directory update must not be forwarded"),
        }
    }
}
