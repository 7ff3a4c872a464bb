//! The backing store behind every tile's memory banks (spec §6, §4.11 of the
//! expanded design). Banks never reach this directly during timed execution
//! — only the FETCH_LINE/STORE_LINE protocol touches it, and the debug
//! "magic memory" path on [`crate::chip::Chip`] for program loading.

use crate::error::{Error, Result};
use crate::ids::MemoryAddr;
use std::collections::HashMap;

const PAGE_SIZE: u32 = 4096;

/// Access mode a request was issued under, for future permission checks
/// (spec §6: `readWord(addr, mode)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Data,
    Instruction,
}

pub trait MainMemory {
    fn read_word(&self, addr: MemoryAddr, mode: AccessMode) -> u32;
    fn read_byte(&self, addr: MemoryAddr, mode: AccessMode) -> u8;
    fn write_word(&mut self, addr: MemoryAddr, value: u32, mode: AccessMode) -> Result<()>;
    fn write_byte(&mut self, addr: MemoryAddr, value: u8, mode: AccessMode) -> Result<()>;
    fn read_only(&self, addr: MemoryAddr) -> bool;
    /// Ownership-tracking hook; timing-neutral bookkeeping only (spec §9:
    /// out of scope for timing).
    fn claim_cache_line(&mut self, bank: usize, addr: MemoryAddr);
}

/// A page-backed flat main memory, sufficient to drive the bank state
/// machine and loader end-to-end without an ELF toolchain.
#[derive(Debug, Default)]
pub struct FlatMainMemory {
    pages: HashMap<u32, Vec<u8>>,
    read_only_ranges: Vec<(MemoryAddr, MemoryAddr)>,
}

impl FlatMainMemory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_read_only(&mut self, start: MemoryAddr, end: MemoryAddr) {
        self.read_only_ranges.push((start, end));
    }

    fn page_of(&mut self, addr: MemoryAddr) -> &mut Vec<u8> {
        let page = addr / PAGE_SIZE;
        self.pages.entry(page).or_insert_with(|| vec![0u8; PAGE_SIZE as usize])
    }

    fn byte(&self, addr: MemoryAddr) -> u8 {
        let page = addr / PAGE_SIZE;
        self.pages
            .get(&page)
            .map(|p| p[(addr % PAGE_SIZE) as usize])
            .unwrap_or(0)
    }
}

impl MainMemory for FlatMainMemory {
    fn read_word(&self, addr: MemoryAddr, _mode: AccessMode) -> u32 {
        let aligned = addr & !0x3;
        u32::from_le_bytes([
            self.byte(aligned),
            self.byte(aligned + 1),
            self.byte(aligned + 2),
            self.byte(aligned + 3),
        ])
    }

    fn read_byte(&self, addr: MemoryAddr, _mode: AccessMode) -> u8 {
        self.byte(addr)
    }

    fn write_word(&mut self, addr: MemoryAddr, value: u32, mode: AccessMode) -> Result<()> {
        if self.read_only(addr) {
            log::warn!("write to read-only address {addr:#x} (mode {mode:?}) allowed but suspicious");
        }
        let aligned = addr & !0x3;
        let bytes = value.to_le_bytes();
        let page = self.page_of(aligned);
        let offset = (aligned % PAGE_SIZE) as usize;
        page[offset..offset + 4].copy_from_slice(&bytes);
        Ok(())
    }

    fn write_byte(&mut self, addr: MemoryAddr, value: u8, mode: AccessMode) -> Result<()> {
        if self.read_only(addr) {
            log::warn!("byte write to read-only address {addr:#x} (mode {mode:?}) allowed but suspicious");
        }
        let page = self.page_of(addr);
        page[(addr % PAGE_SIZE) as usize] = value;
        Ok(())
    }

    fn read_only(&self, addr: MemoryAddr) -> bool {
        self.read_only_ranges.iter().any(|&(start, end)| addr >= start && addr < end)
    }

    fn claim_cache_line(&mut self, _bank: usize, _addr: MemoryAddr) {}
}

impl FlatMainMemory {
    /// Used by the loader to reject out-of-range program images early
    /// rather than silently zero-filling (spec §6 "program loading").
    pub fn check_fits(&self, addr: MemoryAddr, len: usize) -> Result<()> {
        if (addr as u64) + (len as u64) > u64::from(u32::MAX) {
            return Err(Error::Config(format!("program image at {addr:#x} of length {len} overflows address space")));
        }
        Ok(())
    }
}
