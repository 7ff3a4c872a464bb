//! A single cache/scratchpad bank (spec §4.6), grounded in `MemoryBank.cpp`'s
//! SRAM hashing and `IDLE/REQUEST/ALLOCATE/FLUSH/REFILL/FORWARD` cycle.

use super::operation::{MemoryOperation, CACHE_LINE_WORDS};
use crate::flit::{Flit, MemoryOpcode};
use crate::flow::FlowBuffer;
use crate::ids::{ChannelId, MemoryAddr};
use std::collections::{HashMap, VecDeque};

/// Bit an instruction word carries to mark the last instruction of a packet
/// (spec §4.6 IPK_READ: "end-of-packet marker embedded in instruction"); the
/// high bit of the 32-bit word, mirroring the low-bit `endOfPacket` flit tag
/// used everywhere else in this crate but embedded in the data itself since
/// an instruction fetch has no per-word flit metadata to carry it in.
const IPK_END_OF_PACKET_BIT: u32 = 1 << 31;

/// Upper bound on instructions streamed by one IPK_READ before its
/// end-of-packet bit must have appeared; guards against a malformed/
/// un-terminated packet spinning the bank forever.
const IPK_MAX_PACKET_WORDS: usize = 64;

/// Which state a completed `FLUSH` should return control to (spec: "to
/// previousState (REQUEST or IDLE)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushResume {
    Request,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankState {
    Idle,
    Request,
    Allocate,
    Flush,
    Refill,
    Forward,
}

/// One emission a bank may produce in a single `step()` call.
#[derive(Debug, Default)]
pub struct BankOutputs {
    /// Flit to send downstream (toward the L2 filter / MHL / network).
    pub to_request_network: Option<Flit>,
    /// Flit to send back to the requester.
    pub to_response_network: Option<Flit>,
    /// A cache miss has just been recorded (for instrumentation/deadlock
    /// liveness tracking).
    pub missed: bool,
}

#[derive(Debug)]
pub struct MemoryBank {
    pub index: usize,
    cache_mode: bool,

    tags: Vec<MemoryAddr>,
    valid: Vec<bool>,
    dirty: Vec<bool>,
    l2_skip: Vec<bool>,
    data: Vec<u32>,

    index_bits: u32,
    lines: usize,

    /// `(line) -> owner`; a line has at most one outstanding reservation.
    reservations: HashMap<usize, ChannelId>,

    state: BankState,
    flush_resume: FlushResume,

    active: Option<MemoryOperation>,
    missing: Option<MemoryOperation>,

    /// Payload flits that arrived for the request behind `missing` while its
    /// line is still being fetched (spec §3 `missBuffer`).
    miss_buffer: VecDeque<Flit>,

    /// Cache-line-aligned addresses currently being flushed; a fetch for any
    /// of these must wait (spec §4.7 "flush interlock").
    pending_flushes: VecDeque<MemoryAddr>,

    pub output_response: FlowBuffer<Flit>,
    pub output_request: FlowBuffer<Flit>,

    /// Words already sent/received for the in-progress FLUSH/REFILL line.
    line_cursor: usize,
}

impl MemoryBank {
    #[must_use]
    pub fn new(index: usize, lines_per_bank: usize, cache_mode: bool, buffer_capacity: usize) -> Self {
        assert!(lines_per_bank.is_power_of_two());
        Self {
            index,
            cache_mode,
            tags: vec![0; lines_per_bank],
            valid: vec![false; lines_per_bank],
            dirty: vec![false; lines_per_bank],
            l2_skip: vec![false; lines_per_bank],
            data: vec![0; lines_per_bank * CACHE_LINE_WORDS],
            index_bits: lines_per_bank.trailing_zeros(),
            lines: lines_per_bank,
            reservations: HashMap::new(),
            state: BankState::Idle,
            flush_resume: FlushResume::Idle,
            active: None,
            missing: None,
            miss_buffer: VecDeque::new(),
            pending_flushes: VecDeque::new(),
            output_response: FlowBuffer::new(buffer_capacity),
            output_request: FlowBuffer::new(buffer_capacity),
            line_cursor: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> BankState {
        self.state
    }

    /// SRAM position for `addr`: bank index hashed into the upper index
    /// bits so adjacent lines spread across banks evenly (spec §4.6).
    #[must_use]
    fn sram_position(&self, addr: MemoryAddr) -> u32 {
        let index = (addr >> 8) & ((1 << self.index_bits) - 1);
        let bank = (addr >> 5) & 0x7;
        let shift = self.index_bits.saturating_sub(3);
        let slot = index ^ (bank << shift);
        (slot << 5) | (addr & 31)
    }

    fn line_of(&self, addr: MemoryAddr) -> usize {
        (self.sram_position(addr) >> 5) as usize % self.lines
    }

    fn tag_of(addr: MemoryAddr) -> MemoryAddr {
        addr & !0x1F
    }

    /// `contains(addr, pos, mode)`: true iff this bank currently holds a
    /// valid line for `addr`. Scratchpad mode never misses: every line the
    /// tile owns is considered present.
    #[must_use]
    pub fn contains(&self, addr: MemoryAddr) -> bool {
        if !self.cache_mode {
            return true;
        }
        let line = self.line_of(addr);
        self.valid[line] && self.tags[line] == Self::tag_of(addr)
    }

    /// Whether the line containing `addr` is currently mid-flush (spec
    /// §4.7 "flush interlock").
    #[must_use]
    pub fn flushing(&self, addr: MemoryAddr) -> bool {
        self.pending_flushes.contains(&Self::tag_of(addr))
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self.state, BankState::Idle) && self.active.is_none() && self.missing.is_none()
    }

    /// Whether this bank forwarded a request off-tile and is still waiting
    /// on its response (spec §4.6: `missing`, parked across the network
    /// round trip).
    #[must_use]
    pub fn awaiting_response(&self) -> bool {
        self.missing.is_some() && matches!(self.state, BankState::Idle)
    }

    fn read_word(&self, addr: MemoryAddr) -> u32 {
        let index = (self.sram_position(addr) / 4) as usize % self.data.len();
        self.data[index]
    }

    /// Writes a word, marks its line dirty in cache mode and clears any
    /// reservation on the line regardless of who owned it (spec §3: "A
    /// reservation is invalidated by any write to any byte of its line,
    /// whether by the reserving core or another").
    fn write_word(&mut self, addr: MemoryAddr, value: u32) {
        let position = self.sram_position(addr);
        let index = (position / 4) as usize % self.data.len();
        self.data[index] = value;
        let line = self.line_of(addr);
        if self.cache_mode {
            self.dirty[line] = true;
        }
        self.reservations.remove(&line);
    }

    fn make_reservation(&mut self, addr: MemoryAddr, requester: ChannelId) {
        self.reservations.insert(self.line_of(addr), requester);
    }

    fn check_reservation(&self, addr: MemoryAddr, requester: ChannelId) -> bool {
        self.reservations.get(&self.line_of(addr)) == Some(&requester)
    }

    fn invalidate(&mut self, addr: MemoryAddr) {
        let line = self.line_of(addr);
        self.valid[line] = false;
        self.reservations.remove(&line);
    }

    fn validate(&mut self, addr: MemoryAddr) {
        let line = self.line_of(addr);
        self.tags[line] = Self::tag_of(addr);
        self.valid[line] = true;
    }

    /// `allocate(addr)`: prepare a line for `addr`, evicting whatever is
    /// there. Returns `true` if the evicted line was dirty and needs
    /// flushing first.
    fn allocate(&mut self, addr: MemoryAddr) -> bool {
        let line = self.line_of(addr);
        let needs_flush = self.valid[line] && self.dirty[line] && self.tags[line] != Self::tag_of(addr);
        if !needs_flush {
            self.tags[line] = Self::tag_of(addr);
            self.valid[line] = true;
            self.dirty[line] = false;
        }
        needs_flush
    }

    /// The request/MHL side claims this bank for `flit`, having already
    /// consulted the L2 filter (spec §4.7). Only valid from `Idle`.
    pub fn claim(&mut self, flit: Flit, requester: ChannelId) {
        assert_eq!(self.state, BankState::Idle, "claim on a busy bank");
        let opcode = flit.opcode.expect("claimed flit has no opcode");
        let position = self.sram_position(flit.address());
        let operation = MemoryOperation::new(opcode, flit.address(), position, requester);
        self.active = Some(operation);
        self.state = BankState::Request;
    }

    /// A payload flit continuing the active (or missing) operation arrived.
    /// Errs rather than panics on a flit with nothing to receive it, so the
    /// caller can promote it to a dated `Error::Protocol` (spec §7).
    pub fn offer_payload(&mut self, word: u32) -> Result<(), String> {
        if let Some(op) = self.active.as_mut().filter(|op| op.awaiting_payload()) {
            op.push_payload(word);
        } else if self.missing.is_some() {
            self.miss_buffer.push_back(Flit::payload_flit(word, ChannelId::null(), false));
        } else {
            return Err("payload flit with no operation to receive it".to_string());
        }
        Ok(())
    }

    /// A refill word arrived from the backing store / MHL response path.
    pub fn offer_refill_word(&mut self, word: u32) {
        assert_eq!(self.state, BankState::Refill);
        let op = self.missing.as_ref().expect("REFILL with no missing request");
        let position = op.sram_position as usize + self.line_cursor * 4;
        let index = (position / 4) % self.data.len();
        self.data[index] = word;
        self.line_cursor += 1;
    }

    /// One combinational-phase transition (spec §4.6 state table).
    pub fn step(&mut self) -> BankOutputs {
        let mut out = BankOutputs::default();
        match self.state {
            BankState::Idle => {} // driven externally via claim()/offer_refill_word()
            BankState::Request => self.step_request(&mut out),
            BankState::Allocate => self.step_allocate(&mut out),
            BankState::Flush => self.step_flush(&mut out),
            BankState::Refill => self.step_refill(&mut out),
            BankState::Forward => self.step_forward(&mut out),
        }
        out
    }

    fn step_request(&mut self, out: &mut BankOutputs) {
        let op = self.active.as_mut().expect("REQUEST with no active operation");

        // A multi-result opcode (FETCH_LINE served as a local hit, IPK
        // streaming) already executed and is draining its staged results one
        // flit per cycle; re-running `execute_hit` would read the line again
        // and push duplicate results.
        if op.finished {
            self.finish_if_done(out);
            return;
        }

        if op.awaiting_payload() {
            return;
        }

        if op.forwarded {
            self.state = BankState::Forward;
            return;
        }

        if op.opcode.is_directory_update() {
            // Consumed at the MHL; never reaches a bank in a correct system.
            unreachable!("directory updates must be filtered before reaching a bank");
        }

        let hit = self.contains(op.address);
        if self.cache_mode && !hit {
            let address = op.address;
            self.state = BankState::Allocate;
            out.missed = true;
            let _ = address;
            return;
        }

        self.execute_hit(out);
    }

    fn execute_hit(&mut self, out: &mut BankOutputs) {
        let op = self.active.as_mut().expect("no active operation to execute");
        let requester = op.destination;

        match op.opcode {
            MemoryOpcode::LoadW | MemoryOpcode::LoadHw | MemoryOpcode::LoadB => {
                let value = self.read_word(op.address);
                op.push_result(value);
            }
            MemoryOpcode::LoadLinked => {
                let value = self.read_word(op.address);
                op.push_result(value);
                let addr = op.address;
                self.make_reservation(addr, requester);
            }
            MemoryOpcode::StoreW | MemoryOpcode::StoreHw | MemoryOpcode::StoreB => {
                let value = op.payload.pop_front().expect("store with no payload");
                let addr = op.address;
                self.write_word(addr, value);
            }
            MemoryOpcode::StoreConditional => {
                let addr = op.address;
                let ok = self.check_reservation(addr, requester);
                if ok {
                    let value = op.payload.pop_front().expect("sc with no payload");
                    self.write_word(addr, value);
                }
                op.push_result(u32::from(ok));
            }
            MemoryOpcode::LoadAndAdd
            | MemoryOpcode::LoadAndOr
            | MemoryOpcode::LoadAndAnd
            | MemoryOpcode::LoadAndXor
            | MemoryOpcode::Exchange => {
                let operand = op.payload.pop_front().expect("atomic with no operand");
                let addr = op.address;
                let old = self.read_word(addr);
                let new = match op.opcode {
                    MemoryOpcode::LoadAndAdd => old.wrapping_add(operand),
                    MemoryOpcode::LoadAndOr => old | operand,
                    MemoryOpcode::LoadAndAnd => old & operand,
                    MemoryOpcode::LoadAndXor => old ^ operand,
                    MemoryOpcode::Exchange => operand,
                    _ => unreachable!(),
                };
                self.write_word(addr, new);
                op.push_result(old);
            }
            MemoryOpcode::ValidateLine | MemoryOpcode::PrefetchLine => {
                let addr = op.address;
                self.validate(addr);
            }
            MemoryOpcode::InvalidateLine => {
                let addr = op.address;
                self.invalidate(addr);
            }
            MemoryOpcode::FlushLine => {
                let addr = op.address;
                let line = self.line_of(addr);
                if self.valid[line] && self.dirty[line] {
                    let tag = self.tags[line];
                    self.begin_flush(FlushResume::Request, tag);
                    return;
                }
            }
            MemoryOpcode::FlushAllLines => {
                for line in 0..self.lines {
                    self.dirty[line] = false;
                }
            }
            MemoryOpcode::InvalidateAllLines => {
                for line in 0..self.lines {
                    self.valid[line] = false;
                }
                self.reservations.clear();
            }
            MemoryOpcode::FetchLine | MemoryOpcode::MemsetLine | MemoryOpcode::StoreLine | MemoryOpcode::PushLine => {
                self.execute_line_op(out);
                return;
            }
            MemoryOpcode::IpkRead => {
                self.execute_ipk_read(out);
                return;
            }
            MemoryOpcode::UpdateDirectoryEntry | MemoryOpcode::UpdateDirectoryMask => {
                unreachable!("directory updates are filtered before reaching a bank")
            }
            MemoryOpcode::Payload | MemoryOpcode::PayloadEop => {
                unreachable!("continuation flits never begin an operation")
            }
        }

        self.finish_if_done(out);
    }

    fn execute_line_op(&mut self, out: &mut BankOutputs) {
        let op = self.active.as_ref().unwrap();
        match op.opcode {
            MemoryOpcode::MemsetLine => {
                let value = op.payload.front().copied().unwrap_or(0);
                let base = (self.sram_position(op.address) / 4) as usize;
                for w in 0..CACHE_LINE_WORDS {
                    let idx = (base + w) % self.data.len();
                    self.data[idx] = value;
                }
                let line = self.line_of(op.address);
                if self.cache_mode {
                    self.dirty[line] = true;
                }
            }
            MemoryOpcode::StoreLine | MemoryOpcode::PushLine => {
                let base = (self.sram_position(op.address) / 4) as usize;
                let op = self.active.as_mut().unwrap();
                for (w, word) in op.payload.drain(..).enumerate() {
                    let idx = (base + w) % self.data.len();
                    self.data[idx] = word;
                }
                let line = self.line_of(op.address);
                if self.cache_mode {
                    self.dirty[line] = true;
                }
            }
            MemoryOpcode::FetchLine => {
                let base = (self.sram_position(op.address) / 4) as usize;
                let words: Vec<u32> = (0..CACHE_LINE_WORDS).map(|w| self.data[(base + w) % self.data.len()]).collect();
                let op = self.active.as_mut().unwrap();
                for w in words {
                    op.push_result(w);
                }
            }
            _ => unreachable!(),
        }
        self.finish_if_done(out);
    }

    /// Stream instruction words starting at the operation's address until one
    /// carries the embedded end-of-packet bit, queuing each as a result flit
    /// (spec §4.6 IPK_READ).
    fn execute_ipk_read(&mut self, out: &mut BankOutputs) {
        let op = self.active.as_ref().unwrap();
        let mut addr = op.address;
        let mut words = Vec::new();
        loop {
            let word = self.read_word(addr);
            words.push(word);
            if word & IPK_END_OF_PACKET_BIT != 0 || words.len() >= IPK_MAX_PACKET_WORDS {
                break;
            }
            addr = addr.wrapping_add(4);
        }
        let op = self.active.as_mut().unwrap();
        for word in words {
            op.push_result(word);
        }
        self.finish_if_done(out);
    }

    fn finish_if_done(&mut self, out: &mut BankOutputs) {
        let op = self.active.as_mut().unwrap();
        op.finished = true;
        if let Some(word) = op.take_result() {
            out.to_response_network = Some(Flit::payload_flit(word, op.destination, op.results.is_empty()));
        }
        if op.complete() {
            self.active = None;
            self.state = BankState::Idle;
        }
    }

    fn begin_flush(&mut self, resume: FlushResume, tag: MemoryAddr) {
        self.pending_flushes.push_back(tag);
        self.line_cursor = 0;
        self.flush_resume = resume;
        self.state = BankState::Flush;
    }

    fn step_allocate(&mut self, out: &mut BankOutputs) {
        if self.contains(self.active.as_ref().unwrap().address) {
            self.state = BankState::Request;
            return;
        }

        let address = self.active.as_ref().unwrap().address;
        let line = self.line_of(address);
        let needs_flush = self.valid[line] && self.dirty[line] && self.tags[line] != Self::tag_of(address);
        if needs_flush {
            let tag = self.tags[line];
            self.begin_flush(FlushResume::Request, tag);
            out.to_request_network = Some(Flit::new(tag, ChannelId::null(), MemoryOpcode::StoreLine, false));
        } else {
            self.allocate(address);
            let mut op = self.active.take().unwrap();
            op.forwarded = false;
            self.missing = Some(op);
            self.line_cursor = 0;
            self.active = None;
            self.state = BankState::Idle;
            out.to_request_network = Some(Flit::new(address, ChannelId::null(), MemoryOpcode::FetchLine, true));
        }
    }

    fn step_flush(&mut self, out: &mut BankOutputs) {
        if self.line_cursor < CACHE_LINE_WORDS {
            let tag = self.pending_flushes.back().copied().unwrap_or(0);
            let base = (self.sram_position(tag) / 4) as usize;
            let word = self.data[(base + self.line_cursor) % self.data.len()];
            self.line_cursor += 1;
            out.to_request_network = Some(Flit::payload_flit(word, ChannelId::null(), self.line_cursor == CACHE_LINE_WORDS));
        } else {
            if let Some(tag) = self.pending_flushes.pop_back() {
                let line = self.line_of(tag);
                self.dirty[line] = false;
            }
            self.line_cursor = 0;
            self.state = match self.flush_resume {
                FlushResume::Request => BankState::Request,
                FlushResume::Idle => BankState::Idle,
            };
        }
    }

    fn step_refill(&mut self, _out: &mut BankOutputs) {
        if self.line_cursor < CACHE_LINE_WORDS {
            return; // waiting on offer_refill_word()
        }
        let op = self.missing.as_ref().unwrap();
        let line = self.line_of(op.address);
        self.dirty[line] = false;
        let mut resumed = self.missing.take().unwrap();
        resumed.cursor = 0;
        while let Some(flit) = self.miss_buffer.pop_front() {
            resumed.push_payload(flit.payload);
        }
        self.active = Some(resumed);
        self.line_cursor = 0;
        self.state = BankState::Request;
    }

    fn step_forward(&mut self, out: &mut BankOutputs) {
        let op = self.active.as_ref().unwrap();
        let expects_result = op.opcode.produces_result();
        out.to_request_network = Some(Flit::new(op.address, op.destination, op.opcode, true));
        if expects_result {
            let mut op = self.active.take().unwrap();
            op.finished = false;
            self.missing = Some(op);
        } else {
            self.active = None;
        }
        self.state = BankState::Idle;
    }

    /// Begin a REFILL once a response arrives for the parked `missing`
    /// request (spec: "IDLE | response available … | begin refill").
    pub fn begin_refill(&mut self) {
        assert!(matches!(self.state, BankState::Idle));
        assert!(self.missing.is_some());
        self.line_cursor = 0;
        self.state = BankState::Refill;
    }

    /// A response word arrived from the network for the parked `missing`
    /// request, transitioning IDLE -> REFILL on the first word of the
    /// packet.
    pub fn deliver_response(&mut self, word: u32) {
        if matches!(self.state, BankState::Idle) {
            self.begin_refill();
        }
        self.offer_refill_word(word);
    }

    /// Debug "magic memory" path (spec §9): touch a word bypassing the
    /// state machine entirely. Callers must only use this outside timed
    /// execution (program loading, instrumentation).
    pub fn magic_write_word(&mut self, addr: MemoryAddr, value: u32) {
        self.validate(addr);
        self.write_word(addr, value);
    }

    #[must_use]
    pub fn magic_read_word(&self, addr: MemoryAddr) -> u32 {
        self.read_word(addr)
    }
}
