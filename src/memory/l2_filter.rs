//! L2 request filter and bank association (spec §4.7): every tile-level L2
//! request is broadcast to all banks; each independently decides whether it
//! claims the request, and a shared association tracks the other banks'
//! responses so that exactly one claim is made.

use super::bank::MemoryBank;
use crate::flit::{Flit, MemoryOpcode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankVerdict {
    /// This bank hit, or is the pre-selected target for a must-access
    /// opcode: claim the request immediately.
    Claim,
    /// Not this bank's concern at all.
    Ignore,
    /// Possibly this bank's concern, pending every other bank's verdict.
    Wait,
}

/// One bank's view of a broadcast request head flit.
#[must_use]
pub fn evaluate(bank: &MemoryBank, head: &Flit, target_bank: usize) -> BankVerdict {
    let opcode = head.opcode.expect("head flit must carry an opcode");
    let addr = head.address();

    if bank.flushing(addr) {
        return BankVerdict::Wait;
    }

    let cache_hit = bank.contains(addr);
    let targeting_this_bank = target_bank == bank.index;
    let must_access_target = head.metadata.scratchpad || opcode == MemoryOpcode::PushLine || head.metadata.skip_l2;

    if must_access_target && !targeting_this_bank {
        BankVerdict::Ignore
    } else if cache_hit || (targeting_this_bank && must_access_target) {
        BankVerdict::Claim
    } else if targeting_this_bank {
        BankVerdict::Wait
    } else {
        BankVerdict::Ignore
    }
}

/// Per-bank wrapper combining [`evaluate`] with the bank's own `claim`.
#[derive(Debug, Default)]
pub struct L2RequestFilter;

impl L2RequestFilter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Evaluate and, if the verdict is `Claim`, perform the claim. Returns
    /// the verdict either way so the tile-level association can track it.
    pub fn step(&self, bank: &mut MemoryBank, head: &Flit, target_bank: usize, requester: crate::ids::ChannelId) -> BankVerdict {
        let verdict = evaluate(bank, head, target_bank);
        if verdict == BankVerdict::Claim && bank.is_idle() {
            bank.claim(*head, requester);
        }
        verdict
    }
}

/// Tracks the verdicts of every bank for one broadcast request, firing once
/// all have reported (`allResponsesReceivedEvent`) and asserting at most one
/// claim.
#[derive(Debug)]
pub struct BankAssociation {
    num_banks: usize,
    reported: Vec<Option<BankVerdict>>,
}

impl BankAssociation {
    #[must_use]
    pub fn new(num_banks: usize) -> Self {
        Self {
            num_banks,
            reported: vec![None; num_banks],
        }
    }

    pub fn record(&mut self, bank: usize, verdict: BankVerdict) {
        assert!(self.reported[bank].is_none(), "bank {bank} reported twice for one request");
        self.reported[bank] = Some(verdict);
    }

    #[must_use]
    pub fn all_reported(&self) -> bool {
        self.reported.iter().all(Option::is_some)
    }

    /// The unique claiming bank, if any. Errs if more than one bank claimed
    /// (spec: "At most one claim per request is permitted (asserted)"), so
    /// the caller can promote the violation to a dated `Error::Protocol`
    /// (spec §7) instead of aborting the process.
    pub fn claimant(&self) -> Result<Option<usize>, String> {
        let claimants: Vec<usize> = self
            .reported
            .iter()
            .enumerate()
            .filter(|(_, v)| **v == Some(BankVerdict::Claim))
            .map(|(i, _)| i)
            .collect();
        if claimants.len() > 1 {
            return Err(format!("more than one bank claimed the same request: {claimants:?}"));
        }
        Ok(claimants.first().copied())
    }

    pub fn reset(&mut self) {
        self.reported = vec![None; self.num_banks];
    }
}
