//! Arbitration (spec §4.1).
//!
//! An arbiter picks at most one granted requester per output, per cycle, from
//! a bit-vector of requests. Round-robin, matrix and fixed-priority variants
//! are interchangeable through the same [`Policy`] trait; only round-robin is
//! required by the spec, but all three are provided since the original
//! source keeps the same ambiguity (`ArbiterBase::makeArbiter`) between them.

mod matrix;
mod priority;
mod round_robin;

pub use matrix::MatrixPolicy;
pub use priority::PriorityPolicy;
pub use round_robin::RoundRobinPolicy;

/// Distinguished "nothing to grant" result (spec §4.1).
pub const NO_GRANT: usize = usize::MAX;

/// The pure decision of which requester to grant next, given the current
/// request vector and whichever requesters already hold a grant on other
/// outputs this cycle. Implementations are purely combinational (spec §4.1
/// "Failure semantics: None; purely combinational").
pub trait Policy: std::fmt::Debug {
    /// Choose the next requester to grant, or [`NO_GRANT`].
    fn grant(&mut self, requests: &[bool], already_granted: &[bool]) -> usize;

    /// Record that `index` was granted this cycle, for fairness bookkeeping
    /// (round-robin advances its pointer; priority/matrix may ignore this).
    fn accept(&mut self, index: usize);
}

/// A single arbiter instance: a [`Policy`] plus optional wormhole reservation
/// state, one reservation slot per *output* (spec §4.1 "Wormhole
/// discipline").
#[derive(Debug)]
pub struct Arbiter {
    policy: Box<dyn Policy + Send>,
    num_outputs: usize,
    wormhole: bool,
    /// `reservations[output] == Some(input)` while a packet from `input` is
    /// mid-flight through `output`.
    reservations: Vec<Option<usize>>,
}

impl Arbiter {
    #[must_use]
    pub fn new(policy: Box<dyn Policy + Send>, num_outputs: usize, wormhole: bool) -> Self {
        Self {
            policy,
            num_outputs,
            wormhole,
            reservations: vec![None; num_outputs],
        }
    }

    #[must_use]
    pub fn round_robin(num_inputs: usize, num_outputs: usize, wormhole: bool) -> Self {
        Self::new(
            Box::new(RoundRobinPolicy::new(num_inputs)),
            num_outputs,
            wormhole,
        )
    }

    /// Reset reservation/grant bookkeeping at a cycle boundary. Round-robin
    /// pointer state is *not* reset here — it persists across cycles for
    /// fairness.
    pub fn reset(&mut self) {
        // Reservations persist across cycles by design (they track in-flight
        // packets); nothing to clear here. Kept as an explicit method so
        // callers have a place to hook cycle-boundary bookkeeping, matching
        // `ArbiterBase::reset()`.
    }

    /// Grant one output to a requester, given `request` bits per input and
    /// whether each flit waiting at an input is mid-packet (`false`) or the
    /// final flit of its packet (`true`, i.e. `end_of_packet`).
    ///
    /// `already_granted` marks inputs that have already won a different
    /// output this cycle, so a single input cannot win two outputs in one
    /// arbitration round.
    pub fn get_grant(
        &mut self,
        output: usize,
        requests: &[bool],
        end_of_packet: &[bool],
        already_granted: &mut [bool],
    ) -> usize {
        debug_assert!(output < self.num_outputs);

        if self.wormhole {
            if let Some(reserved_input) = self.reservations[output] {
                if requests[reserved_input] {
                    if end_of_packet[reserved_input] {
                        self.reservations[output] = None;
                    }
                    already_granted[reserved_input] = true;
                    return reserved_input;
                }
                // The reservation holder has nothing to send this cycle;
                // no other input may use this output until it does.
                return NO_GRANT;
            }
        }

        let masked: Vec<bool> = requests
            .iter()
            .zip(already_granted.iter())
            .map(|(&r, &g)| r && !g)
            .collect();

        let grant = self.policy.grant(&masked, already_granted);
        if grant == NO_GRANT {
            return NO_GRANT;
        }

        self.policy.accept(grant);
        already_granted[grant] = true;

        if self.wormhole {
            // A one-flit packet (head and EOP coincide) claims and releases
            // the reservation in the same cycle: we simply never set it.
            if !end_of_packet[grant] {
                self.reservations[output] = Some(grant);
            }
        }

        grant
    }
}
