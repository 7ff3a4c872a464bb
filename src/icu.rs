//! Inter-tile Communication Unit (spec §4.9): manages core-to-core connection
//! claim/release and generates credits for remote senders. Grounded in
//! `IntertileUnit.cpp`.

use crate::flit::Flit;
use crate::ids::ChannelId;
use std::collections::VecDeque;

#[derive(Debug, Default)]
struct CreditState {
    source: Option<ChannelId>,
    credits_pending: u32,
    use_credits: bool,
    disconnect_pending: bool,
}

impl CreditState {
    fn add_credit(&mut self) -> bool {
        if !self.use_credits {
            return false;
        }
        self.credits_pending += 1;
        self.credits_pending == 1
    }
}

/// One [`CreditState`] per `(core, input channel)` managed on this tile.
#[derive(Debug)]
pub struct IntertileUnit {
    state: Vec<Vec<CreditState>>,
    /// Source waiting for its rejected claim to be nacked. Only one may be
    /// outstanding at a time (spec: "single-outstanding-nack constraint").
    nack_channel: Option<ChannelId>,
    /// Buffer indices `(core, channel)` with credits ready to send, in the
    /// order they became ready — drained round-robin by [`Self::send_credits`].
    credits_outstanding: VecDeque<(usize, usize)>,
}

impl IntertileUnit {
    #[must_use]
    pub fn new(num_cores: usize, num_input_channels: usize) -> Self {
        let state = (0..num_cores)
            .map(|_| (0..num_input_channels).map(|_| CreditState::default()).collect())
            .collect();
        Self {
            state,
            nack_channel: None,
            credits_outstanding: VecDeque::new(),
        }
    }

    /// A connection-management flit arrived targeting `(core, channel)`.
    /// `source` decodes the requester's own channel from the payload.
    /// Returns `true` if the claim was accepted, `false` if rejected
    /// (pushed onto the single nack slot).
    pub fn handle_port_claim(&mut self, core: usize, channel: usize, acquired: bool, source: ChannelId) -> bool {
        let state = &mut self.state[core][channel];

        if acquired {
            state.disconnect_pending = true;
            if state.add_credit() {
                self.credits_outstanding.push_back((core, channel));
            }
            return true;
        }

        if state.source.is_none() {
            debug_assert_eq!(state.credits_pending, 0);
            state.use_credits = true;
            state.source = Some(source);
            if state.add_credit() {
                self.credits_outstanding.push_back((core, channel));
            }
            true
        } else {
            assert!(
                self.nack_channel.is_none(),
                "cannot have more than one outstanding nack"
            );
            assert_ne!(state.source, Some(source), "claim from the already-connected source");
            self.nack_channel = Some(source);
            false
        }
    }

    /// `dataConsumed`: a local core drained one flit from its input buffer,
    /// which generates a credit to be returned to that buffer's source.
    pub fn data_consumed(&mut self, core: usize, channel: usize) {
        let state = &mut self.state[core][channel];
        if state.add_credit() {
            self.credits_outstanding.push_back((core, channel));
        }
    }

    /// Whether there is a credit or nack ready to emit this cycle.
    #[must_use]
    pub fn has_outgoing(&self) -> bool {
        self.nack_channel.is_some() || !self.credits_outstanding.is_empty()
    }

    /// Produce the next flit to send on the credit network, if any. Nacks
    /// take priority over ordinary credit flits (spec: "Priority: respond to
    /// failed connection attempts").
    pub fn send_credits(&mut self) -> Option<Flit> {
        if let Some(destination) = self.nack_channel.take() {
            return Some(Self::nack_flit(destination));
        }

        let (core, channel) = self.credits_outstanding.pop_front()?;
        let state = &mut self.state[core][channel];
        let source = state.source.expect("credit queued for an unconnected buffer");
        let credits = state.credits_pending;
        state.credits_pending = 0;

        if state.disconnect_pending {
            state.source = None;
            state.use_credits = false;
            state.disconnect_pending = false;
        }

        Some(Self::credit_flit(source, credits))
    }

    fn nack_flit(destination: ChannelId) -> Flit {
        Flit::new(0, destination, crate::flit::MemoryOpcode::StoreConditional, true)
    }

    fn credit_flit(destination: ChannelId, credits: u32) -> Flit {
        Flit::new(credits, destination, crate::flit::MemoryOpcode::StoreConditional, true)
    }
}
