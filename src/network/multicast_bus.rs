//! Multicast bus: single input, fans one flit out to many outputs, joins on
//! every target's acknowledgement before accepting the next flit (spec §4.3,
//! Scenario E).

use crate::flit::Flit;

#[derive(Debug)]
struct InFlight {
    flit: Flit,
    targets: Vec<usize>,
    acked: Vec<bool>,
}

#[derive(Debug, Default)]
pub struct MulticastBus {
    in_flight: Option<InFlight>,
}

impl MulticastBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ready signal: deasserted while any target of the previous flit has
    /// not yet acknowledged (spec §4.3).
    #[must_use]
    pub fn ready(&self) -> bool {
        self.in_flight.is_none()
    }

    /// Compute the target output indices selected by a coremask, bit *i*
    /// selecting the *i*-th core (spec §3).
    #[must_use]
    pub fn targets_for_mask(coremask: u32, num_outputs: usize) -> Vec<usize> {
        (0..num_outputs).filter(|i| coremask & (1 << i) != 0).collect()
    }

    /// Accept a new flit for fan-out. Panics if not [`Self::ready`].
    pub fn inject(&mut self, flit: Flit, coremask: u32, num_outputs: usize) {
        assert!(self.ready(), "multicast bus is not ready for a new flit");
        let targets = Self::targets_for_mask(coremask, num_outputs);
        assert!(!targets.is_empty(), "coremask selects no outputs");
        let acked = vec![false; targets.len()];
        self.in_flight = Some(InFlight {
            flit,
            targets,
            acked,
        });
    }

    /// Outputs that still need to be written this cycle, each paired with
    /// the flit to deliver.
    #[must_use]
    pub fn pending_deliveries(&self) -> Vec<(usize, Flit)> {
        match &self.in_flight {
            None => Vec::new(),
            Some(state) => state
                .targets
                .iter()
                .zip(state.acked.iter())
                .filter(|(_, &acked)| !acked)
                .map(|(&output, _)| (output, state.flit))
                .collect(),
        }
    }

    /// Record that `output` consumed the in-flight flit (`dataConsumed`).
    /// Once every target has acked, the bus becomes ready again.
    pub fn ack(&mut self, output: usize) {
        let Some(state) = &mut self.in_flight else {
            panic!("ack on multicast bus with nothing in flight");
        };
        let slot = state
            .targets
            .iter()
            .position(|&t| t == output)
            .expect("ack from an output that was not a target");
        state.acked[slot] = true;
        if state.acked.iter().all(|&a| a) {
            self.in_flight = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flit::MemoryOpcode;
    use crate::ids::{ChannelId, TileId};

    fn flit() -> Flit {
        let dest = ChannelId::multicast(TileId::new(0, 0), 0b1011, 0);
        Flit::new(0xAB, dest, MemoryOpcode::LoadW, true)
    }

    #[test]
    fn delivers_to_every_masked_core_exactly_once() {
        let mut bus = MulticastBus::new();
        assert!(bus.ready());
        bus.inject(flit(), 0b1011, 4);
        assert!(!bus.ready());

        let deliveries = bus.pending_deliveries();
        let mut targets: Vec<_> = deliveries.iter().map(|(o, _)| *o).collect();
        targets.sort_unstable();
        assert_eq!(targets, vec![0, 1, 3]);

        bus.ack(0);
        assert!(!bus.ready());
        bus.ack(1);
        assert!(!bus.ready());
        bus.ack(3);
        assert!(bus.ready());
    }

    #[test]
    #[should_panic]
    fn cannot_inject_while_busy() {
        let mut bus = MulticastBus::new();
        bus.inject(flit(), 0b1, 4);
        bus.inject(flit(), 0b1, 4);
    }
}
