//! Crossbar: N inputs, M outputs, one arbiter per output (spec §4.3).

use crate::arbiter::{Arbiter, NO_GRANT};
use crate::flit::Flit;

#[derive(Debug)]
pub struct Crossbar {
    num_inputs: usize,
    arbiters: Vec<Arbiter>,
}

impl Crossbar {
    #[must_use]
    pub fn new(num_inputs: usize, num_outputs: usize, wormhole: bool) -> Self {
        let arbiters = (0..num_outputs)
            .map(|_| Arbiter::round_robin(num_inputs, 1, wormhole))
            .collect();
        Self {
            num_inputs,
            arbiters,
        }
    }

    /// One arbitration round. `inputs[i]` is the flit waiting at input `i`
    /// (if any) together with the output it targets. `output_ready[o]` is
    /// whether output `o`'s destination buffer has space this cycle.
    ///
    /// Returns, per output, the input index that won arbitration and whose
    /// flit should be forwarded (the caller is responsible for dequeuing
    /// from that input and writing to the output buffer — the crossbar
    /// itself holds no data).
    pub fn step(
        &mut self,
        inputs: &[Option<(Flit, usize)>],
        output_ready: &[bool],
    ) -> Vec<Option<usize>> {
        assert_eq!(inputs.len(), self.num_inputs);
        let num_outputs = self.arbiters.len();
        assert_eq!(output_ready.len(), num_outputs);

        let mut already_granted = vec![false; self.num_inputs];
        let mut grants = vec![None; num_outputs];

        for output in 0..num_outputs {
            if !output_ready[output] {
                continue;
            }
            let requests: Vec<bool> = inputs
                .iter()
                .map(|slot| matches!(slot, Some((_, target)) if *target == output))
                .collect();
            let eop: Vec<bool> = inputs
                .iter()
                .map(|slot| slot.as_ref().map(|(f, _)| f.metadata.end_of_packet).unwrap_or(true))
                .collect();

            let granted = self.arbiters[output].get_grant(0, &requests, &eop, &mut already_granted);
            if granted != NO_GRANT {
                grants[output] = Some(granted);
            }
        }

        grants
    }
}
