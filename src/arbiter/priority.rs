use super::{Policy, NO_GRANT};

/// Fixed-priority arbiter: input 0 always wins if it requests, otherwise
/// input 1, and so on (spec §4.1 "A matrix variant and a fixed-priority
/// variant are interchangeable through the same interface").
#[derive(Debug)]
pub struct PriorityPolicy {
    num_inputs: usize,
}

impl PriorityPolicy {
    #[must_use]
    pub fn new(num_inputs: usize) -> Self {
        assert!(num_inputs > 0);
        Self { num_inputs }
    }
}

impl Policy for PriorityPolicy {
    fn grant(&mut self, requests: &[bool], _already_granted: &[bool]) -> usize {
        (0..self.num_inputs)
            .find(|&i| requests[i])
            .unwrap_or(NO_GRANT)
    }

    fn accept(&mut self, _index: usize) {
        // Fixed priority never changes based on history.
    }
}
