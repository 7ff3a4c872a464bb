//! The simulation driver (spec §5.2): runs [`Chip::step`] in a loop and
//! periodically checks for deadlock, matching `gpucachesim::accelmain`'s role
//! as the top-level cycle-stepping entry point.

use crate::chip::Chip;
use crate::config::Config;
use crate::error::{Error, Result};

pub struct Simulator {
    chip: Chip,
    deadlock_check_interval: u64,
    last_activity_cycle: u64,
}

impl Simulator {
    #[must_use]
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let interval = config.deadlock_check_interval;
        Ok(Self {
            chip: Chip::new(config),
            deadlock_check_interval: interval,
            last_activity_cycle: 0,
        })
    }

    #[must_use]
    pub fn chip(&self) -> &Chip {
        &self.chip
    }

    #[must_use]
    pub fn chip_mut(&mut self) -> &mut Chip {
        &mut self.chip
    }

    /// Advance exactly one cycle, checking for deadlock at the configured
    /// interval (spec §5.2).
    pub fn step(&mut self) -> Result<()> {
        self.chip.step()?;

        if self.chip.is_idle() {
            self.last_activity_cycle = self.chip.cycle();
            return Ok(());
        }

        let stalled_for = self.chip.cycle() - self.last_activity_cycle;
        if stalled_for >= self.deadlock_check_interval {
            return Err(Error::Deadlock {
                cycle: self.chip.cycle(),
                stalled_for,
                report: self.chip.report_stalls(),
            });
        }
        Ok(())
    }

    /// Run until `Chip::is_idle` holds or `max_cycles` elapses, whichever
    /// comes first. Returns the number of cycles actually run.
    pub fn run_until_idle(&mut self, max_cycles: u64) -> Result<u64> {
        let start = self.chip.cycle();
        while !self.chip.is_idle() && self.chip.cycle() - start < max_cycles {
            self.step()?;
        }
        Ok(self.chip.cycle() - start)
    }

    /// Run exactly `cycles` steps, propagating the first deadlock error
    /// encountered.
    pub fn run_for(&mut self, cycles: u64) -> Result<()> {
        for _ in 0..cycles {
            self.step()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_chip_never_deadlocks() {
        let mut sim = Simulator::new(Config::default()).unwrap();
        sim.run_for(100).unwrap();
    }

    #[test]
    fn run_until_idle_stops_immediately_on_a_fresh_chip() {
        let mut sim = Simulator::new(Config::default()).unwrap();
        let ran = sim.run_until_idle(1_000).unwrap();
        assert_eq!(ran, 0);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut cfg = Config::default();
        cfg.grid_columns = 0;
        assert!(Simulator::new(cfg).is_err());
    }
}
