//! `tile_parameters_t` (spec §6 "Configuration"): every knob is fixed at
//! construction time, there is no dynamic reconfiguration.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterKind {
    RoundRobin,
    Matrix,
    Priority,
}

/// `core.*` fields of `tile_parameters_t`.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub num_input_channels: usize,
    pub ipk_fifo_depth: usize,
    pub cache_entries: usize,
    pub input_fifo_depth: usize,
    pub output_fifo_depth: usize,
    pub scratchpad_words: usize,
    pub register_file_entries: usize,
    pub channel_map_table_entries: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            num_input_channels: 4,
            ipk_fifo_depth: 4,
            cache_entries: 4,
            input_fifo_depth: 4,
            output_fifo_depth: 4,
            scratchpad_words: 1024,
            register_file_entries: 32,
            channel_map_table_entries: 8,
        }
    }
}

/// `memory.*` fields of `tile_parameters_t`.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub cache_line_size: usize,
    pub banks: usize,
    pub lines_per_bank: usize,
    pub buffer_size: usize,
    pub latency_cycles: u64,
    pub hit_under_miss: bool,
    /// Number of directory entries per tile; a small power of two (spec §3).
    pub directory_entries: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            cache_line_size: 32,
            banks: 4,
            lines_per_bank: 64,
            buffer_size: 4,
            latency_cycles: 1,
            hit_under_miss: true,
            directory_entries: 16,
        }
    }
}

/// `network.*` fields of `tile_parameters_t`.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub router_buffer_size: usize,
    pub arbiter_kind: ArbiterKind,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            router_buffer_size: 4,
            arbiter_kind: ArbiterKind::RoundRobin,
        }
    }
}

/// The top-level `tile_parameters_t` struct (spec §6).
#[derive(Debug, Clone)]
pub struct TileParameters {
    pub num_cores: usize,
    pub num_memories: usize,
    pub num_accelerators: usize,
    pub core: CoreConfig,
    pub memory: MemoryConfig,
    pub network: NetworkConfig,
}

impl Default for TileParameters {
    fn default() -> Self {
        Self {
            num_cores: 2,
            num_memories: 4,
            num_accelerators: 0,
            core: CoreConfig::default(),
            memory: MemoryConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

/// Chip-wide configuration: grid dimensions plus the per-tile parameters
/// shared by every tile (the spec does not describe heterogeneous tiles).
#[derive(Debug, Clone)]
pub struct Config {
    pub grid_columns: u32,
    pub grid_rows: u32,
    pub tile: TileParameters,
    /// LFSR seed used to choose a miss's target bank (spec §4.8). Exposed for
    /// deterministic/reproducible test runs; the original uses `0x3F`.
    pub lfsr_seed: u8,
    /// Cycles of no progress with outstanding requests before the deadlock
    /// detector raises `Error::Deadlock` (spec §5 "Cancellation & timeouts").
    pub deadlock_check_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grid_columns: 2,
            grid_rows: 2,
            tile: TileParameters::default(),
            lfsr_seed: 0x3F,
            deadlock_check_interval: 10_000,
        }
    }
}

impl Config {
    /// Validate invariants that would otherwise surface as confusing panics
    /// deep inside the component graph. Fatal at startup (spec §7).
    pub fn validate(&self) -> Result<()> {
        if self.grid_columns == 0 || self.grid_rows == 0 {
            return Err(Error::Config("chip grid must be non-empty".into()));
        }
        if self.tile.memory.banks == 0 || self.tile.memory.banks > 8 {
            // The 3-bit bank field in the SRAM address hash (spec §4.6) bounds
            // banks-per-tile to 8.
            return Err(Error::Config(format!(
                "memory.banks must be in 1..=8, got {}",
                self.tile.memory.banks
            )));
        }
        if !self.tile.memory.banks.is_power_of_two() {
            return Err(Error::Config("memory.banks must be a power of two".into()));
        }
        if !self.tile.memory.lines_per_bank.is_power_of_two() {
            return Err(Error::Config(
                "memory.lines_per_bank must be a power of two".into(),
            ));
        }
        if self.tile.memory.cache_line_size != 32 {
            return Err(Error::Config(
                "memory.cache_line_size is fixed at 32 bytes by the address hash".into(),
            ));
        }
        if self.tile.memory.directory_entries == 0
            || !self.tile.memory.directory_entries.is_power_of_two()
        {
            return Err(Error::Config(
                "memory.directory_entries must be a non-zero power of two".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn num_tiles(&self) -> usize {
        (self.grid_columns * self.grid_rows) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_too_many_banks() {
        let mut cfg = Config::default();
        cfg.tile.memory.banks = 16;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }
}
