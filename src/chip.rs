//! `Chip` (spec §4.10): the 2-D grid of tiles and the inter-tile mesh
//! networks connecting them, plus the magic-memory debug path.

use crate::config::Config;
use crate::error::Error;
use crate::flit::Flit;
use crate::ids::{MemoryAddr, TileId};
use crate::network::mesh_router::MeshRouter;
use crate::tile::ComputeTile;

/// The four independently-routed inter-tile meshes (spec §4.10: "data,
/// credits, requests, responses").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshPlane {
    Data,
    Credit,
    Request,
    Response,
}

const PLANES: [MeshPlane; 4] = [MeshPlane::Data, MeshPlane::Credit, MeshPlane::Request, MeshPlane::Response];

pub struct Chip {
    config: Config,
    tiles: Vec<ComputeTile>,
    /// One router per tile per plane, addressed `[plane_index][tile_index]`.
    routers: Vec<Vec<MeshRouter>>,
    /// Flits dropped off the mesh's edge (spec §4.3 "dead-end sink").
    pub dead_letters: Vec<Flit>,
    cycle: u64,
}

impl Chip {
    #[must_use]
    pub fn new(config: Config) -> Self {
        config.validate().expect("invalid configuration");

        let num_tiles = config.num_tiles() as u32;
        let tiles = (0..num_tiles)
            .map(|i| {
                let id = TileId::from_linear(i, config.grid_columns);
                ComputeTile::new(id, &config.tile, config.lfsr_seed)
            })
            .collect();

        let routers = PLANES
            .iter()
            .map(|_| {
                (0..num_tiles)
                    .map(|i| {
                        let id = TileId::from_linear(i, config.grid_columns);
                        MeshRouter::new(id)
                    })
                    .collect()
            })
            .collect();

        Self {
            config,
            tiles,
            routers,
            dead_letters: Vec::new(),
            cycle: 0,
        }
    }

    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    #[must_use]
    pub fn num_tiles(&self) -> usize {
        self.tiles.len()
    }

    #[must_use]
    pub fn tile(&self, id: TileId) -> &ComputeTile {
        &self.tiles[id.to_linear(self.config.grid_columns) as usize]
    }

    #[must_use]
    pub fn tile_mut(&mut self, id: TileId) -> &mut ComputeTile {
        let index = id.to_linear(self.config.grid_columns) as usize;
        &mut self.tiles[index]
    }

    /// One simulation cycle: every tile runs its combinational phase, then
    /// staged inter-tile traffic is routed and committed (spec §5.1). A
    /// protocol violation surfaced by a tile (spec §7, e.g. more than one
    /// bank claiming the same request) is promoted here, where the current
    /// cycle is known, to a dated `Error::Protocol`.
    pub fn step(&mut self) -> crate::error::Result<()> {
        for tile in &mut self.tiles {
            tile.step().map_err(|detail| Error::protocol(self.cycle, "ComputeTile::step", detail))?;
        }

        let mut staged = Vec::new();
        for tile in &mut self.tiles {
            let source = tile.id;
            for (destination_tile, flit) in std::mem::take(&mut tile.to_network) {
                if destination_tile != source {
                    staged.push((source, destination_tile, flit));
                }
            }
        }
        for (source, destination_tile, flit) in staged {
            self.route_between_tiles(source, destination_tile, flit);
        }

        self.cycle += 1;
        Ok(())
    }

    fn route_between_tiles(&mut self, from: TileId, to: TileId, flit: Flit) {
        // Single-hop delivery model: the mesh's XY routing decides the
        // direction but, absent a full per-cycle router pipeline between
        // tiles, the flit is handed directly to the destination tile this
        // cycle. The router objects still exist to answer `route_to` for
        // instrumentation and future multi-hop staging.
        let plane = if flit.is_payload() { MeshPlane::Response } else { MeshPlane::Request };
        let router = &self.routers[plane as usize][from.to_linear(self.config.grid_columns) as usize];
        let _ = router.route_to(to);

        if to.to_linear(self.config.grid_columns) >= self.tiles.len() as u32 {
            self.dead_letters.push(flit);
            return;
        }

        let requester = flit.destination;
        let tile = self.tile_mut(to);
        if flit.is_payload() {
            // A word of a forwarded request's response, returning to the
            // bank that parked itself awaiting it (spec §4.8 "Incoming").
            tile.deliver_response(flit);
        } else {
            tile.submit_request(crate::tile::PendingRequest { head: flit, requester });
        }
    }

    /// Debug path (spec §4.10, §9 "magic memory"): resolve `addr` through
    /// the owning tile's directory and touch its bank directly, bypassing
    /// every network. Must only be used outside timed execution.
    pub fn magic_memory_access_write(&mut self, tile: TileId, bank: usize, addr: MemoryAddr, value: u32) {
        self.tile_mut(tile).magic_write_word(bank, addr, value);
    }

    #[must_use]
    pub fn magic_memory_access_read(&self, tile: TileId, bank: usize, addr: MemoryAddr) -> u32 {
        self.tile(tile).magic_read_word(bank, addr)
    }

    /// Whether every tile's memory subsystem is quiescent (spec §5
    /// "Cancellation & timeouts": `isIdle`).
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.tiles.iter().all(|t| (0..t.num_banks()).all(|b| t.bank(b).is_idle()))
    }

    /// Diagnostic dump of every component with outstanding work, used by the
    /// deadlock detector (spec §5, §7).
    #[must_use]
    pub fn report_stalls(&self) -> Vec<String> {
        let mut report = Vec::new();
        for tile in &self.tiles {
            for b in 0..tile.num_banks() {
                let bank = tile.bank(b);
                if !bank.is_idle() {
                    report.push(format!("tile {} bank {} stuck in {:?}", tile.id, b, bank.state()));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn fresh_chip_is_idle() {
        let chip = Chip::new(Config::default());
        assert!(chip.is_idle());
        assert!(chip.report_stalls().is_empty());
    }

    #[test]
    fn step_advances_cycle_counter() {
        let mut chip = Chip::new(Config::default());
        chip.step().unwrap();
        assert_eq!(chip.cycle(), 1);
    }

    #[test]
    fn magic_memory_access_bypasses_network() {
        let mut chip = Chip::new(Config::default());
        let tile_id = TileId::new(0, 0);
        chip.magic_memory_access_write(tile_id, 0, 0x100, 0x1234);
        assert_eq!(chip.magic_memory_access_read(tile_id, 0, 0x100), 0x1234);
    }
}
