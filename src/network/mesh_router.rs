//! The per-tile mesh router: five ports (four compass directions plus the
//! local tile), XY deterministic routing, one round-robin arbitration per
//! output with wraparound starting just past the last accepted input (spec
//! §4.3, grounded in the original router's `routeTo` and `routeData`).

use crate::flit::Flit;
use crate::ids::TileId;

/// A router port. `Local` connects to the tile's own intra-tile network;
/// the compass directions connect to neighbouring routers (or a dead end at
/// the mesh's edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    East,
    South,
    West,
    Local,
}

impl Direction {
    const ALL: [Direction; 5] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::Local,
    ];

    fn index(self) -> usize {
        match self {
            Direction::North => 0,
            Direction::East => 1,
            Direction::South => 2,
            Direction::West => 3,
            Direction::Local => 4,
        }
    }
}

/// A single router sitting at `(x, y)` in the tile mesh. `TileId` carries its
/// own coordinates, so XY routing needs nothing about the mesh's overall
/// shape beyond `position`.
#[derive(Debug)]
pub struct MeshRouter {
    position: TileId,
    /// Wraparound round-robin pointer per output port (`lastAccepted`).
    last_accepted: [usize; 5],
}

impl MeshRouter {
    #[must_use]
    pub fn new(position: TileId) -> Self {
        Self {
            position,
            last_accepted: [usize::MAX; 5],
        }
    }

    /// XY deterministic routing: resolve x first, then y, then local.
    #[must_use]
    pub fn route_to(&self, destination: TileId) -> Direction {
        if destination.x > self.position.x {
            Direction::East
        } else if destination.x < self.position.x {
            Direction::West
        } else if destination.y > self.position.y {
            Direction::South
        } else if destination.y < self.position.y {
            Direction::North
        } else {
            Direction::Local
        }
    }

    /// One arbitration round across all five outputs. `inputs[d]` is the
    /// flit waiting at input port `d` (if any); `output_ready[d]` is whether
    /// output `d`'s destination has buffer space. Returns, per output, the
    /// input direction that won and whose flit should move.
    ///
    /// Matches the original's behaviour: each output searches its five
    /// inputs starting just past `last_accepted`, wrapping around, and
    /// grants the first one that both has data and routes to this output.
    pub fn step(
        &mut self,
        inputs: &[Option<(Flit, TileId)>; 5],
        output_ready: &[bool; 5],
    ) -> [Option<Direction>; 5] {
        let mut grants = [None; 5];

        for output in Direction::ALL {
            let out_idx = output.index();
            if !output_ready[out_idx] {
                continue;
            }
            for i in 0..5 {
                let input_idx = (self.last_accepted[out_idx].wrapping_add(1).wrapping_add(i)) % 5;
                let Some((_, destination)) = &inputs[input_idx] else {
                    continue;
                };
                if self.route_to(*destination) == output {
                    grants[out_idx] = Some(Direction::ALL[input_idx]);
                    self.last_accepted[out_idx] = input_idx;
                    break;
                }
            }
        }

        grants
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_east_before_changing_row() {
        let router = MeshRouter::new(TileId::new(0, 0));
        assert_eq!(router.route_to(TileId::new(1, 1)), Direction::East);
    }

    #[test]
    fn routes_south_once_column_matches() {
        let router = MeshRouter::new(TileId::new(1, 0));
        assert_eq!(router.route_to(TileId::new(1, 1)), Direction::South);
    }

    #[test]
    fn own_tile_routes_local() {
        let router = MeshRouter::new(TileId::new(1, 1));
        assert_eq!(router.route_to(TileId::new(1, 1)), Direction::Local);
    }

    #[test]
    fn round_robin_wraparound_favours_input_after_last_accepted() {
        let mut router = MeshRouter::new(TileId::new(1, 1));
        let east_dest = TileId::new(0, 1); // routes West from (1,1)
        let flit = |p| Flit::new(p, crate::ids::ChannelId::null(), crate::flit::MemoryOpcode::LoadW, true);

        let none: Option<(Flit, TileId)> = None;
        let ready = [true; 5];

        // Both North and South inputs want West this round; North (index 0)
        // wins first since last_accepted starts at usize::MAX (wraps to 0).
        let inputs = [
            Some((flit(1), east_dest)),
            none,
            Some((flit(2), east_dest)),
            none,
            none,
        ];
        let grants = router.step(&inputs, &ready);
        assert_eq!(grants[Direction::West.index()], Some(Direction::North));

        // Next round, North still wants West, but arbitration should now
        // favour South since North was just accepted.
        let inputs = [
            Some((flit(3), east_dest)),
            none,
            Some((flit(4), east_dest)),
            none,
            none,
        ];
        let grants = router.step(&inputs, &ready);
        assert_eq!(grants[Direction::West.index()], Some(Direction::South));
    }

    #[test]
    fn unready_output_grants_nothing() {
        let mut router = MeshRouter::new(TileId::new(0, 0));
        let flit = Flit::new(0, crate::ids::ChannelId::null(), crate::flit::MemoryOpcode::LoadW, true);
        let inputs = [Some((flit, TileId::new(1, 0))), None, None, None, None];
        let mut ready = [true; 5];
        ready[Direction::East.index()] = false;
        let grants = router.step(&inputs, &ready);
        assert_eq!(grants[Direction::East.index()], None);
    }
}
