//! Identifiers used throughout the memory subsystem and network fabric
//! (spec §3 "Identifiers").

/// A byte address in the tile's local address space. 32 bits, as specified.
pub type MemoryAddr = u32;

/// Physical offset of a word within a bank's SRAM array.
pub type SramAddress = u32;

/// The upper, tag-carrying portion of a [`MemoryAddr`].
pub type MemoryTag = u32;

/// Coordinate of a tile on the 2-D chip grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub x: u32,
    pub y: u32,
}

impl TileId {
    #[must_use]
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Flatten to a linear index given the grid's column count, matching the
    /// `tile % columns`/`tile / columns` split used for XY routing.
    #[must_use]
    pub fn to_linear(self, num_columns: u32) -> u32 {
        self.y * num_columns + self.x
    }

    #[must_use]
    pub fn from_linear(index: u32, num_columns: u32) -> Self {
        Self {
            x: index % num_columns,
            y: index / num_columns,
        }
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The kind of thing occupying a position within a tile, in assignment order
/// (cores, then memories, then accelerator DMAs) per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Core,
    Memory,
    AcceleratorDma,
}

/// `(TileID, position)` — identifies one component on one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId {
    pub tile: TileId,
    pub position: u32,
}

impl ComponentId {
    #[must_use]
    pub fn new(tile: TileId, position: u32) -> Self {
        Self { tile, position }
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.tile, self.position)
    }
}

/// `(ComponentID, channel)`, or, when `multicast` is set, `(TileID, coremask,
/// channel)` where bit *i* of `coremask` selects the *i*-th core on the tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId {
    pub tile: TileId,
    /// Either a single component position, or (if `multicast`) a core bitmask.
    pub position_or_mask: u32,
    pub channel: u32,
    pub multicast: bool,
}

impl ChannelId {
    #[must_use]
    pub fn unicast(component: ComponentId, channel: u32) -> Self {
        Self {
            tile: component.tile,
            position_or_mask: component.position,
            channel,
            multicast: false,
        }
    }

    #[must_use]
    pub fn multicast(tile: TileId, coremask: u32, channel: u32) -> Self {
        Self {
            tile,
            position_or_mask: coremask,
            channel,
            multicast: true,
        }
    }

    /// A channel ID with no real destination, used as a sentinel for "no
    /// connection" (mirrors `ChannelID::isNullMapping()` in the original).
    #[must_use]
    pub fn null() -> Self {
        Self {
            tile: TileId::new(0, 0),
            position_or_mask: 0,
            channel: 0,
            multicast: false,
        }
    }

    #[must_use]
    pub fn is_null(self) -> bool {
        self == Self::null()
    }

    #[must_use]
    pub fn component(self) -> ComponentId {
        debug_assert!(!self.multicast);
        ComponentId::new(self.tile, self.position_or_mask)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.multicast {
            write!(
                f,
                "{}:mc{:#x}.{}",
                self.tile, self.position_or_mask, self.channel
            )
        } else {
            write!(f, "{}.{}.{}", self.tile, self.position_or_mask, self.channel)
        }
    }
}
