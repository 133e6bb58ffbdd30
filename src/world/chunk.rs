//! Chunks: fixed cubes of cells with dirty-region and activity tracking

use glam::IVec3;

use crate::simulation::cell::Cell;

/// Chunk edge length in cells.
pub const CHUNK_SIZE: i32 = 8;
/// Cells per chunk.
pub const CHUNK_CELLS: usize = (CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE) as usize;

/// The six face directions, in neighbor-array order.
pub const FACE_OFFSETS: [IVec3; 6] = [
    IVec3::new(-1, 0, 0),
    IVec3::new(1, 0, 0),
    IVec3::new(0, -1, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(0, 0, -1),
    IVec3::new(0, 0, 1),
];

/// Neighbor-array index of the face opposite to `face`.
#[inline]
pub fn opposite_face(face: usize) -> usize {
    face ^ 1
}

/// Axis-aligned dirty region in chunk-local cell coordinates.
/// Empty is encoded as min > max.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirtyBox {
    pub min: IVec3,
    pub max: IVec3,
}

impl DirtyBox {
    pub const EMPTY: DirtyBox = DirtyBox {
        min: IVec3::MAX,
        max: IVec3::MIN,
    };

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grow to include a local cell position.
    pub fn grow(&mut self, local: IVec3) {
        self.min = self.min.min(local);
        self.max = self.max.max(local);
    }

    /// Expanded by `n` cells on every side, not clamped to chunk bounds:
    /// out-of-range coordinates spill into neighbor chunks.
    pub fn expanded(&self, n: i32) -> DirtyBox {
        if self.is_empty() {
            return *self;
        }
        DirtyBox {
            min: self.min - IVec3::splat(n),
            max: self.max + IVec3::splat(n),
        }
    }
}

impl Default for DirtyBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// A `CHUNK_SIZE`³ block of cells plus simulation bookkeeping.
pub struct Chunk {
    /// Chunk coordinates (world cell coords divided by `CHUNK_SIZE`).
    pub pos: IVec3,
    cells: Vec<Cell>,
    pub dirty: DirtyBox,
    /// Something changed in this chunk during the current tick.
    pub is_active: bool,
    /// Quiescent; skipped entirely until an edit wakes it.
    pub is_stable: bool,
    /// Consecutive ticks without activity.
    pub idle_ticks: u32,
    /// Arena slots of the six face neighbors. `None` is a hard boundary.
    pub neighbors: [Option<u32>; 6],
    /// Position in the live worklist, `None` when not enqueued.
    pub worklist_slot: Option<u32>,
}

impl Chunk {
    pub fn new(pos: IVec3) -> Self {
        Self {
            pos,
            cells: vec![Cell::new(); CHUNK_CELLS],
            dirty: DirtyBox::EMPTY,
            is_active: false,
            is_stable: false,
            idle_ticks: 0,
            neighbors: [None; 6],
            worklist_slot: None,
        }
    }

    /// Flat index of a local cell position. Y-major so vertical columns of
    /// one layer stay contiguous per (y, z) row.
    #[inline]
    pub fn cell_index(local: IVec3) -> usize {
        debug_assert!(Self::in_bounds(local));
        ((local.y * CHUNK_SIZE + local.z) * CHUNK_SIZE + local.x) as usize
    }

    #[inline]
    pub fn in_bounds(local: IVec3) -> bool {
        local.x >= 0
            && local.x < CHUNK_SIZE
            && local.y >= 0
            && local.y < CHUNK_SIZE
            && local.z >= 0
            && local.z < CHUNK_SIZE
    }

    #[inline]
    pub fn cell(&self, local: IVec3) -> &Cell {
        &self.cells[Self::cell_index(local)]
    }

    #[inline]
    pub fn cell_mut(&mut self, local: IVec3) -> &mut Cell {
        &mut self.cells[Self::cell_index(local)]
    }

    /// Record a change at a local position: grows the dirty box, wakes the
    /// chunk, and resets the idle counter.
    pub fn mark_dirty(&mut self, local: IVec3) {
        self.dirty.grow(local);
        self.is_active = true;
        self.is_stable = false;
        self.idle_ticks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_dirty_box() {
        let b = DirtyBox::EMPTY;
        assert!(b.is_empty());
        assert!(b.expanded(1).is_empty());
    }

    #[test]
    fn test_dirty_box_grow_and_expand() {
        let mut b = DirtyBox::EMPTY;
        b.grow(IVec3::new(2, 3, 4));
        assert_eq!(b.min, IVec3::new(2, 3, 4));
        assert_eq!(b.max, IVec3::new(2, 3, 4));

        b.grow(IVec3::new(5, 1, 4));
        assert_eq!(b.min, IVec3::new(2, 1, 4));
        assert_eq!(b.max, IVec3::new(5, 3, 4));

        let e = b.expanded(1);
        assert_eq!(e.min, IVec3::new(1, 0, 3));
        assert_eq!(e.max, IVec3::new(6, 4, 5));
    }

    #[test]
    fn test_expand_spills_past_chunk_bounds() {
        let mut b = DirtyBox::EMPTY;
        b.grow(IVec3::ZERO);
        let e = b.expanded(1);
        assert_eq!(e.min, IVec3::splat(-1));
    }

    #[test]
    fn test_cell_index_is_bijective() {
        let mut seen = vec![false; CHUNK_CELLS];
        for y in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    let i = Chunk::cell_index(IVec3::new(x, y, z));
                    assert!(!seen[i]);
                    seen[i] = true;
                }
            }
        }
    }

    #[test]
    fn test_mark_dirty_wakes_chunk() {
        let mut chunk = Chunk::new(IVec3::ZERO);
        chunk.is_stable = true;
        chunk.idle_ticks = 12;

        chunk.mark_dirty(IVec3::new(1, 2, 3));
        assert!(chunk.is_active);
        assert!(!chunk.is_stable);
        assert_eq!(chunk.idle_ticks, 0);
        assert!(!chunk.dirty.is_empty());
    }

    #[test]
    fn test_opposite_face() {
        for face in 0..6 {
            assert_eq!(
                FACE_OFFSETS[face] + FACE_OFFSETS[opposite_face(face)],
                IVec3::ZERO
            );
        }
    }
}
