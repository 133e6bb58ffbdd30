//! Sparse chunk store and fixed-timestep simulation driver

use std::mem;

use ahash::AHashMap;
use glam::IVec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SimConfig;
use crate::simulation::cell::Cell;
use crate::simulation::diffusion::DiffusionPass;
use crate::simulation::flow::FlowPass;
use crate::simulation::heat::HeatPass;
use crate::simulation::materials::{MaterialKind, Materials, Substance};
use crate::simulation::phase::{PhaseModel, PhasePass, RateLimitedModel};
use crate::world::chunk::{opposite_face, Chunk, DirtyBox, CHUNK_SIZE, FACE_OFFSETS};
use crate::world::stats::{NoopStats, SimStats};

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("chunk limit reached ({limit}) allocating chunk at {pos}")]
    ChunkLimit { pos: IVec3, limit: usize },
}

/// Worklist entry for a chunk removed mid-queue.
const WORKLIST_TOMBSTONE: u32 = u32::MAX;

#[inline]
fn axis_get(v: IVec3, axis: usize) -> i32 {
    match axis {
        0 => v.x,
        1 => v.y,
        _ => v.z,
    }
}

#[inline]
fn axis_set(v: &mut IVec3, axis: usize, value: i32) {
    match axis {
        0 => v.x = value,
        1 => v.y = value,
        _ => v.z = value,
    }
}

/// World cell coordinates → (chunk coordinates, chunk-local coordinates).
#[inline]
pub fn world_to_chunk_coords(world: IVec3) -> (IVec3, IVec3) {
    let chunk = IVec3::new(
        world.x.div_euclid(CHUNK_SIZE),
        world.y.div_euclid(CHUNK_SIZE),
        world.z.div_euclid(CHUNK_SIZE),
    );
    let local = IVec3::new(
        world.x.rem_euclid(CHUNK_SIZE),
        world.y.rem_euclid(CHUNK_SIZE),
        world.z.rem_euclid(CHUNK_SIZE),
    );
    (chunk, local)
}

/// (chunk coordinates, chunk-local coordinates) → world cell coordinates.
#[inline]
pub fn chunk_to_world_coords(chunk: IVec3, local: IVec3) -> IVec3 {
    chunk * CHUNK_SIZE + local
}

/// Slot-arena chunk storage. Chunks keep their slot for life, so the cached
/// neighbor links in [`Chunk::neighbors`] stay valid across insertions; cell
/// lookups through [`ChunkGrid::resolve`] never rehash coordinates.
pub struct ChunkGrid {
    chunks: Vec<Option<Chunk>>,
    free_slots: Vec<u32>,
    index: AHashMap<IVec3, u32>,
    worklist: Vec<u32>,
}

impl ChunkGrid {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            free_slots: Vec::new(),
            index: AHashMap::new(),
            worklist: Vec::new(),
        }
    }

    #[inline]
    pub fn chunk(&self, slot: u32) -> Option<&Chunk> {
        self.chunks.get(slot as usize)?.as_ref()
    }

    #[inline]
    pub fn chunk_mut(&mut self, slot: u32) -> Option<&mut Chunk> {
        self.chunks.get_mut(slot as usize)?.as_mut()
    }

    #[inline]
    pub fn slot_of(&self, pos: IVec3) -> Option<u32> {
        self.index.get(&pos).copied()
    }

    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }

    pub fn iter_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().filter_map(|c| c.as_ref())
    }

    /// Get or allocate the chunk at `pos`, wiring face links both ways.
    pub fn create(&mut self, pos: IVec3, max_chunks: usize) -> Result<u32, WorldError> {
        if let Some(&slot) = self.index.get(&pos) {
            return Ok(slot);
        }
        if self.index.len() >= max_chunks {
            return Err(WorldError::ChunkLimit {
                pos,
                limit: max_chunks,
            });
        }

        let mut links = [None; 6];
        for (face, link) in links.iter_mut().enumerate() {
            *link = self.index.get(&(pos + FACE_OFFSETS[face])).copied();
        }

        let mut chunk = Chunk::new(pos);
        chunk.neighbors = links;
        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.chunks[slot as usize] = Some(chunk);
                slot
            }
            None => {
                self.chunks.push(Some(chunk));
                (self.chunks.len() - 1) as u32
            }
        };
        for (face, link) in links.iter().enumerate() {
            if let Some(n) = *link {
                if let Some(neighbor) = self.chunk_mut(n) {
                    neighbor.neighbors[opposite_face(face)] = Some(slot);
                }
            }
        }
        self.index.insert(pos, slot);
        log::debug!("[world] created chunk {pos} in slot {slot}");
        Ok(slot)
    }

    /// Remove the chunk at `pos`, unwiring neighbor links. Returns false when
    /// no chunk exists there.
    pub fn remove(&mut self, pos: IVec3) -> bool {
        let Some(slot) = self.index.remove(&pos) else {
            return false;
        };
        let Some(chunk) = self.chunks[slot as usize].take() else {
            return false;
        };
        for (face, link) in chunk.neighbors.iter().enumerate() {
            if let Some(n) = *link {
                if let Some(neighbor) = self.chunk_mut(n) {
                    neighbor.neighbors[opposite_face(face)] = None;
                }
            }
        }
        if let Some(w) = chunk.worklist_slot {
            if let Some(entry) = self.worklist.get_mut(w as usize) {
                *entry = WORKLIST_TOMBSTONE;
            }
        }
        self.free_slots.push(slot);
        log::debug!("[world] removed chunk {pos} from slot {slot}");
        true
    }

    /// Normalize an out-of-range chunk-local position by walking the cached
    /// face links. `None` when a link is missing (hard world boundary).
    pub fn resolve(&self, mut slot: u32, mut local: IVec3) -> Option<(u32, IVec3)> {
        for axis in 0..3 {
            while axis_get(local, axis) < 0 {
                slot = self.chunk(slot)?.neighbors[axis * 2]?;
                let wrapped = axis_get(local, axis) + CHUNK_SIZE;
                axis_set(&mut local, axis, wrapped);
            }
            while axis_get(local, axis) >= CHUNK_SIZE {
                slot = self.chunk(slot)?.neighbors[axis * 2 + 1]?;
                let wrapped = axis_get(local, axis) - CHUNK_SIZE;
                axis_set(&mut local, axis, wrapped);
            }
        }
        Some((slot, local))
    }

    #[inline]
    pub fn cell(&self, slot: u32, local: IVec3) -> Option<&Cell> {
        Some(self.chunk(slot)?.cell(local))
    }

    #[inline]
    pub fn cell_mut(&mut self, slot: u32, local: IVec3) -> Option<&mut Cell> {
        Some(self.chunk_mut(slot)?.cell_mut(local))
    }

    /// Put a chunk on the live worklist unless it is already queued.
    pub fn enqueue(&mut self, slot: u32) {
        let next = self.worklist.len() as u32;
        let Some(chunk) = self.chunk_mut(slot) else {
            return;
        };
        if chunk.worklist_slot.is_some() {
            return;
        }
        chunk.worklist_slot = Some(next);
        self.worklist.push(slot);
    }

    /// Record a cell mutation: dirty box, wake flags, and worklist.
    pub fn touch(&mut self, slot: u32, local: IVec3) {
        if let Some(chunk) = self.chunk_mut(slot) {
            chunk.mark_dirty(local);
        }
        self.enqueue(slot);
    }
}

impl Default for ChunkGrid {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of one cell for external consumers.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CellInfo {
    pub material_count: u32,
    pub primary: Option<MaterialKind>,
    /// Kelvin. 0.0 for empty or missing cells.
    pub temperature: f64,
    /// False when no chunk exists at the queried position.
    pub valid: bool,
}

/// The simulation world: sparse chunk grid, material table, config, and the
/// fixed-timestep pass driver.
pub struct ChunkWorld {
    grid: ChunkGrid,
    pub materials: Materials,
    pub config: SimConfig,
    phase_model: Box<dyn PhaseModel>,
    tick_count: u64,
    accumulator: f64,
}

impl ChunkWorld {
    pub fn new(config: SimConfig) -> Self {
        let phase_model = Box::new(RateLimitedModel::new(&config));
        Self {
            grid: ChunkGrid::new(),
            materials: Materials::new(),
            config,
            phase_model,
            tick_count: 0,
            accumulator: 0.0,
        }
    }

    /// Swap in a different phase-transition strategy.
    pub fn set_phase_model(&mut self, model: Box<dyn PhaseModel>) {
        self.phase_model = model;
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn chunk_count(&self) -> usize {
        self.grid.chunk_count()
    }

    pub fn grid(&self) -> &ChunkGrid {
        &self.grid
    }

    /// The cell at a world position, if its chunk exists.
    pub fn cell_at(&self, world: IVec3) -> Option<&Cell> {
        let (chunk_pos, local) = world_to_chunk_coords(world);
        let slot = self.grid.slot_of(chunk_pos)?;
        self.grid.cell(slot, local)
    }

    /// Add `moles` of a material at the ambient temperature, creating the
    /// chunk if needed. Non-positive amounts are a silent no-op.
    pub fn add_material_at(
        &mut self,
        world: IVec3,
        kind: MaterialKind,
        moles: f64,
    ) -> Result<(), WorldError> {
        self.deposit_at(world, kind, moles, self.config.ambient_temperature)
    }

    /// Add `moles` of a material at an explicit temperature, creating the
    /// chunk if needed.
    pub fn deposit_at(
        &mut self,
        world: IVec3,
        kind: MaterialKind,
        moles: f64,
        temperature: f64,
    ) -> Result<(), WorldError> {
        if !moles.is_finite() || moles <= 0.0 || !temperature.is_finite() {
            return Ok(());
        }
        let (chunk_pos, local) = world_to_chunk_coords(world);
        let slot = self.grid.create(chunk_pos, self.config.max_chunks)?;
        let energy = self.materials.get(kind).energy_at(moles, temperature);
        if let Some(cell) = self.grid.cell_mut(slot, local) {
            cell.add_material(kind, moles, energy);
        }
        self.grid.touch(slot, local);
        log::trace!(
            "[world] deposit {moles} mol {:?} at {world} ({temperature} K)",
            kind
        );
        Ok(())
    }

    /// Inject thermal energy at a world position, split across the present
    /// materials by heat-capacity share. No-op when the chunk or cell is
    /// missing or empty; never creates chunks.
    pub fn add_heat_at(&mut self, world: IVec3, joules: f64) {
        if !joules.is_finite() || joules == 0.0 {
            return;
        }
        let (chunk_pos, local) = world_to_chunk_coords(world);
        let Some(slot) = self.grid.slot_of(chunk_pos) else {
            return;
        };
        let Some(cell) = self.grid.cell(slot, local) else {
            return;
        };
        let total_hc = cell.heat_capacity(&self.materials);
        if total_hc <= f64::EPSILON {
            return;
        }
        let shares: Vec<(MaterialKind, f64)> = cell
            .present_kinds()
            .iter()
            .map(|&k| (k, cell.heat_capacity_of(k, &self.materials) / total_hc))
            .collect();
        if let Some(cell) = self.grid.cell_mut(slot, local) {
            for (kind, frac) in shares {
                cell.add_energy(kind, joules * frac);
            }
        }
        self.grid.touch(slot, local);
    }

    /// Snapshot one cell for display or scripting.
    pub fn cell_info(&self, world: IVec3) -> CellInfo {
        let Some(cell) = self.cell_at(world) else {
            return CellInfo {
                material_count: 0,
                primary: None,
                temperature: 0.0,
                valid: false,
            };
        };
        CellInfo {
            material_count: cell.material_count(),
            primary: cell.primary(),
            temperature: cell.temperature(&self.materials),
            valid: true,
        }
    }

    /// Total moles of one substance across the world, for conservation
    /// checks.
    pub fn total_substance_moles(&self, substance: Substance) -> f64 {
        let mut total = 0.0;
        for chunk in self.grid.iter_chunks() {
            for y in 0..CHUNK_SIZE {
                for z in 0..CHUNK_SIZE {
                    for x in 0..CHUNK_SIZE {
                        let cell = chunk.cell(IVec3::new(x, y, z));
                        for kind in cell.present_kinds() {
                            if self.materials.get(kind).substance == substance {
                                total += cell.moles(kind);
                            }
                        }
                    }
                }
            }
        }
        total
    }

    /// Total mass in grams across the world.
    pub fn total_mass(&self) -> f64 {
        let mut total = 0.0;
        for chunk in self.grid.iter_chunks() {
            for y in 0..CHUNK_SIZE {
                for z in 0..CHUNK_SIZE {
                    for x in 0..CHUNK_SIZE {
                        let cell = chunk.cell(IVec3::new(x, y, z));
                        for kind in cell.present_kinds() {
                            total += cell.moles(kind) * self.materials.get(kind).molar_mass;
                        }
                    }
                }
            }
        }
        total
    }

    /// Total thermal energy in joules across the world.
    pub fn total_energy(&self) -> f64 {
        self.grid
            .iter_chunks()
            .map(|chunk| {
                let mut e = 0.0;
                for y in 0..CHUNK_SIZE {
                    for z in 0..CHUNK_SIZE {
                        for x in 0..CHUNK_SIZE {
                            e += chunk.cell(IVec3::new(x, y, z)).total_energy();
                        }
                    }
                }
                e
            })
            .sum()
    }

    /// Advance the simulation by wall-clock `dt` seconds: runs whole fixed
    /// ticks from the accumulator, at most `max_ticks_per_step` per call,
    /// discarding the remainder when the cap is hit.
    pub fn step(&mut self, dt: f64) {
        let mut stats = NoopStats;
        self.step_with_stats(dt, &mut stats);
    }

    pub fn step_with_stats(&mut self, dt: f64, stats: &mut dyn SimStats) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        self.accumulator += dt;
        let tick_seconds = self.config.tick_seconds;
        let mut ticks = 0;
        while self.accumulator >= tick_seconds && ticks < self.config.max_ticks_per_step {
            self.run_tick(stats);
            self.accumulator -= tick_seconds;
            ticks += 1;
        }
        if ticks >= self.config.max_ticks_per_step {
            // Falling behind; drop the backlog rather than spiral.
            self.accumulator = 0.0;
        }
    }

    fn run_tick(&mut self, stats: &mut dyn SimStats) {
        self.tick_count += 1;
        let dt = self.config.tick_seconds;

        // Snapshot the worklist; passes enqueue woken chunks onto the fresh
        // live list for next tick.
        let snapshot = mem::take(&mut self.grid.worklist);
        let mut work: Vec<(u32, DirtyBox)> = Vec::with_capacity(snapshot.len());
        for &slot in &snapshot {
            if slot == WORKLIST_TOMBSTONE {
                continue;
            }
            let Some(chunk) = self.grid.chunk_mut(slot) else {
                continue;
            };
            chunk.worklist_slot = None;
            chunk.is_active = false;
            // Expanded by one cell so edits at chunk edges reach across the
            // face into neighbor chunks.
            let bounds = chunk.dirty.expanded(1);
            work.push((slot, bounds));
        }

        for &(slot, bounds) in &work {
            HeatPass::run(
                &mut self.grid,
                &self.materials,
                &self.config,
                slot,
                bounds,
                dt,
                stats,
            );
        }
        for &(slot, bounds) in &work {
            PhasePass::run(
                &mut self.grid,
                &self.materials,
                &self.config,
                self.phase_model.as_ref(),
                slot,
                bounds,
                dt,
                stats,
            );
        }
        for &(slot, bounds) in &work {
            FlowPass::run(
                &mut self.grid,
                &self.materials,
                &self.config,
                slot,
                bounds,
                dt,
                stats,
            );
        }
        for &(slot, bounds) in &work {
            DiffusionPass::run(
                &mut self.grid,
                &self.materials,
                &self.config,
                slot,
                bounds,
                dt,
                stats,
            );
        }

        // Activity bookkeeping for the chunks this tick processed. Chunks
        // woken mid-tick by spills were already enqueued by `touch`.
        let stable_after = self.config.stable_after_ticks;
        for &slot in &snapshot {
            if slot == WORKLIST_TOMBSTONE {
                continue;
            }
            let mut requeue = false;
            let mut stabilized = false;
            if let Some(chunk) = self.grid.chunk_mut(slot) {
                if chunk.is_active {
                    chunk.idle_ticks = 0;
                    requeue = true;
                } else {
                    chunk.idle_ticks += 1;
                    chunk.dirty = DirtyBox::EMPTY;
                    if chunk.idle_ticks >= stable_after {
                        chunk.is_stable = true;
                        stabilized = true;
                        log::trace!("[world] chunk {} stabilized", chunk.pos);
                    } else {
                        requeue = true;
                    }
                }
            }
            if requeue {
                self.grid.enqueue(slot);
            }
            if stabilized {
                stats.record_chunk_stabilized();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_to_chunk_coords_negative() {
        let (chunk, local) = world_to_chunk_coords(IVec3::new(-1, 0, 17));
        assert_eq!(chunk, IVec3::new(-1, 0, 2));
        assert_eq!(local, IVec3::new(7, 0, 1));
        assert_eq!(chunk_to_world_coords(chunk, local), IVec3::new(-1, 0, 17));
    }

    #[test]
    fn test_create_wires_neighbors_both_ways() {
        let mut grid = ChunkGrid::new();
        let a = grid.create(IVec3::ZERO, 16).unwrap();
        let b = grid.create(IVec3::new(1, 0, 0), 16).unwrap();
        assert_eq!(grid.chunk(a).unwrap().neighbors[1], Some(b));
        assert_eq!(grid.chunk(b).unwrap().neighbors[0], Some(a));
    }

    #[test]
    fn test_remove_unwires_neighbors() {
        let mut grid = ChunkGrid::new();
        let a = grid.create(IVec3::ZERO, 16).unwrap();
        grid.create(IVec3::new(1, 0, 0), 16).unwrap();
        assert!(grid.remove(IVec3::new(1, 0, 0)));
        assert_eq!(grid.chunk(a).unwrap().neighbors[1], None);
    }

    #[test]
    fn test_slot_reuse_after_remove() {
        let mut grid = ChunkGrid::new();
        grid.create(IVec3::ZERO, 16).unwrap();
        let b = grid.create(IVec3::new(1, 0, 0), 16).unwrap();
        grid.remove(IVec3::new(1, 0, 0));
        let c = grid.create(IVec3::new(0, 1, 0), 16).unwrap();
        assert_eq!(b, c);
    }

    #[test]
    fn test_chunk_limit() {
        let mut grid = ChunkGrid::new();
        grid.create(IVec3::ZERO, 1).unwrap();
        let err = grid.create(IVec3::new(1, 0, 0), 1).unwrap_err();
        assert!(matches!(err, WorldError::ChunkLimit { limit: 1, .. }));
        // Re-fetching an existing chunk is not an allocation.
        assert!(grid.create(IVec3::ZERO, 1).is_ok());
    }

    #[test]
    fn test_resolve_walks_face_links() {
        let mut grid = ChunkGrid::new();
        let a = grid.create(IVec3::ZERO, 16).unwrap();
        let b = grid.create(IVec3::new(0, -1, 0), 16).unwrap();
        let (slot, local) = grid.resolve(a, IVec3::new(3, -1, 3)).unwrap();
        assert_eq!(slot, b);
        assert_eq!(local, IVec3::new(3, CHUNK_SIZE - 1, 3));
        // No chunk above: hard boundary.
        assert!(grid.resolve(a, IVec3::new(3, CHUNK_SIZE, 3)).is_none());
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let mut grid = ChunkGrid::new();
        let a = grid.create(IVec3::ZERO, 16).unwrap();
        grid.enqueue(a);
        grid.enqueue(a);
        assert_eq!(grid.worklist.len(), 1);
    }

    #[test]
    fn test_deposit_creates_chunk_and_wakes_it() {
        let mut world = ChunkWorld::new(SimConfig::default());
        world
            .add_material_at(IVec3::new(2, 3, 4), MaterialKind::Water, 5.0)
            .unwrap();
        assert_eq!(world.chunk_count(), 1);
        let info = world.cell_info(IVec3::new(2, 3, 4));
        assert!(info.valid);
        assert_eq!(info.primary, Some(MaterialKind::Water));
        assert!((info.temperature - world.config.ambient_temperature).abs() < 1e-6);
    }

    #[test]
    fn test_cell_info_invalid_outside_chunks() {
        let world = ChunkWorld::new(SimConfig::default());
        let info = world.cell_info(IVec3::new(100, 100, 100));
        assert!(!info.valid);
        assert_eq!(info.material_count, 0);
    }

    #[test]
    fn test_add_heat_never_creates_chunks() {
        let mut world = ChunkWorld::new(SimConfig::default());
        world.add_heat_at(IVec3::ZERO, 1000.0);
        assert_eq!(world.chunk_count(), 0);
    }

    #[test]
    fn test_step_consumes_accumulator() {
        let mut world = ChunkWorld::new(SimConfig::default());
        world.step(1.0 / 60.0);
        assert_eq!(world.tick_count(), 1);
        // A huge dt is capped and the backlog discarded.
        world.step(10.0);
        assert_eq!(
            world.tick_count(),
            1 + world.config.max_ticks_per_step as u64
        );
        world.step(1.0 / 120.0);
        assert_eq!(
            world.tick_count(),
            1 + world.config.max_ticks_per_step as u64
        );
    }

    #[test]
    fn test_idle_chunk_stabilizes() {
        let mut world = ChunkWorld::new(SimConfig::default());
        // Uniform ambient rock settles immediately.
        world
            .add_material_at(IVec3::ZERO, MaterialKind::Rock, 10.0)
            .unwrap();
        for _ in 0..(world.config.stable_after_ticks + 4) {
            world.step(world.config.tick_seconds);
        }
        let slot = world.grid.slot_of(IVec3::ZERO).unwrap();
        let chunk = world.grid.chunk(slot).unwrap();
        assert!(chunk.is_stable);
        assert!(chunk.worklist_slot.is_none());
    }
}
