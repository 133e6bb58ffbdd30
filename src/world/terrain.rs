//! Heightmap terrain seeding
//!
//! One-shot surface fill: a dirt layer over rock, deposited at the ambient
//! temperature. Collaborators generate the heights; this only places
//! material.

use glam::IVec3;

use crate::simulation::cell::CELL_VOLUME;
use crate::simulation::materials::MaterialKind;
use crate::world::world::{ChunkWorld, WorldError};

/// Column heights over an `width` x `depth` grid of (x, z) columns starting
/// at world origin. Heights are world-Y cell counts.
pub struct HeightMap {
    width: usize,
    depth: usize,
    heights: Vec<i32>,
    /// Topmost layers of each column seeded as dirt instead of rock.
    pub dirt_depth: i32,
}

impl HeightMap {
    pub fn new(width: usize, depth: usize) -> Self {
        Self {
            width,
            depth,
            heights: vec![0; width * depth],
            dirt_depth: 2,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn height(&self, x: usize, z: usize) -> i32 {
        self.heights[z * self.width + x]
    }

    pub fn set_height(&mut self, x: usize, z: usize, height: i32) {
        self.heights[z * self.width + x] = height.max(0);
    }
}

/// Fill columns from y = 0 up to each column's height: rock below, dirt in
/// the top `dirt_depth` layers, all at ambient temperature. Cells are
/// filled to capacity so the terrain is a solid barrier to flow and
/// diffusion.
pub fn seed_terrain(world: &mut ChunkWorld, map: &HeightMap) -> Result<(), WorldError> {
    let mut cells = 0u64;
    for z in 0..map.depth() {
        for x in 0..map.width() {
            let height = map.height(x, z);
            for y in 0..height {
                let kind = if y >= height - map.dirt_depth {
                    MaterialKind::Dirt
                } else {
                    MaterialKind::Rock
                };
                let vm = world.materials.get(kind).molar_volume_own();
                let moles = CELL_VOLUME / vm;
                world.add_material_at(IVec3::new(x as i32, y, z as i32), kind, moles)?;
                cells += 1;
            }
        }
    }
    log::info!(
        "[terrain] seeded {}x{} heightmap, {cells} cells, {} chunks",
        map.width(),
        map.depth(),
        world.chunk_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    #[test]
    fn test_seed_fills_columns_dirt_over_rock() {
        let mut world = ChunkWorld::new(SimConfig::default());
        let mut map = HeightMap::new(4, 4);
        for z in 0..4 {
            for x in 0..4 {
                map.set_height(x, z, 5);
            }
        }
        seed_terrain(&mut world, &map).unwrap();

        let bottom = world.cell_info(IVec3::new(1, 0, 1));
        assert_eq!(bottom.primary, Some(MaterialKind::Rock));
        let top = world.cell_info(IVec3::new(1, 4, 1));
        assert_eq!(top.primary, Some(MaterialKind::Dirt));
        let air = world.cell_info(IVec3::new(1, 5, 1));
        assert_eq!(air.material_count, 0);
        assert!((bottom.temperature - world.config.ambient_temperature).abs() < 1e-6);
    }

    #[test]
    fn test_zero_height_column_stays_empty() {
        let mut world = ChunkWorld::new(SimConfig::default());
        let map = HeightMap::new(2, 2);
        seed_terrain(&mut world, &map).unwrap();
        assert_eq!(world.chunk_count(), 0);
    }

    #[test]
    fn test_seed_respects_chunk_limit() {
        let mut config = SimConfig::default();
        config.max_chunks = 1;
        let mut world = ChunkWorld::new(config);
        let mut map = HeightMap::new(20, 20);
        for z in 0..20 {
            for x in 0..20 {
                map.set_height(x, z, 3);
            }
        }
        assert!(matches!(
            seed_terrain(&mut world, &map),
            Err(WorldError::ChunkLimit { limit: 1, .. })
        ));
    }
}
