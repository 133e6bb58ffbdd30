//! # thermovox
//!
//! A sparse, chunked voxel world where every occupied cell is a ledger of
//! co-existing materials tracked by moles and thermal energy. Each fixed
//! tick runs four passes in order: heat conduction, phase transitions
//! (including combustion), liquid flow, and gas diffusion. Dirty-region and
//! active-chunk tracking keep quiescent regions free.
//!
//! ```
//! use glam::IVec3;
//! use thermovox::{ChunkWorld, MaterialKind, SimConfig};
//!
//! let mut world = ChunkWorld::new(SimConfig::default());
//! world
//!     .add_material_at(IVec3::new(0, 4, 0), MaterialKind::Water, 50.0)
//!     .unwrap();
//! world.step(1.0 / 60.0);
//! let info = world.cell_info(IVec3::new(0, 3, 0));
//! assert!(info.valid);
//! ```

pub mod config;
pub mod simulation;
pub mod world;

pub use config::SimConfig;
pub use simulation::{
    Cell, DiscreteModel, MaterialKind, MaterialProperties, Materials, PhaseModel, Phase,
    RateLimitedModel, Substance, CELL_VOLUME, MOLES_EPSILON,
};
pub use world::{
    chunk_to_world_coords, seed_terrain, world_to_chunk_coords, CellInfo, Chunk, ChunkWorld,
    DirtyBox, HeightMap, NoopStats, SimStats, WorldError, CHUNK_SIZE,
};
