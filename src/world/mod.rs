//! Chunked world storage and the simulation driver.

pub mod chunk;
pub mod stats;
pub mod terrain;
pub mod world;

pub use chunk::{Chunk, DirtyBox, CHUNK_SIZE};
pub use stats::{NoopStats, SimStats};
pub use terrain::{seed_terrain, HeightMap};
pub use world::{
    chunk_to_world_coords, world_to_chunk_coords, CellInfo, ChunkWorld, WorldError,
};
