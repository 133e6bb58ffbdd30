//! Simulation passes and the material model.

pub mod cell;
pub mod combustion;
pub mod diffusion;
pub mod flow;
pub mod heat;
pub mod materials;
pub mod phase;

pub use cell::{Cell, MaterialState, CELL_VOLUME, MOLES_EPSILON};
pub use materials::{MaterialKind, MaterialProperties, Materials, Phase, Substance};
pub use phase::{DiscreteModel, PhaseModel, RateLimitedModel};
