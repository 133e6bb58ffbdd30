//! Pass statistics seam
//!
//! The driver reports pass events through this trait so a collector can be
//! attached without the simulation depending on one. The default no-op
//! implementation compiles to nothing.

use crate::simulation::materials::MaterialKind;

pub trait SimStats {
    /// Joules moved by conduction between two entries or cells.
    fn record_heat_transfer(&mut self, _joules: f64) {}

    /// Moles converted from one phase identity to another.
    fn record_phase_change(&mut self, _from: MaterialKind, _to: MaterialKind, _moles: f64) {}

    /// Moles of fuel consumed by combustion.
    fn record_combustion(&mut self, _fuel: MaterialKind, _moles: f64) {}

    /// Moles of liquid moved between cells.
    fn record_flow(&mut self, _kind: MaterialKind, _moles: f64) {}

    /// Moles of gas moved between cells.
    fn record_diffusion(&mut self, _kind: MaterialKind, _moles: f64) {}

    /// A chunk went quiescent this tick.
    fn record_chunk_stabilized(&mut self) {}
}

/// Discards every event.
#[derive(Default)]
pub struct NoopStats;

impl SimStats for NoopStats {}
