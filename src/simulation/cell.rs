//! Per-voxel material ledger
//!
//! A cell holds up to one entry per material kind: moles plus thermal
//! energy. The presence bitmask is maintained exclusively by
//! `add_material`/`remove_material`, so pass code can trust it.

use std::cell::Cell as LazyCell;

use smallvec::SmallVec;

use crate::simulation::materials::{MaterialKind, Materials, Phase, MATERIAL_COUNT};

/// Entries below this are treated as absent and removed.
pub const MOLES_EPSILON: f64 = 1e-9;

/// Interior volume of one voxel in liters.
pub const CELL_VOLUME: f64 = 1000.0;

/// Quantity and thermal energy of one material kind in one cell.
#[derive(Clone, Debug, Default)]
pub struct MaterialState {
    pub moles: f64,
    /// Sensible thermal energy in joules, phase-local (`E = n·Cp·T`).
    pub energy: f64,
    /// Lazily computed temperature, invalidated on any mutation.
    cached_temp: LazyCell<Option<f64>>,
}

impl MaterialState {
    #[inline]
    fn invalidate(&mut self) {
        self.cached_temp.set(None);
    }

    #[inline]
    fn clear(&mut self) {
        self.moles = 0.0;
        self.energy = 0.0;
        self.cached_temp.set(None);
    }
}

/// One voxel: presence bitmask plus a fixed slot per material kind.
#[derive(Clone, Debug)]
pub struct Cell {
    mask: u16,
    states: [MaterialState; MATERIAL_COUNT],
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            mask: 0,
            states: Default::default(),
        }
    }
}

impl Cell {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    #[inline]
    pub fn has(&self, kind: MaterialKind) -> bool {
        self.mask & kind.bit() != 0
    }

    /// Number of distinct materials present.
    #[inline]
    pub fn material_count(&self) -> u32 {
        self.mask.count_ones()
    }

    /// Kinds currently present, in ordinal order.
    pub fn present_kinds(&self) -> SmallVec<[MaterialKind; 8]> {
        let mut kinds = SmallVec::new();
        let mut bits = self.mask;
        while bits != 0 {
            let i = bits.trailing_zeros() as usize;
            if let Some(kind) = MaterialKind::from_index(i) {
                kinds.push(kind);
            }
            bits &= bits - 1;
        }
        kinds
    }

    #[inline]
    pub fn state(&self, kind: MaterialKind) -> Option<&MaterialState> {
        if self.has(kind) {
            Some(&self.states[kind.index()])
        } else {
            None
        }
    }

    #[inline]
    pub fn moles(&self, kind: MaterialKind) -> f64 {
        if self.has(kind) {
            self.states[kind.index()].moles
        } else {
            0.0
        }
    }

    #[inline]
    pub fn energy(&self, kind: MaterialKind) -> f64 {
        if self.has(kind) {
            self.states[kind.index()].energy
        } else {
            0.0
        }
    }

    /// Add moles carrying energy. Non-finite or sub-epsilon amounts are
    /// ignored.
    pub fn add_material(&mut self, kind: MaterialKind, moles: f64, energy: f64) {
        if !moles.is_finite() || !energy.is_finite() || moles < MOLES_EPSILON {
            return;
        }
        let state = &mut self.states[kind.index()];
        state.moles += moles;
        state.energy += energy;
        state.invalidate();
        self.mask |= kind.bit();
    }

    /// Remove the entire entry for a kind. Returns what was held.
    pub fn remove_material(&mut self, kind: MaterialKind) -> (f64, f64) {
        if !self.has(kind) {
            return (0.0, 0.0);
        }
        let state = &mut self.states[kind.index()];
        let taken = (state.moles, state.energy);
        state.clear();
        self.mask &= !kind.bit();
        taken
    }

    /// Remove up to `moles` of a kind, carrying a proportional energy share.
    /// Returns (moles, energy) actually taken. Drops the entry when the
    /// remainder falls below epsilon.
    pub fn take_moles(&mut self, kind: MaterialKind, moles: f64) -> (f64, f64) {
        if !self.has(kind) || moles < MOLES_EPSILON {
            return (0.0, 0.0);
        }
        let (held_n, held_e) = self.remove_material(kind);
        if moles >= held_n - MOLES_EPSILON {
            return (held_n, held_e);
        }
        let share = moles / held_n;
        let taken_e = held_e * share;
        self.add_material(kind, held_n - moles, held_e - taken_e);
        (moles, taken_e)
    }

    /// Adjust the thermal energy of a present entry, floored at zero.
    pub fn add_energy(&mut self, kind: MaterialKind, joules: f64) {
        if !self.has(kind) || !joules.is_finite() {
            return;
        }
        let state = &mut self.states[kind.index()];
        state.energy = (state.energy + joules).max(0.0);
        state.invalidate();
    }

    /// Temperature of one entry in Kelvin, cached until the entry mutates.
    pub fn temperature_of(&self, kind: MaterialKind, materials: &Materials) -> f64 {
        let Some(state) = self.state(kind) else {
            return 0.0;
        };
        if let Some(t) = state.cached_temp.get() {
            return t;
        }
        let t = materials
            .get(kind)
            .temperature_of(state.moles, state.energy);
        state.cached_temp.set(Some(t));
        t
    }

    /// Heat-capacity-weighted mean temperature of the whole cell.
    /// An empty cell reads 0 K.
    pub fn temperature(&self, materials: &Materials) -> f64 {
        let mut weighted = 0.0;
        let mut total_hc = 0.0;
        for kind in self.present_kinds() {
            let hc = self.heat_capacity_of(kind, materials);
            if hc <= f64::EPSILON {
                continue;
            }
            weighted += self.temperature_of(kind, materials) * hc;
            total_hc += hc;
        }
        if total_hc <= f64::EPSILON {
            0.0
        } else {
            weighted / total_hc
        }
    }

    /// Aggregate heat capacity of one entry in J/K.
    #[inline]
    pub fn heat_capacity_of(&self, kind: MaterialKind, materials: &Materials) -> f64 {
        self.moles(kind) * materials.get(kind).cp_own()
    }

    /// Aggregate heat capacity of the whole cell in J/K.
    pub fn heat_capacity(&self, materials: &Materials) -> f64 {
        self.present_kinds()
            .iter()
            .map(|&k| self.heat_capacity_of(k, materials))
            .sum()
    }

    /// Total thermal energy held in the cell.
    pub fn total_energy(&self) -> f64 {
        self.present_kinds().iter().map(|&k| self.energy(k)).sum()
    }

    /// Occupied volume in liters, recomputed from moles and phase molar
    /// volumes.
    pub fn volume(&self, materials: &Materials) -> f64 {
        self.present_kinds()
            .iter()
            .map(|&k| self.moles(k) * materials.get(k).molar_volume_own())
            .sum()
    }

    /// Mean mass density of the occupied volume, g/L.
    pub fn density(&self, materials: &Materials) -> f64 {
        let vol = self.volume(materials);
        if vol <= f64::EPSILON {
            return 0.0;
        }
        let mass: f64 = self
            .present_kinds()
            .iter()
            .map(|&k| self.moles(k) * materials.get(k).molar_mass)
            .sum();
        mass / vol
    }

    /// True when any present material is in the given phase.
    pub fn has_phase(&self, phase: Phase, materials: &Materials) -> bool {
        self.present_kinds()
            .iter()
            .any(|&k| materials.get(k).phase == phase)
    }

    /// Most abundant material by moles, if any.
    pub fn primary(&self) -> Option<MaterialKind> {
        self.present_kinds()
            .into_iter()
            .max_by(|&a, &b| self.moles(a).total_cmp(&self.moles(b)))
    }

    /// Drop entries whose moles decayed below epsilon.
    pub fn prune(&mut self) {
        for kind in self.present_kinds() {
            if self.states[kind.index()].moles < MOLES_EPSILON {
                self.remove_material(kind);
            }
        }
    }
}
