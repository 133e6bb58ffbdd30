//! Phase transitions
//!
//! Two strategies behind one trait. Both conserve per-substance moles and
//! change thermal energy only by the latent heat actually paid or released.
//!
//! Energy bookkeeping: an entry's energy is sensible in its own phase
//! (`E = n·Cp·T`). Melting and boiling consume the overshoot past the
//! boundary; freezing and condensing release latent heat into the new solid
//! or liquid entry, which is why a supercooled freeze raises the cell's
//! total energy.

use ahash::AHashMap;
use glam::IVec3;

use crate::config::SimConfig;
use crate::simulation::cell::{Cell, MOLES_EPSILON};
use crate::simulation::combustion;
use crate::simulation::materials::{MaterialKind, MaterialProperties, Materials, Phase};
use crate::world::chunk::DirtyBox;
use crate::world::stats::SimStats;
use crate::world::world::ChunkGrid;

pub trait PhaseModel {
    /// Apply phase transitions to one cell. Returns true when anything
    /// changed.
    fn apply(
        &self,
        cell: &mut Cell,
        materials: &Materials,
        dt: f64,
        stats: &mut dyn SimStats,
    ) -> bool;
}

/// Remove an exact (moles, energy) amount from an entry, keeping the
/// remainder.
fn withdraw(cell: &mut Cell, kind: MaterialKind, moles: f64, energy: f64) {
    let (held_n, held_e) = cell.remove_material(kind);
    let rest_n = held_n - moles;
    if rest_n >= MOLES_EPSILON {
        cell.add_material(kind, rest_n, (held_e - energy).max(0.0));
    }
}

/// Default strategy: converts a bounded number of moles per tick, so large
/// pools cross a boundary over several ticks and hold the plateau
/// temperature while they do.
pub struct RateLimitedModel {
    /// Moles converted per second at a boundary.
    budget: f64,
    /// Overshoot in Kelvin past which the budget doubles.
    strong_overshoot: f64,
    /// Liquid ranges narrower than this skip the liquid phase entirely.
    narrow_liquid_range: f64,
    /// Additive melting-point adjustment per kind (pressure, impurities).
    melt_shifts: AHashMap<MaterialKind, f64>,
}

impl RateLimitedModel {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            budget: config.phase_budget,
            strong_overshoot: config.strong_overshoot,
            narrow_liquid_range: config.narrow_liquid_range,
            melt_shifts: AHashMap::new(),
        }
    }

    /// Shift a material's effective melting point by `delta` Kelvin.
    pub fn set_melting_shift(&mut self, kind: MaterialKind, delta: f64) {
        self.melt_shifts.insert(kind, delta);
    }

    fn melting_point(&self, kind: MaterialKind, props: &MaterialProperties) -> Option<f64> {
        let shift = self.melt_shifts.get(&kind).copied().unwrap_or(0.0);
        props.melting_point.map(|t| t + shift)
    }

    /// Whether this substance transitions solid <-> gas directly.
    fn sublimates(&self, props: &MaterialProperties) -> bool {
        match (self.melting_point_range(props), props.liquid_form) {
            (Some(range), _) if range < self.narrow_liquid_range => true,
            (_, None) => true,
            _ => false,
        }
    }

    fn melting_point_range(&self, props: &MaterialProperties) -> Option<f64> {
        Some(props.boiling_point? - props.melting_point?)
    }

    /// Mole budget for one transfer, doubled when the energy over/undershoot
    /// is strong.
    fn budget_for(&self, dt: f64, overshoot_kelvin: f64) -> f64 {
        if overshoot_kelvin > self.strong_overshoot {
            2.0 * self.budget * dt
        } else {
            self.budget * dt
        }
    }

    /// Endothermic transition (melt, boil, sublime): source energy exceeds
    /// its upper boundary; the overshoot pays the latent cost.
    #[allow(clippy::too_many_arguments)]
    fn transition_up(
        &self,
        cell: &mut Cell,
        from: MaterialKind,
        to: MaterialKind,
        boundary_temp: f64,
        latent: f64,
        materials: &Materials,
        dt: f64,
        stats: &mut dyn SimStats,
    ) -> bool {
        let n = cell.moles(from);
        let e = cell.energy(from);
        let props = materials.get(from);
        let cp_src = props.cp_own();
        let boundary = n * cp_src * boundary_temp;
        let overshoot = e - boundary;
        if overshoot <= 0.0 || latent <= f64::EPSILON {
            return false;
        }
        let overshoot_kelvin = overshoot / (n * cp_src).max(f64::EPSILON);
        let n_t = self
            .budget_for(dt, overshoot_kelvin)
            .min(n)
            .min(overshoot / latent);
        if n_t < MOLES_EPSILON {
            return false;
        }
        // The converted moles leave at the boundary temperature and the
        // latent cost comes out of the remaining overshoot.
        withdraw(cell, from, n_t, n_t * cp_src * boundary_temp + n_t * latent);
        let cp_dst = materials.get(to).cp_own();
        cell.add_material(to, n_t, n_t * cp_dst * boundary_temp);
        stats.record_phase_change(from, to, n_t);
        true
    }

    /// Exothermic transition (freeze, condense, deposit): source energy is
    /// below its lower boundary; the converted moles carry their sensible
    /// energy at the source temperature and release latent heat into the
    /// destination.
    #[allow(clippy::too_many_arguments)]
    fn transition_down(
        &self,
        cell: &mut Cell,
        from: MaterialKind,
        to: MaterialKind,
        boundary_temp: f64,
        latent: f64,
        materials: &Materials,
        dt: f64,
        stats: &mut dyn SimStats,
    ) -> bool {
        let n = cell.moles(from);
        let e = cell.energy(from);
        let props = materials.get(from);
        let cp_src = props.cp_own();
        let boundary = n * cp_src * boundary_temp;
        let undershoot = boundary - e;
        if undershoot <= 0.0 || latent <= f64::EPSILON {
            return false;
        }
        let undershoot_kelvin = undershoot / (n * cp_src).max(f64::EPSILON);
        let n_t = self
            .budget_for(dt, undershoot_kelvin)
            .min(n)
            .min(undershoot / latent);
        if n_t < MOLES_EPSILON {
            return false;
        }
        let t_src = e / (n * cp_src).max(f64::EPSILON);
        let carried = n_t * cp_src * t_src;
        withdraw(cell, from, n_t, carried);
        let cp_dst = materials.get(to).cp_own();
        cell.add_material(to, n_t, n_t * cp_dst * t_src + n_t * latent);
        stats.record_phase_change(from, to, n_t);
        true
    }
}

impl PhaseModel for RateLimitedModel {
    fn apply(
        &self,
        cell: &mut Cell,
        materials: &Materials,
        dt: f64,
        stats: &mut dyn SimStats,
    ) -> bool {
        let mut changed = false;
        for kind in cell.present_kinds() {
            let props = materials.get(kind);
            if props.is_single_phase() {
                continue;
            }
            let Some(tm) = self.melting_point(kind, props) else {
                continue;
            };
            let tb = props.boiling_point.unwrap_or(tm);
            let direct = self.sublimates(props);

            match props.phase {
                Phase::Solid => {
                    if direct {
                        if let Some(gas) = props.gas_form {
                            changed |= self.transition_up(
                                cell,
                                kind,
                                gas,
                                tm,
                                props.enthalpy_fusion + props.enthalpy_vaporization,
                                materials,
                                dt,
                                stats,
                            );
                        }
                    } else if let Some(liquid) = props.liquid_form {
                        changed |= self.transition_up(
                            cell,
                            kind,
                            liquid,
                            tm,
                            props.enthalpy_fusion,
                            materials,
                            dt,
                            stats,
                        );
                    }
                }
                Phase::Liquid => {
                    if let Some(gas) = props.gas_form {
                        changed |= self.transition_up(
                            cell,
                            kind,
                            gas,
                            tb,
                            props.enthalpy_vaporization,
                            materials,
                            dt,
                            stats,
                        );
                    }
                    if let Some(solid) = props.solid_form {
                        changed |= self.transition_down(
                            cell,
                            kind,
                            solid,
                            tm,
                            props.enthalpy_fusion,
                            materials,
                            dt,
                            stats,
                        );
                    }
                }
                Phase::Gas => {
                    if direct {
                        if let Some(solid) = props.solid_form {
                            changed |= self.transition_down(
                                cell,
                                kind,
                                solid,
                                tb,
                                props.enthalpy_fusion + props.enthalpy_vaporization,
                                materials,
                                dt,
                                stats,
                            );
                        }
                    } else if let Some(liquid) = props.liquid_form {
                        changed |= self.transition_down(
                            cell,
                            kind,
                            liquid,
                            tb,
                            props.enthalpy_vaporization,
                            materials,
                            dt,
                            stats,
                        );
                    }
                }
            }
        }
        changed
    }
}

/// Coarse strategy: flips an entry's full quantity once the boundary is
/// crossed. Endothermic flips wait until the overshoot covers the whole
/// latent cost; exothermic flips always have latent to release.
pub struct DiscreteModel;

impl DiscreteModel {
    fn flip_up(
        cell: &mut Cell,
        from: MaterialKind,
        to: MaterialKind,
        boundary_temp: f64,
        latent: f64,
        materials: &Materials,
        stats: &mut dyn SimStats,
    ) -> bool {
        let n = cell.moles(from);
        let e = cell.energy(from);
        let cp_src = materials.get(from).cp_own();
        let overshoot = e - n * cp_src * boundary_temp;
        if overshoot < n * latent {
            return false;
        }
        cell.remove_material(from);
        let cp_dst = materials.get(to).cp_own();
        cell.add_material(to, n, n * cp_dst * boundary_temp + (overshoot - n * latent));
        stats.record_phase_change(from, to, n);
        true
    }

    fn flip_down(
        cell: &mut Cell,
        from: MaterialKind,
        to: MaterialKind,
        boundary_temp: f64,
        latent: f64,
        materials: &Materials,
        stats: &mut dyn SimStats,
    ) -> bool {
        let n = cell.moles(from);
        let e = cell.energy(from);
        let cp_src = materials.get(from).cp_own();
        if e >= n * cp_src * boundary_temp {
            return false;
        }
        let t_src = e / (n * cp_src).max(f64::EPSILON);
        cell.remove_material(from);
        let cp_dst = materials.get(to).cp_own();
        cell.add_material(to, n, n * cp_dst * t_src + n * latent);
        stats.record_phase_change(from, to, n);
        true
    }
}

impl PhaseModel for DiscreteModel {
    fn apply(
        &self,
        cell: &mut Cell,
        materials: &Materials,
        _dt: f64,
        stats: &mut dyn SimStats,
    ) -> bool {
        let mut changed = false;
        for kind in cell.present_kinds() {
            let props = materials.get(kind);
            if props.is_single_phase() {
                continue;
            }
            let Some(tm) = props.melting_point else {
                continue;
            };
            let tb = props.boiling_point.unwrap_or(tm);

            match props.phase {
                Phase::Solid => {
                    // Prefer melting; fall back to sublimation when no
                    // liquid sibling exists.
                    if let Some(liquid) = props.liquid_form {
                        changed |= Self::flip_up(
                            cell,
                            kind,
                            liquid,
                            tm,
                            props.enthalpy_fusion,
                            materials,
                            stats,
                        );
                    } else if let Some(gas) = props.gas_form {
                        changed |= Self::flip_up(
                            cell,
                            kind,
                            gas,
                            tm,
                            props.enthalpy_fusion + props.enthalpy_vaporization,
                            materials,
                            stats,
                        );
                    }
                }
                Phase::Liquid => {
                    if let Some(gas) = props.gas_form {
                        changed |= Self::flip_up(
                            cell,
                            kind,
                            gas,
                            tb,
                            props.enthalpy_vaporization,
                            materials,
                            stats,
                        );
                    }
                    if cell.has(kind) {
                        if let Some(solid) = props.solid_form {
                            changed |= Self::flip_down(
                                cell,
                                kind,
                                solid,
                                tm,
                                props.enthalpy_fusion,
                                materials,
                                stats,
                            );
                        }
                    }
                }
                Phase::Gas => {
                    if let Some(liquid) = props.liquid_form {
                        changed |= Self::flip_down(
                            cell,
                            kind,
                            liquid,
                            tb,
                            props.enthalpy_vaporization,
                            materials,
                            stats,
                        );
                    } else if let Some(solid) = props.solid_form {
                        changed |= Self::flip_down(
                            cell,
                            kind,
                            solid,
                            tb,
                            props.enthalpy_fusion + props.enthalpy_vaporization,
                            materials,
                            stats,
                        );
                    }
                }
            }
        }
        changed
    }
}

/// Pass wrapper: runs the phase model and combustion over a dirty region.
pub struct PhasePass;

impl PhasePass {
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        grid: &mut ChunkGrid,
        materials: &Materials,
        config: &SimConfig,
        model: &dyn PhaseModel,
        slot: u32,
        bounds: DirtyBox,
        dt: f64,
        stats: &mut dyn SimStats,
    ) {
        if bounds.is_empty() {
            return;
        }
        for y in bounds.min.y..=bounds.max.y {
            for z in bounds.min.z..=bounds.max.z {
                for x in bounds.min.x..=bounds.max.x {
                    let Some((cslot, clocal)) = grid.resolve(slot, IVec3::new(x, y, z)) else {
                        continue;
                    };
                    let Some(cell) = grid.cell_mut(cslot, clocal) else {
                        continue;
                    };
                    if cell.is_empty() {
                        continue;
                    }
                    let mut changed = model.apply(cell, materials, dt, stats);
                    changed |= combustion::burn(cell, materials, config, dt, stats);
                    if changed {
                        grid.touch(cslot, clocal);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::stats::NoopStats;

    fn setup() -> (Materials, RateLimitedModel, NoopStats) {
        let config = SimConfig::default();
        (Materials::new(), RateLimitedModel::new(&config), NoopStats)
    }

    #[test]
    fn test_overshooting_ice_melts_rate_limited() {
        let (materials, model, mut stats) = setup();
        let ice = materials.get(MaterialKind::Ice);
        let tm = ice.melting_point.unwrap();

        let mut cell = Cell::new();
        // Far past the boundary: 100 mol of ice carrying a large overshoot.
        let e = ice.energy_at(100.0, tm) + 100.0 * ice.enthalpy_fusion;
        cell.add_material(MaterialKind::Ice, 100.0, e);

        let before = cell.moles(MaterialKind::Ice);
        assert!(model.apply(&mut cell, &materials, 1.0 / 60.0, &mut stats));
        let melted = cell.moles(MaterialKind::Water);
        assert!(melted > 0.0);
        // Rate limit: far less than the whole pool in one tick.
        assert!(melted < before / 2.0);
        assert!(
            (cell.moles(MaterialKind::Ice) + melted - before).abs() < 1e-9,
            "moles conserved"
        );
    }

    #[test]
    fn test_melting_never_pulls_source_below_boundary() {
        let (materials, model, mut stats) = setup();
        let ice = materials.get(MaterialKind::Ice);
        let tm = ice.melting_point.unwrap();

        let mut cell = Cell::new();
        // Tiny overshoot, much smaller than one tick of budget times latent.
        let e = ice.energy_at(1.0, tm) + 0.001 * ice.enthalpy_fusion;
        cell.add_material(MaterialKind::Ice, 1.0, e);

        model.apply(&mut cell, &materials, 1.0 / 60.0, &mut stats);
        let n = cell.moles(MaterialKind::Ice);
        if n >= MOLES_EPSILON {
            let remaining_overshoot = cell.energy(MaterialKind::Ice) - ice.energy_at(n, tm);
            assert!(remaining_overshoot >= -1e-9);
        }
    }

    #[test]
    fn test_supercooled_water_freezes_and_gains_energy() {
        let (materials, model, mut stats) = setup();
        let water = materials.get(MaterialKind::Water);

        let mut cell = Cell::new();
        cell.add_material(MaterialKind::Water, 1.0, water.energy_at(1.0, 250.0));
        let moles_before = cell.moles(MaterialKind::Water);
        let energy_before = cell.total_energy();

        assert!(model.apply(&mut cell, &materials, 1.0 / 60.0, &mut stats));
        let frozen = cell.moles(MaterialKind::Ice);
        assert!(frozen > 0.0);
        assert!(
            (cell.moles(MaterialKind::Water) + frozen - moles_before).abs() < 1e-9,
            "moles conserved"
        );
        // Latent heat of fusion released into the ice.
        assert!(cell.total_energy() > energy_before);
    }

    #[test]
    fn test_superheated_steam_stays_steam() {
        let (materials, model, mut stats) = setup();
        let steam = materials.get(MaterialKind::Steam);

        let mut cell = Cell::new();
        cell.add_material(MaterialKind::Steam, 1.0, steam.energy_at(1.0, 500.0));
        assert!(!model.apply(&mut cell, &materials, 1.0 / 60.0, &mut stats));
        assert!((cell.moles(MaterialKind::Steam) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_dry_ice_sublimates_directly_to_gas() {
        let (materials, model, mut stats) = setup();
        let dry_ice = materials.get(MaterialKind::DryIce);
        let tm = dry_ice.melting_point.unwrap();

        let mut cell = Cell::new();
        let latent = dry_ice.enthalpy_fusion + dry_ice.enthalpy_vaporization;
        let e = dry_ice.energy_at(1.0, tm) + latent;
        cell.add_material(MaterialKind::DryIce, 1.0, e);

        assert!(model.apply(&mut cell, &materials, 1.0 / 60.0, &mut stats));
        assert!(cell.moles(MaterialKind::CarbonDioxide) > 0.0);
        // No liquid CO2 kind exists to appear.
        assert_eq!(cell.material_count(), 2);
    }

    #[test]
    fn test_melting_shift_moves_boundary() {
        let (materials, mut model, mut stats) = setup();
        let ice = materials.get(MaterialKind::Ice);

        // Ice at 270 K does not melt normally.
        let mut cell = Cell::new();
        cell.add_material(MaterialKind::Ice, 1.0, ice.energy_at(1.0, 270.0));
        assert!(!model.apply(&mut cell, &materials, 1.0 / 60.0, &mut stats));

        // Lower the melting point 10 K and the same energy overshoots.
        model.set_melting_shift(MaterialKind::Ice, -10.0);
        assert!(model.apply(&mut cell, &materials, 1.0 / 60.0, &mut stats));
        assert!(cell.moles(MaterialKind::Water) > 0.0);
    }

    #[test]
    fn test_discrete_model_flips_full_quantity() {
        let materials = Materials::new();
        let model = DiscreteModel;
        let mut stats = NoopStats;
        let ice = materials.get(MaterialKind::Ice);
        let tm = ice.melting_point.unwrap();

        let mut cell = Cell::new();
        let e = ice.energy_at(2.0, tm) + 2.0 * ice.enthalpy_fusion + 100.0;
        cell.add_material(MaterialKind::Ice, 2.0, e);

        assert!(model.apply(&mut cell, &materials, 1.0 / 60.0, &mut stats));
        assert!(!cell.has(MaterialKind::Ice));
        assert!((cell.moles(MaterialKind::Water) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_discrete_model_waits_for_full_latent() {
        let materials = Materials::new();
        let model = DiscreteModel;
        let mut stats = NoopStats;
        let ice = materials.get(MaterialKind::Ice);
        let tm = ice.melting_point.unwrap();

        let mut cell = Cell::new();
        let e = ice.energy_at(2.0, tm) + 0.5 * ice.enthalpy_fusion;
        cell.add_material(MaterialKind::Ice, 2.0, e);
        assert!(!model.apply(&mut cell, &materials, 1.0 / 60.0, &mut stats));
        assert!(cell.has(MaterialKind::Ice));
    }
}
