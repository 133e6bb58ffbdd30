//! Combustion
//!
//! A cell holding a fuel and an oxidizer at or above the fuel's ignition
//! temperature burns a rate-limited amount per tick. Stoichiometry is 1:1:1
//! (one mole of fuel plus one mole of oxidizer yields one mole of product),
//! so mass balances exactly when the molar masses do (C + O2 -> CO2,
//! 12.011 + 31.998 = 44.009). The product carries the reactants' sensible
//! energy plus
//! the heat of combustion; there is no upper temperature clamp.

use crate::config::SimConfig;
use crate::simulation::cell::{Cell, MOLES_EPSILON};
use crate::simulation::materials::Materials;
use crate::world::stats::SimStats;

/// Burn whatever fuel/oxidizer pairs the cell holds. Returns true when
/// anything burned.
pub fn burn(
    cell: &mut Cell,
    materials: &Materials,
    config: &SimConfig,
    dt: f64,
    stats: &mut dyn SimStats,
) -> bool {
    let kinds = cell.present_kinds();
    let Some(&oxidizer) = kinds.iter().find(|&&k| materials.get(k).is_oxidizer) else {
        return false;
    };
    let mut burned = false;
    for &fuel in kinds.iter().filter(|&&k| materials.get(k).is_fuel) {
        let props = materials.get(fuel);
        let (Some(ignition), Some(product)) = (props.ignition_point, props.burns_to) else {
            continue;
        };
        if cell.temperature(materials) < ignition {
            continue;
        }
        let n_fuel = cell.moles(fuel);
        let n_ox = cell.moles(oxidizer);
        let n_burn = (config.combustion_rate * dt * n_fuel)
            .min(n_fuel)
            .min(n_ox);
        if n_burn < MOLES_EPSILON {
            continue;
        }
        let (_, e_fuel) = cell.take_moles(fuel, n_burn);
        let (_, e_ox) = cell.take_moles(oxidizer, n_burn);
        let released = n_burn * props.heat_of_combustion;
        cell.add_material(product, n_burn, e_fuel + e_ox + released);
        stats.record_combustion(fuel, n_burn);
        burned = true;
    }
    burned
}
