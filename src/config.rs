//! Simulation tuning parameters
//!
//! All rates are per second and get multiplied by the tick duration, so the
//! same config behaves consistently if the tick rate changes. Loadable from
//! RON for experiment overrides.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed simulation timestep in seconds.
    pub tick_seconds: f64,
    /// Ticks executed per `step` call before the remainder is discarded.
    pub max_ticks_per_step: u32,
    /// Consecutive quiet ticks before a chunk is marked stable.
    pub stable_after_ticks: u32,
    /// Hard cap on allocated chunks.
    pub max_chunks: usize,

    /// Background temperature in Kelvin.
    pub ambient_temperature: f64,

    // Heat conduction
    pub heat_rate: f64,
    /// Transfers below this many joules are skipped so chunks can settle.
    pub min_heat_transfer: f64,
    /// Radiative bleed toward ambient, per Kelvin above ambient.
    pub radiative_rate: f64,

    // Phase transitions
    /// Moles converted per second at a boundary.
    pub phase_budget: f64,
    /// Overshoot in Kelvin past which the budget doubles.
    pub strong_overshoot: f64,
    /// Liquid ranges narrower than this sublimate directly.
    pub narrow_liquid_range: f64,

    // Combustion
    /// Fraction of present fuel burned per second.
    pub combustion_rate: f64,

    // Liquid flow
    /// Fraction of a column transferred downward per second.
    pub gravity_flow_rate: f64,
    /// Fraction of the horizontal gradient moved per second.
    pub spread_rate: f64,
    /// Gradients below this many moles are considered level.
    pub spread_tolerance: f64,
    /// Fraction of excess pushed upward per second once level.
    pub upward_rate: f64,
    /// Occupancy fraction above which a level cell pushes excess upward.
    pub fill_threshold: f64,

    // Gas diffusion
    /// Fraction of the concentration gradient moved per second.
    pub diffusion_rate: f64,
    /// Cap on the share of source moles leaving through one face per tick.
    pub diffusion_max_share: f64,
    /// Transfers below this many moles are skipped so gas pockets settle.
    pub diffusion_min_flow: f64,
    /// Directional bias for upward diffusion.
    pub buoyancy_up: f64,
    /// Directional bias for downward diffusion.
    pub buoyancy_down: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 1.0 / 60.0,
            max_ticks_per_step: 4,
            stable_after_ticks: 8,
            max_chunks: 65_536,

            ambient_temperature: 293.15,

            heat_rate: 20.0,
            min_heat_transfer: 1e-3,
            radiative_rate: 0.01,

            phase_budget: 10.0,
            strong_overshoot: 25.0,
            narrow_liquid_range: 1.0,

            combustion_rate: 0.5,

            gravity_flow_rate: 90.0,
            spread_rate: 30.0,
            spread_tolerance: 1e-3,
            upward_rate: 2.0,
            fill_threshold: 0.8,

            diffusion_rate: 10.0,
            diffusion_max_share: 0.2,
            diffusion_min_flow: 1e-4,
            buoyancy_up: 1.5,
            buoyancy_down: 0.5,
        }
    }
}

impl SimConfig {
    /// Parse a config from RON text, e.g. an experiment override file.
    pub fn from_ron(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tick_is_sixtieth() {
        let config = SimConfig::default();
        assert!((config.tick_seconds - 1.0 / 60.0).abs() < 1e-12);
        assert_eq!(config.max_ticks_per_step, 4);
    }

    #[test]
    fn test_partial_ron_override_keeps_defaults() {
        let config = SimConfig::from_ron("(ambient_temperature: 250.0)").unwrap();
        assert_eq!(config.ambient_temperature, 250.0);
        assert_eq!(config.stable_after_ticks, SimConfig::default().stable_after_ticks);
    }
}
