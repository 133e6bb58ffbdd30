//! Heat conduction pass
//!
//! Three stages per cell: equilibration between the materials sharing the
//! cell, conduction across the three positive faces (the expanded dirty box
//! covers the negative-side pairs, so each face is visited once per tick),
//! and radiative bleed toward ambient.

use glam::IVec3;
use smallvec::SmallVec;

use crate::config::SimConfig;
use crate::simulation::cell::Cell;
use crate::simulation::materials::{MaterialKind, Materials};
use crate::world::chunk::{DirtyBox, FACE_OFFSETS};
use crate::world::stats::SimStats;
use crate::world::world::ChunkGrid;

/// Positive-direction faces: +X, +Y, +Z.
const POSITIVE_FACES: [usize; 3] = [1, 3, 5];

type Shares = SmallVec<[(MaterialKind, f64); 8]>;

/// Whole-cell thermal aggregate: temperature, heat capacity,
/// capacity-weighted conductivity, and per-material capacity shares.
struct SideProfile {
    temperature: f64,
    heat_capacity: f64,
    conductivity: f64,
    shares: Shares,
}

fn side_profile(cell: &Cell, materials: &Materials) -> Option<SideProfile> {
    let mut total_hc = 0.0;
    let mut weighted_k = 0.0;
    let mut weighted_t = 0.0;
    let mut shares: Shares = SmallVec::new();
    for kind in cell.present_kinds() {
        let hc = cell.heat_capacity_of(kind, materials);
        if hc <= f64::EPSILON {
            continue;
        }
        total_hc += hc;
        weighted_k += materials.get(kind).conductivity * hc;
        weighted_t += cell.temperature_of(kind, materials) * hc;
        shares.push((kind, hc));
    }
    if total_hc <= f64::EPSILON {
        return None;
    }
    for (_, share) in shares.iter_mut() {
        *share /= total_hc;
    }
    Some(SideProfile {
        temperature: weighted_t / total_hc,
        heat_capacity: total_hc,
        conductivity: weighted_k / total_hc,
        shares,
    })
}

/// Geometric-mean blend when both sides conduct, arithmetic otherwise so a
/// zero-conductivity side still exchanges slowly instead of insulating
/// perfectly.
#[inline]
fn blend_conductivity(a: f64, b: f64) -> f64 {
    if a > 0.0 && b > 0.0 {
        (a * b).sqrt()
    } else {
        0.5 * (a + b)
    }
}

fn apply_shares(grid: &mut ChunkGrid, slot: u32, local: IVec3, shares: &Shares, joules: f64) {
    if let Some(cell) = grid.cell_mut(slot, local) {
        for &(kind, frac) in shares.iter() {
            cell.add_energy(kind, joules * frac);
        }
    }
    grid.touch(slot, local);
}

pub struct HeatPass;

impl HeatPass {
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        grid: &mut ChunkGrid,
        materials: &Materials,
        config: &SimConfig,
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
                    Self::equilibrate_cell(grid, materials, config, cslot, clocal, dt, stats);
                    Self::conduct_faces(grid, materials, config, cslot, clocal, dt, stats);
                    Self::radiate(grid, materials, config, cslot, clocal, dt, stats);
                }
            }
        }
    }

    /// Exchange heat between material pairs inside one cell.
    fn equilibrate_cell(
        grid: &mut ChunkGrid,
        materials: &Materials,
        config: &SimConfig,
        slot: u32,
        local: IVec3,
        dt: f64,
        stats: &mut dyn SimStats,
    ) {
        let Some(cell) = grid.cell(slot, local) else {
            return;
        };
        let kinds = cell.present_kinds();
        if kinds.len() < 2 {
            return;
        }
        let mut changed = false;
        for i in 0..kinds.len() {
            for j in (i + 1)..kinds.len() {
                let (a, b) = (kinds[i], kinds[j]);
                let Some(cell) = grid.cell(slot, local) else {
                    return;
                };
                let hc_a = cell.heat_capacity_of(a, materials);
                let hc_b = cell.heat_capacity_of(b, materials);
                if hc_a <= f64::EPSILON || hc_b <= f64::EPSILON {
                    continue;
                }
                let delta_t =
                    cell.temperature_of(a, materials) - cell.temperature_of(b, materials);
                let k = blend_conductivity(
                    materials.get(a).conductivity,
                    materials.get(b).conductivity,
                );
                // Cap at the exact-equalization bound so a transfer never
                // overshoots the shared equilibrium temperature.
                let cap = delta_t.abs() * hc_a * hc_b / (hc_a + hc_b);
                let q = (k * delta_t * dt * config.heat_rate).clamp(-cap, cap);
                if q.abs() < config.min_heat_transfer {
                    continue;
                }
                if let Some(cell) = grid.cell_mut(slot, local) {
                    cell.add_energy(a, -q);
                    cell.add_energy(b, q);
                }
                stats.record_heat_transfer(q.abs());
                changed = true;
            }
        }
        if changed {
            grid.touch(slot, local);
        }
    }

    /// Conduct across the +X/+Y/+Z faces.
    fn conduct_faces(
        grid: &mut ChunkGrid,
        materials: &Materials,
        config: &SimConfig,
        slot: u32,
        local: IVec3,
        dt: f64,
        stats: &mut dyn SimStats,
    ) {
        for face in POSITIVE_FACES {
            let Some((nslot, nlocal)) = grid.resolve(slot, local + FACE_OFFSETS[face]) else {
                continue;
            };
            let Some(src) = grid.cell(slot, local).and_then(|c| side_profile(c, materials))
            else {
                continue;
            };
            let Some(dst) = grid
                .cell(nslot, nlocal)
                .and_then(|c| side_profile(c, materials))
            else {
                continue;
            };
            let delta_t = src.temperature - dst.temperature;
            let k = blend_conductivity(src.conductivity, dst.conductivity);
            let cap =
                delta_t.abs() * src.heat_capacity * dst.heat_capacity
                    / (src.heat_capacity + dst.heat_capacity);
            let q = (k * delta_t * dt * config.heat_rate).clamp(-cap, cap);
            if q.abs() < config.min_heat_transfer {
                continue;
            }
            apply_shares(grid, slot, local, &src.shares, -q);
            apply_shares(grid, nslot, nlocal, &dst.shares, q);
            stats.record_heat_transfer(q.abs());
        }
    }

    /// Bleed energy toward ambient from cells hotter than ambient. Cells at
    /// or below ambient lose nothing, so total energy never increases from
    /// this stage.
    fn radiate(
        grid: &mut ChunkGrid,
        materials: &Materials,
        config: &SimConfig,
        slot: u32,
        local: IVec3,
        dt: f64,
        stats: &mut dyn SimStats,
    ) {
        let Some(profile) = grid.cell(slot, local).and_then(|c| side_profile(c, materials))
        else {
            return;
        };
        let over = profile.temperature - config.ambient_temperature;
        if over <= 0.0 {
            return;
        }
        let q = (config.radiative_rate * over * dt * profile.heat_capacity)
            .min(over * profile.heat_capacity);
        if q < config.min_heat_transfer {
            return;
        }
        apply_shares(grid, slot, local, &profile.shares, -q);
        stats.record_heat_transfer(q);
    }
}
