//! Gas diffusion pass
//!
//! Per gas, per cell: moves moles down the concentration gradient across
//! each of the six faces, biased upward by buoyancy and blocked by solid
//! neighbors. Transfers only run from higher to lower concentration, so a
//! face is settled from whichever side sees the positive gradient.

use glam::IVec3;

use crate::config::SimConfig;
use crate::simulation::materials::{MaterialKind, Materials, Phase};
use crate::world::chunk::{DirtyBox, FACE_OFFSETS};
use crate::world::stats::SimStats;
use crate::world::world::ChunkGrid;

pub struct DiffusionPass;

impl DiffusionPass {
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
                    let Some(at) = grid.resolve(slot, IVec3::new(x, y, z)) else {
                        continue;
                    };
                    let Some(cell) = grid.cell(at.0, at.1) else {
                        continue;
                    };
                    let gases: Vec<MaterialKind> = cell
                        .present_kinds()
                        .into_iter()
                        .filter(|&k| materials.get(k).phase == Phase::Gas)
                        .collect();
                    for kind in gases {
                        Self::diffuse_one(grid, materials, config, at, kind, dt, stats);
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn diffuse_one(
        grid: &mut ChunkGrid,
        materials: &Materials,
        config: &SimConfig,
        at: (u32, IVec3),
        kind: MaterialKind,
        dt: f64,
        stats: &mut dyn SimStats,
    ) {
        for (face, offset) in FACE_OFFSETS.iter().enumerate() {
            let Some(nbr_at) = grid.resolve(at.0, at.1 + *offset) else {
                continue;
            };
            let Some(nbr) = grid.cell(nbr_at.0, nbr_at.1) else {
                continue;
            };
            if nbr.has_phase(Phase::Solid, materials) {
                continue;
            }
            let Some(cell) = grid.cell(at.0, at.1) else {
                return;
            };
            let n_src = cell.moles(kind);
            let gradient = n_src - nbr.moles(kind);
            if gradient <= 0.0 {
                continue;
            }
            let bias = match face {
                3 => config.buoyancy_up,
                2 => config.buoyancy_down,
                _ => 1.0,
            };
            let n_t = (gradient * config.diffusion_rate * dt * bias)
                .min(n_src * config.diffusion_max_share);
            if n_t < config.diffusion_min_flow {
                continue;
            }
            let Some(cell) = grid.cell_mut(at.0, at.1) else {
                return;
            };
            let (n, e) = cell.take_moles(kind, n_t);
            if let Some(nbr) = grid.cell_mut(nbr_at.0, nbr_at.1) {
                nbr.add_material(kind, n, e);
            }
            grid.touch(at.0, at.1);
            grid.touch(nbr_at.0, nbr_at.1);
            stats.record_diffusion(kind, n);
        }
    }
}
