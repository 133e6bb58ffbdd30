//! Liquid flow pass
//!
//! Per liquid, per cell, bottom-up: fall into the cell below when it is
//! open, displace a strictly lighter fluid by swapping equal volumes, or
//! spread horizontally toward lower neighbor columns when blocked. Liquid
//! spread over a ledge falls as gravity flow on the following tick, so
//! columns cascade downhill. A level, overfull column slowly pushes excess
//! upward. A missing chunk below is a hard barrier, same as bedrock.

use glam::IVec3;

use crate::config::SimConfig;
use crate::simulation::cell::{Cell, CELL_VOLUME, MOLES_EPSILON};
use crate::simulation::materials::{MaterialKind, Materials, Phase};
use crate::world::chunk::DirtyBox;
use crate::world::stats::SimStats;
use crate::world::world::ChunkGrid;

const DOWN: IVec3 = IVec3::new(0, -1, 0);
const UP: IVec3 = IVec3::new(0, 1, 0);
/// -X, +X, -Z, +Z.
const HORIZONTAL: [IVec3; 4] = [
    IVec3::new(-1, 0, 0),
    IVec3::new(1, 0, 0),
    IVec3::new(0, 0, -1),
    IVec3::new(0, 0, 1),
];

/// What the cell below allows for a falling liquid.
enum BelowState {
    Blocked,
    /// Empty, gas-only, or already holding the same liquid.
    Open,
    /// Holds only strictly lighter fluids; the densest lighter liquid to
    /// displace.
    Displace(MaterialKind),
}

/// Volume taken by incompressible matter (solids and liquids). Gases
/// compress and do not count against fill.
fn occupied_volume(cell: &Cell, materials: &Materials) -> f64 {
    cell.present_kinds()
        .iter()
        .filter(|&&k| materials.get(k).phase != Phase::Gas)
        .map(|&k| cell.moles(k) * materials.get(k).molar_volume_own())
        .sum()
}

fn classify_below(
    below: &Cell,
    kind: MaterialKind,
    materials: &Materials,
) -> BelowState {
    if below.has_phase(Phase::Solid, materials) {
        return BelowState::Blocked;
    }
    if below.has(kind) || !below.has_phase(Phase::Liquid, materials) {
        return BelowState::Open;
    }
    let own_density = materials.get(kind).density();
    let mut densest_lighter: Option<(MaterialKind, f64)> = None;
    for other in below.present_kinds() {
        let props = materials.get(other);
        if props.phase != Phase::Liquid {
            continue;
        }
        if props.density() >= own_density {
            return BelowState::Blocked;
        }
        let rho = props.density();
        if densest_lighter.map_or(true, |(_, best)| rho > best) {
            densest_lighter = Some((other, rho));
        }
    }
    match densest_lighter {
        Some((other, _)) => BelowState::Displace(other),
        None => BelowState::Open,
    }
}

/// Move `moles` of `kind` (with its proportional energy share) from one
/// cell to another.
#[allow(clippy::too_many_arguments)]
fn transfer(
    grid: &mut ChunkGrid,
    kind: MaterialKind,
    from: (u32, IVec3),
    to: (u32, IVec3),
    moles: f64,
    stats: &mut dyn SimStats,
) -> bool {
    if moles < MOLES_EPSILON {
        return false;
    }
    let Some(src) = grid.cell_mut(from.0, from.1) else {
        return false;
    };
    let (n, e) = src.take_moles(kind, moles);
    if n < MOLES_EPSILON {
        return false;
    }
    if let Some(dst) = grid.cell_mut(to.0, to.1) {
        dst.add_material(kind, n, e);
    }
    grid.touch(from.0, from.1);
    grid.touch(to.0, to.1);
    stats.record_flow(kind, n);
    true
}

pub struct FlowPass;

impl FlowPass {
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
        // Bottom-up so columns drain into space vacated this tick.
        for y in bounds.min.y..=bounds.max.y {
            for z in bounds.min.z..=bounds.max.z {
                for x in bounds.min.x..=bounds.max.x {
                    let Some(at) = grid.resolve(slot, IVec3::new(x, y, z)) else {
                        continue;
                    };
                    let Some(cell) = grid.cell(at.0, at.1) else {
                        continue;
                    };
                    let liquids: Vec<MaterialKind> = cell
                        .present_kinds()
                        .into_iter()
                        .filter(|&k| materials.get(k).phase == Phase::Liquid)
                        .collect();
                    for kind in liquids {
                        Self::flow_one(grid, materials, config, at, kind, dt, stats);
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn flow_one(
        grid: &mut ChunkGrid,
        materials: &Materials,
        config: &SimConfig,
        at: (u32, IVec3),
        kind: MaterialKind,
        dt: f64,
        stats: &mut dyn SimStats,
    ) {
        let props = materials.get(kind);
        let rate = (config.gravity_flow_rate * dt * (1.0 - props.viscosity)).min(1.0);

        if let Some(below_at) = grid.resolve(at.0, at.1 + DOWN) {
            let Some(below) = grid.cell(below_at.0, below_at.1) else {
                return;
            };
            match classify_below(below, kind, materials) {
                BelowState::Open => {
                    let free_vol = (CELL_VOLUME - occupied_volume(below, materials)).max(0.0);
                    let vm = props.molar_volume_own();
                    let n = grid.cell(at.0, at.1).map_or(0.0, |c| c.moles(kind));
                    let n_t = (n * rate).min(free_vol / vm.max(f64::EPSILON));
                    if transfer(grid, kind, at, below_at, n_t, stats) {
                        return;
                    }
                    // No room below: behave as blocked and spread.
                }
                BelowState::Displace(other) => {
                    Self::displace(grid, materials, at, below_at, kind, other, rate, stats);
                    return;
                }
                BelowState::Blocked => {}
            }
        }

        let leveled = Self::spread(grid, materials, config, at, kind, dt, stats);
        if leveled {
            Self::push_up(grid, materials, config, at, kind, dt, stats);
        }
    }

    /// Swap equal volumes with a strictly lighter fluid below. Volume is
    /// conserved on both sides; each material keeps its own moles and
    /// proportional energy.
    #[allow(clippy::too_many_arguments)]
    fn displace(
        grid: &mut ChunkGrid,
        materials: &Materials,
        at: (u32, IVec3),
        below_at: (u32, IVec3),
        kind: MaterialKind,
        other: MaterialKind,
        rate: f64,
        stats: &mut dyn SimStats,
    ) {
        let props = materials.get(kind);
        let other_props = materials.get(other);
        let rho_self = props.density();
        let rho_other = other_props.density();
        if rho_self <= f64::EPSILON {
            return;
        }
        let efficiency = ((rho_self - rho_other) / rho_self).clamp(0.0, 1.0);

        let n = grid.cell(at.0, at.1).map_or(0.0, |c| c.moles(kind));
        let n_other = grid.cell(below_at.0, below_at.1).map_or(0.0, |c| c.moles(other));
        let vm_self = props.molar_volume_own();
        let vm_other = other_props.molar_volume_own();

        let swap_vol = (n * vm_self * rate * efficiency).min(n_other * vm_other);
        let n_down = swap_vol / vm_self.max(f64::EPSILON);
        let n_up = swap_vol / vm_other.max(f64::EPSILON);
        if n_down < MOLES_EPSILON || n_up < MOLES_EPSILON {
            return;
        }
        transfer(grid, kind, at, below_at, n_down, stats);
        transfer(grid, other, below_at, at, n_up, stats);
    }

    /// Spread toward lower neighbor columns. Returns true when every
    /// reachable neighbor was already within tolerance (the surface is
    /// level here).
    #[allow(clippy::too_many_arguments)]
    fn spread(
        grid: &mut ChunkGrid,
        materials: &Materials,
        config: &SimConfig,
        at: (u32, IVec3),
        kind: MaterialKind,
        dt: f64,
        stats: &mut dyn SimStats,
    ) -> bool {
        let props = materials.get(kind);
        let rate = (config.spread_rate * dt * (1.0 - props.viscosity)).min(1.0);
        let mut leveled = true;
        for offset in HORIZONTAL {
            let Some(nbr_at) = grid.resolve(at.0, at.1 + offset) else {
                continue;
            };
            let Some(nbr) = grid.cell(nbr_at.0, nbr_at.1) else {
                continue;
            };
            if nbr.has_phase(Phase::Solid, materials) {
                continue;
            }
            let n = grid.cell(at.0, at.1).map_or(0.0, |c| c.moles(kind));
            let gradient = n - grid.cell(nbr_at.0, nbr_at.1).map_or(0.0, |c| c.moles(kind));
            if gradient <= config.spread_tolerance {
                continue;
            }
            leveled = false;
            // Move toward the midpoint, at most a quarter of the column per
            // neighbor so four-way spread cannot empty the source.
            let n_t = (0.5 * gradient * rate).min(0.5 * gradient).min(n / 4.0);
            transfer(grid, kind, at, nbr_at, n_t, stats);
        }
        leveled
    }

    /// Level and overfull: push excess slowly upward, gated on the cell
    /// above not being solid.
    #[allow(clippy::too_many_arguments)]
    fn push_up(
        grid: &mut ChunkGrid,
        materials: &Materials,
        config: &SimConfig,
        at: (u32, IVec3),
        kind: MaterialKind,
        dt: f64,
        stats: &mut dyn SimStats,
    ) {
        let Some(cell) = grid.cell(at.0, at.1) else {
            return;
        };
        let vol = occupied_volume(cell, materials);
        let threshold = config.fill_threshold * CELL_VOLUME;
        if vol <= threshold {
            return;
        }
        let Some(above_at) = grid.resolve(at.0, at.1 + UP) else {
            return;
        };
        let Some(above) = grid.cell(above_at.0, above_at.1) else {
            return;
        };
        if above.has_phase(Phase::Solid, materials) {
            return;
        }
        let vm = materials.get(kind).molar_volume_own();
        let n = cell.moles(kind);
        let n_t = ((vol - threshold) / vm.max(f64::EPSILON) * config.upward_rate * dt).min(n);
        transfer(grid, kind, at, above_at, n_t, stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::stats::NoopStats;

    fn world_grid() -> (ChunkGrid, Materials, SimConfig, u32) {
        let mut grid = ChunkGrid::new();
        let slot = grid.create(IVec3::ZERO, 16).unwrap();
        (grid, Materials::new(), SimConfig::default(), slot)
    }

    fn add_at(
        grid: &mut ChunkGrid,
        materials: &Materials,
        slot: u32,
        local: IVec3,
        kind: MaterialKind,
        moles: f64,
    ) {
        let energy = materials.get(kind).energy_at(moles, 293.15);
        grid.cell_mut(slot, local)
            .unwrap()
            .add_material(kind, moles, energy);
    }

    /// Run the pass over exactly one cell so assertions can account for
    /// every mole it touches.
    fn run_box(
        grid: &mut ChunkGrid,
        materials: &Materials,
        config: &SimConfig,
        slot: u32,
        at: IVec3,
    ) {
        let mut bounds = DirtyBox::EMPTY;
        bounds.grow(at);
        let mut stats = NoopStats;
        FlowPass::run(
            grid,
            materials,
            config,
            slot,
            bounds,
            config.tick_seconds,
            &mut stats,
        );
    }

    #[test]
    fn test_liquid_falls_into_open_cell() {
        let (mut grid, materials, config, slot) = world_grid();
        let at = IVec3::new(3, 4, 3);
        add_at(&mut grid, &materials, slot, at, MaterialKind::Water, 10.0);

        run_box(&mut grid, &materials, &config, slot, at);

        // gravity_flow_rate * dt >= 1, so the whole column drops in one tick.
        assert!(!grid.cell(slot, at).unwrap().has(MaterialKind::Water));
        let below = grid.cell(slot, at + DOWN).unwrap();
        assert!((below.moles(MaterialKind::Water) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_solid_below_blocks_fall() {
        let (mut grid, materials, config, slot) = world_grid();
        let at = IVec3::new(3, 4, 3);
        add_at(&mut grid, &materials, slot, at, MaterialKind::Water, 10.0);
        add_at(&mut grid, &materials, slot, at + DOWN, MaterialKind::Rock, 100.0);
        // Walls so nothing spreads either.
        for offset in HORIZONTAL {
            add_at(&mut grid, &materials, slot, at + offset, MaterialKind::Rock, 100.0);
        }

        run_box(&mut grid, &materials, &config, slot, at);

        let cell = grid.cell(slot, at).unwrap();
        assert!((cell.moles(MaterialKind::Water) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_chunk_below_is_hard_barrier() {
        let (mut grid, materials, config, slot) = world_grid();
        // Bottom row of the only chunk: no chunk below exists.
        let at = IVec3::new(3, 0, 3);
        add_at(&mut grid, &materials, slot, at, MaterialKind::Water, 10.0);
        for offset in HORIZONTAL {
            add_at(&mut grid, &materials, slot, at + offset, MaterialKind::Rock, 100.0);
        }

        run_box(&mut grid, &materials, &config, slot, at);

        let cell = grid.cell(slot, at).unwrap();
        assert!((cell.moles(MaterialKind::Water) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_blocked_liquid_spreads_toward_lower_columns() {
        let (mut grid, materials, config, slot) = world_grid();
        let at = IVec3::new(3, 1, 3);
        // Floor under the column and its neighbors.
        for x in 1..6 {
            for z in 1..6 {
                add_at(
                    &mut grid,
                    &materials,
                    slot,
                    IVec3::new(x, 0, z),
                    MaterialKind::Rock,
                    100.0,
                );
            }
        }
        add_at(&mut grid, &materials, slot, at, MaterialKind::Water, 12.0);

        run_box(&mut grid, &materials, &config, slot, at);

        let center = grid.cell(slot, at).unwrap().moles(MaterialKind::Water);
        assert!(center < 12.0);
        let mut total = center;
        for offset in HORIZONTAL {
            let n = grid
                .cell(slot, at + offset)
                .unwrap()
                .moles(MaterialKind::Water);
            assert!(n > 0.0, "spread reaches each open neighbor");
            total += n;
        }
        assert!((total - 12.0).abs() < 1e-9, "moles conserved");
    }

    #[test]
    fn test_spread_caps_at_quarter_per_neighbor() {
        let (mut grid, materials, mut config, slot) = world_grid();
        config.spread_rate = 1e6;
        let at = IVec3::new(3, 1, 3);
        for x in 1..6 {
            for z in 1..6 {
                add_at(
                    &mut grid,
                    &materials,
                    slot,
                    IVec3::new(x, 0, z),
                    MaterialKind::Rock,
                    100.0,
                );
            }
        }
        add_at(&mut grid, &materials, slot, at, MaterialKind::Water, 8.0);

        run_box(&mut grid, &materials, &config, slot, at);

        for offset in HORIZONTAL {
            let n = grid
                .cell(slot, at + offset)
                .unwrap()
                .moles(MaterialKind::Water);
            assert!(n <= 8.0 / 4.0 + 1e-9);
        }
    }

    #[test]
    fn test_blocked_liquid_spreads_over_a_ledge() {
        let (mut grid, materials, config, slot) = world_grid();
        let at = IVec3::new(3, 1, 3);
        // Pedestal under the column only; the neighbors hang over open air.
        add_at(&mut grid, &materials, slot, at + DOWN, MaterialKind::Rock, 100.0);
        add_at(&mut grid, &materials, slot, at, MaterialKind::Water, 8.0);

        run_box(&mut grid, &materials, &config, slot, at);

        let mut spilled = 0.0;
        for offset in HORIZONTAL {
            spilled += grid
                .cell(slot, at + offset)
                .unwrap()
                .moles(MaterialKind::Water);
        }
        assert!(spilled > 0.0, "liquid leaves the pedestal over the edge");
        let center = grid.cell(slot, at).unwrap().moles(MaterialKind::Water);
        assert!((center + spilled - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_classify_below() {
        let materials = Materials::new();

        // Same liquid below: open for merging, not a displacement.
        let mut below = Cell::new();
        below.add_material(MaterialKind::Water, 5.0, 1000.0);
        assert!(matches!(
            classify_below(&below, MaterialKind::Water, &materials),
            BelowState::Open
        ));

        let mut gas_below = Cell::new();
        gas_below.add_material(MaterialKind::Nitrogen, 5.0, 1000.0);
        assert!(matches!(
            classify_below(&gas_below, MaterialKind::Water, &materials),
            BelowState::Open
        ));

        let mut solid_below = Cell::new();
        solid_below.add_material(MaterialKind::Rock, 5.0, 1000.0);
        assert!(matches!(
            classify_below(&solid_below, MaterialKind::Water, &materials),
            BelowState::Blocked
        ));
    }

    #[test]
    fn test_lava_displaces_water_below() {
        let (mut grid, materials, config, slot) = world_grid();
        let lava_at = IVec3::new(3, 4, 3);
        let water_at = IVec3::new(3, 3, 3);
        grid.cell_mut(slot, lava_at).unwrap().add_material(
            MaterialKind::Lava,
            10.0,
            materials.get(MaterialKind::Lava).energy_at(10.0, 1600.0),
        );
        add_at(&mut grid, &materials, slot, water_at, MaterialKind::Water, 10.0);

        run_box(&mut grid, &materials, &config, slot, lava_at);

        let upper = grid.cell(slot, lava_at).unwrap();
        let lower = grid.cell(slot, water_at).unwrap();
        assert!(lower.moles(MaterialKind::Lava) > 0.0, "lava sinks");
        assert!(upper.moles(MaterialKind::Water) > 0.0, "water rises");
        // Each material's total is conserved across the swap.
        let lava_total = upper.moles(MaterialKind::Lava) + lower.moles(MaterialKind::Lava);
        let water_total = upper.moles(MaterialKind::Water) + lower.moles(MaterialKind::Water);
        assert!((lava_total - 10.0).abs() < 1e-9);
        assert!((water_total - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_water_blocked_by_denser_lava_below() {
        let (mut grid, materials, config, slot) = world_grid();
        let water_at = IVec3::new(3, 4, 3);
        let lava_at = IVec3::new(3, 3, 3);
        add_at(&mut grid, &materials, slot, water_at, MaterialKind::Water, 10.0);
        grid.cell_mut(slot, lava_at).unwrap().add_material(
            MaterialKind::Lava,
            10.0,
            materials.get(MaterialKind::Lava).energy_at(10.0, 1600.0),
        );
        for offset in HORIZONTAL {
            add_at(&mut grid, &materials, slot, water_at + offset, MaterialKind::Rock, 100.0);
        }

        run_box(&mut grid, &materials, &config, slot, water_at);

        let upper = grid.cell(slot, water_at).unwrap();
        assert!((upper.moles(MaterialKind::Water) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_level_overfull_column_pushes_up() {
        let (mut grid, materials, mut config, slot) = world_grid();
        config.upward_rate = 60.0;
        let at = IVec3::new(3, 1, 3);
        for x in 1..6 {
            for z in 1..6 {
                add_at(
                    &mut grid,
                    &materials,
                    slot,
                    IVec3::new(x, 0, z),
                    MaterialKind::Rock,
                    100.0,
                );
            }
        }
        // Fill center and neighbors to the same overfull level so gradients
        // are within tolerance.
        let vm = materials.get(MaterialKind::Water).vm_liquid;
        let moles = CELL_VOLUME / vm; // completely full
        add_at(&mut grid, &materials, slot, at, MaterialKind::Water, moles);
        for offset in HORIZONTAL {
            add_at(&mut grid, &materials, slot, at + offset, MaterialKind::Water, moles);
        }

        run_box(&mut grid, &materials, &config, slot, at);

        let above = grid.cell(slot, at + UP).unwrap();
        assert!(above.moles(MaterialKind::Water) > 0.0);
    }
}
