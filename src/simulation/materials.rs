//! Material definitions and registry
//!
//! Every material is a single phase of a substance (ice, water and steam are
//! three materials sharing one substance). The property table is immutable
//! after construction; all passes read from it and never write.

use serde::{Deserialize, Serialize};

/// Number of registered material kinds. The per-cell presence bitmask and
/// state array are sized by this.
pub const MATERIAL_COUNT: usize = 11;

/// A discrete material identity (one phase of one substance).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MaterialKind {
    Rock = 0,
    Dirt = 1,
    Ice = 2,
    Water = 3,
    Steam = 4,
    Nitrogen = 5,
    Oxygen = 6,
    CarbonDioxide = 7,
    DryIce = 8,
    Coal = 9,
    Lava = 10,
}

impl MaterialKind {
    pub const ALL: [MaterialKind; MATERIAL_COUNT] = [
        MaterialKind::Rock,
        MaterialKind::Dirt,
        MaterialKind::Ice,
        MaterialKind::Water,
        MaterialKind::Steam,
        MaterialKind::Nitrogen,
        MaterialKind::Oxygen,
        MaterialKind::CarbonDioxide,
        MaterialKind::DryIce,
        MaterialKind::Coal,
        MaterialKind::Lava,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn from_index(index: usize) -> Option<MaterialKind> {
        Self::ALL.get(index).copied()
    }

    /// Presence bit for this kind in a cell's bitmask.
    #[inline]
    pub fn bit(self) -> u16 {
        1 << self.index()
    }
}

/// Physical phase of a material kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Solid,
    Liquid,
    Gas,
}

/// Substance identity shared by the phase siblings of one compound.
/// Conservation accounting sums moles per substance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Substance {
    Rock,
    Soil,
    Water,
    Nitrogen,
    Oxygen,
    CarbonDioxide,
    Carbon,
}

/// Static physical constants for one material kind. Never mutated at runtime.
///
/// Heat capacities are J/(mol·K), molar volumes are L/mol, enthalpies are
/// J/mol, temperatures are Kelvin. The constants are illustrative rather than
/// tabulated lab values; they are chosen so the simulation's conservation and
/// plateau behavior holds.
#[derive(Clone, Debug, Serialize)]
pub struct MaterialProperties {
    pub name: &'static str,
    /// Chemical formula, diagnostic only.
    pub formula: &'static str,
    pub phase: Phase,
    pub substance: Substance,

    /// g/mol
    pub molar_mass: f64,

    // Per-phase molar heat capacities. Siblings of one substance carry the
    // full set so the cumulative energy curve can be evaluated from any of
    // them.
    pub cp_solid: f64,
    pub cp_liquid: f64,
    pub cp_gas: f64,

    // Per-phase molar volumes
    pub vm_solid: f64,
    pub vm_liquid: f64,
    pub vm_gas: f64,

    /// Solid/liquid boundary (None = never transitions out of its phase)
    pub melting_point: Option<f64>,
    /// Liquid/gas boundary. Equal to `melting_point` for substances with no
    /// liquid range (sublimation only).
    pub boiling_point: Option<f64>,
    pub enthalpy_fusion: f64,
    pub enthalpy_vaporization: f64,

    /// Heat conduction coefficient (relative units, scaled by config rate)
    pub conductivity: f64,
    /// Flow damping for liquids (0 = water-thin, 1 = barely flows)
    pub viscosity: f64,

    // Phase sibling links (the discrete-identity transition graph)
    pub solid_form: Option<MaterialKind>,
    pub liquid_form: Option<MaterialKind>,
    pub gas_form: Option<MaterialKind>,

    // Combustion attributes
    pub is_fuel: bool,
    pub is_oxidizer: bool,
    pub ignition_point: Option<f64>,
    /// J/mol of fuel burned
    pub heat_of_combustion: f64,
    pub burns_to: Option<MaterialKind>,
}

impl Default for MaterialProperties {
    fn default() -> Self {
        Self {
            name: "unknown",
            formula: "?",
            phase: Phase::Solid,
            substance: Substance::Rock,
            molar_mass: 1.0,
            cp_solid: 25.0,
            cp_liquid: 25.0,
            cp_gas: 25.0,
            vm_solid: 0.02,
            vm_liquid: 0.02,
            vm_gas: 24.0,
            melting_point: None,
            boiling_point: None,
            enthalpy_fusion: 0.0,
            enthalpy_vaporization: 0.0,
            conductivity: 0.5,
            viscosity: 0.0,
            solid_form: None,
            liquid_form: None,
            gas_form: None,
            is_fuel: false,
            is_oxidizer: false,
            ignition_point: None,
            heat_of_combustion: 0.0,
            burns_to: None,
        }
    }
}

impl MaterialProperties {
    /// Heat capacity for a given phase.
    #[inline]
    pub fn cp(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Solid => self.cp_solid,
            Phase::Liquid => self.cp_liquid,
            Phase::Gas => self.cp_gas,
        }
    }

    /// Heat capacity for this material's own phase.
    #[inline]
    pub fn cp_own(&self) -> f64 {
        self.cp(self.phase)
    }

    /// Molar volume for a given phase.
    #[inline]
    pub fn molar_volume(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Solid => self.vm_solid,
            Phase::Liquid => self.vm_liquid,
            Phase::Gas => self.vm_gas,
        }
    }

    /// Molar volume for this material's own phase.
    #[inline]
    pub fn molar_volume_own(&self) -> f64 {
        self.molar_volume(self.phase)
    }

    /// Mass density in this material's own phase, g/L.
    #[inline]
    pub fn density(&self) -> f64 {
        let vm = self.molar_volume_own();
        if vm <= f64::EPSILON {
            return 0.0;
        }
        self.molar_mass / vm
    }

    /// True when this kind never transitions out of its phase.
    #[inline]
    pub fn is_single_phase(&self) -> bool {
        self.solid_form.is_none() && self.liquid_form.is_none() && self.gas_form.is_none()
    }

    /// Sensible energy of `moles` at `temperature` in this material's own
    /// phase. The inverse of [`MaterialProperties::temperature_of`] in the
    /// material's normal range.
    #[inline]
    pub fn energy_at(&self, moles: f64, temperature: f64) -> f64 {
        moles * self.cp_own() * temperature
    }

    /// Temperature of `moles` holding `energy` of sensible heat.
    ///
    /// Single-phase materials use T = E / (n·Cp) directly. Multi-phase
    /// substances map the entry's phase-local energy onto the substance's
    /// cumulative curve and bucket it through five ascending regions: solid
    /// heating, melt plateau, liquid heating, boil plateau, gas heating. An
    /// entry whose energy overshoots its own phase boundary therefore reads
    /// the plateau temperature until the full latent span is absorbed.
    /// Negative energy maps through the solid branch.
    pub fn temperature_of(&self, moles: f64, energy: f64) -> f64 {
        if moles <= f64::EPSILON {
            return 0.0;
        }
        if self.is_single_phase() {
            let cp = self.cp_own();
            if cp <= f64::EPSILON {
                return 0.0;
            }
            return energy / (moles * cp);
        }

        let tm = self.melting_point.unwrap_or(0.0);
        let tb = self.boiling_point.unwrap_or(tm);
        let hf = self.enthalpy_fusion;
        let hv = self.enthalpy_vaporization;

        // Cumulative-curve knots per mole, measured from solid at 0 K.
        let e_solid_top = self.cp_solid * tm;
        let e_melt_top = e_solid_top + hf;
        let e_liquid_top = e_melt_top + self.cp_liquid * (tb - tm);
        let e_boil_top = e_liquid_top + hv;

        // Map phase-local energy onto the cumulative curve. The offsets are
        // exact at the boundaries, so an entry at its own boundary lands on
        // the matching curve knot.
        let offset = match self.phase {
            Phase::Solid => 0.0,
            Phase::Liquid => e_melt_top - self.cp_liquid * tm,
            Phase::Gas => e_boil_top - self.cp_gas * tb,
        };
        let e = energy / moles + offset;

        if e <= e_solid_top {
            if self.cp_solid <= f64::EPSILON {
                return 0.0;
            }
            e / self.cp_solid
        } else if e <= e_melt_top {
            tm
        } else if e <= e_liquid_top {
            if self.cp_liquid <= f64::EPSILON {
                return tm;
            }
            tm + (e - e_melt_top) / self.cp_liquid
        } else if e <= e_boil_top {
            tb
        } else {
            if self.cp_gas <= f64::EPSILON {
                return tb;
            }
            tb + (e - e_boil_top) / self.cp_gas
        }
    }
}

/// Registry of all materials, indexed by [`MaterialKind`].
pub struct Materials {
    table: Vec<MaterialProperties>,
}

impl Materials {
    pub fn new() -> Self {
        let mut materials = Self { table: Vec::new() };
        materials.register_defaults();
        materials
    }

    fn register_defaults(&mut self) {
        self.table = vec![MaterialProperties::default(); MATERIAL_COUNT];

        // Rock/lava pair. Equal heat capacities in every phase keep the
        // melt/freeze energy delta at exactly the fusion enthalpy. No gas
        // form: rock never boils here.
        let rock_common = MaterialProperties {
            formula: "SiO2",
            substance: Substance::Rock,
            molar_mass: 60.08,
            cp_solid: 44.4,
            cp_liquid: 44.4,
            cp_gas: 44.4,
            vm_solid: 0.0227,
            vm_liquid: 0.0250,
            vm_gas: 24.0,
            melting_point: Some(1473.0),
            enthalpy_fusion: 25_000.0,
            solid_form: Some(MaterialKind::Rock),
            liquid_form: Some(MaterialKind::Lava),
            ..Default::default()
        };
        self.register(
            MaterialKind::Rock,
            MaterialProperties {
                name: "rock",
                phase: Phase::Solid,
                conductivity: 3.0,
                ..rock_common.clone()
            },
        );
        self.register(
            MaterialKind::Lava,
            MaterialProperties {
                name: "lava",
                phase: Phase::Liquid,
                conductivity: 1.2,
                viscosity: 0.85,
                ..rock_common
            },
        );

        // Dirt - loose surface solid, poor conductor
        self.register(
            MaterialKind::Dirt,
            MaterialProperties {
                name: "dirt",
                formula: "soil",
                phase: Phase::Solid,
                substance: Substance::Soil,
                molar_mass: 60.0,
                cp_solid: 50.0,
                vm_solid: 0.040,
                conductivity: 0.4,
                ..Default::default()
            },
        );

        // The water trio. Cp values keep (cp_liquid - cp_solid) * Tm below
        // the fusion enthalpy, so freezing is net-exothermic in the sensible
        // ledger.
        let water_common = MaterialProperties {
            formula: "H2O",
            substance: Substance::Water,
            molar_mass: 18.015,
            cp_solid: 36.0,
            cp_liquid: 42.0,
            cp_gas: 34.0,
            vm_solid: 0.0196,
            vm_liquid: 0.0180,
            vm_gas: 24.0,
            melting_point: Some(273.15),
            boiling_point: Some(373.15),
            enthalpy_fusion: 6010.0,
            enthalpy_vaporization: 40650.0,
            solid_form: Some(MaterialKind::Ice),
            liquid_form: Some(MaterialKind::Water),
            gas_form: Some(MaterialKind::Steam),
            ..Default::default()
        };
        self.register(
            MaterialKind::Ice,
            MaterialProperties {
                name: "ice",
                phase: Phase::Solid,
                conductivity: 2.2,
                ..water_common.clone()
            },
        );
        self.register(
            MaterialKind::Water,
            MaterialProperties {
                name: "water",
                phase: Phase::Liquid,
                conductivity: 0.6,
                viscosity: 0.1,
                ..water_common.clone()
            },
        );
        self.register(
            MaterialKind::Steam,
            MaterialProperties {
                name: "steam",
                phase: Phase::Gas,
                conductivity: 0.02,
                ..water_common
            },
        );

        // Atmospheric gases
        self.register(
            MaterialKind::Nitrogen,
            MaterialProperties {
                name: "nitrogen",
                formula: "N2",
                phase: Phase::Gas,
                substance: Substance::Nitrogen,
                molar_mass: 28.014,
                cp_gas: 29.1,
                vm_gas: 24.0,
                conductivity: 0.026,
                ..Default::default()
            },
        );
        self.register(
            MaterialKind::Oxygen,
            MaterialProperties {
                name: "oxygen",
                formula: "O2",
                phase: Phase::Gas,
                substance: Substance::Oxygen,
                molar_mass: 31.998,
                cp_gas: 29.4,
                vm_gas: 24.0,
                conductivity: 0.026,
                is_oxidizer: true,
                ..Default::default()
            },
        );

        // CO2 pair. No liquid range at ambient pressure: melting and boiling
        // points coincide and transitions go directly solid <-> gas. The
        // molar mass is the exact sum of the coal and oxygen constants so
        // combustion balances to the bit.
        let co2_common = MaterialProperties {
            formula: "CO2",
            substance: Substance::CarbonDioxide,
            molar_mass: 44.009,
            cp_solid: 54.6,
            cp_liquid: 54.6,
            cp_gas: 37.1,
            vm_solid: 0.0280,
            vm_liquid: 0.0280,
            vm_gas: 24.0,
            melting_point: Some(194.7),
            boiling_point: Some(194.7),
            enthalpy_fusion: 9000.0,
            enthalpy_vaporization: 16200.0,
            solid_form: Some(MaterialKind::DryIce),
            gas_form: Some(MaterialKind::CarbonDioxide),
            ..Default::default()
        };
        self.register(
            MaterialKind::CarbonDioxide,
            MaterialProperties {
                name: "carbon_dioxide",
                phase: Phase::Gas,
                conductivity: 0.017,
                ..co2_common.clone()
            },
        );
        self.register(
            MaterialKind::DryIce,
            MaterialProperties {
                name: "dry_ice",
                phase: Phase::Solid,
                conductivity: 0.4,
                ..co2_common
            },
        );

        // Coal - solid fuel
        self.register(
            MaterialKind::Coal,
            MaterialProperties {
                name: "coal",
                formula: "C",
                phase: Phase::Solid,
                substance: Substance::Carbon,
                molar_mass: 12.011,
                cp_solid: 8.5,
                vm_solid: 0.0053,
                conductivity: 0.2,
                is_fuel: true,
                ignition_point: Some(700.0),
                heat_of_combustion: 393_500.0,
                burns_to: Some(MaterialKind::CarbonDioxide),
                ..Default::default()
            },
        );
    }

    fn register(&mut self, kind: MaterialKind, props: MaterialProperties) {
        self.table[kind.index()] = props;
    }

    /// Get properties for a material kind.
    #[inline]
    pub fn get(&self, kind: MaterialKind) -> &MaterialProperties {
        &self.table[kind.index()]
    }
}

impl Default for Materials {
    fn default() -> Self {
        Self::new()
    }
}
