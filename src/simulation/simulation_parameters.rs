use std::fmt;

use crate::{floating_type_mod::FT, vec2f, V2};
use serde::{Deserialize, Serialize};

/// How the pairwise pressure term is symmetrized.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum PressureForm {
    /// `p_i / rho_i^2 + p_j / rho_j^2`; pair contributions cancel (Newton's third law) for equal masses.
    Symmetric,

    /// `(p_i + p_j) / (2 * rho_j)`; cheaper but does not conserve momentum exactly.
    Averaged,
}

/// Equation of state variant.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum PressureClamp {
    /// `k * max(rho - rho_0, 0)`: under-dense particles exert no pressure.
    Clamped,

    /// `k * (rho - rho_0)`: allows attractive (negative) pressure, less stable.
    Unclamped,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SpatialIndexKind {
    // cell array sized to the domain, positions are clamped into range
    Dense,

    // hash map of occupied cells, works for any coordinate
    Sparse,
}

/// Spawn band given in fractions of the domain extent.
#[derive(PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpawnRegion {
    pub x: [FT; 2],
    pub y: [FT; 2],
}

impl Default for SpawnRegion {
    fn default() -> Self {
        SpawnRegion {
            x: [0.35, 0.65],
            y: [0.02, 0.12],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    pub h: FT,
    pub rest_density: FT,
    pub stiffness: FT,
    pub viscosity: FT,
    // positive values pull particles towards +y (downwards on screen)
    pub gravity: FT,
    pub damping: FT,

    pub boundary_restitution: FT,
    pub boundary_friction: FT,

    pub collision_restitution: FT,
    pub collision_iterations: usize,

    pub substeps: usize,

    pub max_particles: usize,
    pub spawn_rate: usize,
    pub spawn_attempts: usize,
    pub spawn_region: SpawnRegion,
    pub spawn_velocity: [FT; 2],
    pub particle_radius: FT,

    // 0 disables surface tension
    pub surface_tension: FT,

    pub pressure_form: PressureForm,
    pub pressure_clamp: PressureClamp,
    pub density_self_contribution: bool,
    pub spatial_index: SpatialIndexKind,

    pub max_dt: Option<FT>,
    pub max_speed: Option<FT>,

    pub interaction_radius: FT,
    pub drag_strength: FT,

    pub seed: Option<u64>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            h: 16.,
            rest_density: 0.05,
            stiffness: 20000.,
            viscosity: 250.,
            gravity: 300.,
            damping: 0.97,
            boundary_restitution: 0.3,
            boundary_friction: 0.05,
            collision_restitution: 0.2,
            collision_iterations: 3,
            substeps: 2,
            max_particles: 2000,
            spawn_rate: 4,
            spawn_attempts: 10,
            spawn_region: SpawnRegion::default(),
            spawn_velocity: [0., 0.],
            particle_radius: 4.,
            surface_tension: 0.,
            pressure_form: PressureForm::Symmetric,
            pressure_clamp: PressureClamp::Clamped,
            density_self_contribution: true,
            spatial_index: SpatialIndexKind::Dense,
            max_dt: Some(1. / 60.),
            max_speed: None,
            interaction_radius: 40.,
            drag_strength: 4.,
            seed: None,
        }
    }
}

impl SimulationParams {
    pub fn gravity_vector(&self) -> V2 {
        vec2f(0., self.gravity)
    }

    pub fn spawn_velocity(&self) -> V2 {
        vec2f(self.spawn_velocity[0], self.spawn_velocity[1])
    }

    pub fn with_spawn_rate(mut self, spawn_rate: usize) -> Self {
        self.spawn_rate = spawn_rate;
        self
    }

    pub fn with_max_particles(mut self, max_particles: usize) -> Self {
        self.max_particles = max_particles;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Reject parameters that would otherwise silently produce NaNs or unbounded work.
    pub fn validate(&self) -> Result<(), ParamsError> {
        fn finite(field: &'static str, value: FT) -> Result<FT, ParamsError> {
            if value.is_finite() {
                Ok(value)
            } else {
                Err(ParamsError::NotFinite { field, value: value as f64 })
            }
        }

        fn positive(field: &'static str, value: FT) -> Result<(), ParamsError> {
            if finite(field, value)? > 0. {
                Ok(())
            } else {
                Err(ParamsError::NotPositive { field, value: value as f64 })
            }
        }

        fn non_negative(field: &'static str, value: FT) -> Result<(), ParamsError> {
            if finite(field, value)? >= 0. {
                Ok(())
            } else {
                Err(ParamsError::Negative { field, value: value as f64 })
            }
        }

        fn in_range(field: &'static str, value: FT, min: FT, max: FT, min_inclusive: bool) -> Result<(), ParamsError> {
            let value = finite(field, value)?;
            let above_min = if min_inclusive { value >= min } else { value > min };
            if above_min && value <= max {
                Ok(())
            } else {
                Err(ParamsError::OutOfRange {
                    field,
                    value: value as f64,
                    min: min as f64,
                    max: max as f64,
                })
            }
        }

        positive("h", self.h)?;
        positive("rest_density", self.rest_density)?;
        non_negative("stiffness", self.stiffness)?;
        non_negative("viscosity", self.viscosity)?;
        finite("gravity", self.gravity)?;
        in_range("damping", self.damping, 0., 1., false)?;
        in_range("boundary_restitution", self.boundary_restitution, 0., 1., true)?;
        in_range("boundary_friction", self.boundary_friction, 0., 1., true)?;
        in_range("collision_restitution", self.collision_restitution, 0., 1., true)?;
        positive("particle_radius", self.particle_radius)?;
        non_negative("surface_tension", self.surface_tension)?;
        non_negative("interaction_radius", self.interaction_radius)?;
        finite("drag_strength", self.drag_strength)?;
        finite("spawn_velocity.x", self.spawn_velocity[0])?;
        finite("spawn_velocity.y", self.spawn_velocity[1])?;

        if self.substeps == 0 {
            return Err(ParamsError::Zero { field: "substeps" });
        }
        if self.collision_iterations == 0 {
            return Err(ParamsError::Zero {
                field: "collision_iterations",
            });
        }
        if self.spawn_rate > 0 && self.spawn_attempts == 0 {
            return Err(ParamsError::Zero { field: "spawn_attempts" });
        }

        for (field, [min, max]) in [("spawn_region.x", self.spawn_region.x), ("spawn_region.y", self.spawn_region.y)] {
            in_range(field, min, 0., 1., true)?;
            in_range(field, max, 0., 1., true)?;
            if min > max {
                return Err(ParamsError::InvertedRange {
                    field,
                    min: min as f64,
                    max: max as f64,
                });
            }
        }

        if let Some(max_dt) = self.max_dt {
            positive("max_dt", max_dt)?;
        }
        if let Some(max_speed) = self.max_speed {
            positive("max_speed", max_speed)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamsError {
    NotFinite {
        field: &'static str,
        value: f64,
    },
    NotPositive {
        field: &'static str,
        value: f64,
    },
    Negative {
        field: &'static str,
        value: f64,
    },
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    InvertedRange {
        field: &'static str,
        min: f64,
        max: f64,
    },
    Zero {
        field: &'static str,
    },
}

impl ParamsError {
    pub fn field(&self) -> &'static str {
        match self {
            ParamsError::NotFinite { field, .. }
            | ParamsError::NotPositive { field, .. }
            | ParamsError::Negative { field, .. }
            | ParamsError::OutOfRange { field, .. }
            | ParamsError::InvertedRange { field, .. }
            | ParamsError::Zero { field } => field,
        }
    }
}

impl fmt::Display for ParamsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamsError::NotFinite { field, value } => write!(f, "parameter `{}` must be finite (got {})", field, value),
            ParamsError::NotPositive { field, value } => {
                write!(f, "parameter `{}` must be greater than zero (got {})", field, value)
            }
            ParamsError::Negative { field, value } => {
                write!(f, "parameter `{}` must not be negative (got {})", field, value)
            }
            ParamsError::OutOfRange { field, value, min, max } => {
                write!(f, "parameter `{}` must be within [{}, {}] (got {})", field, min, max, value)
            }
            ParamsError::InvertedRange { field, min, max } => {
                write!(f, "range `{}` has min {} greater than max {}", field, min, max)
            }
            ParamsError::Zero { field } => write!(f, "parameter `{}` must be at least 1", field),
        }
    }
}

impl std::error::Error for ParamsError {}

#[derive(Debug, Clone, PartialEq)]
pub enum DomainError {
    InvalidExtent { width: f64, height: f64 },
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainError::InvalidExtent { width, height } => write!(
                f,
                "domain extent must be finite and greater than zero (got {}x{})",
                width, height
            ),
        }
    }
}

impl std::error::Error for DomainError {}

#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    Params(ParamsError),
    Domain(DomainError),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::Params(err) => write!(f, "invalid simulation parameters: {}", err),
            SimulationError::Domain(err) => write!(f, "invalid simulation domain: {}", err),
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Params(err) => Some(err),
            SimulationError::Domain(err) => Some(err),
        }
    }
}

impl From<ParamsError> for SimulationError {
    fn from(err: ParamsError) -> Self {
        SimulationError::Params(err)
    }
}

impl From<DomainError> for SimulationError {
    fn from(err: DomainError) -> Self {
        SimulationError::Domain(err)
    }
}

#[test]
fn default_params_are_valid() {
    assert_eq!(SimulationParams::default().validate(), Ok(()));
}

#[test]
fn invalid_params_are_rejected() {
    type Modify = fn(&mut SimulationParams);

    let cases: Vec<(&str, Modify)> = vec![
        ("h", |p: &mut SimulationParams| p.h = 0.),
        ("h", |p: &mut SimulationParams| p.h = -3.),
        ("h", |p: &mut SimulationParams| p.h = FT::NAN),
        ("rest_density", |p: &mut SimulationParams| p.rest_density = 0.),
        ("stiffness", |p: &mut SimulationParams| p.stiffness = -1.),
        ("viscosity", |p: &mut SimulationParams| p.viscosity = FT::INFINITY),
        ("damping", |p: &mut SimulationParams| p.damping = 0.),
        ("damping", |p: &mut SimulationParams| p.damping = 1.2),
        ("boundary_restitution", |p: &mut SimulationParams| p.boundary_restitution = 1.5),
        ("collision_restitution", |p: &mut SimulationParams| p.collision_restitution = -0.1),
        ("substeps", |p: &mut SimulationParams| p.substeps = 0),
        ("collision_iterations", |p: &mut SimulationParams| p.collision_iterations = 0),
        ("particle_radius", |p: &mut SimulationParams| p.particle_radius = 0.),
        ("spawn_region.x", |p: &mut SimulationParams| p.spawn_region.x = [0.7, 0.2]),
        ("spawn_region.y", |p: &mut SimulationParams| p.spawn_region.y = [0., 1.5]),
        ("max_dt", |p: &mut SimulationParams| p.max_dt = Some(0.)),
        ("max_speed", |p: &mut SimulationParams| p.max_speed = Some(-5.)),
    ];

    for (field, modify) in cases {
        let mut params = SimulationParams::default();
        modify(&mut params);
        let err = params.validate().expect_err(field);
        assert_eq!(err.field(), field, "{}", err);
    }
}

#[test]
fn params_yaml_uses_defaults_for_missing_fields() {
    let params: SimulationParams = serde_yaml::from_str("h: 20.0\nstiffness: 800.0\npressure_form: Averaged\n").unwrap();
    assert_eq!(params.h, 20.);
    assert_eq!(params.stiffness, 800.);
    assert_eq!(params.pressure_form, PressureForm::Averaged);
    assert_eq!(params.substeps, SimulationParams::default().substeps);
    assert_eq!(params.validate(), Ok(()));
}
