pub mod boundary_handler;
pub mod collision;
pub mod color_map;
pub mod concurrency;
pub mod counters;
pub mod grid_solver;
pub mod interaction;
pub mod neighborhood_search;
pub mod particles;
pub mod simulation_parameters;
pub mod solver;
pub mod spawner;
pub mod sph_kernels;
pub mod simulation;

#[cfg(feature = "double-precision")]
pub mod floating_type_mod {
    pub type FT = f64;
    pub use std::f64::consts::{FRAC_1_PI, PI, TAU};
}

#[cfg(not(feature = "double-precision"))]
pub mod floating_type_mod {
    pub type FT = f32;
    pub use std::f32::consts::{FRAC_1_PI, PI, TAU};
}

use floating_type_mod::FT;

use nalgebra::SVector;

pub type V<FT, const D: usize> = SVector<FT, D>;

pub type V2 = V<FT, 2>;
pub type V3 = V<FT, 3>;

#[allow(dead_code)]
pub type V2I = V<i32, 2>;

pub fn vec2f(x: FT, y: FT) -> V2 {
    [x, y].into()
}

pub fn vec3f(x: FT, y: FT, z: FT) -> V3 {
    [x, y, z].into()
}

pub use boundary_handler::Domain;
pub use grid_solver::{GridFluid, GridParams};
pub use interaction::{Interaction, PointerForce};
pub use particles::{ParticleRef, ParticleVec};
pub use simulation::*;
pub use simulation_parameters::{
    DomainError, ParamsError, PressureClamp, PressureForm, SimulationError, SimulationParams, SpatialIndexKind,
    SpawnRegion,
};
pub use solver::{FluidSolverTrait, Solver, SolverKind};
