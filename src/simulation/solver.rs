use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};

use crate::{
    floating_type_mod::FT,
    grid_solver::{GridFluid, GridParams},
    simulation::FluidSimulation,
    simulation_parameters::{SimulationError, SimulationParams},
    V2,
};

/// Common surface of all fluid solvers. Capabilities a solver does not support are no-ops.
#[enum_dispatch]
#[allow(unused_variables)]
pub trait FluidSolverTrait {
    fn reset(&mut self);

    fn step(&mut self, dt: FT);

    fn time(&self) -> FT;

    fn on_resize(&mut self, width: FT, height: FT) -> Result<(), SimulationError> {
        Ok(())
    }

    fn apply_interaction(&mut self, a: V2, b: V2) {}

    fn apply_radial_impulse(&mut self, center: V2, radius: FT, strength: FT) {}
}

impl FluidSolverTrait for FluidSimulation {
    fn reset(&mut self) {
        FluidSimulation::reset(self)
    }

    fn step(&mut self, dt: FT) {
        FluidSimulation::step(self, dt)
    }

    fn time(&self) -> FT {
        FluidSimulation::time(self)
    }

    fn on_resize(&mut self, width: FT, height: FT) -> Result<(), SimulationError> {
        FluidSimulation::on_resize(self, width, height)
    }

    fn apply_interaction(&mut self, a: V2, b: V2) {
        FluidSimulation::apply_interaction(self, a, b)
    }

    fn apply_radial_impulse(&mut self, center: V2, radius: FT, strength: FT) {
        FluidSimulation::apply_radial_impulse(self, center, radius, strength)
    }
}

impl FluidSolverTrait for GridFluid {
    fn reset(&mut self) {
        GridFluid::reset(self)
    }

    fn step(&mut self, dt: FT) {
        GridFluid::step(self, dt)
    }

    fn time(&self) -> FT {
        GridFluid::time(self)
    }

    fn on_resize(&mut self, width: FT, height: FT) -> Result<(), SimulationError> {
        GridFluid::on_resize(self, width, height)
    }

    fn apply_interaction(&mut self, a: V2, b: V2) {
        GridFluid::apply_interaction(self, a, b)
    }

    fn apply_radial_impulse(&mut self, center: V2, radius: FT, strength: FT) {
        GridFluid::apply_radial_impulse(self, center, radius, strength)
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SolverKind {
    Particles,
    Grid,
}

#[enum_dispatch(FluidSolverTrait)]
pub enum Solver {
    Particles(FluidSimulation),
    Grid(GridFluid),
}

impl Solver {
    pub fn new(
        kind: SolverKind,
        params: SimulationParams,
        grid_params: GridParams,
        width: FT,
        height: FT,
    ) -> Result<Solver, SimulationError> {
        Ok(match kind {
            SolverKind::Particles => FluidSimulation::new(params, width, height)?.into(),
            SolverKind::Grid => GridFluid::new(grid_params, width, height)?.into(),
        })
    }

    pub fn kind(&self) -> SolverKind {
        match self {
            Solver::Particles(_) => SolverKind::Particles,
            Solver::Grid(_) => SolverKind::Grid,
        }
    }

    pub fn as_particles(&self) -> Option<&FluidSimulation> {
        match self {
            Solver::Particles(simulation) => Some(simulation),
            Solver::Grid(_) => None,
        }
    }

    pub fn as_particles_mut(&mut self) -> Option<&mut FluidSimulation> {
        match self {
            Solver::Particles(simulation) => Some(simulation),
            Solver::Grid(_) => None,
        }
    }

    pub fn as_grid(&self) -> Option<&GridFluid> {
        match self {
            Solver::Grid(fluid) => Some(fluid),
            Solver::Particles(_) => None,
        }
    }
}

#[test]
fn solver_dispatches_to_particle_simulation() {
    use crate::vec2f;

    let params = SimulationParams::default().with_seed(4).with_spawn_rate(0);
    let mut solver = Solver::new(SolverKind::Particles, params, GridParams::default(), 200., 200.).unwrap();
    assert_eq!(solver.kind(), SolverKind::Particles);

    let simulation = solver.as_particles_mut().unwrap();
    simulation.add_particle(vec2f(100., 100.), V2::zeros(), 3.).unwrap();

    solver.apply_radial_impulse(vec2f(90., 100.), 30., 50.);
    solver.step(0.01);
    assert!(solver.time() > 0.);

    let simulation = solver.as_particles().unwrap();
    assert!(simulation.particle(0).velocity.x > 0.);

    solver.on_resize(50., 50.).unwrap();
    let p = solver.as_particles().unwrap().particle(0);
    assert!(p.position.x <= 47. && p.position.y <= 47.);

    solver.reset();
    assert_eq!(solver.as_particles().unwrap().num_particles(), 0);
}

#[test]
fn solver_dispatches_to_grid_fluid() {
    use crate::vec2f;

    let mut solver = Solver::new(
        SolverKind::Grid,
        SimulationParams::default(),
        GridParams {
            resolution: 16,
            ..GridParams::default()
        },
        160.,
        160.,
    )
    .unwrap();
    assert_eq!(solver.kind(), SolverKind::Grid);
    assert!(solver.as_particles().is_none());

    solver.apply_interaction(vec2f(20., 80.), vec2f(140., 80.));
    assert!(solver.as_grid().unwrap().total_dye() > 0.);
    solver.step(0.02);
    assert!(solver.time() > 0.);

    solver.reset();
    assert_eq!(solver.as_grid().unwrap().total_dye(), 0.);
}

#[test]
fn unsupported_capabilities_default_to_no_ops() {
    struct StillWater {
        time: FT,
    }

    impl FluidSolverTrait for StillWater {
        fn reset(&mut self) {
            self.time = 0.;
        }

        fn step(&mut self, dt: FT) {
            self.time += dt;
        }

        fn time(&self) -> FT {
            self.time
        }
    }

    let mut water = StillWater { time: 0. };
    assert!(water.on_resize(-1., -1.).is_ok());
    water.apply_interaction(V2::zeros(), V2::zeros());
    water.apply_radial_impulse(V2::zeros(), 1., 1.);
    water.step(0.5);
    assert_eq!(water.time(), 0.5);
}
