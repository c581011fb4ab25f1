use std::fmt::Display;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info, trace, warn};
use num_traits::Float;

use crate::{
    boundary_handler::{BoundaryClamp, Domain},
    collision::CollisionResolver,
    concurrency::{par_iter_mut1, par_iter_mut2},
    counters::StepCounters,
    floating_type_mod::FT,
    interaction::{Interaction, InteractionState, PointerForce},
    neighborhood_search::SpatialIndex,
    particles::{ParticleRef, ParticleVec},
    simulation_parameters::{PressureClamp, PressureForm, SimulationError, SimulationParams},
    spawner::Spawner,
    sph_kernels::{poly6, poly6_gradient, poly6_laplacian, spiky_gradient, viscosity_laplacian},
    V2,
};

// densities at or below this value do not contribute to pressure and viscosity terms
const DENSITY_EPS: FT = 1e-12;

// color field gradients shorter than this are not considered part of the free surface
const SURFACE_NORMAL_EPS: FT = 1e-6;

pub struct FluidSimulation {
    params: SimulationParams,
    domain: Domain,
    particles: ParticleVec,
    force_stage: ForceStage,
    spawner: Spawner,
    interaction: InteractionState,
    counters: StepCounters,

    time: FT,
    step_number: usize,
}

impl FluidSimulation {
    /// Create an empty simulation. Fails if the parameters or the domain extent are invalid.
    pub fn new(params: SimulationParams, width: FT, height: FT) -> Result<FluidSimulation, SimulationError> {
        params.validate()?;
        let domain = Domain::new(width, height)?;

        Ok(FluidSimulation {
            params,
            domain,
            particles: ParticleVec::default(),
            force_stage: ForceStage::default(),
            spawner: Spawner::new(params.seed),
            interaction: InteractionState::default(),
            counters: StepCounters::new(false),
            time: 0.,
            step_number: 0,
        })
    }

    /// Remove all particles and restart the clock. A seeded spawner starts its sequence again.
    pub fn reset(&mut self) {
        info!("reset simulation ({} particles removed)", self.particles.len());
        self.particles.clear();
        self.spawner = Spawner::new(self.params.seed);
        self.interaction.clear();
        self.time = 0.;
        self.step_number = 0;
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// Replace the parameters. Particles beyond a lowered capacity are removed (newest first).
    pub fn set_params(&mut self, params: SimulationParams) -> Result<(), SimulationError> {
        params.validate()?;
        if params.seed != self.params.seed {
            self.spawner = Spawner::new(params.seed);
        }
        if self.particles.len() > params.max_particles {
            info!(
                "capacity lowered to {}, removing {} particles",
                params.max_particles,
                self.particles.len() - params.max_particles
            );
            self.particles.truncate(params.max_particles);
        }
        self.params = params;
        Ok(())
    }

    /// Change the domain extent. Particles outside of the new domain are clamped into it immediately.
    pub fn on_resize(&mut self, width: FT, height: FT) -> Result<(), SimulationError> {
        self.domain = Domain::new(width, height)?;
        let moved = self.boundary_clamp().apply(&mut self.particles, self.domain);
        info!("resize domain to {}x{} ({} particle contacts)", width, height, moved);
        Ok(())
    }

    /// Insert a particle. The position is clamped into the domain.
    ///
    /// Returns `None` if the simulation is at capacity or the radius is not a positive number.
    pub fn add_particle(&mut self, position: V2, velocity: V2, radius: FT) -> Option<usize> {
        if self.particles.len() >= self.params.max_particles || !(radius.is_finite() && radius > 0.) {
            return None;
        }
        let position = self.domain.clamp_position(position, radius);
        Some(self.particles.push(position, velocity, radius))
    }

    /// Pointer drag from `a` to `b`, applied at the beginning of the next step.
    pub fn apply_interaction(&mut self, a: V2, b: V2) {
        self.interaction.set_interaction(Interaction::Drag { from: a, to: b });
    }

    /// Outward velocity kick around `center`, applied at the beginning of the next step.
    pub fn apply_radial_impulse(&mut self, center: V2, radius: FT, strength: FT) {
        self.interaction.set_interaction(Interaction::RadialImpulse {
            center,
            radius,
            strength,
        });
    }

    /// External force acting during the next step only.
    pub fn set_pointer_force(&mut self, center: V2, radius: FT, force: V2) {
        self.interaction.set_pointer_force(PointerForce { center, radius, force });
    }

    pub fn particles(&self) -> &ParticleVec {
        &self.particles
    }

    pub fn particle(&self, i: usize) -> ParticleRef {
        self.particles.get(i)
    }

    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn time(&self) -> FT {
        self.time
    }

    pub fn step_number(&self) -> usize {
        self.step_number
    }

    pub fn counters(&self) -> &StepCounters {
        &self.counters
    }

    /// Enable or disable the stage timers. Previously recorded values are discarded.
    pub fn enable_counters(&mut self, enabled: bool) {
        self.counters = StepCounters::new(enabled);
    }

    fn boundary_clamp(&self) -> BoundaryClamp {
        BoundaryClamp {
            restitution: self.params.boundary_restitution,
            friction: self.params.boundary_friction,
        }
    }

    fn collision_resolver(&self) -> CollisionResolver {
        CollisionResolver {
            iterations: self.params.collision_iterations,
            restitution: self.params.collision_restitution,
            spatial_index: self.params.spatial_index,
        }
    }

    /// Advance the simulation by `dt` seconds. Non-positive or non-finite values are ignored.
    pub fn step(&mut self, dt: FT) {
        if !(dt.is_finite() && dt > 0.) {
            debug!("ignoring step with dt={}", dt);
            return;
        }
        let dt = match self.params.max_dt {
            Some(max_dt) => dt.min(max_dt),
            None => dt,
        };

        let params = self.params;
        let boundary_clamp = self.boundary_clamp();
        let collision_resolver = self.collision_resolver();

        self.counters.pcounters.begin("step");

        self.counters.pcounters.begin("spawn");
        let spawned = self.spawner.spawn(&mut self.particles, &params, self.domain);
        self.counters.pcounters.end("spawn");

        if let Some(interaction) = self.interaction.take_interaction() {
            let affected = interaction.apply(&mut self.particles, params.interaction_radius, params.drag_strength);
            trace!("{:?} affected {} particles", interaction, affected);
        }
        let pointer_force = self.interaction.pointer_force;

        let substep_dt = dt / params.substeps as FT;
        let mut contacts = 0;

        for _ in 0..params.substeps {
            let index = SpatialIndex::build(&self.particles.position, params.h, self.domain.extent(), params.spatial_index);

            self.counters.pcounters.begin("density");
            Self::calculate_densities_and_pressures(&mut self.particles, &index, &params);
            self.counters.pcounters.end("density");

            self.counters.pcounters.begin("forces");
            let dropped = self.force_stage.compute(&self.particles, &index, &params, pointer_force);
            self.counters.pcounters.end("forces");
            if dropped > 0 {
                warn!(
                    "dropped non-finite forces of {} particles in step {}",
                    dropped, self.step_number
                );
            }

            self.counters.pcounters.begin("integrate");
            Self::integrate(&mut self.particles, self.force_stage.forces(), &params, substep_dt);
            self.counters.pcounters.end("integrate");

            self.counters.pcounters.begin("collision");
            let statistics = collision_resolver.resolve(&mut self.particles, self.domain.extent());
            self.counters.pcounters.end("collision");
            contacts = statistics.contacts;

            self.counters.pcounters.begin("boundary");
            boundary_clamp.apply(&mut self.particles, self.domain);
            self.counters.pcounters.end("boundary");
        }

        self.interaction.clear();

        self.time += dt;
        self.step_number += 1;

        self.counters.pcounters.end("step");
        self.counters
            .vcounters
            .add_value("particle-count", self.particles.len() as FT);
        self.counters.vcounters.add_value("collision-contacts", contacts as FT);
        self.counters.vcounters.add_value("dt", dt);

        debug!(
            "step {} t={:.4} dt={:.5} particles={} spawned={} contacts={}",
            self.step_number,
            self.time,
            dt,
            self.particles.len(),
            spawned,
            contacts
        );
    }

    fn calculate_particle_density(
        i: usize,
        position: &[V2],
        mass: &[FT],
        index: &SpatialIndex,
        params: &SimulationParams,
    ) -> FT {
        let mut density_acc = 0.;
        for j in index.neighbor_candidates(position[i]) {
            if i == j && !params.density_self_contribution {
                continue;
            }
            let r = (position[i] - position[j]).norm();
            density_acc += mass[j] * poly6(r, params.h);
        }
        density_acc
    }

    fn pressure_from_density(density: FT, params: &SimulationParams) -> FT {
        let excess = density - params.rest_density;
        match params.pressure_clamp {
            PressureClamp::Clamped => params.stiffness * excess.max(0.),
            PressureClamp::Unclamped => params.stiffness * excess,
        }
    }

    fn calculate_densities_and_pressures(particles: &mut ParticleVec, index: &SpatialIndex, params: &SimulationParams) {
        let position = &particles.position;
        let mass = &particles.mass;

        par_iter_mut2(&mut particles.density, &mut particles.pressure, |i, p_density, p_pressure| {
            *p_density = Self::calculate_particle_density(i, position, mass, index, params);
            *p_pressure = Self::pressure_from_density(*p_density, params);
        });
    }

    /// Semi-implicit Euler with velocity damping.
    fn integrate(particles: &mut ParticleVec, forces: &[V2], params: &SimulationParams, dt: FT) {
        debug_assert_eq!(forces.len(), particles.len());

        let mass = &particles.mass;
        par_iter_mut1(&mut particles.velocity, |i, velocity| {
            *velocity += forces[i] / mass[i] * dt;
            if let Some(max_speed) = params.max_speed {
                let speed = velocity.norm();
                if speed > max_speed {
                    *velocity *= max_speed / speed;
                }
            }
        });

        let velocity = &particles.velocity;
        par_iter_mut1(&mut particles.position, |i, position| {
            *position += velocity[i] * dt;
        });

        par_iter_mut1(&mut particles.velocity, |_, velocity| {
            *velocity *= params.damping;
        });
    }
}

/// Accumulates the force on every particle. The force buffer is resized to the particle count on
/// every call and handed to the integrator afterwards.
#[derive(Default)]
struct ForceStage {
    forces: Vec<V2>,
}

impl ForceStage {
    fn forces(&self) -> &[V2] {
        &self.forces
    }

    /// Returns the number of particles whose force was not finite and has been replaced by zero.
    fn compute(
        &mut self,
        particles: &ParticleVec,
        index: &SpatialIndex,
        params: &SimulationParams,
        pointer_force: Option<PointerForce>,
    ) -> usize {
        self.forces.clear();
        self.forces.resize(particles.len(), V2::zeros());

        let num_dropped = AtomicUsize::new(0);

        par_iter_mut1(&mut self.forces, |i, force| {
            let mut f = Self::particle_force(i, particles, index, params);
            if let Some(pointer_force) = pointer_force {
                f += pointer_force.force_at(particles.position[i]);
            }

            if f.x.is_finite() && f.y.is_finite() {
                *force = f;
            } else {
                *force = V2::zeros();
                num_dropped.fetch_add(1, Ordering::Relaxed);
            }
        });

        num_dropped.load(Ordering::Relaxed)
    }

    fn particle_force(i: usize, particles: &ParticleVec, index: &SpatialIndex, params: &SimulationParams) -> V2 {
        let h = params.h;
        let position = &particles.position;
        let velocity = &particles.velocity;
        let mass = &particles.mass;
        let density = &particles.density;
        let pressure = &particles.pressure;

        let mut pressure_force = V2::zeros();
        let mut viscosity_force = V2::zeros();

        // color field
        let mut surface_normal = V2::zeros();
        let mut color_laplacian = 0.;

        for j in index.neighbor_candidates(position[i]) {
            if i == j {
                continue;
            }
            let x_ij = position[i] - position[j];
            let r = x_ij.norm();
            if r == 0. || r > h {
                continue;
            }
            let dir = x_ij / r;

            let pressure_term = match params.pressure_form {
                PressureForm::Symmetric => {
                    let term_i = if density[i] > DENSITY_EPS {
                        pressure[i] / (density[i] * density[i])
                    } else {
                        0.
                    };
                    let term_j = if density[j] > DENSITY_EPS {
                        pressure[j] / (density[j] * density[j])
                    } else {
                        0.
                    };
                    term_i + term_j
                }
                PressureForm::Averaged => {
                    if density[j] > DENSITY_EPS {
                        (pressure[i] + pressure[j]) / (2. * density[j])
                    } else {
                        0.
                    }
                }
            };
            pressure_force -= dir * (mass[j] * pressure_term * spiky_gradient(r, h));

            if density[j] > DENSITY_EPS {
                let volume_j = mass[j] / density[j];
                viscosity_force += (velocity[j] - velocity[i]) * (params.viscosity * volume_j * viscosity_laplacian(r, h));

                if params.surface_tension > 0. {
                    surface_normal += poly6_gradient(x_ij, h) * volume_j;
                    color_laplacian += volume_j * poly6_laplacian(r, h);
                }
            }
        }

        let mut force = params.gravity_vector() * mass[i] + pressure_force + viscosity_force;

        let normal_length = surface_normal.norm();
        if params.surface_tension > 0. && normal_length > SURFACE_NORMAL_EPS {
            force -= surface_normal * (params.surface_tension * color_laplacian / normal_length);
        }

        force
    }
}

pub fn is_ft_approx_eq<FT: Float>(a: FT, b: FT, tolerance: FT) -> bool {
    assert!(!a.is_nan());
    assert!(!b.is_nan());
    b <= a + tolerance && b >= a - tolerance
}

pub fn assert_ft_approx_eq<FT: Float + Display>(a: FT, b: FT, tolerance: FT, s: impl FnOnce() -> String) {
    if !is_ft_approx_eq(a, b, tolerance) {
        panic!(
            "{} value not equal with a tolerance of {}:\n\ta={}\n\tb={}\n",
            s(),
            tolerance,
            a,
            b
        );
    }
}

#[cfg(test)]
fn quiet_params() -> SimulationParams {
    SimulationParams::default().with_spawn_rate(0).with_seed(11)
}

#[test]
fn single_particle_falls_under_gravity() {
    use crate::vec2f;

    let params = SimulationParams {
        h: 20.,
        rest_density: 1000.,
        stiffness: 800.,
        viscosity: 250.,
        gravity: 300.,
        damping: 0.97,
        substeps: 1,
        ..quiet_params()
    };
    let mut simulation = FluidSimulation::new(params, 400., 400.).unwrap();
    simulation.add_particle(vec2f(100., 20.), V2::zeros(), 4.).unwrap();

    simulation.step(0.016);

    let p = simulation.particle(0);
    assert_eq!(p.position.x, 100.);
    assert!(p.position.y > 20.);
    assert_eq!(p.velocity.x, 0.);
    assert_ft_approx_eq(p.velocity.y, 300. * 0.016 * 0.97, 1e-4, || format!("vy after one step"));
    assert_eq!(p.pressure, 0.);
}

#[test]
fn lone_particle_density_is_self_term() {
    use crate::{sph_kernels::radius_to_area, vec2f};

    for self_contribution in [true, false] {
        let params = SimulationParams {
            h: 20.,
            density_self_contribution: self_contribution,
            ..quiet_params()
        };
        let mut simulation = FluidSimulation::new(params, 400., 400.).unwrap();
        simulation.add_particle(vec2f(100., 100.), V2::zeros(), 4.).unwrap();
        // far outside of the smoothing radius
        simulation.add_particle(vec2f(300., 300.), V2::zeros(), 4.).unwrap();
        simulation.step(0.01);

        let expected = if self_contribution {
            radius_to_area(4.) * poly6(0., 20.)
        } else {
            0.
        };
        let p = simulation.particle(0);
        assert_ft_approx_eq(p.density, expected, 1e-7, || format!("lone density ({})", self_contribution));
        assert!(p.density <= params.rest_density);
        assert_eq!(p.pressure, 0.);
    }
}

#[test]
fn unclamped_pressure_can_be_negative() {
    use crate::vec2f;

    let params = SimulationParams {
        pressure_clamp: PressureClamp::Unclamped,
        ..quiet_params()
    };
    let mut simulation = FluidSimulation::new(params, 400., 400.).unwrap();
    simulation.add_particle(vec2f(100., 100.), V2::zeros(), 1.).unwrap();
    simulation.step(0.01);
    assert!(simulation.particle(0).pressure < 0.);
}

#[test]
fn step_never_changes_particle_count() {
    use crate::vec2f;

    let mut simulation = FluidSimulation::new(quiet_params(), 300., 300.).unwrap();
    for y in 0..5 {
        for x in 0..10 {
            simulation
                .add_particle(vec2f(60. + x as FT * 9., 150. + y as FT * 9.), V2::zeros(), 4.)
                .unwrap();
        }
    }
    let mass = simulation.particles().total_mass();

    for _ in 0..30 {
        simulation.step(1. / 60.);
        assert_eq!(simulation.num_particles(), 50);
    }
    assert_ft_approx_eq(simulation.particles().total_mass(), mass, 1e-2, || format!("total mass"));
}

#[test]
fn spawner_fills_up_to_capacity_and_reset_clears() {
    let params = SimulationParams::default()
        .with_seed(5)
        .with_spawn_rate(4)
        .with_max_particles(10);
    let mut simulation = FluidSimulation::new(params, 400., 400.).unwrap();

    for _ in 0..10 {
        simulation.step(1. / 60.);
        assert!(simulation.num_particles() <= 10);
    }
    assert_eq!(simulation.num_particles(), 10);
    assert!(simulation.add_particle(crate::vec2f(10., 10.), V2::zeros(), 2.).is_none());

    simulation.reset();
    assert_eq!(simulation.num_particles(), 0);
    assert_eq!(simulation.time(), 0.);
    assert_eq!(simulation.step_number(), 0);
}

#[test]
fn lowering_capacity_removes_newest_particles() {
    use crate::vec2f;

    let params = quiet_params().with_max_particles(10);
    let mut simulation = FluidSimulation::new(params, 400., 400.).unwrap();
    for i in 0..10 {
        simulation
            .add_particle(vec2f(20. + i as FT * 30., 200.), V2::zeros(), 4.)
            .unwrap();
    }

    simulation.set_params(params.with_max_particles(3)).unwrap();
    assert_eq!(simulation.num_particles(), 3);
    assert_eq!(simulation.particle(2).position.x, 80.);

    simulation.step(1. / 60.);
    assert_eq!(simulation.num_particles(), 3);
    assert!(simulation.add_particle(vec2f(300., 300.), V2::zeros(), 4.).is_none());
}

#[test]
fn tiny_particles_and_huge_domains_step_without_fault() {
    use crate::vec2f;

    let mut simulation = FluidSimulation::new(quiet_params(), 800., 600.).unwrap();
    simulation.add_particle(vec2f(100., 100.), V2::zeros(), 0.02).unwrap();
    simulation.add_particle(vec2f(100.03, 100.), V2::zeros(), 0.02).unwrap();
    simulation.step(0.016);
    assert_eq!(simulation.num_particles(), 2);
    assert!(simulation.particle(0).position.y > 100.);

    let mut simulation = FluidSimulation::new(quiet_params(), 1e30, 1e30).unwrap();
    simulation.add_particle(vec2f(500., 500.), V2::zeros(), 4.).unwrap();
    simulation.step(0.01);
    assert_eq!(simulation.num_particles(), 1);
    assert!(simulation.particle(0).position.y > 500.);
}

#[test]
fn particles_stay_inside_domain() {
    let params = SimulationParams::default()
        .with_seed(1)
        .with_spawn_rate(6)
        .with_max_particles(150);
    let mut simulation = FluidSimulation::new(params, 200., 160.).unwrap();
    simulation.apply_radial_impulse(crate::vec2f(100., 20.), 60., 400.);

    for step in 0..200 {
        if step % 50 == 25 {
            simulation.apply_interaction(crate::vec2f(20., 100.), crate::vec2f(180., 40.));
        }
        simulation.step(1. / 60.);

        let domain = simulation.domain();
        for p in simulation.particles().iter() {
            assert!(p.position.x.is_finite() && p.position.y.is_finite());
            assert!(p.position.x >= p.radius && p.position.x <= domain.width - p.radius);
            assert!(p.position.y >= p.radius && p.position.y <= domain.height - p.radius);
        }
    }
    assert!(simulation.num_particles() > 0);
}

#[test]
fn symmetric_pressure_conserves_momentum() {
    use crate::vec2f;

    for pressure_form in [PressureForm::Symmetric, PressureForm::Averaged] {
        let params = SimulationParams {
            gravity: 0.,
            stiffness: 20000.,
            rest_density: 0.001,
            pressure_form,
            substeps: 1,
            ..quiet_params()
        };
        let mut simulation = FluidSimulation::new(params, 400., 400.).unwrap();
        // small radii, so the collision pass does not touch the pair
        simulation.add_particle(vec2f(195., 200.), V2::zeros(), 1.).unwrap();
        simulation.add_particle(vec2f(205., 200.), V2::zeros(), 1.).unwrap();

        simulation.step(0.01);

        let momentum = simulation.particles().total_momentum();
        assert_ft_approx_eq(momentum.x, 0., 1e-4, || format!("momentum x ({:?})", pressure_form));
        assert_ft_approx_eq(momentum.y, 0., 1e-4, || format!("momentum y ({:?})", pressure_form));

        // repulsion
        assert!(simulation.particle(0).velocity.x < 0.);
        assert!(simulation.particle(1).velocity.x > 0.);
    }
}

#[test]
fn viscosity_pulls_towards_neighbor_velocity() {
    use crate::vec2f;

    let params = SimulationParams {
        gravity: 0.,
        stiffness: 0.,
        viscosity: 250.,
        substeps: 1,
        ..quiet_params()
    };
    let mut simulation = FluidSimulation::new(params, 400., 400.).unwrap();
    simulation.add_particle(vec2f(195., 200.), vec2f(0., 10.), 1.).unwrap();
    simulation.add_particle(vec2f(205., 200.), vec2f(0., -10.), 1.).unwrap();

    let dt = 0.001;
    simulation.step(dt);

    // equal masses: dv_i = mu * (v_j - v_i) / rho_j * lap(r) * dt
    let density = simulation.particle(1).density;
    let dv = params.viscosity * 20. / density * viscosity_laplacian(10., params.h) * dt;
    assert!(dv > 1e-3, "viscosity change too small to be measured: {}", dv);

    let v0 = simulation.particle(0).velocity.y;
    let v1 = simulation.particle(1).velocity.y;
    assert_ft_approx_eq(v0, (10. - dv) * params.damping, 1e-4, || format!("v0"));
    assert_ft_approx_eq(v1, -(10. - dv) * params.damping, 1e-4, || format!("v1"));
    assert_ft_approx_eq(v0 - v1, (20. - 2. * dv) * params.damping, 1e-4, || {
        format!("relative velocity")
    });
}

#[test]
fn surface_tension_pulls_edge_particles_inwards() {
    use crate::vec2f;

    let params = SimulationParams {
        gravity: 0.,
        stiffness: 0.,
        viscosity: 0.,
        surface_tension: 1e5,
        substeps: 1,
        ..quiet_params()
    };
    let mut simulation = FluidSimulation::new(params, 400., 400.).unwrap();
    for x in 0..5 {
        simulation
            .add_particle(vec2f(180. + x as FT * 10., 200.), V2::zeros(), 1.)
            .unwrap();
    }

    simulation.step(0.001);

    // the outermost particles move towards the center of the row
    assert!(simulation.particle(0).velocity.x > 0.);
    assert!(simulation.particle(4).velocity.x < 0.);
}

#[test]
fn invalid_configuration_is_rejected() {
    let params = SimulationParams {
        h: 0.,
        ..SimulationParams::default()
    };
    assert!(matches!(
        FluidSimulation::new(params, 100., 100.),
        Err(SimulationError::Params(_))
    ));
    assert!(matches!(
        FluidSimulation::new(SimulationParams::default(), 0., 100.),
        Err(SimulationError::Domain(_))
    ));

    let mut simulation = FluidSimulation::new(SimulationParams::default(), 100., 100.).unwrap();
    assert!(simulation.set_params(params).is_err());
    assert_eq!(simulation.params().h, SimulationParams::default().h);
    assert!(simulation.on_resize(FT::NAN, 10.).is_err());
}

#[test]
fn invalid_dt_is_ignored_and_large_dt_is_clamped() {
    let mut simulation = FluidSimulation::new(quiet_params(), 100., 100.).unwrap();
    simulation.step(0.);
    simulation.step(-1.);
    simulation.step(FT::NAN);
    assert_eq!(simulation.step_number(), 0);
    assert_eq!(simulation.time(), 0.);

    simulation.step(1.);
    assert_eq!(simulation.step_number(), 1);
    assert_ft_approx_eq(simulation.time(), 1. / 60., 1e-6, || format!("clamped dt"));
}

#[test]
fn interaction_is_consumed_by_next_step() {
    use crate::vec2f;

    let params = SimulationParams {
        gravity: 0.,
        substeps: 1,
        ..quiet_params()
    };
    let mut simulation = FluidSimulation::new(params, 400., 400.).unwrap();
    simulation.add_particle(vec2f(210., 200.), V2::zeros(), 2.).unwrap();

    simulation.apply_radial_impulse(vec2f(200., 200.), 40., 100.);
    simulation.set_pointer_force(vec2f(210., 200.), 10., vec2f(0., 1000.));
    simulation.step(0.01);
    let after_first = simulation.particle(0).velocity;
    assert!(after_first.x > 0.);
    assert!(after_first.y > 0.);
    assert!(simulation.interaction.pending.is_none());
    assert!(simulation.interaction.pointer_force.is_none());

    simulation.step(0.01);
    let after_second = simulation.particle(0).velocity;
    // only damping acts on a lone particle
    assert_ft_approx_eq(after_second.x, after_first.x * params.damping, 1e-4, || format!("vx"));
    assert_ft_approx_eq(after_second.y, after_first.y * params.damping, 1e-4, || format!("vy"));
}

#[test]
fn non_finite_forces_are_dropped() {
    use crate::vec2f;

    let params = SimulationParams {
        max_speed: Some(50.),
        substeps: 1,
        ..quiet_params()
    };
    let mut simulation = FluidSimulation::new(params, 400., 400.).unwrap();
    simulation.add_particle(vec2f(100., 100.), V2::zeros(), 2.).unwrap();
    simulation.add_particle(vec2f(300., 100.), V2::zeros(), 2.).unwrap();

    simulation.set_pointer_force(vec2f(100., 100.), 10., vec2f(FT::INFINITY, 0.));
    simulation.step(0.01);
    assert_eq!(simulation.particle(0).velocity, V2::zeros());
    assert!(simulation.particle(1).velocity.y > 0.);

    // speed clamp
    simulation.apply_radial_impulse(vec2f(290., 100.), 40., 1e6);
    simulation.step(0.01);
    assert!(simulation.particle(1).velocity.norm() <= 50. * params.damping + 1e-3);
}

#[test]
fn resize_clamps_particles_into_new_domain() {
    use crate::vec2f;

    let mut simulation = FluidSimulation::new(quiet_params(), 400., 400.).unwrap();
    simulation.add_particle(vec2f(350., 350.), vec2f(5., 5.), 4.).unwrap();
    simulation.on_resize(200., 100.).unwrap();

    let p = simulation.particle(0);
    assert_eq!(p.position, vec2f(196., 96.));
    assert_eq!(simulation.domain(), Domain::new(200., 100.).unwrap());
}

#[test]
fn counters_record_stages_when_enabled() {
    let mut simulation = FluidSimulation::new(SimulationParams::default().with_seed(2), 200., 200.).unwrap();
    simulation.enable_counters(true);
    for _ in 0..3 {
        simulation.step(1. / 60.);
    }
    let counters = simulation.counters();
    for stage in ["spawn", "density", "forces", "integrate", "collision", "boundary", "step"] {
        assert!(counters.pcounters.total(stage).is_some(), "missing stage {}", stage);
    }
    assert!(counters.vcounters.avg("particle-count").is_some());
}
