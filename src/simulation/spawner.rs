use log::trace;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    boundary_handler::Domain, floating_type_mod::FT, particles::ParticleVec, simulation_parameters::SimulationParams,
    vec2f, V2,
};

/// Injects particles into the spawn band until the capacity is reached.
pub struct Spawner {
    rng: StdRng,
}

impl Spawner {
    /// A seeded spawner produces the same sequence of positions on every run.
    pub fn new(seed: Option<u64>) -> Spawner {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Spawner { rng }
    }

    /// Spawn up to `spawn_rate` particles. Each particle gets `spawn_attempts` tries to find a
    /// position that does not overlap an existing particle; if all tries fail, spawning stops for
    /// this call. Returns the number of new particles.
    pub fn spawn(&mut self, particles: &mut ParticleVec, params: &SimulationParams, domain: Domain) -> usize {
        let radius = params.particle_radius;
        let region = params.spawn_region;
        let mut spawned = 0;

        for _ in 0..params.spawn_rate {
            if particles.len() >= params.max_particles {
                break;
            }

            let mut placed = false;
            for _ in 0..params.spawn_attempts {
                let fraction = vec2f(
                    self.rng.gen_range(region.x[0]..=region.x[1]),
                    self.rng.gen_range(region.y[0]..=region.y[1]),
                );
                let position = domain.clamp_position(fraction.component_mul(&domain.extent()), radius);

                if !overlaps_any(particles, position, radius) {
                    particles.push(position, params.spawn_velocity(), radius);
                    placed = true;
                    break;
                }
            }

            if !placed {
                trace!("spawn region is crowded, stopping after {} particles", spawned);
                break;
            }
            spawned += 1;
        }

        spawned
    }
}

fn overlaps_any(particles: &ParticleVec, position: V2, radius: FT) -> bool {
    particles
        .position
        .iter()
        .zip(particles.radius.iter())
        .any(|(other, &other_radius)| (position - other).norm_squared() < (radius + other_radius).powi(2))
}

#[cfg(test)]
fn spawn_params() -> SimulationParams {
    SimulationParams::default()
        .with_seed(3)
        .with_spawn_rate(5)
        .with_max_particles(12)
}

#[test]
fn spawner_respects_capacity() {
    let params = spawn_params();
    let domain = Domain::new(400., 400.).unwrap();
    let mut spawner = Spawner::new(params.seed);
    let mut particles = ParticleVec::default();

    assert_eq!(spawner.spawn(&mut particles, &params, domain), 5);
    assert_eq!(spawner.spawn(&mut particles, &params, domain), 5);
    assert_eq!(spawner.spawn(&mut particles, &params, domain), 2);
    assert_eq!(spawner.spawn(&mut particles, &params, domain), 0);
    assert_eq!(particles.len(), 12);
}

#[test]
fn spawned_particles_lie_in_region_without_overlap() {
    let params = spawn_params().with_max_particles(40).with_spawn_rate(40);
    let domain = Domain::new(800., 600.).unwrap();
    let mut particles = ParticleVec::default();
    Spawner::new(params.seed).spawn(&mut particles, &params, domain);
    assert!(!particles.is_empty());

    let r = params.particle_radius;
    for p in particles.iter() {
        assert_eq!(p.radius, r);
        assert_eq!(p.velocity, params.spawn_velocity());
        assert!(p.position.x >= 0.35 * 800. - 1e-3 && p.position.x <= 0.65 * 800. + 1e-3);
        assert!(p.position.y >= r && p.position.y <= 0.12 * 600. + 1e-3);
    }

    for i in 0..particles.len() {
        for j in i + 1..particles.len() {
            let d = (particles.position[i] - particles.position[j]).norm();
            assert!(d >= 2. * r, "spawned particles {} and {} overlap", i, j);
        }
    }
}

#[test]
fn seeded_spawner_is_deterministic() {
    let params = spawn_params();
    let domain = Domain::new(400., 300.).unwrap();

    let run = || {
        let mut particles = ParticleVec::default();
        Spawner::new(params.seed).spawn(&mut particles, &params, domain);
        particles.position
    };
    assert_eq!(run(), run());
}

#[test]
fn crowded_region_stops_spawning() {
    use crate::simulation_parameters::SpawnRegion;

    let mut params = spawn_params().with_spawn_rate(10).with_max_particles(100);
    // a single spawn point
    params.spawn_region = SpawnRegion {
        x: [0.5, 0.5],
        y: [0.5, 0.5],
    };
    let domain = Domain::new(100., 100.).unwrap();
    let mut particles = ParticleVec::default();

    let mut spawner = Spawner::new(params.seed);
    assert_eq!(spawner.spawn(&mut particles, &params, domain), 1);
    assert_eq!(spawner.spawn(&mut particles, &params, domain), 0);
    assert_eq!(particles.position[0], vec2f(50., 50.));
}
