use log::{debug, warn};
use serde::{Deserialize, Serialize};

use splash_sph::{
    floating_type_mod::FT, vec2f, FluidSimulation, FluidSolverTrait, GridParams, Interaction, PointerForce, Solver,
    SolverKind, V2,
};

/// Rectangle filled with a regular lattice of particles at startup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParticleBlock {
    pub min: V2,
    pub max: V2,
    pub spacing: FT,
    pub radius: FT,
    #[serde(default = "V2::zeros")]
    pub velocity: V2,
}

/// Input replayed at a fixed frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScriptedInteraction {
    pub frame: usize,
    #[serde(default)]
    pub interaction: Option<Interaction>,
    #[serde(default)]
    pub pointer_force: Option<PointerForce>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub width: FT,
    pub height: FT,
    pub solver: SolverKind,
    pub grid: GridParams,
    pub frames: usize,
    pub dt: FT,
    pub particle_blocks: Vec<ParticleBlock>,
    pub interactions: Vec<ScriptedInteraction>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        SceneConfig {
            width: 800.,
            height: 600.,
            solver: SolverKind::Particles,
            grid: GridParams::default(),
            frames: 600,
            dt: 1. / 60.,
            particle_blocks: Vec::new(),
            interactions: Vec::new(),
        }
    }
}

/// Fill the block with particles. Returns how many were added before the capacity was reached.
pub fn add_particle_block(simulation: &mut FluidSimulation, block: &ParticleBlock) -> usize {
    if !(block.spacing > 0.) {
        warn!("ignoring particle block with spacing {}", block.spacing);
        return 0;
    }

    let extent = block.max - block.min;
    let nx = (extent.x / block.spacing).floor() as usize + 1;
    let ny = (extent.y / block.spacing).floor() as usize + 1;

    let mut added = 0;
    for y in 0..ny {
        for x in 0..nx {
            let position = block.min + vec2f(x as FT, y as FT) * block.spacing;
            match simulation.add_particle(position, block.velocity, block.radius) {
                Some(_) => added += 1,
                None => return added,
            }
        }
    }
    added
}

/// Feed all interactions scheduled for `frame` into the solver.
pub fn apply_scripted_interactions(solver: &mut Solver, interactions: &[ScriptedInteraction], frame: usize) {
    for scripted in interactions.iter().filter(|s| s.frame == frame) {
        match scripted.interaction {
            Some(Interaction::Drag { from, to }) => solver.apply_interaction(from, to),
            Some(Interaction::RadialImpulse {
                center,
                radius,
                strength,
            }) => solver.apply_radial_impulse(center, radius, strength),
            None => {}
        }

        if let Some(pointer_force) = scripted.pointer_force {
            match solver.as_particles_mut() {
                Some(simulation) => {
                    simulation.set_pointer_force(pointer_force.center, pointer_force.radius, pointer_force.force)
                }
                None => debug!("pointer force in frame {} ignored by grid solver", frame),
            }
        }
    }
}

#[test]
fn scene_yaml_with_interactions() {
    let yaml = r#"
width: 400
height: 300
frames: 10
particle_blocks:
  - min: [100, 100]
    max: [130, 120]
    spacing: 10
    radius: 4
interactions:
  - frame: 2
    interaction:
      RadialImpulse: { center: [200, 150], radius: 50, strength: 100 }
  - frame: 5
    pointer_force: { center: [110, 110], radius: 30, force: [0, -500] }
"#;
    let scene: SceneConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(scene.width, 400.);
    assert_eq!(scene.solver, SolverKind::Particles);
    assert_eq!(scene.dt, 1. / 60.);
    assert_eq!(scene.particle_blocks.len(), 1);
    assert_eq!(scene.particle_blocks[0].velocity, V2::zeros());
    assert_eq!(scene.interactions.len(), 2);
    assert!(matches!(
        scene.interactions[0].interaction,
        Some(Interaction::RadialImpulse { .. })
    ));
    assert!(scene.interactions[1].pointer_force.is_some());

    let params = splash_sph::SimulationParams::default().with_spawn_rate(0);
    let mut simulation = FluidSimulation::new(params, scene.width, scene.height).unwrap();
    // 4 x 3 lattice
    assert_eq!(add_particle_block(&mut simulation, &scene.particle_blocks[0]), 12);
}
