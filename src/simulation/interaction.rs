use serde::{Deserialize, Serialize};

use crate::{floating_type_mod::FT, particles::ParticleVec, V2};

/// Velocity perturbation requested by the input layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Interaction {
    /// Pointer dragged from `from` to `to` since the last step.
    Drag { from: V2, to: V2 },

    /// Outward kick around `center`, strongest at the center and zero at `radius`.
    RadialImpulse { center: V2, radius: FT, strength: FT },
}

/// External force with linear falloff, added by the force stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerForce {
    pub center: V2,
    pub radius: FT,
    pub force: V2,
}

impl PointerForce {
    pub fn force_at(&self, position: V2) -> V2 {
        if self.radius <= 0. {
            return V2::zeros();
        }
        let dist = (position - self.center).norm();
        if dist >= self.radius {
            return V2::zeros();
        }
        self.force * (1. - dist / self.radius)
    }
}

/// Closest distance between `p` and the segment `a`-`b`.
pub(crate) fn distance_to_segment(p: V2, a: V2, b: V2) -> FT {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq == 0. {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0., 1.);
    (p - (a + ab * t)).norm()
}

impl Interaction {
    /// Change the velocities of all affected particles. Returns the number of particles touched.
    ///
    /// `drag_radius` and `drag_strength` only apply to [`Interaction::Drag`].
    pub fn apply(&self, particles: &mut ParticleVec, drag_radius: FT, drag_strength: FT) -> usize {
        let mut affected = 0;

        match *self {
            Interaction::Drag { from, to } => {
                if drag_radius <= 0. {
                    return 0;
                }
                let delta = (to - from) * drag_strength;
                for (position, velocity) in particles.position.iter().zip(particles.velocity.iter_mut()) {
                    let dist = distance_to_segment(*position, from, to);
                    if dist < drag_radius {
                        *velocity += delta * (1. - dist / drag_radius);
                        affected += 1;
                    }
                }
            }
            Interaction::RadialImpulse {
                center,
                radius,
                strength,
            } => {
                for (position, velocity) in particles.position.iter().zip(particles.velocity.iter_mut()) {
                    let offset = *position - center;
                    let dist = offset.norm();
                    // the center itself has no outward direction
                    if dist > 0. && dist < radius {
                        *velocity += offset / dist * (strength * (1. - dist / radius));
                        affected += 1;
                    }
                }
            }
        }

        affected
    }
}

/// Interaction input for the next step. Newer requests replace older ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct InteractionState {
    pub pending: Option<Interaction>,
    pub pointer_force: Option<PointerForce>,
}

impl InteractionState {
    pub fn set_interaction(&mut self, interaction: Interaction) {
        self.pending = Some(interaction);
    }

    pub fn set_pointer_force(&mut self, pointer_force: PointerForce) {
        self.pointer_force = Some(pointer_force);
    }

    pub fn take_interaction(&mut self) -> Option<Interaction> {
        self.pending.take()
    }

    pub fn clear(&mut self) {
        *self = InteractionState::default();
    }
}

#[test]
fn drag_falls_off_with_distance_to_segment() {
    use crate::{assert_ft_approx_eq, vec2f};

    let mut particles = ParticleVec::default();
    particles.push(vec2f(50., 50.), V2::zeros(), 2.); // on the segment
    particles.push(vec2f(50., 60.), V2::zeros(), 2.); // 10 away
    particles.push(vec2f(50., 90.), V2::zeros(), 2.); // out of range
    particles.push(vec2f(10., 50.), V2::zeros(), 2.); // beyond the segment start, 20 away

    let drag = Interaction::Drag {
        from: vec2f(30., 50.),
        to: vec2f(70., 50.),
    };
    let affected = drag.apply(&mut particles, 20., 0.5);
    assert_eq!(affected, 2);

    assert_ft_approx_eq(particles.velocity[0].x, 20., 1e-5, || format!("on segment"));
    assert_ft_approx_eq(particles.velocity[1].x, 10., 1e-5, || format!("half falloff"));
    assert_eq!(particles.velocity[1].y, 0.);
    assert_eq!(particles.velocity[2], V2::zeros());
    assert_eq!(particles.velocity[3], V2::zeros());
}

#[test]
fn radial_impulse_pushes_outwards() {
    use crate::{assert_ft_approx_eq, vec2f};

    let mut particles = ParticleVec::default();
    particles.push(vec2f(100., 100.), V2::zeros(), 2.); // exactly at the center
    particles.push(vec2f(110., 100.), vec2f(1., 1.), 2.);
    particles.push(vec2f(100., 80.), V2::zeros(), 2.);
    particles.push(vec2f(100., 140.), V2::zeros(), 2.);

    let impulse = Interaction::RadialImpulse {
        center: vec2f(100., 100.),
        radius: 40.,
        strength: 8.,
    };
    let affected = impulse.apply(&mut particles, 0., 0.);
    assert_eq!(affected, 2);

    assert_eq!(particles.velocity[0], V2::zeros());
    assert_ft_approx_eq(particles.velocity[1].x, 1. + 8. * 0.75, 1e-5, || format!("right"));
    assert_ft_approx_eq(particles.velocity[1].y, 1., 1e-5, || format!("right, tangential"));
    assert_ft_approx_eq(particles.velocity[2].y, -8. * 0.5, 1e-5, || format!("up"));
    assert_eq!(particles.velocity[3], V2::zeros());
}

#[test]
fn pointer_force_is_linear_in_distance() {
    use crate::vec2f;

    let pointer = PointerForce {
        center: vec2f(0., 0.),
        radius: 10.,
        force: vec2f(0., -100.),
    };
    assert_eq!(pointer.force_at(vec2f(0., 0.)), vec2f(0., -100.));
    assert_eq!(pointer.force_at(vec2f(5., 0.)), vec2f(0., -50.));
    assert_eq!(pointer.force_at(vec2f(10., 0.)), V2::zeros());
}

#[test]
fn interaction_state_keeps_only_latest_request() {
    use crate::vec2f;

    let mut state = InteractionState::default();
    state.set_interaction(Interaction::Drag {
        from: vec2f(0., 0.),
        to: vec2f(1., 0.),
    });
    let last = Interaction::RadialImpulse {
        center: vec2f(5., 5.),
        radius: 3.,
        strength: 1.,
    };
    state.set_interaction(last);
    assert_eq!(state.take_interaction(), Some(last));
    assert_eq!(state.take_interaction(), None);

    state.set_pointer_force(PointerForce {
        center: vec2f(0., 0.),
        radius: 1.,
        force: vec2f(1., 0.),
    });
    state.clear();
    assert!(state.pointer_force.is_none());
}
