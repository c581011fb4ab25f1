use serde::{Deserialize, Serialize};

use crate::{
    floating_type_mod::FT, particles::ParticleVec, simulation_parameters::DomainError, vec2f, V2,
};

/// Rectangular simulation domain `[0, width] x [0, height]`. The y axis points downwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub width: FT,
    pub height: FT,
}

impl Domain {
    pub fn new(width: FT, height: FT) -> Result<Domain, DomainError> {
        if !(width.is_finite() && height.is_finite() && width > 0. && height > 0.) {
            return Err(DomainError::InvalidExtent {
                width: width as f64,
                height: height as f64,
            });
        }
        Ok(Domain { width, height })
    }

    pub fn extent(&self) -> V2 {
        vec2f(self.width, self.height)
    }

    /// Whether a disk of the given radius lies completely inside the domain.
    pub fn contains(&self, position: V2, radius: FT) -> bool {
        let (min, max) = self.allowed_range(radius);
        position.x >= min.x && position.x <= max.x && position.y >= min.y && position.y <= max.y
    }

    /// Nearest position at which a disk of `radius` lies inside the domain.
    pub fn clamp_position(&self, position: V2, radius: FT) -> V2 {
        let (min, max) = self.allowed_range(radius);
        vec2f(position.x.clamp(min.x, max.x), position.y.clamp(min.y, max.y))
    }

    /// Range of allowed centers for a disk with `radius`. If the disk is wider than the domain
    /// both bounds collapse onto the domain center.
    fn allowed_range(&self, radius: FT) -> (V2, V2) {
        let min_x = radius.min(self.width * 0.5);
        let min_y = radius.min(self.height * 0.5);
        (vec2f(min_x, min_y), vec2f(self.width - min_x, self.height - min_y))
    }
}

/// Boundary response coefficients.
#[derive(Debug, Clone, Copy)]
pub struct BoundaryClamp {
    // fraction of the normal velocity kept (and reversed) on wall contact
    pub restitution: FT,
    // fraction of the tangential velocity removed on floor contact
    pub friction: FT,
}

impl BoundaryClamp {
    /// Clamp every particle into the domain and reflect the velocity component pointing into the wall.
    /// Returns the number of wall contacts.
    pub fn apply(&self, particles: &mut ParticleVec, domain: Domain) -> usize {
        let mut contacts = 0;

        for i in 0..particles.len() {
            let (min, max) = domain.allowed_range(particles.radius[i]);
            let position = &mut particles.position[i];
            let velocity = &mut particles.velocity[i];

            for d in 0..2 {
                if position[d] < min[d] {
                    position[d] = min[d];
                    if velocity[d] < 0. {
                        velocity[d] = -velocity[d] * self.restitution;
                    }
                    contacts += 1;
                } else if position[d] > max[d] {
                    position[d] = max[d];
                    if velocity[d] > 0. {
                        velocity[d] = -velocity[d] * self.restitution;
                    }
                    contacts += 1;

                    // floor contact (y points downwards)
                    if d == 1 {
                        velocity.x *= 1. - self.friction;
                    }
                }
            }
        }

        contacts
    }
}

#[test]
fn clamp_reflects_velocity_into_wall() {
    let domain = Domain::new(100., 50.).unwrap();
    let clamp = BoundaryClamp {
        restitution: 0.5,
        friction: 0.1,
    };

    let mut particles = ParticleVec::default();
    particles.push(vec2f(-3., 25.), vec2f(-10., 0.), 2.);
    particles.push(vec2f(40., 55.), vec2f(8., 20.), 4.);
    particles.push(vec2f(50., 25.), vec2f(1., 1.), 2.);

    let contacts = clamp.apply(&mut particles, domain);
    assert_eq!(contacts, 2);

    assert_eq!(particles.position[0], vec2f(2., 25.));
    assert_eq!(particles.velocity[0], vec2f(5., 0.));

    assert_eq!(particles.position[1], vec2f(40., 46.));
    crate::assert_ft_approx_eq(particles.velocity[1].y, -10., 1e-5, || format!("floor restitution"));
    crate::assert_ft_approx_eq(particles.velocity[1].x, 7.2, 1e-5, || format!("floor friction"));

    // untouched
    assert_eq!(particles.position[2], vec2f(50., 25.));
    assert_eq!(particles.velocity[2], vec2f(1., 1.));
}

#[test]
fn clamp_keeps_velocity_moving_away_from_wall() {
    let domain = Domain::new(100., 100.).unwrap();
    let clamp = BoundaryClamp {
        restitution: 0.5,
        friction: 0.,
    };

    let mut particles = ParticleVec::default();
    particles.push(vec2f(0.5, 50.), vec2f(3., 0.), 1.);
    clamp.apply(&mut particles, domain);
    assert_eq!(particles.position[0], vec2f(1., 50.));
    assert_eq!(particles.velocity[0], vec2f(3., 0.));
}

#[test]
fn invalid_domains_are_rejected() {
    assert!(Domain::new(0., 10.).is_err());
    assert!(Domain::new(10., -1.).is_err());
    assert!(Domain::new(FT::NAN, 10.).is_err());
    assert!(Domain::new(FT::INFINITY, 10.).is_err());
    assert!(Domain::new(1., 1.).is_ok());
}
