use nalgebra::zero;

use crate::{floating_type_mod::FT, sph_kernels::radius_to_area, V2};

macro_rules! decl_particle_vec {
    (pub struct $struct_name:ident { $(pub $field_name:ident: Vec<$field_type:ty> | $default_value:expr),*$(,)?  }) => {
        /// Structure-of-arrays particle storage. All vectors always have the same length.
        #[derive(Clone, Debug, Default)]
        pub struct $struct_name {
            $(
                pub $field_name : Vec<$field_type>,
            )*
        }

        impl $struct_name {
            pub fn clear(&mut self) {
                $(
                    self.$field_name.clear();
                )*
            }

            pub fn truncate(&mut self, len: usize) {
                $(
                    self.$field_name.truncate(len);
                )*
            }

            pub fn extend(&mut self, num_elements: usize) {
                $(
                    self.$field_name.extend((0..num_elements).map::<$field_type, _>(|_| $default_value));
                )*
            }
        }
    }
}

decl_particle_vec! {
    pub struct ParticleVec {
        pub position: Vec<V2> | zero(),
        pub velocity: Vec<V2> | zero(),

        // fixed at creation
        pub radius: Vec<FT> | 0.,
        pub mass: Vec<FT> | 0.,

        // latest snapshot, recomputed every (sub)step
        pub density: Vec<FT> | 0.,
        pub pressure: Vec<FT> | 0.,
    }
}

/// Read-only view on a single particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleRef {
    pub position: V2,
    pub velocity: V2,
    pub radius: FT,
    pub mass: FT,
    pub density: FT,
    pub pressure: FT,
}

impl ParticleVec {
    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// Append a particle. The mass is the area of the particle disk.
    pub fn push(&mut self, position: V2, velocity: V2, radius: FT) -> usize {
        assert!(radius > 0., "particle radius must be positive");
        let idx = self.len();
        self.extend(1);
        self.position[idx] = position;
        self.velocity[idx] = velocity;
        self.radius[idx] = radius;
        self.mass[idx] = radius_to_area(radius);
        idx
    }

    pub fn get(&self, i: usize) -> ParticleRef {
        ParticleRef {
            position: self.position[i],
            velocity: self.velocity[i],
            radius: self.radius[i],
            mass: self.mass[i],
            density: self.density[i],
            pressure: self.pressure[i],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = ParticleRef> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    pub fn max_radius(&self) -> FT {
        self.radius.iter().cloned().fold(0., FT::max)
    }

    pub fn total_mass(&self) -> FT {
        self.mass.iter().sum()
    }

    pub fn total_momentum(&self) -> V2 {
        self.mass
            .iter()
            .zip(self.velocity.iter())
            .fold(V2::zeros(), |acc, (&m, &v)| acc + v * m)
    }
}

#[test]
fn push_derives_mass_from_radius() {
    use crate::{floating_type_mod::PI, vec2f};

    let mut particles = ParticleVec::default();
    assert!(particles.is_empty());

    let i = particles.push(vec2f(1., 2.), vec2f(3., 4.), 2.);
    let j = particles.push(vec2f(5., 6.), vec2f(0., 0.), 8.);
    assert_eq!((i, j), (0, 1));
    assert_eq!(particles.len(), 2);
    assert_eq!(particles.density.len(), 2);

    let p = particles.get(0);
    assert_eq!(p.position, vec2f(1., 2.));
    assert_eq!(p.velocity, vec2f(3., 4.));
    crate::assert_ft_approx_eq(p.mass, PI * 4., 1e-5, || format!("mass of radius 2"));
    assert_eq!(particles.max_radius(), 8.);

    particles.clear();
    assert_eq!(particles.len(), 0);
    assert_eq!(particles.mass.len(), 0);
}
