use crate::{
    floating_type_mod::FT, neighborhood_search::SpatialIndex, particles::ParticleVec,
    simulation_parameters::SpatialIndexKind, V2,
};

/// Iterative penalty/impulse pass enforcing non-penetration between particle disks.
///
/// Each iteration visits every pair closer than the sum of their radii once, pushes the pair apart
/// along the contact normal (heavier particles move less) and removes the approaching part of the
/// relative normal velocity with restitution `e`. Pairs are processed in place (Gauss-Seidel style),
/// so later pairs already see the corrected positions of earlier ones.
#[derive(Debug, Clone, Copy)]
pub struct CollisionResolver {
    pub iterations: usize,
    pub restitution: FT,
    pub spatial_index: SpatialIndexKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionStatistics {
    // overlapping pairs found in the last iteration
    pub contacts: usize,
    // pairs skipped because both centers coincide
    pub coincident: usize,
}

impl CollisionResolver {
    pub fn resolve(&self, particles: &mut ParticleVec, domain_extent: V2) -> CollisionStatistics {
        let mut statistics = CollisionStatistics::default();

        let max_radius = particles.max_radius();
        if particles.len() < 2 || max_radius <= 0. {
            return statistics;
        }

        let mut candidates = Vec::new();

        for _ in 0..self.iterations {
            statistics = CollisionStatistics::default();

            // any overlapping pair is closer than twice the largest radius
            let index = SpatialIndex::build(&particles.position, 2. * max_radius, domain_extent, self.spatial_index);

            for i in 0..particles.len() {
                candidates.clear();
                // every unordered pair once
                candidates.extend(index.neighbor_candidates(particles.position[i]).filter(|&j| j > i));

                for &j in &candidates {
                    match resolve_pair(particles, i, j, self.restitution) {
                        PairResult::Separated => {}
                        PairResult::Resolved => statistics.contacts += 1,
                        PairResult::Coincident => statistics.coincident += 1,
                    }
                }
            }

            if statistics.contacts == 0 {
                break;
            }
        }

        statistics
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairResult {
    Separated,
    Resolved,
    Coincident,
}

fn resolve_pair(particles: &mut ParticleVec, i: usize, j: usize, restitution: FT) -> PairResult {
    let x_ij = particles.position[i] - particles.position[j];
    let min_dist = particles.radius[i] + particles.radius[j];

    let dist_sq = x_ij.norm_squared();
    if dist_sq >= min_dist * min_dist {
        return PairResult::Separated;
    }
    if dist_sq == 0. {
        // no contact normal; a later frame separates them
        return PairResult::Coincident;
    }

    let dist = dist_sq.sqrt();
    let normal = x_ij / dist;

    let m_i = particles.mass[i];
    let m_j = particles.mass[j];
    let total_mass = m_i + m_j;

    let overlap = min_dist - dist;
    particles.position[i] += normal * (overlap * m_j / total_mass);
    particles.position[j] -= normal * (overlap * m_i / total_mass);

    let v_ij = particles.velocity[i] - particles.velocity[j];
    let approach = v_ij.dot(&normal);
    if approach < 0. {
        let impulse = (1. + restitution) * approach / (1. / m_i + 1. / m_j);
        particles.velocity[i] -= normal * (impulse / m_i);
        particles.velocity[j] += normal * (impulse / m_j);
    }

    PairResult::Resolved
}

#[cfg(test)]
fn resolver(iterations: usize, restitution: FT) -> CollisionResolver {
    CollisionResolver {
        iterations,
        restitution,
        spatial_index: SpatialIndexKind::Dense,
    }
}

#[test]
fn overlapping_pair_is_pushed_apart_symmetrically() {
    use crate::{assert_ft_approx_eq, vec2f};

    let mut particles = ParticleVec::default();
    particles.push(vec2f(100., 100.), V2::zeros(), 8.);
    particles.push(vec2f(101., 100.), V2::zeros(), 8.);
    let midpoint = (particles.position[0] + particles.position[1]) * 0.5;

    let statistics = resolver(1, 0.5).resolve(&mut particles, vec2f(400., 400.));
    assert_eq!(statistics.contacts, 1);

    let separation = (particles.position[1] - particles.position[0]).norm();
    assert_ft_approx_eq(separation, 16., 1e-3, || format!("separation after one iteration"));

    let new_midpoint = (particles.position[0] + particles.position[1]) * 0.5;
    assert_ft_approx_eq(new_midpoint.x, midpoint.x, 1e-4, || format!("midpoint x"));
    assert_ft_approx_eq(new_midpoint.y, midpoint.y, 1e-4, || format!("midpoint y"));

    // equal masses move by the same amount
    let d0 = (particles.position[0] - vec2f(100., 100.)).norm();
    let d1 = (particles.position[1] - vec2f(101., 100.)).norm();
    assert_ft_approx_eq(d0, d1, 1e-4, || format!("displacements"));

    // no velocity without approach
    assert_eq!(particles.velocity[0], V2::zeros());
    assert_eq!(particles.velocity[1], V2::zeros());
}

#[test]
fn heavier_particle_moves_less() {
    use crate::vec2f;

    let mut particles = ParticleVec::default();
    particles.push(vec2f(50., 50.), V2::zeros(), 2.);
    particles.push(vec2f(56., 50.), V2::zeros(), 6.);

    resolver(1, 0.).resolve(&mut particles, vec2f(200., 200.));

    let d_light = (particles.position[0] - vec2f(50., 50.)).norm();
    let d_heavy = (particles.position[1] - vec2f(56., 50.)).norm();
    assert!(d_light > d_heavy);
    // masses are proportional to r^2: 4 vs 36
    crate::assert_ft_approx_eq(d_light / d_heavy, 9., 1e-2, || format!("displacement ratio"));
}

#[test]
fn head_on_impulse_uses_restitution() {
    use crate::{assert_ft_approx_eq, vec2f};

    for restitution in [0., 0.3, 1.] {
        let mut particles = ParticleVec::default();
        particles.push(vec2f(100., 100.), vec2f(5., 0.), 8.);
        particles.push(vec2f(110., 100.), vec2f(-3., 0.), 8.);

        let normal = (particles.position[0] - particles.position[1]).normalize();
        let before = (particles.velocity[0] - particles.velocity[1]).dot(&normal);
        assert!(before < 0.);
        let momentum_before = particles.total_momentum();

        resolver(1, restitution).resolve(&mut particles, vec2f(400., 400.));

        let after = (particles.velocity[0] - particles.velocity[1]).dot(&normal);
        assert_ft_approx_eq(after, -restitution * before, 1e-4, || {
            format!("relative normal velocity with e={}", restitution)
        });

        let momentum_after = particles.total_momentum();
        assert_ft_approx_eq(momentum_after.x, momentum_before.x, 1e-2, || format!("momentum"));
    }
}

#[test]
fn separating_pair_keeps_velocity() {
    use crate::vec2f;

    let mut particles = ParticleVec::default();
    particles.push(vec2f(100., 100.), vec2f(-2., 0.), 8.);
    particles.push(vec2f(110., 100.), vec2f(2., 0.), 8.);

    resolver(1, 0.5).resolve(&mut particles, vec2f(400., 400.));
    assert_eq!(particles.velocity[0], vec2f(-2., 0.));
    assert_eq!(particles.velocity[1], vec2f(2., 0.));
}

#[test]
fn coincident_particles_are_skipped() {
    use crate::vec2f;

    let mut particles = ParticleVec::default();
    particles.push(vec2f(30., 30.), vec2f(1., 0.), 4.);
    particles.push(vec2f(30., 30.), vec2f(-1., 0.), 4.);

    let statistics = resolver(3, 0.5).resolve(&mut particles, vec2f(100., 100.));
    assert_eq!(statistics.coincident, 1);
    assert_eq!(statistics.contacts, 0);
    assert!(particles.position.iter().all(|p| p.x.is_finite() && p.y.is_finite()));
    assert!(particles.velocity.iter().all(|v| v.x.is_finite() && v.y.is_finite()));
}

#[test]
fn dense_packing_is_relaxed() {
    use crate::vec2f;

    fn max_penetration(particles: &ParticleVec) -> FT {
        let mut max = 0.;
        for i in 0..particles.len() {
            for j in i + 1..particles.len() {
                let d = (particles.position[i] - particles.position[j]).norm();
                max = FT::max(max, particles.radius[i] + particles.radius[j] - d);
            }
        }
        max
    }

    let build = || {
        let mut particles = ParticleVec::default();
        for y in 0..8 {
            for x in 0..8 {
                // spacing 6 for radius 4 (minimum distance 8)
                particles.push(vec2f(100. + x as FT * 6., 100. + y as FT * 6. + x as FT * 0.01), V2::zeros(), 4.);
            }
        }
        particles
    };

    let initial = max_penetration(&build());
    crate::assert_ft_approx_eq(initial, 2., 1e-3, || format!("initial penetration"));

    let mut particles = build();
    resolver(40, 0.).resolve(&mut particles, vec2f(400., 400.));
    let remaining = max_penetration(&particles);
    assert!(remaining < 0.25, "remaining penetration {}", remaining);
}
