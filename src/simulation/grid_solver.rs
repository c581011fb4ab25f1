/*!
Eulerian "stable fluids" solver on a fixed grid.

The grid has `resolution x resolution` interior cells plus one layer of boundary cells. Velocities
are stored in domain fractions per second, so the solver is independent of the domain extent in
pixels; the extent only matters for converting pointer input and for reading velocities back.
*/

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    boundary_handler::Domain,
    floating_type_mod::FT,
    interaction::distance_to_segment,
    simulation_parameters::{ParamsError, SimulationError},
    vec2f, V2,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridParams {
    // interior cells per side
    pub resolution: usize,
    pub diffusion: FT,
    pub viscosity: FT,
    // Gauss-Seidel iterations for diffusion and pressure projection
    pub solver_iterations: usize,
    // dye kept per step
    pub dye_dissipation: FT,
    // radius of pointer splats in pixels
    pub splat_radius: FT,
    pub force_scale: FT,
}

impl Default for GridParams {
    fn default() -> Self {
        GridParams {
            resolution: 64,
            diffusion: 0.0001,
            viscosity: 0.0001,
            solver_iterations: 20,
            dye_dissipation: 0.995,
            splat_radius: 24.,
            force_scale: 5.,
        }
    }
}

impl GridParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.resolution < 4 {
            return Err(ParamsError::OutOfRange {
                field: "grid.resolution",
                value: self.resolution as f64,
                min: 4.,
                max: f64::INFINITY,
            });
        }
        if self.solver_iterations == 0 {
            return Err(ParamsError::Zero {
                field: "grid.solver_iterations",
            });
        }
        for (field, value) in [
            ("grid.diffusion", self.diffusion),
            ("grid.viscosity", self.viscosity),
            ("grid.splat_radius", self.splat_radius),
            ("grid.force_scale", self.force_scale),
        ] {
            if !value.is_finite() {
                return Err(ParamsError::NotFinite {
                    field,
                    value: value as f64,
                });
            }
            if value < 0. {
                return Err(ParamsError::Negative {
                    field,
                    value: value as f64,
                });
            }
        }
        let dissipation = self.dye_dissipation;
        if !(dissipation.is_finite() && dissipation > 0. && dissipation <= 1.) {
            return Err(ParamsError::OutOfRange {
                field: "grid.dye_dissipation",
                value: dissipation as f64,
                min: 0.,
                max: 1.,
            });
        }
        Ok(())
    }
}

/// Which boundary condition a field gets: velocity components are mirrored at the walls they
/// point into, everything else is copied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Boundary {
    Scalar,
    VelocityX,
    VelocityY,
}

/// Square scalar field including the boundary layer.
#[derive(Clone, Debug)]
struct Field {
    n: usize,
    values: Vec<FT>,
}

impl Field {
    fn new(n: usize) -> Field {
        Field {
            n,
            values: vec![0.; n * n],
        }
    }

    #[inline(always)]
    fn get(&self, i: usize, j: usize) -> FT {
        self.values[i + self.n * j]
    }

    #[inline(always)]
    fn set(&mut self, i: usize, j: usize, v: FT) {
        self.values[i + self.n * j] = v;
    }

    fn fill(&mut self, v: FT) {
        self.values.iter_mut().for_each(|x| *x = v);
    }

    fn set_boundary(&mut self, boundary: Boundary) {
        let n = self.n;
        for i in 1..n - 1 {
            let top = self.get(i, 1);
            let bottom = self.get(i, n - 2);
            let mirror = boundary == Boundary::VelocityY;
            self.set(i, 0, if mirror { -top } else { top });
            self.set(i, n - 1, if mirror { -bottom } else { bottom });
        }
        for j in 1..n - 1 {
            let left = self.get(1, j);
            let right = self.get(n - 2, j);
            let mirror = boundary == Boundary::VelocityX;
            self.set(0, j, if mirror { -left } else { left });
            self.set(n - 1, j, if mirror { -right } else { right });
        }

        self.set(0, 0, 0.5 * (self.get(1, 0) + self.get(0, 1)));
        self.set(0, n - 1, 0.5 * (self.get(1, n - 1) + self.get(0, n - 2)));
        self.set(n - 1, 0, 0.5 * (self.get(n - 2, 0) + self.get(n - 1, 1)));
        self.set(n - 1, n - 1, 0.5 * (self.get(n - 2, n - 1) + self.get(n - 1, n - 2)));
    }

    fn interior_sum(&self) -> FT {
        let n = self.n;
        (1..n - 1)
            .flat_map(|j| (1..n - 1).map(move |i| (i, j)))
            .map(|(i, j)| self.get(i, j))
            .sum()
    }
}

/// Gauss-Seidel iterations for `c * x - a * (sum of 4 neighbors of x) = x0`.
fn linear_solve(boundary: Boundary, x: &mut Field, x0: &Field, a: FT, c: FT, iterations: usize) {
    let n = x.n;
    let c_recip = 1. / c;
    for _ in 0..iterations {
        for j in 1..n - 1 {
            for i in 1..n - 1 {
                let sum = x.get(i + 1, j) + x.get(i - 1, j) + x.get(i, j + 1) + x.get(i, j - 1);
                x.set(i, j, (x0.get(i, j) + a * sum) * c_recip);
            }
        }
        x.set_boundary(boundary);
    }
}

fn diffuse(boundary: Boundary, x: &mut Field, x0: &Field, diffusion: FT, dt: FT, iterations: usize) {
    let cells = (x.n - 2) as FT;
    let a = dt * diffusion * cells * cells;
    linear_solve(boundary, x, x0, a, 1. + 4. * a, iterations);
}

/// Semi-Lagrangian advection: trace every cell center back along the velocity and sample `d0` bilinearly.
fn advect(boundary: Boundary, d: &mut Field, d0: &Field, vx: &Field, vy: &Field, dt: FT) {
    let n = d.n;
    let dt0 = dt * (n - 2) as FT;
    let max = (n - 2) as FT + 0.5;

    for j in 1..n - 1 {
        for i in 1..n - 1 {
            let x = (i as FT - dt0 * vx.get(i, j)).clamp(0.5, max);
            let y = (j as FT - dt0 * vy.get(i, j)).clamp(0.5, max);

            let i0 = x.floor() as usize;
            let i1 = i0 + 1;
            let j0 = y.floor() as usize;
            let j1 = j0 + 1;

            let s1 = x - i0 as FT;
            let s0 = 1. - s1;
            let t1 = y - j0 as FT;
            let t0 = 1. - t1;

            d.set(
                i,
                j,
                s0 * (t0 * d0.get(i0, j0) + t1 * d0.get(i0, j1)) + s1 * (t0 * d0.get(i1, j0) + t1 * d0.get(i1, j1)),
            );
        }
    }

    d.set_boundary(boundary);
}

/// Remove the divergent part of the velocity field. `p` and `div` are scratch fields.
fn project(vx: &mut Field, vy: &mut Field, p: &mut Field, div: &mut Field, iterations: usize) {
    let n = vx.n;
    let h = 1. / (n - 2) as FT;

    for j in 1..n - 1 {
        for i in 1..n - 1 {
            let divergence = -0.5 * h * (vx.get(i + 1, j) - vx.get(i - 1, j) + vy.get(i, j + 1) - vy.get(i, j - 1));
            div.set(i, j, divergence);
            p.set(i, j, 0.);
        }
    }
    div.set_boundary(Boundary::Scalar);
    p.set_boundary(Boundary::Scalar);

    linear_solve(Boundary::Scalar, p, div, 1., 4., iterations);

    for j in 1..n - 1 {
        for i in 1..n - 1 {
            vx.set(i, j, vx.get(i, j) - 0.5 * (p.get(i + 1, j) - p.get(i - 1, j)) / h);
            vy.set(i, j, vy.get(i, j) - 0.5 * (p.get(i, j + 1) - p.get(i, j - 1)) / h);
        }
    }
    vx.set_boundary(Boundary::VelocityX);
    vy.set_boundary(Boundary::VelocityY);
}

pub struct GridFluid {
    params: GridParams,
    domain: Domain,

    dye: Field,
    dye_prev: Field,
    vx: Field,
    vy: Field,
    vx_prev: Field,
    vy_prev: Field,

    time: FT,
    step_number: usize,
}

impl GridFluid {
    pub fn new(params: GridParams, width: FT, height: FT) -> Result<GridFluid, SimulationError> {
        params.validate()?;
        let domain = Domain::new(width, height)?;
        let n = params.resolution + 2;

        Ok(GridFluid {
            params,
            domain,
            dye: Field::new(n),
            dye_prev: Field::new(n),
            vx: Field::new(n),
            vy: Field::new(n),
            vx_prev: Field::new(n),
            vy_prev: Field::new(n),
            time: 0.,
            step_number: 0,
        })
    }

    pub fn params(&self) -> &GridParams {
        &self.params
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn resolution(&self) -> usize {
        self.params.resolution
    }

    pub fn time(&self) -> FT {
        self.time
    }

    pub fn step_number(&self) -> usize {
        self.step_number
    }

    pub fn reset(&mut self) {
        info!("reset grid fluid");
        for field in [
            &mut self.dye,
            &mut self.dye_prev,
            &mut self.vx,
            &mut self.vy,
            &mut self.vx_prev,
            &mut self.vy_prev,
        ] {
            field.fill(0.);
        }
        self.time = 0.;
        self.step_number = 0;
    }

    /// The number of cells stays the same, only their physical size changes.
    pub fn on_resize(&mut self, width: FT, height: FT) -> Result<(), SimulationError> {
        self.domain = Domain::new(width, height)?;
        info!("resize grid domain to {}x{}", width, height);
        Ok(())
    }

    /// Size of one cell in pixels.
    pub fn cell_size(&self) -> V2 {
        self.domain.extent() / self.params.resolution as FT
    }

    /// Pixel position of the center of interior cell `(i, j)`, with `i, j` in `0..resolution`.
    pub fn cell_center(&self, i: usize, j: usize) -> V2 {
        vec2f(i as FT + 0.5, j as FT + 0.5).component_mul(&self.cell_size())
    }

    pub fn dye_at(&self, i: usize, j: usize) -> FT {
        self.dye.get(i + 1, j + 1)
    }

    /// Velocity of interior cell `(i, j)` in pixels per second.
    pub fn velocity_at(&self, i: usize, j: usize) -> V2 {
        vec2f(self.vx.get(i + 1, j + 1), self.vy.get(i + 1, j + 1)).component_mul(&self.domain.extent())
    }

    pub fn total_dye(&self) -> FT {
        self.dye.interior_sum()
    }

    /// Add `amount` of dye at the cell containing `position`. Positions outside the domain are ignored.
    pub fn add_dye(&mut self, position: V2, amount: FT) {
        if let Some((i, j)) = self.cell_of(position) {
            let v = self.dye.get(i, j);
            self.dye.set(i, j, v + amount);
        }
    }

    fn cell_of(&self, position: V2) -> Option<(usize, usize)> {
        if !self.domain.contains(position, 0.) {
            return None;
        }
        let cell = position.component_div(&self.cell_size());
        let max = self.params.resolution - 1;
        Some(((cell.x as usize).min(max) + 1, (cell.y as usize).min(max) + 1))
    }

    /// Visit every interior cell with its grid index and center in pixels.
    fn for_each_cell(&mut self, mut f: impl FnMut(&mut GridFluid, usize, usize, V2)) {
        let resolution = self.params.resolution;
        for j in 0..resolution {
            for i in 0..resolution {
                let center = self.cell_center(i, j);
                f(self, i + 1, j + 1, center);
            }
        }
    }

    /// Splat dye and velocity along the drag from `a` to `b`.
    pub fn apply_interaction(&mut self, a: V2, b: V2) {
        let radius = self.params.splat_radius;
        if radius <= 0. {
            return;
        }
        // pixels to domain fractions
        let delta = (b - a).component_div(&self.domain.extent()) * self.params.force_scale;

        self.for_each_cell(|fluid, i, j, center| {
            let dist = distance_to_segment(center, a, b);
            if dist < radius {
                let falloff = 1. - dist / radius;
                fluid.dye.set(i, j, fluid.dye.get(i, j) + falloff);
                fluid.vx.set(i, j, fluid.vx.get(i, j) + delta.x * falloff);
                fluid.vy.set(i, j, fluid.vy.get(i, j) + delta.y * falloff);
            }
        });
    }

    /// Outward velocity splat around `center`, in pixels per second at the center.
    pub fn apply_radial_impulse(&mut self, center: V2, radius: FT, strength: FT) {
        let extent = self.domain.extent();
        self.for_each_cell(|fluid, i, j, cell_center| {
            let offset = cell_center - center;
            let dist = offset.norm();
            if dist > 0. && dist < radius {
                let dv = (offset / dist * (strength * (1. - dist / radius))).component_div(&extent);
                fluid.vx.set(i, j, fluid.vx.get(i, j) + dv.x);
                fluid.vy.set(i, j, fluid.vy.get(i, j) + dv.y);
            }
        });
    }

    pub fn step(&mut self, dt: FT) {
        if !(dt.is_finite() && dt > 0.) {
            debug!("ignoring grid step with dt={}", dt);
            return;
        }
        let GridParams {
            diffusion,
            viscosity,
            solver_iterations: iterations,
            dye_dissipation,
            ..
        } = self.params;

        diffuse(Boundary::VelocityX, &mut self.vx_prev, &self.vx, viscosity, dt, iterations);
        diffuse(Boundary::VelocityY, &mut self.vy_prev, &self.vy, viscosity, dt, iterations);
        project(&mut self.vx_prev, &mut self.vy_prev, &mut self.vx, &mut self.vy, iterations);

        advect(Boundary::VelocityX, &mut self.vx, &self.vx_prev, &self.vx_prev, &self.vy_prev, dt);
        advect(Boundary::VelocityY, &mut self.vy, &self.vy_prev, &self.vx_prev, &self.vy_prev, dt);
        project(&mut self.vx, &mut self.vy, &mut self.vx_prev, &mut self.vy_prev, iterations);

        diffuse(Boundary::Scalar, &mut self.dye_prev, &self.dye, diffusion, dt, iterations);
        advect(Boundary::Scalar, &mut self.dye, &self.dye_prev, &self.vx, &self.vy, dt);

        if dye_dissipation < 1. {
            self.dye.values.iter_mut().for_each(|d| *d *= dye_dissipation);
        }

        self.time += dt;
        self.step_number += 1;
        debug!(
            "grid step {} t={:.4} dye={:.4}",
            self.step_number,
            self.time,
            self.total_dye()
        );
    }
}

#[cfg(test)]
fn small_grid(params: GridParams) -> GridFluid {
    GridFluid::new(
        GridParams {
            resolution: 32,
            ..params
        },
        320.,
        320.,
    )
    .unwrap()
}

#[cfg(test)]
fn max_divergence(fluid: &GridFluid) -> FT {
    let n = fluid.vx.n;
    let mut max: FT = 0.;
    for j in 1..n - 1 {
        for i in 1..n - 1 {
            let div = fluid.vx.get(i + 1, j) - fluid.vx.get(i - 1, j) + fluid.vy.get(i, j + 1) - fluid.vy.get(i, j - 1);
            max = max.max(div.abs());
        }
    }
    max
}

#[test]
fn diffusion_preserves_dye_without_flow() {
    let mut fluid = small_grid(GridParams {
        diffusion: 0.001,
        dye_dissipation: 1.,
        ..GridParams::default()
    });
    fluid.add_dye(vec2f(160., 160.), 10.);
    fluid.add_dye(vec2f(40., 200.), 5.);
    assert_eq!(fluid.total_dye(), 15.);

    for _ in 0..10 {
        fluid.step(0.05);
    }

    crate::assert_ft_approx_eq(fluid.total_dye(), 15., 0.15, || format!("dye after diffusion"));
    // spread out
    assert!(fluid.dye_at(16, 16) < 10.);
    assert!(fluid.dye_at(17, 16) > 0.);
}

#[test]
fn dissipation_removes_dye() {
    let mut fluid = small_grid(GridParams {
        diffusion: 0.,
        dye_dissipation: 0.5,
        ..GridParams::default()
    });
    fluid.add_dye(vec2f(100., 100.), 8.);
    fluid.step(0.01);
    crate::assert_ft_approx_eq(fluid.total_dye(), 4., 1e-4, || format!("dye after one step"));
}

#[test]
fn projection_reduces_divergence() {
    let mut fluid = small_grid(GridParams {
        solver_iterations: 40,
        ..GridParams::default()
    });
    fluid.apply_radial_impulse(vec2f(160., 160.), 80., 200.);
    let before = max_divergence(&fluid);
    assert!(before > 0.);

    fluid.step(0.01);
    let after = max_divergence(&fluid);
    assert!(after < 0.5 * before, "divergence {} -> {}", before, after);
}

#[test]
fn drag_splats_dye_and_velocity() {
    let mut fluid = small_grid(GridParams::default());
    fluid.apply_interaction(vec2f(100., 160.), vec2f(200., 160.));

    assert!(fluid.total_dye() > 0.);
    // cell (15, 15) has its center at (155, 155)
    assert!(fluid.dye_at(15, 15) > 0.);
    assert!(fluid.velocity_at(15, 15).x > 0.);
    assert_eq!(fluid.dye_at(0, 0), 0.);
    assert_eq!(fluid.velocity_at(0, 0), V2::zeros());
}

#[test]
fn radial_impulse_points_outwards() {
    let mut fluid = small_grid(GridParams::default());
    fluid.apply_radial_impulse(vec2f(160., 160.), 50., 100.);

    assert!(fluid.velocity_at(18, 15).x > 0.);
    assert!(fluid.velocity_at(13, 15).x < 0.);
    assert!(fluid.velocity_at(15, 12).y < 0.);
    assert_eq!(fluid.velocity_at(2, 2), V2::zeros());
}

#[test]
fn reset_and_resize_keep_resolution() {
    let mut fluid = small_grid(GridParams::default());
    fluid.apply_interaction(vec2f(10., 10.), vec2f(300., 300.));
    fluid.step(0.02);

    fluid.reset();
    assert_eq!(fluid.total_dye(), 0.);
    assert_eq!(fluid.step_number(), 0);

    fluid.on_resize(640., 160.).unwrap();
    assert_eq!(fluid.resolution(), 32);
    assert_eq!(fluid.cell_size(), vec2f(20., 5.));
    assert!(fluid.on_resize(-1., 160.).is_err());
}

#[test]
fn invalid_grid_params_are_rejected() {
    for params in [
        GridParams {
            resolution: 2,
            ..GridParams::default()
        },
        GridParams {
            solver_iterations: 0,
            ..GridParams::default()
        },
        GridParams {
            dye_dissipation: 0.,
            ..GridParams::default()
        },
        GridParams {
            diffusion: -1.,
            ..GridParams::default()
        },
    ] {
        assert!(GridFluid::new(params, 100., 100.).is_err(), "{:?}", params);
    }
}
