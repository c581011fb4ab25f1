use crate::{
    floating_type_mod::{FRAC_1_PI, FT, PI},
    V2,
};

/**
 * Poly6 density kernel.
 *
 * r is the distance between the two particles.
 * h is the smoothing radius (the kernel support).
 */
#[inline(always)]
pub fn poly6(r: FT, h: FT) -> FT {
    if r < 0. || r > h {
        return 0.;
    }
    let v = h * h - r * r;
    315. / (64. * PI * h.powi(9)) * v * v * v
}

/**
 * Magnitude of the spiky kernel gradient dW/dr.
 *
 * The value is not divided by r: callers multiply it with the normalized direction
 * vector themselves. The result is non-positive inside the support.
 */
#[inline(always)]
pub fn spiky_gradient(r: FT, h: FT) -> FT {
    if r < 0. || r > h {
        return 0.;
    }
    let v = h - r;
    -45. / (PI * h.powi(6)) * v * v
}

/** Laplacian of the viscosity kernel. Non-negative inside the support. */
#[inline(always)]
pub fn viscosity_laplacian(r: FT, h: FT) -> FT {
    if r < 0. || r > h {
        return 0.;
    }
    45. / (PI * h.powi(6)) * (h - r)
}

/**
 * Calculate the gradient dW/dx of the poly6 kernel where W=poly6(|x-y|) and x-y=diff.
 */
#[inline(always)]
pub fn poly6_gradient(diff: V2, h: FT) -> V2 {
    let r_sq = diff.norm_squared();
    if r_sq > h * h {
        return V2::zeros();
    }
    let v = h * h - r_sq;
    diff * (-945. / (32. * PI * h.powi(9)) * v * v)
}

#[inline(always)]
pub fn poly6_laplacian(r: FT, h: FT) -> FT {
    if r < 0. || r > h {
        return 0.;
    }
    let r_sq = r * r;
    let h_sq = h * h;
    -945. / (32. * PI * h.powi(9)) * (h_sq - r_sq) * (3. * h_sq - 7. * r_sq)
}

/** In this 2D case it is the "radius to circle area". Particle masses are derived from it. */
pub fn radius_to_area(r: FT) -> FT {
    PI * r * r
}

/** In this 2D case it is the "circle area to radius" */
pub fn area_to_radius(area: FT) -> FT {
    // A = PI * r^2   =>  r = sqrt(A/PI)
    (area * FRAC_1_PI).sqrt()
}

#[test]
fn kernels_vanish_outside_support() {
    for h in [1., 8., 20., 35.5] {
        for r in [h * 1.0001, h * 1.5, h * 2., h * 100.] {
            assert_eq!(poly6(r, h), 0.);
            assert_eq!(spiky_gradient(r, h), 0.);
            assert_eq!(viscosity_laplacian(r, h), 0.);
            assert_eq!(poly6_laplacian(r, h), 0.);
        }
        assert_eq!(poly6(-1., h), 0.);
        assert_eq!(spiky_gradient(-1., h), 0.);
        assert_eq!(viscosity_laplacian(-1., h), 0.);
    }
}

#[test]
fn kernels_are_finite_and_signed_inside_support() {
    let h = 20.;
    let steps = 200;
    for i in 0..=steps {
        let r = h * i as FT / steps as FT;

        let w = poly6(r, h);
        let grad = spiky_gradient(r, h);
        let lap = viscosity_laplacian(r, h);

        assert!(w.is_finite() && w >= 0., "poly6({}) = {}", r, w);
        assert!(grad.is_finite() && grad <= 0., "spiky_gradient({}) = {}", r, grad);
        assert!(lap.is_finite() && lap >= 0., "viscosity_laplacian({}) = {}", r, lap);
    }

    // kernels reach zero at the support boundary
    assert_eq!(poly6(h, h), 0.);
    assert_eq!(spiky_gradient(h, h), 0.);
    assert_eq!(viscosity_laplacian(h, h), 0.);
}

#[test]
fn kernel_coefficients() {
    use crate::assert_ft_approx_eq;

    let h: FT = 2.;
    assert_ft_approx_eq(poly6(0., h), 315. / (64. * PI * 512.) * 64., 1e-6, || format!("poly6(0, 2)"));
    assert_ft_approx_eq(poly6(1., h), 315. / (64. * PI * 512.) * 27., 1e-6, || format!("poly6(1, 2)"));
    assert_ft_approx_eq(spiky_gradient(1., h), -45. / (PI * 64.), 1e-6, || format!("spiky_gradient(1, 2)"));
    assert_ft_approx_eq(viscosity_laplacian(0., h), 45. / (PI * 64.) * 2., 1e-6, || {
        format!("viscosity_laplacian(0, 2)")
    });
}

#[test]
fn spiky_gradient_derivative_test() {
    // W(r) = 15 / (PI * h^6) * (h - r)^3 is the spiky kernel whose derivative is evaluated
    fn spiky(r: FT, h: FT) -> FT {
        if r > h {
            return 0.;
        }
        15. / (PI * h.powi(6)) * (h - r).powi(3)
    }

    let h: FT = 4.;
    let diff: FT = 1e-2;
    for i in 1..40 {
        let r = h * i as FT / 40.;
        let approx = (spiky(r + diff * 0.5, h) - spiky(r - diff * 0.5, h)) / diff;
        let analytical = spiky_gradient(r, h);
        assert!(
            (approx - analytical).abs() < 1e-3,
            "r={} analytical={} approx={}",
            r,
            analytical,
            approx
        );
    }
}

#[test]
fn poly6_gradient_derivative_test() {
    use crate::vec2f;

    let h: FT = 3.;
    let diff: FT = 1e-2;
    let test_grid_size = 20;
    let probe_offset = 2. * h / test_grid_size as FT;

    for y in 0..test_grid_size {
        for x in 0..test_grid_size {
            let probe_point = vec2f(
                (x as FT + 0.5) * probe_offset - h,
                (y as FT + 0.5) * probe_offset - h,
            );

            let analytical = poly6_gradient(probe_point, h);

            let x_neg = poly6((probe_point + vec2f(-diff * 0.5, 0.)).norm(), h);
            let x_pos = poly6((probe_point + vec2f(diff * 0.5, 0.)).norm(), h);
            let y_neg = poly6((probe_point + vec2f(0., -diff * 0.5)).norm(), h);
            let y_pos = poly6((probe_point + vec2f(0., diff * 0.5)).norm(), h);
            let approx = vec2f((x_pos - x_neg) / diff, (y_pos - y_neg) / diff);

            assert!((analytical - approx).x.abs() < 1e-3, "at {:?}", probe_point);
            assert!((analytical - approx).y.abs() < 1e-3, "at {:?}", probe_point);
        }
    }
}

#[test]
fn test_radius_and_area_conversion() {
    for x in [0.1, 0.5, 1.0, 100.] {
        let x2 = radius_to_area(area_to_radius(x));
        crate::assert_ft_approx_eq(x, x2, 0.0001, || format!("roundtrip area->radius->area"));
    }
}
