// Closed-form expansion of one B-spline basis function into per-segment
// monomial coefficients.
//
// Each segment polynomial is a sum of terms, every term a product of
// linear factors over a scalar product of knot differences. Terms are
// expanded independently: a degenerate (repeated) knot zeroes only the
// denominators it actually appears in, and the resulting non-finite
// coefficients are coerced to zero by the table builder. For clamped knot
// vectors that removes exactly the segments with collapsed support;
// boundary basis functions keep their finite segments.

pub trait SplineSolver {
    // 16 coefficients: 4 support segments x (1, r, r^2, r^3), for the
    // cubic basis function on the 5-knot window.
    fn get_constants(&self, knots: &[f64; 5]) -> [f64; 16];

    // 9 coefficients: 3 support segments x (1, r, r^2), for the quadratic
    // basis function on the 4-knot window, multiplied by scale.
    fn get_dnconstants(&self, knots: &[f64; 4], scale: f64) -> [f64; 9];
}

// Polynomials in ascending powers of r, degree <= 3.
type Poly = [f64; 4];

// (a + b r)
fn lin(a: f64, b: f64) -> Poly {
    [a, b, 0.0, 0.0]
}

fn poly_mul(p: &Poly, q: &Poly) -> Poly {
    let mut out = [0.0; 4];

    for i in 0..4 {
        for j in 0..4 - i {
            out[i + j] += p[i] * q[j];
        }
    }

    out
}

fn poly_add(p: &Poly, q: &Poly) -> Poly {
    [p[0] + q[0], p[1] + q[1], p[2] + q[2], p[3] + q[3]]
}

fn poly_scale(p: &Poly, s: f64) -> Poly {
    [p[0] * s, p[1] * s, p[2] * s, p[3] * s]
}

// prod of linear factors / prod of knot differences
fn term(factors: &[Poly], denom: f64) -> Poly {
    let mut p = factors[0];

    for f in &factors[1..] {
        p = poly_mul(&p, f);
    }

    poly_scale(&p, 1.0 / denom)
}

#[derive(Debug, Default)]
pub struct CubicSplineSolver;

impl CubicSplineSolver {
    pub fn new() -> CubicSplineSolver {
        CubicSplineSolver
    }
}

impl SplineSolver for CubicSplineSolver {
    fn get_constants(&self, knots: &[f64; 5]) -> [f64; 16] {
        let [t0, t1, t2, t3, t4] = *knots;

        // r - ti and ti - r as linear polynomials
        let rm = |t: f64| lin(-t, 1.0);
        let mr = |t: f64| lin(t, -1.0);

        // segment 0: [t0, t1)
        let s0 = term(&[rm(t0), rm(t0), rm(t0)], (t1 - t0) * (t2 - t0) * (t3 - t0));

        // segment 1: [t1, t2)
        let s1 = poly_add(
            &poly_add(
                &term(&[rm(t0), rm(t0), mr(t2)], (t2 - t0) * (t2 - t1) * (t3 - t0)),
                &term(&[rm(t0), mr(t3), rm(t1)], (t3 - t1) * (t2 - t1) * (t3 - t0)),
            ),
            &term(&[mr(t4), rm(t1), rm(t1)], (t4 - t1) * (t3 - t1) * (t2 - t1)),
        );

        // segment 2: [t2, t3)
        let s2 = poly_add(
            &poly_add(
                &term(&[rm(t0), mr(t3), mr(t3)], (t3 - t0) * (t3 - t1) * (t3 - t2)),
                &term(&[mr(t4), rm(t1), mr(t3)], (t4 - t1) * (t3 - t1) * (t3 - t2)),
            ),
            &term(&[mr(t4), mr(t4), rm(t2)], (t4 - t1) * (t4 - t2) * (t3 - t2)),
        );

        // segment 3: [t3, t4)
        let s3 = term(&[mr(t4), mr(t4), mr(t4)], (t4 - t1) * (t4 - t2) * (t4 - t3));

        let mut out = [0.0; 16];
        out[0..4].copy_from_slice(&s0);
        out[4..8].copy_from_slice(&s1);
        out[8..12].copy_from_slice(&s2);
        out[12..16].copy_from_slice(&s3);

        out
    }

    fn get_dnconstants(&self, knots: &[f64; 4], scale: f64) -> [f64; 9] {
        let [t0, t1, t2, t3] = *knots;

        let rm = |t: f64| lin(-t, 1.0);
        let mr = |t: f64| lin(t, -1.0);

        // segment 0: [t0, t1)
        let s0 = term(&[rm(t0), rm(t0)], (t1 - t0) * (t2 - t0));

        // segment 1: [t1, t2)
        let s1 = poly_add(
            &term(&[rm(t0), mr(t2)], (t2 - t0) * (t2 - t1)),
            &term(&[mr(t3), rm(t1)], (t3 - t1) * (t2 - t1)),
        );

        // segment 2: [t2, t3)
        let s2 = term(&[mr(t3), mr(t3)], (t3 - t1) * (t3 - t2));

        let mut out = [0.0; 9];
        out[0..3].copy_from_slice(&poly_scale(&s0, scale)[..3]);
        out[3..6].copy_from_slice(&poly_scale(&s1, scale)[..3]);
        out[6..9].copy_from_slice(&poly_scale(&s2, scale)[..3]);

        out
    }
}
