use ufconsts::*;

// Cubic B-spline basis tables for the featurization pipeline.
//
// Every interaction carries one knot vector per leg. For each knot window
// the solver produces the monomial coefficients of the single basis
// function supported there, restricted to each segment of its support:
// 4 segments x 4 coefficients (1, r, r^2, r^3) for the value, and
// 3 segments x 3 coefficients (1, r, r^2) for the scaled first derivative.
// Evaluation then reduces to 4 (resp. 3) fused polynomial reads per point,
// no recursive de Boor at run time.

mod solver;
pub use solver::{CubicSplineSolver, SplineSolver};

// Locate the active knot span by backward linear scan from the top
// segment. Precondition: r lies inside the basis support; a point on a
// knot is assigned to the segment below it. The scan stops at 0 so a
// degenerate query cannot underflow, but callers are expected to gate r
// against the interaction window first.
pub fn find_span(r: f64, knots: &[f64], top: usize) -> usize {
    let mut pos = top;

    while pos > 0 && r <= knots[pos] {
        pos -= 1;
    }

    pos
}

// The 4-point pairwise force kernel from the 3 derivative basis values.
// Entry k is the derivative of the k-th overlapping cubic basis function.
pub fn force_pair(deri: &[f64; 3]) -> [f64; 4] {
    [deri[0], deri[1] - deri[0], deri[2] - deri[1], -deri[2]]
}

// Per-interaction coefficient tables, padded to the widest knot vector of
// the group so every interaction row has the same segment count.
#[derive(Debug, Default)]
pub struct SplineTable {
    constants: Vec<Vec<[f64; N2B_COEFFS]>>,
    dnconstants: Vec<Vec<[f64; N2B_DERI_COEFFS]>>,
    knots: Vec<Vec<f64>>,
    num_knots: Vec<usize>,
    max_num_knots: usize,
}

impl SplineTable {
    pub fn new(knots_map: &[Vec<f64>], num_knots: &[usize], solver: &dyn SplineSolver) -> SplineTable {
        assert_eq!(knots_map.len(), num_knots.len());

        let max_num_knots = num_knots.iter().copied().max().unwrap_or(0);
        let nseg = max_num_knots.saturating_sub(BSPLINE_ORDER);

        let ninterxn = num_knots.len();

        let mut constants = vec![vec![[0.0; N2B_COEFFS]; nseg]; ninterxn];
        let mut dnconstants = vec![vec![[0.0; N2B_DERI_COEFFS]; nseg]; ninterxn];
        let mut knots = vec![vec![0.0; max_num_knots]; ninterxn];

        for ix in 0..ninterxn {
            let nk = num_knots[ix];
            knots[ix][..nk].copy_from_slice(&knots_map[ix][..nk]);

            for knot_no in 0..nk - BSPLINE_ORDER {
                let mut window = [0.0; 5];
                window.copy_from_slice(&knots_map[ix][knot_no..knot_no + 5]);

                let c = solver.get_constants(&window);

                for (dst, src) in constants[ix][knot_no].iter_mut().zip(c.iter()) {
                    *dst = if src.is_finite() { *src } else { 0.0 };
                }
            }

            // Segment 0 of the derivative table stays zero; points that low
            // never pass the interaction window.
            for knot_no in 1..nk - BSPLINE_ORDER {
                let mut window = [0.0; 4];
                window.copy_from_slice(&knots_map[ix][knot_no..knot_no + 4]);

                let c = solver.get_dnconstants(&window, 3.0 / (window[3] - window[0]));

                for (dst, src) in dnconstants[ix][knot_no].iter_mut().zip(c.iter()) {
                    *dst = if src.is_finite() { *src } else { 0.0 };
                }
            }
        }

        SplineTable {
            constants,
            dnconstants,
            knots,
            num_knots: num_knots.to_vec(),
            max_num_knots,
        }
    }

    pub fn n_interactions(&self) -> usize {
        self.num_knots.len()
    }

    pub fn get_num_knots(&self, ix: usize) -> usize {
        self.num_knots[ix]
    }

    pub fn get_max_num_knots(&self) -> usize {
        self.max_num_knots
    }

    pub fn get_knots(&self, ix: usize) -> &[f64] {
        &self.knots[ix]
    }

    pub fn num_segments(&self, ix: usize) -> usize {
        self.num_knots[ix] - BSPLINE_ORDER
    }

    // The 4 overlapping cubic basis values at r, given its knot span.
    pub fn basis_set(&self, ix: usize, pos: usize, r: f64, rsq: f64, rth: f64) -> [f64; 4] {
        let c = &self.constants[ix];

        [
            c[pos][0] + r * c[pos][1] + rsq * c[pos][2] + rth * c[pos][3],
            c[pos - 1][4] + r * c[pos - 1][5] + rsq * c[pos - 1][6] + rth * c[pos - 1][7],
            c[pos - 2][8] + r * c[pos - 2][9] + rsq * c[pos - 2][10] + rth * c[pos - 2][11],
            c[pos - 3][12] + r * c[pos - 3][13] + rsq * c[pos - 3][14] + rth * c[pos - 3][15],
        ]
    }

    // The 3 scaled quadratic derivative basis values at r.
    pub fn basis_deri_set(&self, ix: usize, pos: usize, r: f64, rsq: f64) -> [f64; 3] {
        let c = &self.dnconstants[ix];

        [
            c[pos][0] + r * c[pos][1] + rsq * c[pos][2],
            c[pos - 1][3] + r * c[pos - 1][4] + rsq * c[pos - 1][5],
            c[pos - 2][6] + r * c[pos - 2][7] + rsq * c[pos - 2][8],
        ]
    }
}
