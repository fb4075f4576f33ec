use std::f64;

// pi

pub const PI: f64 = f64::consts::PI;
pub const TWOPI: f64 = 2.0 * f64::consts::PI;
pub const FOURPI: f64 = 4.0 * f64::consts::PI;

// spline geometry
//
// A cubic basis function spans 4 knot segments; a knot vector of n knots
// carries n-4 basis functions of that degree.

pub const BSPLINE_ORDER: usize = 4;
pub const N2B_COEFFS: usize = 16;
pub const N2B_DERI_COEFFS: usize = 9;

// neighbor capacity estimation
//
// Extra shell thickness added to the cutoff radius before the sphere-volume
// packing estimate, and the capacity floor used when the estimate
// degenerates (non-positive cell volume, too few atoms).

pub const NEIGH_SHELL_PAD: f64 = 1.5;
pub const NEIGH_CAPACITY_FLOOR: f64 = 100.0;

// numerical convergence

pub const EPS5: f64 = 1E-5;
pub const EPS8: f64 = 1E-8;
pub const EPS10: f64 = 1E-10;
pub const EPS12: f64 = 1E-12;
