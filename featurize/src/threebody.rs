use itertools::iproduct;

use bspline::{find_span, force_pair, SplineTable};
use vector3::Vector3f64;

// Triangle ordering descriptors.
//
// A physical triangle (center i, neighbors j and k) is accumulated under
// up to three index orderings. Each ordering feeds the three distances
// into the ij/ik/jk basis slots in a different arrangement and applies the
// product-rule derivative to two of the slots, projecting onto the stored
// ij and ik unit displacement vectors. Only the canonical ordering
// contributes to the energy tensor; the same physical triangle must not be
// counted twice.
//
// `legs[s]` selects which entry of [r_ij, r_ik, r_jk] feeds slot s,
// `dslots` the two slots evaluated with the derivative kernel, `ddels`
// whether each derivative term projects on del_ij (0) or del_ik (1). The
// neighbor-orientation signs of the non-canonical orderings cancel against
// the displacement-flip signs, so no explicit sign table is needed.

pub(crate) struct TriOrdering {
    pub legs: [usize; 3],
    pub with_energy: bool,
    pub dslots: [usize; 2],
    pub ddels: [usize; 2],
}

// i-j-k: always evaluated
pub(crate) const ORDER_CANONICAL: TriOrdering = TriOrdering {
    legs: [0, 1, 2],
    with_energy: true,
    dslots: [0, 1],
    ddels: [0, 1],
};

// j-i-k: evaluated when the ij leg species are equal
pub(crate) const ORDER_SWAP_IJ: TriOrdering = TriOrdering {
    legs: [0, 2, 1],
    with_energy: false,
    dslots: [0, 2],
    ddels: [0, 1],
};

// k-j-i: evaluated when the ik leg species are equal
pub(crate) const ORDER_SWAP_IK: TriOrdering = TriOrdering {
    legs: [2, 1, 0],
    with_energy: false,
    dslots: [1, 2],
    ddels: [1, 0],
};

// Accumulate one triangle under one ordering into the dense energy and
// per-axis force tensors. A leg outside its slot's [rmin, rmax) window
// rejects the whole ordering.
#[allow(clippy::too_many_arguments)]
pub(crate) fn eval_triangle_ordering(
    ord: &TriOrdering,
    rs: &[f64; 3],
    dels: &[Vector3f64; 2],
    windows: &[f64],
    table: &SplineTable,
    leg_rows: &[usize; 3],
    dims: &[usize; 3],
    energy: &mut [f64],
    forces: &mut [Vec<f64>; 3],
) {
    let rv = [rs[ord.legs[0]], rs[ord.legs[1]], rs[ord.legs[2]]];

    for s in 0..3 {
        if !(windows[2 * s] <= rv[s] && rv[s] < windows[2 * s + 1]) {
            return;
        }
    }

    let mut pos = [0usize; 3];
    let mut basis = [[0.0; 4]; 3];

    for s in 0..3 {
        let r = rv[s];
        pos[s] = find_span(r, table.get_knots(leg_rows[s]), dims[s]);
        basis[s] = table.basis_set(leg_rows[s], pos[s], r, r * r, r * r * r);
    }

    let mut fpairs = [[0.0; 4]; 2];

    for (k, &ds) in ord.dslots.iter().enumerate() {
        let r = rv[ds];
        let deri = table.basis_deri_set(leg_rows[ds], pos[ds], r, r * r);
        fpairs[k] = force_pair(&deri);
    }

    let del0 = dels[ord.ddels[0]].as_array();
    let del1 = dels[ord.ddels[1]].as_array();

    let (bm, bn) = (dims[1], dims[2]);

    for (x, y, z) in iproduct!(0..4usize, 0..4usize, 0..4usize) {
        let idx = (pos[0] - x) * bm * bn + (pos[1] - y) * bn + (pos[2] - z);

        let sel = [x, y, z];

        if ord.with_energy {
            energy[idx] += basis[0][x] * basis[1][y] * basis[2][z];
        }

        // product rule: one derivative slot per term
        let mut terms = [1.0; 2];
        for (k, &ds) in ord.dslots.iter().enumerate() {
            for s in 0..3 {
                terms[k] *= if s == ds {
                    fpairs[k][sel[s]]
                } else {
                    basis[s][sel[s]]
                };
            }
        }

        for axis in 0..3 {
            forces[axis][idx] += terms[0] * del0[axis] + terms[1] * del1[axis];
        }
    }
}
