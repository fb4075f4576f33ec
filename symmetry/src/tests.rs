use super::*;

use approx::assert_abs_diff_eq;

fn filled(n: usize) -> Vec<f64> {
    // deterministic, non-symmetric values
    (0..n).map(|i| (i as f64) * 0.37 + 1.0).collect()
}

#[test]
fn test_symm_class_codes() {
    assert_eq!(SymmClass::from_code(1), SymmClass::Distinct);
    assert_eq!(SymmClass::from_code(2), SymmClass::SwapIj);
    assert_eq!(SymmClass::from_code(3), SymmClass::Full);
    assert_eq!(SymmClass::Full.code(), 3);
}

#[test]
fn test_compressed_sizes() {
    assert_eq!(compressed_size(SymmClass::Distinct, 3, 4, 5), 60);
    assert_eq!(compressed_size(SymmClass::SwapIj, 3, 3, 5), 30);
    assert_eq!(compressed_size(SymmClass::Full, 4, 4, 4), 20);
}

#[test]
fn test_fold_distinct_is_identity() {
    let dense = filled(24);
    let folded = fold(SymmClass::Distinct, &dense, 2, 3, 4);
    assert_eq!(folded, dense);
}

#[test]
fn test_fold_swap_ij() {
    let (bl, bm, bn) = (3, 3, 2);
    let dense = filled(bl * bm * bn);
    let folded = fold(SymmClass::SwapIj, &dense, bl, bm, bn);

    for i in 0..bl {
        for j in 0..bm {
            for k in 0..bn {
                let idx = i * bm * bn + j * bn + k;
                let idx_ji = j * bm * bn + i * bn + k;
                assert_abs_diff_eq!(folded[idx], dense[idx] + dense[idx_ji], epsilon = 1e-15);
            }
        }
    }
}

#[test]
fn test_fold_full_sums_all_permutations() {
    let b = 3;
    let dense = filled(b * b * b);
    let folded = fold(SymmClass::Full, &dense, b, b, b);

    let at = |i: usize, j: usize, k: usize| dense[i * b * b + j * b + k];

    for i in 0..b {
        for j in 0..b {
            for k in 0..b {
                let expected = at(i, j, k)
                    + at(i, k, j)
                    + at(j, i, k)
                    + at(j, k, i)
                    + at(k, i, j)
                    + at(k, j, i);
                assert_abs_diff_eq!(folded[i * b * b + j * b + k], expected, epsilon = 1e-12);
            }
        }
    }
}

#[test]
fn test_template_from_dense() {
    let solver = MultiplicityWeightSolver::new();
    let dense = solver.get_symmetry_weights(SymmClass::SwapIj, 2, 2, 1);
    let template = SymmetryTemplate::from_dense(&dense);

    // kept tuples: (0,0), (0,1), (1,1)
    assert_eq!(template.get_mask(), &[0, 1, 3]);
    assert_eq!(template.get_weights(), &[0.5, 1.0, 0.5]);
    assert_eq!(template.len(), compressed_size(SymmClass::SwapIj, 2, 2, 1));
}

// The multiplicity weights are fixed by this invariant: compressing a
// folded tensor preserves the total sum of the dense tensor.
#[test]
fn test_compress_preserves_total_sum() {
    let solver = MultiplicityWeightSolver::new();

    for &(symm, bl, bm, bn) in &[
        (SymmClass::Distinct, 2usize, 3usize, 4usize),
        (SymmClass::SwapIj, 3, 3, 2),
        (SymmClass::Full, 3, 3, 3),
    ] {
        let dense = filled(bl * bm * bn);
        let folded = fold(symm, &dense, bl, bm, bn);

        let template = SymmetryTemplate::from_dense(&solver.get_symmetry_weights(symm, bl, bm, bn));
        let mut out = vec![0.0; template.len()];
        template.compress(&folded, &mut out);

        let total: f64 = dense.iter().sum();
        let compressed: f64 = out.iter().sum();
        assert_abs_diff_eq!(compressed, total, epsilon = 1e-10);
    }
}

// Swapping the two equivalent neighbors of a class-2 triangle transposes
// the (i,j) indices of every contribution; the compressed vector must not
// change.
#[test]
fn test_swap_ij_compression_invariance() {
    let (bl, bm, bn) = (3, 3, 2);
    let dense = filled(bl * bm * bn);

    // transpose in (i,j)
    let mut swapped = vec![0.0; dense.len()];
    for i in 0..bl {
        for j in 0..bm {
            for k in 0..bn {
                swapped[j * bm * bn + i * bn + k] = dense[i * bm * bn + j * bn + k];
            }
        }
    }

    let solver = MultiplicityWeightSolver::new();
    let template =
        SymmetryTemplate::from_dense(&solver.get_symmetry_weights(SymmClass::SwapIj, bl, bm, bn));

    let folded_a = fold(SymmClass::SwapIj, &dense, bl, bm, bn);
    let folded_b = fold(SymmClass::SwapIj, &swapped, bl, bm, bn);

    let mut out_a = vec![0.0; template.len()];
    let mut out_b = vec![0.0; template.len()];
    template.compress(&folded_a, &mut out_a);
    template.compress(&folded_b, &mut out_b);

    for (a, b) in out_a.iter().zip(out_b.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-12);
    }
}
