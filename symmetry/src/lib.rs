// Permutation symmetry of three-body feature tensors.
//
// A three-body interaction accumulates into a dense (bl x bm x bn) tensor
// indexed by the knot spans of its ij/ik/jk legs. Depending on which legs
// carry identical species pairs, entries related by index permutation
// describe the same physical triangle and must be folded together before
// the tensor is flattened into feature columns. The template then gathers
// the symmetry-unique entries and rescales each by its occurrence
// multiplicity.

// Which legs of a three-body interaction are equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmClass {
    // all three species distinct: every entry unique
    Distinct,
    // ij and ik legs equivalent: fold (i,j) <-> (j,i)
    SwapIj,
    // all legs equivalent: fold all 6 permutations
    Full,
}

impl SymmClass {
    pub fn from_code(code: usize) -> SymmClass {
        match code {
            1 => SymmClass::Distinct,
            2 => SymmClass::SwapIj,
            3 => SymmClass::Full,
            _ => panic!("unknown three-body symmetry class {}", code),
        }
    }

    pub fn code(&self) -> usize {
        match self {
            SymmClass::Distinct => 1,
            SymmClass::SwapIj => 2,
            SymmClass::Full => 3,
        }
    }
}

// Number of symmetry-unique entries of a (bl, bm, bn) tensor.
pub fn compressed_size(symm: SymmClass, bl: usize, bm: usize, bn: usize) -> usize {
    match symm {
        SymmClass::Distinct => bl * bm * bn,
        SymmClass::SwapIj => bn * bl * (bl + 1) / 2,
        SymmClass::Full => bl * (bl + 1) * (bl + 2) / 6,
    }
}

// Fold a dense tensor so that every entry of a permutation orbit holds the
// orbit sum. Class 2 adds the (i,j)-swapped entry; class 3 accumulates all
// 6 permutations, staging two of them in auxiliary buffers so no entry is
// recomputed.
pub fn fold(symm: SymmClass, dense: &[f64], bl: usize, bm: usize, bn: usize) -> Vec<f64> {
    assert_eq!(dense.len(), bl * bm * bn);

    let mut vec = vec![0.0; dense.len()];

    match symm {
        SymmClass::Distinct => {
            vec.copy_from_slice(dense);
        }

        SymmClass::SwapIj => {
            assert_eq!(bl, bm);

            for i in 0..bl {
                for j in 0..bm {
                    for k in 0..bn {
                        let idx = i * bm * bn + j * bn + k;
                        let idx_ji = j * bm * bn + i * bn + k;
                        vec[idx] = dense[idx] + dense[idx_ji];
                    }
                }
            }
        }

        SymmClass::Full => {
            assert_eq!(bl, bm);
            assert_eq!(bm, bn);

            let mut temp2 = vec![0.0; dense.len()];
            let mut temp3 = vec![0.0; dense.len()];

            for i in 0..bl {
                for j in 0..bm {
                    for k in 0..bn {
                        let idx = i * bm * bn + j * bn + k; // i,j,k
                        let idx2 = i * bm * bn + k * bn + j; // i,k,j
                        let idx3 = j * bm * bn + i * bn + k; // j,i,k
                        let idx4 = k * bm * bn + j * bn + i; // k,j,i

                        vec[idx] = dense[idx] + dense[idx2] + dense[idx3] + dense[idx4];

                        temp2[idx] = dense[idx2];
                        temp3[idx] = dense[idx3];
                    }
                }
            }

            // the two remaining permutations, j,k,i and k,i,j
            for i in 0..bl {
                for j in 0..bm {
                    for k in 0..bn {
                        let idx = i * bm * bn + j * bn + k;
                        let idx5 = j * bm * bn + i * bn + k;
                        let idx6 = i * bm * bn + k * bn + j;
                        vec[idx] += temp2[idx5] + temp3[idx6];
                    }
                }
            }
        }
    }

    vec
}

// Sparse gather over a folded tensor: `mask` holds the flat indices of the
// symmetry-unique entries, `weight` the multiplicity compensation applied
// to each.
#[derive(Debug, Default, Clone)]
pub struct SymmetryTemplate {
    mask: Vec<usize>,
    weight: Vec<f64>,
}

impl SymmetryTemplate {
    // Build from a dense template array: entries > 0 are kept.
    pub fn from_dense(template: &[f64]) -> SymmetryTemplate {
        let mut mask = Vec::new();
        let mut weight = Vec::new();

        for (i, &w) in template.iter().enumerate() {
            if w > 0.0 {
                mask.push(i);
                weight.push(w);
            }
        }

        SymmetryTemplate { mask, weight }
    }

    pub fn len(&self) -> usize {
        self.mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    pub fn get_mask(&self) -> &[usize] {
        &self.mask
    }

    pub fn get_weights(&self) -> &[f64] {
        &self.weight
    }

    pub fn compress(&self, folded: &[f64], out: &mut [f64]) {
        assert_eq!(out.len(), self.mask.len());

        for (o, (&m, &w)) in out.iter_mut().zip(self.mask.iter().zip(self.weight.iter())) {
            *o = folded[m] * w;
        }
    }
}

pub trait SymmetryWeightSolver {
    // Dense template over the (bl, bm, bn) tensor: positive entries mark
    // symmetry-unique positions and carry their multiplicity weight.
    fn get_symmetry_weights(&self, symm: SymmClass, bl: usize, bm: usize, bn: usize) -> Vec<f64>;
}

// Reference solver: keep the lexicographically canonical index tuple of
// each orbit, weighted by 1/(orbit sum overcount) so that the compressed
// vector preserves the total tensor sum.
#[derive(Debug, Default)]
pub struct MultiplicityWeightSolver;

impl MultiplicityWeightSolver {
    pub fn new() -> MultiplicityWeightSolver {
        MultiplicityWeightSolver
    }
}

impl SymmetryWeightSolver for MultiplicityWeightSolver {
    fn get_symmetry_weights(&self, symm: SymmClass, bl: usize, bm: usize, bn: usize) -> Vec<f64> {
        let mut template = vec![0.0; bl * bm * bn];

        match symm {
            SymmClass::Distinct => {
                for w in template.iter_mut() {
                    *w = 1.0;
                }
            }

            SymmClass::SwapIj => {
                assert_eq!(bl, bm);

                for i in 0..bl {
                    for j in i..bm {
                        for k in 0..bn {
                            let w = if i == j { 0.5 } else { 1.0 };
                            template[i * bm * bn + j * bn + k] = w;
                        }
                    }
                }
            }

            SymmClass::Full => {
                assert_eq!(bl, bm);
                assert_eq!(bm, bn);

                for i in 0..bl {
                    for j in i..bm {
                        for k in j..bn {
                            let w = if i == j && j == k {
                                1.0 / 6.0
                            } else if i == j || j == k {
                                0.5
                            } else {
                                1.0
                            };
                            template[i * bm * bn + j * bn + k] = w;
                        }
                    }
                }
            }
        }

        template
    }
}

#[cfg(test)]
mod tests;
