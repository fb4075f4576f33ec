use symmetry::SymmClass;

// Interaction configuration.
//
// Immutable after construction. Cutoff windows are derived from the knot
// vectors: rmin is the first knot, rmax the last, per interaction and per
// leg. Knot vectors are expected clamped (4 repeated knots at each end) so
// that the basis support matches the [rmin, rmax) window.

#[derive(Debug, Default)]
pub struct InteractionConfig {
    degree: usize,
    elements: Vec<i32>,

    n2b_types: Vec<(i32, i32)>,
    n2b_knots: Vec<Vec<f64>>,
    n2b_num_knots: Vec<usize>,
    rmin_max_2b_sq: Vec<f64>,
    rcut_max_sq: f64,

    n3b_types: Vec<(i32, i32, i32)>,
    n3b_knots: Vec<[Vec<f64>; 3]>,
    n3b_num_knots: Vec<[usize; 3]>,
    n3b_symm: Vec<SymmClass>,
    n3b_feature_sizes: Vec<usize>,
    rmin_max_3b: Vec<f64>,
}

impl InteractionConfig {
    // Two-body only basis, spline degree 2.
    pub fn two_body(
        elements: Vec<i32>,
        n2b_types: Vec<(i32, i32)>,
        n2b_knots: Vec<Vec<f64>>,
        n2b_num_knots: Vec<usize>,
    ) -> InteractionConfig {
        assert_eq!(n2b_types.len(), n2b_knots.len());
        assert_eq!(n2b_types.len(), n2b_num_knots.len());

        let mut rmin_max_2b_sq = Vec::with_capacity(2 * n2b_types.len());
        let mut rcut_max_sq = 0.0f64;

        for (knots, &nk) in n2b_knots.iter().zip(n2b_num_knots.iter()) {
            assert!(knots.len() >= nk);

            let rmin = knots[0];
            let rmax = knots[nk - 1];

            rmin_max_2b_sq.push(rmin * rmin);
            rmin_max_2b_sq.push(rmax * rmax);

            if rmax * rmax > rcut_max_sq {
                rcut_max_sq = rmax * rmax;
            }
        }

        InteractionConfig {
            degree: 2,
            elements,
            n2b_types,
            n2b_knots,
            n2b_num_knots,
            rmin_max_2b_sq,
            rcut_max_sq,
            ..Default::default()
        }
    }

    // Full basis with three-body interactions, spline degree 3.
    #[allow(clippy::too_many_arguments)]
    pub fn three_body(
        elements: Vec<i32>,
        n2b_types: Vec<(i32, i32)>,
        n2b_knots: Vec<Vec<f64>>,
        n2b_num_knots: Vec<usize>,
        n3b_types: Vec<(i32, i32, i32)>,
        n3b_knots: Vec<[Vec<f64>; 3]>,
        n3b_num_knots: Vec<[usize; 3]>,
        n3b_symm_codes: Vec<usize>,
        n3b_feature_sizes: Vec<usize>,
    ) -> InteractionConfig {
        let mut config = InteractionConfig::two_body(elements, n2b_types, n2b_knots, n2b_num_knots);

        assert_eq!(n3b_types.len(), n3b_knots.len());
        assert_eq!(n3b_types.len(), n3b_num_knots.len());
        assert_eq!(n3b_types.len(), n3b_symm_codes.len());
        assert_eq!(n3b_types.len(), n3b_feature_sizes.len());

        let mut rmin_max_3b = Vec::with_capacity(6 * n3b_types.len());

        for (legs, nks) in n3b_knots.iter().zip(n3b_num_knots.iter()) {
            for (knots, &nk) in legs.iter().zip(nks.iter()) {
                assert!(knots.len() >= nk);

                rmin_max_3b.push(knots[0]);
                rmin_max_3b.push(knots[nk - 1]);
            }
        }

        config.degree = 3;
        config.n3b_types = n3b_types;
        config.n3b_knots = n3b_knots;
        config.n3b_num_knots = n3b_num_knots;
        config.n3b_symm = n3b_symm_codes.iter().map(|&c| SymmClass::from_code(c)).collect();
        config.n3b_feature_sizes = n3b_feature_sizes;
        config.rmin_max_3b = rmin_max_3b;

        config
    }

    pub fn get_degree(&self) -> usize {
        self.degree
    }

    pub fn get_elements(&self) -> &[i32] {
        &self.elements
    }

    pub fn get_n_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn n2b_interactions(&self) -> usize {
        self.n2b_types.len()
    }

    pub fn n3b_interactions(&self) -> usize {
        self.n3b_types.len()
    }

    pub fn get_n2b_types(&self) -> &[(i32, i32)] {
        &self.n2b_types
    }

    pub fn get_n2b_knots(&self) -> &[Vec<f64>] {
        &self.n2b_knots
    }

    pub fn get_n2b_num_knots(&self) -> &[usize] {
        &self.n2b_num_knots
    }

    pub fn get_rmin_max_2b_sq(&self) -> &[f64] {
        &self.rmin_max_2b_sq
    }

    pub fn get_rcut_max_sq(&self) -> f64 {
        self.rcut_max_sq
    }

    pub fn get_n3b_types(&self) -> &[(i32, i32, i32)] {
        &self.n3b_types
    }

    pub fn get_n3b_knots(&self) -> &[[Vec<f64>; 3]] {
        &self.n3b_knots
    }

    pub fn get_n3b_num_knots(&self) -> &[[usize; 3]] {
        &self.n3b_num_knots
    }

    pub fn get_n3b_symm(&self) -> &[SymmClass] {
        &self.n3b_symm
    }

    pub fn get_n3b_feature_sizes(&self) -> &[usize] {
        &self.n3b_feature_sizes
    }

    // Per three-body interaction: [rmin_ij, rmax_ij, rmin_ik, rmax_ik,
    // rmin_jk, rmax_jk].
    pub fn get_rmin_max_3b(&self) -> &[f64] {
        &self.rmin_max_3b
    }
}
