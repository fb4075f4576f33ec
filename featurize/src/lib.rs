use bspline::{find_span, force_pair, CubicSplineSolver, SplineSolver, SplineTable};
use geometry::{GeometryDataset, ShapeMismatch};
use h5writer::{H5TableWriter, RowBlock, TableWriter};
use neighbs::{NeighborFinder, NeighborTable};
use symmetry::{fold, MultiplicityWeightSolver, SymmetryTemplate, SymmetryWeightSolver};
use ufconsts::*;

mod config;
mod error;
mod threebody;

pub use config::InteractionConfig;
pub use error::FeaturizeError;

use threebody::{eval_triangle_ordering, ORDER_CANONICAL, ORDER_SWAP_IJ, ORDER_SWAP_IK};

// Featurization engine.
//
// Turns a geometry dataset into fixed-width feature rows: one energy row
// per crystal plus three force rows per atom. Atoms are processed in
// batches; per-batch scratch (neighbor table, atomic rows, crystal rows)
// is recreated every batch, sized to that batch. The only state that
// survives a batch boundary is the row block of a crystal whose atoms
// straddle it, merged as the prefix of the next batch's accumulator.

// Crystal-aggregated rows of the final processed batch.
#[derive(Debug, Default)]
pub struct FeatureMatrix {
    pub data: Vec<f64>,
    pub nrow: usize,
    pub ncol: usize,
}

pub enum FeaturizeOutput {
    // diagnostic mode: the raw neighbor table of the final batch
    Neighbors(NeighborTable),
    Features(FeatureMatrix),
}

pub struct FeaturizationEngine {
    config: InteractionConfig,
    table_2b: SplineTable,
    table_3b: Option<SplineTable>,
    templates: Vec<SymmetryTemplate>,
    flat_weights: Vec<f64>,
    template_mask: Vec<usize>,
    reprn_length: usize,
    tot_2b_features: usize,
    geom: Option<GeometryDataset>,
    filename: String,
}

impl FeaturizationEngine {
    pub fn new(config: InteractionConfig) -> FeaturizationEngine {
        let spline_solver = CubicSplineSolver::new();
        let weight_solver = MultiplicityWeightSolver::new();

        FeaturizationEngine::with_solvers(config, &spline_solver, &weight_solver)
    }

    // Coefficient and symmetry-weight derivation are pluggable; the
    // defaults above are the reference solvers.
    pub fn with_solvers(
        config: InteractionConfig,
        spline_solver: &dyn SplineSolver,
        weight_solver: &dyn SymmetryWeightSolver,
    ) -> FeaturizationEngine {
        let table_2b = SplineTable::new(
            config.get_n2b_knots(),
            config.get_n2b_num_knots(),
            spline_solver,
        );

        let mut table_3b = None;
        let mut templates = Vec::new();
        let mut flat_weights = Vec::new();
        let mut template_mask = Vec::new();

        if config.get_degree() == 3 {
            // one table row per interaction leg, ij/ik/jk
            let mut knots = Vec::new();
            let mut num_knots = Vec::new();

            for (legs, nks) in config
                .get_n3b_knots()
                .iter()
                .zip(config.get_n3b_num_knots().iter())
            {
                for (k, &nk) in legs.iter().zip(nks.iter()) {
                    knots.push(k.clone());
                    num_knots.push(nk);
                }
            }

            let t3 = SplineTable::new(&knots, &num_knots, spline_solver);

            for t in 0..config.n3b_interactions() {
                let bl = num_knots[3 * t] - BSPLINE_ORDER;
                let bm = num_knots[3 * t + 1] - BSPLINE_ORDER;
                let bn = num_knots[3 * t + 2] - BSPLINE_ORDER;

                let dense =
                    weight_solver.get_symmetry_weights(config.get_n3b_symm()[t], bl, bm, bn);
                let template = SymmetryTemplate::from_dense(&dense);

                assert_eq!(template.len(), config.get_n3b_feature_sizes()[t]);

                flat_weights.extend_from_slice(template.get_weights());
                template_mask.extend_from_slice(template.get_mask());
                templates.push(template);
            }

            table_3b = Some(t3);
        }

        let tot_2b_features: usize = config
            .get_n2b_num_knots()
            .iter()
            .map(|&nk| nk - BSPLINE_ORDER)
            .sum();

        let reprn_length = 1
            + config.get_n_elements()
            + tot_2b_features
            + config.get_n3b_feature_sizes().iter().sum::<usize>();

        FeaturizationEngine {
            config,
            table_2b,
            table_3b,
            templates,
            flat_weights,
            template_mask,
            reprn_length,
            tot_2b_features,
            geom: None,
            filename: String::new(),
        }
    }

    pub fn reprn_length(&self) -> usize {
        self.reprn_length
    }

    pub fn get_elements(&self) -> &[i32] {
        self.config.get_elements()
    }

    // Output path of the last `featurize` run, after timestamp
    // disambiguation.
    pub fn get_filename(&self) -> &str {
        &self.filename
    }

    pub fn get_flat_weights(&self) -> &[f64] {
        &self.flat_weights
    }

    pub fn get_template_mask(&self) -> &[usize] {
        &self.template_mask
    }

    pub fn set_geometry(&mut self, geom: GeometryDataset) -> Result<(), FeaturizeError> {
        if geom.get_column_names().len() != self.reprn_length {
            return Err(
                ShapeMismatch::ColumnNames(geom.get_column_names().len(), self.reprn_length).into(),
            );
        }

        self.geom = Some(geom);

        Ok(())
    }

    pub fn display(&self) {
        const OUT_WIDTH1: usize = 28;
        const OUT_WIDTH2: usize = 18;

        println!("   {:-^80}", " featurization parameters ");
        println!();

        println!(
            "   {:<width1$} = {:>width2$}",
            "degree",
            self.config.get_degree(),
            width1 = OUT_WIDTH1,
            width2 = OUT_WIDTH2
        );

        println!(
            "   {:<width1$} = {:>width2$}",
            "n_elements",
            self.config.get_n_elements(),
            width1 = OUT_WIDTH1,
            width2 = OUT_WIDTH2
        );

        println!(
            "   {:<width1$} = {:>width2$}",
            "n2b_interactions",
            self.config.n2b_interactions(),
            width1 = OUT_WIDTH1,
            width2 = OUT_WIDTH2
        );

        println!(
            "   {:<width1$} = {:>width2$}",
            "n3b_interactions",
            self.config.n3b_interactions(),
            width1 = OUT_WIDTH1,
            width2 = OUT_WIDTH2
        );

        println!(
            "   {:<width1$} = {:>width2$}",
            "reprn_length",
            self.reprn_length,
            width1 = OUT_WIDTH1,
            width2 = OUT_WIDTH2
        );

        println!();
    }

    // Run the batch loop, streaming completed crystal row blocks into an
    // HDF5 sink at `filename`.
    pub fn featurize(
        &mut self,
        batch_size: usize,
        return_neighs: bool,
        filename: &str,
        featurize_3b: bool,
        finder: &dyn NeighborFinder,
    ) -> Result<FeaturizeOutput, FeaturizeError> {
        // all entry checks run before the sink file is created
        self.check_run(featurize_3b)?;
        self.resolve_three_body_legs()?;

        let mut writer = H5TableWriter::create(filename);
        self.filename = writer.get_filename().to_string();

        self.featurize_with(batch_size, return_neighs, featurize_3b, finder, &mut writer)
    }

    fn check_run(&self, featurize_3b: bool) -> Result<(), FeaturizeError> {
        if self.geom.is_none() {
            return Err(FeaturizeError::ConfigMismatch(
                "no geometry dataset loaded".to_string(),
            ));
        }

        if featurize_3b && self.config.get_degree() != 3 {
            return Err(FeaturizeError::ConfigMismatch(
                "three-body featurization requested but the basis holds no three-body data"
                    .to_string(),
            ));
        }

        if !featurize_3b && self.config.get_degree() == 3 {
            return Err(FeaturizeError::ConfigMismatch(
                "basis holds three-body data but three-body featurization was not requested"
                    .to_string(),
            ));
        }

        Ok(())
    }

    // The two-body slot of each three-body leg pair. A missing pair is a
    // configuration inconsistency, not a data problem.
    fn resolve_three_body_legs(&self) -> Result<Vec<(usize, usize)>, FeaturizeError> {
        let n2b_types = self.config.get_n2b_types();

        let find_pair = |a: i32, b: i32| {
            n2b_types
                .iter()
                .position(|&(pa, pb)| (pa == a && pb == b) || (pa == b && pb == a))
        };

        let mut leg_map = Vec::with_capacity(self.config.n3b_interactions());

        for &(s0, s1, s2) in self.config.get_n3b_types() {
            let index_ij = find_pair(s0, s1);
            let index_ik = find_pair(s0, s2);

            match (index_ij, index_ik) {
                (Some(ij), Some(ik)) => leg_map.push((ij, ik)),
                _ => {
                    return Err(FeaturizeError::InteractionNotFound(format!(
                        "legs of 3b interaction ({},{},{}) have no two-body neighbor list",
                        s0, s1, s2
                    )))
                }
            }
        }

        Ok(leg_map)
    }

    // Batch loop against a caller-supplied sink.
    pub fn featurize_with(
        &self,
        batch_size: usize,
        return_neighs: bool,
        featurize_3b: bool,
        finder: &dyn NeighborFinder,
        writer: &mut dyn TableWriter,
    ) -> Result<FeaturizeOutput, FeaturizeError> {
        self.check_run(featurize_3b)?;

        let leg_map = self.resolve_three_body_legs()?;

        let geom = self.geom.as_ref().unwrap();

        let len = self.reprn_length;
        let natoms = geom.get_n_atoms();
        let crystal_index = geom.get_crystal_index();

        let batch_size = batch_size.min(natoms).max(1);
        let num_batches = (natoms + batch_size - 1) / batch_size;

        // incomplete-crystal carry, alive across exactly one batch boundary
        let mut incomplete = false;
        let mut carry: Vec<f64> = Vec::new();
        let mut carry_ci = 0usize;
        let mut carry_from_cr = 0usize;

        let mut last_matrix = FeatureMatrix::default();
        let mut last_neigh: Option<NeighborTable> = None;

        for batch_numb in 0..num_batches {
            let batch_start = batch_numb * batch_size;
            let batch_end = (batch_start + batch_size).min(natoms);
            let atoms_in_batch = batch_end - batch_start;

            // conservative neighbor capacity from sphere-volume packing
            let cap = self.estimate_capacity(geom, batch_start, batch_end);

            let mut neigh =
                NeighborTable::new(atoms_in_batch, self.config.n2b_interactions(), cap);
            finder.set_neighs(geom, batch_start, batch_end, &mut neigh);

            // 4 rows per atom: energy features, then fx, fy, fz
            let mut atomic = vec![0.0; atoms_in_batch * 4 * len];

            self.accumulate_two_body(geom, &neigh, batch_start, batch_end, &mut atomic);

            if featurize_3b {
                self.accumulate_three_body(
                    geom,
                    &neigh,
                    batch_start,
                    batch_end,
                    &leg_map,
                    &mut atomic,
                );
            }

            // ---- crystal aggregation ----

            let crystal_start = crystal_index[batch_start];
            let crystal_end = crystal_index[batch_end - 1];
            let tot_crystals = crystal_end - crystal_start + 1;
            let tot_atoms = batch_end - batch_start;

            let prev_rows = if incomplete { carry.len() / len } else { 0 };
            let nrows = if incomplete {
                prev_rows + (tot_crystals - 1) + tot_atoms * 3
            } else {
                tot_crystals + tot_atoms * 3
            };

            let mut crystal_reprn = vec![0.0; nrows * len];
            if incomplete {
                crystal_reprn[..carry.len()].copy_from_slice(&carry);
            }

            let mut atom_count = if incomplete { (prev_rows - 1) / 3 } else { 0 };
            let mut prev_ci = crystal_start;
            let mut ifcr = 0usize;

            for atom1 in batch_start..batch_end {
                let ci1 = crystal_index[atom1];
                let d = 4 * (atom1 - batch_start);

                if ci1 != prev_ci {
                    let natoms_prev = geom.get_n_atoms_in_crystal(prev_ci);
                    ifcr += natoms_prev * 3 + 1;
                    atom_count = 0;
                    prev_ci = ci1;
                }

                for i in 0..len {
                    // energy features sum over the crystal's atoms
                    crystal_reprn[ifcr * len + i] += atomic[d * len + i];

                    // force rows are per atom, copied not summed
                    crystal_reprn[(ifcr + atom_count * 3 + 1) * len + i] =
                        atomic[(d + 1) * len + i];
                    crystal_reprn[(ifcr + atom_count * 3 + 2) * len + i] =
                        atomic[(d + 2) * len + i];
                    crystal_reprn[(ifcr + atom_count * 3 + 3) * len + i] =
                        atomic[(d + 3) * len + i];
                }

                crystal_reprn[ifcr * len] = geom.get_energy(ci1);

                atom_count += 1;
            }

            // ---- completeness of the batch's last crystal ----
            //
            // The one-hot composition columns of the energy row recover the
            // number of atoms aggregated so far; a shortfall against
            // geom_posn means the crystal continues in the next batch.

            let last_ci = crystal_end;
            let num_atoms_last = geom.get_n_atoms_in_crystal(last_ci);

            let mut from_cr = 0usize;
            for i in 0..self.config.get_n_elements() {
                from_cr += crystal_reprn[ifcr * len + 1 + i].ceil() as usize;
            }

            let tot_complete;
            if from_cr != num_atoms_last {
                incomplete = true;
                tot_complete = tot_crystals - 1;

                carry = vec![0.0; (1 + from_cr * 3) * len];
                carry[..len].copy_from_slice(&crystal_reprn[ifcr * len..(ifcr + 1) * len]);

                for a in 0..from_cr {
                    for rr in 1..=3 {
                        let dst = (a * 3 + rr) * len;
                        let src = (ifcr + a * 3 + rr) * len;
                        carry[dst..dst + len].copy_from_slice(&crystal_reprn[src..src + len]);
                    }
                }

                carry_ci = last_ci;
                carry_from_cr = from_cr;
            } else {
                incomplete = false;
                tot_complete = tot_crystals;
                carry.clear();
            }

            // ---- emit completed crystals ----

            if tot_complete > 0 {
                let nrow = if incomplete {
                    ifcr
                } else {
                    ifcr + 1 + from_cr * 3
                };

                let sizes: Vec<usize> = (crystal_start..crystal_start + tot_complete)
                    .map(|ci| geom.get_n_atoms_in_crystal(ci))
                    .collect();

                let names =
                    &geom.get_structure_names()[crystal_start..crystal_start + tot_complete];

                writer.append(&RowBlock {
                    data: &crystal_reprn[..nrow * len],
                    nrow,
                    ncol: len,
                    crystal_sizes: &sizes,
                    structure_names: names,
                    column_names: geom.get_column_names(),
                });
            }

            last_matrix = FeatureMatrix {
                nrow: nrows,
                ncol: len,
                data: crystal_reprn,
            };
            last_neigh = Some(neigh);
        }

        // A crystal still carried after the final batch means the dataset
        // truncates mid-crystal. Flush it as a final best-effort block
        // rather than dropping rows silently.
        if incomplete {
            let sizes = vec![carry_from_cr];
            let names = vec![geom.get_structure_names()[carry_ci].clone()];

            writer.append(&RowBlock {
                data: &carry,
                nrow: carry.len() / len,
                ncol: len,
                crystal_sizes: &sizes,
                structure_names: &names,
                column_names: geom.get_column_names(),
            });
        }

        if return_neighs {
            Ok(FeaturizeOutput::Neighbors(last_neigh.unwrap()))
        } else {
            Ok(FeaturizeOutput::Features(last_matrix))
        }
    }

    fn estimate_capacity(
        &self,
        geom: &GeometryDataset,
        batch_start: usize,
        batch_end: usize,
    ) -> usize {
        let crystal_index = geom.get_crystal_index();

        let rshell = self.config.get_rcut_max_sq().sqrt() + NEIGH_SHELL_PAD;
        let sphere_vol = FOURPI * rshell * rshell * rshell / 3.0;

        let mut neigh_in_sphere = 0.0f64;

        for ci in crystal_index[batch_start]..=crystal_index[batch_end - 1] {
            let n = geom.get_n_atoms_in_crystal(ci) as f64;
            let vol = geom.get_cell(ci).volume();

            if vol > 0.0 {
                let est = sphere_vol * n / vol;
                if est > neigh_in_sphere {
                    neigh_in_sphere = est;
                }
            }
        }

        if neigh_in_sphere < 1.0 {
            neigh_in_sphere = NEIGH_CAPACITY_FLOOR;
        }

        neigh_in_sphere.ceil() as usize
    }

    fn accumulate_two_body(
        &self,
        geom: &GeometryDataset,
        neigh: &NeighborTable,
        batch_start: usize,
        batch_end: usize,
        atomic: &mut [f64],
    ) {
        let len = self.reprn_length;
        let nelements = self.config.get_n_elements();
        let elements = self.config.get_elements();
        let rmin_max_sq = self.config.get_rmin_max_2b_sq();

        let species = geom.get_species();
        let forces = geom.get_forces();

        for atom1 in batch_start..batch_end {
            let a = atom1 - batch_start;
            let d = 4 * a;
            let z1 = species[atom1];

            // one-hot composition
            for (i, &el) in elements.iter().enumerate() {
                if z1 == el {
                    atomic[d * len + 1 + i] += 1.0;
                }
            }

            // reference force components in column 0 of the force rows
            atomic[(d + 1) * len] = forces[atom1].x;
            atomic[(d + 2) * len] = forces[atom1].y;
            atomic[(d + 3) * len] = forces[atom1].z;

            let mut basis_start = 1 + nelements;

            for ix in 0..self.config.n2b_interactions() {
                let knots = self.table_2b.get_knots(ix);
                let nk = self.table_2b.get_num_knots(ix);
                let nn = neigh.get_count(a, ix);

                let rmin = rmin_max_sq[2 * ix].sqrt();
                let rmax = rmin_max_sq[2 * ix + 1].sqrt();

                for n in 0..nn {
                    let r = neigh.get_distance(a, ix, n);

                    if !(rmin <= r && r < rmax) {
                        continue;
                    }

                    let rsq = r * r;
                    let rth = rsq * r;

                    let pos = find_span(r, knots, nk - BSPLINE_ORDER);
                    let bpos = basis_start + pos;

                    let b = self.table_2b.basis_set(ix, pos, r, rsq, rth);
                    atomic[d * len + bpos] += b[0];
                    atomic[d * len + bpos - 1] += b[1];
                    atomic[d * len + bpos - 2] += b[2];
                    atomic[d * len + bpos - 3] += b[3];

                    let deri = self.table_2b.basis_deri_set(ix, pos, r, rsq);
                    let fp = force_pair(&deri);

                    let del = neigh.get_displacement(a, ix, n).as_array();

                    // The factor of 2 compensates the single-count neighbor
                    // convention. Empirically verified normalization; do
                    // not fold it into the spline coefficients.
                    for (axis, dc) in del.iter().enumerate() {
                        let row = (d + 1 + axis) * len;
                        atomic[row + bpos] += 2.0 * fp[0] * dc;
                        atomic[row + bpos - 1] += 2.0 * fp[1] * dc;
                        atomic[row + bpos - 2] += 2.0 * fp[2] * dc;
                        atomic[row + bpos - 3] += 2.0 * fp[3] * dc;
                    }
                }

                basis_start += nk - BSPLINE_ORDER;
            }
        }
    }

    fn accumulate_three_body(
        &self,
        geom: &GeometryDataset,
        neigh: &NeighborTable,
        batch_start: usize,
        batch_end: usize,
        leg_map: &[(usize, usize)],
        atomic: &mut [f64],
    ) {
        let table3 = match &self.table_3b {
            Some(t) => t,
            None => return,
        };

        let len = self.reprn_length;
        let nelements = self.config.get_n_elements();
        let n3b_types = self.config.get_n3b_types();
        let feature_sizes = self.config.get_n3b_feature_sizes();
        let symm_classes = self.config.get_n3b_symm();
        let rmin_max_3b = self.config.get_rmin_max_3b();

        let species = geom.get_species();

        for atom1 in batch_start..batch_end {
            let a = atom1 - batch_start;
            let z1 = species[atom1];

            let mut basis_start = 1 + nelements + self.tot_2b_features;

            for (t, &(s0, s1, s2)) in n3b_types.iter().enumerate() {
                let fsize = feature_sizes[t];
                let (index_ij, index_ik) = leg_map[t];

                let z1_in = z1 == s0 || z1 == s1 || z1 == s2;
                let swap_ij = s0 == s1;
                let swap_ik = s0 == s2;

                let nn_ij = neigh.get_count(a, index_ij);
                let nn_ik = neigh.get_count(a, index_ik);

                if nn_ij > 0 && nn_ik > 0 && z1_in {
                    let leg_rows = [3 * t, 3 * t + 1, 3 * t + 2];
                    let dims = [
                        table3.num_segments(leg_rows[0]),
                        table3.num_segments(leg_rows[1]),
                        table3.num_segments(leg_rows[2]),
                    ];
                    let dsize = dims[0] * dims[1] * dims[2];

                    let mut energy_t = vec![0.0; dsize];
                    let mut force_t = [
                        vec![0.0; dsize],
                        vec![0.0; dsize],
                        vec![0.0; dsize],
                    ];

                    let windows = &rmin_max_3b[6 * t..6 * t + 6];

                    // atom2 runs over the ij list, atom3 over the ik list;
                    // identical lists enforce atom3 > atom2 so a pair is
                    // visited once
                    let a2_limit = if index_ij == index_ik {
                        nn_ij - 1
                    } else {
                        nn_ij
                    };

                    for a2 in 0..a2_limit {
                        let a3_start = if index_ij == index_ik { a2 + 1 } else { 0 };

                        for a3 in a3_start..nn_ik {
                            let r_ij = neigh.get_distance(a, index_ij, a2);
                            let r_ik = neigh.get_distance(a, index_ik, a3);

                            let del_ij = neigh.get_displacement(a, index_ij, a2);
                            let del_ik = neigh.get_displacement(a, index_ik, a3);

                            // close the triangle from the stored legs
                            let jk = del_ik * r_ik - del_ij * r_ij;
                            let r_jk = jk.norm2();

                            let rs = [r_ij, r_ik, r_jk];
                            let dels = [del_ij, del_ik];

                            eval_triangle_ordering(
                                &ORDER_CANONICAL,
                                &rs,
                                &dels,
                                windows,
                                table3,
                                &leg_rows,
                                &dims,
                                &mut energy_t,
                                &mut force_t,
                            );

                            if swap_ij {
                                eval_triangle_ordering(
                                    &ORDER_SWAP_IJ,
                                    &rs,
                                    &dels,
                                    windows,
                                    table3,
                                    &leg_rows,
                                    &dims,
                                    &mut energy_t,
                                    &mut force_t,
                                );
                            }

                            if swap_ik {
                                eval_triangle_ordering(
                                    &ORDER_SWAP_IK,
                                    &rs,
                                    &dels,
                                    windows,
                                    table3,
                                    &leg_rows,
                                    &dims,
                                    &mut energy_t,
                                    &mut force_t,
                                );
                            }
                        }
                    }

                    // fold by symmetry class, gather through the template,
                    // add into the interaction's feature columns
                    let symm = symm_classes[t];
                    let template = &self.templates[t];

                    let mut flat = vec![0.0; fsize];
                    let d4 = 4 * a;

                    let folded = fold(symm, &energy_t, dims[0], dims[1], dims[2]);
                    template.compress(&folded, &mut flat);
                    for (i, v) in flat.iter().enumerate() {
                        atomic[d4 * len + basis_start + i] += v;
                    }

                    for (axis, tensor) in force_t.iter().enumerate() {
                        let folded = fold(symm, tensor, dims[0], dims[1], dims[2]);
                        template.compress(&folded, &mut flat);
                        for (i, v) in flat.iter().enumerate() {
                            atomic[(d4 + 1 + axis) * len + basis_start + i] += v;
                        }
                    }
                }

                basis_start += fsize;
            }
        }
    }
}

#[cfg(test)]
mod tests;
