use super::*;

use approx::assert_abs_diff_eq;
use geometry::Cell;
use neighbs::SupercellNeighborFinder;
use symmetry::{compressed_size, SymmClass};
use vector3::Vector3f64;

// ---- helpers ----

// Sink that keeps every emitted block in memory.
#[derive(Default)]
struct VecWriter {
    blocks: Vec<(Vec<f64>, usize, usize)>,
    sizes: Vec<Vec<usize>>,
    names: Vec<Vec<String>>,
}

impl VecWriter {
    fn all_rows(&self) -> Vec<f64> {
        let mut out = Vec::new();
        for (data, _, _) in &self.blocks {
            out.extend_from_slice(data);
        }
        out
    }
}

impl TableWriter for VecWriter {
    fn append(&mut self, block: &RowBlock) {
        self.blocks
            .push((block.data.to_vec(), block.nrow, block.ncol));
        self.sizes.push(block.crystal_sizes.to_vec());
        self.names.push(block.structure_names.to_vec());
    }
}

// clamped knot vector on [1, 5] with unit interior spacing: 7 segments
fn knots_1_5() -> Vec<f64> {
    vec![1.0, 1.0, 1.0, 1.0, 2.0, 3.0, 4.0, 5.0, 5.0, 5.0, 5.0]
}

fn two_body_config() -> InteractionConfig {
    InteractionConfig::two_body(vec![13], vec![(13, 13)], vec![knots_1_5()], vec![11])
}

fn finder_for(config: &InteractionConfig) -> SupercellNeighborFinder {
    SupercellNeighborFinder::new(
        config.get_n2b_types().to_vec(),
        config.get_rmin_max_2b_sq().to_vec(),
    )
}

fn columns(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("c{}", i)).collect()
}

fn cubic_cell(a: f64) -> Cell {
    Cell::new(&[[a, 0.0, 0.0], [0.0, a, 0.0], [0.0, 0.0, a]])
}

// one Al dimer, separation 2.0
fn dimer_dataset(ncols: usize) -> GeometryDataset {
    GeometryDataset::new(
        vec![13, 13],
        vec![
            Vector3f64::new(0.0, 0.0, 0.0),
            Vector3f64::new(2.0, 0.0, 0.0),
        ],
        vec![
            Vector3f64::new(0.1, 0.0, 0.0),
            Vector3f64::new(-0.1, 0.0, 0.0),
        ],
        vec![-3.5],
        vec![cubic_cell(20.0)],
        vec![0, 0],
        vec![[1, 1, 1]],
        vec![0, 2],
        vec!["dimer".to_string()],
        columns(ncols),
    )
    .unwrap()
}

// two Al dimers in separate crystals, different separations and forces
fn two_crystal_dataset(ncols: usize) -> GeometryDataset {
    GeometryDataset::new(
        vec![13, 13, 13, 13],
        vec![
            Vector3f64::new(0.0, 0.0, 0.0),
            Vector3f64::new(2.0, 0.0, 0.0),
            Vector3f64::new(0.0, 0.0, 0.0),
            Vector3f64::new(2.5, 0.0, 0.0),
        ],
        vec![
            Vector3f64::new(0.1, 0.0, 0.0),
            Vector3f64::new(-0.1, 0.0, 0.0),
            Vector3f64::new(0.05, 0.02, 0.0),
            Vector3f64::new(-0.05, -0.02, 0.0),
        ],
        vec![-3.5, -4.2],
        vec![cubic_cell(20.0), cubic_cell(20.0)],
        vec![0, 0, 1, 1],
        vec![[1, 1, 1], [1, 1, 1]],
        vec![0, 2, 4],
        vec!["dimer_a".to_string(), "dimer_b".to_string()],
        columns(ncols),
    )
    .unwrap()
}

// ---- construction ----

#[test]
fn test_reprn_length_two_body() {
    let engine = FeaturizationEngine::new(two_body_config());
    // 1 bias + 1 element + 7 two-body segments
    assert_eq!(engine.reprn_length(), 9);
    assert_eq!(engine.get_elements(), &[13]);
}

#[test]
fn test_reprn_length_three_body() {
    let fsize = compressed_size(SymmClass::Full, 7, 7, 7);
    let config = InteractionConfig::three_body(
        vec![13],
        vec![(13, 13)],
        vec![knots_1_5()],
        vec![11],
        vec![(13, 13, 13)],
        vec![[knots_1_5(), knots_1_5(), knots_1_5()]],
        vec![[11, 11, 11]],
        vec![3],
        vec![fsize],
    );

    let engine = FeaturizationEngine::new(config);
    assert_eq!(engine.reprn_length(), 9 + fsize);
    assert_eq!(engine.get_flat_weights().len(), fsize);
    assert_eq!(engine.get_template_mask().len(), fsize);
}

// ---- entry checks ----

#[test]
fn test_column_names_length_checked() {
    let mut engine = FeaturizationEngine::new(two_body_config());
    let geom = dimer_dataset(4); // reprn_length is 9

    assert!(matches!(
        engine.set_geometry(geom),
        Err(FeaturizeError::Shape(ShapeMismatch::ColumnNames(4, 9)))
    ));
}

#[test]
fn test_three_body_flag_mismatch() {
    let mut engine = FeaturizationEngine::new(two_body_config());
    engine.set_geometry(dimer_dataset(9)).unwrap();

    let finder = finder_for(&two_body_config());
    let mut writer = VecWriter::default();

    let result = engine.featurize_with(10, false, true, &finder, &mut writer);
    assert!(matches!(result, Err(FeaturizeError::ConfigMismatch(_))));
    assert!(writer.blocks.is_empty());
}

#[test]
fn test_two_body_flag_mismatch() {
    let fsize = compressed_size(SymmClass::Full, 7, 7, 7);
    let config = InteractionConfig::three_body(
        vec![13],
        vec![(13, 13)],
        vec![knots_1_5()],
        vec![11],
        vec![(13, 13, 13)],
        vec![[knots_1_5(), knots_1_5(), knots_1_5()]],
        vec![[11, 11, 11]],
        vec![3],
        vec![fsize],
    );

    let mut engine = FeaturizationEngine::new(config);
    engine.set_geometry(dimer_dataset(9 + fsize)).unwrap();

    let finder = finder_for(&two_body_config());
    let mut writer = VecWriter::default();

    let result = engine.featurize_with(10, false, false, &finder, &mut writer);
    assert!(matches!(result, Err(FeaturizeError::ConfigMismatch(_))));
}

#[test]
fn test_interaction_not_found() {
    // the (13,8,8) legs need a (13,8) two-body list that does not exist
    let fsize = compressed_size(SymmClass::SwapIj, 7, 7, 7);
    let config = InteractionConfig::three_body(
        vec![13, 8],
        vec![(13, 13)],
        vec![knots_1_5()],
        vec![11],
        vec![(13, 8, 8)],
        vec![[knots_1_5(), knots_1_5(), knots_1_5()]],
        vec![[11, 11, 11]],
        vec![2],
        vec![fsize],
    );

    let reprn = 1 + 2 + 7 + fsize;
    let mut engine = FeaturizationEngine::new(config);
    assert_eq!(engine.reprn_length(), reprn);

    engine.set_geometry(dimer_dataset(reprn)).unwrap();

    let finder = finder_for(&two_body_config());
    let mut writer = VecWriter::default();

    let result = engine.featurize_with(10, false, true, &finder, &mut writer);
    assert!(matches!(result, Err(FeaturizeError::InteractionNotFound(_))));
}

// ---- two-body end to end ----

#[test]
fn test_two_body_dimer_features() {
    let config = two_body_config();
    let finder = finder_for(&config);

    let mut engine = FeaturizationEngine::new(config);
    engine.set_geometry(dimer_dataset(9)).unwrap();

    let mut writer = VecWriter::default();
    let out = engine
        .featurize_with(10, false, false, &finder, &mut writer)
        .unwrap();

    let m = match out {
        FeaturizeOutput::Features(m) => m,
        _ => panic!("expected feature matrix"),
    };

    // 1 energy row + 3 force rows per atom
    assert_eq!(m.nrow, 7);
    assert_eq!(m.ncol, 9);

    let row = |i: usize| &m.data[i * 9..(i + 1) * 9];

    // energy row: reference energy, composition count, basis activations
    assert_eq!(row(0)[0], -3.5);
    assert_eq!(row(0)[1], 2.0);

    // each atom sees one neighbor at r = 2.0; the 4 cubic values sum to 1
    let spline_sum: f64 = row(0)[2..].iter().sum();
    assert_abs_diff_eq!(spline_sum, 2.0, epsilon = 1e-12);

    // force rows carry the input force in column 0
    assert_eq!(row(1)[0], 0.1);
    assert_eq!(row(4)[0], -0.1);

    // derivative telescoping: spline columns of a force row sum to zero
    for r in &[1usize, 4] {
        let s: f64 = row(*r)[2..].iter().sum();
        assert_abs_diff_eq!(s, 0.0, epsilon = 1e-12);
    }

    // the kernel actually fired
    let max_fx = row(1)[2..].iter().cloned().fold(0.0f64, |m, v| m.max(v.abs()));
    assert!(max_fx > 0.1);

    // opposite displacement, opposite projection
    for i in 2..9 {
        assert_abs_diff_eq!(row(1)[i], -row(4)[i], epsilon = 1e-12);
    }

    // displacement is along x only
    for i in 2..9 {
        assert_eq!(row(2)[i], 0.0);
        assert_eq!(row(3)[i], 0.0);
    }

    // sink got one complete crystal
    assert_eq!(writer.blocks.len(), 1);
    assert_eq!(writer.blocks[0].1, 7);
    assert_eq!(writer.sizes[0], vec![2]);
    assert_eq!(writer.names[0], vec!["dimer".to_string()]);
}

#[test]
fn test_composition_sum_matches_atom_count() {
    let config = two_body_config();
    let finder = finder_for(&config);

    let mut engine = FeaturizationEngine::new(config);
    engine.set_geometry(two_crystal_dataset(9)).unwrap();

    let mut writer = VecWriter::default();
    engine
        .featurize_with(10, false, false, &finder, &mut writer)
        .unwrap();

    // single batch, both crystals in one block: energy rows at 0 and 7
    let data = &writer.blocks[0].0;
    let nrow = writer.blocks[0].1;
    let ncol = writer.blocks[0].2;
    assert_eq!(nrow, 14);

    assert_eq!(data[1], 2.0);
    assert_eq!(data[7 * ncol + 1], 2.0);
}

#[test]
fn test_idempotent_runs() {
    let config = two_body_config();
    let finder = finder_for(&config);

    let mut engine = FeaturizationEngine::new(config);
    engine.set_geometry(two_crystal_dataset(9)).unwrap();

    let mut writer_a = VecWriter::default();
    let mut writer_b = VecWriter::default();

    engine
        .featurize_with(4, false, false, &finder, &mut writer_a)
        .unwrap();
    engine
        .featurize_with(4, false, false, &finder, &mut writer_b)
        .unwrap();

    assert_eq!(writer_a.all_rows(), writer_b.all_rows());
}

// Aggregated rows must not depend on how the atom stream is batched:
// 1, a prime not dividing the atom count, and the full dataset.
#[test]
fn test_batch_size_invariance() {
    let config = two_body_config();
    let finder = finder_for(&config);

    let mut engine = FeaturizationEngine::new(config);
    engine.set_geometry(two_crystal_dataset(9)).unwrap();

    let mut rows_by_batch = Vec::new();

    for &batch_size in &[1usize, 3, 4] {
        let mut writer = VecWriter::default();
        engine
            .featurize_with(batch_size, false, false, &finder, &mut writer)
            .unwrap();

        // every crystal is eventually emitted exactly once
        let total: usize = writer.sizes.iter().flatten().count();
        assert_eq!(total, 2);

        rows_by_batch.push(writer.all_rows());
    }

    assert_eq!(rows_by_batch[0].len(), 14 * 9);
    assert_eq!(rows_by_batch[0], rows_by_batch[1]);
    assert_eq!(rows_by_batch[0], rows_by_batch[2]);
}

// A 2-atom crystal split by batch_size = 1 must match the single-batch
// result exactly.
#[test]
fn test_crystal_straddling_batch_boundary() {
    let config = two_body_config();
    let finder = finder_for(&config);

    let mut engine = FeaturizationEngine::new(config);
    engine.set_geometry(dimer_dataset(9)).unwrap();

    let mut split = VecWriter::default();
    let mut whole = VecWriter::default();

    engine
        .featurize_with(1, false, false, &finder, &mut split)
        .unwrap();
    engine
        .featurize_with(2, false, false, &finder, &mut whole)
        .unwrap();

    // the split run emits nothing after batch 0, everything after batch 1
    assert_eq!(split.blocks.len(), 1);
    assert_eq!(whole.blocks.len(), 1);
    assert_eq!(split.all_rows(), whole.all_rows());
}

#[test]
fn test_neighbor_output_mode() {
    let config = two_body_config();
    let finder = finder_for(&config);

    let mut engine = FeaturizationEngine::new(config);
    engine.set_geometry(dimer_dataset(9)).unwrap();

    let mut writer = VecWriter::default();
    let out = engine
        .featurize_with(10, true, false, &finder, &mut writer)
        .unwrap();

    match out {
        FeaturizeOutput::Neighbors(table) => {
            assert_eq!(table.get_n_atoms(), 2);
            assert_eq!(table.get_count(0, 0), 1);
            assert_eq!(table.get_distance(0, 0, 0), 2.0);
        }
        _ => panic!("expected neighbor table"),
    }
}

// ---- three-body end to end ----

#[test]
fn test_trimer_three_body_sums() {
    let fsize = compressed_size(SymmClass::Full, 7, 7, 7);
    let config = InteractionConfig::three_body(
        vec![13],
        vec![(13, 13)],
        vec![knots_1_5()],
        vec![11],
        vec![(13, 13, 13)],
        vec![[knots_1_5(), knots_1_5(), knots_1_5()]],
        vec![[11, 11, 11]],
        vec![3],
        vec![fsize],
    );

    let finder = finder_for(&config);
    let reprn = 9 + fsize;

    // equilateral Al trimer, side 2.0
    let geom = GeometryDataset::new(
        vec![13, 13, 13],
        vec![
            Vector3f64::new(0.0, 0.0, 0.0),
            Vector3f64::new(2.0, 0.0, 0.0),
            Vector3f64::new(1.0, 3.0f64.sqrt(), 0.0),
        ],
        vec![Vector3f64::zeros(); 3],
        vec![-7.0],
        vec![cubic_cell(20.0)],
        vec![0, 0, 0],
        vec![[1, 1, 1]],
        vec![0, 3],
        vec!["trimer".to_string()],
        columns(reprn),
    )
    .unwrap();

    let mut engine = FeaturizationEngine::new(config);
    engine.set_geometry(geom).unwrap();

    let mut writer = VecWriter::default();
    let out = engine
        .featurize_with(10, false, true, &finder, &mut writer)
        .unwrap();

    let m = match out {
        FeaturizeOutput::Features(m) => m,
        _ => panic!("expected feature matrix"),
    };

    assert_eq!(m.nrow, 10);
    assert_eq!(m.ncol, reprn);

    let row = |i: usize| &m.data[i * reprn..(i + 1) * reprn];

    // composition and two-body block: 2 neighbors per atom
    assert_eq!(row(0)[1], 3.0);
    let sum_2b: f64 = row(0)[2..9].iter().sum();
    assert_abs_diff_eq!(sum_2b, 6.0, epsilon = 1e-10);

    // the compressed three-body block preserves the dense tensor sum:
    // one canonical triangle per center atom, each summing to 1
    let sum_3b: f64 = row(0)[9..].iter().sum();
    assert_abs_diff_eq!(sum_3b, 3.0, epsilon = 1e-10);

    // derivative products telescope to zero over the tensor
    for atom in 0..3 {
        for axis in 0..3 {
            let r = row(1 + atom * 3 + axis);
            let s: f64 = r[9..].iter().sum();
            assert_abs_diff_eq!(s, 0.0, epsilon = 1e-10);
        }
    }
}

// The three-body block must also be invariant to batching.
#[test]
fn test_three_body_batch_invariance() {
    let fsize = compressed_size(SymmClass::Full, 7, 7, 7);

    let make_config = || {
        InteractionConfig::three_body(
            vec![13],
            vec![(13, 13)],
            vec![knots_1_5()],
            vec![11],
            vec![(13, 13, 13)],
            vec![[knots_1_5(), knots_1_5(), knots_1_5()]],
            vec![[11, 11, 11]],
            vec![3],
            vec![fsize],
        )
    };

    let reprn = 9 + fsize;

    let make_geom = || {
        GeometryDataset::new(
            vec![13, 13, 13],
            vec![
                Vector3f64::new(0.0, 0.0, 0.0),
                Vector3f64::new(2.0, 0.0, 0.0),
                Vector3f64::new(0.9, 1.9, 0.0),
            ],
            vec![
                Vector3f64::new(0.02, -0.01, 0.0),
                Vector3f64::new(-0.03, 0.0, 0.01),
                Vector3f64::new(0.01, 0.01, -0.01),
            ],
            vec![-7.0],
            vec![cubic_cell(20.0)],
            vec![0, 0, 0],
            vec![[1, 1, 1]],
            vec![0, 3],
            vec!["trimer".to_string()],
            columns(reprn),
        )
        .unwrap()
    };

    let finder = finder_for(&make_config());

    let mut rows_by_batch = Vec::new();

    for &batch_size in &[1usize, 2, 3] {
        let mut engine = FeaturizationEngine::new(make_config());
        engine.set_geometry(make_geom()).unwrap();

        let mut writer = VecWriter::default();
        engine
            .featurize_with(batch_size, false, true, &finder, &mut writer)
            .unwrap();

        rows_by_batch.push(writer.all_rows());
    }

    assert_eq!(rows_by_batch[0].len(), 10 * reprn);
    assert_eq!(rows_by_batch[0], rows_by_batch[1]);
    assert_eq!(rows_by_batch[0], rows_by_batch[2]);
}

// ---- hdf5 sink ----

#[test]
fn test_featurize_writes_hdf5_groups() {
    let dir = tempfile::tempdir().unwrap();
    let path_a = dir.path().join("full.h5");
    let path_b = dir.path().join("split.h5");

    let config = two_body_config();
    let finder = finder_for(&config);

    let mut engine = FeaturizationEngine::new(config);
    engine.set_geometry(two_crystal_dataset(9)).unwrap();

    engine
        .featurize(4, false, path_a.to_str().unwrap(), false, &finder)
        .unwrap();
    assert_eq!(engine.get_filename(), path_a.to_str().unwrap());

    engine
        .featurize(1, false, path_b.to_str().unwrap(), false, &finder)
        .unwrap();

    // single batch: one group holding all 14 rows
    let file_a = hdf5::File::open(&path_a).unwrap();
    let group = file_a.group("features_0").unwrap();
    let values_a: Vec<f64> = group
        .dataset("block0_values")
        .unwrap()
        .read_raw()
        .unwrap();
    assert_eq!(values_a.len(), 14 * 9);

    // batch size 1: two groups, one complete crystal each
    let file_b = hdf5::File::open(&path_b).unwrap();
    let mut values_b = Vec::new();
    for g in 0..2 {
        let group = file_b.group(&format!("features_{}", g)).unwrap();
        let mut v: Vec<f64> = group
            .dataset("block0_values")
            .unwrap()
            .read_raw()
            .unwrap();
        values_b.append(&mut v);
    }

    assert_eq!(values_a, values_b);
}
