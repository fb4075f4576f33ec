use std::path::Path;

use chrono::Local;
use hdf5::types::VarLenUnicode;
use ndarray::ArrayView2;

// Columnar feature sink.
//
// Every emitted block becomes one HDF5 group `features_<n>` with the
// layout the downstream fitting code expects:
// - axis0          column names
// - axis1_label0   1-based local crystal ordinal per row
// - axis1_label1   within-crystal row counter (0 = energy, 1..3N = forces)
// - axis1_level0   structure names, one per complete crystal
// - axis1_level1   descriptor names (energy, fx_i, fy_i, fz_i)
// - block0_items   column names again
// - block0_values  dense nrow x ncol f64 matrix
// The group counter only ever increases within one file.

// One block of crystal-aggregated feature rows plus its labels.
#[derive(Debug)]
pub struct RowBlock<'a> {
    pub data: &'a [f64],
    pub nrow: usize,
    pub ncol: usize,
    // atoms per complete crystal in this block, in emission order
    pub crystal_sizes: &'a [usize],
    pub structure_names: &'a [String],
    pub column_names: &'a [String],
}

pub trait TableWriter {
    fn append(&mut self, block: &RowBlock);
}

pub struct H5TableWriter {
    file: hdf5::File,
    filename: String,
    counter: usize,
}

impl H5TableWriter {
    // Creates the output file. An existing path is not overwritten; a
    // timestamp suffix disambiguates instead.
    pub fn create(path: &str) -> H5TableWriter {
        let filename = if Path::new(path).exists() {
            format!("{}_{}", path, Local::now().format("%Y_%m_%d_%H_%M_%S"))
        } else {
            path.to_string()
        };

        let file = hdf5::File::create(&filename).unwrap();

        H5TableWriter {
            file,
            filename,
            counter: 0,
        }
    }

    pub fn get_filename(&self) -> &str {
        &self.filename
    }

    pub fn get_counter(&self) -> usize {
        self.counter
    }
}

fn to_unicode(names: &[String]) -> Vec<VarLenUnicode> {
    names.iter().map(|s| s.parse().unwrap()).collect()
}

impl TableWriter for H5TableWriter {
    fn append(&mut self, block: &RowBlock) {
        let expected_rows: usize = block.crystal_sizes.iter().map(|&n| 1 + 3 * n).sum();
        assert_eq!(block.nrow, expected_rows);
        assert_eq!(block.data.len(), block.nrow * block.ncol);

        let group = self
            .file
            .create_group(&format!("features_{}", self.counter))
            .unwrap();

        // column names

        let columns = to_unicode(block.column_names);

        group
            .new_dataset_builder()
            .with_data(&columns)
            .create("axis0")
            .unwrap();

        // per-row crystal ordinal and row counter

        let mut ci_to_write: Vec<i32> = Vec::with_capacity(block.nrow);
        let mut desc_count: Vec<i32> = Vec::with_capacity(block.nrow);

        for (local, &natoms) in block.crystal_sizes.iter().enumerate() {
            for j in 0..(3 * natoms + 1) {
                ci_to_write.push(local as i32 + 1);
                desc_count.push(j as i32);
            }
        }

        group
            .new_dataset_builder()
            .with_data(&ci_to_write)
            .create("axis1_label0")
            .unwrap();

        group
            .new_dataset_builder()
            .with_data(&desc_count)
            .create("axis1_label1")
            .unwrap();

        // structure names

        let names = to_unicode(block.structure_names);

        group
            .new_dataset_builder()
            .with_data(&names)
            .create("axis1_level0")
            .unwrap();

        // descriptor names up to the largest crystal of this block

        let max_crystal_size = block.crystal_sizes.iter().copied().max().unwrap_or(0);

        let mut descriptors = Vec::with_capacity(1 + 3 * max_crystal_size);
        descriptors.push("energy".to_string());
        for i in 0..max_crystal_size {
            descriptors.push(format!("fx_{}", i));
            descriptors.push(format!("fy_{}", i));
            descriptors.push(format!("fz_{}", i));
        }

        let descriptors = to_unicode(&descriptors);

        group
            .new_dataset_builder()
            .with_data(&descriptors)
            .create("axis1_level1")
            .unwrap();

        // column names again, pandas-style

        group
            .new_dataset_builder()
            .with_data(&columns)
            .create("block0_items")
            .unwrap();

        // the feature matrix

        let values = ArrayView2::from_shape((block.nrow, block.ncol), block.data).unwrap();

        group
            .new_dataset_builder()
            .with_data(values)
            .create("block0_values")
            .unwrap();

        self.counter += 1;
    }
}
