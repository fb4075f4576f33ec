use thiserror::Error;
use vector3::Vector3f64;

// Geometry dataset container.
//
// Holds the parallel per-atom and per-crystal arrays the featurizer
// consumes. All shape invariants are checked once at construction; the
// batch loop indexes without further validation.
//
// Conventions:
// - atoms are ordered by crystal, `crystal_index` is monotone non-decreasing
// - `geom_posn` has one entry per crystal plus a trailing total atom count
// - cell rows are the lattice vectors in cartesian coordinates

#[derive(Debug, Error)]
pub enum ShapeMismatch {
    #[error("species count {0} != crystal_index count {1}")]
    SpeciesVsCrystalIndex(usize, usize),

    #[error("atom count {0} != geom_posn[-1] {1}")]
    AtomsVsGeomPosn(usize, usize),

    #[error("forces count {0} != atom count {1}")]
    ForcesVsAtoms(usize, usize),

    #[error("positions count {0} != atom count {1}")]
    PositionsVsAtoms(usize, usize),

    #[error("cell count {0} != supercell_factors count {1} != geom_posn count - 1 {2}")]
    CellsVsCrystals(usize, usize, usize),

    #[error("cell count {0} != energy count {1}")]
    CellsVsEnergies(usize, usize),

    #[error("structure_names is not of the right length: {0} != {1}")]
    StructureNames(usize, usize),

    #[error("geom_posn is not monotonically non-decreasing at entry {0}")]
    GeomPosnOrder(usize),

    #[error("crystal_index is not monotonically non-decreasing at atom {0}")]
    CrystalIndexOrder(usize),

    #[error("dataset contains no atoms")]
    Empty,

    #[error("column_names is not of the right length: {0} != {1}")]
    ColumnNames(usize, usize),
}

// 3x3 simulation cell, rows are lattice vectors.
#[derive(Debug, Default, Clone, Copy)]
pub struct Cell {
    a: Vector3f64,
    b: Vector3f64,
    c: Vector3f64,
}

impl Cell {
    pub fn new(rows: &[[f64; 3]; 3]) -> Cell {
        Cell {
            a: Vector3f64::new(rows[0][0], rows[0][1], rows[0][2]),
            b: Vector3f64::new(rows[1][0], rows[1][1], rows[1][2]),
            c: Vector3f64::new(rows[2][0], rows[2][1], rows[2][2]),
        }
    }

    pub fn get_vector_a(&self) -> Vector3f64 {
        self.a
    }

    pub fn get_vector_b(&self) -> Vector3f64 {
        self.b
    }

    pub fn get_vector_c(&self) -> Vector3f64 {
        self.c
    }

    // Signed volume, the determinant of the row matrix.
    pub fn volume(&self) -> f64 {
        self.a.dot_product(&self.b.cross_product(&self.c))
    }
}

#[derive(Debug, Default)]
pub struct GeometryDataset {
    species: Vec<i32>,
    positions: Vec<Vector3f64>,
    forces: Vec<Vector3f64>,
    energies: Vec<f64>,
    cells: Vec<Cell>,
    crystal_index: Vec<usize>,
    supercell_factors: Vec<[usize; 3]>,
    geom_posn: Vec<usize>,
    structure_names: Vec<String>,
    column_names: Vec<String>,
}

impl GeometryDataset {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        species: Vec<i32>,
        positions: Vec<Vector3f64>,
        forces: Vec<Vector3f64>,
        energies: Vec<f64>,
        cells: Vec<Cell>,
        crystal_index: Vec<usize>,
        supercell_factors: Vec<[usize; 3]>,
        geom_posn: Vec<usize>,
        structure_names: Vec<String>,
        column_names: Vec<String>,
    ) -> Result<GeometryDataset, ShapeMismatch> {
        let natoms = species.len();

        if natoms == 0 {
            return Err(ShapeMismatch::Empty);
        }

        if natoms != crystal_index.len() {
            return Err(ShapeMismatch::SpeciesVsCrystalIndex(
                natoms,
                crystal_index.len(),
            ));
        }

        if positions.len() != natoms {
            return Err(ShapeMismatch::PositionsVsAtoms(positions.len(), natoms));
        }

        match geom_posn.last() {
            Some(&last) if last == natoms => {}
            _ => {
                return Err(ShapeMismatch::AtomsVsGeomPosn(
                    natoms,
                    geom_posn.last().copied().unwrap_or(0),
                ))
            }
        }

        if forces.len() != natoms {
            return Err(ShapeMismatch::ForcesVsAtoms(forces.len(), natoms));
        }

        let ncrystals = geom_posn.len() - 1;

        if cells.len() != supercell_factors.len() || supercell_factors.len() != ncrystals {
            return Err(ShapeMismatch::CellsVsCrystals(
                cells.len(),
                supercell_factors.len(),
                ncrystals,
            ));
        }

        if cells.len() != energies.len() {
            return Err(ShapeMismatch::CellsVsEnergies(cells.len(), energies.len()));
        }

        if structure_names.len() != ncrystals {
            return Err(ShapeMismatch::StructureNames(
                structure_names.len(),
                ncrystals,
            ));
        }

        for i in 1..geom_posn.len() {
            if geom_posn[i] < geom_posn[i - 1] {
                return Err(ShapeMismatch::GeomPosnOrder(i));
            }
        }

        for i in 1..crystal_index.len() {
            if crystal_index[i] < crystal_index[i - 1] {
                return Err(ShapeMismatch::CrystalIndexOrder(i));
            }
        }

        Ok(GeometryDataset {
            species,
            positions,
            forces,
            energies,
            cells,
            crystal_index,
            supercell_factors,
            geom_posn,
            structure_names,
            column_names,
        })
    }

    pub fn get_n_atoms(&self) -> usize {
        self.species.len()
    }

    pub fn get_n_crystals(&self) -> usize {
        self.geom_posn.len() - 1
    }

    pub fn get_species(&self) -> &[i32] {
        &self.species
    }

    pub fn get_positions(&self) -> &[Vector3f64] {
        &self.positions
    }

    pub fn get_forces(&self) -> &[Vector3f64] {
        &self.forces
    }

    pub fn get_energy(&self, ci: usize) -> f64 {
        self.energies[ci]
    }

    pub fn get_cell(&self, ci: usize) -> &Cell {
        &self.cells[ci]
    }

    pub fn get_crystal_index(&self) -> &[usize] {
        &self.crystal_index
    }

    pub fn get_supercell_factors(&self, ci: usize) -> [usize; 3] {
        self.supercell_factors[ci]
    }

    // Atom index range [start, end) of one crystal.
    pub fn get_atom_range(&self, ci: usize) -> (usize, usize) {
        (self.geom_posn[ci], self.geom_posn[ci + 1])
    }

    pub fn get_n_atoms_in_crystal(&self, ci: usize) -> usize {
        self.geom_posn[ci + 1] - self.geom_posn[ci]
    }

    pub fn get_structure_names(&self) -> &[String] {
        &self.structure_names
    }

    pub fn get_column_names(&self) -> &[String] {
        &self.column_names
    }
}
