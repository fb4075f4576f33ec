use geometry::GeometryDataset;
use ufconsts::*;
use vector3::Vector3f64;

// Per-batch neighbor storage.
//
// One row per (atom-in-batch, two-body interaction), `cap` slots per row,
// zero padded. Distances and unit displacement vectors are stored flat so
// the accumulation loops index with plain offset arithmetic. The table is
// recreated each batch, sized to that batch.

#[derive(Debug, Default)]
pub struct NeighborTable {
    natoms: usize,
    ninterxn: usize,
    cap: usize,
    dist: Vec<f64>,
    del: Vec<f64>,
    count: Vec<usize>,
}

impl NeighborTable {
    pub fn new(natoms: usize, ninterxn: usize, cap: usize) -> NeighborTable {
        NeighborTable {
            natoms,
            ninterxn,
            cap,
            dist: vec![0.0; natoms * ninterxn * cap],
            del: vec![0.0; natoms * ninterxn * cap * 3],
            count: vec![0; natoms * ninterxn],
        }
    }

    pub fn get_n_atoms(&self) -> usize {
        self.natoms
    }

    pub fn get_n_interactions(&self) -> usize {
        self.ninterxn
    }

    pub fn get_capacity(&self) -> usize {
        self.cap
    }

    pub fn get_count(&self, atom: usize, ix: usize) -> usize {
        self.count[atom * self.ninterxn + ix]
    }

    pub fn get_distance(&self, atom: usize, ix: usize, n: usize) -> f64 {
        self.dist[(atom * self.ninterxn + ix) * self.cap + n]
    }

    // Unit vector pointing from the central atom to the neighbor.
    pub fn get_displacement(&self, atom: usize, ix: usize, n: usize) -> Vector3f64 {
        let base = ((atom * self.ninterxn + ix) * self.cap + n) * 3;
        Vector3f64::new(self.del[base], self.del[base + 1], self.del[base + 2])
    }

    // Append one neighbor; a full row drops the entry and reports false.
    pub fn push(&mut self, atom: usize, ix: usize, r: f64, del: Vector3f64) -> bool {
        let row = atom * self.ninterxn + ix;
        let n = self.count[row];

        if n >= self.cap {
            return false;
        }

        self.dist[row * self.cap + n] = r;

        let base = (row * self.cap + n) * 3;
        self.del[base] = del.x;
        self.del[base + 1] = del.y;
        self.del[base + 2] = del.z;

        self.count[row] = n + 1;

        true
    }

    // Flat distance tensor, [natoms][ninterxn][cap] in row-major order.
    pub fn get_distances_flat(&self) -> &[f64] {
        &self.dist
    }
}

pub trait NeighborFinder {
    fn set_neighs(
        &self,
        geom: &GeometryDataset,
        batch_start: usize,
        batch_end: usize,
        table: &mut NeighborTable,
    );
}

// Reference finder: brute-force scan over the periodic images of every
// atom in the central atom's crystal, bounded by the per-crystal supercell
// replication factors.
#[derive(Debug)]
pub struct SupercellNeighborFinder {
    pairs: Vec<(i32, i32)>,
    rmin_max_sq: Vec<f64>,
}

impl SupercellNeighborFinder {
    // `rmin_max_sq` holds [rmin^2, rmax^2] per two-body interaction.
    pub fn new(pairs: Vec<(i32, i32)>, rmin_max_sq: Vec<f64>) -> SupercellNeighborFinder {
        assert_eq!(rmin_max_sq.len(), 2 * pairs.len());

        SupercellNeighborFinder { pairs, rmin_max_sq }
    }
}

impl NeighborFinder for SupercellNeighborFinder {
    fn set_neighs(
        &self,
        geom: &GeometryDataset,
        batch_start: usize,
        batch_end: usize,
        table: &mut NeighborTable,
    ) {
        let species = geom.get_species();
        let positions = geom.get_positions();
        let crystal_index = geom.get_crystal_index();

        for atom1 in batch_start..batch_end {
            let d = atom1 - batch_start;

            let ci = crystal_index[atom1];
            let (cs, ce) = geom.get_atom_range(ci);

            let cell = geom.get_cell(ci);
            let va = cell.get_vector_a();
            let vb = cell.get_vector_b();
            let vc = cell.get_vector_c();

            let [fa, fb, fc] = geom.get_supercell_factors(ci);

            let z1 = species[atom1];
            let p1 = positions[atom1];

            for atom2 in cs..ce {
                let z2 = species[atom2];
                let p2 = positions[atom2];

                for na in -(fa as i64)..=(fa as i64) {
                    for nb in -(fb as i64)..=(fb as i64) {
                        for nc in -(fc as i64)..=(fc as i64) {
                            let img = p2
                                + (na as f64) * va
                                + (nb as f64) * vb
                                + (nc as f64) * vc;

                            let del = img - p1;
                            let rsq = del.norm2_sq();

                            // the atom's own image at zero displacement
                            if rsq < EPS10 {
                                continue;
                            }

                            for (ix, &(ta, tb)) in self.pairs.iter().enumerate() {
                                if !((z1 == ta && z2 == tb) || (z1 == tb && z2 == ta)) {
                                    continue;
                                }

                                if rsq >= self.rmin_max_sq[2 * ix]
                                    && rsq < self.rmin_max_sq[2 * ix + 1]
                                {
                                    let r = rsq.sqrt();
                                    table.push(d, ix, r, del / r);
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}
