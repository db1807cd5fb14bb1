//! COO observation storage and per-mode compressed orientations.
//!
//! Training data arrives as a set of observed entries (coordinate tuple plus
//! value). Gibbs sampling needs to iterate, for every mode `m` and every row
//! `i` of that mode, over exactly the entries whose `m`-th index equals `i`.
//! [`SparseMode`] precomputes that orientation once: entries are bucketed by
//! the indexed mode (stable counting sort), leaving a `row_ptr` array, the
//! remaining modes' indices per entry, and a reordered value copy. The value
//! copy is mutable so mean-centering can be applied per orientation without
//! touching the pristine [`SparseTensor`].

use smallvec::SmallVec;

use crate::error::{CoreError, CoreResult};

/// Coordinate tuple of one observed entry. Inline storage covers matrices and
/// 3-way tensors without allocation.
pub type Coord = SmallVec<[u32; 3]>;

/// Immutable COO storage for the observed entries of a matrix or tensor.
#[derive(Debug, Clone)]
pub struct SparseTensor {
    dims: Vec<usize>,
    coords: Vec<Coord>,
    values: Vec<f64>,
}

impl SparseTensor {
    /// Create a tensor from coordinate tuples and values.
    ///
    /// # Errors
    ///
    /// Rejects empty/zero shapes, arity mismatches between coordinates and
    /// `dims`, out-of-bounds coordinates, and coordinate/value length skew.
    pub fn new(dims: Vec<usize>, coords: Vec<Coord>, values: Vec<f64>) -> CoreResult<Self> {
        if dims.is_empty() || dims.contains(&0) {
            return Err(CoreError::InvalidShape { shape: dims });
        }
        if coords.len() != values.len() {
            return Err(CoreError::LengthMismatch {
                coords: coords.len(),
                values: values.len(),
            });
        }
        for c in &coords {
            if c.len() != dims.len() {
                return Err(CoreError::ArityMismatch {
                    expected: dims.len(),
                    got: c.len(),
                });
            }
            for (&idx, &dim) in c.iter().zip(&dims) {
                if idx as usize >= dim {
                    return Err(CoreError::IndexOutOfBounds {
                        coord: c.iter().map(|&x| x as usize).collect(),
                        shape: dims.clone(),
                    });
                }
            }
        }
        Ok(Self {
            dims,
            coords,
            values,
        })
    }

    /// Matrix convenience constructor from parallel triplet arrays.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        rows: &[usize],
        cols: &[usize],
        values: &[f64],
    ) -> CoreResult<Self> {
        if rows.len() != cols.len() {
            return Err(CoreError::LengthMismatch {
                coords: rows.len(),
                values: cols.len(),
            });
        }
        let coords = rows
            .iter()
            .zip(cols)
            .map(|(&r, &c)| Coord::from_slice(&[r as u32, c as u32]))
            .collect();
        Self::new(vec![nrows, ncols], coords, values.to_vec())
    }

    pub fn nmodes(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn coord(&self, entry: usize) -> &Coord {
        &self.coords[entry]
    }

    pub fn value(&self, entry: usize) -> f64 {
        self.values[entry]
    }

    /// Iterate `(coordinate, value)` pairs in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&Coord, f64)> + '_ {
        self.coords.iter().zip(self.values.iter().copied())
    }

    /// Arithmetic mean of the observed values; 0.0 for an empty tensor.
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }
}

/// One mode's compressed orientation of a [`SparseTensor`].
///
/// Entries are grouped by their index in `mode`; `row_ptr[i]..row_ptr[i+1]`
/// spans row `i`'s entries. For each entry the indices of the *other* modes
/// are kept (ascending mode order, the indexed mode skipped) together with a
/// reordered, mutable copy of the values.
#[derive(Debug, Clone)]
pub struct SparseMode {
    mode: usize,
    other_modes: Vec<usize>,
    row_ptr: Vec<usize>,
    others: Vec<u32>,
    values: Vec<f64>,
}

impl SparseMode {
    /// Build the orientation for `mode` with a stable counting sort.
    pub fn new(tensor: &SparseTensor, mode: usize) -> CoreResult<Self> {
        let nmodes = tensor.nmodes();
        if mode >= nmodes {
            return Err(CoreError::ModeOutOfBounds { mode, nmodes });
        }
        let num_rows = tensor.dims()[mode];
        let num_other = nmodes - 1;
        let other_modes: Vec<usize> = (0..nmodes).filter(|&m| m != mode).collect();

        let mut row_ptr = vec![0usize; num_rows + 1];
        for (c, _) in tensor.entries() {
            row_ptr[c[mode] as usize + 1] += 1;
        }
        for i in 0..num_rows {
            row_ptr[i + 1] += row_ptr[i];
        }

        let nnz = tensor.nnz();
        let mut others = vec![0u32; nnz * num_other];
        let mut values = vec![0.0f64; nnz];
        let mut cursor = row_ptr.clone();
        for (c, v) in tensor.entries() {
            let row = c[mode] as usize;
            let slot = cursor[row];
            cursor[row] += 1;
            values[slot] = v;
            for (k, &om) in other_modes.iter().enumerate() {
                others[slot * num_other + k] = c[om];
            }
        }

        Ok(Self {
            mode,
            other_modes,
            row_ptr,
            others,
            values,
        })
    }

    pub fn mode(&self) -> usize {
        self.mode
    }

    /// Modes other than the indexed one, ascending, matching the per-entry
    /// index tuples returned by [`SparseMode::others`].
    pub fn other_modes(&self) -> &[usize] {
        &self.other_modes
    }

    pub fn num_rows(&self) -> usize {
        self.row_ptr.len() - 1
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Entry range of row `row`.
    pub fn row_range(&self, row: usize) -> std::ops::Range<usize> {
        self.row_ptr[row]..self.row_ptr[row + 1]
    }

    pub fn nnz_of(&self, row: usize) -> usize {
        self.row_ptr[row + 1] - self.row_ptr[row]
    }

    pub fn value(&self, entry: usize) -> f64 {
        self.values[entry]
    }

    /// Other-mode indices of one entry, in [`SparseMode::other_modes`] order.
    pub fn others(&self, entry: usize) -> &[u32] {
        let k = self.other_modes.len();
        &self.others[entry * k..(entry + 1) * k]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Mutable values, used exactly once for mean-centering at data init.
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Full coordinate of an entry given the row it belongs to.
    pub fn full_coord(&self, row: usize, entry: usize) -> Coord {
        let mut c = Coord::with_capacity(self.other_modes.len() + 1);
        let others = self.others(entry);
        let mut k = 0;
        for m in 0..=self.other_modes.len() {
            if m == self.mode {
                c.push(row as u32);
            } else {
                c.push(others[k]);
                k += 1;
            }
        }
        c
    }
}
