use kryst::matrix::sparse::CsrMatrix;
use nalgebra::{DMatrix, DVector};

/// Row-compressed Jacobian storage filled by finite-element assembly.
///
/// The sparsity pattern is registered once (`prealloc`, `pre_add_ij`, `alloc`),
/// then each assembly pass runs `zero`, `add` and `finish`. Entries outside the
/// registered pattern are inserted on demand.
#[derive(Clone, Debug, Default)]
pub struct JacobianMatrix {
    size: usize,
    cols: Vec<Vec<usize>>,
    vals: Vec<Vec<f64>>,
    finished: bool,
}

impl JacobianMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new sparsity pattern for an `n x n` matrix.
    pub fn prealloc(&mut self, n: usize) {
        self.size = n;
        self.cols = vec![Vec::new(); n];
        self.vals = vec![Vec::new(); n];
        self.finished = false;
    }

    pub fn pre_add_ij(&mut self, row: usize, col: usize) {
        self.cols[row].push(col);
    }

    /// Sorts the registered pattern and allocates zeroed values.
    pub fn alloc(&mut self) {
        for (cols, vals) in self.cols.iter_mut().zip(self.vals.iter_mut()) {
            cols.sort_unstable();
            cols.dedup();
            vals.clear();
            vals.resize(cols.len(), 0.0);
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn nnz(&self) -> usize {
        self.cols.iter().map(Vec::len).sum()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn zero(&mut self) {
        for vals in &mut self.vals {
            vals.fill(0.0);
        }
        self.finished = false;
    }

    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        let cols = &mut self.cols[row];
        match cols.binary_search(&col) {
            Ok(pos) => self.vals[row][pos] += value,
            Err(pos) => {
                cols.insert(pos, col);
                self.vals[row].insert(pos, value);
            }
        }
    }

    /// Marks the end of an assembly pass.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        match self.cols[row].binary_search(&col) {
            Ok(pos) => self.vals[row][pos],
            Err(_) => 0.0,
        }
    }

    pub fn diagonal(&self, row: usize) -> Option<f64> {
        self.cols[row]
            .binary_search(&row)
            .ok()
            .map(|pos| self.vals[row][pos])
    }

    pub fn row(&self, row: usize) -> (&[usize], &[f64]) {
        (&self.cols[row], &self.vals[row])
    }

    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.size,
            (0..self.size).map(|r| {
                self.cols[r]
                    .iter()
                    .zip(&self.vals[r])
                    .map(|(&c, &v)| v * x[c])
                    .sum::<f64>()
            }),
        )
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.size, self.size);
        for r in 0..self.size {
            for (&c, &v) in self.cols[r].iter().zip(&self.vals[r]) {
                dense[(r, c)] = v;
            }
        }
        dense
    }

    /// Copies the matrix into kryst CSR storage, scaling row `r` by `row_scale[r]`.
    pub fn to_csr(&self, row_scale: Option<&[f64]>) -> CsrMatrix<f64> {
        let n = self.size;
        let mut indptr = Vec::with_capacity(n + 1);
        let mut indices = Vec::with_capacity(self.nnz());
        let mut data = Vec::with_capacity(self.nnz());
        indptr.push(0);
        for r in 0..n {
            let scale = row_scale.map_or(1.0, |s| s[r]);
            indices.extend_from_slice(&self.cols[r]);
            data.extend(self.vals[r].iter().map(|v| v * scale));
            indptr.push(indices.len());
        }
        CsrMatrix::from_csr(n, n, indptr, indices, data)
    }
}
