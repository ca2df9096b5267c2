use std::collections::BTreeMap;

use nalgebra::sparse::{CsCholesky, CsMatrix};
use nalgebra::DVector;

use crate::error::WarpError;

/// A growable set of weighted linear equations, solved in the least-squares
/// sense through the sparse normal equations `A^T A x = A^T b`.
///
/// Equations are appended one row at a time without knowing the final row
/// count in advance; each row holds a handful of nonzero coefficients (at
/// most the four bilinear weights of a grid cell, plus neighbors for the
/// smoothness rows). The system is built fresh for every solver iteration,
/// solved once, and discarded.
pub struct SparseSystem {
    /// One coefficient map per equation row, keyed by column index.
    rows: Vec<BTreeMap<usize, f64>>,

    /// Right-hand side, one scalar per row.
    rhs: Vec<f64>,

    /// Number of unknowns.
    columns: usize,
}

impl SparseSystem {
    /// Creates an empty system over `columns` unknowns.
    pub fn new(columns: usize) -> SparseSystem {
        SparseSystem {
            rows: Vec::new(),
            rhs: Vec::new(),
            columns,
        }
    }

    /// Appends one equation row. Coefficients naming the same column twice
    /// accumulate, so a collapsed grid cell keeps its full bilinear weight.
    pub fn push_row(&mut self, coefficients: &[(usize, f64)], rhs: f64) {
        let mut row = BTreeMap::new();
        for &(column, value) in coefficients {
            debug_assert!(column < self.columns);
            *row.entry(column).or_insert(0.0) += value;
        }
        self.rows.push(row);
        self.rhs.push(rhs);
    }

    /// Number of accumulated equation rows.
    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of unknowns.
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Solves `A^T A x = A^T b` by sparse Cholesky factorization.
    ///
    /// # Errors
    /// Returns [`WarpError::SolverFailure`] when the normal-equations matrix
    /// is singular or not positive definite.
    pub fn solve(&self) -> Result<DVector<f64>, WarpError> {
        let mut ata: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        let mut atb = DVector::zeros(self.columns);

        for (row, &b) in self.rows.iter().zip(self.rhs.iter()) {
            for (&ci, &vi) in row {
                atb[ci] += vi * b;
                for (&cj, &vj) in row {
                    *ata.entry((ci, cj)).or_insert(0.0) += vi * vj;
                }
            }
        }

        let mut irows = Vec::with_capacity(ata.len());
        let mut icols = Vec::with_capacity(ata.len());
        let mut values = Vec::with_capacity(ata.len());
        for (&(r, c), &v) in &ata {
            irows.push(r);
            icols.push(c);
            values.push(v);
        }

        let normal = CsMatrix::from_triplet(self.columns, self.columns, &irows, &icols, &values);
        let cholesky = CsCholesky::new(&normal);
        let l = cholesky.l().ok_or(WarpError::SolverFailure)?;

        let y = l
            .solve_lower_triangular(&atb)
            .ok_or(WarpError::SolverFailure)?;
        let x = l
            .tr_solve_lower_triangular(&y)
            .ok_or(WarpError::SolverFailure)?;

        // a zero pivot can survive the factorization as inf/NaN
        if x.iter().any(|value| !value.is_finite()) {
            return Err(WarpError::SolverFailure);
        }

        Ok(DVector::from_column_slice(x.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_determined_system_is_reproduced() {
        let mut system = SparseSystem::new(2);
        system.push_row(&[(0, 2.0)], 4.0);
        system.push_row(&[(1, 0.5)], 1.0);
        let x = system.solve().unwrap();
        assert!((x[0] - 2.0).abs() < 1e-10);
        assert!((x[1] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn overdetermined_system_minimizes_residual() {
        let mut system = SparseSystem::new(2);
        system.push_row(&[(0, 1.0)], 1.0);
        system.push_row(&[(1, 1.0)], 2.0);
        system.push_row(&[(0, 1.0), (1, 1.0)], 3.2);
        let x = system.solve().unwrap();
        // normal equations [[2,1],[1,2]] x = [4.2, 5.2]
        assert!((x[0] - 3.2 / 3.0).abs() < 1e-10);
        assert!((x[1] - 6.2 / 3.0).abs() < 1e-10);
    }

    #[test]
    fn duplicate_columns_accumulate() {
        let mut system = SparseSystem::new(1);
        system.push_row(&[(0, 0.25), (0, 0.75)], 3.0);
        let x = system.solve().unwrap();
        assert!((x[0] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn singular_system_fails_cleanly() {
        let mut system = SparseSystem::new(2);
        system.push_row(&[(0, 1.0), (1, 1.0)], 1.0);
        system.push_row(&[(0, 2.0), (1, 2.0)], 2.0);
        match system.solve() {
            Err(WarpError::SolverFailure) => {}
            other => panic!("expected SolverFailure, got {:?}", other.map(|_| ())),
        }
    }
}
