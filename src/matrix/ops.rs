//! Boolean matrix kernels used for traversal
//!
//! Every kernel requires flushed operands and computes output rows
//! independently, so rows are spread over the rayon pool once the matrix is
//! large enough to amortize the fan-out.

use super::sparse::{MatrixError, MatrixResult, SparseMatrix};
use rayon::prelude::*;

fn build_rows<F>(rows: usize, parallel_rows: usize, f: F) -> Vec<Vec<(u64, bool)>>
where
    F: Fn(usize) -> Vec<(u64, bool)> + Sync + Send,
{
    if rows >= parallel_rows {
        (0..rows).into_par_iter().map(f).collect()
    } else {
        (0..rows).map(f).collect()
    }
}

fn sorted_unique(mut cols: Vec<u64>) -> Vec<(u64, bool)> {
    cols.sort_unstable();
    cols.dedup();
    cols.into_iter().map(|c| (c, true)).collect()
}

/// Boolean matrix product `a * b` over the (or, and) semiring
pub fn mxm(
    a: &SparseMatrix<bool>,
    b: &SparseMatrix<bool>,
    parallel_rows: usize,
) -> MatrixResult<SparseMatrix<bool>> {
    if a.ncols() != b.nrows() {
        return Err(MatrixError::DimensionMismatch(format!(
            "cannot multiply {}x{} by {}x{}",
            a.nrows(),
            a.ncols(),
            b.nrows(),
            b.ncols()
        )));
    }
    a.require_flushed()?;
    b.require_flushed()?;

    let rows = build_rows(a.stored_rows(), parallel_rows, |r| {
        let (mids, flags) = a.stored_row(r);
        let mut cols = Vec::new();
        for (mid, _) in mids.iter().zip(flags).filter(|(_, set)| **set) {
            let (targets, target_flags) = b.stored_row(*mid as usize);
            cols.extend(
                targets
                    .iter()
                    .zip(target_flags)
                    .filter(|(_, set)| **set)
                    .map(|(c, _)| *c),
            );
        }
        sorted_unique(cols)
    });

    Ok(SparseMatrix::from_rows(a.nrows(), b.ncols(), rows))
}

/// Element-wise union of two boolean matrices of the same shape
pub fn ewise_union(
    a: &SparseMatrix<bool>,
    b: &SparseMatrix<bool>,
    parallel_rows: usize,
) -> MatrixResult<SparseMatrix<bool>> {
    if a.nrows() != b.nrows() || a.ncols() != b.ncols() {
        return Err(MatrixError::DimensionMismatch(format!(
            "cannot union {}x{} with {}x{}",
            a.nrows(),
            a.ncols(),
            b.nrows(),
            b.ncols()
        )));
    }
    a.require_flushed()?;
    b.require_flushed()?;

    let rows = build_rows(a.stored_rows().max(b.stored_rows()), parallel_rows, |r| {
        let (left, _) = a.stored_row(r);
        let (right, _) = b.stored_row(r);
        sorted_unique(left.iter().chain(right).copied().collect())
    });

    Ok(SparseMatrix::from_rows(a.nrows(), a.ncols(), rows))
}

/// Transpose of a boolean matrix
pub fn transpose(a: &SparseMatrix<bool>) -> MatrixResult<SparseMatrix<bool>> {
    a.require_flushed()?;

    let mut rows: Vec<Vec<(u64, bool)>> = Vec::new();
    for r in 0..a.stored_rows() {
        let (cols, flags) = a.stored_row(r);
        for (col, set) in cols.iter().zip(flags) {
            let c = *col as usize;
            if c >= rows.len() {
                rows.resize_with(c + 1, Vec::new);
            }
            rows[c].push((r as u64, *set));
        }
    }

    Ok(SparseMatrix::from_rows(a.ncols(), a.nrows(), rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(n: u64, cells: &[(u64, u64)]) -> SparseMatrix<bool> {
        let mut m = SparseMatrix::new(n, n);
        for (r, c) in cells {
            m.set(*r, *c, true).unwrap();
        }
        m.wait();
        m
    }

    fn cells(m: &SparseMatrix<bool>) -> Vec<(u64, u64)> {
        m.iter().map(|(r, c, _)| (r, c)).collect()
    }

    #[test]
    fn test_mxm_two_hops() {
        let a = matrix(4, &[(0, 1), (1, 2), (2, 3)]);
        let product = mxm(&a, &a, usize::MAX).unwrap();
        assert_eq!(cells(&product), vec![(0, 2), (1, 3)]);
    }

    #[test]
    fn test_mxm_parallel_matches_sequential() {
        let edges: Vec<(u64, u64)> = (0..64).map(|i| (i, (i * 7 + 3) % 64)).collect();
        let a = matrix(64, &edges);
        let seq = mxm(&a, &a, usize::MAX).unwrap();
        let par = mxm(&a, &a, 1).unwrap();
        assert_eq!(cells(&seq), cells(&par));
    }

    #[test]
    fn test_mxm_rejects_pending() {
        let mut a = matrix(3, &[(0, 1)]);
        a.delete(0, 1).unwrap();
        assert!(matches!(
            mxm(&a, &a, usize::MAX),
            Err(MatrixError::PendingChanges(1))
        ));
    }

    #[test]
    fn test_mxm_dimension_mismatch() {
        let a: SparseMatrix<bool> = SparseMatrix::new(2, 3);
        let b: SparseMatrix<bool> = SparseMatrix::new(2, 3);
        assert!(matches!(
            mxm(&a, &b, usize::MAX),
            Err(MatrixError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_union_and_transpose() {
        let a = matrix(3, &[(0, 1)]);
        let b = matrix(3, &[(0, 1), (2, 0)]);
        let u = ewise_union(&a, &b, usize::MAX).unwrap();
        assert_eq!(cells(&u), vec![(0, 1), (2, 0)]);

        let t = transpose(&u).unwrap();
        assert_eq!(cells(&t), vec![(0, 2), (1, 0)]);
    }
}
