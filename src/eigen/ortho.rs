use super::operator::EigenOperator;
use crate::error::Result;
use crate::scalar::{dot, Scalar};

use nalgebra::{DMatrix, DVector};
use std::io::Write;

/// Gram matrix `X^T W X` of a set of vectors in the operator's inner product
pub fn gram_matrix<T: Scalar, O: EigenOperator<T>>(op: &O, vectors: &[DVector<T>]) -> DMatrix<T> {
    let metric_vectors: Vec<DVector<T>> = vectors
        .iter()
        .map(|x| {
            let mut wx = DVector::zeros(x.len());
            op.metric_mult(x, &mut wx);
            wx
        })
        .collect();

    DMatrix::from_fn(vectors.len(), vectors.len(), |i, j| {
        dot(&vectors[i], &metric_vectors[j])
    })
}

/// Largest off-diagonal entry of a Gram matrix, scaled by its diagonal: `|G_ij| / sqrt(|G_ii| |G_jj|)`
pub fn max_off_diagonal<T: Scalar>(gram: &DMatrix<T>) -> f64 {
    let n = gram.nrows();
    let mut largest = 0.0_f64;

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let scale = (gram[(i, i)].re_abs() * gram[(j, j)].re_abs()).sqrt();
            let entry = gram[(i, j)].re_abs();
            largest = largest.max(if scale > 0.0 { entry / scale } else { entry });
        }
    }

    largest
}

/// Write the real part of a Gram matrix followed by its largest scaled off-diagonal entry
pub fn write_gram<T: Scalar>(gram: &DMatrix<T>, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "Eigenvector orthogonality ({0}x{0} Gram matrix):", gram.nrows())?;
    for i in 0..gram.nrows() {
        for j in 0..gram.ncols() {
            write!(out, " {:>10.3e}", gram[(i, j)].re())?;
        }
        writeln!(out)?;
    }
    writeln!(out, "Max off-diagonal: {:.6e}", max_off_diagonal(gram))?;
    Ok(())
}
