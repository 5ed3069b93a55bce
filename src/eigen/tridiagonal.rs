use crate::error::{EigenError, Result};
use crate::scalar::Scalar;
use nalgebra::DMatrix;

const MAX_QL_ITERATIONS: usize = 60;

/// Eigenvalues and (column) eigenvectors of a symmetric tridiagonal matrix
pub struct TridiagonalEigen<T: Scalar> {
    pub values: Vec<T>,
    pub vectors: DMatrix<T>,
}

/// Eigen-decompose the symmetric tridiagonal matrix with diagonal `alpha` and off-diagonal `beta`
/// using the implicitly shifted QL algorithm.
///
/// Only field operations and square roots are used, with all pivoting and convergence decisions made on the
/// real part, so the decomposition is analytic in complex-step arithmetic. Eigenvalues are returned unsorted.
pub fn tridiagonal_eigen<T: Scalar>(alpha: &[T], beta: &[T]) -> Result<TridiagonalEigen<T>> {
    let n = alpha.len();
    assert!(
        beta.len() + 1 >= n,
        "Off-diagonal must have at least n-1 entries; cannot decompose tridiagonal matrix!"
    );

    let mut d = alpha.to_vec();
    let mut e: Vec<T> = (0..n)
        .map(|i| if i + 1 < n { beta[i] } else { T::zero() })
        .collect();
    let mut z = DMatrix::<T>::identity(n, n);

    let two = T::from_real(2.0);

    for l in 0..n {
        let mut iter = 0;
        loop {
            let mut m = l;
            while m + 1 < n {
                let dd = d[m].re_abs() + d[m + 1].re_abs();
                if e[m].re_abs() <= f64::EPSILON * dd {
                    break;
                }
                m += 1;
            }
            if m == l {
                break;
            }

            if iter == MAX_QL_ITERATIONS {
                return Err(EigenError::TridiagonalNoConvergence { index: l });
            }
            iter += 1;

            let mut g = (d[l + 1] - d[l]) / (two * e[l]);
            let mut r = pythag(g, T::one());
            g = d[m] - d[l] + e[l] / (g + sign_of(r, g));

            let mut s = T::one();
            let mut c = T::one();
            let mut p = T::zero();
            let mut underflow = false;

            let mut i = m;
            while i > l {
                i -= 1;
                let f = s * e[i];
                let b = c * e[i];
                r = pythag(f, g);
                e[i + 1] = r;
                if r.re() == 0.0 {
                    d[i + 1] -= p;
                    e[m] = T::zero();
                    underflow = true;
                    break;
                }
                s = f / r;
                c = g / r;
                g = d[i + 1] - p;
                r = (d[i] - g) * s + two * c * b;
                p = s * r;
                d[i + 1] = g + p;
                g = c * r - b;

                for k in 0..n {
                    let zf = z[(k, i + 1)];
                    z[(k, i + 1)] = s * z[(k, i)] + c * zf;
                    z[(k, i)] = c * z[(k, i)] - s * zf;
                }
            }

            if underflow {
                continue;
            }
            d[l] -= p;
            e[l] = g;
            e[m] = T::zero();
        }
    }

    Ok(TridiagonalEigen {
        values: d,
        vectors: z,
    })
}

/// `sqrt(a^2 + b^2)` without the conjugation of a modulus
fn pythag<T: Scalar>(a: T, b: T) -> T {
    let (aa, ab) = (a.re_abs(), b.re_abs());
    if aa > ab {
        let ratio = b / a;
        abs_re(a) * (T::one() + ratio * ratio).sqrt()
    } else if ab == 0.0 {
        T::zero()
    } else {
        let ratio = a / b;
        abs_re(b) * (T::one() + ratio * ratio).sqrt()
    }
}

/// `a` or `-a`, whichever has a non-negative real part
fn abs_re<T: Scalar>(a: T) -> T {
    if a.re() < 0.0 {
        -a
    } else {
        a
    }
}

/// `|a|` carrying the sign of `b`, taken on the real parts
fn sign_of<T: Scalar>(a: T, b: T) -> T {
    if b.re() >= 0.0 {
        abs_re(a)
    } else {
        -abs_re(a)
    }
}
