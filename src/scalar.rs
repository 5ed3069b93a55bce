use nalgebra::{ComplexField, DVector};
use num_complex::Complex;

/// Numeric type used for every eigenvalue and eigenvector quantity.
///
/// Implemented for `f64` and `Complex<f64>`. The complex variant is meant for complex-step
/// differentiation: all inner products are the non-conjugated `x^T y`, and every comparison
/// (sorting, convergence, breakdown) is made on the real part so that the imaginary
/// perturbation is carried analytically through the solve.
pub trait Scalar: ComplexField<RealField = f64> + Copy {
    /// Real part used for ordering and tolerance checks
    fn re(self) -> f64 {
        self.real()
    }

    /// Magnitude of the real part
    fn re_abs(self) -> f64 {
        self.real().abs()
    }
}

impl Scalar for f64 {}
impl Scalar for Complex<f64> {}

/// Non-conjugated inner product `x^T y`
pub fn dot<T: Scalar>(x: &DVector<T>, y: &DVector<T>) -> T {
    x.iter()
        .zip(y.iter())
        .fold(T::zero(), |acc, (xi, yi)| acc + *xi * *yi)
}

/// `y += alpha * x`
pub fn axpy<T: Scalar>(alpha: T, x: &DVector<T>, y: &mut DVector<T>) {
    for (yi, xi) in y.iter_mut().zip(x.iter()) {
        *yi += alpha * *xi;
    }
}

/// Euclidean norm of the entry magnitudes (always real)
pub fn norm<T: Scalar>(x: &DVector<T>) -> f64 {
    x.iter().map(|xi| xi.modulus_squared()).sum::<f64>().sqrt()
}
