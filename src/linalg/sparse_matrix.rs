use super::{DenseForm, LinearOperator};
use crate::scalar::Scalar;

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::mpsc::channel;

/// Wrapper around a BTreeMap to store square-symmetric matrices in a sparse data structure
///
/// Only the upper triangle is stored. Entries inserted into the lower triangle are mirrored.
#[derive(Clone, Debug)]
pub struct SparseMatrix<T: Scalar> {
    /// Size of the square matrix
    pub dimension: usize,
    /// Matrix Entries
    entries: BTreeMap<[u32; 2], T>,
}

impl<T: Scalar> SparseMatrix<T> {
    pub fn new(dimension: usize) -> Self {
        assert!(
            dimension <= (std::u32::MAX as usize),
            "Matrix Dimension cannot exceed the size of a u32!"
        );

        Self {
            dimension,
            entries: BTreeMap::new(),
        }
    }

    /// Build a diagonal matrix
    pub fn from_diagonal(values: &[T]) -> Self {
        let mut sm = Self::new(values.len());
        for (i, v) in values.iter().enumerate() {
            sm.insert([i, i], *v);
        }
        sm
    }

    /// Number of non-zero entries in the full (upper and lower) matrix
    pub fn num_entries(&self) -> usize {
        let num_diag = self.entries.keys().filter(|[i, j]| i == j).count();
        2 * self.entries.len() - num_diag
    }

    /// Add a value into the matrix. Assumes symmetry: row/col order does not matter.
    pub fn insert(&mut self, [row_idx, col_idx]: [usize; 2], value: T) {
        let coordinates = self.upper_coordinates(row_idx, col_idx);

        self.entries
            .entry(coordinates)
            .and_modify(|current_value| *current_value += value)
            .or_insert(value);
    }

    /// Insert a group of entries
    pub fn insert_group(&mut self, mut entry_group: Vec<([usize; 2], T)>) {
        for ([r, c], value) in entry_group.drain(0..) {
            self.insert([r, c], value);
        }
    }

    fn upper_coordinates(&self, row_idx: usize, col_idx: usize) -> [u32; 2] {
        assert!(
            row_idx < self.dimension,
            "row_idx exceeded matrix dimension; cannot insert value!"
        );
        assert!(
            col_idx < self.dimension,
            "col_idx exceeded matrix dimension; cannot insert value!"
        );

        if row_idx <= col_idx {
            [row_idx as u32, col_idx as u32]
        } else {
            [col_idx as u32, row_idx as u32]
        }
    }

    /// Value stored at the given location (zero if no entry exists)
    pub fn get(&self, [row_idx, col_idx]: [usize; 2]) -> T {
        let coordinates = self.upper_coordinates(row_idx, col_idx);
        self.entries.get(&coordinates).copied().unwrap_or_else(T::zero)
    }

    // Remove the entries from the matrix, replacing them with an empty BTreeMap.
    fn take_entries(&mut self) -> BTreeMap<[u32; 2], T> {
        std::mem::take(&mut self.entries)
    }

    /// Consume the entries from another sparse matrix leaving it empty.
    pub fn consume_matrix(&mut self, other: &mut Self) {
        assert!(
            self.dimension == other.dimension,
            "Sparse Matrices have different dimensions; cannot consume matrix!"
        );

        for (coordinates, value) in other.take_entries() {
            self.entries
                .entry(coordinates)
                .and_modify(|current_value| *current_value += value)
                .or_insert(value);
        }
    }

    /// Iterate over the upper triangle of the matrix.
    pub fn iter_upper_tri(&self) -> impl Iterator<Item = ([usize; 2], T)> + '_ {
        self.entries
            .iter()
            .map(|(coords, value)| ([coords[0] as usize, coords[1] as usize], *value))
    }
}

impl<T: Scalar> LinearOperator<T> for SparseMatrix<T> {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn mult(&self, x: &DVector<T>, y: &mut DVector<T>) {
        assert_eq!(
            x.len(),
            self.dimension,
            "Vector length does not match Matrix Dimension; cannot multiply!"
        );
        y.fill(T::zero());

        for ([r, c], v) in self.iter_upper_tri() {
            y[r] += v * x[c];
            if r != c {
                y[c] += v * x[r];
            }
        }
    }

    fn copy_values(&mut self, other: &Self) {
        assert!(
            self.dimension == other.dimension,
            "Sparse Matrices have different dimensions; cannot copy values!"
        );
        self.entries.clone_from(&other.entries);
    }

    fn axpy(&mut self, alpha: T, other: &Self) {
        assert!(
            self.dimension == other.dimension,
            "Sparse Matrices have different dimensions; cannot add matrices!"
        );

        for (coordinates, value) in other.entries.iter() {
            let scaled = alpha * *value;
            self.entries
                .entry(*coordinates)
                .and_modify(|current_value| *current_value += scaled)
                .or_insert(scaled);
        }
    }

    fn zero_entries(&mut self) {
        self.entries.clear();
    }

    fn diagonal(&self) -> DVector<T> {
        DVector::from_fn(self.dimension, |i, _| self.get([i, i]))
    }
}

impl<T: Scalar> DenseForm<T> for SparseMatrix<T> {
    fn to_dense(&self) -> DMatrix<T> {
        let mut dense = DMatrix::zeros(self.dimension, self.dimension);

        for ([r, c], v) in self.iter_upper_tri() {
            dense[(r, c)] = v;
            dense[(c, r)] = v;
        }

        dense
    }
}

impl<T: Scalar> From<SparseMatrix<T>> for DMatrix<T> {
    fn from(sm: SparseMatrix<T>) -> Self {
        sm.to_dense()
    }
}

impl<T: Scalar> ParallelExtend<SparseMatrix<T>> for SparseMatrix<T> {
    /// Accumulate element matrices computed in parallel into this global matrix
    fn par_extend<I>(&mut self, elem_matrices_iter: I)
    where
        I: IntoParallelIterator<Item = SparseMatrix<T>>,
    {
        let (sender, receiver) = channel();

        elem_matrices_iter
            .into_par_iter()
            .for_each_with(sender, |s, elem_matrix| {
                s.send(elem_matrix).expect(
                    "Failed to send sub-matrices over MSPC channel; cannot construct Matrix!",
                )
            });

        receiver.iter().for_each(|mut elem_matrix| {
            self.consume_matrix(&mut elem_matrix);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_insertion() {
        let mut sm = SparseMatrix::new(10);

        sm.insert([0, 0], 1.0);
        sm.insert([0, 0], 1.0);
        sm.insert([9, 9], 10.0);
        sm.insert([4, 3], 0.25);
        sm.insert([0, 8], 0.125);
        sm.insert([8, 0], 0.125);

        let raw_entries = sm.take_entries();

        assert!((raw_entries.get(&[0, 0]).unwrap() - 2.0).abs() < 1e-15);
        assert!((raw_entries.get(&[9, 9]).unwrap() - 10.0).abs() < 1e-15);
        assert!((raw_entries.get(&[3, 4]).unwrap() - 0.25).abs() < 1e-15);
        assert!((raw_entries.get(&[0, 8]).unwrap() - 0.25).abs() < 1e-15);

        assert!(raw_entries.get(&[4, 3]).is_none());
        assert!(raw_entries.get(&[8, 0]).is_none());
    }

    #[test]
    fn consume_another_matrix() {
        let mut sm_a = SparseMatrix::new(5);
        let mut sm_b = SparseMatrix::new(5);

        sm_a.insert_group(vec![
            ([0, 0], 1.0),
            ([1, 1], 2.0),
            ([2, 2], 3.0),
            ([3, 3], 4.0),
            ([4, 4], 5.0),
            ([0, 4], 0.5),
            ([3, 1], 0.5),
        ]);
        sm_b.insert_group(vec![
            ([0, 0], 5.0),
            ([1, 1], 4.0),
            ([2, 2], 3.0),
            ([3, 3], 2.0),
            ([4, 4], 1.0),
            ([4, 0], -0.5),
            ([2, 3], -0.5),
        ]);

        sm_a.consume_matrix(&mut sm_b);

        assert_eq!(sm_b.num_entries(), 0);

        for i in 0..5 {
            assert!((sm_a.get([i, i]) - 6.0).abs() < 1e-15);
        }
        assert!(sm_a.get([0, 4]).abs() < 1e-15);
        assert!((sm_a.get([1, 3]) - 0.5).abs() < 1e-15);
        assert!((sm_a.get([3, 2]) + 0.5).abs() < 1e-15);
    }

    #[test]
    fn symmetric_product() {
        let mut sm = SparseMatrix::new(3);
        sm.insert_group(vec![
            ([0, 0], 2.0),
            ([1, 1], 2.0),
            ([2, 2], 2.0),
            ([0, 1], -1.0),
            ([2, 1], -1.0),
        ]);

        let x = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let mut y = DVector::zeros(3);
        sm.mult(&x, &mut y);

        let expected = sm.to_dense() * &x;
        assert!((y - expected).norm() < 1e-14);
        assert_eq!(sm.num_entries(), 7);
    }

    #[test]
    fn shifted_combination() {
        let k = SparseMatrix::from_diagonal(&[4.0, 9.0]);
        let mut m = SparseMatrix::new(2);
        m.insert([0, 0], 1.0);
        m.insert([1, 1], 1.0);
        m.insert([0, 1], 0.5);

        let mut aux = SparseMatrix::new(2);
        aux.insert([1, 0], 7.0);
        aux.copy_values(&k);
        aux.axpy(-2.0, &m);

        assert!((aux.get([0, 0]) - 2.0).abs() < 1e-15);
        assert!((aux.get([1, 1]) - 7.0).abs() < 1e-15);
        assert!((aux.get([0, 1]) + 1.0).abs() < 1e-15);

        let d = aux.diagonal();
        assert!((d[0] - 2.0).abs() < 1e-15 && (d[1] - 7.0).abs() < 1e-15);

        aux.zero_entries();
        assert_eq!(aux.num_entries(), 0);
        assert_eq!(aux.dimension(), 2);
    }

    #[test]
    fn parallel_assembly() {
        let mut global = SparseMatrix::new(11);
        global.par_extend((0..10).into_par_iter().map(|e| {
            let mut elem = SparseMatrix::new(11);
            elem.insert_group(vec![([e, e], 1.0), ([e + 1, e + 1], 1.0), ([e, e + 1], -1.0)]);
            elem
        }));

        assert!((global.get([0, 0]) - 1.0).abs() < 1e-15);
        assert!((global.get([5, 5]) - 2.0).abs() < 1e-15);
        assert!((global.get([6, 5]) + 1.0).abs() < 1e-15);
        assert!((global.get([10, 10]) - 1.0).abs() < 1e-15);
    }

    #[test]
    #[should_panic]
    fn consume_matrix_of_different_dim() {
        let mut sm_a = SparseMatrix::<f64>::new(5);
        let mut sm_b = SparseMatrix::new(6);

        sm_a.consume_matrix(&mut sm_b);
    }

    #[test]
    #[should_panic]
    fn oversize_matrix_construction() {
        let _ = SparseMatrix::<f64>::new((std::u32::MAX as usize) + 1);
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_insertion() {
        let mut sm = SparseMatrix::new(10);
        sm.insert([10, 2], 1.0);
    }
}
