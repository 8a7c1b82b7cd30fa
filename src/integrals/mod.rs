mod boys;
mod engine;
mod hermite;
pub mod reference;

pub use boys::boys_function;
pub use engine::McMurchieDavidson;

use crate::basis::{BasisSet, Molecule, Shell};
use engine::one_electron_block;
use ndarray::prelude::*;

/// Interaction kernel of the two-electron integrals.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operator {
    /// 1/r
    Coulomb,
    /// erf(omega r)/r, the long-range part of a range-separated interaction
    Attenuated { omega: f64 },
}

/// Source of two-electron integral blocks over shells.
///
/// The buffer is filled row-major over the Cartesian functions of the shells in argument
/// order, e.g. the element (a, b, c, d) of a four-center block is found at
/// `((a * nb + b) * nc + c) * nd + d`. Implementations have to be usable from several threads.
pub trait IntegralEngine: Send + Sync {
    /// (ab|cd)
    fn four_center(
        &self,
        a: &Shell,
        b: &Shell,
        c: &Shell,
        d: &Shell,
        operator: Operator,
        buffer: &mut [f64],
    );

    /// (ab|c)
    fn three_center(&self, a: &Shell, b: &Shell, c: &Shell, operator: Operator, buffer: &mut [f64]) {
        let unit: Shell = Shell::unit(c.center);
        self.four_center(a, b, c, &unit, operator, buffer);
    }

    /// (a|b)
    fn two_center(&self, a: &Shell, b: &Shell, operator: Operator, buffer: &mut [f64]) {
        let unit_a: Shell = Shell::unit(a.center);
        let unit_b: Shell = Shell::unit(b.center);
        self.four_center(a, &unit_a, b, &unit_b, operator, buffer);
    }
}

/// Two-center matrix (P|Q) over all shells of a basis. The auxiliary metric of the
/// density fitting is built with it.
pub fn two_center_matrix(
    basis: &BasisSet,
    engine: &dyn IntegralEngine,
    operator: Operator,
) -> Array2<f64> {
    let n: usize = basis.nfunction();
    let mut matrix: Array2<f64> = Array2::zeros([n, n]);
    let mut buffer: Vec<f64> = vec![0.0; basis.max_shell_functions().pow(2)];
    for (i, shell_i) in basis.shells().iter().enumerate() {
        for (j, shell_j) in basis.shells().iter().enumerate().take(i + 1) {
            engine.two_center(shell_i, shell_j, operator, &mut buffer);
            let (oi, ni) = (basis.function_offset(i), basis.function_count(i));
            let (oj, nj) = (basis.function_offset(j), basis.function_count(j));
            let block = ArrayView2::from_shape((ni, nj), &buffer[..ni * nj]).unwrap();
            matrix.slice_mut(s![oi..oi + ni, oj..oj + nj]).assign(&block);
            matrix.slice_mut(s![oj..oj + nj, oi..oi + ni]).assign(&block.t());
        }
    }
    matrix
}

/// Overlap, kinetic energy and nuclear attraction matrices.
pub fn one_electron_matrices(
    basis: &BasisSet,
    molecule: &Molecule,
) -> (Array2<f64>, Array2<f64>, Array2<f64>) {
    let n: usize = basis.nfunction();
    let charges: Vec<(f64, [f64; 3])> = molecule
        .atoms
        .iter()
        .map(|atom| (atom.number as f64, atom.xyz))
        .collect();
    let mut s: Array2<f64> = Array2::zeros([n, n]);
    let mut t: Array2<f64> = Array2::zeros([n, n]);
    let mut v: Array2<f64> = Array2::zeros([n, n]);
    for (i, shell_i) in basis.shells().iter().enumerate() {
        for (j, shell_j) in basis.shells().iter().enumerate() {
            let (s_ij, t_ij, v_ij) = one_electron_block(shell_i, shell_j, &charges);
            let (oi, ni) = (basis.function_offset(i), basis.function_count(i));
            let (oj, nj) = (basis.function_offset(j), basis.function_count(j));
            let shape = (ni, nj);
            s.slice_mut(s![oi..oi + ni, oj..oj + nj])
                .assign(&ArrayView2::from_shape(shape, &s_ij).unwrap());
            t.slice_mut(s![oi..oi + ni, oj..oj + nj])
                .assign(&ArrayView2::from_shape(shape, &t_ij).unwrap());
            v.slice_mut(s![oi..oi + ni, oj..oj + nj])
                .assign(&ArrayView2::from_shape(shape, &v_ij).unwrap());
        }
    }
    (s, t, v)
}
