//! Full four-index electron repulsion tensor and the J/K contractions over it. Only feasible
//! for very small basis sets, these are the reference values the JK builds are checked against.
use crate::basis::BasisSet;
use crate::integrals::{IntegralEngine, Operator};
use ndarray::prelude::*;

/// (pq|rs) for all basis functions.
pub fn eri_tensor(basis: &BasisSet, engine: &dyn IntegralEngine, operator: Operator) -> Array4<f64> {
    let n: usize = basis.nfunction();
    let mut eri: Array4<f64> = Array4::zeros([n, n, n, n]);
    let mut buffer: Vec<f64> = vec![0.0; basis.max_shell_functions().pow(4)];
    for (p, sp) in basis.shells().iter().enumerate() {
        for (q, sq) in basis.shells().iter().enumerate() {
            for (r, sr) in basis.shells().iter().enumerate() {
                for (s, ss) in basis.shells().iter().enumerate() {
                    engine.four_center(sp, sq, sr, ss, operator, &mut buffer);
                    let (op, oq) = (basis.function_offset(p), basis.function_offset(q));
                    let (or, os) = (basis.function_offset(r), basis.function_offset(s));
                    let dims = (
                        basis.function_count(p),
                        basis.function_count(q),
                        basis.function_count(r),
                        basis.function_count(s),
                    );
                    let size: usize = dims.0 * dims.1 * dims.2 * dims.3;
                    let block = ArrayView4::from_shape(dims, &buffer[..size]).unwrap();
                    eri.slice_mut(s![
                        op..op + dims.0,
                        oq..oq + dims.1,
                        or..or + dims.2,
                        os..os + dims.3
                    ])
                    .assign(&block);
                }
            }
        }
    }
    eri
}

/// J_pq = sum_rs (pq|rs) D_rs
pub fn coulomb_from_eri(eri: ArrayView4<f64>, density: ArrayView2<f64>) -> Array2<f64> {
    let n: usize = density.nrows();
    let eri_2d = eri.into_shape((n * n, n * n)).unwrap();
    let d_vec: Array1<f64> = density.iter().cloned().collect();
    eri_2d.dot(&d_vec).into_shape((n, n)).unwrap()
}

/// K_pq = sum_rs (pr|qs) D_rs
pub fn exchange_from_eri(eri: ArrayView4<f64>, density: ArrayView2<f64>) -> Array2<f64> {
    let n: usize = density.nrows();
    let mut k: Array2<f64> = Array2::zeros([n, n]);
    for p in 0..n {
        for q in 0..n {
            let mut value: f64 = 0.0;
            for r in 0..n {
                for s in 0..n {
                    value += eri[[p, r, q, s]] * density[[r, s]];
                }
            }
            k[[p, q]] = value;
        }
    }
    k
}
