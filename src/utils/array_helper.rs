use ndarray::prelude::*;
use ndarray::Data;
use rayon::prelude::*;

/// (A + A^T) / 2
pub fn symmetrize(a: ArrayView2<f64>) -> Array2<f64> {
    (&a + &a.t()) * 0.5
}

/// A B computed in parallel over blocks of the inner dimension.
pub fn parallel_matrix_multiply(
    a: ArrayView2<f64>,
    b: ArrayView2<f64>,
    blocks: usize,
) -> Array2<f64> {
    let dim: usize = a.dim().1;
    let blocks: usize = blocks.max(1).min(dim.max(1));
    let block_size: usize = dim / blocks;
    let f_0: usize = a.dim().0;
    let f_1: usize = b.dim().1;

    (0..blocks)
        .into_par_iter()
        .map(|i| {
            let start = i * block_size;
            let mut end = (i + 1) * block_size;
            if i == (blocks - 1) {
                end = dim;
            }
            a.slice(s![.., start..end]).dot(&b.slice(s![start..end, ..]))
        })
        .reduce(|| Array2::zeros((f_0, f_1)), |a, b| a + b)
}

/// Reorders the axes (0, 1, 2) of a three-index array to (1, 0, 2) and merges the last two,
/// i.e. X[Q, p, i] becomes X'[p, Q * n_i + i].
pub fn swap_and_merge<S>(x: &ArrayBase<S, Ix3>) -> Array2<f64>
where
    S: Data<Elem = f64>,
{
    let (n0, n1, n2) = x.dim();
    let swapped: Array3<f64> = x.view().permuted_axes([1, 0, 2]).as_standard_layout().into_owned();
    // a standard layout array can always be reshaped
    swapped.into_shape((n1, n0 * n2)).unwrap()
}
