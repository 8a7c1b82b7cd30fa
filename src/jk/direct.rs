use crate::basis::BasisSet;
use crate::integrals::{IntegralEngine, Operator};
use crate::io::settings::JKConfig;
use crate::jk::logging::{print_jk_header, print_screening};
use crate::jk::{
    assemble, check_coefficients, check_densities, nothing_requested, JKBuild, JKMatrices,
};
use crate::sieve::SchwarzSieve;
use crate::utils::array_helper::symmetrize;
use crate::utils::Timer;
use anyhow::Result;
use itertools::Itertools;
use log::debug;
use ndarray::prelude::*;
use rayon::prelude::*;
use std::sync::Arc;

/// Index permutations that map (pq|rs) onto the integrals that are equal to it by the
/// permutational symmetry of real orbitals.
const QUARTET_PERMUTATIONS: [[usize; 4]; 8] = [
    [0, 1, 2, 3],
    [1, 0, 2, 3],
    [0, 1, 3, 2],
    [1, 0, 3, 2],
    [2, 3, 0, 1],
    [3, 2, 0, 1],
    [2, 3, 1, 0],
    [3, 2, 1, 0],
];

/// Thread local J and K contributions together with the integral buffer.
struct Accumulator {
    j: Vec<Array2<f64>>,
    k: Vec<Array2<f64>>,
    k_long_range: Vec<Array2<f64>>,
    buffer: Vec<f64>,
    buffer_lr: Vec<f64>,
    n_computed: usize,
}

impl Accumulator {
    fn new(n_densities: usize, nbf: usize, flags: &BuildFlags, buffer_size: usize) -> Self {
        let zeros = |needed: bool| -> Vec<Array2<f64>> {
            if needed {
                (0..n_densities).map(|_| Array2::zeros([nbf, nbf])).collect()
            } else {
                Vec::new()
            }
        };
        Self {
            j: zeros(flags.j),
            k: zeros(flags.k),
            k_long_range: zeros(flags.k_long_range),
            buffer: vec![0.0; buffer_size],
            buffer_lr: vec![0.0; if flags.k_long_range { buffer_size } else { 0 }],
            n_computed: 0,
        }
    }

    fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.j.iter_mut().zip(other.j.iter()) {
            *a += b;
        }
        for (a, b) in self.k.iter_mut().zip(other.k.iter()) {
            *a += b;
        }
        for (a, b) in self.k_long_range.iter_mut().zip(other.k_long_range.iter()) {
            *a += b;
        }
        self.n_computed += other.n_computed;
        self
    }
}

/// Which matrices one build has to produce.
struct BuildFlags {
    j: bool,
    k: bool,
    k_long_range: bool,
    coulomb_integrals: bool,
}

impl BuildFlags {
    fn new(config: &JKConfig) -> Self {
        let k_long_range: bool = config.compute_k && config.b != 0.0;
        let k: bool = config.compute_k;
        Self {
            j: config.compute_j,
            k,
            k_long_range,
            coulomb_integrals: config.compute_j || (k && config.a != 0.0),
        }
    }
}

/// One density of a build, either the matrix itself or the factors of D = L R^T.
#[derive(Clone, Copy)]
enum DensityInput<'a> {
    Matrix(ArrayView2<'a, f64>),
    Factors(ArrayView2<'a, f64>, ArrayView2<'a, f64>),
}

/// Integrals of one shell quartet with the axes in the order (p, q, r, s) of one
/// permutation, together with the first basis function along every axis.
struct QuartetBlock {
    values: Array4<f64>,
    offsets: [usize; 4],
}

impl QuartetBlock {
    fn new(buffer: &[f64], counts: [usize; 4], offsets: [usize; 4], perm: [usize; 4]) -> Self {
        let values: ArrayView4<f64> = ArrayView4::from_shape(counts, buffer).unwrap();
        Self {
            values: values.permuted_axes(perm).as_standard_layout().into_owned(),
            offsets: perm.map(|x| offsets[x]),
        }
    }

    /// sum_rs (pq|rs) D_rs for the functions of the block.
    fn coulomb(&self, input: &DensityInput) -> Array2<f64> {
        let (np, nq, nr, ns) = self.values.dim();
        let [_, _, or, os] = self.offsets;
        let d_rs: Array1<f64> = match input {
            DensityInput::Matrix(d) => d
                .slice(s![or..or + nr, os..os + ns])
                .iter()
                .cloned()
                .collect(),
            DensityInput::Factors(l, r) => l
                .slice(s![or..or + nr, ..])
                .dot(&r.slice(s![os..os + ns, ..]).t())
                .iter()
                .cloned()
                .collect(),
        };
        let v: ArrayView2<f64> = self.values.view().into_shape((np * nq, nr * ns)).unwrap();
        v.dot(&d_rs).into_shape((np, nq)).unwrap()
    }

    /// sum_qs (pq|rs) D_qs for the functions of the block.
    fn exchange(&self, input: &DensityInput) -> Array2<f64> {
        let (np, nq, nr, ns) = self.values.dim();
        let [_, oq, _, os] = self.offsets;
        match input {
            DensityInput::Matrix(d) => {
                let d_qs: Array1<f64> = d
                    .slice(s![oq..oq + nq, os..os + ns])
                    .iter()
                    .cloned()
                    .collect();
                let v: Array2<f64> = self
                    .values
                    .view()
                    .permuted_axes([0, 2, 1, 3])
                    .as_standard_layout()
                    .into_owned()
                    .into_shape((np * nr, nq * ns))
                    .unwrap();
                v.dot(&d_qs).into_shape((np, nr)).unwrap()
            }
            DensityInput::Factors(l, r) => {
                let n_i: usize = l.ncols();
                // half transformation (pqr|i) = sum_s (pq|rs) R_si
                let half: Array2<f64> = self
                    .values
                    .view()
                    .into_shape((np * nq * nr, ns))
                    .unwrap()
                    .dot(&r.slice(s![os..os + ns, ..]));
                let half: Array2<f64> = half
                    .into_shape((np, nq, nr, n_i))
                    .unwrap()
                    .permuted_axes([0, 2, 1, 3])
                    .as_standard_layout()
                    .into_owned()
                    .into_shape((np * nr, nq * n_i))
                    .unwrap();
                let l_q: Array1<f64> = l.slice(s![oq..oq + nq, ..]).iter().cloned().collect();
                half.dot(&l_q).into_shape((np, nr)).unwrap()
            }
        }
    }
}

/// Integral direct JK build with Schwarz screening.
///
/// Every unique shell quartet (PQ|RS) with P >= Q, R >= S and PQ >= RS is computed once and
/// its integrals are distributed to all distinct permutations of the quartet, so the
/// densities do not need to be symmetric. The work is distributed over the bra shell pairs.
pub struct DirectJK {
    basis: Arc<BasisSet>,
    sieve: Arc<SchwarzSieve>,
    engine: Arc<dyn IntegralEngine>,
    pub(super) config: JKConfig,
}

impl DirectJK {
    pub fn new(
        sieve: Arc<SchwarzSieve>,
        engine: Arc<dyn IntegralEngine>,
        config: JKConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            basis: sieve.basis().clone(),
            sieve,
            engine,
            config,
        })
    }

    pub fn config(&self) -> &JKConfig {
        &self.config
    }

    pub fn basis(&self) -> &Arc<BasisSet> {
        &self.basis
    }

    pub fn print_header(&self) {
        print_jk_header("DirectJK: Integral-Direct J/K Matrices", &self.config, self.basis.nfunction());
    }

    /// Adds the contributions of one computed quartet block to all matrices.
    fn scatter(
        &self,
        shells: [usize; 4],
        inputs: &[DensityInput],
        flags: &BuildFlags,
        acc: &mut Accumulator,
    ) {
        let offsets: [usize; 4] = shells.map(|shell| self.basis.function_offset(shell));
        let counts: [usize; 4] = shells.map(|shell| self.basis.function_count(shell));
        let size: usize = counts.iter().product();
        let permutations: Vec<[usize; 4]> = QUARTET_PERMUTATIONS
            .iter()
            .unique_by(|perm| perm.map(|x| shells[x]))
            .cloned()
            .collect();

        for perm in permutations.iter() {
            let [op, oq, or, _] = perm.map(|x| offsets[x]);
            let [np, nq, nr, _] = perm.map(|x| counts[x]);
            // J_pq += (pq|rs) D_rs and K_pr += (pq|rs) D_qs
            if flags.coulomb_integrals {
                let block = QuartetBlock::new(&acc.buffer[..size], counts, offsets, *perm);
                for (n, input) in inputs.iter().enumerate() {
                    if flags.j {
                        let mut j_pq = acc.j[n].slice_mut(s![op..op + np, oq..oq + nq]);
                        j_pq += &block.coulomb(input);
                    }
                    if flags.k {
                        let mut k_pr = acc.k[n].slice_mut(s![op..op + np, or..or + nr]);
                        k_pr += &block.exchange(input);
                    }
                }
            }
            if flags.k_long_range {
                let block = QuartetBlock::new(&acc.buffer_lr[..size], counts, offsets, *perm);
                for (n, input) in inputs.iter().enumerate() {
                    let mut k_pr = acc.k_long_range[n].slice_mut(s![op..op + np, or..or + nr]);
                    k_pr += &block.exchange(input);
                }
            }
        }
    }

    /// Returns J, K(1/r) and K(erf(w r)/r) without any scaling.
    fn build(
        &self,
        inputs: &[DensityInput],
    ) -> (Vec<Array2<f64>>, Vec<Array2<f64>>, Option<Vec<Array2<f64>>>) {
        let timer: Timer = Timer::start();
        let nbf: usize = self.basis.nfunction();
        let nshell: usize = self.basis.nshell();
        let flags: BuildFlags = BuildFlags::new(&self.config);
        let cutoff: f64 = self.config.product_cutoff;
        let attenuated: Operator = Operator::Attenuated {
            omega: self.config.w,
        };
        let buffer_size: usize = self.basis.max_shell_functions().pow(4);

        let bra_pairs: Vec<(usize, usize)> = (0..nshell)
            .flat_map(|p| (0..=p).map(move |q| (p, q)))
            .collect();
        let n_pairs: usize = bra_pairs.len();

        let acc: Accumulator = bra_pairs
            .par_iter()
            .enumerate()
            .fold(
                || Accumulator::new(inputs.len(), nbf, &flags, buffer_size),
                |mut acc, (pq, (p, q))| {
                    let (p, q) = (*p, *q);
                    for (r, s) in bra_pairs[..=pq].iter() {
                        let (r, s) = (*r, *s);
                        if self.sieve.negligible(p, q, r, s, cutoff) {
                            continue;
                        }
                        let (sp, sq) = (self.basis.shell(p), self.basis.shell(q));
                        let (sr, ss) = (self.basis.shell(r), self.basis.shell(s));
                        if flags.coulomb_integrals {
                            self.engine
                                .four_center(sp, sq, sr, ss, Operator::Coulomb, &mut acc.buffer);
                        }
                        if flags.k_long_range {
                            self.engine
                                .four_center(sp, sq, sr, ss, attenuated, &mut acc.buffer_lr);
                        }
                        self.scatter([p, q, r, s], inputs, &flags, &mut acc);
                        acc.n_computed += 1;
                    }
                    acc
                },
            )
            .reduce(
                || Accumulator::new(inputs.len(), nbf, &flags, 0),
                |a, b| a.merge(b),
            );

        print_screening(acc.n_computed, n_pairs * (n_pairs + 1) / 2);
        debug!("{: <25}", "direct JK build");
        debug!("{}", timer);
        let k_long_range: Option<Vec<Array2<f64>>> = if flags.k_long_range {
            Some(acc.k_long_range)
        } else {
            None
        };
        (acc.j, acc.k, k_long_range)
    }

    fn finish(
        &self,
        inputs: &[DensityInput],
        symm: &[bool],
        scale_j: &[f64],
        scale_k: &[f64],
    ) -> JKMatrices {
        let (mut j, mut k, mut k_lr) = self.build(inputs);
        for (i, is_symmetric) in symm.iter().enumerate() {
            if *is_symmetric {
                if let Some(ji) = j.get_mut(i) {
                    *ji = symmetrize(ji.view());
                }
                if let Some(ki) = k.get_mut(i) {
                    *ki = symmetrize(ki.view());
                }
                if let Some(ki) = k_lr.as_mut().and_then(|k_lr| k_lr.get_mut(i)) {
                    *ki = symmetrize(ki.view());
                }
            }
        }
        assemble(&self.config, j, k, k_lr, scale_j, scale_k)
    }
}

impl JKBuild for DirectJK {
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn compute_jk_from_d(
        &self,
        densities: &[ArrayView2<f64>],
        symm: &[bool],
        scale_j: &[f64],
        scale_k: &[f64],
    ) -> Result<JKMatrices> {
        check_densities(self.basis.nfunction(), densities, symm, scale_j, scale_k)?;
        if nothing_requested(&self.config) || densities.is_empty() {
            return Ok(JKMatrices::default());
        }
        let inputs: Vec<DensityInput> =
            densities.iter().map(|d| DensityInput::Matrix(*d)).collect();
        Ok(self.finish(&inputs, symm, scale_j, scale_k))
    }

    fn compute_jk_from_c(
        &self,
        left: &[ArrayView2<f64>],
        right: &[ArrayView2<f64>],
        scale_j: &[f64],
        scale_k: &[f64],
    ) -> Result<JKMatrices> {
        check_coefficients(self.basis.nfunction(), left, right, scale_j, scale_k)?;
        if nothing_requested(&self.config) || left.is_empty() {
            return Ok(JKMatrices::default());
        }
        // a single integral pass serves all pairs, D = L R^T is never formed
        let inputs: Vec<DensityInput> = left
            .iter()
            .zip(right.iter())
            .map(|(l, r)| DensityInput::Factors(l.view(), r.view()))
            .collect();
        let symm: Vec<bool> = left.iter().zip(right.iter()).map(|(l, r)| l == r).collect();
        Ok(self.finish(&inputs, &symm, scale_j, scale_k))
    }

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}
