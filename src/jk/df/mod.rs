mod metric;
mod storage;

pub use metric::inverse_sqrt_metric;
pub use storage::{CoreStorage, DiskStorage, FittingStorage, StorageKind};

use crate::basis::BasisSet;
use crate::defaults::{DENSITY_FACTOR_CUTOFF, SCRATCH_FILE_PREFIX};
use crate::integrals::{two_center_matrix, IntegralEngine, Operator};
use crate::io::settings::{check_metric_condition, check_omega, DFConfig, JKConfig};
use crate::jk::logging::{print_df_header, print_jk_header, print_metric_truncation, print_timing};
use crate::jk::{
    assemble, check_coefficients, check_densities, nothing_requested, JKBuild, JKError,
    JKMatrices,
};
use crate::sieve::SchwarzSieve;
use crate::utils::array_helper::{parallel_matrix_multiply, swap_and_merge, symmetrize};
use crate::utils::Timer;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use ndarray::prelude::*;
use ndarray_linalg::{Eigh, UPLO};
use rayon::prelude::*;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DFState {
    Uninitialized,
    Initialized,
    Finalized,
}

/// B^Q_pq = sum_P (pq|P) M_PQ with M M^T = (P|Q)^-1, stored as rows Q and columns p * nbf + q.
struct FittingTensor {
    storage: Box<dyn FittingStorage>,
    operator: Operator,
}

impl FittingTensor {
    fn naux(&self) -> usize {
        self.storage.nrows()
    }
}

struct FittedTensors {
    coulomb: FittingTensor,
    long_range: Option<FittingTensor>,
}

/// One density of a build: either the matrix itself or the two factors of D = L R^T.
/// `right` is `None` if both factors are the same matrix.
enum DensityInput {
    Matrix(Array2<f64>),
    Factors {
        left: Array2<f64>,
        right: Option<Array2<f64>>,
    },
}

impl DensityInput {
    fn factors(left: Array2<f64>, right: Array2<f64>) -> Self {
        let right: Option<Array2<f64>> = if left == right { None } else { Some(right) };
        Self::Factors { left, right }
    }
}

/// Splits a symmetric matrix D into D = L R^T with L = U |l|^1/2 sign(l) and R = U |l|^1/2
/// from its eigendecomposition. Eigenvalues with |l| <= `cutoff` max |l| are dropped.
pub fn factorize_symmetric(d: ArrayView2<f64>, cutoff: f64) -> Result<(Array2<f64>, Array2<f64>)> {
    let (eigenvalues, eigenvectors): (Array1<f64>, Array2<f64>) = d
        .eigh(UPLO::Upper)
        .context("Diagonalization of the density matrix failed")?;
    let max_abs: f64 = eigenvalues.iter().fold(0.0, |acc: f64, x| acc.max(x.abs()));
    let kept: Vec<usize> = eigenvalues
        .iter()
        .enumerate()
        .filter(|(_, lambda)| lambda.abs() > cutoff * max_abs)
        .map(|(idx, _)| idx)
        .collect();
    let mut left: Array2<f64> = eigenvectors.select(Axis(1), &kept);
    let mut right: Array2<f64> = left.clone();
    for (idx, (mut l, mut r)) in kept
        .iter()
        .zip(left.axis_iter_mut(Axis(1)).zip(right.axis_iter_mut(Axis(1))))
    {
        let lambda: f64 = eigenvalues[*idx];
        let root: f64 = lambda.abs().sqrt();
        l *= root * lambda.signum();
        r *= root;
    }
    Ok((left, right))
}

/// Density fitted JK build.
///
/// The fitting tensor is created by [initialize](JKBuild::initialize) and kept until
/// [finalize](JKBuild::finalize). It is stored in memory if it fits into the memory budget,
/// otherwise in blocks of auxiliary rows on disk.
pub struct DFJK {
    primary: Arc<BasisSet>,
    auxiliary: Arc<BasisSet>,
    sieve: Arc<SchwarzSieve>,
    engine: Arc<dyn IntegralEngine>,
    pub(super) config: JKConfig,
    df_config: DFConfig,
    storage_kind: StorageKind,
    state: DFState,
    tensors: Option<FittedTensors>,
}

impl DFJK {
    pub fn new(
        sieve: Arc<SchwarzSieve>,
        auxiliary: Arc<BasisSet>,
        engine: Arc<dyn IntegralEngine>,
        config: JKConfig,
        df_config: DFConfig,
    ) -> Result<Self> {
        config.validate()?;
        df_config.validate()?;
        let mut jk = Self {
            primary: sieve.basis().clone(),
            auxiliary,
            sieve,
            engine,
            config,
            df_config,
            storage_kind: StorageKind::Core,
            state: DFState::Uninitialized,
            tensors: None,
        };
        jk.storage_kind = jk.planned_storage_kind();
        Ok(jk)
    }

    pub fn config(&self) -> &JKConfig {
        &self.config
    }

    pub fn df_config(&self) -> &DFConfig {
        &self.df_config
    }

    /// Storage of the fitting tensor in use. Before `initialize` (or after `finalize`) this is
    /// the storage the next initialization chooses with the current settings.
    pub fn storage_kind(&self) -> StorageKind {
        match self.state {
            DFState::Initialized => self.storage_kind,
            _ => self.planned_storage_kind(),
        }
    }

    fn planned_storage_kind(&self) -> StorageKind {
        let nbf: usize = self.primary.nfunction();
        let elements: usize = self.auxiliary.nfunction() * nbf * nbf;
        if elements <= self.config.doubles && !self.df_config.force_disk {
            StorageKind::Core
        } else {
            StorageKind::Disk
        }
    }

    pub fn state(&self) -> DFState {
        self.state
    }

    /// The range separation parameter of the long-range fitting tensor is fixed at
    /// initialization, a later change only affects the next `initialize` after `finalize`.
    pub fn set_w(&mut self, w: f64) -> Result<()> {
        check_omega(w)?;
        if self.state == DFState::Initialized && w != self.config.w {
            let fitted: Option<Operator> = self
                .tensors
                .as_ref()
                .and_then(|tensors| tensors.long_range.as_ref())
                .map(|tensor| tensor.operator);
            warn!(
                "omega changed from {} to {} after initialization, the long-range fitting \
                 tensor ({:?}) is kept until it is rebuilt",
                self.config.w, w, fitted
            );
        }
        self.config.w = w;
        Ok(())
    }

    /// Used by the next `initialize`, a fitted tensor is kept.
    pub fn set_metric_condition(&mut self, metric_condition: f64) -> Result<()> {
        check_metric_condition(metric_condition)?;
        if self.state == DFState::Initialized {
            warn!(
                "metric condition changed from {:e} to {:e} after initialization, the fitting \
                 tensor is kept until it is rebuilt",
                self.df_config.metric_condition, metric_condition
            );
        }
        self.df_config.metric_condition = metric_condition;
        Ok(())
    }

    /// Used by the next `initialize`, a fitted tensor stays where it is.
    pub fn set_force_disk(&mut self, force_disk: bool) {
        if self.state == DFState::Initialized && force_disk != self.df_config.force_disk {
            warn!(
                "force_disk changed to {} after initialization, the fitting tensor stays in {}",
                force_disk, self.storage_kind
            );
        }
        self.df_config.force_disk = force_disk;
    }

    pub fn print_header(&self) {
        print_jk_header(
            "DFJK: Density-Fitted J/K Matrices",
            &self.config,
            self.primary.nfunction(),
        );
        print_df_header(&self.df_config, self.auxiliary.nfunction(), self.storage_kind());
    }

    /// Copy of the Coulomb fitting tensor B with the shape naux x nbf^2. Only available
    /// between `initialize` and `finalize`.
    pub fn fitting_tensor(&self) -> Result<Array2<f64>> {
        let tensors: &FittedTensors = self.fitted()?;
        let storage = &tensors.coulomb.storage;
        let mut full: Array2<f64> = Array2::zeros([storage.nrows(), storage.ncols()]);
        storage.for_each_block(&mut |start, block| {
            full.slice_mut(s![start..start + block.nrows(), ..])
                .assign(&block);
            Ok(())
        })?;
        Ok(full)
    }

    fn fitted(&self) -> Result<&FittedTensors, JKError> {
        match (self.state, self.tensors.as_ref()) {
            (DFState::Initialized, Some(tensors)) => Ok(tensors),
            (DFState::Finalized, _) => Err(JKError::Lifecycle(String::from(
                "the fitting tensor was released by finalize",
            ))),
            _ => Err(JKError::Lifecycle(String::from(
                "the JK object has to be initialized before a build",
            ))),
        }
    }

    /// Rows of the fitting tensor that are kept in memory at the same time.
    fn block_rows(&self, naux: usize) -> usize {
        let nbf2: usize = self.primary.nfunction().pow(2).max(1);
        (self.config.doubles / nbf2).clamp(1, naux.max(1))
    }

    fn create_storage(&self, naux: usize) -> Result<Box<dyn FittingStorage>> {
        let nbf2: usize = self.primary.nfunction().pow(2);
        let storage: Box<dyn FittingStorage> = match self.storage_kind {
            StorageKind::Core => Box::new(CoreStorage::zeros(naux, nbf2)),
            StorageKind::Disk => Box::new(DiskStorage::zeros(
                &self.df_config.scratch_dir,
                SCRATCH_FILE_PREFIX,
                naux,
                nbf2,
                self.block_rows(naux),
            )?),
        };
        Ok(storage)
    }

    /// Three-index integrals (pq|P) for the auxiliary shells `shells` as a matrix with the
    /// rows P and the columns p * nbf + q. Only the significant primary shell pairs are
    /// computed, all others stay zero.
    fn three_index_block(
        &self,
        shells: &[usize],
        pairs: &[(usize, usize)],
        operator: Operator,
    ) -> Array2<f64> {
        let nbf: usize = self.primary.nfunction();
        let buffer_size: usize =
            self.primary.max_shell_functions().pow(2) * self.auxiliary.max_shell_functions();
        let rows: Vec<Array2<f64>> = shells
            .par_iter()
            .map(|c| {
                let aux_shell = self.auxiliary.shell(*c);
                let nc: usize = aux_shell.n_functions();
                let mut rows: Array2<f64> = Array2::zeros([nc, nbf * nbf]);
                let mut buffer: Vec<f64> = vec![0.0; buffer_size];
                for (p, q) in pairs.iter() {
                    let (sp, sq) = (self.primary.shell(*p), self.primary.shell(*q));
                    self.engine
                        .three_center(sp, sq, aux_shell, operator, &mut buffer);
                    let (op, np) = (sp.function_index, sp.n_functions());
                    let (oq, nq) = (sq.function_index, sq.n_functions());
                    let mut index: usize = 0;
                    for a in op..op + np {
                        for b in oq..oq + nq {
                            for k in 0..nc {
                                rows[[k, a * nbf + b]] = buffer[index];
                                rows[[k, b * nbf + a]] = buffer[index];
                                index += 1;
                            }
                        }
                    }
                }
                rows
            })
            .collect();
        let views: Vec<ArrayView2<f64>> = rows.iter().map(|r| r.view()).collect();
        // all rows have the same number of columns
        ndarray::concatenate(Axis(0), &views).unwrap()
    }

    /// Fits the products of primary functions for the given interaction.
    fn fit(&self, operator: Operator) -> Result<FittingTensor> {
        let timer: Timer = Timer::start();
        let naux: usize = self.auxiliary.nfunction();

        let metric: Array2<f64> =
            two_center_matrix(&self.auxiliary, self.engine.as_ref(), operator);
        let (m, n_discarded, lambda_max): (Array2<f64>, usize, f64) =
            inverse_sqrt_metric(metric.view(), self.df_config.metric_condition)?;
        print_metric_truncation(naux, n_discarded, lambda_max);

        let pairs: Vec<(usize, usize)> = self.sieve.significant_pairs(self.config.product_cutoff);
        debug!(
            "{: <25} {} of {}",
            "significant shell pairs:",
            pairs.len(),
            self.primary.nshell() * (self.primary.nshell() + 1) / 2
        );

        let mut storage: Box<dyn FittingStorage> = self.create_storage(m.ncols())?;

        // batches of complete auxiliary shells with at most `block_rows` functions
        let block_rows: usize = self.block_rows(naux);
        let mut batches: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let mut current_rows: usize = 0;
        for shell in 0..self.auxiliary.nshell() {
            let n: usize = self.auxiliary.function_count(shell);
            if !current.is_empty() && current_rows + n > block_rows {
                batches.push(std::mem::take(&mut current));
                current_rows = 0;
            }
            current.push(shell);
            current_rows += n;
        }
        if !current.is_empty() {
            batches.push(current);
        }

        // B[Q, pq] = sum_P M[P, Q] (P|pq)
        for batch in batches.iter() {
            let start: usize = self.auxiliary.function_offset(batch[0]);
            let three_index: Array2<f64> = self.three_index_block(batch, &pairs, operator);
            let end: usize = start + three_index.nrows();
            storage.for_each_block_mut(&mut |row, mut block| {
                let rows: usize = block.nrows();
                let m_block = m.slice(s![start..end, row..row + rows]);
                block += &m_block.t().dot(&three_index);
                Ok(())
            })?;
        }
        print_timing(
            &format!("fitting tensor ({:?}):", operator),
            &timer,
        );
        Ok(FittingTensor { storage, operator })
    }

    /// J and K contributions of all densities in one pass over the blocks of `tensor`,
    /// J_pq = sum_Q B^Q_pq gamma_Q with gamma_Q = sum_rs B^Q_rs D_rs and K = sum_Q B^Q D B^Q.
    /// For D = L R^T both come from X^Q = B^Q L without forming D:
    /// gamma_Q = sum_si X^Q_si R_si and K = sum_Q X^Q (B^Q R)^T.
    fn contract(
        &self,
        tensor: &FittingTensor,
        inputs: &[DensityInput],
        compute_j: bool,
        compute_k: bool,
    ) -> Result<(Vec<Array2<f64>>, Vec<Array2<f64>>)> {
        let nbf: usize = self.primary.nfunction();
        let n_threads: usize = rayon::current_num_threads();
        let mut j_columns: Vec<Array1<f64>> = if compute_j {
            inputs.iter().map(|_| Array1::zeros(nbf * nbf)).collect()
        } else {
            Vec::new()
        };
        let mut k: Vec<Array2<f64>> = if compute_k {
            inputs.iter().map(|_| Array2::zeros([nbf, nbf])).collect()
        } else {
            Vec::new()
        };
        tensor.storage.for_each_block(&mut |_, block| {
            let naux: usize = block.nrows();
            // rows (Q, p) and columns r
            let b_2d = block
                .into_shape((naux * nbf, nbf))
                .context("The fitting tensor block is not contiguous")?;
            let mut b_merged: Option<Array2<f64>> = None;
            for (n, input) in inputs.iter().enumerate() {
                match input {
                    DensityInput::Matrix(d) => {
                        if compute_j {
                            let d_column: Array1<f64> = d.iter().cloned().collect();
                            let gamma: Array1<f64> = block.dot(&d_column);
                            j_columns[n] += &block.t().dot(&gamma);
                        }
                        if compute_k {
                            let x: Array3<f64> =
                                b_2d.dot(d).into_shape((naux, nbf, nbf)).unwrap();
                            let x: Array2<f64> = swap_and_merge(&x);
                            if b_merged.is_none() {
                                let b_3d = b_2d.view().into_shape((naux, nbf, nbf)).unwrap();
                                b_merged = Some(swap_and_merge(&b_3d));
                            }
                            if let Some(b) = b_merged.as_ref() {
                                k[n] += &parallel_matrix_multiply(x.view(), b.t(), n_threads);
                            }
                        }
                    }
                    DensityInput::Factors { left, right } => {
                        let n_occ: usize = left.ncols();
                        if n_occ == 0 {
                            continue;
                        }
                        let x: Array2<f64> = b_2d.dot(left);
                        if compute_j {
                            let r_column: Array1<f64> =
                                right.as_ref().unwrap_or(left).iter().cloned().collect();
                            let gamma: Array1<f64> = x
                                .view()
                                .into_shape((naux, nbf * n_occ))
                                .unwrap()
                                .dot(&r_column);
                            j_columns[n] += &block.t().dot(&gamma);
                        }
                        if compute_k {
                            let x: Array2<f64> =
                                swap_and_merge(&x.into_shape((naux, nbf, n_occ)).unwrap());
                            let product: Array2<f64> = match right {
                                Some(right) => {
                                    let y: Array3<f64> =
                                        b_2d.dot(right).into_shape((naux, nbf, n_occ)).unwrap();
                                    let y: Array2<f64> = swap_and_merge(&y);
                                    parallel_matrix_multiply(x.view(), y.t(), n_threads)
                                }
                                None => parallel_matrix_multiply(x.view(), x.t(), n_threads),
                            };
                            k[n] += &product;
                        }
                    }
                }
            }
            Ok(())
        })?;
        let j: Vec<Array2<f64>> = j_columns
            .into_iter()
            .map(|column| column.into_shape((nbf, nbf)).unwrap())
            .collect();
        Ok((j, k))
    }

    fn build(
        &self,
        inputs: &[DensityInput],
        symm: &[bool],
        scale_j: &[f64],
        scale_k: &[f64],
    ) -> Result<JKMatrices> {
        let tensors: &FittedTensors = self.fitted()?;
        let long_range_needed: bool = self.config.compute_k && self.config.b != 0.0;
        if long_range_needed && tensors.long_range.is_none() {
            return Err(JKError::Config(String::from(
                "a long-range exchange (b != 0) was requested, but no long-range fitting tensor \
                 was built at initialization",
            ))
            .into());
        }
        let timer: Timer = Timer::start();

        let (mut j, mut k): (Vec<Array2<f64>>, Vec<Array2<f64>>) = self.contract(
            &tensors.coulomb,
            inputs,
            self.config.compute_j,
            self.config.compute_k,
        )?;
        let mut k_lr: Option<Vec<Array2<f64>>> = match tensors.long_range.as_ref() {
            Some(tensor) if long_range_needed => {
                Some(self.contract(tensor, inputs, false, true)?.1)
            }
            _ => None,
        };

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
        debug!("{: <25}", "density fitted JK build");
        debug!("{}", timer);
        Ok(assemble(&self.config, j, k, k_lr, scale_j, scale_k))
    }
}

impl JKBuild for DFJK {
    /// Builds the fitting tensor(s). A second call while initialized keeps the existing
    /// tensors, a call after `finalize` builds them again. The storage is chosen from the
    /// settings at this point.
    fn initialize(&mut self) -> Result<()> {
        if self.state == DFState::Initialized {
            debug!("DFJK is already initialized, the fitting tensor is kept");
            return Ok(());
        }
        let timer: Timer = Timer::start();
        self.storage_kind = self.planned_storage_kind();
        let coulomb: FittingTensor = self.fit(Operator::Coulomb)?;
        let long_range: Option<FittingTensor> = if self.config.b != 0.0 {
            Some(self.fit(Operator::Attenuated {
                omega: self.config.w,
            })?)
        } else {
            None
        };
        info!(
            "{: <25} {} x {} ({})",
            "fitting tensor:",
            coulomb.naux(),
            self.primary.nfunction().pow(2),
            self.storage_kind
        );
        self.tensors = Some(FittedTensors {
            coulomb,
            long_range,
        });
        self.state = DFState::Initialized;
        print_timing("DFJK initialization:", &timer);
        Ok(())
    }

    fn compute_jk_from_d(
        &self,
        densities: &[ArrayView2<f64>],
        symm: &[bool],
        scale_j: &[f64],
        scale_k: &[f64],
    ) -> Result<JKMatrices> {
        self.fitted()?;
        check_densities(self.primary.nfunction(), densities, symm, scale_j, scale_k)?;
        if nothing_requested(&self.config) || densities.is_empty() {
            return Ok(JKMatrices::default());
        }
        // symmetric densities enter through their factorization if K is needed
        let mut inputs: Vec<DensityInput> = Vec::with_capacity(densities.len());
        for (d, is_symmetric) in densities.iter().zip(symm.iter()) {
            if self.config.compute_k && *is_symmetric {
                let (left, right) = factorize_symmetric(*d, DENSITY_FACTOR_CUTOFF)?;
                inputs.push(DensityInput::factors(left, right));
            } else {
                inputs.push(DensityInput::Matrix(d.to_owned()));
            }
        }
        self.build(&inputs, symm, scale_j, scale_k)
    }

    fn compute_jk_from_c(
        &self,
        left: &[ArrayView2<f64>],
        right: &[ArrayView2<f64>],
        scale_j: &[f64],
        scale_k: &[f64],
    ) -> Result<JKMatrices> {
        self.fitted()?;
        check_coefficients(self.primary.nfunction(), left, right, scale_j, scale_k)?;
        if nothing_requested(&self.config) || left.is_empty() {
            return Ok(JKMatrices::default());
        }
        let inputs: Vec<DensityInput> = left
            .iter()
            .zip(right.iter())
            .map(|(l, r)| DensityInput::factors(l.to_owned(), r.to_owned()))
            .collect();
        let symm: Vec<bool> = left.iter().zip(right.iter()).map(|(l, r)| l == r).collect();
        self.build(&inputs, &symm, scale_j, scale_k)
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(mut tensors) = self.tensors.take() {
            tensors.coulomb.storage.release()?;
            if let Some(mut long_range) = tensors.long_range {
                long_range.storage.release()?;
            }
        }
        self.state = DFState::Finalized;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::{even_tempered, sto3g, EvenTempered};
    use crate::integrals::reference::{coulomb_from_eri, eri_tensor, exchange_from_eri};
    use crate::integrals::McMurchieDavidson;
    use crate::io::settings::{DFConfigBuilder, JKConfigBuilder};
    use crate::jk::DirectJK;
    use crate::utils::tests::{
        exactly_fitted_pair, h2, h2o, h2o_auxiliary, random_matrix, random_symmetric,
    };
    use approx::AbsDiffEq;

    const EPSILON: f64 = 1e-10;

    fn water_df(config: JKConfig, df_config: DFConfig) -> DFJK {
        let basis = Arc::new(sto3g(&h2o()).unwrap());
        let engine: Arc<dyn IntegralEngine> = Arc::new(McMurchieDavidson::new());
        let sieve = Arc::new(SchwarzSieve::from_integrals(basis, engine.as_ref()));
        DFJK::new(sieve, Arc::new(h2o_auxiliary()), engine, config, df_config).unwrap()
    }

    fn exact_pair(config: JKConfig, df_config: DFConfig) -> (DFJK, DirectJK) {
        let (primary, auxiliary) = exactly_fitted_pair();
        let primary = Arc::new(primary);
        let engine: Arc<dyn IntegralEngine> = Arc::new(McMurchieDavidson::new());
        let sieve = Arc::new(SchwarzSieve::from_integrals(primary, engine.as_ref()));
        let df = DFJK::new(
            sieve.clone(),
            Arc::new(auxiliary),
            engine.clone(),
            config.clone(),
            df_config,
        )
        .unwrap();
        let direct = DirectJK::new(sieve, engine, config).unwrap();
        (df, direct)
    }

    #[test]
    fn lifecycle() {
        let mut jk = water_df(JKConfig::default(), DFConfig::default());
        let d: Array2<f64> = random_symmetric(7, 1);
        assert_eq!(jk.state(), DFState::Uninitialized);
        let err = jk
            .compute_jk_from_d(&[d.view()], &[true], &[], &[])
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<JKError>(), Some(JKError::Lifecycle(_))));

        jk.initialize().unwrap();
        assert_eq!(jk.state(), DFState::Initialized);
        assert!(jk.compute_jk_from_d(&[d.view()], &[true], &[], &[]).is_ok());

        jk.finalize().unwrap();
        assert_eq!(jk.state(), DFState::Finalized);
        let err = jk
            .compute_jk_from_c(&[d.view()], &[d.view()], &[], &[])
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<JKError>(), Some(JKError::Lifecycle(_))));
        assert!(jk.fitting_tensor().is_err());

        // initialize after finalize builds the tensor again
        jk.initialize().unwrap();
        assert!(jk.compute_jk_from_d(&[d.view()], &[true], &[], &[]).is_ok());
        jk.finalize().unwrap();
    }

    #[test]
    fn repeated_initialize_keeps_tensor() {
        let mut jk = water_df(JKConfig::default(), DFConfig::default());
        jk.initialize().unwrap();
        let first: Array2<f64> = jk.fitting_tensor().unwrap();
        jk.initialize().unwrap();
        let second: Array2<f64> = jk.fitting_tensor().unwrap();
        assert_eq!(first, second);
        jk.finalize().unwrap();
    }

    #[test]
    fn exact_fitting_reproduces_direct() {
        let (mut df, direct) = exact_pair(JKConfig::default(), DFConfig::default());
        df.initialize().unwrap();
        let d_sym: Array2<f64> = random_symmetric(2, 3);
        let d_gen: Array2<f64> = random_matrix(2, 2, 4);
        let densities = [d_sym.view(), d_gen.view()];
        let result_df = df.compute_jk_from_d(&densities, &[true, false], &[], &[]).unwrap();
        let result_direct = direct
            .compute_jk_from_d(&densities, &[true, false], &[], &[])
            .unwrap();
        for i in 0..2 {
            assert!(
                result_df.j[i].abs_diff_eq(&result_direct.j[i], EPSILON),
                "Matrices are NOT equal! \n J DF: {} \n J direct: {}",
                result_df.j[i],
                result_direct.j[i]
            );
            assert!(
                result_df.k[i].abs_diff_eq(&result_direct.k[i], EPSILON),
                "Matrices are NOT equal! \n K DF: {} \n K direct: {}",
                result_df.k[i],
                result_direct.k[i]
            );
        }
        df.finalize().unwrap();
    }

    #[test]
    fn single_function_basis() {
        // one s function and an auxiliary s function with the exponent of its square
        let alpha: f64 = 0.9;
        let basis = Arc::new(BasisSet::new(
            "s",
            vec![crate::basis::Shell::new(0, [0.0; 3], 0, &[alpha], &[1.0])],
        ));
        let aux = Arc::new(BasisSet::new(
            "s-aux",
            vec![crate::basis::Shell::new(0, [0.0; 3], 0, &[2.0 * alpha], &[1.0])],
        ));
        let engine: Arc<dyn IntegralEngine> = Arc::new(McMurchieDavidson::new());
        let sieve = Arc::new(SchwarzSieve::from_integrals(basis, engine.as_ref()));
        let mut jk =
            DFJK::new(sieve, aux, engine, JKConfig::default(), DFConfig::default()).unwrap();
        jk.initialize().unwrap();
        let d: Array2<f64> = arr2(&[[0.4]]);
        let result = jk.compute_jk_from_d(&[d.view()], &[true], &[], &[]).unwrap();
        let eri: f64 = 2.0 * (alpha / std::f64::consts::PI).sqrt();
        assert!((result.j[0][[0, 0]] - eri * 0.4).abs() < EPSILON);
        assert!((result.k[0][[0, 0]] - eri * 0.4).abs() < EPSILON);
        jk.finalize().unwrap();
    }

    #[test]
    fn water_close_to_direct() {
        let mut jk = water_df(JKConfig::default(), DFConfig::default());
        jk.initialize().unwrap();
        let basis = sto3g(&h2o()).unwrap();
        let eri = eri_tensor(&basis, &McMurchieDavidson::new(), Operator::Coulomb);
        let d: Array2<f64> = random_symmetric(7, 21) * 0.2;
        let result = jk.compute_jk_from_d(&[d.view()], &[true], &[], &[]).unwrap();
        let j_ref = coulomb_from_eri(eri.view(), d.view());
        let k_ref = exchange_from_eri(eri.view(), d.view());
        assert!(result.j[0].abs_diff_eq(&j_ref, 1e-2));
        assert!(result.k[0].abs_diff_eq(&k_ref, 1e-2));
        assert!(result.j[0].abs_diff_eq(&result.j[0].t(), 1e-12));
        assert!(result.k[0].abs_diff_eq(&result.k[0].t(), 1e-12));
        jk.finalize().unwrap();
    }

    #[test]
    fn disk_storage_equals_core_storage() {
        let mut core = water_df(JKConfig::default(), DFConfig::default());
        // a budget that allows only a few auxiliary rows per block
        let config = JKConfigBuilder::default().doubles(49 * 20).build().unwrap();
        let mut disk = water_df(config, DFConfig::default());
        let mut forced = water_df(
            JKConfig::default(),
            DFConfigBuilder::default().force_disk(true).build().unwrap(),
        );
        assert_eq!(core.storage_kind(), StorageKind::Core);
        assert_eq!(disk.storage_kind(), StorageKind::Disk);
        assert_eq!(forced.storage_kind(), StorageKind::Disk);
        core.initialize().unwrap();
        disk.initialize().unwrap();
        forced.initialize().unwrap();

        let b_core = core.fitting_tensor().unwrap();
        assert!(b_core.abs_diff_eq(&disk.fitting_tensor().unwrap(), 1e-12));
        assert!(b_core.abs_diff_eq(&forced.fitting_tensor().unwrap(), 1e-12));

        let d: Array2<f64> = random_matrix(7, 7, 13);
        let from_core = core.compute_jk_from_d(&[d.view()], &[false], &[], &[]).unwrap();
        let from_disk = disk.compute_jk_from_d(&[d.view()], &[false], &[], &[]).unwrap();
        assert!(from_core.j[0].abs_diff_eq(&from_disk.j[0], 1e-12));
        assert!(from_core.k[0].abs_diff_eq(&from_disk.k[0], 1e-12));
        core.finalize().unwrap();
        disk.finalize().unwrap();
        forced.finalize().unwrap();
    }

    #[test]
    fn coefficients_and_density_agree() {
        let mut jk = water_df(JKConfig::default(), DFConfig::default());
        jk.initialize().unwrap();
        let c_left: Array2<f64> = random_matrix(7, 3, 7);
        let c_right: Array2<f64> = random_matrix(7, 3, 8);
        let d: Array2<f64> = c_left.dot(&c_right.t());
        let from_c = jk
            .compute_jk_from_c(&[c_left.view()], &[c_right.view()], &[], &[])
            .unwrap();
        let from_d = jk.compute_jk_from_d(&[d.view()], &[false], &[], &[]).unwrap();
        assert!(from_c.j[0].abs_diff_eq(&from_d.j[0], EPSILON));
        assert!(from_c.k[0].abs_diff_eq(&from_d.k[0], EPSILON));

        // the symmetric factorization of D = C C^T reproduces the coefficient path
        let d_occ: Array2<f64> = c_left.dot(&c_left.t());
        let from_c = jk
            .compute_jk_from_c(&[c_left.view()], &[c_left.view()], &[], &[])
            .unwrap();
        let from_d = jk.compute_jk_from_d(&[d_occ.view()], &[true], &[], &[]).unwrap();
        assert!(from_c.j[0].abs_diff_eq(&from_d.j[0], EPSILON));
        assert!(from_c.k[0].abs_diff_eq(&from_d.k[0], EPSILON));
        assert!(from_c.k[0].abs_diff_eq(&from_c.k[0].t(), 1e-12));
        jk.finalize().unwrap();
    }

    #[test]
    fn coefficients_with_exact_fitting() {
        let (mut df, direct) = exact_pair(JKConfig::default(), DFConfig::default());
        df.initialize().unwrap();
        let c_left: Array2<f64> = random_matrix(2, 1, 31);
        let c_right: Array2<f64> = random_matrix(2, 1, 32);
        let pairs_left = [c_left.view(), c_left.view()];
        let pairs_right = [c_right.view(), c_left.view()];
        let result_df = df
            .compute_jk_from_c(&pairs_left, &pairs_right, &[], &[])
            .unwrap();
        let result_direct = direct
            .compute_jk_from_c(&pairs_left, &pairs_right, &[], &[])
            .unwrap();
        for i in 0..2 {
            assert!(
                result_df.j[i].abs_diff_eq(&result_direct.j[i], EPSILON),
                "Matrices are NOT equal! \n J DF: {} \n J direct: {}",
                result_df.j[i],
                result_direct.j[i]
            );
            assert!(
                result_df.k[i].abs_diff_eq(&result_direct.k[i], EPSILON),
                "Matrices are NOT equal! \n K DF: {} \n K direct: {}",
                result_df.k[i],
                result_direct.k[i]
            );
        }
        df.finalize().unwrap();
    }

    #[test]
    fn storage_is_chosen_at_initialize() {
        let mut jk = water_df(JKConfig::default(), DFConfig::default());
        assert_eq!(jk.storage_kind(), StorageKind::Core);
        jk.config.doubles = 49 * 20;
        assert_eq!(jk.storage_kind(), StorageKind::Disk);
        jk.initialize().unwrap();
        assert_eq!(jk.storage_kind(), StorageKind::Disk);
        // the tensor in use does not move when the budget changes again
        jk.config.doubles = JKConfig::default().doubles;
        assert_eq!(jk.storage_kind(), StorageKind::Disk);
        jk.finalize().unwrap();
        assert_eq!(jk.storage_kind(), StorageKind::Core);
    }

    #[test]
    fn df_settings_before_initialize() {
        let mut jk = water_df(JKConfig::default(), DFConfig::default());
        let err = jk.set_metric_condition(1.5).unwrap_err();
        assert!(matches!(err.downcast_ref::<JKError>(), Some(JKError::Config(_))));
        jk.set_metric_condition(1.0e-10).unwrap();
        jk.set_force_disk(true);
        assert_eq!(jk.df_config().metric_condition, 1.0e-10);
        assert_eq!(jk.storage_kind(), StorageKind::Disk);
        jk.initialize().unwrap();
        assert_eq!(jk.storage_kind(), StorageKind::Disk);
        jk.finalize().unwrap();
    }

    #[test]
    fn factorization_of_indefinite_density() {
        let d: Array2<f64> = random_symmetric(6, 17);
        let (left, right) = factorize_symmetric(d.view(), DENSITY_FACTOR_CUTOFF).unwrap();
        assert!(left.dot(&right.t()).abs_diff_eq(&d, 1e-12));
        let zero: Array2<f64> = Array2::zeros([3, 3]);
        let (left, _) = factorize_symmetric(zero.view(), DENSITY_FACTOR_CUTOFF).unwrap();
        assert_eq!(left.ncols(), 0);
    }

    #[test]
    fn long_range_exchange() {
        let (primary, auxiliary) = exactly_fitted_pair();
        let primary = Arc::new(primary);
        let engine: Arc<dyn IntegralEngine> = Arc::new(McMurchieDavidson::new());
        let sieve = Arc::new(SchwarzSieve::from_integrals(primary.clone(), engine.as_ref()));
        let config = JKConfigBuilder::default().a(0.3).b(0.7).w(1.5).build().unwrap();
        let mut jk = DFJK::new(
            sieve,
            Arc::new(auxiliary),
            engine.clone(),
            config,
            DFConfig::default(),
        )
        .unwrap();
        jk.initialize().unwrap();
        let d: Array2<f64> = random_symmetric(2, 5);
        let result = jk.compute_jk_from_d(&[d.view()], &[true], &[], &[]).unwrap();
        let eri = eri_tensor(&primary, engine.as_ref(), Operator::Coulomb);
        let eri_lr = eri_tensor(&primary, engine.as_ref(), Operator::Attenuated { omega: 1.5 });
        let k_ref: Array2<f64> = exchange_from_eri(eri.view(), d.view()) * 0.3
            + exchange_from_eri(eri_lr.view(), d.view()) * 0.7;
        assert!(result.k[0].abs_diff_eq(&k_ref, 1e-7));

        // a changed omega does not touch the fitted tensor
        jk.set_w(0.5).unwrap();
        let again = jk.compute_jk_from_d(&[d.view()], &[true], &[], &[]).unwrap();
        assert!(again.k[0].abs_diff_eq(&result.k[0], 1e-14));
        jk.finalize().unwrap();
    }

    #[test]
    fn long_range_tensor_missing() {
        let (mut df, _direct) = exact_pair(JKConfig::default(), DFConfig::default());
        df.initialize().unwrap();
        df.config.b = 0.5;
        let d: Array2<f64> = random_symmetric(2, 5);
        let err = df
            .compute_jk_from_d(&[d.view()], &[true], &[], &[])
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<JKError>(), Some(JKError::Config(_))));
        df.finalize().unwrap();
    }

    #[test]
    fn h2_with_even_tempered_auxiliary() {
        let molecule = h2();
        let basis = Arc::new(sto3g(&molecule).unwrap());
        let aux = Arc::new(even_tempered(
            &molecule,
            EvenTempered {
                max_angular_momentum: 2,
                n_exponents: 8,
                alpha_min: 0.2,
                beta: 2.5,
            },
        ));
        let engine: Arc<dyn IntegralEngine> = Arc::new(McMurchieDavidson::new());
        let sieve = Arc::new(SchwarzSieve::from_integrals(basis.clone(), engine.as_ref()));
        let mut df = DFJK::new(
            sieve.clone(),
            aux,
            engine.clone(),
            JKConfig::default(),
            DFConfig::default(),
        )
        .unwrap();
        let direct = DirectJK::new(sieve, engine, JKConfig::default()).unwrap();
        df.initialize().unwrap();
        // density of the bonding orbital of H2
        let d: Array2<f64> = Array2::from_elem([2, 2], 0.5 / (1.0 + 0.6593));
        let a = df.compute_jk_from_d(&[d.view()], &[true], &[], &[]).unwrap();
        let b = direct.compute_jk_from_d(&[d.view()], &[true], &[], &[]).unwrap();
        assert!(a.j[0].abs_diff_eq(&b.j[0], 2e-3));
        assert!(a.k[0].abs_diff_eq(&b.k[0], 2e-3));
        df.finalize().unwrap();
    }
}
