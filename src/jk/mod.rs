//! Coulomb (J) and exchange (K) matrices for SCF type iterations.
//!
//! For a density D the matrices are defined as
//!     J_pq = sum_rs (pq|rs) D_rs
//!     K_pq = sum_rs (pr|qs) D_rs
//! and, with range separation, K = a K(1/r) + b K(erf(w r)/r).
//! Two strategies are available: the screened direct build ([DirectJK]) that computes the
//! electron repulsion integrals on the fly and the density fitted build ([DFJK]) that caches a
//! three-index fitting tensor.
mod df;
mod direct;
mod errors;
mod logging;

pub use df::{CoreStorage, DFState, DiskStorage, FittingStorage, StorageKind, DFJK};
pub use direct::DirectJK;
pub use errors::JKError;

use crate::basis::BasisSet;
use crate::integrals::IntegralEngine;
use crate::io::settings::{
    check_doubles, check_omega, check_product_cutoff, DFConfig, JKConfig,
};
use crate::sieve::SchwarzSieve;
use anyhow::Result;
use enum_as_inner::EnumAsInner;
use log::warn;
use ndarray::prelude::*;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JKType {
    Direct,
    DF,
}

impl fmt::Display for JKType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JKType::Direct => write!(f, "DirectJK"),
            JKType::DF => write!(f, "DFJK"),
        }
    }
}

/// Result of a JK build. `j` is empty if J was not requested, `k` is empty if K was not
/// requested, otherwise there is one matrix per input density.
#[derive(Clone, Debug, Default)]
pub struct JKMatrices {
    pub j: Vec<Array2<f64>>,
    pub k: Vec<Array2<f64>>,
}

/// Capability shared by all JK strategies.
pub trait JKBuild {
    /// Prepares everything that is reused by subsequent builds.
    fn initialize(&mut self) -> Result<()>;

    /// J and K for a list of densities. `symm[i]` marks D_i as symmetric. The results are
    /// multiplied by `scale_j[i]` and `scale_k[i]`, an empty scale list means no scaling.
    fn compute_jk_from_d(
        &self,
        densities: &[ArrayView2<f64>],
        symm: &[bool],
        scale_j: &[f64],
        scale_k: &[f64],
    ) -> Result<JKMatrices>;

    /// J and K for the densities D_i = L_i R_i^T given by pairs of coefficient matrices.
    fn compute_jk_from_c(
        &self,
        left: &[ArrayView2<f64>],
        right: &[ArrayView2<f64>],
        scale_j: &[f64],
        scale_k: &[f64],
    ) -> Result<JKMatrices>;

    /// Releases everything that was prepared by `initialize`.
    fn finalize(&mut self) -> Result<()>;
}

/// A JK object of one of the available strategies.
#[derive(EnumAsInner)]
pub enum JK {
    Direct(DirectJK),
    DF(DFJK),
}

impl JK {
    pub fn direct(
        sieve: Arc<SchwarzSieve>,
        engine: Arc<dyn IntegralEngine>,
        config: JKConfig,
    ) -> Result<Self> {
        Ok(JK::Direct(DirectJK::new(sieve, engine, config)?))
    }

    pub fn density_fitted(
        sieve: Arc<SchwarzSieve>,
        auxiliary: Arc<BasisSet>,
        engine: Arc<dyn IntegralEngine>,
        config: JKConfig,
        df_config: DFConfig,
    ) -> Result<Self> {
        Ok(JK::DF(DFJK::new(sieve, auxiliary, engine, config, df_config)?))
    }

    pub fn jk_type(&self) -> JKType {
        match self {
            JK::Direct(_) => JKType::Direct,
            JK::DF(_) => JKType::DF,
        }
    }

    /// Location of the fitting tensor, only defined for density fitting.
    pub fn storage_kind(&self) -> Option<StorageKind> {
        match self {
            JK::Direct(_) => None,
            JK::DF(jk) => Some(jk.storage_kind()),
        }
    }

    pub fn print_header(&self) {
        match self {
            JK::Direct(jk) => jk.print_header(),
            JK::DF(jk) => jk.print_header(),
        }
    }

    pub fn config(&self) -> &JKConfig {
        match self {
            JK::Direct(jk) => jk.config(),
            JK::DF(jk) => jk.config(),
        }
    }

    fn config_mut(&mut self) -> &mut JKConfig {
        match self {
            JK::Direct(jk) => &mut jk.config,
            JK::DF(jk) => &mut jk.config,
        }
    }

    pub fn doubles(&self) -> usize {
        self.config().doubles
    }

    pub fn compute_j(&self) -> bool {
        self.config().compute_j
    }

    pub fn compute_k(&self) -> bool {
        self.config().compute_k
    }

    pub fn a(&self) -> f64 {
        self.config().a
    }

    pub fn b(&self) -> f64 {
        self.config().b
    }

    pub fn w(&self) -> f64 {
        self.config().w
    }

    pub fn product_cutoff(&self) -> f64 {
        self.config().product_cutoff
    }

    pub fn set_doubles(&mut self, doubles: usize) -> Result<()> {
        check_doubles(doubles)?;
        self.config_mut().doubles = doubles;
        Ok(())
    }

    pub fn set_compute_j(&mut self, compute_j: bool) {
        self.config_mut().compute_j = compute_j;
    }

    pub fn set_compute_k(&mut self, compute_k: bool) {
        self.config_mut().compute_k = compute_k;
    }

    pub fn set_a(&mut self, a: f64) {
        self.config_mut().a = a;
    }

    pub fn set_b(&mut self, b: f64) {
        self.config_mut().b = b;
    }

    pub fn set_w(&mut self, w: f64) -> Result<()> {
        check_omega(w)?;
        match self {
            JK::Direct(jk) => jk.config.w = w,
            JK::DF(jk) => jk.set_w(w)?,
        }
        Ok(())
    }

    pub fn set_product_cutoff(&mut self, cutoff: f64) -> Result<()> {
        check_product_cutoff(cutoff)?;
        self.config_mut().product_cutoff = cutoff;
        Ok(())
    }
}

impl JKBuild for JK {
    fn initialize(&mut self) -> Result<()> {
        match self {
            JK::Direct(jk) => jk.initialize(),
            JK::DF(jk) => jk.initialize(),
        }
    }

    fn compute_jk_from_d(
        &self,
        densities: &[ArrayView2<f64>],
        symm: &[bool],
        scale_j: &[f64],
        scale_k: &[f64],
    ) -> Result<JKMatrices> {
        match self {
            JK::Direct(jk) => jk.compute_jk_from_d(densities, symm, scale_j, scale_k),
            JK::DF(jk) => jk.compute_jk_from_d(densities, symm, scale_j, scale_k),
        }
    }

    fn compute_jk_from_c(
        &self,
        left: &[ArrayView2<f64>],
        right: &[ArrayView2<f64>],
        scale_j: &[f64],
        scale_k: &[f64],
    ) -> Result<JKMatrices> {
        match self {
            JK::Direct(jk) => jk.compute_jk_from_c(left, right, scale_j, scale_k),
            JK::DF(jk) => jk.compute_jk_from_c(left, right, scale_j, scale_k),
        }
    }

    fn finalize(&mut self) -> Result<()> {
        match self {
            JK::Direct(jk) => jk.finalize(),
            JK::DF(jk) => jk.finalize(),
        }
    }
}

fn check_scales(n: usize, scale_j: &[f64], scale_k: &[f64]) -> Result<(), JKError> {
    if !scale_j.is_empty() && scale_j.len() != n {
        return Err(JKError::Config(format!(
            "{} J scale factors were given for {} densities",
            scale_j.len(),
            n
        )));
    }
    if !scale_k.is_empty() && scale_k.len() != n {
        return Err(JKError::Config(format!(
            "{} K scale factors were given for {} densities",
            scale_k.len(),
            n
        )));
    }
    Ok(())
}

/// Checks the preconditions of `compute_jk_from_d`.
pub(crate) fn check_densities(
    nbf: usize,
    densities: &[ArrayView2<f64>],
    symm: &[bool],
    scale_j: &[f64],
    scale_k: &[f64],
) -> Result<(), JKError> {
    if symm.len() != densities.len() {
        return Err(JKError::Config(format!(
            "{} symmetry flags were given for {} densities",
            symm.len(),
            densities.len()
        )));
    }
    check_scales(densities.len(), scale_j, scale_k)?;
    for (i, d) in densities.iter().enumerate() {
        if d.dim() != (nbf, nbf) {
            return Err(JKError::Config(format!(
                "density {} has the shape {:?}, expected ({}, {})",
                i,
                d.dim(),
                nbf,
                nbf
            )));
        }
    }
    Ok(())
}

/// Checks the preconditions of `compute_jk_from_c`.
pub(crate) fn check_coefficients(
    nbf: usize,
    left: &[ArrayView2<f64>],
    right: &[ArrayView2<f64>],
    scale_j: &[f64],
    scale_k: &[f64],
) -> Result<(), JKError> {
    if left.len() != right.len() {
        return Err(JKError::Config(format!(
            "{} left and {} right coefficient matrices were given",
            left.len(),
            right.len()
        )));
    }
    check_scales(left.len(), scale_j, scale_k)?;
    for (i, (l, r)) in left.iter().zip(right.iter()).enumerate() {
        if l.nrows() != nbf || r.nrows() != nbf || l.ncols() != r.ncols() {
            return Err(JKError::Config(format!(
                "coefficient pair {} has the shapes {:?} and {:?}, expected ({}, n) for both",
                i,
                l.dim(),
                r.dim(),
                nbf
            )));
        }
    }
    Ok(())
}

/// Logs a warning and returns true if the build has nothing to do.
pub(crate) fn nothing_requested(config: &JKConfig) -> bool {
    if !config.compute_j && !config.compute_k {
        warn!("Neither J nor K was requested, the JK build returns empty results");
        return true;
    }
    false
}

pub(crate) fn scale_or_one(scale: &[f64], i: usize) -> f64 {
    if scale.is_empty() {
        1.0
    } else {
        scale[i]
    }
}

/// Applies the post scales and the range separation weights. `k_full` and `k_long_range`
/// are the exchange matrices of the Coulomb and the attenuated interaction.
pub(crate) fn assemble(
    config: &JKConfig,
    j: Vec<Array2<f64>>,
    k_full: Vec<Array2<f64>>,
    k_long_range: Option<Vec<Array2<f64>>>,
    scale_j: &[f64],
    scale_k: &[f64],
) -> JKMatrices {
    let j: Vec<Array2<f64>> = j
        .into_iter()
        .enumerate()
        .map(|(i, ji)| ji * scale_or_one(scale_j, i))
        .collect();
    let k: Vec<Array2<f64>> = match k_long_range {
        Some(k_lr) => k_full
            .into_iter()
            .zip(k_lr.into_iter())
            .enumerate()
            .map(|(i, (kf, kl))| (kf * config.a + kl * config.b) * scale_or_one(scale_k, i))
            .collect(),
        None => k_full
            .into_iter()
            .enumerate()
            .map(|(i, kf)| kf * (config.a * scale_or_one(scale_k, i)))
            .collect(),
    };
    JKMatrices { j, k }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::sto3g;
    use crate::integrals::McMurchieDavidson;
    use crate::utils::tests::{h2o, random_symmetric};

    fn water_jk(df: bool) -> JK {
        let basis = Arc::new(sto3g(&h2o()).unwrap());
        let engine: Arc<dyn IntegralEngine> = Arc::new(McMurchieDavidson::new());
        let sieve = Arc::new(SchwarzSieve::from_integrals(basis.clone(), engine.as_ref()));
        if df {
            let aux = Arc::new(crate::utils::tests::h2o_auxiliary());
            JK::density_fitted(sieve, aux, engine, JKConfig::default(), DFConfig::default())
                .unwrap()
        } else {
            JK::direct(sieve, engine, JKConfig::default()).unwrap()
        }
    }

    #[test]
    fn dispatch_and_accessors() {
        let mut jk = water_jk(false);
        assert_eq!(jk.jk_type(), JKType::Direct);
        assert!(jk.storage_kind().is_none());
        assert!(jk.as_direct().is_some());
        assert_eq!(jk.doubles(), 256_000_000);
        jk.set_product_cutoff(1.0e-10).unwrap();
        assert_eq!(jk.product_cutoff(), 1.0e-10);
        jk.set_a(0.25);
        jk.set_b(0.75);
        jk.set_w(0.4).unwrap();
        assert_eq!((jk.a(), jk.b(), jk.w()), (0.25, 0.75, 0.4));

        let mut jk = water_jk(true);
        assert_eq!(jk.jk_type(), JKType::DF);
        assert_eq!(jk.storage_kind(), Some(StorageKind::Core));
        assert!(jk.as_df().is_some());
        // a smaller budget set before initialize moves the fitting tensor to disk
        jk.set_doubles(49 * 20).unwrap();
        assert_eq!(jk.storage_kind(), Some(StorageKind::Disk));
        jk.initialize().unwrap();
        assert_eq!(jk.storage_kind(), Some(StorageKind::Disk));
        jk.finalize().unwrap();
    }

    #[test]
    fn invalid_settings() {
        let mut jk = water_jk(false);
        let err = jk.set_doubles(0).unwrap_err();
        assert_eq!(
            err.downcast_ref::<JKError>(),
            Some(&JKError::Config(String::from(
                "the memory budget (doubles) has to be positive"
            )))
        );
        assert!(jk.set_product_cutoff(-1.0e-12).is_err());
        assert!(jk.set_w(-1.0).is_err());
        // the old values are kept
        assert_eq!(jk.doubles(), 256_000_000);
        assert_eq!(jk.product_cutoff(), 0.0);
    }

    #[test]
    fn mismatching_inputs() {
        for df in [false, true] {
            let mut jk = water_jk(df);
            jk.initialize().unwrap();
            let d: Array2<f64> = random_symmetric(7, 3);
            let wrong: Array2<f64> = Array2::zeros([6, 7]);

            let err = jk
                .compute_jk_from_d(&[d.view()], &[true, true], &[], &[])
                .unwrap_err();
            assert!(matches!(err.downcast_ref::<JKError>(), Some(JKError::Config(_))));
            let err = jk
                .compute_jk_from_d(&[d.view()], &[true], &[1.0, 2.0], &[])
                .unwrap_err();
            assert!(matches!(err.downcast_ref::<JKError>(), Some(JKError::Config(_))));
            let err = jk
                .compute_jk_from_d(&[wrong.view()], &[false], &[], &[])
                .unwrap_err();
            assert!(matches!(err.downcast_ref::<JKError>(), Some(JKError::Config(_))));

            let c: Array2<f64> = Array2::zeros([7, 5]);
            let c_wrong: Array2<f64> = Array2::zeros([7, 4]);
            let err = jk
                .compute_jk_from_c(&[c.view()], &[], &[], &[])
                .unwrap_err();
            assert!(matches!(err.downcast_ref::<JKError>(), Some(JKError::Config(_))));
            let err = jk
                .compute_jk_from_c(&[c.view()], &[c_wrong.view()], &[], &[])
                .unwrap_err();
            assert!(matches!(err.downcast_ref::<JKError>(), Some(JKError::Config(_))));
            jk.finalize().unwrap();
        }
    }

    #[test]
    fn nothing_to_compute() {
        for df in [false, true] {
            let mut jk = water_jk(df);
            jk.set_compute_j(false);
            jk.set_compute_k(false);
            jk.initialize().unwrap();
            let d: Array2<f64> = random_symmetric(7, 5);
            let result = jk
                .compute_jk_from_d(&[d.view()], &[true], &[], &[])
                .unwrap();
            assert!(result.j.is_empty());
            assert!(result.k.is_empty());
            jk.finalize().unwrap();
        }
    }

    #[test]
    fn empty_density_list() {
        for df in [false, true] {
            let mut jk = water_jk(df);
            jk.initialize().unwrap();
            let result = jk.compute_jk_from_d(&[], &[], &[], &[]).unwrap();
            assert!(result.j.is_empty());
            assert!(result.k.is_empty());
            jk.finalize().unwrap();
        }
    }
}
