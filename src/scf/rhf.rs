use crate::basis::{BasisSet, Molecule};
use crate::integrals::one_electron_matrices;
use crate::io::settings::ScfConfig;
use crate::jk::{JKBuild, JKMatrices};
use crate::scf::logging::*;
use crate::utils::Timer;
use anyhow::{bail, Context, Result};
use ndarray::prelude::*;
use ndarray_linalg::{Eigh, Inverse, SymmetricSqrt, UPLO};
use ndarray_stats::DeviationExt;
use std::fmt;

#[derive(Debug)]
pub struct SCFError {
    pub message: String,
    iteration: usize,
    energy_diff: f64,
    density_diff: f64,
}

impl SCFError {
    pub fn new(iter: usize, energy_diff: f64, density_diff: f64) -> Self {
        let message: String = format!(
            "RHF-Routine failed in Iteration: {}. The energy difference at the last iteration \
             was {:e} and the rmsd of the density was {:e}",
            iter, energy_diff, density_diff
        );
        Self {
            message,
            iteration: iter,
            energy_diff,
            density_diff,
        }
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }
}

impl fmt::Display for SCFError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message.as_str())
    }
}

impl std::error::Error for SCFError {}

/// Converged restricted Hartree-Fock solution.
#[derive(Debug, Clone)]
pub struct RHFResult {
    /// Total energy including the nuclear repulsion.
    pub energy: f64,
    pub orbe: Array1<f64>,
    pub orbs: Array2<f64>,
    /// D = C_occ C_occ^T, without the factor of two for the double occupation.
    pub density: Array2<f64>,
    pub iterations: usize,
}

/// Solves F' C' = C' e in the orthogonal basis given by `x` and transforms the orbitals back.
/// The orbital energies are in ascending order.
fn diagonalize(fock: ArrayView2<f64>, x: ArrayView2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    let fock_orth: Array2<f64> = x.t().dot(&fock).dot(&x);
    let (orbe, orbs_orth): (Array1<f64>, Array2<f64>) = fock_orth
        .eigh(UPLO::Upper)
        .context("Diagonalization of the Fock matrix failed")?;
    Ok((orbe, x.dot(&orbs_orth)))
}

fn density_matrix(orbs: ArrayView2<f64>, n_occ: usize) -> Array2<f64> {
    let occ_orbs: ArrayView2<f64> = orbs.slice(s![.., ..n_occ]);
    occ_orbs.dot(&occ_orbs.t())
}

/// F = H + 2J - K
fn fock_matrix(h: ArrayView2<f64>, jk: JKMatrices) -> Result<Array2<f64>> {
    match (jk.j.first(), jk.k.first()) {
        (Some(j), Some(k)) => Ok(&h + &(j * 2.0) - k),
        _ => bail!("The RHF Fock matrix requires both J and K"),
    }
}

/// Restricted closed shell Hartree-Fock with the core Hamiltonian as initial guess. The two
/// electron part of the Fock matrix comes from `jk` with the symmetric density of the previous
/// iteration, `jk` is initialized at the start and finalized at the end. The iterations stop as soon as the change of the total energy is
/// smaller than `scf_energy_conv`.
pub fn run_rhf<T: JKBuild>(
    molecule: &Molecule,
    basis: &BasisSet,
    jk: &mut T,
    config: &ScfConfig,
) -> Result<RHFResult> {
    let timer: Timer = Timer::start();
    let n_elec: usize = molecule.n_electrons();
    if n_elec % 2 != 0 {
        bail!(
            "RHF requires an even number of electrons, {} has {}",
            molecule.name,
            n_elec
        );
    }
    let n_occ: usize = n_elec / 2;
    if n_occ > basis.nfunction() {
        bail!(
            "{} occupied orbitals do not fit into {} basis functions",
            n_occ,
            basis.nfunction()
        );
    }
    let nuclear_energy: f64 = molecule.nuclear_repulsion_energy();

    let (s, t, v) = one_electron_matrices(basis, molecule);
    let h: Array2<f64> = t + v;
    let x: Array2<f64> = s
        .ssqrt(UPLO::Upper)
        .and_then(|s_sqrt| s_sqrt.inv())
        .context("S^-1/2 could not be computed")?;

    let (mut orbe, mut orbs) = diagonalize(h.view(), x.view())?;
    let mut density: Array2<f64> = density_matrix(orbs.view(), n_occ);
    let mut energy_old: f64 = (&density * &(&h * 2.0)).sum() + nuclear_energy;
    let mut energy_diff: f64 = 0.0;
    let mut density_diff: f64 = 0.0;

    print_rhf_init(config.scf_max_cycles, n_occ, nuclear_energy);
    jk.initialize()?;

    for iter in 0..config.scf_max_cycles {
        let jk_matrices: JKMatrices =
            jk.compute_jk_from_d(&[density.view()], &[true], &[], &[])?;
        let fock: Array2<f64> = fock_matrix(h.view(), jk_matrices)?;
        let energy: f64 = (&density * &(&h + &fock)).sum() + nuclear_energy;

        let (orbe_new, orbs_new) = diagonalize(fock.view(), x.view())?;
        let density_new: Array2<f64> = density_matrix(orbs_new.view(), n_occ);
        density_diff = density_new.root_mean_sq_err(&density)?;
        energy_diff = energy - energy_old;
        print_energies_at_iteration(iter, energy, energy_diff, density_diff);

        orbe = orbe_new;
        orbs = orbs_new;
        density = density_new;
        energy_old = energy;

        if energy_diff.abs() < config.scf_energy_conv {
            jk.finalize()?;
            print_rhf_end(&timer, energy, nuclear_energy, orbe.view());
            return Ok(RHFResult {
                energy,
                orbe,
                orbs,
                density,
                iterations: iter + 1,
            });
        }
    }
    jk.finalize()?;
    Err(SCFError::new(config.scf_max_cycles, energy_diff, density_diff).into())
}
