use crate::utils::Timer;
use log::{debug, info};
use ndarray::ArrayView1;

pub fn print_rhf_init(max_iter: usize, n_occ: usize, nuclear_energy: f64) {
    info!("{:^80}", "");
    info!("{: ^80}", "RHF-Routine");
    info!("{:-^80}", "");
    info!("{: <25} {}", "max. iterations:", max_iter);
    info!("{: <25} {}", "occupied orbitals:", n_occ);
    info!("{: <25} {:.14} Hartree", "nuclear repulsion:", nuclear_energy);
    info!("{:^80}", "");
    info!(
        "{: <45} ",
        "RHF Iterations: all quantities are in atomic units"
    );
    info!("{:-^62} ", "");
    info!(
        "{: <5} {: >18} {: >18} {: >18}",
        "Iter.", "RHF Energy", "Energy diff.", "D rmsd"
    );
    info!("{:-^62} ", "");
}

pub fn print_energies_at_iteration(iter: usize, energy: f64, energy_diff: f64, d_rmsd: f64) {
    info!(
        "{: >5} {:>18.10} {:>18.10e} {:>18.10e}",
        iter + 1,
        energy,
        energy_diff,
        d_rmsd
    );
}

pub fn print_rhf_end(timer: &Timer, energy: f64, nuclear_energy: f64, orbe: ArrayView1<f64>) {
    info!("{:-^62} ", "");
    info!("{: ^62}", "RHF converged");
    info!("{:^80} ", "");
    info!("electronic energy: {:18.14} Hartree", energy - nuclear_energy);
    info!("total energy: {:18.14} Hartree", energy);
    debug!("{: <25}", "orbital energies:");
    for (idx, e) in orbe.iter().enumerate() {
        debug!("{: >5} {:>18.10}", idx + 1, e);
    }
    info!("{:-<80} ", "");
    info!("{}", timer);
    info!("{:^80} ", "");
}
