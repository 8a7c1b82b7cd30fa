use crate::io::settings::{DFConfig, JKConfig};
use crate::jk::StorageKind;
use crate::utils::Timer;
use log::{debug, info};

pub fn print_jk_header(name: &str, config: &JKConfig, nbf: usize) {
    info!("{:^80}", "");
    info!("{: ^80}", name);
    info!("{:-^80}", "");
    info!("{: <25} {}", "basis functions:", nbf);
    info!("{: <25} {}", "J requested:", config.compute_j);
    info!("{: <25} {}", "K requested:", config.compute_k);
    info!("{: <25} {:.4e}", "memory [doubles]:", config.doubles as f64);
    info!("{: <25} {:.4e}", "product cutoff:", config.product_cutoff);
    info!("{: <25} {:.6}", "exchange scale a:", config.a);
    if config.b != 0.0 {
        info!("{: <25} {:.6}", "long-range scale b:", config.b);
        info!("{: <25} {:.6}", "omega:", config.w);
    }
}

pub fn print_df_header(config: &DFConfig, naux: usize, storage: StorageKind) {
    info!("{: <25} {}", "auxiliary functions:", naux);
    info!("{: <25} {:.4e}", "metric condition:", config.metric_condition);
    info!("{: <25} {}", "fitting tensor storage:", storage);
    if storage == StorageKind::Disk {
        info!("{: <25} {}", "scratch directory:", config.scratch_dir.display());
    }
    info!("{:-^80}", "");
}

pub fn print_metric_truncation(naux: usize, n_discarded: usize, lambda_max: f64) {
    debug!(
        "{: <25} {} of {} (max. eigenvalue: {:.6e})",
        "discarded metric eigenvalues:", n_discarded, naux, lambda_max
    );
}

pub fn print_screening(n_computed: usize, n_total: usize) {
    debug!(
        "{: <25} {} of {} unique shell quartets",
        "computed:", n_computed, n_total
    );
}

pub fn print_timing(label: &str, timer: &Timer) {
    info!("{: <25}", label);
    info!("{}", timer);
}
