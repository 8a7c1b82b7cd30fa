// JK BUILD
// memory budget in units of f64 elements
pub const DOUBLES: usize = 256_000_000;
pub const COMPUTE_J: bool = true;
pub const COMPUTE_K: bool = true;
// K = a * K(1/r) + b * K(erf(w r)/r)
pub const EXCHANGE_SCALE_FULL: f64 = 1.0;
pub const EXCHANGE_SCALE_LONG_RANGE: f64 = 0.0;
pub const RANGE_SEPARATION_OMEGA: f64 = 0.0;
// shell quartets with bound(P,Q) * bound(R,S) below this value are skipped
pub const PRODUCT_CUTOFF: f64 = 0.0;

// DENSITY FITTING
// eigenvalues of the auxiliary metric below metric_condition * max. eigenvalue are dropped
pub const METRIC_CONDITION: f64 = 1.0e-12;
pub const FORCE_DISK: bool = false;
// relative cutoff for the eigenvalues of a symmetric density used in the factorized K build
pub const DENSITY_FACTOR_CUTOFF: f64 = 1.0e-14;
pub const SCRATCH_FILE_PREFIX: &str = "dialect_jk_df";

// config file
pub const CONFIG_FILE_NAME: &str = "jk.toml";

// SCF ITERATION
pub const MAX_ITER: usize = 100;
pub const SCF_ENERGY_CONV: f64 = 1.0e-8;
