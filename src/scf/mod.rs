//! Restricted Hartree-Fock on top of the JK builds.
mod logging;
mod rhf;

pub use rhf::{run_rhf, RHFResult, SCFError};
