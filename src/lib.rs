//! Coulomb and exchange matrix builds over Gaussian basis sets.
//!
//! The [jk] module provides the screened direct and the density fitted JK builds, [scf]
//! a restricted Hartree-Fock driver that uses them. The integrals come from the reference
//! engine in [integrals], which can be replaced by any [integrals::IntegralEngine].
pub mod basis;
pub mod defaults;
pub mod integrals;
pub mod io;
pub mod jk;
pub mod scf;
pub mod sieve;
pub mod utils;

pub use basis::{BasisSet, Molecule, Shell};
pub use integrals::{IntegralEngine, McMurchieDavidson, Operator};
pub use io::{read_config, Configuration, DFConfig, JKConfig, ScfConfig};
pub use jk::{JKBuild, JKError, JKMatrices, JKType, DFJK, JK};
pub use sieve::SchwarzSieve;
pub use utils::{init_logger, Timer};
