pub mod library;
mod molecule;
mod shell;

pub use library::{even_tempered, sto3g, EvenTempered};
pub use molecule::{Atom, Molecule};
pub use shell::{cartesian_components, odd_double_factorial, BasisSet, Shell};
