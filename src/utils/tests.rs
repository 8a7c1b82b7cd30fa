use crate::basis::{even_tempered, Atom, BasisSet, EvenTempered, Molecule, Shell};
use ndarray::prelude::*;
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

pub const AVAILAIBLE_MOLECULES: [&'static str; 2] = ["h2o", "h2"];

/// Water in bohr, the geometry of the HF/STO-3G reference calculation.
pub fn h2o() -> Molecule {
    let atoms: Vec<Atom> = vec![
        Atom::new("O1", "O", [0.0, 0.0, -0.12947689015702168]).unwrap(),
        Atom::new("H2", "H", [0.0, -1.4941867505039508, 1.0274461029282449]).unwrap(),
        Atom::new("H3", "H", [0.0, 1.4941867505039510, 1.0274461029282449]).unwrap(),
    ];
    Molecule::new("h2o", atoms)
}

/// H2 with a bond length of 1.4 bohr.
pub fn h2() -> Molecule {
    let atoms: Vec<Atom> = vec![
        Atom::new("H1", "H", [0.0, 0.0, 0.0]).unwrap(),
        Atom::new("H2", "H", [0.0, 0.0, 1.4]).unwrap(),
    ];
    Molecule::new("h2", atoms)
}

pub fn get_molecule(name: &str) -> Molecule {
    match name {
        "h2o" => h2o(),
        "h2" => h2(),
        _ => panic!("Molecule {} is not available for tests", name),
    }
}

/// Even-tempered s, p and d functions on every atom of water, dense enough that the density
/// fitted J and K agree with the exact ones to a few 1e-4.
pub fn h2o_auxiliary() -> BasisSet {
    even_tempered(
        &h2o(),
        EvenTempered {
            max_angular_momentum: 2,
            n_exponents: 10,
            alpha_min: 0.15,
            beta: 2.5,
        },
    )
}

/// One-center s basis with the exponents 0.5 and 2.0 and an auxiliary basis that contains
/// exactly the exponents of all products of the primary functions. Density fitting is exact
/// for this pair of basis sets.
pub fn exactly_fitted_pair() -> (BasisSet, BasisSet) {
    let center: [f64; 3] = [0.0, 0.0, 0.0];
    let primary = BasisSet::new(
        "s2",
        vec![
            Shell::new(0, center, 0, &[0.5], &[1.0]),
            Shell::new(0, center, 0, &[2.0], &[1.0]),
        ],
    );
    let auxiliary = BasisSet::new(
        "s2-products",
        vec![
            Shell::new(0, center, 0, &[1.0], &[1.0]),
            Shell::new(0, center, 0, &[2.5], &[1.0]),
            Shell::new(0, center, 0, &[4.0], &[1.0]),
        ],
    );
    (primary, auxiliary)
}

pub fn random_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::random_using((rows, cols), Uniform::new(-1.0, 1.0), &mut rng)
}

/// Symmetric random matrix with elements in [-1, 1].
pub fn random_symmetric(n: usize, seed: u64) -> Array2<f64> {
    let a: Array2<f64> = random_matrix(n, n, seed);
    (&a + &a.t()) * 0.5
}

#[test]
fn logger_is_set_up_once() {
    crate::utils::init_logger(-1);
    // later calls keep the first level
    crate::utils::init_logger(2);
    assert_eq!(log::max_level(), log::LevelFilter::Warn);
}
