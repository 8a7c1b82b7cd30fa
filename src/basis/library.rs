use crate::basis::{BasisSet, Molecule, Shell};
use anyhow::{bail, Result};
use phf::phf_map;

static ATOMIC_NUMBERS: phf::Map<&'static str, u8> = phf_map! {
    "H" => 1,
    "He" => 2,
    "Li" => 3,
    "Be" => 4,
    "B" => 5,
    "C" => 6,
    "N" => 7,
    "O" => 8,
    "F" => 9,
    "Ne" => 10,
};

pub fn atomic_number(symbol: &str) -> Option<u8> {
    ATOMIC_NUMBERS.get(symbol).copied()
}

// STO-3G (Hehre, Stewart, Pople 1969). The exponents are the ones of the scaled Slater
// functions, the 2s and 2p shells share their exponents.
const STO3G_1S_COEFFS: [f64; 3] = [0.15432897, 0.53532814, 0.44463454];
const STO3G_2S_COEFFS: [f64; 3] = [-0.09996723, 0.39951283, 0.70011547];
const STO3G_2P_COEFFS: [f64; 3] = [0.15591627, 0.60768372, 0.39195739];

const STO3G_H_1S: [f64; 3] = [3.42525091, 0.62391373, 0.16885540];
const STO3G_O_1S: [f64; 3] = [130.7093200, 23.8088610, 6.4436083];
const STO3G_O_2SP: [f64; 3] = [5.0331513, 1.1695961, 0.3803890];

/// Minimal STO-3G basis for the elements H and O.
pub fn sto3g(molecule: &Molecule) -> Result<BasisSet> {
    let mut shells: Vec<Shell> = Vec::new();
    for (idx, atom) in molecule.atoms.iter().enumerate() {
        match atom.number {
            1 => shells.push(Shell::new(idx, atom.xyz, 0, &STO3G_H_1S, &STO3G_1S_COEFFS)),
            8 => {
                shells.push(Shell::new(idx, atom.xyz, 0, &STO3G_O_1S, &STO3G_1S_COEFFS));
                shells.push(Shell::new(idx, atom.xyz, 0, &STO3G_O_2SP, &STO3G_2S_COEFFS));
                shells.push(Shell::new(idx, atom.xyz, 1, &STO3G_O_2SP, &STO3G_2P_COEFFS));
            }
            _ => bail!("STO-3G is not available for element {}", atom.symbol),
        }
    }
    Ok(BasisSet::new("STO-3G", shells))
}

/// Parameters of an even-tempered set of uncontracted primitives
/// alpha_k = alpha_min * beta^k, k = 0..n_exponents.
#[derive(Clone, Copy, Debug)]
pub struct EvenTempered {
    pub max_angular_momentum: usize,
    pub n_exponents: usize,
    pub alpha_min: f64,
    pub beta: f64,
}

/// Uncontracted even-tempered basis on every atom of the molecule, for all angular momenta
/// up to `max_angular_momentum`. Used as auxiliary basis for density fitting.
pub fn even_tempered(molecule: &Molecule, params: EvenTempered) -> BasisSet {
    let mut shells: Vec<Shell> = Vec::new();
    for (idx, atom) in molecule.atoms.iter().enumerate() {
        for l in 0..=params.max_angular_momentum {
            for k in 0..params.n_exponents {
                let alpha: f64 = params.alpha_min * params.beta.powi(k as i32);
                shells.push(Shell::new(idx, atom.xyz, l, &[alpha], &[1.0]));
            }
        }
    }
    BasisSet::new("even-tempered", shells)
}
