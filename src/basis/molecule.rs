use crate::basis::library::atomic_number;
use anyhow::{Context, Result};
use std::fmt;

#[derive(Clone, Debug)]
pub struct Atom {
    pub label: String,
    pub symbol: String,
    pub number: u8,
    /// Cartesian coordinates in bohr.
    pub xyz: [f64; 3],
}

impl Atom {
    pub fn new(label: &str, symbol: &str, xyz: [f64; 3]) -> Result<Self> {
        let number: u8 = atomic_number(symbol)
            .with_context(|| format!("Unknown element symbol {}", symbol))?;
        Ok(Self {
            label: String::from(label),
            symbol: String::from(symbol),
            number,
            xyz,
        })
    }

    pub fn distance(&self, other: &Atom) -> f64 {
        self.xyz
            .iter()
            .zip(other.xyz.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

#[derive(Clone, Debug)]
pub struct Molecule {
    pub name: String,
    pub atoms: Vec<Atom>,
    pub charge: i8,
}

impl Molecule {
    pub fn new(name: &str, atoms: Vec<Atom>) -> Self {
        Self {
            name: String::from(name),
            atoms,
            charge: 0,
        }
    }

    pub fn n_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn n_electrons(&self) -> usize {
        let z: i64 = self.atoms.iter().map(|atom| atom.number as i64).sum();
        (z - self.charge as i64) as usize
    }

    /// Nucleus-nucleus repulsion energy in Hartree.
    pub fn nuclear_repulsion_energy(&self) -> f64 {
        let mut e_nuc: f64 = 0.0;
        for (i, atomi) in self.atoms.iter().enumerate() {
            for atomj in self.atoms[..i].iter() {
                e_nuc += (atomi.number as f64) * (atomj.number as f64) / atomi.distance(atomj);
            }
        }
        e_nuc
    }
}

impl fmt::Display for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Molecule: {} ({} atoms)", self.name, self.atoms.len())?;
        for atom in self.atoms.iter() {
            writeln!(
                f,
                "{: <6} {: >3} {:>18.12} {:>18.12} {:>18.12}",
                atom.label, atom.symbol, atom.xyz[0], atom.xyz[1], atom.xyz[2]
            )?;
        }
        Ok(())
    }
}
