use crate::basis::BasisSet;
use crate::integrals::{IntegralEngine, Operator};
use ndarray::prelude::*;
use std::sync::Arc;

/// Shell pair upper bounds sqrt(max |(pq|pq)|) of the electron repulsion integrals. By the
/// Cauchy-Schwarz inequality |(pq|rs)| <= bound(P,Q) * bound(R,S) for all functions p in P,
/// q in Q, r in R and s in S.
#[derive(Clone, Debug)]
pub struct SchwarzSieve {
    basis: Arc<BasisSet>,
    bounds: Array2<f64>,
    max_bound: f64,
}

impl SchwarzSieve {
    /// Computes the diagonal (PQ|PQ) blocks for all shell pairs.
    pub fn from_integrals(basis: Arc<BasisSet>, engine: &dyn IntegralEngine) -> Self {
        let nshell: usize = basis.nshell();
        let mut bounds: Array2<f64> = Array2::zeros([nshell, nshell]);
        let mut buffer: Vec<f64> = vec![0.0; basis.max_shell_functions().pow(4)];
        for p in 0..nshell {
            for q in 0..=p {
                let (sp, sq) = (basis.shell(p), basis.shell(q));
                engine.four_center(sp, sq, sp, sq, Operator::Coulomb, &mut buffer);
                let (np, nq) = (sp.n_functions(), sq.n_functions());
                let npq: usize = np * nq;
                // diagonal elements (pq|pq) of the npq x npq block
                let max_value: f64 = (0..npq)
                    .map(|pq| buffer[pq * npq + pq].abs())
                    .fold(0.0, f64::max);
                bounds[[p, q]] = max_value.sqrt();
                bounds[[q, p]] = bounds[[p, q]];
            }
        }
        Self::from_bounds(basis, bounds)
    }

    /// Takes a precomputed, symmetric nshell x nshell table.
    pub fn from_bounds(basis: Arc<BasisSet>, bounds: Array2<f64>) -> Self {
        assert_eq!(
            bounds.dim(),
            (basis.nshell(), basis.nshell()),
            "the bound table has to cover all shell pairs"
        );
        let max_bound: f64 = bounds.iter().cloned().fold(0.0, f64::max);
        Self {
            basis,
            bounds,
            max_bound,
        }
    }

    pub fn basis(&self) -> &Arc<BasisSet> {
        &self.basis
    }

    pub fn bound(&self, p: usize, q: usize) -> f64 {
        self.bounds[[p, q]]
    }

    pub fn bounds(&self) -> ArrayView2<f64> {
        self.bounds.view()
    }

    pub fn max_bound(&self) -> f64 {
        self.max_bound
    }

    /// Shell pairs (P, Q) with P >= Q that can contribute an integral of at least `cutoff`.
    pub fn significant_pairs(&self, cutoff: f64) -> Vec<(usize, usize)> {
        let mut pairs: Vec<(usize, usize)> = Vec::new();
        for p in 0..self.basis.nshell() {
            for q in 0..=p {
                if self.bounds[[p, q]] * self.max_bound >= cutoff {
                    pairs.push((p, q));
                }
            }
        }
        pairs
    }

    /// Whether the quartet (PQ|RS) can be skipped.
    pub fn negligible(&self, p: usize, q: usize, r: usize, s: usize, cutoff: f64) -> bool {
        self.bounds[[p, q]] * self.bounds[[r, s]] < cutoff
    }
}
