use crate::basis::Shell;
use crate::integrals::hermite::{HermiteCoefficients, HermiteIntegrals};
use crate::integrals::{IntegralEngine, Operator};
use std::f64::consts::PI;

/// Gaussian overlap distribution of two primitives together with its Hermite expansion.
struct PrimitivePair {
    exponent: f64,
    center: [f64; 3],
    coefficient: f64,
    expansion: [HermiteCoefficients; 3],
}

fn primitive_pairs(a: &Shell, b: &Shell) -> Vec<PrimitivePair> {
    let la: usize = a.angular_momentum;
    let lb: usize = b.angular_momentum;
    let mut pairs: Vec<PrimitivePair> = Vec::with_capacity(a.n_primitives() * b.n_primitives());
    for (alpha, ca) in a.exponents.iter().zip(a.coefficients.iter()) {
        for (beta, cb) in b.exponents.iter().zip(b.coefficients.iter()) {
            let p: f64 = alpha + beta;
            let center: [f64; 3] = [
                (alpha * a.center[0] + beta * b.center[0]) / p,
                (alpha * a.center[1] + beta * b.center[1]) / p,
                (alpha * a.center[2] + beta * b.center[2]) / p,
            ];
            let expansion: [HermiteCoefficients; 3] = [
                HermiteCoefficients::new(la, lb, *alpha, *beta, a.center[0] - b.center[0]),
                HermiteCoefficients::new(la, lb, *alpha, *beta, a.center[1] - b.center[1]),
                HermiteCoefficients::new(la, lb, *alpha, *beta, a.center[2] - b.center[2]),
            ];
            pairs.push(PrimitivePair {
                exponent: p,
                center,
                coefficient: ca * cb,
                expansion,
            });
        }
    }
    pairs
}

/// Nonzero terms E_t E_u E_v of the Hermite expansion of one pair of Cartesian components.
fn hermite_terms(
    pair: &PrimitivePair,
    ca: &[usize; 3],
    cb: &[usize; 3],
    sign: bool,
) -> Vec<([usize; 3], f64)> {
    let mut terms: Vec<([usize; 3], f64)> = Vec::new();
    for t in 0..=(ca[0] + cb[0]) {
        let ex: f64 = pair.expansion[0].get(ca[0], cb[0], t);
        if ex == 0.0 {
            continue;
        }
        for u in 0..=(ca[1] + cb[1]) {
            let ey: f64 = pair.expansion[1].get(ca[1], cb[1], u);
            if ey == 0.0 {
                continue;
            }
            for v in 0..=(ca[2] + cb[2]) {
                let ez: f64 = pair.expansion[2].get(ca[2], cb[2], v);
                if ez == 0.0 {
                    continue;
                }
                let mut value: f64 = ex * ey * ez;
                if sign && (t + u + v) % 2 == 1 {
                    value = -value;
                }
                terms.push(([t, u, v], value));
            }
        }
    }
    terms
}

/// Reference implementation of the shell-block integral source based on the
/// McMurchie-Davidson scheme for contracted Cartesian Gaussians of arbitrary angular momentum.
#[derive(Clone, Copy, Debug, Default)]
pub struct McMurchieDavidson;

impl McMurchieDavidson {
    pub fn new() -> Self {
        McMurchieDavidson
    }
}

impl IntegralEngine for McMurchieDavidson {
    fn four_center(
        &self,
        a: &Shell,
        b: &Shell,
        c: &Shell,
        d: &Shell,
        operator: Operator,
        buffer: &mut [f64],
    ) {
        let comps_a = a.components();
        let comps_b = b.components();
        let comps_c = c.components();
        let comps_d = d.components();
        let size: usize = comps_a.len() * comps_b.len() * comps_c.len() * comps_d.len();
        debug_assert!(buffer.len() >= size, "integral buffer too small");
        buffer[..size].iter_mut().for_each(|x| *x = 0.0);

        let l_total: usize =
            a.angular_momentum + b.angular_momentum + c.angular_momentum + d.angular_momentum;
        let bra_pairs: Vec<PrimitivePair> = primitive_pairs(a, b);
        let ket_pairs: Vec<PrimitivePair> = primitive_pairs(c, d);

        // Hermite expansions of all ket component pairs, the sign (-1)^(t+u+v) is included
        let ket_terms_all: Vec<Vec<Vec<([usize; 3], f64)>>> = ket_pairs
            .iter()
            .map(|ket| {
                comps_c
                    .iter()
                    .flat_map(|cc| comps_d.iter().map(move |cd| (cc, cd)))
                    .map(|(cc, cd)| hermite_terms(ket, cc, cd, true))
                    .collect()
            })
            .collect();

        for bra in bra_pairs.iter() {
            let bra_terms: Vec<Vec<([usize; 3], f64)>> = comps_a
                .iter()
                .flat_map(|ca| comps_b.iter().map(move |cb| (ca, cb)))
                .map(|(ca, cb)| hermite_terms(bra, ca, cb, false))
                .collect();
            for (ket, ket_terms) in ket_pairs.iter().zip(ket_terms_all.iter()) {
                let p: f64 = bra.exponent;
                let q: f64 = ket.exponent;
                let alpha: f64 = p * q / (p + q);
                let (alpha_eff, attenuation): (f64, f64) = match operator {
                    Operator::Coulomb => (alpha, 1.0),
                    Operator::Attenuated { omega } => {
                        let w2: f64 = omega * omega;
                        (alpha * w2 / (alpha + w2), (w2 / (alpha + w2)).sqrt())
                    }
                };
                if attenuation == 0.0 {
                    continue;
                }
                let prefactor: f64 = 2.0 * PI.powf(2.5) / (p * q * (p + q).sqrt())
                    * attenuation
                    * bra.coefficient
                    * ket.coefficient;
                let pq: [f64; 3] = [
                    bra.center[0] - ket.center[0],
                    bra.center[1] - ket.center[1],
                    bra.center[2] - ket.center[2],
                ];
                let r: HermiteIntegrals = HermiteIntegrals::new(l_total, alpha_eff, pq);

                let mut index: usize = 0;
                for bt in bra_terms.iter() {
                    for kt in ket_terms.iter() {
                        let mut value: f64 = 0.0;
                        for (tuv, eb) in bt.iter() {
                            for (tau, ek) in kt.iter() {
                                value += eb
                                    * ek
                                    * r.get(tuv[0] + tau[0], tuv[1] + tau[1], tuv[2] + tau[2]);
                            }
                        }
                        buffer[index] += prefactor * value;
                        index += 1;
                    }
                }
            }
        }
    }
}

/// Overlap, kinetic and nuclear attraction blocks of two shells, used to assemble the
/// one-electron matrices.
pub(crate) fn one_electron_block(
    a: &Shell,
    b: &Shell,
    charges: &[(f64, [f64; 3])],
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let comps_a = a.components();
    let comps_b = b.components();
    let size: usize = comps_a.len() * comps_b.len();
    let mut s: Vec<f64> = vec![0.0; size];
    let mut t: Vec<f64> = vec![0.0; size];
    let mut v: Vec<f64> = vec![0.0; size];
    let la: usize = a.angular_momentum;
    let lb: usize = b.angular_momentum;

    for (alpha, ca) in a.exponents.iter().zip(a.coefficients.iter()) {
        for (beta, cb) in b.exponents.iter().zip(b.coefficients.iter()) {
            let p: f64 = alpha + beta;
            let coefficient: f64 = ca * cb;
            let center: [f64; 3] = [
                (alpha * a.center[0] + beta * b.center[0]) / p,
                (alpha * a.center[1] + beta * b.center[1]) / p,
                (alpha * a.center[2] + beta * b.center[2]) / p,
            ];
            // j + 2 is needed for the kinetic energy
            let e: Vec<HermiteCoefficients> = (0..3)
                .map(|k| HermiteCoefficients::new(la, lb + 2, *alpha, *beta, a.center[k] - b.center[k]))
                .collect();
            let sqrt_pi_p: f64 = (PI / p).sqrt();
            let overlap_1d = |k: usize, i: usize, j: i64| -> f64 {
                if j < 0 {
                    0.0
                } else {
                    e[k].get(i, j as usize, 0) * sqrt_pi_p
                }
            };
            let kinetic_1d = |k: usize, i: usize, j: usize| -> f64 {
                let jj: i64 = j as i64;
                beta * (2 * j + 1) as f64 * overlap_1d(k, i, jj)
                    - 2.0 * beta * beta * overlap_1d(k, i, jj + 2)
                    - 0.5 * (j * j.saturating_sub(1)) as f64 * overlap_1d(k, i, jj - 2)
            };
            let potentials: Vec<(f64, HermiteIntegrals)> = charges
                .iter()
                .map(|(z, xyz)| {
                    let pc: [f64; 3] = [center[0] - xyz[0], center[1] - xyz[1], center[2] - xyz[2]];
                    (*z, HermiteIntegrals::new(la + lb, p, pc))
                })
                .collect();

            let mut index: usize = 0;
            for ia in comps_a.iter() {
                for ib in comps_b.iter() {
                    let sx: f64 = overlap_1d(0, ia[0], ib[0] as i64);
                    let sy: f64 = overlap_1d(1, ia[1], ib[1] as i64);
                    let sz: f64 = overlap_1d(2, ia[2], ib[2] as i64);
                    s[index] += coefficient * sx * sy * sz;
                    t[index] += coefficient
                        * (kinetic_1d(0, ia[0], ib[0]) * sy * sz
                            + sx * kinetic_1d(1, ia[1], ib[1]) * sz
                            + sx * sy * kinetic_1d(2, ia[2], ib[2]));

                    let mut potential: f64 = 0.0;
                    for (z, r) in potentials.iter() {
                        let mut value: f64 = 0.0;
                        for tt in 0..=(ia[0] + ib[0]) {
                            for uu in 0..=(ia[1] + ib[1]) {
                                for vv in 0..=(ia[2] + ib[2]) {
                                    value += e[0].get(ia[0], ib[0], tt)
                                        * e[1].get(ia[1], ib[1], uu)
                                        * e[2].get(ia[2], ib[2], vv)
                                        * r.get(tt, uu, vv);
                                }
                            }
                        }
                        potential -= z * value;
                    }
                    v[index] += coefficient * 2.0 * PI / p * potential;
                    index += 1;
                }
            }
        }
    }
    (s, t, v)
}
