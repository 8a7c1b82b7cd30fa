use crate::integrals::boys::boys_function;

/// Hermite expansion coefficients E^(ij)_t of the product of two one-dimensional
/// Cartesian Gaussians x_A^i exp(-a x_A^2) * x_B^j exp(-b x_B^2), see Helgaker, Jorgensen,
/// Olsen, Molecular Electronic-Structure Theory, chapter 9.5.
#[derive(Clone, Debug)]
pub struct HermiteCoefficients {
    j_dim: usize,
    t_dim: usize,
    data: Vec<f64>,
}

impl HermiteCoefficients {
    /// `xab` is the distance A - B along the Cartesian direction.
    pub fn new(i_max: usize, j_max: usize, a: f64, b: f64, xab: f64) -> Self {
        let p: f64 = a + b;
        let mu: f64 = a * b / p;
        let xpa: f64 = -b / p * xab;
        let xpb: f64 = a / p * xab;
        let one_over_2p: f64 = 0.5 / p;

        let j_dim: usize = j_max + 1;
        // one additional t slot so that E_(t+1) can always be read
        let t_dim: usize = i_max + j_max + 2;
        let mut data: Vec<f64> = vec![0.0; (i_max + 1) * j_dim * t_dim];
        let idx = |i: usize, j: usize, t: usize| (i * j_dim + j) * t_dim + t;

        data[idx(0, 0, 0)] = (-mu * xab * xab).exp();
        for i in 0..i_max {
            for t in 0..=(i + 1) {
                let mut value: f64 = xpa * data[idx(i, 0, t)] + (t + 1) as f64 * data[idx(i, 0, t + 1)];
                if t > 0 {
                    value += one_over_2p * data[idx(i, 0, t - 1)];
                }
                data[idx(i + 1, 0, t)] = value;
            }
        }
        for i in 0..=i_max {
            for j in 0..j_max {
                for t in 0..=(i + j + 1) {
                    let mut value: f64 =
                        xpb * data[idx(i, j, t)] + (t + 1) as f64 * data[idx(i, j, t + 1)];
                    if t > 0 {
                        value += one_over_2p * data[idx(i, j, t - 1)];
                    }
                    data[idx(i, j + 1, t)] = value;
                }
            }
        }
        Self { j_dim, t_dim, data }
    }

    pub fn get(&self, i: usize, j: usize, t: usize) -> f64 {
        if t > i + j {
            0.0
        } else {
            self.data[(i * self.j_dim + j) * self.t_dim + t]
        }
    }
}

/// Hermite Coulomb integrals R^0_(tuv) for t + u + v <= `l_total`.
///
/// R^n_(000) = (-2 alpha)^n F_n(alpha |PC|^2) and the higher ones follow from
/// R^n_(t+1,u,v) = t R^(n+1)_(t-1,u,v) + X_PC R^(n+1)_(t,u,v) (analogous for u and v).
#[derive(Clone, Debug)]
pub struct HermiteIntegrals {
    dim: usize,
    data: Vec<f64>,
}

impl HermiteIntegrals {
    pub fn new(l_total: usize, alpha: f64, pc: [f64; 3]) -> Self {
        let dim: usize = l_total + 1;
        let idx = |t: usize, u: usize, v: usize| (t * dim + u) * dim + v;
        let r2: f64 = pc[0] * pc[0] + pc[1] * pc[1] + pc[2] * pc[2];
        let boys: Vec<f64> = boys_function(l_total, alpha * r2);

        let mut previous: Vec<f64> = vec![0.0; dim * dim * dim];
        previous[0] = (-2.0 * alpha).powi(l_total as i32) * boys[l_total];
        for n in (0..l_total).rev() {
            let mut current: Vec<f64> = vec![0.0; dim * dim * dim];
            current[0] = (-2.0 * alpha).powi(n as i32) * boys[n];
            let order: usize = l_total - n;
            for t in 0..=order {
                for u in 0..=(order - t) {
                    for v in 0..=(order - t - u) {
                        if t + u + v == 0 {
                            continue;
                        }
                        let value: f64 = if t > 0 {
                            let mut val: f64 = pc[0] * previous[idx(t - 1, u, v)];
                            if t > 1 {
                                val += (t - 1) as f64 * previous[idx(t - 2, u, v)];
                            }
                            val
                        } else if u > 0 {
                            let mut val: f64 = pc[1] * previous[idx(t, u - 1, v)];
                            if u > 1 {
                                val += (u - 1) as f64 * previous[idx(t, u - 2, v)];
                            }
                            val
                        } else {
                            let mut val: f64 = pc[2] * previous[idx(t, u, v - 1)];
                            if v > 1 {
                                val += (v - 1) as f64 * previous[idx(t, u, v - 2)];
                            }
                            val
                        };
                        current[idx(t, u, v)] = value;
                    }
                }
            }
            previous = current;
        }
        Self {
            dim,
            data: previous,
        }
    }

    pub fn get(&self, t: usize, u: usize, v: usize) -> f64 {
        self.data[(t * self.dim + u) * self.dim + v]
    }
}
