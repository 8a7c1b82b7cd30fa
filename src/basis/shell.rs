use std::f64::consts::PI;

/// Double factorial (2n-1)!! with the convention (-1)!! = 1.
pub fn odd_double_factorial(n: usize) -> f64 {
    (1..=n).fold(1.0, |acc, k| acc * (2 * k - 1) as f64)
}

/// Cartesian exponents (lx, ly, lz) of a shell with angular momentum `l`, in the order
/// xx..x first, zz..z last.
pub fn cartesian_components(l: usize) -> Vec<[usize; 3]> {
    let mut components: Vec<[usize; 3]> = Vec::with_capacity((l + 1) * (l + 2) / 2);
    for i in 0..=l {
        let lx: usize = l - i;
        for lz in 0..=i {
            let ly: usize = i - lz;
            components.push([lx, ly, lz]);
        }
    }
    components
}

/// A contracted Cartesian Gaussian shell.
///
/// The stored coefficients already contain the primitive normalization and are scaled
/// such that the (l,0,0) component of the shell has unit norm.
#[derive(Clone, Debug)]
pub struct Shell {
    pub center: [f64; 3],
    pub angular_momentum: usize,
    pub exponents: Vec<f64>,
    pub coefficients: Vec<f64>,
    pub atom_index: usize,
    /// Index of the first basis function of this shell, set by the [BasisSet](super::BasisSet).
    pub function_index: usize,
}

impl Shell {
    pub fn new(
        atom_index: usize,
        center: [f64; 3],
        angular_momentum: usize,
        exponents: &[f64],
        contraction: &[f64],
    ) -> Self {
        assert_eq!(
            exponents.len(),
            contraction.len(),
            "every primitive needs exactly one contraction coefficient"
        );
        let l: usize = angular_momentum;
        let dfact: f64 = odd_double_factorial(l);
        // primitive normalization of the (l,0,0) component
        let mut coefficients: Vec<f64> = exponents
            .iter()
            .zip(contraction.iter())
            .map(|(alpha, c)| {
                c * (2.0 * alpha / PI).powf(0.75) * (4.0 * alpha).powf(l as f64 / 2.0)
                    / dfact.sqrt()
            })
            .collect();

        // normalization of the contraction
        let mut norm: f64 = 0.0;
        for (ai, ci) in exponents.iter().zip(coefficients.iter()) {
            for (aj, cj) in exponents.iter().zip(coefficients.iter()) {
                let p: f64 = ai + aj;
                norm += ci * cj * (PI / p).powf(1.5) * dfact / (2.0 * p).powi(l as i32);
            }
        }
        let scale: f64 = 1.0 / norm.sqrt();
        coefficients.iter_mut().for_each(|c| *c *= scale);

        Self {
            center,
            angular_momentum,
            exponents: exponents.to_vec(),
            coefficients,
            atom_index,
            function_index: 0,
        }
    }

    /// An s-function with exponent zero and unit coefficient. It is used to express two- and
    /// three-center integrals through the four-center machinery.
    pub(crate) fn unit(center: [f64; 3]) -> Self {
        Self {
            center,
            angular_momentum: 0,
            exponents: vec![0.0],
            coefficients: vec![1.0],
            atom_index: 0,
            function_index: 0,
        }
    }

    pub fn n_functions(&self) -> usize {
        (self.angular_momentum + 1) * (self.angular_momentum + 2) / 2
    }

    pub fn n_primitives(&self) -> usize {
        self.exponents.len()
    }

    pub fn components(&self) -> Vec<[usize; 3]> {
        cartesian_components(self.angular_momentum)
    }
}

/// Read-only catalog of shells that defines the function index space of a basis.
#[derive(Clone, Debug)]
pub struct BasisSet {
    pub name: String,
    shells: Vec<Shell>,
    n_functions: usize,
}

impl BasisSet {
    pub fn new(name: &str, mut shells: Vec<Shell>) -> Self {
        let mut offset: usize = 0;
        for shell in shells.iter_mut() {
            shell.function_index = offset;
            offset += shell.n_functions();
        }
        Self {
            name: String::from(name),
            shells,
            n_functions: offset,
        }
    }

    pub fn nshell(&self) -> usize {
        self.shells.len()
    }

    pub fn nfunction(&self) -> usize {
        self.n_functions
    }

    pub fn shell(&self, index: usize) -> &Shell {
        &self.shells[index]
    }

    pub fn shells(&self) -> &[Shell] {
        &self.shells
    }

    pub fn function_offset(&self, shell: usize) -> usize {
        self.shells[shell].function_index
    }

    pub fn function_count(&self, shell: usize) -> usize {
        self.shells[shell].n_functions()
    }

    pub fn max_shell_functions(&self) -> usize {
        self.shells
            .iter()
            .map(|shell| shell.n_functions())
            .max()
            .unwrap_or(0)
    }

    pub fn max_angular_momentum(&self) -> usize {
        self.shells
            .iter()
            .map(|shell| shell.angular_momentum)
            .max()
            .unwrap_or(0)
    }

    /// Builds a new basis set with the shells in the given order.
    pub fn reordered(&self, order: &[usize]) -> Self {
        let shells: Vec<Shell> = order.iter().map(|idx| self.shells[*idx].clone()).collect();
        Self::new(&self.name, shells)
    }

    /// Maps every basis function of `self` to its position in `other`, where `other` was
    /// created by [reordered](BasisSet::reordered) with `order`.
    pub fn function_permutation(&self, order: &[usize]) -> Vec<usize> {
        let other: BasisSet = self.reordered(order);
        let mut permutation: Vec<usize> = vec![0; self.n_functions];
        for (new_idx, old_idx) in order.iter().enumerate() {
            let n: usize = self.function_count(*old_idx);
            for f in 0..n {
                permutation[self.function_offset(*old_idx) + f] = other.function_offset(new_idx) + f;
            }
        }
        permutation
    }
}
