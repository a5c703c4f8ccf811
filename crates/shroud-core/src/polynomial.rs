//! Polynomials over a prime field and Lagrange interpolation

use std::collections::BTreeSet;

use num_bigint::BigUint;
use num_traits::Zero;
use rand::{CryptoRng, RngCore};

use crate::error::{Error, Result};
use crate::field::Field;

/// A polynomial with coefficients in ascending degree order
///
/// `coefficients[0]` is the constant term, which is the shared secret when
/// the polynomial backs a sharing.
#[derive(Clone, PartialEq, Eq)]
pub struct Polynomial {
    field: Field,
    coefficients: Vec<BigUint>,
}

impl std::fmt::Debug for Polynomial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Polynomial")
            .field("degree", &self.degree())
            .field("coefficients", &"[REDACTED]")
            .finish()
    }
}

impl Polynomial {
    pub fn new(field: Field, coefficients: Vec<BigUint>) -> Result<Self> {
        if coefficients.is_empty() {
            return Err(Error::InvalidParameters(
                "polynomial needs at least one coefficient".into(),
            ));
        }
        let coefficients = coefficients.iter().map(|c| field.reduce(c)).collect();
        Ok(Self {
            field,
            coefficients,
        })
    }

    /// Random polynomial of `degree` with the given constant term
    pub fn random<R: RngCore + CryptoRng + ?Sized>(
        field: &Field,
        degree: usize,
        constant: &BigUint,
        rng: &mut R,
    ) -> Self {
        let mut coefficients = Vec::with_capacity(degree + 1);
        coefficients.push(field.reduce(constant));
        for _ in 0..degree {
            coefficients.push(field.random(rng));
        }
        Self {
            field: field.clone(),
            coefficients,
        }
    }

    /// Random polynomial of `degree` that evaluates to zero at `root`
    ///
    /// The non-constant coefficients are uniform; the constant term is then
    /// fixed so that `p(root) = 0`. With `root = 0` this is a refresh
    /// polynomial with a zero constant term.
    pub fn random_with_root<R: RngCore + CryptoRng + ?Sized>(
        field: &Field,
        degree: usize,
        root: &BigUint,
        rng: &mut R,
    ) -> Self {
        let mut poly = Self::random(field, degree, &BigUint::zero(), rng);
        let value = poly.evaluate(root);
        poly.coefficients[0] = field.neg(&value);
        poly
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    pub fn coefficients(&self) -> &[BigUint] {
        &self.coefficients
    }

    pub fn constant_term(&self) -> &BigUint {
        &self.coefficients[0]
    }

    /// Horner evaluation at `x`
    pub fn evaluate(&self, x: &BigUint) -> BigUint {
        let x = self.field.reduce(x);
        self.coefficients
            .iter()
            .rev()
            .fold(BigUint::zero(), |acc, c| {
                self.field.add(&self.field.mul(&acc, &x), c)
            })
    }

    /// Coefficient-wise sum; both operands must share the field
    pub fn add(&self, other: &Polynomial) -> Result<Polynomial> {
        if self.field != other.field {
            return Err(Error::InvalidParameters(
                "cannot add polynomials over different fields".into(),
            ));
        }
        let len = self.coefficients.len().max(other.coefficients.len());
        let zero = BigUint::zero();
        let coefficients = (0..len)
            .map(|i| {
                let a = self.coefficients.get(i).unwrap_or(&zero);
                let b = other.coefficients.get(i).unwrap_or(&zero);
                self.field.add(a, b)
            })
            .collect();
        Ok(Polynomial {
            field: self.field.clone(),
            coefficients,
        })
    }
}

/// Evaluate at `at` the unique polynomial through `points`
///
/// `points` are `(x, y)` pairs with pairwise distinct `x`. Interpolating
/// `t + 1` points of a degree-`t` polynomial at zero recovers its constant
/// term.
pub fn interpolate_at(field: &Field, points: &[(BigUint, BigUint)], at: &BigUint) -> Result<BigUint> {
    if points.is_empty() {
        return Err(Error::NotEnoughShares { needed: 1, got: 0 });
    }

    let mut seen = BTreeSet::new();
    for (x, _) in points {
        let x = field.reduce(x);
        if !seen.insert(x.clone()) {
            let id = x.to_u32_digits().first().copied().unwrap_or(0);
            return Err(Error::DuplicateShareholder(id));
        }
    }

    let at = field.reduce(at);
    let mut result = BigUint::zero();
    for (i, (xi, yi)) in points.iter().enumerate() {
        let mut numerator = field.one();
        let mut denominator = field.one();
        for (j, (xj, _)) in points.iter().enumerate() {
            if i == j {
                continue;
            }
            numerator = field.mul(&numerator, &field.sub(&at, xj));
            denominator = field.mul(&denominator, &field.sub(xi, xj));
        }
        let basis = field.mul(&numerator, &field.inverse(&denominator)?);
        result = field.add(&result, &field.mul(&basis, yi));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    fn field() -> Field {
        Field::new(BigUint::from(7919u32)).unwrap()
    }

    #[test]
    fn test_evaluate_matches_definition() {
        let f = field();
        let p = Polynomial::new(f.clone(), vec![3u32.into(), 2u32.into(), 1u32.into()]).unwrap();
        // 3 + 2x + x^2 at x = 5
        assert_eq!(p.evaluate(&BigUint::from(5u32)), BigUint::from(38u32));
        assert_eq!(p.degree(), 2);
    }

    #[test]
    fn test_random_with_root_vanishes() {
        let f = field();
        let mut rng = thread_rng();
        let root = BigUint::from(4u32);
        let p = Polynomial::random_with_root(&f, 3, &root, &mut rng);
        assert!(p.evaluate(&root).is_zero());

        let z = Polynomial::random_with_root(&f, 2, &BigUint::zero(), &mut rng);
        assert!(z.constant_term().is_zero());
    }

    #[test]
    fn test_interpolation_recovers_constant() {
        let f = field();
        let mut rng = thread_rng();
        let secret = BigUint::from(1234u32);
        let p = Polynomial::random(&f, 2, &secret, &mut rng);
        let points: Vec<_> = (1u32..=3)
            .map(|x| (BigUint::from(x), p.evaluate(&BigUint::from(x))))
            .collect();
        assert_eq!(interpolate_at(&f, &points, &BigUint::zero()).unwrap(), secret);

        let x = BigUint::from(9u32);
        assert_eq!(interpolate_at(&f, &points, &x).unwrap(), p.evaluate(&x));
    }

    #[test]
    fn test_interpolation_rejects_duplicates() {
        let f = field();
        let points = vec![
            (BigUint::from(1u32), BigUint::from(5u32)),
            (BigUint::from(1u32), BigUint::from(6u32)),
        ];
        assert_eq!(
            interpolate_at(&f, &points, &BigUint::zero()),
            Err(Error::DuplicateShareholder(1))
        );
    }

    #[test]
    fn test_sum_adds_evaluations() {
        let f = field();
        let mut rng = thread_rng();
        let a = Polynomial::random(&f, 2, &BigUint::from(10u32), &mut rng);
        let b = Polynomial::random(&f, 2, &BigUint::from(20u32), &mut rng);
        let sum = a.add(&b).unwrap();
        let x = BigUint::from(17u32);
        assert_eq!(sum.evaluate(&x), f.add(&a.evaluate(&x), &b.evaluate(&x)));
        assert_eq!(sum.constant_term(), &BigUint::from(30u32));
    }
}
