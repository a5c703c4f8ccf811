//! Arithmetic modulo a prime

use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};

use crate::error::{Error, Result};

/// The integers modulo a prime `p`
///
/// Elements are plain [`BigUint`] values; every operation returns a value
/// reduced into `[0, p)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    modulus: BigUint,
}

impl Field {
    /// Create a field over `modulus`, which must be an odd prime
    ///
    /// Primality itself is the caller's responsibility; only the cheap
    /// structural checks happen here.
    pub fn new(modulus: BigUint) -> Result<Self> {
        if modulus < BigUint::from(3u8) || !modulus.bit(0) {
            return Err(Error::InvalidParameters(format!(
                "field modulus must be an odd prime, got {modulus:x}"
            )));
        }
        Ok(Self { modulus })
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// Bit length of the modulus
    pub fn bits(&self) -> u64 {
        self.modulus.bits()
    }

    /// Bytes needed to hold any element
    pub fn byte_len(&self) -> usize {
        self.bits().div_ceil(8) as usize
    }

    pub fn contains(&self, value: &BigUint) -> bool {
        value < &self.modulus
    }

    pub fn reduce(&self, value: &BigUint) -> BigUint {
        value % &self.modulus
    }

    pub fn add(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a + b) % &self.modulus
    }

    pub fn sub(&self, a: &BigUint, b: &BigUint) -> BigUint {
        let a = self.reduce(a);
        let b = self.reduce(b);
        if a >= b {
            a - b
        } else {
            &self.modulus - b + a
        }
    }

    pub fn mul(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a * b) % &self.modulus
    }

    pub fn neg(&self, a: &BigUint) -> BigUint {
        let a = self.reduce(a);
        if a.is_zero() {
            a
        } else {
            &self.modulus - a
        }
    }

    pub fn pow(&self, base: &BigUint, exponent: &BigUint) -> BigUint {
        base.modpow(exponent, &self.modulus)
    }

    /// Multiplicative inverse by Fermat's little theorem
    pub fn inverse(&self, a: &BigUint) -> Result<BigUint> {
        let a = self.reduce(a);
        if a.is_zero() {
            return Err(Error::InvalidParameters("zero has no inverse".into()));
        }
        let exponent = &self.modulus - BigUint::from(2u8);
        Ok(a.modpow(&exponent, &self.modulus))
    }

    pub fn zero(&self) -> BigUint {
        BigUint::zero()
    }

    pub fn one(&self) -> BigUint {
        BigUint::one()
    }

    /// Uniformly random element
    pub fn random<R: RngCore + CryptoRng + ?Sized>(&self, rng: &mut R) -> BigUint {
        rng.gen_biguint_below(&self.modulus)
    }

    /// Uniformly random non-zero element
    pub fn random_nonzero<R: RngCore + CryptoRng + ?Sized>(&self, rng: &mut R) -> BigUint {
        rng.gen_biguint_range(&BigUint::one(), &self.modulus)
    }

    /// Square root for `p ≡ 3 (mod 4)`, `None` for non-residues
    pub fn sqrt(&self, a: &BigUint) -> Option<BigUint> {
        let four = BigUint::from(4u8);
        if &self.modulus % &four != BigUint::from(3u8) {
            return None;
        }
        let exponent = (&self.modulus + BigUint::one()) / four;
        let root = self.pow(a, &exponent);
        (self.mul(&root, &root) == self.reduce(a)).then_some(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    fn small() -> Field {
        Field::new(BigUint::from(101u32)).unwrap()
    }

    #[test]
    fn test_rejects_even_and_tiny_moduli() {
        assert!(Field::new(BigUint::from(2u8)).is_err());
        assert!(Field::new(BigUint::from(100u32)).is_err());
    }

    #[test]
    fn test_basic_arithmetic() {
        let f = small();
        let a = BigUint::from(70u32);
        let b = BigUint::from(50u32);
        assert_eq!(f.add(&a, &b), BigUint::from(19u32));
        assert_eq!(f.sub(&b, &a), BigUint::from(81u32));
        assert_eq!(f.mul(&a, &b), BigUint::from(3500u32 % 101));
        assert_eq!(f.add(&a, &f.neg(&a)), BigUint::zero());
        assert!(f.neg(&BigUint::zero()).is_zero());
    }

    #[test]
    fn test_inverse() {
        let f = small();
        for v in 1u32..101 {
            let v = BigUint::from(v);
            let inv = f.inverse(&v).unwrap();
            assert_eq!(f.mul(&v, &inv), BigUint::one());
        }
        assert!(f.inverse(&BigUint::zero()).is_err());
    }

    #[test]
    fn test_sqrt() {
        let f = Field::new(BigUint::from(103u32)).unwrap();
        let nine = BigUint::from(9u8);
        let root = f.sqrt(&nine).unwrap();
        assert_eq!(f.mul(&root, &root), nine);
    }

    #[test]
    fn test_random_in_range() {
        let f = small();
        let mut rng = thread_rng();
        for _ in 0..100 {
            assert!(f.contains(&f.random(&mut rng)));
            assert!(!f.random_nonzero(&mut rng).is_zero());
        }
    }
}
