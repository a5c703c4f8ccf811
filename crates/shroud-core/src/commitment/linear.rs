use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use super::{CommitmentFamily, CommitmentKind};
use crate::curve::hex_biguint;
use crate::error::{Error, Result};
use crate::field::Field;
use crate::polynomial::Polynomial;
use crate::share::{Share, Shareholder};
use crate::wire::{WireReader, WireWriter};

/// RFC 3526 group 14 (2048-bit MODP) prime
pub const RFC3526_2048_PRIME: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74",
    "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437",
    "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05",
    "98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB",
    "9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
    "3995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF",
);

/// 256-bit safe prime; generator 9 has order `(p - 1) / 2`
const INSECURE_256_PRIME: &str = "e27f4c79fc5aac128490e9d83bb72f987d141ca9eab8e647db3d169553cf3407";

/// Group parameters `(p, q, g)` in serializable form
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearGroup {
    #[serde(with = "hex_biguint")]
    pub prime: BigUint,
    #[serde(with = "hex_biguint")]
    pub order: BigUint,
    #[serde(with = "hex_biguint")]
    pub generator: BigUint,
}

impl LinearGroup {
    /// The safe-prime group `p = 2q + 1` with generator `g` of order `q`
    pub fn from_safe_prime(prime_hex: &str, generator: u32) -> Self {
        let prime = BigUint::parse_bytes(prime_hex.as_bytes(), 16).unwrap_or_default();
        let order = if prime.is_zero() {
            BigUint::zero()
        } else {
            (&prime - BigUint::one()) >> 1
        };
        Self {
            prime,
            order,
            generator: BigUint::from(generator),
        }
    }

    pub fn rfc3526_2048() -> Self {
        Self::from_safe_prime(RFC3526_2048_PRIME, 2)
    }

    /// A 256-bit group: quick, and far too small for production
    pub fn insecure_256() -> Self {
        Self::from_safe_prime(INSECURE_256_PRIME, 9)
    }
}

impl Default for LinearGroup {
    fn default() -> Self {
        Self::rfc3526_2048()
    }
}

/// Feldman commitments in the order-`q` subgroup of `Z_p^*`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinearScheme {
    group: Field,
    scalars: Field,
    generator: BigUint,
}

impl LinearScheme {
    /// Validate `(p, q, g)`: `q | p - 1`, `g ≠ 1` and `g^q = 1 mod p`
    pub fn new(params: &LinearGroup) -> Result<Self> {
        let group = Field::new(params.prime.clone())?;
        let scalars = Field::new(params.order.clone())?;
        let p_minus_one = &params.prime - BigUint::one();
        if !p_minus_one.is_multiple_of(&params.order) {
            return Err(Error::InvalidParameters(
                "subgroup order does not divide p - 1".into(),
            ));
        }
        let g = group.reduce(&params.generator);
        if g.is_zero() || g.is_one() || !group.pow(&g, &params.order).is_one() {
            return Err(Error::InvalidParameters(
                "generator does not have the subgroup order".into(),
            ));
        }
        Ok(Self {
            group,
            scalars,
            generator: g,
        })
    }

    pub fn rfc3526_2048() -> Self {
        Self::new(&LinearGroup::rfc3526_2048()).expect("RFC 3526 group is valid")
    }

    pub fn insecure_256() -> Self {
        Self::new(&LinearGroup::insecure_256()).expect("built-in group is valid")
    }

    pub fn prime(&self) -> &BigUint {
        self.group.modulus()
    }

    pub fn generator(&self) -> &BigUint {
        &self.generator
    }

    /// `Π C_j^{x^j} mod p`, by Horner's rule over the descending entries
    fn evaluate(&self, entries: &[BigUint], x: &BigUint) -> BigUint {
        entries.iter().fold(BigUint::one(), |acc, entry| {
            self.group.mul(&self.group.pow(&acc, x), entry)
        })
    }

    pub fn vanishes_at(&self, commitment: &LinearCommitment, x: &BigUint) -> bool {
        self.evaluate(&commitment.entries, x).is_one()
    }
}

impl CommitmentFamily for LinearScheme {
    type Commitment = LinearCommitment;

    fn kind(&self) -> CommitmentKind {
        CommitmentKind::Linear
    }

    fn field(&self) -> &Field {
        &self.scalars
    }

    fn generate<R: RngCore + CryptoRng + ?Sized>(
        &self,
        polynomial: &Polynomial,
        _shareholders: &[Shareholder],
        _rng: &mut R,
    ) -> Result<LinearCommitment> {
        if polynomial.field() != &self.scalars {
            return Err(Error::InvalidParameters(
                "polynomial is not over the subgroup order".into(),
            ));
        }
        let entries = polynomial
            .coefficients()
            .iter()
            .rev()
            .map(|a| self.group.pow(&self.generator, a))
            .collect();
        Ok(LinearCommitment { entries })
    }

    fn verify(&self, share: &Share, commitment: &LinearCommitment) -> bool {
        if commitment.entries.is_empty() || !self.scalars.contains(share.value()) {
            return false;
        }
        let lhs = self.group.pow(&self.generator, share.value());
        let rhs = self.evaluate(&commitment.entries, &share.shareholder().to_field_element());
        lhs == rhs
    }

    fn sum(&self, commitments: &[&LinearCommitment]) -> Result<LinearCommitment> {
        let (first, rest) = commitments
            .split_first()
            .ok_or_else(|| Error::IncompatibleCommitments("nothing to sum".into()))?;
        let mut entries = first.entries.clone();
        for other in rest {
            if other.entries.len() != entries.len() {
                return Err(Error::IncompatibleCommitments(format!(
                    "degree mismatch: {} vs {} entries",
                    entries.len(),
                    other.entries.len()
                )));
            }
            for (acc, entry) in entries.iter_mut().zip(&other.entries) {
                *acc = self.group.mul(acc, entry);
            }
        }
        Ok(LinearCommitment { entries })
    }
}

/// `g^{a_j} mod p` for `j = t, …, 0`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinearCommitment {
    entries: Vec<BigUint>,
}

impl LinearCommitment {
    pub fn new(entries: Vec<BigUint>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[BigUint] {
        &self.entries
    }

    /// `g^{a_0}`
    pub fn constant_entry(&self) -> Option<&BigUint> {
        self.entries.last()
    }

    pub(super) fn encode(&self, w: &mut WireWriter) {
        w.write_len(self.entries.len());
        for entry in &self.entries {
            w.write_bytes(&entry.to_bytes_be());
        }
    }

    pub(super) fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        let count = r.read_count(4)?.unwrap_or(0);
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let entry = BigUint::from_bytes_be(&r.read_bytes()?);
            if entry.is_zero() {
                return Err(Error::Serialization("zero linear commitment entry".into()));
            }
            entries.push(entry);
        }
        Ok(Self { entries })
    }
}
