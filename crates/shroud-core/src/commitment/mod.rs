//! Commitment families binding shares to a sharing polynomial
//!
//! Three families exist and the set is closed:
//!
//! - [`LinearScheme`]: Feldman commitments `g^{a_j} mod p` in a prime-order
//!   subgroup of `Z_p^*`
//! - [`EllipticCurve`]: Feldman commitments `a_j·G` on a named curve
//! - [`ConstantScheme`]: a Merkle root over per-shareholder leaves, constant
//!   size regardless of the polynomial degree
//!
//! Linear and elliptic-curve commitments list their entries from the
//! highest-degree coefficient down to the constant term, and are additively
//! homomorphic. Constant commitments cannot be summed.

mod constant;
mod elliptic;
mod linear;

use std::sync::Arc;

use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::curve::{CurveRegistry, EllipticCurve};
use crate::error::{Error, Result};
use crate::field::Field;
use crate::polynomial::Polynomial;
use crate::share::{Share, Shareholder};
use crate::wire::{WireReader, WireWriter};

pub use constant::{ConstantCommitment, ConstantScheme, ConstantWitness};
pub use elliptic::EllipticCurveCommitment;
pub use linear::{LinearCommitment, LinearGroup, LinearScheme, RFC3526_2048_PRIME};

/// Wire tag of a linear commitment
const TAG_LINEAR: u8 = 0;
/// Wire tag of a constant commitment
const TAG_CONSTANT: u8 = 1;

/// Which family a commitment or algebra belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentKind {
    Linear,
    EllipticCurve,
    Constant,
}

impl CommitmentKind {
    pub fn is_homomorphic(self) -> bool {
        !matches!(self, CommitmentKind::Constant)
    }
}

impl std::fmt::Display for CommitmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitmentKind::Linear => write!(f, "linear"),
            CommitmentKind::EllipticCurve => write!(f, "elliptic_curve"),
            CommitmentKind::Constant => write!(f, "constant"),
        }
    }
}

/// One commitment family
pub trait CommitmentFamily {
    type Commitment;

    fn kind(&self) -> CommitmentKind;

    /// Field the committed polynomials live in
    fn field(&self) -> &Field;

    /// Commit to `polynomial`; `shareholders` lists every evaluation point
    fn generate<R: RngCore + CryptoRng + ?Sized>(
        &self,
        polynomial: &Polynomial,
        shareholders: &[Shareholder],
        rng: &mut R,
    ) -> Result<Self::Commitment>;

    /// Whether `share` is the evaluation of the committed polynomial
    fn verify(&self, share: &Share, commitment: &Self::Commitment) -> bool;

    /// Commitment to the sum of the committed polynomials
    fn sum(&self, commitments: &[&Self::Commitment]) -> Result<Self::Commitment>;
}

/// A commitment from any family
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Commitment {
    Linear(LinearCommitment),
    EllipticCurve(EllipticCurveCommitment),
    Constant(ConstantCommitment),
}

impl Commitment {
    pub fn kind(&self) -> CommitmentKind {
        match self {
            Commitment::Linear(_) => CommitmentKind::Linear,
            Commitment::EllipticCurve(_) => CommitmentKind::EllipticCurve,
            Commitment::Constant(_) => CommitmentKind::Constant,
        }
    }

    pub fn is_elliptic_curve(&self) -> bool {
        matches!(self, Commitment::EllipticCurve(_))
    }

    /// Degree of the committed polynomial, unknown for constant commitments
    pub fn degree(&self) -> Option<usize> {
        match self {
            Commitment::Linear(c) => c.entries().len().checked_sub(1),
            Commitment::EllipticCurve(c) => c.points().len().checked_sub(1),
            Commitment::Constant(_) => None,
        }
    }

    /// `bool isEllipticCurve`, then the family encoding
    pub fn encode(&self, w: &mut WireWriter) -> Result<()> {
        w.write_bool(self.is_elliptic_curve());
        match self {
            Commitment::EllipticCurve(c) => c.encode(w)?,
            Commitment::Linear(c) => {
                w.write_u8(TAG_LINEAR);
                c.encode(w);
            }
            Commitment::Constant(c) => {
                w.write_u8(TAG_CONSTANT);
                c.encode(w);
            }
        }
        Ok(())
    }

    pub fn decode(r: &mut WireReader<'_>, curves: &CurveRegistry) -> Result<Self> {
        if r.read_bool()? {
            return Ok(Commitment::EllipticCurve(EllipticCurveCommitment::decode(
                r, curves,
            )?));
        }
        match r.read_u8()? {
            TAG_LINEAR => Ok(Commitment::Linear(LinearCommitment::decode(r)?)),
            TAG_CONSTANT => Ok(Commitment::Constant(ConstantCommitment::decode(r)?)),
            tag => Err(Error::Serialization(format!("unknown commitment tag {tag}"))),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = WireWriter::new();
        self.encode(&mut w)?;
        Ok(w.into_bytes())
    }

    pub fn from_bytes(bytes: &[u8], curves: &CurveRegistry) -> Result<Self> {
        let mut r = WireReader::new(bytes);
        let commitment = Self::decode(&mut r, curves)?;
        r.finish()?;
        Ok(commitment)
    }
}

/// The active commitment family of a sharing
#[derive(Clone, Debug)]
pub enum CommitmentAlgebra {
    Linear(Arc<LinearScheme>),
    EllipticCurve(Arc<EllipticCurve>),
    Constant(ConstantScheme),
}

impl CommitmentAlgebra {
    pub fn kind(&self) -> CommitmentKind {
        match self {
            CommitmentAlgebra::Linear(s) => s.kind(),
            CommitmentAlgebra::EllipticCurve(s) => s.kind(),
            CommitmentAlgebra::Constant(s) => s.kind(),
        }
    }

    /// Field in which sharings under this family are computed
    pub fn field(&self) -> &Field {
        match self {
            CommitmentAlgebra::Linear(s) => CommitmentFamily::field(s.as_ref()),
            CommitmentAlgebra::EllipticCurve(s) => CommitmentFamily::field(s.as_ref()),
            CommitmentAlgebra::Constant(s) => CommitmentFamily::field(s),
        }
    }

    pub fn generate<R: RngCore + CryptoRng + ?Sized>(
        &self,
        polynomial: &Polynomial,
        shareholders: &[Shareholder],
        rng: &mut R,
    ) -> Result<Commitment> {
        Ok(match self {
            CommitmentAlgebra::Linear(s) => {
                Commitment::Linear(s.generate(polynomial, shareholders, rng)?)
            }
            CommitmentAlgebra::EllipticCurve(s) => {
                Commitment::EllipticCurve(s.generate(polynomial, shareholders, rng)?)
            }
            CommitmentAlgebra::Constant(s) => {
                Commitment::Constant(s.generate(polynomial, shareholders, rng)?)
            }
        })
    }

    /// Verify a share; a commitment of another family never verifies
    ///
    /// Elliptic-curve commitments name their own curve, so they verify
    /// against that curve even after the current curve has changed.
    pub fn verify(&self, share: &Share, commitment: &Commitment) -> bool {
        match (self, commitment) {
            (CommitmentAlgebra::Linear(s), Commitment::Linear(c)) => s.verify(share, c),
            (CommitmentAlgebra::EllipticCurve(_), Commitment::EllipticCurve(c)) => {
                c.curve().verify(share, c)
            }
            (CommitmentAlgebra::Constant(s), Commitment::Constant(c)) => s.verify(share, c),
            _ => false,
        }
    }

    /// Homomorphic sum; fails on mixed families, curves or degrees, and on
    /// any constant commitment
    pub fn sum(&self, commitments: &[&Commitment]) -> Result<Commitment> {
        match self {
            CommitmentAlgebra::Linear(s) => {
                let operands = commitments
                    .iter()
                    .map(|c| match c {
                        Commitment::Linear(c) => Ok(c),
                        other => Err(mismatch(CommitmentKind::Linear, other.kind())),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Commitment::Linear(s.sum(&operands)?))
            }
            CommitmentAlgebra::EllipticCurve(curve) => {
                let operands = commitments
                    .iter()
                    .map(|c| match c {
                        Commitment::EllipticCurve(c) => Ok(c),
                        other => Err(mismatch(CommitmentKind::EllipticCurve, other.kind())),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Commitment::EllipticCurve(curve.sum(&operands)?))
            }
            CommitmentAlgebra::Constant(_) => Err(Error::IncompatibleCommitments(
                "constant commitments are not homomorphic".into(),
            )),
        }
    }

    /// Whether the committed polynomial evaluates to zero at `x`
    pub fn vanishes_at(&self, commitment: &Commitment, x: &BigUint) -> Result<bool> {
        match (self, commitment) {
            (CommitmentAlgebra::Linear(s), Commitment::Linear(c)) => Ok(s.vanishes_at(c, x)),
            (CommitmentAlgebra::EllipticCurve(curve), Commitment::EllipticCurve(c)) => {
                if c.curve().name() != curve.name() {
                    return Err(Error::IncompatibleCommitments(format!(
                        "commitment on {} checked against {}",
                        c.curve().name(),
                        curve.name()
                    )));
                }
                Ok(curve.evaluate(c.points(), x).is_identity())
            }
            (_, other) => Err(mismatch(self.kind(), other.kind())),
        }
    }

    /// Whether `commitment` belongs to this family with the given degree
    pub fn is_well_formed(&self, commitment: &Commitment, degree: usize) -> bool {
        match (self, commitment) {
            (CommitmentAlgebra::Linear(_), Commitment::Linear(c)) => c.entries().len() == degree + 1,
            (CommitmentAlgebra::EllipticCurve(curve), Commitment::EllipticCurve(c)) => {
                c.curve().as_ref() == curve.as_ref() && c.points().len() == degree + 1
            }
            (CommitmentAlgebra::Constant(_), Commitment::Constant(_)) => true,
            _ => false,
        }
    }
}

fn mismatch(expected: CommitmentKind, got: CommitmentKind) -> Error {
    Error::IncompatibleCommitments(format!("expected {expected} commitment, got {got}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{constants, CurveRegistry};
    use rand::thread_rng;

    fn shareholders(n: u32) -> Vec<Shareholder> {
        (1..=n).map(|i| Shareholder::new(i).unwrap()).collect()
    }

    fn algebras() -> Vec<CommitmentAlgebra> {
        let curve = Arc::new(EllipticCurve::new(constants::secp256k1()).unwrap());
        vec![
            CommitmentAlgebra::Linear(Arc::new(LinearScheme::insecure_256())),
            CommitmentAlgebra::EllipticCurve(Arc::clone(&curve)),
            CommitmentAlgebra::Constant(ConstantScheme::new(curve.scalar_field().clone())),
        ]
    }

    #[test]
    fn test_every_family_verifies_honest_shares() {
        let mut rng = thread_rng();
        let holders = shareholders(4);
        for algebra in algebras() {
            let poly = Polynomial::random(algebra.field(), 1, &BigUint::from(42u32), &mut rng);
            let commitment = algebra.generate(&poly, &holders, &mut rng).unwrap();
            for holder in &holders {
                let share = Share::new(*holder, poly.evaluate(&holder.to_field_element()));
                assert!(algebra.verify(&share, &commitment), "{}", algebra.kind());

                let forged = Share::new(*holder, algebra.field().add(share.value(), &BigUint::from(1u8)));
                assert!(!algebra.verify(&forged, &commitment), "{}", algebra.kind());
            }
        }
    }

    #[test]
    fn test_commitment_encoding_round_trip() {
        let mut rng = thread_rng();
        let registry = CurveRegistry::with_builtin(constants::SECP256K1).unwrap();
        let holders = shareholders(3);
        for algebra in algebras() {
            let poly = Polynomial::random(algebra.field(), 1, &BigUint::from(7u32), &mut rng);
            let commitment = algebra.generate(&poly, &holders, &mut rng).unwrap();
            let bytes = commitment.to_bytes().unwrap();
            assert_eq!(bytes[0] == 1, commitment.is_elliptic_curve());
            assert_eq!(Commitment::from_bytes(&bytes, &registry).unwrap(), commitment);
        }
    }

    #[test]
    fn test_mixed_families_never_verify_or_sum() {
        let mut rng = thread_rng();
        let holders = shareholders(3);
        let all = algebras();
        let poly = Polynomial::random(all[0].field(), 1, &BigUint::from(5u32), &mut rng);
        let linear = all[0].generate(&poly, &holders, &mut rng).unwrap();
        let share = Share::new(holders[0], poly.evaluate(&holders[0].to_field_element()));

        assert!(!all[1].verify(&share, &linear));
        assert!(matches!(
            all[1].sum(&[&linear]),
            Err(Error::IncompatibleCommitments(_))
        ));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let registry = CurveRegistry::with_builtin(constants::SECP256R1).unwrap();
        assert!(Commitment::from_bytes(&[0, 9, 0, 0, 0, 0], &registry).is_err());
    }
}
