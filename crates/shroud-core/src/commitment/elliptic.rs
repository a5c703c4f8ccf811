use std::sync::Arc;

use rand::{CryptoRng, RngCore};

use super::{CommitmentFamily, CommitmentKind};
use crate::curve::{CurveRegistry, EllipticCurve, Point};
use crate::error::{Error, Result};
use crate::field::Field;
use crate::polynomial::Polynomial;
use crate::share::{Share, Shareholder};
use crate::wire::{WireReader, WireWriter};

impl CommitmentFamily for EllipticCurve {
    type Commitment = EllipticCurveCommitment;

    fn kind(&self) -> CommitmentKind {
        CommitmentKind::EllipticCurve
    }

    fn field(&self) -> &Field {
        self.scalar_field()
    }

    fn generate<R: RngCore + CryptoRng + ?Sized>(
        &self,
        polynomial: &Polynomial,
        _shareholders: &[Shareholder],
        _rng: &mut R,
    ) -> Result<EllipticCurveCommitment> {
        if polynomial.field() != self.scalar_field() {
            return Err(Error::InvalidParameters(format!(
                "polynomial is not over the order of {}",
                self.name()
            )));
        }
        let points = polynomial
            .coefficients()
            .iter()
            .rev()
            .map(|a| self.multiply_generator(a))
            .collect();
        Ok(EllipticCurveCommitment {
            curve: Arc::new(self.clone()),
            points,
        })
    }

    fn verify(&self, share: &Share, commitment: &EllipticCurveCommitment) -> bool {
        if commitment.curve.as_ref() != self
            || commitment.points.is_empty()
            || !self.scalar_field().contains(share.value())
        {
            return false;
        }
        let lhs = self.multiply_generator(share.value());
        let rhs = self.evaluate(&commitment.points, &share.shareholder().to_field_element());
        lhs == rhs
    }

    fn sum(&self, commitments: &[&EllipticCurveCommitment]) -> Result<EllipticCurveCommitment> {
        let (first, rest) = commitments
            .split_first()
            .ok_or_else(|| Error::IncompatibleCommitments("nothing to sum".into()))?;
        let mut points = first.points.clone();
        for other in commitments {
            if other.curve.as_ref() != self {
                return Err(Error::IncompatibleCommitments(format!(
                    "commitment on {} summed on {}",
                    other.curve.name(),
                    self.name()
                )));
            }
        }
        for other in rest {
            if other.points.len() != points.len() {
                return Err(Error::IncompatibleCommitments(format!(
                    "degree mismatch: {} vs {} points",
                    points.len(),
                    other.points.len()
                )));
            }
            for (acc, point) in points.iter_mut().zip(&other.points) {
                *acc = self.add(acc, point);
            }
        }
        Ok(EllipticCurveCommitment {
            curve: Arc::clone(&first.curve),
            points,
        })
    }
}

/// `a_j·G` for `j = t, …, 0` on a named curve
#[derive(Clone)]
pub struct EllipticCurveCommitment {
    curve: Arc<EllipticCurve>,
    points: Vec<Point>,
}

impl PartialEq for EllipticCurveCommitment {
    fn eq(&self, other: &Self) -> bool {
        self.curve.name() == other.curve.name() && self.points == other.points
    }
}

impl Eq for EllipticCurveCommitment {}

impl std::fmt::Debug for EllipticCurveCommitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EllipticCurveCommitment")
            .field("curve", &self.curve.name())
            .field("points", &self.points.len())
            .finish()
    }
}

impl EllipticCurveCommitment {
    pub fn new(curve: Arc<EllipticCurve>, points: Vec<Point>) -> Self {
        Self { curve, points }
    }

    pub fn curve(&self) -> &Arc<EllipticCurve> {
        &self.curve
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// `a_0·G`, the public value of the committed secret
    pub fn public_point(&self) -> Option<&Point> {
        self.points.last()
    }

    /// SEC1 compressed encoding of [`public_point`](Self::public_point)
    pub fn public_key(&self) -> Option<Vec<u8>> {
        self.public_point()
            .map(|p| self.curve.encode_point(p, true))
    }

    pub(super) fn encode(&self, w: &mut WireWriter) -> Result<()> {
        w.write_utf(self.curve.name())?;
        w.write_len(self.points.len());
        for point in &self.points {
            w.write_bytes(&self.curve.encode_point(point, false));
        }
        Ok(())
    }

    pub(super) fn decode(r: &mut WireReader<'_>, curves: &CurveRegistry) -> Result<Self> {
        let name = r.read_utf()?;
        let curve = curves.require(&name)?;
        let count = r.read_count(5)?.unwrap_or(0);
        let mut points = Vec::with_capacity(count);
        for _ in 0..count {
            points.push(curve.decode_point(&r.read_bytes()?)?);
        }
        Ok(Self { curve, points })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::constants;
    use num_bigint::BigUint;
    use rand::thread_rng;

    #[test]
    fn test_public_point_is_secret_times_generator() {
        let curve = EllipticCurve::new(constants::secp256r1()).unwrap();
        let mut rng = thread_rng();
        let secret = BigUint::from(777u32);
        let poly = Polynomial::random(curve.scalar_field(), 2, &secret, &mut rng);
        let commitment = curve.generate(&poly, &[], &mut rng).unwrap();
        assert_eq!(
            commitment.public_point().unwrap(),
            &curve.multiply_generator(&secret)
        );
        assert_eq!(commitment.public_key().unwrap().len(), 33);
    }

    #[test]
    fn test_sum_across_curves_rejected() {
        let r1 = EllipticCurve::new(constants::secp256r1()).unwrap();
        let k1 = EllipticCurve::new(constants::secp256k1()).unwrap();
        let mut rng = thread_rng();
        let a = Polynomial::random(r1.scalar_field(), 1, &BigUint::from(1u8), &mut rng);
        let b = Polynomial::random(k1.scalar_field(), 1, &BigUint::from(1u8), &mut rng);
        let ca = r1.generate(&a, &[], &mut rng).unwrap();
        let cb = k1.generate(&b, &[], &mut rng).unwrap();
        assert!(matches!(
            r1.sum(&[&ca, &cb]),
            Err(Error::IncompatibleCommitments(_))
        ));
    }

    #[test]
    fn test_sum_verifies_summed_shares() {
        let curve = EllipticCurve::new(constants::secp256k1()).unwrap();
        let field = curve.scalar_field().clone();
        let mut rng = thread_rng();
        let polys: Vec<_> = (0..3)
            .map(|i| Polynomial::random(&field, 1, &BigUint::from(i as u32 + 1), &mut rng))
            .collect();
        let commitments: Vec<_> = polys
            .iter()
            .map(|p| curve.generate(p, &[], &mut rng).unwrap())
            .collect();
        let sum = curve.sum(&commitments.iter().collect::<Vec<_>>()).unwrap();

        let x = Shareholder::new(2).unwrap();
        let value = polys
            .iter()
            .fold(BigUint::from(0u8), |acc, p| field.add(&acc, &p.evaluate(&x.to_field_element())));
        assert!(curve.verify(&Share::new(x, value), &sum));
    }
}
