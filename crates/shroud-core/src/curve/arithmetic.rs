use num_bigint::BigUint;
use num_traits::{One, Zero};

use super::CurveParameters;
use crate::error::{Error, Result};
use crate::field::Field;

/// Affine point, or the point at infinity
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Point {
    Identity,
    Affine { x: BigUint, y: BigUint },
}

impl Point {
    pub fn is_identity(&self) -> bool {
        matches!(self, Point::Identity)
    }
}

/// Jacobian coordinates `(X, Y, Z)` for `(X/Z^2, Y/Z^3)`; `Z = 0` is infinity
#[derive(Clone, Debug)]
struct Jacobian {
    x: BigUint,
    y: BigUint,
    z: BigUint,
}

impl Jacobian {
    fn infinity() -> Self {
        Self {
            x: BigUint::one(),
            y: BigUint::one(),
            z: BigUint::zero(),
        }
    }

    fn is_infinity(&self) -> bool {
        self.z.is_zero()
    }
}

/// A curve ready for arithmetic
///
/// Wraps a validated [`CurveParameters`] together with its coordinate field
/// `F_p` and scalar field `F_n`.
#[derive(Clone, Debug)]
pub struct EllipticCurve {
    params: CurveParameters,
    base: Field,
    scalars: Field,
    generator: Point,
    coordinate_len: usize,
}

impl PartialEq for EllipticCurve {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params
    }
}

impl Eq for EllipticCurve {}

impl EllipticCurve {
    /// Validate a parameter set and prepare it for arithmetic
    pub fn new(params: CurveParameters) -> Result<Self> {
        if params.name.is_empty() {
            return Err(Error::InvalidParameters("curve name is empty".into()));
        }
        let base = Field::new(params.prime.clone())?;
        let scalars = Field::new(params.order.clone())?;
        if params.cofactor.is_zero() {
            return Err(Error::InvalidParameters(format!(
                "curve {} has a zero cofactor",
                params.name
            )));
        }
        if !base.contains(&params.a) || !base.contains(&params.b) {
            return Err(Error::InvalidParameters(format!(
                "curve {} coefficients exceed the prime",
                params.name
            )));
        }

        let coordinate_len = base.byte_len();
        let mut curve = Self {
            generator: Point::Identity,
            params,
            base,
            scalars,
            coordinate_len,
        };
        let generator = Point::Affine {
            x: curve.params.x.clone(),
            y: curve.params.y.clone(),
        };
        if !curve.is_on_curve(&generator) {
            return Err(Error::PointNotOnCurve(curve.params.name.clone()));
        }
        curve.generator = generator;
        Ok(curve)
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    pub fn parameters(&self) -> &CurveParameters {
        &self.params
    }

    pub fn order(&self) -> &BigUint {
        &self.params.order
    }

    /// The field of scalars, `F_n`, over which sharings on this curve live
    pub fn scalar_field(&self) -> &Field {
        &self.scalars
    }

    pub fn generator(&self) -> &Point {
        &self.generator
    }

    pub fn is_on_curve(&self, point: &Point) -> bool {
        match point {
            Point::Identity => true,
            Point::Affine { x, y } => {
                if !self.base.contains(x) || !self.base.contains(y) {
                    return false;
                }
                let f = &self.base;
                let lhs = f.mul(y, y);
                let x3 = f.mul(&f.mul(x, x), x);
                let rhs = f.add(&f.add(&x3, &f.mul(&self.params.a, x)), &self.params.b);
                lhs == rhs
            }
        }
    }

    pub fn negate(&self, point: &Point) -> Point {
        match point {
            Point::Identity => Point::Identity,
            Point::Affine { x, y } => Point::Affine {
                x: x.clone(),
                y: self.base.neg(y),
            },
        }
    }

    pub fn add(&self, a: &Point, b: &Point) -> Point {
        let sum = self.jacobian_add(&self.to_jacobian(a), &self.to_jacobian(b));
        self.to_affine(&sum)
    }

    /// `k·P`, with `k` reduced modulo the group order
    pub fn multiply(&self, point: &Point, scalar: &BigUint) -> Point {
        let k = self.scalars.reduce(scalar);
        self.to_affine(&self.ladder(&self.to_jacobian(point), &k))
    }

    /// `k·P` without reducing `k`, for small public multipliers
    fn multiply_unreduced(&self, point: &Jacobian, k: &BigUint) -> Jacobian {
        self.ladder(point, k)
    }

    pub fn multiply_generator(&self, scalar: &BigUint) -> Point {
        self.multiply(&self.generator, scalar)
    }

    /// `Σ x^j·P_j` for points listed from the highest degree down, by Horner's rule
    pub fn evaluate(&self, points: &[Point], x: &BigUint) -> Point {
        let mut acc = Jacobian::infinity();
        for point in points {
            acc = self.multiply_unreduced(&acc, x);
            acc = self.jacobian_add(&acc, &self.to_jacobian(point));
        }
        self.to_affine(&acc)
    }

    /// SEC1 encoding; the identity is the single byte `0x00`
    pub fn encode_point(&self, point: &Point, compressed: bool) -> Vec<u8> {
        match point {
            Point::Identity => vec![0x00],
            Point::Affine { x, y } => {
                let mut out = Vec::with_capacity(1 + 2 * self.coordinate_len);
                if compressed {
                    out.push(if y.bit(0) { 0x03 } else { 0x02 });
                    out.extend(self.pad(x));
                } else {
                    out.push(0x04);
                    out.extend(self.pad(x));
                    out.extend(self.pad(y));
                }
                out
            }
        }
    }

    /// Decode a SEC1 point and check it lies on this curve
    pub fn decode_point(&self, bytes: &[u8]) -> Result<Point> {
        let len = self.coordinate_len;
        let point = match bytes.first() {
            Some(0x00) if bytes.len() == 1 => Point::Identity,
            Some(0x04) if bytes.len() == 1 + 2 * len => Point::Affine {
                x: BigUint::from_bytes_be(&bytes[1..1 + len]),
                y: BigUint::from_bytes_be(&bytes[1 + len..]),
            },
            Some(tag @ (0x02 | 0x03)) if bytes.len() == 1 + len => {
                let x = BigUint::from_bytes_be(&bytes[1..]);
                if !self.base.contains(&x) {
                    return Err(Error::PointNotOnCurve(self.name().to_string()));
                }
                let f = &self.base;
                let rhs = f.add(
                    &f.add(&f.mul(&f.mul(&x, &x), &x), &f.mul(&self.params.a, &x)),
                    &self.params.b,
                );
                let root = f
                    .sqrt(&rhs)
                    .ok_or_else(|| Error::PointNotOnCurve(self.name().to_string()))?;
                let y = if root.bit(0) == (*tag == 0x03) {
                    root
                } else {
                    f.neg(&root)
                };
                Point::Affine { x, y }
            }
            _ => {
                return Err(Error::Serialization(format!(
                    "malformed point encoding of {} bytes for {}",
                    bytes.len(),
                    self.name()
                )))
            }
        };
        if !self.is_on_curve(&point) {
            return Err(Error::PointNotOnCurve(self.name().to_string()));
        }
        Ok(point)
    }

    fn pad(&self, value: &BigUint) -> Vec<u8> {
        let raw = value.to_bytes_be();
        let mut out = vec![0u8; self.coordinate_len.saturating_sub(raw.len())];
        out.extend_from_slice(&raw);
        out
    }

    fn to_jacobian(&self, point: &Point) -> Jacobian {
        match point {
            Point::Identity => Jacobian::infinity(),
            Point::Affine { x, y } => Jacobian {
                x: x.clone(),
                y: y.clone(),
                z: BigUint::one(),
            },
        }
    }

    fn to_affine(&self, point: &Jacobian) -> Point {
        if point.is_infinity() {
            return Point::Identity;
        }
        let f = &self.base;
        // z is non-zero modulo a prime, so the inverse exists
        let Ok(z_inv) = f.inverse(&point.z) else {
            return Point::Identity;
        };
        let z_inv2 = f.mul(&z_inv, &z_inv);
        let z_inv3 = f.mul(&z_inv2, &z_inv);
        Point::Affine {
            x: f.mul(&point.x, &z_inv2),
            y: f.mul(&point.y, &z_inv3),
        }
    }

    fn jacobian_double(&self, p: &Jacobian) -> Jacobian {
        if p.is_infinity() || p.y.is_zero() {
            return Jacobian::infinity();
        }
        let f = &self.base;
        let yy = f.mul(&p.y, &p.y);
        let s = f.mul(&BigUint::from(4u8), &f.mul(&p.x, &yy));
        let zz = f.mul(&p.z, &p.z);
        let m = f.add(
            &f.mul(&BigUint::from(3u8), &f.mul(&p.x, &p.x)),
            &f.mul(&self.params.a, &f.mul(&zz, &zz)),
        );
        let x3 = f.sub(&f.mul(&m, &m), &f.add(&s, &s));
        let y3 = f.sub(
            &f.mul(&m, &f.sub(&s, &x3)),
            &f.mul(&BigUint::from(8u8), &f.mul(&yy, &yy)),
        );
        let z3 = f.mul(&BigUint::from(2u8), &f.mul(&p.y, &p.z));
        Jacobian {
            x: x3,
            y: y3,
            z: z3,
        }
    }

    fn jacobian_add(&self, p: &Jacobian, q: &Jacobian) -> Jacobian {
        if p.is_infinity() {
            return q.clone();
        }
        if q.is_infinity() {
            return p.clone();
        }
        let f = &self.base;
        let z1z1 = f.mul(&p.z, &p.z);
        let z2z2 = f.mul(&q.z, &q.z);
        let u1 = f.mul(&p.x, &z2z2);
        let u2 = f.mul(&q.x, &z1z1);
        let s1 = f.mul(&p.y, &f.mul(&q.z, &z2z2));
        let s2 = f.mul(&q.y, &f.mul(&p.z, &z1z1));
        let h = f.sub(&u2, &u1);
        let r = f.sub(&s2, &s1);
        if h.is_zero() {
            return if r.is_zero() {
                self.jacobian_double(p)
            } else {
                Jacobian::infinity()
            };
        }
        let hh = f.mul(&h, &h);
        let hhh = f.mul(&hh, &h);
        let v = f.mul(&u1, &hh);
        let x3 = f.sub(&f.sub(&f.mul(&r, &r), &hhh), &f.add(&v, &v));
        let y3 = f.sub(&f.mul(&r, &f.sub(&v, &x3)), &f.mul(&s1, &hhh));
        let z3 = f.mul(&f.mul(&p.z, &q.z), &h);
        Jacobian {
            x: x3,
            y: y3,
            z: z3,
        }
    }

    /// Left-to-right double-and-add
    fn ladder(&self, point: &Jacobian, k: &BigUint) -> Jacobian {
        let mut acc = Jacobian::infinity();
        for i in (0..k.bits()).rev() {
            acc = self.jacobian_double(&acc);
            if k.bit(i) {
                acc = self.jacobian_add(&acc, point);
            }
        }
        acc
    }
}
