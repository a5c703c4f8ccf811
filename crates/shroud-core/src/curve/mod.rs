//! Short-Weierstrass curves described by parameter sets
//!
//! A curve is `y^2 = x^3 + a·x + b` over `F_p` with a base point of prime
//! order `n`. Parameter sets are plain data, so new curves can be registered
//! at runtime and exchanged over the wire.

mod arithmetic;
pub mod constants;
mod registry;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::wire::{WireReader, WireWriter};

pub use arithmetic::{EllipticCurve, Point};
pub use constants::{BLS12_381, SECP256K1, SECP256R1};
pub use registry::CurveRegistry;

/// Parameters of a named short-Weierstrass curve
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveParameters {
    pub name: String,
    #[serde(with = "hex_biguint")]
    pub prime: BigUint,
    #[serde(with = "hex_biguint")]
    pub order: BigUint,
    #[serde(with = "hex_biguint")]
    pub a: BigUint,
    #[serde(with = "hex_biguint")]
    pub b: BigUint,
    #[serde(with = "hex_biguint")]
    pub x: BigUint,
    #[serde(with = "hex_biguint")]
    pub y: BigUint,
    #[serde(with = "hex_biguint")]
    pub cofactor: BigUint,
}

impl CurveParameters {
    fn integers(&self) -> [&BigUint; 7] {
        [
            &self.prime,
            &self.order,
            &self.a,
            &self.b,
            &self.x,
            &self.y,
            &self.cofactor,
        ]
    }

    /// Wire form: `i32 len + name`, then seven `i32 len + big-endian` integers
    /// in the order prime, order, a, b, x, y, cofactor
    pub fn encode(&self, w: &mut WireWriter) {
        w.write_bytes(self.name.as_bytes());
        for value in self.integers() {
            w.write_bytes(&value.to_bytes_be());
        }
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        let name = String::from_utf8(r.read_bytes()?)
            .map_err(|e| Error::Serialization(format!("invalid curve name: {e}")))?;
        let mut read = || -> Result<BigUint> { Ok(BigUint::from_bytes_be(&r.read_bytes()?)) };
        Ok(Self {
            name,
            prime: read()?,
            order: read()?,
            a: read()?,
            b: read()?,
            x: read()?,
            y: read()?,
            cofactor: read()?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        self.encode(&mut w);
        w.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = WireReader::new(bytes);
        let params = Self::decode(&mut r)?;
        r.finish()?;
        Ok(params)
    }
}

/// Serde helpers for big integers as hex strings
pub mod hex_biguint {
    use num_bigint::BigUint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{value:x}"))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let digits = s.trim_start_matches("0x");
        BigUint::parse_bytes(digits.as_bytes(), 16)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid hex integer: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_wire_round_trip() {
        for params in [constants::secp256r1(), constants::secp256k1(), constants::bls12_381()] {
            let bytes = params.to_bytes();
            assert_eq!(CurveParameters::from_bytes(&bytes).unwrap(), params);
        }
    }

    #[test]
    fn test_parameters_json_uses_hex() {
        let params = constants::secp256k1();
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("\"b\":\"7\""));
        let back: CurveParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn test_truncated_parameters_rejected() {
        let bytes = constants::secp256r1().to_bytes();
        for cut in [0, 3, 10, bytes.len() - 1] {
            assert!(CurveParameters::from_bytes(&bytes[..cut]).is_err());
        }
    }
}
