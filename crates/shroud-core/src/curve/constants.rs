//! Named curve parameter sets

use num_bigint::BigUint;

use super::CurveParameters;

pub const SECP256R1: &str = "secp256r1";
pub const SECP256K1: &str = "secp256k1";
pub const BLS12_381: &str = "BLS12_381";

fn int(hex: &str) -> BigUint {
    BigUint::parse_bytes(hex.as_bytes(), 16).expect("curve constants are valid hex")
}

/// NIST P-256
pub fn secp256r1() -> CurveParameters {
    CurveParameters {
        name: SECP256R1.to_string(),
        prime: int("FFFFFFFF00000001000000000000000000000000FFFFFFFFFFFFFFFFFFFFFFFF"),
        order: int("FFFFFFFF00000000FFFFFFFFFFFFFFFFBCE6FAADA7179E84F3B9CAC2FC632551"),
        a: int("FFFFFFFF00000001000000000000000000000000FFFFFFFFFFFFFFFFFFFFFFFC"),
        b: int("5AC635D8AA3A93E7B3EBBD55769886BC651D06B0CC53B0F63BCE3C3E27D2604B"),
        x: int("6B17D1F2E12C4247F8BCE6E563A440F277037D812DEB33A0F4A13945D898C296"),
        y: int("4FE342E2FE1A7F9B8EE7EB4A7C0F9E162BCE33576B315ECECBB6406837BF51F5"),
        cofactor: BigUint::from(1u8),
    }
}

/// The Bitcoin curve
pub fn secp256k1() -> CurveParameters {
    CurveParameters {
        name: SECP256K1.to_string(),
        prime: int("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEFFFFFC2F"),
        order: int("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141"),
        a: BigUint::from(0u8),
        b: BigUint::from(7u8),
        x: int("79BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798"),
        y: int("483ADA7726A3C4655DA4FBFC0E1108A8FD17B448A68554199C47D08FFB10D4B8"),
        cofactor: BigUint::from(1u8),
    }
}

/// BLS12-381 G1
pub fn bls12_381() -> CurveParameters {
    CurveParameters {
        name: BLS12_381.to_string(),
        prime: int(concat!(
            "1A0111EA397FE69A4B1BA7B6434BACD764774B84F38512BF6730D2A0F6B0F624",
            "1EABFFFEB153FFFFB9FEFFFFFFFFAAAB"
        )),
        order: int("73EDA753299D7D483339D80809A1D80553BDA402FFFE5BFEFFFFFFFF00000001"),
        a: BigUint::from(0u8),
        b: BigUint::from(4u8),
        x: int(concat!(
            "17F1D3A73197D7942695638C4FA9AC0FC3688C4F9774B905A14E3A3F171BAC58",
            "6C55E83FF97A1AEFFB3AF00ADB22C6BB"
        )),
        y: int(concat!(
            "08B3F481E3AAA0F1A09E30ED741D8AE4FCF5E095D5D00AF600DB18CB2C04B3ED",
            "D03CC744A2888AE40CAA232946C5E7E1"
        )),
        cofactor: int("396C8C005555E1568C00AAAB0000AAAB"),
    }
}

/// Every built-in parameter set
pub fn builtin() -> Vec<CurveParameters> {
    vec![secp256r1(), secp256k1(), bls12_381()]
}

/// Look up a built-in parameter set by name
pub fn by_name(name: &str) -> Option<CurveParameters> {
    builtin().into_iter().find(|c| c.name == name)
}
