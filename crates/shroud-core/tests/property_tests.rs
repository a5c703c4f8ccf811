//! Property-based tests for shroud-core using proptest
//!
//! These tests verify invariants that should hold for all valid inputs.

use std::sync::Arc;

use k256::elliptic_curve::sec1::ToEncodedPoint;
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use shroud_core::{
    curve::constants, interpolate_at, BigUint, Commitment, CommitmentAlgebra, ConfidentialData,
    CurveParameters, CurveRegistry, EllipticCurve, LinearScheme, Polynomial, Share, Shareholder,
};

// ============================================
// Strategies
// ============================================

fn secp256k1() -> EllipticCurve {
    EllipticCurve::new(constants::secp256k1()).unwrap()
}

fn arb_scalar() -> impl Strategy<Value = BigUint> {
    any::<[u8; 32]>().prop_map(|bytes| {
        let curve = secp256k1();
        curve.scalar_field().reduce(&BigUint::from_bytes_be(&bytes))
    })
}

/// `(threshold, n)` with `n >= 2t + 1`
fn arb_threshold() -> impl Strategy<Value = (usize, u32)> {
    (1usize..=3).prop_flat_map(|t| (Just(t), (2 * t as u32 + 1)..=(2 * t as u32 + 4)))
}

fn holders(n: u32) -> Vec<Shareholder> {
    (1..=n).map(|i| Shareholder::new(i).unwrap()).collect()
}

fn homomorphic_algebras() -> Vec<CommitmentAlgebra> {
    vec![
        CommitmentAlgebra::Linear(Arc::new(LinearScheme::insecure_256())),
        CommitmentAlgebra::EllipticCurve(Arc::new(secp256k1())),
    ]
}

// ============================================
// Reconstruction
// ============================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_any_quorum_reconstructs(
        secret in arb_scalar(),
        (t, n) in arb_threshold(),
        seed in any::<u64>(),
        offset in any::<usize>(),
    ) {
        let curve = secp256k1();
        let field = curve.scalar_field();
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let poly = Polynomial::random(field, t, &secret, &mut rng);
        let points: Vec<_> = holders(n)
            .iter()
            .map(|h| (h.to_field_element(), poly.evaluate(&h.to_field_element())))
            .collect();

        // any window of t + 1 consecutive shareholders, wrapping around
        let start = offset % points.len();
        let quorum: Vec<_> = (0..=t).map(|i| points[(start + i) % points.len()].clone()).collect();
        prop_assert_eq!(interpolate_at(field, &quorum, &BigUint::from(0u8)).unwrap(), secret.clone());

        let short: Vec<_> = quorum[..t].to_vec();
        prop_assert_ne!(interpolate_at(field, &short, &BigUint::from(0u8)).unwrap(), secret);
    }
}

// ============================================
// Commitments
// ============================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_altered_share_bytes_fail_verification(
        seed in any::<u64>(),
        byte in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        for algebra in homomorphic_algebras() {
            let holders = holders(4);
            let secret = algebra.field().random(&mut rng);
            let poly = Polynomial::random(algebra.field(), 1, &secret, &mut rng);
            let commitment = algebra.generate(&poly, &holders, &mut rng).unwrap();
            let holder = holders[2];
            let share = Share::new(holder, poly.evaluate(&holder.to_field_element()));
            prop_assert!(algebra.verify(&share, &commitment));

            let mut bytes = share.value().to_bytes_be();
            let i = byte.index(bytes.len());
            bytes[i] ^= flip;
            let altered = Share::new(holder, BigUint::from_bytes_be(&bytes));
            prop_assert!(!algebra.verify(&altered, &commitment));
        }
    }

    #[test]
    fn prop_commitment_sum_is_homomorphic(
        seed in any::<u64>(),
        count in 2usize..=4,
        degree in 1usize..=3,
    ) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        for algebra in homomorphic_algebras() {
            let field = algebra.field().clone();
            let polys: Vec<_> = (0..count)
                .map(|_| {
                    let s = field.random(&mut rng);
                    Polynomial::random(&field, degree, &s, &mut rng)
                })
                .collect();
            let commitments: Vec<Commitment> = polys
                .iter()
                .map(|p| algebra.generate(p, &[], &mut rng).unwrap())
                .collect();
            let refs: Vec<&Commitment> = commitments.iter().collect();
            let sum = algebra.sum(&refs).unwrap();

            let mut total = polys[0].clone();
            for p in &polys[1..] {
                total = total.add(p).unwrap();
            }
            prop_assert_eq!(sum, algebra.generate(&total, &[], &mut rng).unwrap());
        }
    }
}

// ============================================
// Curve arithmetic against k256
// ============================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_secp256k1_matches_k256(k in arb_scalar()) {
        prop_assume!(k != BigUint::from(0u8));
        let curve = secp256k1();
        let ours = curve.encode_point(&curve.multiply_generator(&k), true);

        let mut bytes = [0u8; 32];
        let raw = k.to_bytes_be();
        bytes[32 - raw.len()..].copy_from_slice(&raw);
        let secret = k256::SecretKey::from_slice(&bytes).unwrap();
        let theirs = secret.public_key().to_encoded_point(true);
        prop_assert_eq!(ours.as_slice(), theirs.as_bytes());
    }
}

// ============================================
// Decoders never panic
// ============================================

proptest! {
    #[test]
    fn prop_decoders_reject_garbage_gracefully(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let registry = CurveRegistry::with_builtin(constants::SECP256R1).unwrap();
        let _ = CurveParameters::from_bytes(&bytes);
        let _ = Commitment::from_bytes(&bytes, &registry);
        let _ = ConfidentialData::from_bytes(&bytes, &registry);
    }

    #[test]
    fn prop_truncated_confidential_data_rejected(seed in any::<u64>(), cut in any::<prop::sample::Index>()) {
        let registry = CurveRegistry::with_builtin(constants::SECP256K1).unwrap();
        let curve = registry.current();
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let secret = curve.scalar_field().random(&mut rng);
        let poly = Polynomial::random(curve.scalar_field(), 1, &secret, &mut rng);
        let algebra = CommitmentAlgebra::EllipticCurve(curve);
        let commitment = algebra.generate(&poly, &[], &mut rng).unwrap();
        let holder = Shareholder::new(1).unwrap();
        let share = shroud_core::VerifiableShare::new(
            Share::new(holder, poly.evaluate(&holder.to_field_element())),
            commitment,
        );
        let data = ConfidentialData::with_public_shares(share.clone(), vec![share]);
        let bytes = data.to_bytes().unwrap();
        prop_assert_eq!(&ConfidentialData::from_bytes(&bytes, &registry).unwrap(), &data);

        let cut = cut.index(bytes.len());
        prop_assert!(ConfidentialData::from_bytes(&bytes[..cut], &registry).is_err());
    }
}
