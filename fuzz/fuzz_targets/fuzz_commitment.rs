#![no_main]

use libfuzzer_sys::fuzz_target;
use shroud_core::curve::constants;
use shroud_core::{Commitment, ConfidentialData, CurveRegistry, VerifiableShare};

fuzz_target!(|data: &[u8]| {
    let Ok(curves) = CurveRegistry::with_builtin(constants::SECP256K1) else {
        return;
    };

    if let Ok(commitment) = Commitment::from_bytes(data, &curves) {
        // Degree queries should not panic
        let _ = commitment.degree();

        let reserialized = commitment.to_bytes().unwrap();
        let commitment2 = Commitment::from_bytes(&reserialized, &curves).unwrap();
        assert_eq!(commitment, commitment2);
    }

    if let Ok(share) = VerifiableShare::from_bytes(data, &curves) {
        assert!(share.shareholder().id() > 0);
        let reserialized = share.to_bytes().unwrap();
        assert_eq!(VerifiableShare::from_bytes(&reserialized, &curves).unwrap(), share);
    }

    if let Ok(record) = ConfidentialData::from_bytes(data, &curves) {
        let reserialized = record.to_bytes().unwrap();
        assert_eq!(ConfidentialData::from_bytes(&reserialized, &curves).unwrap(), record);
    }
});
