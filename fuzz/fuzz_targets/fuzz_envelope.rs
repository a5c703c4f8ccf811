#![no_main]

use libfuzzer_sys::fuzz_target;
use shroud_core::curve::constants;
use shroud_core::CurveRegistry;
use shroud_vss::messages::Envelope;

fuzz_target!(|data: &[u8]| {
    let Ok(curves) = CurveRegistry::with_builtin(constants::SECP256R1) else {
        return;
    };

    // Any log entry, protocol or not, must decode without panicking
    if let Ok(Some(envelope)) = Envelope::from_bytes(data, &curves) {
        let reserialized = envelope.to_bytes().unwrap();
        let envelope2 = Envelope::from_bytes(&reserialized, &curves)
            .unwrap()
            .unwrap();
        assert_eq!(envelope, envelope2);
    }
});
