#![no_main]

use libfuzzer_sys::fuzz_target;
use shroud_core::{CurveParameters, CurveRegistry};

fuzz_target!(|data: &[u8]| {
    if let Ok(params) = CurveParameters::from_bytes(data) {
        let reserialized = params.to_bytes();
        assert_eq!(CurveParameters::from_bytes(&reserialized).unwrap(), params);

        // Validation of hostile parameters should fail cleanly, never panic
        let _ = CurveRegistry::new(params);
    }
});
