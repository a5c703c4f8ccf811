#![no_main]

use libfuzzer_sys::fuzz_target;
use shroud_core::curve::constants;
use shroud_core::CurveRegistry;
use shroud_vss::RecoveryApplicationState;

fuzz_target!(|data: &[u8]| {
    let Ok(curves) = CurveRegistry::with_builtin(constants::SECP256R1) else {
        return;
    };

    if let Ok(state) = RecoveryApplicationState::from_bytes(data, &curves) {
        assert!(state.last_checkpoint_cid <= state.last_cid);

        let reserialized = state.to_bytes().unwrap();
        let state2 = RecoveryApplicationState::from_bytes(&reserialized, &curves).unwrap();
        assert_eq!(state, state2);
    }
});
