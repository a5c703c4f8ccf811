#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use shroud_vss::recovery::RECOVERY_MAGIC;
use shroud_vss::RecoveryRequest;

#[derive(Arbitrary, Debug)]
struct Input {
    target: u32,
    last_cid: i32,
    raw: Vec<u8>,
}

fuzz_target!(|input: Input| {
    // Replica ids travel as non-negative i32
    let request = RecoveryRequest {
        target: input.target & i32::MAX as u32,
        last_cid: input.last_cid,
    };
    let decoded = RecoveryRequest::from_bytes(&request.to_bytes()).unwrap();
    assert_eq!(decoded, Some(request));

    // Arbitrary entries behind the magic must not panic
    let mut entry = RECOVERY_MAGIC.to_vec();
    entry.extend_from_slice(&input.raw);
    if let Ok(Some(parsed)) = RecoveryRequest::from_bytes(&entry) {
        assert_eq!(parsed.to_bytes(), entry);
    }
});
