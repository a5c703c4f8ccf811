//! End-to-end workflow tests for Shroud
//!
//! These tests walk the full life of a confidential service: configuring
//! the scheme, minting a shared key, admitting client secrets, moving
//! them over the wire and recovering a replica that lost its state.

use shroud_core::curve::constants;
use shroud_core::{BigUint, CommitmentKind, ConfidentialData, Shareholder};
use shroud_vss::cluster::{LocalCluster, DEFAULT_RUN_LIMIT};
use shroud_vss::recovery::RecoveryApplicationState;
use shroud_vss::{RecoveryRequest, RoundOutcome, SchemeConfig, SharingMode, VssError};

/// Simulates the complete lifecycle of a four-replica service
#[test]
fn test_full_service_lifecycle() {
    // ==========================================
    // STEP 1: Write and reload the configuration
    // ==========================================
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shroud.json");
    SchemeConfig::simulation(CommitmentKind::Linear)
        .with_curve(constants::SECP256K1)
        .save(&path)
        .unwrap();
    let config = SchemeConfig::load(&path).unwrap();
    assert_eq!(config.curve, constants::SECP256K1);

    let mut cluster = LocalCluster::new(4, 1, &config).unwrap();

    // ==========================================
    // STEP 2: Mint a service key
    // ==========================================
    let mut handles = cluster.start_random_key_round(constants::SECP256K1).unwrap();
    cluster.run(DEFAULT_RUN_LIMIT).unwrap();
    let mut key_shares = Vec::new();
    for handle in &mut handles {
        match handle.try_outcome() {
            RoundOutcome::Completed(output) => {
                key_shares.push(output.share().unwrap().clone());
            }
            other => panic!("key round ended as {other:?}"),
        }
    }
    let public_key = key_shares[0].commitment().clone();
    assert!(key_shares.iter().all(|s| s.commitment() == &public_key));

    // ==========================================
    // STEP 3: Clients deal secrets
    // ==========================================
    cluster.set_plain_state(b"accounts=3");
    let secrets = [BigUint::from(1234u32), BigUint::from(98765u32)];
    for secret in &secrets {
        cluster.share_secret(secret).unwrap();
    }

    // ==========================================
    // STEP 4: Stored shares survive the wire
    // ==========================================
    for replica in cluster.replicas() {
        let scheme = replica.scheme();
        for share in replica.snapshot().shares {
            let data = ConfidentialData::new(share.clone());
            let decoded = scheme
                .decode_confidential_data(&data.to_bytes().unwrap())
                .unwrap();
            assert_eq!(decoded, data);
            let commitment = scheme
                .decode_commitment(&share.commitment().to_bytes().unwrap())
                .unwrap();
            assert_eq!(&commitment, share.commitment());
        }
    }

    // ==========================================
    // STEP 5: Checkpoint, keep running, lose a replica
    // ==========================================
    cluster.advance(40).unwrap();
    cluster.checkpoint();
    let checkpoint = cluster.cid();
    cluster.advance(20).unwrap();
    let last_cid = cluster.cid();
    cluster.replica(1).unwrap().wipe();
    assert!(cluster.replica(1).unwrap().snapshot().shares.is_empty());

    // ==========================================
    // STEP 6: Recover it
    // ==========================================
    let installed = cluster.recover(1).unwrap();
    assert_eq!(installed.last_checkpoint_cid, checkpoint);
    assert_eq!(installed.last_cid, last_cid);
    assert_eq!(installed.snapshot.plain, b"accounts=3");

    // The request sits in the log like any other entry
    let requests: Vec<RecoveryRequest> = cluster
        .log()
        .transcript()
        .iter()
        .filter_map(|(_, bytes)| RecoveryRequest::from_bytes(bytes).unwrap())
        .collect();
    assert_eq!(requests, vec![RecoveryRequest { target: 1, last_cid }]);

    // ==========================================
    // STEP 7: Every secret is still there
    // ==========================================
    for (index, secret) in secrets.iter().enumerate() {
        assert_eq!(&cluster.reconstruct(index).unwrap(), secret);
        assert_eq!(&cluster.reconstruct_from(index, &[1, 2]).unwrap(), secret);
    }
}

#[test]
fn test_large_secret_workflow() {
    let config = SchemeConfig::simulation(CommitmentKind::EllipticCurve);
    let cluster = LocalCluster::new(4, 1, &config).unwrap();
    let dealer = cluster.replicas()[0].scheme();

    let secret = b"a client document far wider than one scalar of any built-in curve".to_vec();
    let shared = dealer.share_bytes(&secret, SharingMode::LargeSecret).unwrap();
    assert!(shared.chunks.len() > 1);

    // Each replica admits its own chunk shares after a trip over the wire
    let mut held = Vec::new();
    for replica in cluster.replicas() {
        let scheme = replica.scheme();
        let holder = Shareholder::for_replica(replica.id()).unwrap();
        let mine: Vec<_> = shared
            .shares_for(holder)
            .iter()
            .map(|s| scheme.decode_verifiable_share(&s.to_bytes().unwrap()).unwrap())
            .map(|s| scheme.admit(s, 0).unwrap().share().share().clone())
            .collect();
        held.push(mine);
    }

    // Replicas 1 and 3 rebuild it
    let quorum: Vec<Vec<_>> = (0..shared.chunks.len())
        .map(|chunk| vec![held[1][chunk].clone(), held[3][chunk].clone()])
        .collect();
    let rebuilt = dealer
        .combine_bytes(shared.secret_len, shared.chunk_len, &quorum)
        .unwrap();
    assert_eq!(rebuilt, secret);
}

#[test]
fn test_recovery_bundle_is_sealed_per_target() {
    let config = SchemeConfig::simulation(CommitmentKind::Linear);
    let cluster = LocalCluster::new(4, 1, &config).unwrap();
    let scheme = cluster.replicas()[0].scheme();
    let state = RecoveryApplicationState {
        transfer: scheme.share(&BigUint::from(5u8)).unwrap()[0]
            .commitment()
            .clone(),
        common_state: Some(b"common".to_vec()),
        shares: None,
        last_checkpoint_cid: 10,
        last_cid: 12,
        pid: 2,
    };

    let sealed = cluster.replicas()[0].recovery().seal_state(&state).unwrap();
    let opened = cluster.replicas()[2]
        .recovery()
        .open_state(0, &sealed)
        .unwrap();
    assert_eq!(opened, state);
    assert!(cluster.replicas()[3]
        .recovery()
        .open_state(0, &sealed)
        .is_err());

    // No channel to a replica outside the group
    let stranger = RecoveryApplicationState { pid: 9, ..state };
    assert!(matches!(
        cluster.replicas()[0].recovery().seal_state(&stranger),
        Err(VssError::Encryption { peer: 9 })
    ));
}
