//! Proactive recovery on a local cluster

use shroud_core::{interpolate_at, BigUint, CommitmentKind, ConfidentialSnapshot};
use shroud_vss::cluster::LocalCluster;
use shroud_vss::{SchemeConfig, VssError};

const PLAIN_STATE: &[u8] = b"ledger: alice=10, bob=32";

fn secrets() -> Vec<BigUint> {
    vec![
        BigUint::from(0xc0ffee_u32),
        BigUint::from(7u8),
        BigUint::from(u64::MAX),
    ]
}

/// Cluster with three dealt secrets, a checkpoint at 100 and last cid 150
fn prepared_cluster(vss: CommitmentKind) -> LocalCluster {
    let config = SchemeConfig::simulation(vss);
    let mut cluster = LocalCluster::new(4, 1, &config).unwrap();
    cluster.set_plain_state(PLAIN_STATE);
    for secret in secrets() {
        cluster.share_secret(&secret).unwrap();
    }
    cluster.advance(100).unwrap();
    assert_eq!(cluster.cid(), 100);
    cluster.checkpoint();
    cluster.advance(50).unwrap();
    assert_eq!(cluster.cid(), 150);
    cluster
}

fn share_bytes(snapshot: &ConfidentialSnapshot) -> Vec<Vec<u8>> {
    snapshot
        .shares
        .iter()
        .map(|s| s.share().value().to_bytes_be())
        .collect()
}

fn recover_and_check(vss: CommitmentKind) {
    // ==========================================
    // STEP 1: Deal secrets and lose replica 3's state
    // ==========================================
    let mut cluster = prepared_cluster(vss);
    let before: Vec<Vec<Vec<u8>>> = cluster
        .replicas()
        .iter()
        .map(|r| share_bytes(&r.snapshot()))
        .collect();
    cluster.replica(3).unwrap().wipe();

    // ==========================================
    // STEP 2: Recover it
    // ==========================================
    let installed = cluster.recover(3).unwrap();
    assert_eq!(installed.last_checkpoint_cid, 100);
    assert_eq!(installed.last_cid, 150);
    assert_eq!(installed.snapshot.plain, PLAIN_STATE);
    assert_eq!(installed.snapshot.shares.len(), 3);

    // ==========================================
    // STEP 3: Secrets survive, every share changed
    // ==========================================
    for (index, secret) in secrets().iter().enumerate() {
        assert_eq!(&cluster.reconstruct(index).unwrap(), secret);
        assert_eq!(&cluster.reconstruct_from(index, &[0, 3]).unwrap(), secret);
        assert_eq!(&cluster.reconstruct_from(index, &[2, 3]).unwrap(), secret);
    }
    for (replica, old) in cluster.replicas().iter().zip(&before) {
        let snapshot = replica.snapshot();
        for (share, old_bytes) in share_bytes(&snapshot).iter().zip(old) {
            assert_ne!(share, old_bytes, "replica {} kept a share", replica.id());
        }
        for share in &snapshot.shares {
            assert!(replica
                .scheme()
                .check_commitment(share.share(), share.commitment()));
        }
    }
}

#[test]
fn test_recovery_with_linear_commitments() {
    recover_and_check(CommitmentKind::Linear);
}

#[test]
fn test_recovery_with_elliptic_curve_commitments() {
    recover_and_check(CommitmentKind::EllipticCurve);
}

#[test]
fn test_stale_shares_do_not_combine_after_refresh() {
    let mut cluster = prepared_cluster(CommitmentKind::EllipticCurve);
    let stale = cluster.replica(0).unwrap().snapshot();
    cluster.recover(2).unwrap();

    // A pre-refresh share does not combine with refreshed ones
    let fresh = cluster.replica(1).unwrap().snapshot();
    let scheme = cluster.replica(0).unwrap().scheme();
    let mixed = vec![stale.shares[0].share().clone(), fresh.shares[0].share().clone()];
    assert_ne!(scheme.combine(&mixed).unwrap(), secrets()[0]);
}

#[test]
fn test_recovery_needs_homomorphic_commitments() {
    let mut cluster = prepared_cluster(CommitmentKind::Constant);
    assert!(matches!(cluster.recover(1), Err(VssError::Configuration(_))));
}

#[test]
fn test_repeated_recovery() {
    let mut cluster = prepared_cluster(CommitmentKind::Linear);
    cluster.recover(0).unwrap();
    cluster.advance(10).unwrap();
    cluster.recover(3).unwrap();
    for (index, secret) in secrets().iter().enumerate() {
        assert_eq!(&cluster.reconstruct(index).unwrap(), secret);
    }
}

#[test]
fn test_bundles_hide_differences_between_secrets() {
    let mut cluster = prepared_cluster(CommitmentKind::Linear);
    let target = 3;
    cluster.replica(target).unwrap().wipe();
    let states = cluster.prepare_recovery(target).unwrap();
    assert_eq!(states.len(), 3);

    let field = cluster.replica(target).unwrap().scheme().field().unwrap();
    let secrets = secrets();
    let difference = field.sub(&secrets[0], &secrets[1]);

    // Subtracting two blinded shares of one bundle must not cancel the blinding
    let points: Vec<(BigUint, BigUint)> = states
        .iter()
        .map(|state| {
            let shares = state.shares.as_ref().unwrap();
            let (x, first) = shares[0].point();
            let (_, second) = shares[1].point();
            (x, field.sub(&first, &second))
        })
        .collect();
    for i in 0..points.len() {
        for j in i + 1..points.len() {
            let pair = [points[i].clone(), points[j].clone()];
            let leaked = interpolate_at(&field, &pair, &BigUint::from(0u8)).unwrap();
            assert_ne!(leaked, difference);
        }
    }

    // The bundles still rebuild the target's shares
    let installed = cluster.install_recovery(target, &states).unwrap();
    assert_eq!(installed.snapshot.shares.len(), 3);
    for (index, secret) in secrets.iter().enumerate() {
        assert_eq!(&cluster.reconstruct_from(index, &[0, target]).unwrap(), secret);
    }
}
