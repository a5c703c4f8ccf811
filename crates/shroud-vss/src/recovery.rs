//! Proactive recovery and resharing
//!
//! A recovering replica orders a [`RecoveryRequest`]. Every replica then
//! opens a `Recovery` round in which the healthy replicas jointly propose a
//! refresh polynomial `Z` with `Z(0) = 0` and, for every stored secret `k`,
//! a mask `R_k` with `R_k(x_target) = 0`. Healthy replicas refresh each held
//! share by `Z` and hand the target refreshed share `k` blinded by `R_k`.
//! Any `t + 1` blinded shares interpolate to the target's refreshed share
//! at `x_target`. Interpolating at zero yields only noise, for a single
//! secret and for differences between secrets alike.

use std::collections::BTreeMap;
use std::sync::Arc;

use num_bigint::BigUint;
use shroud_core::{
    interpolate_at, Commitment, ConfidentialSnapshot, CurveRegistry, ReplicaId, Share,
    VerifiableShare, WireReader, WireWriter,
};
use tracing::{debug, info, warn};

use crate::dkg::{OrderedLog, PolynomialProposalProtocol, RoundHandle, RoundKind, RoundOutput, RoundRequest};
use crate::error::{Result, VssError};
use crate::scheme::ConfidentialityScheme;

/// Marks a recovery request entry in the log
pub const RECOVERY_MAGIC: &[u8; 4] = b"SHRC";

/// Ordered request of a replica to be brought back up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryRequest {
    pub target: ReplicaId,
    pub last_cid: i32,
}

impl RecoveryRequest {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(12);
        w.write_raw(RECOVERY_MAGIC);
        w.write_len(self.target as usize);
        w.write_i32(self.last_cid);
        w.into_bytes()
    }

    /// `Ok(None)` for entries that are not recovery requests
    pub fn from_bytes(bytes: &[u8]) -> Result<Option<Self>> {
        if !bytes.starts_with(RECOVERY_MAGIC) {
            return Ok(None);
        }
        let mut r = WireReader::new(&bytes[RECOVERY_MAGIC.len()..]);
        let target = r.read_u32()?;
        let last_cid = r.read_i32()?;
        r.finish()?;
        Ok(Some(Self { target, last_cid }))
    }
}

/// Bundle one healthy replica sends the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryApplicationState {
    /// Commitment to the refresh polynomial
    pub transfer: Commitment,
    /// Plain state and pre-refresh commitments, identical on healthy replicas
    pub common_state: Option<Vec<u8>>,
    /// Blinded refreshed shares, in snapshot order
    pub shares: Option<Vec<Share>>,
    pub last_checkpoint_cid: i32,
    pub last_cid: i32,
    pub pid: ReplicaId,
}

impl RecoveryApplicationState {
    pub fn encode(&self, w: &mut WireWriter) -> shroud_core::Result<()> {
        self.transfer.encode(w)?;
        w.write_optional_bytes(self.common_state.as_deref());
        match &self.shares {
            Some(shares) => {
                w.write_len(shares.len());
                for share in shares {
                    share.encode(w);
                }
            }
            None => w.write_i32(shroud_core::wire::ABSENT),
        }
        w.write_i32(self.last_checkpoint_cid);
        w.write_i32(self.last_cid);
        w.write_len(self.pid as usize);
        Ok(())
    }

    pub fn decode(r: &mut WireReader<'_>, curves: &CurveRegistry) -> shroud_core::Result<Self> {
        let transfer = Commitment::decode(r, curves)?;
        let common_state = r.read_optional_bytes()?;
        let shares = match r.read_count(8)? {
            Some(count) => Some(
                (0..count)
                    .map(|_| Share::decode(r))
                    .collect::<shroud_core::Result<Vec<_>>>()?,
            ),
            None => None,
        };
        let last_checkpoint_cid = r.read_i32()?;
        let last_cid = r.read_i32()?;
        let pid = r.read_u32()?;
        if last_checkpoint_cid > last_cid {
            return Err(shroud_core::Error::Serialization(format!(
                "checkpoint {last_checkpoint_cid} after last cid {last_cid}"
            )));
        }
        Ok(Self {
            transfer,
            common_state,
            shares,
            last_checkpoint_cid,
            last_cid,
            pid,
        })
    }

    pub fn to_bytes(&self) -> shroud_core::Result<Vec<u8>> {
        let mut w = WireWriter::new();
        self.encode(&mut w)?;
        Ok(w.into_bytes())
    }

    pub fn from_bytes(bytes: &[u8], curves: &CurveRegistry) -> shroud_core::Result<Self> {
        let mut r = WireReader::new(bytes);
        let state = Self::decode(&mut r, curves)?;
        r.finish()?;
        Ok(state)
    }

    /// Key bundles must agree on to be combined
    fn agreement_key(&self) -> Option<(Vec<u8>, Vec<u8>, i32, i32)> {
        Some((
            self.common_state.clone()?,
            self.transfer.to_bytes().ok()?,
            self.last_checkpoint_cid,
            self.last_cid,
        ))
    }
}

/// What the target ends up with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledState {
    pub snapshot: ConfidentialSnapshot,
    pub last_checkpoint_cid: i32,
    pub last_cid: i32,
}

fn encode_common_state(plain: &[u8], commitments: &[&Commitment]) -> Result<Vec<u8>> {
    let mut w = WireWriter::new();
    w.write_bytes(plain);
    w.write_len(commitments.len());
    for commitment in commitments {
        commitment.encode(&mut w)?;
    }
    Ok(w.into_bytes())
}

fn decode_common_state(bytes: &[u8], curves: &CurveRegistry) -> Result<(Vec<u8>, Vec<Commitment>)> {
    let mut r = WireReader::new(bytes);
    let plain = r.read_bytes()?;
    let count = r.read_count(2)?.unwrap_or(0);
    let commitments = (0..count)
        .map(|_| Commitment::decode(&mut r, curves))
        .collect::<shroud_core::Result<Vec<_>>>()?;
    r.finish()?;
    Ok((plain, commitments))
}

/// Every `k`-subset of `0..n`, in lexicographic order
fn subsets(n: usize, k: usize) -> impl Iterator<Item = Vec<usize>> {
    let mut next = (k <= n).then(|| (0..k).collect::<Vec<_>>());
    std::iter::from_fn(move || {
        let current = next.take()?;
        let mut following = current.clone();
        let mut i = k;
        while i > 0 {
            i -= 1;
            if following[i] < n - k + i {
                following[i] += 1;
                for j in i + 1..k {
                    following[j] = following[j - 1] + 1;
                }
                next = Some(following);
                break;
            }
        }
        Some(current)
    })
}

/// Per-replica driver of recovery requests
pub struct RecoveryCoordinator {
    scheme: Arc<ConfidentialityScheme>,
    protocol: Arc<PolynomialProposalProtocol>,
    log: Arc<dyn OrderedLog>,
}

impl std::fmt::Debug for RecoveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCoordinator")
            .field("replica", &self.scheme.replica())
            .finish()
    }
}

impl RecoveryCoordinator {
    pub fn new(
        scheme: Arc<ConfidentialityScheme>,
        protocol: Arc<PolynomialProposalProtocol>,
        log: Arc<dyn OrderedLog>,
    ) -> Self {
        Self {
            scheme,
            protocol,
            log,
        }
    }

    /// Order a request to recover this replica
    pub fn request_recovery(&self, last_cid: i32) -> Result<RecoveryRequest> {
        let request = RecoveryRequest {
            target: self.scheme.replica(),
            last_cid,
        };
        self.log.submit(request.to_bytes())?;
        info!(recovering = request.target, last_cid, "recovery requested");
        Ok(request)
    }

    /// Open the recovery round for an ordered request
    ///
    /// Called on every replica, the target included, at the request's log
    /// position. Every member except the target contributes, one mask per
    /// stored secret, so healthy replicas must pass the same `secrets`.
    /// The target only consumes the round id and gets `None`.
    pub fn start_recovery(
        &self,
        request: &RecoveryRequest,
        secrets: usize,
    ) -> Result<Option<RoundHandle>> {
        if request.target == self.scheme.replica() {
            self.protocol.reserve_round();
            return Ok(None);
        }
        let contributors = self
            .scheme
            .members()
            .into_iter()
            .filter(|m| *m != request.target)
            .collect();
        let handle = self.protocol.start_round(RoundRequest::new(
            RoundKind::Recovery {
                target: request.target,
                secrets,
            },
            contributors,
        ))?;
        Ok(Some(handle))
    }

    /// Refresh `snapshot` with a completed recovery round and build the
    /// target's bundle
    ///
    /// Returns the refreshed snapshot, which replaces the old one, and the
    /// bundle to deliver to the target.
    pub fn build_state(
        &self,
        output: &RoundOutput,
        snapshot: &ConfidentialSnapshot,
        last_checkpoint_cid: i32,
        last_cid: i32,
    ) -> Result<(ConfidentialSnapshot, RecoveryApplicationState)> {
        let target = match &output.kind {
            RoundKind::Recovery { target, .. } => *target,
            _ => {
                return Err(VssError::Protocol(format!(
                    "round {} is not a recovery round",
                    output.id
                )))
            }
        };
        if last_checkpoint_cid > last_cid {
            return Err(VssError::Protocol(format!(
                "checkpoint {last_checkpoint_cid} after last cid {last_cid}"
            )));
        }
        let Some((refresh, masks)) = output.shares.split_first() else {
            return Err(VssError::Protocol(format!(
                "recovery round {} produced no shares",
                output.id
            )));
        };
        if masks.len() != snapshot.shares.len() {
            return Err(VssError::Protocol(format!(
                "recovery round {} masks {} secrets, snapshot holds {}",
                output.id,
                masks.len(),
                snapshot.shares.len()
            )));
        }
        let local = self.scheme.local_shareholder()?;
        let field = self.scheme.field()?;

        let originals: Vec<&Commitment> = snapshot.shares.iter().map(|s| s.commitment()).collect();
        let common_state = encode_common_state(&snapshot.plain, &originals)?;

        let mut refreshed = Vec::with_capacity(snapshot.shares.len());
        let mut masked = Vec::with_capacity(snapshot.shares.len());
        for (held, mask) in snapshot.shares.iter().zip(masks) {
            if held.shareholder() != local {
                return Err(VssError::Verification {
                    sender: self.scheme.replica(),
                    reason: format!("snapshot holds a share for {}", held.shareholder()),
                });
            }
            let value = field.add(held.share().value(), refresh.share().value());
            let commitment = self
                .scheme
                .sum_commitments(&[held.commitment(), refresh.commitment()])?;
            masked.push(Share::new(local, field.add(&value, mask.share().value())));
            refreshed.push(VerifiableShare::new(Share::new(local, value), commitment));
        }

        debug!(
            round = output.id,
            recovering = target,
            shares = refreshed.len(),
            "shares refreshed for recovery"
        );

        Ok((
            ConfidentialSnapshot::new(snapshot.plain.clone(), refreshed),
            RecoveryApplicationState {
                transfer: refresh.commitment().clone(),
                common_state: Some(common_state),
                shares: Some(masked),
                last_checkpoint_cid,
                last_cid,
                pid: target,
            },
        ))
    }

    /// Encrypt a bundle for its target
    pub fn seal_state(&self, state: &RecoveryApplicationState) -> Result<Vec<u8>> {
        let bytes = state.to_bytes()?;
        self.scheme
            .encrypt_data_for(state.pid, &bytes)
            .ok_or(VssError::Encryption { peer: state.pid })
    }

    /// Decrypt and decode a bundle received from `from`
    pub fn open_state(&self, from: ReplicaId, sealed: &[u8]) -> Result<RecoveryApplicationState> {
        let bytes = self
            .scheme
            .decrypt_data(from, sealed)
            .ok_or(VssError::Decryption { peer: from })?;
        let state = RecoveryApplicationState::from_bytes(&bytes, &self.scheme.curve_registry())?;
        if state.pid != self.scheme.replica() {
            return Err(VssError::Verification {
                sender: from,
                reason: format!("bundle addressed to replica {}", state.pid),
            });
        }
        Ok(state)
    }

    /// Rebuild this replica's shares from agreeing bundles
    pub fn install(&self, states: &[RecoveryApplicationState]) -> Result<InstalledState> {
        let needed = self.scheme.threshold() + 1;
        let local = self.scheme.local_shareholder()?;
        let x = local.to_field_element();
        let field = self.scheme.field()?;
        let curves = self.scheme.curve_registry();

        let mut groups: BTreeMap<(Vec<u8>, Vec<u8>, i32, i32), Vec<&RecoveryApplicationState>> =
            BTreeMap::new();
        for state in states.iter().filter(|s| s.pid == self.scheme.replica()) {
            if let Some(key) = state.agreement_key() {
                groups.entry(key).or_default().push(state);
            }
        }
        let Some((key, group)) = groups.into_iter().max_by_key(|(_, group)| group.len()) else {
            return Err(VssError::InsufficientRecoveryStates { needed, got: 0 });
        };
        if group.len() < needed {
            return Err(VssError::InsufficientRecoveryStates {
                needed,
                got: group.len(),
            });
        }
        let (plain, originals) = decode_common_state(&key.0, &curves)?;
        let transfer = &group[0].transfer;

        let usable: Vec<&Vec<Share>> = group
            .iter()
            .filter_map(|state| state.shares.as_ref())
            .filter(|shares| shares.len() == originals.len())
            .collect();
        if usable.len() < needed {
            return Err(VssError::InsufficientRecoveryStates {
                needed,
                got: usable.len(),
            });
        }

        let mut recovered = Vec::with_capacity(originals.len());
        for (index, original) in originals.iter().enumerate() {
            let commitment = self.scheme.sum_commitments(&[original, transfer])?;
            let points: Vec<(BigUint, BigUint)> = usable
                .iter()
                .map(|shares| shares[index].point())
                .collect();
            let found = subsets(points.len(), needed).find_map(|subset| {
                let chosen: Vec<(BigUint, BigUint)> =
                    subset.iter().map(|i| points[*i].clone()).collect();
                let value = interpolate_at(&field, &chosen, &x).ok()?;
                let share = Share::new(local, value);
                self.scheme
                    .check_commitment(&share, &commitment)
                    .then(|| VerifiableShare::new(share, commitment.clone()))
            });
            match found {
                Some(share) => recovered.push(share),
                None => {
                    warn!(index, "no agreeing subset rebuilds the share");
                    return Err(VssError::Verification {
                        sender: self.scheme.replica(),
                        reason: format!("share {index} could not be rebuilt"),
                    });
                }
            }
        }

        info!(
            shares = recovered.len(),
            last_cid = key.3,
            "recovered state installed"
        );
        Ok(InstalledState {
            snapshot: ConfidentialSnapshot::new(plain, recovered),
            last_checkpoint_cid: key.2,
            last_cid: key.3,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_core::curve::constants;
    use shroud_core::{LinearCommitment, Shareholder};

    #[test]
    fn test_request_round_trip() {
        let request = RecoveryRequest {
            target: 3,
            last_cid: 150,
        };
        let bytes = request.to_bytes();
        assert_eq!(RecoveryRequest::from_bytes(&bytes).unwrap(), Some(request));
        assert_eq!(RecoveryRequest::from_bytes(b"SHRD....").unwrap(), None);
        assert!(RecoveryRequest::from_bytes(&bytes[..9]).is_err());
    }

    fn sample_state() -> RecoveryApplicationState {
        RecoveryApplicationState {
            transfer: Commitment::Linear(LinearCommitment::new(vec![
                BigUint::from(4u8),
                BigUint::from(1u8),
            ])),
            common_state: Some(encode_common_state(b"plain", &[]).unwrap()),
            shares: Some(vec![Share::new(Shareholder::new(2).unwrap(), BigUint::from(99u8))]),
            last_checkpoint_cid: 100,
            last_cid: 150,
            pid: 3,
        }
    }

    #[test]
    fn test_state_round_trip() {
        let curves = CurveRegistry::with_builtin(constants::SECP256R1).unwrap();
        let state = sample_state();
        let bytes = state.to_bytes().unwrap();
        assert_eq!(RecoveryApplicationState::from_bytes(&bytes, &curves).unwrap(), state);

        let mut absent = sample_state();
        absent.common_state = None;
        absent.shares = None;
        let bytes = absent.to_bytes().unwrap();
        assert_eq!(RecoveryApplicationState::from_bytes(&bytes, &curves).unwrap(), absent);
    }

    #[test]
    fn test_state_rejects_inverted_cids() {
        let curves = CurveRegistry::with_builtin(constants::SECP256R1).unwrap();
        let mut state = sample_state();
        state.last_checkpoint_cid = 200;
        let bytes = state.to_bytes().unwrap();
        assert!(RecoveryApplicationState::from_bytes(&bytes, &curves).is_err());
    }

    #[test]
    fn test_common_state_round_trip() {
        let curves = CurveRegistry::with_builtin(constants::SECP256R1).unwrap();
        let commitment = sample_state().transfer;
        let bytes = encode_common_state(b"app", &[&commitment, &commitment]).unwrap();
        let (plain, commitments) = decode_common_state(&bytes, &curves).unwrap();
        assert_eq!(plain, b"app");
        assert_eq!(commitments, vec![commitment.clone(), commitment]);
    }

    #[test]
    fn test_subsets() {
        let all: Vec<Vec<usize>> = subsets(4, 2).collect();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], vec![0, 1]);
        assert_eq!(all[5], vec![2, 3]);
        assert_eq!(subsets(3, 3).count(), 1);
        assert_eq!(subsets(2, 3).count(), 0);
    }
}
