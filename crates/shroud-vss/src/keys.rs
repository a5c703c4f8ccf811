//! Key material consumed by the scheme
//!
//! Key storage belongs to the host. The scheme only asks a
//! [`KeyDirectory`] for the pairwise channel key of a peer, its own signing
//! key and the peers' verifying keys.

use std::collections::BTreeMap;

use k256::ecdsa::{SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use shroud_core::ReplicaId;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, VssError};

/// 256-bit symmetric key shared by two replicas
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ChannelKey([u8; 32]);

impl ChannelKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChannelKey([REDACTED])")
    }
}

/// Source of channel, signing and verifying keys
pub trait KeyDirectory: Send + Sync {
    /// The replica these keys belong to
    fn local_replica(&self) -> ReplicaId;

    /// Symmetric key for traffic between this replica and `peer`
    fn channel_key(&self, peer: ReplicaId) -> Option<ChannelKey>;

    /// This replica's proposal signing key
    fn signing_key(&self) -> &SigningKey;

    /// Verifying key of any member, this replica included
    fn verifying_key(&self, replica: ReplicaId) -> Option<VerifyingKey>;
}

/// Keys derived deterministically from a seed every member knows
///
/// Suitable for tests and local simulation only: anyone holding the seed
/// holds every key.
pub struct StaticKeyDirectory {
    local: ReplicaId,
    seed: Vec<u8>,
    signing: SigningKey,
    verifying: BTreeMap<ReplicaId, VerifyingKey>,
}

impl std::fmt::Debug for StaticKeyDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKeyDirectory")
            .field("local", &self.local)
            .field("members", &self.verifying.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Drop for StaticKeyDirectory {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

fn derive_signing_key(seed: &[u8], replica: ReplicaId) -> Result<SigningKey> {
    for counter in 0u32..16 {
        let digest = Sha256::new()
            .chain_update(b"shroud/signing")
            .chain_update(seed)
            .chain_update(replica.to_be_bytes())
            .chain_update(counter.to_be_bytes())
            .finalize();
        if let Ok(key) = SigningKey::from_slice(&digest) {
            return Ok(key);
        }
    }
    Err(VssError::Signing(format!(
        "could not derive a signing key for replica {replica}"
    )))
}

impl StaticKeyDirectory {
    pub fn new(seed: &[u8], local: ReplicaId, members: &[ReplicaId]) -> Result<Self> {
        if !members.contains(&local) {
            return Err(VssError::Configuration(format!(
                "replica {local} is not a member"
            )));
        }
        let mut verifying = BTreeMap::new();
        for &member in members {
            let key = derive_signing_key(seed, member)?;
            verifying.insert(member, *key.verifying_key());
        }
        Ok(Self {
            local,
            seed: seed.to_vec(),
            signing: derive_signing_key(seed, local)?,
            verifying,
        })
    }
}

impl KeyDirectory for StaticKeyDirectory {
    fn local_replica(&self) -> ReplicaId {
        self.local
    }

    fn channel_key(&self, peer: ReplicaId) -> Option<ChannelKey> {
        if !self.verifying.contains_key(&peer) {
            return None;
        }
        let (low, high) = if self.local <= peer {
            (self.local, peer)
        } else {
            (peer, self.local)
        };
        let digest = Sha256::new()
            .chain_update(b"shroud/channel")
            .chain_update(&self.seed)
            .chain_update(low.to_be_bytes())
            .chain_update(high.to_be_bytes())
            .finalize();
        Some(ChannelKey(digest.into()))
    }

    fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    fn verifying_key(&self, replica: ReplicaId) -> Option<VerifyingKey> {
        self.verifying.get(&replica).copied()
    }
}
