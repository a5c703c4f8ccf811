//! The confidentiality scheme
//!
//! Turns secrets into verifiable shares for the current membership,
//! verifies and combines shares, and protects share payloads in transit.
//! Membership and the curve registry sit behind one fair lock; the cipher
//! keeps its own lock so encryption never waits on registry readers.

use std::sync::Arc;

use num_bigint::BigUint;
use parking_lot::FairMutex;
use rand::{thread_rng, CryptoRng, RngCore};
use shroud_core::curve::constants;
use shroud_core::{
    interpolate_at, Commitment, CommitmentAlgebra, CommitmentKind, ConfidentialData,
    ConstantScheme, CurveParameters, CurveRegistry, EllipticCurve, Field, LinearScheme, Polynomial,
    ReplicaId, Share, Shareholder, VerifiableShare,
};
use tracing::{debug, info, warn};

use crate::channel::SecureChannel;
use crate::config::SchemeConfig;
use crate::directory::ShareholderDirectory;
use crate::error::{Result, VssError};
use crate::keys::KeyDirectory;
use crate::messages::{Envelope, ProposalMessage};

/// How [`ConfidentialityScheme::share_bytes`] treats secrets wider than a
/// field element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingMode {
    /// The whole secret is one field element; oversize secrets are rejected
    Single,
    /// The secret is cut into chunks, each shared with its own polynomial
    LargeSecret,
}

/// Shares of a byte-string secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedBytes {
    /// Length of the original secret
    pub secret_len: usize,
    /// Bytes per chunk; the last chunk may be shorter
    pub chunk_len: usize,
    /// `chunks[i]` holds one share per shareholder for chunk `i`
    pub chunks: Vec<Vec<VerifiableShare>>,
}

impl SharedBytes {
    /// Every chunk share addressed to `shareholder`, in chunk order
    pub fn shares_for(&self, shareholder: Shareholder) -> Vec<VerifiableShare> {
        self.chunks
            .iter()
            .filter_map(|chunk| {
                chunk
                    .iter()
                    .find(|s| s.shareholder() == shareholder)
                    .cloned()
            })
            .collect()
    }
}

struct SchemeState {
    directory: ShareholderDirectory,
    curves: CurveRegistry,
}

/// Per-replica confidentiality scheme
pub struct ConfidentialityScheme {
    replica: ReplicaId,
    threshold: usize,
    config: SchemeConfig,
    scheme_id: String,
    linear: Option<Arc<LinearScheme>>,
    state: FairMutex<SchemeState>,
    channel: SecureChannel,
    keys: Arc<dyn KeyDirectory>,
}

impl std::fmt::Debug for ConfidentialityScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfidentialityScheme")
            .field("replica", &self.replica)
            .field("threshold", &self.threshold)
            .field("vss", &self.config.vss)
            .field("scheme_id", &self.scheme_id)
            .finish()
    }
}

impl ConfidentialityScheme {
    /// Build the scheme for the local replica of `keys`
    ///
    /// `threshold` is `f`: any `f + 1` shares reconstruct, `f` reveal
    /// nothing. Membership must hold at least `2f + 1` replicas.
    pub fn new(
        config: &SchemeConfig,
        members: &[ReplicaId],
        threshold: usize,
        keys: Arc<dyn KeyDirectory>,
    ) -> Result<Self> {
        config.validate()?;
        let replica = keys.local_replica();
        if threshold == 0 || members.len() < 2 * threshold + 1 {
            return Err(VssError::Configuration(format!(
                "threshold {threshold} needs at least {} members, got {}",
                2 * threshold + 1,
                members.len()
            )));
        }
        if !members.contains(&replica) {
            return Err(VssError::Configuration(format!(
                "local replica {replica} is not a member"
            )));
        }
        if let Some(missing) = members.iter().find(|m| keys.verifying_key(**m).is_none()) {
            return Err(VssError::Configuration(format!(
                "no verifying key for replica {missing}"
            )));
        }

        let directory = ShareholderDirectory::from_members(members)?;

        let mut curves = CurveRegistry::new(constants::secp256r1())
            .map_err(|e| VssError::Configuration(e.to_string()))?;
        for params in constants::builtin()
            .into_iter()
            .chain(config.extra_curves.iter().cloned())
        {
            curves
                .register(params)
                .map_err(|e| VssError::Configuration(e.to_string()))?;
        }
        if !curves.set_current(&config.curve) {
            return Err(VssError::Configuration(format!(
                "unsupported curve {}",
                config.curve
            )));
        }

        let linear = match config.vss {
            CommitmentKind::Linear => Some(Arc::new(
                LinearScheme::new(&config.linear)
                    .map_err(|e| VssError::Configuration(e.to_string()))?,
            )),
            _ => None,
        };

        info!(
            replica,
            threshold,
            members = members.len(),
            vss = %config.vss,
            curve = %config.curve,
            "confidentiality scheme ready"
        );

        Ok(Self {
            replica,
            threshold,
            scheme_id: config.curve.clone(),
            config: config.clone(),
            linear,
            state: FairMutex::new(SchemeState { directory, curves }),
            channel: SecureChannel::new(replica),
            keys,
        })
    }

    pub fn replica(&self) -> ReplicaId {
        self.replica
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn config(&self) -> &SchemeConfig {
        &self.config
    }

    /// Identifier stamped on every log entry, the startup curve name
    pub fn scheme_id(&self) -> &str {
        &self.scheme_id
    }

    pub fn vss_kind(&self) -> CommitmentKind {
        self.config.vss
    }

    pub fn is_linear_commitment_scheme(&self) -> bool {
        self.config.vss == CommitmentKind::Linear
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    pub fn shareholder(&self, replica: ReplicaId) -> Option<Shareholder> {
        self.state.lock().directory.shareholder(replica)
    }

    pub fn local_shareholder(&self) -> Result<Shareholder> {
        self.shareholder(self.replica)
            .ok_or(VssError::UnknownReplica(self.replica))
    }

    pub fn replica_of(&self, shareholder: Shareholder) -> Option<ReplicaId> {
        self.state.lock().directory.replica(shareholder)
    }

    pub fn members(&self) -> Vec<ReplicaId> {
        self.state.lock().directory.replicas()
    }

    pub fn shareholders(&self) -> Vec<Shareholder> {
        self.state.lock().directory.shareholders()
    }

    /// Grow the membership by one replica
    pub fn add_shareholder(&self, replica: ReplicaId, shareholder: Shareholder) -> Result<()> {
        self.state.lock().directory.add(replica, shareholder)?;
        info!(replica, %shareholder, "shareholder added");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Curves
    // ------------------------------------------------------------------

    pub fn register_elliptic_curve(&self, params: CurveParameters) -> Result<()> {
        let name = params.name.clone();
        self.state.lock().curves.register(params)?;
        info!(curve = %name, "elliptic curve registered");
        Ok(())
    }

    /// Select the current curve; `false` if it was never registered
    pub fn set_current_elliptic_curve(&self, name: &str) -> bool {
        let switched = self.state.lock().curves.set_current(name);
        if switched {
            info!(curve = name, "current elliptic curve switched");
        }
        switched
    }

    pub fn current_elliptic_curve(&self) -> Arc<EllipticCurve> {
        self.state.lock().curves.current()
    }

    pub fn elliptic_curve(&self, name: &str) -> Option<Arc<EllipticCurve>> {
        self.state.lock().curves.get(name)
    }

    pub fn curve_names(&self) -> Vec<String> {
        self.state.lock().curves.names()
    }

    // ------------------------------------------------------------------
    // Algebra
    // ------------------------------------------------------------------

    /// The configured family, on the current curve where one applies
    pub fn algebra(&self) -> Result<CommitmentAlgebra> {
        self.algebra_for(self.config.vss, None)
    }

    /// A family on an explicit curve, or the current one
    pub fn algebra_for(&self, kind: CommitmentKind, curve: Option<&str>) -> Result<CommitmentAlgebra> {
        let resolve_curve = || -> Result<Arc<EllipticCurve>> {
            let state = self.state.lock();
            match curve {
                Some(name) => Ok(state.curves.require(name)?),
                None => Ok(state.curves.current()),
            }
        };
        match kind {
            CommitmentKind::Linear => self
                .linear
                .clone()
                .map(CommitmentAlgebra::Linear)
                .ok_or_else(|| {
                    VssError::Configuration("linear commitments are not configured".into())
                }),
            CommitmentKind::EllipticCurve => Ok(CommitmentAlgebra::EllipticCurve(resolve_curve()?)),
            CommitmentKind::Constant => Ok(CommitmentAlgebra::Constant(ConstantScheme::new(
                resolve_curve()?.scalar_field().clone(),
            ))),
        }
    }

    /// Field in which sharings of the configured family live
    pub fn field(&self) -> Result<Field> {
        Ok(self.algebra()?.field().clone())
    }

    fn algebra_of(&self, commitment: &Commitment) -> Option<CommitmentAlgebra> {
        match commitment {
            Commitment::Linear(_) => self.linear.clone().map(CommitmentAlgebra::Linear),
            Commitment::EllipticCurve(c) => {
                Some(CommitmentAlgebra::EllipticCurve(Arc::clone(c.curve())))
            }
            Commitment::Constant(_) => self
                .algebra_for(CommitmentKind::Constant, None)
                .ok(),
        }
    }

    // ------------------------------------------------------------------
    // Sharing
    // ------------------------------------------------------------------

    /// Share `secret` among the current membership
    ///
    /// Returns one share per shareholder in ascending shareholder order.
    pub fn share(&self, secret: &BigUint) -> Result<Vec<VerifiableShare>> {
        self.share_with_rng(secret, &mut thread_rng())
    }

    pub fn share_with_rng<R: RngCore + CryptoRng + ?Sized>(
        &self,
        secret: &BigUint,
        rng: &mut R,
    ) -> Result<Vec<VerifiableShare>> {
        let algebra = self.algebra()?;
        if !algebra.field().contains(secret) {
            return Err(shroud_core::Error::SecretTooLarge(format!(
                "{} bits for a {}-bit field",
                secret.bits(),
                algebra.field().bits()
            ))
            .into());
        }
        let holders = self.shareholders();
        let polynomial = Polynomial::random(algebra.field(), self.threshold, secret, rng);
        let commitment = algebra.generate(&polynomial, &holders, rng)?;

        debug!(
            holders = holders.len(),
            vss = %algebra.kind(),
            "secret shared"
        );

        Ok(holders
            .iter()
            .map(|holder| {
                let value = polynomial.evaluate(&holder.to_field_element());
                let commitment = match &commitment {
                    Commitment::Constant(c) => Commitment::Constant(c.for_shareholder(*holder)),
                    other => other.clone(),
                };
                VerifiableShare::new(Share::new(*holder, value), commitment)
            })
            .collect())
    }

    /// Share a byte string
    pub fn share_bytes(&self, secret: &[u8], mode: SharingMode) -> Result<SharedBytes> {
        let field = self.field()?;
        let chunk_len = ((field.bits() - 1) / 8) as usize;
        match mode {
            SharingMode::Single => {
                let value = BigUint::from_bytes_be(secret);
                if !field.contains(&value) {
                    return Err(shroud_core::Error::SecretTooLarge(format!(
                        "{} bytes do not fit one field element",
                        secret.len()
                    ))
                    .into());
                }
                Ok(SharedBytes {
                    secret_len: secret.len(),
                    chunk_len: secret.len(),
                    chunks: vec![self.share(&value)?],
                })
            }
            SharingMode::LargeSecret => {
                if chunk_len == 0 {
                    return Err(VssError::Configuration("field too small to hold bytes".into()));
                }
                let mut chunks = Vec::with_capacity(secret.len().div_ceil(chunk_len).max(1));
                if secret.is_empty() {
                    chunks.push(self.share(&BigUint::default())?);
                }
                for chunk in secret.chunks(chunk_len) {
                    chunks.push(self.share(&BigUint::from_bytes_be(chunk))?);
                }
                Ok(SharedBytes {
                    secret_len: secret.len(),
                    chunk_len,
                    chunks,
                })
            }
        }
    }

    /// Lagrange interpolation at zero over the first `t + 1` distinct shares
    pub fn combine(&self, shares: &[Share]) -> Result<BigUint> {
        let field = self.field()?;
        self.combine_in(&field, shares)
    }

    fn combine_in(&self, field: &Field, shares: &[Share]) -> Result<BigUint> {
        let needed = self.threshold + 1;
        let mut points = Vec::with_capacity(needed);
        for share in shares {
            if points.len() == needed {
                break;
            }
            let x = share.shareholder().to_field_element();
            if points.iter().all(|(px, _)| px != &x) {
                points.push((x, share.value().clone()));
            }
        }
        if points.len() < needed {
            return Err(shroud_core::Error::NotEnoughShares {
                needed,
                got: points.len(),
            }
            .into());
        }
        Ok(interpolate_at(field, &points, &BigUint::default())?)
    }

    /// Combine only the shares that verify against their commitments
    ///
    /// Interpolates in the field of the first valid commitment, so shares
    /// dealt on an earlier current curve still combine. Valid shares beyond
    /// the first `t + 1` must lie on the polynomial those define; constant
    /// commitments bind each value but not the degree.
    pub fn combine_verified(&self, shares: &[VerifiableShare]) -> Result<BigUint> {
        let valid: Vec<&VerifiableShare> = shares
            .iter()
            .filter(|s| self.check_commitment(s.share(), s.commitment()))
            .collect();
        if valid.len() < shares.len() {
            warn!(
                rejected = shares.len() - valid.len(),
                "discarded shares failing verification"
            );
        }
        let field = match valid.first().and_then(|s| self.algebra_of(s.commitment())) {
            Some(algebra) => algebra.field().clone(),
            None => self.field()?,
        };
        let valid: Vec<Share> = valid.into_iter().map(|s| s.share().clone()).collect();
        self.check_consistency(&field, &valid)?;
        self.combine_in(&field, &valid)
    }

    fn check_consistency(&self, field: &Field, shares: &[Share]) -> Result<()> {
        let mut points: Vec<(BigUint, BigUint)> = Vec::with_capacity(shares.len());
        let mut holders = Vec::with_capacity(shares.len());
        for share in shares {
            let x = share.shareholder().to_field_element();
            if points.iter().all(|(px, _)| px != &x) {
                points.push((x, share.value().clone()));
                holders.push(share.shareholder());
            }
        }
        let needed = self.threshold + 1;
        if points.len() <= needed {
            return Ok(());
        }
        let (basis, rest) = points.split_at(needed);
        for ((x, y), holder) in rest.iter().zip(&holders[needed..]) {
            if &interpolate_at(field, basis, x)? != y {
                warn!(shareholder = holder.id(), "share off the dealt polynomial");
                return Err(VssError::InconsistentShares {
                    shareholder: holder.id(),
                });
            }
        }
        Ok(())
    }

    /// Rebuild a byte-string secret from per-chunk shares
    pub fn combine_bytes(
        &self,
        secret_len: usize,
        chunk_len: usize,
        chunks: &[Vec<Share>],
    ) -> Result<Vec<u8>> {
        let field = self.field()?;
        let mut out = Vec::with_capacity(secret_len);
        for (i, chunk) in chunks.iter().enumerate() {
            let value = self.combine_in(&field, chunk)?;
            let expected = chunk_len.min(secret_len.saturating_sub(i * chunk_len));
            let raw = value.to_bytes_be();
            let raw = if value == BigUint::default() { Vec::new() } else { raw };
            if raw.len() > expected {
                return Err(shroud_core::Error::Serialization(format!(
                    "chunk {i} decodes to {} bytes, expected {expected}",
                    raw.len()
                ))
                .into());
            }
            out.resize(out.len() + expected - raw.len(), 0);
            out.extend_from_slice(&raw);
        }
        if out.len() != secret_len {
            return Err(shroud_core::Error::Serialization(format!(
                "rebuilt {} bytes, expected {secret_len}",
                out.len()
            ))
            .into());
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Verification
    // ------------------------------------------------------------------

    /// Whether `share` is consistent with `commitment`
    ///
    /// A failing share must be rejected by the caller; see [`Self::admit`].
    pub fn check_commitment(&self, share: &Share, commitment: &Commitment) -> bool {
        match self.algebra_of(commitment) {
            Some(algebra) => algebra.verify(share, commitment),
            None => false,
        }
    }

    /// Verify a share `dealer` addressed to this replica and wrap it for
    /// storage
    pub fn admit(&self, share: VerifiableShare, dealer: ReplicaId) -> Result<ConfidentialData> {
        let local = self.local_shareholder()?;
        if share.shareholder() != local {
            return Err(VssError::Verification {
                sender: dealer,
                reason: format!("share addressed to shareholder {}", share.shareholder()),
            });
        }
        if !self.check_commitment(share.share(), share.commitment()) {
            warn!(replica = self.replica, dealer, "rejected share failing its commitment");
            return Err(VssError::Verification {
                sender: dealer,
                reason: "share does not match commitment".into(),
            });
        }
        Ok(ConfidentialData::new(share))
    }

    /// Homomorphic sum of commitments of one family
    pub fn sum_commitments(&self, commitments: &[&Commitment]) -> Result<Commitment> {
        let first = commitments
            .first()
            .ok_or_else(|| shroud_core::Error::IncompatibleCommitments("nothing to sum".into()))?;
        let algebra = self.algebra_of(first).ok_or_else(|| {
            VssError::Configuration(format!("{} commitments are not configured", first.kind()))
        })?;
        Ok(algebra.sum(commitments)?)
    }

    // ------------------------------------------------------------------
    // Channel
    // ------------------------------------------------------------------

    /// Encrypt a share value for `peer`; `None` when encryption fails
    pub fn encrypt_share_for(&self, peer: ReplicaId, value: &BigUint) -> Option<Vec<u8>> {
        self.encrypt_data_for(peer, &value.to_bytes_be())
    }

    /// Decrypt a share value exchanged with `peer`
    pub fn decrypt_share_for(&self, peer: ReplicaId, sealed: &[u8]) -> Result<BigUint> {
        let key = self
            .keys
            .channel_key(peer)
            .ok_or(VssError::UnknownReplica(peer))?;
        let plain = self.channel.open(&key, peer, sealed)?;
        Ok(BigUint::from_bytes_be(&plain))
    }

    /// Encrypt arbitrary bytes for `peer`; `None` when encryption fails
    pub fn encrypt_data_for(&self, peer: ReplicaId, data: &[u8]) -> Option<Vec<u8>> {
        let Some(key) = self.keys.channel_key(peer) else {
            warn!(peer, "no channel key for peer");
            return None;
        };
        match self.channel.seal(&key, peer, data) {
            Ok(sealed) => Some(sealed),
            Err(e) => {
                warn!(peer, error = %e, "encryption failed");
                None
            }
        }
    }

    /// Decrypt bytes `peer` sealed for this replica; `None` on failure
    pub fn decrypt_data(&self, peer: ReplicaId, sealed: &[u8]) -> Option<Vec<u8>> {
        let key = self.keys.channel_key(peer)?;
        self.channel.open(&key, peer, sealed).ok()
    }

    // ------------------------------------------------------------------
    // Proposal signatures and wire codec
    // ------------------------------------------------------------------

    pub fn sign_proposal(&self, message: &mut ProposalMessage) -> Result<()> {
        message.sign(self.keys.signing_key())
    }

    /// Check `message` was signed by its claimed sender
    pub fn verify_proposal(&self, message: &ProposalMessage) -> bool {
        self.keys
            .verifying_key(message.sender)
            .is_some_and(|key| message.verify_signature(&key))
    }

    pub fn serialize_envelope(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        envelope.to_bytes()
    }

    /// `Ok(None)` for entries that do not belong to this crate
    pub fn deserialize_envelope(&self, bytes: &[u8]) -> Result<Option<Envelope>> {
        let curves = self.state.lock().curves.clone();
        Envelope::from_bytes(bytes, &curves)
    }

    pub fn decode_commitment(&self, bytes: &[u8]) -> Result<Commitment> {
        let curves = self.state.lock().curves.clone();
        Ok(Commitment::from_bytes(bytes, &curves)?)
    }

    pub fn decode_verifiable_share(&self, bytes: &[u8]) -> Result<VerifiableShare> {
        let curves = self.state.lock().curves.clone();
        Ok(VerifiableShare::from_bytes(bytes, &curves)?)
    }

    pub fn decode_confidential_data(&self, bytes: &[u8]) -> Result<ConfidentialData> {
        let curves = self.state.lock().curves.clone();
        Ok(ConfidentialData::from_bytes(bytes, &curves)?)
    }

    /// Snapshot of the registry for decoders that run many reads
    pub fn curve_registry(&self) -> CurveRegistry {
        self.state.lock().curves.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::StaticKeyDirectory;

    const MEMBERS: [ReplicaId; 4] = [0, 1, 2, 3];

    fn scheme_for(replica: ReplicaId, config: &SchemeConfig) -> ConfidentialityScheme {
        let keys = Arc::new(StaticKeyDirectory::new(b"scheme-tests", replica, &MEMBERS).unwrap());
        ConfidentialityScheme::new(config, &MEMBERS, 1, keys).unwrap()
    }

    fn configs() -> Vec<SchemeConfig> {
        vec![
            SchemeConfig::simulation(CommitmentKind::Linear),
            SchemeConfig::simulation(CommitmentKind::EllipticCurve),
            SchemeConfig::simulation(CommitmentKind::Constant),
        ]
    }

    #[test]
    fn test_share_and_combine_every_family() {
        for config in configs() {
            let scheme = scheme_for(0, &config);
            let secret = BigUint::from(0xdead_beefu32);
            let shares = scheme.share(&secret).unwrap();
            assert_eq!(shares.len(), 4);
            for share in &shares {
                assert!(scheme.check_commitment(share.share(), share.commitment()));
            }

            let pair: Vec<Share> = shares[2..].iter().map(|s| s.share().clone()).collect();
            assert_eq!(scheme.combine(&pair).unwrap(), secret);

            let single = vec![shares[0].share().clone()];
            assert!(matches!(
                scheme.combine(&single),
                Err(VssError::Core(shroud_core::Error::NotEnoughShares { needed: 2, got: 1 }))
            ));
        }
    }

    #[test]
    fn test_admit_rejects_foreign_or_forged_shares() {
        let config = SchemeConfig::simulation(CommitmentKind::EllipticCurve);
        let dealer = scheme_for(0, &config);
        let receiver = scheme_for(1, &config);
        let shares = dealer.share(&BigUint::from(5u8)).unwrap();

        assert!(receiver.admit(shares[1].clone(), 0).is_ok());
        assert!(matches!(
            receiver.admit(shares[2].clone(), 0),
            Err(VssError::Verification { sender: 0, .. })
        ));

        let forged = VerifiableShare::new(
            Share::new(shares[1].shareholder(), shares[1].share().value() + 1u8),
            shares[1].commitment().clone(),
        );
        // The dealer is blamed, not the receiving replica
        assert!(matches!(
            receiver.admit(forged, 0),
            Err(VssError::Verification { sender: 0, .. })
        ));
    }

    #[test]
    fn test_constant_commitments_leave_degree_to_combine() {
        let scheme = scheme_for(0, &SchemeConfig::simulation(CommitmentKind::Constant));
        let field = scheme.field().unwrap();
        let holders = scheme.shareholders();
        let mut rng = thread_rng();

        // Degree 3 where t = 1
        let polynomial = Polynomial::random(&field, 3, &BigUint::from(42u8), &mut rng);
        let commitment = scheme
            .algebra()
            .unwrap()
            .generate(&polynomial, &holders, &mut rng)
            .unwrap();
        let shares: Vec<VerifiableShare> = holders
            .iter()
            .map(|h| {
                let value = polynomial.evaluate(&h.to_field_element());
                VerifiableShare::new(Share::new(*h, value), commitment.clone())
            })
            .collect();

        // Every share passes on its own, yet pairs disagree
        for share in &shares {
            assert!(scheme.check_commitment(share.share(), share.commitment()));
        }
        let low: Vec<Share> = shares[..2].iter().map(|s| s.share().clone()).collect();
        let high: Vec<Share> = shares[2..].iter().map(|s| s.share().clone()).collect();
        assert_ne!(scheme.combine(&low).unwrap(), scheme.combine(&high).unwrap());

        assert!(matches!(
            scheme.combine_verified(&shares),
            Err(VssError::InconsistentShares { shareholder: 3 })
        ));
        // A bare quorum has nothing to cross-check against
        assert!(scheme.combine_verified(&shares[..2]).is_ok());

        let honest = scheme.share(&BigUint::from(42u8)).unwrap();
        assert_eq!(scheme.combine_verified(&honest).unwrap(), BigUint::from(42u8));
    }

    #[test]
    fn test_share_bytes_large_secret() {
        let scheme = scheme_for(0, &SchemeConfig::simulation(CommitmentKind::EllipticCurve));
        let secret: Vec<u8> = (0..100u8).collect();
        assert!(scheme.share_bytes(&secret, SharingMode::Single).is_err());

        let shared = scheme.share_bytes(&secret, SharingMode::LargeSecret).unwrap();
        assert_eq!(shared.chunks.len(), 4);
        let chunks: Vec<Vec<Share>> = shared
            .chunks
            .iter()
            .map(|chunk| chunk[1..3].iter().map(|s| s.share().clone()).collect())
            .collect();
        let rebuilt = scheme
            .combine_bytes(shared.secret_len, shared.chunk_len, &chunks)
            .unwrap();
        assert_eq!(rebuilt, secret);
        assert_eq!(shared.shares_for(Shareholder::new(2).unwrap()).len(), 4);
    }

    #[test]
    fn test_share_bytes_keeps_leading_zeros() {
        let scheme = scheme_for(0, &SchemeConfig::simulation(CommitmentKind::Linear));
        let secret = [0u8, 0, 7, 0];
        let shared = scheme.share_bytes(&secret, SharingMode::Single).unwrap();
        let chunks = vec![shared.chunks[0][..2]
            .iter()
            .map(|s| s.share().clone())
            .collect()];
        assert_eq!(
            scheme.combine_bytes(4, shared.chunk_len, &chunks).unwrap(),
            secret
        );
    }

    #[test]
    fn test_share_encryption_between_replicas() {
        let config = SchemeConfig::simulation(CommitmentKind::EllipticCurve);
        let alice = scheme_for(0, &config);
        let bob = scheme_for(1, &config);
        let value = BigUint::from(123_456_789u64);
        let sealed = alice.encrypt_share_for(1, &value).unwrap();
        assert_eq!(bob.decrypt_share_for(0, &sealed).unwrap(), value);
        assert!(matches!(
            bob.decrypt_share_for(2, &sealed),
            Err(VssError::Decryption { peer: 2 })
        ));
        assert!(alice.encrypt_share_for(9, &value).is_none());

        let data = alice.encrypt_data_for(1, b"snapshot").unwrap();
        assert_eq!(bob.decrypt_data(0, &data).unwrap(), b"snapshot");
        assert!(bob.decrypt_data(0, &data[1..]).is_none());
    }

    #[test]
    fn test_curve_switch_keeps_old_commitments_valid() {
        let scheme = scheme_for(0, &SchemeConfig::simulation(CommitmentKind::EllipticCurve));
        let before = scheme.share(&BigUint::from(77u8)).unwrap();
        assert!(scheme.set_current_elliptic_curve(constants::SECP256K1));
        assert!(!scheme.set_current_elliptic_curve("unknown"));
        assert_eq!(scheme.current_elliptic_curve().name(), constants::SECP256K1);

        let after = scheme.share(&BigUint::from(77u8)).unwrap();
        assert!(scheme.check_commitment(before[0].share(), before[0].commitment()));
        assert!(scheme.check_commitment(after[0].share(), after[0].commitment()));
        assert!(matches!(
            scheme.sum_commitments(&[before[0].commitment(), after[0].commitment()]),
            Err(VssError::Core(shroud_core::Error::IncompatibleCommitments(_)))
        ));
    }

    #[test]
    fn test_constant_commitments_do_not_sum() {
        let scheme = scheme_for(0, &SchemeConfig::simulation(CommitmentKind::Constant));
        let shares = scheme.share(&BigUint::from(1u8)).unwrap();
        assert!(matches!(
            scheme.sum_commitments(&[shares[0].commitment(), shares[1].commitment()]),
            Err(VssError::Core(shroud_core::Error::IncompatibleCommitments(_)))
        ));
    }

    #[test]
    fn test_invalid_configuration() {
        let keys = Arc::new(StaticKeyDirectory::new(b"k", 0, &MEMBERS).unwrap());
        let config = SchemeConfig::simulation(CommitmentKind::Linear).with_curve("curve448");
        assert!(matches!(
            ConfidentialityScheme::new(&config, &MEMBERS, 1, keys.clone()),
            Err(VssError::Configuration(_))
        ));

        let mut config = SchemeConfig::simulation(CommitmentKind::Linear);
        config.linear.generator = BigUint::from(1u8);
        assert!(matches!(
            ConfidentialityScheme::new(&config, &MEMBERS, 1, keys.clone()),
            Err(VssError::Configuration(_))
        ));

        let config = SchemeConfig::simulation(CommitmentKind::Linear);
        assert!(matches!(
            ConfidentialityScheme::new(&config, &MEMBERS, 2, keys),
            Err(VssError::Configuration(_))
        ));
    }

    #[test]
    fn test_add_shareholder() {
        let scheme = scheme_for(0, &SchemeConfig::simulation(CommitmentKind::EllipticCurve));
        scheme.add_shareholder(4, Shareholder::new(5).unwrap()).unwrap();
        assert_eq!(scheme.replica_of(Shareholder::new(5).unwrap()), Some(4));
        assert_eq!(scheme.share(&BigUint::from(3u8)).unwrap().len(), 5);
        assert!(scheme.add_shareholder(4, Shareholder::new(6).unwrap()).is_err());
    }
}
