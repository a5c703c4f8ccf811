//! Shareholders, shares and the per-replica confidential record

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::commitment::Commitment;
use crate::curve::CurveRegistry;
use crate::error::{Error, Result};
use crate::wire::{WireReader, WireWriter};

/// Replica identifier assigned by the replication layer
pub type ReplicaId = u32;

/// Evaluation point of a replica: its id plus one, never zero
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Shareholder(u32);

impl Shareholder {
    pub fn new(id: u32) -> Result<Self> {
        if id == 0 || id > i32::MAX as u32 {
            return Err(Error::InvalidParameters(format!(
                "shareholder id {id} out of range"
            )));
        }
        Ok(Self(id))
    }

    /// The default shareholder for a replica
    pub fn for_replica(replica: ReplicaId) -> Result<Self> {
        let id = replica
            .checked_add(1)
            .ok_or_else(|| Error::InvalidParameters(format!("replica id {replica} too large")))?;
        Self::new(id)
    }

    pub fn id(self) -> u32 {
        self.0
    }

    pub fn to_field_element(self) -> BigUint {
        BigUint::from(self.0)
    }

    pub fn encode(self, w: &mut WireWriter) {
        w.write_len(self.0 as usize);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        Self::new(r.read_u32()?)
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl std::fmt::Display for Shareholder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One evaluation of a sharing polynomial
#[derive(Clone, PartialEq, Eq)]
pub struct Share {
    shareholder: Shareholder,
    value: BigUint,
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share")
            .field("shareholder", &self.shareholder)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl Share {
    pub fn new(shareholder: Shareholder, value: BigUint) -> Self {
        Self { shareholder, value }
    }

    pub fn shareholder(&self) -> Shareholder {
        self.shareholder
    }

    pub fn value(&self) -> &BigUint {
        &self.value
    }

    /// `(x, y)` pair for interpolation
    pub fn point(&self) -> (BigUint, BigUint) {
        (self.shareholder.to_field_element(), self.value.clone())
    }

    pub fn encode(&self, w: &mut WireWriter) {
        self.shareholder.encode(w);
        w.write_bytes(&self.value.to_bytes_be());
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        let shareholder = Shareholder::decode(r)?;
        let value = BigUint::from_bytes_be(&r.read_bytes()?);
        Ok(Self { shareholder, value })
    }
}

/// A share together with the commitment it verifies against
///
/// The plaintext secret, when this replica happens to know it, travels
/// along in memory but is never encoded.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifiableShare {
    share: Share,
    commitment: Commitment,
    secret: Option<BigUint>,
}

impl std::fmt::Debug for VerifiableShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiableShare")
            .field("share", &self.share)
            .field("commitment", &self.commitment.kind())
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl VerifiableShare {
    pub fn new(share: Share, commitment: Commitment) -> Self {
        Self {
            share,
            commitment,
            secret: None,
        }
    }

    pub fn with_secret(mut self, secret: BigUint) -> Self {
        self.secret = Some(secret);
        self
    }

    pub fn share(&self) -> &Share {
        &self.share
    }

    pub fn commitment(&self) -> &Commitment {
        &self.commitment
    }

    pub fn secret(&self) -> Option<&BigUint> {
        self.secret.as_ref()
    }

    pub fn shareholder(&self) -> Shareholder {
        self.share.shareholder
    }

    pub fn encode(&self, w: &mut WireWriter) -> Result<()> {
        self.share.encode(w);
        self.commitment.encode(w)
    }

    pub fn decode(r: &mut WireReader<'_>, curves: &CurveRegistry) -> Result<Self> {
        let share = Share::decode(r)?;
        let commitment = Commitment::decode(r, curves)?;
        Ok(Self::new(share, commitment))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = WireWriter::new();
        self.encode(&mut w)?;
        Ok(w.into_bytes())
    }

    pub fn from_bytes(bytes: &[u8], curves: &CurveRegistry) -> Result<Self> {
        let mut r = WireReader::new(bytes);
        let share = Self::decode(&mut r, curves)?;
        r.finish()?;
        Ok(share)
    }
}

/// Everything a replica holds for one confidential value
///
/// Exactly one private share plus any number of public shares. Values are
/// never mutated in place; a refresh builds a new record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfidentialData {
    share: VerifiableShare,
    public_shares: Vec<VerifiableShare>,
}

impl ConfidentialData {
    pub fn new(share: VerifiableShare) -> Self {
        Self {
            share,
            public_shares: Vec::new(),
        }
    }

    pub fn with_public_shares(share: VerifiableShare, public_shares: Vec<VerifiableShare>) -> Self {
        Self {
            share,
            public_shares,
        }
    }

    pub fn share(&self) -> &VerifiableShare {
        &self.share
    }

    pub fn public_shares(&self) -> &[VerifiableShare] {
        &self.public_shares
    }

    /// Same public shares, new private share
    pub fn replace_share(&self, share: VerifiableShare) -> Self {
        Self {
            share,
            public_shares: self.public_shares.clone(),
        }
    }

    pub fn encode(&self, w: &mut WireWriter) -> Result<()> {
        self.share.encode(w)?;
        if self.public_shares.is_empty() {
            w.write_i32(crate::wire::ABSENT);
        } else {
            w.write_len(self.public_shares.len());
            for public in &self.public_shares {
                public.encode(w)?;
            }
        }
        Ok(())
    }

    pub fn decode(r: &mut WireReader<'_>, curves: &CurveRegistry) -> Result<Self> {
        let share = VerifiableShare::decode(r, curves)?;
        let public_shares = match r.read_count(8)? {
            Some(count) => (0..count)
                .map(|_| VerifiableShare::decode(r, curves))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            share,
            public_shares,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = WireWriter::new();
        self.encode(&mut w)?;
        Ok(w.into_bytes())
    }

    pub fn from_bytes(bytes: &[u8], curves: &CurveRegistry) -> Result<Self> {
        let mut r = WireReader::new(bytes);
        let data = Self::decode(&mut r, curves)?;
        r.finish()?;
        Ok(data)
    }
}

/// Plain application state plus the ordered private shares, as exchanged
/// with the host at checkpoint boundaries
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfidentialSnapshot {
    pub plain: Vec<u8>,
    pub shares: Vec<VerifiableShare>,
}

impl ConfidentialSnapshot {
    pub fn new(plain: Vec<u8>, shares: Vec<VerifiableShare>) -> Self {
        Self { plain, shares }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shareholder_bounds() {
        assert!(Shareholder::new(0).is_err());
        assert_eq!(Shareholder::for_replica(0).unwrap().id(), 1);
        assert!(Shareholder::for_replica(u32::MAX).is_err());
        assert!(Shareholder::new(i32::MAX as u32 + 1).is_err());
    }

    #[test]
    fn test_share_debug_is_redacted() {
        let share = Share::new(Shareholder::new(3).unwrap(), BigUint::from(987_654_321u32));
        let debug = format!("{share:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("987654321"));
    }

    #[test]
    fn test_zero_shareholder_rejected_on_decode() {
        let bytes = [0, 0, 0, 0, 0, 0, 0, 1, 5];
        assert!(Share::decode(&mut WireReader::new(&bytes)).is_err());
    }
}
