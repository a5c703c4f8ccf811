//! Messages exchanged over the replicated log
//!
//! All encodings are big-endian and length-prefixed; a length of `-1`
//! marks an absent list or byte string. Every entry the protocol submits is
//! wrapped in an [`Envelope`] so the host can hand over foreign entries and
//! have them skipped.

use std::collections::BTreeMap;

use k256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};
use shroud_core::wire::ABSENT;
use shroud_core::{Commitment, CurveRegistry, ReplicaId, Shareholder, WireReader, WireWriter};

use crate::error::{Result, VssError};

/// Marks an envelope produced by this crate
pub const ENVELOPE_MAGIC: &[u8; 4] = b"SHRD";

const TAG_PROPOSAL: u8 = 1;
const TAG_MISSING_PROPOSALS: u8 = 2;
const TAG_MISSING_REQUEST: u8 = 3;

/// Points of one polynomial, keyed by recipient, plus its commitment
///
/// Points are ciphertexts in a [`ProposalMessage`] and plaintext
/// big-endian field elements inside a [`MissingProposalsMessage`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Proposal {
    pub points: Option<BTreeMap<Shareholder, Vec<u8>>>,
    pub commitment: Option<Commitment>,
}

impl Proposal {
    pub fn new(points: BTreeMap<Shareholder, Vec<u8>>, commitment: Commitment) -> Self {
        Self {
            points: Some(points),
            commitment: Some(commitment),
        }
    }

    pub fn point(&self, shareholder: Shareholder) -> Option<&[u8]> {
        self.points
            .as_ref()
            .and_then(|points| points.get(&shareholder))
            .map(Vec::as_slice)
    }

    fn encode(&self, w: &mut WireWriter) -> Result<()> {
        match &self.points {
            Some(points) => {
                w.write_len(points.len());
                for (holder, point) in points {
                    holder.encode(w);
                    w.write_bytes(point);
                }
            }
            None => w.write_i32(ABSENT),
        }
        w.write_bool(self.commitment.is_some());
        if let Some(commitment) = &self.commitment {
            commitment.encode(w)?;
        }
        Ok(())
    }

    fn decode(r: &mut WireReader<'_>, curves: &CurveRegistry) -> Result<Self> {
        let points = match r.read_count(8)? {
            Some(count) => {
                let mut points = BTreeMap::new();
                for _ in 0..count {
                    let holder = Shareholder::decode(r)?;
                    let point = r.read_bytes()?;
                    if points.insert(holder, point).is_some() {
                        return Err(shroud_core::Error::Serialization(format!(
                            "duplicate point for shareholder {holder}"
                        ))
                        .into());
                    }
                }
                Some(points)
            }
            None => None,
        };
        let commitment = if r.read_bool()? {
            Some(Commitment::decode(r, curves)?)
        } else {
            None
        };
        Ok(Self { points, commitment })
    }
}

/// One participant's contribution to a round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalMessage {
    pub id: u32,
    pub sender: ReplicaId,
    /// Confidentiality scheme id, carried in the envelope on the wire
    pub scheme_id: String,
    pub proposals: Option<Vec<Proposal>>,
    pub signature: Option<Vec<u8>>,
}

impl ProposalMessage {
    pub fn new(id: u32, sender: ReplicaId, scheme_id: impl Into<String>, proposals: Vec<Proposal>) -> Self {
        Self {
            id,
            sender,
            scheme_id: scheme_id.into(),
            proposals: Some(proposals),
            signature: None,
        }
    }

    pub fn proposals(&self) -> &[Proposal] {
        self.proposals.as_deref().unwrap_or(&[])
    }

    fn encode_unsigned(&self, w: &mut WireWriter) -> Result<()> {
        w.write_len(self.id as usize);
        w.write_len(self.sender as usize);
        match &self.proposals {
            Some(proposals) => {
                w.write_len(proposals.len());
                for proposal in proposals {
                    proposal.encode(w)?;
                }
            }
            None => w.write_i32(ABSENT),
        }
        Ok(())
    }

    /// Bytes covered by the signature: the scheme id, then the unsigned body
    pub fn signing_payload(&self) -> Result<Vec<u8>> {
        let mut w = WireWriter::new();
        w.write_utf(&self.scheme_id)?;
        self.encode_unsigned(&mut w)?;
        Ok(w.into_bytes())
    }

    pub fn sign(&mut self, key: &SigningKey) -> Result<()> {
        let payload = self.signing_payload()?;
        let signature: Signature = key
            .try_sign(&payload)
            .map_err(|e| VssError::Signing(e.to_string()))?;
        self.signature = Some(signature.to_bytes().to_vec());
        Ok(())
    }

    pub fn verify_signature(&self, key: &VerifyingKey) -> bool {
        let Some(raw) = &self.signature else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(raw) else {
            return false;
        };
        match self.signing_payload() {
            Ok(payload) => key.verify(&payload, &signature).is_ok(),
            Err(_) => false,
        }
    }

    pub fn encode(&self, w: &mut WireWriter) -> Result<()> {
        self.encode_unsigned(w)?;
        w.write_optional_bytes(self.signature.as_deref());
        Ok(())
    }

    pub fn decode(r: &mut WireReader<'_>, scheme_id: &str, curves: &CurveRegistry) -> Result<Self> {
        let id = r.read_u32()?;
        let sender = r.read_u32()?;
        let proposals = match r.read_count(5)? {
            Some(count) => Some(
                (0..count)
                    .map(|_| Proposal::decode(r, curves))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };
        let signature = r.read_optional_bytes()?;
        Ok(Self {
            id,
            sender,
            scheme_id: scheme_id.to_string(),
            proposals,
            signature,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = WireWriter::new();
        self.encode(&mut w)?;
        Ok(w.into_bytes())
    }

    pub fn from_bytes(bytes: &[u8], scheme_id: &str, curves: &CurveRegistry) -> Result<Self> {
        let mut r = WireReader::new(bytes);
        let message = Self::decode(&mut r, scheme_id, curves)?;
        r.finish()?;
        Ok(message)
    }
}

/// A sender's answer to resupply requests, with plaintext points
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingProposalsMessage {
    pub id: u32,
    pub sender: ReplicaId,
    pub proposal: ProposalMessage,
}

impl MissingProposalsMessage {
    pub fn encode(&self, w: &mut WireWriter) -> Result<()> {
        w.write_len(self.id as usize);
        w.write_len(self.sender as usize);
        self.proposal.encode(w)
    }

    pub fn decode(r: &mut WireReader<'_>, scheme_id: &str, curves: &CurveRegistry) -> Result<Self> {
        let id = r.read_u32()?;
        let sender = r.read_u32()?;
        let proposal = ProposalMessage::decode(r, scheme_id, curves)?;
        Ok(Self {
            id,
            sender,
            proposal,
        })
    }
}

/// A replica asking senders to publish the points it lacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingProposalsRequest {
    pub id: u32,
    pub requester: ReplicaId,
    pub missing: Vec<ReplicaId>,
}

impl MissingProposalsRequest {
    pub fn encode(&self, w: &mut WireWriter) {
        w.write_len(self.id as usize);
        w.write_len(self.requester as usize);
        w.write_len(self.missing.len());
        for sender in &self.missing {
            w.write_len(*sender as usize);
        }
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self> {
        let id = r.read_u32()?;
        let requester = r.read_u32()?;
        let count = r.read_count(4)?.unwrap_or(0);
        let missing = (0..count)
            .map(|_| r.read_u32())
            .collect::<shroud_core::Result<Vec<_>>>()?;
        Ok(Self {
            id,
            requester,
            missing,
        })
    }
}

/// Body of a protocol log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    Proposal(ProposalMessage),
    MissingProposals(MissingProposalsMessage),
    MissingRequest(MissingProposalsRequest),
}

/// `magic, u8 tag, u16-length scheme id, body`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub scheme_id: String,
    pub entry: LogEntry,
}

impl Envelope {
    pub fn new(scheme_id: impl Into<String>, entry: LogEntry) -> Self {
        Self {
            scheme_id: scheme_id.into(),
            entry,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = WireWriter::new();
        w.write_raw(ENVELOPE_MAGIC);
        let tag = match &self.entry {
            LogEntry::Proposal(_) => TAG_PROPOSAL,
            LogEntry::MissingProposals(_) => TAG_MISSING_PROPOSALS,
            LogEntry::MissingRequest(_) => TAG_MISSING_REQUEST,
        };
        w.write_u8(tag);
        w.write_utf(&self.scheme_id)?;
        match &self.entry {
            LogEntry::Proposal(message) => message.encode(&mut w)?,
            LogEntry::MissingProposals(message) => message.encode(&mut w)?,
            LogEntry::MissingRequest(request) => request.encode(&mut w),
        }
        Ok(w.into_bytes())
    }

    /// Decode an entry; `Ok(None)` for entries that are not ours
    pub fn from_bytes(bytes: &[u8], curves: &CurveRegistry) -> Result<Option<Self>> {
        if !bytes.starts_with(ENVELOPE_MAGIC) {
            return Ok(None);
        }
        let mut r = WireReader::new(&bytes[ENVELOPE_MAGIC.len()..]);
        let tag = r.read_u8()?;
        let scheme_id = r.read_utf()?;
        let entry = match tag {
            TAG_PROPOSAL => LogEntry::Proposal(ProposalMessage::decode(&mut r, &scheme_id, curves)?),
            TAG_MISSING_PROPOSALS => LogEntry::MissingProposals(MissingProposalsMessage::decode(
                &mut r, &scheme_id, curves,
            )?),
            TAG_MISSING_REQUEST => LogEntry::MissingRequest(MissingProposalsRequest::decode(&mut r)?),
            other => {
                return Err(shroud_core::Error::Serialization(format!(
                    "unknown log entry tag {other}"
                ))
                .into())
            }
        };
        r.finish()?;
        Ok(Some(Self { scheme_id, entry }))
    }
}
