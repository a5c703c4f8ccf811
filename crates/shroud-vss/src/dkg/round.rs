//! Per-round state machine
//!
//! A round is driven entirely by ordered log entries: every replica feeds
//! it the same entries in the same order, so contributor exclusion and the
//! decision point come out identical everywhere. Only the points a replica
//! decrypts for itself are private, and a replica that cannot use its
//! points complains publicly instead of deciding on its own.

use std::collections::{BTreeMap, BTreeSet};

use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use shroud_core::{
    Commitment, CommitmentAlgebra, CommitmentKind, Polynomial, ReplicaId, Share, Shareholder,
    VerifiableShare,
};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::types::{RoundId, RoundKind, RoundOutput, RoundRequest, RoundState};
use crate::error::{Result, VssError};
use crate::messages::{
    Envelope, LogEntry, MissingProposalsMessage, MissingProposalsRequest, Proposal,
    ProposalMessage,
};
use crate::scheme::ConfidentialityScheme;

/// Timing, counted in ordered log entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Windows {
    pub proposal: u32,
    pub gap: u32,
}

struct Contribution {
    commitments: Vec<Commitment>,
    observed_at: u32,
}

#[derive(Default)]
struct SenderRecord {
    contribution: Option<Contribution>,
    /// Verified points addressed to this replica, one per polynomial
    points: Option<Vec<BigUint>>,
    excluded: Option<String>,
    /// Open complaints: complainer -> entry count when opened
    complaints: BTreeMap<ReplicaId, u32>,
    resolved: BTreeSet<ReplicaId>,
}

struct OwnProposal {
    polynomials: Vec<Polynomial>,
    commitments: Vec<Commitment>,
}

pub(crate) struct Round {
    id: RoundId,
    kind: RoundKind,
    scheme_id: String,
    algebra: CommitmentAlgebra,
    threshold: usize,
    windows: Windows,
    local: ReplicaId,
    local_holder: Shareholder,
    target_point: Option<BigUint>,
    state: RoundState,
    entries_seen: u32,
    decided_at: u32,
    included: Vec<ReplicaId>,
    own: Option<OwnProposal>,
    senders: BTreeMap<ReplicaId, SenderRecord>,
    requested: BTreeSet<ReplicaId>,
    completion: Option<oneshot::Sender<RoundOutput>>,
}

impl Round {
    pub(crate) fn open(
        id: RoundId,
        request: RoundRequest,
        scheme: &ConfidentialityScheme,
        windows: Windows,
        completion: oneshot::Sender<RoundOutput>,
    ) -> Result<Self> {
        let algebra = match &request.kind {
            RoundKind::Random if scheme.vss_kind() == CommitmentKind::Constant => {
                scheme.algebra_for(CommitmentKind::EllipticCurve, None)?
            }
            RoundKind::Random => scheme.algebra()?,
            RoundKind::RandomKey { curve } => {
                scheme.algebra_for(CommitmentKind::EllipticCurve, Some(curve))?
            }
            RoundKind::Recovery { .. } => {
                if !scheme.vss_kind().is_homomorphic() {
                    return Err(VssError::Configuration(format!(
                        "recovery needs homomorphic commitments, configured {}",
                        scheme.vss_kind()
                    )));
                }
                scheme.algebra()?
            }
        };
        let scheme_id = match &algebra {
            CommitmentAlgebra::EllipticCurve(curve) => curve.name().to_string(),
            _ => scheme.scheme_id().to_string(),
        };

        let contributors: BTreeSet<ReplicaId> = request.contributors.iter().copied().collect();
        if let Some(unknown) = contributors.iter().find(|c| scheme.shareholder(**c).is_none()) {
            return Err(VssError::UnknownReplica(*unknown));
        }
        let threshold = scheme.threshold();
        if contributors.len() < threshold + 1 {
            return Err(VssError::Protocol(format!(
                "round {id} needs {} contributors, got {}",
                threshold + 1,
                contributors.len()
            )));
        }

        let target_point = match &request.kind {
            RoundKind::Recovery { target, .. } => {
                if contributors.contains(target) {
                    return Err(VssError::Protocol(format!(
                        "recovery target {target} cannot contribute to its own recovery"
                    )));
                }
                let holder = scheme
                    .shareholder(*target)
                    .ok_or(VssError::UnknownReplica(*target))?;
                Some(holder.to_field_element())
            }
            _ => None,
        };

        let senders = contributors
            .iter()
            .map(|c| (*c, SenderRecord::default()))
            .collect();

        debug!(round = id, kind = ?request.kind, contributors = contributors.len(), "round opened");

        Ok(Self {
            id,
            kind: request.kind,
            scheme_id,
            algebra,
            threshold,
            windows,
            local: scheme.replica(),
            local_holder: scheme.local_shareholder()?,
            target_point,
            state: RoundState::Requested,
            entries_seen: 0,
            decided_at: 0,
            included: Vec::new(),
            own: None,
            senders,
            requested: BTreeSet::new(),
            completion: Some(completion),
        })
    }

    pub(crate) fn state(&self) -> RoundState {
        self.state
    }

    pub(crate) fn scheme_id(&self) -> &str {
        &self.scheme_id
    }

    /// Sample this replica's polynomials and build its signed proposal
    ///
    /// Returns `None` when this replica only observes the round.
    pub(crate) fn propose<R: RngCore + CryptoRng + ?Sized>(
        &mut self,
        scheme: &ConfidentialityScheme,
        rng: &mut R,
    ) -> Result<Option<Envelope>> {
        self.state = RoundState::Proposing;
        if !self.senders.contains_key(&self.local) {
            return Ok(None);
        }

        let field = self.algebra.field().clone();
        let polynomials = match &self.target_point {
            Some(target) => {
                let mut polynomials = Vec::with_capacity(self.kind.polynomial_count());
                polynomials.push(Polynomial::random_with_root(
                    &field,
                    self.threshold,
                    &BigUint::default(),
                    rng,
                ));
                // Every secret gets its own mask
                for _ in 1..self.kind.polynomial_count() {
                    polynomials.push(Polynomial::random_with_root(
                        &field,
                        self.threshold,
                        target,
                        rng,
                    ));
                }
                polynomials
            }
            None => {
                let secret = field.random(rng);
                vec![Polynomial::random(&field, self.threshold, &secret, rng)]
            }
        };

        let recipients = scheme.shareholders();
        let mut proposals = Vec::with_capacity(polynomials.len());
        let mut commitments = Vec::with_capacity(polynomials.len());
        let mut own_points = Vec::with_capacity(polynomials.len());
        for polynomial in &polynomials {
            let commitment = self.algebra.generate(polynomial, &recipients, rng)?;
            let mut points = BTreeMap::new();
            for holder in &recipients {
                let value = polynomial.evaluate(&holder.to_field_element());
                if *holder == self.local_holder {
                    own_points.push(value);
                    continue;
                }
                let Some(peer) = scheme.replica_of(*holder) else {
                    continue;
                };
                // A missing point is resupplied in the clear once the
                // recipient complains.
                if let Some(sealed) = scheme.encrypt_share_for(peer, &value) {
                    points.insert(*holder, sealed);
                }
            }
            proposals.push(Proposal::new(points, commitment.clone()));
            commitments.push(commitment);
        }

        let mut message = ProposalMessage::new(self.id, self.local, &self.scheme_id, proposals);
        scheme.sign_proposal(&mut message)?;

        if let Some(record) = self.senders.get_mut(&self.local) {
            record.points = Some(own_points);
        }
        self.own = Some(OwnProposal {
            polynomials,
            commitments,
        });

        info!(round = self.id, replica = self.local, "proposal submitted");
        Ok(Some(Envelope::new(
            self.scheme_id.clone(),
            LogEntry::Proposal(message),
        )))
    }

    /// Public checks every replica applies to a contribution
    fn check_contribution(
        &self,
        message: &ProposalMessage,
        scheme: &ConfidentialityScheme,
    ) -> std::result::Result<Vec<Commitment>, String> {
        if message.scheme_id != self.scheme_id {
            return Err(format!("scheme id {} in a {} round", message.scheme_id, self.scheme_id));
        }
        if !scheme.verify_proposal(message) {
            return Err("bad signature".into());
        }
        let proposals = message.proposals();
        if proposals.len() != self.kind.polynomial_count() {
            return Err(format!("{} polynomials proposed", proposals.len()));
        }
        let mut commitments = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            let commitment = proposal
                .commitment
                .clone()
                .ok_or_else(|| "missing commitment".to_string())?;
            if !self.algebra.is_well_formed(&commitment, self.threshold) {
                return Err(format!("malformed {} commitment", commitment.kind()));
            }
            commitments.push(commitment);
        }
        if let Some(target) = &self.target_point {
            if self.algebra.vanishes_at(&commitments[0], &BigUint::default()) != Ok(true) {
                return Err("refresh polynomial does not vanish at zero".into());
            }
            for (k, mask) in commitments.iter().enumerate().skip(1) {
                if self.algebra.vanishes_at(mask, target) != Ok(true) {
                    return Err(format!("mask {k} does not vanish at the target"));
                }
            }
        }
        Ok(commitments)
    }

    fn exclude(&mut self, sender: ReplicaId, reason: String) {
        if let Some(record) = self.senders.get_mut(&sender) {
            if record.excluded.is_none() {
                warn!(round = self.id, sender, %reason, "contributor excluded");
                record.complaints.clear();
                record.excluded = Some(reason);
            }
        }
    }

    /// Ask senders to resupply points this replica could not use
    fn complain(&mut self, senders: Vec<ReplicaId>) -> Option<Envelope> {
        let missing: Vec<ReplicaId> = senders
            .into_iter()
            .filter(|s| *s != self.local && self.requested.insert(*s))
            .collect();
        if missing.is_empty() {
            return None;
        }
        debug!(round = self.id, ?missing, "requesting missing proposals");
        Some(Envelope::new(
            self.scheme_id.clone(),
            LogEntry::MissingRequest(MissingProposalsRequest {
                id: self.id,
                requester: self.local,
                missing,
            }),
        ))
    }

    fn decrypt_points(
        &self,
        scheme: &ConfidentialityScheme,
        message: &ProposalMessage,
        commitments: &[Commitment],
    ) -> Option<Vec<BigUint>> {
        let mut values = Vec::with_capacity(commitments.len());
        for (proposal, commitment) in message.proposals().iter().zip(commitments) {
            let sealed = proposal.point(self.local_holder)?;
            let value = match scheme.decrypt_share_for(message.sender, sealed) {
                Ok(value) => value,
                Err(e) => {
                    warn!(round = self.id, sender = message.sender, error = %e, "point does not decrypt");
                    return None;
                }
            };
            let share = Share::new(self.local_holder, value);
            if !self.algebra.verify(&share, commitment) {
                warn!(round = self.id, sender = message.sender, "point fails its commitment");
                return None;
            }
            values.push(share.value().clone());
        }
        Some(values)
    }

    pub(crate) fn on_proposal(
        &mut self,
        scheme: &ConfidentialityScheme,
        origin: ReplicaId,
        message: ProposalMessage,
    ) -> Vec<Envelope> {
        let sender = message.sender;
        if origin != sender {
            warn!(round = self.id, origin, sender, "proposal ordered for another sender");
            return Vec::new();
        }
        match self.senders.get(&sender) {
            None => {
                debug!(round = self.id, sender, "proposal from non-contributor ignored");
                return Vec::new();
            }
            Some(record) if record.excluded.is_some() || record.contribution.is_some() => {
                debug!(round = self.id, sender, "duplicate proposal ignored");
                return Vec::new();
            }
            Some(_) => {}
        }

        let commitments = match self.check_contribution(&message, scheme) {
            Ok(commitments) => commitments,
            Err(reason) => {
                self.exclude(sender, reason);
                return Vec::new();
            }
        };

        let points = if sender == self.local {
            None
        } else {
            self.decrypt_points(scheme, &message, &commitments)
        };
        let observed_at = self.entries_seen;
        if let Some(record) = self.senders.get_mut(&sender) {
            record.contribution = Some(Contribution {
                commitments,
                observed_at,
            });
            if points.is_some() {
                record.points = points;
            }
        }
        debug!(round = self.id, sender, "proposal observed");

        let usable = self
            .senders
            .get(&sender)
            .is_some_and(|record| record.points.is_some());
        if usable {
            return Vec::new();
        }
        self.complain(vec![sender]).into_iter().collect()
    }

    pub(crate) fn on_request(
        &mut self,
        scheme: &ConfidentialityScheme,
        origin: ReplicaId,
        request: MissingProposalsRequest,
    ) -> Vec<Envelope> {
        let requester = request.requester;
        if origin != requester || scheme.shareholder(requester).is_none() {
            warn!(round = self.id, origin, requester, "request ordered for another replica");
            return Vec::new();
        }
        let opened_at = self.entries_seen;
        let mut answer = false;
        for sender in request.missing.iter().copied().collect::<BTreeSet<_>>() {
            let Some(record) = self.senders.get_mut(&sender) else {
                continue;
            };
            if record.excluded.is_some()
                || record.resolved.contains(&requester)
                || record.complaints.contains_key(&requester)
            {
                continue;
            }
            record.complaints.insert(requester, opened_at);
            debug!(round = self.id, sender, requester, "complaint opened");
            answer |= sender == self.local;
        }
        if !answer {
            return Vec::new();
        }
        self.resupply(scheme, requester).into_iter().collect()
    }

    /// Publish this replica's points for `requester` in the clear
    fn resupply(&self, scheme: &ConfidentialityScheme, requester: ReplicaId) -> Option<Envelope> {
        let own = self.own.as_ref()?;
        let holder = scheme.shareholder(requester)?;
        let x = holder.to_field_element();
        let proposals = own
            .polynomials
            .iter()
            .zip(&own.commitments)
            .map(|(polynomial, commitment)| {
                let mut points = BTreeMap::new();
                points.insert(holder, polynomial.evaluate(&x).to_bytes_be());
                Proposal::new(points, commitment.clone())
            })
            .collect();
        let mut proposal = ProposalMessage::new(self.id, self.local, &self.scheme_id, proposals);
        if let Err(e) = scheme.sign_proposal(&mut proposal) {
            warn!(round = self.id, error = %e, "could not sign resupply");
            return None;
        }
        info!(round = self.id, requester, "resupplying points");
        Some(Envelope::new(
            self.scheme_id.clone(),
            LogEntry::MissingProposals(MissingProposalsMessage {
                id: self.id,
                sender: self.local,
                proposal,
            }),
        ))
    }

    pub(crate) fn on_missing(
        &mut self,
        scheme: &ConfidentialityScheme,
        origin: ReplicaId,
        message: MissingProposalsMessage,
    ) {
        let sender = message.sender;
        if origin != sender || message.proposal.sender != sender || message.proposal.id != self.id {
            warn!(round = self.id, origin, sender, "resupply ordered for another sender");
            return;
        }
        match self.senders.get(&sender) {
            Some(record) if record.excluded.is_none() => {}
            _ => return,
        }

        let commitments = match self.check_contribution(&message.proposal, scheme) {
            Ok(commitments) => commitments,
            Err(reason) => {
                self.exclude(sender, format!("resupply: {reason}"));
                return;
            }
        };
        if let Some(contribution) = self.senders.get(&sender).and_then(|r| r.contribution.as_ref()) {
            if contribution.commitments != commitments {
                self.exclude(sender, "resupply changes commitments".into());
                return;
            }
        }

        // Every published point must verify; collect complete sets per holder.
        let field = self.algebra.field().clone();
        let mut supplied: BTreeMap<Shareholder, Vec<BigUint>> = BTreeMap::new();
        for (k, (proposal, commitment)) in message
            .proposal
            .proposals()
            .iter()
            .zip(&commitments)
            .enumerate()
        {
            for (holder, bytes) in proposal.points.iter().flatten() {
                let value = BigUint::from_bytes_be(bytes);
                let share = Share::new(*holder, value);
                if !field.contains(share.value()) || !self.algebra.verify(&share, commitment) {
                    self.exclude(sender, format!("resupplied point for {holder} is invalid"));
                    return;
                }
                let entry = supplied.entry(*holder).or_default();
                if entry.len() == k {
                    entry.push(share.value().clone());
                }
            }
        }
        let count = commitments.len();
        supplied.retain(|_, values| values.len() == count);

        let observed_at = self.entries_seen;
        let local_holder = self.local_holder;
        let mut resolved = Vec::new();
        if let Some(record) = self.senders.get_mut(&sender) {
            if record.contribution.is_none() {
                record.contribution = Some(Contribution {
                    commitments,
                    observed_at,
                });
            }
            if record.points.is_none() {
                if let Some(values) = supplied.get(&local_holder) {
                    record.points = Some(values.clone());
                }
            }
            for requester in record.complaints.keys().copied().collect::<Vec<_>>() {
                let answered = scheme
                    .shareholder(requester)
                    .is_some_and(|holder| supplied.contains_key(&holder));
                if answered {
                    record.complaints.remove(&requester);
                    record.resolved.insert(requester);
                    resolved.push(requester);
                }
            }
        }
        if !resolved.is_empty() {
            debug!(round = self.id, sender, ?resolved, "complaints resolved");
        }
    }

    /// Account for one more ordered entry and move the round forward
    pub(crate) fn tick(&mut self) -> Vec<Envelope> {
        self.entries_seen = self.entries_seen.saturating_add(1);
        let mut outgoing = Vec::new();
        match self.state {
            RoundState::Requested | RoundState::Proposing => {
                outgoing.extend(self.track_senders());
                self.try_decide();
                if self.state == RoundState::AwaitingMissing {
                    outgoing.extend(self.try_finish());
                }
            }
            RoundState::AwaitingMissing => outgoing.extend(self.try_finish()),
            _ => {}
        }
        outgoing
    }

    fn track_senders(&mut self) -> Option<Envelope> {
        let now = self.entries_seen;
        let gap = self.windows.gap;
        let proposal = self.windows.proposal;
        let mut exclusions = Vec::new();
        let mut missing = Vec::new();
        for (&sender, record) in &self.senders {
            if record.excluded.is_some() {
                continue;
            }
            let expired = record
                .complaints
                .iter()
                .find(|(_, opened)| now.saturating_sub(**opened) >= gap);
            if let Some((complainer, _)) = expired {
                exclusions.push((sender, format!("complaint from {complainer} unanswered")));
                continue;
            }
            match &record.contribution {
                None => {
                    if now >= proposal {
                        missing.push(sender);
                    }
                    if now >= proposal.saturating_add(gap) && record.complaints.is_empty() {
                        exclusions.push((sender, "no proposal ordered".to_string()));
                    }
                }
                Some(_) if record.points.is_none() => missing.push(sender),
                Some(_) => {}
            }
        }
        for (sender, reason) in exclusions {
            self.exclude(sender, reason);
        }
        self.complain(missing)
    }

    fn try_decide(&mut self) {
        let now = self.entries_seen;
        let gap = self.windows.gap;
        let settled = self.senders.values().all(|record| {
            record.excluded.is_some()
                || record.contribution.as_ref().is_some_and(|c| {
                    record.complaints.is_empty() && now.saturating_sub(c.observed_at) >= gap
                })
        });
        if !settled {
            return;
        }

        let included: Vec<ReplicaId> = self
            .senders
            .iter()
            .filter(|(_, record)| record.excluded.is_none())
            .map(|(sender, _)| *sender)
            .collect();
        if included.len() < self.threshold + 1 {
            self.abandon(format!("only {} valid contributors", included.len()));
            return;
        }
        info!(round = self.id, ?included, "contributors decided");
        self.included = included;
        self.decided_at = now;
        self.state = RoundState::AwaitingMissing;
    }

    fn try_finish(&mut self) -> Option<Envelope> {
        let lacking: Vec<ReplicaId> = self
            .included
            .iter()
            .copied()
            .filter(|s| self.senders.get(s).is_some_and(|r| r.points.is_none()))
            .collect();
        if lacking.is_empty() {
            self.state = RoundState::Ready;
            self.finish();
            return None;
        }
        if self.entries_seen.saturating_sub(self.decided_at) >= self.windows.proposal {
            self.abandon(format!("points from {lacking:?} never arrived"));
            return None;
        }
        self.complain(lacking)
    }

    fn finish(&mut self) {
        let field = self.algebra.field().clone();
        let mut shares = Vec::with_capacity(self.kind.polynomial_count());
        for k in 0..self.kind.polynomial_count() {
            let mut value = field.zero();
            let mut commitments = Vec::with_capacity(self.included.len());
            for sender in &self.included {
                let Some(record) = self.senders.get(sender) else {
                    continue;
                };
                if let (Some(points), Some(contribution)) = (&record.points, &record.contribution) {
                    value = field.add(&value, &points[k]);
                    commitments.push(&contribution.commitments[k]);
                }
            }
            let summed = self.algebra.sum(&commitments);
            drop(commitments);
            match summed {
                Ok(commitment) => {
                    shares.push(VerifiableShare::new(Share::new(self.local_holder, value), commitment))
                }
                Err(e) => {
                    self.abandon(format!("commitments do not sum: {e}"));
                    return;
                }
            }
        }

        let output = RoundOutput {
            id: self.id,
            kind: self.kind.clone(),
            contributors: self.included.clone(),
            shares,
        };
        self.state = RoundState::Consumed;
        info!(round = self.id, contributors = self.included.len(), "round complete");
        if let Some(completion) = self.completion.take() {
            if completion.send(output).is_err() {
                debug!(round = self.id, "round handle dropped before completion");
            }
        }
    }

    fn abandon(&mut self, reason: String) {
        warn!(round = self.id, %reason, "round abandoned");
        self.state = RoundState::Abandoned;
        self.completion = None;
    }
}
