//! Distributed polynomial generation over the replicated log
//!
//! Each round every contributor proposes a random polynomial (one more
//! than the number of stored secrets for recovery rounds), publishes its commitment and sends every replica its
//! point encrypted under their pairwise channel key, all in one signed log
//! entry. Because all replicas process the same entries in the same order,
//! they reach the same verdict about which contributions to sum without a
//! separate agreement step.
//!
//! ## Flow
//!
//! 1. The host registers a round at the same log position on every replica
//!    via [`PolynomialProposalProtocol::start_round`]; ids come from a
//!    shared counter.
//! 2. Contributors submit a [`ProposalMessage`](crate::messages::ProposalMessage).
//! 3. A replica whose point is missing or fails its commitment submits a
//!    [`MissingProposalsRequest`](crate::messages::MissingProposalsRequest);
//!    the accused sender answers with its points for that replica in the
//!    clear, which everybody checks against the published commitment.
//! 4. Contributors that misbehave publicly, or leave a complaint unanswered
//!    for `gap_window` entries, are excluded. Once every contributor is
//!    settled the round decides, sums the remaining contributions and
//!    completes its [`RoundHandle`].

mod round;
mod types;

pub use types::{RoundHandle, RoundId, RoundKind, RoundOutcome, RoundOutput, RoundRequest, RoundState};

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::FairMutex;
use rand::thread_rng;
use shroud_core::ReplicaId;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::Result;
use crate::messages::{Envelope, LogEntry};
use crate::scheme::ConfidentialityScheme;
use round::{Round, Windows};

/// Total-order broadcast the protocol submits entries to
pub trait OrderedLog: Send + Sync {
    /// Submit an entry on behalf of the local replica
    fn submit(&self, entry: Vec<u8>) -> Result<()>;
}

/// Where an ordered entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageContext {
    /// Authenticated submitter of the entry
    pub sender: ReplicaId,
    /// Consensus instance that ordered it
    pub cid: i32,
}

impl MessageContext {
    pub fn new(sender: ReplicaId, cid: i32) -> Self {
        Self { sender, cid }
    }
}

#[derive(Default)]
struct RoundBook {
    next_id: RoundId,
    rounds: BTreeMap<RoundId, Round>,
    finished: BTreeMap<RoundId, RoundState>,
}

/// Per-replica driver of every open round
pub struct PolynomialProposalProtocol {
    scheme: Arc<ConfidentialityScheme>,
    log: Arc<dyn OrderedLog>,
    windows: Windows,
    book: FairMutex<RoundBook>,
}

impl std::fmt::Debug for PolynomialProposalProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolynomialProposalProtocol")
            .field("replica", &self.scheme.replica())
            .field("windows", &self.windows)
            .finish()
    }
}

impl PolynomialProposalProtocol {
    pub fn new(scheme: Arc<ConfidentialityScheme>, log: Arc<dyn OrderedLog>) -> Self {
        let windows = Windows {
            proposal: scheme.config().proposal_window,
            gap: scheme.config().gap_window,
        };
        Self {
            scheme,
            log,
            windows,
            book: FairMutex::new(RoundBook::default()),
        }
    }

    pub fn scheme(&self) -> &Arc<ConfidentialityScheme> {
        &self.scheme
    }

    /// Register a round and submit this replica's proposal
    ///
    /// Must be called at the same log position on every replica. The id is
    /// consumed even when the request is rejected, so replicas stay in step.
    pub fn start_round(&self, request: RoundRequest) -> Result<RoundHandle> {
        let (completion, receiver) = oneshot::channel();
        let (id, proposal) = {
            let mut book = self.book.lock();
            let id = book.next_id;
            book.next_id = book.next_id.wrapping_add(1);
            let mut round = match Round::open(id, request, &self.scheme, self.windows, completion) {
                Ok(round) => round,
                Err(e) => {
                    book.finished.insert(id, RoundState::Abandoned);
                    return Err(e);
                }
            };
            let proposal = match round.propose(&self.scheme, &mut thread_rng()) {
                Ok(proposal) => proposal,
                Err(e) => {
                    warn!(round = id, error = %e, "could not build proposal, observing only");
                    None
                }
            };
            book.rounds.insert(id, round);
            (id, proposal)
        };
        if let Some(envelope) = proposal {
            self.submit(&envelope)?;
        }
        Ok(RoundHandle::new(id, receiver))
    }

    /// Consume the next round id without taking part in the round
    ///
    /// For a replica that cannot open a round the others open at this log
    /// position, such as the target of a recovery.
    pub fn reserve_round(&self) -> RoundId {
        let mut book = self.book.lock();
        let id = book.next_id;
        book.next_id = book.next_id.wrapping_add(1);
        book.finished.insert(id, RoundState::Abandoned);
        debug!(round = id, "round id reserved");
        id
    }

    /// Process one ordered log entry
    ///
    /// Every entry must be passed in, protocol or not: rounds count entries
    /// to run their windows. Returns whether the entry was a protocol
    /// message. Undecodable protocol entries still count and are reported
    /// as errors.
    pub fn observe(&self, entry: &[u8], context: MessageContext) -> Result<bool> {
        let decoded = self.scheme.deserialize_envelope(entry);
        let mut outgoing = Vec::new();
        {
            let mut book = self.book.lock();
            if let Ok(Some(envelope)) = &decoded {
                Self::dispatch(&self.scheme, &mut book, envelope.clone(), context, &mut outgoing);
            }
            for round in book.rounds.values_mut() {
                outgoing.extend(round.tick());
            }
            let done: Vec<RoundId> = book
                .rounds
                .iter()
                .filter(|(_, round)| round.state().is_terminal())
                .map(|(id, _)| *id)
                .collect();
            for id in done {
                if let Some(round) = book.rounds.remove(&id) {
                    book.finished.insert(id, round.state());
                }
            }
        }

        for envelope in &outgoing {
            if let Err(e) = self.submit(envelope) {
                warn!(error = %e, "could not submit protocol entry");
            }
        }

        match decoded {
            Ok(found) => Ok(found.is_some()),
            Err(e) => {
                debug!(cid = context.cid, sender = context.sender, error = %e, "undecodable protocol entry");
                Err(e)
            }
        }
    }

    fn dispatch(
        scheme: &ConfidentialityScheme,
        book: &mut RoundBook,
        envelope: Envelope,
        context: MessageContext,
        outgoing: &mut Vec<Envelope>,
    ) {
        let id = match &envelope.entry {
            LogEntry::Proposal(message) => message.id,
            LogEntry::MissingProposals(message) => message.id,
            LogEntry::MissingRequest(request) => request.id,
        };
        let Some(round) = book.rounds.get_mut(&id) else {
            debug!(round = id, "entry for an unknown or finished round");
            return;
        };
        if envelope.scheme_id != round.scheme_id() {
            debug!(round = id, scheme_id = %envelope.scheme_id, "entry for another scheme");
            return;
        }
        match envelope.entry {
            LogEntry::Proposal(message) => {
                outgoing.extend(round.on_proposal(scheme, context.sender, message))
            }
            LogEntry::MissingRequest(request) => {
                outgoing.extend(round.on_request(scheme, context.sender, request))
            }
            LogEntry::MissingProposals(message) => {
                round.on_missing(scheme, context.sender, message)
            }
        }
    }

    fn submit(&self, envelope: &Envelope) -> Result<()> {
        let bytes = self.scheme.serialize_envelope(envelope)?;
        self.log.submit(bytes)
    }

    /// Rounds that have not completed or been abandoned
    pub fn pending_rounds(&self) -> usize {
        self.book.lock().rounds.len()
    }

    pub fn round_state(&self, id: RoundId) -> Option<RoundState> {
        let book = self.book.lock();
        book.rounds
            .get(&id)
            .map(Round::state)
            .or_else(|| book.finished.get(&id).copied())
    }
}
