//! Round requests, states and results

use shroud_core::{Commitment, ReplicaId, VerifiableShare};
use tokio::sync::oneshot;

/// Round identifier, allocated in log order
pub type RoundId = u32;

/// What a round produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundKind {
    /// A fresh random secret in the configured commitment family
    Random,
    /// A fresh key pair with elliptic-curve commitments on `curve`
    RandomKey { curve: String },
    /// A refresh polynomial vanishing at zero, then one mask per stored
    /// secret, each vanishing at the target's shareholder
    Recovery { target: ReplicaId, secrets: usize },
}

impl RoundKind {
    /// Polynomials each contributor proposes
    pub fn polynomial_count(&self) -> usize {
        match self {
            RoundKind::Recovery { secrets, .. } => 1 + secrets,
            _ => 1,
        }
    }
}

/// A request to run a round among `contributors`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRequest {
    pub kind: RoundKind,
    pub contributors: Vec<ReplicaId>,
}

impl RoundRequest {
    pub fn new(kind: RoundKind, contributors: Vec<ReplicaId>) -> Self {
        Self { kind, contributors }
    }
}

/// Round lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    /// Registered, own proposal not yet submitted
    Requested,
    /// Collecting proposals, complaints and resupplies
    Proposing,
    /// Contributor set fixed, waiting for points owed to this replica
    AwaitingMissing,
    /// All points present, output about to be produced
    Ready,
    /// Output handed to the caller
    Consumed,
    /// Too few valid contributors, or output could not be produced
    Abandoned,
}

impl RoundState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RoundState::Consumed | RoundState::Abandoned)
    }
}

/// This replica's view of a decided round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutput {
    pub id: RoundId,
    pub kind: RoundKind,
    /// Contributors whose proposals were summed, ascending
    pub contributors: Vec<ReplicaId>,
    /// One summed share per proposed polynomial
    pub shares: Vec<VerifiableShare>,
}

impl RoundOutput {
    /// The first (for recovery rounds, the refresh) share
    pub fn share(&self) -> Option<&VerifiableShare> {
        self.shares.first()
    }

    /// Compressed public key of an elliptic-curve round
    pub fn public_key(&self) -> Option<Vec<u8>> {
        match self.share()?.commitment() {
            Commitment::EllipticCurve(commitment) => commitment.public_key(),
            _ => None,
        }
    }
}

/// What a handle knows about its round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    Pending,
    Completed(RoundOutput),
    Abandoned,
}

enum Completion {
    Waiting(oneshot::Receiver<RoundOutput>),
    Done(Option<RoundOutput>),
}

/// Caller's side of a round
pub struct RoundHandle {
    id: RoundId,
    completion: Completion,
}

impl std::fmt::Debug for RoundHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundHandle").field("id", &self.id).finish()
    }
}

impl RoundHandle {
    pub(crate) fn new(id: RoundId, receiver: oneshot::Receiver<RoundOutput>) -> Self {
        Self {
            id,
            completion: Completion::Waiting(receiver),
        }
    }

    pub fn id(&self) -> RoundId {
        self.id
    }

    /// Poll without blocking
    pub fn try_outcome(&mut self) -> RoundOutcome {
        if let Completion::Waiting(receiver) = &mut self.completion {
            match receiver.try_recv() {
                Ok(output) => self.completion = Completion::Done(Some(output)),
                Err(oneshot::error::TryRecvError::Empty) => return RoundOutcome::Pending,
                Err(oneshot::error::TryRecvError::Closed) => self.completion = Completion::Done(None),
            }
        }
        match &self.completion {
            Completion::Done(Some(output)) => RoundOutcome::Completed(output.clone()),
            _ => RoundOutcome::Abandoned,
        }
    }

    /// Wait for the round to finish
    pub async fn outcome(self) -> RoundOutcome {
        match self.completion {
            Completion::Waiting(receiver) => match receiver.await {
                Ok(output) => RoundOutcome::Completed(output),
                Err(_) => RoundOutcome::Abandoned,
            },
            Completion::Done(Some(output)) => RoundOutcome::Completed(output),
            Completion::Done(None) => RoundOutcome::Abandoned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> RoundOutput {
        RoundOutput {
            id: 3,
            kind: RoundKind::Random,
            contributors: vec![0, 1],
            shares: Vec::new(),
        }
    }

    #[test]
    fn test_try_outcome_caches_result() {
        let (tx, rx) = oneshot::channel();
        let mut handle = RoundHandle::new(3, rx);
        assert_eq!(handle.try_outcome(), RoundOutcome::Pending);
        tx.send(output()).unwrap();
        assert_eq!(handle.try_outcome(), RoundOutcome::Completed(output()));
        assert_eq!(handle.try_outcome(), RoundOutcome::Completed(output()));
    }

    #[test]
    fn test_dropped_sender_means_abandoned() {
        let (tx, rx) = oneshot::channel::<RoundOutput>();
        let mut handle = RoundHandle::new(1, rx);
        drop(tx);
        assert_eq!(handle.try_outcome(), RoundOutcome::Abandoned);
    }

    #[tokio::test]
    async fn test_outcome_awaits() {
        let (tx, rx) = oneshot::channel();
        let handle = RoundHandle::new(3, rx);
        tokio::spawn(async move {
            let _ = tx.send(output());
        });
        assert_eq!(handle.outcome().await, RoundOutcome::Completed(output()));
    }

    #[test]
    fn test_polynomial_count() {
        assert_eq!(RoundKind::Random.polynomial_count(), 1);
        assert_eq!(RoundKind::Recovery { target: 2, secrets: 0 }.polynomial_count(), 1);
        assert_eq!(RoundKind::Recovery { target: 2, secrets: 3 }.polynomial_count(), 4);
        assert!(RoundState::Abandoned.is_terminal());
        assert!(!RoundState::AwaitingMissing.is_terminal());
    }
}
