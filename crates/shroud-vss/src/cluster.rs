//! In-process cluster for tests and simulation
//!
//! [`LocalLog`] is a single FIFO queue standing in for the replication
//! engine: whatever is submitted is delivered, in submission order, to
//! every replica. [`LocalCluster`] wires `n` replicas to it and plays the
//! host: it hands every entry to each replica's protocol, opens recovery
//! rounds for ordered recovery requests and moves recovery bundles between
//! replicas point to point.

use std::collections::VecDeque;
use std::sync::Arc;

use num_bigint::BigUint;
use parking_lot::Mutex;
use shroud_core::{ConfidentialSnapshot, ReplicaId, Share, VerifiableShare};
use tracing::{debug, info};

use crate::config::SchemeConfig;
use crate::dkg::{
    MessageContext, OrderedLog, PolynomialProposalProtocol, RoundHandle, RoundKind, RoundOutcome,
    RoundRequest,
};
use crate::error::{Result, VssError};
use crate::keys::StaticKeyDirectory;
use crate::recovery::{
    InstalledState, RecoveryApplicationState, RecoveryCoordinator, RecoveryRequest,
};
use crate::scheme::ConfidentialityScheme;

/// Seed every local replica derives its keys from
pub const CLUSTER_SEED: &[u8] = b"shroud/local-cluster";

/// Entry the harness orders to keep round windows moving
pub const TICK: &[u8] = b"tick";

/// Entries delivered before [`LocalCluster::run`] gives up
pub const DEFAULT_RUN_LIMIT: usize = 10_000;

/// Rewrites or drops an entry a replica submits
pub type EntryFilter = Box<dyn Fn(ReplicaId, Vec<u8>) -> Option<Vec<u8>> + Send + Sync>;

#[derive(Default)]
struct LogInner {
    queue: VecDeque<(ReplicaId, Vec<u8>)>,
    transcript: Vec<(ReplicaId, Vec<u8>)>,
}

/// Totally ordered in-memory log
#[derive(Default)]
pub struct LocalLog {
    inner: Mutex<LogInner>,
    filter: Mutex<Option<EntryFilter>>,
}

impl std::fmt::Debug for LocalLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LocalLog")
            .field("queued", &inner.queue.len())
            .field("ordered", &inner.transcript.len())
            .finish()
    }
}

impl LocalLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a filter applied to every later submission
    pub fn set_filter(&self, filter: EntryFilter) {
        *self.filter.lock() = Some(filter);
    }

    pub fn clear_filter(&self) {
        *self.filter.lock() = None;
    }

    /// Submit on behalf of `sender`
    pub fn push(&self, sender: ReplicaId, entry: Vec<u8>) {
        let entry = match self.filter.lock().as_ref() {
            Some(filter) => filter(sender, entry),
            None => Some(entry),
        };
        match entry {
            Some(entry) => self.inner.lock().queue.push_back((sender, entry)),
            None => debug!(sender, "entry dropped by filter"),
        }
    }

    /// Order the next entry
    pub fn pop(&self) -> Option<(ReplicaId, Vec<u8>)> {
        let mut inner = self.inner.lock();
        let next = inner.queue.pop_front()?;
        inner.transcript.push(next.clone());
        Some(next)
    }

    pub fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Every entry ordered so far
    pub fn transcript(&self) -> Vec<(ReplicaId, Vec<u8>)> {
        self.inner.lock().transcript.clone()
    }

    /// Submission handle bound to one replica
    pub fn endpoint(self: &Arc<Self>, replica: ReplicaId) -> Arc<LogEndpoint> {
        Arc::new(LogEndpoint {
            replica,
            log: Arc::clone(self),
        })
    }
}

/// A replica's view of the [`LocalLog`]
#[derive(Debug)]
pub struct LogEndpoint {
    replica: ReplicaId,
    log: Arc<LocalLog>,
}

impl OrderedLog for LogEndpoint {
    fn submit(&self, entry: Vec<u8>) -> Result<()> {
        self.log.push(self.replica, entry);
        Ok(())
    }
}

/// One simulated replica
pub struct LocalReplica {
    id: ReplicaId,
    scheme: Arc<ConfidentialityScheme>,
    protocol: Arc<PolynomialProposalProtocol>,
    recovery: RecoveryCoordinator,
    snapshot: Mutex<ConfidentialSnapshot>,
    recoveries: Mutex<Vec<(RecoveryRequest, RoundHandle)>>,
}

impl std::fmt::Debug for LocalReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalReplica").field("id", &self.id).finish()
    }
}

impl LocalReplica {
    pub fn id(&self) -> ReplicaId {
        self.id
    }

    pub fn scheme(&self) -> &Arc<ConfidentialityScheme> {
        &self.scheme
    }

    pub fn protocol(&self) -> &Arc<PolynomialProposalProtocol> {
        &self.protocol
    }

    pub fn recovery(&self) -> &RecoveryCoordinator {
        &self.recovery
    }

    pub fn snapshot(&self) -> ConfidentialSnapshot {
        self.snapshot.lock().clone()
    }

    pub fn replace_snapshot(&self, snapshot: ConfidentialSnapshot) {
        *self.snapshot.lock() = snapshot;
    }

    /// Drop every share, as after a crash with lost state
    pub fn wipe(&self) {
        *self.snapshot.lock() = ConfidentialSnapshot::default();
    }

    fn deliver(&self, sender: ReplicaId, cid: i32, entry: &[u8]) -> Result<()> {
        if let Some(request) = RecoveryRequest::from_bytes(entry)? {
            if request.target == sender {
                let secrets = self.snapshot.lock().shares.len();
                if let Some(handle) = self.recovery.start_recovery(&request, secrets)? {
                    self.recoveries.lock().push((request, handle));
                }
            }
        }
        if let Err(e) = self.protocol.observe(entry, MessageContext::new(sender, cid)) {
            debug!(replica = self.id, error = %e, "entry rejected");
        }
        Ok(())
    }

    fn take_recovery(&self, target: ReplicaId) -> Option<(RecoveryRequest, RoundHandle)> {
        let mut recoveries = self.recoveries.lock();
        let index = recoveries.iter().position(|(r, _)| r.target == target)?;
        Some(recoveries.remove(index))
    }
}

/// `n` replicas sharing one [`LocalLog`]
#[derive(Debug)]
pub struct LocalCluster {
    log: Arc<LocalLog>,
    replicas: Vec<LocalReplica>,
    threshold: usize,
    cid: i32,
    last_checkpoint_cid: i32,
}

impl LocalCluster {
    /// Replicas `0..n` tolerating `threshold` faults
    pub fn new(n: usize, threshold: usize, config: &SchemeConfig) -> Result<Self> {
        let members: Vec<ReplicaId> = (0..n as ReplicaId).collect();
        let log = Arc::new(LocalLog::new());
        let mut replicas = Vec::with_capacity(n);
        for &id in &members {
            let keys = Arc::new(StaticKeyDirectory::new(CLUSTER_SEED, id, &members)?);
            let scheme = Arc::new(ConfidentialityScheme::new(config, &members, threshold, keys)?);
            let endpoint: Arc<dyn OrderedLog> = log.endpoint(id);
            let protocol = Arc::new(PolynomialProposalProtocol::new(
                Arc::clone(&scheme),
                Arc::clone(&endpoint),
            ));
            let recovery = RecoveryCoordinator::new(Arc::clone(&scheme), Arc::clone(&protocol), endpoint);
            replicas.push(LocalReplica {
                id,
                scheme,
                protocol,
                recovery,
                snapshot: Mutex::new(ConfidentialSnapshot::default()),
                recoveries: Mutex::new(Vec::new()),
            });
        }
        info!(n, threshold, vss = %config.vss, "local cluster started");
        Ok(Self {
            log,
            replicas,
            threshold,
            cid: 0,
            last_checkpoint_cid: 0,
        })
    }

    pub fn log(&self) -> &Arc<LocalLog> {
        &self.log
    }

    pub fn replicas(&self) -> &[LocalReplica] {
        &self.replicas
    }

    pub fn replica(&self, id: ReplicaId) -> Result<&LocalReplica> {
        self.replicas
            .get(id as usize)
            .ok_or(VssError::UnknownReplica(id))
    }

    pub fn n(&self) -> usize {
        self.replicas.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Consensus id of the last delivered entry
    pub fn cid(&self) -> i32 {
        self.cid
    }

    pub fn last_checkpoint_cid(&self) -> i32 {
        self.last_checkpoint_cid
    }

    /// Mark the current position as checkpointed
    pub fn checkpoint(&mut self) {
        self.last_checkpoint_cid = self.cid;
    }

    /// Order `count` tick entries, advancing the consensus id
    pub fn advance(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            self.log.push(0, TICK.to_vec());
        }
        self.run(count)?;
        Ok(())
    }

    /// Open a round on every replica at the current log position
    ///
    /// Every replica is asked even when one rejects the request, so round
    /// ids stay aligned.
    pub fn start_round(&self, kind: RoundKind) -> Result<Vec<RoundHandle>> {
        let contributors: Vec<ReplicaId> = self.replicas.iter().map(|r| r.id).collect();
        let started: Vec<Result<RoundHandle>> = self
            .replicas
            .iter()
            .map(|r| {
                r.protocol
                    .start_round(RoundRequest::new(kind.clone(), contributors.clone()))
            })
            .collect();
        started.into_iter().collect()
    }

    pub fn start_random_key_round(&self, curve: &str) -> Result<Vec<RoundHandle>> {
        self.start_round(RoundKind::RandomKey {
            curve: curve.to_string(),
        })
    }

    fn pending(&self) -> bool {
        self.replicas
            .iter()
            .any(|r| r.protocol.pending_rounds() > 0)
    }

    /// Deliver entries until the queue drains and no round is open
    ///
    /// Orders tick entries while rounds are still waiting on their windows.
    /// Returns the number of entries delivered.
    pub fn run(&mut self, limit: usize) -> Result<usize> {
        let mut delivered = 0;
        while delivered < limit {
            let (sender, entry) = match self.log.pop() {
                Some(next) => next,
                None if self.pending() => {
                    self.log.push(0, TICK.to_vec());
                    continue;
                }
                None => break,
            };
            self.cid += 1;
            delivered += 1;
            for replica in &self.replicas {
                replica.deliver(sender, self.cid, &entry)?;
            }
        }
        debug!(delivered, cid = self.cid, "log drained");
        Ok(delivered)
    }

    /// Deal `secret` to every replica as a client would
    pub fn share_secret(&self, secret: &BigUint) -> Result<()> {
        let shares = self.replicas[0].scheme.share(secret)?;
        for replica in &self.replicas {
            let local = replica.scheme.local_shareholder()?;
            let share = shares
                .iter()
                .find(|s| s.shareholder() == local)
                .cloned()
                .ok_or(VssError::UnknownReplica(replica.id))?;
            let data = replica.scheme.admit(share, self.replicas[0].id)?;
            replica.snapshot.lock().shares.push(data.share().clone());
        }
        Ok(())
    }

    /// Set the plain application state on every replica
    pub fn set_plain_state(&self, plain: &[u8]) {
        for replica in &self.replicas {
            replica.snapshot.lock().plain = plain.to_vec();
        }
    }

    /// Reconstruct the `index`-th shared secret from every replica's share
    pub fn reconstruct(&self, index: usize) -> Result<BigUint> {
        let shares: Vec<VerifiableShare> = self
            .replicas
            .iter()
            .filter_map(|r| r.snapshot.lock().shares.get(index).cloned())
            .collect();
        self.replicas[0].scheme.combine_verified(&shares)
    }

    /// Reconstruct from the shares of `replicas` only, without verification
    pub fn reconstruct_from(&self, index: usize, replicas: &[ReplicaId]) -> Result<BigUint> {
        let mut shares: Vec<Share> = Vec::with_capacity(replicas.len());
        for id in replicas {
            if let Some(share) = self.replica(*id)?.snapshot.lock().shares.get(index) {
                shares.push(share.share().clone());
            }
        }
        self.replicas[0].scheme.combine(&shares)
    }

    /// Recover `target` from the healthy replicas
    ///
    /// Orders the request, runs the recovery round, refreshes every healthy
    /// replica's snapshot, delivers the bundles and installs the result on
    /// the target.
    pub fn recover(&mut self, target: ReplicaId) -> Result<InstalledState> {
        let states = self.prepare_recovery(target)?;
        self.install_recovery(target, &states)
    }

    /// Everything in [`recover`](Self::recover) up to installation
    ///
    /// Returns the bundles as the target opens them.
    pub fn prepare_recovery(&mut self, target: ReplicaId) -> Result<Vec<RecoveryApplicationState>> {
        let last_cid = self.cid;
        self.replica(target)?.recovery.request_recovery(last_cid)?;
        self.run(DEFAULT_RUN_LIMIT)?;

        let last_checkpoint_cid = self.last_checkpoint_cid;
        let mut bundles = Vec::new();
        for replica in &self.replicas {
            let Some((request, mut handle)) = replica.take_recovery(target) else {
                continue;
            };
            let RoundOutcome::Completed(output) = handle.try_outcome() else {
                info!(replica = replica.id, "recovery round did not complete");
                continue;
            };
            let snapshot = replica.snapshot();
            let (refreshed, state) = replica.recovery.build_state(
                &output,
                &snapshot,
                last_checkpoint_cid.min(request.last_cid),
                request.last_cid,
            )?;
            replica.replace_snapshot(refreshed);
            bundles.push((replica.id, replica.recovery.seal_state(&state)?));
        }

        let target_replica = self.replica(target)?;
        bundles
            .iter()
            .map(|(from, sealed)| target_replica.recovery.open_state(*from, sealed))
            .collect()
    }

    /// Rebuild `target`'s shares from opened bundles and install them
    pub fn install_recovery(
        &self,
        target: ReplicaId,
        states: &[RecoveryApplicationState],
    ) -> Result<InstalledState> {
        let target_replica = self.replica(target)?;
        let installed = target_replica.recovery.install(states)?;
        target_replica.replace_snapshot(installed.snapshot.clone());
        info!(target_replica = target, last_cid = installed.last_cid, "replica recovered");
        Ok(installed)
    }
}
