//! Shroud VSS - confidentiality for Byzantine-fault-tolerant replicated services
//!
//! This crate keeps client secrets out of any single replica:
//!
//! - [`ConfidentialityScheme`] shares secrets into verifiable shares,
//!   verifies and combines them, and encrypts share payloads between
//!   replicas
//! - [`PolynomialProposalProtocol`] lets the replicas jointly mint fresh
//!   shared secrets over the replicated log
//! - [`RecoveryCoordinator`] refreshes shares and rebuilds the state of a
//!   recovering replica without revealing any secret
//!
//! The replication engine itself stays outside: the host supplies an
//! [`OrderedLog`](dkg::OrderedLog) to submit entries to and feeds every
//! ordered entry back through
//! [`PolynomialProposalProtocol::observe`]. [`cluster`] provides an
//! in-process stand-in for tests and simulation.

pub mod channel;
pub mod cluster;
pub mod config;
pub mod directory;
pub mod dkg;
pub mod error;
pub mod keys;
pub mod messages;
pub mod recovery;
pub mod scheme;

pub use config::SchemeConfig;
pub use dkg::{
    MessageContext, OrderedLog, PolynomialProposalProtocol, RoundHandle, RoundKind, RoundOutcome,
    RoundOutput, RoundRequest, RoundState,
};
pub use error::{Result, VssError};
pub use keys::{ChannelKey, KeyDirectory, StaticKeyDirectory};
pub use recovery::{InstalledState, RecoveryApplicationState, RecoveryCoordinator, RecoveryRequest};
pub use scheme::{ConfidentialityScheme, SharedBytes, SharingMode};
