//! Error types for the confidentiality scheme and its protocols

use shroud_core::ReplicaId;
use thiserror::Error;

/// Result type for scheme and protocol operations
pub type Result<T> = std::result::Result<T, VssError>;

/// Errors that can occur while sharing, verifying or running rounds
#[derive(Debug, Error)]
pub enum VssError {
    /// Invalid configuration at construction time
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A share or contribution failed commitment verification
    #[error("Verification failed for contribution from replica {sender}: {reason}")]
    Verification { sender: ReplicaId, reason: String },

    /// Verified shares that do not lie on one degree-`t` polynomial
    #[error("Share of shareholder {shareholder} is inconsistent with the other shares")]
    InconsistentShares { shareholder: u32 },

    /// A payload could not be encrypted for a peer
    #[error("Encryption failed for payload to replica {peer}")]
    Encryption { peer: ReplicaId },

    /// A payload could not be decrypted or authenticated
    #[error("Decryption failed for payload from replica {peer}")]
    Decryption { peer: ReplicaId },

    /// No channel key or verifying key for a peer
    #[error("Unknown replica {0}")]
    UnknownReplica(ReplicaId),

    /// Signing failed
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Round bookkeeping violated
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Not enough agreeing recovery states to rebuild
    #[error("Insufficient recovery states: need {needed}, got {got}")]
    InsufficientRecoveryStates { needed: usize, got: usize },

    /// The ordered log refused an entry
    #[error("Log submission failed: {0}")]
    Log(String),

    /// Algebra or wire error
    #[error(transparent)]
    Core(#[from] shroud_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
