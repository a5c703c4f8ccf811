//! Error types for Shroud core algebra and wire formats

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Unknown elliptic curve: {0}")]
    UnknownCurve(String),

    #[error("Point is not on curve {0}")]
    PointNotOnCurve(String),

    #[error("Incompatible commitments: {0}")]
    IncompatibleCommitments(String),

    #[error("Not enough shares: need {needed}, got {got}")]
    NotEnoughShares { needed: usize, got: usize },

    #[error("Duplicate shareholder {0} in interpolation set")]
    DuplicateShareholder(u32),

    #[error("Secret does not fit in the field: {0}")]
    SecretTooLarge(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
}
