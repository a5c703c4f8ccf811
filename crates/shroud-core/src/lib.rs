//! Shroud Core - algebra and wire formats for verifiable secret sharing
//!
//! This crate provides the building blocks the confidentiality scheme is
//! assembled from: prime fields, polynomials, parameterized elliptic curves,
//! the three commitment families, shares, and the big-endian wire codec
//! every replicated message is written with.

pub mod commitment;
pub mod curve;
pub mod error;
pub mod field;
pub mod polynomial;
pub mod share;
pub mod wire;

pub use commitment::{
    Commitment, CommitmentAlgebra, CommitmentFamily, CommitmentKind, ConstantCommitment,
    ConstantScheme, EllipticCurveCommitment, LinearCommitment, LinearGroup, LinearScheme,
};
pub use curve::{CurveParameters, CurveRegistry, EllipticCurve, Point};
pub use error::{Error, Result};
pub use field::Field;
pub use polynomial::{interpolate_at, Polynomial};
pub use share::{
    ConfidentialData, ConfidentialSnapshot, ReplicaId, Share, Shareholder, VerifiableShare,
};
pub use wire::{WireReader, WireWriter};

/// Re-exported so dependents name one big-integer type
pub use num_bigint::BigUint;
