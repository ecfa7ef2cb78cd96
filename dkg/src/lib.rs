//! Coordinate distributed key generation among a market's committee.
//!
//! Each committee member runs a [session::Session] that walks through the rounds of a
//! Feldman DKG (commitments, then shares) with the other members, verifying every share it
//! receives against the dealer's commitment. On success every honest member holds a share of
//! a joint secret whose public key is used to encrypt bets.
//!
//! The session is a synchronous state machine. The [engine::Engine] drives it on a task,
//! wiring it to the committee [roster::Roster], the peer [transport::Transport], and the
//! share [store::Store]. The [registry::Registry] runs at most one engine per session id.
//!
//! # Status
//!
//! `apm-dkg` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

use session::Status;
use thiserror::Error;

pub mod engine;
pub mod mocks;
pub mod registry;
pub mod roster;
pub mod session;
pub mod store;
pub mod transport;
pub mod wire;

/// Errors that can occur during a session.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid threshold: {0}")]
    InvalidThreshold(u32),
    #[error("session already started")]
    AlreadyStarted,
    #[error("not in committee")]
    NotInCommittee,
    #[error("protocol timeout in {0}")]
    ProtocolTimeout(Status),
    #[error("dealer {dealer} equivocated")]
    Equivocation { dealer: u32 },
    #[error("share from dealer {dealer} failed verification")]
    VerificationFailure { dealer: u32 },
    #[error("invalid commitment from dealer {dealer}")]
    InvalidCommitment { dealer: u32 },
    #[error("stopped")]
    Stopped,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("roster error: {0}")]
    Roster(String),
    #[error("vss error: {0}")]
    Vss(#[from] apm_cryptography::vss::Error),
    #[error("wire error: {0}")]
    Wire(#[from] commonware_codec::Error),
    #[error("store error: {0}")]
    Store(#[from] store::Error),
}
