//! Committee membership as published by the market.

use apm_cryptography::commitment::Address;
use commonware_utils::hex;
use std::{error::Error as StdError, fmt, future::Future};

/// Length of the opening commitment embedded in a [PeerId].
const OPENING_LENGTH: usize = 4;

/// A committee member registered for a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub address: Address,
    /// Whether the member has already published its key share commitment.
    pub key_share_submitted: bool,
    /// Whether the member has already submitted its decryption share.
    pub decryption_submitted: bool,
}

impl Member {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            key_share_submitted: false,
            decryption_submitted: false,
        }
    }

    /// Returns the opening commitment used to derive the member's [PeerId].
    ///
    /// Members that already submitted a key share open with zeros, others with the
    /// leading bytes of their address.
    pub fn opening(&self) -> [u8; OPENING_LENGTH] {
        let mut opening = [0u8; OPENING_LENGTH];
        if !self.key_share_submitted {
            opening.copy_from_slice(&self.address.as_ref()[..OPENING_LENGTH]);
        }
        opening
    }

    /// Returns the transport identity of the member in `session`.
    pub fn peer(&self, session: u64) -> PeerId {
        PeerId::new(session, &self.address, &self.opening())
    }
}

/// Transport identity of a committee member within a session.
///
/// Formatted as `apm_{session}_{address[..4]}_{opening[..4]}` (hex).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(session: u64, address: &Address, opening: &[u8]) -> Self {
        let address = &address.as_ref()[..OPENING_LENGTH];
        let opening = &opening[..opening.len().min(OPENING_LENGTH)];
        Self(format!("apm_{}_{}_{}", session, hex(address), hex(opening)))
    }

    /// Parses a peer identifier, returning its session and hex components.
    pub fn parse(id: &str) -> Option<(u64, &str, &str)> {
        let rest = id.strip_prefix("apm_")?;
        let mut parts = rest.splitn(3, '_');
        let session = parts.next()?.parse().ok()?;
        let address = parts.next()?;
        let opening = parts.next()?;
        let is_hex = |s: &str| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        };
        if !is_hex(address) || !is_hex(opening) {
            return None;
        }
        Some((session, address, opening))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of the committee registered for a session (typically a contract).
pub trait Roster: Send + 'static {
    /// Error that can occur when fetching members.
    type Error: fmt::Debug + StdError + Send + Sync;

    /// Fetch the ordered list of members currently registered for `session`.
    ///
    /// The position of a member in the list (plus one) is its index in the protocol.
    fn members(
        &mut self,
        session: u64,
    ) -> impl Future<Output = Result<Vec<Member>, Self::Error>> + Send;
}
