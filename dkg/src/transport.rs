//! Point-to-point messaging between committee members.

use crate::roster::PeerId;
use bytes::Bytes;
use std::{error::Error as StdError, fmt::Debug, future::Future};

/// Enum indicating the set of recipients to send a message to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipients {
    /// Every connected peer.
    All,
    One(PeerId),
}

/// A message received from a peer.
pub type Message = (PeerId, Bytes);

/// Interface for exchanging messages with the other members of a session.
///
/// Delivery is best-effort: messages may be dropped or reordered, and the
/// protocol running on top is responsible for detecting missing input.
pub trait Transport: Send + 'static {
    /// Error that can occur when using the transport.
    type Error: Debug + StdError + Send + Sync;

    /// Register as `local` and attempt to connect to `peers`.
    ///
    /// Returns the number of peers that were reached.
    fn connect(
        &mut self,
        local: PeerId,
        peers: Vec<PeerId>,
    ) -> impl Future<Output = Result<usize, Self::Error>> + Send;

    /// Send a message to a set of recipients, returning the peers it was delivered to.
    fn send(
        &mut self,
        recipients: Recipients,
        message: Bytes,
    ) -> impl Future<Output = Result<Vec<PeerId>, Self::Error>> + Send;

    /// Receive a message from an arbitrary peer.
    fn recv(&mut self) -> impl Future<Output = Result<Message, Self::Error>> + Send;

    /// Disconnect from every peer and release the local identity.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}
