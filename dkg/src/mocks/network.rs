//! An in-process network connecting any number of [Transport]s.
//!
//! Each peer has an inbox that is created the first time anyone sends to it, so
//! messages sent before a peer connects are delivered once it does.

use crate::{
    roster::PeerId,
    transport::{self, Recipients},
};
use bytes::Bytes;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Errors that can occur when using a mock [Transport].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("not connected")]
    NotConnected,
    #[error("peer already registered: {0}")]
    AlreadyRegistered(PeerId),
    #[error("network closed")]
    Closed,
}

struct Inbox {
    sender: mpsc::UnboundedSender<transport::Message>,
    receiver: Option<mpsc::UnboundedReceiver<transport::Message>>,
}

impl Inbox {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Some(receiver),
        }
    }
}

#[derive(Default)]
struct State {
    inboxes: HashMap<PeerId, Inbox>,
    blocked: HashSet<PeerId>,
}

/// Shared medium that routes messages between [Transport]s.
#[derive(Clone, Default)]
pub struct Network {
    state: Arc<Mutex<State>>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new, unconnected transport on this network.
    pub fn transport(&self) -> Transport {
        Transport {
            network: self.clone(),
            local: None,
            peers: Vec::new(),
            receiver: None,
        }
    }

    /// Drop every message sent to or from `peer`.
    pub fn block(&self, peer: PeerId) {
        if let Ok(mut state) = self.state.lock() {
            state.blocked.insert(peer);
        }
    }

    fn register(&self, local: &PeerId) -> Result<mpsc::UnboundedReceiver<transport::Message>, Error> {
        let mut state = self.state.lock().map_err(|_| Error::Closed)?;
        state
            .inboxes
            .entry(local.clone())
            .or_insert_with(Inbox::new)
            .receiver
            .take()
            .ok_or_else(|| Error::AlreadyRegistered(local.clone()))
    }

    fn deliver(&self, from: &PeerId, to: &[PeerId], message: Bytes) -> Result<Vec<PeerId>, Error> {
        let mut state = self.state.lock().map_err(|_| Error::Closed)?;
        if state.blocked.contains(from) {
            return Ok(Vec::new());
        }
        let mut delivered = Vec::with_capacity(to.len());
        for peer in to {
            if state.blocked.contains(peer) {
                continue;
            }
            let inbox = state.inboxes.entry(peer.clone()).or_insert_with(Inbox::new);
            if inbox.sender.send((from.clone(), message.clone())).is_ok() {
                delivered.push(peer.clone());
            }
        }
        Ok(delivered)
    }

    fn unregister(&self, local: &PeerId) {
        if let Ok(mut state) = self.state.lock() {
            state.inboxes.remove(local);
        }
    }
}

/// A member's connection to a [Network].
pub struct Transport {
    network: Network,
    local: Option<PeerId>,
    peers: Vec<PeerId>,
    receiver: Option<mpsc::UnboundedReceiver<transport::Message>>,
}

impl transport::Transport for Transport {
    type Error = Error;

    async fn connect(&mut self, local: PeerId, peers: Vec<PeerId>) -> Result<usize, Error> {
        let receiver = self.network.register(&local)?;
        debug!(%local, peers = peers.len(), "registered");
        self.receiver = Some(receiver);
        self.local = Some(local);
        self.peers = peers;
        Ok(self.peers.len())
    }

    async fn send(&mut self, recipients: Recipients, message: Bytes) -> Result<Vec<PeerId>, Error> {
        let local = self.local.as_ref().ok_or(Error::NotConnected)?;
        let to = match recipients {
            Recipients::All => self.peers.clone(),
            Recipients::One(peer) => vec![peer],
        };
        self.network.deliver(local, &to, message)
    }

    async fn recv(&mut self) -> Result<transport::Message, Error> {
        let receiver = self.receiver.as_mut().ok_or(Error::NotConnected)?;
        receiver.recv().await.ok_or(Error::Closed)
    }

    async fn close(&mut self) {
        if let Some(local) = self.local.take() {
            debug!(%local, "closed");
            self.network.unregister(&local);
        }
        self.receiver = None;
        self.peers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport as _;

    fn peer(name: &str) -> PeerId {
        PeerId::new(1, &"0x0102030405060708090a0b0c0d0e0f1011121314".parse().unwrap(), name.as_bytes())
    }

    #[tokio::test]
    async fn test_messages_queue_until_connect() {
        let network = Network::new();
        let (a, b) = (peer("a"), peer("b"));
        let mut first = network.transport();
        let mut second = network.transport();

        assert_eq!(
            first.send(Recipients::All, Bytes::from_static(b"x")).await,
            Err(Error::NotConnected)
        );
        assert_eq!(first.connect(a.clone(), vec![b.clone()]).await, Ok(1));
        let delivered = first
            .send(Recipients::All, Bytes::from_static(b"early"))
            .await
            .unwrap();
        assert_eq!(delivered, vec![b.clone()]);

        second.connect(b.clone(), vec![a.clone()]).await.unwrap();
        assert_eq!(
            second.recv().await.unwrap(),
            (a.clone(), Bytes::from_static(b"early"))
        );
        second
            .send(Recipients::One(a.clone()), Bytes::from_static(b"reply"))
            .await
            .unwrap();
        assert_eq!(first.recv().await.unwrap(), (b, Bytes::from_static(b"reply")));
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let network = Network::new();
        let mut first = network.transport();
        let mut second = network.transport();
        first.connect(peer("a"), Vec::new()).await.unwrap();
        assert_eq!(
            second.connect(peer("a"), Vec::new()).await,
            Err(Error::AlreadyRegistered(peer("a")))
        );

        // Identity is free again once closed
        first.close().await;
        assert_eq!(first.recv().await, Err(Error::NotConnected));
        second.connect(peer("a"), Vec::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_blocked_peer() {
        let network = Network::new();
        let (a, b) = (peer("a"), peer("b"));
        let mut first = network.transport();
        first.connect(a, vec![b.clone()]).await.unwrap();
        network.block(b);
        let delivered = first
            .send(Recipients::All, Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert!(delivered.is_empty());
    }
}
