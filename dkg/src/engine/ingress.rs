use crate::session::State;
use futures::{channel::mpsc, SinkExt};
use tokio::sync::watch;

/// Message types that can be sent to the `Mailbox`
pub enum Message {
    /// Stop the session and release its transport.
    Stop,
}

/// Ingress mailbox for [`Engine`](super::Engine).
///
/// State is published on a watch channel, so the last snapshot stays readable after the
/// engine exited.
#[derive(Clone)]
pub struct Mailbox {
    session: u64,
    sender: mpsc::Sender<Message>,
    state: watch::Receiver<State>,
}

impl Mailbox {
    pub(super) fn new(
        session: u64,
        sender: mpsc::Sender<Message>,
        state: watch::Receiver<State>,
    ) -> Self {
        Self {
            session,
            sender,
            state,
        }
    }

    /// Returns the session driven by the engine.
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Returns whether the engine is no longer running.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Returns the latest snapshot of the session.
    pub fn state(&self) -> State {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes.
    ///
    /// The current state is available immediately through [watch::Receiver::borrow].
    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.state.clone()
    }

    /// Wait for the session to reach `Complete` or `Error`.
    ///
    /// If the engine exits first, its final state is returned.
    pub async fn wait(&self) -> State {
        let mut updates = self.state.clone();
        loop {
            let state = updates.borrow_and_update().clone();
            if state.status.is_terminal() {
                return state;
            }
            if updates.changed().await.is_err() {
                return updates.borrow().clone();
            }
        }
    }

    /// Stop the session.
    ///
    /// Stopping an engine that already exited is not an error.
    pub async fn stop(&mut self) {
        let _ = self.sender.send(Message::Stop).await;
    }
}
