//! Run at most one engine per session.

use crate::{
    engine::{Config, Engine, Mailbox},
    roster::Roster,
    store::{Record, Store},
    transport::Transport,
    Error,
};
use rand::{CryptoRng, RngCore};
use std::collections::HashMap;
use tracing::{debug, info};

/// Tracks the running engine of each session.
pub struct Registry<S: Store> {
    store: S,
    sessions: HashMap<u64, Mailbox>,
}

impl<S: Store> Registry<S> {
    /// Creates a registry whose engines persist to `store`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            sessions: HashMap::new(),
        }
    }

    /// Starts an engine for `config.session`.
    ///
    /// If an engine for the session is still running, its mailbox is returned instead and
    /// the provided interfaces are dropped.
    pub fn start<R, T, G>(
        &mut self,
        config: Config,
        roster: R,
        transport: T,
        rng: G,
    ) -> Result<Mailbox, Error>
    where
        R: Roster,
        T: Transport,
        G: RngCore + CryptoRng + Send + 'static,
    {
        let session = config.session;
        if let Some(mailbox) = self.sessions.get(&session) {
            if !mailbox.is_closed() {
                debug!(session, "session already running");
                return Ok(mailbox.clone());
            }
        }
        let (engine, mailbox) = Engine::new(config, roster, transport, self.store.clone(), rng)?;
        engine.start();
        info!(session, "started session");
        self.sessions.insert(session, mailbox.clone());
        Ok(mailbox)
    }

    /// Returns the mailbox of a running session.
    pub fn get(&self, session: u64) -> Option<Mailbox> {
        self.sessions
            .get(&session)
            .filter(|mailbox| !mailbox.is_closed())
            .cloned()
    }

    /// Returns the persisted output of a session.
    pub fn record(&self, session: u64) -> Result<Option<Record>, Error> {
        Ok(self.store.get(session)?)
    }

    /// Stops a session and removes its persisted share.
    ///
    /// Returns whether a share was removed.
    pub async fn retire(&mut self, session: u64) -> Result<bool, Error> {
        if let Some(mut mailbox) = self.sessions.remove(&session) {
            mailbox.stop().await;
        }
        let removed = self.store.remove(session)?;
        info!(session, removed, "retired session");
        Ok(removed)
    }
}
