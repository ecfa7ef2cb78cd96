use super::{Config, Mailbox, Message};
use crate::{
    roster::Roster,
    session::{self, Output, Session, State, Status},
    store::{self, Store},
    transport::{Recipients, Transport},
    wire, Error,
};
use commonware_codec::{Decode, Encode};
use futures::{channel::mpsc, StreamExt};
use rand::{CryptoRng, RngCore};
use std::collections::VecDeque;
use tokio::{
    sync::watch,
    task::{self, JoinHandle},
    time::{sleep_until, timeout, Instant},
};
use tracing::{debug, info, warn};

/// Instance of the key generation engine for a single session.
///
/// It is responsible for:
/// - Polling the roster until enough members registered
/// - Connecting to and exchanging messages with the other members
/// - Persisting the derived share
/// - Answering requests from its [Mailbox]
pub struct Engine<R: Roster, T: Transport, S: Store, G: RngCore + CryptoRng + Send + 'static> {
    ////////////////////////////////////////
    // Interfaces
    ////////////////////////////////////////
    roster: R,
    transport: T,
    store: S,

    ////////////////////////////////////////
    // Configuration
    ////////////////////////////////////////
    config: Config,

    ////////////////////////////////////////
    // State
    ////////////////////////////////////////
    session: Session<G>,

    ////////////////////////////////////////
    // Messaging
    ////////////////////////////////////////
    mailbox: mpsc::Receiver<Message>,
}

impl<R: Roster, T: Transport, S: Store, G: RngCore + CryptoRng + Send + 'static> Engine<R, T, S, G> {
    /// Creates a new engine with the given configuration.
    /// Returns the engine and a mailbox for sending messages to the engine.
    pub fn new(
        config: Config,
        roster: R,
        transport: T,
        store: S,
        rng: G,
    ) -> Result<(Self, Mailbox), Error> {
        let mut session = Session::new(
            session::Config {
                session: config.session,
                address: config.address,
                threshold: config.threshold,
            },
            rng,
        )?;

        // Publish every state change (the last one outlives the engine)
        let (updates, state) = watch::channel(session.state());
        session.on_state_change(Box::new(move |state| {
            updates.send_replace(state.clone());
        }));

        let (sender, receiver) = mpsc::channel(config.mailbox_size);
        let mailbox = Mailbox::new(config.session, sender, state);
        let engine = Self {
            roster,
            transport,
            store,
            config,
            session,
            mailbox: receiver,
        };
        Ok((engine, mailbox))
    }

    /// Starts the engine, returning a handle that resolves to the final state.
    pub fn start(self) -> JoinHandle<State> {
        tokio::spawn(self.run())
    }

    /// Inner run loop called by `start`.
    async fn run(mut self) -> State {
        let id = self.config.session;
        if let Err(err) = self.session.start() {
            warn!(session = id, ?err, "failed to start session");
            return self.session.state();
        }

        let backoff = self.config.backoff;
        let mut outputs = VecDeque::new();
        let mut attempt = 0;
        let mut next_poll = Instant::now();
        let mut phase = self.session.status();
        let mut deadline = Instant::now() + self.config.phase_timeout;
        let mut connected = false;
        loop {
            // Carry out everything the session asked for
            let mut released = false;
            while let Some(output) = outputs.pop_front() {
                match output {
                    Output::Connect { local, peers } => {
                        debug!(session = id, %local, peers = peers.len(), "connecting");
                        let result = timeout(
                            self.config.connect_timeout,
                            self.transport.connect(local, peers),
                        )
                        .await;
                        connected = true;
                        outputs.extend(match result {
                            Ok(Ok(established)) => self.session.connected(established),
                            Ok(Err(err)) => self.session.fail(Error::Transport(err.to_string())),
                            Err(_) => self.session.timeout(),
                        });
                    }
                    Output::Send { to, peer, message } => {
                        let recipients = Recipients::One(peer);
                        let message = message.encode().freeze();
                        if let Err(err) = self.transport.send(recipients, message).await {
                            warn!(session = id, to, ?err, "failed to send");
                        }
                    }
                    Output::Broadcast(message) => {
                        let message = message.encode().freeze();
                        match self.transport.send(Recipients::All, message).await {
                            Ok(delivered) => {
                                debug!(session = id, delivered = delivered.len(), "broadcast")
                            }
                            Err(err) => warn!(session = id, ?err, "failed to broadcast"),
                        }
                    }
                    Output::Persist(record) => {
                        // Stores may block on disk
                        let store = self.store.clone();
                        let result = task::spawn_blocking(move || store.set(id, &record))
                            .await
                            .unwrap_or_else(|err| Err(store::Error::Task(err.to_string())));
                        outputs.extend(self.session.persisted(result));
                    }
                    Output::Release => {
                        self.transport.close().await;
                        released = true;
                    }
                    Output::Completed(record) => {
                        info!(
                            session = id,
                            index = record.share.index,
                            public = ?record.public,
                            "key generation complete"
                        );
                    }
                }
            }
            if released {
                break;
            }

            // Every phase gets its own deadline
            let status = self.session.status();
            if status != phase {
                phase = status;
                deadline = Instant::now() + self.config.phase_timeout;
            }
            let waiting = status == Status::WaitingForPeers;

            // Waiting for the roster is bounded by the backoff instead
            let timed = status.is_running() && !waiting;

            tokio::select! {
                mail = self.mailbox.next() => {
                    let Some(mail) = mail else {
                        debug!(session = id, "mailbox closed");
                        outputs.extend(self.session.stop());
                        continue;
                    };
                    match mail {
                        Message::Stop => outputs.extend(self.session.stop()),
                    }
                },
                result = self.transport.recv(), if connected => {
                    match result {
                        Ok((peer, bytes)) => {
                            match wire::Message::decode_cfg(bytes, &self.config.threshold) {
                                Ok(message) => outputs.extend(self.session.receive(&peer, message)),
                                Err(err) => warn!(session = id, %peer, ?err, "dropping invalid message"),
                            }
                        }
                        Err(err) => {
                            outputs.extend(self.session.fail(Error::Transport(err.to_string())));
                        }
                    }
                },
                _ = sleep_until(deadline), if timed => {
                    outputs.extend(self.session.timeout());
                },
                _ = sleep_until(next_poll), if waiting => {
                    attempt += 1;
                    match self.roster.members(id).await {
                        Ok(members) => {
                            debug!(session = id, attempt, members = members.len(), "polled roster");
                            outputs.extend(self.session.roster(members));
                        }
                        Err(err) => warn!(session = id, attempt, ?err, "failed to fetch roster"),
                    }
                    if self.session.status() == Status::WaitingForPeers {
                        if attempt >= backoff.attempts {
                            warn!(session = id, attempt, "roster incomplete");
                            outputs.extend(self.session.timeout());
                        } else {
                            next_poll = Instant::now() + backoff.delay(attempt - 1);
                        }
                    }
                },
            }
        }
        self.session.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::Backoff,
        mocks::{Network, StaticRoster},
        roster::Member,
        store::{MemoryStore, Record},
        wire::Payload,
    };
    use apm_cryptography::{
        babyjubjub::primitives::group::Point,
        commitment::Address,
        vss::ops::{self, reconstruct_secret},
    };
    use rand::{rngs::StdRng, SeedableRng};
    use std::{
        sync::{mpsc as std_mpsc, Arc, Mutex},
        time::Duration,
    };

    fn addresses(n: u8) -> Vec<Address> {
        (1..=n).map(|i| Address::new([i; 20])).collect()
    }

    fn config(session: u64, address: Address, threshold: u32) -> Config {
        Config {
            backoff: Backoff {
                initial: Duration::from_millis(10),
                max: Duration::from_millis(40),
                attempts: 5,
            },
            phase_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(1),
            ..Config::new(session, address, threshold)
        }
    }

    /// Starts an engine for each address, returning their mailboxes, stores and handles.
    fn spawn(
        session: u64,
        threshold: u32,
        addresses: &[Address],
        roster: &StaticRoster,
        network: &Network,
    ) -> Vec<(Mailbox, MemoryStore, JoinHandle<State>)> {
        addresses
            .iter()
            .enumerate()
            .map(|(i, address)| {
                let store = MemoryStore::new();
                let (engine, mailbox) = Engine::new(
                    config(session, *address, threshold),
                    roster.clone(),
                    network.transport(),
                    store.clone(),
                    StdRng::seed_from_u64(i as u64),
                )
                .unwrap();
                (mailbox, store, engine.start())
            })
            .collect()
    }

    #[tokio::test]
    async fn test_engines_agree() {
        let (n, t) = (4, 3);
        let addresses = addresses(n);
        let roster = StaticRoster::new(addresses.iter().copied().map(Member::new).collect());
        let network = Network::new();
        let engines = spawn(9, t, &addresses, &roster, &network);

        let mut states = Vec::new();
        for (mailbox, _, _) in engines.iter() {
            let state = mailbox.wait().await;
            assert_eq!(state.status, Status::Complete);
            states.push(state);
        }
        let public = states[0].public.unwrap();
        assert!(states.iter().all(|s| s.public == Some(public)));

        // Persisted shares reconstruct the joint secret
        let shares = engines
            .iter()
            .map(|(_, store, _)| store.get(9).unwrap().unwrap().share)
            .collect::<Vec<_>>();
        let secret = reconstruct_secret(t, &shares[1..]).unwrap();
        assert_eq!(Point::mul_base(&secret), public);

        // Stopping a completed engine keeps its output
        for (mut mailbox, _, handle) in engines {
            mailbox.stop().await;
            let state = handle.await.unwrap();
            assert_eq!(state.status, Status::Complete);
            assert_eq!(state.public, Some(public));
            assert!(mailbox.is_closed());
            assert_eq!(mailbox.state(), state);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_roster() {
        let addresses = addresses(3);
        let roster =
            StaticRoster::delayed(addresses.iter().copied().map(Member::new).collect(), 3);
        let network = Network::new();
        let engines = spawn(2, 2, &addresses, &roster, &network);
        for (mailbox, _, _) in engines.iter() {
            let state = mailbox.wait().await;
            assert_eq!(state.status, Status::Complete);
        }
        assert!(roster.polls() >= 3 + 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_roster_backoff_exhausted() {
        let addresses = addresses(3);
        let roster = StaticRoster::new(vec![Member::new(addresses[0])]);
        let network = Network::new();
        let (mailbox, _, handle) = spawn(3, 2, &addresses[..1], &roster, &network)
            .pop()
            .unwrap();
        let state = mailbox.wait().await;
        assert_eq!(state.status, Status::Error);
        assert_eq!(
            state.error.as_deref(),
            Some("protocol timeout in waiting_for_peers")
        );
        assert_eq!(roster.polls(), 5);
        assert_eq!(handle.await.unwrap().status, Status::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_roster_polling_outlasts_phase_timeout() {
        // Five polls take 110ms, more than twice the phase timeout
        let addresses = addresses(2);
        let roster = StaticRoster::new(Vec::new());
        let network = Network::new();
        let (engine, mailbox) = Engine::new(
            Config {
                phase_timeout: Duration::from_millis(50),
                ..config(6, addresses[0], 2)
            },
            roster.clone(),
            network.transport(),
            MemoryStore::new(),
            StdRng::seed_from_u64(0),
        )
        .unwrap();
        let handle = engine.start();

        let state = mailbox.wait().await;
        assert_eq!(
            state.error.as_deref(),
            Some("protocol timeout in waiting_for_peers")
        );
        assert_eq!(roster.polls(), 5);
        assert_eq!(handle.await.unwrap(), state);
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_timeout() {
        // The third member never shows up
        let addresses = addresses(3);
        let roster = StaticRoster::new(addresses.iter().copied().map(Member::new).collect());
        let network = Network::new();
        let engines = spawn(4, 2, &addresses[..2], &roster, &network);
        for (mailbox, store, handle) in engines {
            let state = mailbox.wait().await;
            assert_eq!(state.status, Status::Error);
            assert_eq!(
                state.error.as_deref(),
                Some("protocol timeout in round1_commitments")
            );
            assert!(!store.has(4).unwrap());

            // The failure stays readable after the engine exited
            assert_eq!(handle.await.unwrap(), state);
            assert!(mailbox.is_closed());
            assert_eq!(mailbox.wait().await, state);
            assert_eq!(mailbox.state(), state);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_waiting() {
        let addresses = addresses(2);
        let roster = StaticRoster::new(Vec::new());
        let network = Network::new();
        let (mut mailbox, _, handle) = spawn(5, 2, &addresses[..1], &roster, &network)
            .pop()
            .unwrap();
        let mut updates = mailbox.subscribe();
        updates
            .wait_for(|state| state.status == Status::WaitingForPeers)
            .await
            .unwrap();

        mailbox.stop().await;
        let state = handle.await.unwrap();
        assert_eq!(state.status, Status::Error);
        assert_eq!(state.error.as_deref(), Some("stopped"));

        // The engine exited
        assert!(mailbox.is_closed());
        assert_eq!(mailbox.state(), state);
        assert_eq!(*updates.borrow(), state);
        mailbox.stop().await;
    }

    #[tokio::test]
    async fn test_forged_sender_ignored() {
        let t = 2;
        let addresses = addresses(3);
        let members = addresses.iter().copied().map(Member::new).collect::<Vec<_>>();
        let roster = StaticRoster::new(members.clone());
        let network = Network::new();

        // Someone holding member 3's identity claims a commitment from member 2
        let mut rogue = network.transport();
        rogue
            .connect(members[2].peer(10), vec![members[0].peer(10)])
            .await
            .unwrap();
        let mut rng = StdRng::seed_from_u64(99);
        let (_, forged) = ops::generate_polynomial(&mut rng, t).unwrap();
        let message = wire::Message {
            session: 10,
            from: 2,
            payload: Payload::Commitment(forged),
        };
        rogue
            .send(Recipients::All, message.encode().freeze())
            .await
            .unwrap();
        rogue.close().await;

        // Member 2 is not blamed and every member completes
        let engines = spawn(10, t, &addresses, &roster, &network);
        let mut public = None;
        for (mailbox, _, _) in engines.iter() {
            let state = mailbox.wait().await;
            assert_eq!(state.status, Status::Complete);
            assert_eq!(state.error, None);
            assert_eq!(*public.get_or_insert(state.public), state.public);
        }
    }

    /// A [Store] whose writes wait until released.
    #[derive(Clone)]
    struct GatedStore {
        inner: MemoryStore,
        gate: Arc<Mutex<std_mpsc::Receiver<()>>>,
    }

    impl Store for GatedStore {
        fn get(&self, session: u64) -> Result<Option<Record>, store::Error> {
            self.inner.get(session)
        }

        fn set(&self, session: u64, record: &Record) -> Result<(), store::Error> {
            let gate = self.gate.lock().map_err(|_| store::Error::Poisoned)?;
            gate.recv_timeout(Duration::from_secs(5))
                .map_err(|err| store::Error::Io(std::io::Error::other(err)))?;
            self.inner.set(session, record)
        }

        fn remove(&self, session: u64) -> Result<bool, store::Error> {
            self.inner.remove(session)
        }
    }

    #[tokio::test]
    async fn test_persist_does_not_block_runtime() {
        // A single threaded runtime only makes progress here if the write runs elsewhere
        let address = Address::new([1; 20]);
        let roster = StaticRoster::new(vec![Member::new(address)]);
        let network = Network::new();
        let (release, gate) = std_mpsc::channel();
        let store = GatedStore {
            inner: MemoryStore::new(),
            gate: Arc::new(Mutex::new(gate)),
        };
        let (engine, mailbox) = Engine::new(
            config(11, address, 1),
            roster,
            network.transport(),
            store.clone(),
            StdRng::seed_from_u64(0),
        )
        .unwrap();
        engine.start();

        let mut updates = mailbox.subscribe();
        updates
            .wait_for(|state| state.status == Status::Computing)
            .await
            .unwrap();
        release.send(()).unwrap();

        let state = mailbox.wait().await;
        assert_eq!(state.status, Status::Complete);
        assert!(store.has(11).unwrap());
    }

    #[tokio::test]
    async fn test_invalid_threshold() {
        let network = Network::new();
        let result = Engine::new(
            config(1, Address::new([1; 20]), 0),
            StaticRoster::new(Vec::new()),
            network.transport(),
            MemoryStore::new(),
            StdRng::seed_from_u64(0),
        );
        assert!(matches!(result, Err(Error::InvalidThreshold(0))));
    }
}
