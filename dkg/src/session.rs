//! Per-member state machine for a single key generation session.
//!
//! # Overview
//!
//! ```text
//! Idle -> WaitingForPeers -> Connecting -> Round1Commitments -> Round2Shares -> Computing -> Complete
//!   \___________\________________\_______________\__________________\______________\-----> Error
//! ```
//!
//! * `WaitingForPeers`: wait for a roster of at least `t` members, index members in roster
//!   order (1-based) and locate self.
//! * `Connecting`: ask the host to connect to every other member.
//! * `Round1Commitments`: sample a polynomial of degree `t - 1`, broadcast its commitment and
//!   collect one commitment from every member.
//! * `Round2Shares`: send `f_i(j)` to every member `j` and collect (and verify) one share from
//!   every member.
//! * `Computing`: derive the final share and the joint public key and ask the host to persist
//!   the share.
//! * `Complete`: announce the joint key. Announcements from other members are compared with
//!   the local key.
//!
//! Every message must come from the peer registered for the index it claims; anything else
//! is dropped without blaming the claimed dealer. Messages that arrive before the roster is
//! known are held until senders can be checked. Commitments are accepted in any round before
//! completion and shares are buffered until `Round2Shares`, where they are verified against
//! the dealer's commitment. An invalid share, or a dealer sending two different commitments
//! or shares, fails the session and names the dealer.
//!
//! The session performs no I/O. Every input returns the [Output]s the host must carry out,
//! which keeps the protocol deterministic for a given RNG and message order.

use crate::{
    roster::{Member, PeerId},
    store::Record,
    wire::{Message, Payload},
    Error,
};
use apm_cryptography::{
    babyjubjub::primitives::{group::Point, poly},
    commitment::Address,
    vss::{ops, Share},
};
use rand::{CryptoRng, RngCore};
use std::{collections::BTreeMap, fmt, mem};
use tracing::{debug, info, warn};

/// Configuration for a [Session].
#[derive(Clone, Debug)]
pub struct Config {
    /// Identifier of the session (the market id).
    pub session: u64,
    /// Address of the local member.
    pub address: Address,
    /// Number of shares required to reconstruct the joint secret.
    pub threshold: u32,
}

/// Phase of a [Session].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    Idle,
    WaitingForPeers,
    Connecting,
    Round1Commitments,
    Round2Shares,
    Computing,
    Complete,
    Error,
}

impl Status {
    /// Returns whether no further progress is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Complete | Status::Error)
    }

    /// Returns whether the session started and has not finished yet.
    pub fn is_running(&self) -> bool {
        !matches!(self, Status::Idle) && !self.is_terminal()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Idle => "idle",
            Status::WaitingForPeers => "waiting_for_peers",
            Status::Connecting => "connecting",
            Status::Round1Commitments => "round1_commitments",
            Status::Round2Shares => "round2_shares",
            Status::Computing => "computing",
            Status::Complete => "complete",
            Status::Error => "error",
        };
        f.write_str(name)
    }
}

/// Snapshot of a [Session].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct State {
    pub status: Status,
    pub session: u64,
    /// Index of the local member (once the roster is known).
    pub index: Option<u32>,
    pub threshold: u32,
    pub participants: u32,
    pub connected: usize,
    pub commitments: usize,
    pub shares: usize,
    pub public: Option<Point>,
    /// Members that announced the same joint key (counted once per member).
    pub confirmed: usize,
    /// Members that announced a different joint key (counted once per member).
    pub mismatched: usize,
    pub error: Option<String>,
}

/// A member of the session.
#[derive(Clone, Debug)]
pub struct Participant {
    pub index: u32,
    pub member: Member,
    pub peer: PeerId,
}

/// An action the host must perform on behalf of a [Session].
#[derive(Clone, Debug)]
pub enum Output {
    /// Register as `local` and connect to `peers`, then report with [Session::connected].
    Connect { local: PeerId, peers: Vec<PeerId> },
    /// Send `message` to the member at index `to`.
    Send {
        to: u32,
        peer: PeerId,
        message: Message,
    },
    /// Send `message` to every other member.
    Broadcast(Message),
    /// Persist the record, then report with [Session::persisted].
    Persist(Record),
    /// Release the transport (emitted at most once).
    Release,
    /// The session completed with the given record.
    Completed(Record),
}

/// Callback invoked whenever the [State] of a session changes.
pub type Callback = Box<dyn FnMut(&State) + Send>;

/// A member's view of a key generation session.
pub struct Session<R: RngCore + CryptoRng> {
    config: Config,
    rng: R,

    status: Status,
    index: Option<u32>,
    participants: Vec<Participant>,
    connected: usize,
    early: Vec<(PeerId, Message)>,

    secret: Option<poly::Private>,
    commitments: BTreeMap<u32, poly::Public>,
    pending: BTreeMap<u32, Share>,
    shares: BTreeMap<u32, Share>,
    announced: BTreeMap<u32, Point>,
    ready: BTreeMap<u32, bool>,

    record: Option<Record>,
    failure: Option<Error>,
    released: bool,

    callbacks: Vec<Callback>,
    last: Option<State>,
}

impl<R: RngCore + CryptoRng> Session<R> {
    /// Creates a new, idle session.
    pub fn new(config: Config, rng: R) -> Result<Self, Error> {
        if config.threshold == 0 {
            return Err(Error::InvalidThreshold(config.threshold));
        }
        Ok(Self {
            config,
            rng,

            status: Status::Idle,
            index: None,
            participants: Vec::new(),
            connected: 0,
            early: Vec::new(),

            secret: None,
            commitments: BTreeMap::new(),
            pending: BTreeMap::new(),
            shares: BTreeMap::new(),
            announced: BTreeMap::new(),
            ready: BTreeMap::new(),

            record: None,
            failure: None,
            released: false,

            callbacks: Vec::new(),
            last: None,
        })
    }

    /// Registers a callback invoked on every state change.
    pub fn on_state_change(&mut self, callback: Callback) {
        self.callbacks.push(callback);
    }

    /// Returns a snapshot of the session.
    pub fn state(&self) -> State {
        let confirmed = self.ready.values().filter(|matches| **matches).count();
        State {
            status: self.status,
            session: self.config.session,
            index: self.index,
            threshold: self.config.threshold,
            participants: self.participants.len() as u32,
            connected: self.connected,
            commitments: self.commitments.len(),
            shares: self.shares.len(),
            public: self.record.map(|record| record.public),
            confirmed,
            mismatched: self.ready.len() - confirmed,
            error: self.failure.as_ref().map(|err| err.to_string()),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn session(&self) -> u64 {
        self.config.session
    }

    pub fn threshold(&self) -> u32 {
        self.config.threshold
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Returns the output of the session (available from `Computing`).
    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    /// Returns the reason the session failed.
    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    /// Starts waiting for the committee roster.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.status != Status::Idle {
            return Err(Error::AlreadyStarted);
        }
        info!(session = self.config.session, "starting session");
        self.transition(Status::WaitingForPeers);
        self.notify();
        Ok(())
    }

    /// Provides the latest committee roster.
    ///
    /// Rosters with fewer than `t` members are ignored.
    pub fn roster(&mut self, members: Vec<Member>) -> Vec<Output> {
        if self.status != Status::WaitingForPeers {
            return Vec::new();
        }
        let n = members.len() as u32;
        if n < self.config.threshold {
            debug!(
                session = self.config.session,
                members = n,
                threshold = self.config.threshold,
                "waiting for more members"
            );
            return Vec::new();
        }

        // Index members in roster order
        let session = self.config.session;
        let Some(position) = members
            .iter()
            .position(|member| member.address == self.config.address)
        else {
            return self.fail(Error::NotInCommittee);
        };
        let me = position as u32 + 1;
        self.index = Some(me);
        self.participants = members
            .into_iter()
            .enumerate()
            .map(|(i, member)| Participant {
                index: i as u32 + 1,
                peer: member.peer(session),
                member,
            })
            .collect();

        info!(session, me, participants = n, "roster complete");
        self.transition(Status::Connecting);

        // Replay what arrived early now that senders can be checked
        for (peer, message) in mem::take(&mut self.early) {
            if let Err(err) = self.handle(&peer, message) {
                return self.fail(err);
            }
        }
        let local = self.participants[position].peer.clone();
        let peers = self
            .participants
            .iter()
            .filter(|p| p.index != me)
            .map(|p| p.peer.clone())
            .collect();
        self.notify();
        vec![Output::Connect { local, peers }]
    }

    /// Reports that connection attempts finished with `established` peers reached.
    pub fn connected(&mut self, established: usize) -> Vec<Output> {
        if self.status != Status::Connecting {
            return Vec::new();
        }
        self.connected = established;
        let (Some(me), session) = (self.index, self.config.session) else {
            return Vec::new();
        };
        if established + 1 < self.participants.len() {
            warn!(
                session,
                established,
                participants = self.participants.len(),
                "not all peers reachable"
            );
        }

        // Deal
        let (secret, commitment) =
            match ops::generate_polynomial(&mut self.rng, self.config.threshold) {
                Ok(dealing) => dealing,
                Err(err) => return self.fail(err.into()),
            };
        self.secret = Some(secret);
        self.commitments.insert(me, commitment.clone());
        self.transition(Status::Round1Commitments);
        let mut outputs = vec![Output::Broadcast(Message {
            session,
            from: me,
            payload: Payload::Commitment(commitment),
        })];
        outputs.extend(self.advance());
        self.notify();
        outputs
    }

    /// Processes a message received from `peer`.
    ///
    /// The message is dropped unless `peer` is the member at the index it claims.
    pub fn receive(&mut self, peer: &PeerId, message: Message) -> Vec<Output> {
        let session = self.config.session;
        if message.session != session {
            warn!(
                session,
                other = message.session,
                "dropping message for other session"
            );
            return Vec::new();
        }
        if !self.status.is_running() && self.status != Status::Complete {
            debug!(session, status = %self.status, from = message.from, "dropping message");
            return Vec::new();
        }
        if self.index.is_none() {
            debug!(session, from = message.from, %peer, "holding message until roster");
            self.early.push((peer.clone(), message));
            return Vec::new();
        }

        let outputs = match self.handle(peer, message) {
            Ok(()) => self.advance(),
            Err(err) => self.fail(err),
        };
        self.notify();
        outputs
    }

    /// Reports the result of persisting the record from [Output::Persist].
    pub fn persisted(&mut self, result: Result<(), crate::store::Error>) -> Vec<Output> {
        if self.status != Status::Computing {
            return Vec::new();
        }
        if let Err(err) = result {
            return self.fail(Error::Store(err));
        }
        let (Some(record), Some(me)) = (self.record, self.index) else {
            return Vec::new();
        };

        info!(
            session = self.config.session,
            public = ?record.public,
            "session complete"
        );
        self.transition(Status::Complete);
        let announced = mem::take(&mut self.announced);
        for (from, public) in announced {
            self.on_ready(from, public);
        }
        let outputs = vec![
            Output::Broadcast(Message {
                session: self.config.session,
                from: me,
                payload: Payload::Ready(record.public),
            }),
            Output::Completed(record),
        ];
        self.notify();
        outputs
    }

    /// Reports that the current phase did not finish in time.
    pub fn timeout(&mut self) -> Vec<Output> {
        if !self.status.is_running() {
            return Vec::new();
        }
        self.fail(Error::ProtocolTimeout(self.status))
    }

    /// Stops the session and releases its resources.
    ///
    /// A completed session keeps its output. Calling this more than once is a no-op.
    pub fn stop(&mut self) -> Vec<Output> {
        if !self.status.is_terminal() {
            info!(session = self.config.session, status = %self.status, "stopping session");
            self.failure = Some(Error::Stopped);
            self.transition(Status::Error);
        }
        let outputs = self.release();
        self.notify();
        outputs
    }

    /// Authenticates the sender of a message and applies it.
    fn handle(&mut self, peer: &PeerId, message: Message) -> Result<(), Error> {
        let session = self.config.session;
        let from = message.from;
        let Some(participant) = self.participant(from) else {
            warn!(session, from, "dropping message from unknown sender");
            return Ok(());
        };
        if participant.peer != *peer {
            warn!(session, from, %peer, "dropping message with forged sender");
            return Ok(());
        }

        let share = message.share();
        match message.payload {
            Payload::Ready(public) => {
                self.on_ready(from, public);
                Ok(())
            }
            _ if self.status == Status::Complete => Ok(()),
            Payload::Commitment(commitment) => self.on_commitment(from, commitment),
            Payload::Share { .. } => match share {
                Some(share) => self.on_share(share),
                None => Ok(()),
            },
        }
    }

    /// Returns the other participant at `index`.
    fn participant(&self, index: u32) -> Option<&Participant> {
        let me = self.index?;
        if index == 0 || index == me {
            return None;
        }
        self.participants.get(index as usize - 1)
    }

    fn on_commitment(&mut self, dealer: u32, commitment: poly::Public) -> Result<(), Error> {
        if ops::verify_commitment(&commitment, self.config.threshold).is_err() {
            return Err(Error::InvalidCommitment { dealer });
        }
        match self.commitments.get(&dealer) {
            Some(existing) if *existing == commitment => {
                debug!(session = self.config.session, dealer, "duplicate commitment");
                Ok(())
            }
            Some(_) => Err(Error::Equivocation { dealer }),
            None => {
                debug!(session = self.config.session, dealer, "received commitment");
                self.commitments.insert(dealer, commitment);
                Ok(())
            }
        }
    }

    fn on_share(&mut self, share: Share) -> Result<(), Error> {
        let session = self.config.session;
        let dealer = share.dealer;

        // Hold shares until every commitment is known
        if self.status < Status::Round2Shares {
            match self.pending.get(&dealer) {
                Some(existing) if *existing != share => {
                    return Err(Error::Equivocation { dealer });
                }
                Some(_) => {}
                None => {
                    debug!(session, dealer, "buffering early share");
                    self.pending.insert(dealer, share);
                }
            }
            return Ok(());
        }

        let Some(me) = self.index else {
            return Ok(());
        };
        if share.index != me {
            warn!(session, dealer, to = share.index, "dropping misdirected share");
            return Ok(());
        }
        if let Some(existing) = self.shares.get(&dealer) {
            if *existing != share {
                return Err(Error::Equivocation { dealer });
            }
            return Ok(());
        }
        let Some(commitment) = self.commitments.get(&dealer) else {
            warn!(session, dealer, "dropping share without commitment");
            return Ok(());
        };
        if let Err(err) = ops::verify_share(commitment, me, &share) {
            warn!(session, dealer, ?err, "invalid share");
            return Err(Error::VerificationFailure { dealer });
        }
        debug!(session, dealer, "received valid share");
        self.shares.insert(dealer, share);
        Ok(())
    }

    fn on_ready(&mut self, from: u32, public: Point) {
        let session = self.config.session;
        let Some(record) = self.record.filter(|_| self.status == Status::Complete) else {
            self.announced.entry(from).or_insert(public);
            return;
        };

        // Only the first announcement of each member counts
        if self.ready.contains_key(&from) {
            debug!(session, from, "duplicate announcement");
            return;
        }
        let matches = record.public == public;
        self.ready.insert(from, matches);
        if matches {
            debug!(session, from, "peer confirmed joint key");
        } else {
            warn!(
                session,
                from,
                expected = ?record.public,
                found = ?public,
                "peer announced different joint key"
            );
        }
    }

    /// Moves through every round whose input is complete.
    fn advance(&mut self) -> Vec<Output> {
        let mut outputs = Vec::new();
        let n = self.participants.len();
        if self.status == Status::Round1Commitments && self.commitments.len() == n {
            match self.deal_shares() {
                Ok(sent) => outputs.extend(sent),
                Err(err) => {
                    outputs.extend(self.fail(err));
                    return outputs;
                }
            }
        }
        if self.status == Status::Round2Shares && self.shares.len() == n {
            match self.compute() {
                Ok(record) => outputs.push(Output::Persist(record)),
                Err(err) => outputs.extend(self.fail(err)),
            }
        }
        outputs
    }

    fn deal_shares(&mut self) -> Result<Vec<Output>, Error> {
        let (Some(me), Some(secret)) = (self.index, self.secret.as_ref()) else {
            return Ok(Vec::new());
        };
        let session = self.config.session;
        let mut outputs = Vec::with_capacity(self.participants.len());
        let mut own = None;
        for participant in &self.participants {
            let share = ops::compute_share(secret, me, participant.index)?;
            if participant.index == me {
                own = Some(share);
                continue;
            }
            outputs.push(Output::Send {
                to: participant.index,
                peer: participant.peer.clone(),
                message: Message {
                    session,
                    from: me,
                    payload: Payload::Share {
                        to: participant.index,
                        share: share.private,
                    },
                },
            });
        }
        if let Some(share) = own {
            self.shares.insert(me, share);
        }
        info!(session, me, "commitments complete, sent shares");
        self.transition(Status::Round2Shares);

        // Verify everything that arrived early
        for (_, share) in mem::take(&mut self.pending) {
            self.on_share(share)?;
        }
        Ok(outputs)
    }

    fn compute(&mut self) -> Result<Record, Error> {
        let Some(me) = self.index else {
            return Err(Error::NotInCommittee);
        };
        self.transition(Status::Computing);
        let received = self.shares.values().copied().collect::<Vec<_>>();
        let share = ops::combine_shares(me, &received)?;
        let group = ops::construct_public(self.commitments.values(), received.len() as u32)?;
        let record = Record {
            share,
            public: *poly::public(&group),
        };
        info!(session = self.config.session, me, "derived final share");
        self.record = Some(record);
        Ok(record)
    }

    pub(crate) fn fail(&mut self, err: Error) -> Vec<Output> {
        warn!(session = self.config.session, status = %self.status, ?err, "session failed");
        self.failure = Some(err);
        self.transition(Status::Error);
        let outputs = self.release();
        self.notify();
        outputs
    }

    fn release(&mut self) -> Vec<Output> {
        if self.released {
            return Vec::new();
        }
        self.released = true;
        vec![Output::Release]
    }

    fn transition(&mut self, status: Status) {
        debug!(session = self.config.session, from = %self.status, to = %status, "transition");
        self.status = status;
    }

    fn notify(&mut self) {
        let state = self.state();
        if self.last.as_ref() == Some(&state) {
            return;
        }
        for callback in self.callbacks.iter_mut() {
            callback(&state);
        }
        self.last = Some(state);
    }
}
