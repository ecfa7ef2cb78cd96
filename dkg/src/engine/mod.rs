//! Drive a [Session](crate::session::Session) on a tokio task.
//!
//! The [Engine] owns the session along with the injected [Roster](crate::roster::Roster),
//! [Transport](crate::transport::Transport), and [Store](crate::store::Store). It polls the
//! roster with bounded exponential backoff until enough members registered, bounds every
//! protocol phase with a timeout, and carries out the outputs of the session (connecting,
//! sending, persisting, releasing).
//!
//! The engine is controlled through its [Mailbox].
//!
//! # Example
//!
//! ```rust,no_run
//! use apm_cryptography::commitment::Address;
//! use apm_dkg::{
//!     engine::{Config, Engine},
//!     mocks::{Network, StaticRoster},
//!     roster::Member,
//!     store::MemoryStore,
//! };
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! # async fn run() {
//! let addresses = (1..=3u8).map(|i| Address::new([i; 20])).collect::<Vec<_>>();
//! let roster = StaticRoster::new(addresses.iter().copied().map(Member::new).collect());
//! let network = Network::new();
//!
//! let mut mailboxes = Vec::new();
//! for (i, address) in addresses.iter().enumerate() {
//!     let (engine, mailbox) = Engine::new(
//!         Config::new(1, *address, 2),
//!         roster.clone(),
//!         network.transport(),
//!         MemoryStore::new(),
//!         StdRng::seed_from_u64(i as u64),
//!     )
//!     .unwrap();
//!     engine.start();
//!     mailboxes.push(mailbox);
//! }
//! for mailbox in mailboxes.iter() {
//!     let state = mailbox.wait().await;
//!     println!("{:?}", state.public);
//! }
//! # }
//! ```

mod actor;
mod config;
mod ingress;

pub use actor::Engine;
pub use config::{Backoff, Config};
pub use ingress::{Mailbox, Message};
