//! Persistence of the share each member derives from a session.
//!
//! A member must be able to contribute to decryption long after key generation
//! finished (and after restarts), so the final share is stored keyed by session id
//! and discarded once the session is retired.

use apm_cryptography::{
    babyjubjub::primitives::group::{Element, Point, Scalar},
    KeyShare,
};
use commonware_utils::{from_hex, hex};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use thiserror::Error;

/// Prefix of every persisted record.
pub const PREFIX: &str = "dkg_ephemeral_key_";

/// Errors that can occur when accessing a [Store].
#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid record: {0}")]
    InvalidRecord(&'static str),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("store task failed: {0}")]
    Task(String),
}

/// The output of a completed session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Record {
    /// The member's share of the joint secret.
    pub share: KeyShare,
    /// The joint public key.
    pub public: Point,
}

#[derive(Serialize, Deserialize)]
struct Encoded {
    index: u32,
    share: String,
    public: String,
}

impl Record {
    fn encode(&self) -> Encoded {
        Encoded {
            index: self.share.index,
            share: hex(&self.share.private.serialize()),
            public: hex(&self.public.serialize()),
        }
    }

    fn decode(encoded: Encoded) -> Result<Self, Error> {
        let share = from_hex(&encoded.share)
            .and_then(|bytes| Scalar::deserialize(&bytes))
            .ok_or(Error::InvalidRecord("share"))?;
        let public = from_hex(&encoded.public)
            .and_then(|bytes| Point::deserialize(&bytes))
            .ok_or(Error::InvalidRecord("public"))?;
        if encoded.index == 0 {
            return Err(Error::InvalidRecord("index"));
        }
        Ok(Self {
            share: KeyShare {
                index: encoded.index,
                private: share,
            },
            public,
        })
    }
}

/// Interface for persisting session output.
pub trait Store: Clone + Send + Sync + 'static {
    /// Fetch the record for `session`.
    fn get(&self, session: u64) -> Result<Option<Record>, Error>;

    /// Persist the record for `session`, replacing any existing one.
    fn set(&self, session: u64, record: &Record) -> Result<(), Error>;

    /// Remove the record for `session`, returning whether one existed.
    fn remove(&self, session: u64) -> Result<bool, Error>;

    /// Returns whether a record exists for `session`.
    fn has(&self, session: u64) -> Result<bool, Error> {
        Ok(self.get(session)?.is_some())
    }
}

/// A [Store] that keeps records in memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<u64, Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, session: u64) -> Result<Option<Record>, Error> {
        let records = self.records.lock().map_err(|_| Error::Poisoned)?;
        Ok(records.get(&session).copied())
    }

    fn set(&self, session: u64, record: &Record) -> Result<(), Error> {
        let mut records = self.records.lock().map_err(|_| Error::Poisoned)?;
        records.insert(session, *record);
        Ok(())
    }

    fn remove(&self, session: u64) -> Result<bool, Error> {
        let mut records = self.records.lock().map_err(|_| Error::Poisoned)?;
        Ok(records.remove(&session).is_some())
    }
}

/// A [Store] that keeps one JSON file per session in a directory.
#[derive(Clone, Debug)]
pub struct FileStore {
    directory: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `directory`.
    pub fn new(directory: impl AsRef<Path>) -> Result<Self, Error> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    fn path(&self, session: u64) -> PathBuf {
        self.directory.join(format!("{PREFIX}{session}.json"))
    }
}

impl Store for FileStore {
    fn get(&self, session: u64) -> Result<Option<Record>, Error> {
        let raw = match fs::read_to_string(self.path(session)) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let encoded: Encoded = serde_json::from_str(&raw)?;
        Record::decode(encoded).map(Some)
    }

    fn set(&self, session: u64, record: &Record) -> Result<(), Error> {
        // Write to a temporary file first so a crash never leaves a partial record
        let path = self.path(session);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec_pretty(&record.encode())?)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn remove(&self, session: u64) -> Result<bool, Error> {
        match fs::remove_file(self.path(session)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
