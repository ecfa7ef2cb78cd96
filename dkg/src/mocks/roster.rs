use crate::roster::{Member, Roster};
use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

/// A [Roster] returning a fixed list of members.
///
/// Clones share a poll counter.
#[derive(Clone)]
pub struct StaticRoster {
    members: Vec<Member>,
    delay: u32,
    polls: Arc<AtomicU32>,
}

impl StaticRoster {
    pub fn new(members: Vec<Member>) -> Self {
        Self::delayed(members, 0)
    }

    /// Returns no members for the first `delay` polls (across all clones).
    pub fn delayed(members: Vec<Member>, delay: u32) -> Self {
        Self {
            members,
            delay,
            polls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Returns the number of times the roster was polled.
    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

impl Roster for StaticRoster {
    type Error = Infallible;

    async fn members(&mut self, _session: u64) -> Result<Vec<Member>, Self::Error> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        if poll < self.delay {
            return Ok(Vec::new());
        }
        Ok(self.members.clone())
    }
}
