//! Cadence and dirty tracking for session snapshots.
//!
//! The scheduler performs no I/O. Its owner polls it on every tick and runs
//! whatever it reports as due: a local save only when something changed, a
//! remote sync on a coarser cadence regardless.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// How often snapshots are written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AutoSavePolicy {
    pub save_every: Duration,
    pub sync_every: Duration,
}

impl Default for AutoSavePolicy {
    fn default() -> Self {
        Self {
            save_every: Duration::from_secs(10),
            sync_every: Duration::from_secs(30),
        }
    }
}

/// Work the owner should perform after a poll.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AutoSaveDue {
    pub save: bool,
    pub sync: bool,
}

/// Ticket for a save in flight; hand it back to [`AutoSaveScheduler::finish_save`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub struct SaveTicket {
    revision: u64,
}

#[derive(Clone, Debug)]
pub struct AutoSaveScheduler {
    policy: AutoSavePolicy,
    revision: u64,
    saved_revision: u64,
    save_in_flight: bool,
    next_save_at: Option<DateTime<Utc>>,
    next_sync_at: Option<DateTime<Utc>>,
}

impl AutoSaveScheduler {
    #[must_use]
    pub fn new(policy: AutoSavePolicy) -> Self {
        Self {
            policy,
            revision: 0,
            saved_revision: 0,
            save_in_flight: false,
            next_save_at: None,
            next_sync_at: None,
        }
    }

    /// Arms both cadences relative to `now`.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.next_save_at = after(now, self.policy.save_every);
        self.next_sync_at = after(now, self.policy.sync_every);
    }

    /// Disarms both cadences. Dirty state is kept.
    pub fn stop(&mut self) {
        self.next_save_at = None;
        self.next_sync_at = None;
    }

    /// Records a mutation that the next save must cover.
    pub fn mark_dirty(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    /// Reports which cadences elapsed at `now` and re-arms them.
    ///
    /// A save is only reported when there are unsaved mutations and no
    /// other save is in flight.
    pub fn poll(&mut self, now: DateTime<Utc>) -> AutoSaveDue {
        let mut due = AutoSaveDue::default();

        if let Some(at) = self.next_save_at
            && now >= at
        {
            self.next_save_at = after(now, self.policy.save_every);
            due.save = self.is_dirty() && !self.save_in_flight;
        }
        if let Some(at) = self.next_sync_at
            && now >= at
        {
            self.next_sync_at = after(now, self.policy.sync_every);
            due.sync = true;
        }

        due
    }

    /// Claims the save slot. Returns `None` while another save is in flight.
    pub fn begin_save(&mut self) -> Option<SaveTicket> {
        if self.save_in_flight {
            return None;
        }
        self.save_in_flight = true;
        Some(SaveTicket {
            revision: self.revision,
        })
    }

    /// Releases the save slot. On success, mutations up to the ticket's
    /// revision count as saved; later ones keep the session dirty.
    pub fn finish_save(&mut self, ticket: SaveTicket, saved: bool) {
        self.save_in_flight = false;
        if saved {
            self.saved_revision = ticket.revision;
        }
    }
}

// Cadences too long to represent never fire.
fn after(now: DateTime<Utc>, every: Duration) -> Option<DateTime<Utc>> {
    let every = chrono::Duration::from_std(every).ok()?;
    now.checked_add_signed(every)
}
