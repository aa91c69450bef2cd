//! Engine counters.
//!
//! Counters are plain `Cell`s: the engine is single-threaded, so there is
//! nothing to synchronize. Read them through [`Factory::stats`].
//!
//! [`Factory::stats`]: crate::Factory::stats

use std::cell::Cell;

#[derive(Debug, Default)]
pub(crate) struct EngineStats {
    opens: Cell<u64>,
    upgrades: Cell<u64>,
    blocked: Cell<u64>,
    transactions_started: Cell<u64>,
    transactions_committed: Cell<u64>,
    transactions_aborted: Cell<u64>,
    requests: Cell<u64>,
    journal_frames: Cell<u64>,
}

fn bump(cell: &Cell<u64>) -> u64 {
    let next = cell.get() + 1;
    cell.set(next);
    next
}

impl EngineStats {
    pub(crate) fn record_open(&self) {
        bump(&self.opens);
    }

    pub(crate) fn record_upgrade(&self) {
        bump(&self.upgrades);
    }

    pub(crate) fn record_blocked(&self) {
        bump(&self.blocked);
    }

    /// Returns the new transaction's id.
    pub(crate) fn record_transaction_start(&self) -> u64 {
        bump(&self.transactions_started)
    }

    pub(crate) fn record_commit(&self) {
        bump(&self.transactions_committed);
    }

    pub(crate) fn record_abort(&self) {
        bump(&self.transactions_aborted);
    }

    pub(crate) fn record_request(&self) {
        bump(&self.requests);
    }

    pub(crate) fn record_journal_frame(&self) {
        bump(&self.journal_frames);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            opens: self.opens.get(),
            upgrades: self.upgrades.get(),
            blocked: self.blocked.get(),
            transactions_started: self.transactions_started.get(),
            transactions_committed: self.transactions_committed.get(),
            transactions_aborted: self.transactions_aborted.get(),
            requests: self.requests.get(),
            journal_frames: self.journal_frames.get(),
        }
    }
}

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Open requests issued.
    pub opens: u64,
    /// Version upgrades run.
    pub upgrades: u64,
    /// Opens or deletes that were blocked by other connections.
    pub blocked: u64,
    /// Transactions created.
    pub transactions_started: u64,
    /// Transactions that reached their commit event.
    pub transactions_committed: u64,
    /// Transactions aborted, explicitly or by a failed request.
    pub transactions_aborted: u64,
    /// Requests issued against collections and indexes.
    pub requests: u64,
    /// Frames appended to the journal since the factory opened.
    pub journal_frames: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        assert_eq!(EngineStats::default().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn transaction_ids_are_sequential() {
        let stats = EngineStats::default();
        assert_eq!(stats.record_transaction_start(), 1);
        assert_eq!(stats.record_transaction_start(), 2);
        stats.record_commit();
        let snap = stats.snapshot();
        assert_eq!(snap.transactions_started, 2);
        assert_eq!(snap.transactions_committed, 1);
    }
}
