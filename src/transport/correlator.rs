//! Request/response correlation for the streaming transport.

use super::{TileCompletion, TileError, TileOutcome};
use crate::core::tile::TileId;
use fxhash::FxHashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct PendingEntry {
    completion: TileCompletion,
    issued_at: Instant,
}

/// Table of in-flight tile requests keyed by the id the server echoes back.
///
/// Every entry leaves the table exactly once: on a response, on cancellation,
/// or on timeout. Whatever arrives for an id that is no longer present is
/// dropped.
#[derive(Debug, Default)]
pub struct TileRequestCorrelator {
    pending: FxHashMap<TileId, PendingEntry>,
}

impl TileRequestCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the completion for `id`, issued now.
    ///
    /// Returns `true` when an earlier entry for the same id was replaced. The
    /// replaced completion is dropped without an outcome, so its receiver sees
    /// it as abandoned rather than failed.
    pub fn register(&mut self, id: TileId, completion: TileCompletion) -> bool {
        self.register_at(id, completion, Instant::now())
    }

    pub fn register_at(&mut self, id: TileId, completion: TileCompletion, issued_at: Instant) -> bool {
        let replaced = self
            .pending
            .insert(id.clone(), PendingEntry { completion, issued_at })
            .is_some();
        if replaced {
            log::debug!("tile request {} re-registered; previous holder abandoned", id);
        }
        replaced
    }

    /// Completes and removes the entry for `id`. Returns `false`, dropping the
    /// outcome, when nothing is pending under that id.
    pub fn resolve(&mut self, id: &TileId, outcome: TileOutcome) -> bool {
        match self.pending.remove(id) {
            Some(entry) => {
                entry.completion.complete(outcome);
                true
            }
            None => {
                log::debug!("dropping response for unknown tile id {}", id);
                false
            }
        }
    }

    /// Removes one entry, completing it as cancelled.
    pub fn cancel(&mut self, id: &TileId) -> bool {
        match self.pending.remove(id) {
            Some(entry) => {
                entry.completion.complete(TileOutcome::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Empties the table, completing every entry as cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, entry) in self.pending.drain() {
            entry.completion.complete(TileOutcome::Cancelled);
        }
        if count > 0 {
            log::debug!("cancelled {} pending tile requests", count);
        }
        count
    }

    /// Fails every entry issued more than `timeout` before `now`.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<TileId> {
        let expired: Vec<TileId> = self
            .pending
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.issued_at) >= timeout)
            .map(|(id, _)| id.clone())
            .collect();

        let millis = timeout.as_millis().min(u64::MAX as u128) as u64;
        for id in &expired {
            if let Some(entry) = self.pending.remove(id) {
                log::warn!("tile request {} timed out", id);
                entry
                    .completion
                    .complete(TileOutcome::Failed(TileError::Timeout(millis)));
            }
        }
        expired
    }

    pub fn contains(&self, id: &TileId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
