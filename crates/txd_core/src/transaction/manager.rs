//! Transaction manager.

use crate::clock::{Clock, SystemClock};
use crate::config::ManagerConfig;
use crate::error::{CoreError, CoreResult};
use crate::snapshot::TransactionSnapshot;
use crate::transaction::in_progress::InProgressTx;
use crate::transaction::state::Transaction;
use crate::types::{ChangeId, TransactionType, MAX_TX_PER_MS, NO_TX_IN_PROGRESS};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Mutable coordinator state. Only touched with the manager lock held.
#[derive(Debug, Default)]
struct ManagerState {
    /// Highest committed write pointer.
    read_pointer: i64,
    /// Last write pointer handed out.
    last_write_pointer: i64,
    /// Open write pointers, including checkpoint children.
    in_progress: BTreeMap<i64, InProgressTx>,
    /// Write pointers whose data must never be read.
    invalid: BTreeSet<i64>,
    /// Aborted write pointers. Excluded from every later read snapshot.
    aborted: BTreeSet<i64>,
    /// Change sets declared by `can_commit`, keyed by transaction id.
    committing_change_sets: BTreeMap<i64, BTreeSet<ChangeId>>,
    /// Committed change sets keyed by commit pointer.
    committed_change_sets: BTreeMap<i64, BTreeSet<ChangeId>>,
}

impl ManagerState {
    fn from_snapshot(snapshot: TransactionSnapshot) -> Self {
        Self {
            read_pointer: snapshot.read_pointer,
            last_write_pointer: snapshot.write_pointer,
            in_progress: snapshot.in_progress,
            invalid: snapshot.invalid.into_iter().collect(),
            aborted: snapshot.aborted.into_iter().collect(),
            committing_change_sets: snapshot.committing_change_sets,
            committed_change_sets: snapshot.committed_change_sets,
        }
    }

    fn to_snapshot(&self, timestamp: i64) -> TransactionSnapshot {
        TransactionSnapshot {
            timestamp,
            read_pointer: self.read_pointer,
            write_pointer: self.last_write_pointer,
            invalid: self.invalid.iter().copied().collect(),
            aborted: self.aborted.iter().copied().collect(),
            in_progress: self.in_progress.clone(),
            committing_change_sets: self.committing_change_sets.clone(),
            committed_change_sets: self.committed_change_sets.clone(),
        }
    }

    /// Allocates the next write pointer, correlated with `now_millis`.
    fn next_write_pointer(&mut self, now_millis: i64) -> i64 {
        let next = (self.last_write_pointer + 1).max(now_millis.saturating_mul(MAX_TX_PER_MS));
        self.last_write_pointer = next;
        next
    }

    /// Builds a fresh read snapshot, leaving out `own` pointers.
    ///
    /// Aborted pointers travel with the invalid ones so readers skip them.
    fn snapshot_view(&self, own: &[i64]) -> (Vec<i64>, Vec<i64>, i64) {
        let invalids = self.invalid.union(&self.aborted).copied().collect();
        let in_progress = self
            .in_progress
            .keys()
            .copied()
            .filter(|id| !own.contains(id))
            .collect();
        let first_short = self
            .in_progress
            .iter()
            .find(|(id, entry)| entry.is_short() && !own.contains(*id))
            .map_or(NO_TX_IN_PROGRESS, |(id, _)| *id);
        (invalids, in_progress, first_short)
    }

    /// Resolves a pointer to the id of the open transaction owning it.
    fn owner_of(&self, write_pointer: i64) -> Option<i64> {
        let entry = self.in_progress.get(&write_pointer)?;
        Some(entry.parent().unwrap_or(write_pointer))
    }

    /// Fails unless `transaction_id` names an open transaction.
    fn ensure_open(&self, transaction_id: i64) -> CoreResult<()> {
        match self.in_progress.get(&transaction_id) {
            Some(entry) if entry.parent().is_none() => Ok(()),
            _ => Err(CoreError::not_in_progress(
                transaction_id,
                self.invalid.contains(&transaction_id),
            )),
        }
    }

    /// Checks whether anything committed after `transaction_id` started
    /// touched one of `change_set`.
    fn has_conflict(&self, transaction_id: i64, change_set: &BTreeSet<ChangeId>) -> bool {
        if change_set.is_empty() {
            return false;
        }
        self.committed_change_sets
            .range((Bound::Excluded(transaction_id), Bound::Unbounded))
            .any(|(_, committed)| !committed.is_disjoint(change_set))
    }

    /// Removes an open transaction and its checkpoint children.
    ///
    /// Returns the removed pointers, transaction id first.
    fn remove_open(&mut self, transaction_id: i64) -> Vec<i64> {
        self.committing_change_sets.remove(&transaction_id);
        let Some(entry) = self.in_progress.remove(&transaction_id) else {
            return Vec::new();
        };
        let mut removed = Vec::with_capacity(entry.checkpoint_write_pointers.len() + 1);
        removed.push(transaction_id);
        for child in entry.checkpoint_write_pointers {
            self.in_progress.remove(&child);
            removed.push(child);
        }
        removed
    }

    /// Moves an open transaction and its children into the invalid set.
    fn invalidate_open(&mut self, transaction_id: i64) -> Vec<i64> {
        let removed = self.remove_open(transaction_id);
        self.invalid.extend(removed.iter().copied());
        removed
    }

    /// Drops committed change sets no open transaction can conflict with.
    fn prune_committed(&mut self) {
        match self.in_progress.keys().next() {
            Some(&oldest) => {
                self.committed_change_sets = self.committed_change_sets.split_off(&(oldest + 1));
            }
            None => self.committed_change_sets.clear(),
        }
    }

    fn visibility_upper_bound(&self) -> i64 {
        self.in_progress
            .keys()
            .next()
            .map_or(self.read_pointer, |first| first - 1)
    }
}

/// Coordinates snapshot-isolation transactions.
///
/// The manager provides:
/// - Write pointer allocation correlated with wall-clock time
/// - Tracking of open and invalid transactions
/// - Write-write conflict detection at commit time
/// - Checkpoints for long-running transactions
/// - Snapshots for recovery and standby replicas
///
/// ## Concurrency
///
/// All state sits behind one lock, so every operation is linearized. In
/// particular `can_commit` and `commit` never interleave, which is what keeps
/// two conflicting transactions from both being let through.
pub struct TransactionManager {
    /// Timeouts and limits.
    config: ManagerConfig,
    /// Source of wall-clock time.
    clock: Arc<dyn Clock>,
    /// Coordinator state.
    state: Mutex<ManagerState>,
    /// Whether the service is running.
    running: AtomicBool,
}

impl TransactionManager {
    /// Creates a manager using the system clock.
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a manager reading time from `clock`.
    pub fn with_clock(config: ManagerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(ManagerState::default()),
            running: AtomicBool::new(false),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Marks the manager as running.
    pub fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("transaction manager started");
        }
    }

    /// Marks the manager as stopped.
    ///
    /// In-flight state stays in memory; it is lost on process exit unless a
    /// snapshot was taken.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("transaction manager stopped");
        }
    }

    /// Returns whether the manager is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts a long-running transaction. It never times out.
    pub fn start_long(&self) -> Transaction {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();
        let write_pointer = state.next_write_pointer(now);
        let (invalids, in_progress, first_short) = state.snapshot_view(&[]);
        state.in_progress.insert(write_pointer, InProgressTx::long());
        debug!(write_pointer, "started long transaction");

        Transaction::new(
            state.read_pointer,
            write_pointer,
            invalids,
            in_progress,
            first_short,
            TransactionType::Long,
        )
    }

    /// Starts a short transaction with the default timeout.
    pub fn start_short(&self) -> Transaction {
        self.start_short_with_timeout(self.config.default_short_timeout)
    }

    /// Starts a short transaction that expires after `timeout`.
    ///
    /// Timeouts above the configured maximum are clamped.
    pub fn start_short_with_timeout(&self, timeout: Duration) -> Transaction {
        let timeout = timeout.min(self.config.max_short_timeout);
        let timeout_millis = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        let now = self.clock.now_millis();
        let expiration = now.saturating_add(timeout_millis);

        let mut state = self.state.lock();
        let write_pointer = state.next_write_pointer(now);
        let (invalids, in_progress, first_short) = state.snapshot_view(&[]);
        state
            .in_progress
            .insert(write_pointer, InProgressTx::short(expiration));
        debug!(write_pointer, expiration, "started short transaction");

        Transaction::new(
            state.read_pointer,
            write_pointer,
            invalids,
            in_progress,
            first_short,
            TransactionType::Short,
        )
    }

    /// Gives an open transaction a new write pointer.
    ///
    /// The transaction keeps its id and sees all of its earlier writes; the
    /// read snapshot is refreshed.
    pub fn checkpoint(&self, tx: &Transaction) -> CoreResult<Transaction> {
        let transaction_id = tx.transaction_id();
        let now = self.clock.now_millis();
        let mut state = self.state.lock();
        state.ensure_open(transaction_id)?;

        let write_pointer = state.next_write_pointer(now);
        let lineage = {
            let Some(parent) = state.in_progress.get_mut(&transaction_id) else {
                return Err(CoreError::not_in_progress(transaction_id, false));
            };
            parent.checkpoint_write_pointers.push(write_pointer);
            let expiration = parent.expiration;
            let lineage = parent.checkpoint_write_pointers.clone();
            state.in_progress.insert(
                write_pointer,
                InProgressTx::checkpoint(transaction_id, expiration),
            );
            lineage
        };

        let mut own = lineage.clone();
        own.push(transaction_id);
        let (invalids, in_progress, first_short) = state.snapshot_view(&own);
        debug!(transaction_id, write_pointer, "checkpointed transaction");

        Ok(Transaction::checkpointed(
            tx,
            state.read_pointer,
            invalids,
            in_progress,
            first_short,
            lineage,
        ))
    }

    /// Checks whether `tx` may commit a write to `change_ids`.
    ///
    /// Returns false when a transaction that committed after `tx` started
    /// wrote one of the same change ids. On success the change set is
    /// remembered for [`commit`](Self::commit).
    pub fn can_commit(&self, tx: &Transaction, change_ids: &[ChangeId]) -> CoreResult<bool> {
        let transaction_id = tx.transaction_id();
        let mut state = self.state.lock();
        state.ensure_open(transaction_id)?;

        let change_set: BTreeSet<ChangeId> = change_ids.iter().cloned().collect();
        if state.has_conflict(transaction_id, &change_set) {
            debug!(transaction_id, "conflict detected in can_commit");
            return Ok(false);
        }
        state
            .committing_change_sets
            .insert(transaction_id, change_set);
        Ok(true)
    }

    /// Commits `tx`.
    ///
    /// The change set recorded by `can_commit` is checked again here; a
    /// conflict that slipped in since makes this return false, and the
    /// caller must abort.
    pub fn commit(&self, tx: &Transaction) -> CoreResult<bool> {
        let transaction_id = tx.transaction_id();
        let mut state = self.state.lock();
        state.ensure_open(transaction_id)?;

        let change_set = state
            .committing_change_sets
            .remove(&transaction_id)
            .unwrap_or_default();
        if state.has_conflict(transaction_id, &change_set) {
            debug!(transaction_id, "conflict detected in commit");
            return Ok(false);
        }

        if !change_set.is_empty() {
            let commit_pointer = state.last_write_pointer + 1;
            state
                .committed_change_sets
                .entry(commit_pointer)
                .or_default()
                .extend(change_set);
        }

        let removed = state.remove_open(transaction_id);
        let highest = removed.iter().copied().max().unwrap_or(transaction_id);
        state.read_pointer = state.read_pointer.max(highest);
        state.prune_committed();
        debug!(transaction_id, read_pointer = state.read_pointer, "committed transaction");
        Ok(true)
    }

    /// Aborts `tx`.
    ///
    /// The transaction is dropped without touching the invalid set or the
    /// committed history. Its pointers are remembered as aborted, so no
    /// later snapshot can see them once the read pointer moves past.
    /// Aborting a transaction that is not open does nothing.
    pub fn abort(&self, tx: &Transaction) {
        let transaction_id = tx.transaction_id();
        let mut state = self.state.lock();

        let removed = state.remove_open(transaction_id);
        if removed.is_empty() {
            debug!(transaction_id, "abort of transaction not in progress ignored");
            return;
        }

        state.aborted.extend(removed.iter().copied());
        state.prune_committed();
        debug!(transaction_id, pointers = ?removed, "aborted transaction");
    }

    /// Moves an open transaction into the invalid set.
    ///
    /// A checkpoint pointer invalidates its whole transaction. Returns false
    /// if `write_pointer` is not open.
    pub fn invalidate(&self, write_pointer: i64) -> bool {
        let mut state = self.state.lock();
        let Some(transaction_id) = state.owner_of(write_pointer) else {
            debug!(write_pointer, "invalidate of unknown transaction ignored");
            return false;
        };
        let removed = state.invalidate_open(transaction_id);
        state.prune_committed();
        info!(transaction_id, pointers = ?removed, "invalidated transaction");
        true
    }

    /// Removes `ids` from the invalid and aborted sets. Returns true if any
    /// was present.
    pub fn truncate_invalid_tx(&self, ids: &[i64]) -> bool {
        let mut state = self.state.lock();
        let mut removed = 0usize;
        for id in ids {
            let invalid = state.invalid.remove(id);
            let aborted = state.aborted.remove(id);
            if invalid || aborted {
                removed += 1;
            }
        }
        info!(requested = ids.len(), removed, "truncated invalid transactions");
        removed > 0
    }

    /// Removes invalid and aborted ids started before `time_millis`.
    ///
    /// Fails if a transaction started before that time is still open, since
    /// its snapshot may still need those ids.
    pub fn truncate_invalid_tx_before(&self, time_millis: i64) -> CoreResult<bool> {
        let cutoff = time_millis.saturating_mul(MAX_TX_PER_MS);
        let mut state = self.state.lock();

        let still_open: Vec<i64> = state
            .in_progress
            .keys()
            .copied()
            .take_while(|id| *id < cutoff)
            .collect();
        if !still_open.is_empty() {
            return Err(CoreError::invalid_truncate_time(format!(
                "transactions started earlier than {time_millis} are still in progress: {still_open:?}"
            )));
        }

        let before = state.invalid.len() + state.aborted.len();
        state.invalid = state.invalid.split_off(&cutoff);
        state.aborted = state.aborted.split_off(&cutoff);
        let removed = before - state.invalid.len() - state.aborted.len();
        info!(time_millis, removed, "truncated invalid transactions by time");
        Ok(removed > 0)
    }

    /// Returns the number of invalid transactions.
    pub fn invalid_size(&self) -> usize {
        self.state.lock().invalid.len()
    }

    /// Returns the number of open write pointers, checkpoints included.
    pub fn in_progress_count(&self) -> usize {
        self.state.lock().in_progress.len()
    }

    /// Returns the highest committed write pointer.
    pub fn read_pointer(&self) -> i64 {
        self.state.lock().read_pointer
    }

    /// Returns the last write pointer handed out.
    pub fn write_pointer(&self) -> i64 {
        self.state.lock().last_write_pointer
    }

    /// Returns the global frontier below which everything is resolved.
    ///
    /// This is the lowest open pointer minus one, or the read pointer when
    /// nothing is open. Invalid ids below it still must be excluded.
    pub fn visibility_upper_bound(&self) -> i64 {
        self.state.lock().visibility_upper_bound()
    }

    /// Copies the current state.
    ///
    /// The lock is held only for the copy.
    pub fn snapshot(&self) -> TransactionSnapshot {
        let timestamp = self.clock.now_millis();
        self.state.lock().to_snapshot(timestamp)
    }

    /// Writes a snapshot to `sink`.
    ///
    /// Returns false without writing when the manager is not running.
    pub fn take_snapshot<W: Write>(&self, sink: W) -> CoreResult<bool> {
        if !self.is_running() {
            warn!("snapshot requested while transaction manager is not running");
            return Ok(false);
        }
        let snapshot = self.snapshot();
        snapshot.encode(sink)?;
        debug!(
            timestamp = snapshot.timestamp,
            in_progress = snapshot.in_progress.len(),
            invalid = snapshot.invalid.len(),
            "took transaction snapshot"
        );
        Ok(true)
    }

    /// Replaces the current state with `snapshot`.
    pub fn restore(&self, snapshot: TransactionSnapshot) {
        let timestamp = snapshot.timestamp;
        let restored = ManagerState::from_snapshot(snapshot);
        let mut state = self.state.lock();
        *state = restored;
        info!(
            timestamp,
            read_pointer = state.read_pointer,
            write_pointer = state.last_write_pointer,
            in_progress = state.in_progress.len(),
            invalid = state.invalid.len(),
            "restored transaction state from snapshot"
        );
    }

    /// Reads a snapshot from `source` and restores it.
    ///
    /// The state is untouched if the snapshot cannot be decoded.
    pub fn restore_snapshot<R: Read>(&self, source: R) -> CoreResult<()> {
        let snapshot = TransactionSnapshot::decode(source)?;
        self.restore(snapshot);
        Ok(())
    }

    /// Clears all state back to its initial values.
    pub fn reset_state(&self) {
        *self.state.lock() = ManagerState::default();
        info!("transaction manager state reset");
    }

    /// Invalidates short transactions whose timeout passed.
    ///
    /// Returns the number of transactions invalidated.
    pub fn cleanup_timed_out(&self) -> usize {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();

        let expired: Vec<i64> = state
            .in_progress
            .iter()
            .filter(|(_, entry)| entry.is_short() && entry.is_expired(now))
            .map(|(id, _)| *id)
            .collect();
        if expired.is_empty() {
            return 0;
        }

        for transaction_id in &expired {
            state.invalidate_open(*transaction_id);
        }
        state.prune_committed();
        info!(count = expired.len(), ids = ?expired, "invalidated timed out transactions");
        expired.len()
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    const T0: i64 = 1_000_000;

    fn create_manager() -> (TransactionManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let tm = TransactionManager::with_clock(ManagerConfig::default(), clock.clone());
        tm.start();
        (tm, clock)
    }

    fn ids(names: &[&str]) -> Vec<ChangeId> {
        names.iter().map(|n| ChangeId::from(*n)).collect()
    }

    #[test]
    fn write_pointers_follow_the_clock() {
        let (tm, clock) = create_manager();
        let a = tm.start_short();
        let b = tm.start_long();
        assert_eq!(a.write_pointer(), T0 * MAX_TX_PER_MS);
        assert_eq!(b.write_pointer(), a.write_pointer() + 1);

        clock.advance(5);
        let c = tm.start_short();
        assert_eq!(c.write_pointer(), (T0 + 5) * MAX_TX_PER_MS);

        clock.set(1);
        let d = tm.start_short();
        assert_eq!(d.write_pointer(), c.write_pointer() + 1);
    }

    #[test]
    fn start_snapshots_open_transactions() {
        let (tm, _) = create_manager();
        let long = tm.start_long();
        let short = tm.start_short();
        let tx = tm.start_short();

        assert_eq!(tx.in_progress(), &[long.write_pointer(), short.write_pointer()]);
        assert_eq!(tx.first_short_in_progress(), short.write_pointer());
        assert_eq!(tx.tx_type(), TransactionType::Short);
        assert_eq!(long.tx_type(), TransactionType::Long);
        assert!(!tx.is_visible(long.write_pointer()));
        assert!(tx.is_visible(tx.write_pointer()));
        assert_eq!(tm.in_progress_count(), 3);
    }

    #[test]
    fn commit_advances_read_pointer() {
        let (tm, _) = create_manager();
        let tx = tm.start_short();
        assert!(tm.can_commit(&tx, &ids(&["a"])).unwrap());
        assert!(tm.commit(&tx).unwrap());
        assert_eq!(tm.read_pointer(), tx.write_pointer());
        assert_eq!(tm.visibility_upper_bound(), tx.write_pointer());

        let later = tm.start_short();
        assert!(later.is_visible(tx.write_pointer()));
    }

    #[test]
    fn conflicting_writer_is_refused() {
        let (tm, _) = create_manager();
        let b = tm.start_short();
        let a = tm.start_short();
        assert!(tm.can_commit(&a, &ids(&["x"])).unwrap());
        assert!(tm.commit(&a).unwrap());

        assert!(!tm.can_commit(&b, &ids(&["x", "y"])).unwrap());
        tm.abort(&b);

        let c = tm.start_short();
        assert!(c.read_pointer() >= a.write_pointer());
        assert!(tm.can_commit(&c, &ids(&["x"])).unwrap());
        assert!(tm.commit(&c).unwrap());
    }

    #[test]
    fn disjoint_change_sets_do_not_conflict() {
        let (tm, _) = create_manager();
        let a = tm.start_short();
        let b = tm.start_short();
        assert!(tm.can_commit(&a, &ids(&["a1", "a2"])).unwrap());
        assert!(tm.can_commit(&b, &ids(&["b1"])).unwrap());
        assert!(tm.commit(&b).unwrap());
        assert!(tm.commit(&a).unwrap());
    }

    #[test]
    fn commit_rechecks_conflicts() {
        let (tm, _) = create_manager();
        let a = tm.start_short();
        let b = tm.start_short();
        assert!(tm.can_commit(&a, &ids(&["k"])).unwrap());
        assert!(tm.can_commit(&b, &ids(&["k"])).unwrap());

        assert!(tm.commit(&a).unwrap());
        assert!(!tm.commit(&b).unwrap());
        tm.abort(&b);
        assert_eq!(tm.in_progress_count(), 0);
    }

    #[test]
    fn empty_change_set_always_commits() {
        let (tm, _) = create_manager();
        let a = tm.start_short();
        let b = tm.start_short();
        assert!(tm.can_commit(&b, &ids(&["k"])).unwrap());
        assert!(tm.commit(&b).unwrap());
        assert!(tm.can_commit(&a, &[]).unwrap());
        assert!(tm.commit(&a).unwrap());
    }

    #[test]
    fn abort_never_invalidates() {
        let (tm, _) = create_manager();
        let observer = tm.start_short();
        let tx = tm.start_short();
        assert!(tm.can_commit(&tx, &ids(&["x"])).unwrap());
        tm.abort(&tx);

        assert_eq!(tm.invalid_size(), 0);
        assert_eq!(tm.in_progress_count(), 1);
        assert!(!observer.is_visible(tx.write_pointer()));
        let after = tm.start_short();
        assert!(!after.is_visible(tx.write_pointer()));

        assert!(tm.can_commit(&observer, &ids(&["x"])).unwrap());
        assert!(tm.commit(&observer).unwrap());
    }

    #[test]
    fn aborted_writes_stay_hidden_after_later_commits() {
        let (tm, _) = create_manager();
        let aborted = tm.start_short();
        let other = tm.start_short();
        tm.abort(&aborted);
        assert!(tm.commit(&other).unwrap());
        assert!(tm.read_pointer() > aborted.write_pointer());

        let reader = tm.start_short();
        assert!(!reader.is_visible(aborted.write_pointer()));
        assert!(reader.is_visible(other.write_pointer()));
        assert!(reader.invalids().contains(&aborted.write_pointer()));
        assert_eq!(tm.invalid_size(), 0);
    }

    #[test]
    fn aborted_checkpoints_stay_hidden() {
        let (tm, _) = create_manager();
        let long = tm.start_long();
        let checkpoint = tm.checkpoint(&long).unwrap();
        tm.abort(&checkpoint);
        let later = tm.start_short();
        assert!(tm.commit(&later).unwrap());

        let reader = tm.start_short();
        assert!(!reader.is_visible(long.write_pointer()));
        assert!(!reader.is_visible(checkpoint.write_pointer()));
    }

    #[test]
    fn truncation_releases_aborted_pointers() {
        let (tm, clock) = create_manager();
        let first = tm.start_short();
        clock.advance(10);
        let second = tm.start_short();
        tm.abort(&first);
        tm.abort(&second);

        assert!(tm.truncate_invalid_tx(&[first.write_pointer()]));
        assert_eq!(tm.snapshot().aborted, vec![second.write_pointer()]);
        assert!(tm.truncate_invalid_tx_before(T0 + 11).unwrap());
        assert!(tm.snapshot().aborted.is_empty());
        assert!(tm.start_short().invalids().is_empty());
    }

    #[test]
    fn abort_of_invalidated_transaction_keeps_it_invalid() {
        let (tm, _) = create_manager();
        let tx = tm.start_long();
        assert!(tm.invalidate(tx.write_pointer()));
        tm.abort(&tx);
        assert_eq!(tm.invalid_size(), 1);
        assert!(tm.snapshot().aborted.is_empty());
    }

    #[test]
    fn invalidate_only_open_transactions() {
        let (tm, _) = create_manager();
        let committed = tm.start_short();
        assert!(tm.commit(&committed).unwrap());
        let open = tm.start_short();

        assert!(!tm.invalidate(committed.write_pointer()));
        assert!(!tm.invalidate(12345));
        assert!(tm.invalidate(open.write_pointer()));
        assert!(!tm.invalidate(open.write_pointer()));

        let later = tm.start_short();
        assert_eq!(later.invalids(), &[open.write_pointer()]);
        assert!(!later.is_visible(open.write_pointer()));
    }

    #[test]
    fn operations_on_closed_transaction_fail() {
        let (tm, _) = create_manager();
        let tx = tm.start_short();
        tm.invalidate(tx.write_pointer());

        let err = tm.commit(&tx).unwrap_err();
        assert!(matches!(
            err,
            CoreError::NotInProgress {
                invalidated: true,
                ..
            }
        ));

        let gone = tm.start_short();
        tm.abort(&gone);
        for result in [
            tm.can_commit(&gone, &ids(&["a"])).map(|_| ()),
            tm.checkpoint(&gone).map(|_| ()),
        ] {
            assert!(matches!(
                result,
                Err(CoreError::NotInProgress {
                    invalidated: false,
                    ..
                })
            ));
        }
    }

    #[test]
    fn short_transaction_times_out() {
        let (tm, clock) = create_manager();
        let tx = tm.start_short_with_timeout(Duration::from_secs(1));
        let long = tm.start_long();

        clock.advance(1_000);
        assert_eq!(tm.cleanup_timed_out(), 0);

        clock.advance(1);
        assert_eq!(tm.cleanup_timed_out(), 1);
        let snapshot = tm.snapshot();
        assert_eq!(snapshot.invalid, vec![tx.write_pointer()]);
        assert!(!snapshot.in_progress.contains_key(&tx.write_pointer()));
        assert!(snapshot.in_progress.contains_key(&long.write_pointer()));

        clock.advance(10 * 24 * 60 * 60 * 1_000);
        assert_eq!(tm.cleanup_timed_out(), 0);
    }

    #[test]
    fn short_timeout_is_clamped() {
        let clock = Arc::new(ManualClock::new(T0));
        let config = ManagerConfig::new().max_short_timeout(Duration::from_secs(2));
        let tm = TransactionManager::with_clock(config, clock.clone());
        tm.start_short_with_timeout(Duration::from_secs(3_600));
        clock.advance(2_001);
        assert_eq!(tm.cleanup_timed_out(), 1);
    }

    #[test]
    fn checkpoint_keeps_lineage() {
        let (tm, _) = create_manager();
        let tx = tm.start_long();
        let other = tm.start_short();
        let cp1 = tm.checkpoint(&tx).unwrap();
        let cp2 = tm.checkpoint(&cp1).unwrap();

        assert_eq!(cp2.transaction_id(), tx.transaction_id());
        assert_eq!(cp2.tx_type(), TransactionType::Long);
        assert!(cp1.write_pointer() > other.write_pointer());
        assert_eq!(
            cp2.checkpoint_write_pointers(),
            &[cp1.write_pointer(), cp2.write_pointer()]
        );
        assert_eq!(cp2.in_progress(), &[other.write_pointer()]);
        assert!(cp2.is_visible(tx.write_pointer()));
        assert!(cp2.is_visible(cp1.write_pointer()));
        assert!(cp2.is_visible(cp2.write_pointer()));

        let watcher = tm.start_short();
        for pointer in [tx.write_pointer(), cp1.write_pointer(), cp2.write_pointer()] {
            assert!(watcher.is_in_progress(pointer));
        }

        assert!(tm.commit(&cp2).unwrap());
        assert_eq!(tm.read_pointer(), cp2.write_pointer());
        assert_eq!(tm.in_progress_count(), 2);
    }

    #[test]
    fn checkpoint_conflicts_use_transaction_start() {
        let (tm, _) = create_manager();
        let tx = tm.start_long();
        let writer = tm.start_short();
        assert!(tm.can_commit(&writer, &ids(&["row"])).unwrap());
        assert!(tm.commit(&writer).unwrap());

        let cp = tm.checkpoint(&tx).unwrap();
        assert!(cp.is_visible(writer.write_pointer()));
        assert!(!tm.can_commit(&cp, &ids(&["row"])).unwrap());
    }

    #[test]
    fn invalidating_a_checkpoint_invalidates_the_transaction() {
        let (tm, _) = create_manager();
        let tx = tm.start_long();
        let cp = tm.checkpoint(&tx).unwrap();
        assert!(tm.invalidate(cp.write_pointer()));
        assert_eq!(tm.invalid_size(), 2);
        assert_eq!(tm.in_progress_count(), 0);

        tm.abort(&cp);
        assert_eq!(tm.invalid_size(), 0);
    }

    #[test]
    fn truncate_invalid_by_ids() {
        let (tm, _) = create_manager();
        let a = tm.start_short();
        let b = tm.start_short();
        tm.invalidate(a.write_pointer());
        tm.invalidate(b.write_pointer());

        assert!(tm.truncate_invalid_tx(&[a.write_pointer(), 42]));
        assert_eq!(tm.invalid_size(), 1);
        assert!(!tm.truncate_invalid_tx(&[42]));
    }

    #[test]
    fn truncate_invalid_by_time() {
        let (tm, clock) = create_manager();
        let old = tm.start_short();
        tm.invalidate(old.write_pointer());
        clock.advance(10);
        let open = tm.start_short();
        clock.advance(10);
        let recent = tm.start_short();
        tm.invalidate(recent.write_pointer());

        let err = tm.truncate_invalid_tx_before(T0 + 20).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTruncateTime { .. }));
        assert_eq!(tm.invalid_size(), 2);

        assert!(tm.truncate_invalid_tx_before(T0 + 5).unwrap());
        assert_eq!(tm.snapshot().invalid, vec![recent.write_pointer()]);

        tm.abort(&open);
        assert!(tm.truncate_invalid_tx_before(T0 + 21).unwrap());
        assert_eq!(tm.invalid_size(), 0);
        assert!(!tm.truncate_invalid_tx_before(T0 + 21).unwrap());
    }

    #[test]
    fn history_is_pruned_once_unneeded() {
        let (tm, _) = create_manager();
        let old = tm.start_long();
        let a = tm.start_short();
        tm.can_commit(&a, &ids(&["x"])).unwrap();
        tm.commit(&a).unwrap();
        assert_eq!(tm.snapshot().committed_change_sets.len(), 1);

        tm.abort(&old);
        assert!(tm.snapshot().committed_change_sets.is_empty());
    }

    #[test]
    fn snapshot_roundtrip_restores_state() {
        let (tm, clock) = create_manager();
        let open = tm.start_long();
        let dropped = tm.start_short();
        tm.abort(&dropped);
        let doomed = tm.start_short();
        tm.invalidate(doomed.write_pointer());
        let committed = tm.start_short();
        tm.can_commit(&committed, &ids(&["c"])).unwrap();
        tm.commit(&committed).unwrap();
        tm.can_commit(&open, &ids(&["o"])).unwrap();

        let mut bytes = Vec::new();
        assert!(tm.take_snapshot(&mut bytes).unwrap());
        let before = tm.snapshot();

        let restored = TransactionManager::with_clock(ManagerConfig::default(), clock.clone());
        restored.restore_snapshot(bytes.as_slice()).unwrap();
        let after = restored.snapshot();
        assert_eq!(after.in_progress, before.in_progress);
        assert_eq!(after.invalid, before.invalid);
        assert_eq!(after.aborted, before.aborted);
        assert_eq!(after.write_pointer, before.write_pointer);
        assert_eq!(after.committed_change_sets, before.committed_change_sets);

        clock.set(0);
        let next = restored.start_short();
        assert_eq!(next.write_pointer(), before.next_write_pointer());
        assert!(restored.commit(&open).unwrap());
    }

    #[test]
    fn take_snapshot_requires_running() {
        let (tm, _) = create_manager();
        tm.stop();
        let mut bytes = Vec::new();
        assert!(!tm.take_snapshot(&mut bytes).unwrap());
        assert!(bytes.is_empty());
    }

    #[test]
    fn corrupt_snapshot_leaves_state_alone() {
        let (tm, _) = create_manager();
        tm.start_short();
        assert!(tm.restore_snapshot(&b"nope"[..]).is_err());
        assert_eq!(tm.in_progress_count(), 1);
    }

    #[test]
    fn reset_clears_everything() {
        let (tm, _) = create_manager();
        let tx = tm.start_short();
        tm.invalidate(tx.write_pointer());
        tm.start_long();
        tm.reset_state();

        assert_eq!(tm.invalid_size(), 0);
        assert_eq!(tm.in_progress_count(), 0);
        assert_eq!(tm.read_pointer(), 0);
        assert_eq!(tm.write_pointer(), 0);
        assert!(tm.is_running());
    }

    #[derive(Debug, Clone)]
    enum Op {
        StartShort,
        StartLong,
        CommitOldest,
        AbortNewest,
        Tick(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::StartShort),
            Just(Op::StartLong),
            Just(Op::CommitOldest),
            Just(Op::AbortNewest),
            (-5i64..5).prop_map(Op::Tick),
        ]
    }

    proptest! {
        #[test]
        fn write_pointers_strictly_increase(ops in proptest::collection::vec(op_strategy(), 1..60)) {
            let (tm, clock) = create_manager();
            let mut open: Vec<Transaction> = Vec::new();
            let mut last = 0i64;
            for op in ops {
                match op {
                    Op::StartShort | Op::StartLong => {
                        let tx = if matches!(op, Op::StartShort) {
                            tm.start_short()
                        } else {
                            tm.start_long()
                        };
                        prop_assert!(tx.write_pointer() > last);
                        last = tx.write_pointer();
                        open.push(tx);
                    }
                    Op::CommitOldest => {
                        if !open.is_empty() {
                            let tx = open.remove(0);
                            prop_assert!(tm.commit(&tx).unwrap());
                        }
                    }
                    Op::AbortNewest => {
                        if let Some(tx) = open.pop() {
                            tm.abort(&tx);
                        }
                    }
                    Op::Tick(delta) => clock.advance(delta),
                }
            }
            prop_assert_eq!(tm.in_progress_count(), open.len());
        }
    }
}
