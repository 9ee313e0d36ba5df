//! Per-profile log store
//!
//! Holds the authoritative collection for the active profile. After every
//! mutation the collection is sorted newest first and written back whole.
//! The sort is stable and new entries are placed in front of the existing
//! ones before sorting, so among equal timestamps the most recently inserted
//! entry (or batch, in batch order) comes first.

use std::sync::mpsc::{channel, Receiver, Sender};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::error::GlucoError;
use crate::model::{GlucoseLog, LogDraft, LogSource};
use crate::stats::DashboardStats;
use crate::storage::LogRepository;
use crate::window::{self, ChartRange};

/// Message sent to observers after a store operation
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Saved,
    Updated,
    Deleted,
    SyncCompleted { count: usize },
    Restored { count: usize },
    /// An import produced no entries
    NothingFound,
    Error(String),
}

/// The profile a store belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub profile_id: String,
}

pub struct LogStore {
    session: Session,
    logs: Vec<GlucoseLog>,
    repository: Box<dyn LogRepository>,
    observers: Vec<Sender<Notification>>,
}

impl LogStore {
    /// Open the store for a profile, starting from its saved collection
    pub fn open(profile_id: &str, repository: Box<dyn LogRepository>) -> Result<Self, GlucoError> {
        let logs = repository.load(profile_id)?;
        info!("Opened log store for profile {} ({} entries)", profile_id, logs.len());

        Ok(Self {
            session: Session { profile_id: profile_id.to_string() },
            logs,
            repository,
            observers: Vec::new(),
        })
    }

    pub fn profile_id(&self) -> &str {
        &self.session.profile_id
    }

    /// Entries, newest first
    pub fn logs(&self) -> &[GlucoseLog] {
        &self.logs
    }

    pub fn get(&self, id: &str) -> Option<&GlucoseLog> {
        self.logs.iter().find(|log| log.id == id)
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Receive a [`Notification`] for every completed operation
    pub fn subscribe(&mut self) -> Receiver<Notification> {
        let (tx, rx) = channel();
        self.observers.push(tx);
        rx
    }

    /// Dashboard statistics over every entry, computed fresh
    pub fn stats(&self) -> DashboardStats {
        DashboardStats::from_logs(&self.logs)
    }

    /// Entries inside the trailing window ending at `now`
    pub fn window(&self, range: ChartRange, now: DateTime<Utc>) -> Vec<GlucoseLog> {
        window::filter_window(&self.logs, range, now)
    }

    /// Insert a new entry owned by the active profile
    pub fn add(&mut self, draft: LogDraft, source: LogSource) -> &GlucoseLog {
        let log = self.stamp(draft, source);
        let id = log.id.clone();
        debug!("Adding log {} at {}", id, log.timestamp);

        self.logs.insert(0, log);
        self.sort();
        self.persist();
        self.notify(Notification::Saved);

        // just inserted, so the lookup cannot miss
        let index = self.logs.iter().position(|l| l.id == id).unwrap_or(0);
        &self.logs[index]
    }

    /// Replace the entry with the same id. Returns false and does nothing
    /// when no such entry exists.
    pub fn update(&mut self, log: GlucoseLog) -> bool {
        let Some(slot) = self.logs.iter_mut().find(|l| l.id == log.id) else {
            debug!("Update ignored, no log with id {}", log.id);
            return false;
        };
        *slot = log;

        self.sort();
        self.persist();
        self.notify(Notification::Updated);
        true
    }

    /// Remove the entry with the given id. Returns false when absent.
    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.logs.len();
        self.logs.retain(|l| l.id != id);
        if self.logs.len() == before {
            debug!("Delete ignored, no log with id {}", id);
            return false;
        }

        self.persist();
        self.notify(Notification::Deleted);
        true
    }

    /// Insert a batch in one operation with a single re-sort.
    /// An empty batch is reported as [`Notification::NothingFound`].
    pub fn bulk_add(&mut self, drafts: Vec<LogDraft>, source: LogSource) -> usize {
        if drafts.is_empty() {
            self.notify(Notification::NothingFound);
            return 0;
        }

        let batch: Vec<GlucoseLog> = drafts
            .into_iter()
            .map(|draft| self.stamp(draft, source))
            .collect();
        let count = batch.len();

        self.logs.splice(0..0, batch);
        self.sort();
        self.persist();
        info!("Imported {} {:?} logs ({} total)", count, source, self.logs.len());
        self.notify(Notification::SyncCompleted { count });
        count
    }

    /// Replace the whole collection, e.g. from a JSON export. Entries owned
    /// by another profile are refused and nothing changes.
    pub fn restore(&mut self, logs: Vec<GlucoseLog>) -> Result<(), GlucoError> {
        if let Some(foreign) = logs.iter().find(|l| l.profile_id != self.session.profile_id) {
            return Err(GlucoError::InvalidInput(format!(
                "entry {} belongs to profile {}, not {}",
                foreign.id, foreign.profile_id, self.session.profile_id
            )));
        }

        let count = logs.len();
        self.logs = logs;
        self.sort();
        self.persist();
        self.notify(Notification::Restored { count });
        Ok(())
    }

    fn stamp(&self, draft: LogDraft, source: LogSource) -> GlucoseLog {
        GlucoseLog::from_draft(
            draft,
            Uuid::new_v4().to_string(),
            self.session.profile_id.clone(),
            source,
        )
    }

    fn sort(&mut self) {
        self.logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }

    // Write failures do not roll back the in-memory change
    fn persist(&mut self) {
        if let Err(e) = self.repository.save(&self.session.profile_id, &self.logs) {
            warn!("Could not save logs for profile {}: {}", self.session.profile_id, e);
            self.notify(Notification::Error(format!("Could not save logs: {}", e)));
        }
    }

    fn notify(&mut self, notification: Notification) {
        self.observers.retain(|tx| tx.send(notification.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::t0;
    use crate::storage::MemoryRepository;
    use chrono::Duration;

    fn draft(timestamp: DateTime<Utc>, sensor: f64) -> LogDraft {
        let mut draft = LogDraft::at(timestamp);
        draft.sensor_level = Some(sensor);
        draft
    }

    fn open() -> (LogStore, MemoryRepository) {
        let repo = MemoryRepository::new();
        let store = LogStore::open("profile-1", Box::new(repo.clone())).unwrap();
        (store, repo)
    }

    fn assert_sorted(store: &LogStore) {
        assert!(store.logs().windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    fn levels(store: &LogStore) -> Vec<f64> {
        store.logs().iter().map(|l| l.effective_level()).collect()
    }

    #[test]
    fn test_add_stamps_identity_and_sorts() {
        let (mut store, repo) = open();
        store.add(draft(t0(), 120.0), LogSource::Manual);
        let older = store.add(draft(t0() - Duration::hours(3), 90.0), LogSource::Manual).clone();

        assert_eq!(older.profile_id, "profile-1");
        assert_eq!(older.source, LogSource::Manual);
        assert!(!older.id.is_empty());

        // newer entry stays first even though the older one was added last
        assert_eq!(levels(&store), vec![120.0, 90.0]);
        assert_eq!(repo.stored("profile-1"), store.logs());
    }

    #[test]
    fn test_ids_are_unique() {
        let (mut store, _) = open();
        let a = store.add(draft(t0(), 100.0), LogSource::Manual).id.clone();
        let b = store.add(draft(t0(), 100.0), LogSource::Manual).id.clone();
        assert_ne!(a, b);
    }

    #[test]
    fn test_equal_timestamps_put_latest_insert_first() {
        let (mut store, _) = open();
        store.add(draft(t0(), 100.0), LogSource::Manual);
        store.add(draft(t0(), 200.0), LogSource::Manual);
        assert_eq!(levels(&store), vec![200.0, 100.0]);
    }

    #[test]
    fn test_update_replaces_and_resorts() {
        let (mut store, repo) = open();
        store.add(draft(t0(), 100.0), LogSource::Manual);
        let mut moved = store.add(draft(t0() - Duration::hours(1), 150.0), LogSource::Manual).clone();

        moved.timestamp = t0() + Duration::hours(1);
        moved.stick_level = Some(155.0);
        moved.notes = "edited".to_string();
        assert!(store.update(moved.clone()));

        assert_eq!(store.logs()[0], moved);
        assert_eq!(store.len(), 2);
        assert_sorted(&store);
        assert_eq!(repo.stored("profile-1")[0].notes, "edited");
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let (mut store, _) = open();
        store.add(draft(t0(), 100.0), LogSource::Manual);
        let rx = store.subscribe();
        let before = store.logs().to_vec();

        let mut stranger = before[0].clone();
        stranger.id = "missing".to_string();
        stranger.sensor_level = Some(400.0);

        assert!(!store.update(stranger));
        assert_eq!(store.logs(), before.as_slice());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_delete_twice() {
        let (mut store, repo) = open();
        let id = store.add(draft(t0(), 100.0), LogSource::Manual).id.clone();
        store.add(draft(t0(), 110.0), LogSource::Manual);

        assert!(store.delete(&id));
        assert!(!store.delete(&id));
        assert_eq!(store.len(), 1);
        assert!(store.get(&id).is_none());
        assert_eq!(repo.stored("profile-1").len(), 1);
    }

    #[test]
    fn test_bulk_add_single_sort_keeps_batch_order_for_ties() {
        let (mut store, _) = open();
        store.add(draft(t0(), 100.0), LogSource::Manual);

        let batch = vec![
            draft(t0() - Duration::hours(2), 80.0),
            draft(t0(), 140.0),
            draft(t0(), 150.0),
            draft(t0() + Duration::hours(1), 160.0),
        ];
        assert_eq!(store.bulk_add(batch, LogSource::Sensor), 4);

        assert_eq!(levels(&store), vec![160.0, 140.0, 150.0, 100.0, 80.0]);
        assert_sorted(&store);
        assert_eq!(store.logs().iter().filter(|l| l.source == LogSource::Sensor).count(), 4);
    }

    #[test]
    fn test_bulk_add_empty_reports_nothing_found() {
        let (mut store, _) = open();
        let rx = store.subscribe();
        assert_eq!(store.bulk_add(Vec::new(), LogSource::Sensor), 0);
        assert_eq!(rx.try_recv().unwrap(), Notification::NothingFound);
        assert!(store.is_empty());
    }

    #[test]
    fn test_notifications() {
        let (mut store, _) = open();
        let rx = store.subscribe();

        let id = store.add(draft(t0(), 100.0), LogSource::Manual).id.clone();
        let log = store.get(&id).cloned().unwrap();
        store.update(log);
        store.bulk_add(vec![draft(t0(), 90.0)], LogSource::Sensor);
        store.delete(&id);

        let received: Vec<Notification> = rx.try_iter().collect();
        assert_eq!(
            received,
            vec![
                Notification::Saved,
                Notification::Updated,
                Notification::SyncCompleted { count: 1 },
                Notification::Deleted,
            ]
        );
    }

    #[test]
    fn test_save_failure_keeps_mutation_and_notifies() {
        let (mut store, repo) = open();
        let rx = store.subscribe();
        repo.set_fail_saves(true);

        store.add(draft(t0(), 100.0), LogSource::Manual);
        assert_eq!(store.len(), 1);
        assert!(repo.stored("profile-1").is_empty());

        let received: Vec<Notification> = rx.try_iter().collect();
        assert!(matches!(received[0], Notification::Error(_)));
        assert_eq!(received[1], Notification::Saved);
    }

    #[test]
    fn test_reopen_loads_saved_state_per_profile() {
        let repo = MemoryRepository::new();
        let mut store = LogStore::open("alice", Box::new(repo.clone())).unwrap();
        store.add(draft(t0(), 100.0), LogSource::Manual);
        store.add(draft(t0() - Duration::hours(1), 120.0), LogSource::Manual);
        let saved = store.logs().to_vec();
        drop(store);

        let other = LogStore::open("bob", Box::new(repo.clone())).unwrap();
        assert!(other.is_empty());

        let again = LogStore::open("alice", Box::new(repo)).unwrap();
        assert_eq!(again.logs(), saved.as_slice());
    }

    #[test]
    fn test_stats_follow_mutations() {
        let (mut store, _) = open();
        assert_eq!(store.stats(), DashboardStats::default());

        let id = store.add(draft(t0(), 60.0), LogSource::Manual).id.clone();
        assert_eq!(store.stats().hypo_count, 1);

        store.delete(&id);
        assert_eq!(store.stats().hypo_count, 0);
    }

    #[test]
    fn test_restore_replaces_collection() {
        let (mut store, _) = open();
        store.add(draft(t0(), 100.0), LogSource::Manual);
        let exported = store.logs().to_vec();

        store.add(draft(t0(), 300.0), LogSource::Manual);
        store.restore(exported.clone()).unwrap();
        assert_eq!(store.logs(), exported.as_slice());
    }

    #[test]
    fn test_restore_refuses_other_profiles_entries() {
        let repo = MemoryRepository::new();
        let mut store = LogStore::open("bob", Box::new(repo.clone())).unwrap();
        store.add(draft(t0(), 100.0), LogSource::Manual);
        let notifications = store.subscribe();
        let before = store.logs().to_vec();

        let mut foreign = store.logs()[0].clone();
        foreign.id = "alice-entry".to_string();
        foreign.profile_id = "alice".to_string();

        let result = store.restore(vec![foreign]);
        assert!(matches!(result, Err(GlucoError::InvalidInput(_))));
        assert_eq!(store.logs(), before.as_slice());
        assert!(repo.stored("bob").iter().all(|l| l.profile_id == "bob"));
        assert!(notifications.try_recv().is_err());
    }

    #[test]
    fn test_window_uses_store_contents() {
        let (mut store, _) = open();
        store.add(draft(t0() - Duration::hours(23), 100.0), LogSource::Manual);
        store.add(draft(t0() - Duration::hours(25), 100.0), LogSource::Manual);
        assert_eq!(store.window(ChartRange::Day, t0()).len(), 1);
        assert_eq!(store.window(ChartRange::Week, t0()).len(), 2);
    }
}
