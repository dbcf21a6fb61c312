//! Connection registry and background sweep
//!
//! The [`Monitor`] tracks every instrumented connection through a weak handle
//! and owns the set of registered collectors and checkers.
//!
//! # Lock order
//!
//! Three kinds of lock are involved: the collectors `RwLock`, the shard locks
//! of the connections table, and each connection's stats `Mutex`. Whenever
//! more than one is held they are taken in this order:
//!
//! 1. collectors
//! 2. connections table
//! 3. a single connection's stats
//!
//! Reads and writes therefore take the collectors read lock *before* their
//! own stats lock, and the sweep never holds the table while calling into
//! collector code.

use super::connection::ConnectionCore;
use super::sync::{isolate, lock, read, write};
use crate::constants::sweep::NOISY_PASS_THRESHOLD;
use crate::metrics::{ConnectionChecker, ConnectionStats, IoOutcome, StatCollector};
use crate::types::{ConnectionId, SweepInterval};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Instant;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Stats of one connection, shared between the connection and its registry entry
pub(crate) type SharedStats = Arc<Mutex<ConnectionStats>>;

type Collectors = HashMap<String, Arc<dyn StatCollector>>;

/// Registry entry: a non-owning handle plus the stats needed to clean up after it
pub(crate) struct ConnectionEntry {
    handle: Weak<ConnectionCore>,
    stats: SharedStats,
}

impl ConnectionEntry {
    pub(crate) fn new(handle: Weak<ConnectionCore>, stats: SharedStats) -> Self {
        Self { handle, stats }
    }

    fn is_dead(&self) -> bool {
        self.handle.strong_count() == 0
    }
}

/// Outcome of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries whose connection had been dropped
    pub reclaimed: usize,
    /// Live connections invalidated because a checker rejected them
    pub invalidated: usize,
}

impl SweepReport {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.reclaimed == 0 && self.invalidated == 0
    }
}

/// Registry of instrumented connections with a background sweep
///
/// Connections hold an `Arc<Monitor>`; the monitor holds only weak handles to
/// them, so dropping a connection is enough to destroy it. The entry left
/// behind is reclaimed by the next sweep, which also deletes the collector
/// state that connection accumulated.
pub struct Monitor {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    collectors: RwLock<Collectors>,
    checkers: RwLock<Vec<Arc<dyn ConnectionChecker>>>,
    running: AtomicBool,
    wake: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
    sweep_interval: SweepInterval,
}

impl Monitor {
    /// Create a monitor and start its sweep task
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(sweep_interval: SweepInterval) -> Arc<Self> {
        let monitor = Arc::new(Self {
            connections: DashMap::new(),
            collectors: RwLock::new(HashMap::new()),
            checkers: RwLock::new(Vec::new()),
            running: AtomicBool::new(true),
            wake: Arc::new(Notify::new()),
            task: Mutex::new(None),
            sweep_interval,
        });

        let handle = tokio::spawn(monitor_task(
            Arc::downgrade(&monitor),
            monitor.wake.clone(),
            sweep_interval,
        ));
        *lock(&monitor.task) = Some(handle);

        info!(interval = %sweep_interval, "Connection monitor started");
        monitor
    }

    #[must_use]
    pub fn sweep_interval(&self) -> SweepInterval {
        self.sweep_interval
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of registry entries, including dropped connections not yet swept
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn contains_connection(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Names of the registered collectors, sorted
    #[must_use]
    pub fn collector_names(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.collectors).keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Register a connection, replacing a stale entry with the same ID
    pub(crate) fn add_connection(&self, id: ConnectionId, entry: ConnectionEntry) {
        if self.connections.insert(id, entry).is_some() {
            debug!(connection = %id, "Replaced stale registry entry");
        }
        trace!(connection = %id, "Connection registered");
    }

    /// Remove a connection's entry without touching its stats
    ///
    /// Returns true if an entry was present.
    pub fn remove_connection(&self, id: ConnectionId) -> bool {
        self.connections.remove(&id).is_some()
    }

    /// Remove a connection and free its collector state
    pub(crate) fn release_connection(&self, id: ConnectionId, stats: &SharedStats) {
        let collectors = read(&self.collectors);
        self.remove_connection(id);
        Self::free_stats_locked(&collectors, stats);
    }

    /// Register a collector
    ///
    /// Existing connections get their state lazily, on their next read or
    /// write. If a collector with the same name is already registered it is
    /// replaced: its state is deleted through it first, and it is returned.
    pub fn add_stat_collector(
        &self,
        collector: Arc<dyn StatCollector>,
    ) -> Option<Arc<dyn StatCollector>> {
        let name = collector.metric_name().to_string();
        let mut collectors = write(&self.collectors);

        let previous = collectors.remove(&name);
        if let Some(previous) = &previous {
            warn!(collector = %name, "Replacing collector registered under the same name");
            self.purge_collector_data(&name, previous.as_ref());
        }
        collectors.insert(name.clone(), collector);
        drop(collectors);

        debug!(collector = %name, "Stat collector registered");
        previous
    }

    /// Unregister a collector and delete its state on every tracked connection
    pub fn remove_stat_collector(&self, name: &str) -> Option<Arc<dyn StatCollector>> {
        let mut collectors = write(&self.collectors);
        let removed = collectors.remove(name)?;
        let purged = self.purge_collector_data(name, removed.as_ref());
        drop(collectors);

        debug!(collector = %name, purged, "Stat collector removed");
        Some(removed)
    }

    /// Register a checker evaluated against every live connection on each sweep
    pub fn add_checker(&self, checker: Arc<dyn ConnectionChecker>) {
        debug!(checker = %checker.name(), "Connection checker registered");
        write(&self.checkers).push(checker);
    }

    /// Delete `collector`'s state on every tracked connection
    ///
    /// Caller holds the collectors write lock.
    fn purge_collector_data(&self, name: &str, collector: &dyn StatCollector) -> usize {
        let tracked: Vec<SharedStats> = self
            .connections
            .iter()
            .map(|entry| entry.stats.clone())
            .collect();

        let mut purged = 0;
        for stats in tracked {
            let data = lock(&stats).remove_metric_data(name);
            if let Some(data) = data {
                isolate(name, "delete_metric_data", || collector.delete_metric_data(data));
                purged += 1;
            }
        }
        purged
    }

    pub(crate) fn on_connection_read(&self, stats: &SharedStats, outcome: IoOutcome) {
        self.on_connection_io(stats, outcome, Direction::Read);
    }

    pub(crate) fn on_connection_write(&self, stats: &SharedStats, outcome: IoOutcome) {
        self.on_connection_io(stats, outcome, Direction::Write);
    }

    fn on_connection_io(&self, stats: &SharedStats, outcome: IoOutcome, direction: Direction) {
        let collectors = read(&self.collectors);
        let mut stats = lock(stats);
        let now = Instant::now();

        match direction {
            Direction::Read => stats.record_read(outcome, now),
            Direction::Write => stats.record_write(outcome, now),
        };

        if stats.is_released() {
            return;
        }

        for (name, collector) in collectors.iter() {
            isolate(name, direction.callback(), || {
                let data = stats.metric_data_or_create(name, || collector.create_metric_data());
                if let Some(data) = data {
                    match direction {
                        Direction::Read => collector.on_read(data, outcome, now),
                        Direction::Write => collector.on_write(data, outcome, now),
                    }
                }
            });
        }
    }

    /// Delete every collector value held by `stats` and mark them released
    ///
    /// Values whose collector is no longer registered are dropped.
    pub(crate) fn free_connection_stats(&self, stats: &SharedStats) {
        Self::free_stats_locked(&read(&self.collectors), stats);
    }

    /// [`free_connection_stats`](Self::free_connection_stats) with the collectors lock already held
    fn free_stats_locked(collectors: &Collectors, stats: &SharedStats) {
        let released = lock(stats).release();

        for (name, data) in released {
            match collectors.get(&name) {
                Some(collector) => {
                    isolate(&name, "delete_metric_data", || collector.delete_metric_data(data));
                }
                None => {
                    debug!(collector = %name, "Dropping state of an unregistered collector");
                }
            }
        }
    }

    /// Run one sweep pass now
    ///
    /// Reclaims entries of dropped connections, then evaluates checkers
    /// against the live ones and invalidates those that fail.
    pub fn sweep(&self) -> SweepReport {
        let reclaimed = self.reclaim_dead();
        SweepReport {
            reclaimed,
            invalidated: self.run_checkers(),
        }
    }

    /// Drop the entries of dropped connections and free their state
    ///
    /// The collectors read lock is held from unlinking to freeing, so a
    /// collector cannot be removed while an entry is in neither place.
    fn reclaim_dead(&self) -> usize {
        let collectors = read(&self.collectors);

        let mut dead = Vec::new();
        self.connections.retain(|id, entry| {
            if entry.is_dead() {
                dead.push((*id, entry.stats.clone()));
                false
            } else {
                true
            }
        });

        for (id, stats) in &dead {
            Self::free_stats_locked(&collectors, stats);
            trace!(connection = %id, "Reclaimed dropped connection");
        }
        dead.len()
    }

    fn run_checkers(&self) -> usize {
        let checkers: Vec<Arc<dyn ConnectionChecker>> = read(&self.checkers).clone();
        if checkers.is_empty() {
            return 0;
        }

        let live: Vec<(ConnectionId, Weak<ConnectionCore>, SharedStats)> = self
            .connections
            .iter()
            .map(|entry| (*entry.key(), entry.handle.clone(), entry.stats.clone()))
            .collect();

        let now = Instant::now();
        let mut invalidated = 0;
        for (id, handle, stats) in live {
            let snapshot = lock(&stats).snapshot();
            let rejected_by = checkers.iter().find(|checker| {
                !isolate(checker.name(), "check", || checker.check(&snapshot, now)).unwrap_or(true)
            });

            let Some(checker) = rejected_by else {
                continue;
            };
            let Some(core) = handle.upgrade() else {
                continue;
            };
            debug!(connection = %id, checker = %checker.name(), "Checker rejected connection");
            if core.invalidate() {
                invalidated += 1;
            }
        }
        invalidated
    }

    /// Ask the sweep task to exit
    ///
    /// Returns immediately; the task exits at its next wake-up. Use
    /// [`shutdown`](Self::shutdown) to wait for it.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            self.wake.notify_one();
            info!(connections = self.connection_count(), "Connection monitor stopping");
        }
    }

    /// Stop the sweep task and wait for it to exit
    pub async fn shutdown(&self) {
        self.stop();
        let handle = lock(&self.task).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sweep task ended abnormally");
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.wake.notify_one();
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("connections", &self.connections.len())
            .field("collectors", &self.collector_names())
            .field("running", &self.is_running())
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Read,
    Write,
}

impl Direction {
    const fn callback(self) -> &'static str {
        match self {
            Self::Read => "on_read",
            Self::Write => "on_write",
        }
    }
}

/// Background loop: wait one interval (or a stop signal), then sweep
///
/// Holds only a weak handle, so a monitor nobody references any more is not
/// kept alive by its own sweeper.
async fn monitor_task(monitor: Weak<Monitor>, wake: Arc<Notify>, interval: SweepInterval) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval.as_duration()) => {}
            _ = wake.notified() => {}
        }

        let Some(monitor) = monitor.upgrade() else {
            break;
        };
        if !monitor.is_running() {
            break;
        }

        let report = monitor.sweep();
        if report.reclaimed + report.invalidated >= NOISY_PASS_THRESHOLD {
            info!(
                reclaimed = report.reclaimed,
                invalidated = report.invalidated,
                remaining = monitor.connection_count(),
                "Sweep pass"
            );
        } else if !report.is_empty() {
            debug!(
                reclaimed = report.reclaimed,
                invalidated = report.invalidated,
                remaining = monitor.connection_count(),
                "Sweep pass"
            );
        }
    }
    debug!("Sweep task exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ByteCountCollector, ByteCounts, MetricData, metric_as};
    use std::time::Duration;

    fn shared_stats() -> SharedStats {
        Arc::new(Mutex::new(ConnectionStats::new(Instant::now())))
    }

    /// Entry whose weak handle never resolves, i.e. an already-dropped connection
    fn dead_entry(stats: &SharedStats) -> ConnectionEntry {
        ConnectionEntry::new(Weak::new(), stats.clone())
    }

    fn monitor() -> Arc<Monitor> {
        // Long interval: tests drive sweeps by hand
        Monitor::new(SweepInterval::from_millis(60_000).unwrap())
    }

    #[tokio::test]
    async fn test_add_and_remove_connection() {
        let monitor = monitor();
        let id = ConnectionId::next();
        let stats = shared_stats();

        monitor.add_connection(id, dead_entry(&stats));
        assert!(monitor.contains_connection(id));
        assert_eq!(monitor.connection_count(), 1);

        assert!(monitor.remove_connection(id));
        assert!(!monitor.remove_connection(id));
        assert_eq!(monitor.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_add_connection_replaces_same_id() {
        let monitor = monitor();
        let id = ConnectionId::next();

        monitor.add_connection(id, dead_entry(&shared_stats()));
        monitor.add_connection(id, dead_entry(&shared_stats()));

        assert_eq!(monitor.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_read_creates_collector_state_lazily() {
        let monitor = monitor();
        let collector = Arc::new(ByteCountCollector::default());
        monitor.add_stat_collector(collector.clone());

        let stats = shared_stats();
        assert_eq!(collector.created_count(), 0);

        monitor.on_connection_read(&stats, IoOutcome::Transferred(10));
        monitor.on_connection_write(&stats, IoOutcome::Transferred(3));

        assert_eq!(collector.created_count(), 1);
        let guard = lock(&stats);
        assert_eq!(guard.total_read(), 10);
        assert_eq!(guard.total_write(), 3);
        let counts = guard
            .metric_data("bytes")
            .and_then(metric_as::<ByteCounts>)
            .copied();
        assert_eq!(counts, Some(ByteCounts { read: 10, written: 3 }));
    }

    #[tokio::test]
    async fn test_sweep_reclaims_dead_entries() {
        let monitor = monitor();
        let collector = Arc::new(ByteCountCollector::default());
        monitor.add_stat_collector(collector.clone());

        let stats = shared_stats();
        monitor.on_connection_read(&stats, IoOutcome::Transferred(1));
        monitor.add_connection(ConnectionId::next(), dead_entry(&stats));

        let report = monitor.sweep();

        assert_eq!(report, SweepReport { reclaimed: 1, invalidated: 0 });
        assert_eq!(monitor.connection_count(), 0);
        assert_eq!(collector.deleted_count(), 1);
        assert!(lock(&stats).is_released());

        // Nothing left to do on the next pass
        assert!(monitor.sweep().is_empty());
        assert_eq!(collector.deleted_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_collector_purges_state() {
        let monitor = monitor();
        let bytes = Arc::new(ByteCountCollector::new("bytes"));
        let other = Arc::new(ByteCountCollector::new("other"));
        monitor.add_stat_collector(bytes.clone());
        monitor.add_stat_collector(other.clone());

        let stats = shared_stats();
        monitor.add_connection(ConnectionId::next(), dead_entry(&stats));
        monitor.on_connection_read(&stats, IoOutcome::Transferred(8));

        let removed = monitor.remove_stat_collector("bytes");
        assert!(removed.is_some());
        assert_eq!(bytes.deleted_count(), 1);
        assert_eq!(other.deleted_count(), 0);

        let guard = lock(&stats);
        assert!(guard.metric_data("bytes").is_none());
        assert!(guard.metric_data("other").is_some());
        drop(guard);

        assert!(monitor.remove_stat_collector("bytes").is_none());
        assert_eq!(monitor.collector_names(), vec!["other".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_collector_name_replaces_and_deletes_old_state() {
        let monitor = monitor();
        let first = Arc::new(ByteCountCollector::new("bytes"));
        let second = Arc::new(ByteCountCollector::new("bytes"));
        monitor.add_stat_collector(first.clone());

        let stats = shared_stats();
        monitor.add_connection(ConnectionId::next(), dead_entry(&stats));
        monitor.on_connection_read(&stats, IoOutcome::Transferred(5));

        let replaced = monitor.add_stat_collector(second.clone());
        assert!(replaced.is_some());
        assert_eq!(first.deleted_count(), 1);

        monitor.on_connection_read(&stats, IoOutcome::Transferred(2));
        assert_eq!(second.created_count(), 1);
        let counts = lock(&stats)
            .metric_data("bytes")
            .and_then(metric_as::<ByteCounts>)
            .copied();
        assert_eq!(counts, Some(ByteCounts { read: 2, written: 0 }));
    }

    #[tokio::test]
    async fn test_free_connection_stats_drops_orphans() {
        let monitor = monitor();
        let stats = shared_stats();
        lock(&stats).metric_data_or_create("gone", || Box::new(1u8) as MetricData);

        monitor.free_connection_stats(&stats);

        assert!(lock(&stats).is_released());
        assert_eq!(lock(&stats).metric_names().count(), 0);
    }

    #[tokio::test]
    async fn test_released_stats_still_count_but_create_nothing() {
        let monitor = monitor();
        let collector = Arc::new(ByteCountCollector::default());
        monitor.add_stat_collector(collector.clone());

        let stats = shared_stats();
        monitor.free_connection_stats(&stats);
        monitor.on_connection_read(&stats, IoOutcome::Transferred(4));

        assert_eq!(lock(&stats).total_read(), 4);
        assert_eq!(collector.created_count(), 0);
    }

    struct Panicking;

    impl StatCollector for Panicking {
        fn metric_name(&self) -> &str {
            "panicking"
        }

        fn create_metric_data(&self) -> MetricData {
            Box::new(())
        }

        fn on_read(&self, _data: &mut MetricData, _outcome: IoOutcome, _timestamp: Instant) {
            panic!("collector bug");
        }

        fn on_write(&self, _data: &mut MetricData, _outcome: IoOutcome, _timestamp: Instant) {}
    }

    #[tokio::test]
    async fn test_panicking_collector_is_isolated() {
        let monitor = monitor();
        let healthy = Arc::new(ByteCountCollector::default());
        monitor.add_stat_collector(Arc::new(Panicking));
        monitor.add_stat_collector(healthy.clone());

        let stats = shared_stats();
        monitor.on_connection_read(&stats, IoOutcome::Transferred(6));
        monitor.on_connection_read(&stats, IoOutcome::Transferred(6));

        let counts = lock(&stats)
            .metric_data("bytes")
            .and_then(metric_as::<ByteCounts>)
            .copied();
        assert_eq!(counts, Some(ByteCounts { read: 12, written: 0 }));
        assert_eq!(lock(&stats).total_read(), 12);
    }

    /// Removes the "bytes" collector from another thread while its own state is being deleted
    struct RemovesBytesOnDelete {
        monitor: Mutex<Option<Arc<Monitor>>>,
        remover: Mutex<Option<std::thread::JoinHandle<()>>>,
    }

    impl StatCollector for RemovesBytesOnDelete {
        fn metric_name(&self) -> &str {
            "slow"
        }

        fn create_metric_data(&self) -> MetricData {
            Box::new(())
        }

        fn delete_metric_data(&self, _data: MetricData) {
            if let Some(monitor) = self.monitor.lock().unwrap().take() {
                let handle = std::thread::spawn(move || {
                    monitor.remove_stat_collector("bytes");
                });
                *self.remover.lock().unwrap() = Some(handle);
            }
            std::thread::sleep(Duration::from_millis(200));
        }

        fn on_read(&self, _data: &mut MetricData, _outcome: IoOutcome, _timestamp: Instant) {}

        fn on_write(&self, _data: &mut MetricData, _outcome: IoOutcome, _timestamp: Instant) {}
    }

    #[tokio::test]
    async fn test_collector_removed_during_sweep_still_deletes_everything() {
        let monitor = monitor();
        let bytes = Arc::new(ByteCountCollector::new("bytes"));
        let slow = Arc::new(RemovesBytesOnDelete {
            monitor: Mutex::new(Some(monitor.clone())),
            remover: Mutex::new(None),
        });
        monitor.add_stat_collector(bytes.clone());
        monitor.add_stat_collector(slow.clone());

        for _ in 0..2 {
            let stats = shared_stats();
            monitor.on_connection_read(&stats, IoOutcome::Transferred(3));
            monitor.add_connection(ConnectionId::next(), dead_entry(&stats));
        }
        assert_eq!(bytes.created_count(), 2);

        assert_eq!(monitor.sweep().reclaimed, 2);
        let remover = slow.remover.lock().unwrap().take();
        remover.unwrap().join().unwrap();

        assert_eq!(bytes.deleted_count(), 2);
        assert_eq!(bytes.live_count(), 0);
        assert_eq!(monitor.collector_names(), vec!["slow".to_string()]);
    }

    #[tokio::test]
    async fn test_release_connection_deletes_through_registered_collector() {
        let monitor = monitor();
        let bytes = Arc::new(ByteCountCollector::new("bytes"));
        monitor.add_stat_collector(bytes.clone());

        let id = ConnectionId::next();
        let stats = shared_stats();
        monitor.add_connection(id, dead_entry(&stats));
        monitor.on_connection_write(&stats, IoOutcome::Transferred(7));

        monitor.release_connection(id, &stats);

        assert!(!monitor.contains_connection(id));
        assert_eq!(bytes.deleted_count(), 1);
        assert!(monitor.remove_stat_collector("bytes").is_some());
        assert_eq!(bytes.deleted_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_ends_sweep_task() {
        let monitor = Monitor::new(SweepInterval::from_millis(10).unwrap());
        assert!(monitor.is_running());

        tokio::time::timeout(Duration::from_secs(2), monitor.shutdown())
            .await
            .expect("sweep task should exit promptly");

        assert!(!monitor.is_running());
        // Stopping twice is harmless
        monitor.stop();
    }

    #[tokio::test]
    async fn test_background_sweep_reclaims_without_manual_pass() {
        let monitor = Monitor::new(SweepInterval::from_millis(20).unwrap());
        monitor.add_connection(ConnectionId::next(), dead_entry(&shared_stats()));

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(monitor.connection_count(), 0);
        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_debug_output() {
        let monitor = monitor();
        monitor.add_stat_collector(Arc::new(ByteCountCollector::default()));
        let debug = format!("{:?}", monitor);
        assert!(debug.contains("bytes"));
        assert!(debug.contains("running: true"));
    }
}
