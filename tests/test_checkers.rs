//! Tests for checker-driven invalidation during sweeps


use connection_monitor::{
    ConnectionChecker, ConnectionMonitor, InactivityChecker, MaxAgeChecker, MonitorConfig,
    StatsSnapshot,
};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use test_helpers::{
    DuplexProvider, FAST_SWEEP, MANUAL_SWEEP, RecordingCollector, duplex_monitor, wait_until,
};
use tokio::io::AsyncWriteExt;

/// Rejects connections that have written more than `limit` bytes
struct WriteQuota {
    limit: u64,
}

impl ConnectionChecker for WriteQuota {
    fn name(&self) -> &str {
        "write-quota"
    }

    fn check(&self, stats: &StatsSnapshot, _now: Instant) -> bool {
        stats.total_write <= self.limit
    }
}

#[tokio::test]
async fn test_failing_checker_invalidates_connection() {
    let (monitor, provider) = duplex_monitor(MANUAL_SWEEP);
    let collector = RecordingCollector::new("rec");
    monitor.add_stat_collector(collector.clone());
    monitor.add_checker(Arc::new(WriteQuota { limit: 10 }));

    let mut small = monitor.get().await.unwrap();
    let _small_peer = provider.take_peer();
    let mut large = monitor.get().await.unwrap();
    let _large_peer = provider.take_peer();

    small.write_all(&[0u8; 5]).await.unwrap();
    large.write_all(&[0u8; 50]).await.unwrap();

    let report = monitor.monitor().sweep();

    assert_eq!(report.invalidated, 1);
    assert_eq!(report.reclaimed, 0);
    assert!(small.is_valid());
    assert!(!large.is_valid());
    assert_eq!(provider.invalidated_count(), 1);
    assert_eq!(collector.deleted(), 1);
    assert!(!monitor.monitor().contains_connection(large.id()));

    let err = large.write_all(b"more").await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotConnected);

    // Already gone: a second pass has nothing to do
    assert!(monitor.monitor().sweep().is_empty());
}

#[tokio::test]
async fn test_inactivity_checker_in_background() {
    let provider = DuplexProvider::new();
    let monitor = ConnectionMonitor::builder(provider.clone())
        .sweep_interval(FAST_SWEEP)
        .checker(Arc::new(InactivityChecker::new(Duration::from_millis(150))))
        .build();

    let conn = monitor.get().await.unwrap();
    let _peer = provider.take_peer();

    let invalidated = wait_until(Duration::from_secs(3), || !conn.is_valid()).await;
    assert!(invalidated);
    assert_eq!(provider.invalidated_count(), 1);

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_max_age_checker_from_config() {
    let mut config = MonitorConfig::default();
    config.checks.max_age = Some(Duration::from_secs(3600));

    let provider = DuplexProvider::new();
    let monitor = ConnectionMonitor::builder(provider.clone())
        .config(&config)
        .sweep_interval(MANUAL_SWEEP)
        .build();

    let conn = monitor.get().await.unwrap();
    assert!(monitor.monitor().sweep().is_empty());
    assert!(conn.is_valid());

    // A stricter checker added later applies to existing connections
    monitor.add_checker(Arc::new(MaxAgeChecker::new(Duration::ZERO)));
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(monitor.monitor().sweep().invalidated, 1);
    assert!(!conn.is_valid());
}

#[tokio::test]
async fn test_dropped_and_rejected_in_same_pass() {
    let (monitor, provider) = duplex_monitor(MANUAL_SWEEP);
    monitor.add_checker(Arc::new(WriteQuota { limit: 0 }));

    let dropped = monitor.get().await.unwrap();
    drop(dropped);

    let mut busy = monitor.get().await.unwrap();
    let _peer = provider.take_peer();
    busy.write_all(b"x").await.unwrap();

    let idle = monitor.get().await.unwrap();

    let report = monitor.monitor().sweep();
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.invalidated, 1);
    assert!(!busy.is_valid());
    assert!(idle.is_valid());
}
