//! Tests for weak-reference reclamation by the background sweep


use std::sync::Arc;
use std::time::Duration;
use test_helpers::{FAST_SWEEP, MANUAL_SWEEP, RecordingCollector, duplex_monitor, wait_until};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn test_dropped_connection_reclaimed_by_background_sweep() {
    let (monitor, provider) = duplex_monitor(FAST_SWEEP);
    let collector = RecordingCollector::new("rec");
    monitor.add_stat_collector(collector.clone());

    let mut conn = monitor.get().await.unwrap();
    let mut peer = provider.take_peer();
    conn.write_all(b"data").await.unwrap();
    let mut buf = [0u8; 4];
    peer.read_exact(&mut buf).await.unwrap();

    let id = conn.id();
    drop(conn);

    // Still tracked until the next pass
    assert!(monitor.monitor().contains_connection(id));

    tokio::time::sleep(FAST_SWEEP + Duration::from_millis(50)).await;
    let reclaimed = wait_until(Duration::from_secs(2), || {
        !monitor.monitor().contains_connection(id)
    })
    .await;

    assert!(reclaimed);
    assert_eq!(collector.deleted(), 1);
    monitor.shutdown().await;
}

#[tokio::test]
async fn test_live_connections_survive_sweeps() {
    let (monitor, _provider) = duplex_monitor(MANUAL_SWEEP);
    let conn = monitor.get().await.unwrap();

    for _ in 0..3 {
        let report = monitor.monitor().sweep();
        assert!(report.is_empty());
    }
    assert!(monitor.monitor().contains_connection(conn.id()));
    assert!(conn.is_valid());
}

#[tokio::test]
async fn test_only_dropped_connections_reclaimed() {
    let (monitor, _provider) = duplex_monitor(MANUAL_SWEEP);
    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for i in 0..10 {
        let conn = monitor.get().await.unwrap();
        if i % 2 == 0 {
            dropped.push(conn.id());
        } else {
            kept.push(conn);
        }
    }

    let report = monitor.monitor().sweep();

    assert_eq!(report.reclaimed, 5);
    assert_eq!(monitor.monitor().connection_count(), 5);
    for id in dropped {
        assert!(!monitor.monitor().contains_connection(id));
    }
    for conn in &kept {
        assert!(monitor.monitor().contains_connection(conn.id()));
    }
}

#[tokio::test]
async fn test_connection_without_activity_deletes_nothing() {
    let (monitor, _provider) = duplex_monitor(MANUAL_SWEEP);
    let collector = RecordingCollector::new("rec");
    monitor.add_stat_collector(collector.clone());

    drop(monitor.get().await.unwrap());
    assert_eq!(monitor.monitor().sweep().reclaimed, 1);

    // State is created lazily; an idle connection never had any
    assert_eq!(collector.created(), 0);
    assert_eq!(collector.deleted(), 0);
}

#[tokio::test]
async fn test_shutdown_joins_sweep_task() {
    let (monitor, _provider) = duplex_monitor(FAST_SWEEP);
    assert!(monitor.monitor().is_running());

    tokio::time::timeout(Duration::from_secs(2), monitor.shutdown())
        .await
        .expect("sweep task did not stop");

    assert!(!monitor.monitor().is_running());

    // No more background passes after shutdown
    let conn = monitor.get().await.unwrap();
    let id = conn.id();
    drop(conn);
    tokio::time::sleep(FAST_SWEEP * 3).await;
    assert!(monitor.monitor().contains_connection(id));
}

#[tokio::test]
async fn test_connection_keeps_monitor_alive() {
    let (facade, provider) = duplex_monitor(MANUAL_SWEEP);
    let mut conn = facade.get().await.unwrap();
    let mut peer = provider.take_peer();
    let monitor = Arc::downgrade(facade.monitor());

    drop(facade);
    assert!(monitor.upgrade().is_some());

    // Still usable once the facade is gone
    conn.write_all(b"ok").await.unwrap();
    let mut buf = [0u8; 2];
    peer.read_exact(&mut buf).await.unwrap();
    assert_eq!(conn.stats().total_write, 2);
    assert!(!conn.monitor().is_running());
}
