//! Property-based tests using proptest
//!
//! Counter invariants of ConnectionStats under arbitrary outcome sequences.

use connection_monitor::{ConnectionStats, IoOutcome};
use proptest::prelude::*;
use std::io;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Op {
    Read(IoOutcome),
    Write(IoOutcome),
}

fn outcome() -> impl Strategy<Value = IoOutcome> {
    prop_oneof![
        (0usize..65_536).prop_map(IoOutcome::Transferred),
        Just(IoOutcome::EndOfStream),
        prop_oneof![
            Just(io::ErrorKind::BrokenPipe),
            Just(io::ErrorKind::ConnectionReset),
            Just(io::ErrorKind::TimedOut),
        ]
        .prop_map(IoOutcome::Failed),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![outcome().prop_map(Op::Read), outcome().prop_map(Op::Write)]
}

proptest! {
    #[test]
    fn prop_totals_never_decrease(ops in prop::collection::vec(op(), 0..200)) {
        let start = Instant::now();
        let mut stats = ConnectionStats::new(start);
        let (mut read, mut written) = (0u64, 0u64);

        for (i, op) in ops.iter().enumerate() {
            let now = start + Duration::from_millis(i as u64);
            match op {
                Op::Read(o) => { stats.record_read(*o, now); }
                Op::Write(o) => { stats.record_write(*o, now); }
            }
            prop_assert!(stats.total_read() >= read);
            prop_assert!(stats.total_write() >= written);
            read = stats.total_read();
            written = stats.total_write();
        }
    }

    #[test]
    fn prop_totals_equal_sum_of_transfers(ops in prop::collection::vec(op(), 0..200)) {
        let now = Instant::now();
        let mut stats = ConnectionStats::new(now);
        let mut expected_read = 0u64;
        let mut expected_write = 0u64;

        for op in &ops {
            match op {
                Op::Read(o) => {
                    stats.record_read(*o, now);
                    expected_read += o.bytes() as u64;
                }
                Op::Write(o) => {
                    stats.record_write(*o, now);
                    expected_write += o.bytes() as u64;
                }
            }
        }

        prop_assert_eq!(stats.total_read(), expected_read);
        prop_assert_eq!(stats.total_write(), expected_write);
    }

    #[test]
    fn prop_failures_never_touch_timestamps(kinds in prop::collection::vec(0u8..3, 1..50)) {
        let now = Instant::now();
        let mut stats = ConnectionStats::new(now);

        for k in kinds {
            let kind = match k {
                0 => io::ErrorKind::BrokenPipe,
                1 => io::ErrorKind::ConnectionReset,
                _ => io::ErrorKind::UnexpectedEof,
            };
            prop_assert!(!stats.record_read(IoOutcome::Failed(kind), now));
            prop_assert!(!stats.record_write(IoOutcome::Failed(kind), now));
        }

        prop_assert!(stats.last_read_at().is_none());
        prop_assert!(stats.last_write_at().is_none());
        prop_assert_eq!(stats.total_read() + stats.total_write(), 0);
    }

    #[test]
    fn prop_last_size_tracks_latest_definite_read(ops in prop::collection::vec(outcome(), 1..100)) {
        let now = Instant::now();
        let mut stats = ConnectionStats::new(now);
        let mut last = None;

        for o in &ops {
            stats.record_read(*o, now);
            if o.is_definite() {
                last = Some(o.bytes());
            }
        }

        prop_assert_eq!(stats.last_read_size(), last.unwrap_or(0));
        prop_assert_eq!(stats.last_read_at().is_some(), last.is_some());
    }
}
