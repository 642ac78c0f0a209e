//! Property-based tests for the migration engine.
//!
//! Uses proptest over registry length, starting version and failure point:
//! - A pass ends at the registry length and runs each pending step once
//! - A database ahead of the registry is rejected untouched
//! - A failing step stops the pass at the version before it

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use rssd::migration::read_version;
use rssd::{Error, MigrationRegistry, Migrator, SchemaState};
use rusqlite::Connection;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counting_registry(
    len: usize,
    fail_at: Option<usize>,
    counters: &Arc<Vec<AtomicUsize>>,
) -> MigrationRegistry {
    (0..len)
        .fold(MigrationRegistry::builder(), |builder, i| {
            let counters = Arc::clone(counters);
            builder.procedure(format!("step {i}"), move |tx| {
                counters[i].fetch_add(1, Ordering::SeqCst);
                if fail_at == Some(i) {
                    return Err(Error::InvalidInput(format!("step {i} failed")));
                }
                tx.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS t{i} (id INTEGER PRIMARY KEY);"
                ))
                .map_err(|e| Error::operation("create_table", e))
            })
        })
        .build()
}

fn counters(len: usize) -> Arc<Vec<AtomicUsize>> {
    Arc::new((0..len).map(|_| AtomicUsize::new(0)).collect())
}

fn counts(counters: &Arc<Vec<AtomicUsize>>) -> Vec<usize> {
    counters.iter().map(|c| c.load(Ordering::SeqCst)).collect()
}

fn conn_at(version: usize) -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {version}"))
        .unwrap();
    conn
}

proptest! {
    /// Property: from any version at or below the registry length, one pass
    /// reaches the length and runs exactly the pending steps once each.
    #[test]
    fn prop_pass_applies_each_pending_step_once(len in 0usize..8, start_frac in 0.0f64..=1.0) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let start = (len as f64 * start_frac).floor() as usize;
        let counters = counters(len);
        let registry = counting_registry(len, None, &counters);
        let mut conn = conn_at(start);

        let report = Migrator::new(&registry).run(&mut conn).unwrap();

        prop_assert_eq!(read_version(&conn).unwrap() as usize, len);
        prop_assert_eq!(report.from as usize, start);
        prop_assert_eq!(report.applied.len(), len - start);
        let expected: Vec<usize> = (0..len).map(|i| usize::from(i >= start)).collect();
        prop_assert_eq!(counts(&counters), expected.clone());

        let again = Migrator::new(&registry).run(&mut conn).unwrap();
        prop_assert!(again.is_noop());
        prop_assert_eq!(counts(&counters), expected);
    }

    /// Property: a version beyond the registry is skew and nothing runs.
    #[test]
    fn prop_ahead_is_rejected_untouched(len in 0usize..6, extra in 1usize..6) {
        let counters = counters(len);
        let registry = counting_registry(len, None, &counters);
        let mut conn = conn_at(len + extra);

        let result = Migrator::new(&registry).run(&mut conn);

        let is_skew = matches!(
            result,
            Err(Error::VersionSkew { current, supported })
                if current as usize == len + extra && supported as usize == len
        );
        prop_assert!(is_skew);
        prop_assert_eq!(read_version(&conn).unwrap() as usize, len + extra);
        prop_assert!(counts(&counters).iter().all(|&c| c == 0));
    }

    /// Property: when step `k` fails the version is `k` and later steps never
    /// run.
    #[test]
    fn prop_failure_stops_at_failing_step(len in 1usize..8, fail_frac in 0.0f64..1.0) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let fail_at = ((len as f64 * fail_frac).floor() as usize).min(len - 1);
        let counters = counters(len);
        let registry = counting_registry(len, Some(fail_at), &counters);
        let mut conn = conn_at(0);

        let result = Migrator::new(&registry).run(&mut conn);

        let failed_version = matches!(
            result,
            Err(Error::MigrationStep { version, .. }) if version as usize == fail_at + 1
        );
        prop_assert!(failed_version);
        prop_assert_eq!(read_version(&conn).unwrap() as usize, fail_at);
        let expected: Vec<usize> = (0..len).map(|i| usize::from(i <= fail_at)).collect();
        prop_assert_eq!(counts(&counters), expected);
    }

    /// Property: classification is consistent with `pending`.
    #[test]
    fn prop_classify_pending(current in 0u32..100, target in 0u32..100) {
        let state = SchemaState::classify(current, target);
        prop_assert_eq!(state.current(), current);
        if current <= target {
            prop_assert_eq!(state.pending(), target - current);
        } else {
            prop_assert_eq!(state.pending(), 0);
        }
    }
}
