//! # Property-Based Tests
//!
//! Invariants of identifier translation, replay ordering and store
//! uniqueness, checked with proptest.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::collection::{btree_map, vec};
use proptest::prelude::*;
use reimport_core::formats::OldBurstId;
use reimport_core::operations::{sort_datatypes, sort_for_replay};
use reimport_core::{
    BurstId, DataType, EntityStore, IdentifierRemapper, ImportError, MemoryStore, Operation,
    Project, ProjectId, UserId,
};
use std::collections::BTreeSet;

// =============================================================================
// HELPERS
// =============================================================================

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2014, 1, 1)
        .expect("date")
        .and_hms_opt(0, 0, 0)
        .expect("time")
}

fn at(minutes: Option<i64>) -> Option<NaiveDateTime> {
    minutes.map(|m| epoch() + Duration::minutes(m))
}

fn operation(index: usize, start: Option<i64>, created: Option<i64>) -> Operation {
    Operation {
        id: None,
        gid: format!("op-{}", index),
        fk_project: ProjectId(1),
        fk_launched_by: UserId(1),
        fk_operation_group: None,
        algorithm: None,
        parameters: "{}".to_string(),
        status: "FINISHED".to_string(),
        user_group: None,
        visible: true,
        start_date: at(start),
        create_date: at(created),
        completion_date: None,
        import_file: None,
    }
}

fn project(gid: &str) -> Project {
    Project {
        id: None,
        gid: gid.to_string(),
        name: format!("name-{}", gid),
        description: String::new(),
        owner: UserId(1),
    }
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Every recorded identifier resolves to what it was recorded with,
    /// and recording the same pair again changes nothing.
    #[test]
    fn remap_resolves_recorded_pairs(
        pairs in btree_map("[0-9]{1,4}", 1u64..100_000, 1..40)
    ) {
        let mut remapper = IdentifierRemapper::new();
        for (old, new) in &pairs {
            remapper.record(OldBurstId::new(old.clone()), BurstId(*new)).expect("record");
        }
        for (old, new) in &pairs {
            remapper.record(OldBurstId::new(old.clone()), BurstId(*new)).expect("re-record");
        }

        prop_assert_eq!(remapper.len(), pairs.len());
        for (old, new) in &pairs {
            let resolved = remapper.resolve(&OldBurstId::new(old.clone())).expect("resolve");
            prop_assert_eq!(resolved, BurstId(*new));
        }
    }

    /// Rebinding an identifier to a different value fails and keeps the first binding.
    #[test]
    fn remap_rejects_conflicting_rebind(old in "[0-9]{1,4}", first in 1u64..1000, delta in 1u64..1000) {
        let mut remapper = IdentifierRemapper::new();
        remapper.record(OldBurstId::new(old.clone()), BurstId(first)).expect("record");

        let conflict = remapper.record(OldBurstId::new(old.clone()), BurstId(first + delta));
        prop_assert!(conflict.is_err());
        prop_assert_eq!(
            remapper.resolve(&OldBurstId::new(old)).expect("resolve"),
            BurstId(first)
        );
    }

    /// Unrecorded identifiers never resolve.
    #[test]
    fn remap_unrecorded_is_error(recorded in "[a-m]{1,6}", asked in "[n-z]{1,6}") {
        let mut remapper = IdentifierRemapper::new();
        remapper.record(OldBurstId::new(recorded), BurstId(1)).expect("record");
        prop_assert!(matches!(
            remapper.resolve(&OldBurstId::new(asked)),
            Err(ImportError::UnmappedIdentifier(_))
        ));
    }

    /// Replay order is a permutation sorted by start date, then create date,
    /// then the import time for undated operations.
    #[test]
    fn replay_order_sorted_by_effective_date(
        dates in vec((proptest::option::of(0i64..10_000), proptest::option::of(0i64..10_000)), 0..40)
    ) {
        let now = epoch() + Duration::minutes(20_000);
        let mut operations: Vec<Operation> = dates
            .iter()
            .enumerate()
            .map(|(i, (start, created))| operation(i, *start, *created))
            .collect();
        let before: BTreeSet<String> = operations.iter().map(|op| op.gid.clone()).collect();

        sort_for_replay(&mut operations, now);

        let after: BTreeSet<String> = operations.iter().map(|op| op.gid.clone()).collect();
        prop_assert_eq!(before, after);
        for pair in operations.windows(2) {
            prop_assert!(pair[0].replay_key(now) <= pair[1].replay_key(now));
        }
    }

    /// Replay sorting is stable: equal keys keep their discovery order.
    #[test]
    fn replay_order_is_stable(count in 1usize..30, minute in 0i64..100) {
        let mut operations: Vec<Operation> =
            (0..count).map(|i| operation(i, Some(minute), None)).collect();
        sort_for_replay(&mut operations, epoch());

        let gids: Vec<String> = operations.iter().map(|op| op.gid.clone()).collect();
        let expected: Vec<String> = (0..count).map(|i| format!("op-{}", i)).collect();
        prop_assert_eq!(gids, expected);
    }

    /// Undated datatypes are loaded before dated ones.
    #[test]
    fn undated_datatypes_sort_first(dates in vec(proptest::option::of(0i64..10_000), 0..30)) {
        let mut datatypes: Vec<DataType> = dates
            .iter()
            .map(|minutes| {
                let mut datatype = DataType::blank("TimeSeries", "datatypes.time_series", &[]);
                datatype.create_date = at(*minutes);
                datatype
            })
            .collect();
        sort_datatypes(&mut datatypes);

        let first_dated = datatypes
            .iter()
            .position(|dt| dt.create_date.is_some())
            .unwrap_or(datatypes.len());
        prop_assert!(datatypes[first_dated..].iter().all(|dt| dt.create_date.is_some()));
        for pair in datatypes[first_dated..].windows(2) {
            prop_assert!(pair[0].create_date <= pair[1].create_date);
        }
    }

    /// Stored projects get distinct, increasing ids; a repeated gid is rejected.
    #[test]
    fn project_ids_unique_and_gids_exclusive(gids in proptest::collection::btree_set("[a-z]{3,8}", 1..20)) {
        let mut store = MemoryStore::new();
        let mut last = 0u64;
        for gid in &gids {
            let stored = store.store_project(project(gid)).expect("store");
            let id = stored.id.expect("assigned").0;
            prop_assert!(id > last);
            last = id;
        }

        let again = gids.iter().next().expect("non-empty");
        prop_assert!(matches!(
            store.store_project(project(again)),
            Err(ImportError::DuplicateEntity(_))
        ));
        prop_assert_eq!(store.projects().len(), gids.len());
    }
}
