#![forbid(unsafe_code)]

use rl_core::select::{self, Decision};
use rl_core::{Attributes, Resource};
use rl_storage::{ClaimRequest, SqliteStore, StoreError, StoreOptions};
use rusqlite::{Connection, params};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::BTreeSet;
use tempfile::TempDir;

fn host(name: &str) -> Attributes {
    match json!({"HOST": name}) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn hosts(names: &[&str]) -> Vec<Attributes> {
    names.iter().map(|name| host(name)).collect()
}

fn request(lock: &str) -> ClaimRequest {
    ClaimRequest {
        lock_name: lock.to_string(),
        reason: None,
    }
}

fn sorted_keys(resources: &[Resource]) -> Vec<String> {
    let mut keys: Vec<String> = resources.iter().map(|r| r.key().to_string()).collect();
    keys.sort();
    keys
}

fn setup(names: &[&str]) -> (TempDir, SqliteStore) {
    let dir = TempDir::new().expect("temp dir");
    let mut store = SqliteStore::open(dir.path()).expect("open store");
    store.set_pool(hosts(names)).expect("set pool");
    (dir, store)
}

#[test]
fn claim_all_takes_every_unlocked_resource() {
    let (_dir, mut store) = setup(&["1", "2", "3", "4"]);

    let claimed = store.claim_all(request("lockX")).expect("claim");
    assert_eq!(sorted_keys(&claimed), vec!["1", "2", "3", "4"]);
    assert_eq!(store.get_locks().expect("locks"), vec!["lockX"]);

    let again = store.claim_all(request("lockY")).expect("second claim");
    assert!(again.is_empty());
    assert_eq!(store.get_locks().expect("locks"), vec!["lockX"]);
}

#[test]
fn claimed_resources_carry_their_attributes() {
    let dir = TempDir::new().expect("temp dir");
    let mut store = SqliteStore::open(dir.path()).expect("open store");
    let Value::Object(descriptor) = json!({"HOST": "node-a", "ARCH": "riscv64"}) else {
        unreachable!()
    };
    store.set_pool(vec![descriptor.clone()]).expect("set pool");

    let claimed = store.claim_all(request("job")).expect("claim");
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].clone().into_attributes(), descriptor);
}

#[test]
fn rejecting_selector_claims_nothing() {
    let (_dir, mut store) = setup(&["1", "2", "3"]);
    let before = store.get_lock_details(None).expect("details");

    let claimed = store
        .claim(request("lockX"), &select::matching(|_: &Resource| false))
        .expect("claim");

    assert!(claimed.is_empty());
    assert!(store.get_locks().expect("locks").is_empty());
    assert_eq!(store.get_lock_details(None).expect("details"), before);
}

#[test]
fn empty_lock_name_is_rejected_without_side_effects() {
    let (_dir, mut store) = setup(&["1", "2", "3"]);
    let before = store.get_lock_details(None).expect("details");

    let err = store.claim_all(request("")).expect_err("empty lock name");
    match err {
        StoreError::InvalidInput(message) => assert_eq!(message, "lock name must not be empty"),
        other => panic!("expected InvalidInput, got {other:?}"),
    }

    assert_eq!(store.get_lock_details(None).expect("details"), before);

    let (_empty_dir, mut empty) = setup(&[]);
    assert!(matches!(
        empty.claim_all(request("")),
        Err(StoreError::InvalidInput(_))
    ));
}

#[test]
fn empty_pool_yields_empty_claim() {
    let (_dir, mut store) = setup(&[]);
    assert!(store.claim_all(request("c")).expect("claim").is_empty());
}

#[test]
fn first_selector_claims_single_match() {
    let (_dir, mut store) = setup(&["1", "2", "3"]);

    let a = store
        .claim(request("a"), &select::first(|r: &Resource| r.key() == "1"))
        .expect("claim a");
    assert_eq!(sorted_keys(&a), vec!["1"]);

    let b = store
        .claim(request("b"), &select::first(|r: &Resource| r.key() == "2"))
        .expect("claim b");
    assert_eq!(sorted_keys(&b), vec!["2"]);

    // Already held by "a"; a second claim must not steal it.
    let stolen = store
        .claim(request("c"), &select::first(|r: &Resource| r.key() == "1"))
        .expect("claim c");
    assert!(stolen.is_empty());

    let any = store.claim(request("d"), &select::first_any()).expect("claim d");
    assert_eq!(sorted_keys(&any), vec!["3"]);

    assert_eq!(store.get_locks().expect("locks"), vec!["a", "b", "d"]);
}

#[test]
fn one_first_selector_serves_consecutive_claims() {
    let (_dir, mut store) = setup(&["1", "2", "3"]);
    let selector = select::first_any();

    let a = store.claim(request("a"), &selector).expect("claim a");
    let b = store.claim(request("b"), &selector).expect("claim b");
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_ne!(a[0].key(), b[0].key());

    let c = store.claim(request("c"), &selector).expect("claim c");
    assert_eq!(c.len(), 1);
    let d = store.claim(request("d"), &selector).expect("claim d");
    assert!(d.is_empty());

    assert_eq!(store.get_locks().expect("locks"), vec!["a", "b", "c"]);
}

#[test]
fn lazy_selector_sees_every_candidate_even_when_claiming_none() {
    let (_dir, mut store) = setup(&["1", "2", "3"]);
    let seen = RefCell::new(Vec::<String>::new());

    let selector = select::lazy(|candidate: &Resource| {
        let candidate = candidate.clone();
        let seen = &seen;
        Decision::new(move || {
            seen.borrow_mut().push(candidate.key().to_string());
            false
        })
    });
    let claimed = store.claim(request("a"), &selector).expect("claim");
    drop(selector);

    assert!(claimed.is_empty());
    let mut seen = seen.into_inner();
    seen.sort();
    assert_eq!(seen, vec!["1", "2", "3"]);
}

#[test]
fn claim_records_reason_and_timestamp() {
    let (_dir, mut store) = setup(&["1", "2"]);

    store
        .claim(
            ClaimRequest {
                lock_name: "build-7".to_string(),
                reason: Some("integration suite".to_string()),
            },
            &select::first(|r: &Resource| r.key() == "1"),
        )
        .expect("claim with reason");
    store
        .claim(request("build-8"), &select::first(|r: &Resource| r.key() == "2"))
        .expect("claim without reason");

    let details = store.get_lock_details(None).expect("details");
    assert_eq!(details["1"].lock, "build-7");
    assert_eq!(details["1"].reason.as_deref(), Some("integration suite"));
    assert!(details["1"].locked_at_ms.is_some_and(|ms| ms > 0));
    assert_eq!(details["2"].lock, "build-8");
    assert_eq!(details["2"].reason.as_deref(), Some(""));
    assert!(details["2"].locked_at_ms.is_some());
}

#[test]
fn same_seed_gives_same_candidate_order() {
    let names = ["a", "b", "c", "d", "e", "f", "g", "h"];
    let mut picks = Vec::new();
    for _ in 0..2 {
        let dir = TempDir::new().expect("temp dir");
        let mut store =
            SqliteStore::open_with(dir.path(), StoreOptions::default().with_shuffle_seed(7))
                .expect("open store");
        store.set_pool(hosts(&names)).expect("set pool");
        let order: Vec<String> = store
            .claim_all(request("ordered"))
            .expect("claim")
            .iter()
            .map(|r| r.key().to_string())
            .collect();
        picks.push(order);
    }
    assert_eq!(picks[0], picks[1]);
    assert_eq!(picks[0].len(), names.len());
}

#[test]
fn repeated_first_claims_spread_across_the_pool() {
    let dir = TempDir::new().expect("temp dir");
    let mut store =
        SqliteStore::open_with(dir.path(), StoreOptions::default().with_shuffle_seed(1234))
            .expect("open store");
    store.set_pool(hosts(&["a", "b", "c", "d"])).expect("set pool");

    let mut picked = BTreeSet::new();
    for _ in 0..64 {
        let claimed = store
            .claim(request("sampler"), &select::first_any())
            .expect("claim");
        assert_eq!(claimed.len(), 1);
        picked.insert(claimed[0].key().to_string());
        assert_eq!(store.release("sampler").expect("release"), 1);
    }

    assert_eq!(picked.len(), 4, "picked only {picked:?}");
}

#[test]
fn corrupt_candidate_aborts_claim() {
    let (dir, mut store) = setup(&["1", "2", "3"]);

    let db_path = dir.path().join(&store.options().db_file_name);
    {
        let conn = Connection::open(&db_path).expect("open db");
        conn.execute(
            "UPDATE resources SET attributes_json=?1 WHERE id=1",
            params!["{not json"],
        )
        .expect("corrupt row");
    }

    let err = store.claim_all(request("x")).expect_err("corrupt row");
    match err {
        StoreError::CorruptRecord { id, .. } => assert_eq!(id, 1),
        other => panic!("expected CorruptRecord, got {other:?}"),
    }
    assert!(store.get_locks().expect("locks").is_empty());
    assert!(matches!(
        store.get_pool(),
        Err(StoreError::CorruptRecord { id: 1, .. })
    ));
}

#[test]
fn lock_update_touching_no_row_rolls_back_whole_claim() {
    let (dir, mut store) = setup(&["1", "2", "3"]);

    let db_path = dir.path().join(&store.options().db_file_name);
    {
        let conn = Connection::open(&db_path).expect("open db");
        conn.execute_batch(
            "CREATE TRIGGER t BEFORE UPDATE ON resources WHEN OLD.id = 2 \
             BEGIN SELECT RAISE(IGNORE); END",
        )
        .expect("install trigger");
    }

    let err = store.claim_all(request("x")).expect_err("row 2 is never updated");
    assert!(
        matches!(err, StoreError::Inconsistent { id: 2, affected: 0 }),
        "expected Inconsistent for row 2, got {err:?}"
    );

    assert!(store.get_locks().expect("locks").is_empty());
    let details = store.get_lock_details(None).expect("details");
    assert_eq!(details.len(), 3);
    assert!(details.values().all(|detail| !detail.is_locked()));
}
