//! Integration tests against the public `Store` API: round-trip, durability
//! across reopen, crash-truncation recovery, and input validation.

use blobvault::{Store, StoreConfig, StoreError, StreamInfo};
use proptest::prelude::*;
use std::io::{Cursor, Read, Seek, SeekFrom};
use tempfile::tempdir;

#[test]
fn round_trip_many_keys() {
    let dir = tempdir().unwrap();
    let store = Store::open(StoreConfig::new(dir.path())).unwrap();

    let mut expected = Vec::new();
    for i in 0..64 {
        let payload = vec![i as u8; 37 + i];
        let key = format!("key-{i}");
        store
            .add(&key, Cursor::new(payload.clone()), StreamInfo::new().with_length(payload.len() as u64))
            .unwrap();
        expected.push((key, payload));
    }

    for (key, payload) in expected {
        let mut out = Vec::new();
        store.get(&key).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    store.close().unwrap();
}

#[test]
fn durability_across_reopen_preserves_all_keys() {
    let dir = tempdir().unwrap();
    {
        let store = Store::open(StoreConfig::new(dir.path())).unwrap();
        for i in 0..20 {
            store
                .add(&format!("k{i}"), Cursor::new(vec![i as u8; 16]), StreamInfo::new())
                .unwrap();
        }
        store.close().unwrap();
    }

    let store = Store::open(StoreConfig::new(dir.path())).unwrap();
    for i in 0..20 {
        let mut out = Vec::new();
        store.get(&format!("k{i}")).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![i as u8; 16]);
    }
}

#[test]
fn empty_stream_round_trips() {
    let dir = tempdir().unwrap();
    let store = Store::open(StoreConfig::new(dir.path())).unwrap();

    store.add("empty", Cursor::new(Vec::<u8>::new()), StreamInfo::new()).unwrap();
    let mut out = Vec::new();
    store.get("empty").unwrap().read_to_end(&mut out).unwrap();
    assert!(out.is_empty());
}

#[test]
fn duplicate_key_is_rejected_and_first_value_survives() {
    let dir = tempdir().unwrap();
    let store = Store::open(StoreConfig::new(dir.path())).unwrap();

    store.add("k", Cursor::new(b"first".to_vec()), StreamInfo::new()).unwrap();
    let err = store
        .add("k", Cursor::new(b"second".to_vec()), StreamInfo::new())
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));

    let mut out = Vec::new();
    store.get("k").unwrap().read_to_end(&mut out).unwrap();
    assert_eq!(out, b"first");
}

#[test]
fn empty_key_is_rejected() {
    let dir = tempdir().unwrap();
    let store = Store::open(StoreConfig::new(dir.path())).unwrap();
    let err = store.add("", Cursor::new(b"x".to_vec()), StreamInfo::new()).unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
}

#[test]
fn declared_length_mismatch_is_rejected() {
    let dir = tempdir().unwrap();
    let store = Store::open(StoreConfig::new(dir.path())).unwrap();
    let err = store
        .add("k", Cursor::new(b"0123456789".to_vec()), StreamInfo::new().with_length(3))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
    assert!(!store.contains("k"));
}

#[test]
fn declared_hash_mismatch_is_rejected() {
    let dir = tempdir().unwrap();
    let store = Store::open(StoreConfig::new(dir.path())).unwrap();
    let err = store
        .add("k", Cursor::new(b"0123456789".to_vec()), StreamInfo::new().with_hash([0x11; 16]))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
}

#[test]
fn offset_accounts_for_bytes_skipped_by_a_prior_failed_add() {
    // spec.md §8 S5: a rejected add's already-streamed bytes are skipped
    // rather than discarded, so the next add's offset lands right after
    // them instead of reusing the failed stream's reserved offset.
    let dir = tempdir().unwrap();
    let store = Store::open(StoreConfig::new(dir.path())).unwrap();

    let failed_payload = b"0123456789".to_vec();
    let err = store
        .add(
            "bad",
            Cursor::new(failed_payload.clone()),
            StreamInfo::new().with_hash([0x11; 16]),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
    assert!(!store.contains("bad"));

    let meta = store
        .add("good", Cursor::new(b"next".to_vec()), StreamInfo::new())
        .unwrap();
    assert_eq!(meta.offset, failed_payload.len() as u64);
}

#[test]
fn slice_bounds_reject_seek_past_end() {
    let dir = tempdir().unwrap();
    let store = Store::open(StoreConfig::new(dir.path())).unwrap();
    store.add("k", Cursor::new(b"hello".to_vec()), StreamInfo::new()).unwrap();

    let mut stream = store.get("k").unwrap();
    assert!(stream.seek(SeekFrom::Start(100)).is_err());
    assert_eq!(stream.seek(SeekFrom::Start(5)).unwrap(), 5);
}

#[test]
fn crash_truncation_recovers_clean_prefix() {
    let dir = tempdir().unwrap();
    let storage_path;
    {
        let store = Store::open(StoreConfig::new(dir.path())).unwrap();
        store.add("k1", Cursor::new(b"alpha".to_vec()), StreamInfo::new()).unwrap();
        storage_path = StoreConfig::new(dir.path()).storage_path();
        store.close().unwrap();
    }

    // Append bytes past the durable length — an append thread crash that
    // wrote to the data file but never reached the index.
    {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().append(true).open(&storage_path).unwrap();
        file.write_all(b"half-written-record").unwrap();
    }

    let store = Store::open(StoreConfig::new(dir.path())).unwrap();
    let mut out = Vec::new();
    store.get("k1").unwrap().read_to_end(&mut out).unwrap();
    assert_eq!(out, b"alpha");

    store
        .add("k2", Cursor::new(b"bravo".to_vec()), StreamInfo::new())
        .unwrap();
    let mut out2 = Vec::new();
    store.get("k2").unwrap().read_to_end(&mut out2).unwrap();
    assert_eq!(out2, b"bravo");
}

proptest! {
    #[test]
    fn round_trip_holds_for_arbitrary_payloads(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let dir = tempdir().unwrap();
        let store = Store::open(StoreConfig::new(dir.path())).unwrap();
        store.add("k", Cursor::new(payload.clone()), StreamInfo::new().with_length(payload.len() as u64)).unwrap();

        let mut out = Vec::new();
        store.get("k").unwrap().read_to_end(&mut out).unwrap();
        prop_assert_eq!(out, payload);
    }
}
