//! Integration tests exercising storages end to end on both backends.
//!
//! These tests verify that:
//! 1. Resource reads and writes behave identically on directories and archives
//! 2. Glob enumeration and single-result lookup follow the documented rules
//! 3. Deferred writes are debounced and observed by synchronous operations
//! 4. Root type detection rejects unsupported or conflicting roots

use anystore::deferred::{self, DeferredWriteTask};
use anystore::*;
use std::collections::HashSet;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

// =============================================================================
// Helpers
// =============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Root path for each backend type inside `dir`.
fn roots(dir: &TempDir) -> [(StorageType, PathBuf); 2] {
    [
        (StorageType::Directory, dir.path().join("tree")),
        (StorageType::Archive, dir.path().join("bundle.zip")),
    ]
}

/// Run `check` once per backend type against a fresh storage.
fn on_both_backends(check: impl Fn(&Storage)) {
    init_tracing();
    let dir = TempDir::new().unwrap();
    for (expected, root) in roots(&dir) {
        let storage = Storage::new(&root).unwrap();
        assert_eq!(storage.storage_type(), expected);
        check(&storage);
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let give_up = Instant::now() + Duration::from_secs(10);
    while Instant::now() < give_up {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

// =============================================================================
// Tests: Resource Reads and Writes
// =============================================================================

#[test]
fn write_then_read_round_trips() {
    on_both_backends(|storage| {
        let r = storage.get_resource("nested/dir/data.bin");
        assert!(!r.exists().unwrap());

        let payload: Vec<u8> = (0..=255).collect();
        r.write_bytes(&payload, false).unwrap();
        assert!(r.exists().unwrap());
        assert_eq!(r.read_to_bytes().unwrap(), payload);
        assert_eq!(r.size().unwrap(), 256);
        assert!(storage.get_resource("nested/dir").exists().unwrap());
    });
}

#[test]
fn append_accumulates() {
    on_both_backends(|storage| {
        let r = storage.get_resource("log.txt");
        r.write_str("A", false).unwrap();
        r.write_str("B", true).unwrap();
        r.write_str("C", true).unwrap();
        assert_eq!(r.read_to_string().unwrap(), "ABC");

        r.write_bytes(b"DEF", true).unwrap();
        let copied = r.write_from_reader(&mut "GHI".as_bytes(), true).unwrap();
        assert_eq!(copied, 3);
        assert_eq!(r.read_to_string().unwrap(), "ABCDEFGHI");
    });
}

#[test]
fn write_without_append_truncates() {
    on_both_backends(|storage| {
        let r = storage.get_resource("t.txt");
        r.write_str("a much longer original", false).unwrap();
        r.write_str("XYZ", false).unwrap();
        assert_eq!(r.read_to_string().unwrap(), "XYZ");
        assert_eq!(r.size().unwrap(), 3);
    });
}

#[test]
fn streamed_write_larger_than_one_chunk() {
    on_both_backends(|storage| {
        let r = storage.get_resource("big.bin");
        let payload = vec![0xABu8; COPY_CHUNK * 2 + 5];
        let copied = r.write_from_reader(&mut payload.as_slice(), false).unwrap();
        assert_eq!(copied, payload.len() as u64);
        assert_eq!(r.read_to_bytes().unwrap(), payload);
    });
}

#[test]
fn read_from_stream_sees_content() {
    on_both_backends(|storage| {
        let r = storage.get_resource("stream.txt");
        r.write_str("streamed text", false).unwrap();
        let text = r
            .read_from_stream(|stream| {
                let mut text = String::new();
                stream.read_to_string(&mut text).map(|_| text)
            })
            .unwrap();
        assert_eq!(text, "streamed text");
    });
}

#[test]
fn missing_resource_reads_fail_with_not_found() {
    on_both_backends(|storage| {
        storage.get_resource("present.txt").write_str("x", false).unwrap();
        let r = storage.get_resource("absent.txt");
        assert!(!r.exists().unwrap());
        assert!(r.read_to_bytes().unwrap_err().is_not_found());
        assert!(r.read_to_string().unwrap_err().is_not_found());
        assert!(r.size().unwrap_err().is_not_found());
        r.delete().unwrap();
    });
}

#[test]
fn delete_removes_files_and_directories() {
    on_both_backends(|storage| {
        storage.get_resource("d/one.txt").write_str("1", false).unwrap();
        storage.get_resource("d/sub/two.txt").write_str("2", false).unwrap();
        storage.get_resource("keep.txt").write_str("k", false).unwrap();

        storage.get_resource("d/one.txt").delete().unwrap();
        assert!(!storage.get_resource("d/one.txt").exists().unwrap());
        assert!(storage.get_resource("d/sub/two.txt").exists().unwrap());

        storage.get_resource("d").delete().unwrap();
        assert!(!storage.get_resource("d/sub/two.txt").exists().unwrap());
        assert!(storage.get_resource("keep.txt").exists().unwrap());
    });
}

#[test]
fn leading_slash_addresses_the_same_entry() {
    on_both_backends(|storage| {
        storage.get_resource("/slash.txt").write_str("s", false).unwrap();
        assert_eq!(
            storage.get_resource("slash.txt").read_to_string().unwrap(),
            "s"
        );
    });
}

// =============================================================================
// Tests: Enumeration
// =============================================================================

fn seed_people(storage: &Storage) {
    for path in [
        "john.txt",
        "first/john.txt",
        "second/john.txt",
        "bob.txt",
        "first/bob.txt",
        "second/bob.txt",
        "alice.txt",
    ] {
        storage.get_resource(path).write_str(path, false).unwrap();
    }
}

#[test]
fn glob_discovery_counts() {
    on_both_backends(|storage| {
        seed_people(storage);
        assert_eq!(storage.find_resources("john.txt").unwrap().len(), 1);
        assert_eq!(storage.find_resources("**/john.txt").unwrap().len(), 2);
        assert_eq!(storage.find_resources("**john.txt").unwrap().len(), 3);
        assert_eq!(storage.find_resources("**o*.txt").unwrap().len(), 6);
        assert_eq!(storage.find_resources("JOHN.TXT").unwrap().len(), 1);
        assert_eq!(storage.find_resources("{first,second}/*").unwrap().len(), 4);
    });
}

#[test]
fn found_resources_are_readable() {
    on_both_backends(|storage| {
        seed_people(storage);
        for r in storage.find_resources("**/bob.txt").unwrap() {
            assert_eq!(r.read_to_string().unwrap(), r.path());
            assert_eq!(r.storage(), storage);
        }
    });
}

#[test]
fn find_resource_multiplicity() {
    on_both_backends(|storage| {
        seed_people(storage);
        let single = storage.find_resource("alice.txt").unwrap().unwrap();
        assert_eq!(single.full_name(), "alice.txt");
        assert!(storage.find_resource("carol.txt").unwrap().is_none());

        match storage.find_resource("**john.txt") {
            Err(StorageError::AmbiguousMatch { matches, .. }) => {
                assert_eq!(matches.len(), 3);
                assert!(matches.iter().all(|line| line.contains("john.txt")));
            }
            other => panic!("expected ambiguous match, got {other:?}"),
        }
    });
}

#[test]
fn malformed_glob_is_rejected() {
    on_both_backends(|storage| {
        seed_people(storage);
        match storage.find_resources("{a,{b}}") {
            Err(StorageError::PatternSyntax { index, .. }) => assert_eq!(index, 3),
            other => panic!("expected pattern error, got {other:?}"),
        }
    });
}

// =============================================================================
// Tests: Storage Lifecycle
// =============================================================================

#[test]
fn storage_root_is_created_lazily() {
    on_both_backends(|storage| {
        assert!(!storage.exists().unwrap());
        assert!(storage.find_resources("**").unwrap().is_empty());
        assert!(!storage.exists().unwrap());

        storage.get_resource("first.txt").write_str("1", false).unwrap();
        assert!(storage.exists().unwrap());
    });
}

#[test]
fn deleting_storage_removes_everything() {
    on_both_backends(|storage| {
        seed_people(storage);
        let former = storage.find_resources("**").unwrap();
        assert_eq!(former.len(), 7);

        // A pending write is settled by the delete, not replayed after it.
        let late = storage.get_resource("late/write.txt");
        let task = DeferredWriteTask::with_delay(
            late.clone(),
            || b"too late".to_vec(),
            Duration::from_millis(50),
        );
        deferred::schedule(task).unwrap();
        assert!(deferred::global().is_pending(late.uri()));

        storage.delete().unwrap();
        assert!(!deferred::global().is_pending(late.uri()));
        assert!(!storage.path().exists());
        thread::sleep(Duration::from_millis(150));
        assert!(!storage.path().exists());
        assert!(!storage.exists().unwrap());
        for r in &former {
            assert!(!r.exists().unwrap());
        }

        // The handle stays usable.
        storage.get_resource("again.txt").write_str("x", false).unwrap();
        assert!(storage.exists().unwrap());
    });
}

#[test]
fn identity_is_by_uri() {
    let dir = TempDir::new().unwrap();
    let a = Storage::new(dir.path().join("s")).unwrap();
    let b = Storage::new(dir.path().join("s/")).unwrap();
    assert_eq!(a, b);

    let mut seen = HashSet::new();
    seen.insert(a.get_resource("x/y.txt"));
    seen.insert(b.get_resource(r"x\y.txt"));
    seen.insert(b.get_resource("/x/y.txt"));
    assert_eq!(seen.len(), 1);
}

#[test]
fn archive_survives_reopening() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("data.bin");
    let storage = Storage::with_type(&root, StorageType::Archive).unwrap();
    storage.get_resource("a/b.txt").write_str("kept", false).unwrap();
    assert!(is_archive_file(&root));

    let reopened = Storage::new(&root).unwrap();
    assert_eq!(reopened.storage_type(), StorageType::Archive);
    assert_eq!(
        reopened.get_resource("a/b.txt").read_to_string().unwrap(),
        "kept"
    );
}

// =============================================================================
// Tests: Type Detection
// =============================================================================

#[test]
fn plain_file_root_is_rejected() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("notes.txt");
    std::fs::write(&root, "not an archive").unwrap();
    assert!(matches!(
        Storage::new(&root),
        Err(StorageError::TypeMismatch { .. })
    ));
}

#[test]
fn explicit_type_must_match_existing_root() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        Storage::with_type(dir.path(), StorageType::Archive),
        Err(StorageError::TypeMismatch { .. })
    ));

    let zip = dir.path().join("x.zip");
    Storage::new(&zip)
        .unwrap()
        .get_resource("f")
        .write_str("f", false)
        .unwrap();
    assert!(matches!(
        Storage::with_type(&zip, StorageType::Directory),
        Err(StorageError::TypeMismatch { .. })
    ));
}

// =============================================================================
// Tests: Deferred Writes
// =============================================================================

#[test]
fn deferred_write_is_observed_before_delay() {
    on_both_backends(|storage| {
        let r = storage.get_resource("deferred/value.txt");
        r.write_deferred_str("pending").unwrap();
        assert!(deferred::global().is_pending(r.uri()));

        assert!(r.exists().unwrap());
        assert!(!deferred::global().is_pending(r.uri()));
        assert_eq!(r.read_to_string().unwrap(), "pending");
    });
}

#[test]
fn deferred_debounce_writes_last_content_once() {
    on_both_backends(|storage| {
        let r = storage.get_resource("debounced.txt");
        let calls = Arc::new(AtomicUsize::new(0));
        for i in 0..25 {
            let calls = Arc::clone(&calls);
            let task = DeferredWriteTask::with_delay(
                r.clone(),
                move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    format!("version {i}").into_bytes()
                },
                Duration::from_secs(60),
            );
            deferred::schedule(task).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(r.read_to_string().unwrap(), "version 24");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn deferred_write_replaces_content() {
    on_both_backends(|storage| {
        let r = storage.get_resource("replace.txt");
        r.write_str("old and long", false).unwrap();
        r.write_deferred(b"new".to_vec()).unwrap();
        assert_eq!(r.read_to_bytes().unwrap(), b"new");
    });
}

#[test]
fn synchronous_write_applies_pending_deferred_first() {
    on_both_backends(|storage| {
        let r = storage.get_resource("ordered.txt");
        r.write_deferred_str("first ").unwrap();
        r.write_str("second", true).unwrap();
        assert_eq!(r.read_to_string().unwrap(), "first second");
    });
}

#[test]
fn storage_operations_flush_whole_storage() {
    on_both_backends(|storage| {
        for name in ["a.txt", "b/b.txt", "c/c/c.txt"] {
            storage.get_resource(name).write_deferred_str(name).unwrap();
        }
        assert_eq!(storage.find_resources("**.txt").unwrap().len(), 3);
        for name in ["a.txt", "b/b.txt", "c/c/c.txt"] {
            assert!(!deferred::global().is_pending(storage.get_resource(name).uri()));
        }
    });
}

#[test]
fn background_worker_writes_without_observation() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path()).unwrap();
    let r = storage.get_resource("bg/worker.txt");
    let task = DeferredWriteTask::with_delay(r, || b"from worker".to_vec(), Duration::from_millis(30));
    deferred::schedule(task).unwrap();

    let on_disk = dir.path().join("bg/worker.txt");
    assert!(wait_for(|| {
        std::fs::read_to_string(&on_disk).is_ok_and(|text| text == "from worker")
    }));
}

#[test]
fn concurrent_deferred_writes_to_distinct_resources() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path()).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let storage = storage.clone();
            thread::spawn(move || {
                for i in 0..20 {
                    storage
                        .get_resource(&format!("t{t}/value.txt"))
                        .write_deferred_str(format!("{t}:{i}"))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let found = storage.find_resources("*/value.txt").unwrap();
    assert_eq!(found.len(), 8);
    for t in 0..8 {
        assert_eq!(
            storage
                .get_resource(&format!("t{t}/value.txt"))
                .read_to_string()
                .unwrap(),
            format!("{t}:19")
        );
    }
}
