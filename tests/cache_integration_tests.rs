//! Integration Tests for the Response Cache
//!
//! Exercises the public API against real files: reopening, persistence,
//! corrupt files and eviction notifications.

use std::fs;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use response_cache::cache::cache_file_path;
use response_cache::{CacheError, CacheItem, CacheStore, Config, EvictionCause, MaxAge};
use tempfile::TempDir;

// == Helper Functions ==

fn response(url: &str, body: &str) -> Option<CacheItem> {
    Some(CacheItem::new(url, body))
}

const PHOTOS_URL: &str = "https://api.example.com/rest/?method=photos.search&tags=sunset";
const PEOPLE_URL: &str = "https://api.example.com/rest/?method=people.getInfo&user_id=1";

// == Persistence ==

#[test]
fn test_entries_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path().join("responses");

    {
        let store = CacheStore::open(&base).unwrap();
        store.set(PHOTOS_URL, response(PHOTOS_URL, "<photos/>")).unwrap();
        store.set(PEOPLE_URL, response(PEOPLE_URL, "<person/>")).unwrap();
        // Dropped without an explicit close
    }

    let store = CacheStore::open(&base).unwrap();
    assert_eq!(store.len().unwrap(), 2);
    let found = store.get(PHOTOS_URL, MaxAge::Never, false).unwrap().unwrap();
    assert_eq!(found.payload(), "<photos/>");
}

#[test]
fn test_open_twice_keeps_rows() {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path().join("responses");

    let first = CacheStore::open(&base).unwrap();
    first.insert(PHOTOS_URL, "<photos/>").unwrap();

    let second = CacheStore::open(&base).unwrap();
    assert_eq!(second.len().unwrap(), 1);
    assert_eq!(first.len().unwrap(), 1);
    assert_eq!(
        second
            .get(PHOTOS_URL, MaxAge::Never, false)
            .unwrap()
            .map(CacheItem::into_payload),
        Some("<photos/>".to_string())
    );
}

#[test]
fn test_file_named_with_extension() {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path().join("responses");

    let store = CacheStore::open(&base).unwrap();

    assert_eq!(store.path(), cache_file_path(&base));
    assert!(temp_dir.path().join("responses.sqlite").exists());
}

#[test]
fn test_corrupt_file_fails_open() {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path().join("broken");
    let garbage = vec![0xABu8; 8192];
    fs::write(cache_file_path(&base), &garbage).unwrap();

    let result = CacheStore::open(&base);

    assert!(matches!(result, Err(CacheError::Storage(_))));
    assert_eq!(fs::read(cache_file_path(&base)).unwrap(), garbage);
}

#[test]
fn test_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        cache_path: temp_dir.path().join("configured"),
        ..Config::default()
    };

    let store = CacheStore::from_config(&config).unwrap();
    store.insert(PHOTOS_URL, "<photos/>").unwrap();

    assert!(temp_dir.path().join("configured.sqlite").exists());
    store.close().unwrap();
}

// == Expiry ==

#[test]
fn test_stale_entry_kept_until_removed() {
    let temp_dir = TempDir::new().unwrap();
    let store = CacheStore::open(temp_dir.path().join("responses")).unwrap();
    let an_hour_ago = Utc::now() - Duration::hours(1);
    store
        .set(
            PHOTOS_URL,
            Some(CacheItem::with_creation_time(PHOTOS_URL, "<photos/>", an_hour_ago)),
        )
        .unwrap();
    let thirty_minutes = MaxAge::after(Duration::minutes(30)).unwrap();
    let two_hours = MaxAge::after(Duration::hours(2)).unwrap();

    // Stale for a strict caller but still on disk for a lenient one
    assert!(store.get(PHOTOS_URL, thirty_minutes, false).unwrap().is_none());
    assert!(store.get(PHOTOS_URL, two_hours, false).unwrap().is_some());

    assert!(store.get(PHOTOS_URL, thirty_minutes, true).unwrap().is_none());
    assert!(store.get(PHOTOS_URL, two_hours, false).unwrap().is_none());
}

// == Notifications ==

#[test]
fn test_eviction_hook_sequence() {
    let temp_dir = TempDir::new().unwrap();
    let events: Arc<Mutex<Vec<(String, String, EvictionCause)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let store = CacheStore::open(temp_dir.path().join("responses"))
        .unwrap()
        .on_evicted(move |item, cause| {
            sink.lock()
                .unwrap()
                .push((item.key().to_string(), item.payload().to_string(), cause));
        });

    store.insert(PHOTOS_URL, "v1").unwrap();
    store.insert(PHOTOS_URL, "v2").unwrap(); // Replaced v1
    store.insert(PEOPLE_URL, "p1").unwrap();
    store.get(PEOPLE_URL, MaxAge::AlwaysExpired, true).unwrap(); // Expired p1
    store.insert(PEOPLE_URL, "p2").unwrap();
    store.remove(PEOPLE_URL).unwrap(); // silent
    store.set(PHOTOS_URL, None).unwrap(); // Removed v2
    store.insert("https://api.example.com/a", "a").unwrap();
    store.shrink(i64::MAX).unwrap(); // no-op
    store.flush().unwrap(); // silent

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            (PHOTOS_URL.to_string(), "v1".to_string(), EvictionCause::Replaced),
            (PEOPLE_URL.to_string(), "p1".to_string(), EvictionCause::Expired),
            (PHOTOS_URL.to_string(), "v2".to_string(), EvictionCause::Removed),
        ]
    );
}

#[test]
fn test_hook_sees_committed_state() {
    let temp_dir = TempDir::new().unwrap();
    let reader_path = cache_file_path(temp_dir.path().join("responses"));
    let observed_rows: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = observed_rows.clone();

    // A separate connection inside the hook only sees committed data
    let store = CacheStore::open(temp_dir.path().join("responses"))
        .unwrap()
        .on_evicted(move |_, _| {
            let conn = rusqlite::Connection::open(&reader_path).unwrap();
            let rows: i64 = conn
                .query_row("SELECT COUNT(*) FROM ResponseCache", [], |row| row.get(0))
                .unwrap();
            sink.lock().unwrap().push(rows);
        });

    store.insert(PHOTOS_URL, "v1").unwrap();
    store.insert(PEOPLE_URL, "p1").unwrap();
    store.get(PHOTOS_URL, MaxAge::AlwaysExpired, true).unwrap();

    assert_eq!(*observed_rows.lock().unwrap(), vec![1]);
}

// == Size Bounding ==

#[test]
fn test_shrink_keeps_newest_responses() {
    let temp_dir = TempDir::new().unwrap();
    let store = CacheStore::open(temp_dir.path().join("responses")).unwrap();
    let body = "<photo id=\"1\"/>".repeat(200);

    for page in 0..100 {
        let url = format!("{}&page={}", PHOTOS_URL, page);
        store.insert(&url, body.as_str()).unwrap();
    }
    let before = store.file_size().unwrap();

    let removed = store.shrink(before as i64 / 4).unwrap();

    assert!(removed > 0);
    assert!(store.file_size().unwrap() < before);
    let newest = format!("{}&page=99", PHOTOS_URL);
    let oldest = format!("{}&page=0", PHOTOS_URL);
    assert!(store.get(&newest, MaxAge::Never, false).unwrap().is_some());
    assert!(store.get(&oldest, MaxAge::Never, false).unwrap().is_none());
}

#[test]
fn test_flush_empties_and_compacts() {
    let temp_dir = TempDir::new().unwrap();
    let store = CacheStore::open(temp_dir.path().join("responses")).unwrap();
    let body = "x".repeat(1024);

    for i in 0..100 {
        store.insert(&format!("{}&page={}", PHOTOS_URL, i), body.as_str()).unwrap();
    }
    let before = store.file_size().unwrap();

    assert_eq!(store.flush().unwrap(), 100);
    assert_eq!(store.len().unwrap(), 0);
    assert!(store.file_size().unwrap() < before);

    // Still usable after a flush
    store.insert(PHOTOS_URL, "<photos/>").unwrap();
    assert_eq!(store.len().unwrap(), 1);
}

// == Storage Failures ==

#[test]
fn test_storage_errors_surface_and_leave_rows_intact() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        cache_path: temp_dir.path().join("responses"),
        busy_timeout_ms: 0,
        ..Config::default()
    };
    let store = CacheStore::from_config(&config).unwrap();
    let body = "x".repeat(2048);
    for page in 0..20 {
        store.insert(&format!("{}&page={}", PHOTOS_URL, page), body.as_str()).unwrap();
    }
    let rows_before = store.len().unwrap();
    let size_before = store.file_size().unwrap();
    let first_page = format!("{}&page=0", PHOTOS_URL);

    // Another connection holding the exclusive lock makes every statement busy
    let locker = rusqlite::Connection::open(store.path()).unwrap();
    locker.execute_batch("BEGIN EXCLUSIVE").unwrap();

    assert!(matches!(store.insert(PEOPLE_URL, "p1"), Err(CacheError::Storage(_))));
    assert!(matches!(
        store.get(&first_page, MaxAge::Never, false),
        Err(CacheError::Storage(_))
    ));
    assert!(matches!(store.remove(&first_page), Err(CacheError::Storage(_))));
    assert!(matches!(store.flush(), Err(CacheError::Storage(_))));
    assert!(matches!(
        store.shrink(size_before as i64 / 2),
        Err(CacheError::Storage(_))
    ));

    locker.execute_batch("ROLLBACK").unwrap();

    assert_eq!(store.len().unwrap(), rows_before);
    assert_eq!(store.file_size().unwrap(), size_before);
    assert!(store.get(&first_page, MaxAge::Never, false).unwrap().is_some());
    assert!(store.get(PEOPLE_URL, MaxAge::Never, false).unwrap().is_none());
}
