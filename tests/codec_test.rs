//! Tests for cache file naming and catalog freshness.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use mimir::cache::{CacheCatalog, FilenameCodec};
use mimir::clock::epoch_millis;
use mimir::{CacheFileDescriptor, ManualClock, MimirError, ModelCacheConfig};

#[test]
fn encode_now_round_trips_within_wall_clock_window() {
    let codec = FilenameCodec::default();
    for key in ["sales", "inventory", "eu-orders_2024"] {
        let before = epoch_millis();
        let name = codec.encode_now(key);
        let after = epoch_millis();

        let decoded = codec.decode(&name).unwrap();
        assert_eq!(decoded.key, key);
        assert!((before..=after).contains(&decoded.created_at_ms));
    }
}

#[test]
fn custom_prefix_only_decodes_its_own_files() {
    let reports = FilenameCodec::new(".reports").unwrap();
    let default = FilenameCodec::default();

    let name = reports.encode("sales", 5);
    assert!(reports.decode(&name).is_some());
    assert!(default.decode(&name).is_none());
}

#[test]
fn temp_names_never_decode() {
    let codec = FilenameCodec::default();
    assert!(codec.decode(&codec.temp_name("sales")).is_none());
}

#[test]
fn keys_with_delimiters_are_invalid() {
    for key in ["", "a.b", "a/b", "a\\b", "a b"] {
        assert!(
            matches!(FilenameCodec::validate_key(key), Err(MimirError::InvalidKey { .. })),
            "{key:?} should be rejected"
        );
    }
}

#[test]
fn zero_ttl_never_expires() {
    let ten_years_ms = 10 * 365 * 24 * 60 * 60 * 1_000;
    let descriptor = CacheFileDescriptor {
        key: "sales".into(),
        path: "/tmp/.mimir.sales.0.cache".into(),
        size_bytes: 2,
        created_at_ms: 0,
    };
    assert!(CacheCatalog::is_fresh(&descriptor, Duration::ZERO, ten_years_ms));
}

#[tokio::test]
async fn catalog_ranks_and_expires() {
    let dir = tempfile::tempdir().unwrap();
    for name in [
        ".mimir.sales.1000.cache",
        ".mimir.sales.3000.cache",
        ".mimir.sales.2000.cache",
        ".mimir.orders.9000.cache",
        ".mimir.sales.tmp",
        "README",
    ] {
        std::fs::write(dir.path().join(name), b"{}").unwrap();
    }
    std::fs::create_dir(dir.path().join(".mimir.sales.9999.cache")).unwrap();

    let clock = Arc::new(ManualClock::new(3_000));
    let catalog = CacheCatalog::new(FilenameCodec::default(), clock.clone());
    let config = ModelCacheConfig::new("sales", dir.path()).ttl(Duration::from_millis(60_000));

    let entry = catalog.entry(&config).await.unwrap();
    let created: Vec<u64> = entry.iter().map(|d| d.created_at_ms).collect();
    assert_eq!(created, vec![3_000, 2_000, 1_000]);
    assert!(entry.iter().all(|d| d.size_bytes == 2));

    // Untracked keys are dropped from a multi-key scan.
    let scan = catalog
        .scan(dir.path(), &HashSet::from(["sales"]))
        .await
        .unwrap();
    assert_eq!(scan.len(), 1);

    // Age 60000 is the boundary: fresh below, stale at and above.
    clock.set(62_999);
    assert_eq!(
        catalog.actual(&config).await.unwrap().map(|d| d.created_at_ms),
        Some(3_000)
    );
    clock.set(63_001);
    assert!(catalog.actual(&config).await.unwrap().is_none());
}
