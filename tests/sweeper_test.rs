//! Tests for the obsolete cache sweeper.

use std::path::Path;
use std::time::Duration;

use serde_json::json;

use mimir::worker::{DataProducer, FnProducer, ProduceContext};
use mimir::{Dispatcher, Mimir, MimirError, ModelCacheConfig};

fn producer() -> impl DataProducer + 'static {
    FnProducer::new(|_ctx: ProduceContext| async { Ok::<_, MimirError>(json!([])) })
}

fn touch(dir: &Path, name: &str) {
    std::fs::write(dir.join(name), b"{}").unwrap();
}

fn remaining(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn dispatcher(config: ModelCacheConfig, retention: usize) -> Dispatcher {
    let key = config.key.clone();
    Mimir::builder()
        .model(config)
        .producer(key, producer())
        .retention(retention)
        .build()
        .unwrap()
}

#[tokio::test]
async fn keeps_newest_files_per_retention() {
    let dir = tempfile::tempdir().unwrap();
    for t in 1..=5 {
        touch(dir.path(), &format!(".mimir.sales.{t}000.cache"));
    }

    let dispatcher = dispatcher(ModelCacheConfig::new("sales", dir.path()), 2);
    let report = dispatcher.sweep().await;

    assert!(report.is_clean());
    assert_eq!(report.removed.len(), 3);
    assert_eq!(
        remaining(dir.path()),
        vec![".mimir.sales.4000.cache", ".mimir.sales.5000.cache"]
    );
}

#[tokio::test]
async fn ignores_ttl_and_foreign_files() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), ".mimir.sales.1000.cache");
    touch(dir.path(), ".mimir.sales.2000.cache");
    touch(dir.path(), ".mimir.sales.tmp");
    touch(dir.path(), ".mimir.orders.1000.cache");
    touch(dir.path(), "notes.txt");

    // Every file is long expired; retention still keeps the newest.
    let config = ModelCacheConfig::new("sales", dir.path()).ttl(Duration::from_millis(1));
    let report = dispatcher(config, 1).sweep().await;

    assert_eq!(report.removed, vec![dir.path().join(".mimir.sales.1000.cache")]);
    assert_eq!(
        remaining(dir.path()),
        vec![
            ".mimir.orders.1000.cache",
            ".mimir.sales.2000.cache",
            ".mimir.sales.tmp",
            "notes.txt",
        ]
    );
}

#[tokio::test]
async fn per_key_retention_overrides_default() {
    let dir = tempfile::tempdir().unwrap();
    for t in 1..=4 {
        touch(dir.path(), &format!(".mimir.sales.{t}.cache"));
    }

    let config = ModelCacheConfig::new("sales", dir.path()).retention(3);
    let report = dispatcher(config, 1).sweep().await;

    assert_eq!(report.removed, vec![dir.path().join(".mimir.sales.1.cache")]);
}

#[tokio::test]
async fn sweeping_an_empty_cache_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let report = dispatcher(ModelCacheConfig::new("sales", dir.path()), 2)
        .sweep()
        .await;
    assert!(report.removed.is_empty());
    assert!(report.is_clean());
}

#[cfg(unix)]
#[tokio::test]
async fn deletion_failures_are_collected() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    for t in 1..=3 {
        touch(dir.path(), &format!(".mimir.sales.{t}.cache"));
    }
    let dispatcher = dispatcher(ModelCacheConfig::new("sales", dir.path()), 1);

    // Read-only directory: entries cannot be unlinked.
    std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o555)).unwrap();
    let report = dispatcher.sweep().await;
    std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o755)).unwrap();

    // Root ignores directory permissions; only assert when they applied.
    if report.removed.is_empty() {
        assert_eq!(report.failed.len(), 2);
        assert!(!report.is_clean());
    }
}

#[tokio::test]
async fn periodic_sweep_runs_after_interval() {
    let dir = tempfile::tempdir().unwrap();
    for t in 1..=3 {
        touch(dir.path(), &format!(".mimir.sales.{t}.cache"));
    }

    let dispatcher = Mimir::builder()
        .model(ModelCacheConfig::new("sales", dir.path()))
        .producer("sales", producer())
        .retention(1)
        .sweep_interval(Duration::from_millis(200))
        .build()
        .unwrap();
    dispatcher.start().await;

    // Nothing is swept before the first period elapses.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(remaining(dir.path()).len(), 3);

    for _ in 0..200 {
        if remaining(dir.path()).len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(remaining(dir.path()), vec![".mimir.sales.3.cache"]);
    dispatcher.shutdown();
}
