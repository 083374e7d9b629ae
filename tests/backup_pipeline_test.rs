// Integration tests for the backup pipeline
// Runs the orchestrator end to end against the in-memory portal and object store

use ago_backup::backup::{BackupOrchestrator, ItemState, RunSummary};
use ago_backup::config::BackupConfig;
use ago_backup::gis::{ItemDescriptor, MemoryPortal};
use ago_backup::storage::MemoryObjectStore;
use chrono::{DateTime, Duration, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;

const ACCOUNT: &str = "gis_admin";
const FOLDER: &str = "Badger Sightings Survey";
const PREFIX: &str = "ago_backups/badger sightings survey/";

fn today(now: DateTime<Utc>) -> String {
    now.format("%Y_%m_%d").to_string()
}

async fn run(portal: &MemoryPortal, store: &MemoryObjectStore, now: DateTime<Utc>) -> RunSummary {
    let config = BackupConfig::for_accounts([ACCOUNT], [FOLDER]);
    BackupOrchestrator::new(&config, portal, store).run(now).await
}

#[tokio::test]
async fn test_end_to_end_badger_survey() {
    let portal = MemoryPortal::new();
    portal.add_item(
        ACCOUNT,
        FOLDER,
        ItemDescriptor::new("abc123", "Web Map", "Sightings Map"),
        json!({
            "operationalLayers": [{"id": "sightings", "url": "https://services.example.com/FeatureServer/0"}],
            "baseMap": {"title": "Topographic"},
            "version": "2.28"
        }),
    );
    portal.add_item(
        ACCOUNT,
        FOLDER,
        ItemDescriptor::new("layer01", "Feature Layer", "Sightings"),
        json!({"layers": []}),
    );
    let store = MemoryObjectStore::new();
    let now = Utc::now();

    let summary = run(&portal, &store, now).await;

    let expected_key = format!("{}{}_sightings map_abc123.json", PREFIX, today(now));
    assert_eq!(store.keys(), vec![expected_key.clone()]);
    assert_eq!(summary.items_written, 1);
    assert_eq!(summary.objects_pruned, 0);
    assert_eq!(summary.failures(), 0);
    assert!(summary.is_clean());

    let stored = store.get(&expected_key).unwrap();
    assert_eq!(stored.content_type, "application/json");
    let body: serde_json::Value = serde_json::from_slice(&stored.body).unwrap();
    assert_eq!(body["baseMap"]["title"], "Topographic");
}

#[tokio::test]
async fn test_whitelist_excludes_feature_layers() {
    let portal = MemoryPortal::new();
    portal.add_item(ACCOUNT, FOLDER, ItemDescriptor::new("map1", "Web Map", "Map"), json!({}));
    portal.add_item(
        ACCOUNT,
        FOLDER,
        ItemDescriptor::new("exp1", "Web Experience", "Dashboard"),
        json!({"pages": {}}),
    );
    portal.add_item(ACCOUNT, FOLDER, ItemDescriptor::new("fl1", "Feature Layer", "Raw"), json!({}));
    let store = MemoryObjectStore::new();

    let summary = run(&portal, &store, Utc::now()).await;

    assert_eq!(portal.fetch_count("fl1"), 0);
    assert!(store.keys().iter().all(|k| !k.contains("fl1")));
    assert_eq!(summary.items_written, 2);
    assert_eq!(summary.items_skipped, 1);
}

#[tokio::test]
async fn test_fetch_failure_is_isolated() {
    let portal = MemoryPortal::new();
    portal.list_item(ACCOUNT, FOLDER, ItemDescriptor::new("item_a", "Web Map", "A"));
    portal.add_item(ACCOUNT, FOLDER, ItemDescriptor::new("item_b", "Web Map", "B"), json!({"b": true}));
    portal.add_item(ACCOUNT, FOLDER, ItemDescriptor::new("item_c", "Web Map", "C"), json!({"c": true}));
    let store = MemoryObjectStore::new();

    let summary = run(&portal, &store, Utc::now()).await;

    assert_eq!(summary.fetch_failures, 1);
    assert_eq!(summary.items_written, 2);
    assert!(store.keys().iter().any(|k| k.ends_with("_b_item_b.json")));
    assert!(store.keys().iter().any(|k| k.ends_with("_c_item_c.json")));

    let failed: Vec<_> = summary.failed_items().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].item_id, "item_a");
    assert_eq!(failed[0].state, ItemState::FetchFailed);
    assert!(failed[0].error.as_deref().unwrap().contains("item_a"));
    assert!(!summary.is_clean());
}

#[tokio::test]
async fn test_inaccessible_item_is_isolated() {
    let portal = MemoryPortal::new();
    portal.add_item(ACCOUNT, FOLDER, ItemDescriptor::new("private", "Web Map", "P"), json!({}));
    portal.add_item(ACCOUNT, FOLDER, ItemDescriptor::new("shared", "Web Map", "S"), json!({}));
    portal.deny_item("private");
    let store = MemoryObjectStore::new();

    let summary = run(&portal, &store, Utc::now()).await;

    assert_eq!(summary.fetch_failures, 1);
    assert_eq!(summary.items_written, 1);
}

#[tokio::test]
async fn test_write_failure_is_isolated() {
    let portal = MemoryPortal::new();
    portal.add_item(ACCOUNT, FOLDER, ItemDescriptor::new("x1", "Web Map", "X"), json!({}));
    portal.add_item(ACCOUNT, FOLDER, ItemDescriptor::new("y2", "Web Map", "Y"), json!({}));
    let store = MemoryObjectStore::new();
    store.fail_puts_to("x1");

    let summary = run(&portal, &store, Utc::now()).await;

    assert_eq!(summary.write_failures, 1);
    assert_eq!(summary.items_written, 1);
    let failed = summary.failed_items().next().unwrap();
    assert_eq!(failed.state, ItemState::WriteFailed);
    assert!(failed.key.as_deref().unwrap().ends_with("_x_x1.json"));
}

#[tokio::test]
async fn test_same_title_items_get_their_own_keys() {
    let portal = MemoryPortal::new();
    portal.add_item(ACCOUNT, FOLDER, ItemDescriptor::new("map_a1", "Web Map", "Sightings Map"), json!({"v": "a"}));
    portal.add_item(ACCOUNT, FOLDER, ItemDescriptor::new("map_b2", "Web Map", "Sightings Map"), json!({"v": "b"}));
    let store = MemoryObjectStore::new();
    let now = Utc::now();

    let summary = run(&portal, &store, now).await;

    let key_a = format!("{}{}_sightings map_map_a1.json", PREFIX, today(now));
    let key_b = format!("{}{}_sightings map_map_b2.json", PREFIX, today(now));
    assert_eq!(summary.items_written, 2);
    assert_eq!(store.keys(), vec![key_a.clone(), key_b.clone()]);

    let body_a: serde_json::Value = serde_json::from_slice(&store.get(&key_a).unwrap().body).unwrap();
    let body_b: serde_json::Value = serde_json::from_slice(&store.get(&key_b).unwrap().body).unwrap();
    assert_eq!(body_a["v"], "a");
    assert_eq!(body_b["v"], "b");
}

#[tokio::test]
async fn test_same_day_rerun_overwrites() {
    let portal = MemoryPortal::new();
    portal.add_item(ACCOUNT, FOLDER, ItemDescriptor::new("abc123", "Web Map", "Sightings Map"), json!({"v": 1}));
    let store = MemoryObjectStore::new();
    let now = Utc::now();

    run(&portal, &store, now).await;
    run(&portal, &store, now + Duration::minutes(5)).await;

    assert_eq!(store.put_count(), 2);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_next_day_run_adds_snapshot() {
    let portal = MemoryPortal::new();
    portal.add_item(ACCOUNT, FOLDER, ItemDescriptor::new("abc123", "Web Map", "Sightings Map"), json!({"v": 1}));
    let store = MemoryObjectStore::new();
    let now = Utc::now();

    store.set_clock(now);
    run(&portal, &store, now).await;
    store.set_clock(now + Duration::days(1));
    run(&portal, &store, now + Duration::days(1)).await;

    let keys = store.keys();
    assert_eq!(keys.len(), 2);
    assert!(keys[0] < keys[1]);
}

#[tokio::test]
async fn test_retention_runs_per_folder() {
    let portal = MemoryPortal::new();
    portal.add_item(ACCOUNT, FOLDER, ItemDescriptor::new("abc123", "Web Map", "Sightings Map"), json!({}));
    portal.add_folder(ACCOUNT, "Unrelated");
    let store = MemoryObjectStore::new();
    let now = Utc::now();

    store.insert_object(&format!("{PREFIX}old_8d.json"), b"{}".to_vec(), now - Duration::days(8));
    store.insert_object(
        &format!("{PREFIX}old_7d1s.json"),
        b"{}".to_vec(),
        now - Duration::days(7) - Duration::seconds(1),
    );
    store.insert_object(&format!("{PREFIX}recent_6d.json"), b"{}".to_vec(), now - Duration::days(6));
    store.insert_object(&format!("{PREFIX}recent_1d.json"), b"{}".to_vec(), now - Duration::days(1));
    store.insert_object("ago_backups/unrelated/ancient.json", b"{}".to_vec(), now - Duration::days(90));
    store.fail_deletes_of("old_8d");

    let summary = run(&portal, &store, now).await;

    assert_eq!(summary.objects_pruned, 1);
    assert_eq!(summary.delete_failures, 1);
    assert!(!store.contains(&format!("{PREFIX}old_7d1s.json")));
    assert!(store.contains(&format!("{PREFIX}old_8d.json")));
    assert!(store.contains(&format!("{PREFIX}recent_6d.json")));
    assert!(store.contains(&format!("{PREFIX}recent_1d.json")));
    assert!(store.contains("ago_backups/unrelated/ancient.json"));
    assert_eq!(summary.items_written, 1);
}

#[tokio::test]
async fn test_summary_serializes_for_reporting() {
    let portal = MemoryPortal::new();
    portal.add_item(ACCOUNT, FOLDER, ItemDescriptor::new("abc123", "Web Map", "Sightings Map"), json!({}));
    let store = MemoryObjectStore::new();

    let summary = run(&portal, &store, Utc::now()).await;
    let report = serde_json::to_value(&summary).unwrap();

    assert_eq!(report["items_written"], 1);
    assert_eq!(report["items"][0]["state"], "written");
    assert!(report["finished_at"].is_string());
}
