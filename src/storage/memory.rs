use super::{ObjectStore, ObjectSummary, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A stored object with the attributes a bucket would keep
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
    pub last_modified: DateTime<Utc>,
}

/// In-memory object store
///
/// `last_modified` comes from a settable clock so retention can be exercised without
/// waiting. Operations on keys containing a registered fragment fail, which lets tests
/// simulate partial outages.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<DashMap<String, StoredObject>>,
    clock: Arc<Mutex<Option<DateTime<Utc>>>>,
    failing_puts: Arc<DashSet<String>>,
    failing_deletes: Arc<DashSet<String>>,
    failing_lists: Arc<DashSet<String>>,
    puts: Arc<AtomicUsize>,
    deletes: Arc<AtomicUsize>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp subsequent writes with `now` instead of the wall clock
    pub fn set_clock(&self, now: DateTime<Utc>) {
        if let Ok(mut clock) = self.clock.lock() {
            *clock = Some(now);
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock
            .lock()
            .ok()
            .and_then(|clock| *clock)
            .unwrap_or_else(Utc::now)
    }

    /// Seed an object with an explicit modification time
    pub fn insert_object(&self, key: &str, body: Vec<u8>, last_modified: DateTime<Utc>) {
        self.objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: super::JSON_CONTENT_TYPE.to_string(),
                metadata: BTreeMap::new(),
                last_modified,
            },
        );
    }

    /// Fail puts to keys containing `fragment`
    pub fn fail_puts_to(&self, fragment: &str) {
        self.failing_puts.insert(fragment.to_string());
    }

    /// Fail deletes of keys containing `fragment`
    pub fn fail_deletes_of(&self, fragment: &str) {
        self.failing_deletes.insert(fragment.to_string());
    }

    /// Fail listings of prefixes containing `fragment`
    pub fn fail_lists_of(&self, fragment: &str) {
        self.failing_lists.insert(fragment.to_string());
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.get(key).map(|o| o.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.iter().map(|o| o.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Successful puts so far
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Successful deletes so far
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

fn matches_any(fragments: &DashSet<String>, key: &str) -> bool {
    fragments.iter().any(|f| key.contains(f.as_str()))
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), StorageError> {
        if matches_any(&self.failing_puts, key) {
            return Err(StorageError::Permanent(format!("access denied writing {}", key)));
        }

        self.objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
                metadata: metadata.clone(),
                last_modified: self.now(),
            },
        );
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StorageError> {
        if matches_any(&self.failing_lists, prefix) {
            return Err(StorageError::Transient(format!("listing {} timed out", prefix)));
        }

        let mut objects: Vec<ObjectSummary> = self
            .objects
            .iter()
            .filter(|o| o.key().starts_with(prefix))
            .map(|o| ObjectSummary {
                key: o.key().clone(),
                last_modified: o.value().last_modified,
                size: o.value().body.len() as u64,
            })
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if matches_any(&self.failing_deletes, key) {
            return Err(StorageError::Transient(format!("delete of {} interrupted", key)));
        }

        self.objects.remove(key);
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
