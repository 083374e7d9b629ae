use super::{Folder, GisClient, GisError, ItemDefinition, ItemDescriptor};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde_json::Value;
use std::sync::Arc;

/// In-memory portal serving canned folders, items and definitions
#[derive(Clone, Default)]
pub struct MemoryPortal {
    folders: Arc<DashMap<String, Vec<Folder>>>,
    items: Arc<DashMap<(String, String), Vec<ItemDescriptor>>>,
    definitions: Arc<DashMap<String, ItemDefinition>>,
    denied_items: Arc<DashSet<String>>,
    unavailable_accounts: Arc<DashSet<String>>,
    fetches: Arc<DashMap<String, usize>>,
}

impl MemoryPortal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure `account` owns a folder titled `title`, returning it
    pub fn add_folder(&self, account: &str, title: &str) -> Folder {
        let mut folders = self.folders.entry(account.to_string()).or_default();
        if let Some(existing) = folders.iter().find(|f| f.title == title) {
            return existing.clone();
        }
        let folder = Folder::new(format!("{}-folder-{}", account, folders.len() + 1), title);
        folders.push(folder.clone());
        folder
    }

    /// Add an item with a fetchable definition to a folder
    pub fn add_item(&self, account: &str, folder_title: &str, item: ItemDescriptor, data: Value) {
        self.definitions.insert(
            item.id.clone(),
            ItemDefinition {
                title: item.title.clone(),
                data,
            },
        );
        self.list_item(account, folder_title, item);
    }

    /// Add an item that shows up in listings but has no definition
    pub fn list_item(&self, account: &str, folder_title: &str, item: ItemDescriptor) {
        let folder = self.add_folder(account, folder_title);
        self.items
            .entry((account.to_string(), folder.id))
            .or_default()
            .push(item);
    }

    /// Make every definition fetch for `item_id` fail with an access error
    pub fn deny_item(&self, item_id: &str) {
        self.denied_items.insert(item_id.to_string());
    }

    /// Make folder listings for `account` fail
    pub fn make_unavailable(&self, account: &str) {
        self.unavailable_accounts.insert(account.to_string());
    }

    /// Number of definition fetches made for `item_id`
    pub fn fetch_count(&self, item_id: &str) -> usize {
        self.fetches.get(item_id).map(|c| *c).unwrap_or(0)
    }

    /// Total number of definition fetches
    pub fn total_fetches(&self) -> usize {
        self.fetches.iter().map(|c| *c.value()).sum()
    }
}

#[async_trait]
impl GisClient for MemoryPortal {
    async fn list_folders(&self, account: &str) -> Result<Vec<Folder>, GisError> {
        if self.unavailable_accounts.contains(account) {
            return Err(GisError::Forbidden(format!("content of user {} is not accessible", account)));
        }
        Ok(self
            .folders
            .get(account)
            .map(|f| f.value().clone())
            .unwrap_or_default())
    }

    async fn list_items(&self, account: &str, folder: &Folder) -> Result<Vec<ItemDescriptor>, GisError> {
        Ok(self
            .items
            .get(&(account.to_string(), folder.id.clone()))
            .map(|i| i.value().clone())
            .unwrap_or_default())
    }

    async fn get_item_definition(&self, item_id: &str) -> Result<ItemDefinition, GisError> {
        *self.fetches.entry(item_id.to_string()).or_insert(0) += 1;

        if self.denied_items.contains(item_id) {
            return Err(GisError::Forbidden(format!("item {} is not shared with this account", item_id)));
        }
        self.definitions
            .get(item_id)
            .map(|d| d.value().clone())
            .ok_or_else(|| GisError::NotFound(format!("item {}", item_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_portal_listing() {
        let portal = MemoryPortal::new();
        portal.add_item("alice", "Survey", ItemDescriptor::new("a1", "Web Map", "Map"), json!({}));
        portal.list_item("alice", "Survey", ItemDescriptor::new("a2", "Feature Service", "Layer"));
        portal.add_folder("alice", "Empty");

        let folders = portal.list_folders("alice").await.unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].title, "Survey");

        let items = portal.list_items("alice", &folders[0]).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(portal.list_items("alice", &folders[1]).await.unwrap().is_empty());
        assert!(portal.list_folders("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_portal_definitions() {
        let portal = MemoryPortal::new();
        portal.add_item("alice", "Survey", ItemDescriptor::new("a1", "Web Map", "Map"), json!({"v": 1}));
        portal.list_item("alice", "Survey", ItemDescriptor::new("gone", "Web Map", "Deleted"));
        portal.deny_item("a1");

        assert!(matches!(
            portal.get_item_definition("a1").await,
            Err(GisError::Forbidden(_))
        ));
        assert!(matches!(
            portal.get_item_definition("gone").await,
            Err(GisError::NotFound(_))
        ));
        assert_eq!(portal.fetch_count("a1"), 1);
        assert_eq!(portal.total_fetches(), 2);
    }
}
