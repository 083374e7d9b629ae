//! GIS portal capability
//!
//! The backup core only needs three things from the portal: the folders of an account, the
//! items in one folder, and the JSON definition of one item. [`GisClient`] captures exactly
//! that; [`PortalClient`] talks to the ArcGIS sharing REST API and [`MemoryPortal`] serves
//! canned content for tests.

mod memory;
pub mod portal;

pub use memory::MemoryPortal;
pub use portal::PortalClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors reported by the portal capability
#[derive(Error, Debug)]
pub enum GisError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Invalid portal URL: {0}")]
    InvalidUrl(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Portal error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A folder in an account's content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Platform folder id
    pub id: String,
    pub title: String,
}

impl Folder {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Metadata describing a content item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    /// Opaque, stable item id
    pub id: String,
    /// Type tag such as "Web Map" or "Feature Service"
    #[serde(rename = "type")]
    pub item_type: String,
    pub title: String,
}

impl ItemDescriptor {
    pub fn new(id: impl Into<String>, item_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            item_type: item_type.into(),
            title: title.into(),
        }
    }
}

/// An item's title together with its serialized definition
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDefinition {
    pub title: String,
    pub data: Value,
}

/// Read access to a GIS portal's content
#[async_trait]
pub trait GisClient: Send + Sync {
    /// List the folders owned by `account`
    async fn list_folders(&self, account: &str) -> Result<Vec<Folder>, GisError>;

    /// List every item in one of `account`'s folders
    async fn list_items(&self, account: &str, folder: &Folder) -> Result<Vec<ItemDescriptor>, GisError>;

    /// Fetch an item's title and JSON definition
    async fn get_item_definition(&self, item_id: &str) -> Result<ItemDefinition, GisError>;
}
