use super::namer::snapshot_key;
use super::types::{BackupError, ItemSnapshot};
use crate::gis::{GisClient, GisError};
use chrono::NaiveDate;
use tracing::debug;

/// Turns an item id into a named snapshot of its definition
pub struct ItemExporter<'a, G: GisClient + ?Sized> {
    gis: &'a G,
}

impl<'a, G: GisClient + ?Sized> ItemExporter<'a, G> {
    pub fn new(gis: &'a G) -> Self {
        Self { gis }
    }

    /// Fetch the item's definition and name the snapshot
    ///
    /// Missing, inaccessible or empty definitions fail with [`BackupError::SourceFetch`].
    /// There is no retry here; the caller moves on to the next item.
    pub async fn export(
        &self,
        folder: &str,
        item_id: &str,
        captured_on: NaiveDate,
    ) -> Result<ItemSnapshot, BackupError> {
        let definition = self
            .gis
            .get_item_definition(item_id)
            .await
            .map_err(|source| BackupError::SourceFetch {
                item_id: item_id.to_string(),
                source,
            })?;

        if definition.data.is_null() {
            return Err(BackupError::SourceFetch {
                item_id: item_id.to_string(),
                source: GisError::Malformed(format!("item {} has no definition", item_id)),
            });
        }

        let key = snapshot_key(captured_on, &definition.title, item_id);
        debug!(item_id = %item_id, key = %key, "Exported item definition");

        Ok(ItemSnapshot {
            item_id: item_id.to_string(),
            title: definition.title,
            folder: folder.to_string(),
            captured_on,
            payload: definition.data,
            key,
        })
    }
}
