//! Entity logical name to entity set (collection) name cache
//!
//! Filled once per client from `EntityDefinitions` when entity names are
//! enabled; concurrent first requests share a single metadata query.

use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::OnceCell;

use super::error::Result;

#[derive(Debug, Default)]
pub struct EntitySetCache {
    entity_sets: OnceCell<HashMap<String, String>>,
}

impl EntitySetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached map, if it has been loaded
    pub fn get(&self) -> Option<&HashMap<String, String>> {
        self.entity_sets.get()
    }

    /// Return the cached map, running `load` if this is the first use
    ///
    /// A failed load leaves the cache empty so the next call retries.
    pub async fn get_or_load<F, Fut>(&self, load: F) -> Result<&HashMap<String, String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<HashMap<String, String>>>,
    {
        self.entity_sets.get_or_try_init(load).await
    }
}

/// Build the map from an `EntityDefinitions?$select=EntitySetName,LogicalName` response
pub fn entity_sets_from_response(response: &Value) -> HashMap<String, String> {
    let map: HashMap<String, String> = response
        .get("value")
        .and_then(Value::as_array)
        .map(|definitions| {
            definitions
                .iter()
                .filter_map(|definition| {
                    let logical = definition.get("LogicalName")?.as_str()?;
                    let set = definition.get("EntitySetName")?.as_str()?;
                    Some((logical.to_string(), set.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    debug!("Cached {} entity set names", map.len());
    map
}
