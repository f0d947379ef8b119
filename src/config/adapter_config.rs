//! Lookup of per-adapter settings held in a configuration store.

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::settings::AdapterSettings;
use crate::utils::error::BridgeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterQuery {
    ByName(String),
    ById(String),
}

impl AdapterQuery {
    /// Prefers the adapter id when one is configured.
    pub fn from_settings(settings: &AdapterSettings) -> Self {
        match &settings.adapter_id {
            Some(id) if !id.is_empty() => AdapterQuery::ById(id.clone()),
            _ => AdapterQuery::ByName(settings.adapter_name.clone()),
        }
    }

    fn matches(&self, row: &AdapterConfigRow) -> bool {
        match self {
            AdapterQuery::ByName(name) => row.adapter_name == *name,
            AdapterQuery::ById(id) => row.adapter_id.as_deref() == Some(id.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AdapterConfigRow {
    pub adapter_name: String,
    #[serde(default)]
    pub adapter_id: Option<String>,
    #[serde(default)]
    pub topic_root: Option<String>,
}

#[async_trait]
pub trait AdapterConfigSource: Send + Sync {
    async fn fetch(&self, query: &AdapterQuery) -> Result<Option<AdapterConfigRow>, BridgeError>;
}

/// A TOML store holding one array of rows per collection:
///
/// ```toml
/// [[adapter_config]]
/// adapter_name = "modbusClientAdapter"
/// topic_root = "plant/modbus"
/// ```
pub struct FileAdapterConfigSource {
    path: PathBuf,
    collection: String,
}

impl FileAdapterConfigSource {
    pub fn new(path: impl AsRef<Path>, collection: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl AdapterConfigSource for FileAdapterConfigSource {
    async fn fetch(&self, query: &AdapterQuery) -> Result<Option<AdapterConfigRow>, BridgeError> {
        debug!("Executing {:?} against collection {}", query, self.collection);
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            BridgeError::ConfigError(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let mut collections: HashMap<String, Vec<AdapterConfigRow>> = toml::from_str(&content)?;

        let rows = collections.remove(&self.collection).ok_or_else(|| {
            BridgeError::ConfigError(format!("collection {} not found", self.collection))
        })?;
        Ok(rows.into_iter().find(|row| query.matches(row)))
    }
}

/// Topic root from the store, or `default` when the lookup fails or yields nothing.
pub async fn resolve_topic_root(
    source: Option<&dyn AdapterConfigSource>,
    query: &AdapterQuery,
    default: &str,
) -> String {
    let Some(source) = source else {
        debug!("No adapter configuration store configured, using {}", default);
        return default.to_string();
    };

    info!("🔧 Retrieving adapter configuration...");
    match source.fetch(query).await {
        Ok(Some(AdapterConfigRow {
            topic_root: Some(root),
            ..
        })) if !root.is_empty() => {
            info!("✅ Adapter config retrieved, topic root {}", root);
            root
        }
        Ok(Some(_)) => {
            info!("Topic root not set in adapter config, using default {}", default);
            default.to_string()
        }
        Ok(None) => {
            info!("No adapter config rows returned, using defaults");
            default.to_string()
        }
        Err(e) => {
            warn!("⚠️  Adapter configuration could not be retrieved ({}), using defaults", e);
            default.to_string()
        }
    }
}
