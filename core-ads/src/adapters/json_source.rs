//! # JSON Configuration Source
//!
//! Serves ad configuration from a remote-config style JSON document:
//!
//! ```json
//! {
//!   "ads": [
//!     { "id": "home-banner", "surface_type": "BANNER", "placement": "HOME_SCREEN",
//!       "creative_id": "ca-app-pub-xxx/yyy", "priority": 1 }
//!   ],
//!   "manager": { "enabled": true, "max_ad_frequency": 5 },
//!   "flags": { "clips_per_ad": 4 }
//! }
//! ```
//!
//! Every section is optional. Missing `ads` yields an empty list, missing
//! `manager`/`flags` yield `None` so the store installs its fallbacks.
//! Inactive entries are filtered out. An `ads` entry that does not parse
//! (unknown surface or placement, wrong field type) is dropped with a
//! warning; the rest of the document still loads.
//!
//! A file-backed source reads the file once per refresh, so
//! `refresh_configurations` picks up edits.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::{AdConfigSource, AdConfiguration, FeatureFlags, ManagerPolicy, SourceBundle};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use tracing::{debug, instrument, warn};

/// Top-level remote-config document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfigDocument {
    #[serde(deserialize_with = "lenient_ads")]
    pub ads: Vec<AdConfiguration>,
    pub manager: Option<ManagerPolicy>,
    pub flags: Option<FeatureFlags>,
}

impl RemoteConfigDocument {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn lenient_ads<'de, D>(deserializer: D) -> std::result::Result<Vec<AdConfiguration>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            match serde_json::from_value::<AdConfiguration>(entry) {
                Ok(config) => Some(config),
                Err(err) => {
                    warn!(index, error = %err, "Dropping unreadable ad entry");
                    None
                }
            }
        })
        .collect())
}

#[derive(Debug, Clone)]
enum Backing {
    Inline(RemoteConfigDocument),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct JsonConfigSource {
    backing: Backing,
}

impl JsonConfigSource {
    /// Parse a document held in memory.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::from_document(RemoteConfigDocument::parse(json)?))
    }

    pub fn from_document(document: RemoteConfigDocument) -> Self {
        Self {
            backing: Backing::Inline(document),
        }
    }

    /// Serve the document stored at `path`. The file is read lazily.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::File(path.into()),
        }
    }

    #[instrument(skip(self))]
    async fn document(&self) -> Result<RemoteConfigDocument> {
        match &self.backing {
            Backing::Inline(document) => Ok(document.clone()),
            Backing::File(path) => {
                let contents = tokio::fs::read_to_string(path).await?;
                debug!(path = %path.display(), bytes = contents.len(), "Read ad config document");
                RemoteConfigDocument::parse(&contents)
            }
        }
    }
}

#[async_trait]
impl AdConfigSource for JsonConfigSource {
    async fn get_active_ads(&self) -> Result<Vec<AdConfiguration>> {
        Ok(self
            .document()
            .await?
            .ads
            .into_iter()
            .filter(|config| config.active)
            .collect())
    }

    async fn get_ad_manager_config(&self) -> Result<Option<ManagerPolicy>> {
        Ok(self.document().await?.manager)
    }

    async fn get_feature_flags(&self) -> Result<Option<FeatureFlags>> {
        Ok(self.document().await?.flags)
    }

    async fn fetch_all(&self) -> SourceBundle {
        match self.document().await {
            Ok(document) => SourceBundle {
                ads: Ok(document
                    .ads
                    .into_iter()
                    .filter(|config| config.active)
                    .collect()),
                manager: Ok(document.manager),
                flags: Ok(document.flags),
            },
            Err(err) => {
                let message = err.to_string();
                SourceBundle {
                    ads: Err(err),
                    manager: Err(BridgeError::NotAvailable(message.clone())),
                    flags: Err(BridgeError::NotAvailable(message)),
                }
            }
        }
    }
}
