use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::ClusterSelector;

pub const DEFAULT_COLLECTION_ID: &str = "landsat-c2-l2";
pub const DEFAULT_CATALOG_URL: &str = "https://planetarycomputer.microsoft.com/api/stac/v1/";
pub const DEFAULT_SAS_URL: &str = "https://planetarycomputer.microsoft.com/api/sas/v1/";
pub const ITEM_INDEX_ASSET: &str = "geoparquet-items";

pub const PATH_COLUMN: &str = "landsat:wrs_path";
pub const ROW_COLUMN: &str = "landsat:wrs_row";
pub const GEOMETRY_COLUMN: &str = "geometry";
pub const COUNT_COLUMN: &str = "count";

pub const ENV_CLUSTER: &str = "ACQMAP_CLUSTER";
pub const ENV_GATEWAY_URL: &str = "ACQMAP_GATEWAY_URL";
pub const ENV_CATALOG_URL: &str = "ACQMAP_CATALOG_URL";
pub const ENV_SAS_URL: &str = "ACQMAP_SAS_URL";
pub const ENV_WORKERS: &str = "ACQMAP_WORKERS";

/// Run configuration, resolved once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// STAC API root
    pub catalog_url: String,
    /// SAS token service root
    pub sas_url: String,
    /// Gateway used to look up named clusters
    pub gateway_url: Option<String>,
    /// Collection asset holding the item index
    pub asset_key: String,
    /// Number of partitions the item index is split into
    pub npartitions: usize,
    pub output_png: PathBuf,
    pub output_parquet: PathBuf,
    pub dpi: u32,
    /// Local pool size; None lets rayon decide
    pub workers: Option<usize>,
    pub cluster: ClusterSelector,
    #[serde(with = "duration_secs")]
    pub http_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            sas_url: DEFAULT_SAS_URL.to_string(),
            gateway_url: None,
            asset_key: ITEM_INDEX_ASSET.to_string(),
            npartitions: 40,
            output_png: PathBuf::from("acq-by-wrs-tile.png"),
            output_parquet: PathBuf::from("acq-by-wrs-tile.parquet"),
            dpi: 200,
            workers: None,
            cluster: ClusterSelector::Ephemeral,
            http_timeout: Duration::from_secs(300),
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup` (keyed by the `ENV_*` names).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.cluster = ClusterSelector::from_name(lookup(ENV_CLUSTER).as_deref());
        config.gateway_url = lookup(ENV_GATEWAY_URL).filter(|v| !v.trim().is_empty());
        if let Some(url) = lookup(ENV_CATALOG_URL).filter(|v| !v.trim().is_empty()) {
            config.catalog_url = url;
        }
        if let Some(url) = lookup(ENV_SAS_URL).filter(|v| !v.trim().is_empty()) {
            config.sas_url = url;
        }
        if let Some(value) = lookup(ENV_WORKERS) {
            let workers = value.trim().parse::<usize>().map_err(|_| Error::InvalidArgument {
                arg: ENV_WORKERS,
                value: value.clone(),
            })?;
            if workers == 0 {
                return Err(Error::InvalidArgument {
                    arg: ENV_WORKERS,
                    value,
                });
            }
            config.workers = Some(workers);
        }
        Ok(config)
    }

    /// Map title for a collection. Landsat collections keep the historical title.
    pub fn title_for(collection_id: &str, collection_title: Option<&str>) -> String {
        if collection_id.starts_with("landsat") {
            "Landsat acquisitions per WRS tile".to_string()
        } else {
            format!(
                "{} acquisitions per WRS tile",
                collection_title.unwrap_or(collection_id)
            )
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
