use std::collections::HashMap;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Errors encountered while resolving and authorizing catalog assets
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    #[error("Collection `{collection}` has no `{asset}` asset")]
    MissingAsset { collection: String, asset: String },
    #[error("Unsupported asset href: {0}")]
    UnsupportedHref(String),
    #[error("Missing storage option `{0}` on asset")]
    MissingStorageOption(&'static str),
    #[error("Signing failed for {account}/{container}: {reason}")]
    Signing {
        account: String,
        container: String,
        reason: String,
    },
    #[error("Access token for {0} expired at {1}")]
    TokenExpired(String, String),
    #[error("Blob listing failed: {0}")]
    Listing(String),
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// A STAC asset. Extension fields (e.g. `table:storage_options`) are kept verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub href: String,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    #[serde(flatten)]
    pub extra_fields: serde_json::Map<String, serde_json::Value>,
}

impl Asset {
    /// String-valued entry of `table:storage_options`, if present.
    pub fn storage_option(&self, key: &str) -> Option<&str> {
        self.extra_fields
            .get("table:storage_options")
            .and_then(|opts| opts.get(key))
            .and_then(|v| v.as_str())
    }
}

/// The subset of a STAC collection needed to locate its item index
#[derive(Debug, Clone, Deserialize)]
pub struct Collection {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub assets: HashMap<String, Asset>,
}

impl Collection {
    pub fn asset(&self, key: &str) -> Result<&Asset, CatalogError> {
        self.assets.get(key).ok_or_else(|| CatalogError::MissingAsset {
            collection: self.id.clone(),
            asset: key.to_string(),
        })
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client, CatalogError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(concat!("acqmap/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Joins `segment` onto a root URL, treating the root as a directory.
pub(crate) fn join_url(root: &str, segment: &str) -> Result<Url, CatalogError> {
    let invalid = |reason: String| CatalogError::InvalidUrl {
        url: root.to_string(),
        reason,
    };
    let mut base = Url::parse(root).map_err(|e| invalid(e.to_string()))?;
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(segment).map_err(|e| invalid(e.to_string()))
}

/// Client for a STAC API root
pub struct CatalogClient {
    http: Client,
    root: String,
}

impl CatalogClient {
    pub fn open(root: &str, timeout: Duration) -> Result<Self, CatalogError> {
        join_url(root, "collections")?;
        Ok(Self {
            http: http_client(timeout)?,
            root: root.to_string(),
        })
    }

    /// Fetch a collection by id. A 404 maps to `CollectionNotFound`.
    pub fn get_collection(&self, collection_id: &str) -> Result<Collection, CatalogError> {
        let url = join_url(&self.root, &format!("collections/{}", collection_id))?;
        debug!("GET {}", url);
        let response = self.http.get(url).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(CatalogError::CollectionNotFound(collection_id.to_string()));
        }
        let collection: Collection = response.error_for_status()?.json()?;
        Ok(collection)
    }
}
