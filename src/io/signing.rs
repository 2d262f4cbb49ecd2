//! Time-limited access to blob-hosted assets.
//!
//! Assets published by the catalog point at private blob containers
//! (`abfs://container/path` plus a `table:storage_options.account_name`).
//! Path-style `http(s)://host/account/container/path` hrefs, as served by
//! storage emulators, are accepted too.
//! Reading them requires a SAS token issued by the catalog's token service,
//! which is appended to every request as the query string.
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::stac::{Asset, CatalogError, http_client, join_url};

/// Tokens expiring sooner than this are reported before the load starts
const EXPIRY_WARNING: chrono::Duration = chrono::Duration::minutes(5);

/// Storage account, container and blob prefix an asset resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocation {
    /// Blob service root, without trailing slash
    pub endpoint: String,
    pub account: String,
    pub container: String,
    /// Blob name (or directory prefix) inside the container, without leading slash
    pub prefix: String,
}

impl BlobLocation {
    /// Resolve `abfs://`, `az://`, `https://<account>.blob.core.windows.net` and
    /// path-style `http(s)://host/<account>` hrefs.
    pub fn from_asset(asset: &Asset) -> Result<Self, CatalogError> {
        let url = Url::parse(&asset.href)
            .map_err(|_| CatalogError::UnsupportedHref(asset.href.clone()))?;
        let path = url.path().trim_start_matches('/').to_string();
        match url.scheme() {
            "abfs" | "abfss" | "az" => {
                // abfs://container@account.dfs.core.windows.net/path
                if !url.username().is_empty() {
                    let host = url
                        .host_str()
                        .ok_or_else(|| CatalogError::UnsupportedHref(asset.href.clone()))?;
                    let account = host.split('.').next().unwrap_or(host).to_string();
                    return Ok(Self {
                        endpoint: azure_endpoint(&account),
                        account,
                        container: url.username().to_string(),
                        prefix: path,
                    });
                }
                // abfs://container/path with the account in storage options
                let container = url
                    .host_str()
                    .ok_or_else(|| CatalogError::UnsupportedHref(asset.href.clone()))?
                    .to_string();
                let account = asset
                    .storage_option("account_name")
                    .ok_or(CatalogError::MissingStorageOption("account_name"))?
                    .to_string();
                Ok(Self {
                    endpoint: azure_endpoint(&account),
                    account,
                    container,
                    prefix: path,
                })
            }
            "https" | "http" => {
                let unsupported = || CatalogError::UnsupportedHref(asset.href.clone());
                let host = url.host_str().ok_or_else(unsupported)?;
                if let Some(account) = host.strip_suffix(".blob.core.windows.net") {
                    let (container, prefix) = path.split_once('/').ok_or_else(unsupported)?;
                    return Ok(Self {
                        endpoint: azure_endpoint(account),
                        account: account.to_string(),
                        container: container.to_string(),
                        prefix: prefix.to_string(),
                    });
                }
                let mut segments = path.splitn(3, '/');
                let (Some(account), Some(container), Some(prefix)) =
                    (segments.next(), segments.next(), segments.next())
                else {
                    return Err(unsupported());
                };
                let authority = match url.port() {
                    Some(port) => format!("{}:{}", host, port),
                    None => host.to_string(),
                };
                Ok(Self {
                    endpoint: format!("{}://{}/{}", url.scheme(), authority, account),
                    account: account.to_string(),
                    container: container.to_string(),
                    prefix: prefix.to_string(),
                })
            }
            _ => Err(CatalogError::UnsupportedHref(asset.href.clone())),
        }
    }
}

fn azure_endpoint(account: &str) -> String {
    format!("https://{}.blob.core.windows.net", account)
}

/// SAS token as returned by the token service
#[derive(Debug, Clone, Deserialize)]
pub struct SasToken {
    pub token: String,
    #[serde(rename = "msft:expiry")]
    pub expiry: DateTime<Utc>,
}

impl SasToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

/// An asset location together with a token granting read access to it
#[derive(Debug, Clone)]
pub struct SignedAsset {
    pub location: BlobLocation,
    pub token: SasToken,
}

impl SignedAsset {
    /// Signed URL of a blob in the asset's container.
    pub fn blob_url(&self, blob_name: &str) -> Result<Url, CatalogError> {
        let endpoint = &self.location.endpoint;
        let mut url = Url::parse(endpoint).map_err(|e| CatalogError::InvalidUrl {
            url: endpoint.clone(),
            reason: e.to_string(),
        })?;
        url.path_segments_mut()
            .map_err(|_| CatalogError::InvalidUrl {
                url: endpoint.clone(),
                reason: "cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .push(&self.location.container)
            .extend(blob_name.split('/'));
        url.set_query(Some(&self.token.token));
        Ok(url)
    }

    /// Signed container listing URL for `prefix`, continuing at `marker` if given.
    pub fn list_url(&self, prefix: &str, marker: Option<&str>) -> Result<Url, CatalogError> {
        let mut url = join_url(&self.location.endpoint, &self.location.container)?;
        url.set_query(Some(&self.token.token));
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("restype", "container");
            query.append_pair("comp", "list");
            query.append_pair("prefix", prefix);
            if let Some(marker) = marker {
                query.append_pair("marker", marker);
            }
        }
        Ok(url)
    }
}

/// Client for the SAS token service
pub struct Signer {
    http: Client,
    root: String,
}

impl Signer {
    pub fn new(root: &str, timeout: Duration) -> Result<Self, CatalogError> {
        join_url(root, "token")?;
        Ok(Self {
            http: http_client(timeout)?,
            root: root.to_string(),
        })
    }

    /// Request a token for the asset's container and attach it.
    pub fn sign(&self, asset: &Asset) -> Result<SignedAsset, CatalogError> {
        let location = BlobLocation::from_asset(asset)?;
        let url = join_url(
            &self.root,
            &format!("token/{}/{}", location.account, location.container),
        )?;
        debug!("Requesting SAS token for {}/{}", location.account, location.container);

        let signing_error = |reason: String| CatalogError::Signing {
            account: location.account.clone(),
            container: location.container.clone(),
            reason,
        };
        let response = self.http.get(url).send()?;
        if !response.status().is_success() {
            return Err(signing_error(format!("token service returned {}", response.status())));
        }
        let token: SasToken = response
            .json()
            .map_err(|e| signing_error(format!("malformed token response: {}", e)))?;

        check_expiry(&location, &token, Utc::now())?;
        info!(
            "Signed asset {}/{} (expires {})",
            location.account, location.container, token.expiry
        );
        Ok(SignedAsset { location, token })
    }
}

fn check_expiry(
    location: &BlobLocation,
    token: &SasToken,
    now: DateTime<Utc>,
) -> Result<(), CatalogError> {
    if token.is_expired_at(now) {
        return Err(CatalogError::TokenExpired(
            format!("{}/{}", location.account, location.container),
            token.expiry.to_rfc3339(),
        ));
    }
    if token.expiry - now < EXPIRY_WARNING {
        warn!(
            "SAS token for {}/{} expires soon ({}); long loads may fail",
            location.account, location.container, token.expiry
        );
    }
    Ok(())
}
