//! Blob container access for signed assets: paginated listing of the part
//! files under an asset prefix, and ranged reads so Parquet readers only pull
//! the column chunks they project.
//!
//! `RemoteFile` answers footer reads with small range requests. Page data is
//! served from `FetchedRanges`, which holds the projected column chunks
//! fetched once per file.
use std::io::{self, Read};
use std::ops::Range;
use std::sync::Arc;

use bytes::{Buf, Bytes};
use parquet::errors::ParquetError;
use parquet::file::reader::{ChunkReader, Length};
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::RANGE;
use tracing::debug;
use url::Url;

use super::signing::SignedAsset;
use super::stac::CatalogError;

/// One blob from a container listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub name: String,
    pub size: u64,
}

/// A page of a container listing
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub blobs: Vec<BlobEntry>,
    pub next_marker: Option<String>,
}

/// Parse a `List Blobs` XML response body.
pub fn parse_listing(xml: &str) -> Result<ListingPage, CatalogError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut page = ListingPage::default();
    let mut curr = String::new();
    let mut in_blob = false;
    let mut name: Option<String> = None;
    let mut size: u64 = 0;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => {
                curr = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if curr == "Blob" {
                    in_blob = true;
                    name = None;
                    size = 0;
                }
            }
            Event::End(ref e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag == "Blob" {
                    in_blob = false;
                    let blob_name = name.take().ok_or_else(|| {
                        CatalogError::Listing("blob entry without a name".to_string())
                    })?;
                    page.blobs.push(BlobEntry {
                        name: blob_name,
                        size,
                    });
                }
                curr.clear();
            }
            Event::Text(e) => {
                let txt = e.unescape()?;
                match curr.as_str() {
                    "Name" if in_blob => name = Some(txt.to_string()),
                    "Content-Length" if in_blob => {
                        size = txt.parse().map_err(|_| {
                            CatalogError::Listing(format!("invalid Content-Length `{}`", txt))
                        })?
                    }
                    "NextMarker" if !txt.is_empty() => page.next_marker = Some(txt.to_string()),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(page)
}

/// Whether a listed blob is a Parquet part of the dataset rooted at `prefix`.
/// A prefix that names a single file matches itself.
pub fn is_dataset_part(prefix: &str, blob_name: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if blob_name == prefix {
        return true;
    }
    match blob_name.strip_prefix(prefix) {
        Some(rest) => {
            rest.starts_with('/')
                && rest.ends_with(".parquet")
                && !rest.split('/').any(|seg| seg.starts_with('_') || seg.starts_with('.'))
        }
        None => false,
    }
}

/// List every Parquet part under the signed asset's prefix, sorted by name.
pub fn list_dataset_parts(
    http: &Client,
    asset: &SignedAsset,
) -> Result<Vec<BlobEntry>, CatalogError> {
    let prefix = asset.location.prefix.as_str();
    let mut parts = Vec::new();
    let mut marker: Option<String> = None;
    loop {
        let url = asset.list_url(prefix, marker.as_deref())?;
        let response = http.get(url).send()?;
        if !response.status().is_success() {
            return Err(CatalogError::Listing(format!(
                "container {} returned {}",
                asset.location.container,
                response.status()
            )));
        }
        let page = parse_listing(&response.text()?)?;
        debug!("Listed {} blobs under {}", page.blobs.len(), prefix);
        parts.extend(
            page.blobs
                .into_iter()
                .filter(|b| is_dataset_part(prefix, &b.name)),
        );
        match page.next_marker {
            Some(next) => marker = Some(next),
            None => break,
        }
    }
    parts.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(parts)
}

/// Window fetched per request by readers that stream from an offset
const READ_WINDOW: u64 = 64 * 1024;

/// Ranges closer than this are fetched with one request
const COALESCE_GAP: u64 = 64 * 1024;

/// A remote Parquet file read through HTTP range requests
#[derive(Clone)]
pub struct RemoteFile {
    http: Client,
    url: Url,
    len: u64,
}

impl RemoteFile {
    pub fn new(http: Client, url: Url, len: u64) -> Self {
        Self { http, url, len }
    }

    fn fetch_range(&self, start: u64, end_inclusive: u64) -> parquet::errors::Result<Bytes> {
        let response = self
            .http
            .get(self.url.clone())
            .header(RANGE, format!("bytes={}-{}", start, end_inclusive))
            .send()
            .map_err(|e| ParquetError::External(Box::new(e)))?;
        let status = response.status();
        let body = response
            .bytes()
            .map_err(|e| ParquetError::External(Box::new(e)))?;
        let expected = (end_inclusive - start + 1) as usize;
        match status {
            StatusCode::PARTIAL_CONTENT if body.len() == expected => Ok(body),
            // Servers may ignore Range and send the whole object
            StatusCode::OK if body.len() as u64 == self.len => {
                Ok(body.slice(start as usize..=end_inclusive as usize))
            }
            _ => Err(ParquetError::General(format!(
                "range {}-{} of {} returned {} with {} bytes",
                start,
                end_inclusive,
                self.url.path(),
                status,
                body.len()
            ))),
        }
    }

    /// Fetch `ranges` up front, merging neighbours into single requests.
    /// Reads through the result must fall inside one of the fetched ranges.
    pub fn fetch_ranges(&self, ranges: &[Range<u64>]) -> parquet::errors::Result<FetchedRanges> {
        let mut sorted: Vec<Range<u64>> = ranges
            .iter()
            .filter(|r| r.start < r.end)
            .map(|r| r.start..r.end.min(self.len))
            .collect();
        sorted.sort_by_key(|r| r.start);

        let mut merged: Vec<Range<u64>> = Vec::with_capacity(sorted.len());
        for range in sorted {
            match merged.last_mut() {
                Some(last) if range.start <= last.end + COALESCE_GAP => {
                    last.end = last.end.max(range.end);
                }
                _ => merged.push(range),
            }
        }

        let mut chunks = Vec::with_capacity(merged.len());
        for range in merged {
            if range.start >= range.end {
                continue;
            }
            chunks.push((range.start, self.fetch_range(range.start, range.end - 1)?));
        }
        let requests = chunks.len();
        let fetched = FetchedRanges {
            len: self.len,
            chunks: Arc::new(chunks),
        };
        debug!(
            "Fetched {} byte(s) of {} in {} request(s)",
            fetched.fetched_len(),
            self.url.path(),
            requests
        );
        Ok(fetched)
    }
}

impl Length for RemoteFile {
    fn len(&self) -> u64 {
        self.len
    }
}

impl ChunkReader for RemoteFile {
    type T = WindowReader;

    fn get_read(&self, start: u64) -> parquet::errors::Result<Self::T> {
        Ok(WindowReader {
            file: self.clone(),
            pos: start.min(self.len),
            window: Bytes::new(),
        })
    }

    fn get_bytes(&self, start: u64, length: usize) -> parquet::errors::Result<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        let end = start + length as u64 - 1;
        if end >= self.len {
            return Err(ParquetError::EOF(format!(
                "range {}..{} beyond file length {}",
                start, end, self.len
            )));
        }
        self.fetch_range(start, end)
    }
}

/// Sequential reader over a remote file that fetches one bounded window at a time
pub struct WindowReader {
    file: RemoteFile,
    pos: u64,
    window: Bytes,
}

impl Read for WindowReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.window.is_empty() {
            if self.pos >= self.file.len || buf.is_empty() {
                return Ok(0);
            }
            let end = (self.pos + READ_WINDOW).min(self.file.len) - 1;
            self.window = self.file.fetch_range(self.pos, end).map_err(io::Error::other)?;
            self.pos = end + 1;
        }
        let n = buf.len().min(self.window.len());
        buf[..n].copy_from_slice(&self.window[..n]);
        self.window.advance(n);
        Ok(n)
    }
}

/// Byte ranges of a remote file held in memory
#[derive(Clone)]
pub struct FetchedRanges {
    len: u64,
    /// Sorted by offset, non-overlapping
    chunks: Arc<Vec<(u64, Bytes)>>,
}

impl FetchedRanges {
    /// Total bytes held
    pub fn fetched_len(&self) -> u64 {
        self.chunks.iter().map(|(_, b)| b.len() as u64).sum()
    }

    /// Bytes from `start` to the end of the fetched range containing it.
    fn tail(&self, start: u64) -> parquet::errors::Result<Bytes> {
        let idx = self.chunks.partition_point(|(offset, _)| *offset <= start);
        if idx > 0 {
            let (offset, data) = &self.chunks[idx - 1];
            let skip = (start - offset) as usize;
            if skip < data.len() {
                return Ok(data.slice(skip..));
            }
        }
        Err(ParquetError::General(format!(
            "offset {} of {} was not fetched",
            start, self.len
        )))
    }
}

impl Length for FetchedRanges {
    fn len(&self) -> u64 {
        self.len
    }
}

impl ChunkReader for FetchedRanges {
    type T = bytes::buf::Reader<Bytes>;

    fn get_read(&self, start: u64) -> parquet::errors::Result<Self::T> {
        Ok(self.tail(start)?.reader())
    }

    fn get_bytes(&self, start: u64, length: usize) -> parquet::errors::Result<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        let tail = self.tail(start)?;
        if tail.len() < length {
            return Err(ParquetError::General(format!(
                "bytes {}..{} of {} were not fetched",
                start,
                start + length as u64,
                self.len
            )));
        }
        Ok(tail.slice(..length))
    }
}
