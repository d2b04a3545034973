//
// fetch.rs
// Dicom-Redact-rs
//
// Retrieves slice bytes by URI: http(s) through a blocking reqwest client, file:// and plain paths from disk.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::config::HttpConfig;

/// Source of raw slice bytes. Blocking; no retry.
pub trait SliceFetcher: Sync {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>>;
}

impl<F> SliceFetcher for F
where
    F: Fn(&str) -> Result<Vec<u8>> + Sync,
{
    fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        self(uri)
    }
}

/// Dispatches on the URI scheme of the slice's `file_uri`.
pub struct UriFetcher {
    client: reqwest::blocking::Client,
}

impl UriFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            // Signed URLs already expire on their own; stalls are left to the caller.
            .timeout(config.timeout_secs.map(Duration::from_secs));
        if let Some(secs) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        let client = builder.build().context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    fn fetch_http(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Request failed for {}", redact_query(url)))?;

        let status = response.status();
        if !status.is_success() {
            bail!("{} returned HTTP {}", redact_query(url), status);
        }

        let bytes = response
            .bytes()
            .with_context(|| format!("Failed to read body of {}", redact_query(url)))?;
        Ok(bytes.to_vec())
    }
}

impl SliceFetcher for UriFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            debug!(uri = %redact_query(uri), "downloading slice");
            return self.fetch_http(uri);
        }

        let path = uri.strip_prefix("file://").unwrap_or(uri);
        read_local(Path::new(path))
    }
}

fn read_local(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read slice {:?}", path))
}

// Signed URLs carry credentials in the query string; keep them out of logs and errors.
fn redact_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
