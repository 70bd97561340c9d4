//! Avatar hashing and download

use crate::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// SHA-256 of an avatar image
pub type AvatarHash = [u8; 32];

/// Content hash used to detect avatar changes
pub fn avatar_hash(data: &[u8]) -> AvatarHash {
    Sha256::digest(data).into()
}

/// Upload file name for an avatar with the given extension
pub fn avatar_file_name(extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("avatar.{ext}"),
        None => "avatar".to_string(),
    }
}

/// Downloads profile override avatars
#[async_trait]
pub trait AvatarFetcher: Send + Sync {
    /// Fetch the image at `url`
    async fn fetch(&self, url: &str) -> BridgeResult<Vec<u8>>;
}

/// [`AvatarFetcher`] over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpAvatarFetcher {
    client: reqwest::Client,
}

impl HttpAvatarFetcher {
    /// Create a fetcher whose requests are bounded by `timeout`
    pub fn new(timeout: Duration) -> BridgeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AvatarFetcher for HttpAvatarFetcher {
    async fn fetch(&self, url: &str) -> BridgeResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| BridgeError::avatar_fetch(url, format!("request failed: {e}")))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| BridgeError::avatar_fetch(url, format!("failed to read body: {e}")))?;
        Ok(body.to_vec())
    }
}
