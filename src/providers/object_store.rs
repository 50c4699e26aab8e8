//! Object storage: HTTPS GET of an HTML document by URL. Plain
//! `reqwest` rather than an S3 SDK — the only operation the core performs is
//! an anonymous (or pre-signed-URL) GET, so there is nothing an S3 client
//! would add.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::BatchError;

#[async_trait]
pub trait ObjectStorageClient: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String, BatchError>;
}

pub struct HttpObjectStorageClient {
    http: reqwest::Client,
}

impl HttpObjectStorageClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client builder should not fail with static config"),
        }
    }
}

impl Default for HttpObjectStorageClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStorageClient for HttpObjectStorageClient {
    async fn get_text(&self, url: &str) -> Result<String, BatchError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| BatchError::ProviderTransient(format!("object storage GET failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(BatchError::ProviderPermanent(format!(
                "object storage GET {url} returned {}",
                resp.status()
            )));
        }

        resp.text()
            .await
            .map_err(|e| BatchError::ProviderPermanent(format!("object storage body read failed: {e}")))
    }
}
