//! Asset Fetcher — fetches footer/header HTML fragments from object
//! storage with retry, a bounded TTL cache, and `{{LOGO_URL}}` substitution.
//! Never throws outward: every failure degrades to an empty string.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::warn;

use crate::providers::object_store::ObjectStorageClient;
use crate::retry::{retry_with_backoff, RetryConfig};

const CACHE_CAPACITY: usize = 1000;
const CACHE_TTL: Duration = Duration::from_secs(3600);
const LOGO_TOKEN: &str = "{{LOGO_URL}}";

type CacheKey = (String, String);

struct CacheEntry {
    value: String,
    inserted_at: Instant,
}

struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    order: VecDeque<CacheKey>,
}

/// Fetches and caches tenant footer HTML, keyed by `(tenantId, logoImageUrl)`
/// — including the logo in the key guarantees invalidation on logo change.
pub struct AssetFetcher {
    client: Arc<dyn ObjectStorageClient>,
    cache: Mutex<CacheInner>,
}

impl AssetFetcher {
    pub fn new(client: Arc<dyn ObjectStorageClient>) -> Self {
        Self {
            client,
            cache: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// `fetchFooterHtml(url) -> string | empty`, with the tenant's logo URL
    /// substituted for the literal token `{{LOGO_URL}}` (or left in place if
    /// the tenant has none). Retries with [`RetryConfig::default`] unless
    /// `prewarm` selects the wider pre-warming path.
    pub async fn fetch_footer_html(&self, tenant_id: &str, url: &str, logo_image_url: Option<&str>, prewarm: bool) -> String {
        if url.is_empty() {
            return String::new();
        }

        let key = (tenant_id.to_string(), logo_image_url.unwrap_or("").to_string());
        if let Some(cached) = self.cache_get(&key).await {
            return substitute_logo(&cached, logo_image_url);
        }

        let config = if prewarm { RetryConfig::prewarm() } else { RetryConfig::default() };
        let client = self.client.clone();
        let fetch_url = url.to_string();

        let result = retry_with_backoff(&config, || {
            let client = client.clone();
            let url = fetch_url.clone();
            async move { client.get_text(&url).await }
        })
        .await;

        match result {
            Ok(html) => {
                self.cache_put(key, html.clone()).await;
                substitute_logo(&html, logo_image_url)
            }
            Err(e) => {
                warn!(tenant_id, url, error = %e, "asset fetch exhausted retries — returning empty footer");
                String::new()
            }
        }
    }

    async fn cache_get(&self, key: &CacheKey) -> Option<String> {
        let mut inner = self.cache.lock().await;
        match inner.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < CACHE_TTL => Some(entry.value.clone()),
            Some(_) => {
                inner.entries.remove(key);
                inner.order.retain(|k| k != key);
                None
            }
            None => None,
        }
    }

    async fn cache_put(&self, key: CacheKey, value: String) {
        let mut inner = self.cache.lock().await;
        if !inner.entries.contains_key(&key) {
            inner.order.push_back(key.clone());
            while inner.order.len() > CACHE_CAPACITY {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.entries.remove(&oldest);
                }
            }
        }
        inner.entries.insert(key, CacheEntry { value, inserted_at: Instant::now() });
    }
}

fn substitute_logo(html: &str, logo_image_url: Option<&str>) -> String {
    match logo_image_url {
        Some(url) if !url.is_empty() => html.replace(LOGO_TOKEN, url),
        _ => html.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyClient {
        calls: AtomicUsize,
        fail_times: usize,
        body: String,
    }

    #[async_trait]
    impl ObjectStorageClient for FlakyClient {
        async fn get_text(&self, _url: &str) -> Result<String, crate::errors::BatchError> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed);
            if n < self.fail_times {
                Err(crate::errors::BatchError::ProviderTransient("flaky".into()))
            } else {
                Ok(self.body.clone())
            }
        }
    }

    struct AlwaysFailClient;

    #[async_trait]
    impl ObjectStorageClient for AlwaysFailClient {
        async fn get_text(&self, _url: &str) -> Result<String, crate::errors::BatchError> {
            Err(crate::errors::BatchError::ProviderPermanent("gone".into()))
        }
    }

    #[tokio::test]
    async fn substitutes_logo_token() {
        let client = Arc::new(FlakyClient { calls: AtomicUsize::new(0), fail_times: 0, body: "<div>{{LOGO_URL}}</div>".into() });
        let fetcher = AssetFetcher::new(client);
        let html = fetcher.fetch_footer_html("t1", "https://cdn/footer.html", Some("https://cdn/logo.png"), false).await;
        assert_eq!(html, "<div>https://cdn/logo.png</div>");
    }

    #[tokio::test]
    async fn returns_empty_on_persistent_failure() {
        let fetcher = AssetFetcher::new(Arc::new(AlwaysFailClient));
        let html = fetcher.fetch_footer_html("t1", "https://cdn/footer.html", None, false).await;
        assert_eq!(html, "");
    }

    #[tokio::test]
    async fn caches_by_tenant_and_logo_key() {
        let client = Arc::new(FlakyClient { calls: AtomicUsize::new(0), fail_times: 0, body: "<div>body</div>".into() });
        let fetcher = AssetFetcher::new(client.clone());
        fetcher.fetch_footer_html("t1", "https://cdn/footer.html", Some("logo-a"), false).await;
        fetcher.fetch_footer_html("t1", "https://cdn/footer.html", Some("logo-a"), false).await;
        assert_eq!(client.calls.load(Ordering::Relaxed), 1);
    }
}
