use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use url::Url;

/// Retrieves notary bundles.
#[async_trait]
pub trait BundleFetcher: Send + Sync {
    async fn fetch(&self, location: &Url) -> anyhow::Result<String>;
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BundleFetcher for ReqwestFetcher {
    async fn fetch(&self, location: &Url) -> anyhow::Result<String> {
        info!(%location, "Downloading notary bundle...");

        let response = self
            .client
            .get(location.clone())
            .send()
            .await
            .context("request failed")?
            .error_for_status()
            .context("unexpected status")?;

        response.text().await.context("failed to read the bundle")
    }
}
