// src/services/fetcher.rs

//! Raw catalog document retrieval.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::FetcherConfig;
use crate::utils::http::{create_async_client, fetch_text};

/// Fetch boundary: returns the raw catalog document of a novel.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, novel_id: &str) -> Result<String>;
}

/// Fetches catalog pages over HTTP.
pub struct HttpFetcher {
    config: FetcherConfig,
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let client = create_async_client(&config)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, novel_id: &str) -> Result<String> {
        let url = self.config.catalog_url_for(novel_id);
        log::debug!("Fetching {url}");

        fetch_text(&self.client, &url).await.map_err(|e| match e {
            AppError::Http(err) if err.is_timeout() => {
                AppError::timeout(format!("fetch {novel_id}"), self.config.timeout_secs)
            }
            AppError::Http(err) => AppError::fetch(novel_id, err),
            AppError::Fetch { message, .. } => AppError::fetch(novel_id, message),
            other => other,
        })
    }
}
