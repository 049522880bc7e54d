//! Fetches the day's strip and stores it.

use super::http::{build_client, classify_error, get_success};
use super::input_date;
use super::store::{strip_key, ArtifactStore, Metadata};
use crate::errors::TaskError;
use chrono::NaiveDate;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Metadata scraped from a strip page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comic {
    /// Publication date.
    pub date: NaiveDate,
    /// Strip title.
    pub title: String,
    /// Direct image URL.
    pub image_url: String,
    /// The page the strip was scraped from.
    pub strip_url: String,
}

/// Output of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOutput {
    /// The scraped strip.
    #[serde(flatten)]
    pub comic: Comic,
    /// Public URL of the stored image.
    pub upload_url: String,
    /// Hex SHA-256 of the image bytes.
    pub sha256: String,
}

/// Downloads the strip for a date into the artifact store.
#[derive(Clone)]
pub struct FetchWorker {
    client: Client,
    store: Arc<dyn ArtifactStore>,
    base_url: String,
    strips_dir: String,
    timeout: Duration,
}

impl std::fmt::Debug for FetchWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchWorker")
            .field("base_url", &self.base_url)
            .field("strips_dir", &self.strips_dir)
            .finish_non_exhaustive()
    }
}

impl FetchWorker {
    /// Creates a fetch worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        base_url: impl Into<String>,
        strips_dir: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, TaskError> {
        Ok(Self {
            client: build_client(user_agent, timeout, true)?,
            store,
            base_url: base_url.into(),
            strips_dir: strips_dir.into(),
            timeout,
        })
    }

    fn strip_url(&self, date: NaiveDate) -> String {
        format!("{}/strip/{date}", self.base_url.trim_end_matches('/'))
    }

    /// Scrapes the strip page for `date`.
    ///
    /// # Errors
    ///
    /// A page whose strip id is not `date` means the strip is not published
    /// yet and is transient. Missing attributes are permanent.
    pub async fn scrape(&self, date: NaiveDate) -> Result<Comic, TaskError> {
        let strip_url = self.strip_url(date);
        let body = get_success(&self.client, &strip_url, self.timeout)
            .await?
            .text()
            .await
            .map_err(|e| classify_error(&e, self.timeout))?;

        parse_comic(&body, date, strip_url)
    }

    /// Fetches and stores the strip named by `input.date` (default: today).
    ///
    /// # Errors
    ///
    /// Returns the classified failure of the scrape, download or upload.
    pub async fn fetch(&self, input: &Value) -> Result<FetchOutput, TaskError> {
        let date = input_date(input)?;
        let comic = self.scrape(date).await?;
        info!(date = %date, title = %comic.title, "Scraped strip");

        let image = get_success(&self.client, &comic.image_url, self.timeout)
            .await?
            .bytes()
            .await
            .map_err(|e| classify_error(&e, self.timeout))?;
        let sha256 = hex::encode(Sha256::digest(&image));
        debug!(bytes = image.len(), sha256 = %sha256, "Downloaded strip image");

        let key = strip_key(&self.strips_dir, date);
        let metadata = Metadata::from([
            ("title".to_string(), comic.title.clone()),
            ("sha256".to_string(), sha256.clone()),
        ]);
        let upload_url = self
            .store
            .put(&key, image.to_vec(), "image/gif", metadata)
            .await?;
        info!(upload_url = %upload_url, "Stored strip");

        Ok(FetchOutput {
            comic,
            upload_url,
            sha256,
        })
    }
}

fn parse_comic(body: &str, date: NaiveDate, strip_url: String) -> Result<Comic, TaskError> {
    let selector = Selector::parse(".comic-item-container")
        .map_err(|e| TaskError::permanent(format!("Invalid selector: {e}")))?;
    let document = Html::parse_document(body);
    let container = document
        .select(&selector)
        .next()
        .ok_or_else(|| TaskError::permanent("Comic metadata not found"))?
        .value();

    if container.attr("data-id").unwrap_or_default() != date.to_string() {
        return Err(TaskError::transient(format!("No comic found for date {date}")));
    }

    let attr = |name: &str| {
        container
            .attr(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| TaskError::permanent(format!("Attribute {name} not found")))
    };

    Ok(Comic {
        date,
        title: attr("data-title")?,
        image_url: attr("data-image")?,
        strip_url,
    })
}
