//! Renders the RSS feed from stored strips.

use super::input_date;
use super::store::{strip_key, ArtifactStore, Metadata};
use crate::errors::TaskError;
use chrono::{Days, NaiveDate, NaiveTime, TimeZone, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};

const CHANNEL_TITLE: &str = "Dilbert";
const CHANNEL_LINK: &str = "https://dilbert.com";
const CHANNEL_DESCRIPTION: &str = "Dilbert Daily Strip";

/// One feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    /// Strip date.
    pub date: NaiveDate,
    /// Strip title.
    pub title: String,
    /// Public image URL; also the item link and guid.
    pub url: String,
}

/// Output of a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutput {
    /// Public URL of the stored feed.
    pub feed_url: String,
    /// Number of items in the feed.
    pub items: usize,
}

/// Builds the feed of the most recent strips.
#[derive(Clone)]
pub struct BuildWorker {
    store: Arc<dyn ArtifactStore>,
    strips_dir: String,
    feed_path: String,
    feed_length: u32,
}

impl std::fmt::Debug for BuildWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildWorker")
            .field("strips_dir", &self.strips_dir)
            .field("feed_path", &self.feed_path)
            .field("feed_length", &self.feed_length)
            .finish_non_exhaustive()
    }
}

impl BuildWorker {
    /// Creates a build worker.
    #[must_use]
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        strips_dir: impl Into<String>,
        feed_path: impl Into<String>,
        feed_length: u32,
    ) -> Self {
        Self {
            store,
            strips_dir: strips_dir.into(),
            feed_path: feed_path.into(),
            feed_length,
        }
    }

    /// Collects feed items for the `feed_length` days ending at `end`,
    /// newest first. Days without a stored strip are skipped.
    ///
    /// # Errors
    ///
    /// Returns a failure if a metadata lookup fails.
    pub async fn items(&self, end: NaiveDate) -> Result<Vec<FeedItem>, TaskError> {
        let lookups = (0..self.feed_length)
            .filter_map(|i| end.checked_sub_days(Days::new(u64::from(i))))
            .map(|date| async move {
                let key = strip_key(&self.strips_dir, date);
                let metadata = self.store.metadata(&key).await?;
                Ok::<_, TaskError>(metadata.map(|meta| FeedItem {
                    date,
                    title: meta
                        .get("title")
                        .cloned()
                        .unwrap_or_else(|| format!("Dilbert - {date}")),
                    url: self.store.url(&key),
                }))
            });

        let items: Vec<FeedItem> = try_join_all(lookups).await?.into_iter().flatten().collect();
        debug!(found = items.len(), window = self.feed_length, "Collected feed items");
        Ok(items)
    }

    /// Renders and stores the feed. The window ends at `input.date` when
    /// present, today otherwise.
    ///
    /// # Errors
    ///
    /// Returns a failure if the input date is malformed or the store fails.
    pub async fn build(&self, input: &Value) -> Result<BuildOutput, TaskError> {
        let end = input_date(input)?;

        info!(end = %end, "Generating feed");
        let items = self.items(end).await?;
        let xml = render_rss(&items);

        let feed_url = self
            .store
            .put(
                &self.feed_path,
                xml.into_bytes(),
                "text/xml; charset=utf-8",
                Metadata::new(),
            )
            .await?;
        info!(feed_url = %feed_url, items = items.len(), "Stored feed");

        Ok(BuildOutput {
            feed_url,
            items: items.len(),
        })
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// RFC 2822 timestamp for midnight UTC on `date`.
#[must_use]
pub fn pub_date(date: NaiveDate) -> String {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
        .to_rfc2822()
}

/// Renders an RSS 2.0 document.
#[must_use]
pub fn render_rss(items: &[FeedItem]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    xml.push_str("<rss version=\"2.0\">\n  <channel>\n");
    let _ = writeln!(xml, "    <title>{}</title>", escape(CHANNEL_TITLE));
    let _ = writeln!(xml, "    <link>{}</link>", escape(CHANNEL_LINK));
    let _ = writeln!(xml, "    <description>{}</description>", escape(CHANNEL_DESCRIPTION));
    for item in items {
        let url = escape(&item.url);
        xml.push_str("    <item>\n");
        let _ = writeln!(xml, "      <title>{}</title>", escape(&item.title));
        let _ = writeln!(xml, "      <link>{url}</link>");
        let _ = writeln!(
            xml,
            "      <description>{}</description>",
            escape(&format!(r#"<img src="{}">"#, item.url))
        );
        let _ = writeln!(xml, "      <guid>{url}</guid>");
        let _ = writeln!(xml, "      <pubDate>{}</pubDate>", pub_date(item.date));
        xml.push_str("    </item>\n");
    }
    xml.push_str("  </channel>\n</rss>\n");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorClass, StoreError};
    use crate::workers::store::{InMemoryArtifactStore, Metadata, MockArtifactStore};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 10, d).unwrap()
    }

    async fn seed(store: &InMemoryArtifactStore, date: NaiveDate, title: &str) {
        store
            .put(
                &strip_key("strips", date),
                vec![0],
                "image/gif",
                Metadata::from([("title".to_string(), title.to_string())]),
            )
            .await
            .unwrap();
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&apos;");
    }

    #[test]
    fn test_pub_date_is_midnight_utc() {
        let rendered = pub_date(day(1));
        assert!(rendered.starts_with("Mon, "));
        assert!(rendered.ends_with("00:00:00 +0000"));
    }

    #[test]
    fn test_render_rss() {
        let xml = render_rss(&[FeedItem {
            date: day(1),
            title: "Q & A".to_string(),
            url: "https://cdn/strips/2018-10-01.gif".to_string(),
        }]);

        assert!(xml.contains("<title>Dilbert</title>"));
        assert!(xml.contains("<description>Dilbert Daily Strip</description>"));
        assert!(xml.contains("<title>Q &amp; A</title>"));
        assert!(xml.contains("<guid>https://cdn/strips/2018-10-01.gif</guid>"));
        assert!(xml.contains(
            "<description>&lt;img src=&quot;https://cdn/strips/2018-10-01.gif&quot;&gt;</description>"
        ));
        assert!(xml.contains(&format!("<pubDate>{}</pubDate>", pub_date(day(1)))));
    }

    #[tokio::test]
    async fn test_items_skip_missing_days() {
        let store = Arc::new(InMemoryArtifactStore::new("https://cdn"));
        seed(&store, day(3), "Three").await;
        seed(&store, day(1), "One").await;

        let worker = BuildWorker::new(store, "strips", "v2/rss.xml", 3);
        let items = worker.items(day(3)).await.unwrap();

        assert_eq!(
            items,
            vec![
                FeedItem {
                    date: day(3),
                    title: "Three".to_string(),
                    url: "https://cdn/strips/2018-10-03.gif".to_string(),
                },
                FeedItem {
                    date: day(1),
                    title: "One".to_string(),
                    url: "https://cdn/strips/2018-10-01.gif".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_items_respect_window() {
        let store = Arc::new(InMemoryArtifactStore::default());
        seed(&store, day(1), "Too old").await;

        let worker = BuildWorker::new(store, "strips", "v2/rss.xml", 2);
        assert!(worker.items(day(3)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_stores_feed() {
        let store = Arc::new(InMemoryArtifactStore::new("https://cdn"));
        seed(&store, day(2), "Two").await;

        let worker = BuildWorker::new(store.clone(), "strips", "v2/rss.xml", 30);
        let out = worker.build(&json!({"date": "2018-10-02"})).await.unwrap();

        assert_eq!(
            out,
            BuildOutput {
                feed_url: "https://cdn/v2/rss.xml".to_string(),
                items: 1,
            }
        );
        let feed = store.get("v2/rss.xml").unwrap();
        assert_eq!(feed.content_type, "text/xml; charset=utf-8");
        assert!(String::from_utf8(feed.body).unwrap().contains("<title>Two</title>"));
    }

    #[tokio::test]
    async fn test_build_store_failure_is_transient() {
        let mut store = MockArtifactStore::new();
        store.expect_metadata().returning(|key| {
            Err(StoreError::Io {
                key: key.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "unavailable"),
            })
        });
        store.expect_url().returning(|key| key.to_string());
        store.expect_put().never();

        let worker = BuildWorker::new(Arc::new(store), "strips", "v2/rss.xml", 2);
        let err = worker.build(&json!({"date": "2018-10-02"})).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[tokio::test]
    async fn test_build_rejects_bad_date() {
        let worker = BuildWorker::new(Arc::new(InMemoryArtifactStore::default()), "strips", "f", 1);
        let err = worker.build(&json!({"date": "yesterday"})).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Permanent);
    }

    #[tokio::test]
    async fn test_build_rejects_non_string_date() {
        let mut store = MockArtifactStore::new();
        store.expect_metadata().never();
        store.expect_put().never();
        let worker = BuildWorker::new(Arc::new(store), "strips", "f", 1);

        let err = worker.build(&json!({"date": 7})).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Permanent);
    }
}
