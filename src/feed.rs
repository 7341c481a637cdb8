//! Cached JSON post feed with in-memory paging and search
//!
//! The whole feed is fetched once per TTL through a [`TimedCache`]; paging and
//! searching work over the cached copy so browsing never refetches the feed.

use crate::cache::TimedCache;
use crate::clock::Clock;
use crate::errors::{Result, TrackerError};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Post {
    pub title: String,
    pub permalink: String,
    pub date: Option<DateTime<Utc>>,
    pub summary: String,
    pub tags: Vec<String>,
}

impl Post {
    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.summary.to_lowercase().contains(needle)
            || self.tags.iter().any(|tag| tag.to_lowercase().contains(needle))
    }
}

/// One page of results.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

/// Slice `items` into 1-based page `page`. Pages past the end are empty.
pub fn paginate<T: Clone>(items: &[T], page: usize, per_page: usize) -> Result<Page<T>> {
    if per_page == 0 {
        return Err(TrackerError::Config("per_page must be greater than 0".to_string()));
    }

    let page = page.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(per_page);

    let start = (page - 1).saturating_mul(per_page);
    let items = items
        .iter()
        .skip(start)
        .take(per_page)
        .cloned()
        .collect();

    Ok(Page {
        items,
        page,
        per_page,
        total_items,
        total_pages,
    })
}

pub struct PostFeed {
    client: Client,
    feed_url: String,
    ttl: Duration,
    cache: TimedCache<Arc<Vec<Post>>>,
}

impl PostFeed {
    pub fn new(feed_url: impl Into<String>, ttl: Duration, http_timeout: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = Client::builder()
            .timeout(http_timeout)
            .user_agent(format!("uptime_tracker/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TrackerError::Http)?;

        Ok(Self {
            client,
            feed_url: feed_url.into(),
            ttl,
            cache: TimedCache::new(clock),
        })
    }

    /// All posts, served from cache while fresh.
    pub async fn posts(&self) -> Result<Arc<Vec<Post>>> {
        self.cache.get_or_fetch(|| self.fetch(), self.ttl).await
    }

    pub async fn page(&self, page: usize, per_page: usize) -> Result<Page<Post>> {
        let posts = self.posts().await?;
        paginate(&posts, page, per_page)
    }

    /// Case-insensitive match on title, summary and tags, then paginate.
    pub async fn search(&self, query: &str, page: usize, per_page: usize) -> Result<Page<Post>> {
        let posts = self.posts().await?;
        let needle = query.trim().to_lowercase();

        if needle.is_empty() {
            return paginate(&posts, page, per_page);
        }

        let matches: Vec<Post> = posts.iter().filter(|post| post.matches(&needle)).cloned().collect();
        debug!("Search {:?} matched {} of {} posts", query, matches.len(), posts.len());

        paginate(&matches, page, per_page)
    }

    pub async fn refresh(&self) {
        self.cache.invalidate().await;
    }

    async fn fetch(&self) -> Result<Arc<Vec<Post>>> {
        debug!("Fetching post feed from {}", self.feed_url);

        let response = self.client.get(&self.feed_url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(TrackerError::Fetch(format!(
                "feed {} returned status {}",
                self.feed_url, status
            )));
        }

        let body = response.text().await?;
        let posts: Vec<Post> = serde_json::from_str(&body)?;

        info!("Fetched {} posts from {}", posts.len(), self.feed_url);
        Ok(Arc::new(posts))
    }
}
