use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored article. `url` is the dedup key; `facts_only` is populated
/// once fact extraction has succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub source_name: String,
    pub author: Option<String>,
    pub title: String,
    pub original_content: Option<String>,
    pub facts_only: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub category: String,
    pub country: String,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

/// Write shape for ingestion. The store assigns `id` and `created_at`;
/// new articles always start unprocessed with no facts.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub source_name: String,
    pub author: Option<String>,
    pub title: String,
    pub original_content: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub category: String,
    pub country: String,
}
