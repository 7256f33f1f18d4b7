use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{country_name, NewArticle};
use crate::services::RetryPolicy;

const NEWS_API_BASE_URL: &str = "https://newsapi.org/v2";

/// Search window for the full-text fallback strategy.
const SEARCH_WINDOW_DAYS: i64 = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct NewsApiArticle {
    pub source: NewsApiSource,
    pub author: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: String,
    #[serde(rename = "urlToImage")]
    pub url_to_image: Option<String>,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsApiSource {
    #[allow(dead_code)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    status: String,
    message: Option<String>,
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

/// Keyword alternatives that must appear in results for each category when
/// falling back to full-text search. Empty for the general category.
fn category_keywords(category: &str) -> &'static str {
    match category {
        "business" => {
            r#""stock market" OR "economy" OR "GDP" OR "inflation" OR "trade deal" OR "business""#
        }
        "technology" => {
            r#""artificial intelligence" OR "AI" OR "software" OR "tech company" OR "startup" OR "cybersecurity""#
        }
        "science" => {
            r#""scientists" OR "research study" OR "discovery" OR "NASA" OR "space" OR "climate change""#
        }
        "health" => {
            r#""healthcare" OR "medical" OR "disease" OR "virus" OR "hospital" OR "patients" OR "treatment" OR "vaccine""#
        }
        "sports" => {
            r#""cricket" OR "football" OR "tennis" OR "Olympics" OR "match" OR "tournament" OR "championship""#
        }
        "entertainment" => {
            r#""movie" OR "film" OR "Bollywood" OR "Hollywood" OR "music" OR "concert" OR "actor" OR "actress""#
        }
        _ => "",
    }
}

pub struct NewsApiClient {
    client: reqwest::Client,
    api_key: String,
    home_country: String,
    retry: RetryPolicy,
}

impl NewsApiClient {
    pub fn new(api_key: String, home_country: String, retry: RetryPolicy) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("factfeed/0.1")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            home_country,
            retry,
        }
    }

    /// Fetch headlines for a category/country pair. The home country has a
    /// direct headline endpoint; every other country goes through full-text
    /// search. Provider failures are logged and yield an empty result so a
    /// surrounding batch loop keeps going.
    pub async fn fetch_headlines(
        &self,
        category: &str,
        country: &str,
        page_size: u32,
        page: u32,
    ) -> Vec<NewsApiArticle> {
        let result = if country == self.home_country {
            self.retry
                .run("headline fetch", || {
                    self.top_headlines(category, country, page_size, page)
                })
                .await
        } else {
            self.retry
                .run("headline search", || {
                    self.everything_search(category, country, page_size, page)
                })
                .await
        };

        match result {
            Ok(articles) => filter_placeholders(articles),
            Err(e) => {
                tracing::error!("Failed to fetch headlines for {}/{}: {}", category, country, e);
                Vec::new()
            }
        }
    }

    /// Free-text search over recent articles, newest first.
    pub async fn search_news(
        &self,
        query: &str,
        page_size: u32,
        page: u32,
    ) -> Vec<NewsApiArticle> {
        let result = self
            .retry
            .run("news search", || {
                self.free_text_search(query, page_size, page)
            })
            .await;

        match result {
            Ok(articles) => filter_placeholders(articles),
            Err(e) => {
                tracing::error!("Failed to search news for {:?}: {}", query, e);
                Vec::new()
            }
        }
    }

    async fn free_text_search(
        &self,
        query: &str,
        page_size: u32,
        page: u32,
    ) -> Result<Vec<NewsApiArticle>> {
        let page_size = page_size.to_string();
        let page = page.to_string();
        let response = self
            .client
            .get(format!("{NEWS_API_BASE_URL}/everything"))
            .query(&[
                ("q", query),
                ("pageSize", page_size.as_str()),
                ("page", page.as_str()),
                ("sortBy", "publishedAt"),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        parse_response(response).await
    }

    async fn top_headlines(
        &self,
        category: &str,
        country: &str,
        page_size: u32,
        page: u32,
    ) -> Result<Vec<NewsApiArticle>> {
        let page_size = page_size.to_string();
        let page = page.to_string();
        let response = self
            .client
            .get(format!("{NEWS_API_BASE_URL}/top-headlines"))
            .query(&[
                ("country", country),
                ("category", category),
                ("pageSize", page_size.as_str()),
                ("page", page.as_str()),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        parse_response(response).await
    }

    async fn everything_search(
        &self,
        category: &str,
        country: &str,
        page_size: u32,
        page: u32,
    ) -> Result<Vec<NewsApiArticle>> {
        let query = build_search_query(category, country);
        let from_date = (Utc::now() - chrono::Duration::days(SEARCH_WINDOW_DAYS))
            .format("%Y-%m-%d")
            .to_string();
        let page_size = page_size.to_string();
        let page = page.to_string();

        let response = self
            .client
            .get(format!("{NEWS_API_BASE_URL}/everything"))
            .query(&[
                ("q", query.as_str()),
                ("pageSize", page_size.as_str()),
                ("page", page.as_str()),
                ("sortBy", "publishedAt"),
                ("language", "en"),
                ("from", from_date.as_str()),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        parse_response(response).await
    }
}

/// Map a provider article to the canonical write shape. Content falls back
/// to the description when the provider sent none.
pub fn transform_to_article(
    raw: &NewsApiArticle,
    category: &str,
    country: &str,
) -> NewArticle {
    NewArticle {
        source_name: raw.source.name.clone(),
        author: raw.author.clone(),
        title: raw
            .title
            .clone()
            .unwrap_or_else(|| "Untitled".to_string()),
        original_content: raw.content.clone().or_else(|| raw.description.clone()),
        url: raw.url.clone(),
        image_url: raw.url_to_image.clone(),
        published_at: raw
            .published_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        category: category.to_string(),
        country: country.to_string(),
    }
}

async fn parse_response(response: reqwest::Response) -> Result<Vec<NewsApiArticle>> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::NewsApi(format!("HTTP {}: {}", status, body)));
    }

    let payload: NewsApiResponse = response.json().await?;
    if payload.status != "ok" {
        return Err(AppError::NewsApi(
            payload.message.unwrap_or_else(|| "provider reported an error".to_string()),
        ));
    }

    Ok(payload.articles)
}

/// AND the category keyword alternatives with the quoted country name.
/// The general category searches by country alone.
fn build_search_query(category: &str, country: &str) -> String {
    let name = country_name(country);
    let keywords = category_keywords(category);

    if keywords.is_empty() {
        format!("\"{name}\"")
    } else {
        format!("({keywords}) AND \"{name}\"")
    }
}

/// Drop provider placeholder entries (removed/redacted or missing titles).
fn filter_placeholders(articles: Vec<NewsApiArticle>) -> Vec<NewsApiArticle> {
    articles
        .into_iter()
        .filter(|a| {
            a.title
                .as_deref()
                .map(|t| !t.is_empty() && t != "[Removed]")
                .unwrap_or(false)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_article(title: Option<&str>) -> NewsApiArticle {
        NewsApiArticle {
            source: NewsApiSource {
                id: None,
                name: "Example News".to_string(),
            },
            author: Some("Jo Writer".to_string()),
            title: title.map(|t| t.to_string()),
            description: Some("A short description.".to_string()),
            url: "https://example.com/story".to_string(),
            url_to_image: Some("https://example.com/image.jpg".to_string()),
            published_at: Some("2026-08-04T10:00:00Z".to_string()),
            content: None,
        }
    }

    #[test]
    fn transform_falls_back_to_description() {
        let raw = raw_article(Some("Headline"));
        let article = transform_to_article(&raw, "general", "us");

        assert_eq!(article.title, "Headline");
        assert_eq!(article.source_name, "Example News");
        assert_eq!(
            article.original_content.as_deref(),
            Some("A short description.")
        );
        assert_eq!(article.category, "general");
        assert_eq!(article.country, "us");
        assert!(article.published_at.is_some());
    }

    #[test]
    fn transform_prefers_content_over_description() {
        let mut raw = raw_article(Some("Headline"));
        raw.content = Some("Full provider content [+1200 chars]".to_string());
        let article = transform_to_article(&raw, "general", "us");

        assert_eq!(
            article.original_content.as_deref(),
            Some("Full provider content [+1200 chars]")
        );
    }

    #[test]
    fn placeholder_entries_are_filtered() {
        let articles = vec![
            raw_article(Some("Kept")),
            raw_article(Some("[Removed]")),
            raw_article(Some("")),
            raw_article(None),
        ];

        let kept = filter_placeholders(articles);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title.as_deref(), Some("Kept"));
    }

    #[test]
    fn general_category_searches_by_country_alone() {
        assert_eq!(build_search_query("general", "gb"), "\"United Kingdom\"");
    }

    #[test]
    fn specific_category_ands_keywords_with_country() {
        let query = build_search_query("business", "in");
        assert!(query.starts_with("("));
        assert!(query.contains("\"stock market\""));
        assert!(query.ends_with("AND \"India\""));
    }
}
