use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ai::FactExtractor;
use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{Article, CATEGORIES};
use crate::news::{transform_to_article, NewsApiArticle, NewsApiClient};
use crate::services::{needs_backfill, ContentFetcher, RetryPolicy};

/// Cached articles whose freshest write is at least this old trigger a refresh.
const STALE_AFTER_HOURS: i64 = 2;

/// Pacing between provider calls during a sweep.
const SWEEP_FETCH_DELAY: Duration = Duration::from_millis(300);
/// Pacing between categories in a full refresh.
const REFRESH_CATEGORY_DELAY: Duration = Duration::from_millis(500);
/// Pacing between articles in a drain.
const DRAIN_ARTICLE_DELAY: Duration = Duration::from_millis(500);

/// Page size for scheduled sweep fetches.
const SWEEP_PAGE_SIZE: u32 = 10;
/// How many unprocessed articles a sweep drains after fetching.
const SWEEP_DRAIN_LIMIT: u32 = 5;

#[derive(Debug)]
pub struct FetchOutcome {
    pub articles: Vec<Article>,
    pub cached: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    pub fetched: usize,
    pub processed: usize,
    pub errors: Vec<String>,
}

#[derive(Debug)]
pub struct ExtractOutcome {
    pub facts: String,
    pub was_cached: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct DrainReport {
    pub processed: usize,
    pub total: usize,
    pub errors: Vec<String>,
}

pub struct App {
    repository: Repository,
    provider: Option<NewsApiClient>,
    extractor: Option<FactExtractor>,
    content_fetcher: ContentFetcher,
    retry: RetryPolicy,
    inflight: Arc<InflightRegistry>,
    page_size: u32,
    home_country: String,
    sweep_secret: Option<String>,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;
        let retry = RetryPolicy::new(
            config.retry_max_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
        );

        let provider = config.news_api_key.as_ref().map(|key| {
            NewsApiClient::new(key.clone(), config.home_country.clone(), retry.clone())
        });

        let extractor = config
            .anthropic_api_key
            .as_ref()
            .map(|key| FactExtractor::new(key.clone(), retry.clone()));

        Ok(Self {
            repository,
            provider,
            extractor,
            content_fetcher: ContentFetcher::new(),
            retry,
            inflight: Arc::new(InflightRegistry::default()),
            page_size: config.page_size,
            home_country: config.home_country.clone(),
            sweep_secret: config.sweep_secret.clone(),
        })
    }

    /// Serve the cached slice for a category/country pair, or refresh it
    /// when forced, empty, or stale.
    pub async fn get_or_refresh_articles(
        &self,
        category: &str,
        country: &str,
        force_refresh: bool,
    ) -> Result<FetchOutcome> {
        if !force_refresh {
            let cached = match self
                .repository
                .get_by_category_country(category, country, self.page_size)
                .await
            {
                Ok(articles) => articles,
                Err(e) => {
                    tracing::warn!("Failed to read cached {}/{} articles: {}", category, country, e);
                    Vec::new()
                }
            };

            if !cached.is_empty() && !is_stale(&cached, Utc::now()) {
                return Ok(FetchOutcome {
                    articles: cached,
                    cached: true,
                });
            }
        }

        let articles = self.refresh_slice(category, country, self.page_size).await?;
        Ok(FetchOutcome {
            articles,
            cached: false,
        })
    }

    /// Re-ingest every category for a country, returning per-category
    /// counts of stored articles.
    pub async fn refresh_all_categories(&self, country: &str) -> Result<BTreeMap<String, usize>> {
        self.provider()?;

        let mut results = BTreeMap::new();
        let mut categories = CATEGORIES.iter().peekable();
        while let Some(category) = categories.next() {
            let articles = self.refresh_slice(category.slug, country, self.page_size).await?;
            results.insert(category.slug.to_string(), articles.len());

            if categories.peek().is_some() {
                tokio::time::sleep(REFRESH_CATEGORY_DELAY).await;
            }
        }

        Ok(results)
    }

    /// Free-text search straight through to the provider. Results are
    /// not persisted.
    pub async fn search_news(&self, query: &str) -> Result<Vec<NewsApiArticle>> {
        let provider = self.provider()?;
        Ok(provider.search_news(query, self.page_size, 1).await)
    }

    /// Scheduled entry point: re-ingest all categories for the home
    /// country, then drain a bounded number of unprocessed articles.
    /// Per-item failures are recorded and never stop the sweep.
    pub async fn run_scheduled_sweep(&self, secret: Option<&str>) -> Result<SweepReport> {
        if let Some(expected) = &self.sweep_secret {
            if secret != Some(expected.as_str()) {
                return Err(AppError::Unauthorized);
            }
        }

        let mut report = SweepReport::default();
        let country = self.home_country.clone();

        let mut categories = CATEGORIES.iter().peekable();
        while let Some(category) = categories.next() {
            match self.refresh_slice(category.slug, &country, SWEEP_PAGE_SIZE).await {
                Ok(articles) => report.fetched += articles.len(),
                Err(e) => report
                    .errors
                    .push(format!("fetch error for {}: {}", category.slug, e)),
            }

            if categories.peek().is_some() {
                tokio::time::sleep(SWEEP_FETCH_DELAY).await;
            }
        }

        match self.batch_extract_unprocessed(SWEEP_DRAIN_LIMIT).await {
            Ok(drain) => {
                report.processed = drain.processed;
                report.errors.extend(drain.errors);
            }
            Err(e) => report.errors.push(format!("drain error: {}", e)),
        }

        Ok(report)
    }

    /// Extract facts for one article on demand, repairing truncated
    /// content first. At most one extraction runs per article id.
    pub async fn extract_article(&self, id: i64) -> Result<ExtractOutcome> {
        let _guard = InflightRegistry::try_acquire(&self.inflight, id)
            .ok_or(AppError::ExtractionBusy(id))?;

        let article = self
            .repository
            .get_by_id(id)
            .await?
            .ok_or(AppError::ArticleNotFound(id))?;

        self.process_article(&article).await
    }

    /// Drain up to `limit` unprocessed articles sequentially, pacing
    /// between items. Partial success is the normal outcome.
    pub async fn batch_extract_unprocessed(&self, limit: u32) -> Result<DrainReport> {
        self.extractor()?;

        let articles = match self.repository.get_unprocessed(limit).await {
            Ok(articles) => articles,
            Err(e) => {
                tracing::error!("Failed to load unprocessed articles: {}", e);
                Vec::new()
            }
        };

        let mut report = DrainReport {
            total: articles.len(),
            ..Default::default()
        };

        let mut queue = articles.into_iter().peekable();
        while let Some(article) = queue.next() {
            let id = article.id;
            let outcome = match InflightRegistry::try_acquire(&self.inflight, id) {
                Some(_guard) => self.process_article(&article).await,
                None => Err(AppError::ExtractionBusy(id)),
            };

            match outcome {
                Ok(_) => report.processed += 1,
                Err(e) => report
                    .errors
                    .push(format!("error processing article {}: {}", id, e)),
            }

            if queue.peek().is_some() {
                tokio::time::sleep(DRAIN_ARTICLE_DELAY).await;
            }
        }

        Ok(report)
    }

    /// Delete and re-fetch one category/country slice, storing whatever
    /// the provider returned.
    async fn refresh_slice(
        &self,
        category: &str,
        country: &str,
        page_size: u32,
    ) -> Result<Vec<Article>> {
        let provider = self.provider()?;

        if let Err(e) = self.repository.delete_by_category_country(category, country).await {
            tracing::warn!("Failed to delete stale {}/{} slice: {}", category, country, e);
        }

        let raw = provider.fetch_headlines(category, country, page_size, 1).await;

        let mut saved = Vec::new();
        for article in &raw {
            match self
                .repository
                .upsert_by_url(transform_to_article(article, category, country))
                .await
            {
                Ok(article) => saved.push(article),
                Err(e) => tracing::warn!("Failed to save article {}: {}", article.url, e),
            }
        }

        Ok(saved)
    }

    /// Per-article pipeline shared by on-demand extraction and draining.
    async fn process_article(&self, article: &Article) -> Result<ExtractOutcome> {
        // Cache hit: never re-invoke the model for an article that already
        // has its facts.
        if article.processed {
            if let Some(facts) = article.facts_only.as_ref().filter(|f| !f.is_empty()) {
                return Ok(ExtractOutcome {
                    facts: facts.clone(),
                    was_cached: true,
                });
            }
        }

        let extractor = self.extractor()?;

        let mut content = article.original_content.clone();
        let needs_repair = content.as_deref().map(needs_backfill).unwrap_or(true);
        if needs_repair {
            if let Some(repaired) = self.backfill_content(article).await {
                content = Some(repaired);
            }
        }

        // Extraction always has some input: repaired or stored content,
        // else the bare title.
        let source_text = content.unwrap_or_else(|| article.title.clone());

        let facts = extractor.extract_facts(&source_text).await?;

        if !self.repository.update_facts(article.id, facts.clone()).await? {
            return Err(anyhow::anyhow!(
                "failed to save extracted facts for article {}",
                article.id
            )
            .into());
        }

        Ok(ExtractOutcome {
            facts,
            was_cached: false,
        })
    }

    /// Fetch the full article body and persist it, resetting the
    /// extraction state. Returns `None` on any failure so the caller
    /// falls back to the content it already has.
    async fn backfill_content(&self, article: &Article) -> Option<String> {
        let fetcher = &self.content_fetcher;
        let fetched = self
            .retry
            .run("content backfill", || {
                fetcher.fetch_full_content(&article.url)
            })
            .await;

        match fetched {
            Ok(Some(content)) => {
                match self.repository.replace_content(article.id, content.clone()).await {
                    Ok(true) => Some(content),
                    Ok(false) => {
                        tracing::warn!("Article {} vanished during backfill", article.id);
                        Some(content)
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Failed to persist backfilled content for article {}: {}",
                            article.id,
                            e
                        );
                        None
                    }
                }
            }
            Ok(None) => {
                tracing::debug!("No usable full content at {}", article.url);
                None
            }
            Err(e) => {
                tracing::warn!("Content backfill failed for {}: {}", article.url, e);
                None
            }
        }
    }

    fn provider(&self) -> Result<&NewsApiClient> {
        self.provider
            .as_ref()
            .ok_or_else(|| AppError::Config("news_api_key is not configured".to_string()))
    }

    fn extractor(&self) -> Result<&FactExtractor> {
        self.extractor
            .as_ref()
            .ok_or_else(|| AppError::Config("anthropic_api_key is not configured".to_string()))
    }
}

/// Stale when the freshest write in the slice is at least the staleness
/// window old. An empty slice is always stale.
fn is_stale(articles: &[Article], now: DateTime<Utc>) -> bool {
    let Some(freshest) = articles.iter().map(|a| a.created_at).max() else {
        return true;
    };
    now - freshest >= chrono::Duration::hours(STALE_AFTER_HOURS)
}

/// Tracks article ids with an extraction in flight, so concurrent
/// requests for the same id cannot double-call the model.
#[derive(Default)]
struct InflightRegistry {
    ids: Mutex<HashSet<i64>>,
}

impl InflightRegistry {
    fn try_acquire(registry: &Arc<Self>, id: i64) -> Option<InflightGuard> {
        let mut ids = registry.ids.lock().expect("inflight registry poisoned");
        if ids.insert(id) {
            Some(InflightGuard {
                registry: Arc::clone(registry),
                id,
            })
        } else {
            None
        }
    }
}

struct InflightGuard {
    registry: Arc<InflightRegistry>,
    id: i64,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.registry
            .ids
            .lock()
            .expect("inflight registry poisoned")
            .remove(&self.id);
    }
}
