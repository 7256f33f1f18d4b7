use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{Article, NewArticle};

use super::schema::SCHEMA;

const ARTICLE_COLUMNS: &str = "id, source_name, author, title, original_content, facts_only, \
                               url, image_url, published_at, category, country, processed, created_at";

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Insert an article, or update the existing row with the same URL.
    /// A colliding URL counts as a refresh: content, classification and
    /// `created_at` are replaced, and the extraction state is reset so
    /// facts are never served against content they were not derived from.
    pub async fn upsert_by_url(&self, article: NewArticle) -> Result<Article> {
        let saved = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO articles (source_name, author, title, original_content, facts_only,
                                             url, image_url, published_at, category, country, processed)
                       VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7, ?8, ?9, 0)
                       ON CONFLICT(url) DO UPDATE SET
                           source_name = excluded.source_name,
                           author = excluded.author,
                           title = excluded.title,
                           original_content = excluded.original_content,
                           facts_only = NULL,
                           image_url = excluded.image_url,
                           published_at = excluded.published_at,
                           category = excluded.category,
                           country = excluded.country,
                           processed = 0,
                           created_at = datetime('now')"#,
                    params![
                        article.source_name,
                        article.author,
                        article.title,
                        article.original_content,
                        article.url,
                        article.image_url,
                        article.published_at.map(|dt| dt.to_rfc3339()),
                        article.category,
                        article.country,
                    ],
                )?;

                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles WHERE url = ?1"
                ))?;
                let saved = stmt.query_row(params![article.url], |row| Ok(article_from_row(row)))?;
                Ok(saved)
            })
            .await?;
        Ok(saved)
    }

    pub async fn get_by_category_country(
        &self,
        category: &str,
        country: &str,
        limit: u32,
    ) -> Result<Vec<Article>> {
        let category = category.to_string();
        let country = country.to_string();
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles
                     WHERE category = ?1 AND country = ?2
                     ORDER BY published_at DESC NULLS LAST
                     LIMIT ?3"
                ))?;
                let articles = stmt
                    .query_map(params![category, country, limit], |row| {
                        Ok(article_from_row(row))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    /// Delete the whole slice for a category/country pair, returning the
    /// number of rows removed. Articles are never deleted individually.
    pub async fn delete_by_category_country(&self, category: &str, country: &str) -> Result<usize> {
        let category = category.to_string();
        let country = country.to_string();
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM articles WHERE category = ?1 AND country = ?2",
                    params![category, country],
                )?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        let article = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?1"
                ))?;
                let article = stmt
                    .query_row(params![id], |row| Ok(article_from_row(row)))
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    /// Store extracted facts. Sets `processed` in the same statement so
    /// the flag can never be observed without the facts it refers to.
    pub async fn update_facts(&self, id: i64, facts: String) -> Result<bool> {
        let updated = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE articles SET facts_only = ?1, processed = 1 WHERE id = ?2",
                    params![facts, id],
                )?;
                Ok(updated > 0)
            })
            .await?;
        Ok(updated)
    }

    /// Replace truncated content with the full article body and reset the
    /// extraction state, so a summary generated from partial text never
    /// outlives the text it was derived from.
    pub async fn replace_content(&self, id: i64, content: String) -> Result<bool> {
        let updated = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE articles SET original_content = ?1, processed = 0, facts_only = NULL
                     WHERE id = ?2",
                    params![content, id],
                )?;
                Ok(updated > 0)
            })
            .await?;
        Ok(updated)
    }

    pub async fn get_unprocessed(&self, limit: u32) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles
                     WHERE processed = 0
                     ORDER BY published_at DESC NULLS LAST
                     LIMIT ?1"
                ))?;
                let articles = stmt
                    .query_map(params![limit], |row| Ok(article_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn article_from_row(row: &Row) -> Article {
    Article {
        id: row.get(0).unwrap(),
        source_name: row.get(1).unwrap(),
        author: row.get(2).unwrap(),
        title: row.get(3).unwrap(),
        original_content: row.get(4).unwrap(),
        facts_only: row.get(5).unwrap(),
        url: row.get(6).unwrap(),
        image_url: row.get(7).unwrap(),
        published_at: row
            .get::<_, Option<String>>(8)
            .unwrap()
            .and_then(|s| parse_datetime(&s)),
        category: row.get(9).unwrap(),
        country: row.get(10).unwrap(),
        processed: row.get::<_, i64>(11).unwrap() != 0,
        created_at: row
            .get::<_, String>(12)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_repository() -> (Repository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let repo = Repository::new(db_path.to_str().unwrap()).await.unwrap();
        (repo, dir)
    }

    fn new_article(url: &str, title: &str) -> NewArticle {
        NewArticle {
            source_name: "Test Source".to_string(),
            author: Some("Jo Writer".to_string()),
            title: title.to_string(),
            original_content: Some("Some article body text".to_string()),
            url: url.to_string(),
            image_url: None,
            published_at: Some(Utc::now()),
            category: "general".to_string(),
            country: "us".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_same_url_keeps_one_row() {
        let (repo, _dir) = test_repository().await;

        let first = repo
            .upsert_by_url(new_article("https://example.com/a", "First title"))
            .await
            .unwrap();
        let second = repo
            .upsert_by_url(new_article("https://example.com/a", "Second title"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.title, "Second title");

        let all = repo.get_by_category_country("general", "us", 20).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Second title");
    }

    #[tokio::test]
    async fn upsert_refresh_resets_extraction_state() {
        let (repo, _dir) = test_repository().await;

        let article = repo
            .upsert_by_url(new_article("https://example.com/a", "Title"))
            .await
            .unwrap();
        assert!(repo
            .update_facts(article.id, "Neutral summary.".to_string())
            .await
            .unwrap());

        let refreshed = repo
            .upsert_by_url(new_article("https://example.com/a", "Title"))
            .await
            .unwrap();
        assert!(!refreshed.processed);
        assert!(refreshed.facts_only.is_none());
    }

    #[tokio::test]
    async fn update_facts_sets_processed() {
        let (repo, _dir) = test_repository().await;

        let article = repo
            .upsert_by_url(new_article("https://example.com/a", "Title"))
            .await
            .unwrap();
        assert!(!article.processed);

        assert!(repo
            .update_facts(article.id, "Neutral summary.".to_string())
            .await
            .unwrap());

        let stored = repo.get_by_id(article.id).await.unwrap().unwrap();
        assert!(stored.processed);
        assert_eq!(stored.facts_only.as_deref(), Some("Neutral summary."));
    }

    #[tokio::test]
    async fn update_facts_for_missing_article_reports_failure() {
        let (repo, _dir) = test_repository().await;
        assert!(!repo.update_facts(999, "facts".to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn replace_content_resets_extraction_state() {
        let (repo, _dir) = test_repository().await;

        let mut article = new_article("https://example.com/a", "Title");
        article.original_content = Some("Short stub... [+1200 chars]".to_string());
        let article = repo.upsert_by_url(article).await.unwrap();
        repo.update_facts(article.id, "Stale facts.".to_string())
            .await
            .unwrap();

        assert!(repo
            .replace_content(article.id, "The complete article body.".to_string())
            .await
            .unwrap());

        let stored = repo.get_by_id(article.id).await.unwrap().unwrap();
        assert!(!stored.processed);
        assert!(stored.facts_only.is_none());
        assert_eq!(
            stored.original_content.as_deref(),
            Some("The complete article body.")
        );
    }

    #[tokio::test]
    async fn unprocessed_excludes_processed_articles() {
        let (repo, _dir) = test_repository().await;

        let done = repo
            .upsert_by_url(new_article("https://example.com/a", "Done"))
            .await
            .unwrap();
        repo.upsert_by_url(new_article("https://example.com/b", "Pending"))
            .await
            .unwrap();
        repo.update_facts(done.id, "facts".to_string()).await.unwrap();

        let unprocessed = repo.get_unprocessed(10).await.unwrap();
        assert_eq!(unprocessed.len(), 1);
        assert_eq!(unprocessed[0].title, "Pending");
    }

    #[tokio::test]
    async fn delete_scopes_to_category_and_country() {
        let (repo, _dir) = test_repository().await;

        repo.upsert_by_url(new_article("https://example.com/a", "US general"))
            .await
            .unwrap();
        let mut other = new_article("https://example.com/b", "GB general");
        other.country = "gb".to_string();
        repo.upsert_by_url(other).await.unwrap();

        let deleted = repo.delete_by_category_country("general", "us").await.unwrap();
        assert_eq!(deleted, 1);

        assert!(repo
            .get_by_category_country("general", "us", 20)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            repo.get_by_category_country("general", "gb", 20)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
