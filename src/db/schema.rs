pub const SCHEMA: &str = r#"
-- articles table
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_name TEXT NOT NULL,
    author TEXT,
    title TEXT NOT NULL,
    original_content TEXT,
    facts_only TEXT,
    url TEXT NOT NULL UNIQUE,
    image_url TEXT,
    published_at TEXT,
    category TEXT NOT NULL,
    country TEXT NOT NULL,
    processed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_articles_category_country ON articles(category, country);
CREATE INDEX IF NOT EXISTS idx_articles_published_at ON articles(published_at DESC);
CREATE INDEX IF NOT EXISTS idx_articles_processed ON articles(processed);
"#;
