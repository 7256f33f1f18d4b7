mod ai;
mod app;
mod config;
mod db;
mod error;
mod models;
mod news;
mod services;

use app::App;
use config::Config;
use error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let config = Config::load()?;
    let app = App::new(&config).await?;

    match args.get(1).map(String::as_str) {
        Some("news") => {
            let positional: Vec<&String> =
                args[2..].iter().filter(|a| !a.starts_with("--")).collect();
            let refresh = args[2..].iter().any(|a| a == "--refresh");
            let category = positional.first().map(|s| s.as_str()).unwrap_or("general");
            let country = positional
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or(config.home_country.as_str());

            let outcome = app
                .get_or_refresh_articles(category, country, refresh)
                .await?;
            println!(
                "{} articles for {}/{} ({})",
                outcome.articles.len(),
                category,
                country,
                if outcome.cached { "cached" } else { "fresh" }
            );
            for article in &outcome.articles {
                println!("  #{} [{}] {}", article.id, article.source_name, article.title);
            }
        }

        Some("search") => {
            let query = args[2..].join(" ");
            if query.is_empty() {
                return Err(anyhow::anyhow!("usage: factfeed search <query>").into());
            }
            let results = app.search_news(&query).await?;
            println!("{} results for {:?}", results.len(), query);
            for article in &results {
                println!(
                    "  [{}] {}",
                    article.source.name,
                    article.title.as_deref().unwrap_or("Untitled")
                );
            }
        }

        Some("refresh-all") => {
            let country = args
                .get(2)
                .map(String::as_str)
                .unwrap_or(config.home_country.as_str());
            let results = app.refresh_all_categories(country).await?;
            for (category, count) in &results {
                println!("{category}: {count} articles");
            }
        }

        Some("sweep") => {
            let report = app
                .run_scheduled_sweep(args.get(2).map(String::as_str))
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Some("extract") => {
            let id: i64 = args
                .get(2)
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| anyhow::anyhow!("usage: factfeed extract <article-id>"))?;
            let outcome = app.extract_article(id).await?;
            if outcome.was_cached {
                println!("(cached)");
            }
            println!("{}", outcome.facts);
        }

        Some("drain") => {
            let limit: u32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10);
            let report = app.batch_extract_unprocessed(limit).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        _ => {
            eprintln!("Usage: factfeed <command>");
            eprintln!();
            eprintln!("Commands:");
            eprintln!("  news [category] [country] [--refresh]   show or refresh a headline slice");
            eprintln!("  search <query>                          free-text search, not persisted");
            eprintln!("  refresh-all [country]                   re-ingest every category");
            eprintln!("  sweep [secret]                          scheduled fetch + drain pass");
            eprintln!("  extract <article-id>                    fact-extract one article");
            eprintln!("  drain [limit]                           fact-extract unprocessed articles");
            eprintln!();
            let categories = models::CATEGORIES
                .iter()
                .map(|c| format!("{} ({})", c.name, c.slug))
                .collect::<Vec<_>>()
                .join(", ");
            eprintln!("Categories: {categories}");
        }
    }

    Ok(())
}
