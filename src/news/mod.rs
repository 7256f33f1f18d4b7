mod provider;

pub use provider::{transform_to_article, NewsApiArticle, NewsApiClient};
