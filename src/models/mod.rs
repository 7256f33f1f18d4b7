mod article;
mod catalog;

pub use article::{Article, NewArticle};
pub use catalog::{country_name, Category, Country, CATEGORIES, COUNTRIES};
