pub mod article;
pub mod build;
pub mod index;
