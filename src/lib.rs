pub mod app;
pub mod config;
pub mod embed;
pub mod similarity;
pub mod store;
