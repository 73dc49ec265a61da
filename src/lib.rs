pub mod chains;
pub mod config;
pub mod detector;
pub mod findings;
pub mod ingest;
pub mod price;
pub mod provider;
