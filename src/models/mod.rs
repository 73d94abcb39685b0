// src/models/mod.rs

//! Domain models for the catalog watcher.
//!
//! This module contains the listing data structures and the application
//! configuration.

mod config;
mod record;

// Re-export all public types
pub use config::{
    Config, CrawlerConfig, ExtractorConfig, IdentityStrategy, IndexConfig, Lookback,
    NotifyConfig, PersistMode, SessionConfig, StorageConfig,
};
pub use record::{Listing, NO_IMAGE, Record, partition_for};
