// src/lib.rs

//! Catalog Watch Library
//!
//! Crawls a paginated catalog, detects listings that were not seen before,
//! keeps a bounded history and notifies about what is new.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod testing;
