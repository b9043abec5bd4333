//! ClickHouse access for ch-sync.
//!
//! Queries go through the HTTP interface and come back as
//! `JSONCompactEachRowWithNamesAndTypes`, which carries column types alongside
//! the values so rows can be decoded without a separate schema lookup.

pub mod client;
pub mod decode;

pub use client::{ClickHouseConfig, ClickHouseSource, TableRows};
