//! Streaming client for very large Wikimedia data dumps.
//!
//! This crate downloads (or opens), decompresses, tokenizes, and decodes
//! Wikimedia dump files and hands every record to a caller-supplied handler
//! as a strongly typed value — without ever buffering a dump in memory or
//! requiring it on disk first. Supported dumps:
//!
//! - **Wikidata entities** (JSON array, BZIP2) → [`Entity`]
//! - **Commons MediaInfo entities** (JSON array, BZIP2) → [`Entity`]
//! - **Wikipedia Enterprise HTML articles** (NDJSON in TAR, GZIP) → [`Article`]
//! - **SQL `image` table dumps** (MySQL dump subset, GZIP) → value maps,
//!   with [`decode_image_metadata`] for the PHP-serialized metadata column
//!
//! # Architecture
//!
//! Everything runs through one generic pipeline
//! ([`process`]) with three stages connected by bounded channels:
//!
//! 1. **Acquire + tokenize** (single thread) — open a local file or stream
//!    an HTTP download (optionally persisting it while it is consumed),
//!    decompress on a dedicated thread, and split the stream into raw
//!    records
//! 2. **Decode** (worker pool) — strict JSON decoding into the target type,
//!    or SQL statement parsing with a shared write-once column list
//! 3. **Handle** (worker pool) — the caller's handler
//!
//! Backpressure comes from the bounded channels: a slow handler throttles
//! decoding and, through it, the download itself. Memory stays proportional
//! to the worker counts times the record size. The first error (or a
//! [`Cancel`] trip) drains the pipeline promptly; partially persisted
//! downloads are deleted.
//!
//! # Example
//!
//! ```no_run
//! use mediawiki_dumps::{process_wikidata_dump, Cancel, DumpConfig};
//!
//! fn main() -> mediawiki_dumps::Result<()> {
//!     let client = reqwest::blocking::Client::builder()
//!         .user_agent("my-bot/0.1 (user@example.com)")
//!         .build()
//!         .expect("client");
//!     let cancel = Cancel::new();
//!     process_wikidata_dump(
//!         &cancel,
//!         DumpConfig {
//!             client: Some(client),
//!             cache_dir: Some("dumps".into()),
//!             ..DumpConfig::default()
//!         },
//!         |_cancel, entity| {
//!             println!("{} ({:?})", entity.id, entity.entity_type);
//!             Ok(())
//!         },
//!     )
//! }
//! ```
//!
//! Callers must inject a [`reqwest::blocking::Client`] carrying a
//! descriptive `User-Agent`, per Wikimedia's bot policy.

pub mod article;
pub mod cancel;
pub mod commons;
pub mod config;
pub mod datavalue;
pub mod decompress;
pub mod entity;
pub mod errors;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod tokenize;
pub mod wikidata;
pub mod wikipedia;

mod php;
mod runs;
mod sql;
mod text;

pub use article::{Article, ArticleBody, InfoBox, Version};
pub use cancel::Cancel;
pub use commons::{
    decode_image_metadata, latest_commons_entities_run, latest_commons_image_metadata_run,
    process_commons_entities_dump, LATEST_COMMONS_MEDIAINFO_URL,
};
pub use datavalue::{
    Amount, CalendarModel, DataValue, GlobeCoordinateValue, MonolingualTextValue, QuantityValue,
    Time, TimePrecision, TimeValue, WikiBaseEntityIdValue, WikiBaseEntityType,
};
pub use decompress::Compression;
pub use entity::{
    DataType, Entity, EntityType, LanguageValue, Reference, SiteLink, Snak, SnakType, Statement,
    StatementRank, StatementType,
};
pub use errors::{Error, Result};
pub use pipeline::{process, DumpConfig, ProcessConfig};
pub use progress::{Progress, ProgressFn};
pub use source::{CacheConfig, CacheNaming, SourceConfig};
pub use tokenize::FileType;
pub use wikidata::{
    latest_wikidata_entities_run, process_wikidata_dump, LATEST_WIKIDATA_ENTITIES_URL,
};
pub use wikipedia::{
    latest_wikipedia_image_metadata_run, latest_wikipedia_run, process_wikipedia_dump,
};
