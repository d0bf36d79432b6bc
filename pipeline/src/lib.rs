//! # Transit Pipeline
//!
//! Light-curve ingestion and periodic transit search.
//!
//! The crate takes a batch of stellar identifiers through five stages, each of
//! which reads the artifacts written by the previous one and writes artifacts
//! for the next:
//!
//! ```text
//! catalog ──► acquisition ──► preprocessing ──► detection ──► publishing
//!  ids.txt      ID.fits      ID_processed.fits   ID_processed_     metrics png,
//!                            ID_processed.png    results.json      object store,
//!                                                                  metadata store
//! ```
//!
//! ## Architecture
//!
//! - [`api`]: Domain types shared by every stage (identifiers, series, candidates)
//! - [`config`]: The single validated configuration document for a run
//! - [`artifacts`]: Deterministic identifier → artifact path layout
//! - [`fits`]: FITS binary-table reading and writing
//! - [`render`]: PNG previews and metrics charts
//! - [`algorithms`]: Box least squares periodic search
//! - [`services`]: The stage implementations and the run tracker
//! - [`clients`]: Catalog and light-curve providers
//! - [`storage`]: Object store sink
//! - [`db`]: Relational metadata sink (repository pattern)
//! - [`driver`]: Batch orchestration with per-item failure isolation
//! - [`logging`]: Console + file tracing setup for the binary

// Allow large error types - RepositoryError carries its context inline
#![allow(clippy::result_large_err)]

pub mod algorithms;
pub mod api;
pub mod artifacts;
pub mod checksum;
pub mod clients;
pub mod config;
pub mod db;
pub mod driver;
pub mod error;
pub mod fits;
pub mod logging;
pub mod render;
pub mod services;
pub mod storage;
