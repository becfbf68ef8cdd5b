//! Song matching library - shared modules for all binaries.
//!
//! Resolves loosely written song references against a music catalog:
//! normalize, search with several query variants, score the candidates,
//! then accept, reject or ask a human.

pub mod catalog;
pub mod config;
pub mod decision;
pub mod error;
pub mod fuzzy;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod review;
pub mod safety;
pub mod scoring;
pub mod search;
pub mod session;
pub mod spotify;

pub use catalog::{Catalog, FixtureCatalog, SharedCatalog};
pub use config::{ConfigBuilder, ConfigLayer, MatchConfig};
pub use error::{CatalogError, MatchError};
pub use models::{CandidateRecord, Decision, FavoriteStatus, Outcome, SkipPolicy, SongReference, Summary};
pub use pipeline::{BatchReport, Matcher};
