//! # DataStore Module
//!
//! This module provides functionality for interacting with a PostgreSQL database
//! to archive finished video summarization jobs and read them back for the
//! results view and the job history.
//!
//! The module uses sqlx for database operations and provides an abstraction layer
//! so the pipeline can be exercised against an in-memory store in tests.

mod datastore;
mod domain;

pub use datastore::postgres::PgDataStore;
pub use datastore::DataStore;
pub use domain::{ArchivedJob, JobSummary, StageTimings, TranscriptSegment, VideoMetadata};
