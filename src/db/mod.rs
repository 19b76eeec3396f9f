//! Database layer for hiperfetch
//!
//! Handles SQLite persistence of fetched pages.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`pages`] — Fetched page inserts and queries

use sqlx::{FromRow, sqlite::SqlitePool};

mod migrations;
mod pages;

/// New fetched page to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewPage {
    /// Row name (the URL or the body, depending on configuration)
    pub name: String,
    /// Source URL
    pub url: String,
    /// Body size in bytes
    pub size: i64,
    /// HTTP status, if a response was received
    pub status: Option<i64>,
    /// Error message if the transfer failed
    pub error: Option<String>,
    /// Unix timestamp when the transfer completed
    pub fetched_at: i64,
}

/// Fetched page record from database
#[derive(Debug, Clone, FromRow)]
pub struct Page {
    /// Unique database ID
    pub id: i64,
    /// Row name (the URL or the body, depending on configuration)
    pub name: String,
    /// Source URL
    pub url: String,
    /// Body size in bytes
    pub size: i64,
    /// HTTP status, if a response was received
    pub status: Option<i64>,
    /// Error message if the transfer failed
    pub error: Option<String>,
    /// Unix timestamp when the transfer completed
    pub fetched_at: i64,
}

impl Page {
    /// True when the transfer completed without an error
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Database handle for hiperfetch
pub struct Database {
    pool: SqlitePool,
}
