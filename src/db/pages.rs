//! Fetched page operations.

use crate::{Error, Result};

use super::{Database, NewPage, Page};

impl Database {
    /// Insert a fetched page
    ///
    /// Returns the id of the new row.
    pub async fn insert_page(&self, page: &NewPage) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO pages (name, url, size, status, error, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&page.name)
        .bind(&page.url)
        .bind(page.size)
        .bind(page.status)
        .bind(&page.error)
        .bind(page.fetched_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(result.last_insert_rowid())
    }

    /// List pages, newest first
    pub async fn list_pages(&self, limit: usize, offset: usize) -> Result<Vec<Page>> {
        let rows = sqlx::query_as::<_, Page>(
            r#"
            SELECT id, name, url, size, status, error, fetched_at
            FROM pages
            ORDER BY fetched_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(rows)
    }

    /// Get a page by id
    pub async fn get_page(&self, id: i64) -> Result<Option<Page>> {
        let row = sqlx::query_as::<_, Page>(
            "SELECT id, name, url, size, status, error, fetched_at FROM pages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(row)
    }

    /// Count stored pages, optionally only failed ones
    pub async fn count_pages(&self, failed_only: bool) -> Result<i64> {
        let sql = if failed_only {
            "SELECT COUNT(*) FROM pages WHERE error IS NOT NULL"
        } else {
            "SELECT COUNT(*) FROM pages"
        };

        let count = sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(count)
    }
}
