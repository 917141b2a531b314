//! Generic client trait for unified database access.

use crate::error::{DbError, DbResult};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// A trait that unifies pooled connections, pinned transactions and plain
/// `tokio_postgres` clients.
///
/// Builders execute through this trait, so the same terminal operation runs
/// auto-committed on a pool or inside a transaction.
pub trait GenericClient: Send + Sync {
    /// Execute a query and return all rows.
    fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = DbResult<Vec<Row>>> + Send;

    /// Execute a query and return the **first** row.
    ///
    /// Returns [`DbError::NotFound`] if no rows are returned.
    fn query_one(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = DbResult<Row>> + Send {
        async move {
            let rows = self.query(sql, params).await?;
            rows.into_iter()
                .next()
                .ok_or_else(|| DbError::not_found("Expected one row, got none"))
        }
    }

    /// Execute a query and return the first row, if any.
    fn query_opt(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = DbResult<Option<Row>>> + Send {
        async move {
            let rows = self.query(sql, params).await?;
            Ok(rows.into_iter().next())
        }
    }

    /// Execute a statement and return the number of affected rows.
    fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = DbResult<u64>> + Send;
}

impl GenericClient for tokio_postgres::Client {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<Vec<Row>> {
        tokio_postgres::Client::query(self, sql, params)
            .await
            .map_err(DbError::from_db_error)
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<u64> {
        tokio_postgres::Client::execute(self, sql, params)
            .await
            .map_err(DbError::from_db_error)
    }
}

// ===== deadpool-postgres support =====

impl GenericClient for deadpool_postgres::Client {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<Vec<Row>> {
        // Delegate to the deref target (ClientWrapper / tokio_postgres::Client).
        let client: &tokio_postgres::Client = self;
        GenericClient::query(client, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<u64> {
        let client: &tokio_postgres::Client = self;
        GenericClient::execute(client, sql, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Client returning no rows for every query.
    struct EmptyClient;

    impl GenericClient for EmptyClient {
        async fn query(&self, _sql: &str, _params: &[&(dyn ToSql + Sync)]) -> DbResult<Vec<Row>> {
            Ok(Vec::new())
        }

        async fn execute(&self, _sql: &str, _params: &[&(dyn ToSql + Sync)]) -> DbResult<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn query_one_without_rows_is_not_found() {
        let err = EmptyClient.query_one("SELECT 1", &[]).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn query_opt_without_rows_is_none() {
        assert!(EmptyClient.query_opt("SELECT 1", &[]).await.unwrap().is_none());
    }
}
