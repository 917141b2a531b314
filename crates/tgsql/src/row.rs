//! Row mapping traits and utilities

use crate::error::{DbError, DbResult};
use tokio_postgres::Row;

/// Trait for converting a database row into a Rust struct.
///
/// This trait should typically be derived using `#[derive(FromRow)]`.
///
/// # Example
///
/// ```ignore
/// use tgsql::FromRow;
///
/// #[derive(FromRow)]
/// struct User {
///     id: i64,
///     name: String,
///     #[orm(column = "mail")]
///     email: Option<String>,
/// }
/// ```
pub trait FromRow: Sized {
    /// Convert a database row into Self
    fn from_row(row: &Row) -> DbResult<Self>;
}

/// Extension trait for Row to provide typed access
pub trait RowExt {
    /// Try to get a column value, returning [`DbError::Shape`] when the column
    /// is missing or its type does not match `T`.
    fn try_get_column<T>(&self, column: &str) -> DbResult<T>
    where
        T: for<'a> tokio_postgres::types::FromSql<'a>;
}

impl RowExt for Row {
    fn try_get_column<T>(&self, column: &str) -> DbResult<T>
    where
        T: for<'a> tokio_postgres::types::FromSql<'a>,
    {
        self.try_get(column)
            .map_err(|e| DbError::shape(column, e.to_string()))
    }
}
