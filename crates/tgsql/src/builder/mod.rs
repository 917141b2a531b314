//! Fluent per-table query builder.
//!
//! A [`QueryBuilder`] is obtained from a [`ConnectionHandle`], the
//! [`Registry`](crate::Registry) or a [`Transaction`]. Modifiers take the
//! builder by value and return it, so a partially built query can be cloned
//! and reused as a template. Exactly one terminal operation (insert, update,
//! delete, count, find-one, select, ...) consumes it and runs one statement.
//!
//! ```ignore
//! let adults: Vec<User> = registry
//!     .table("users")
//!     .await?
//!     .where_("age", ">=", 18i32)
//!     .where_in("status", ["active", "trial"])
//!     .order("id")
//!     .page(2, 20)
//!     .select()
//!     .await?;
//! ```
//!
//! Placeholders are numbered when the statement is compiled, so the
//! parameter list always matches them in number and position.

mod clause;
mod options;
mod read;
mod write;


pub use clause::{Direction, JoinType, LockMode};
pub use options::{
    CountOptions, DecrementOptions, DeleteOptions, FindOneOptions, IncrementOptions,
    InsertManyOptions, InsertOptions, ReadOptions, SelectOptions, UpdateOptions,
};

use crate::client::GenericClient;
use crate::config::DataSource;
use crate::debug;
use crate::error::{DbError, DbResult};
use crate::param::{BindValue, Param, ParamList};
use crate::registry::ConnectionHandle;
use crate::transaction::Transaction;
use clause::{Condition, Connective, Predicates, Tail, normalize_op};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// Where a builder sends its statement.
#[derive(Clone, Debug)]
pub(crate) enum Target<'t> {
    /// Auto-committed on a connection borrowed from the pool.
    Pool(ConnectionHandle),
    /// Inside an open transaction.
    Tx(&'t Transaction),
}

impl Target<'_> {
    fn source(&self) -> &DataSource {
        match self {
            Target::Pool(handle) => handle.source(),
            Target::Tx(tx) => tx.source(),
        }
    }
}

impl GenericClient for Target<'_> {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<Vec<Row>> {
        match self {
            Target::Pool(handle) => GenericClient::query(handle, sql, params).await,
            Target::Tx(tx) => GenericClient::query(*tx, sql, params).await,
        }
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<u64> {
        match self {
            Target::Pool(handle) => GenericClient::execute(handle, sql, params).await,
            Target::Tx(tx) => GenericClient::execute(*tx, sql, params).await,
        }
    }
}

/// Soft-delete filtering applied to reads.
#[derive(Clone, Debug, Default)]
enum Deleted {
    /// Only rows whose delete column is NULL.
    #[default]
    Exclude,
    /// Every row; the named column (or the configured one) is not filtered.
    Include(Option<String>),
}

/// Per-table statement builder.
///
/// The lifetime ties a transaction-bound builder to its [`Transaction`];
/// builders from a pool are `QueryBuilder<'static>`.
#[derive(Clone, Debug)]
pub struct QueryBuilder<'t> {
    target: Target<'t>,
    table: String,
    fields: String,
    distinct: bool,
    joins: Vec<String>,
    predicates: Predicates,
    tail: Vec<Tail>,
    lock: Option<LockMode>,
    deleted: Deleted,
    /// First invalid modifier; reported by the terminal call.
    build_error: Option<String>,
}

impl QueryBuilder<'static> {
    pub(crate) fn on_pool(table: &str, handle: ConnectionHandle) -> Self {
        Self::new(table, Target::Pool(handle))
    }
}

impl<'t> QueryBuilder<'t> {
    pub(crate) fn on_transaction(table: &str, tx: &'t Transaction) -> Self {
        Self::new(table, Target::Tx(tx))
    }

    fn new(table: &str, target: Target<'t>) -> Self {
        Self {
            target,
            table: table.to_string(),
            fields: "*".to_string(),
            distinct: false,
            joins: Vec::new(),
            predicates: Predicates::default(),
            tail: Vec::new(),
            lock: None,
            deleted: Deleted::Exclude,
            build_error: None,
        }
    }

    /// Table this builder targets.
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Whether statements run inside a transaction.
    pub fn in_transaction(&self) -> bool {
        matches!(self.target, Target::Tx(_))
    }

    /// Data source statements run against.
    pub fn source(&self) -> &DataSource {
        self.target.source()
    }

    // ==================== Projection ====================

    /// Set the projection, e.g. `"id, name"`.
    pub fn field(mut self, fields: &str) -> Self {
        self.fields = fields.trim().to_string();
        self
    }

    /// Set the projection and select distinct rows.
    pub fn field_distinct(mut self, fields: &str) -> Self {
        let fields = fields.trim();
        let fields = match fields.get(..9) {
            Some(head) if head.eq_ignore_ascii_case("distinct ") => fields[9..].trim_start(),
            _ => fields,
        };
        self.fields = fields.to_string();
        self.distinct = true;
        self
    }

    // ==================== Joins ====================

    /// `LEFT JOIN table ON on`.
    pub fn join(self, table: &str, on: &str) -> Self {
        self.join_with(table, on, JoinType::Left)
    }

    pub fn join_with(mut self, table: &str, on: &str, kind: JoinType) -> Self {
        self.joins.push(format!(" {} JOIN {table} ON {on}", kind.as_sql()));
        self
    }

    // ==================== WHERE ====================

    fn compare<T: BindValue>(
        mut self,
        connective: Connective,
        field: &str,
        op: &str,
        value: T,
    ) -> Self {
        match normalize_op(op) {
            Some(op) => self.predicates.push(
                connective,
                Condition::Compare {
                    column: field.to_string(),
                    op,
                    value: Param::new(value),
                },
            ),
            None => {
                if self.build_error.is_none() {
                    self.build_error = Some(format!("unsupported operator '{op}' on {field}"));
                }
            }
        }
        self
    }

    /// `field op value`. The first predicate opens the WHERE clause; later ones
    /// are joined with AND.
    pub fn where_<T: BindValue>(self, field: &str, op: &str, value: T) -> Self {
        self.compare(Connective::And, field, op, value)
    }

    /// `AND field op value`.
    pub fn where_and<T: BindValue>(self, field: &str, op: &str, value: T) -> Self {
        self.compare(Connective::And, field, op, value)
    }

    /// `OR field op value`.
    pub fn where_or<T: BindValue>(self, field: &str, op: &str, value: T) -> Self {
        self.compare(Connective::Or, field, op, value)
    }

    /// `field IN ($1, $2, ...)`, one placeholder per value. An empty list
    /// matches no rows.
    pub fn where_in<T, I>(mut self, field: &str, values: I) -> Self
    where
        T: BindValue,
        I: IntoIterator<Item = T>,
    {
        let values = values.into_iter().map(Param::new).collect();
        self.predicates.push(
            Connective::And,
            Condition::In {
                column: field.to_string(),
                values,
            },
        );
        self
    }

    /// `field LIKE pattern`.
    pub fn where_like<T: BindValue>(self, field: &str, pattern: T) -> Self {
        self.compare(Connective::And, field, "LIKE", pattern)
    }

    /// `field BETWEEN start AND end`.
    pub fn where_between<T: BindValue>(mut self, field: &str, start: T, end: T) -> Self {
        self.predicates.push(
            Connective::And,
            Condition::Between {
                column: field.to_string(),
                start: Param::new(start),
                end: Param::new(end),
            },
        );
        self
    }

    pub fn where_is_null(mut self, field: &str) -> Self {
        self.predicates.push(
            Connective::And,
            Condition::Null {
                column: field.to_string(),
                negated: false,
            },
        );
        self
    }

    pub fn where_is_not_null(mut self, field: &str) -> Self {
        self.predicates.push(
            Connective::And,
            Condition::Null {
                column: field.to_string(),
                negated: true,
            },
        );
        self
    }

    // ==================== Trailing clauses ====================

    /// `GROUP BY field`.
    pub fn group(mut self, field: &str) -> Self {
        self.tail.push(Tail::Group(field.to_string()));
        self
    }

    /// `ORDER BY field DESC`.
    pub fn order(self, field: &str) -> Self {
        self.order_by(field, Direction::Desc)
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.tail.push(Tail::Order(field.to_string(), direction));
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.tail.push(Tail::Limit(n));
        self
    }

    /// One-based page of `size` rows: `LIMIT size OFFSET (page - 1) * size`.
    ///
    /// Page 0 is treated as page 1.
    pub fn page(mut self, page: u64, size: u64) -> Self {
        let offset = page.saturating_sub(1).saturating_mul(size);
        self.tail.push(Tail::Page { offset, size });
        self
    }

    // ==================== Locking ====================

    /// `FOR UPDATE` on find-one and select.
    pub fn lock(self) -> Self {
        self.lock_mode(LockMode::Update)
    }

    pub fn lock_mode(mut self, mode: LockMode) -> Self {
        if !self.in_transaction() {
            tracing::warn!(
                table = %self.table,
                mode = mode.as_sql(),
                "row lock outside a transaction is released when the statement ends"
            );
        }
        self.lock = Some(mode);
        self
    }

    // ==================== Soft delete ====================

    /// Read deleted rows too: no `delete_time IS NULL` filter is added and an
    /// explicit one is removed.
    pub fn all_including_deleted(mut self) -> Self {
        self.deleted = Deleted::Include(None);
        self
    }

    /// Like [`all_including_deleted`](Self::all_including_deleted) for a
    /// specific soft-delete column.
    pub fn all_including_deleted_by(mut self, field: &str) -> Self {
        self.deleted = Deleted::Include(Some(field.to_string()));
        self
    }

    // ==================== Inspection ====================

    /// The SELECT this builder would run, with `$n` placeholders.
    pub fn to_sql(&self) -> DbResult<String> {
        Ok(self.compile_select(&self.source().delete_time, false)?.0)
    }

    /// The SELECT this builder would run with parameters inlined as literals.
    ///
    /// For logs only; never execute the result.
    pub fn to_debug_sql(&self) -> DbResult<String> {
        let (sql, params) = self.compile_select(&self.source().delete_time, false)?;
        Ok(debug::format_sql(&sql, &params))
    }

    // ==================== Internals ====================

    fn check_build(&self) -> DbResult<()> {
        match &self.build_error {
            Some(message) => Err(DbError::validation(message.clone())),
            None => Ok(()),
        }
    }

    async fn run_execute(self, sql: String, params: ParamList, echo: bool) -> DbResult<u64> {
        debug::echo(echo, &self.table, &sql, &params);
        self.target.execute(&sql, &params.as_refs()).await
    }

    async fn run_query(self, sql: String, params: ParamList, echo: bool) -> DbResult<Vec<Row>> {
        debug::echo(echo, &self.table, &sql, &params);
        self.target.query(&sql, &params.as_refs()).await
    }

    async fn run_query_one(self, sql: String, params: ParamList, echo: bool) -> DbResult<Row> {
        debug::echo(echo, &self.table, &sql, &params);
        self.target.query_one(&sql, &params.as_refs()).await
    }

    async fn run_query_opt(
        self,
        sql: String,
        params: ParamList,
        echo: bool,
    ) -> DbResult<Option<Row>> {
        debug::echo(echo, &self.table, &sql, &params);
        self.target.query_opt(&sql, &params.as_refs()).await
    }
}

/// Apply the usual paging defaults: page 0 becomes 1 and size 0 becomes 10.
pub fn normalize_page(page: u64, size: u64) -> (u64, u64) {
    (page.max(1), if size == 0 { 10 } else { size })
}
