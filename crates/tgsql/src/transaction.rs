//! Connection-pinned transactions.
//!
//! A [`Transaction`] checks one connection out of the pool, issues `BEGIN` on
//! it and keeps it until [`commit`](Transaction::commit) or
//! [`rollback`](Transaction::rollback). Builders from
//! [`Transaction::table`] run every statement on that connection.
//!
//! ```ignore
//! let tx = registry.begin_transaction().await?;
//! tx.table("accounts").where_("id", "=", from).decrement("balance", 100i64).await?;
//! tx.table("accounts").where_("id", "=", to).increment("balance", 100i64).await?;
//! tx.commit().await?;
//! ```
//!
//! Or with the [`transaction!`](crate::transaction!) macro, which commits on
//! `Ok` and rolls back on `Err`.

use crate::builder::QueryBuilder;
use crate::client::GenericClient;
use crate::config::DataSource;
use crate::error::{DbError, DbResult, ErrorKind};
use crate::registry::ConnectionHandle;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

const ACTIVE: u8 = 0;
/// A statement failed; the server rejects everything until rollback.
const ABORTED: u8 = 1;
const COMMITTED: u8 = 2;
const ROLLED_BACK: u8 = 3;
/// The connection broke; the transaction outcome is unknown.
const FAILED: u8 = 4;

/// Runs the given block inside a transaction.
///
/// - Begins a transaction via `$source.begin().await` (a [`ConnectionHandle`]).
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)`.
///
/// The block must evaluate to `tgsql::DbResult<T>`.
///
/// ```ignore
/// let handle = registry.default_handle().await?;
/// let id = tgsql::transaction!(handle, tx, {
///     let id = tx.table("orders").insert(order).await?;
///     tx.table("stock").where_("sku", "=", sku).decrement("qty", 1i32).await?;
///     Ok(id)
/// })?;
/// ```
#[macro_export]
macro_rules! transaction {
    ($source:expr, $tx:ident, $body:block) => {{
        let $tx = ($source).begin().await?;
        let __tgsql_tx_body_result: $crate::DbResult<_> = async { $body }.await;
        match __tgsql_tx_body_result {
            Ok(value) => {
                $tx.commit().await?;
                Ok::<_, $crate::DbError>(value)
            }
            Err(error) => match $tx.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::DbError::Transaction(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
}

/// An open transaction pinned to one pooled connection.
///
/// Not meant for concurrent use: statements on one connection run one at a
/// time. Dropping a transaction that was never finalized closes its
/// connection instead of returning it to the pool, and the server rolls the
/// work back.
#[must_use = "a transaction that is never committed is rolled back"]
pub struct Transaction {
    handle: ConnectionHandle,
    client: Option<deadpool_postgres::Client>,
    state: AtomicU8,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("key", &self.handle.source().key())
            .field("state", &state_name(self.state.load(Ordering::Acquire)))
            .finish()
    }
}

fn state_name(state: u8) -> &'static str {
    match state {
        ACTIVE => "active",
        ABORTED => "aborted",
        COMMITTED => "committed",
        ROLLED_BACK => "rolled back",
        _ => "failed",
    }
}

/// Error for a finalize attempted in `state`, or `None` if it may proceed.
fn finalized_error(state: u8) -> Option<DbError> {
    let message = match state {
        COMMITTED => "transaction already committed",
        ROLLED_BACK => "transaction already rolled back",
        FAILED => "transaction connection failed",
        _ => return None,
    };
    Some(DbError::Transaction(message.to_string()))
}

impl Transaction {
    /// Check out a connection and start a transaction on it.
    ///
    /// Any failure here is a [`DbError::Connection`].
    pub(crate) async fn begin(handle: &ConnectionHandle) -> DbResult<Self> {
        let client = handle.client().await?;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;
        tracing::debug!("transaction started");
        Ok(Self {
            handle: handle.clone(),
            client: Some(client),
            state: AtomicU8::new(ACTIVE),
        })
    }

    /// Start a query builder bound to this transaction.
    pub fn table(&self, table: &str) -> QueryBuilder<'_> {
        QueryBuilder::on_transaction(table, self)
    }

    /// The data source the transaction was opened on.
    pub fn source(&self) -> &DataSource {
        self.handle.source()
    }

    /// The handle the connection was borrowed from.
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Whether statements may still run.
    pub fn is_active(&self) -> bool {
        self.state.load(Ordering::Acquire) == ACTIVE
    }

    /// Commit the transaction.
    ///
    /// If an earlier statement failed the server can only roll back; the
    /// rollback is issued and a [`DbError::Transaction`] returned.
    pub async fn commit(&self) -> DbResult<()> {
        if self.state.load(Ordering::Acquire) == ABORTED {
            self.finish("ROLLBACK", ABORTED, ROLLED_BACK).await?;
            return Err(DbError::Transaction(
                "transaction aborted by a failed statement; rolled back".to_string(),
            ));
        }
        self.finish("COMMIT", ACTIVE, COMMITTED).await
    }

    /// Roll the transaction back.
    pub async fn rollback(&self) -> DbResult<()> {
        let current = self.state.load(Ordering::Acquire);
        let from = if current == ABORTED { ABORTED } else { ACTIVE };
        self.finish("ROLLBACK", from, ROLLED_BACK).await
    }

    async fn finish(&self, statement: &'static str, from: u8, to: u8) -> DbResult<()> {
        if let Err(current) =
            self.state
                .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
        {
            return Err(finalized_error(current).unwrap_or_else(|| {
                DbError::Transaction(format!("transaction is {}", state_name(current)))
            }));
        }

        let client = self.connection()?;
        if let Err(e) = client.batch_execute(statement).await {
            self.state.store(FAILED, Ordering::Release);
            return Err(DbError::from_db_error(e));
        }
        tracing::debug!(statement, "transaction finished");
        Ok(())
    }

    fn connection(&self) -> DbResult<&deadpool_postgres::Client> {
        self.client
            .as_ref()
            .ok_or_else(|| DbError::Transaction("transaction has no connection".to_string()))
    }

    /// Connection for a statement; refused once the transaction is finalized.
    fn statement_client(&self) -> DbResult<&deadpool_postgres::Client> {
        let state = self.state.load(Ordering::Acquire);
        if let Some(err) = finalized_error(state) {
            return Err(err);
        }
        self.connection()
    }

    fn observe<T>(&self, result: &DbResult<T>) {
        if let Err(e) = result {
            if e.kind() == ErrorKind::Connection {
                self.state.store(FAILED, Ordering::Release);
            } else {
                let _ = self.state.compare_exchange(
                    ACTIVE,
                    ABORTED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
        }
    }
}

impl GenericClient for Transaction {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<Vec<Row>> {
        let client = self.statement_client()?;
        let result = GenericClient::query(client, sql, params).await;
        self.observe(&result);
        result
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<u64> {
        let client = self.statement_client()?;
        let result = GenericClient::execute(client, sql, params).await;
        self.observe(&result);
        result
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let state = *self.state.get_mut();
        if matches!(state, COMMITTED | ROLLED_BACK) {
            return;
        }
        if let Some(client) = self.client.take() {
            // Closing the connection makes the server roll back; a pooled
            // connection must never come back mid-transaction.
            drop(deadpool_postgres::Object::take(client));
            if state != FAILED {
                tracing::warn!(
                    state = state_name(state),
                    "transaction dropped without commit or rollback; connection closed"
                );
            }
        }
    }
}
