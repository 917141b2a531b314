//! # tgsql
//!
//! A fluent, table-oriented data-access layer for PostgreSQL.
//!
//! ## Features
//!
//! - **Pool registry**: one pool per connection string, created on first use and shared
//! - **Fluent builder**: `table("users").where_(..).order(..).page(..).select()`
//! - **Write guards**: UPDATE, increment, decrement and DELETE refuse to run without WHERE
//! - **Soft delete**: reads skip rows with a delete timestamp unless asked not to
//! - **Transactions**: builders bound to one pinned connection, explicit commit/rollback
//! - **Type-safe mapping**: Row → Struct via `FromRow`, Struct → columns via `Record`
//! - **SQL echo**: compiled statements with inlined literals on the `tgsql.sql` tracing target
//!
//! ## Example
//!
//! ```ignore
//! use tgsql::{DataSource, FromRow, Record, Registry, UpdateOptions};
//!
//! #[derive(FromRow)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! #[derive(Record)]
//! struct NewUser {
//!     name: String,
//! }
//!
//! let registry = Registry::new(DataSource::new("postgres://app@localhost/app"));
//!
//! let id = registry
//!     .table("users")
//!     .await?
//!     .insert(NewUser { name: "alice".into() })
//!     .await?;
//!
//! let user: User = registry
//!     .table("users")
//!     .await?
//!     .where_("id", "=", id)
//!     .find_one()
//!     .await?;
//!
//! registry
//!     .table("users")
//!     .await?
//!     .where_("id", "=", id)
//!     .update_with(tgsql::values! { "name" => "bob" }, UpdateOptions::new().auto_time(true))
//!     .await?;
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod debug;
pub mod error;
pub mod param;
pub mod registry;
pub mod row;
pub mod transaction;
pub mod values;

pub use builder::{
    CountOptions, DecrementOptions, DeleteOptions, Direction, FindOneOptions, IncrementOptions,
    InsertManyOptions, InsertOptions, JoinType, LockMode, QueryBuilder, ReadOptions,
    SelectOptions, UpdateOptions, normalize_page,
};
pub use client::GenericClient;
pub use config::{DataSource, DatabaseConfig};
pub use debug::format_sql;
pub use error::{DbError, DbResult, ErrorCode, ErrorKind, Exception};
pub use param::{BindValue, Param, ParamList};
pub use registry::{ConnectionHandle, Registry};
pub use row::{FromRow, RowExt};
pub use transaction::Transaction;
pub use values::{ColumnValue, Record, Values};

// Re-export the driver so derived code and callers share one version.
pub use tokio_postgres;

#[cfg(feature = "derive")]
pub use tgsql_derive::{FromRow, Record};
