//! Per-call overrides for terminal operations.
//!
//! Every option left unset falls back to the [`DataSource`] the builder runs
//! against: debug echo, timestamp column names and the primary key.

use crate::config::DataSource;

/// Options for [`insert_with`](super::QueryBuilder::insert_with) and
/// [`insert_many_with`](super::QueryBuilder::insert_many_with).
#[derive(Clone, Debug, Default)]
pub struct InsertOptions {
    debug: Option<bool>,
    auto_time: bool,
    create_time: Option<String>,
    update_time: Option<String>,
    primary_key: Option<String>,
}

/// Options for multi-row inserts.
pub type InsertManyOptions = InsertOptions;

impl InsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Echo the compiled statement at INFO.
    pub fn debug(mut self, on: bool) -> Self {
        self.debug = Some(on);
        self
    }

    /// Stamp the create/update columns with `NOW()` unless the record sets them.
    pub fn auto_time(mut self, on: bool) -> Self {
        self.auto_time = on;
        self
    }

    pub fn create_time(mut self, column: &str) -> Self {
        self.create_time = Some(column.to_string());
        self
    }

    pub fn update_time(mut self, column: &str) -> Self {
        self.update_time = Some(column.to_string());
        self
    }

    /// Column returned as the generated identifier.
    pub fn primary_key(mut self, column: &str) -> Self {
        self.primary_key = Some(column.to_string());
        self
    }

    pub(crate) fn debug_on(&self, source: &DataSource) -> bool {
        self.debug.unwrap_or(source.debug)
    }

    pub(crate) fn is_auto_time(&self) -> bool {
        self.auto_time
    }

    pub(crate) fn create_field<'a>(&'a self, source: &'a DataSource) -> &'a str {
        self.create_time.as_deref().unwrap_or(&source.create_time)
    }

    pub(crate) fn update_field<'a>(&'a self, source: &'a DataSource) -> &'a str {
        self.update_time.as_deref().unwrap_or(&source.update_time)
    }

    pub(crate) fn key_field<'a>(&'a self, source: &'a DataSource) -> &'a str {
        self.primary_key.as_deref().unwrap_or(&source.primary_key)
    }
}

/// Options for updates and in-place arithmetic.
#[derive(Clone, Debug)]
pub struct UpdateOptions {
    debug: Option<bool>,
    auto_time: bool,
    update_time: Option<String>,
    all_protect: bool,
}

pub type IncrementOptions = UpdateOptions;
pub type DecrementOptions = UpdateOptions;

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            debug: None,
            auto_time: false,
            update_time: None,
            all_protect: true,
        }
    }
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debug(mut self, on: bool) -> Self {
        self.debug = Some(on);
        self
    }

    /// Force the update column to `NOW()`, replacing any explicit value.
    pub fn auto_time(mut self, on: bool) -> Self {
        self.auto_time = on;
        self
    }

    pub fn update_time(mut self, column: &str) -> Self {
        self.update_time = Some(column.to_string());
        self
    }

    /// Refuse to run without a WHERE predicate (on by default).
    ///
    /// Turning this off lets a statement touch every row of the table.
    pub fn all_protect(mut self, on: bool) -> Self {
        self.all_protect = on;
        self
    }

    pub(crate) fn debug_on(&self, source: &DataSource) -> bool {
        self.debug.unwrap_or(source.debug)
    }

    pub(crate) fn is_auto_time(&self) -> bool {
        self.auto_time
    }

    pub(crate) fn update_field<'a>(&'a self, source: &'a DataSource) -> &'a str {
        self.update_time.as_deref().unwrap_or(&source.update_time)
    }

    pub(crate) fn is_protected(&self) -> bool {
        self.all_protect
    }
}

/// Options for [`delete_with`](super::QueryBuilder::delete_with).
#[derive(Clone, Debug)]
pub struct DeleteOptions {
    debug: Option<bool>,
    soft: bool,
    delete_time: Option<String>,
    delete_protect: bool,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            debug: None,
            soft: true,
            delete_time: None,
            delete_protect: true,
        }
    }
}

impl DeleteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debug(mut self, on: bool) -> Self {
        self.debug = Some(on);
        self
    }

    /// Mark rows deleted instead of removing them (on by default).
    pub fn soft(mut self, on: bool) -> Self {
        self.soft = on;
        self
    }

    /// Shorthand for `soft(false)`.
    pub fn hard(self) -> Self {
        self.soft(false)
    }

    pub fn delete_time(mut self, column: &str) -> Self {
        self.delete_time = Some(column.to_string());
        self
    }

    /// Refuse to run without a WHERE predicate (on by default).
    pub fn delete_protect(mut self, on: bool) -> Self {
        self.delete_protect = on;
        self
    }

    pub(crate) fn debug_on(&self, source: &DataSource) -> bool {
        self.debug.unwrap_or(source.debug)
    }

    pub(crate) fn is_soft(&self) -> bool {
        self.soft
    }

    pub(crate) fn delete_field<'a>(&'a self, source: &'a DataSource) -> &'a str {
        self.delete_time.as_deref().unwrap_or(&source.delete_time)
    }

    pub(crate) fn is_protected(&self) -> bool {
        self.delete_protect
    }
}

/// Options for reads: count, find-one and select.
#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    debug: Option<bool>,
    delete_time: Option<String>,
}

pub type CountOptions = ReadOptions;
pub type FindOneOptions = ReadOptions;
pub type SelectOptions = ReadOptions;

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debug(mut self, on: bool) -> Self {
        self.debug = Some(on);
        self
    }

    /// Soft-delete column filtered on (`<column> IS NULL`).
    pub fn delete_time(mut self, column: &str) -> Self {
        self.delete_time = Some(column.to_string());
        self
    }

    pub(crate) fn debug_on(&self, source: &DataSource) -> bool {
        self.debug.unwrap_or(source.debug)
    }

    pub(crate) fn delete_field<'a>(&'a self, source: &'a DataSource) -> &'a str {
        self.delete_time.as_deref().unwrap_or(&source.delete_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_options_fall_back_to_source() {
        let source = DataSource::new("postgres://localhost/app")
            .debug(true)
            .time_fields("created_at", "updated_at", "deleted_at");

        let insert = InsertOptions::new();
        assert!(insert.debug_on(&source));
        assert_eq!(insert.create_field(&source), "created_at");
        assert_eq!(insert.key_field(&source), "id");

        let read = ReadOptions::new().debug(false).delete_time("removed_at");
        assert!(!read.debug_on(&source));
        assert_eq!(read.delete_field(&source), "removed_at");
    }

    #[test]
    fn guards_and_soft_delete_default_on() {
        assert!(UpdateOptions::default().is_protected());
        assert!(!UpdateOptions::default().is_auto_time());
        let delete = DeleteOptions::default();
        assert!(delete.is_soft() && delete.is_protected());
        assert!(!delete.hard().is_soft());
    }
}
