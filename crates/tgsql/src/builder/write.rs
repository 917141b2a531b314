//! Write terminals: insert, update, increment/decrement and delete.
//!
//! Update, increment, decrement and delete refuse to run without a WHERE
//! predicate unless the caller turns the guard off; the refusal happens before
//! any connection is touched.

use super::QueryBuilder;
use super::options::{DeleteOptions, InsertOptions, UpdateOptions};
use crate::error::{DbError, DbResult};
use crate::param::{BindValue, Param, ParamList};
use crate::row::RowExt;
use crate::values::{ColumnValue, Record, Values};

const NOW: &str = "NOW()";

fn write_value(value: &ColumnValue, sql: &mut String, params: &mut ParamList) {
    match value {
        ColumnValue::Bind(param) => {
            let n = params.push(param.clone());
            sql.push_str(&format!("${n}"));
        }
        ColumnValue::Raw(expr) => sql.push_str(expr),
    }
}

fn stamp_insert(values: &mut Values, opts: &InsertOptions, create: &str, update: &str) {
    if opts.is_auto_time() {
        values.insert_missing(create, ColumnValue::Raw(NOW.to_string()));
        values.insert_missing(update, ColumnValue::Raw(NOW.to_string()));
    }
}

impl<'t> QueryBuilder<'t> {
    /// Shared preconditions of UPDATE and DELETE statements.
    fn check_write(&self, op: &str, protected: bool) -> DbResult<()> {
        self.check_build()?;
        if !self.joins.is_empty() || !self.tail.is_empty() || self.lock.is_some() {
            return Err(DbError::validation(format!(
                "{op} on {} does not support joins, ordering, grouping, limits or locks",
                self.table
            )));
        }
        if protected && self.predicates.is_empty() {
            tracing::warn!(table = %self.table, op, "refused statement without a WHERE predicate");
            return Err(DbError::guard(format!(
                "{op} on {} has no WHERE predicate",
                self.table
            )));
        }
        Ok(())
    }

    pub(super) fn compile_insert(
        &self,
        mut values: Values,
        opts: &InsertOptions,
    ) -> DbResult<(String, ParamList)> {
        self.check_build()?;
        let source = self.source();
        stamp_insert(&mut values, opts, opts.create_field(source), opts.update_field(source));
        if values.is_empty() {
            return Err(DbError::validation(format!("insert into {} has no columns", self.table)));
        }

        let mut params = ParamList::new();
        let columns: Vec<&str> = values.columns().collect();
        let mut sql = format!("INSERT INTO {} ({}) VALUES (", self.table, columns.join(", "));
        for (i, (_, value)) in values.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            write_value(value, &mut sql, &mut params);
        }
        sql.push_str(") RETURNING ");
        sql.push_str(opts.key_field(source));
        Ok((sql, params))
    }

    /// One multi-row INSERT; every row must carry the first row's columns.
    pub(super) fn compile_insert_many(
        &self,
        mut rows: Vec<Values>,
        opts: &InsertOptions,
    ) -> DbResult<(String, ParamList)> {
        self.check_build()?;
        let source = self.source();
        for values in &mut rows {
            stamp_insert(values, opts, opts.create_field(source), opts.update_field(source));
        }

        let Some(first) = rows.first() else {
            return Err(DbError::validation(format!("insert into {} has no rows", self.table)));
        };
        if first.is_empty() {
            return Err(DbError::validation(format!("insert into {} has no columns", self.table)));
        }
        let columns: Vec<&str> = first.columns().collect();
        for (i, values) in rows.iter().enumerate().skip(1) {
            if values.len() != columns.len() || !columns.iter().all(|c| values.contains(c)) {
                return Err(DbError::validation(format!(
                    "row {i} of insert into {} does not match the columns of the first row",
                    self.table
                )));
            }
        }

        let mut params = ParamList::new();
        let mut sql = format!("INSERT INTO {} ({}) VALUES ", self.table, columns.join(", "));
        for (i, values) in rows.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            for (j, column) in columns.iter().enumerate() {
                if j > 0 {
                    sql.push_str(", ");
                }
                if let Some(value) = values.get(column) {
                    write_value(value, &mut sql, &mut params);
                }
            }
            sql.push(')');
        }
        Ok((sql, params))
    }

    pub(super) fn compile_update(
        &self,
        mut values: Values,
        opts: &UpdateOptions,
    ) -> DbResult<(String, ParamList)> {
        self.check_write("update", opts.is_protected())?;
        if opts.is_auto_time() {
            values.insert(opts.update_field(self.source()), ColumnValue::Raw(NOW.to_string()));
        }
        if values.is_empty() {
            return Err(DbError::validation(format!("update on {} has no columns", self.table)));
        }

        let mut params = ParamList::new();
        let mut sql = format!("UPDATE {} SET ", self.table);
        for (i, (column, value)) in values.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(column);
            sql.push_str(" = ");
            write_value(value, &mut sql, &mut params);
        }
        self.predicates.write(&mut sql, &mut params);
        Ok((sql, params))
    }

    /// `UPDATE t SET field = field <op> $1 ...`.
    pub(super) fn compile_step(
        &self,
        op: &str,
        field: &str,
        delta: Param,
        opts: &UpdateOptions,
    ) -> DbResult<(String, ParamList)> {
        let name = if op == "+" { "increment" } else { "decrement" };
        self.check_write(name, opts.is_protected())?;

        let mut params = ParamList::new();
        let n = params.push(delta);
        let mut sql = format!("UPDATE {} SET {field} = {field} {op} ${n}", self.table);
        if opts.is_auto_time() {
            sql.push_str(&format!(", {} = {NOW}", opts.update_field(self.source())));
        }
        self.predicates.write(&mut sql, &mut params);
        Ok((sql, params))
    }

    pub(super) fn compile_delete(&self, opts: &DeleteOptions) -> DbResult<(String, ParamList)> {
        self.check_write("delete", opts.is_protected())?;

        let mut params = ParamList::new();
        let mut sql = if opts.is_soft() {
            format!(
                "UPDATE {} SET {} = {NOW}",
                self.table,
                opts.delete_field(self.source())
            )
        } else {
            format!("DELETE FROM {}", self.table)
        };
        self.predicates.write(&mut sql, &mut params);
        Ok((sql, params))
    }

    /// Insert one record and return its generated identifier.
    pub async fn insert<R: Record>(self, record: R) -> DbResult<i64> {
        self.insert_with(record, InsertOptions::default()).await
    }

    pub async fn insert_with<R: Record>(self, record: R, opts: InsertOptions) -> DbResult<i64> {
        let source = self.source();
        let (sql, params) = self.compile_insert(record.into_values(), &opts)?;
        let echo = opts.debug_on(source);
        let key = opts.key_field(source).to_string();
        let row = self.run_query_one(sql, params, echo).await?;
        row.try_get_column::<i64>(&key)
            .or_else(|_| row.try_get_column::<i32>(&key).map(i64::from))
    }

    /// Insert every record in one statement; returns the number of rows written.
    pub async fn insert_many<R: Record>(self, records: Vec<R>) -> DbResult<u64> {
        self.insert_many_with(records, InsertOptions::default()).await
    }

    pub async fn insert_many_with<R: Record>(
        self,
        records: Vec<R>,
        opts: InsertOptions,
    ) -> DbResult<u64> {
        let rows = records.into_iter().map(Record::into_values).collect();
        let (sql, params) = self.compile_insert_many(rows, &opts)?;
        let echo = opts.debug_on(self.source());
        self.run_execute(sql, params, echo).await
    }

    /// Assign the record's columns on every matching row.
    pub async fn update<R: Record>(self, record: R) -> DbResult<u64> {
        self.update_with(record, UpdateOptions::default()).await
    }

    pub async fn update_with<R: Record>(self, record: R, opts: UpdateOptions) -> DbResult<u64> {
        let (sql, params) = self.compile_update(record.into_values(), &opts)?;
        let echo = opts.debug_on(self.source());
        self.run_execute(sql, params, echo).await
    }

    /// `field = field + delta` on every matching row.
    pub async fn increment<T: BindValue>(self, field: &str, delta: T) -> DbResult<u64> {
        self.increment_with(field, delta, UpdateOptions::default()).await
    }

    pub async fn increment_with<T: BindValue>(
        self,
        field: &str,
        delta: T,
        opts: UpdateOptions,
    ) -> DbResult<u64> {
        let (sql, params) = self.compile_step("+", field, Param::new(delta), &opts)?;
        let echo = opts.debug_on(self.source());
        self.run_execute(sql, params, echo).await
    }

    /// `field = field - delta` on every matching row.
    pub async fn decrement<T: BindValue>(self, field: &str, delta: T) -> DbResult<u64> {
        self.decrement_with(field, delta, UpdateOptions::default()).await
    }

    pub async fn decrement_with<T: BindValue>(
        self,
        field: &str,
        delta: T,
        opts: UpdateOptions,
    ) -> DbResult<u64> {
        let (sql, params) = self.compile_step("-", field, Param::new(delta), &opts)?;
        let echo = opts.debug_on(self.source());
        self.run_execute(sql, params, echo).await
    }

    /// Soft-delete matching rows (stamp the delete column), or remove them with
    /// [`DeleteOptions::hard`].
    pub async fn delete(self) -> DbResult<u64> {
        self.delete_with(DeleteOptions::default()).await
    }

    pub async fn delete_with(self, opts: DeleteOptions) -> DbResult<u64> {
        let (sql, params) = self.compile_delete(&opts)?;
        let echo = opts.debug_on(self.source());
        self.run_execute(sql, params, echo).await
    }
}
