//! Read terminals: count, find-one and select.
//!
//! Every read filters out soft-deleted rows unless the builder asked for
//! [`all_including_deleted`](super::QueryBuilder::all_including_deleted).

use super::clause::{Condition, Predicates, Tail, write_tail};
use super::options::ReadOptions;
use super::{Deleted, QueryBuilder};
use crate::error::{DbError, DbResult};
use crate::param::ParamList;
use crate::row::{FromRow, RowExt};

impl<'t> QueryBuilder<'t> {
    /// Predicates plus the soft-delete scope to AND onto them, if any.
    fn read_scope(&self, delete_time: &str) -> (Predicates, Option<Condition>) {
        let mut predicates = self.predicates.clone();
        let scope = match &self.deleted {
            Deleted::Exclude if predicates.has_null_check(delete_time) => None,
            Deleted::Exclude => Some(Condition::Null {
                column: delete_time.to_string(),
                negated: false,
            }),
            Deleted::Include(field) => {
                predicates.remove_null_check(field.as_deref().unwrap_or(delete_time));
                None
            }
        };
        (predicates, scope)
    }

    fn write_from(&self, sql: &mut String) {
        sql.push_str(" FROM ");
        sql.push_str(&self.table);
        for join in &self.joins {
            sql.push_str(join);
        }
    }

    /// `SELECT ... [LIMIT 1] [FOR ...]`.
    pub(super) fn compile_select(
        &self,
        delete_time: &str,
        single: bool,
    ) -> DbResult<(String, ParamList)> {
        self.check_build()?;
        let mut params = ParamList::new();
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&self.fields);
        self.write_from(&mut sql);

        let (predicates, scope) = self.read_scope(delete_time);
        predicates.write_scoped(&mut sql, &mut params, scope.as_ref());
        write_tail(&mut sql, &self.tail);

        if single && !self.tail.iter().any(Tail::is_limit) {
            sql.push_str(" LIMIT 1");
        }
        if let Some(lock) = self.lock {
            sql.push(' ');
            sql.push_str(lock.as_sql());
        }
        Ok((sql, params))
    }

    /// `SELECT COUNT(*)`; ordering, limits and locks do not apply. Grouped or
    /// distinct projections are counted through a subquery.
    pub(super) fn compile_count(&self, delete_time: &str) -> DbResult<(String, ParamList)> {
        self.check_build()?;
        let mut params = ParamList::new();
        let groups: Vec<Tail> = self
            .tail
            .iter()
            .filter(|t| matches!(t, Tail::Group(_)))
            .cloned()
            .collect();
        let nested = !groups.is_empty() || self.distinct;

        let mut sql = String::new();
        if nested {
            sql.push_str("SELECT COUNT(*) FROM (SELECT ");
            if self.distinct {
                sql.push_str("DISTINCT ");
                sql.push_str(&self.fields);
            } else {
                sql.push('1');
            }
        } else {
            sql.push_str("SELECT COUNT(*)");
        }
        self.write_from(&mut sql);

        let (predicates, scope) = self.read_scope(delete_time);
        predicates.write_scoped(&mut sql, &mut params, scope.as_ref());
        write_tail(&mut sql, &groups);
        if nested {
            sql.push_str(") AS t");
        }
        Ok((sql, params))
    }

    /// Number of matching rows.
    pub async fn count(self) -> DbResult<i64> {
        self.count_with(ReadOptions::default()).await
    }

    pub async fn count_with(self, opts: ReadOptions) -> DbResult<i64> {
        let source = self.source();
        let (sql, params) = self.compile_count(opts.delete_field(source))?;
        let echo = opts.debug_on(source);
        let row = self.run_query_one(sql, params, echo).await?;
        row.try_get_column::<i64>("count")
    }

    /// First matching row. Zero rows is [`DbError::NotFound`].
    pub async fn find_one<T: FromRow>(self) -> DbResult<T> {
        self.find_one_with(ReadOptions::default()).await
    }

    pub async fn find_one_with<T: FromRow>(self, opts: ReadOptions) -> DbResult<T> {
        let source = self.source();
        let (sql, params) = self.compile_select(opts.delete_field(source), true)?;
        let echo = opts.debug_on(source);
        let table = self.table.clone();
        match self.run_query_opt(sql, params, echo).await? {
            Some(row) => T::from_row(&row),
            None => Err(DbError::not_found(format!("no matching row in {table}"))),
        }
    }

    /// Every matching row.
    pub async fn select<T: FromRow>(self) -> DbResult<Vec<T>> {
        self.select_with(ReadOptions::default()).await
    }

    pub async fn select_with<T: FromRow>(self, opts: ReadOptions) -> DbResult<Vec<T>> {
        let source = self.source();
        let (sql, params) = self.compile_select(opts.delete_field(source), false)?;
        let echo = opts.debug_on(source);
        let rows = self.run_query(sql, params, echo).await?;
        rows.iter().map(T::from_row).collect()
    }
}
