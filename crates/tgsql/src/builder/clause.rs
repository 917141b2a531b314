//! Predicate and trailing-clause fragments.
//!
//! Fragments are stored structurally and numbered only when the statement is
//! compiled, so the placeholder order always equals the parameter order.

use crate::param::{Param, ParamList};

/// Boolean connective joining a predicate to the ones before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

impl Connective {
    fn as_sql(self) -> &'static str {
        match self {
            Connective::And => "AND",
            Connective::Or => "OR",
        }
    }
}

/// ORDER BY direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// JOIN flavour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    #[default]
    Left,
    Right,
    Full,
}

impl JoinType {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
            JoinType::Full => "FULL OUTER",
        }
    }
}

/// Row lock taken by a locking read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LockMode {
    /// Exclusive lock for rows about to be written.
    #[default]
    Update,
    NoKeyUpdate,
    /// Shared lock for rows that must not change while read.
    Share,
    KeyShare,
}

impl LockMode {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            LockMode::Update => "FOR UPDATE",
            LockMode::NoKeyUpdate => "FOR NO KEY UPDATE",
            LockMode::Share => "FOR SHARE",
            LockMode::KeyShare => "FOR KEY SHARE",
        }
    }
}

const OPERATORS: &[&str] = &[
    "=", "!=", "<>", "<", "<=", ">", ">=", "LIKE", "NOT LIKE", "ILIKE", "NOT ILIKE",
];

/// Normalize a comparison operator, rejecting anything outside the allowlist.
pub(crate) fn normalize_op(op: &str) -> Option<&'static str> {
    let upper = op.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
    OPERATORS.iter().copied().find(|o| *o == upper)
}

#[derive(Clone, Debug)]
pub(crate) enum Condition {
    Compare {
        column: String,
        op: &'static str,
        value: Param,
    },
    In {
        column: String,
        values: Vec<Param>,
    },
    Between {
        column: String,
        start: Param,
        end: Param,
    },
    Null {
        column: String,
        negated: bool,
    },
}

impl Condition {
    fn write(&self, sql: &mut String, params: &mut ParamList) {
        match self {
            Condition::Compare { column, op, value } => {
                let n = params.push(value.clone());
                sql.push_str(&format!("{column} {op} ${n}"));
            }
            Condition::In { values, .. } if values.is_empty() => {
                // `IN ()` is not valid SQL; an empty list matches nothing.
                sql.push_str("FALSE");
            }
            Condition::In { column, values } => {
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| format!("${}", params.push(v.clone())))
                    .collect();
                sql.push_str(&format!("{column} IN ({})", placeholders.join(", ")));
            }
            Condition::Between { column, start, end } => {
                let a = params.push(start.clone());
                let b = params.push(end.clone());
                sql.push_str(&format!("{column} BETWEEN ${a} AND ${b}"));
            }
            Condition::Null { column, negated } => {
                let check = if *negated { "IS NOT NULL" } else { "IS NULL" };
                sql.push_str(&format!("{column} {check}"));
            }
        }
    }

    fn is_null_check_on(&self, field: &str) -> bool {
        matches!(self, Condition::Null { column, negated: false } if column == field)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Predicate {
    pub(crate) connective: Connective,
    pub(crate) condition: Condition,
}

/// Ordered predicate list rendered as one WHERE clause.
#[derive(Clone, Debug, Default)]
pub(crate) struct Predicates {
    items: Vec<Predicate>,
}

impl Predicates {
    pub(crate) fn push(&mut self, connective: Connective, condition: Condition) {
        self.items.push(Predicate {
            connective,
            condition,
        });
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether `field IS NULL` is already one of the predicates.
    pub(crate) fn has_null_check(&self, field: &str) -> bool {
        self.items.iter().any(|p| p.condition.is_null_check_on(field))
    }

    /// Remove every `field IS NULL` predicate.
    pub(crate) fn remove_null_check(&mut self, field: &str) {
        self.items.retain(|p| !p.condition.is_null_check_on(field));
    }

    fn write_items(&self, sql: &mut String, params: &mut ParamList) {
        for (i, p) in self.items.iter().enumerate() {
            if i > 0 {
                sql.push(' ');
                sql.push_str(p.connective.as_sql());
                sql.push(' ');
            }
            p.condition.write(sql, params);
        }
    }

    /// Render ` WHERE ...`; the first fragment carries `WHERE`, every later one
    /// its own connective.
    pub(crate) fn write(&self, sql: &mut String, params: &mut ParamList) {
        self.write_scoped(sql, params, None);
    }

    /// Like [`write`](Self::write) with an extra condition ANDed onto the whole
    /// predicate list. OR chains are parenthesized so the scope applies to
    /// every branch.
    pub(crate) fn write_scoped(
        &self,
        sql: &mut String,
        params: &mut ParamList,
        scope: Option<&Condition>,
    ) {
        match (self.items.is_empty(), scope) {
            (true, None) => {}
            (true, Some(scope)) => {
                sql.push_str(" WHERE ");
                scope.write(sql, params);
            }
            (false, None) => {
                sql.push_str(" WHERE ");
                self.write_items(sql, params);
            }
            (false, Some(scope)) => {
                let grouped = self
                    .items
                    .iter()
                    .skip(1)
                    .any(|p| p.connective == Connective::Or);
                sql.push_str(" WHERE ");
                if grouped {
                    sql.push('(');
                }
                self.write_items(sql, params);
                if grouped {
                    sql.push(')');
                }
                sql.push_str(" AND ");
                scope.write(sql, params);
            }
        }
    }
}

/// GROUP/ORDER/LIMIT fragments, emitted in the order they were chained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Tail {
    Group(String),
    Order(String, Direction),
    Limit(u64),
    Page { offset: u64, size: u64 },
}

impl Tail {
    pub(crate) fn is_limit(&self) -> bool {
        matches!(self, Tail::Limit(_) | Tail::Page { .. })
    }
}

pub(crate) fn write_tail(sql: &mut String, tail: &[Tail]) {
    let mut prev_order = false;
    for t in tail {
        match t {
            Tail::Order(field, dir) if prev_order => {
                sql.push_str(&format!(", {field} {}", dir.as_sql()));
            }
            Tail::Order(field, dir) => {
                sql.push_str(&format!(" ORDER BY {field} {}", dir.as_sql()));
            }
            Tail::Group(field) => sql.push_str(&format!(" GROUP BY {field}")),
            Tail::Limit(n) => sql.push_str(&format!(" LIMIT {n}")),
            Tail::Page { offset, size } => {
                sql.push_str(&format!(" LIMIT {size} OFFSET {offset}"));
            }
        }
        prev_order = matches!(t, Tail::Order(..));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_allowlist() {
        assert_eq!(normalize_op("="), Some("="));
        assert_eq!(normalize_op("like"), Some("LIKE"));
        assert_eq!(normalize_op("not   ilike"), Some("NOT ILIKE"));
        assert_eq!(normalize_op(">="), Some(">="));
        assert_eq!(normalize_op("= 1 OR 1"), None);
        assert_eq!(normalize_op(";"), None);
    }

    #[test]
    fn first_predicate_gets_where_rest_get_connectives() {
        let mut preds = Predicates::default();
        preds.push(Connective::Or, Condition::Null {
            column: "a".into(),
            negated: false,
        });
        preds.push(Connective::Or, Condition::Null {
            column: "b".into(),
            negated: true,
        });
        let mut sql = String::new();
        preds.write(&mut sql, &mut ParamList::new());
        assert_eq!(sql, " WHERE a IS NULL OR b IS NOT NULL");
    }

    #[test]
    fn consecutive_orders_merge() {
        let mut sql = String::new();
        write_tail(
            &mut sql,
            &[
                Tail::Group("dept".into()),
                Tail::Order("age".into(), Direction::Asc),
                Tail::Order("id".into(), Direction::Desc),
                Tail::Limit(5),
            ],
        );
        assert_eq!(sql, " GROUP BY dept ORDER BY age ASC, id DESC LIMIT 5");
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let mut preds = Predicates::default();
        preds.push(Connective::And, Condition::In {
            column: "id".into(),
            values: vec![],
        });
        let mut params = ParamList::new();
        let mut sql = String::new();
        preds.write(&mut sql, &mut params);
        assert_eq!(sql, " WHERE FALSE");
        assert!(params.is_empty());
    }

    #[test]
    fn scope_wraps_or_chains() {
        let deleted = Condition::Null {
            column: "delete_time".into(),
            negated: false,
        };
        let mut preds = Predicates::default();
        preds.push(Connective::And, Condition::Compare {
            column: "a".into(),
            op: "=",
            value: Param::new(1i32),
        });
        preds.push(Connective::Or, Condition::Compare {
            column: "b".into(),
            op: "=",
            value: Param::new(2i32),
        });
        let mut params = ParamList::new();
        let mut sql = String::new();
        preds.write_scoped(&mut sql, &mut params, Some(&deleted));
        assert_eq!(sql, " WHERE (a = $1 OR b = $2) AND delete_time IS NULL");
        assert_eq!(params.len(), 2);

        let mut sql = String::new();
        Predicates::default().write_scoped(&mut sql, &mut ParamList::new(), Some(&deleted));
        assert_eq!(sql, " WHERE delete_time IS NULL");
    }
}
