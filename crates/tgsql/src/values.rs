//! Record → column mapping for INSERT and UPDATE.

use crate::param::{BindValue, Param};

/// A value written into a column: either bound as a parameter or a raw SQL
/// expression such as `NOW()`.
#[derive(Clone, Debug)]
pub enum ColumnValue {
    Bind(Param),
    Raw(String),
}

/// Ordered column/value list.
///
/// Columns keep insertion order; setting an existing column replaces its value
/// in place.
#[derive(Clone, Debug, Default)]
pub struct Values {
    entries: Vec<(String, ColumnValue)>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` to `column`.
    pub fn set<T: BindValue>(mut self, column: &str, value: T) -> Self {
        self.insert(column, ColumnValue::Bind(Param::new(value)));
        self
    }

    /// Bind `value` to `column` only when it is `Some`.
    pub fn set_opt<T: BindValue>(self, column: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Write a raw SQL expression into `column` (no parameter).
    pub fn set_raw(mut self, column: &str, expr: &str) -> Self {
        self.insert(column, ColumnValue::Raw(expr.to_string()));
        self
    }

    /// Append or replace a column.
    pub fn insert(&mut self, column: &str, value: ColumnValue) {
        match self.entries.iter_mut().find(|(c, _)| c == column) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((column.to_string(), value)),
        }
    }

    /// Append `column` only if it is not present yet.
    pub(crate) fn insert_missing(&mut self, column: &str, value: ColumnValue) {
        if !self.contains(column) {
            self.entries.push((column.to_string(), value));
        }
    }

    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.entries.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.entries.iter().any(|(c, _)| c == column)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnValue)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }
}

/// Types that can be written as a table row.
///
/// Usually derived with `#[derive(Record)]`; implement by hand for custom
/// mappings.
///
/// ```ignore
/// #[derive(Record)]
/// struct NewUser {
///     name: String,
///     #[orm(column = "mail")]
///     email: String,
///     #[orm(skip)]
///     password_confirm: String,
/// }
/// ```
pub trait Record {
    fn into_values(self) -> Values;
}

impl Record for Values {
    fn into_values(self) -> Values {
        self
    }
}

impl Record for Vec<(String, Param)> {
    fn into_values(self) -> Values {
        let mut values = Values::new();
        for (column, param) in self {
            values.insert(&column, ColumnValue::Bind(param));
        }
        values
    }
}

/// Build a [`Values`] list inline.
///
/// ```ignore
/// let row = tgsql::values! { "name" => "alice", "age" => 30i32 };
/// ```
#[macro_export]
macro_rules! values {
    () => { $crate::Values::new() };
    ($($column:expr => $value:expr),+ $(,)?) => {
        $crate::Values::new()$(.set($column, $value))+
    };
}
