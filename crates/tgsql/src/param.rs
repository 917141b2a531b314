//! Bound parameter storage.
//!
//! A [`Param`] keeps the value for the driver and, next to it, the SQL literal
//! used only by the diagnostic formatter in [`crate::debug`].

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;
use tokio_postgres::types::ToSql;

/// Bound value accepted by every builder method.
pub trait BindValue: ToSql + Debug + Send + Sync + 'static {}

impl<T> BindValue for T where T: ToSql + Debug + Send + Sync + 'static {}

/// A clone-friendly parameter wrapper.
///
/// Cloning a builder clones its parameters without copying the values.
#[derive(Clone)]
pub struct Param {
    value: Arc<dyn ToSql + Send + Sync>,
    literal: Arc<str>,
}

impl Param {
    /// Create a new parameter from any bindable value.
    pub fn new<T: BindValue>(value: T) -> Self {
        let literal = sql_literal(&value);
        Param {
            value: Arc::new(value),
            literal: literal.into(),
        }
    }

    /// Get a reference to the inner value as a ToSql trait object.
    pub fn as_ref(&self) -> &(dyn ToSql + Sync) {
        &*self.value as &(dyn ToSql + Sync)
    }

    /// SQL literal rendering of the value (diagnostics only).
    pub fn literal(&self) -> &str {
        &self.literal
    }
}

impl Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Param").field(&&*self.literal).finish()
    }
}

/// Ordered parameter list; index `i` binds placeholder `$(i+1)`.
#[derive(Clone, Debug, Default)]
pub struct ParamList {
    params: Vec<Param>,
}

impl ParamList {
    /// Create a new empty parameter list.
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Add a pre-wrapped Param and return its 1-based placeholder index.
    pub fn push(&mut self, param: Param) -> usize {
        self.params.push(param);
        self.params.len()
    }

    /// Get the current parameter count.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Get all parameters as references for tokio-postgres.
    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(Param::as_ref).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.params.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Param> {
        self.params.get(index)
    }
}

/// Quote a string the way PostgreSQL reads a string literal.
///
/// Text with line breaks becomes an escape string (`E'...'`) so the rendered
/// statement stays on one line.
pub(crate) fn quote_str(s: &str) -> String {
    if s.contains(['\n', '\r']) {
        let mut out = String::with_capacity(s.len() + 4);
        out.push_str("E'");
        for c in s.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '\'' => out.push_str("''"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                c => out.push(c),
            }
        }
        out.push('\'');
        return out;
    }

    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

macro_rules! try_plain {
    ($any:expr, $($ty:ty),+) => {
        $(
            if let Some(v) = $any.downcast_ref::<$ty>() {
                return v.to_string();
            }
            if let Some(v) = $any.downcast_ref::<Option<$ty>>() {
                return v.map_or_else(|| "NULL".to_string(), |v| v.to_string());
            }
        )+
    };
}

macro_rules! try_quoted {
    ($any:expr, $($ty:ty),+) => {
        $(
            if let Some(v) = $any.downcast_ref::<$ty>() {
                return quote_str(&v.to_string());
            }
            if let Some(v) = $any.downcast_ref::<Option<$ty>>() {
                return v
                    .as_ref()
                    .map_or_else(|| "NULL".to_string(), |v| quote_str(&v.to_string()));
            }
        )+
    };
}

fn sql_literal<T: Debug + 'static>(value: &T) -> String {
    let any = value as &dyn Any;

    try_plain!(any, i8, i16, i32, i64, u32, f32, f64);

    if let Some(v) = any.downcast_ref::<bool>() {
        return if *v { "TRUE" } else { "FALSE" }.to_string();
    }
    if let Some(v) = any.downcast_ref::<Option<bool>>() {
        return match v {
            Some(true) => "TRUE".to_string(),
            Some(false) => "FALSE".to_string(),
            None => "NULL".to_string(),
        };
    }
    if let Some(v) = any.downcast_ref::<&'static str>() {
        return quote_str(v);
    }
    if let Some(v) = any.downcast_ref::<Option<&'static str>>() {
        return v.map_or_else(|| "NULL".to_string(), quote_str);
    }

    try_quoted!(
        any,
        String,
        uuid::Uuid,
        chrono::NaiveDate,
        chrono::NaiveTime,
        chrono::NaiveDateTime,
        chrono::DateTime<chrono::Utc>,
        chrono::DateTime<chrono::Local>,
        chrono::DateTime<chrono::FixedOffset>,
        serde_json::Value
    );

    // Arrays, bytes and user types: not a faithful literal, but unambiguous.
    quote_str(&format!("{value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_and_bools_are_bare() {
        assert_eq!(Param::new(42i64).literal(), "42");
        assert_eq!(Param::new(1.5f64).literal(), "1.5");
        assert_eq!(Param::new(true).literal(), "TRUE");
        assert_eq!(Param::new(None::<i32>).literal(), "NULL");
    }

    #[test]
    fn strings_are_quoted_and_escaped() {
        assert_eq!(Param::new("alice").literal(), "'alice'");
        assert_eq!(Param::new("O'Brien".to_string()).literal(), "'O''Brien'");
        assert_eq!(Param::new(Some("x".to_string())).literal(), "'x'");
        assert_eq!(Param::new(None::<String>).literal(), "NULL");
    }

    #[test]
    fn line_breaks_use_escape_strings() {
        assert_eq!(Param::new("a\nb").literal(), "E'a\\nb'");
        assert_eq!(Param::new("it's\r\n\\").literal(), "E'it''s\\r\\n\\\\'");
        assert_eq!(Param::new("c:\\dir").literal(), "'c:\\dir'");
    }

    #[test]
    fn the_word_null_is_still_a_string() {
        assert_eq!(Param::new("NULL").literal(), "'NULL'");
    }

    #[test]
    fn param_list_indices_are_one_based() {
        let mut list = ParamList::new();
        assert_eq!(list.push(Param::new(1i32)), 1);
        assert_eq!(list.push(Param::new("a")), 2);
        assert_eq!(list.len(), 2);
        assert_eq!(list.as_refs().len(), 2);
    }
}
