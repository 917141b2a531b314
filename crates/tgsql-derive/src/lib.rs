//! Derive macros for tgsql
//!
//! Provides `#[derive(FromRow)]` and `#[derive(Record)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod attrs;
mod from_row;
mod record;

/// Derive `FromRow` trait for a struct.
///
/// # Example
///
/// ```ignore
/// use tgsql::FromRow;
///
/// #[derive(FromRow)]
/// struct User {
///     id: i64,
///     username: String,
///     #[orm(column = "email_address")]
///     email: Option<String>,
/// }
/// ```
///
/// # Attributes
///
/// - `#[orm(column = "name")]` - Map field to a different column name
/// - `#[orm(skip)]` - Leave the field at `Default::default()`
#[proc_macro_derive(FromRow, attributes(orm))]
pub fn derive_from_row(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    from_row::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Derive `Record` for a struct so it can be inserted or used as an update.
///
/// # Example
///
/// ```ignore
/// use tgsql::Record;
///
/// #[derive(Record)]
/// struct NewUser {
///     username: String,
///     #[orm(column = "email_address")]
///     email: Option<String>,
///     #[orm(skip)]
///     password_confirm: String,
/// }
/// ```
///
/// Columns are written in field order. `Option` fields are bound as-is, so
/// `None` writes NULL.
///
/// # Attributes
///
/// - `#[orm(column = "name")]` - Map field to a different column name
/// - `#[orm(skip)]` - Do not write the field
#[proc_macro_derive(Record, attributes(orm))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    record::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
