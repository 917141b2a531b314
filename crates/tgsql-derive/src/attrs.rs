//! `#[orm(...)]` field attribute parsing shared by the derives.

use syn::punctuated::Punctuated;
use syn::token::Comma;
use syn::{Data, DeriveInput, Field, Fields, LitStr, Result};

pub struct FieldAttrs {
    pub column: Option<String>,
    pub skip: bool,
}

impl FieldAttrs {
    pub fn parse(field: &Field) -> Result<Self> {
        let mut attrs = FieldAttrs {
            column: None,
            skip: false,
        };
        for attr in &field.attrs {
            if !attr.path().is_ident("orm") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("column") {
                    let lit: LitStr = meta.value()?.parse()?;
                    attrs.column = Some(lit.value());
                    Ok(())
                } else if meta.path.is_ident("skip") {
                    attrs.skip = true;
                    Ok(())
                } else {
                    Err(meta.error(
                        "unsupported orm attribute; expected `column = \"...\"` or `skip`",
                    ))
                }
            })?;
        }
        Ok(attrs)
    }

    /// Column name, defaulting to the field name.
    pub fn column_for(&self, ident: &syn::Ident) -> String {
        self.column.clone().unwrap_or_else(|| ident.to_string())
    }
}

/// Named fields of a struct, or an error naming the derive.
pub fn named_fields<'a>(
    input: &'a DeriveInput,
    derive: &str,
) -> Result<&'a Punctuated<Field, Comma>> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => Ok(&fields.named),
            _ => Err(syn::Error::new_spanned(
                input,
                format!("{derive} can only be derived for structs with named fields"),
            )),
        },
        _ => Err(syn::Error::new_spanned(
            input,
            format!("{derive} can only be derived for structs"),
        )),
    }
}
