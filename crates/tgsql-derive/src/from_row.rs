//! FromRow derive macro implementation

use crate::attrs::{FieldAttrs, named_fields};
use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Result};

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let fields = named_fields(&input, "FromRow")?;

    let mut field_extracts = Vec::with_capacity(fields.len());
    for field in fields {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let attrs = FieldAttrs::parse(field)?;
        if attrs.skip {
            field_extracts.push(quote! {
                #field_name: ::core::default::Default::default()
            });
            continue;
        }
        let column_name = attrs.column_for(field_name);
        field_extracts.push(quote! {
            #field_name: row.try_get_column(#column_name)?
        });
    }

    Ok(quote! {
        impl #impl_generics ::tgsql::FromRow for #name #ty_generics #where_clause {
            fn from_row(row: &::tgsql::tokio_postgres::Row) -> ::tgsql::DbResult<Self> {
                use ::tgsql::RowExt;
                Ok(Self {
                    #(#field_extracts),*
                })
            }
        }
    })
}
