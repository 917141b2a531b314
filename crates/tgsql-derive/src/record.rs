//! Record derive macro implementation

use crate::attrs::{FieldAttrs, named_fields};
use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Result};

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let fields = named_fields(&input, "Record")?;

    let mut setters = Vec::with_capacity(fields.len());
    for field in fields {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let attrs = FieldAttrs::parse(field)?;
        if attrs.skip {
            continue;
        }
        let column_name = attrs.column_for(field_name);
        setters.push(quote! {
            .set(#column_name, self.#field_name)
        });
    }

    Ok(quote! {
        impl #impl_generics ::tgsql::Record for #name #ty_generics #where_clause {
            fn into_values(self) -> ::tgsql::Values {
                ::tgsql::Values::new()
                    #(#setters)*
            }
        }
    })
}
