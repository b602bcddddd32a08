//! Derive macro for error types.
//!
//! `#[derive(Error)]` turns `#[error("...")]` attributes into `Display`
//! and `std::error::Error` implementations. Named fields interpolate
//! through implicit format capture (`{field}` binds the destructured
//! identifier); tuple fields are handed to `write!` positionally, so
//! `{0}`, `{1}` address them directly.
//!
//! # Usage
//!
//! ```ignore
//! use peerchain_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum StoreError {
//!     #[error("block {0} not found")]
//!     NotFound(String),
//!
//!     #[error("depth mismatch: expected {expected}, got {actual}")]
//!     DepthMismatch { expected: u64, actual: u64 },
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote, ToTokens};
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr};

/// Derives `Display` and `Error` for an enum or struct.
///
/// Every variant (or the struct itself) must carry exactly one
/// `#[error("...")]` attribute with a single string literal.
pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let display_body = match &input.data {
        Data::Enum(data) => {
            let mut arms = Vec::new();
            for variant in &data.variants {
                let message = error_message(&variant.attrs, variant)?;
                let ident = &variant.ident;
                let (pattern, args) = render_fields(&variant.fields);
                arms.push(quote! {
                    Self::#ident #pattern => write!(f, #message #args),
                });
            }
            quote! {
                match self {
                    #(#arms)*
                }
            }
        }
        Data::Struct(data) => {
            let message = error_message(&input.attrs, input)?;
            let (pattern, args) = render_fields(&data.fields);
            quote! {
                let Self #pattern = self;
                write!(f, #message #args)
            }
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Error derive does not support unions",
            ))
        }
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #display_body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Destructuring pattern and trailing `write!` arguments for a field set.
///
/// Named fields need no arguments: the format string captures the bound
/// identifiers implicitly. Tuple fields are bound as `f0`, `f1`, .. and
/// appended positionally.
fn render_fields(fields: &Fields) -> (TokenStream2, TokenStream2) {
    match fields {
        Fields::Named(named) => {
            let idents: Vec<_> = named
                .named
                .iter()
                .map(|field| field.ident.as_ref().expect("named field has an ident"))
                .collect();
            (quote! { { #(#idents),* } }, quote! {})
        }
        Fields::Unnamed(unnamed) => {
            let idents: Vec<_> = (0..unnamed.unnamed.len())
                .map(|index| format_ident!("f{}", index))
                .collect();
            (quote! { (#(#idents),*) }, quote! { , #(#idents),* })
        }
        Fields::Unit => (quote! {}, quote! {}),
    }
}

/// Pulls the message literal out of the `#[error("...")]` attribute.
fn error_message<T: ToTokens>(attrs: &[syn::Attribute], target: &T) -> syn::Result<LitStr> {
    for attr in attrs {
        if attr.path().is_ident("error") {
            return attr.parse_args::<LitStr>().map_err(|_| {
                syn::Error::new_spanned(
                    attr,
                    "#[error(..)] takes a single string literal, e.g. #[error(\"bad frame: {0}\")]",
                )
            });
        }
    }

    Err(syn::Error::new_spanned(
        target,
        "missing #[error(\"...\")] attribute; every error must declare a display message",
    ))
}
