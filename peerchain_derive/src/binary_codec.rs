//! Derive macro for the position-based wire format.
//!
//! `#[derive(BinaryCodec)]` wires a type into `types::encoding`: struct
//! fields serialize in declaration order, enum variants as a single tag
//! byte assigned sequentially from zero, followed by the variant payload.
//! Endianness, length prefixes and tag validation live in the trait impls,
//! so the expansion is nothing but field-by-field trait calls. Decoding
//! binds every field to a local before construction, keeping the byte
//! consumption order visible in the generated code.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DataEnum, DeriveInput, Fields};

/// Derives `Encode` and `Decode` for a struct or enum.
///
/// # Example
///
/// ```ignore
/// use peerchain_derive::BinaryCodec;
///
/// #[derive(BinaryCodec)]
/// pub struct Block {
///     pub depth: u64,
///     pub prev_hash: Hash,
/// }
/// ```
///
/// Enum tags follow declaration order; explicit discriminants are rejected
/// so a reordered variant list cannot silently disagree with its pinned
/// wire value.
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let (encode_body, decode_body) = match &input.data {
        Data::Struct(data) => struct_bodies(&data.fields),
        Data::Enum(data) => enum_bodies(data)?,
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "BinaryCodec derive does not support unions",
            ))
        }
    };
    Ok(trait_impls(input, encode_body, decode_body))
}

/// Wraps the generated bodies in the `Encode`/`Decode` impl blocks.
fn trait_impls(
    input: &DeriveInput,
    encode_body: TokenStream2,
    decode_body: TokenStream2,
) -> TokenStream2 {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #encode_body
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            fn decode(input: &mut &[u8]) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                #decode_body
            }
        }
    }
}

/// Binding names for a field set: the identifiers themselves for named
/// fields, `f0`, `f1`, .. for tuple fields.
fn bindings(fields: &Fields) -> Vec<syn::Ident> {
    match fields {
        Fields::Named(named) => named
            .named
            .iter()
            .map(|field| field.ident.clone().expect("named field has an ident"))
            .collect(),
        Fields::Unnamed(unnamed) => (0..unnamed.unnamed.len())
            .map(|index| format_ident!("f{}", index))
            .collect(),
        Fields::Unit => Vec::new(),
    }
}

/// `Self { a, b }`, `Self(f0, f1)` or `Self`, from the bound field names.
fn construction(fields: &Fields, vars: &[syn::Ident]) -> TokenStream2 {
    match fields {
        Fields::Named(_) => quote! { Self { #(#vars),* } },
        Fields::Unnamed(_) => quote! { Self(#(#vars),*) },
        Fields::Unit => quote! { Self },
    }
}

fn struct_bodies(fields: &Fields) -> (TokenStream2, TokenStream2) {
    let vars = bindings(fields);
    let construct = construction(fields, &vars);

    if vars.is_empty() {
        // Nothing on the wire; silence the unused parameters
        return (
            quote! { let _ = out; },
            quote! {
                let _ = input;
                Ok(#construct)
            },
        );
    }

    // Encode walks the fields off `self` in declaration order
    let accessors: Vec<TokenStream2> = match fields {
        Fields::Named(_) => vars.iter().map(|var| quote! { &self.#var }).collect(),
        Fields::Unnamed(unnamed) => (0..unnamed.unnamed.len())
            .map(syn::Index::from)
            .map(|index| quote! { &self.#index })
            .collect(),
        Fields::Unit => Vec::new(),
    };
    let encode = quote! {
        #(crate::types::encoding::Encode::encode(#accessors, out);)*
    };

    let decode = quote! {
        #(let #vars = crate::types::encoding::Decode::decode(input)?;)*
        Ok(#construct)
    };

    (encode, decode)
}

fn enum_bodies(data: &DataEnum) -> syn::Result<(TokenStream2, TokenStream2)> {
    if data.variants.len() > usize::from(u8::MAX) + 1 {
        return Err(syn::Error::new_spanned(
            &data.variants,
            "wire tags are a single byte; an enum may carry at most 256 variants",
        ));
    }

    let mut encode_arms = Vec::new();
    let mut decode_arms = Vec::new();

    for (index, variant) in data.variants.iter().enumerate() {
        if let Some((_, expr)) = &variant.discriminant {
            return Err(syn::Error::new_spanned(
                expr,
                "wire tags follow declaration order; explicit discriminants are not supported",
            ));
        }

        let tag = index as u8;
        let ident = &variant.ident;
        let vars = bindings(&variant.fields);

        let pattern = match &variant.fields {
            Fields::Named(_) => quote! { Self::#ident { #(#vars),* } },
            Fields::Unnamed(_) => quote! { Self::#ident(#(#vars),*) },
            Fields::Unit => quote! { Self::#ident },
        };
        encode_arms.push(quote! {
            #pattern => {
                crate::types::encoding::Encode::encode(&#tag, out);
                #(crate::types::encoding::Encode::encode(#vars, out);)*
            }
        });

        let construct = construction(&variant.fields, &vars);
        decode_arms.push(quote! {
            #tag => {
                #(let #vars = crate::types::encoding::Decode::decode(input)?;)*
                Ok(#construct)
            }
        });
    }

    let encode = quote! {
        match self {
            #(#encode_arms)*
        }
    };
    let decode = quote! {
        let tag: u8 = crate::types::encoding::Decode::decode(input)?;
        match tag {
            #(#decode_arms)*
            _ => Err(crate::types::encoding::DecodeError::InvalidTag),
        }
    };

    Ok((encode, decode))
}
