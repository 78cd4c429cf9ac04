//! Derive macros for Stoa payload and validation contracts.
//!
//! - `#[derive(Respond)]` marks a serializable business type as a structured
//!   payload, so it can be rendered by the `json`, `pure-json`, `xml`, and
//!   template response modes.
//! - `#[derive(Validate)]` provides the default (accept-everything) input
//!   contract for bound input shapes without hand-written boilerplate.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde::{Deserialize, Serialize};
//! use stoa::{Respond, Validate};
//!
//! #[derive(Deserialize, Validate)]
//! struct WidgetQuery {
//!     id: i64,
//! }
//!
//! #[derive(Serialize, Respond)]
//! struct Widget {
//!     id: i64,
//!     name: String,
//! }
//! ```

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

/// Implements `stoa::Respond` for a serializable type as a structured
/// payload.
///
/// The generated implementation declares the structured capability and
/// produces the payload's JSON value through `serde`, which is what the
/// structured response modes (`json`, `pure-json`, `xml`, templates)
/// consume. The type must implement `serde::Serialize`.
#[proc_macro_derive(Respond)]
pub fn derive_respond(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::stoa::Respond for #name #ty_generics #where_clause {
            fn caps() -> ::stoa::RespondCaps {
                ::stoa::RespondCaps::STRUCTURED
            }

            fn to_value(
                &self,
            ) -> ::std::result::Result<::stoa::__private::serde_json::Value, ::stoa::Fault> {
                ::stoa::__private::serde_json::to_value(self)
                    .map_err(|e| ::stoa::Fault::internal(e.to_string()))
            }
        }
    };

    TokenStream::from(expanded)
}

/// Implements `stoa::Validate` with the default accept-everything contract.
///
/// Input shapes with real field-level constraints implement the trait by
/// hand instead of deriving it.
#[proc_macro_derive(Validate)]
pub fn derive_validate(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::stoa::Validate for #name #ty_generics #where_clause {}
    };

    TokenStream::from(expanded)
}
