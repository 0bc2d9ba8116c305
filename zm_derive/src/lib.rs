#![allow(clippy::all)]
#![deny(unused_variables, clippy::unnecessary_mut_passed, unused_results)]

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

/// Generates the `new(args)` constructor and the `name()` accessor every
/// logical module exposes on top of `LogicalModule::inner_new`.
#[proc_macro_derive(LogicalModule)]
pub fn logical_module_macro_derive(input: TokenStream) -> TokenStream {
    let input: DeriveInput = parse_macro_input!(input);
    let DeriveInput {
        ident, generics, ..
    } = input;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let output = quote! {
        impl #impl_generics #ident #ty_generics #where_clause {
            pub fn new(args: LogicalModuleNewArgs) -> Self {
                tracing::debug!("new module {}", stringify!(#ident));
                Self::inner_new(args)
            }

            pub fn name() -> &'static str {
                stringify!(#ident)
            }
        }
    };
    output.into()
}
