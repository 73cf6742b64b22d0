//! Procedural macros for generating mock implementations.
//!
//! # client
//!
//! Generates a mock implementation for an async client trait whose methods
//! take `&self`. Every method gets a queue of canned return values which are
//! handed out in order, together with a call counter.
//!
//! Use `#[cfg_attr(test, mock::client)]` before `#[async_trait]` to generate
//! the mock only during test compilation:
//!
//! ```ignore
//! use async_trait::async_trait;
//!
//! #[cfg_attr(test, mock::client)]
//! #[async_trait]
//! pub trait HttpClient: Send + Sync + 'static {
//!     async fn get(&self, url: &str) -> Result<HttpResponse, Error>;
//! }
//!
//! // Generates:
//! // pub struct MockHttpClient {
//! //     pub get: std::sync::Mutex<VecDeque<Result<HttpResponse, Error>>>,
//! //     pub get_call_count: AtomicUsize,
//! // }
//! // impl Default for MockHttpClient { ... }
//! // impl MockHttpClient { fn push_get(..); fn get_calls(..) }
//! // #[async_trait] impl HttpClient for MockHttpClient { ... }
//! ```
//!
//! ## Queueing responses and checking call counts in tests
//!
//! ```ignore
//! let http = MockHttpClient::default();
//! http.push_get(Ok(response));
//! assert_eq!(http.get_calls(), 1);
//! ```
//!
//! A call without a queued response panics, which makes unexpected
//! network access fail loudly in tests.

use proc_macro::TokenStream;
use quote::ToTokens;
use quote::{format_ident, quote};
use syn::{FnArg, ItemTrait, ReturnType, TraitItem, parse_macro_input};

/// Generates a queued-response mock implementation for an async trait.
#[proc_macro_attribute]
pub fn client(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemTrait);
    let trait_name = &input.ident;
    let mock_name = format_ident!("Mock{}", trait_name);
    let vis = &input.vis;

    let mut field_definitions = Vec::new();
    let mut default_fields = Vec::new();
    let mut impl_methods = Vec::new();
    let mut helper_methods = Vec::new();

    for item in &input.items {
        let TraitItem::Fn(method) = item else {
            continue;
        };
        let method_name = &method.sig.ident;
        let call_count_field = format_ident!("{}_call_count", method_name);
        let call_count_method = format_ident!("{}_calls", method_name);
        let push_method = format_ident!("push_{}", method_name);
        let missing_response = format!("no mocked response queued for `{method_name}`");

        let return_type = match &method.sig.output {
            ReturnType::Default => quote! { () },
            ReturnType::Type(_, ty) => quote! { #ty },
        };

        field_definitions.push(quote! {
            pub #method_name: ::std::sync::Mutex<::std::collections::VecDeque<#return_type>>
        });
        field_definitions.push(quote! {
            pub #call_count_field: ::std::sync::atomic::AtomicUsize
        });

        default_fields.push(quote! {
            #method_name: ::std::sync::Mutex::new(::std::collections::VecDeque::new())
        });
        default_fields.push(quote! {
            #call_count_field: ::std::sync::atomic::AtomicUsize::new(0)
        });

        helper_methods.push(quote! {
            pub fn #push_method(&self, response: #return_type) {
                self.#method_name.lock().unwrap().push_back(response);
            }

            pub fn #call_count_method(&self) -> usize {
                self.#call_count_field.load(::std::sync::atomic::Ordering::SeqCst)
            }
        });

        let params: Vec<_> = method
            .sig
            .inputs
            .iter()
            .filter_map(|arg| {
                if let FnArg::Typed(pat_type) = arg {
                    let ty = &pat_type.ty;
                    let pat_str = pat_type.pat.to_token_stream().to_string();
                    let prefixed_name = format_ident!("_{}", pat_str);
                    Some(quote! { #prefixed_name: #ty })
                } else {
                    None
                }
            })
            .collect();

        impl_methods.push(quote! {
            async fn #method_name(&self, #(#params),*) -> #return_type {
                self.#call_count_field.fetch_add(1, ::std::sync::atomic::Ordering::SeqCst);
                let response = self.#method_name.lock().unwrap().pop_front();
                response.expect(#missing_response)
            }
        });
    }

    let expanded = quote! {
        #input

        #vis struct #mock_name {
            #(#field_definitions),*
        }

        impl ::std::default::Default for #mock_name {
            fn default() -> Self {
                Self {
                    #(#default_fields),*
                }
            }
        }

        impl #mock_name {
            #(#helper_methods)*
        }

        #[::async_trait::async_trait]
        impl #trait_name for #mock_name {
            #(#impl_methods)*
        }
    };

    TokenStream::from(expanded)
}
