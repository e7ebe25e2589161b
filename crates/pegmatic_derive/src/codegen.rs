//! Emitting the `RuleBody` construction for a split rule function.

use crate::split::{ActionChunk, RulePlan, Segment};
use proc_macro2::TokenStream;
use quote::{ToTokens, quote};
use syn::{ItemFn, LitStr};

/// Options given in `#[rule(...)]`.
#[derive(Default)]
pub(crate) struct RuleArgs {
    pub label: Option<LitStr>,
    pub suppress_node: bool,
}

pub(crate) fn expand(args: &RuleArgs, func: &ItemFn, plan: &RulePlan) -> TokenStream {
    let ItemFn {
        attrs, vis, sig, ..
    } = func;
    let name = sig.ident.to_string();
    let builder = &plan.builder;
    let key_args = plan
        .params
        .iter()
        .map(|param| quote! { .arg(::core::clone::Clone::clone(&#param)) });
    let steps = plan.segments.iter().map(|segment| match segment {
        Segment::Eager { ident, expr } => quote! {
            let #ident = #expr;
        },
        Segment::Match { expr, bind: None } => quote! {
            __body = __body.then(#expr);
        },
        Segment::Match {
            expr,
            bind: Some(ident),
        } => {
            let name = ident.to_string();
            quote! {
                __body = __body.bind(#name, #expr);
            }
        }
        Segment::Action(chunk) => action(chunk),
    });
    let label = args.label.as_ref().map(|label| {
        quote! { #builder.label(__id, #label)?; }
    });
    let suppress = args.suppress_node.then(|| {
        quote! { #builder.without_node(__id)?; }
    });

    quote! {
        #(#attrs)*
        #vis #sig {
            #builder.rule(::pegmatic::RuleKey::new(#name) #(#key_args)*, |#builder| {
                #[allow(unused_mut)]
                let mut __body = ::pegmatic::RuleBody::of(#builder);
                #(#steps)*
                let __id = __body.build(#builder)?;
                #label
                #suppress
                ::core::result::Result::Ok(__id)
            })
        }
    }
}

/// One deferred closure: load what the chunk reads, run it, store what later
/// chunks read.
fn action(chunk: &ActionChunk) -> TokenStream {
    let params = &chunk.params;
    let captures = chunk.captures.iter().map(|ident| {
        let name = ident.to_string();
        quote! {
            #[allow(unused_variables)]
            let #ident = ctx.capture(#name)?;
        }
    });
    let loads = chunk.loads.iter().map(|(ident, ty)| {
        let name = ident.to_string();
        quote! {
            #[allow(unused_variables, unused_mut)]
            let mut #ident: #ty = ctx.local::<#ty>(#name)?;
        }
    });
    let stmts = chunk.stmts.iter().map(ToTokens::to_token_stream);
    let stores = chunk.stores.iter().map(|(ident, ty)| {
        let name = ident.to_string();
        quote! {
            ctx.set_local::<#ty>(#name, #ident);
        }
    });

    quote! {
        {
            #(let #params = ::core::clone::Clone::clone(&#params);)*
            __body = __body.action(move |ctx| {
                #(#captures)*
                #(#loads)*
                #(#stmts)*
                #(#stores)*
                ::core::result::Result::Ok(true)
            });
        }
    }
}
