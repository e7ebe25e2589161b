//! Procedural macros for pegmatic
//!
//! This crate provides the `#[rule]` attribute, which turns a plain function
//! body into a cached rule whose inline action code runs during parsing.

use proc_macro::TokenStream;
use syn::{ItemFn, LitStr, parse_macro_input};

mod codegen;
mod split;

use codegen::RuleArgs;

/// Turn a function into a cached rule factory with deferred actions.
///
/// The first parameter is the grammar builder; any further parameters are
/// evaluated eagerly and become part of the rule's cache key, so they must be
/// `Clone + Into<KeyArg>`. The body is a list of statements:
///
/// - `sub(g, ..)?;` or `g.method(..)?;` matches a sub-rule at this point.
/// - `let x = sub(g)?;` does the same and binds the match; later action code
///   reads it as `x`, a `Captured` holding its range and value.
/// - A `let x = ..?;` whose `x` a later step passes to the builder, as in
///   `let d = g.char_range('0', '9')?; g.one_or_more(d)?;`, only builds the
///   matcher for that call and is not a step of its own.
/// - Builder calls nested in a step's arguments, as in
///   `g.optional(g.ch('-')?)?;`, are built first, innermost first.
/// - Anything else is action code. It runs only when the parse reaches it
///   during a real (not lookahead) match, with the current context available
///   as `ctx`. Consecutive statements run as one action.
///
/// Locals declared in action code are visible across later rule steps only
/// when they carry a type (`let n: i64 = ..;`). `return`, tail expressions
/// and builder use inside control flow are rejected; use
/// `pegmatic::require!(cond)` to fail the match from action code.
///
/// # Attributes
///
/// - `label = "..."`: diagnostic label instead of the function name.
/// - `suppress_node`: build no parse-tree node for this rule.
///
/// # Example
///
/// ```rust,ignore
/// use pegmatic::grammar::{GrammarBuilder, RuleResult};
/// use pegmatic::rule;
///
/// #[rule(label = "Number")]
/// fn number(g: &mut GrammarBuilder<i64>) -> RuleResult {
///     let digits = digits(g)?;
///     let n: i64 = ctx.text_of(&digits).parse().unwrap_or_default();
///     ctx.set_value(n);
/// }
/// ```
#[proc_macro_attribute]
pub fn rule(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = RuleArgs::default();
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("label") {
            args.label = Some(meta.value()?.parse::<LitStr>()?);
            Ok(())
        } else if meta.path.is_ident("suppress_node") {
            args.suppress_node = true;
            Ok(())
        } else {
            Err(meta.error("unsupported rule attribute, expected `label = \"..\"` or `suppress_node`"))
        }
    });
    parse_macro_input!(attr with parser);
    let func = parse_macro_input!(item as ItemFn);

    match split::split(&func) {
        Ok(plan) => codegen::expand(&args, &func, &plan).into(),
        Err(err) => err.to_compile_error().into(),
    }
}
