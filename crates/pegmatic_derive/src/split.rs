//! Splitting a rule function body into match steps and action chunks.

use proc_macro2::{Span, TokenStream, TokenTree};
use quote::format_ident;
use syn::visit::{self, Visit};
use syn::visit_mut::{self, VisitMut};
use syn::{
    Expr, ExprClosure, ExprPath, ExprReturn, FnArg, Ident, ItemFn, Local, LocalInit, Macro, Pat,
    PatIdent, PatType, Stmt, Type,
};

/// A rule function taken apart.
pub(crate) struct RulePlan {
    /// Name of the builder parameter (conventionally `g`).
    pub builder: Ident,
    /// Remaining parameters, which form the cache key.
    pub params: Vec<Ident>,
    pub segments: Vec<Segment>,
}

pub(crate) enum Segment {
    /// A matcher built at construction time only to be passed to a later
    /// builder call; it is not a step of the rule.
    Eager { ident: Ident, expr: Expr },
    /// A sub-rule match evaluated at construction time, optionally bound.
    Match { expr: Expr, bind: Option<Ident> },
    /// Consecutive action statements, run as one deferred closure.
    Action(ActionChunk),
}

pub(crate) struct ActionChunk {
    pub stmts: Vec<Stmt>,
    /// Captured matches read by the chunk.
    pub captures: Vec<Ident>,
    /// Typed locals of earlier chunks read by the chunk.
    pub loads: Vec<(Ident, Type)>,
    /// Typed locals a later chunk reads.
    pub stores: Vec<(Ident, Type)>,
    /// Function parameters the chunk uses.
    pub params: Vec<Ident>,
}

#[derive(Clone)]
enum Binding {
    Capture,
    Eager,
    Typed(Type),
    Untyped,
}

struct RawChunk {
    stmts: Vec<Stmt>,
    idents: Vec<Ident>,
    declared: Vec<(Ident, Binding)>,
}

enum RawSegment {
    Eager { ident: Ident, expr: Expr },
    Match { expr: Expr, bind: Option<Ident> },
    Action(RawChunk),
}

pub(crate) fn split(func: &ItemFn) -> syn::Result<RulePlan> {
    let (builder, params) = parameters(func)?;

    let mut raw: Vec<RawSegment> = Vec::new();
    let mut temporaries = 0;
    let count = func.block.stmts.len();
    for (index, stmt) in func.block.stmts.iter().enumerate() {
        if let Some((mut expr, bind)) = rule_step(stmt, &builder) {
            for (ident, arg) in hoist_arguments(&mut expr, &builder, &mut temporaries) {
                raw.push(RawSegment::Eager { ident, expr: arg });
            }
            raw.push(RawSegment::Match { expr, bind });
            continue;
        }
        check_action_stmt(stmt, &builder, index + 1 == count)?;
        let idents = idents_of(stmt);
        let declared = declarations(stmt);
        if let Some(RawSegment::Action(chunk)) = raw.last_mut() {
            chunk.stmts.push(stmt.clone());
            chunk.idents.extend(idents);
            chunk.declared.extend(declared);
        } else {
            raw.push(RawSegment::Action(RawChunk {
                stmts: vec![stmt.clone()],
                idents,
                declared,
            }));
        }
    }

    resolve(builder, params, eager_bindings(raw))
}

/// Bound steps whose name a later step passes to the builder are matchers
/// handed to that call, not steps of their own.
fn eager_bindings(raw: Vec<RawSegment>) -> Vec<RawSegment> {
    let step_idents: Vec<Vec<Ident>> = raw
        .iter()
        .map(|segment| match segment {
            RawSegment::Eager { expr, .. } | RawSegment::Match { expr, .. } => expr_idents(expr),
            RawSegment::Action(_) => Vec::new(),
        })
        .collect();
    raw.into_iter()
        .enumerate()
        .map(|(index, segment)| match segment {
            RawSegment::Match {
                expr,
                bind: Some(ident),
            } if step_idents[index + 1..]
                .iter()
                .any(|idents| idents.contains(&ident)) =>
            {
                RawSegment::Eager { ident, expr }
            }
            other => other,
        })
        .collect()
}

/// Move builder calls nested in the arguments of a step into temporaries
/// built before it, innermost first, so that the builder is never borrowed
/// twice.
fn hoist_arguments(expr: &mut Expr, builder: &Ident, counter: &mut usize) -> Vec<(Ident, Expr)> {
    let mut hoist = Hoist {
        builder,
        counter,
        hoisted: Vec::new(),
    };
    if let Expr::Try(step) = expr {
        match step.expr.as_mut() {
            Expr::Call(call) => call.args.iter_mut().for_each(|arg| hoist.visit_expr_mut(arg)),
            Expr::MethodCall(call) => call.args.iter_mut().for_each(|arg| hoist.visit_expr_mut(arg)),
            _ => {}
        }
    }
    hoist.hoisted
}

struct Hoist<'a> {
    builder: &'a Ident,
    counter: &'a mut usize,
    hoisted: Vec<(Ident, Expr)>,
}

impl VisitMut for Hoist<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        visit_mut::visit_expr_mut(self, expr);
        let Expr::Try(nested) = expr else {
            return;
        };
        if !uses_builder(&nested.expr, self.builder) {
            return;
        }
        let ident = format_ident!("__arg{}", *self.counter, span = Span::mixed_site());
        *self.counter += 1;
        let path = Expr::Path(ExprPath {
            attrs: Vec::new(),
            qself: None,
            path: ident.clone().into(),
        });
        let call = std::mem::replace(expr, path);
        self.hoisted.push((ident, call));
    }

    fn visit_expr_closure_mut(&mut self, _: &mut ExprClosure) {}

    fn visit_item_mut(&mut self, _: &mut syn::Item) {}
}

fn parameters(func: &ItemFn) -> syn::Result<(Ident, Vec<Ident>)> {
    let mut inputs = func.sig.inputs.iter();
    let builder = match inputs.next() {
        Some(FnArg::Typed(PatType { pat, .. })) => match pat.as_ref() {
            Pat::Ident(PatIdent { ident, .. }) => ident.clone(),
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "the builder parameter must be a plain identifier",
                ));
            }
        },
        Some(FnArg::Receiver(receiver)) => {
            return Err(syn::Error::new_spanned(
                receiver,
                "#[rule] functions cannot take `self`",
            ));
        }
        None => {
            return Err(syn::Error::new_spanned(
                &func.sig,
                "#[rule] functions take the grammar builder as their first parameter",
            ));
        }
    };

    let mut params = Vec::new();
    for input in inputs {
        match input {
            FnArg::Typed(PatType { pat, .. }) => match pat.as_ref() {
                Pat::Ident(PatIdent { ident, .. }) => params.push(ident.clone()),
                other => {
                    return Err(syn::Error::new_spanned(
                        other,
                        "rule parameters must be plain identifiers",
                    ));
                }
            },
            FnArg::Receiver(receiver) => {
                return Err(syn::Error::new_spanned(
                    receiver,
                    "#[rule] functions cannot take `self`",
                ));
            }
        }
    }
    Ok((builder, params))
}

/// `sub(g, ..)?;`, `g.method(..)?;` or `let x = <either>;`.
fn rule_step(stmt: &Stmt, builder: &Ident) -> Option<(Expr, Option<Ident>)> {
    match stmt {
        Stmt::Expr(expr @ Expr::Try(try_expr), Some(_)) if uses_builder(&try_expr.expr, builder) => {
            Some((expr.clone(), None))
        }
        Stmt::Local(Local {
            pat: Pat::Ident(PatIdent {
                ident,
                by_ref: None,
                subpat: None,
                ..
            }),
            init:
                Some(LocalInit {
                    expr,
                    diverge: None,
                    ..
                }),
            ..
        }) => match expr.as_ref() {
            Expr::Try(try_expr) if uses_builder(&try_expr.expr, builder) => {
                Some((expr.as_ref().clone(), Some(ident.clone())))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Whether `expr` is a call taking the builder, or a method on it.
fn uses_builder(expr: &Expr, builder: &Ident) -> bool {
    match expr {
        Expr::Call(call) => call.args.iter().any(|arg| is_ident(arg, builder)),
        Expr::MethodCall(call) => is_ident(&call.receiver, builder),
        _ => false,
    }
}

fn is_ident(expr: &Expr, ident: &Ident) -> bool {
    matches!(expr, Expr::Path(path) if path.qself.is_none() && path.path.is_ident(ident))
}

fn check_action_stmt(stmt: &Stmt, builder: &Ident, is_last: bool) -> syn::Result<()> {
    if idents_of(stmt).iter().any(|ident| ident == builder) {
        let message = match stmt {
            Stmt::Expr(expr, _) if uses_builder(expr, builder) => {
                format!("rule steps must propagate construction errors: `{builder}` calls need a trailing `?`")
            }
            Stmt::Local(Local {
                pat: Pat::Type(_), ..
            }) => format!(
                "a bound rule step is a captured match and cannot have a type annotation; write `let x = sub({builder})?;`"
            ),
            _ => format!(
                "`{builder}` can only be used in top-level rule steps such as `sub({builder})?;` or `let x = sub({builder})?;`, not inside control flow or action code"
            ),
        };
        return Err(syn::Error::new_spanned(stmt, message));
    }

    match stmt {
        Stmt::Item(item) => {
            return Err(syn::Error::new_spanned(
                item,
                "items cannot be declared inside a rule body",
            ));
        }
        Stmt::Expr(expr, None) if is_last && !is_block_like(expr) => {
            return Err(syn::Error::new_spanned(
                expr,
                "a rule body cannot end in an expression; the rule is built from its statements",
            ));
        }
        _ => {}
    }

    let mut returns = Returns(None);
    returns.visit_stmt(stmt);
    if let Some(span) = returns.0 {
        return Err(syn::Error::new(
            span,
            "`return` is not allowed in a rule body; use `require!(..)` to fail the match",
        ));
    }
    Ok(())
}

/// Expressions that may stand as statements without a semicolon.
const fn is_block_like(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::If(_)
            | Expr::Match(_)
            | Expr::Block(_)
            | Expr::Loop(_)
            | Expr::While(_)
            | Expr::ForLoop(_)
            | Expr::Unsafe(_)
    )
}

/// Finds `return` outside nested closures and items.
struct Returns(Option<Span>);

impl<'ast> Visit<'ast> for Returns {
    fn visit_expr_return(&mut self, node: &'ast ExprReturn) {
        self.0.get_or_insert(node.return_token.span);
    }

    fn visit_expr_closure(&mut self, _: &'ast ExprClosure) {}

    fn visit_item(&mut self, _: &'ast syn::Item) {}
}

/// Every identifier in a statement, including inside macro invocations.
struct Idents(Vec<Ident>);

impl<'ast> Visit<'ast> for Idents {
    fn visit_ident(&mut self, ident: &'ast Ident) {
        self.0.push(ident.clone());
    }

    fn visit_macro(&mut self, mac: &'ast Macro) {
        visit::visit_path(self, &mac.path);
        collect_tokens(mac.tokens.clone(), &mut self.0);
    }
}

fn collect_tokens(tokens: TokenStream, out: &mut Vec<Ident>) {
    for tree in tokens {
        match tree {
            TokenTree::Ident(ident) => out.push(ident),
            TokenTree::Group(group) => collect_tokens(group.stream(), out),
            TokenTree::Punct(_) | TokenTree::Literal(_) => {}
        }
    }
}

fn idents_of(stmt: &Stmt) -> Vec<Ident> {
    let mut idents = Idents(Vec::new());
    idents.visit_stmt(stmt);
    idents.0
}

fn expr_idents(expr: &Expr) -> Vec<Ident> {
    let mut idents = Idents(Vec::new());
    idents.visit_expr(expr);
    idents.0
}

/// Locals a top-level `let` introduces.
fn declarations(stmt: &Stmt) -> Vec<(Ident, Binding)> {
    let Stmt::Local(local) = stmt else {
        return Vec::new();
    };
    match &local.pat {
        Pat::Type(PatType { pat, ty, .. }) => match pat.as_ref() {
            Pat::Ident(PatIdent { ident, .. }) => {
                vec![(ident.clone(), Binding::Typed(ty.as_ref().clone()))]
            }
            other => pattern_idents(other),
        },
        other => pattern_idents(other),
    }
}

fn pattern_idents(pat: &Pat) -> Vec<(Ident, Binding)> {
    struct Bindings(Vec<(Ident, Binding)>);
    impl<'ast> Visit<'ast> for Bindings {
        fn visit_pat_ident(&mut self, node: &'ast PatIdent) {
            self.0.push((node.ident.clone(), Binding::Untyped));
            visit::visit_pat_ident(self, node);
        }
    }
    let mut bindings = Bindings(Vec::new());
    bindings.visit_pat(pat);
    bindings.0
}

/// Work out what every action chunk loads from and stores into the
/// invocation frame.
fn resolve(builder: Ident, params: Vec<Ident>, raw: Vec<RawSegment>) -> syn::Result<RulePlan> {
    // Names referenced by each segment, used to decide which typed locals
    // must outlive their chunk.
    let referenced: Vec<Vec<Ident>> = raw
        .iter()
        .map(|segment| match segment {
            RawSegment::Action(chunk) => chunk.idents.clone(),
            RawSegment::Eager { .. } | RawSegment::Match { .. } => Vec::new(),
        })
        .collect();

    let mut scope: Vec<(Ident, Binding)> = Vec::new();
    let mut segments = Vec::with_capacity(raw.len());
    for (index, segment) in raw.into_iter().enumerate() {
        let chunk = match segment {
            RawSegment::Eager { ident, expr } => {
                scope.push((ident.clone(), Binding::Eager));
                segments.push(Segment::Eager { ident, expr });
                continue;
            }
            RawSegment::Match { expr, bind } => {
                if let Some(name) = &bind {
                    scope.push((name.clone(), Binding::Capture));
                }
                segments.push(Segment::Match { expr, bind });
                continue;
            }
            RawSegment::Action(chunk) => chunk,
        };

        let mut captures = Vec::new();
        let mut loads = Vec::new();
        let mut used_params = Vec::new();
        for ident in unique(&chunk.idents) {
            let redeclared = chunk.declared.iter().any(|(name, _)| *name == ident);
            match scope.iter().rev().find(|(name, _)| *name == ident) {
                Some((_, Binding::Capture)) => captures.push(ident),
                Some((_, Binding::Eager)) => {}
                Some((_, Binding::Typed(ty))) => loads.push((ident, ty.clone())),
                Some((_, Binding::Untyped)) if redeclared => {}
                Some((_, Binding::Untyped)) => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!(
                            "`{ident}` is declared without a type in an earlier action and a rule step runs in between; annotate it (`let {ident}: T = ..`) to carry it across"
                        ),
                    ));
                }
                None if !redeclared && params.contains(&ident) => used_params.push(ident),
                None => {}
            }
        }

        // Typed locals alive at the end of the chunk, latest declaration wins.
        let mut live = loads.clone();
        for (name, binding) in &chunk.declared {
            live.retain(|(existing, _)| existing != name);
            if let Binding::Typed(ty) = binding {
                live.push((name.clone(), ty.clone()));
            }
        }
        let stores = live
            .into_iter()
            .filter(|(name, _)| {
                referenced[index + 1..]
                    .iter()
                    .any(|idents| idents.contains(name))
            })
            .collect();

        scope.extend(chunk.declared);
        segments.push(Segment::Action(ActionChunk {
            stmts: chunk.stmts,
            captures,
            loads,
            stores,
            params: used_params,
        }));
    }

    Ok(RulePlan {
        builder,
        params,
        segments,
    })
}

fn unique(idents: &[Ident]) -> Vec<Ident> {
    let mut seen: Vec<Ident> = Vec::new();
    for ident in idents {
        if !seen.contains(ident) {
            seen.push(ident.clone());
        }
    }
    seen
}
