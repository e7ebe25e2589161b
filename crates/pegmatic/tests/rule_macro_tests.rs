//! Tests for the `#[rule]` attribute macro

use pegmatic::grammar::{GrammarBuilder, RuleKey, RuleResult};
use pegmatic::{ActionFault, ParseError, rule};
use std::sync::atomic::{AtomicUsize, Ordering};

fn digit_run(g: &mut GrammarBuilder<i64>) -> RuleResult {
    let digit = g.char_range('0', '9')?;
    g.one_or_more(digit)
}

fn spaces(g: &mut GrammarBuilder<i64>) -> RuleResult {
    let space = g.ch(' ')?;
    g.zero_or_more(space)
}

#[rule(label = "Number")]
fn number(g: &mut GrammarBuilder<i64>) -> RuleResult {
    let digits = digit_run(g)?;
    let n: i64 = ctx
        .text_of(&digits)
        .parse::<i64>()
        .map_err(|e| ActionFault::from_error(&e))?;
    ctx.set_value(n);
}

// Sum = Number ('+' Sum)?
#[rule]
fn sum(g: &mut GrammarBuilder<i64>) -> RuleResult {
    let head = number(g)?;
    let tail = plus_sum(g)?;
    ctx.set_value(head.value.unwrap_or(0) + tail.value.unwrap_or(0));
}

fn plus_sum(g: &mut GrammarBuilder<i64>) -> RuleResult {
    let plus = g.ch('+')?;
    let rest = sum(g)?;
    let tail = g.sequence([plus, rest])?;
    g.optional(tail)
}

#[rule(suppress_node)]
fn spacing(g: &mut GrammarBuilder<i64>) -> RuleResult {
    spaces(g)?;
}

#[rule]
fn padded(g: &mut GrammarBuilder<i64>) -> RuleResult {
    spacing(g)?;
    let n = number(g)?;
    spacing(g)?;
    ctx.set_value(n.value.unwrap_or(0));
}

#[rule]
fn bracketed(g: &mut GrammarBuilder<i64>) -> RuleResult {
    let start: usize = ctx.cursor();
    g.ch('[')?;
    let inner = number(g)?;
    g.ch(']')?;
    let width = i64::try_from(ctx.cursor() - start).unwrap_or(0);
    ctx.set_value(inner.value.unwrap_or(0) * 10 + width);
}

#[rule]
fn small(g: &mut GrammarBuilder<i64>) -> RuleResult {
    let n = number(g)?;
    pegmatic::require!(n.value.unwrap_or(0) < 100);
    ctx.set_value(n.value.unwrap_or(0));
}

fn word_boundary(g: &mut GrammarBuilder<i64>) -> RuleResult {
    let lower = g.char_range('a', 'z')?;
    g.test_not(lower)
}

#[rule(label = "Keyword")]
fn keyword(g: &mut GrammarBuilder<i64>, word: &'static str) -> RuleResult {
    g.string(word)?;
    word_boundary(g)?;
    ctx.set_value(i64::try_from(word.len()).unwrap_or(0));
}

fn keywords(g: &mut GrammarBuilder<i64>) -> RuleResult {
    let let_kw = keyword(g, "let")?;
    let if_kw = keyword(g, "if")?;
    let again = keyword(g, "let")?;
    assert_eq!(let_kw, again);
    g.first_of([let_kw, if_kw])
}

// Integer = '-'? [0-9]+
#[rule(label = "Integer")]
fn integer(g: &mut GrammarBuilder<i64>) -> RuleResult {
    let sign = g.optional(g.ch('-')?)?;
    let digit = g.char_range('0', '9')?;
    let run = g.one_or_more(digit)?;
    let magnitude: i64 = ctx
        .text_of(&run)
        .parse::<i64>()
        .map_err(|e| ActionFault::from_error(&e))?;
    ctx.set_value(if ctx.text_of(&sign).is_empty() { magnitude } else { -magnitude });
}

#[rule(label = "Digits")]
fn digits(g: &mut GrammarBuilder<i64>) -> RuleResult {
    digit_run(g)?;
}

#[rule(label = "Quiet", suppress_node)]
fn quiet_digits(g: &mut GrammarBuilder<i64>) -> RuleResult {
    digits(g)?;
}

#[test]
fn test_action_sets_rule_value() {
    let grammar = GrammarBuilder::build(number).unwrap();
    let outcome = pegmatic::parse(&grammar, "1234").unwrap();
    assert_eq!(outcome.value, Some(1234));
    let tree = outcome.tree.unwrap();
    assert_eq!(tree.label, "Number");
    assert_eq!(tree.value, Some(1234));
}

#[test]
fn test_captures_carry_sub_rule_values() {
    let grammar = GrammarBuilder::build(sum).unwrap();
    let outcome = pegmatic::parse(&grammar, "1+20+300").unwrap();
    assert!(outcome.is_complete(8));
    assert_eq!(outcome.value, Some(321));
    assert_eq!(grammar.rule_count(), 2);
}

#[test]
fn test_suppressed_rule_builds_no_node() {
    let grammar = GrammarBuilder::build(padded).unwrap();
    let outcome = pegmatic::parse(&grammar, "  42 ").unwrap();
    assert!(outcome.is_complete(5));
    assert_eq!(outcome.value, Some(42));
    let tree = outcome.tree.unwrap();
    let labels: Vec<_> = tree.children.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(labels, ["Number"]);
    assert!(
        grammar
            .get(grammar.rule_named("spacing").unwrap())
            .unwrap()
            .is_node_suppressed()
    );
}

#[test]
fn test_typed_local_survives_rule_steps() {
    let grammar = GrammarBuilder::build(bracketed).unwrap();
    let outcome = pegmatic::parse(&grammar, "[7]").unwrap();
    assert_eq!(outcome.value, Some(73));
}

#[test]
fn test_require_fails_the_match() {
    let grammar = GrammarBuilder::build(small).unwrap();
    assert_eq!(pegmatic::parse(&grammar, "42").unwrap().value, Some(42));
    let outcome = pegmatic::parse(&grammar, "420").unwrap();
    assert!(!outcome.matched);
    assert_eq!(outcome.cursor, 0);
}

#[test]
fn test_parameters_key_the_rule() {
    let grammar = GrammarBuilder::build(keywords).unwrap();
    assert_eq!(grammar.rule_count(), 2);
    let let_kw = grammar.rule(&RuleKey::new("keyword").arg("let")).unwrap();
    assert_eq!(grammar.label(let_kw), "Keyword");

    assert_eq!(pegmatic::parse(&grammar, "if").unwrap().value, Some(2));
    assert_eq!(pegmatic::parse(&grammar, "let").unwrap().value, Some(3));
    assert!(!pegmatic::parse(&grammar, "lettuce").unwrap().matched);
}

#[test]
fn test_action_fault_reports_rule_label() {
    let grammar = GrammarBuilder::build(number).unwrap();
    let err = pegmatic::parse(&grammar, "99999999999999999999").unwrap_err();
    assert!(
        matches!(&err, ParseError::Action { label, position: 20, .. } if label == "Number"),
        "unexpected error: {err:?}"
    );
    assert!(err.to_string().starts_with("action in `Number` failed at position 20"));
}

static COUNTED_RUNS: AtomicUsize = AtomicUsize::new(0);

#[rule]
fn counted(g: &mut GrammarBuilder<i64>) -> RuleResult {
    g.ch('c')?;
    COUNTED_RUNS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn test_macro_actions_skip_lookahead() {
    let grammar = GrammarBuilder::<i64>::build(|g| {
        let c = counted(g)?;
        let peek = g.test(c)?;
        g.sequence([peek, c])
    })
    .unwrap();
    assert!(pegmatic::parse(&grammar, "c").unwrap().matched);
    assert_eq!(COUNTED_RUNS.load(Ordering::SeqCst), 1);
}

#[test]
fn test_built_matchers_pass_to_later_steps() {
    let grammar = GrammarBuilder::build(integer).unwrap();
    assert_eq!(pegmatic::parse(&grammar, "-42").unwrap().value, Some(-42));
    let outcome = pegmatic::parse(&grammar, "7").unwrap();
    assert!(outcome.is_complete(1));
    assert_eq!(outcome.value, Some(7));
    // The sign and the digit run are the only steps.
    assert_eq!(outcome.tree.unwrap().children.len(), 2);
}

#[test]
fn test_wrapping_rule_keeps_inner_rule_intact() {
    let grammar = GrammarBuilder::<i64>::build(|g| {
        let plain = digits(g)?;
        let comma = g.ch(',')?;
        let quiet = quiet_digits(g)?;
        g.sequence([plain, comma, quiet])
    })
    .unwrap();
    let plain = grammar.rule_named("digits").unwrap();
    let quiet = grammar.rule_named("quiet_digits").unwrap();
    assert_ne!(plain, quiet);
    assert_eq!(grammar.label(plain), "Digits");
    assert!(!grammar.get(plain).unwrap().is_node_suppressed());
    assert_eq!(grammar.label(quiet), "Quiet");
    assert!(grammar.get(quiet).unwrap().is_node_suppressed());

    let outcome = pegmatic::parse(&grammar, "12,34").unwrap();
    assert!(outcome.is_complete(5));
    let tree = outcome.tree.unwrap();
    let labels: Vec<_> = tree.children.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(labels.first(), Some(&"Digits"));
    assert!(!labels.contains(&"Quiet"));
}
