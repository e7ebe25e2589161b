//! Calculator example
//!
//! Evaluates arithmetic while parsing: every rule's actions turn what it
//! matched into an `f64`, and sub-rule values flow upwards through captures.
//!
//! ```text
//! Calc     = Spacing Sum EOI
//! Sum      = Product AddTail
//! AddTail  = (('+' / '-') Product AddTail)?
//! Product  = Factor MulTail
//! MulTail  = (('*' / '/') Factor MulTail)?
//! Factor   = Number / '(' Sum ')'
//! ```
//!
//! Tails are right-recursive and carry a signed sum (or a scaled product), so
//! subtraction and division still associate to the left.

use pegmatic::grammar::{GrammarBuilder, LazyGrammar, RuleResult};
use pegmatic::{ActionFault, ParseConfig, rule};

type Builder = GrammarBuilder<f64>;

fn whitespace(g: &mut Builder) -> RuleResult {
    let space = g.any_of([' ', '\t', '\n'])?;
    g.zero_or_more(space)
}

#[rule(suppress_node)]
fn spacing(g: &mut Builder) -> RuleResult {
    whitespace(g)?;
}

#[rule]
fn symbol(g: &mut Builder, c: char) -> RuleResult {
    g.ch(c)?;
    spacing(g)?;
}

fn digits(g: &mut Builder) -> RuleResult {
    let digit = g.char_range('0', '9')?;
    let integer = g.one_or_more(digit)?;
    let dot = g.ch('.')?;
    let fraction = g.one_or_more(digit)?;
    let fraction = g.sequence([dot, fraction])?;
    let fraction = g.optional(fraction)?;
    g.sequence([integer, fraction])
}

#[rule(label = "Number")]
fn number(g: &mut Builder) -> RuleResult {
    let text = digits(g)?;
    let n: f64 = ctx
        .text_of(&text)
        .parse::<f64>()
        .map_err(|e| ActionFault::from_error(&e))?;
    ctx.set_value(n);
    spacing(g)?;
}

#[rule]
fn parens(g: &mut Builder) -> RuleResult {
    symbol(g, '(')?;
    let inner = sum(g)?;
    symbol(g, ')')?;
    ctx.set_value(inner.value.unwrap_or_default());
}

#[rule(label = "Factor")]
fn factor(g: &mut Builder) -> RuleResult {
    g.first_of([number(g)?, parens(g)?])?;
}

fn either(g: &mut Builder, a: char, b: char) -> RuleResult {
    let a = symbol(g, a)?;
    let b = symbol(g, b)?;
    g.first_of([a, b])
}

fn nonzero(divisor: f64) -> Result<f64, ActionFault> {
    if divisor == 0.0 {
        Err(ActionFault::new("division by zero"))
    } else {
        Ok(divisor)
    }
}

#[rule]
fn scaled(g: &mut Builder) -> RuleResult {
    let op = either(g, '*', '/')?;
    let operand = factor(g)?;
    let rest = mul_tail(g)?;
    let x = operand.value.unwrap_or_default();
    let x = if ctx.text_of(&op).starts_with('*') {
        x
    } else {
        nonzero(x)?.recip()
    };
    ctx.set_value(x * rest.value.unwrap_or(1.0));
}

fn mul_tail(g: &mut Builder) -> RuleResult {
    let tail = scaled(g)?;
    g.optional(tail)
}

#[rule]
fn product(g: &mut Builder) -> RuleResult {
    let head = factor(g)?;
    let tail = mul_tail(g)?;
    ctx.set_value(head.value.unwrap_or_default() * tail.value.unwrap_or(1.0));
}

#[rule]
fn signed(g: &mut Builder) -> RuleResult {
    let op = either(g, '+', '-')?;
    let operand = product(g)?;
    let rest = add_tail(g)?;
    let x = operand.value.unwrap_or_default();
    let x = if ctx.text_of(&op).starts_with('-') { -x } else { x };
    ctx.set_value(x + rest.value.unwrap_or_default());
}

fn add_tail(g: &mut Builder) -> RuleResult {
    let tail = signed(g)?;
    g.optional(tail)
}

#[rule]
fn sum(g: &mut Builder) -> RuleResult {
    let head = product(g)?;
    let tail = add_tail(g)?;
    ctx.set_value(head.value.unwrap_or_default() + tail.value.unwrap_or_default());
}

#[rule(label = "Calc")]
fn calc(g: &mut Builder) -> RuleResult {
    spacing(g)?;
    let total = sum(g)?;
    g.eoi()?;
    ctx.set_value(total.value.unwrap_or_default());
}

static CALCULATOR: LazyGrammar<f64> = LazyGrammar::new(calc);

fn main() {
    let parser = match CALCULATOR.parser(ParseConfig::default().with_build_tree(false)) {
        Ok(parser) => parser,
        Err(err) => {
            eprintln!("grammar error: {err}");
            return;
        }
    };
    println!(
        "Calculator grammar: {} matchers, {} rules\n",
        parser.grammar().len(),
        parser.grammar().rule_count()
    );

    let inputs = [
        "1 + 2 * 3",
        "(1 + 2) * 3",
        "10 - 3 - 2",
        "8 / 2 / 2",
        " 2.5 * (4 - 1.5) ",
        "1 / (2 - 2)",
        "2 * (3 + )",
    ];
    for input in inputs {
        match parser.parse(input) {
            Ok(outcome) if outcome.matched => {
                println!("{input:>20} = {}", outcome.value.unwrap_or_default());
            }
            Ok(outcome) => {
                let reason = outcome
                    .failure
                    .map_or_else(|| "no match".to_string(), |f| f.to_string());
                println!("{input:>20} : {reason}");
            }
            Err(err) => println!("{input:>20} ! {err}"),
        }
    }
}
