#![no_main]
use libfuzzer_sys::fuzz_target;
use pegmatic::grammar::{GrammarBuilder, LazyGrammar, RuleKey, RuleResult};
use pegmatic::{ParseConfig, Parser};

// Value = '[' (Value (',' Value)*)? ']' / !'[' ANY
fn value(g: &mut GrammarBuilder<usize>) -> RuleResult {
    g.rule(RuleKey::new("Value"), |g| {
        let open = g.ch('[')?;
        let first = value(g)?;
        let comma = g.ch(',')?;
        let next = value(g)?;
        let more = g.sequence([comma, next])?;
        let more = g.zero_or_more(more)?;
        let items = g.sequence([first, more])?;
        let items = g.optional(items)?;
        let close = g.ch(']')?;
        let array = g.sequence([open, items, close])?;
        let not_open = g.test_not(open)?;
        let any = g.any()?;
        let atom = g.sequence([not_open, any])?;
        let count = g.action(|ctx| {
            ctx.set_value(ctx.match_text().chars().count());
            Ok(true)
        })?;
        let atom = g.sequence([atom, count])?;
        g.first_of([array, atom])
    })
}

static GRAMMAR: LazyGrammar<usize> = LazyGrammar::new(value);

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(parser) = GRAMMAR.parser(ParseConfig::default()) else {
        return;
    };

    // Parse - should not panic, and must keep the outcome consistent
    let chars: Vec<char> = input.chars().collect();
    if let Ok(outcome) = parser.parse_chars(&chars) {
        assert!(outcome.cursor <= chars.len());
        if !outcome.matched {
            assert_eq!(outcome.cursor, 0);
        }
    }
});
