//! A pika parser's memoization core: the bottom-up, fixpoint-driven
//! matching engine for Parsing Expression Grammars. Grammar surface
//! syntax, AST construction, and CLI/file I/O are deliberately out of
//! scope — this crate owns clauses, the memo table, the seed/propagate
//! fixpoint, and the extraction queries that read a completed table back
//! out.

pub mod clause;
pub mod driver;
pub mod grammar;
pub mod input;
pub mod matching;
pub mod memotable;
mod preprocess;

pub use clause::{Clause, ClauseKind, Direction, RuleBinding, SubClause};
pub use driver::{ParseDriver, ParseOptions};
pub use grammar::{Expr, Grammar, GrammarBuilder, GrammarError};
pub use input::{CharInput, Input};
pub use memotable::{Match, MemoEntry, MemoKey, MemoTable};

#[cfg(test)]
mod tests {
    use super::*;

    /// End-to-end smoke test exercising the public surface the way a
    /// caller outside this crate would: build a grammar, run the
    /// fixpoint, read results back with all three extraction queries.
    #[test]
    fn digits_separated_by_commas() {
        let mut b = GrammarBuilder::new();
        b.rule(
            "List",
            Expr::seq([
                Expr::rule("Digits"),
                Expr::zero_or_more(Expr::seq([Expr::literal(","), Expr::rule("Digits")])),
            ]),
        )
        .top();
        b.rule("Digits", Expr::one_or_more(Expr::CharRange('0', '9')));
        let grammar = b.build().unwrap();

        let table = ParseDriver::run(&grammar, CharInput::new("12,345,6"));
        let matches = table.non_overlapping_matches(grammar.top);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].len, 8);

        assert!(table.num_match_objects_created() > 0);
        assert!(table.num_match_objects_memoized() > 0);
    }

    #[test]
    fn malformed_list_leaves_a_non_match_at_start() {
        let mut b = GrammarBuilder::new();
        b.rule("Digits", Expr::one_or_more(Expr::CharRange('0', '9')))
            .top();
        let grammar = b.build().unwrap();

        let table = ParseDriver::run(&grammar, CharInput::new("abc"));
        assert!(table.non_match_positions(grammar.top).contains(&0));
        assert!(table.all_matches(grammar.top).is_empty());
    }
}
