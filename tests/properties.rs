//! Property tests over random small grammars built from the full
//! clause-kind vocabulary, exercised over random short inputs.

use std::collections::HashSet;

use pika_memo::{CharInput, ClauseKind, Direction, Expr, GrammarBuilder, MemoKey, ParseDriver, ParseOptions};
use proptest::prelude::*;

fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        "[a-c]".prop_map(Expr::literal),
        Just(Expr::CharRange('a', 'c')),
        Just(Expr::AnyChar),
        Just(Expr::Nothing),
    ];
    leaf.prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..=3).prop_map(Expr::seq),
            prop::collection::vec(inner.clone(), 1..=3).prop_map(Expr::choice),
            prop::collection::vec(inner.clone(), 1..=3).prop_map(Expr::longest),
            inner.clone().prop_map(Expr::optional),
            inner.clone().prop_map(Expr::one_or_more),
            inner.clone().prop_map(Expr::zero_or_more),
            inner.clone().prop_map(Expr::not_followed_by),
        ]
    })
}

fn arb_input() -> impl Strategy<Value = String> {
    "[a-c]{0,8}"
}

proptest! {
    /// Every stored match fits inside the input, and a non-terminal's
    /// length is always the sum of its children's.
    #[test]
    fn matches_respect_length_bound_and_additivity(expr in arb_expr(), input in arb_input()) {
        let mut builder = GrammarBuilder::new();
        builder.rule("S", expr).top();
        let grammar = builder.build().expect("generator only produces well-formed expressions");

        let table = ParseDriver::run(&grammar, CharInput::new(&input));
        let input_len = input.chars().count();

        for clause in 0..grammar.clauses.len() {
            for m in table.all_matches(clause) {
                prop_assert!(m.key.start_pos + m.len <= input_len);
                if !m.sub_clause_matches.is_empty() {
                    let child_sum: usize = m.sub_clause_matches.iter().map(|c| c.len).sum();
                    prop_assert_eq!(m.len, child_sum);
                }
            }
        }
    }

    /// The sequential and parallel fixpoints agree on every memoized best
    /// match, regardless of worker count.
    #[test]
    fn sequential_and_parallel_fixpoints_agree(expr in arb_expr(), input in arb_input()) {
        let mut builder = GrammarBuilder::new();
        builder.rule("S", expr).top();
        let grammar = builder.build().expect("generator only produces well-formed expressions");

        let sequential = ParseDriver::run(&grammar, CharInput::new(&input));
        let parallel = ParseDriver::run_with_options(
            &grammar,
            CharInput::new(&input),
            ParseOptions { parallel: true, num_threads: Some(4) },
        );

        for clause in 0..grammar.clauses.len() {
            for pos in 0..=input.chars().count() {
                let key = MemoKey::new(clause, pos);
                let a = sequential.entry(key).and_then(|e| e.best_match()).map(|m| (m.len, m.first_matching_subclause_idx));
                let b = parallel.entry(key).and_then(|e| e.best_match()).map(|m| (m.len, m.first_matching_subclause_idx));
                prop_assert_eq!(a, b);
            }
        }
    }

    /// Consecutive matches from `non_overlapping_matches` never abut
    /// closer than `max(1, len)`.
    #[test]
    fn non_overlapping_matches_advance_the_cursor(expr in arb_expr(), input in arb_input()) {
        let mut builder = GrammarBuilder::new();
        builder.rule("S", expr).top();
        let grammar = builder.build().expect("generator only produces well-formed expressions");

        let table = ParseDriver::run(&grammar, CharInput::new(&input));
        let matches = table.non_overlapping_matches(grammar.top);
        for pair in matches.windows(2) {
            let prev = &pair[0];
            let next = &pair[1];
            prop_assert!(next.key.start_pos >= prev.key.start_pos + prev.len.max(1));
        }
    }

    /// For an ordered-choice clause, if alternative `i` can match at a
    /// position, the stored
    /// `first_matching_subclause_idx` must be `<= i`. Checked the other
    /// way round, which needs no independent re-derivation of "can match":
    /// no alternative *before* the stored winner may itself have a match,
    /// or the PEG left-bias would have picked it instead. `arb_expr`'s
    /// grammars have no `Ref`s, so the unmemoized `TopDown` re-derivation
    /// below terminates and never consults the table's own memoized
    /// choice result.
    #[test]
    fn choice_picks_the_leftmost_matching_alternative(expr in arb_expr(), input in arb_input()) {
        let mut builder = GrammarBuilder::new();
        builder.rule("S", expr).top();
        let grammar = builder.build().expect("generator only produces well-formed expressions");

        let table = ParseDriver::run(&grammar, CharInput::new(&input));
        let len = input.chars().count();

        for clause in &grammar.clauses {
            if clause.kind != ClauseKind::Choice {
                continue;
            }
            for pos in 0..=len {
                let key = MemoKey::new(clause.idx, pos);
                let Some(best) = table.entry(key).and_then(|e| e.best_match()) else {
                    continue;
                };
                for (i, sub) in clause.sub.iter().enumerate() {
                    if i >= best.first_matching_subclause_idx {
                        break;
                    }
                    let skey = MemoKey::new(sub.idx, pos);
                    let alt = pika_memo::matching::try_match(Direction::TopDown, &table, skey);
                    prop_assert!(
                        alt.is_none(),
                        "alternative {i} matches at {pos} but the stored winner is {}",
                        best.first_matching_subclause_idx
                    );
                }
            }
        }
    }

    /// Every probed `(clause, pos)` — one a `MemoEntry` exists for —
    /// shows up in exactly one of `all_matches`/`non_match_positions`,
    /// never both and never neither.
    #[test]
    fn all_matches_and_non_match_positions_partition_the_probed_positions(
        expr in arb_expr(), input in arb_input()
    ) {
        let mut builder = GrammarBuilder::new();
        builder.rule("S", expr).top();
        let grammar = builder.build().expect("generator only produces well-formed expressions");

        let table = ParseDriver::run(&grammar, CharInput::new(&input));
        let len = input.chars().count();

        for clause in 0..grammar.clauses.len() {
            let matched: HashSet<usize> = table.all_matches(clause).iter().map(|m| m.key.start_pos).collect();
            let unmatched: HashSet<usize> = table.non_match_positions(clause).into_iter().collect();
            prop_assert!(matched.is_disjoint(&unmatched));

            for pos in 0..=len {
                let probed = table.entry(MemoKey::new(clause, pos)).is_some();
                if probed {
                    prop_assert!(matched.contains(&pos) ^ unmatched.contains(&pos));
                } else {
                    prop_assert!(!matched.contains(&pos) && !unmatched.contains(&pos));
                }
            }
        }
    }
}
