//! Per-`ClauseKind` match rules, for both `Direction::BottomUp` (the
//! only mode the fixpoint driver uses) and `Direction::TopDown` (a
//! recursive, non-memoizing fallback for traversal over an
//! already-completed table).

use std::sync::Arc;

use crate::clause::{ClauseKind, Direction};
use crate::input::Input;
use crate::memotable::{Match, MemoKey, MemoTable};

/// Evaluate one clause at one position. `BottomUp` reads subclause
/// results exclusively through `table.look_up_best_match` and, on
/// success, memoizes via `add_terminal_match`/`add_non_terminal_match`.
/// `TopDown` may recurse directly into a subclause's own `try_match` and
/// never writes to the table.
pub fn try_match<I: Input>(
    direction: Direction,
    table: &MemoTable<'_, I>,
    key: MemoKey,
) -> Option<Arc<Match>> {
    match direction {
        Direction::BottomUp => try_match_bottom_up(table, key),
        Direction::TopDown => try_match_top_down(table, key),
    }
}

fn try_match_bottom_up<I: Input>(table: &MemoTable<'_, I>, key: MemoKey) -> Option<Arc<Match>> {
    let clause = table.clause(key.clause);
    let pos = key.start_pos;

    match &clause.kind {
        ClauseKind::Literal(lit) => {
            if table.input().matches_literal(pos, lit) {
                Some(table.add_terminal_match(key, lit.chars().count()))
            } else {
                None
            }
        }
        ClauseKind::CharRange(from, to) => {
            if table.input().char_in_range(pos, *from, *to) {
                Some(table.add_terminal_match(key, 1))
            } else {
                None
            }
        }
        ClauseKind::AnyChar => {
            if table.input().char_at(pos).is_some() {
                Some(table.add_terminal_match(key, 1))
            } else {
                None
            }
        }
        ClauseKind::Nothing => Some(table.add_terminal_match(key, 0)),

        ClauseKind::Sequence => {
            let mut subs = Vec::with_capacity(clause.sub.len());
            let mut cursor = pos;
            for sub in &clause.sub {
                let skey = MemoKey::new(sub.idx, cursor);
                let m = table.look_up_best_match(skey, key)?;
                cursor += m.len;
                subs.push(m);
            }
            Some(table.add_non_terminal_match(key, 0, subs))
        }

        ClauseKind::Choice => {
            for (i, sub) in clause.sub.iter().enumerate() {
                let skey = MemoKey::new(sub.idx, pos);
                if let Some(m) = table.look_up_best_match(skey, key) {
                    return Some(table.add_non_terminal_match(key, i, vec![m]));
                }
            }
            None
        }

        ClauseKind::Longest => {
            let mut best: Option<(usize, Arc<Match>)> = None;
            for (i, sub) in clause.sub.iter().enumerate() {
                let skey = MemoKey::new(sub.idx, pos);
                if let Some(m) = table.look_up_best_match(skey, key) {
                    let better = match &best {
                        None => true,
                        Some((_, b)) => m.len > b.len,
                    };
                    if better {
                        best = Some((i, m));
                    }
                }
            }
            best.map(|(i, m)| table.add_non_terminal_match(key, i, vec![m]))
        }

        ClauseKind::Optional => {
            let sub = &clause.sub[0];
            let skey = MemoKey::new(sub.idx, pos);
            match table.look_up_best_match(skey, key) {
                Some(m) => Some(table.add_non_terminal_match(key, 0, vec![m])),
                None => Some(table.add_non_terminal_match(key, 0, Vec::new())),
            }
        }

        ClauseKind::OneOrMore => {
            let sub = &clause.sub[0];
            let skey = MemoKey::new(sub.idx, pos);
            let head = table.look_up_best_match(skey, key)?;

            // A nullable child can never advance the cursor: one
            // iteration is the whole match, or this key would loop on
            // itself forever via the self-referential tail below.
            if head.len == 0 {
                return Some(table.add_non_terminal_match(key, 0, vec![head]));
            }

            let tail_key = MemoKey::new(key.clause, pos + head.len);
            let subs = match table.look_up_best_match(tail_key, key) {
                Some(tail) => vec![head, tail],
                None => vec![head],
            };
            Some(table.add_non_terminal_match(key, 0, subs))
        }

        ClauseKind::FollowedBy => {
            let sub = &clause.sub[0];
            let skey = MemoKey::new(sub.idx, pos);
            table.look_up_best_match(skey, key)?;
            Some(table.add_non_terminal_match(key, 0, Vec::new()))
        }

        ClauseKind::NotFollowedBy => {
            let sub = &clause.sub[0];
            let skey = MemoKey::new(sub.idx, pos);
            if table.look_up_best_match(skey, key).is_some() {
                None
            } else {
                Some(table.add_non_terminal_match(key, 0, Vec::new()))
            }
        }

        ClauseKind::Placeholder => {
            unreachable!("placeholder clause {:?} survived grammar freeze", key.clause)
        }
    }
}

/// Recursive-descent fallback, not memoized. Reads a match's shape for a
/// completed table (or, for `NotFollowedBy`'s lookahead, re-derives a
/// subclause match on demand rather than trusting a stale memo read).
fn try_match_top_down<I: Input>(table: &MemoTable<'_, I>, key: MemoKey) -> Option<Arc<Match>> {
    let clause = table.clause(key.clause);
    let pos = key.start_pos;

    match &clause.kind {
        ClauseKind::Literal(_) | ClauseKind::CharRange(_, _) | ClauseKind::AnyChar | ClauseKind::Nothing => {
            table.entry(key).and_then(|e| e.best_match())
        }
        ClauseKind::Sequence => {
            let mut subs = Vec::with_capacity(clause.sub.len());
            let mut cursor = pos;
            for sub in &clause.sub {
                let skey = MemoKey::new(sub.idx, cursor);
                let m = try_match_top_down(table, skey)?;
                cursor += m.len;
                subs.push(m);
            }
            let len = subs.iter().map(|m| m.len).sum();
            Some(Arc::new(Match {
                key,
                first_matching_subclause_idx: 0,
                len,
                sub_clause_matches: subs,
            }))
        }
        ClauseKind::Choice => {
            for (i, sub) in clause.sub.iter().enumerate() {
                let skey = MemoKey::new(sub.idx, pos);
                if let Some(m) = try_match_top_down(table, skey) {
                    return Some(Arc::new(Match {
                        key,
                        first_matching_subclause_idx: i,
                        len: m.len,
                        sub_clause_matches: vec![m],
                    }));
                }
            }
            None
        }
        ClauseKind::Longest => {
            let mut best: Option<(usize, Arc<Match>)> = None;
            for (i, sub) in clause.sub.iter().enumerate() {
                let skey = MemoKey::new(sub.idx, pos);
                if let Some(m) = try_match_top_down(table, skey) {
                    let better = match &best {
                        None => true,
                        Some((_, b)) => m.len > b.len,
                    };
                    if better {
                        best = Some((i, m));
                    }
                }
            }
            best.map(|(i, m)| {
                Arc::new(Match {
                    key,
                    first_matching_subclause_idx: i,
                    len: m.len,
                    sub_clause_matches: vec![m],
                })
            })
        }
        ClauseKind::Optional => {
            let sub = &clause.sub[0];
            let skey = MemoKey::new(sub.idx, pos);
            match try_match_top_down(table, skey) {
                Some(m) => Some(Arc::new(Match {
                    key,
                    first_matching_subclause_idx: 0,
                    len: m.len,
                    sub_clause_matches: vec![m],
                })),
                None => Some(Arc::new(Match {
                    key,
                    first_matching_subclause_idx: 0,
                    len: 0,
                    sub_clause_matches: Vec::new(),
                })),
            }
        }
        ClauseKind::OneOrMore => {
            let sub = &clause.sub[0];
            let skey = MemoKey::new(sub.idx, pos);
            let head = try_match_top_down(table, skey)?;
            if head.len == 0 {
                return Some(Arc::new(Match {
                    key,
                    first_matching_subclause_idx: 0,
                    len: 0,
                    sub_clause_matches: vec![head],
                }));
            }
            let tail_key = MemoKey::new(key.clause, pos + head.len);
            let subs = match try_match_top_down(table, tail_key) {
                Some(tail) => vec![head, tail],
                None => vec![head],
            };
            let len = subs.iter().map(|m| m.len).sum();
            Some(Arc::new(Match {
                key,
                first_matching_subclause_idx: 0,
                len,
                sub_clause_matches: subs,
            }))
        }
        ClauseKind::FollowedBy => {
            let sub = &clause.sub[0];
            let skey = MemoKey::new(sub.idx, pos);
            try_match_top_down(table, skey)?;
            Some(Arc::new(Match {
                key,
                first_matching_subclause_idx: 0,
                len: 0,
                sub_clause_matches: Vec::new(),
            }))
        }
        ClauseKind::NotFollowedBy => {
            let sub = &clause.sub[0];
            let skey = MemoKey::new(sub.idx, pos);
            if try_match_top_down(table, skey).is_some() {
                None
            } else {
                Some(Arc::new(Match {
                    key,
                    first_matching_subclause_idx: 0,
                    len: 0,
                    sub_clause_matches: Vec::new(),
                }))
            }
        }
        ClauseKind::Placeholder => {
            unreachable!("placeholder clause {:?} survived grammar freeze", key.clause)
        }
    }
}
