//! The memoization table: `MemoKey`, `Match`, `MemoEntry`, `MemoTable`,
//! and the lookup, insertion, and extraction operations over them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use crossbeam_skiplist::SkipMap;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::clause::{Clause, ClauseId};
use crate::input::Input;

/// `(clause, startPos)` identity used everywhere as a hash/order key.
/// Value-typed, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoKey {
    pub clause: ClauseId,
    pub start_pos: usize,
}

impl MemoKey {
    pub fn new(clause: ClauseId, start_pos: usize) -> MemoKey {
        MemoKey { clause, start_pos }
    }
}

/// An immutable record of a successful match. Never mutated after
/// construction; children are borrowed by `Arc`, valid for as long as the
/// table that produced them is alive.
#[derive(Debug, Clone)]
pub struct Match {
    pub key: MemoKey,
    /// For ordered-choice/longest, the index of the winning alternative.
    /// 0 for every other clause kind.
    pub first_matching_subclause_idx: usize,
    /// Characters consumed. For non-terminal matches this is always the
    /// sum of `sub_clause_matches`' lengths.
    pub len: usize,
    /// Empty for terminal matches.
    pub sub_clause_matches: Vec<Arc<Match>>,
}

impl Match {
    pub fn end_pos(&self) -> usize {
        self.key.start_pos + self.len
    }

    pub fn is_terminal(&self) -> bool {
        self.sub_clause_matches.is_empty()
    }
}

/// The "better than" order: strictly greater `len` always wins; on a tie,
/// the smaller `first_matching_subclause_idx` wins (left-biased PEG
/// choice); otherwise the incumbent is kept.
fn is_better(new: &Match, incumbent: &Match) -> bool {
    if new.len != incumbent.len {
        new.len > incumbent.len
    } else {
        new.first_matching_subclause_idx < incumbent.first_matching_subclause_idx
    }
}

#[derive(Default)]
struct EntryState {
    best_match: Option<Arc<Match>>,
    back_refs: FxHashSet<MemoKey>,
}

/// Mutable memo cell. `best_match` only ever improves under the "better
/// than" order, and once set never becomes `None` again.
pub struct MemoEntry {
    pub key: MemoKey,
    state: Mutex<EntryState>,
}

impl MemoEntry {
    fn new(key: MemoKey) -> MemoEntry {
        MemoEntry {
            key,
            state: Mutex::new(EntryState::default()),
        }
    }

    pub fn best_match(&self) -> Option<Arc<Match>> {
        self.state.lock().best_match.clone()
    }

    pub fn back_refs(&self) -> Vec<MemoKey> {
        self.state.lock().back_refs.iter().copied().collect()
    }

    fn record_back_ref(&self, parent: MemoKey) {
        self.state.lock().back_refs.insert(parent);
    }

    /// Single critical section so readers never observe a regression.
    /// Returns whether `candidate` became the new best (the caller must
    /// then enqueue this entry's key).
    fn offer(&self, candidate: Arc<Match>) -> bool {
        let mut state = self.state.lock();
        let better = match &state.best_match {
            None => true,
            Some(incumbent) => is_better(&candidate, incumbent),
        };
        if better {
            state.best_match = Some(candidate);
        }
        better
    }
}

/// The frontier of memo keys whose best match changed this round. A
/// lock-free MPMC queue: concurrent pushes from parallel workers need no
/// external synchronization, and duplicate entries are harmless (draining
/// one twice just re-runs a match rule, which the monotonic merge makes
/// idempotent).
pub type UpdatedEntries = SegQueue<MemoKey>;

/// Store of `MemoEntry`s, one concurrently-readable ordered sub-map per
/// clause. The outer `Clause -> sub-map` association is a `Vec` sized
/// once at construction: the grammar is frozen before parsing begins, so
/// there is no outer insertion to race on, only per-position insertion
/// into an already-existing per-clause map.
pub struct MemoTable<'g, I> {
    clauses: &'g [Clause],
    input: I,
    per_clause: Box<[SkipMap<usize, Arc<MemoEntry>>]>,
    created: AtomicU64,
    memoized: AtomicU64,
    /// The frontier of memo keys whose best match changed and whose
    /// parents have not yet been re-evaluated. Logically belongs to
    /// `ParseDriver`; kept here so every `try_match` call site has it at
    /// hand without threading an extra parameter through the whole match
    /// protocol.
    frontier: UpdatedEntries,
}

impl<'g, I: Input> MemoTable<'g, I> {
    pub fn new(clauses: &'g [Clause], input: I) -> MemoTable<'g, I> {
        let per_clause = (0..clauses.len())
            .map(|_| SkipMap::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        MemoTable {
            clauses,
            input,
            per_clause,
            created: AtomicU64::new(0),
            memoized: AtomicU64::new(0),
            frontier: UpdatedEntries::new(),
        }
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    /// The driver's dirty-key queue.
    pub fn frontier(&self) -> &UpdatedEntries {
        &self.frontier
    }

    pub fn clauses(&self) -> &'g [Clause] {
        self.clauses
    }

    pub fn clause(&self, id: ClauseId) -> &'g Clause {
        &self.clauses[id]
    }

    fn per_clause_map(&self, clause: ClauseId) -> &SkipMap<usize, Arc<MemoEntry>> {
        &self.per_clause[clause]
    }

    fn entry_or_create(&self, key: MemoKey) -> Arc<MemoEntry> {
        let map = self.per_clause_map(key.clause);
        if let Some(e) = map.get(&key.start_pos) {
            return e.value().clone();
        }
        let entry = Arc::new(MemoEntry::new(key));
        map.get_or_insert(key.start_pos, entry).value().clone()
    }

    /// Direct `MemoEntry` lookup by key, without creating one. `None`
    /// means this `(clause, startPos)` has never been inspected.
    pub fn entry(&self, key: MemoKey) -> Option<Arc<MemoEntry>> {
        self.per_clause_map(key.clause)
            .get(&key.start_pos)
            .map(|e| e.value().clone())
    }

    /// Looks up the best match for `key`, recording `parent` as a
    /// dynamic back-reference if the lookup crossed into a different
    /// start position. Returns a transient zero-width placeholder for a
    /// nullable clause with no memoized match yet, so a parent waiting on
    /// it doesn't deadlock while the real match is still being computed.
    pub fn look_up_best_match(&self, key: MemoKey, parent: MemoKey) -> Option<Arc<Match>> {
        let entry = self.entry_or_create(key);

        if parent.start_pos != key.start_pos {
            entry.record_back_ref(parent);
        }

        if let Some(best) = entry.best_match() {
            return Some(best);
        }

        let clause = &self.clauses[key.clause];
        if clause.can_match_zero_chars {
            let idx = clause.first_nullable_subclause_idx(self.clauses);
            return Some(Arc::new(Match {
                key,
                first_matching_subclause_idx: idx,
                len: 0,
                sub_clause_matches: Vec::new(),
            }));
        }

        None
    }

    fn add_match(
        &self,
        key: MemoKey,
        first_matching_subclause_idx: usize,
        len: usize,
        sub_clause_matches: Vec<Arc<Match>>,
    ) -> Arc<Match> {
        let entry = self.entry_or_create(key);
        let candidate = Arc::new(Match {
            key,
            first_matching_subclause_idx,
            len,
            sub_clause_matches,
        });
        self.created.fetch_add(1, Ordering::Relaxed);

        if entry.offer(Arc::clone(&candidate)) {
            self.memoized.fetch_add(1, Ordering::Relaxed);
            self.frontier.push(key);
        }

        candidate
    }

    pub fn add_terminal_match(&self, key: MemoKey, len: usize) -> Arc<Match> {
        self.add_match(key, 0, len, Vec::new())
    }

    /// `len` is always the sum of the children's lengths.
    pub fn add_non_terminal_match(
        &self,
        key: MemoKey,
        first_matching_subclause_idx: usize,
        sub_clause_matches: Vec<Arc<Match>>,
    ) -> Arc<Match> {
        let len = sub_clause_matches.iter().map(|m| m.len).sum();
        self.add_match(key, first_matching_subclause_idx, len, sub_clause_matches)
    }

    pub fn num_match_objects_created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    pub fn num_match_objects_memoized(&self) -> u64 {
        self.memoized.load(Ordering::Relaxed)
    }

    /// Emits non-overlapping best matches for `clause` in position order,
    /// always advancing the cursor by at least one character so a
    /// zero-width match can't loop forever.
    pub fn non_overlapping_matches(&self, clause: ClauseId) -> Vec<Arc<Match>> {
        let map = self.per_clause_map(clause);
        let mut out = Vec::new();
        let mut cursor = 0usize;

        while let Some(e) = map.lower_bound(std::ops::Bound::Included(&cursor)) {
            let start_pos = *e.key();
            match e.value().best_match() {
                Some(m) => {
                    cursor = start_pos + m.len.max(1);
                    out.push(m);
                }
                None => cursor = start_pos + 1,
            }
        }

        out
    }

    /// Every matched entry for `clause`, in position order.
    pub fn all_matches(&self, clause: ClauseId) -> Vec<Arc<Match>> {
        self.per_clause_map(clause)
            .iter()
            .filter_map(|e| e.value().best_match())
            .collect()
    }

    /// Every position for `clause` that was probed (a `MemoEntry` exists)
    /// but never matched.
    pub fn non_match_positions(&self, clause: ClauseId) -> Vec<usize> {
        self.per_clause_map(clause)
            .iter()
            .filter(|e| e.value().best_match().is_none())
            .map(|e| *e.key())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::{Clause, ClauseKind};
    use crate::input::CharInput;

    /// A single-clause table, standing in for a real grammar — these tests
    /// exercise `addMatch`/`addNewBestMatch`'s merge rule directly rather
    /// than through a full clause's `try_match`.
    fn single_clause() -> Vec<Clause> {
        vec![Clause {
            idx: 0,
            kind: ClauseKind::AnyChar,
            sub: Vec::new(),
            rules: Vec::new(),
            can_match_zero_chars: false,
            seed_parent_clauses: Vec::new(),
        }]
    }

    /// A strictly longer match replaces the incumbent; a shorter one is
    /// discarded without touching the stored best or the memoized
    /// counter.
    #[test]
    fn best_match_only_improves_monotonically() {
        let clauses = single_clause();
        let table = MemoTable::new(&clauses, CharInput::new("abcdef"));
        let key = MemoKey::new(0, 0);

        table.add_terminal_match(key, 2);
        assert_eq!(table.entry(key).unwrap().best_match().unwrap().len, 2);

        table.add_terminal_match(key, 1);
        assert_eq!(table.entry(key).unwrap().best_match().unwrap().len, 2);

        table.add_terminal_match(key, 4);
        assert_eq!(table.entry(key).unwrap().best_match().unwrap().len, 4);

        assert_eq!(table.num_match_objects_created(), 3);
        assert_eq!(table.num_match_objects_memoized(), 2);
    }

    /// On equal `len`, the smaller `first_matching_subclause_idx` wins; a
    /// larger one never displaces it once it is the incumbent.
    #[test]
    fn tie_breaks_toward_smaller_first_matching_subclause_idx() {
        let clauses = single_clause();
        let table = MemoTable::new(&clauses, CharInput::new("ab"));
        let key = MemoKey::new(0, 0);

        table.add_non_terminal_match(key, 2, Vec::new());
        assert_eq!(
            table.entry(key).unwrap().best_match().unwrap().first_matching_subclause_idx,
            2
        );

        table.add_non_terminal_match(key, 0, Vec::new());
        assert_eq!(
            table.entry(key).unwrap().best_match().unwrap().first_matching_subclause_idx,
            0
        );

        table.add_non_terminal_match(key, 5, Vec::new());
        assert_eq!(
            table.entry(key).unwrap().best_match().unwrap().first_matching_subclause_idx,
            0
        );
    }

    /// The zero-width placeholder is never stored: a nullable clause with
    /// no memoized match yet returns a fresh, transient `len=0` value on
    /// every lookup, and the real match that eventually gets memoized is
    /// unaffected by how many times the placeholder was handed out.
    #[test]
    fn zero_width_placeholder_is_not_memoized() {
        let clauses = vec![Clause {
            idx: 0,
            kind: ClauseKind::Nothing,
            sub: Vec::new(),
            rules: Vec::new(),
            can_match_zero_chars: true,
            seed_parent_clauses: Vec::new(),
        }];
        let table = MemoTable::new(&clauses, CharInput::new(""));
        let key = MemoKey::new(0, 0);
        let parent = MemoKey::new(0, 0);

        let placeholder = table.look_up_best_match(key, parent).unwrap();
        assert_eq!(placeholder.len, 0);
        assert_eq!(table.num_match_objects_created(), 0);
        assert!(table.entry(key).unwrap().best_match().is_none());
    }
}
