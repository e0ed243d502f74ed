//! The grammar graph's node type and the bottom-up/top-down match protocol
//! it implements.

/// Index into the frozen clause table. Stable for the lifetime of a
/// `Grammar`.
pub type ClauseId = usize;

/// Which evaluation mode a clause's `match` rule should run in.
///
/// `BottomUp` is the only mode the fixpoint driver uses: it must read
/// subclause results exclusively through the memo table, never by
/// recursing into a subclause's own match function. `TopDown` is a
/// recursive, non-memoizing fallback for traversal over an already
/// completed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    BottomUp,
    TopDown,
}

/// One position in a clause's subclause list, with the optional AST label
/// the grammar layer attached to it. The label is opaque to the core.
#[derive(Debug, Clone)]
pub struct SubClause {
    pub idx: ClauseId,
    pub label: Option<String>,
}

impl SubClause {
    pub fn new(idx: ClauseId) -> SubClause {
        SubClause { idx, label: None }
    }

    pub fn labeled(idx: ClauseId, label: impl Into<String>) -> SubClause {
        SubClause {
            idx,
            label: Some(label.into()),
        }
    }
}

/// A named rule this clause is the toplevel of. A deduplicated clause may
/// be referenced by more than one rule name.
#[derive(Debug, Clone)]
pub struct RuleBinding {
    pub name: String,
    pub ast_label: Option<String>,
    pub top: bool,
}

/// The operator a `Clause` implements. Terminal kinds consult only the
/// input; combinator kinds consult only the memo table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClauseKind {
    /// Exact character sequence.
    Literal(String),
    /// Inclusive char range `[from, to]`. Empty (`from > to`) is a
    /// degenerate terminal that never consumes a character.
    CharRange(char, char),
    /// Any single character (`.` in PEG surface syntax).
    AnyChar,
    /// Always matches, consuming nothing. The canonical clause id 0, and
    /// the "else" branch of desugared `ZeroOrMore`.
    Nothing,
    Sequence,
    /// Ordered (PEG) choice: first alternative that matches wins.
    Choice,
    /// Tries every alternative, keeps the longest (ties favor the
    /// earliest index).
    Longest,
    /// Child matches, else zero-width success.
    Optional,
    OneOrMore,
    /// And-predicate: child matches, zero-width success, no input
    /// consumed.
    FollowedBy,
    /// Not-predicate: child must NOT match, zero-width success.
    NotFollowedBy,
    /// Used only inside grammar preprocessing while a recursive rule's
    /// clause is still being built. Never observed once a `Grammar` is
    /// frozen.
    Placeholder,
}

impl ClauseKind {
    pub fn is_terminal(&self) -> bool {
        use ClauseKind::*;
        matches!(self, Literal(_) | CharRange(_, _) | AnyChar | Nothing)
    }
}

/// A node in the grammar graph. Frozen once a `Grammar` is built:
/// `can_match_zero_chars` and `seed_parent_clauses` are computed exactly
/// once by preprocessing and never recomputed.
#[derive(Debug, Clone)]
pub struct Clause {
    pub idx: ClauseId,
    pub kind: ClauseKind,
    pub sub: Vec<SubClause>,
    pub rules: Vec<RuleBinding>,
    pub can_match_zero_chars: bool,
    /// Clauses to re-evaluate (at the same start position) when this
    /// clause's memo entry gets a new best match. Computed once, after
    /// the whole graph exists, by inverting each clause's seed
    /// subclauses.
    pub seed_parent_clauses: Vec<ClauseId>,
}

impl Clause {
    pub(crate) fn placeholder(idx: ClauseId) -> Clause {
        Clause {
            idx,
            kind: ClauseKind::Placeholder,
            sub: Vec::new(),
            rules: Vec::new(),
            can_match_zero_chars: false,
            seed_parent_clauses: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, ClauseKind::Placeholder)
    }

    /// Ordered choice and longest-match seed from every alternative (any
    /// one may produce the match); everything else seeds from its first
    /// subclause only (terminals have none). A `Sequence` additionally
    /// chains through any leading run of nullable subclauses, since a
    /// change to the second subclause can matter at the sequence's own
    /// start position whenever the first one is nullable.
    pub(crate) fn seed_subclauses(&self, clauses: &[Clause]) -> Vec<ClauseId> {
        match self.kind {
            ClauseKind::Choice | ClauseKind::Longest => self.sub.iter().map(|s| s.idx).collect(),
            ClauseKind::Sequence => {
                let mut out = Vec::new();
                for s in &self.sub {
                    out.push(s.idx);
                    if !clauses[s.idx].can_match_zero_chars {
                        break;
                    }
                }
                out
            }
            _ => self.sub.first().map(|s| s.idx).into_iter().collect(),
        }
    }

    /// Index of the first subclause that itself can match zero
    /// characters, or 0 if there are none. Used by the zero-width
    /// placeholder returned while a nullable clause's own match is still
    /// being computed.
    pub fn first_nullable_subclause_idx(&self, clauses: &[Clause]) -> usize {
        self.sub
            .iter()
            .position(|s| clauses[s.idx].can_match_zero_chars)
            .unwrap_or(0)
    }
}
