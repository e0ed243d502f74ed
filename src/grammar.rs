//! The programmatic grammar-construction surface: no textual grammar
//! front end, just an `Expr` tree a caller builds in Rust, fed to
//! `GrammarBuilder::build` to produce a frozen, preprocessed `Grammar`
//! ready for `ParseDriver`.

use crate::clause::{Clause, ClauseId};
use crate::preprocess;

/// A builder-level grammar expression. Not a surface syntax: there is no
/// tokenizer, no source positions, no parsing of text. `Ref` is the only
/// way to introduce recursion (including left recursion), resolved by
/// name against the set of rules registered with a `GrammarBuilder`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Exact character sequence.
    Literal(String),
    /// Inclusive char range `[from, to]`.
    CharRange(char, char),
    /// Any single character.
    AnyChar,
    /// Always matches, consumes nothing.
    Nothing,
    Seq(Vec<Expr>),
    /// Ordered (PEG) choice: first alternative that matches wins.
    Choice(Vec<Expr>),
    /// Tries every alternative, keeps the longest.
    Longest(Vec<Expr>),
    Optional(Box<Expr>),
    OneOrMore(Box<Expr>),
    ZeroOrMore(Box<Expr>),
    /// And-predicate.
    FollowedBy(Box<Expr>),
    /// Not-predicate.
    NotFollowedBy(Box<Expr>),
    /// Reference to another rule, resolved by name. The only way to
    /// express recursion, including left recursion.
    Ref(String),
    /// Attaches an AST label to this subexpression's position in its
    /// parent. The label is opaque to the core; it is only ever read
    /// back off the resulting `Clause`/`SubClause`.
    Labeled(String, Box<Expr>),
}

impl Expr {
    pub fn literal(s: impl Into<String>) -> Expr {
        Expr::Literal(s.into())
    }

    pub fn seq(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Seq(exprs.into_iter().collect())
    }

    pub fn choice(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Choice(exprs.into_iter().collect())
    }

    pub fn longest(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Longest(exprs.into_iter().collect())
    }

    pub fn optional(e: Expr) -> Expr {
        Expr::Optional(Box::new(e))
    }

    pub fn one_or_more(e: Expr) -> Expr {
        Expr::OneOrMore(Box::new(e))
    }

    pub fn zero_or_more(e: Expr) -> Expr {
        Expr::ZeroOrMore(Box::new(e))
    }

    pub fn followed_by(e: Expr) -> Expr {
        Expr::FollowedBy(Box::new(e))
    }

    pub fn not_followed_by(e: Expr) -> Expr {
        Expr::NotFollowedBy(Box::new(e))
    }

    pub fn rule(name: impl Into<String>) -> Expr {
        Expr::Ref(name.into())
    }

    pub fn labeled(label: impl Into<String>, e: Expr) -> Expr {
        Expr::Labeled(label.into(), Box::new(e))
    }
}

/// Failure modes of `GrammarBuilder::build`. The only fallible entry
/// point in the crate: once a `Grammar` exists, the fixpoint driver is
/// total.
#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("rule `{0}` is referenced but never defined")]
    UndefinedRule(String),
    #[error("rule `{0}` is defined more than once")]
    DuplicateRule(String),
    #[error("{0} has no alternatives")]
    EmptyAlternation(&'static str),
    #[error("no top-level rule was designated")]
    NoTopRule,
}

/// A single named rule registered with a `GrammarBuilder`.
pub(crate) struct RuleDef {
    pub(crate) expr: Expr,
    pub(crate) ast_label: Option<String>,
    pub(crate) top: bool,
}

/// Accumulates named rules, then freezes them into a `Grammar`: a flat
/// clause table with `can_match_zero_chars` and `seed_parent_clauses`
/// precomputed, ready for the fixpoint driver.
#[derive(Default)]
pub struct GrammarBuilder {
    rules: Vec<(String, RuleDef)>,
}

impl GrammarBuilder {
    pub fn new() -> GrammarBuilder {
        GrammarBuilder::default()
    }

    /// Registers a named rule. Call `top` (or pass `is_top = true` here)
    /// on exactly one rule before `build`.
    pub fn rule(&mut self, name: impl Into<String>, expr: Expr) -> &mut GrammarBuilder {
        self.rules.push((
            name.into(),
            RuleDef {
                expr,
                ast_label: None,
                top: false,
            },
        ));
        self
    }

    pub fn labeled_rule(
        &mut self,
        name: impl Into<String>,
        ast_label: impl Into<String>,
        expr: Expr,
    ) -> &mut GrammarBuilder {
        self.rules.push((
            name.into(),
            RuleDef {
                expr,
                ast_label: Some(ast_label.into()),
                top: false,
            },
        ));
        self
    }

    /// Marks the most recently added rule as the grammar's toplevel.
    pub fn top(&mut self) -> &mut GrammarBuilder {
        if let Some((_, def)) = self.rules.last_mut() {
            def.top = true;
        }
        self
    }

    pub fn build(self) -> Result<Grammar, GrammarError> {
        preprocess::build(self.rules)
    }
}

/// A frozen grammar: a flat clause table plus the designated toplevel
/// clause. `can_match_zero_chars` and `seed_parent_clauses` are already
/// computed on every `Clause`. Never mutated after `GrammarBuilder::build`
/// returns it.
pub struct Grammar {
    pub clauses: Vec<Clause>,
    pub top: ClauseId,
}

impl Grammar {
    /// Every clause whose kind is a terminal, in clause-id order. The
    /// fixpoint driver seeds from `(terminal, pos)` for every `pos` in
    /// `[0, |input|)`.
    pub fn terminal_clauses(&self) -> impl Iterator<Item = ClauseId> + '_ {
        self.clauses
            .iter()
            .filter(|c| c.is_terminal())
            .map(|c| c.idx)
    }
}
