//! Turns a `GrammarBuilder`'s named `Expr` rules into a frozen `Grammar`:
//! resolves `Ref`s (including left recursion) into a flat clause table,
//! desugars `ZeroOrMore`, then computes `can_match_zero_chars` and
//! `seed_parent_clauses`.

use rustc_hash::FxHashMap;

use crate::clause::{Clause, ClauseKind, RuleBinding, SubClause};
use crate::grammar::{Expr, Grammar, GrammarError, RuleDef};

struct Builder<'a> {
    rules: FxHashMap<&'a str, &'a RuleDef>,
    /// Rule name -> clause id, populated the first time the rule is
    /// resolved. A rule's own recursive references resolve through this
    /// map before its clause is fully built, which is what lets left
    /// recursion (`E <- E '+' E / digit`) terminate during construction
    /// instead of recursing forever.
    rule_clause: FxHashMap<&'a str, usize>,
    clauses: Vec<Clause>,
}

impl<'a> Builder<'a> {
    fn push(&mut self, kind: ClauseKind, sub: Vec<SubClause>) -> usize {
        let idx = self.clauses.len();
        self.clauses.push(Clause {
            idx,
            kind,
            sub,
            rules: Vec::new(),
            can_match_zero_chars: false,
            seed_parent_clauses: Vec::new(),
        });
        idx
    }

    /// Resolves a rule name to its clause id, building the clause on
    /// first use. A rule whose body is a bare `Ref` to another rule binds
    /// directly to that rule's clause (a pure rename, no wrapper clause)
    /// so that several rule names can alias one deduplicated clause.
    fn clause_for_rule(&mut self, name: &'a str) -> Result<usize, GrammarError> {
        if let Some(&idx) = self.rule_clause.get(name) {
            return Ok(idx);
        }
        let def = *self
            .rules
            .get(name)
            .ok_or_else(|| GrammarError::UndefinedRule(name.to_string()))?;

        if let Expr::Ref(other) = &def.expr {
            let other = other.clone();
            let idx = self.clause_for_rule(&other)?;
            self.rule_clause.insert(name, idx);
            self.clauses[idx].rules.push(RuleBinding {
                name: name.to_string(),
                ast_label: def.ast_label.clone(),
                top: def.top,
            });
            return Ok(idx);
        }

        let idx = self.clauses.len();
        self.clauses.push(Clause::placeholder(idx));
        self.rule_clause.insert(name, idx);

        let (kind, sub) = self.build_expr_kind(&def.expr)?;
        self.clauses[idx].kind = kind;
        self.clauses[idx].sub = sub;
        self.clauses[idx].rules.push(RuleBinding {
            name: name.to_string(),
            ast_label: def.ast_label.clone(),
            top: def.top,
        });

        Ok(idx)
    }

    fn build_sub(&mut self, expr: &'a Expr) -> Result<SubClause, GrammarError> {
        if let Expr::Labeled(label, inner) = expr {
            let idx = self.build_expr(inner)?;
            return Ok(SubClause::labeled(idx, label.clone()));
        }
        Ok(SubClause::new(self.build_expr(expr)?))
    }

    /// Builds `expr` as a brand-new clause and returns its id. Used for
    /// every subexpression except a rule's own top-level body (which
    /// writes directly into the rule's already-reserved placeholder via
    /// `build_expr_kind`, to avoid allocating a throwaway duplicate).
    fn build_expr(&mut self, expr: &'a Expr) -> Result<usize, GrammarError> {
        if let Expr::Ref(name) = expr {
            return self.clause_for_rule(name.as_str());
        }
        if let Expr::Labeled(_, inner) = expr {
            return self.build_expr(inner);
        }
        let (kind, sub) = self.build_expr_kind(expr)?;
        Ok(self.push(kind, sub))
    }

    fn build_expr_kind(&mut self, expr: &'a Expr) -> Result<(ClauseKind, Vec<SubClause>), GrammarError> {
        match expr {
            Expr::Literal(s) => Ok((ClauseKind::Literal(s.clone()), Vec::new())),
            Expr::CharRange(a, b) => Ok((ClauseKind::CharRange(*a, *b), Vec::new())),
            Expr::AnyChar => Ok((ClauseKind::AnyChar, Vec::new())),
            Expr::Nothing => Ok((ClauseKind::Nothing, Vec::new())),

            Expr::Seq(items) => {
                if items.is_empty() {
                    return Err(GrammarError::EmptyAlternation("a sequence"));
                }
                let mut subs = Vec::with_capacity(items.len());
                for item in items {
                    subs.push(self.build_sub(item)?);
                }
                Ok((ClauseKind::Sequence, subs))
            }
            Expr::Choice(items) => {
                if items.is_empty() {
                    return Err(GrammarError::EmptyAlternation("a choice"));
                }
                let mut subs = Vec::with_capacity(items.len());
                for item in items {
                    subs.push(self.build_sub(item)?);
                }
                Ok((ClauseKind::Choice, subs))
            }
            Expr::Longest(items) => {
                if items.is_empty() {
                    return Err(GrammarError::EmptyAlternation("a longest-match"));
                }
                let mut subs = Vec::with_capacity(items.len());
                for item in items {
                    subs.push(self.build_sub(item)?);
                }
                Ok((ClauseKind::Longest, subs))
            }

            Expr::Optional(inner) => {
                let sub = self.build_sub(inner)?;
                Ok((ClauseKind::Optional, vec![sub]))
            }
            Expr::OneOrMore(inner) => {
                let sub = self.build_sub(inner)?;
                Ok((ClauseKind::OneOrMore, vec![sub]))
            }
            Expr::ZeroOrMore(inner) => {
                // `choice(one_or_more(inner), Nothing)`.
                let plus_sub = self.build_sub(inner)?;
                let plus = self.push(ClauseKind::OneOrMore, vec![plus_sub]);
                let nothing = self.push(ClauseKind::Nothing, Vec::new());
                Ok((
                    ClauseKind::Choice,
                    vec![SubClause::new(plus), SubClause::new(nothing)],
                ))
            }
            Expr::FollowedBy(inner) => {
                let sub = self.build_sub(inner)?;
                Ok((ClauseKind::FollowedBy, vec![sub]))
            }
            Expr::NotFollowedBy(inner) => {
                let sub = self.build_sub(inner)?;
                Ok((ClauseKind::NotFollowedBy, vec![sub]))
            }

            Expr::Ref(_) => {
                unreachable!("clause_for_rule and build_expr both intercept Ref before calling build_expr_kind")
            }
            // Reachable only when a rule's own top-level body is labeled:
            // `clause_for_rule` doesn't special-case `Labeled` the way
            // `build_expr`/`build_sub` do, so it falls through to here.
            Expr::Labeled(_, inner) => self.build_expr_kind(inner),
        }
    }
}

/// Runs to a fixpoint because a clause's answer can depend on a clause
/// defined later (or, through recursion, on itself).
fn compute_can_match_zero_chars(clauses: &mut [Clause]) {
    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..clauses.len() {
            let new = match &clauses[i].kind {
                ClauseKind::Literal(s) => s.is_empty(),
                ClauseKind::CharRange(from, to) => from > to,
                ClauseKind::AnyChar => false,
                ClauseKind::Nothing => true,
                ClauseKind::Choice | ClauseKind::Longest => clauses[i]
                    .sub
                    .iter()
                    .any(|s| clauses[s.idx].can_match_zero_chars),
                ClauseKind::Sequence => clauses[i]
                    .sub
                    .iter()
                    .all(|s| clauses[s.idx].can_match_zero_chars),
                ClauseKind::Optional | ClauseKind::FollowedBy | ClauseKind::NotFollowedBy => true,
                ClauseKind::OneOrMore => clauses[clauses[i].sub[0].idx].can_match_zero_chars,
                ClauseKind::Placeholder => false,
            };
            if new != clauses[i].can_match_zero_chars {
                clauses[i].can_match_zero_chars = new;
                changed = true;
            }
        }
    }
}

/// Inverts each clause's static seed-subclause edges (`Clause::seed_subclauses`)
/// into a `seed_parent_clauses` list on the child. No topological clause
/// order is needed here: the fixpoint converges by repeated propagation
/// regardless of evaluation order.
fn setup_seed_parents(clauses: &mut [Clause]) {
    for i in 0..clauses.len() {
        for seed in clauses[i].seed_subclauses(clauses) {
            clauses[seed].seed_parent_clauses.push(i);
        }
    }
}

pub(crate) fn build(rules: Vec<(String, RuleDef)>) -> Result<Grammar, GrammarError> {
    let mut seen = FxHashMap::default();
    for (name, _) in &rules {
        if seen.insert(name.as_str(), ()).is_some() {
            return Err(GrammarError::DuplicateRule(name.clone()));
        }
    }

    let rule_map: FxHashMap<&str, &RuleDef> = rules.iter().map(|(n, d)| (n.as_str(), d)).collect();

    let mut builder = Builder {
        rules: rule_map,
        rule_clause: FxHashMap::default(),
        clauses: Vec::new(),
    };

    // Clause id 0 is always the canonical `Nothing`, giving `ZeroOrMore`
    // desugaring a stable, always-available empty clause.
    let nothing = builder.push(ClauseKind::Nothing, Vec::new());
    debug_assert_eq!(nothing, 0);

    let mut top: Option<usize> = None;
    for (name, def) in &rules {
        let idx = builder.clause_for_rule(name.as_str())?;
        if def.top {
            top = Some(idx);
        }
    }

    let top = top.ok_or(GrammarError::NoTopRule)?;

    let mut clauses = builder.clauses;
    compute_can_match_zero_chars(&mut clauses);
    setup_seed_parents(&mut clauses);

    log::debug!("grammar frozen: {} clauses, top = {top}", clauses.len());

    Ok(Grammar { clauses, top })
}
