//! `ParseDriver`: the seed/propagate fixpoint that drives a `MemoTable`
//! to completion.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::clause::Direction;
use crate::grammar::Grammar;
use crate::input::Input;
use crate::matching::try_match;
use crate::memotable::{MemoKey, MemoTable};

/// Configuration for `ParseDriver::run`.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Run the propagation phase on a `rayon` worker pool instead of the
    /// calling thread.
    pub parallel: bool,
    /// Worker count for the parallel path. `None` defers to rayon's
    /// global pool default (usually the number of logical cores).
    pub num_threads: Option<usize>,
}

impl Default for ParseOptions {
    fn default() -> ParseOptions {
        ParseOptions {
            parallel: false,
            num_threads: None,
        }
    }
}

/// Owns the work queue that drives the fixpoint to completion: seed every
/// `(terminal, pos)`, then drain and re-evaluate parents until nothing
/// changes.
pub struct ParseDriver;

impl ParseDriver {
    /// Runs the fixpoint to completion and returns a `MemoTable` ready for
    /// the extraction queries. Single-threaded: the default, and what
    /// every test and example in this crate uses, since determinism needs
    /// no further argument when there is only one worker.
    pub fn run<'g, I: Input>(grammar: &'g Grammar, input: I) -> MemoTable<'g, I> {
        Self::run_with_options(grammar, input, ParseOptions::default())
    }

    pub fn run_with_options<'g, I: Input>(
        grammar: &'g Grammar,
        input: I,
        options: ParseOptions,
    ) -> MemoTable<'g, I> {
        let table = MemoTable::new(&grammar.clauses, input);
        let len = table.input().len();

        log::debug!(
            "seeding fixpoint: {} terminal clauses over {} positions",
            grammar.terminal_clauses().count(),
            len + 1
        );

        // Seed: every terminal clause is tried at every position; a
        // success populates the table and pushes onto the frontier queue
        // below.
        for pos in 0..=len {
            for clause in grammar.terminal_clauses() {
                let key = MemoKey::new(clause, pos);
                try_match(Direction::BottomUp, &table, key);
            }
        }

        if options.parallel {
            Self::propagate_parallel(grammar, &table, options.num_threads);
        } else {
            Self::propagate_sequential(grammar, &table);
        }

        log::debug!(
            "fixpoint reached: {} matches created, {} memoized",
            table.num_match_objects_created(),
            table.num_match_objects_memoized()
        );

        table
    }

    /// Drains the frontier, re-evaluating every statically-seeded parent
    /// (same position) and every dynamically discovered back-reference
    /// (possibly a different position) of each drained key, until the
    /// queue is empty.
    fn propagate_sequential<I: Input>(grammar: &Grammar, table: &MemoTable<'_, I>) {
        while let Some(key) = table.frontier().pop() {
            for &parent_clause in &grammar.clauses[key.clause].seed_parent_clauses {
                let parent_key = MemoKey::new(parent_clause, key.start_pos);
                try_match(Direction::BottomUp, table, parent_key);
            }

            if let Some(entry) = table.entry(key) {
                for parent_key in entry.back_refs() {
                    try_match(Direction::BottomUp, table, parent_key);
                }
            }
        }
    }

    /// Parallel propagation over a `rayon` scope: a fixed pool of workers
    /// pulling from the shared dirty-entry queue. Each popped key may
    /// enqueue more work; workers keep pulling until the queue is empty
    /// and no worker is mid-evaluation.
    fn propagate_parallel<I: Input>(
        grammar: &Grammar,
        table: &MemoTable<'_, I>,
        num_threads: Option<usize>,
    ) {
        // Counts workers currently between popping a key and finishing
        // the re-evaluations it may enqueue. A worker that finds the
        // queue empty may only stop once this is also zero — otherwise
        // it could exit while a peer is mid-evaluation and about to push
        // exactly the work this worker would have picked up next.
        let in_flight = AtomicUsize::new(0);
        let run = || {
            rayon::scope(|scope| {
                let workers = num_threads.unwrap_or_else(rayon::current_num_threads).max(1);
                for _ in 0..workers {
                    scope.spawn(|_| Self::propagate_worker(grammar, table, &in_flight));
                }
            });
        };

        match num_threads {
            Some(n) => rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .expect("building a scoped rayon thread pool")
                .install(run),
            None => run(),
        }
    }

    fn propagate_worker<I: Input>(
        grammar: &Grammar,
        table: &MemoTable<'_, I>,
        in_flight: &AtomicUsize,
    ) {
        loop {
            let Some(key) = table.frontier().pop() else {
                if in_flight.load(Ordering::SeqCst) == 0 && table.frontier().is_empty() {
                    return;
                }
                std::thread::yield_now();
                continue;
            };

            in_flight.fetch_add(1, Ordering::SeqCst);

            for &parent_clause in &grammar.clauses[key.clause].seed_parent_clauses {
                let parent_key = MemoKey::new(parent_clause, key.start_pos);
                try_match(Direction::BottomUp, table, parent_key);
            }

            if let Some(entry) = table.entry(key) {
                for parent_key in entry.back_refs() {
                    try_match(Direction::BottomUp, table, parent_key);
                }
            }

            in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
