use criterion::{criterion_group, criterion_main, Criterion};

use pika_memo::{CharInput, Expr, GrammarBuilder, ParseDriver, ParseOptions};

/// Left-recursive arithmetic over single digits: `E <- E '+' E / E '*' E /
/// digit`. Exercises the fixpoint's worst case — every position re-seeds
/// a cyclic clause — over an input long enough to show the asymptotics.
fn arithmetic_grammar() -> pika_memo::Grammar {
    let mut b = GrammarBuilder::new();
    b.rule(
        "E",
        Expr::choice([
            Expr::seq([Expr::rule("E"), Expr::literal("+"), Expr::rule("E")]),
            Expr::seq([Expr::rule("E"), Expr::literal("*"), Expr::rule("E")]),
            Expr::rule("digit"),
        ]),
    )
    .top();
    b.rule("digit", Expr::CharRange('0', '9'));
    b.build().unwrap()
}

fn long_expression(terms: usize) -> String {
    let mut s = String::with_capacity(terms * 2);
    for i in 0..terms {
        if i > 0 {
            s.push(if i % 2 == 0 { '+' } else { '*' });
        }
        s.push(char::from(b'0' + (i % 10) as u8));
    }
    s
}

fn arithmetic(c: &mut Criterion) {
    let grammar = arithmetic_grammar();
    let input = long_expression(400);

    c.bench_function("fixpoint_sequential_400_terms", |bench| {
        bench.iter(|| ParseDriver::run(&grammar, CharInput::new(&input)));
    });

    c.bench_function("fixpoint_parallel_400_terms", |bench| {
        bench.iter(|| {
            ParseDriver::run_with_options(
                &grammar,
                CharInput::new(&input),
                ParseOptions {
                    parallel: true,
                    num_threads: None,
                },
            )
        });
    });
}

criterion_group!(benches, arithmetic);
criterion_main!(benches);
