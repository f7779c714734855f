use predicate_eval as pe;
use pe::{Context, Evaluator, Predicate};
use proptest::prelude::*;
use serde_json::json;

fn ctx() -> Context {
    Context::from_json(json!({
        "a": 1,
        "b": "x",
        "name": "Firefox",
        "tags": ["a", "b"],
    }))
    .unwrap()
}

fn arb_literal() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<i32>().prop_map(|i| i.to_string()),
        "[a-z]{0,5}".prop_map(|s| format!("'{s}'")),
        Just("{1, 'x'}".to_string()),
        Just("nil".to_string()),
        Just("YES".to_string()),
    ]
}

fn arb_comparison() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec!["a", "b", "name", "tags", "missing", "ANY tags"]),
        prop::sample::select(vec![
            "==",
            "!=",
            "<",
            ">=",
            "BEGINSWITH",
            "CONTAINS[c]",
            "IN",
            "LIKE[cd]",
        ]),
        arb_literal(),
    )
        .prop_map(|(k, op, lit)| format!("{k} {op} {lit}"))
}

fn arb_predicate() -> impl Strategy<Value = String> {
    arb_comparison().prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({l}) AND ({r})")),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("{l} OR {r}")),
            inner.prop_map(|p| format!("NOT ({p})")),
        ]
    })
}

proptest! {
    #[test]
    fn arbitrary_input_never_panics(s in "\\PC{0,40}") {
        let _ = pe::evaluate(&s, &ctx());
    }

    #[test]
    fn evaluation_is_idempotent(expr in arb_predicate()) {
        let c = ctx();
        let first = pe::evaluate(&expr, &c);
        prop_assert_eq!(pe::evaluate(&expr, &c), first);
    }

    #[test]
    fn canonical_form_reparses_to_the_same_tree(expr in arb_predicate()) {
        let parsed = Predicate::parse(&expr).unwrap();
        let again = Predicate::parse(&parsed.to_string()).unwrap();
        prop_assert_eq!(parsed, again);
    }

    #[test]
    fn compiled_and_direct_evaluation_agree(expr in arb_predicate()) {
        let ev = Evaluator::default();
        let c = ctx();
        let compiled = ev.compile(&expr).unwrap();
        prop_assert_eq!(ev.evaluate_compiled(&compiled, &c), ev.evaluate(&expr, &c));
    }
}

#[test]
fn shared_evaluator_across_threads() {
    let ev = Evaluator::default();
    let pred = ev.compile("ANY tags == 'b' AND name BEGINSWITH[c] 'fire'").unwrap();
    let c = ctx();
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| ev.evaluate_compiled(&pred, &c)))
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), Ok(true));
        }
    });
}
