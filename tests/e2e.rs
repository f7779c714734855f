use predicate_eval as pe;
use pe::{Context, ErrorKind, EvalError};
use serde_json::json;

fn info() -> Context {
    Context::from_json(json!({
        "hostname": "lab-mac-07",
        "os_vers": "14.6.1",
        "os_vers_major": 14,
        "os_vers_minor": 6,
        "arch": "arm64",
        "x86_64_capable": false,
        "machine_type": "laptop",
        "machine_model": "MacBookPro18,3",
        "catalogs": ["testing", "production"],
        "date": "2024-08-24T10:00:00Z",
        "ipv4_address": ["10.0.1.15"],
    }))
    .unwrap()
}

#[test]
fn test_tautology_with_empty_context() {
    assert_eq!(pe::evaluate("1 == 1", &Context::new()), Ok(true));
}

#[test]
fn test_malformed_expression_is_a_parse_error() {
    let err = pe::evaluate("(os_vers == '14'", &info()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn test_missing_key_is_an_evaluation_error() {
    let err = pe::evaluate("serial_number == 'C02X'", &info()).unwrap_err();
    assert_eq!(err, EvalError::MissingKey("serial_number".into()));
    assert_eq!(err.kind(), ErrorKind::Evaluation);
}

#[test]
fn test_present_key_with_matching_value() {
    assert_eq!(pe::evaluate("machine_type == 'laptop'", &info()), Ok(true));
    assert_eq!(pe::evaluate("machine_type == 'desktop'", &info()), Ok(false));
}

#[test]
fn test_type_mismatch_is_an_evaluation_error() {
    let err = pe::evaluate("os_vers_major == '14'", &info()).unwrap_err();
    assert!(matches!(err, EvalError::TypeMismatch { .. }));
    assert!(!err.is_parse());
}

#[test]
fn test_typical_conditional_items() {
    let ctx = info();
    for expr in [
        r#"os_vers BEGINSWITH "14." AND arch == "arm64""#,
        "os_vers_major >= 13 && os_vers_minor > 2",
        "ANY catalogs == 'testing'",
        "'production' IN catalogs",
        "machine_model LIKE 'MacBookPro*'",
        "machine_model MATCHES 'MacBook(Air|Pro)[0-9]+,[0-9]+'",
        "hostname CONTAINS[c] 'LAB'",
        "x86_64_capable == NO",
        "NOT arch == 'x86_64'",
        "date > CAST('2024-01-01T00:00:00Z', 'NSDate')",
        "ANY ipv4_address BEGINSWITH '10.0.'",
        "os_vers_major BETWEEN {12, 15}",
    ] {
        assert_eq!(pe::evaluate(expr, &ctx), Ok(true), "{expr}");
    }
}

#[test]
fn test_evaluates_as_true_coerces_errors() {
    let ctx = info();
    assert!(pe::evaluates_as_true("arch == 'arm64'", &ctx));
    assert!(!pe::evaluates_as_true("arch ==", &ctx));
    assert!(!pe::evaluates_as_true("nope == 1", &ctx));
}

#[test]
fn test_repeated_calls_are_identical() {
    let ctx = info();
    for expr in ["arch == 'arm64'", "nope == 1", "a ==", "os_vers_major > 'x'"] {
        let first = pe::evaluate(expr, &ctx);
        for _ in 0..3 {
            assert_eq!(pe::evaluate(expr, &ctx), first, "{expr}");
        }
    }
}

#[test]
fn test_long_flat_chains_evaluate() {
    let ctx = Context::new().with("a", 1);
    let misses = vec!["a == 2"; 10_000].join(" OR ");
    assert_eq!(pe::evaluate(&misses, &ctx), Ok(false));
    assert_eq!(pe::evaluate(&format!("{misses} OR a == 1"), &ctx), Ok(true));

    let hits = vec!["a == 1"; 10_000].join(" AND ");
    assert_eq!(pe::evaluate(&hits, &ctx), Ok(true));
    let parsed: pe::Predicate = hits.parse().unwrap();
    assert_eq!(parsed.to_string(), hits);
}
