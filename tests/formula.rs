use std::collections::BTreeSet;

use stat_gauge::prelude::*;

fn lookup(name: &str) -> f64 {
    match name.to_ascii_lowercase().as_str() {
        "str" => 14.0,
        "dex" => 12.0,
        "lvl" => 3.0,
        "hp" => 120.0,
        _ => 0.0,
    }
}

fn eval(formula: &str) -> f64 {
    evaluate(formula, lookup).unwrap()
}

#[test]
fn test_precedence_and_associativity() {
    assert_eq!(eval("1 + 2 * 3"), 7.0);
    assert_eq!(eval("(1 + 2) * 3"), 9.0);
    assert_eq!(eval("10 - 4 - 3"), 3.0);
    assert_eq!(eval("16 / 4 / 2"), 2.0);
    assert_eq!(eval("-2 * -3"), 6.0);
    assert_eq!(eval("--4 + +1"), 5.0);
    assert_eq!(eval(".5 + 1.25"), 1.75);
}

#[test]
fn test_references_resolve_through_callback() {
    assert_eq!(eval("STR * 2 + lvl"), 31.0);
    assert_eq!(eval("Str + sTr"), 28.0);
    assert_eq!(eval("unknown_stat + 1"), 1.0);
}

#[test]
fn test_percent_shorthand() {
    assert_eq!(eval("50% hp"), 60.0);
    assert_eq!(eval("25%HP + 10"), 40.0);
    assert_eq!(eval("hp - 10% hp"), 108.0);
}

#[test]
fn test_functions() {
    assert_eq!(eval("max(str, dex, 20)"), 20.0);
    assert_eq!(eval("MIN(str, dex)"), 12.0);
    assert_eq!(eval("abs(dex - str)"), 2.0);
    assert_eq!(eval("floor(7 / 2) + ceil(0.1) + round(2.5)"), 7.0);
    assert_eq!(eval("sqrt(hp + 24)"), 12.0);
    assert!((eval("sin(90)") - 1.0).abs() < 1e-12);
    assert!((eval("cos(180)") + 1.0).abs() < 1e-12);
    assert!((eval("tan(45)") - 1.0).abs() < 1e-12);
}

#[test]
fn test_parse_errors() {
    assert_eq!(Expression::new(""), Err(ParseError::Empty));
    assert_eq!(Expression::new("   "), Err(ParseError::Empty));
    assert!(matches!(Expression::new("1 +"), Err(ParseError::UnexpectedEnd)));
    assert!(matches!(Expression::new("(1 + 2"), Err(ParseError::UnclosedParenthesis { .. })));
    assert!(matches!(Expression::new("1 + 2)"), Err(ParseError::UnmatchedParenthesis { .. })));
    assert!(matches!(Expression::new("3 $ 4"), Err(ParseError::UnexpectedCharacter { .. })));
    assert!(matches!(Expression::new("abs(1, 2)"), Err(ParseError::WrongArity { .. })));
    assert!(matches!(Expression::new("max()"), Err(ParseError::WrongArity { .. })));
    assert!(matches!(Expression::new("50% 3"), Err(ParseError::ExpectedIdentifier { .. })));
}

#[test]
fn test_deep_nesting_is_rejected() {
    let deep = format!("{}1{}", "(".repeat(500), ")".repeat(500));
    assert!(matches!(Expression::new(&deep), Err(ParseError::TooDeep { .. })));

    let shallow = format!("{}1{}", "(".repeat(20), ")".repeat(20));
    assert_eq!(eval(&shallow), 1.0);
}

#[test]
fn test_long_flat_formula_is_rejected() {
    for terms in [2_000, 20_000] {
        let formula = vec!["1"; terms].join("+");
        assert!(!validate(&formula));
        assert!(matches!(Expression::new(&formula), Err(ParseError::TooDeep { .. })));
    }
    assert_eq!(eval(&vec!["str"; 100].join(" + ")), 1400.0);
}

#[test]
fn test_runtime_errors() {
    assert_eq!(evaluate("1 / (str - 14)", lookup), Err(EvalError::DivisionByZero));
    assert_eq!(evaluate("sqrt(-1)", lookup), Err(EvalError::NonFinite));
    assert!(matches!(evaluate("1 +* 2", lookup), Err(EvalError::Parse(_))));
}

#[test]
fn test_validate() {
    assert!(validate("STR * 2 + max(dex, 1)"));
    assert!(validate("a / b"));
    assert!(!validate("STR *"));
    assert!(!validate("nope(1)"));
}

#[test]
fn test_extract_references() {
    let expected: BTreeSet<String> = ["con", "lvl"].iter().map(|s| s.to_string()).collect();
    assert_eq!(extract_references("CON * 12 + LVL * 15 + max(con, 1)"), expected);
    assert!(extract_references("1 + 2").is_empty());
    // Still useful for broken formulas.
    assert!(extract_references("CON * (").contains("con"));
}

#[test]
fn test_expression_reuse() {
    let expression: Expression = "STR * 2 + LVL".parse().unwrap();
    assert_eq!(expression.definition(), "STR * 2 + LVL");
    assert_eq!(expression.to_string(), "STR * 2 + LVL");
    assert_eq!(expression.references().len(), 2);

    assert_eq!(expression.evaluate(lookup).unwrap(), 31.0);
    assert_eq!(expression.evaluate(|_| 1.0).unwrap(), 3.0);
}
