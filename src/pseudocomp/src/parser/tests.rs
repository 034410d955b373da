// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use super::*;
use crate::ast::print_eqn;
use crate::common::{ErrorCode, ErrorKind};

fn parse_eq(input: &str) -> Result<Option<Expr>, Vec<EquationError>> {
    parse(input, LexerType::Equation)
}

fn parse_units(input: &str) -> Result<Option<Expr>, Vec<EquationError>> {
    parse(input, LexerType::Units)
}

fn var(id: &str) -> Box<Expr> {
    Box::new(Expr::Var(id.to_string(), Loc::default()))
}

fn num(s: &str, n: f64) -> Box<Expr> {
    Box::new(Expr::Const(s.to_string(), n, Loc::default()))
}

fn assert_err(input: &str, start: u16, end: u16, code: ErrorCode) {
    let errs = parse_eq(input).unwrap_err();
    assert_eq!(1, errs.len());
    assert_eq!(EquationError { start, end, code }, errs[0], "for '{input}'");
}

#[test]
fn test_parse_number() {
    let ast = parse_eq("42").unwrap().unwrap();
    assert_eq!(Expr::Const("42".to_string(), 42.0, Loc::new(0, 2)), ast);
}

#[test]
fn test_parse_scientific_notation() {
    let ast = parse_eq("1.5e3").unwrap().unwrap().strip_loc();
    assert_eq!(*num("1.5e3", 1500.0), ast);
}

#[test]
fn test_parse_nan() {
    match parse_eq("NaN").unwrap().unwrap() {
        Expr::Const(s, n, _) => {
            assert_eq!("NaN", s);
            assert!(n.is_nan());
        }
        other => panic!("expected Const, got {other:?}"),
    }
}

#[test]
fn test_parse_identifier() {
    let ast = parse_eq("comp.x").unwrap().unwrap();
    assert_eq!(Expr::Var("comp.x".to_string(), Loc::new(0, 6)), ast);
}

#[test]
fn test_parse_quoted_identifier() {
    let ast = parse_eq("\"a b\" + 1").unwrap().unwrap().strip_loc();
    assert_eq!(
        Expr::Op2(BinaryOp::Add, var("a b"), num("1", 1.0), Loc::default()),
        ast
    );
}

#[test]
fn test_parse_empty() {
    assert_eq!(Ok(None), parse_eq(""));
    assert_eq!(Ok(None), parse_eq("   "));
}

#[test]
fn test_parse_precedence() {
    // (x1+x2)*2
    let ast = parse_eq("(x1+x2)*2").unwrap().unwrap().strip_loc();
    let expected = Expr::Op2(
        BinaryOp::Mul,
        Box::new(Expr::Op2(BinaryOp::Add, var("x1"), var("x2"), Loc::default())),
        num("2", 2.0),
        Loc::default(),
    );
    assert_eq!(expected, ast);

    // a+b*c
    let ast = parse_eq("a+b*c").unwrap().unwrap().strip_loc();
    let expected = Expr::Op2(
        BinaryOp::Add,
        var("a"),
        Box::new(Expr::Op2(BinaryOp::Mul, var("b"), var("c"), Loc::default())),
        Loc::default(),
    );
    assert_eq!(expected, ast);
}

#[test]
fn test_parse_left_associative() {
    let ast = parse_eq("a-b-c").unwrap().unwrap().strip_loc();
    let expected = Expr::Op2(
        BinaryOp::Sub,
        Box::new(Expr::Op2(BinaryOp::Sub, var("a"), var("b"), Loc::default())),
        var("c"),
        Loc::default(),
    );
    assert_eq!(expected, ast);
}

#[test]
fn test_parse_exponent_spellings() {
    let caret = parse_eq("x^2").unwrap().unwrap().strip_loc();
    let stars = parse_eq("x**2").unwrap().unwrap().strip_loc();
    assert_eq!(caret, stars);
    assert_eq!(
        Expr::Op2(BinaryOp::Exp, var("x"), num("2", 2.0), Loc::default()),
        caret
    );
}

#[test]
fn test_parse_unary() {
    // the sign applies to the whole power
    let ast = parse_eq("-a^2").unwrap().unwrap();
    assert_eq!(Loc::new(0, 4), ast.get_loc());
    let expected = Expr::Op1(
        UnaryOp::Negative,
        Box::new(Expr::Op2(BinaryOp::Exp, var("a"), num("2", 2.0), Loc::default())),
        Loc::default(),
    );
    assert_eq!(expected, ast.strip_loc());

    let ast = parse_eq("a^-2").unwrap().unwrap().strip_loc();
    let expected = Expr::Op2(
        BinaryOp::Exp,
        var("a"),
        Box::new(Expr::Op1(UnaryOp::Negative, num("2", 2.0), Loc::default())),
        Loc::default(),
    );
    assert_eq!(expected, ast);

    let ast = parse_eq("2*-b").unwrap().unwrap().strip_loc();
    let expected = Expr::Op2(
        BinaryOp::Mul,
        num("2", 2.0),
        Box::new(Expr::Op1(UnaryOp::Negative, var("b"), Loc::default())),
        Loc::default(),
    );
    assert_eq!(expected, ast);
}

#[test]
fn test_parse_app() {
    let ast = parse_eq("SQRT(x) + abs(y)").unwrap().unwrap().strip_loc();
    let expected = Expr::Op2(
        BinaryOp::Add,
        Box::new(Expr::App("sqrt".to_string(), vec![*var("x")], Loc::default())),
        Box::new(Expr::App("abs".to_string(), vec![*var("y")], Loc::default())),
        Loc::default(),
    );
    assert_eq!(expected, ast);
}

#[test]
fn test_parse_subscript() {
    let ast = parse_eq("a[1, 2]").unwrap().unwrap();
    assert_eq!(
        Expr::Subscript("a".to_string(), vec![1, 2], Loc::new(0, 7)),
        ast
    );
    assert_eq!(Some("a[1, 2]".to_string()), ast.reference());
}

#[test]
fn test_parse_locations() {
    let ast = parse_eq("a + bb").unwrap().unwrap();
    match ast {
        Expr::Op2(_, l, r, loc) => {
            assert_eq!(Loc::new(0, 6), loc);
            assert_eq!(Loc::new(0, 1), l.get_loc());
            assert_eq!(Loc::new(4, 6), r.get_loc());
        }
        other => panic!("expected Op2, got {other:?}"),
    }
}

#[test]
fn test_parse_errors() {
    assert_err("a +", 3, 4, ErrorCode::UnrecognizedEof);
    assert_err("a b", 2, 3, ErrorCode::ExtraToken);
    assert_err("(a", 2, 3, ErrorCode::UnrecognizedEof);
    assert_err("a + )", 4, 5, ErrorCode::UnrecognizedToken);
    assert_err("x[1.5]", 2, 5, ErrorCode::ExpectedInteger);
    assert_err("x[i]", 2, 3, ErrorCode::ExpectedInteger);
    assert_err("a ; b", 2, 3, ErrorCode::UnrecognizedToken);
}

#[test]
fn test_parse_units() {
    let ast = parse_units("kg*m/s^2").unwrap().unwrap().strip_loc();
    let expected = Expr::Op2(
        BinaryOp::Div,
        Box::new(Expr::Op2(BinaryOp::Mul, var("kg"), var("m"), Loc::default())),
        Box::new(Expr::Op2(BinaryOp::Exp, var("s"), num("2", 2.0), Loc::default())),
        Loc::default(),
    );
    assert_eq!(expected, ast);

    let ast = parse_units("$/ft").unwrap().unwrap().strip_loc();
    assert_eq!(
        Expr::Op2(BinaryOp::Div, var("$"), var("ft"), Loc::default()),
        ast
    );
}

#[test]
fn test_print_reparses() {
    for eqn in [
        "(a + b) * 2",
        "a - (b - c)",
        "a / (b * c)",
        "-(a + b)",
        "(-a) ^ 2",
        "x[1] * \"y z\" + sqrt(w)",
        "a ^ (-2)",
    ] {
        let ast = parse_eq(eqn).unwrap().unwrap();
        let printed = print_eqn(&ast);
        assert_eq!(eqn, printed);
        let reparsed = parse_eq(&printed).unwrap().unwrap();
        assert_eq!(ast.strip_loc(), reparsed.strip_loc());
    }
}

#[test]
fn test_parse_expr_errors() {
    let err = parse_expr("").unwrap_err();
    assert_eq!(ErrorCode::EmptyEquation, err.code);
    assert_eq!(ErrorKind::Variable, err.kind);

    let err = parse_expr("a + ;").unwrap_err();
    assert_eq!(ErrorCode::UnrecognizedToken, err.code);
    assert!(err.get_details().unwrap().starts_with("'a + ;'"));
}
