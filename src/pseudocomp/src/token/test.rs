// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use super::ErrorCode::*;
use super::Token::*;
use super::{EquationError, ErrorCode, Lexer, LexerType, Token, is_plain_identifier};

fn test(input: &str, expected: Vec<(&str, Token)>) {
    test_inner(input, expected, LexerType::Equation)
}

// straight from LALRPOP
fn test_inner(input: &str, expected: Vec<(&str, Token)>, lexer_type: LexerType) {
    let tokenizer = Lexer::new(input, lexer_type);
    let len = expected.len();
    for (token, (expected_span, expected_tok)) in tokenizer.zip(expected.into_iter()) {
        let expected_start = expected_span.find('~').unwrap();
        let expected_end = expected_span.rfind('~').unwrap() + 1;
        assert_eq!(Ok((expected_start, expected_tok, expected_end)), token);
    }

    let tokenizer = Lexer::new(input, lexer_type);
    assert_eq!(None, tokenizer.skip(len).next());
}

fn test_err(input: &str, expected: (&str, ErrorCode)) {
    let tokenizer = Lexer::new(input, LexerType::Equation);
    let token = tokenizer.into_iter().last().unwrap();
    let (expected_span, expected_code) = expected;
    let expected_start = expected_span.find('~').unwrap();
    let expected_end = expected_span.rfind('~').unwrap() + 1;
    let expected_err = EquationError {
        start: expected_start as u16,
        end: expected_end as u16,
        code: expected_code,
    };
    assert_eq!(Err(expected_err), token);
}

#[test]
fn sum_of_refs() {
    test(
        "(x1+x2)*2",
        vec![
            ("~        ", LParen),
            (" ~~      ", Ident("x1")),
            ("   ~     ", Plus),
            ("    ~~   ", Ident("x2")),
            ("      ~  ", RParen),
            ("       ~ ", Mul),
            ("        ~", Num("2")),
        ],
    );
}

#[test]
fn dotted_ident() {
    test("comp.x", vec![("~~~~~~", Ident("comp.x"))]);
}

#[test]
fn subscript() {
    test(
        "a[1,2]",
        vec![
            ("~     ", Ident("a")),
            (" ~    ", LBracket),
            ("  ~   ", Num("1")),
            ("   ~  ", Comma),
            ("    ~ ", Num("2")),
            ("     ~", RBracket),
        ],
    );
}

#[test]
fn both_exponent_spellings() {
    test("a^2", vec![("~  ", Ident("a")), (" ~ ", Exp), ("  ~", Num("2"))]);
    test(
        "a**2",
        vec![("~   ", Ident("a")), (" ~~ ", Exp), ("   ~", Num("2"))],
    );
    test(
        "a * 2",
        vec![("~    ", Ident("a")), ("  ~  ", Mul), ("    ~", Num("2"))],
    );
}

#[test]
fn numbers() {
    test("3.2808398950131235", vec![("~~~~~~~~~~~~~~~~~~", Num("3.2808398950131235"))]);
    test("1e-3", vec![("~~~~", Num("1e-3"))]);
    test(".5", vec![("~~", Num(".5"))]);
    test("-3", vec![("~ ", Minus), (" ~", Num("3"))]);
}

#[test]
fn nan_keyword() {
    test("NaN", vec![("~~~", Nan)]);
}

#[test]
fn quoted_ident() {
    test("\"a b\"", vec![("~~~~~", Ident("\"a b\""))]);
    test_err("\"a b", ("~~~~", UnclosedQuotedIdent));
}

#[test]
fn unit_idents() {
    test_inner("$/ft", vec![("~   ", Ident("$")), (" ~  ", Div), ("  ~~", Ident("ft"))], LexerType::Units);
}

#[test]
fn bad_token() {
    test_err("a + ;", ("    ~", UnrecognizedToken));
}

#[test]
fn plain_identifiers() {
    assert!(is_plain_identifier("comp.x"));
    assert!(is_plain_identifier("_pseudo_0"));
    assert!(!is_plain_identifier("a b"));
    assert!(!is_plain_identifier("1a"));
    assert!(!is_plain_identifier("nan"));
    assert!(!is_plain_identifier(""));
}
