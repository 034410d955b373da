// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

/// Variable references are kept exactly as written (`comp.x`, `x[1]`);
/// unlike model identifiers they are case sensitive and never rewritten.
pub type Ident = String;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError,      // will never be produced
    DoesNotExist, // the named entity doesn't exist
    InvalidToken,
    UnrecognizedEof,
    UnrecognizedToken,
    ExtraToken,
    UnclosedQuotedIdent,
    ExpectedNumber,
    ExpectedInteger,
    EmptyEquation,
    UnknownBuiltin,
    BadBuiltinArgs,
    UnknownUnit,
    DuplicateUnit,
    OffsetUnitInProduct,
    ExponentOverflow,
    IncompatibleUnits,
    MultiVariableDestination,
    NotAssignable,
    UnsetValue,
    UnsupportedSecondOrderDerivative,
    IndexedAccessUnsupported,
    JacobianNotComputed,
    BadConfig,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            DoesNotExist => "does_not_exist",
            InvalidToken => "invalid_token",
            UnrecognizedEof => "unrecognized_eof",
            UnrecognizedToken => "unrecognized_token",
            ExtraToken => "extra_token",
            UnclosedQuotedIdent => "unclosed_quoted_ident",
            ExpectedNumber => "expected_number",
            ExpectedInteger => "expected_integer",
            EmptyEquation => "empty_equation",
            UnknownBuiltin => "unknown_builtin",
            BadBuiltinArgs => "bad_builtin_args",
            UnknownUnit => "unknown_unit",
            DuplicateUnit => "duplicate_unit",
            OffsetUnitInProduct => "offset_unit_in_product",
            ExponentOverflow => "exponent_overflow",
            IncompatibleUnits => "incompatible_units",
            MultiVariableDestination => "multi_variable_destination",
            NotAssignable => "not_assignable",
            UnsetValue => "unset_value",
            UnsupportedSecondOrderDerivative => "unsupported_second_order_derivative",
            IndexedAccessUnsupported => "indexed_access_unsupported",
            JacobianNotComputed => "jacobian_not_computed",
            BadConfig => "bad_config",
            Generic => "generic",
        };

        write!(f, "{name}")
    }
}

/// EquationError is a positioned error produced while lexing or
/// parsing equation or unit text.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EquationError {
    pub start: u16,
    pub end: u16,
    pub code: ErrorCode,
}

impl fmt::Display for EquationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.end, self.code)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Units,
    Evaluation,
    Variable,
    Config,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    /// from_equation attaches the offending text to a positioned parse
    /// error so the message is useful without the original source.
    pub fn from_equation(eqn: &str, err: EquationError) -> Self {
        let start = (err.start as usize).min(eqn.len());
        let end = (err.end as usize).clamp(start, eqn.len());
        let snippet = eqn.get(start..end).unwrap_or("");
        Error {
            kind: ErrorKind::Variable,
            code: err.code,
            details: Some(format!("'{eqn}' at {}:{} ('{snippet}')", err.start, err.end)),
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::Units => "UnitsError",
            ErrorKind::Evaluation => "EvaluationError",
            ErrorKind::Variable => "VariableError",
            ErrorKind::Config => "ConfigError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Config,
            code: ErrorCode::BadConfig,
            details: Some(err.to_string()),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;
pub type EquationResult<T> = result::Result<T, EquationError>;

#[macro_export]
macro_rules! eqn_err(
    ($code:tt, $start:expr, $end:expr) => {{
        use $crate::common::{EquationError, ErrorCode};
        Err(EquationError{ start: $start, end: $end, code: ErrorCode::$code})
    }}
);

#[macro_export]
macro_rules! conn_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Connection,
            ErrorCode::$code,
            Some($str),
        ))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Connection, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! units_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Units, ErrorCode::$code, Some($str)))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Units, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! eval_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Evaluation,
            ErrorCode::$code,
            Some($str),
        ))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Evaluation, ErrorCode::$code, None))
    }};
}

/// varname strips any subscript from a reference: `x[1]` -> `x`.
pub fn varname(reference: &str) -> &str {
    match reference.find('[') {
        Some(idx) => &reference[..idx],
        None => reference,
    }
}

#[test]
fn test_varname() {
    assert_eq!("x", varname("x"));
    assert_eq!("comp.x", varname("comp.x[2]"));
    assert_eq!("a", varname("a[1, 2]"));
    assert_eq!("", varname(""));
}

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Connection,
        ErrorCode::MultiVariableDestination,
        Some("p + q".to_owned()),
    );
    assert_eq!(
        "ConnectionError{multi_variable_destination: p + q}",
        format!("{err}")
    );

    let err = Error::new(ErrorKind::Evaluation, ErrorCode::JacobianNotComputed, None);
    assert_eq!("EvaluationError{jacobian_not_computed}", format!("{err}"));
}

#[test]
fn test_from_equation_snippet() {
    let err = Error::from_equation(
        "a + $",
        EquationError {
            start: 4,
            end: 5,
            code: ErrorCode::UnrecognizedToken,
        },
    );
    assert_eq!(ErrorKind::Variable, err.kind);
    assert_eq!(ErrorCode::UnrecognizedToken, err.code);
    assert!(err.get_details().unwrap().contains("('$')"));

    // out-of-range positions are clamped rather than panicking
    let err = Error::from_equation(
        "a",
        EquationError {
            start: 3,
            end: 9,
            code: ErrorCode::UnrecognizedEof,
        },
    );
    assert!(err.get_details().unwrap().contains("('')"));
}
