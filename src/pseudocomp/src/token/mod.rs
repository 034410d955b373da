// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

// derived from both the LALRPOP whitespace tokenizer, and LALRPOP's
// internal tokenizer

use std::str::CharIndices;

use lazy_static::lazy_static;
use unicode_xid::UnicodeXID;

use self::Token::*;
use crate::common::ErrorCode::*;
use crate::common::{EquationError, ErrorCode};

#[cfg(test)]
mod test;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LexerType {
    Equation,
    Units,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token<'input> {
    Exp,
    Plus,
    Minus,
    Mul,
    Div,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Nan,
    Ident(&'input str),
    Num(&'input str),
}

fn error<T>(code: ErrorCode, start: usize, end: usize) -> Result<T, EquationError> {
    Err(EquationError {
        start: start as u16,
        end: end as u16,
        code,
    })
}

pub type Spanned<T> = (usize, T, usize);

pub struct Lexer<'input> {
    text: &'input str,
    chars: CharIndices<'input>,
    lookahead: Option<(usize, char)>,
    is_units: bool,
}

const KEYWORDS: &[(&str, Token<'static>)] = &[("nan", Nan)];

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str, lexer_type: LexerType) -> Self {
        let mut t = Lexer {
            text: input,
            chars: input.char_indices(),
            lookahead: None,
            is_units: matches!(lexer_type, LexerType::Units),
        };
        t.bump();
        t
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        self.bump_n(1)
    }

    fn bump_n(&mut self, n: usize) -> Option<(usize, char)> {
        assert!(n > 0);
        self.lookahead = self.chars.nth(n - 1);
        self.lookahead
    }

    fn word(&mut self, idx0: usize) -> Spanned<&'input str> {
        let is_units = self.is_units;
        let end = self.skip_while(|c| is_identifier_continue(c, is_units));
        (idx0, &self.text[idx0..end], end)
    }

    /// skip_while advances past every character matching `pred` and
    /// returns the byte offset of the first one that doesn't (or the end
    /// of the input).
    fn skip_while<F: Fn(char) -> bool>(&mut self, pred: F) -> usize {
        while let Some((idx, c)) = self.lookahead {
            if !pred(c) {
                return idx;
            }
            self.bump();
        }
        self.text.len()
    }

    fn identifierish(&mut self, idx0: usize) -> Spanned<Token<'input>> {
        let (start, word, end) = self.word(idx0);
        let lower_word = word.to_lowercase();

        let tok = KEYWORDS
            .iter()
            .filter(|&&(w, _)| w == lower_word)
            .map(|(_, t)| *t)
            .next()
            .unwrap_or(Ident(word));

        (start, tok, end)
    }

    fn number(&mut self, idx0: usize) -> Spanned<Token<'input>> {
        use regex::Regex;

        lazy_static! {
            static ref NUMBER_RE: Regex =
                Regex::new(r"^\d*(\.\d*)?([eE][-+]?(\d*(\.\d*)?)?)?").unwrap();
        }

        // the pattern can match the empty string, so a match always exists;
        // is_number_start guarantees it is at least one character long.
        let len = NUMBER_RE
            .find(&self.text[idx0..])
            .map(|m| m.end())
            .unwrap_or(0)
            .max(1);

        self.bump_n(len);

        let end = idx0 + len;
        (idx0, Num(&self.text[idx0..end]), end)
    }

    fn quoted_identifier(&mut self, idx0: usize) -> Result<Spanned<Token<'input>>, EquationError> {
        // eat the opening '"'
        self.bump();

        let idx1 = self.skip_while(|c| c != '"');
        if self.lookahead.is_none() {
            return error(UnclosedQuotedIdent, idx0, self.text.len());
        }
        // eat the trailing '"'
        self.bump();
        Ok((idx0, Ident(&self.text[idx0..idx1 + 1]), idx1 + 1))
    }

    #[allow(clippy::unnecessary_wraps)]
    fn consume(
        &mut self,
        i: usize,
        tok: Token<'input>,
        len: usize,
    ) -> Option<Result<Spanned<Token<'input>>, EquationError>> {
        self.bump();
        Some(Ok((i, tok, i + len)))
    }
}

fn punctuation(c: char) -> Option<Token<'static>> {
    let tok = match c {
        '/' => Div,
        '^' => Exp,
        '-' => Minus,
        '+' => Plus,
        '(' => LParen,
        ')' => RParen,
        '[' => LBracket,
        ']' => RBracket,
        ',' => Comma,
        _ => return None,
    };
    Some(tok)
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Result<Spanned<Token<'input>>, EquationError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_while(char::is_whitespace);
        let (i, c) = self.lookahead?;

        if c == '*' {
            // `**` is an alternate spelling of `^`
            return match self.bump() {
                Some((_, '*')) => self.consume(i, Exp, 2),
                _ => Some(Ok((i, Mul, i + 1))),
            };
        }
        if let Some(tok) = punctuation(c) {
            return self.consume(i, tok, 1);
        }
        if c == '"' {
            return Some(self.quoted_identifier(i));
        }
        if is_identifier_start(c, self.is_units) {
            return Some(Ok(self.identifierish(i)));
        }
        if is_number_start(c) {
            return Some(Ok(self.number(i)));
        }

        // eat whatever is killing us
        let end = match self.bump() {
            Some((end, _)) => end,
            None => self.text.len(),
        };
        Some(error(UnrecognizedToken, i, end))
    }
}

fn is_number_start(c: char) -> bool {
    is_digit(c) || c == '.'
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn is_identifier_start(c: char, is_units: bool) -> bool {
    UnicodeXID::is_xid_start(c) || c == '_' || (is_units && c == '$')
}

pub(crate) fn is_identifier_continue(c: char, is_units: bool) -> bool {
    UnicodeXID::is_xid_continue(c) || c == '.' || (is_units && c == '$')
}

/// is_plain_identifier reports whether `name` lexes back as a single
/// unquoted identifier, i.e. whether it can be printed without quotes.
pub(crate) fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_identifier_start(c, false) => {}
        _ => return false,
    }
    if !chars.all(|c| is_identifier_continue(c, false)) {
        return false;
    }
    !KEYWORDS
        .iter()
        .any(|(w, _)| *w == name.to_lowercase().as_str())
}
