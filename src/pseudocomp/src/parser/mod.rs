// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Hand-written recursive descent parser for connection expressions
//! and unit definitions.

use crate::ast::{BinaryOp, Expr, Loc, UnaryOp};
use crate::common::{EquationError, Error, ErrorCode, Result as ConnResult};
use crate::token::{Lexer, LexerType, Spanned, Token};

#[cfg(test)]
mod tests;

/// TokenKind discriminant for efficient peek comparisons without payload matching
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenKind {
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
    Ident,
    Num,
}

impl<'a> From<&Token<'a>> for TokenKind {
    fn from(token: &Token<'a>) -> Self {
        match token {
            Token::Exp => TokenKind::Exp,
            Token::Plus => TokenKind::Plus,
            Token::Minus => TokenKind::Minus,
            Token::Mul => TokenKind::Mul,
            Token::Div => TokenKind::Div,
            Token::LParen => TokenKind::LParen,
            Token::RParen => TokenKind::RParen,
            Token::LBracket => TokenKind::LBracket,
            Token::RBracket => TokenKind::RBracket,
            Token::Comma => TokenKind::Comma,
            Token::Nan => TokenKind::Nan,
            Token::Ident(_) => TokenKind::Ident,
            Token::Num(_) => TokenKind::Num,
        }
    }
}

/// Parser state holding tokenized input
struct Parser<'input> {
    tokens: Vec<Spanned<Token<'input>>>,
    pos: usize,
}

fn ident_name(raw: &str) -> String {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 && bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"' {
        raw[1..raw.len() - 1].to_owned()
    } else {
        raw.to_owned()
    }
}

impl<'input> Parser<'input> {
    /// Create a new parser from a lexer, collecting all tokens up front.
    /// Returns an error if the lexer produces any errors.
    fn new(lexer: Lexer<'input>) -> Result<Self, EquationError> {
        let mut tokens = Vec::new();
        for result in lexer {
            tokens.push(result?);
        }
        Ok(Parser { tokens, pos: 0 })
    }

    /// Peek at the current token without consuming it
    fn peek(&self) -> Option<&Spanned<Token<'input>>> {
        self.tokens.get(self.pos)
    }

    /// Peek at the kind of the current token
    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|(_, tok, _)| TokenKind::from(tok))
    }

    fn peek_kind_at(&self, offset: usize) -> Option<TokenKind> {
        self.tokens
            .get(self.pos + offset)
            .map(|(_, tok, _)| TokenKind::from(tok))
    }

    /// Advance to the next token and return the consumed token
    fn advance(&mut self) -> Result<Spanned<Token<'input>>, EquationError> {
        match self.tokens.get(self.pos) {
            Some(tok) => {
                self.pos += 1;
                Ok(*tok)
            }
            None => Err(self.eof_error()),
        }
    }

    /// Expect the current token to match the expected kind, returning an error if not
    fn expect(&mut self, expected: TokenKind) -> Result<Spanned<Token<'input>>, EquationError> {
        if self.peek_kind() == Some(expected) {
            self.advance()
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> EquationError {
        match self.peek() {
            Some((start, _, end)) => EquationError {
                start: *start as u16,
                end: *end as u16,
                code: ErrorCode::UnrecognizedToken,
            },
            None => self.eof_error(),
        }
    }

    fn eof_error(&self) -> EquationError {
        let pos = self.eof_position();
        EquationError {
            start: pos as u16,
            end: (pos + 1) as u16,
            code: ErrorCode::UnrecognizedEof,
        }
    }

    /// Get the position for EOF errors
    fn eof_position(&self) -> usize {
        if let Some((_, _, end)) = self.tokens.last() {
            *end
        } else {
            0
        }
    }

    /// Check if we've consumed all tokens
    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Parse an equation from the token stream.
    /// Returns Ok(None) for empty input.
    fn parse_equation(&mut self) -> Result<Option<Expr>, EquationError> {
        if self.is_at_end() {
            return Ok(None);
        }

        let expr = self.parse_additive()?;

        // Check for extra tokens after the expression
        if let Some((start, _, end)) = self.peek() {
            return Err(EquationError {
                start: *start as u16,
                end: *end as u16,
                code: ErrorCode::ExtraToken,
            });
        }

        Ok(Some(expr))
    }

    /// Parse additive operators (+, -)
    fn parse_additive(&mut self) -> Result<Expr, EquationError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_multiplicative()?;
            let loc = left.get_loc().union(&right.get_loc());
            left = Expr::Op2(op, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    /// Parse multiplicative operators (*, /)
    fn parse_multiplicative(&mut self) -> Result<Expr, EquationError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Mul) => BinaryOp::Mul,
                Some(TokenKind::Div) => BinaryOp::Div,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_unary()?;
            let loc = left.get_loc().union(&right.get_loc());
            left = Expr::Op2(op, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    /// Parse unary operators (+, -)
    fn parse_unary(&mut self) -> Result<Expr, EquationError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Plus) => UnaryOp::Positive,
            Some(TokenKind::Minus) => UnaryOp::Negative,
            _ => return self.parse_exponentiation(),
        };
        let (lpos, _, _) = self.advance()?;
        let operand = self.parse_exponentiation()?;
        let rpos = operand.get_loc().end as usize;
        Ok(Expr::Op1(op, Box::new(operand), Loc::new(lpos, rpos)))
    }

    /// Parse exponentiation operator (^ or **) - left associative
    fn parse_exponentiation(&mut self) -> Result<Expr, EquationError> {
        let mut left = self.parse_app()?;

        while self.peek_kind() == Some(TokenKind::Exp) {
            self.advance()?;
            let right = self.parse_exponent()?;
            let loc = left.get_loc().union(&right.get_loc());
            left = Expr::Op2(BinaryOp::Exp, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    /// Parse the right hand side of an exponentiation, which may carry
    /// a sign: `x ^ -2`.
    fn parse_exponent(&mut self) -> Result<Expr, EquationError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Plus) => UnaryOp::Positive,
            Some(TokenKind::Minus) => UnaryOp::Negative,
            _ => return self.parse_app(),
        };
        let (lpos, _, _) = self.advance()?;
        let operand = self.parse_app()?;
        let rpos = operand.get_loc().end as usize;
        Ok(Expr::Op1(op, Box::new(operand), Loc::new(lpos, rpos)))
    }

    /// Parse function application: id(args)
    fn parse_app(&mut self) -> Result<Expr, EquationError> {
        if self.peek_kind() == Some(TokenKind::Ident)
            && self.peek_kind_at(1) == Some(TokenKind::LParen)
        {
            let (lpos, tok, _) = self.advance()?;
            let name = match tok {
                Token::Ident(s) => s.to_lowercase(),
                _ => return Err(self.unexpected()),
            };

            self.advance()?; // consume '('
            let args = self.parse_comma_separated_exprs()?;
            let (_, _, rpos) = self.expect(TokenKind::RParen)?;

            return Ok(Expr::App(name, args, Loc::new(lpos, rpos)));
        }

        self.parse_subscript()
    }

    /// Parse subscript: id[1, 2]
    fn parse_subscript(&mut self) -> Result<Expr, EquationError> {
        if self.peek_kind() == Some(TokenKind::Ident)
            && self.peek_kind_at(1) == Some(TokenKind::LBracket)
        {
            let (lpos, tok, _) = self.advance()?;
            let name = match tok {
                Token::Ident(s) => ident_name(s),
                _ => return Err(self.unexpected()),
            };

            self.advance()?; // consume '['
            let indices = self.parse_indices()?;
            let (_, _, rpos) = self.expect(TokenKind::RBracket)?;

            return Ok(Expr::Subscript(name, indices, Loc::new(lpos, rpos)));
        }

        self.parse_atom()
    }

    /// Parse an atomic expression (number, identifier, parenthesized expression)
    fn parse_atom(&mut self) -> Result<Expr, EquationError> {
        match self.peek_kind() {
            Some(TokenKind::Num) => {
                let (lpos, tok, rpos) = self.advance()?;
                let s = match tok {
                    Token::Num(s) => s,
                    _ => return Err(self.unexpected()),
                };
                match s.parse::<f64>() {
                    Ok(n) => Ok(Expr::Const(s.to_string(), n, Loc::new(lpos, rpos))),
                    Err(_) => Err(EquationError {
                        start: lpos as u16,
                        end: rpos as u16,
                        code: ErrorCode::ExpectedNumber,
                    }),
                }
            }
            Some(TokenKind::Nan) => {
                let (lpos, _, rpos) = self.advance()?;
                Ok(Expr::Const(
                    "NaN".to_string(),
                    f64::NAN,
                    Loc::new(lpos, rpos),
                ))
            }
            Some(TokenKind::Ident) => {
                let (lpos, tok, rpos) = self.advance()?;
                match tok {
                    Token::Ident(s) => Ok(Expr::Var(ident_name(s), Loc::new(lpos, rpos))),
                    _ => Err(self.unexpected()),
                }
            }
            Some(TokenKind::LParen) => {
                self.advance()?; // consume '('
                let expr = self.parse_additive()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            Some(_) => Err(self.unexpected()),
            None => Err(self.eof_error()),
        }
    }

    /// Parse comma-separated expressions (for function arguments)
    fn parse_comma_separated_exprs(&mut self) -> Result<Vec<Expr>, EquationError> {
        let mut exprs = Vec::new();

        // Handle empty list
        if self.peek_kind() == Some(TokenKind::RParen) {
            return Ok(exprs);
        }

        exprs.push(self.parse_additive()?);

        while self.peek_kind() == Some(TokenKind::Comma) {
            self.advance()?; // consume ','
            exprs.push(self.parse_additive()?);
        }

        Ok(exprs)
    }

    /// Parse comma-separated integer indices (for subscripts)
    fn parse_indices(&mut self) -> Result<Vec<usize>, EquationError> {
        let mut indices = vec![self.parse_index()?];

        while self.peek_kind() == Some(TokenKind::Comma) {
            self.advance()?; // consume ','
            indices.push(self.parse_index()?);
        }

        Ok(indices)
    }

    fn parse_index(&mut self) -> Result<usize, EquationError> {
        if self.peek_kind() != Some(TokenKind::Num) {
            let mut err = self.unexpected();
            err.code = ErrorCode::ExpectedInteger;
            return Err(err);
        }
        let (lpos, tok, rpos) = self.advance()?;
        match tok {
            Token::Num(s) => s.parse::<usize>().map_err(|_| EquationError {
                start: lpos as u16,
                end: rpos as u16,
                code: ErrorCode::ExpectedInteger,
            }),
            _ => Err(self.unexpected()),
        }
    }
}

/// Parse an equation string into an AST.
///
/// Returns:
/// - `Ok(Some(expr))` for valid equations
/// - `Ok(None)` for empty input
/// - `Err(error)` for parse errors
pub fn parse(input: &str, lexer_type: LexerType) -> Result<Option<Expr>, Vec<EquationError>> {
    let lexer = Lexer::new(input, lexer_type);
    let mut parser = match Parser::new(lexer) {
        Ok(p) => p,
        Err(e) => return Err(vec![e]),
    };

    parser.parse_equation().map_err(|e| vec![e])
}

/// parse_expr parses a non-empty equation, reporting the first problem
/// found as a crate Error.
pub fn parse_expr(input: &str) -> ConnResult<Expr> {
    parse_with(input, LexerType::Equation)
}

pub(crate) fn parse_with(input: &str, lexer_type: LexerType) -> ConnResult<Expr> {
    match parse(input, lexer_type) {
        Ok(Some(expr)) => Ok(expr),
        Ok(None) => Err(Error::from_equation(
            input,
            EquationError {
                start: 0,
                end: 0,
                code: ErrorCode::EmptyEquation,
            },
        )),
        Err(mut errors) => {
            let err = errors.remove(0);
            Err(Error::from_equation(input, err))
        }
    }
}
