// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::common::Ident;
use crate::token::is_plain_identifier;

/// Loc describes a location in an equation by the starting point and ending point.
/// Equations are strings typed by humans for a single connection -- u16 is long enough.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Hash)]
pub struct Loc {
    pub start: u16,
    pub end: u16,
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl Loc {
    pub fn new(start: usize, end: usize) -> Self {
        Loc {
            start: start as u16,
            end: end as u16,
        }
    }

    /// union takes a second Loc and returns the inclusive range from the
    /// start of the earlier token to the end of the later token.
    pub fn union(&self, rhs: &Self) -> Self {
        Loc {
            start: self.start.min(rhs.start),
            end: self.end.max(rhs.end),
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum UnaryOp {
    Positive,
    Negative,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Exp,
    Mul,
    Div,
}

impl BinaryOp {
    // higher the precedence, the tighter the binding.
    // e.g. Mul.precedence() > Add.precedence()
    pub(crate) fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div => 2,
            BinaryOp::Exp => 3,
        }
    }

    fn is_associative(&self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Mul)
    }
}

/// Expr is an immutable equation tree.  Rewrites (renaming references,
/// injecting unit conversions) always build a new tree so that the
/// pre- and post-rewrite forms can be held side by side.
#[derive(PartialEq, Clone, Debug)]
pub enum Expr {
    Const(String, f64, Loc),
    Var(Ident, Loc),
    Subscript(Ident, Vec<usize>, Loc),
    App(String, Vec<Expr>, Loc),
    Op1(UnaryOp, Box<Expr>, Loc),
    Op2(BinaryOp, Box<Expr>, Box<Expr>, Loc),
}

impl Expr {
    /// number builds a literal whose source text is the shortest
    /// representation that round-trips to `n`.
    pub fn number(n: f64, loc: Loc) -> Expr {
        Expr::Const(format_number(n), n, loc)
    }

    pub fn get_loc(&self) -> Loc {
        match self {
            Expr::Const(_, _, loc) => *loc,
            Expr::Var(_, loc) => *loc,
            Expr::Subscript(_, _, loc) => *loc,
            Expr::App(_, _, loc) => *loc,
            Expr::Op1(_, _, loc) => *loc,
            Expr::Op2(_, _, _, loc) => *loc,
        }
    }

    #[cfg(test)]
    pub(crate) fn strip_loc(self) -> Self {
        let loc = Loc::default();
        match self {
            Expr::Const(s, n, _loc) => Expr::Const(s, n, loc),
            Expr::Var(v, _loc) => Expr::Var(v, loc),
            Expr::Subscript(id, indices, _loc) => Expr::Subscript(id, indices, loc),
            Expr::App(func, args, _loc) => Expr::App(
                func,
                args.into_iter().map(|arg| arg.strip_loc()).collect(),
                loc,
            ),
            Expr::Op1(op, r, _loc) => Expr::Op1(op, Box::new(r.strip_loc()), loc),
            Expr::Op2(op, l, r, _loc) => {
                Expr::Op2(op, Box::new(l.strip_loc()), Box::new(r.strip_loc()), loc)
            }
        }
    }

    /// reference returns the textual reference (`x`, `comp.y[2]`) if
    /// this node names a variable, and None for every other node.
    pub fn reference(&self) -> Option<String> {
        match self {
            Expr::Var(id, _) => Some(id.clone()),
            Expr::Subscript(id, indices, _) => Some(subscript_text(id, indices)),
            _ => None,
        }
    }

    /// refs lists each distinct reference in the order it first
    /// appears in the equation.
    pub fn refs(&self) -> Vec<String> {
        let mut visitor = RefVisitor::default();
        visitor.walk(self);
        visitor.refs
    }

    /// rename replaces every reference found in `renames` with a copy of
    /// the replacement tree, keeping the location of the replaced node.
    pub fn rename(&self, renames: &HashMap<String, Expr>) -> Expr {
        if let Some(reference) = self.reference() {
            return match renames.get(&reference) {
                Some(replacement) => replacement.clone().with_loc(self.get_loc()),
                None => self.clone(),
            };
        }
        match self {
            Expr::Const(_, _, _) | Expr::Var(_, _) | Expr::Subscript(_, _, _) => self.clone(),
            Expr::App(func, args, loc) => Expr::App(
                func.clone(),
                args.iter().map(|arg| arg.rename(renames)).collect(),
                *loc,
            ),
            Expr::Op1(op, r, loc) => Expr::Op1(*op, Box::new(r.rename(renames)), *loc),
            Expr::Op2(op, l, r, loc) => Expr::Op2(
                *op,
                Box::new(l.rename(renames)),
                Box::new(r.rename(renames)),
                *loc,
            ),
        }
    }

    /// with_loc re-tags the root of this tree, leaving children alone.
    pub(crate) fn with_loc(self, loc: Loc) -> Self {
        match self {
            Expr::Const(s, n, _) => Expr::Const(s, n, loc),
            Expr::Var(v, _) => Expr::Var(v, loc),
            Expr::Subscript(id, indices, _) => Expr::Subscript(id, indices, loc),
            Expr::App(func, args, _) => Expr::App(func, args, loc),
            Expr::Op1(op, r, _) => Expr::Op1(op, r, loc),
            Expr::Op2(op, l, r, _) => Expr::Op2(op, l, r, loc),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", print_eqn(self))
    }
}

/// format_number renders a float in the shortest decimal form that
/// parses back to the same value.  Integers lose their fractional part
/// and exponent notation is never used.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else {
        format!("{n}")
    }
}

fn quote_ident(id: &str) -> String {
    if is_plain_identifier(id) {
        id.to_owned()
    } else {
        format!("\"{id}\"")
    }
}

fn subscript_text(id: &str, indices: &[usize]) -> String {
    let indices: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
    format!("{}[{}]", quote_ident(id), indices.join(", "))
}

/// Visitors walk Expr ASTs.
pub trait Visitor<T> {
    fn walk(&mut self, e: &Expr) -> T;
}

#[derive(Default)]
struct RefVisitor {
    seen: HashSet<String>,
    refs: Vec<String>,
}

impl Visitor<()> for RefVisitor {
    fn walk(&mut self, expr: &Expr) {
        if let Some(reference) = expr.reference() {
            if self.seen.insert(reference.clone()) {
                self.refs.push(reference);
            }
            return;
        }
        match expr {
            Expr::Const(_, _, _) | Expr::Var(_, _) | Expr::Subscript(_, _, _) => {}
            Expr::App(_, args, _) => {
                for arg in args.iter() {
                    self.walk(arg);
                }
            }
            Expr::Op1(_, r, _) => self.walk(r),
            Expr::Op2(_, l, r, _) => {
                self.walk(l);
                self.walk(r);
            }
        }
    }
}

fn is_signed(expr: &Expr) -> bool {
    match expr {
        Expr::Op1(_, _, _) => true,
        Expr::Const(s, _, _) => s.starts_with('-'),
        _ => false,
    }
}

fn child_needs_parens(parent: &Expr, child: &Expr, is_right: bool) -> bool {
    match parent {
        // no children so doesn't matter
        Expr::Const(_, _, _) | Expr::Var(_, _) | Expr::Subscript(_, _, _) => false,
        // children are comma separated, so no ambiguity possible
        Expr::App(_, _, _) => false,
        Expr::Op1(_, _, _) => matches!(child, Expr::Op2(_, _, _, _)) || is_signed(child),
        Expr::Op2(parent_op, _, _, _) => match child {
            Expr::Var(_, _) | Expr::Subscript(_, _, _) | Expr::App(_, _, _) => false,
            // `-a ^ 2` parses as `-(a ^ 2)`, and `^` binds its operands
            // tighter than a unary sign can be parsed
            Expr::Op1(_, _, _) | Expr::Const(_, _, _) => {
                *parent_op == BinaryOp::Exp && is_signed(child)
            }
            Expr::Op2(child_op, _, _, _) => {
                // if we have `3 * (2 + 3)`, the parent's precedence
                // is higher than the child and we need enclosing parens
                if parent_op.precedence() > child_op.precedence() {
                    true
                } else if is_right && parent_op.precedence() == child_op.precedence() {
                    // `a - (b - c)` and `a / (b * c)` are not `a - b - c`
                    !(parent_op == child_op && parent_op.is_associative())
                } else {
                    false
                }
            }
        },
    }
}

fn paren_if_necessary(parent: &Expr, child: &Expr, is_right: bool, eqn: String) -> String {
    if child_needs_parens(parent, child, is_right) {
        format!("({eqn})")
    } else {
        eqn
    }
}

struct PrintVisitor {}

impl Visitor<String> for PrintVisitor {
    fn walk(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Const(s, _, _) => s.clone(),
            Expr::Var(id, _) => quote_ident(id),
            Expr::Subscript(id, indices, _) => subscript_text(id, indices),
            Expr::App(func, args, _) => {
                let args: Vec<String> = args.iter().map(|e| self.walk(e)).collect();
                format!("{}({})", func, args.join(", "))
            }
            Expr::Op1(op, l, _) => {
                let l = paren_if_necessary(expr, l, false, self.walk(l));
                match op {
                    UnaryOp::Positive => format!("+{l}"),
                    UnaryOp::Negative => format!("-{l}"),
                }
            }
            Expr::Op2(op, l, r, _) => {
                let l = paren_if_necessary(expr, l, false, self.walk(l));
                let r = paren_if_necessary(expr, r, true, self.walk(r));
                let op: &str = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Exp => "^",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div => "/",
                };
                format!("{l} {op} {r}")
            }
        }
    }
}

pub fn print_eqn(expr: &Expr) -> String {
    let mut visitor = PrintVisitor {};
    visitor.walk(expr)
}
