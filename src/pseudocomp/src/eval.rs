// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Expression evaluation against a scope, including forward-mode
//! derivatives of an expression with respect to its references.

use num_dual::{Dual64, DualNum};
use serde::{Deserialize, Serialize};

use crate::ast::{print_eqn, BinaryOp, Expr, UnaryOp};
use crate::common::{varname, Ident, Result};
use crate::parser::parse_expr;
use crate::value::{apply_builtin, binary, unary, Value, BUILTINS};
use crate::eval_err;

/// VarMeta is the metadata a variable carries that matters to a
/// connection: currently only its declared unit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl VarMeta {
    pub fn with_units(units: &str) -> Self {
        VarMeta {
            units: Some(units.to_owned()),
        }
    }
}

/// Scope is anything that owns named values an expression can read
/// and, for destination expressions, write.
pub trait Scope {
    fn get_value(&self, name: &str) -> Result<Value>;
    fn set_value(&mut self, name: &str, value: Value) -> Result<()>;
    fn pathname(&self) -> String;
}

/// MetadataScope resolves a variable name (without any index) to its
/// metadata.
pub trait MetadataScope {
    fn get_metadata(&self, varname: &str) -> Result<VarMeta>;
}

/// Jacobian is a dense, row-major matrix of partial derivatives of
/// outputs (rows) with respect to inputs (columns).
#[derive(Clone, Debug, PartialEq)]
pub struct Jacobian {
    pub n_outputs: usize,
    pub n_inputs: usize,
    pub entries: Vec<f64>,
}

impl Jacobian {
    pub fn zeros(n_outputs: usize, n_inputs: usize) -> Self {
        Jacobian {
            n_outputs,
            n_inputs,
            entries: vec![0.0; n_outputs * n_inputs],
        }
    }

    pub fn from_row(row: Vec<f64>) -> Self {
        Jacobian {
            n_outputs: 1,
            n_inputs: row.len(),
            entries: row,
        }
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.entries[i * self.n_inputs + j]
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.entries[i * self.n_inputs + j] = value;
    }
}

/// ExprEvaluator holds a parsed expression together with the text it
/// came from.
#[derive(Clone, Debug, PartialEq)]
pub struct ExprEvaluator {
    text: String,
    ast: Expr,
}

impl ExprEvaluator {
    pub fn new(text: &str) -> Result<Self> {
        let ast = parse_expr(text)?;
        Ok(ExprEvaluator {
            text: text.to_owned(),
            ast,
        })
    }

    pub fn from_ast(ast: Expr) -> Self {
        ExprEvaluator {
            text: print_eqn(&ast),
            ast,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// refs lists the distinct references in order of first appearance.
    pub fn refs(&self) -> Vec<Ident> {
        self.ast.refs()
    }

    /// get_metadata returns `(varname, metadata)` for each distinct
    /// variable referenced, in order of first appearance.
    pub fn get_metadata<S: MetadataScope + ?Sized>(
        &self,
        scope: &S,
    ) -> Result<Vec<(Ident, VarMeta)>> {
        let mut metadata: Vec<(Ident, VarMeta)> = Vec::new();
        for reference in self.refs() {
            let name = varname(&reference);
            if metadata.iter().any(|(n, _)| n == name) {
                continue;
            }
            metadata.push((name.to_owned(), scope.get_metadata(name)?));
        }
        Ok(metadata)
    }

    pub fn evaluate<S: Scope + ?Sized>(&self, scope: &S) -> Result<Value> {
        eval_expr(&self.ast, &|name: &str| scope.get_value(name))
    }

    /// evaluate_gradient returns d(expr)/d(name) for each name in `wrt`,
    /// evaluated at the scope's current values with units stripped.
    pub fn evaluate_gradient<S: Scope + ?Sized>(
        &self,
        scope: &S,
        wrt: &[Ident],
    ) -> Result<Vec<f64>> {
        let mut grad = Vec::with_capacity(wrt.len());
        for var in wrt.iter() {
            let lookup = |name: &str| -> Result<Dual64> {
                let value = Dual64::from(scope.get_value(name)?.magnitude());
                if name == var.as_str() {
                    Ok(value.derivative())
                } else {
                    Ok(value)
                }
            };
            grad.push(eval_dual(&self.ast, &lookup)?.eps);
        }
        Ok(grad)
    }

    /// set writes `value` to the variable this expression names.  Only
    /// a bare reference can be assigned to.
    pub fn set<S: Scope + ?Sized>(&self, value: Value, scope: &mut S) -> Result<()> {
        match self.ast.reference() {
            Some(reference) => scope.set_value(&reference, value),
            None => eval_err!(
                NotAssignable,
                format!("can't assign to '{}'", self.text)
            ),
        }
    }
}

pub(crate) fn eval_expr(expr: &Expr, lookup: &dyn Fn(&str) -> Result<Value>) -> Result<Value> {
    if let Some(reference) = expr.reference() {
        return lookup(&reference);
    }
    match expr {
        Expr::Const(_, n, _) => Ok(Value::Number(*n)),
        Expr::Var(id, _) => lookup(id),
        Expr::Subscript(id, _, _) => lookup(id),
        Expr::App(func, args, _) => {
            let args = args
                .iter()
                .map(|arg| eval_expr(arg, lookup))
                .collect::<Result<Vec<_>>>()?;
            apply_builtin(func, args)
        }
        Expr::Op1(op, r, _) => Ok(unary(*op, eval_expr(r, lookup)?)),
        Expr::Op2(op, l, r, _) => binary(*op, eval_expr(l, lookup)?, eval_expr(r, lookup)?),
    }
}

fn eval_dual(expr: &Expr, lookup: &dyn Fn(&str) -> Result<Dual64>) -> Result<Dual64> {
    if let Some(reference) = expr.reference() {
        return lookup(&reference);
    }
    let result = match expr {
        Expr::Const(_, n, _) => Dual64::from(*n),
        Expr::Var(id, _) | Expr::Subscript(id, _, _) => lookup(id)?,
        Expr::App(func, args, _) => {
            if !BUILTINS.contains(&func.as_str()) {
                return eval_err!(UnknownBuiltin, format!("unknown function '{func}'"));
            }
            if args.len() != 1 {
                return eval_err!(
                    BadBuiltinArgs,
                    format!("'{func}' takes 1 argument, not {}", args.len())
                );
            }
            let x = eval_dual(&args[0], lookup)?;
            match func.as_str() {
                "abs" => {
                    if x.re < 0.0 {
                        -x
                    } else {
                        x
                    }
                }
                "sqrt" => x.sqrt(),
                "exp" => x.exp(),
                "ln" | "log" => x.ln(),
                "log10" => x.log10(),
                "sin" => x.sin(),
                "cos" => x.cos(),
                "tan" => x.tan(),
                _ => return eval_err!(UnknownBuiltin, format!("unknown function '{func}'")),
            }
        }
        Expr::Op1(op, r, _) => {
            let r = eval_dual(r, lookup)?;
            match op {
                UnaryOp::Positive => r,
                UnaryOp::Negative => -r,
            }
        }
        Expr::Op2(op, l, r, _) => {
            let l = eval_dual(l, lookup)?;
            let r = eval_dual(r, lookup)?;
            match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
                BinaryOp::Exp => {
                    // constant exponents keep d/dx defined at a zero base
                    if r.eps == 0.0 && r.re.fract() == 0.0 && r.re.abs() <= i32::MAX as f64 {
                        l.powi(r.re as i32)
                    } else if r.eps == 0.0 {
                        l.powf(r.re)
                    } else {
                        l.powd(r)
                    }
                }
            }
        }
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use float_cmp::approx_eq;

    use super::*;
    use crate::common::{Error, ErrorCode, ErrorKind};

    #[derive(Default)]
    struct TestScope {
        values: HashMap<String, f64>,
        meta: HashMap<String, VarMeta>,
    }

    impl TestScope {
        fn with(values: &[(&str, f64)]) -> Self {
            TestScope {
                values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                meta: HashMap::new(),
            }
        }
    }

    impl Scope for TestScope {
        fn get_value(&self, name: &str) -> Result<Value> {
            match self.values.get(name) {
                Some(v) => Ok(Value::Number(*v)),
                None => Err(Error::new(
                    ErrorKind::Variable,
                    ErrorCode::DoesNotExist,
                    Some(name.to_owned()),
                )),
            }
        }

        fn set_value(&mut self, name: &str, value: Value) -> Result<()> {
            self.values.insert(name.to_owned(), value.magnitude());
            Ok(())
        }

        fn pathname(&self) -> String {
            "test".to_owned()
        }
    }

    impl MetadataScope for TestScope {
        fn get_metadata(&self, varname: &str) -> Result<VarMeta> {
            Ok(self.meta.get(varname).cloned().unwrap_or_default())
        }
    }

    #[test]
    fn test_evaluate() {
        let scope = TestScope::with(&[("x1", 1.5), ("x2", 2.5), ("c.y[1]", 4.0)]);
        let expr = ExprEvaluator::new("(x1+x2)*2").unwrap();
        assert_eq!(Value::Number(8.0), expr.evaluate(&scope).unwrap());

        let expr = ExprEvaluator::new("c.y[1] ^ 0.5 + abs(-x1)").unwrap();
        assert_eq!(Value::Number(3.5), expr.evaluate(&scope).unwrap());

        let expr = ExprEvaluator::new("missing + 1").unwrap();
        let err = expr.evaluate(&scope).unwrap_err();
        assert_eq!(ErrorCode::DoesNotExist, err.code);
    }

    #[test]
    fn test_refs_and_metadata() {
        let mut scope = TestScope::default();
        scope.meta.insert("a".to_owned(), VarMeta::with_units("m"));
        let expr = ExprEvaluator::new("b + a[1] * a[2] + b").unwrap();
        assert_eq!(vec!["b", "a[1]", "a[2]"], expr.refs());
        let meta = expr.get_metadata(&scope).unwrap();
        assert_eq!(
            vec![
                ("b".to_owned(), VarMeta::default()),
                ("a".to_owned(), VarMeta::with_units("m")),
            ],
            meta
        );
    }

    #[test]
    fn test_gradient() {
        let scope = TestScope::with(&[("x", 3.0), ("y", 2.0)]);
        let expr = ExprEvaluator::new("x^2 * y + sin(y) - 4/x").unwrap();
        let grad = expr
            .evaluate_gradient(&scope, &["x".to_owned(), "y".to_owned()])
            .unwrap();
        // d/dx = 2xy + 4/x^2, d/dy = x^2 + cos(y)
        assert!(approx_eq!(f64, 12.0 + 4.0 / 9.0, grad[0], epsilon = 1e-12));
        assert!(approx_eq!(f64, 9.0 + 2.0_f64.cos(), grad[1], epsilon = 1e-12));

        // the same reference appearing twice accumulates
        let expr = ExprEvaluator::new("x + x * 3").unwrap();
        let grad = expr.evaluate_gradient(&scope, &["x".to_owned()]).unwrap();
        assert_eq!(vec![4.0], grad);

        // an affine rewrite differentiates to its scale
        let expr = ExprEvaluator::new("(x + 17.5) * 1.8").unwrap();
        let grad = expr.evaluate_gradient(&scope, &["x".to_owned()]).unwrap();
        assert!(approx_eq!(f64, 1.8, grad[0], ulps = 4));
    }

    #[test]
    fn test_gradient_at_zero_base() {
        let scope = TestScope::with(&[("x", 0.0)]);
        let expr = ExprEvaluator::new("x^2 + x").unwrap();
        let grad = expr.evaluate_gradient(&scope, &["x".to_owned()]).unwrap();
        assert_eq!(vec![1.0], grad);
    }

    #[test]
    fn test_set() {
        let mut scope = TestScope::default();
        ExprEvaluator::new("out0")
            .unwrap()
            .set(Value::Number(2.0), &mut scope)
            .unwrap();
        assert_eq!(Some(&2.0), scope.values.get("out0"));

        let err = ExprEvaluator::new("p+q")
            .unwrap()
            .set(Value::Number(2.0), &mut scope)
            .unwrap_err();
        assert_eq!(ErrorCode::NotAssignable, err.code);
    }

    #[test]
    fn test_jacobian() {
        let mut j = Jacobian::zeros(2, 3);
        j.set(1, 2, 5.0);
        assert_eq!(5.0, j.get(1, 2));
        assert_eq!(0.0, j.get(0, 2));

        let row = Jacobian::from_row(vec![1.0, 2.0]);
        assert_eq!((1, 2), (row.n_outputs, row.n_inputs));
        assert_eq!(2.0, row.get(0, 1));
    }

    #[test]
    fn test_from_ast_text() {
        let expr = ExprEvaluator::new("(a+b)*2").unwrap();
        let copy = ExprEvaluator::from_ast(expr.ast().clone());
        assert_eq!("(a + b) * 2", copy.text());
        assert_eq!("(a+b)*2", expr.text());
    }
}
