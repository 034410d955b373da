// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;

use float_cmp::approx_eq;

use crate::ast::{BinaryOp, UnaryOp};
use crate::common::Result;
use crate::units::Unit;
use crate::{eval_err, units_err};

/// Quantity is a magnitude tagged with the unit it is expressed in.
#[derive(Clone, Debug, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(value: f64, unit: Unit) -> Self {
        Quantity { value, unit }
    }

    /// in_units_of re-expresses this quantity's magnitude in `unit`.
    pub fn in_units_of(&self, unit: &Unit) -> Result<f64> {
        self.unit.convert(self.value, unit)
    }

    fn to_base(&self) -> f64 {
        (self.value + self.unit.offset) * self.unit.factor
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// Value is what evaluating an expression produces: either a plain
/// number, or a quantity carrying a unit.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    Quantity(Quantity),
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<Quantity> for Value {
    fn from(q: Quantity) -> Self {
        Value::Quantity(q)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Quantity(q) => write!(f, "{q}"),
        }
    }
}

impl Value {
    /// magnitude drops any unit, returning the number as expressed.
    pub fn magnitude(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Quantity(q) => q.value,
        }
    }

    pub fn unit(&self) -> Option<&Unit> {
        match self {
            Value::Number(_) => None,
            Value::Quantity(q) => Some(&q.unit),
        }
    }

    pub fn is_quantity(&self) -> bool {
        matches!(self, Value::Quantity(_))
    }

    /// plain returns the value as a bare number, which only makes
    /// sense for numbers and dimensionless quantities.
    pub fn plain(&self) -> Result<f64> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Quantity(q) if q.unit.is_dimensionless() => Ok(q.to_base()),
            Value::Quantity(q) => units_err!(
                IncompatibleUnits,
                format!("expected a dimensionless value, not '{}'", q.unit)
            ),
        }
    }

    /// angle returns the value in radians.  Plain numbers are assumed
    /// to already be radians.
    fn angle(&self) -> Result<f64> {
        match self {
            Value::Quantity(q)
                if q.unit.dims.map.len() == 1 && q.unit.dims.map.get("rad") == Some(&1) =>
            {
                Ok(q.to_base())
            }
            _ => self.plain(),
        }
    }
}

pub fn unary(op: UnaryOp, v: Value) -> Value {
    match (op, v) {
        (UnaryOp::Positive, v) => v,
        (UnaryOp::Negative, Value::Number(n)) => Value::Number(-n),
        (UnaryOp::Negative, Value::Quantity(q)) => Value::Quantity(Quantity::new(-q.value, q.unit)),
    }
}

pub fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value> {
    match op {
        BinaryOp::Add | BinaryOp::Sub => additive(op, l, r),
        BinaryOp::Mul | BinaryOp::Div => multiplicative(op, l, r),
        BinaryOp::Exp => power(l, r),
    }
}

fn additive(op: BinaryOp, l: Value, r: Value) -> Result<Value> {
    let apply = |a: f64, b: f64| {
        if op == BinaryOp::Add { a + b } else { a - b }
    };
    let result = match (l, r) {
        (Value::Number(a), Value::Number(b)) => Value::Number(apply(a, b)),
        (Value::Number(a), Value::Quantity(q)) => {
            Value::Quantity(Quantity::new(apply(a, q.value), q.unit))
        }
        (Value::Quantity(q), Value::Number(b)) => {
            Value::Quantity(Quantity::new(apply(q.value, b), q.unit))
        }
        (Value::Quantity(a), Value::Quantity(b)) => {
            if !a.unit.is_compatible(&b.unit) {
                return units_err!(
                    IncompatibleUnits,
                    format!("can't add or subtract '{}' and '{}'", a.unit, b.unit)
                );
            }
            let b = b.in_units_of(&a.unit)?;
            Value::Quantity(Quantity::new(apply(a.value, b), a.unit))
        }
    };
    Ok(result)
}

fn multiplicative(op: BinaryOp, l: Value, r: Value) -> Result<Value> {
    let is_mul = op == BinaryOp::Mul;
    let apply = |a: f64, b: f64| if is_mul { a * b } else { a / b };
    let result = match (l, r) {
        (Value::Number(a), Value::Number(b)) => Value::Number(apply(a, b)),
        (Value::Quantity(q), Value::Number(b)) => {
            Value::Quantity(Quantity::new(apply(q.value, b), q.unit))
        }
        (Value::Number(a), Value::Quantity(q)) => {
            let unit = if is_mul {
                q.unit.clone()
            } else {
                Unit::dimensionless().div(&q.unit)?
            };
            Value::Quantity(Quantity::new(apply(a, q.value), unit))
        }
        (Value::Quantity(a), Value::Quantity(b)) => {
            let unit = if is_mul {
                a.unit.mul(&b.unit)?
            } else {
                a.unit.div(&b.unit)?
            };
            Value::Quantity(Quantity::new(apply(a.value, b.value), unit))
        }
    };
    Ok(result)
}

fn power(l: Value, r: Value) -> Result<Value> {
    let exp = r.plain()?;
    match l {
        Value::Number(base) => Ok(Value::Number(base.powf(exp))),
        Value::Quantity(q) if q.unit.is_dimensionless() => {
            Ok(Value::Number(q.to_base().powf(exp)))
        }
        Value::Quantity(q) => {
            if !approx_eq!(f64, exp, exp.round()) {
                return units_err!(
                    IncompatibleUnits,
                    format!("can't raise '{}' to the non-integer power {exp}", q.unit)
                );
            }
            if exp.abs() > i32::MAX as f64 {
                return units_err!(
                    ExponentOverflow,
                    format!("can't raise '{}' to the power {exp}", q.unit)
                );
            }
            let n = exp.round() as i32;
            let unit = q.unit.powi(n)?;
            Ok(Value::Quantity(Quantity::new(q.value.powi(n), unit)))
        }
    }
}

/// BUILTINS lists the single-argument functions equations may call.
pub const BUILTINS: &[&str] = &[
    "abs", "sqrt", "exp", "ln", "log", "log10", "sin", "cos", "tan",
];

pub fn apply_builtin(func: &str, args: Vec<Value>) -> Result<Value> {
    if !BUILTINS.contains(&func) {
        return eval_err!(UnknownBuiltin, format!("unknown function '{func}'"));
    }
    if args.len() != 1 {
        return eval_err!(
            BadBuiltinArgs,
            format!("'{func}' takes 1 argument, not {}", args.len())
        );
    }
    let arg = args.into_iter().next().unwrap_or(Value::Number(f64::NAN));

    let result = match (func, arg) {
        ("abs", Value::Number(n)) => Value::Number(n.abs()),
        ("abs", Value::Quantity(q)) => Value::Quantity(Quantity::new(q.value.abs(), q.unit)),
        ("sqrt", Value::Number(n)) => Value::Number(n.sqrt()),
        ("sqrt", Value::Quantity(q)) if !q.unit.is_dimensionless() => {
            let unit = q.unit.sqrt()?;
            Value::Quantity(Quantity::new(q.value.sqrt(), unit))
        }
        ("sin", arg) => Value::Number(arg.angle()?.sin()),
        ("cos", arg) => Value::Number(arg.angle()?.cos()),
        ("tan", arg) => Value::Number(arg.angle()?.tan()),
        (func, arg) => {
            let n = arg.plain()?;
            Value::Number(match func {
                "sqrt" => n.sqrt(),
                "exp" => n.exp(),
                "ln" | "log" => n.ln(),
                "log10" => n.log10(),
                _ => return eval_err!(UnknownBuiltin, format!("unknown function '{func}'")),
            })
        }
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use crate::units::{Context, UnitLibrary};

    fn q(value: f64, unit: &str) -> Value {
        let ctx = Context::new_with_builtins(&[]).unwrap();
        Value::Quantity(Quantity::new(value, ctx.lookup(unit).unwrap()))
    }

    #[test]
    fn test_add_converts_to_left_unit() {
        let sum = binary(BinaryOp::Add, q(1.0, "m"), q(100.0, "cm")).unwrap();
        assert!(approx_eq!(f64, 2.0, sum.magnitude(), ulps = 4));
        assert_eq!("m", sum.unit().unwrap().name);

        let diff = binary(BinaryOp::Sub, q(1.0, "ft"), q(12.0, "inch")).unwrap();
        assert!(approx_eq!(f64, 0.0, diff.magnitude(), epsilon = 1e-12));
    }

    #[test]
    fn test_add_incompatible() {
        let err = binary(BinaryOp::Add, q(1.0, "m"), q(1.0, "s")).unwrap_err();
        assert_eq!(ErrorCode::IncompatibleUnits, err.code);
    }

    #[test]
    fn test_numbers_adopt_units() {
        let sum = binary(BinaryOp::Add, Value::Number(2.0), q(1.0, "m")).unwrap();
        assert_eq!(3.0, sum.magnitude());
        assert_eq!("m", sum.unit().unwrap().name);

        let scaled = binary(BinaryOp::Mul, q(3.0, "s"), Value::Number(2.0)).unwrap();
        assert_eq!(6.0, scaled.magnitude());
        assert_eq!("s", scaled.unit().unwrap().name);

        let inverse = binary(BinaryOp::Div, Value::Number(1.0), q(4.0, "s")).unwrap();
        assert_eq!(0.25, inverse.magnitude());
        assert_eq!("1/s", format!("{}", inverse.unit().unwrap().dims));
    }

    #[test]
    fn test_products_combine_dims() {
        let area = binary(BinaryOp::Mul, q(2.0, "m"), q(3.0, "m")).unwrap();
        assert_eq!(6.0, area.magnitude());
        assert_eq!("m^2", format!("{}", area.unit().unwrap().dims));

        let speed = binary(BinaryOp::Div, q(10.0, "m"), q(2.0, "s")).unwrap();
        assert_eq!("m/s", format!("{}", speed.unit().unwrap().dims));

        let volume = binary(BinaryOp::Exp, q(2.0, "m"), Value::Number(3.0)).unwrap();
        assert_eq!(8.0, volume.magnitude());
        assert_eq!("m^3", format!("{}", volume.unit().unwrap().dims));

        let err = binary(BinaryOp::Exp, q(2.0, "m"), Value::Number(0.5)).unwrap_err();
        assert_eq!(ErrorCode::IncompatibleUnits, err.code);
        let err = binary(BinaryOp::Exp, q(2.0, "m"), Value::Number(1e10)).unwrap_err();
        assert_eq!(ErrorCode::ExponentOverflow, err.code);
        let err = binary(BinaryOp::Exp, area, Value::Number(i32::MAX as f64)).unwrap_err();
        assert_eq!(ErrorCode::ExponentOverflow, err.code);
    }

    #[test]
    fn test_zero_division_keeps_unit() {
        let v = binary(BinaryOp::Div, q(0.0, "m"), q(0.0, "s")).unwrap();
        assert!(v.magnitude().is_nan());
        assert_eq!("m/s", format!("{}", v.unit().unwrap().dims));
    }

    #[test]
    fn test_builtins() {
        assert_eq!(Value::Number(2.0), apply_builtin("sqrt", vec![Value::Number(4.0)]).unwrap());
        let side = apply_builtin("sqrt", vec![q(9.0, "m^2")]).unwrap();
        assert_eq!(3.0, side.magnitude());
        assert_eq!("m", format!("{}", side.unit().unwrap().dims));

        let abs = apply_builtin("abs", vec![q(-2.0, "s")]).unwrap();
        assert_eq!(2.0, abs.magnitude());
        assert!(abs.is_quantity());

        let sin = apply_builtin("sin", vec![q(90.0, "deg")]).unwrap();
        assert!(approx_eq!(f64, 1.0, sin.magnitude(), epsilon = 1e-12));

        let err = apply_builtin("exp", vec![q(1.0, "m")]).unwrap_err();
        assert_eq!(ErrorCode::IncompatibleUnits, err.code);
        let err = apply_builtin("max", vec![Value::Number(1.0)]).unwrap_err();
        assert_eq!(ErrorCode::UnknownBuiltin, err.code);
        let err = apply_builtin("abs", vec![]).unwrap_err();
        assert_eq!(ErrorCode::BadBuiltinArgs, err.code);
    }

    #[test]
    fn test_quantity_conversion() {
        let Value::Quantity(boiling) = q(100.0, "degC") else {
            unreachable!()
        };
        let ctx = Context::new_with_builtins(&[]).unwrap();
        let f = boiling.in_units_of(&ctx.lookup("degF").unwrap()).unwrap();
        assert!(approx_eq!(f64, 212.0, f, epsilon = 1e-9));
    }
}
