// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Unit conversion baked into a connection's source expression.

use std::collections::HashMap;

use float_cmp::approx_eq;

use crate::ast::{BinaryOp, Expr};
use crate::common::{Error, ErrorCode, ErrorKind, Ident, Result};
use crate::eval::{eval_expr, VarMeta};
use crate::units::{Unit, UnitLibrary};
use crate::value::{Quantity, Value};

/// UnitTransform is the outcome of the unit pass over a source tree.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitTransform {
    pub tree: Expr,
    /// the unit inferred for the untransformed source, if any
    pub src_units: Option<Unit>,
    pub scale: f64,
    pub offset: f64,
}

impl UnitTransform {
    fn identity(tree: &Expr, src_units: Option<Unit>) -> Self {
        UnitTransform {
            tree: tree.clone(),
            src_units,
            scale: 1.0,
            offset: 0.0,
        }
    }
}

/// scaler_adder_xform builds `(tree + adder) * scaler`, leaving out the
/// add when `adder` is 0 and the multiply when `scaler` is 1.  New nodes
/// take the location of the root of `tree`.
pub fn scaler_adder_xform(tree: &Expr, scaler: f64, adder: f64, ulps: i64) -> Expr {
    let loc = tree.get_loc();
    let mut xformed = tree.clone();
    if !approx_eq!(f64, adder, 0.0, ulps = ulps) {
        xformed = Expr::Op2(
            BinaryOp::Add,
            Box::new(xformed),
            Box::new(Expr::number(adder, loc)),
            loc,
        );
    }
    if !approx_eq!(f64, scaler, 1.0, ulps = ulps) {
        xformed = Expr::Op2(
            BinaryOp::Mul,
            Box::new(xformed),
            Box::new(Expr::number(scaler, loc)),
            loc,
        );
    }
    xformed
}

/// unit_xform rewrites `tree`, whose value is in `in_units`, to produce
/// a value in `out_units`.
pub fn unit_xform(
    tree: &Expr,
    in_units: &Unit,
    out_units: &Unit,
    ulps: i64,
) -> Result<(Expr, f64, f64)> {
    let (scaler, adder) = match in_units.conversion_tuple_to(out_units) {
        Ok(conversion) => conversion,
        Err(err) if err.code == ErrorCode::IncompatibleUnits => {
            return Err(Error::new(
                ErrorKind::Units,
                ErrorCode::IncompatibleUnits,
                Some(format!(
                    "units '{in_units}' are incompatible with assigning units of '{out_units}'"
                )),
            ));
        }
        Err(err) => return Err(err),
    };
    Ok((scaler_adder_xform(tree, scaler, adder, ulps), scaler, adder))
}

/// infer_units evaluates `tree` with every slot bound to a zero, tagged
/// with the slot's declared unit when it has one, and reports the unit
/// of the result.  Plain numbers in the tree don't affect the result's
/// unit.
pub fn infer_units(
    tree: &Expr,
    slot_meta: &HashMap<Ident, VarMeta>,
    units: &dyn UnitLibrary,
) -> Result<Option<Unit>> {
    let mut trial: HashMap<&str, Value> = HashMap::with_capacity(slot_meta.len());
    for (slot, meta) in slot_meta.iter() {
        let value = match meta.units.as_deref() {
            Some(u) if !u.is_empty() => Value::Quantity(Quantity::new(0.0, units.lookup(u)?)),
            _ => Value::Number(0.0),
        };
        trial.insert(slot.as_str(), value);
    }

    let lookup = |name: &str| -> Result<Value> {
        Ok(trial.get(name).cloned().unwrap_or(Value::Number(0.0)))
    };
    let result = eval_expr(tree, &lookup)?;

    Ok(result.unit().cloned())
}

/// apply_unit_pass runs the whole unit pass: nothing happens unless the
/// destination declares a unit and the source's unit can be inferred.
pub fn apply_unit_pass(
    tree: &Expr,
    slot_meta: &HashMap<Ident, VarMeta>,
    out_units: Option<&str>,
    units: &dyn UnitLibrary,
    ulps: i64,
) -> Result<UnitTransform> {
    let out_units = match out_units {
        Some(out_units) if !out_units.is_empty() => units.lookup(out_units)?,
        _ => return Ok(UnitTransform::identity(tree, None)),
    };

    let src_units = match infer_units(tree, slot_meta, units)? {
        Some(src_units) => src_units,
        None => return Ok(UnitTransform::identity(tree, None)),
    };

    let (xformed, scale, offset) = unit_xform(tree, &src_units, &out_units, ulps)?;
    Ok(UnitTransform {
        tree: xformed,
        src_units: Some(src_units),
        scale,
        offset,
    })
}
