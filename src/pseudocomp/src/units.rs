// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display, Formatter};

use float_cmp::approx_eq;
use serde::{Deserialize, Serialize};

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::common::{EquationError, EquationResult, Error, ErrorCode, ErrorKind, Result};
use crate::parser::parse;
use crate::token::LexerType;
use crate::{eqn_err, units_err};

/// UnitMap is the dimension signature of a unit: base dimension name
/// to integer exponent.  Zero exponents are never stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnitMap {
    pub map: BTreeMap<String, i32>,
}

impl UnitMap {
    pub fn new() -> UnitMap {
        Default::default()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn reciprocal(self) -> Result<Self> {
        self.exp(-1)
    }

    /// exp raises every dimension to the `exp` power.
    pub fn exp(mut self, exp: i32) -> Result<Self> {
        if exp == 0 {
            return Ok(UnitMap::new());
        }
        for (id, n) in self.map.iter_mut() {
            *n = n.checked_mul(exp).ok_or_else(|| overflow(id))?;
        }
        Ok(self)
    }

    /// mul adds exponents dimension by dimension, dropping any that
    /// cancel out.
    pub fn mul(mut self, rhs: Self) -> Result<Self> {
        for (id, n) in rhs.map.into_iter() {
            let exp = match self.map.get(&id) {
                None => n,
                Some(m) => n.checked_add(*m).ok_or_else(|| overflow(&id))?,
            };

            if exp == 0 {
                self.map.remove(&id);
            } else {
                self.map.insert(id, exp);
            }
        }

        Ok(self)
    }

    pub fn div(self, rhs: Self) -> Result<Self> {
        self.mul(rhs.reciprocal()?)
    }
}

fn overflow(id: &str) -> Error {
    Error::new(
        ErrorKind::Units,
        ErrorCode::ExponentOverflow,
        Some(format!("the exponent of '{id}' is out of range")),
    )
}

impl Display for UnitMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut written = false;
        let mut first = true;
        for (unit, exp) in self.map.iter().filter(|(_, exp)| **exp > 0) {
            if !first {
                write!(f, "*")?;
            }
            first = false;
            write!(f, "{unit}")?;
            if *exp > 1 {
                write!(f, "^{exp}")?;
            }
            written = true;
        }

        for (unit, exp) in self.map.iter().filter(|(_, exp)| **exp < 0) {
            if !written {
                write!(f, "1")?;
                written = true;
            }
            write!(f, "/{unit}")?;
            if exp.abs() > 1 {
                write!(f, "^{}", exp.abs())?;
            }
        }

        if !written {
            write!(f, "dmnl")?;
        }

        Ok(())
    }
}

impl FromIterator<(String, i32)> for UnitMap {
    fn from_iter<I: IntoIterator<Item = (String, i32)>>(iter: I) -> Self {
        UnitMap {
            map: iter.into_iter().filter(|(_, exp)| *exp != 0).collect(),
        }
    }
}

/// Unit is a resolved physical unit.  A value `x` in this unit is
/// `(x + offset) * factor` in the base units named by `dims`.
#[derive(Clone, Debug, PartialEq)]
pub struct Unit {
    pub name: String,
    pub factor: f64,
    pub offset: f64,
    pub dims: UnitMap,
}

fn group(name: &str) -> String {
    if name.contains(['*', '/', '^', ' ']) {
        format!("({name})")
    } else {
        name.to_owned()
    }
}

impl Unit {
    pub fn dimensionless() -> Unit {
        Unit {
            name: "dmnl".to_owned(),
            factor: 1.0,
            offset: 0.0,
            dims: UnitMap::new(),
        }
    }

    fn base(name: &str) -> Unit {
        Unit {
            name: name.to_owned(),
            factor: 1.0,
            offset: 0.0,
            dims: [(name.to_owned(), 1)].into_iter().collect(),
        }
    }

    pub fn is_dimensionless(&self) -> bool {
        self.dims.is_empty()
    }

    pub fn is_compatible(&self, other: &Unit) -> bool {
        self.dims == other.dims
    }

    fn check_offset(&self, op: &str) -> Result<()> {
        if self.offset != 0.0 {
            return units_err!(
                OffsetUnitInProduct,
                format!("can't use '{}' (a unit with an offset) in a {op}", self.name)
            );
        }
        Ok(())
    }

    pub fn mul(&self, rhs: &Unit) -> Result<Unit> {
        self.check_offset("product")?;
        rhs.check_offset("product")?;
        Ok(Unit {
            name: format!("{}*{}", self.name, rhs.name),
            factor: self.factor * rhs.factor,
            offset: 0.0,
            dims: self.dims.clone().mul(rhs.dims.clone())?,
        })
    }

    pub fn div(&self, rhs: &Unit) -> Result<Unit> {
        self.check_offset("quotient")?;
        rhs.check_offset("quotient")?;
        Ok(Unit {
            name: format!("{}/{}", self.name, group(&rhs.name)),
            factor: self.factor / rhs.factor,
            offset: 0.0,
            dims: self.dims.clone().div(rhs.dims.clone())?,
        })
    }

    pub fn powi(&self, exp: i32) -> Result<Unit> {
        if exp == 1 {
            return Ok(self.clone());
        }
        self.check_offset("power")?;
        if exp == 0 {
            return Ok(Unit::dimensionless());
        }
        Ok(Unit {
            name: format!("{}^{exp}", group(&self.name)),
            factor: self.factor.powi(exp),
            offset: 0.0,
            dims: self.dims.clone().exp(exp)?,
        })
    }

    /// sqrt halves every dimension exponent, failing if any is odd.
    pub fn sqrt(&self) -> Result<Unit> {
        self.check_offset("square root")?;
        let mut dims = UnitMap::new();
        for (id, exp) in self.dims.map.iter() {
            if exp % 2 != 0 {
                return units_err!(
                    IncompatibleUnits,
                    format!("can't take the square root of '{}'", self.name)
                );
            }
            dims.map.insert(id.clone(), exp / 2);
        }
        Ok(Unit {
            name: format!("sqrt({})", self.name),
            factor: self.factor.sqrt(),
            offset: 0.0,
            dims,
        })
    }

    /// conversion_tuple_to returns `(scale, offset)` such that a value
    /// `x` in this unit is `(x + offset) * scale` in `to`.
    pub fn conversion_tuple_to(&self, to: &Unit) -> Result<(f64, f64)> {
        if !self.is_compatible(to) {
            return units_err!(
                IncompatibleUnits,
                format!(
                    "units '{}' ({}) and '{}' ({}) are incompatible",
                    self.name, self.dims, to.name, to.dims
                )
            );
        }
        let scale = self.factor / to.factor;
        let offset = self.offset - to.offset * to.factor / self.factor;
        Ok((scale, offset))
    }

    /// convert maps `value` in this unit into `to`.
    pub fn convert(&self, value: f64, to: &Unit) -> Result<f64> {
        let (scale, offset) = self.conversion_tuple_to(to)?;
        Ok((value + offset) * scale)
    }
}

impl Display for Unit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

fn one() -> f64 {
    1.0
}

fn is_zero(n: &f64) -> bool {
    *n == 0.0
}

/// UnitDef declares a named unit.  Without a definition the unit is a
/// new base dimension; with one, the unit is `factor` times the defined
/// expression, shifted by `offset`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitDef {
    pub name: String,
    #[serde(default = "one")]
    pub factor: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub offset: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl UnitDef {
    pub fn base(name: &str) -> Self {
        UnitDef {
            name: name.to_owned(),
            factor: 1.0,
            offset: 0.0,
            definition: None,
            aliases: vec![],
        }
    }

    pub fn derived(name: &str, factor: f64, definition: &str) -> Self {
        UnitDef {
            name: name.to_owned(),
            factor,
            offset: 0.0,
            definition: Some(definition.to_owned()),
            aliases: vec![],
        }
    }
}

// (name, factor, offset, definition, aliases)
type BuiltinUnit = (&'static str, f64, f64, Option<&'static str>, &'static [&'static str]);

const BUILTIN_UNITS: &[BuiltinUnit] = &[
    // base dimensions
    ("m", 1.0, 0.0, None, &["meter", "meters"]),
    ("kg", 1.0, 0.0, None, &[]),
    ("s", 1.0, 0.0, None, &["sec"]),
    ("K", 1.0, 0.0, None, &["degK"]),
    ("A", 1.0, 0.0, None, &[]),
    ("mol", 1.0, 0.0, None, &[]),
    ("cd", 1.0, 0.0, None, &[]),
    ("rad", 1.0, 0.0, None, &[]),
    // length
    ("cm", 0.01, 0.0, Some("m"), &[]),
    ("mm", 0.001, 0.0, Some("m"), &[]),
    ("km", 1000.0, 0.0, Some("m"), &[]),
    ("inch", 0.0254, 0.0, Some("m"), &["inches"]),
    ("ft", 12.0, 0.0, Some("inch"), &["feet", "foot"]),
    ("yd", 3.0, 0.0, Some("ft"), &[]),
    ("mi", 5280.0, 0.0, Some("ft"), &[]),
    ("nmi", 1852.0, 0.0, Some("m"), &[]),
    // mass
    ("g", 0.001, 0.0, Some("kg"), &[]),
    ("lbm", 0.45359237, 0.0, Some("kg"), &[]),
    // time
    ("min", 60.0, 0.0, Some("s"), &[]),
    ("h", 60.0, 0.0, Some("min"), &["hr"]),
    ("d", 24.0, 0.0, Some("h"), &["day", "days"]),
    // temperature
    ("degC", 1.0, 273.15, Some("K"), &[]),
    ("degR", 5.0 / 9.0, 0.0, Some("K"), &[]),
    ("degF", 1.0, 459.67, Some("degR"), &[]),
    // angle
    ("deg", std::f64::consts::PI / 180.0, 0.0, Some("rad"), &[]),
    // force
    ("N", 1.0, 0.0, Some("kg*m/s^2"), &[]),
    ("lbf", 4.4482216152605, 0.0, Some("N"), &[]),
    // pressure
    ("Pa", 1.0, 0.0, Some("N/m^2"), &[]),
    ("kPa", 1000.0, 0.0, Some("Pa"), &[]),
    ("MPa", 1.0e6, 0.0, Some("Pa"), &[]),
    ("bar", 1.0e5, 0.0, Some("Pa"), &[]),
    ("atm", 101325.0, 0.0, Some("Pa"), &[]),
    ("psi", 1.0, 0.0, Some("lbf/inch^2"), &[]),
    // energy
    ("J", 1.0, 0.0, Some("N*m"), &[]),
    ("kJ", 1000.0, 0.0, Some("J"), &[]),
    ("Btu", 1055.05585262, 0.0, Some("J"), &[]),
    // power
    ("W", 1.0, 0.0, Some("J/s"), &[]),
    ("kW", 1000.0, 0.0, Some("W"), &[]),
    ("hp", 550.0, 0.0, Some("ft*lbf/s"), &[]),
    // volume
    ("L", 0.001, 0.0, Some("m^3"), &["l"]),
];

fn is_dimensionless_name(id: &str) -> bool {
    id == "dmnl" || id == "unitless" || id == "dimensionless"
}

/// UnitLibrary is what connections need from a unit system: resolve a
/// unit string and find the affine conversion between two of them.
pub trait UnitLibrary: Send + Sync {
    fn lookup(&self, unit: &str) -> Result<Unit>;

    fn conversion(&self, from: &str, to: &str) -> Result<(f64, f64)> {
        let from = self.lookup(from)?;
        let to = self.lookup(to)?;
        from.conversion_tuple_to(&to)
    }
}

#[derive(Debug, Default)]
pub struct Context {
    aliases: HashMap<String, String>,
    units: HashMap<String, Unit>,
}

impl Context {
    pub fn new_with_builtins(units: &[UnitDef]) -> Result<Self> {
        let mut all_units = BUILTIN_UNITS
            .iter()
            .map(|(name, factor, offset, definition, aliases)| UnitDef {
                name: name.to_string(),
                factor: *factor,
                offset: *offset,
                definition: definition.map(|s| s.to_string()),
                aliases: aliases.iter().map(|s| s.to_string()).collect(),
            })
            .collect::<Vec<_>>();

        all_units.extend(units.iter().cloned());

        Self::new(&all_units)
    }

    pub fn new(units: &[UnitDef]) -> Result<Self> {
        let mut unit_errors: Vec<(String, Error)> = Vec::new();

        let mut ctx = Context::default();

        // step 1: build our base context consisting of all prime units
        for unit in units.iter().filter(|unit| unit.definition.is_none()) {
            let mut base = Unit::base(&unit.name);
            base.factor = unit.factor;
            base.offset = unit.offset;
            if let Err(err) = ctx.insert(unit, base) {
                unit_errors.push((unit.name.clone(), err));
            }
        }

        // step 2: derived units, in declaration order so a definition
        // can refer to any unit declared before it
        for unit in units.iter().filter(|unit| unit.definition.is_some()) {
            let definition = unit.definition.as_deref().unwrap_or_default();
            let parsed = match ctx.parse_unit(definition) {
                Ok(parsed) => parsed,
                Err(err) => {
                    unit_errors.push((unit.name.clone(), err));
                    continue;
                }
            };
            let derived = Unit {
                name: unit.name.clone(),
                factor: unit.factor * parsed.factor,
                offset: unit.offset + parsed.offset / unit.factor,
                dims: parsed.dims,
            };
            if let Err(err) = ctx.insert(unit, derived) {
                unit_errors.push((unit.name.clone(), err));
            }
        }

        if unit_errors.is_empty() {
            Ok(ctx)
        } else {
            let code = unit_errors[0].1.code;
            let details = unit_errors
                .iter()
                .map(|(name, err)| format!("{name}: {err}"))
                .collect::<Vec<_>>()
                .join("; ");
            Err(Error::new(ErrorKind::Units, code, Some(details)))
        }
    }

    fn insert(&mut self, def: &UnitDef, unit: Unit) -> Result<()> {
        for alias in def.aliases.iter() {
            if self.units.contains_key(alias) {
                return units_err!(DuplicateUnit, format!("alias '{alias}' is already a unit"));
            }
            if let Entry::Vacant(e) = self.aliases.entry(alias.clone()) {
                e.insert(def.name.clone());
            } else {
                return units_err!(DuplicateUnit, format!("alias '{alias}' is already defined"));
            }
        }
        if self.aliases.contains_key(&def.name) || self.units.contains_key(&def.name) {
            return units_err!(DuplicateUnit, format!("'{}' is already defined", def.name));
        }
        self.units.insert(def.name.clone(), unit);
        Ok(())
    }

    fn get(&self, ident: &str) -> Option<&Unit> {
        // first, see if this identifier is an alias of a better-known unit
        let normalized = self.aliases.get(ident).map(|s| s.as_str()).unwrap_or(ident);
        self.units.get(normalized)
    }

    fn parse_unit(&self, text: &str) -> Result<Unit> {
        let ast = match parse(text, LexerType::Units) {
            Ok(Some(ast)) => ast,
            Ok(None) => return Ok(Unit::dimensionless()),
            Err(mut errors) => {
                let mut err = Error::from_equation(text, errors.remove(0));
                err.kind = ErrorKind::Units;
                return Err(err);
            }
        };

        build_unit(self, &ast).map_err(|err| {
            let mut err = Error::from_equation(text, err);
            err.kind = ErrorKind::Units;
            err
        })
    }
}

impl UnitLibrary for Context {
    fn lookup(&self, unit: &str) -> Result<Unit> {
        let unit = unit.trim();
        if let Some(known) = self.get(unit) {
            return Ok(known.clone());
        }
        let mut parsed = self.parse_unit(unit)?;
        parsed.name = unit.to_owned();
        Ok(parsed)
    }
}

fn const_int_eval(ast: &Expr) -> EquationResult<i32> {
    match ast {
        Expr::Const(_, n, loc) => {
            if !approx_eq!(f64, *n, n.round()) {
                eqn_err!(ExpectedInteger, loc.start, loc.end)
            } else if n.abs() > i32::MAX as f64 {
                eqn_err!(ExponentOverflow, loc.start, loc.end)
            } else {
                Ok(n.round() as i32)
            }
        }
        Expr::Var(_, loc) | Expr::App(_, _, loc) | Expr::Subscript(_, _, loc) => {
            eqn_err!(ExpectedInteger, loc.start, loc.end)
        }
        Expr::Op1(op, expr, loc) => {
            let expr = const_int_eval(expr)?;
            let result = match op {
                UnaryOp::Positive => Some(expr),
                UnaryOp::Negative => expr.checked_neg(),
            };
            match result {
                Some(result) => Ok(result),
                None => eqn_err!(ExponentOverflow, loc.start, loc.end),
            }
        }
        Expr::Op2(op, l, r, loc) => {
            let l = const_int_eval(l)?;
            let r = const_int_eval(r)?;
            let result = match op {
                BinaryOp::Add => l.checked_add(r),
                BinaryOp::Sub => l.checked_sub(r),
                BinaryOp::Mul => l.checked_mul(r),
                BinaryOp::Exp | BinaryOp::Div => {
                    return eqn_err!(ExpectedInteger, loc.start, loc.end);
                }
            };
            match result {
                Some(result) => Ok(result),
                None => eqn_err!(ExponentOverflow, loc.start, loc.end),
            }
        }
    }
}

fn build_unit(ctx: &Context, ast: &Expr) -> EquationResult<Unit> {
    let at = |err: Error, start: u16, end: u16| EquationError {
        start,
        end,
        code: err.code,
    };

    let unit = match ast {
        Expr::Const(s, n, _) => {
            // a bare number is a dimensionless scale factor: `1/s`, `1000*m`
            Unit {
                name: s.clone(),
                factor: *n,
                offset: 0.0,
                dims: UnitMap::new(),
            }
        }
        Expr::Var(id, loc) => {
            if let Some(unit) = ctx.get(id) {
                unit.clone()
            } else if is_dimensionless_name(id) {
                let mut unit = Unit::dimensionless();
                unit.name = id.clone();
                unit
            } else {
                return eqn_err!(UnknownUnit, loc.start, loc.end);
            }
        }
        Expr::App(_, _, loc) | Expr::Subscript(_, _, loc) => {
            return eqn_err!(UnrecognizedToken, loc.start, loc.end);
        }
        Expr::Op1(op, expr, loc) => match op {
            UnaryOp::Positive => build_unit(ctx, expr)?,
            UnaryOp::Negative => return eqn_err!(UnrecognizedToken, loc.start, loc.end),
        },
        Expr::Op2(op, l, r, loc) => match op {
            BinaryOp::Exp => {
                let exp = const_int_eval(r)?;
                build_unit(ctx, l)?
                    .powi(exp)
                    .map_err(|err| at(err, loc.start, loc.end))?
            }
            BinaryOp::Mul => build_unit(ctx, l)?
                .mul(&build_unit(ctx, r)?)
                .map_err(|err| at(err, loc.start, loc.end))?,
            BinaryOp::Div => build_unit(ctx, l)?
                .div(&build_unit(ctx, r)?)
                .map_err(|err| at(err, loc.start, loc.end))?,
            BinaryOp::Add | BinaryOp::Sub => {
                return eqn_err!(UnrecognizedToken, loc.start, loc.end);
            }
        },
    };

    Ok(unit)
}
