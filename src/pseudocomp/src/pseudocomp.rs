// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! PseudoComponent turns an algebraic connection like `c = (a+b)*2`
//! into a graph node with anonymous inputs `in0..inK` and a single
//! output `out0`.

use std::collections::HashMap;

use crate::ast::{print_eqn, Expr, Loc};
use crate::common::{varname, Error, ErrorCode, ErrorKind, Ident, Result};
use crate::eval::{ExprEvaluator, Jacobian, Scope, VarMeta};
use crate::graph::{Node, Parent};
use crate::names::NameAllocator;
use crate::units::{Unit, UnitLibrary};
use crate::value::Value;
use crate::xform::apply_unit_pass;
use crate::{conn_err, eval_err};

pub const OUTPUT_SLOT: &str = "out0";

fn input_slot(i: usize) -> Ident {
    format!("in{i}")
}

fn indexed_access(what: &str, name: &str) -> Error {
    Error::new(
        ErrorKind::Connection,
        ErrorCode::IndexedAccessUnsupported,
        Some(format!("can't {what} '{name}' of a connection node with an index")),
    )
}

#[derive(Clone, Debug)]
pub struct PseudoComponent {
    name: Ident,
    inputs: Vec<Ident>,
    // external reference -> input slot, in order of first appearance
    inmap: Vec<(Ident, Ident)>,
    meta: HashMap<Ident, VarMeta>,
    slots: HashMap<Ident, Option<f64>>,
    outdests: Vec<Ident>,
    srcexpr: ExprEvaluator,
    destexpr: ExprEvaluator,
    src_units: Option<Unit>,
    out_units: Option<Unit>,
    scale: f64,
    offset: f64,
    valid: bool,
    eqn: String,
    jacobian: Option<Jacobian>,
    itername: String,
}

impl PseudoComponent {
    /// new builds a connection node computing `srcexpr` and assigning
    /// it to `destexpr`.  With `translate` set the references in
    /// `srcexpr` are external variables that get renamed to local input
    /// slots; otherwise `srcexpr` is already written in terms of them.
    pub fn new(
        parent: &dyn Parent,
        names: &dyn NameAllocator,
        units: &dyn UnitLibrary,
        srcexpr: &ExprEvaluator,
        destexpr: Option<&ExprEvaluator>,
        translate: bool,
        ulps: i64,
    ) -> Result<Self> {
        // check the destination before anything observable happens
        let dest_ref = match destexpr {
            Some(destexpr) => {
                let refs = destexpr.refs();
                match refs.len() {
                    0 => {
                        return eval_err!(
                            NotAssignable,
                            format!("can't assign to '{}'", destexpr.text())
                        );
                    }
                    // `2*c` names a single variable but isn't one
                    1 if destexpr.ast().reference().is_none() => {
                        return eval_err!(
                            NotAssignable,
                            format!("can't assign to '{}'", destexpr.text())
                        );
                    }
                    1 => refs.into_iter().next(),
                    _ => {
                        return conn_err!(
                            MultiVariableDestination,
                            format!(
                                "output of a connection must reference only one variable, not '{}'",
                                destexpr.text()
                            )
                        );
                    }
                }
            }
            None => None,
        };

        let mut inputs = Vec::new();
        let mut inmap = Vec::new();
        for (i, reference) in srcexpr.refs().into_iter().enumerate() {
            let slot = input_slot(i);
            inputs.push(slot.clone());
            inmap.push((reference, slot));
        }

        // attach metadata to the local names
        let mut meta: HashMap<Ident, VarMeta> = HashMap::new();
        if translate {
            let src_meta: HashMap<Ident, VarMeta> =
                srcexpr.get_metadata(parent)?.into_iter().collect();
            for (reference, slot) in inmap.iter() {
                let var_meta = src_meta.get(varname(reference)).cloned().unwrap_or_default();
                meta.insert(slot.clone(), var_meta);
            }
        } else {
            for slot in inputs.iter() {
                meta.insert(slot.clone(), VarMeta::default());
            }
        }
        let out_meta = match dest_ref {
            Some(ref dest_ref) => parent.get_metadata(varname(dest_ref))?,
            None => VarMeta::default(),
        };

        let tree = if translate {
            let renames: HashMap<String, Expr> = inmap
                .iter()
                .map(|(reference, slot)| {
                    (reference.clone(), Expr::Var(slot.clone(), Loc::default()))
                })
                .collect();
            srcexpr.ast().rename(&renames)
        } else {
            srcexpr.ast().clone()
        };

        let dest_text = destexpr.map(|d| d.text().to_owned());
        let pass = apply_unit_pass(&tree, &meta, out_meta.units.as_deref(), units, ulps)
            .map_err(|err| {
                if err.code != ErrorCode::IncompatibleUnits {
                    return err;
                }
                Error::new(
                    err.kind,
                    err.code,
                    Some(format!(
                        "Can't connect '{}' to '{}': {}",
                        srcexpr.text(),
                        dest_text.as_deref().unwrap_or(""),
                        err.details.unwrap_or_default()
                    )),
                )
            })?;
        let out_units = match (&pass.src_units, out_meta.units.as_deref()) {
            (Some(_), Some(out_units)) => Some(units.lookup(out_units)?),
            _ => None,
        };
        meta.insert(OUTPUT_SLOT.to_owned(), out_meta);

        // for debugging only: the equation as written, before any unit
        // conversion was folded in
        let eqn = format!(
            "{} = {}",
            dest_text.as_deref().unwrap_or(OUTPUT_SLOT),
            if translate {
                print_eqn(srcexpr.ast())
            } else {
                srcexpr.text().to_owned()
            }
        );

        let mut slots: HashMap<Ident, Option<f64>> =
            inputs.iter().map(|slot| (slot.clone(), None)).collect();
        slots.insert(OUTPUT_SLOT.to_owned(), None);

        // untouched sources keep their text exactly as written
        let rewritten = translate || pass.tree != tree;
        let srcexpr = if rewritten {
            ExprEvaluator::from_ast(pass.tree)
        } else {
            srcexpr.clone()
        };

        let name = names.next_name();
        log::debug!(
            "{}: '{}' (units {} -> {}, scale {}, offset {})",
            name,
            eqn,
            pass.src_units
                .as_ref()
                .map(|u| u.name.as_str())
                .unwrap_or("none"),
            out_units.as_ref().map(|u| u.name.as_str()).unwrap_or("none"),
            pass.scale,
            pass.offset
        );

        Ok(PseudoComponent {
            name,
            inputs,
            inmap,
            meta,
            slots,
            outdests: dest_ref.into_iter().collect(),
            srcexpr,
            destexpr: ExprEvaluator::from_ast(Expr::Var(OUTPUT_SLOT.to_owned(), Loc::default())),
            src_units: pass.src_units,
            out_units,
            scale: pass.scale,
            offset: pass.offset,
            valid: false,
            eqn,
            jacobian: None,
            itername: String::new(),
        })
    }

    /// eqn is the connection's equation, for diagnostics.
    pub fn eqn(&self) -> &str {
        &self.eqn
    }

    pub fn inputs(&self) -> &[Ident] {
        &self.inputs
    }

    /// inmap pairs each external reference with the input slot it
    /// feeds.
    pub fn inmap(&self) -> &[(Ident, Ident)] {
        &self.inmap
    }

    pub fn outdests(&self) -> &[Ident] {
        &self.outdests
    }

    /// source is the expression actually evaluated, with local names
    /// and any unit conversion applied.
    pub fn source(&self) -> &ExprEvaluator {
        &self.srcexpr
    }

    pub fn src_units(&self) -> Option<&Unit> {
        self.src_units.as_ref()
    }

    /// conversion is the `(scale, offset)` folded into the source.
    pub fn conversion(&self) -> (f64, f64) {
        (self.scale, self.offset)
    }

    pub fn itername(&self) -> &str {
        &self.itername
    }

    pub(crate) fn add_target(&mut self, target: &str) {
        self.outdests.push(target.to_owned());
    }
}

impl Scope for PseudoComponent {
    fn get_value(&self, name: &str) -> Result<Value> {
        match self.slots.get(name) {
            Some(Some(value)) => Ok(Value::Number(*value)),
            Some(None) => Err(Error::new(
                ErrorKind::Evaluation,
                ErrorCode::UnsetValue,
                Some(format!("'{}.{}' has not been set", self.name, name)),
            )),
            None => Err(Error::new(
                ErrorKind::Variable,
                ErrorCode::DoesNotExist,
                Some(format!("'{}' has no slot named '{}'", self.name, name)),
            )),
        }
    }

    fn set_value(&mut self, name: &str, value: Value) -> Result<()> {
        match self.slots.get_mut(name) {
            Some(slot) => {
                *slot = Some(value.magnitude());
                Ok(())
            }
            None => Err(Error::new(
                ErrorKind::Variable,
                ErrorCode::DoesNotExist,
                Some(format!("'{}' has no slot named '{}'", self.name, name)),
            )),
        }
    }

    fn pathname(&self) -> String {
        self.name.clone()
    }
}

impl Node for PseudoComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, parent: &mut dyn Parent) -> Result<()> {
        if !self.valid {
            for (slot, value) in parent.update_inputs(&self.name, None)? {
                self.set_value(&slot, value)?;
            }
        }

        let result = match self.srcexpr.evaluate(&*self)? {
            Value::Quantity(q) => match self.out_units {
                Some(ref out_units) => {
                    log::warn!(
                        "{}: converting result from '{}' to '{}' at run time",
                        self.name,
                        q.unit,
                        out_units
                    );
                    Value::Number(q.in_units_of(out_units)?)
                }
                None => Value::Number(q.value),
            },
            value => value,
        };
        log::trace!("{}: {} -> {}", self.name, self.eqn, result);

        let destexpr = self.destexpr.clone();
        destexpr.set(result, self)?;
        self.valid = true;
        Ok(())
    }

    fn get(&self, name: &str, index: Option<&[usize]>) -> Result<Value> {
        if index.is_some() {
            return Err(indexed_access("get", name));
        }
        self.get_value(name)
    }

    fn get_wrapped_attr(&self, name: &str, index: Option<&[usize]>) -> Result<Value> {
        if index.is_some() {
            return Err(indexed_access("wrap", name));
        }
        self.get_value(name)
    }

    fn set(&mut self, path: &str, value: Value, index: Option<&[usize]>) -> Result<()> {
        if index.is_some() {
            return Err(indexed_access("set", path));
        }
        self.set_value(path, value)
    }

    fn invalidate_deps(&mut self, _varnames: Option<&[Ident]>) {
        self.valid = false;
    }

    fn connect(&mut self, _src: &str, _dest: &str) {
        self.valid = false;
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn list_connections(&self, is_hidden: bool) -> Vec<(Ident, Ident)> {
        if is_hidden {
            match self.outdests.first() {
                Some(dest) => self
                    .inmap
                    .iter()
                    .map(|(src, _)| (src.clone(), dest.clone()))
                    .collect(),
                None => vec![],
            }
        } else {
            let mut conns: Vec<(Ident, Ident)> = self
                .inmap
                .iter()
                .map(|(src, slot)| (src.clone(), format!("{}.{}", self.name, slot)))
                .collect();
            conns.extend(
                self.outdests
                    .iter()
                    .map(|dest| (format!("{}.{}", self.name, OUTPUT_SLOT), dest.clone())),
            );
            conns
        }
    }

    fn linearize(&mut self) -> Result<()> {
        let grad = self.srcexpr.evaluate_gradient(&*self, &self.inputs)?;
        log::trace!("{}: d({})/d({:?}) = {:?}", self.name, OUTPUT_SLOT, self.inputs, grad);
        self.jacobian = Some(Jacobian::from_row(grad));
        Ok(())
    }

    fn calc_derivatives(&mut self, first: bool, second: bool) -> Result<()> {
        if first {
            self.linearize()?;
        }
        if second {
            return eval_err!(
                UnsupportedSecondOrderDerivative,
                format!("2nd derivatives not supported in connection node {}", self.name)
            );
        }
        Ok(())
    }

    fn provide_j(&self) -> Result<(Vec<Ident>, Vec<Ident>, &Jacobian)> {
        match self.jacobian {
            Some(ref jacobian) => Ok((
                self.inputs.clone(),
                vec![OUTPUT_SLOT.to_owned()],
                jacobian,
            )),
            None => eval_err!(
                JacobianNotComputed,
                format!("{} has not been linearized", self.name)
            ),
        }
    }

    fn set_itername(&mut self, itername: &str) {
        self.itername = itername.to_owned();
    }

    fn get_metadata(&self, traitpath: &str) -> Result<VarMeta> {
        match self.meta.get(traitpath) {
            Some(meta) => Ok(meta.clone()),
            None => Err(Error::new(
                ErrorKind::Variable,
                ErrorCode::DoesNotExist,
                Some(format!("'{}' has no slot named '{}'", self.name, traitpath)),
            )),
        }
    }
}
