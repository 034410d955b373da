// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use crate::ast::format_number;
use crate::common::{Ident, Result};
use crate::eval::{ExprEvaluator, Jacobian, VarMeta};
use crate::graph::{Node, Parent};
use crate::names::NameAllocator;
use crate::pseudocomp::{PseudoComponent, OUTPUT_SLOT};
use crate::units::UnitLibrary;
use crate::value::Value;

/// param_source picks the smallest source expression applying `scaler`
/// and `adder` to the parameter value in `in0`.
#[allow(clippy::float_cmp)]
pub fn param_source(scaler: f64, adder: f64) -> String {
    if scaler == 1.0 && adder == 0.0 {
        "in0".to_owned()
    } else if scaler == 1.0 {
        format!("in0+{}", format_number(adder))
    } else if adder == 0.0 {
        format!("in0*{}", format_number(scaler))
    } else {
        format!(
            "(in0+{})*{}",
            format_number(adder),
            format_number(scaler)
        )
    }
}

/// ParamPseudoComponent applies a scaler and adder to a design
/// parameter.  It has no input connections: the driver sets `in0`
/// directly, and the scaled value fans out to one or more targets.
#[derive(Clone, Debug)]
pub struct ParamPseudoComponent {
    inner: PseudoComponent,
    scaler: f64,
    adder: f64,
}

impl ParamPseudoComponent {
    pub fn new(
        parent: &dyn Parent,
        names: &dyn NameAllocator,
        units: &dyn UnitLibrary,
        target: &str,
        scaler: Option<f64>,
        adder: Option<f64>,
        ulps: i64,
    ) -> Result<Self> {
        let scaler = scaler.unwrap_or(1.0);
        let adder = adder.unwrap_or(0.0);

        let srcexpr = ExprEvaluator::new(&param_source(scaler, adder))?;
        let destexpr = ExprEvaluator::new(target)?;
        let inner =
            PseudoComponent::new(parent, names, units, &srcexpr, Some(&destexpr), false, ulps)?;

        Ok(ParamPseudoComponent {
            inner,
            scaler,
            adder,
        })
    }

    pub fn scaler(&self) -> f64 {
        self.scaler
    }

    pub fn adder(&self) -> f64 {
        self.adder
    }

    /// add_target sends the same scaled value to another destination.
    pub fn add_target(&mut self, target: &str) {
        self.inner.add_target(target);
    }

    pub fn targets(&self) -> &[Ident] {
        self.inner.outdests()
    }

    pub fn eqn(&self) -> &str {
        self.inner.eqn()
    }

    pub fn source(&self) -> &ExprEvaluator {
        self.inner.source()
    }
}

impl Node for ParamPseudoComponent {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn run(&mut self, parent: &mut dyn Parent) -> Result<()> {
        self.inner.run(parent)
    }

    fn get(&self, name: &str, index: Option<&[usize]>) -> Result<Value> {
        self.inner.get(name, index)
    }

    fn get_wrapped_attr(&self, name: &str, index: Option<&[usize]>) -> Result<Value> {
        self.inner.get_wrapped_attr(name, index)
    }

    fn set(&mut self, path: &str, value: Value, index: Option<&[usize]>) -> Result<()> {
        self.inner.set(path, value, index)
    }

    fn invalidate_deps(&mut self, varnames: Option<&[Ident]>) {
        self.inner.invalidate_deps(varnames)
    }

    fn connect(&mut self, src: &str, dest: &str) {
        self.inner.connect(src, dest)
    }

    fn is_valid(&self) -> bool {
        self.inner.is_valid()
    }

    /// The only connections are the outputs; there is nothing upstream
    /// to collapse through when the node is hidden.
    fn list_connections(&self, is_hidden: bool) -> Vec<(Ident, Ident)> {
        if is_hidden {
            return vec![];
        }
        self.inner
            .outdests()
            .iter()
            .map(|dest| (format!("{}.{}", self.name(), OUTPUT_SLOT), dest.clone()))
            .collect()
    }

    fn linearize(&mut self) -> Result<()> {
        self.inner.linearize()
    }

    fn calc_derivatives(&mut self, first: bool, second: bool) -> Result<()> {
        self.inner.calc_derivatives(first, second)
    }

    fn provide_j(&self) -> Result<(Vec<Ident>, Vec<Ident>, &Jacobian)> {
        self.inner.provide_j()
    }

    fn set_itername(&mut self, itername: &str) {
        self.inner.set_itername(itername)
    }

    fn get_metadata(&self, traitpath: &str) -> Result<VarMeta> {
        Node::get_metadata(&self.inner, traitpath)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use crate::names::SequentialNames;
    use crate::units::Context;

    #[test]
    fn test_param_source_forms() {
        assert_eq!("in0", param_source(1.0, 0.0));
        assert_eq!("in0+1", param_source(1.0, 1.0));
        assert_eq!("in0*2", param_source(2.0, 0.0));
        assert_eq!("(in0+1)*2", param_source(2.0, 1.0));
        assert_eq!("(in0+-273.15)*0.5", param_source(0.5, -273.15));
    }

    #[test]
    fn test_param_node() {
        let mut graph = MemoryGraph::new("top");
        graph.declare("x.value", Some("m"));
        graph.declare("y.value", None);
        let names = SequentialNames::new("p");
        let units = Context::new_with_builtins(&[]).unwrap();

        let mut node =
            ParamPseudoComponent::new(&graph, &names, &units, "x.value", Some(2.0), Some(1.0), 4)
                .unwrap();
        assert_eq!("(in0+1)*2", node.source().text());
        assert_eq!("x.value = (in0+1)*2", node.eqn());
        assert_eq!(VarMeta::with_units("m"), node.get_metadata("out0").unwrap());

        node.add_target("y.value");
        assert_eq!(vec!["x.value", "y.value"], node.targets());
        assert!(node.list_connections(true).is_empty());
        assert_eq!(
            vec![
                ("p0.out0".to_owned(), "x.value".to_owned()),
                ("p0.out0".to_owned(), "y.value".to_owned()),
            ],
            node.list_connections(false)
        );

        node.set("in0", Value::Number(3.0), None).unwrap();
        node.run(&mut graph).unwrap();
        assert_eq!(Value::Number(8.0), node.get("out0", None).unwrap());
    }

    #[test]
    fn test_param_defaults() {
        let graph = {
            let mut graph = MemoryGraph::new("");
            graph.declare("z", None);
            graph
        };
        let names = SequentialNames::default();
        let units = Context::new_with_builtins(&[]).unwrap();
        let node = ParamPseudoComponent::new(&graph, &names, &units, "z", None, None, 4).unwrap();
        assert_eq!("in0", node.source().text());
        assert_eq!(1.0, node.scaler());
        assert_eq!(0.0, node.adder());
    }
}
