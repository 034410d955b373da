// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The contracts between connection nodes and the graph that owns them.

use std::collections::BTreeMap;

use crate::common::{varname, Error, ErrorCode, ErrorKind, Ident, Result};
use crate::eval::{Jacobian, MetadataScope, VarMeta};
use crate::value::Value;
use crate::conn_err;

/// Parent is the owning graph as seen by a node it contains.
pub trait Parent: MetadataScope {
    fn get_pathname(&self) -> String;

    /// update_inputs recomputes whatever feeds `node` and returns the
    /// current value for each of its connected input slots, restricted
    /// to `names` when given.
    fn update_inputs(&mut self, node: &str, names: Option<&[Ident]>) -> Result<Vec<(Ident, Value)>>;

    /// connect adds the edge `src -> dest` to the graph.
    fn connect(&mut self, src: &str, dest: &str) -> Result<()>;

    fn disconnect(&mut self, src: &str, dest: &str) -> Result<()>;
}

/// Node is the contract the scheduler drives every graph node through.
pub trait Node {
    fn name(&self) -> &str;

    fn run(&mut self, parent: &mut dyn Parent) -> Result<()>;

    fn update_outputs(&mut self, parent: &mut dyn Parent, _names: Option<&[Ident]>) -> Result<()> {
        self.run(parent)
    }

    fn get(&self, name: &str, index: Option<&[usize]>) -> Result<Value>;

    fn get_wrapped_attr(&self, name: &str, index: Option<&[usize]>) -> Result<Value> {
        self.get(name, index)
    }

    fn set(&mut self, path: &str, value: Value, index: Option<&[usize]>) -> Result<()>;

    fn invalidate_deps(&mut self, varnames: Option<&[Ident]>);

    fn connect(&mut self, src: &str, dest: &str);

    fn is_valid(&self) -> bool;

    fn get_valid(&self, names: &[Ident]) -> Vec<bool> {
        vec![self.is_valid(); names.len()]
    }

    fn list_connections(&self, is_hidden: bool) -> Vec<(Ident, Ident)>;

    fn make_connections(&self, parent: &mut dyn Parent) -> Result<()> {
        for (src, dest) in self.list_connections(false) {
            log::trace!("{}: connect {} -> {}", self.name(), src, dest);
            parent.connect(&src, &dest)?;
        }
        Ok(())
    }

    fn remove_connections(&self, parent: &mut dyn Parent) -> Result<()> {
        for (src, dest) in self.list_connections(false) {
            log::trace!("{}: disconnect {} -> {}", self.name(), src, dest);
            parent.disconnect(&src, &dest)?;
        }
        Ok(())
    }

    fn linearize(&mut self) -> Result<()>;

    fn calc_derivatives(&mut self, first: bool, second: bool) -> Result<()>;

    #[allow(clippy::type_complexity)]
    fn provide_j(&self) -> Result<(Vec<Ident>, Vec<Ident>, &Jacobian)>;

    fn set_itername(&mut self, itername: &str);

    fn get_metadata(&self, traitpath: &str) -> Result<VarMeta>;

    fn get_pathname(&self, parent: &dyn Parent) -> String {
        let path = parent.get_pathname();
        if path.is_empty() {
            self.name().to_owned()
        } else {
            format!("{}.{}", path, self.name())
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Variable {
    value: Option<f64>,
    meta: VarMeta,
}

/// MemoryGraph is a small in-memory owning graph: named variables, a
/// list of edges, and just enough data flow to drive connection nodes.
#[derive(Clone, Debug, Default)]
pub struct MemoryGraph {
    pathname: String,
    vars: BTreeMap<Ident, Variable>,
    edges: Vec<(Ident, Ident)>,
}

impl MemoryGraph {
    pub fn new(pathname: &str) -> Self {
        MemoryGraph {
            pathname: pathname.to_owned(),
            ..Default::default()
        }
    }

    /// declare adds a variable, optionally with a declared unit.
    pub fn declare(&mut self, name: &str, units: Option<&str>) {
        let meta = VarMeta {
            units: units.map(|u| u.to_owned()),
        };
        self.vars.insert(
            name.to_owned(),
            Variable {
                value: None,
                meta,
            },
        );
    }

    pub fn set_value(&mut self, reference: &str, value: f64) -> Result<()> {
        match self.vars.get_mut(reference) {
            Some(var) => {
                var.value = Some(value);
                Ok(())
            }
            None => does_not_exist(reference),
        }
    }

    pub fn value(&self, reference: &str) -> Option<f64> {
        self.vars.get(reference).and_then(|var| var.value)
    }

    pub fn edges(&self) -> &[(Ident, Ident)] {
        &self.edges
    }

    pub fn has_edge(&self, src: &str, dest: &str) -> bool {
        self.edges.iter().any(|(s, d)| s == src && d == dest)
    }

    /// propagate_outputs copies each of `node`'s outputs along the
    /// edges leaving it.
    pub fn propagate_outputs(&mut self, node: &dyn Node) -> Result<()> {
        let prefix = format!("{}.", node.name());
        let outgoing: Vec<(Ident, Ident)> = self
            .edges
            .iter()
            .filter(|(src, _)| src.starts_with(&prefix))
            .cloned()
            .collect();
        for (src, dest) in outgoing {
            let value = node.get(&src[prefix.len()..], None)?;
            self.set_value(&dest, value.magnitude())?;
        }
        Ok(())
    }
}

fn does_not_exist<T>(reference: &str) -> Result<T> {
    Err(Error::new(
        ErrorKind::Variable,
        ErrorCode::DoesNotExist,
        Some(format!("no variable named '{reference}'")),
    ))
}

impl MetadataScope for MemoryGraph {
    fn get_metadata(&self, name: &str) -> Result<VarMeta> {
        match self.vars.get(varname(name)) {
            Some(var) => Ok(var.meta.clone()),
            None => does_not_exist(name),
        }
    }
}

impl Parent for MemoryGraph {
    fn get_pathname(&self) -> String {
        self.pathname.clone()
    }

    fn update_inputs(&mut self, node: &str, names: Option<&[Ident]>) -> Result<Vec<(Ident, Value)>> {
        let prefix = format!("{node}.");
        let mut inputs = Vec::new();
        for (src, dest) in self.edges.iter() {
            let Some(slot) = dest.strip_prefix(&prefix) else {
                continue;
            };
            if let Some(names) = names {
                if !names.iter().any(|n| n == slot) {
                    continue;
                }
            }
            match self.value(src) {
                Some(value) => inputs.push((slot.to_owned(), Value::Number(value))),
                None => {
                    return Err(Error::new(
                        ErrorKind::Variable,
                        ErrorCode::UnsetValue,
                        Some(format!("'{src}' has no value")),
                    ));
                }
            }
        }
        Ok(inputs)
    }

    fn connect(&mut self, src: &str, dest: &str) -> Result<()> {
        if self.has_edge(src, dest) {
            return conn_err!(Generic, format!("'{src}' is already connected to '{dest}'"));
        }
        self.edges.push((src.to_owned(), dest.to_owned()));
        Ok(())
    }

    fn disconnect(&mut self, src: &str, dest: &str) -> Result<()> {
        let before = self.edges.len();
        self.edges.retain(|(s, d)| !(s == src && d == dest));
        if self.edges.len() == before {
            return conn_err!(DoesNotExist, format!("'{src}' is not connected to '{dest}'"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges() {
        let mut graph = MemoryGraph::new("top");
        graph.connect("a", "_pseudo_0.in0").unwrap();
        assert!(graph.has_edge("a", "_pseudo_0.in0"));
        assert_eq!(ErrorCode::Generic, graph.connect("a", "_pseudo_0.in0").unwrap_err().code);

        graph.disconnect("a", "_pseudo_0.in0").unwrap();
        assert!(graph.edges().is_empty());
        let err = graph.disconnect("a", "_pseudo_0.in0").unwrap_err();
        assert_eq!(ErrorCode::DoesNotExist, err.code);
    }

    #[test]
    fn test_update_inputs() {
        let mut graph = MemoryGraph::new("top");
        graph.declare("a", Some("m"));
        graph.declare("b", None);
        graph.set_value("a", 2.0).unwrap();
        graph.connect("a", "n.in0").unwrap();
        graph.connect("b", "n.in1").unwrap();
        graph.connect("b", "other.in0").unwrap();

        let err = graph.update_inputs("n", None).unwrap_err();
        assert_eq!(ErrorCode::UnsetValue, err.code);

        let inputs = graph.update_inputs("n", Some(&["in0".to_owned()])).unwrap();
        assert_eq!(vec![("in0".to_owned(), Value::Number(2.0))], inputs);

        graph.set_value("b", 3.0).unwrap();
        let inputs = graph.update_inputs("n", None).unwrap();
        assert_eq!(2, inputs.len());
    }

    #[test]
    fn test_metadata() {
        let mut graph = MemoryGraph::new("");
        graph.declare("x", Some("ft"));
        assert_eq!(VarMeta::with_units("ft"), graph.get_metadata("x").unwrap());
        assert_eq!(VarMeta::with_units("ft"), graph.get_metadata("x[2]").unwrap());
        assert_eq!(ErrorCode::DoesNotExist, graph.get_metadata("y").unwrap_err().code);
        assert_eq!(ErrorCode::DoesNotExist, graph.set_value("y", 1.0).unwrap_err().code);
    }
}
