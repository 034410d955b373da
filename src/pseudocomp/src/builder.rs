// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::sync::Arc;

use crate::common::Result;
use crate::config::ConnectConfig;
use crate::eval::ExprEvaluator;
use crate::graph::{Node, Parent};
use crate::names::{self, NameAllocator, SequentialNames, DEFAULT_PREFIX};
use crate::param::ParamPseudoComponent;
use crate::pseudocomp::PseudoComponent;
use crate::units::{Context, UnitLibrary};

/// ConnectionBuilder is what a graph uses to turn declared connections
/// into registered nodes.  It owns the name allocator and the unit
/// library so that every node it builds shares them.
#[derive(Clone)]
pub struct ConnectionBuilder {
    names: Arc<dyn NameAllocator>,
    units: Arc<dyn UnitLibrary>,
    ulps: i64,
}

impl ConnectionBuilder {
    pub fn new(config: &ConnectConfig) -> Result<Self> {
        config.validate()?;
        let units = Context::new_with_builtins(&config.units)?;
        let names: Arc<dyn NameAllocator> = if config.name_prefix == DEFAULT_PREFIX {
            names::global()
        } else {
            Arc::new(SequentialNames::new(&config.name_prefix))
        };
        Ok(ConnectionBuilder {
            names,
            units: Arc::new(units),
            ulps: config.float_ulps,
        })
    }

    pub fn with_names(mut self, names: Arc<dyn NameAllocator>) -> Self {
        self.names = names;
        self
    }

    pub fn with_units(mut self, units: Arc<dyn UnitLibrary>) -> Self {
        self.units = units;
        self
    }

    pub fn units(&self) -> &dyn UnitLibrary {
        self.units.as_ref()
    }

    /// connect builds the node for `dest = src` (or a standalone evaluation of
    /// `src` when there's no destination) and adds its edges to
    /// `parent`.  On failure nothing is left registered.
    pub fn connect(
        &self,
        parent: &mut dyn Parent,
        src: &str,
        dest: Option<&str>,
    ) -> Result<PseudoComponent> {
        let srcexpr = ExprEvaluator::new(src)?;
        let destexpr = match dest {
            Some(dest) => Some(ExprEvaluator::new(dest)?),
            None => None,
        };
        let node = PseudoComponent::new(
            &*parent,
            self.names.as_ref(),
            self.units.as_ref(),
            &srcexpr,
            destexpr.as_ref(),
            true,
            self.ulps,
        )?;
        register(&node, parent)?;
        Ok(node)
    }

    /// param builds the node applying `scaler` and `adder` to the
    /// parameter feeding `target`, and adds its edges to `parent`.
    pub fn param(
        &self,
        parent: &mut dyn Parent,
        target: &str,
        scaler: Option<f64>,
        adder: Option<f64>,
    ) -> Result<ParamPseudoComponent> {
        let node = ParamPseudoComponent::new(
            &*parent,
            self.names.as_ref(),
            self.units.as_ref(),
            target,
            scaler,
            adder,
            self.ulps,
        )?;
        register(&node, parent)?;
        Ok(node)
    }

    /// disconnect removes every edge `node` added.
    pub fn disconnect(&self, parent: &mut dyn Parent, node: &dyn Node) -> Result<()> {
        node.remove_connections(parent)
    }
}

/// register adds a node's edges, retracting the ones already added if
/// any of them fails.
fn register(node: &dyn Node, parent: &mut dyn Parent) -> Result<()> {
    let conns = node.list_connections(false);
    for (i, (src, dest)) in conns.iter().enumerate() {
        if let Err(err) = parent.connect(src, dest) {
            for (src, dest) in conns[..i].iter() {
                if let Err(undo) = parent.disconnect(src, dest) {
                    log::warn!("{}: couldn't remove {src} -> {dest}: {undo}", node.name());
                }
            }
            return Err(err);
        }
        log::trace!("{}: connect {} -> {}", node.name(), src, dest);
    }
    Ok(())
}
