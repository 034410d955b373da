// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

pub mod ast;
pub mod builder;
pub mod common;
pub mod config;
pub mod eval;
pub mod graph;
pub mod names;
pub mod param;
pub mod parser;
pub mod pseudocomp;
mod token;
pub mod units;
pub mod value;
pub mod xform;

pub use self::builder::ConnectionBuilder;
pub use self::common::{Error, ErrorCode, ErrorKind, Ident, Result};
pub use self::config::ConnectConfig;
pub use self::eval::{ExprEvaluator, Jacobian, VarMeta};
pub use self::graph::{MemoryGraph, Node, Parent};
pub use self::names::{NameAllocator, SequentialNames};
pub use self::param::ParamPseudoComponent;
pub use self::pseudocomp::PseudoComponent;
pub use self::token::LexerType;
pub use self::units::{Context as UnitContext, Unit, UnitDef, UnitLibrary};
pub use self::value::{Quantity, Value};
