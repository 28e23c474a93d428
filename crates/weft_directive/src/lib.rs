//! Weft Directive Compiler
//!
//! This crate compiles a declarative attribute micro-language into live
//! bindings over the `weft_core` runtime:
//!
//! - **Grammar**: directive prefixes (`s-` `v-` `c-` `f-` `l-`) and chain
//!   operators (`& # : > * @ <`)
//! - **Compiler**: the parse pass that wires directives into the store,
//!   registry, and pipeline
//! - **Host**: name resolution for application handlers and renderers
//! - **Engine**: the per-module facade owning all of the above
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use indexmap::IndexMap;
//! use weft_core::{ElementTree, Value};
//! use weft_directive::{EngineOptions, HostRegistry, ModuleEngine};
//!
//! let mut tree = ElementTree::new();
//! let root = tree.root();
//! let label = tree.create_element("span");
//! tree.append_child(root, label);
//! tree.set_attribute(label, "v-count", "");
//!
//! let mut initial = IndexMap::new();
//! initial.insert("count".to_string(), Value::from(1));
//!
//! let engine = ModuleEngine::new(
//!     tree,
//!     initial,
//!     Rc::new(HostRegistry::new()),
//!     EngineOptions::default(),
//! );
//! engine.parse().unwrap();
//! engine.set_state("count", Value::from(2)).unwrap();
//! assert_eq!(engine.tree().borrow().text(label), "2");
//! ```

pub mod compiler;
pub mod engine;
pub mod grammar;
pub mod host;
pub mod scope;

pub use compiler::{DirectiveCompiler, EngineOptions};
pub use engine::ModuleEngine;
pub use grammar::{
    parse_control_expr, parse_state_expr, ChainOp, ChainStage, ControlExpr, Directive,
    DirectiveFamily, StateExpr,
};
pub use host::{HandlerCall, HandlerFn, HandlerOutcome, HostRegistry, ModuleHost, RendererFn};
pub use scope::ItemContext;
