//! Host integration
//!
//! The hosting application supplies named handlers (state-chain stages and
//! control actions) and named renderers (view bindings) through the
//! [`ModuleHost`] trait. [`HostRegistry`] is the table-backed implementation
//! most embedders use; anything resolving names dynamically can implement
//! the trait directly.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use weft_core::{Deferred, ElementId, ElementTree, EventObject, StateView, Value};

/// What a handler produced
#[derive(Clone)]
pub enum HandlerOutcome {
    Value(Value),
    Deferred(Deferred),
}

impl HandlerOutcome {
    /// Invalid per the chain-stop rules (null or empty string)
    ///
    /// A deferred outcome is never invalid; its settlement is judged by
    /// whoever attached to it.
    pub fn is_invalid(&self) -> bool {
        match self {
            Self::Value(value) => value.is_invalid(),
            Self::Deferred(_) => false,
        }
    }
}

impl From<Value> for HandlerOutcome {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Deferred> for HandlerOutcome {
    fn from(deferred: Deferred) -> Self {
        Self::Deferred(deferred)
    }
}

/// Everything a handler sees when invoked
pub struct HandlerCall<'a> {
    /// The triggering event, absent for programmatic invocations
    pub event: Option<&'a EventObject>,
    /// Previous stage output (state chains) or the event detail (controls)
    pub input: Value,
    pub element: ElementId,
    /// Immutable state snapshot, possibly extended with item scope
    pub scope: &'a StateView,
}

/// Named handler supplied by the host
pub type HandlerFn = Rc<dyn Fn(HandlerCall<'_>) -> HandlerOutcome>;

/// Named renderer supplied by the host
///
/// Invoked with the bound key's current value and the element to render
/// into; the default renderer (value as text) applies when a view
/// directive's name resolves to no renderer.
pub type RendererFn = Rc<dyn Fn(&Value, ElementId, &mut ElementTree)>;

/// Name resolution seam between the compiler and the host application
pub trait ModuleHost {
    fn resolve_handler(&self, name: &str) -> Option<HandlerFn>;
    fn resolve_renderer(&self, name: &str) -> Option<RendererFn>;
}

/// Table-backed [`ModuleHost`]
#[derive(Default)]
pub struct HostRegistry {
    handlers: FxHashMap<String, HandlerFn>,
    renderers: FxHashMap<String, RendererFn>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style handler registration
    pub fn handler(
        mut self,
        name: &str,
        handler: impl Fn(HandlerCall<'_>) -> HandlerOutcome + 'static,
    ) -> Self {
        self.insert_handler(name, handler);
        self
    }

    /// Builder-style renderer registration
    pub fn renderer(
        mut self,
        name: &str,
        renderer: impl Fn(&Value, ElementId, &mut ElementTree) + 'static,
    ) -> Self {
        self.insert_renderer(name, renderer);
        self
    }

    pub fn insert_handler(
        &mut self,
        name: &str,
        handler: impl Fn(HandlerCall<'_>) -> HandlerOutcome + 'static,
    ) {
        self.handlers.insert(name.to_string(), Rc::new(handler));
    }

    pub fn insert_renderer(
        &mut self,
        name: &str,
        renderer: impl Fn(&Value, ElementId, &mut ElementTree) + 'static,
    ) {
        self.renderers.insert(name.to_string(), Rc::new(renderer));
    }
}

impl ModuleHost for HostRegistry {
    fn resolve_handler(&self, name: &str) -> Option<HandlerFn> {
        self.handlers.get(name).cloned()
    }

    fn resolve_renderer(&self, name: &str) -> Option<RendererFn> {
        self.renderers.get(name).cloned()
    }
}
