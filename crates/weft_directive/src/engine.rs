//! Module engine
//!
//! Owns one store, registry, pipeline, and compiler over a shared element
//! tree, and ties their lifecycles together. Teardown runs exactly once,
//! unbinding renders, then events, then destroying the store; anything
//! arriving afterwards is silently dropped.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;
use weft_core::{
    BindingRegistry, BusFn, ElementId, ElementTree, EventPipeline, ReactiveStore, Result, Value,
};

use crate::compiler::{DirectiveCompiler, EngineOptions};
use crate::host::ModuleHost;

/// One compiled module instance
pub struct ModuleEngine {
    store: ReactiveStore,
    registry: BindingRegistry,
    pipeline: EventPipeline,
    tree: Rc<RefCell<ElementTree>>,
    compiler: DirectiveCompiler,
    torn_down: Cell<bool>,
}

impl ModuleEngine {
    pub fn new(
        tree: ElementTree,
        initial: IndexMap<String, Value>,
        host: Rc<dyn ModuleHost>,
        options: EngineOptions,
    ) -> Self {
        let tree = Rc::new(RefCell::new(tree));
        let store = ReactiveStore::new(initial);
        let registry = BindingRegistry::new(store.clone(), tree.clone());
        let pipeline = EventPipeline::new(store.clone(), tree.clone());
        let compiler = DirectiveCompiler::new(
            store.clone(),
            registry.clone(),
            pipeline.clone(),
            tree.clone(),
            host,
            options,
        );
        Self {
            store,
            registry,
            pipeline,
            tree,
            compiler,
            torn_down: Cell::new(false),
        }
    }

    /// Compile every directive in the tree
    pub fn parse(&self) -> Result<()> {
        self.compiler.parse(None)
    }

    /// Deliver a platform event to an element
    pub fn fire(&self, element: ElementId, event: &str, detail: Value) -> Result<()> {
        self.pipeline.fire(element, event, detail)
    }

    /// Subscribe to the bus
    pub fn on(&self, event: &str, callback: BusFn) -> Result<()> {
        self.pipeline.on(event, callback)
    }

    /// Publish on the bus
    pub fn dispatch(&self, event: &str, detail: Value) {
        self.pipeline.dispatch(event, detail);
    }

    pub fn set_state(&self, key: &str, value: Value) -> Result<()> {
        self.store.set_state(key, value)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.get(key)
    }

    /// Restore the named keys to their initial values
    pub fn reset(&self, keys: &[&str]) {
        self.store.reset(keys);
    }

    pub fn reset_all(&self) {
        self.store.reset_all();
    }

    pub fn store(&self) -> &ReactiveStore {
        &self.store
    }

    pub fn tree(&self) -> Rc<RefCell<ElementTree>> {
        self.tree.clone()
    }

    /// Unwind the module: renders, then events, then state
    ///
    /// Idempotent; `Drop` calls it as a backstop.
    pub fn teardown(&self) {
        if self.torn_down.replace(true) {
            return;
        }
        self.registry.unbind_all();
        self.pipeline.cleanup_events();
        self.store.destroy();
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.get()
    }
}

impl Drop for ModuleEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}
