//! Binding Registry - state keys to ordered render callbacks
//!
//! The registry is the bridge between store notifications and element
//! updates. The first render registered for a key subscribes to the store
//! once; every later registration appends to an ordered list, and all of
//! them run on every change to that key, in registration order.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::element::{ElementId, ElementTree};
use crate::error::Result;
use crate::store::ReactiveStore;
use crate::value::Value;

/// A render callback invoked with the new value of its key
pub type RenderFn = Rc<dyn Fn(&Value)>;

/// An element-aware render callback: `(value, element, key)`
pub type ElementRenderFn = Rc<dyn Fn(&Value, ElementId, &str)>;

struct RenderEntry {
    /// Element this render writes to, when bound through an element
    element: Option<ElementId>,
    render: RenderFn,
}

struct RegistryInner {
    renders: FxHashMap<String, SmallVec<[RenderEntry; 2]>>,
    /// Keys with a live store subscription; survives unbind_all so a key
    /// is never subscribed twice
    subscribed: FxHashSet<String>,
}

/// Key-to-render-callback subscription table
#[derive(Clone)]
pub struct BindingRegistry {
    inner: Rc<RefCell<RegistryInner>>,
    store: ReactiveStore,
    tree: Rc<RefCell<ElementTree>>,
}

impl BindingRegistry {
    pub fn new(store: ReactiveStore, tree: Rc<RefCell<ElementTree>>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(RegistryInner {
                renders: FxHashMap::default(),
                subscribed: FxHashSet::default(),
            })),
            store,
            tree,
        }
    }

    /// Register a render callback for a key
    pub fn register_render(&self, key: &str, render: RenderFn) -> Result<()> {
        self.register(key, None, render)
    }

    fn register(&self, key: &str, element: Option<ElementId>, render: RenderFn) -> Result<()> {
        let needs_subscription = {
            let mut inner = self.inner.borrow_mut();
            inner
                .renders
                .entry(key.to_string())
                .or_default()
                .push(RenderEntry { element, render });
            inner.subscribed.insert(key.to_string())
        };

        if needs_subscription {
            let weak: Weak<RefCell<RegistryInner>> = Rc::downgrade(&self.inner);
            let key_owned = key.to_string();
            self.store.listen(
                key,
                Rc::new(move |value| {
                    let Some(inner) = weak.upgrade() else { return };
                    let callbacks: Vec<RenderFn> = inner
                        .borrow()
                        .renders
                        .get(&key_owned)
                        .map(|entries| entries.iter().map(|e| e.render.clone()).collect())
                        .unwrap_or_default();
                    for callback in callbacks {
                        callback(value);
                    }
                }),
            )?;
        }
        Ok(())
    }

    /// Bind a key's value to an element
    ///
    /// Without a custom render the value is written as the element's text;
    /// a supplied `render(value, element, key)` overrides that.
    pub fn bind_render_to_element(
        &self,
        key: &str,
        element: ElementId,
        render: Option<ElementRenderFn>,
    ) -> Result<()> {
        let key_owned = key.to_string();
        let callback: RenderFn = match render {
            Some(custom) => Rc::new(move |value| custom(value, element, &key_owned)),
            None => {
                let tree = self.tree.clone();
                Rc::new(move |value| {
                    if let Some(node) = tree.borrow_mut().get_mut(element) {
                        node.text = value.to_text();
                    }
                })
            }
        };
        self.register(key, Some(element), callback)
    }

    /// Remove one render callback for a key (identity comparison)
    pub fn remove_render_for_key(&self, key: &str, render: &RenderFn) {
        let mut inner = self.inner.borrow_mut();
        if let Some(entries) = inner.renders.get_mut(key) {
            entries.retain(|e| !Rc::ptr_eq(&e.render, render));
            if entries.is_empty() {
                inner.renders.remove(key);
            }
        }
    }

    /// Drop every render bound through the given element
    ///
    /// Used when list re-renders discard stale clones, so their bindings
    /// do not accumulate across replace-all passes.
    pub fn remove_renders_for_element(&self, element: ElementId) {
        let mut inner = self.inner.borrow_mut();
        inner.renders.retain(|_, entries| {
            entries.retain(|e| e.element != Some(element));
            !entries.is_empty()
        });
    }

    /// Drop every render binding (teardown)
    pub fn unbind_all(&self) {
        self.inner.borrow_mut().renders.clear();
    }

    /// Number of render callbacks currently registered for a key
    pub fn render_count(&self, key: &str) -> usize {
        self.inner
            .borrow()
            .renders
            .get(key)
            .map(|e| e.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn setup() -> (ReactiveStore, Rc<RefCell<ElementTree>>, BindingRegistry) {
        let mut initial = IndexMap::new();
        initial.insert("count".to_string(), Value::from(0));
        let store = ReactiveStore::new(initial);
        let tree = Rc::new(RefCell::new(ElementTree::new()));
        let registry = BindingRegistry::new(store.clone(), tree.clone());
        (store, tree, registry)
    }

    #[test]
    fn test_renders_fire_in_registration_order() {
        let (store, _tree, registry) = setup();
        let order: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));

        for tag in [1u8, 2, 3] {
            let order = order.clone();
            registry
                .register_render("count", Rc::new(move |_| order.borrow_mut().push(tag)))
                .unwrap();
        }

        store.set_state("count", Value::from(1)).unwrap();
        assert_eq!(*order.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn test_default_render_writes_text() {
        let (store, tree, registry) = setup();
        let el = {
            let mut t = tree.borrow_mut();
            let root = t.root();
            let el = t.create_element("span");
            t.append_child(root, el);
            el
        };

        registry.bind_render_to_element("count", el, None).unwrap();
        store.set_state("count", Value::from(7)).unwrap();

        assert_eq!(tree.borrow().text(el), "7");
    }

    #[test]
    fn test_custom_render_overrides_default() {
        let (store, tree, registry) = setup();
        let el = {
            let mut t = tree.borrow_mut();
            let root = t.root();
            let el = t.create_element("span");
            t.append_child(root, el);
            el
        };

        let tree2 = tree.clone();
        registry
            .bind_render_to_element(
                "count",
                el,
                Some(Rc::new(move |value, el, key| {
                    if let Some(node) = tree2.borrow_mut().get_mut(el) {
                        node.text = format!("{key}={value}");
                    }
                })),
            )
            .unwrap();

        store.set_state("count", Value::from(3)).unwrap();
        assert_eq!(tree.borrow().text(el), "count=3");
    }

    #[test]
    fn test_remove_render_for_key() {
        let (store, _tree, registry) = setup();
        let hits = Rc::new(RefCell::new(0));
        let render: RenderFn = {
            let hits = hits.clone();
            Rc::new(move |_| *hits.borrow_mut() += 1)
        };

        registry.register_render("count", render.clone()).unwrap();
        store.set_state("count", Value::from(1)).unwrap();
        assert_eq!(*hits.borrow(), 1);

        registry.remove_render_for_key("count", &render);
        store.set_state("count", Value::from(2)).unwrap();
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn test_unbind_all_then_reregister_fires_once() {
        let (store, _tree, registry) = setup();
        let hits = Rc::new(RefCell::new(0));

        {
            let hits = hits.clone();
            registry
                .register_render("count", Rc::new(move |_| *hits.borrow_mut() += 1))
                .unwrap();
        }
        registry.unbind_all();
        {
            let hits = hits.clone();
            registry
                .register_render("count", Rc::new(move |_| *hits.borrow_mut() += 1))
                .unwrap();
        }

        // the store subscription is shared, so the single live render
        // runs exactly once per change
        store.set_state("count", Value::from(1)).unwrap();
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn test_remove_renders_for_element() {
        let (store, tree, registry) = setup();
        let el = {
            let mut t = tree.borrow_mut();
            let root = t.root();
            let el = t.create_element("li");
            t.append_child(root, el);
            el
        };

        registry.bind_render_to_element("count", el, None).unwrap();
        assert_eq!(registry.render_count("count"), 1);

        registry.remove_renders_for_element(el);
        assert_eq!(registry.render_count("count"), 0);

        store.set_state("count", Value::from(5)).unwrap();
        assert_eq!(tree.borrow().text(el), "");
    }
}
