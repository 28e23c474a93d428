//! Event Pipeline - element event bindings and the publish/subscribe bus
//!
//! Two independent channels share one teardown:
//!
//! - **Element events**: at most one handler per `(element, event)` pair,
//!   wrapped to receive `(event, element, state snapshot)` and delivered
//!   through [`EventPipeline::fire`].
//! - **Bus**: an in-process publish/subscribe channel (`on` / `off` /
//!   `dispatch`) used for intra- and cross-directive signaling.
//!
//! `cleanup_events` detaches both; dispatching after cleanup is a silent
//! no-op so in-flight async continuations can land harmlessly.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::element::{ElementId, ElementTree};
use crate::error::{Result, WeftError};
use crate::store::{ReactiveStore, StateView};
use crate::value::Value;

/// An event delivered to an element handler
#[derive(Clone, Debug)]
pub struct EventObject {
    pub name: String,
    pub detail: Value,
}

impl EventObject {
    pub fn new(name: &str, detail: Value) -> Self {
        Self {
            name: name.to_string(),
            detail,
        }
    }
}

/// Element event handler: `(event, element, state snapshot)`
///
/// Hard-stop chain failures propagate out of [`EventPipeline::fire`]
/// through this return value.
pub type ElementHandlerFn = Rc<dyn Fn(&EventObject, ElementId, &StateView) -> Result<()>>;

/// Bus subscriber, invoked with the dispatched detail
pub type BusFn = Rc<dyn Fn(&Value)>;

struct PipelineInner {
    handlers: FxHashMap<(ElementId, String), ElementHandlerFn>,
    bus: FxHashMap<String, SmallVec<[BusFn; 2]>>,
    cleaned: bool,
}

/// Element-event binding table plus the publish/subscribe bus
#[derive(Clone)]
pub struct EventPipeline {
    inner: Rc<RefCell<PipelineInner>>,
    store: ReactiveStore,
    tree: Rc<RefCell<ElementTree>>,
}

impl EventPipeline {
    pub fn new(store: ReactiveStore, tree: Rc<RefCell<ElementTree>>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(PipelineInner {
                handlers: FxHashMap::default(),
                bus: FxHashMap::default(),
                cleaned: false,
            })),
            store,
            tree,
        }
    }

    fn validate_element(&self, element: ElementId) -> Result<()> {
        if self.tree.borrow().contains(element) {
            Ok(())
        } else {
            Err(WeftError::TypeMismatch)
        }
    }

    fn validate_event_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            Err(WeftError::InvalidName)
        } else {
            Ok(())
        }
    }

    /// Bind a handler to an `(element, event)` pair
    ///
    /// Rebinding without an explicit detach fails with `DuplicateBinding`.
    pub fn bind_element_event(
        &self,
        element: ElementId,
        event: &str,
        handler: ElementHandlerFn,
    ) -> Result<()> {
        self.validate_element(element)?;
        Self::validate_event_name(event)?;

        let mut inner = self.inner.borrow_mut();
        let slot = (element, event.to_string());
        if inner.handlers.contains_key(&slot) {
            return Err(WeftError::DuplicateBinding {
                element,
                event: event.to_string(),
            });
        }
        inner.handlers.insert(slot, handler);
        Ok(())
    }

    /// Detach one `(element, event)` binding
    ///
    /// Detaching a pair that has no binding is a contract violation,
    /// mirroring `DuplicateBinding` on the bind side.
    pub fn detach_element_event(&self, element: ElementId, event: &str) -> Result<()> {
        self.validate_element(element)?;
        Self::validate_event_name(event)?;

        let removed = self
            .inner
            .borrow_mut()
            .handlers
            .remove(&(element, event.to_string()));
        if removed.is_none() {
            return Err(WeftError::UnboundEvent {
                element,
                event: event.to_string(),
            });
        }
        Ok(())
    }

    /// Detach every event binding held for one element
    pub fn detach_all_events(&self, element: ElementId) {
        self.inner
            .borrow_mut()
            .handlers
            .retain(|(el, _), _| *el != element);
    }

    /// Subscribe to a bus event
    pub fn on(&self, event: &str, callback: BusFn) -> Result<()> {
        Self::validate_event_name(event)?;
        self.inner
            .borrow_mut()
            .bus
            .entry(event.to_string())
            .or_default()
            .push(callback);
        Ok(())
    }

    /// Unsubscribe from a bus event (identity comparison)
    pub fn off(&self, event: &str, callback: &BusFn) {
        let mut inner = self.inner.borrow_mut();
        if let Some(subscribers) = inner.bus.get_mut(event) {
            subscribers.retain(|s| !Rc::ptr_eq(s, callback));
            if subscribers.is_empty() {
                inner.bus.remove(event);
            }
        }
    }

    /// Publish a detail value to every subscriber of `event`
    pub fn dispatch(&self, event: &str, detail: Value) {
        dispatch_on(&self.inner, event, detail);
    }

    /// Weak handle for continuations that may outlive the pipeline
    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to the handler bound for `(element, event)`
    ///
    /// This is the entry point the hosting environment calls when the
    /// platform reports an interaction. The handler receives the event,
    /// the element, and an immutable state snapshot taken at delivery.
    pub fn fire(&self, element: ElementId, event: &str, detail: Value) -> Result<()> {
        self.validate_element(element)?;
        Self::validate_event_name(event)?;

        let handler = self
            .inner
            .borrow()
            .handlers
            .get(&(element, event.to_string()))
            .cloned();
        let Some(handler) = handler else {
            tracing::debug!(?element, event, "no handler bound; event dropped");
            return Ok(());
        };

        let event_object = EventObject::new(event, detail);
        let snapshot = self.store.state_view();
        handler(&event_object, element, &snapshot)
    }

    /// Detach every element binding and bus subscription (teardown)
    pub fn cleanup_events(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.handlers.clear();
        inner.bus.clear();
        inner.cleaned = true;
    }

    pub fn is_cleaned(&self) -> bool {
        self.inner.borrow().cleaned
    }

    /// Number of live element bindings (teardown checks and tests)
    pub fn binding_count(&self) -> usize {
        self.inner.borrow().handlers.len()
    }
}

/// Weak pipeline reference held by deferred continuations
///
/// Dispatching through a handle whose pipeline is gone or cleaned up is a
/// logged no-op: in-flight continuations are never cancelled, they just
/// land against a cleared bus.
#[derive(Clone)]
pub struct PipelineHandle {
    inner: Weak<RefCell<PipelineInner>>,
}

impl PipelineHandle {
    pub fn dispatch(&self, event: &str, detail: Value) {
        match self.inner.upgrade() {
            Some(inner) => dispatch_on(&inner, event, detail),
            None => tracing::debug!(event, "dispatch after teardown ignored"),
        }
    }
}

fn dispatch_on(inner: &Rc<RefCell<PipelineInner>>, event: &str, detail: Value) {
    let subscribers: SmallVec<[BusFn; 2]> = {
        let inner = inner.borrow();
        if inner.cleaned {
            tracing::debug!(event, "dispatch on cleaned pipeline ignored");
            return;
        }
        inner.bus.get(event).map(|s| s.clone()).unwrap_or_default()
    };
    for subscriber in subscribers {
        subscriber(&detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn setup() -> (ReactiveStore, Rc<RefCell<ElementTree>>, EventPipeline, ElementId) {
        let mut initial = IndexMap::new();
        initial.insert("count".to_string(), Value::from(0));
        let store = ReactiveStore::new(initial);
        let tree = Rc::new(RefCell::new(ElementTree::new()));
        let el = {
            let mut t = tree.borrow_mut();
            let root = t.root();
            let el = t.create_element("button");
            t.append_child(root, el);
            el
        };
        let pipeline = EventPipeline::new(store.clone(), tree.clone());
        (store, tree, pipeline, el)
    }

    #[test]
    fn test_fire_delivers_event_and_snapshot() {
        let (_store, _tree, pipeline, el) = setup();
        let seen = Rc::new(RefCell::new(Vec::new()));

        {
            let seen = seen.clone();
            pipeline
                .bind_element_event(
                    el,
                    "click",
                    Rc::new(move |event, element, snapshot| {
                        seen.borrow_mut().push((
                            event.name.clone(),
                            element,
                            snapshot.get("count").cloned(),
                        ));
                        Ok(())
                    }),
                )
                .unwrap();
        }

        pipeline.fire(el, "click", Value::Null).unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![("click".to_string(), el, Some(Value::Int(0)))]
        );
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let (_store, _tree, pipeline, el) = setup();
        pipeline
            .bind_element_event(el, "click", Rc::new(|_, _, _| Ok(())))
            .unwrap();

        let err = pipeline
            .bind_element_event(el, "click", Rc::new(|_, _, _| Ok(())))
            .unwrap_err();
        assert!(matches!(err, WeftError::DuplicateBinding { .. }));

        // detach, then rebinding succeeds
        pipeline.detach_element_event(el, "click").unwrap();
        pipeline
            .bind_element_event(el, "click", Rc::new(|_, _, _| Ok(())))
            .unwrap();
    }

    #[test]
    fn test_validation_errors() {
        let (_store, tree, pipeline, el) = setup();

        assert!(matches!(
            pipeline.bind_element_event(el, "  ", Rc::new(|_, _, _| Ok(()))),
            Err(WeftError::InvalidName)
        ));

        let detached = tree.borrow_mut().create_element("div");
        tree.borrow_mut().remove(detached);
        assert!(matches!(
            pipeline.bind_element_event(detached, "click", Rc::new(|_, _, _| Ok(()))),
            Err(WeftError::TypeMismatch)
        ));

        assert!(matches!(pipeline.on("", Rc::new(|_| {})), Err(WeftError::InvalidName)));
    }

    #[test]
    fn test_detach_unbound_event_is_error() {
        let (_store, _tree, pipeline, el) = setup();

        let err = pipeline.detach_element_event(el, "click").unwrap_err();
        assert!(matches!(
            err,
            WeftError::UnboundEvent { element, event } if element == el && event == "click"
        ));

        // once bound, the first detach succeeds and the second errors again
        pipeline
            .bind_element_event(el, "click", Rc::new(|_, _, _| Ok(())))
            .unwrap();
        pipeline.detach_element_event(el, "click").unwrap();
        assert!(pipeline.detach_element_event(el, "click").is_err());
    }

    #[test]
    fn test_detach_all_events() {
        let (_store, _tree, pipeline, el) = setup();
        pipeline
            .bind_element_event(el, "click", Rc::new(|_, _, _| Ok(())))
            .unwrap();
        pipeline
            .bind_element_event(el, "change", Rc::new(|_, _, _| Ok(())))
            .unwrap();
        assert_eq!(pipeline.binding_count(), 2);

        pipeline.detach_all_events(el);
        assert_eq!(pipeline.binding_count(), 0);
    }

    #[test]
    fn test_bus_on_off_dispatch() {
        let (_store, _tree, pipeline, _el) = setup();
        let seen: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
        let callback: BusFn = {
            let seen = seen.clone();
            Rc::new(move |detail| seen.borrow_mut().push(detail.clone()))
        };

        pipeline.on("saved", callback.clone()).unwrap();
        pipeline.dispatch("saved", Value::from(1));
        pipeline.off("saved", &callback);
        pipeline.dispatch("saved", Value::from(2));

        assert_eq!(*seen.borrow(), vec![Value::Int(1)]);
    }

    #[test]
    fn test_cleanup_silences_bus_and_handlers() {
        let (_store, _tree, pipeline, el) = setup();
        let hits = Rc::new(RefCell::new(0));
        {
            let hits = hits.clone();
            pipeline
                .on("saved", Rc::new(move |_| *hits.borrow_mut() += 1))
                .unwrap();
        }
        pipeline
            .bind_element_event(el, "click", Rc::new(|_, _, _| Ok(())))
            .unwrap();

        pipeline.cleanup_events();
        assert!(pipeline.is_cleaned());

        pipeline.dispatch("saved", Value::Null);
        assert_eq!(*hits.borrow(), 0);
        // firing against a cleaned pipeline is a quiet drop
        pipeline.fire(el, "click", Value::Null).unwrap();
    }

    #[test]
    fn test_handle_outlives_pipeline_quietly() {
        let (_store, _tree, pipeline, _el) = setup();
        let handle = pipeline.handle();
        drop(pipeline);

        // must not panic or deliver anywhere
        handle.dispatch("saved", Value::Null);
    }
}
