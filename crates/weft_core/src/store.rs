//! Reactive value store with per-key change notification
//!
//! The store owns one component's state mapping. Writes go through
//! [`ReactiveStore::set_state`] and synchronously notify the listeners
//! registered for that key, in registration order. Reads hand out clones
//! or an immutable [`StateView`]; nested containers are exposed through
//! [`ObservableContainer`], a path-addressed wrapper whose mutations
//! notify the *owning top-level key*.
//!
//! Ownership is single-threaded by design (`Rc<RefCell<..>>`): every
//! mutation happens on the UI thread in direct response to an event, and
//! no interior borrow is held across a listener callback, so listeners
//! may freely re-enter the store.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::{Result, WeftError};
use crate::value::Value;

/// Callback invoked with the new value when a state key changes
pub type ListenerFn = Rc<dyn Fn(&Value)>;

struct StoreInner {
    state: IndexMap<String, Value>,
    initial: IndexMap<String, Value>,
    listeners: FxHashMap<String, SmallVec<[ListenerFn; 2]>>,
    destroyed: bool,
}

/// Cheap-to-clone handle over a component's reactive state
#[derive(Clone)]
pub struct ReactiveStore {
    inner: Rc<RefCell<StoreInner>>,
}

impl ReactiveStore {
    pub fn new(initial: IndexMap<String, Value>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                state: initial.clone(),
                initial,
                listeners: FxHashMap::default(),
                destroyed: false,
            })),
        }
    }

    /// Write a key and synchronously notify its listeners
    ///
    /// Writes against a destroyed store are inert: mid-teardown mutation
    /// must not fault and must not notify.
    pub fn set_state(&self, key: &str, value: Value) -> Result<()> {
        if key.is_empty() {
            return Err(WeftError::InvalidKey);
        }
        {
            let mut inner = self.inner.borrow_mut();
            if inner.destroyed {
                tracing::debug!(key, "set_state on destroyed store ignored");
                return Ok(());
            }
            inner.state.insert(key.to_string(), value);
        }
        self.notify(key);
        Ok(())
    }

    /// Clone of the current value for a key
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.borrow().state.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.borrow().state.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().state.keys().cloned().collect()
    }

    /// Immutable snapshot of the whole state mapping
    pub fn state_view(&self) -> StateView {
        StateView::new(self.inner.borrow().state.clone())
    }

    /// Deep-reactive wrapper over a top-level container value
    ///
    /// Returns `None` when the key is absent or holds a scalar.
    pub fn container(&self, key: &str) -> Option<ObservableContainer> {
        let inner = self.inner.borrow();
        match inner.state.get(key) {
            Some(v) if v.is_container() => Some(ObservableContainer {
                store: self.clone(),
                key: key.to_string(),
                path: Vec::new(),
            }),
            _ => None,
        }
    }

    /// Register a change listener for a key
    pub fn listen(&self, key: &str, callback: ListenerFn) -> Result<()> {
        if key.is_empty() {
            return Err(WeftError::InvalidKey);
        }
        self.inner
            .borrow_mut()
            .listeners
            .entry(key.to_string())
            .or_default()
            .push(callback);
        Ok(())
    }

    /// Restore the listed keys to their initial values, notifying
    ///
    /// Keys that were not part of the initial mapping are skipped with a
    /// warning.
    pub fn reset(&self, keys: &[&str]) {
        for &key in keys {
            let restored = {
                let inner = self.inner.borrow();
                match inner.initial.get(key) {
                    Some(v) => v.clone(),
                    None => {
                        tracing::warn!(key, "reset skipped: key has no initial value");
                        continue;
                    }
                }
            };
            let _ = self.set_state(key, restored);
        }
    }

    /// Restore every key to its initial value
    pub fn reset_all(&self) {
        let keys: Vec<String> = self.inner.borrow().initial.keys().cloned().collect();
        for key in keys {
            self.reset(&[key.as_str()]);
        }
    }

    /// Clear all listeners and invalidate the store
    pub fn destroy(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.listeners.clear();
        inner.state.clear();
        inner.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.borrow().destroyed
    }

    /// Invoke listeners for `key` with its current value
    ///
    /// The interior borrow is released before any callback runs, so
    /// callbacks may write back into the store.
    pub(crate) fn notify(&self, key: &str) {
        let (value, callbacks) = {
            let inner = self.inner.borrow();
            let Some(value) = inner.state.get(key).cloned() else {
                return;
            };
            let callbacks: SmallVec<[ListenerFn; 2]> = inner
                .listeners
                .get(key)
                .map(|l| l.clone())
                .unwrap_or_default();
            (value, callbacks)
        };
        for callback in callbacks {
            callback(&value);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StateView
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable snapshot of state handed to handlers and render callbacks
///
/// Mutation attempts fail with `ImmutableViolation`; the only write path
/// into live state is `ReactiveStore::set_state`. Views can be extended
/// (`with_entry`) to build merged scopes, which never touches live state.
#[derive(Clone, Debug, Default)]
pub struct StateView {
    entries: IndexMap<String, Value>,
}

impl StateView {
    pub fn new(entries: IndexMap<String, Value>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Dotted-path lookup: the first segment names a top-level key
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        match path.split_once('.') {
            Some((head, rest)) => self.entries.get(head)?.lookup_path(rest),
            None => self.entries.get(path),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes through a view always fail
    pub fn set(&self, key: &str, _value: Value) -> Result<()> {
        Err(WeftError::ImmutableViolation(key.to_string()))
    }

    /// Deletes through a view always fail
    pub fn remove(&self, key: &str) -> Result<()> {
        Err(WeftError::ImmutableViolation(key.to_string()))
    }

    /// Derive a new view with one extra entry (scope merging)
    pub fn with_entry(mut self, key: &str, value: Value) -> Self {
        self.entries.insert(key.to_string(), value);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ObservableContainer
// ─────────────────────────────────────────────────────────────────────────────

/// One step of a path into a nested container
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathStep {
    Field(String),
    Index(usize),
}

/// Deep-reactive wrapper over a container nested inside a top-level key
///
/// Reads hand out clones (or further wrappers via `enter`/`at`); every
/// mutator writes through to the store and notifies the owning top-level
/// key, not a nested path.
#[derive(Clone)]
pub struct ObservableContainer {
    store: ReactiveStore,
    key: String,
    path: Vec<PathStep>,
}

impl ObservableContainer {
    /// The owning top-level state key
    pub fn key(&self) -> &str {
        &self.key
    }

    fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for step in &self.path {
            current = match (step, current) {
                (PathStep::Field(name), Value::Map(m)) => m.get(name)?,
                (PathStep::Index(i), Value::List(l)) => l.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    fn resolve_mut<'a>(&self, root: &'a mut Value) -> Option<&'a mut Value> {
        let mut current = root;
        for step in &self.path {
            current = match (step, current) {
                (PathStep::Field(name), Value::Map(m)) => m.get_mut(name)?,
                (PathStep::Index(i), Value::List(l)) => l.get_mut(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Clone of the wrapped container
    pub fn snapshot(&self) -> Option<Value> {
        let inner = self.store.inner.borrow();
        let root = inner.state.get(&self.key)?;
        self.resolve(root).cloned()
    }

    /// Clone of a map field
    pub fn get(&self, field: &str) -> Option<Value> {
        self.snapshot()?.as_map()?.get(field).cloned()
    }

    /// Clone of a list item
    pub fn at(&self, index: usize) -> Option<Value> {
        self.snapshot()?.as_list()?.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        match self.snapshot() {
            Some(Value::List(l)) => l.len(),
            Some(Value::Map(m)) => m.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Descend into a nested container field
    pub fn enter(&self, field: &str) -> Option<ObservableContainer> {
        if !self.get(field)?.is_container() {
            return None;
        }
        let mut path = self.path.clone();
        path.push(PathStep::Field(field.to_string()));
        Some(ObservableContainer {
            store: self.store.clone(),
            key: self.key.clone(),
            path,
        })
    }

    /// Descend into a nested container item
    pub fn enter_index(&self, index: usize) -> Option<ObservableContainer> {
        if !self.at(index)?.is_container() {
            return None;
        }
        let mut path = self.path.clone();
        path.push(PathStep::Index(index));
        Some(ObservableContainer {
            store: self.store.clone(),
            key: self.key.clone(),
            path,
        })
    }

    /// Write a map field, notifying the owning key
    pub fn set_field(&self, field: &str, value: Value) -> Result<()> {
        self.mutate(|target| match target.as_map_mut() {
            Some(m) => {
                m.insert(field.to_string(), value);
                Ok(())
            }
            None => Err(WeftError::TypeMismatch),
        })
    }

    /// Write a list index, notifying the owning key
    ///
    /// Indices past the end extend the list, padding with nulls.
    pub fn set_index(&self, index: usize, value: Value) -> Result<()> {
        self.mutate(|target| match target.as_list_mut() {
            Some(l) => {
                if index >= l.len() {
                    l.resize(index + 1, Value::Null);
                }
                l[index] = value;
                Ok(())
            }
            None => Err(WeftError::TypeMismatch),
        })
    }

    /// Append to a list, notifying the owning key
    pub fn push(&self, value: Value) -> Result<()> {
        self.mutate(|target| match target.as_list_mut() {
            Some(l) => {
                l.push(value);
                Ok(())
            }
            None => Err(WeftError::TypeMismatch),
        })
    }

    /// Change a list's length (truncate or pad with nulls), notifying
    pub fn set_len(&self, len: usize) -> Result<()> {
        self.mutate(|target| match target.as_list_mut() {
            Some(l) => {
                l.resize(len, Value::Null);
                Ok(())
            }
            None => Err(WeftError::TypeMismatch),
        })
    }

    /// Deleting fields through the wrapper is not allowed
    pub fn remove_field(&self, field: &str) -> Result<()> {
        Err(WeftError::ImmutableViolation(field.to_string()))
    }

    fn mutate(&self, f: impl FnOnce(&mut Value) -> Result<()>) -> Result<()> {
        {
            let mut inner = self.store.inner.borrow_mut();
            if inner.destroyed {
                tracing::debug!(key = %self.key, "container write on destroyed store ignored");
                return Ok(());
            }
            let root = inner.state.get_mut(&self.key).ok_or(WeftError::InvalidKey)?;
            let target = self.resolve_mut(root).ok_or(WeftError::TypeMismatch)?;
            f(target)?;
        }
        self.store.notify(&self.key);
        Ok(())
    }
}
