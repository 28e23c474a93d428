//! Weft Core Runtime
//!
//! This crate provides the foundational primitives for the Weft binding
//! engine:
//!
//! - **Reactive Store**: Top-level keyed state with change notification
//! - **Binding Registry**: Per-key render callbacks driven by the store
//! - **Event Pipeline**: Element event bindings plus a publish/subscribe bus
//! - **Element Tree**: The retained host-element arena directives bind to
//! - **Deferred Tasks**: Settle-once handles for asynchronous handlers
//!
//! # Example
//!
//! ```rust
//! use weft_core::{ReactiveStore, Value};
//! use indexmap::IndexMap;
//!
//! let mut initial = IndexMap::new();
//! initial.insert("count".to_string(), Value::from(0));
//! let store = ReactiveStore::new(initial);
//!
//! store.listen("count", std::rc::Rc::new(|value| {
//!     println!("count is now {value}");
//! })).unwrap();
//!
//! store.set_state("count", Value::from(5)).unwrap();
//! assert_eq!(store.get("count"), Some(Value::Int(5)));
//! ```

pub mod bindings;
pub mod element;
pub mod error;
pub mod events;
pub mod store;
pub mod task;
pub mod value;

pub use bindings::{BindingRegistry, ElementRenderFn, RenderFn};
pub use element::{ElementId, ElementNode, ElementTree};
pub use error::{Result, WeftError};
pub use events::{BusFn, ElementHandlerFn, EventObject, EventPipeline, PipelineHandle};
pub use store::{ListenerFn, ObservableContainer, PathStep, ReactiveStore, StateView};
pub use task::{Deferred, Settled};
pub use value::Value;
