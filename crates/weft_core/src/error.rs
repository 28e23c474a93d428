//! Error types for the weft runtime

use thiserror::Error;

use crate::element::ElementId;

/// Errors surfaced by the weft core and directive engine
#[derive(Error, Debug)]
pub enum WeftError {
    /// Attempted to write or delete through a read-only state view
    #[error("state is read-only; use `set_state` to update `{0}`")]
    ImmutableViolation(String),

    /// State keys must be non-empty strings
    #[error("state key must be a non-empty string")]
    InvalidKey,

    /// A resolved capability cannot be invoked in the requested role
    #[error("`{0}` is not invocable in this role")]
    NotCallable(String),

    /// An (element, event) pair already has an active binding
    #[error("event `{event}` is already bound to element {element:?}; detach it first")]
    DuplicateBinding { element: ElementId, event: String },

    /// Detach requested for an (element, event) pair with no binding
    #[error("no handler found for event `{event}` on element {element:?}")]
    UnboundEvent { element: ElementId, event: String },

    /// The target is not a valid element in the tree
    #[error("target is not a valid element")]
    TypeMismatch,

    /// Event names must be non-empty strings
    #[error("event name must be a non-empty string")]
    InvalidName,

    /// A directive expression used an operator outside the grammar
    #[error("unknown operator `{0}` in directive expression")]
    UnknownOperator(char),

    /// A list directive was placed on a non-template element
    #[error("list directive requires a template element")]
    InvalidTarget,

    /// A hard-stop chain stage produced an invalid value
    #[error("hard stop: handler `{0}` produced an invalid value")]
    ChainHardStop(String),
}

/// Result type for weft operations
pub type Result<T> = std::result::Result<T, WeftError>;
