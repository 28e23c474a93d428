//! Deferred tasks
//!
//! A [`Deferred`] is a single-threaded promise: a handler returns it while
//! work is still outstanding, and continuations attached with
//! [`Deferred::on_settle`] run when [`resolve`](Deferred::resolve) or
//! [`reject`](Deferred::reject) is called. There is no cancellation; a
//! continuation that lands after engine teardown dispatches into a cleaned
//! pipeline and is dropped there.

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::Value;

/// Final outcome of a deferred task
#[derive(Clone, Debug, PartialEq)]
pub enum Settled {
    Resolved(Value),
    Rejected(String),
}

enum DeferredState {
    Pending(Vec<Box<dyn FnOnce(&Settled)>>),
    Done(Settled),
}

/// A settle-once task handle with attached continuations
#[derive(Clone)]
pub struct Deferred {
    inner: Rc<RefCell<DeferredState>>,
}

impl Deferred {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(DeferredState::Pending(Vec::new()))),
        }
    }

    /// An already-resolved task (synchronous handlers on an async path)
    pub fn resolved(value: Value) -> Self {
        let deferred = Self::new();
        deferred.resolve(value);
        deferred
    }

    pub fn resolve(&self, value: Value) {
        self.settle(Settled::Resolved(value));
    }

    pub fn reject(&self, reason: impl Into<String>) {
        self.settle(Settled::Rejected(reason.into()));
    }

    fn settle(&self, outcome: Settled) {
        let continuations = {
            let mut state = self.inner.borrow_mut();
            match &mut *state {
                DeferredState::Pending(pending) => {
                    let continuations = std::mem::take(pending);
                    *state = DeferredState::Done(outcome.clone());
                    continuations
                }
                DeferredState::Done(_) => {
                    tracing::debug!("deferred settled twice; second outcome dropped");
                    return;
                }
            }
        };
        // borrow released before running continuations
        for continuation in continuations {
            continuation(&outcome);
        }
    }

    /// Attach a continuation; runs immediately if already settled
    pub fn on_settle(&self, continuation: impl FnOnce(&Settled) + 'static) {
        let settled = match &*self.inner.borrow() {
            DeferredState::Done(outcome) => Some(outcome.clone()),
            DeferredState::Pending(_) => None,
        };
        match settled {
            // borrow released; the outcome can never regress to pending
            Some(outcome) => continuation(&outcome),
            None => {
                if let DeferredState::Pending(pending) = &mut *self.inner.borrow_mut() {
                    pending.push(Box::new(continuation));
                }
            }
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(&*self.inner.borrow(), DeferredState::Done(_))
    }
}

impl Default for Deferred {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_runs_continuations_in_order() {
        let deferred = Deferred::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let seen = seen.clone();
            deferred.on_settle(move |outcome| {
                seen.borrow_mut().push((i, outcome.clone()));
            });
        }
        assert!(!deferred.is_settled());

        deferred.resolve(Value::from("done"));
        assert!(deferred.is_settled());
        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], (0, Settled::Resolved(Value::from("done"))));
        assert_eq!(seen[2].0, 2);
    }

    #[test]
    fn test_continuation_after_settle_runs_immediately() {
        let deferred = Deferred::resolved(Value::from(7));
        let seen = Rc::new(RefCell::new(None));
        {
            let seen = seen.clone();
            deferred.on_settle(move |outcome| *seen.borrow_mut() = Some(outcome.clone()));
        }
        assert_eq!(*seen.borrow(), Some(Settled::Resolved(Value::Int(7))));
    }

    #[test]
    fn test_second_settle_is_dropped() {
        let deferred = Deferred::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let seen = seen.clone();
            deferred.on_settle(move |outcome| seen.borrow_mut().push(outcome.clone()));
        }

        deferred.reject("boom");
        deferred.resolve(Value::from(1));
        assert_eq!(*seen.borrow(), vec![Settled::Rejected("boom".to_string())]);
    }

    #[test]
    fn test_reentrant_settle_from_continuation() {
        let deferred = Deferred::new();
        {
            let deferred = deferred.clone();
            let again = deferred.clone();
            deferred.on_settle(move |_| {
                // second settle from inside a continuation must not deadlock
                again.resolve(Value::Null);
            });
        }
        deferred.resolve(Value::from(1));
        assert!(deferred.is_settled());
    }
}
