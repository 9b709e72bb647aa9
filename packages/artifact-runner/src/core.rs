//! Core types shared by the bus, the natures and the runners.
//!
//! # Overview
//!
//! - [`Payload`] = what travels with an event (a JSON value)
//! - [`EventType`] = what a listener is registered for (exact, all, pattern)
//! - [`EventMeta`] = who dispatched, and under which type
//! - [`Listener`] = a shareable callback with pointer identity
//!
//! Everything here is single-threaded: handles are `Rc`, not `Arc`.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::RunnerError;

/// Event payload. Listeners receive `{}` when nothing was dispatched.
pub type Payload = Value;

/// Detail attached to a state.
pub type Detail = Map<String, Value>;

/// The key that matches every dispatched type.
pub const ALL_TYPES: &str = "*";

/// Type erasure helper for downcasting trait objects.
///
/// Implemented for every `'static` type, so trait objects whose trait
/// extends `AsAny` can be turned back into their concrete type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// Event Type
// =============================================================================

/// What a listener is registered for.
///
/// Patterns are matched against the dispatched type string at dispatch
/// time, not at registration time.
#[derive(Clone)]
pub enum EventType {
    /// One concrete type, e.g. `"onReady"`.
    Exact(String),
    /// Every dispatched type (`"*"`).
    All,
    /// Every type matched by the regular expression.
    Pattern(Regex),
}

impl EventType {
    /// Compile a pattern type.
    ///
    /// An invalid expression is a configuration error and is returned as-is.
    pub fn pattern(source: &str) -> Result<Self, RunnerError> {
        Regex::new(source)
            .map(EventType::Pattern)
            .map_err(|source_err| RunnerError::InvalidPattern {
                pattern: source.to_string(),
                source: source_err,
            })
    }

    /// Registry key: the type string, `"*"`, or the pattern source.
    pub fn key(&self) -> &str {
        match self {
            EventType::Exact(name) => name,
            EventType::All => ALL_TYPES,
            EventType::Pattern(regex) => regex.as_str(),
        }
    }

    /// An empty exact type stands for "no type given".
    pub(crate) fn is_missing(&self) -> bool {
        self.key().is_empty()
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        if value == ALL_TYPES {
            EventType::All
        } else {
            EventType::Exact(value.to_string())
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        if value == ALL_TYPES {
            EventType::All
        } else {
            EventType::Exact(value)
        }
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Exact(name) => write!(f, "Exact({name:?})"),
            EventType::All => write!(f, "All"),
            EventType::Pattern(regex) => write!(f, "Pattern(/{}/)", regex.as_str()),
        }
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (EventType::Exact(a), EventType::Exact(b)) => a == b,
            (EventType::All, EventType::All) => true,
            (EventType::Pattern(a), EventType::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

// =============================================================================
// Event Meta
// =============================================================================

/// Metadata handed to every listener next to the payload.
#[derive(Clone, Debug)]
pub struct EventMeta<T> {
    /// The object that dispatched the event.
    pub target: T,
    /// The dispatched type (never a pattern).
    pub event_type: String,
}

impl<T> EventMeta<T> {
    pub fn new(target: T, event_type: impl Into<String>) -> Self {
        Self {
            target,
            event_type: event_type.into(),
        }
    }
}

// =============================================================================
// Listener
// =============================================================================

type ListenerFn<T> = dyn Fn(&Payload, &EventMeta<T>);

/// A shareable event callback.
///
/// Identity is the identity of the underlying allocation: a clone of a
/// listener is the same listener, two listeners built from the same
/// closure body are not.
pub struct Listener<T> {
    callback: Rc<ListenerFn<T>>,
}

impl<T> Listener<T> {
    pub fn new(callback: impl Fn(&Payload, &EventMeta<T>) + 'static) -> Self {
        Self {
            callback: Rc::new(callback),
        }
    }

    /// Bind a receiver to the callback.
    pub fn with_scope<S: 'static>(
        scope: S,
        callback: impl Fn(&S, &Payload, &EventMeta<T>) + 'static,
    ) -> Self {
        Self::new(move |payload, meta| callback(&scope, payload, meta))
    }

    pub fn call(&self, payload: &Payload, meta: &EventMeta<T>) {
        (self.callback)(payload, meta)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.callback, &other.callback)
    }
}

impl<T> Clone for Listener<T> {
    fn clone(&self) -> Self {
        Self {
            callback: Rc::clone(&self.callback),
        }
    }
}

impl<T> fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("ptr", &Rc::as_ptr(&self.callback).cast::<()>())
            .finish()
    }
}
