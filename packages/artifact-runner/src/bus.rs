//! Synchronous listener registry for dispatching events.
//!
//! # Guarantees
//!
//! - **Synchronous fan-out**: `dispatch` invokes every matching listener
//!   before it returns
//! - **Priority order**: lower priorities run first, equal priorities keep
//!   registration order
//! - **Re-entrant**: a listener may dispatch again; the inner dispatch
//!   completes before the outer one continues
//!
//! # Matching
//!
//! A dispatch of type `t` reaches the listeners registered for exactly
//! `t`, the listeners registered for [`EventType::All`], and the listeners
//! of every [`EventType::Pattern`] that matches `t`.
//!
//! There is no cycle detection. A listener that dispatches the type it
//! listens to recurses until the stack runs out.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use regex::Regex;
use serde_json::{Map, Value};

use crate::core::{EventMeta, EventType, Listener, Payload, ALL_TYPES};

/// Default listener priority.
pub const DEFAULT_PRIORITY: i32 = 0;

struct Entry<T> {
    listener: Listener<T>,
    priority: i32,
    once: bool,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            listener: self.listener.clone(),
            priority: self.priority,
            once: self.once,
        }
    }
}

/// Where an entry lives, so `once` listeners can be removed after firing.
enum Bucket {
    Exact(String),
    Pattern(String),
}

struct Registry<T> {
    /// Exact types and the `"*"` bucket.
    exact: HashMap<String, Vec<Entry<T>>>,
    /// Pattern buckets in registration order.
    patterns: Vec<(Regex, Vec<Entry<T>>)>,
}

impl<T> Registry<T> {
    fn new() -> Self {
        Self {
            exact: HashMap::new(),
            patterns: Vec::new(),
        }
    }

    fn bucket_mut(&mut self, event_type: EventType) -> &mut Vec<Entry<T>> {
        match event_type {
            EventType::Pattern(regex) => {
                let position = self
                    .patterns
                    .iter()
                    .position(|(existing, _)| existing.as_str() == regex.as_str());
                let index = match position {
                    Some(index) => index,
                    None => {
                        self.patterns.push((regex, Vec::new()));
                        self.patterns.len() - 1
                    }
                };
                &mut self.patterns[index].1
            }
            other => self.exact.entry(other.key().to_string()).or_default(),
        }
    }

    fn remove(&mut self, bucket: &Bucket, listener: &Listener<T>) {
        match bucket {
            Bucket::Exact(key) => {
                if let Some(entries) = self.exact.get_mut(key) {
                    if let Some(index) = entries.iter().position(|e| e.listener.ptr_eq(listener)) {
                        entries.remove(index);
                    }
                    if entries.is_empty() {
                        self.exact.remove(key);
                    }
                }
            }
            Bucket::Pattern(source) => {
                if let Some(slot) = self
                    .patterns
                    .iter()
                    .position(|(regex, _)| regex.as_str() == source)
                {
                    let entries = &mut self.patterns[slot].1;
                    if let Some(index) = entries.iter().position(|e| e.listener.ptr_eq(listener)) {
                        entries.remove(index);
                    }
                    if entries.is_empty() {
                        self.patterns.remove(slot);
                    }
                }
            }
        }
    }
}

/// Listener registry with priority, wildcard and pattern dispatch.
///
/// `T` is the target handed to listeners in [`EventMeta::target`]; a
/// [`Nature`](crate::Nature) dispatches itself as the target.
///
/// Cloning an `EventBus` shares the registry.
///
/// # Example
///
/// ```ignore
/// let bus: EventBus<&'static str> = EventBus::new();
/// let listener = Listener::new(|payload, meta| {
///     println!("{} from {}: {payload}", meta.event_type, meta.target);
/// });
///
/// bus.on("signal", &listener);
/// assert!(bus.dispatch(&"dispatcher", "signal", Some(&json!({"foo": "bar"}))));
/// ```
pub struct EventBus<T> {
    registry: Rc<RefCell<Registry<T>>>,
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry::new())),
        }
    }

    /// Register a listener with the default priority.
    ///
    /// Registering the same listener twice for the same type is a no-op.
    pub fn on(&self, event_type: impl Into<EventType>, listener: &Listener<T>) -> &Self {
        self.add(event_type.into(), listener, DEFAULT_PRIORITY, false)
    }

    /// Register a listener; lower priorities are invoked first.
    pub fn on_with_priority(
        &self,
        event_type: impl Into<EventType>,
        listener: &Listener<T>,
        priority: i32,
    ) -> &Self {
        self.add(event_type.into(), listener, priority, false)
    }

    /// Register a listener that removes itself after its first invocation.
    pub fn once(&self, event_type: impl Into<EventType>, listener: &Listener<T>) -> &Self {
        self.add(event_type.into(), listener, DEFAULT_PRIORITY, true)
    }

    pub fn once_with_priority(
        &self,
        event_type: impl Into<EventType>,
        listener: &Listener<T>,
        priority: i32,
    ) -> &Self {
        self.add(event_type.into(), listener, priority, true)
    }

    /// Remove a listener. Removing the last listener of a type drops the type.
    pub fn off(&self, event_type: impl Into<EventType>, listener: &Listener<T>) -> &Self {
        let event_type = event_type.into();
        if event_type.is_missing() {
            return self;
        }
        let bucket = match &event_type {
            EventType::Pattern(regex) => Bucket::Pattern(regex.as_str().to_string()),
            other => Bucket::Exact(other.key().to_string()),
        };
        self.registry.borrow_mut().remove(&bucket, listener);
        self
    }

    /// Whether anything is registered under exactly this type (or pattern).
    pub fn has_listener(&self, event_type: impl Into<EventType>) -> bool {
        self.listener_count(event_type) > 0
    }

    /// Number of listeners registered under exactly this type (or pattern).
    pub fn listener_count(&self, event_type: impl Into<EventType>) -> usize {
        let event_type = event_type.into();
        let registry = self.registry.borrow();
        match &event_type {
            EventType::Pattern(regex) => registry
                .patterns
                .iter()
                .find(|(existing, _)| existing.as_str() == regex.as_str())
                .map_or(0, |(_, entries)| entries.len()),
            other => registry.exact.get(other.key()).map_or(0, Vec::len),
        }
    }

    fn add(&self, event_type: EventType, listener: &Listener<T>, priority: i32, once: bool) -> &Self {
        if event_type.is_missing() {
            return self;
        }
        let mut registry = self.registry.borrow_mut();
        let entries = registry.bucket_mut(event_type);
        if entries.iter().any(|e| e.listener.ptr_eq(listener)) {
            return self;
        }
        let index = entries
            .iter()
            .position(|e| e.priority > priority)
            .unwrap_or(entries.len());
        entries.insert(
            index,
            Entry {
                listener: listener.clone(),
                priority,
                once,
            },
        );
        self
    }

    /// Snapshot of everything a dispatch of `event_type` reaches, in call order.
    fn collect(&self, event_type: &str) -> Vec<(Bucket, Entry<T>)> {
        let registry = self.registry.borrow();
        let mut gathered = Vec::new();

        if let Some(entries) = registry.exact.get(event_type) {
            gathered.extend(
                entries
                    .iter()
                    .map(|e| (Bucket::Exact(event_type.to_string()), e.clone())),
            );
        }
        if event_type != ALL_TYPES {
            if let Some(entries) = registry.exact.get(ALL_TYPES) {
                gathered.extend(
                    entries
                        .iter()
                        .map(|e| (Bucket::Exact(ALL_TYPES.to_string()), e.clone())),
                );
            }
        }
        for (regex, entries) in &registry.patterns {
            if regex.is_match(event_type) {
                gathered.extend(
                    entries
                        .iter()
                        .map(|e| (Bucket::Pattern(regex.as_str().to_string()), e.clone())),
                );
            }
        }

        // Stable: exact, then all, then patterns among equal priorities.
        gathered.sort_by_key(|(_, entry)| entry.priority);
        gathered
    }
}

impl<T: Clone> EventBus<T> {
    /// Dispatch an event on behalf of `target`.
    ///
    /// Returns `true` if at least one listener was invoked. An empty type
    /// dispatches nothing.
    pub fn dispatch(&self, target: &T, event_type: &str, payload: Option<&Payload>) -> bool {
        if event_type.is_empty() {
            return false;
        }

        let gathered = self.collect(event_type);
        if gathered.is_empty() {
            return false;
        }

        let empty = Value::Object(Map::new());
        let payload = payload.unwrap_or(&empty);
        let meta = EventMeta::new(target.clone(), event_type);

        for (bucket, entry) in gathered {
            if entry.once {
                self.registry.borrow_mut().remove(&bucket, &entry.listener);
            }
            entry.listener.call(payload, &meta);
        }

        true
    }
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Rc::clone(&self.registry),
        }
    }
}

impl<T> fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.borrow();
        f.debug_struct("EventBus")
            .field("types", &registry.exact.len())
            .field("patterns", &registry.patterns.len())
            .finish()
    }
}
