//! Memo of resolved event routes.
//!
//! A sandbox resolves the dotted destination paths of its event map on the
//! first dispatch of an `(origin, event type)` pair and stores the resolved
//! `(receiver, capability)` pairs here. Later dispatches of the same pair
//! reuse the stored route without walking the paths again.
//!
//! # Key Properties
//!
//! - Keys are structured, so ids and types may contain any character
//! - An empty route is a valid entry (the map names the type with no paths)
//! - The cache is only ever emptied as a whole, on sandbox reset

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::nature::{Capability, Nature};

/// Origin key used for events raised by the sandbox's own nature.
pub const OWN_NATURE: &str = "nature";

/// Identifies a route: who raised the event, and under which type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub origin: String,
    pub event_type: String,
}

impl RouteKey {
    pub fn new(origin: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            event_type: event_type.into(),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.origin, self.event_type)
    }
}

/// One resolved destination: the receiver and the capability to run on it.
#[derive(Clone)]
pub struct Destination {
    pub nature: Nature,
    pub capability: Capability,
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("nature", &self.nature.id())
            .finish()
    }
}

/// Resolved destinations in declaration order.
///
/// Shared so invocation can run after the cache borrow is released.
pub type Route = Rc<SmallVec<[Destination; 2]>>;

/// Route memo owned by one sandbox.
#[derive(Default)]
pub struct EventRouteCache {
    routes: HashMap<RouteKey, Route>,
}

impl EventRouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &RouteKey) -> Option<Route> {
        self.routes.get(key).cloned()
    }

    pub fn insert(&mut self, key: RouteKey, destinations: SmallVec<[Destination; 2]>) -> Route {
        let route: Route = Rc::new(destinations);
        self.routes.insert(key, Rc::clone(&route));
        route
    }

    pub fn contains(&self, key: &RouteKey) -> bool {
        self.routes.contains_key(key)
    }

    /// Drop every entry.
    pub fn expire(&mut self) {
        self.routes.clear();
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &RouteKey> {
        self.routes.keys()
    }
}

impl fmt::Debug for EventRouteCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRouteCache")
            .field("routes", &self.routes.len())
            .finish()
    }
}
