//! Composite runner and hierarchical event router.
//!
//! A sandbox owns an ordered list of child runners and an event map. Once
//! initiated, it observes every event any child's nature dispatches and
//! routes it to the destinations the map names for `(origin, event type)`.
//!
//! # Routing
//!
//! ```text
//! child nature ──dispatch(T)──► sandbox handler (registered on "*", runs last)
//!                                   │
//!                                   ├─► cache hit?  ── yes ──► destinations
//!                                   │        no
//!                                   ├─► event map [origin][T] ──► resolve paths ──► cache
//!                                   │
//!                                   ├─► invoke destinations in declaration order
//!                                   │
//!                                   └─► own nature.dispatch(T)  (bubbles to the parent)
//! ```
//!
//! Events the sandbox's own attitude raises are routed under the origin
//! `"nature"`. Destination paths are dotted: `"consumer.onLoaderReady"`
//! walks into the child nature exposed as `consumer`, while `"log"` names a
//! capability of the sandbox's own nature.
//!
//! # Key Properties
//!
//! - Destinations run in declaration order, with the original payload and meta
//! - A resolved route is cached until the next `reset`
//! - Removing a child unwires it at once; routes cached before the removal
//!   stay until `reset`
//! - A path that does not resolve is logged and skipped; the event still bubbles

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::{debug, error, trace, warn};

use crate::attitude::{Attitude, State};
use crate::core::{EventMeta, EventType, Listener, Payload};
use crate::error::RunnerError;
use crate::nature::Nature;
use crate::resource::{EventMap, RunnerProfile};
use crate::route_cache::{Destination, EventRouteCache, Route, RouteKey, OWN_NATURE};
use crate::runner::{ChildKey, Controller, Runner, RunnerCore};

/// Priority of the routing handler on child natures: after every other listener.
const ROUTING_PRIORITY: i32 = i32::MAX;

// =============================================================================
// Routing
// =============================================================================

/// Routing state shared with the handler registered on child natures.
struct Routing {
    id: String,
    nature: RefCell<Option<Nature>>,
    events: RefCell<Option<EventMap>>,
    cache: RefCell<Option<EventRouteCache>>,
    handler: Listener<Nature>,
}

impl Routing {
    fn new(id: String) -> Rc<Self> {
        Rc::new_cyclic(|routing: &Weak<Routing>| {
            let routing = routing.clone();
            Routing {
                id,
                nature: RefCell::new(None),
                events: RefCell::new(None),
                cache: RefCell::new(None),
                handler: Listener::new(move |payload: &Payload, meta: &EventMeta<Nature>| {
                    if let Some(routing) = routing.upgrade() {
                        routing.handle(payload, meta);
                    }
                }),
            }
        })
    }

    fn own_nature(&self) -> Option<Nature> {
        self.nature.borrow().clone()
    }

    fn wire(&self, child: &dyn Runner) {
        match (self.own_nature(), child.nature()) {
            (Some(own), Some(child_nature)) => {
                child_nature.on_with_priority(EventType::All, &self.handler, ROUTING_PRIORITY);
                own.expose(child.id(), child_nature);
                trace!(sandbox = %self.id, child = %child.id(), "child wired");
            }
            _ => warn!(sandbox = %self.id, child = %child.id(), "child without nature not wired"),
        }
    }

    fn unwire(&self, child: &dyn Runner) {
        if let Some(child_nature) = child.nature() {
            child_nature.off(EventType::All, &self.handler);
        }
        if let Some(own) = self.own_nature() {
            own.conceal(child.id());
        }
        trace!(sandbox = %self.id, child = %child.id(), "child unwired");
    }

    fn handle(&self, payload: &Payload, meta: &EventMeta<Nature>) {
        let Some(own) = self.own_nature() else {
            return;
        };

        match self.destinations(meta) {
            Ok(Some(route)) => {
                for destination in route.iter() {
                    (destination.capability)(&destination.nature, payload, Some(meta));
                }
            }
            Ok(None) => {}
            Err(err) => error!(sandbox = %self.id, error = %err, "event not routed"),
        }

        own.dispatch(&meta.event_type, Some(payload));
    }

    /// The cached route, or the route resolved from the event map.
    ///
    /// `Ok(None)` when the map has no entry for the origin and type.
    fn destinations(&self, meta: &EventMeta<Nature>) -> Result<Option<Route>, RunnerError> {
        let origin = match meta.target.id() {
            id if id == self.id => OWN_NATURE,
            id => id,
        };
        let key = RouteKey::new(origin, meta.event_type.as_str());

        if let Some(route) = self.cache.borrow().as_ref().and_then(|cache| cache.get(&key)) {
            trace!(sandbox = %self.id, route = %key, "route cache hit");
            return Ok(Some(route));
        }

        let paths = self
            .events
            .borrow()
            .as_ref()
            .and_then(|events| events.get(origin))
            .and_then(|types| types.get(&meta.event_type))
            .cloned();
        let Some(paths) = paths else {
            return Ok(None);
        };
        let Some(own) = self.own_nature() else {
            return Ok(None);
        };

        let mut resolved: SmallVec<[Destination; 2]> = SmallVec::new();
        for path in &paths {
            let (nature, capability) =
                own.walk(path)
                    .map_err(|segment| RunnerError::UnresolvedRoute {
                        origin: key.origin.clone(),
                        event_type: key.event_type.clone(),
                        path: path.clone(),
                        segment,
                    })?;
            resolved.push(Destination { nature, capability });
        }
        trace!(sandbox = %self.id, route = %key, destinations = resolved.len(), "route resolved");

        let route = match self.cache.borrow_mut().as_mut() {
            Some(cache) => cache.insert(key, resolved),
            None => Rc::new(resolved),
        };
        Ok(Some(route))
    }
}

// =============================================================================
// Sandbox
// =============================================================================

/// A runner that owns children and routes events between them.
pub struct Sandbox {
    core: RunnerCore,
    children: Vec<Box<dyn Runner>>,
    routing: Rc<Routing>,
}

impl Sandbox {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            routing: Routing::new(id.clone()),
            core: RunnerCore::new(id),
            children: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Children
    // -------------------------------------------------------------------------

    /// Insert a child at `index` (clamped; `None` appends).
    ///
    /// An initiated sandbox initiates and wires the child before inserting it.
    pub fn add_child(&mut self, mut child: Box<dyn Runner>, index: Option<usize>) {
        if self.core.initiated {
            child.init(None);
            self.routing.wire(child.as_ref());
        }

        let len = self.children.len();
        let index = index.unwrap_or(len).min(len);
        child.set_parent(Some(self.core.id.clone()));
        debug!(sandbox = %self.core.id, child = %child.id(), index, "child added");
        self.children.insert(index, child);
    }

    /// Unwire, reset and detach a child.
    ///
    /// With `deep`, an id not found among the direct children is removed
    /// from the first nested sandbox that holds it.
    pub fn remove_child<'a>(&mut self, key: impl Into<ChildKey<'a>>, deep: bool) -> Option<Box<dyn Runner>> {
        let key = key.into();
        if let Some(index) = self.position(key) {
            let child = &mut self.children[index];
            self.routing.unwire(child.as_ref());
            child.reset();

            let mut child = self.children.remove(index);
            child.set_parent(None);
            debug!(sandbox = %self.core.id, child = %child.id(), "child removed");
            return Some(child);
        }

        match key {
            ChildKey::Id(id) if deep => self.children.iter_mut().find_map(|child| {
                child
                    .as_sandbox_mut()
                    .and_then(|sandbox| sandbox.remove_child(id, true))
            }),
            _ => None,
        }
    }

    /// A child by id or index. `deep` also searches nested sandboxes by id.
    pub fn get_child<'a>(
        &self,
        key: impl Into<ChildKey<'a>>,
        deep: bool,
    ) -> Option<&(dyn Runner + 'static)> {
        match key.into() {
            ChildKey::Index(index) => self.children.get(index).map(|child| child.as_ref()),
            ChildKey::Id(id) => self.children.iter().find_map(|child| {
                if child.id() == id {
                    Some(child.as_ref())
                } else if deep {
                    child.as_sandbox().and_then(|sandbox| sandbox.get_child(id, true))
                } else {
                    None
                }
            }),
        }
    }

    pub fn get_child_mut<'a>(
        &mut self,
        key: impl Into<ChildKey<'a>>,
        deep: bool,
    ) -> Option<&mut (dyn Runner + 'static)> {
        let key = key.into();
        if let Some(index) = self.position(key) {
            return Some(self.children[index].as_mut());
        }
        match key {
            ChildKey::Id(id) if deep => self.children.iter_mut().find_map(|child| {
                child
                    .as_sandbox_mut()
                    .and_then(|sandbox| sandbox.get_child_mut(id, true))
            }),
            _ => None,
        }
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    pub fn children(&self) -> impl Iterator<Item = &(dyn Runner + 'static)> {
        self.children.iter().map(|child| child.as_ref())
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.children.iter().position(|child| child.id() == id)
    }

    pub fn last_index_of(&self, id: &str) -> Option<usize> {
        self.children.iter().rposition(|child| child.id() == id)
    }

    /// Levels of children below this sandbox.
    pub fn depth(&self) -> usize {
        let nested = self
            .children
            .iter()
            .filter_map(|child| child.as_sandbox())
            .map(Sandbox::depth)
            .max()
            .unwrap_or(0);
        usize::from(!self.children.is_empty()) + nested
    }

    fn position(&self, key: ChildKey<'_>) -> Option<usize> {
        match key {
            ChildKey::Id(id) => self.index_of(id),
            ChildKey::Index(index) => (index < self.children.len()).then_some(index),
        }
    }

    // -------------------------------------------------------------------------
    // Route cache
    // -------------------------------------------------------------------------

    /// Number of cached routes; zero before the first `init` and after `dispose`.
    pub fn cached_routes(&self) -> usize {
        self.routing
            .cache
            .borrow()
            .as_ref()
            .map_or(0, EventRouteCache::len)
    }

    pub fn is_route_cached(&self, origin: &str, event_type: &str) -> bool {
        let key = RouteKey::new(origin, event_type);
        self.routing
            .cache
            .borrow()
            .as_ref()
            .is_some_and(|cache| cache.contains(&key))
    }
}

impl Runner for Sandbox {
    fn id(&self) -> &str {
        &self.core.id
    }

    /// Also replaces the live event map; cached routes stay until `reset`.
    fn setup(&mut self, controller: Option<Rc<dyn Controller>>, profile: Option<&RunnerProfile>) {
        self.core.setup(controller, profile);
        *self.routing.events.borrow_mut() = self.core.profile.events.clone();
    }

    fn init(&mut self, details: Option<&Payload>) {
        if !self.core.can_init() {
            return;
        }

        self.routing
            .cache
            .borrow_mut()
            .get_or_insert_with(EventRouteCache::new);

        let routing = Rc::downgrade(&self.routing);
        let (nature, attitude) = self.core.prepare(move |nature| {
            let target = nature.downgrade();
            Box::new(move |state: &State| {
                if let (Some(routing), Some(nature)) = (routing.upgrade(), target.upgrade()) {
                    routing.handle(&state.to_payload(), &EventMeta::new(nature, state.name()));
                }
            })
        });
        *self.routing.nature.borrow_mut() = Some(nature);

        for child in &mut self.children {
            if !child.is_initiated() {
                child.init(details);
            }
            self.routing.wire(child.as_ref());
        }

        self.core.qualify(&attitude, details);
    }

    fn reset(&mut self) {
        if !self.core.initiated {
            return;
        }

        for child in &mut self.children {
            self.routing.unwire(child.as_ref());
            child.reset();
        }

        self.core.release();
        if let Some(cache) = self.routing.cache.borrow_mut().as_mut() {
            cache.expire();
        }
        self.core.disqualify();
    }

    fn dispose(&mut self) {
        if self.core.disposed {
            return;
        }
        self.reset();

        for mut child in self.children.drain(..) {
            child.dispose();
            child.set_parent(None);
        }

        *self.routing.nature.borrow_mut() = None;
        *self.routing.events.borrow_mut() = None;
        *self.routing.cache.borrow_mut() = None;
        self.core.clear();
    }

    fn is_initiated(&self) -> bool {
        self.core.initiated
    }

    fn is_disposed(&self) -> bool {
        self.core.disposed
    }

    fn nature(&self) -> Option<Nature> {
        self.core.nature.clone()
    }

    fn attitude(&self) -> Option<Attitude> {
        self.core.attitude.clone()
    }

    fn parent_id(&self) -> Option<&str> {
        self.core.parent_id.as_deref()
    }

    fn set_parent(&mut self, parent: Option<String>) {
        self.core.parent_id = parent;
    }

    fn is_container(&self) -> bool {
        true
    }

    fn as_sandbox(&self) -> Option<&Sandbox> {
        Some(self)
    }

    fn as_sandbox_mut(&mut self) -> Option<&mut Sandbox> {
        Some(self)
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("core", &self.core)
            .field("children", &self.children)
            .field("cached_routes", &self.cached_routes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;
    use crate::nature::Trait;
    use crate::testing::{recording_trait, CallLog, RecordingController};
    use crate::transitions;
    use serde_json::json;
    use std::cell::Cell;

    fn module(id: &str, log: &CallLog, profile: RunnerProfile) -> Box<dyn Runner> {
        let mut module = Module::new(id);
        module.setup(
            Some(Rc::new(RecordingController::labeled(log, id))),
            Some(&profile),
        );
        Box::new(module)
    }

    fn consumer(log: &CallLog) -> Box<dyn Runner> {
        module(
            "consumer",
            log,
            RunnerProfile::new().with_trait(recording_trait(log, &["onLoaderReady", "onOther"])),
        )
    }

    /// `app` with children `loader` and `consumer`, routing
    /// `loader/onReady` to `consumer.onLoaderReady`.
    fn routed_sandbox(log: &CallLog) -> Sandbox {
        let mut sandbox = Sandbox::new("app");
        sandbox.setup(
            Some(Rc::new(RecordingController::labeled(log, "app"))),
            Some(&RunnerProfile::new().with_route("loader", "onReady", "consumer.onLoaderReady")),
        );
        sandbox.add_child(module("loader", log, RunnerProfile::new()), None);
        sandbox.add_child(consumer(log), None);
        sandbox
    }

    fn child_nature(sandbox: &Sandbox, id: &str) -> Nature {
        sandbox.get_child(id, true).unwrap().nature().unwrap()
    }

    fn count_on(nature: &Nature, event_type: &str) -> Rc<Cell<u32>> {
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        nature.on(event_type, &Listener::new(move |_, _| counter.set(counter.get() + 1)));
        hits
    }

    #[test]
    fn test_loader_ready_reaches_consumer() {
        let log = CallLog::new();
        let mut sandbox = routed_sandbox(&log);
        sandbox.init(None);
        log.clear();

        let bubbled = count_on(&sandbox.nature().unwrap(), "onReady");
        assert!(child_nature(&sandbox, "loader").dispatch("onReady", None));

        assert_eq!(log.entries(), vec!["consumer.onLoaderReady"]);
        assert_eq!(bubbled.get(), 1);
    }

    #[test]
    fn test_init_initiates_and_wires_children() {
        let log = CallLog::new();
        let mut sandbox = routed_sandbox(&log);
        assert!(!sandbox.get_child("loader", false).unwrap().is_initiated());

        sandbox.init(Some(&json!({"mode": "test"})));

        assert_eq!(
            log.entries(),
            vec![
                "loader:qualify:stateless",
                "consumer:qualify:stateless",
                "app:qualify:stateless",
            ]
        );
        let own = sandbox.nature().unwrap();
        let loader = child_nature(&sandbox, "loader");
        assert!(own.child("loader").unwrap().ptr_eq(&loader));
        assert!(loader.has_listener("*"));
        assert!(sandbox.get_child(0usize, false).unwrap().is_initiated());
    }

    #[test]
    fn test_children_receive_init_details() {
        let log = CallLog::new();
        let mut sandbox = Sandbox::new("app");
        let controller = Rc::new(RecordingController::new(&log));
        let mut child = Module::new("player");
        child.setup(Some(controller.clone()), None);
        sandbox.add_child(Box::new(child), None);

        sandbox.init(Some(&json!({"volume": 5})));

        assert_eq!(controller.last_details(), Some(json!({"volume": 5})));
    }

    #[test]
    fn test_route_cached_on_first_matching_dispatch() {
        let log = CallLog::new();
        let mut sandbox = routed_sandbox(&log);
        sandbox.init(None);
        assert_eq!(sandbox.cached_routes(), 0);

        let loader = child_nature(&sandbox, "loader");
        loader.dispatch("onReady", None);
        assert!(sandbox.is_route_cached("loader", "onReady"));

        loader.dispatch("onUnmapped", None);
        child_nature(&sandbox, "consumer").dispatch("onReady", None);
        assert_eq!(sandbox.cached_routes(), 1);
    }

    #[test]
    fn test_second_dispatch_reuses_cached_route() {
        let log = CallLog::new();
        let mut sandbox = routed_sandbox(&log);
        sandbox.init(None);
        let loader = child_nature(&sandbox, "loader");
        loader.dispatch("onReady", None);

        sandbox.setup(
            None,
            Some(&RunnerProfile::new().with_route("loader", "onReady", "consumer.onOther")),
        );
        log.clear();
        loader.dispatch("onReady", None);
        assert_eq!(log.entries(), vec!["consumer.onLoaderReady"]);

        sandbox.reset();
        assert_eq!(sandbox.cached_routes(), 0);
        sandbox.init(None);
        log.clear();

        child_nature(&sandbox, "loader").dispatch("onReady", None);
        assert_eq!(log.entries(), vec!["consumer.onOther"]);
    }

    #[test]
    fn test_reset_unwires_and_resets_children_in_order() {
        let log = CallLog::new();
        let mut sandbox = routed_sandbox(&log);
        sandbox.init(None);
        let loader = child_nature(&sandbox, "loader");
        loader.dispatch("onReady", None);
        log.clear();

        sandbox.reset();

        assert_eq!(
            log.entries(),
            vec!["loader:disqualify", "consumer:disqualify", "app:disqualify"]
        );
        assert!(!loader.has_listener("*"));
        assert!(sandbox.nature().unwrap().child("loader").is_none());
        assert!(!sandbox.get_child("consumer", false).unwrap().is_initiated());
        assert_eq!(sandbox.cached_routes(), 0);
    }

    #[test]
    fn test_reset_init_cycle_routes_again() {
        let log = CallLog::new();
        let mut sandbox = routed_sandbox(&log);
        sandbox.init(None);
        sandbox.reset();
        sandbox.init(None);
        sandbox.reset();
        sandbox.init(None);
        log.clear();

        child_nature(&sandbox, "loader").dispatch("onReady", None);
        assert_eq!(log.entries(), vec!["consumer.onLoaderReady"]);
    }

    #[test]
    fn test_removed_child_is_not_routed() {
        let log = CallLog::new();
        let mut sandbox = routed_sandbox(&log);
        sandbox.init(None);
        log.clear();

        let removed = sandbox.remove_child("loader", false).unwrap();
        assert_eq!(removed.parent_id(), None);
        assert!(!removed.is_initiated());
        assert_eq!(log.entries(), vec!["loader:disqualify"]);
        log.clear();

        let loader = removed.nature().unwrap();
        let own = count_on(&loader, "onReady");
        assert!(loader.dispatch("onReady", None));

        assert_eq!(own.get(), 1);
        assert!(log.is_empty());
        assert!(sandbox.nature().unwrap().child("loader").is_none());
    }

    #[test]
    fn test_add_child_after_init() {
        let log = CallLog::new();
        let mut sandbox = Sandbox::new("app");
        sandbox.setup(
            None,
            Some(&RunnerProfile::new().with_route("loader", "onReady", "consumer.onLoaderReady")),
        );
        sandbox.add_child(consumer(&log), None);
        sandbox.init(None);

        sandbox.add_child(module("loader", &log, RunnerProfile::new()), None);
        assert!(sandbox.get_child("loader", false).unwrap().is_initiated());
        log.clear();

        child_nature(&sandbox, "loader").dispatch("onReady", None);
        assert_eq!(log.entries(), vec!["consumer.onLoaderReady"]);
    }

    #[test]
    fn test_own_attitude_routes_as_nature() {
        let log = CallLog::new();
        let mut sandbox = Sandbox::new("app");
        sandbox.setup(
            None,
            Some(
                &RunnerProfile::new()
                    .with_states(transitions! { "busy" => [] })
                    .with_route("nature", "busy", "consumer.onLoaderReady"),
            ),
        );
        sandbox.add_child(consumer(&log), None);
        sandbox.init(None);
        log.clear();

        let names = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&names);
        sandbox.nature().unwrap().on(
            "busy",
            &Listener::new(move |payload: &Payload, _: &EventMeta<Nature>| {
                sink.borrow_mut().push(payload["name"].clone());
            }),
        );

        assert!(sandbox.attitude().unwrap().change("busy", None));

        assert_eq!(log.entries(), vec!["consumer.onLoaderReady"]);
        assert_eq!(*names.borrow(), vec![json!("busy")]);
        assert!(sandbox.is_route_cached("nature", "busy"));
    }

    #[test]
    fn test_destinations_run_in_declaration_order_with_meta() {
        let log = CallLog::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let spy = Trait::new().with("run", move |nature, payload, meta| {
            let meta = meta.unwrap();
            sink.borrow_mut().push((
                nature.id().to_string(),
                meta.target.id().to_string(),
                meta.event_type.clone(),
                payload.clone(),
            ));
            Payload::Null
        });

        let mut sandbox = Sandbox::new("app");
        sandbox.setup(
            None,
            Some(
                &RunnerProfile::new()
                    .with_route("loader", "onReady", "b.run")
                    .with_route("loader", "onReady", "a.run")
                    .with_route("loader", "onReady", "b.run"),
            ),
        );
        sandbox.add_child(module("loader", &log, RunnerProfile::new()), None);
        sandbox.add_child(module("a", &log, RunnerProfile::new().with_trait(spy.clone())), None);
        sandbox.add_child(module("b", &log, RunnerProfile::new().with_trait(spy)), None);
        sandbox.init(None);

        child_nature(&sandbox, "loader").dispatch("onReady", Some(&json!({"url": "x"})));

        let order: Vec<_> = seen.borrow().iter().map(|s| s.0.clone()).collect();
        assert_eq!(order, vec!["b", "a", "b"]);
        for (_, target, event_type, payload) in seen.borrow().iter() {
            assert_eq!(target, "loader");
            assert_eq!(event_type, "onReady");
            assert_eq!(payload, &json!({"url": "x"}));
        }
    }

    #[test]
    fn test_own_capability_destination() {
        let log = CallLog::new();
        let mut sandbox = Sandbox::new("app");
        sandbox.setup(
            None,
            Some(
                &RunnerProfile::new()
                    .with_trait(recording_trait(&log, &["log"]))
                    .with_route("loader", "onReady", "log"),
            ),
        );
        sandbox.add_child(module("loader", &log, RunnerProfile::new()), None);
        sandbox.init(None);

        child_nature(&sandbox, "loader").dispatch("onReady", None);
        assert_eq!(log.entries().last().map(String::as_str), Some("app.log"));
    }

    #[test]
    fn test_unresolved_route_is_skipped_and_bubbles() {
        let log = CallLog::new();
        let mut sandbox = Sandbox::new("app");
        sandbox.setup(
            None,
            Some(
                &RunnerProfile::new()
                    .with_route("loader", "onReady", "consumer.onLoaderReady")
                    .with_route("loader", "onReady", "missing.run"),
            ),
        );
        sandbox.add_child(module("loader", &log, RunnerProfile::new()), None);
        sandbox.add_child(consumer(&log), None);
        sandbox.init(None);
        log.clear();

        let bubbled = count_on(&sandbox.nature().unwrap(), "onReady");
        child_nature(&sandbox, "loader").dispatch("onReady", None);

        assert!(log.is_empty());
        assert_eq!(bubbled.get(), 1);
        assert!(!sandbox.is_route_cached("loader", "onReady"));
    }

    #[test]
    fn test_empty_route_is_cached() {
        let log = CallLog::new();
        let mut events = EventMap::new();
        events
            .entry("loader".to_string())
            .or_default()
            .insert("onReady".to_string(), Vec::new());

        let mut sandbox = Sandbox::new("app");
        sandbox.setup(None, Some(&RunnerProfile::new().with_events(events)));
        sandbox.add_child(module("loader", &log, RunnerProfile::new()), None);
        sandbox.init(None);

        child_nature(&sandbox, "loader").dispatch("onReady", None);
        assert!(sandbox.is_route_cached("loader", "onReady"));
    }

    #[test]
    fn test_nested_sandbox_bubbles_to_parent() {
        let log = CallLog::new();
        let mut inner = Sandbox::new("inner");
        inner.add_child(
            module("loader", &log, RunnerProfile::new().with_trait(recording_trait(&log, &["pong"]))),
            None,
        );

        let mut outer = Sandbox::new("outer");
        outer.setup(
            None,
            Some(
                &RunnerProfile::new()
                    .with_route("inner", "onReady", "consumer.onLoaderReady")
                    .with_route("consumer", "ping", "inner.loader.pong"),
            ),
        );
        outer.add_child(Box::new(inner), None);
        outer.add_child(consumer(&log), None);
        outer.init(None);
        log.clear();

        child_nature(&outer, "loader").dispatch("onReady", None);
        assert_eq!(log.entries(), vec!["consumer.onLoaderReady"]);

        log.clear();
        child_nature(&outer, "consumer").dispatch("ping", None);
        assert_eq!(log.entries(), vec!["loader.pong"]);
    }

    #[test]
    fn test_reentrant_routing() {
        let log = CallLog::new();
        let relay = Trait::new().with("onLoaderReady", {
            let log = log.clone();
            move |nature: &Nature, _: &Payload, _: Option<&EventMeta<Nature>>| {
                log.push("consumer.onLoaderReady");
                nature.dispatch("onConsumed", None);
                log.push("consumer.done");
                Payload::Null
            }
        });

        let mut sandbox = Sandbox::new("app");
        sandbox.setup(
            None,
            Some(
                &RunnerProfile::new()
                    .with_route("loader", "onReady", "consumer.onLoaderReady")
                    .with_route("consumer", "onConsumed", "loader.ack"),
            ),
        );
        sandbox.add_child(
            module("loader", &log, RunnerProfile::new().with_trait(recording_trait(&log, &["ack"]))),
            None,
        );
        sandbox.add_child(module("consumer", &log, RunnerProfile::new().with_trait(relay)), None);
        sandbox.init(None);
        log.clear();

        child_nature(&sandbox, "loader").dispatch("onReady", None);

        assert_eq!(
            log.entries(),
            vec!["consumer.onLoaderReady", "loader.ack", "consumer.done"]
        );
    }

    #[test]
    fn test_tree_bookkeeping() {
        let log = CallLog::new();
        let mut sandbox = Sandbox::new("app");
        sandbox.add_child(module("b", &log, RunnerProfile::new()), None);
        sandbox.add_child(module("a", &log, RunnerProfile::new()), Some(0));
        sandbox.add_child(module("c", &log, RunnerProfile::new()), Some(10));

        let ids: Vec<_> = sandbox.children().map(|child| child.id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(sandbox.num_children(), 3);
        assert_eq!(sandbox.index_of("b"), Some(1));
        assert_eq!(sandbox.last_index_of("c"), Some(2));
        assert_eq!(sandbox.index_of("missing"), None);
        assert_eq!(sandbox.get_child(2usize, false).map(|c| c.id()), Some("c"));
        assert!(sandbox.get_child(3usize, false).is_none());
        assert!(sandbox.get_child("app", false).is_none());
        assert_eq!(sandbox.get_child("a", false).unwrap().parent_id(), Some("app"));
        assert_eq!(sandbox.depth(), 1);
        assert!(sandbox.remove_child(7usize, false).is_none());
        assert!(sandbox.remove_child("missing", true).is_none());
    }

    #[test]
    fn test_deep_lookup_and_remove() {
        let log = CallLog::new();
        let mut inner = Sandbox::new("inner");
        inner.add_child(module("loader", &log, RunnerProfile::new()), None);
        let mut outer = Sandbox::new("outer");
        outer.add_child(Box::new(inner), None);
        outer.init(None);

        assert_eq!(outer.depth(), 2);
        assert!(outer.get_child("loader", false).is_none());
        assert!(outer.get_child("loader", true).is_some());
        assert!(outer.get_child_mut("loader", true).is_some());
        let loader = child_nature(&outer, "loader");

        assert!(outer.remove_child("loader", false).is_none());
        let removed = outer.remove_child("loader", true).unwrap();

        assert_eq!(removed.id(), "loader");
        assert!(!loader.has_listener("*"));
        assert!(outer.get_child("inner", false).unwrap().as_sandbox().unwrap().num_children() == 0);
        assert_eq!(outer.depth(), 1);
    }

    #[test]
    fn test_dispose_cascades() {
        let log = CallLog::new();
        let mut sandbox = routed_sandbox(&log);
        sandbox.init(None);
        let loader = child_nature(&sandbox, "loader");
        log.clear();

        sandbox.dispose();

        assert!(sandbox.is_disposed());
        assert_eq!(sandbox.num_children(), 0);
        assert!(sandbox.nature().is_none());
        assert_eq!(sandbox.cached_routes(), 0);
        assert_eq!(
            log.entries(),
            vec!["loader:disqualify", "consumer:disqualify", "app:disqualify"]
        );
        assert!(loader.controller().is_none());

        sandbox.init(None);
        assert!(!sandbox.is_initiated());
    }
}
