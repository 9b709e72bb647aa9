//! Nature: the event-capable, trait-composable identity of a runner.
//!
//! A nature has little behaviour of its own. Capabilities are installed at
//! runtime as [`Trait`]s, each a set of named functions that run with the
//! nature as receiver. From the receiver a capability can reach:
//!
//! - the runner's controller ([`Nature::with_controller`])
//! - the runner id ([`Nature::id`])
//! - other installed capabilities ([`Nature::call`])
//! - the natures of a sandbox's children ([`Nature::child`])
//! - the event bus ([`Nature::dispatch`])
//!
//! # Namespace
//!
//! Capabilities and namespaced child natures share one namespace. The last
//! write wins, and removing a name never restores what it shadowed.
//!
//! # Example
//!
//! ```ignore
//! let nature = Nature::new("player");
//! nature.add_trait(&Trait::new().with("log", |nature, payload, _meta| {
//!     println!("{}: {payload}", nature.id());
//!     Payload::Null
//! }));
//! nature.call("log", Some(&json!("Hello World")));
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::bus::EventBus;
use crate::core::{AsAny, EventMeta, EventType, Listener, Payload};
use crate::runner::Controller;

/// A named function installed on a nature.
///
/// Receives the nature as receiver, the payload, and the event metadata
/// when invoked through routing (`None` for direct calls).
pub type Capability = Rc<dyn Fn(&Nature, &Payload, Option<&EventMeta<Nature>>) -> Payload>;

/// A named set of capabilities.
#[derive(Clone, Default)]
pub struct Trait {
    capabilities: Vec<(String, Capability)>,
}

impl Trait {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability; a repeated name replaces the earlier entry.
    pub fn with(
        mut self,
        name: impl Into<String>,
        capability: impl Fn(&Nature, &Payload, Option<&EventMeta<Nature>>) -> Payload + 'static,
    ) -> Self {
        let name = name.into();
        let capability: Capability = Rc::new(capability);
        match self.capabilities.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = capability,
            None => self.capabilities.push((name, capability)),
        }
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.capabilities.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.capabilities
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, capability)| capability)
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl fmt::Debug for Trait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// A value in the nature's namespace.
#[derive(Clone)]
pub enum Member {
    Capability(Capability),
    Nature(Nature),
}

struct NatureInner {
    identity: String,
    controller: RefCell<Option<Rc<dyn Controller>>>,
    members: RefCell<HashMap<String, Member>>,
    bus: EventBus<Nature>,
}

/// The command centre of a runner.
///
/// `Nature` is a cheap handle; clones are the same nature. Events it
/// dispatches carry the nature itself as [`EventMeta::target`].
#[derive(Clone)]
pub struct Nature {
    inner: Rc<NatureInner>,
}

impl Nature {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(NatureInner {
                identity: identity.into(),
                controller: RefCell::new(None),
                members: RefCell::new(HashMap::new()),
                bus: EventBus::new(),
            }),
        }
    }

    /// The id of the owning runner.
    pub fn id(&self) -> &str {
        &self.inner.identity
    }

    pub fn controller(&self) -> Option<Rc<dyn Controller>> {
        self.inner.controller.borrow().clone()
    }

    pub fn set_controller(&self, controller: Option<Rc<dyn Controller>>) {
        *self.inner.controller.borrow_mut() = controller;
    }

    /// Run `f` against the controller if it is a `C`.
    pub fn with_controller<C: Controller + 'static, R>(&self, f: impl FnOnce(&C) -> R) -> Option<R> {
        let controller = self.controller()?;
        let concrete = AsAny::as_any(&*controller).downcast_ref::<C>()?;
        Some(f(concrete))
    }

    // -------------------------------------------------------------------------
    // Traits
    // -------------------------------------------------------------------------

    /// Install every capability of the trait, overwriting same-named members.
    pub fn add_trait(&self, value: &Trait) {
        let mut members = self.inner.members.borrow_mut();
        for (name, capability) in &value.capabilities {
            members.insert(name.clone(), Member::Capability(Rc::clone(capability)));
        }
    }

    /// Clear every name of the trait, whatever currently holds it.
    pub fn remove_trait(&self, value: &Trait) {
        let mut members = self.inner.members.borrow_mut();
        for (name, _) in &value.capabilities {
            members.remove(name);
        }
    }

    pub fn member(&self, name: &str) -> Option<Member> {
        self.inner.members.borrow().get(name).cloned()
    }

    pub fn capability(&self, name: &str) -> Option<Capability> {
        match self.member(name)? {
            Member::Capability(capability) => Some(capability),
            Member::Nature(_) => None,
        }
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capability(name).is_some()
    }

    /// Invoke an installed capability with this nature as receiver.
    ///
    /// Returns `None` if no capability is installed under `name`.
    pub fn call(&self, name: &str, payload: Option<&Payload>) -> Option<Payload> {
        let capability = self.capability(name)?;
        let empty = Payload::Object(Default::default());
        Some(capability(self, payload.unwrap_or(&empty), None))
    }

    // -------------------------------------------------------------------------
    // Namespaced natures
    // -------------------------------------------------------------------------

    /// A nature exposed under `name` by a sandbox.
    pub fn child(&self, name: &str) -> Option<Nature> {
        match self.member(name)? {
            Member::Nature(nature) => Some(nature),
            Member::Capability(_) => None,
        }
    }

    pub(crate) fn expose(&self, name: &str, nature: Nature) {
        self.inner
            .members
            .borrow_mut()
            .insert(name.to_string(), Member::Nature(nature));
    }

    pub(crate) fn conceal(&self, name: &str) {
        self.inner.members.borrow_mut().remove(name);
    }

    /// Resolve a dotted path such as `"childId.method"` to its receiver and
    /// capability.
    pub fn resolve(&self, path: &str) -> Option<(Nature, Capability)> {
        self.walk(path).ok()
    }

    /// Like [`resolve`](Self::resolve), reporting the first segment that
    /// did not resolve.
    pub(crate) fn walk(&self, path: &str) -> Result<(Nature, Capability), String> {
        let mut segments: Vec<&str> = path.split('.').collect();
        let method = segments.pop().unwrap_or_default();

        let mut context = self.clone();
        for segment in segments {
            context = context.child(segment).ok_or_else(|| segment.to_string())?;
        }
        let capability = context
            .capability(method)
            .ok_or_else(|| method.to_string())?;
        Ok((context, capability))
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    pub fn on(&self, event_type: impl Into<EventType>, listener: &Listener<Nature>) -> &Self {
        self.inner.bus.on(event_type, listener);
        self
    }

    pub fn on_with_priority(
        &self,
        event_type: impl Into<EventType>,
        listener: &Listener<Nature>,
        priority: i32,
    ) -> &Self {
        self.inner.bus.on_with_priority(event_type, listener, priority);
        self
    }

    pub fn once(&self, event_type: impl Into<EventType>, listener: &Listener<Nature>) -> &Self {
        self.inner.bus.once(event_type, listener);
        self
    }

    pub fn once_with_priority(
        &self,
        event_type: impl Into<EventType>,
        listener: &Listener<Nature>,
        priority: i32,
    ) -> &Self {
        self.inner
            .bus
            .once_with_priority(event_type, listener, priority);
        self
    }

    pub fn off(&self, event_type: impl Into<EventType>, listener: &Listener<Nature>) -> &Self {
        self.inner.bus.off(event_type, listener);
        self
    }

    /// Dispatch with this nature as the event target.
    pub fn dispatch(&self, event_type: &str, payload: Option<&Payload>) -> bool {
        self.inner.bus.dispatch(self, event_type, payload)
    }

    pub fn has_listener(&self, event_type: impl Into<EventType>) -> bool {
        self.inner.bus.has_listener(event_type)
    }

    pub fn listener_count(&self, event_type: impl Into<EventType>) -> usize {
        self.inner.bus.listener_count(event_type)
    }

    pub fn ptr_eq(&self, other: &Nature) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// A handle that does not keep the nature alive.
    pub fn downgrade(&self) -> WeakNature {
        WeakNature {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

/// Non-owning [`Nature`] handle, for callbacks owned by the nature's runner.
#[derive(Clone)]
pub struct WeakNature {
    inner: Weak<NatureInner>,
}

impl WeakNature {
    pub fn upgrade(&self) -> Option<Nature> {
        self.inner.upgrade().map(|inner| Nature { inner })
    }
}

impl fmt::Debug for Nature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nature")
            .field("id", &self.inner.identity)
            .field("members", &self.inner.members.borrow().len())
            .field("controller", &self.inner.controller.borrow().is_some())
            .finish()
    }
}
