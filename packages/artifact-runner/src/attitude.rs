//! Attitude: the state machine of a runner.
//!
//! An attitude owns a table of named states built from a transition map.
//! Every state knows one transition per known state name:
//!
//! | Target                       | Result  | Detail merged? | Notified? |
//! |------------------------------|---------|----------------|-----------|
//! | the state itself             | `false` | yes            | yes       |
//! | a declared destination       | `true`  | yes            | yes       |
//! | anything else                | `false` | no             | no        |
//!
//! The self row is a detail update, not a transition: it reports `false`
//! but still has observable effects.
//!
//! # Key Properties
//!
//! - **The initial state is a hub**: every state can return to it, and an
//!   initial state without declared destinations can reach every state
//! - **No errors**: illegal transitions are a `false` return, never a panic
//! - **Re-entrant**: the notify callback runs after the table is updated and
//!   may drive further transitions
//!
//! # Example
//!
//! ```ignore
//! let attitude = Attitude::with_states(&transitions! {
//!     "play" => ["pause"],
//!     "pause" => ["play", "stop"],
//!     "stop" => ["play"],
//! }, Some("stop"));
//!
//! assert!(attitude.change("play", None));
//! assert!(!attitude.change("stop", None)); // play cannot stop
//! assert!(attitude.change("pause", None));
//! assert!(attitude.change("stop", None));
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::core::{Detail, Payload};

/// The reserved initial state used when none is configured.
pub const STATELESS: &str = "stateless";

/// Adjacency list: state name to the names it may change to.
pub type Transitions = IndexMap<String, Vec<String>>;

/// Build a [`Transitions`] map from literals.
#[macro_export]
macro_rules! transitions {
    ($($state:expr => [$($dest:expr),* $(,)?]),* $(,)?) => {{
        let mut map = $crate::Transitions::new();
        $(map.insert(
            ::std::string::String::from($state),
            ::std::vec![$(::std::string::String::from($dest)),*],
        );)*
        map
    }};
}

/// What calling a transition from one state to another does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Same state: merge detail and notify, report `false`.
    Update,
    /// Declared destination: merge detail, switch, notify, report `true`.
    Change,
    /// Not allowed: nothing happens, report `false`.
    Denied,
}

/// One named state of an [`Attitude`].
///
/// Values handed out by the attitude are snapshots; the attitude owns the
/// live table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct State {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<Detail>,
    #[serde(skip)]
    transitions: IndexMap<String, Transition>,
}

impl State {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Detail merged into this state so far; `None` until the state is entered.
    pub fn detail(&self) -> Option<&Detail> {
        self.detail.as_ref()
    }

    /// The transition this state offers towards `target`.
    pub fn transition(&self, target: &str) -> Transition {
        self.transitions
            .get(target)
            .copied()
            .unwrap_or(Transition::Denied)
    }

    /// One transition per known state name.
    pub fn transitions(&self) -> impl Iterator<Item = (&str, Transition)> {
        self.transitions.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    /// The payload dispatched for this state: `{"name": ..., "detail": ...}`.
    pub fn to_payload(&self) -> Payload {
        let mut object = Detail::new();
        object.insert("name".to_string(), Value::String(self.name.clone()));
        if let Some(detail) = &self.detail {
            object.insert("detail".to_string(), Value::Object(detail.clone()));
        }
        Value::Object(object)
    }
}

/// Deep merge `incoming` into `base`.
///
/// Objects merge key by key, arrays index by index, anything else is
/// overwritten.
pub fn merge_detail(base: &mut Detail, incoming: &Detail) {
    for (key, value) in incoming {
        match base.get_mut(key) {
            Some(existing) => merge_value(existing, value),
            None => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn merge_value(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => merge_detail(target, source),
        (Value::Array(target), Value::Array(source)) => {
            for (index, value) in source.iter().enumerate() {
                match target.get_mut(index) {
                    Some(existing) => merge_value(existing, value),
                    None => target.push(value.clone()),
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}

type NotifyFn = Box<dyn Fn(&State)>;

struct StateTable {
    transitions: Transitions,
    states: IndexMap<String, State>,
    current: String,
}

impl StateTable {
    fn build(transitions: Option<&Transitions>, initial: Option<&str>) -> Self {
        let initial = initial.unwrap_or(STATELESS).to_string();
        let mut transitions = transitions.cloned().unwrap_or_default();
        transitions.entry(initial.clone()).or_default();

        let mut names: IndexSet<String> = IndexSet::new();
        for (name, destinations) in &transitions {
            names.insert(name.clone());
            names.extend(destinations.iter().cloned());
        }
        names.insert(initial.clone());

        let initial_is_open = transitions
            .get(&initial)
            .map_or(true, |destinations| destinations.is_empty());

        for name in &names {
            let destinations = transitions.entry(name.clone()).or_default();
            if !destinations.contains(&initial) {
                destinations.push(initial.clone());
            }
        }
        if initial_is_open {
            transitions.insert(initial.clone(), names.iter().cloned().collect());
        }

        let mut states = IndexMap::with_capacity(names.len());
        for name in &names {
            let declared = &transitions[name];
            let kinds = names
                .iter()
                .map(|target| {
                    let kind = if target == name {
                        Transition::Update
                    } else if declared.contains(target) {
                        Transition::Change
                    } else {
                        Transition::Denied
                    };
                    (target.clone(), kind)
                })
                .collect();
            states.insert(
                name.clone(),
                State {
                    name: name.clone(),
                    detail: None,
                    transitions: kinds,
                },
            );
        }

        Self {
            transitions,
            states,
            current: initial,
        }
    }

    fn current(&self) -> &State {
        &self.states[&self.current]
    }
}

struct AttitudeInner {
    notify: Option<NotifyFn>,
    table: RefCell<StateTable>,
}

/// The finite-state machine of a runner.
///
/// `Attitude` is a cheap handle: clones drive the same machine. A
/// controller keeps the clone it receives in `qualify` to change states
/// later.
#[derive(Clone)]
pub struct Attitude {
    inner: Rc<AttitudeInner>,
}

impl Attitude {
    /// A stateless attitude without notifications.
    pub fn new() -> Self {
        Self::build(None, None, None)
    }

    /// A stateless attitude that calls `notify` on every change or detail update.
    pub fn with_notify(notify: impl Fn(&State) + 'static) -> Self {
        Self::build(Some(Box::new(notify)), None, None)
    }

    /// An attitude without notifications, built from a transition map.
    pub fn with_states(transitions: &Transitions, initial_state: Option<&str>) -> Self {
        Self::build(None, Some(transitions), initial_state)
    }

    fn build(
        notify: Option<NotifyFn>,
        transitions: Option<&Transitions>,
        initial_state: Option<&str>,
    ) -> Self {
        Self {
            inner: Rc::new(AttitudeInner {
                notify,
                table: RefCell::new(StateTable::build(transitions, initial_state)),
            }),
        }
    }

    /// Rebuild the whole state table; the current state becomes the initial state.
    ///
    /// Details of the previous table are discarded.
    pub fn set_states(&self, transitions: Option<&Transitions>, initial_state: Option<&str>) {
        *self.inner.table.borrow_mut() = StateTable::build(transitions, initial_state);
    }

    /// Collapse to the reserved stateless state.
    pub fn unset_states(&self) {
        self.set_states(None, None);
    }

    /// Snapshot of the current state.
    pub fn current_state(&self) -> State {
        self.inner.table.borrow().current().clone()
    }

    pub fn current_name(&self) -> String {
        self.inner.table.borrow().current.clone()
    }

    /// Snapshot of a named state.
    pub fn state(&self, name: &str) -> Option<State> {
        self.inner.table.borrow().states.get(name).cloned()
    }

    /// Every known state name, in first-seen order.
    pub fn state_names(&self) -> Vec<String> {
        self.inner.table.borrow().states.keys().cloned().collect()
    }

    /// Legal destinations of a state, including the initial state.
    pub fn destinations(&self, name: &str) -> Option<Vec<String>> {
        self.inner.table.borrow().transitions.get(name).cloned()
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.inner.table.borrow().states.contains_key(name)
    }

    /// Whether `change(name)` would switch states.
    pub fn can_change(&self, name: &str) -> bool {
        let table = self.inner.table.borrow();
        table.states.contains_key(name)
            && table.current != name
            && table
                .transitions
                .get(&table.current)
                .is_some_and(|destinations| destinations.iter().any(|d| d == name))
    }

    /// Call the current state's transition towards `name`.
    ///
    /// Returns `true` only for a real change of state. A same-state call
    /// returns `false` after merging `detail` and notifying. Unknown names
    /// and undeclared destinations return `false` and change nothing.
    pub fn change(&self, name: &str, detail: Option<Detail>) -> bool {
        let kind = {
            let table = self.inner.table.borrow();
            if !table.states.contains_key(name) {
                return false;
            }
            table.current().transition(name)
        };

        match kind {
            Transition::Update => {
                self.execute(name, detail.as_ref());
                false
            }
            Transition::Change => {
                self.execute(name, detail.as_ref());
                true
            }
            Transition::Denied => {
                trace!(from = %self.current_name(), to = %name, "transition denied");
                false
            }
        }
    }

    fn execute(&self, name: &str, detail: Option<&Detail>) {
        let target = {
            let mut table = self.inner.table.borrow_mut();
            let mut merged = table.states[name]
                .detail
                .clone()
                .or_else(|| table.current().detail.clone())
                .unwrap_or_default();
            if let Some(detail) = detail {
                merge_detail(&mut merged, detail);
            }

            table.current = name.to_string();
            let state = &mut table.states[name];
            state.detail = Some(merged);
            state.clone()
        };

        if let Some(notify) = &self.inner.notify {
            notify(&target);
        }
    }
}

impl Default for Attitude {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Attitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.inner.table.borrow();
        f.debug_struct("Attitude")
            .field("current", &table.current)
            .field("states", &table.states.len())
            .field("notify", &self.inner.notify.is_some())
            .finish()
    }
}
