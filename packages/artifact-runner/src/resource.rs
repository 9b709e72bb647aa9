//! Declarative runner descriptions.
//!
//! # Overview
//!
//! - [`RunnerProfile`] = what `Runner::setup` consumes (copied by value)
//! - [`RunnerResource`] = a tree of named descriptions, one per runner
//! - [`ResourceSpec`] = the plain-data form of a resource tree, as found in
//!   configuration documents
//!
//! Controllers and traits are runtime values and only live on
//! [`RunnerResource`]. A [`ResourceSpec`] carries states, events, the initial
//! state and the tree shape.
//!
//! # Example
//!
//! ```ignore
//! let spec = ResourceSpec::from_json(r#"{
//!     "id": "app",
//!     "events": { "loader": { "onReady": ["consumer.onLoaderReady"] } },
//!     "children": [{ "id": "loader" }, { "id": "consumer" }]
//! }"#)?;
//!
//! let mut root = RunnerResource::new("root");
//! root.import(&spec)?;
//! root.get_mut("consumer").unwrap().traits.push(consumer_trait);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::attitude::Transitions;
use crate::error::RunnerError;
use crate::nature::Trait;
use crate::runner::Controller;

/// `origin id -> event type -> [dotted destination path]`.
///
/// The origin `"nature"` stands for the sandbox's own nature.
pub type EventMap = IndexMap<String, IndexMap<String, Vec<String>>>;

// =============================================================================
// Profile
// =============================================================================

/// Configuration handed to `Runner::setup`.
#[derive(Clone, Debug, Default)]
pub struct RunnerProfile {
    pub traits: Vec<Trait>,
    pub states: Option<Transitions>,
    pub initial_state: Option<String>,
    pub events: Option<EventMap>,
}

impl RunnerProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trait(mut self, value: Trait) -> Self {
        self.traits.push(value);
        self
    }

    pub fn with_states(mut self, states: Transitions) -> Self {
        self.states = Some(states);
        self
    }

    pub fn with_initial_state(mut self, name: impl Into<String>) -> Self {
        self.initial_state = Some(name.into());
        self
    }

    pub fn with_events(mut self, events: EventMap) -> Self {
        self.events = Some(events);
        self
    }

    /// Add one route `origin/event_type -> path`, keeping declaration order.
    pub fn with_route(
        mut self,
        origin: impl Into<String>,
        event_type: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        self.events
            .get_or_insert_with(EventMap::new)
            .entry(origin.into())
            .or_default()
            .entry(event_type.into())
            .or_default()
            .push(path.into());
        self
    }
}

// =============================================================================
// Plain-data spec
// =============================================================================

fn is_false(value: &bool) -> bool {
    !*value
}

/// Serializable description of a resource tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub states: Option<Transitions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<EventMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub force_container: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ResourceSpec>,
}

impl ResourceSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn from_json(document: &str) -> Result<Self, RunnerError> {
        Ok(serde_json::from_str(document)?)
    }

    fn collect_ids<'a>(&'a self, ids: &mut Vec<&'a str>) {
        ids.push(&self.id);
        for child in &self.children {
            child.collect_ids(ids);
        }
    }
}

// =============================================================================
// Resource tree
// =============================================================================

/// A named runner description and its child descriptions.
#[derive(Clone)]
pub struct RunnerResource {
    id: String,
    pub controller: Option<Rc<dyn Controller>>,
    pub traits: Vec<Trait>,
    pub states: Option<Transitions>,
    pub events: Option<EventMap>,
    pub initial_state: Option<String>,
    pub force_container: bool,
    children: Vec<RunnerResource>,
}

impl RunnerResource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            controller: None,
            traits: Vec::new(),
            states: None,
            events: None,
            initial_state: None,
            force_container: false,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn children(&self) -> &[RunnerResource] {
        &self.children
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    /// Whether the factory builds a sandbox for this resource.
    pub fn is_container(&self) -> bool {
        self.force_container || !self.children.is_empty()
    }

    /// Whether a descendant carries `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Depth-first search of the descendants.
    pub fn get(&self, id: &str) -> Option<&RunnerResource> {
        self.children.iter().find_map(|child| {
            if child.id == id {
                Some(child)
            } else {
                child.get(id)
            }
        })
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut RunnerResource> {
        let path = self.path_to(id)?;
        Some(self.descend(&path))
    }

    /// The description for `id`, added empty below this resource if absent.
    pub fn get_or_add(&mut self, id: &str) -> Result<&mut RunnerResource, RunnerError> {
        match self.path_to(id) {
            Some(path) => Ok(self.descend(&path)),
            None => self.add_resource(id),
        }
    }

    /// Child indices leading to the descendant `id`.
    fn path_to(&self, id: &str) -> Option<Vec<usize>> {
        self.children.iter().enumerate().find_map(|(index, child)| {
            if child.id == id {
                Some(vec![index])
            } else {
                child.path_to(id).map(|mut path| {
                    path.insert(0, index);
                    path
                })
            }
        })
    }

    fn descend(&mut self, path: &[usize]) -> &mut RunnerResource {
        path.iter()
            .fold(self, |node, &index| &mut node.children[index])
    }

    /// Add an empty child description.
    ///
    /// Fails for an empty id and for an id already used below this resource.
    pub fn add_resource(&mut self, id: impl Into<String>) -> Result<&mut RunnerResource, RunnerError> {
        let id = id.into();
        if id.is_empty() {
            return Err(RunnerError::MissingId);
        }
        if self.contains(&id) {
            return Err(RunnerError::DuplicateResource { id });
        }
        let index = self.children.len();
        self.children.push(RunnerResource::new(id));
        Ok(&mut self.children[index])
    }

    /// Build a sub-tree from plain data.
    ///
    /// Every id is checked before anything is added, so a failed import
    /// leaves the tree unchanged.
    pub fn import(&mut self, spec: &ResourceSpec) -> Result<&mut RunnerResource, RunnerError> {
        let mut ids = Vec::new();
        spec.collect_ids(&mut ids);

        let mut seen = HashSet::new();
        for id in ids {
            if id.is_empty() {
                return Err(RunnerError::MissingId);
            }
            if !seen.insert(id) || self.contains(id) {
                return Err(RunnerError::DuplicateResource { id: id.to_string() });
            }
        }

        let index = self.children.len();
        self.children.push(RunnerResource::from_spec(spec));
        Ok(&mut self.children[index])
    }

    fn from_spec(spec: &ResourceSpec) -> Self {
        let mut resource = RunnerResource::new(spec.id.clone());
        resource.states = spec.states.clone();
        resource.events = spec.events.clone();
        resource.initial_state = spec.initial_state.clone();
        resource.force_container = spec.force_container;
        resource.children = spec.children.iter().map(RunnerResource::from_spec).collect();
        resource
    }

    /// Export the plain-data part of the tree.
    pub fn to_spec(&self) -> ResourceSpec {
        ResourceSpec {
            id: self.id.clone(),
            states: self.states.clone(),
            events: self.events.clone(),
            initial_state: self.initial_state.clone(),
            force_container: self.force_container,
            children: self.children.iter().map(RunnerResource::to_spec).collect(),
        }
    }

    /// The setup configuration of this resource alone.
    pub fn profile(&self) -> RunnerProfile {
        RunnerProfile {
            traits: self.traits.clone(),
            states: self.states.clone(),
            initial_state: self.initial_state.clone(),
            events: self.events.clone(),
        }
    }
}

impl fmt::Debug for RunnerResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerResource")
            .field("id", &self.id)
            .field("controller", &self.controller.is_some())
            .field("traits", &self.traits)
            .field("states", &self.states)
            .field("events", &self.events)
            .field("initial_state", &self.initial_state)
            .field("force_container", &self.force_container)
            .field("children", &self.children)
            .finish()
    }
}
