//! Builds runners from resources.
//!
//! A factory holds two ordered chains:
//!
//! - **handlers**: the first handler whose predicate accepts a resource
//!   creates the runner
//! - **wrappers**: every wrapper whose predicate accepts the resource then
//!   decorates the created runner, in chain order
//!
//! The default factory creates a [`Sandbox`] for resources with children or
//! a forced container, and a [`Module`] for everything else with an id.
//!
//! # Example
//!
//! ```ignore
//! let mut factory = RunnerFactory::default();
//! factory.add_wrapper(
//!     |resource| resource.id().starts_with("audited-"),
//!     |_, runner| Box::new(Audited::new(runner)),
//! );
//! let runner = factory.create(&resource);
//! ```

use std::fmt;

use tracing::trace;

use crate::module::Module;
use crate::resource::RunnerResource;
use crate::runner::Runner;
use crate::sandbox::Sandbox;

type Predicate = dyn Fn(&RunnerResource) -> bool;
type CreateFn = dyn Fn(&RunnerResource) -> Box<dyn Runner>;
type WrapFn = dyn Fn(&RunnerResource, Box<dyn Runner>) -> Box<dyn Runner>;

/// A predicate paired with the action it guards.
pub struct FactoryItem<F: ?Sized> {
    id: String,
    can_handle: Box<Predicate>,
    action: Box<F>,
}

impl<F: ?Sized> FactoryItem<F> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn can_handle(&self, resource: &RunnerResource) -> bool {
        (self.can_handle)(resource)
    }
}

impl<F: ?Sized> fmt::Debug for FactoryItem<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryItem").field("id", &self.id).finish()
    }
}

pub type Handler = FactoryItem<CreateFn>;
pub type Wrapper = FactoryItem<WrapFn>;

/// Ordered handler and wrapper chains.
///
/// Item ids are `handler-<n>` and `wrapper-<n>`, counted per factory.
#[derive(Debug)]
pub struct RunnerFactory {
    handlers: Vec<Handler>,
    wrappers: Vec<Wrapper>,
    handler_count: usize,
    wrapper_count: usize,
}

impl RunnerFactory {
    /// A factory with empty chains.
    pub fn empty() -> Self {
        Self {
            handlers: Vec::new(),
            wrappers: Vec::new(),
            handler_count: 0,
            wrapper_count: 0,
        }
    }

    /// Append a handler; returns its id.
    pub fn add_handler(
        &mut self,
        can_handle: impl Fn(&RunnerResource) -> bool + 'static,
        create: impl Fn(&RunnerResource) -> Box<dyn Runner> + 'static,
    ) -> String {
        let id = format!("handler-{}", self.handler_count);
        self.handler_count += 1;
        self.handlers.push(FactoryItem {
            id: id.clone(),
            can_handle: Box::new(can_handle),
            action: Box::new(create),
        });
        id
    }

    /// Append a wrapper; returns its id.
    pub fn add_wrapper(
        &mut self,
        can_handle: impl Fn(&RunnerResource) -> bool + 'static,
        wrap: impl Fn(&RunnerResource, Box<dyn Runner>) -> Box<dyn Runner> + 'static,
    ) -> String {
        let id = format!("wrapper-{}", self.wrapper_count);
        self.wrapper_count += 1;
        self.wrappers.push(FactoryItem {
            id: id.clone(),
            can_handle: Box::new(can_handle),
            action: Box::new(wrap),
        });
        id
    }

    pub fn remove_handler(&mut self, id: &str) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|item| item.id != id);
        self.handlers.len() != before
    }

    pub fn remove_wrapper(&mut self, id: &str) -> bool {
        let before = self.wrappers.len();
        self.wrappers.retain(|item| item.id != id);
        self.wrappers.len() != before
    }

    pub fn handlers(&self) -> &[Handler] {
        &self.handlers
    }

    pub fn wrappers(&self) -> &[Wrapper] {
        &self.wrappers
    }

    /// Create and decorate a runner, or `None` if no handler accepts the resource.
    pub fn create(&self, resource: &RunnerResource) -> Option<Box<dyn Runner>> {
        let handler = self.handlers.iter().find(|item| item.can_handle(resource))?;
        trace!(resource = %resource.id(), handler = %handler.id, "runner created");
        let created = (handler.action)(resource);

        let runner = self
            .wrappers
            .iter()
            .filter(|item| item.can_handle(resource))
            .fold(created, |runner, wrapper| {
                trace!(resource = %resource.id(), wrapper = %wrapper.id, "runner wrapped");
                (wrapper.action)(resource, runner)
            });
        Some(runner)
    }
}

impl Default for RunnerFactory {
    /// Sandbox handler first, then module handler.
    fn default() -> Self {
        let mut factory = Self::empty();
        factory.add_handler(
            |resource| !resource.id().is_empty() && resource.is_container(),
            |resource| {
                let mut sandbox = Sandbox::new(resource.id());
                sandbox.setup(resource.controller.clone(), Some(&resource.profile()));
                Box::new(sandbox)
            },
        );
        factory.add_handler(
            |resource| !resource.id().is_empty(),
            |resource| {
                let mut module = Module::new(resource.id());
                module.setup(resource.controller.clone(), Some(&resource.profile()));
                Box::new(module)
            },
        );
        factory
    }
}
