//! Runtime facade: a resource tree plus a factory.
//!
//! The `Runtime` is the main entry point for building runner hierarchies
//! from declarative descriptions. It coordinates:
//! - A resource tree rooted at `"root"`
//! - A factory turning resources into runners
//!
//! # Example
//!
//! ```ignore
//! let mut runtime = Runtime::from_json(include_str!("app.json"))?;
//! runtime
//!     .resources_mut()
//!     .get_mut("consumer")
//!     .unwrap()
//!     .traits
//!     .push(consumer_trait);
//!
//! let mut app = runtime.create("app", false)?;
//! app.init(None);
//! ```

use tracing::{debug, warn};

use crate::error::RunnerError;
use crate::factory::RunnerFactory;
use crate::resource::{ResourceSpec, RunnerResource};
use crate::runner::Runner;

/// Id of the resource tree root.
pub const ROOT_ID: &str = "root";

/// Resource tree and factory.
#[derive(Debug)]
pub struct Runtime {
    resources: RunnerResource,
    factory: RunnerFactory,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_factory(RunnerFactory::default())
    }

    pub fn with_factory(factory: RunnerFactory) -> Self {
        Self {
            resources: RunnerResource::new(ROOT_ID),
            factory,
        }
    }

    /// A runtime whose tree holds the imported document.
    pub fn from_spec(spec: &ResourceSpec) -> Result<Self, RunnerError> {
        let mut runtime = Self::new();
        runtime.resources.import(spec)?;
        Ok(runtime)
    }

    pub fn from_json(document: &str) -> Result<Self, RunnerError> {
        Self::from_spec(&ResourceSpec::from_json(document)?)
    }

    pub fn resources(&self) -> &RunnerResource {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut RunnerResource {
        &mut self.resources
    }

    pub fn factory(&self) -> &RunnerFactory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut RunnerFactory {
        &mut self.factory
    }

    /// Build the runner hierarchy for `id`.
    ///
    /// An unknown id gets an empty resource first. `force_container` is
    /// stored on the resource and makes the factory build a sandbox even
    /// without children.
    pub fn create(&mut self, id: &str, force_container: bool) -> Result<Box<dyn Runner>, RunnerError> {
        if id.is_empty() {
            return Err(RunnerError::MissingId);
        }
        let resource = self.resources.get_or_add(id)?;
        resource.force_container = force_container;

        let runner = Self::build(&self.factory, resource).ok_or_else(|| RunnerError::NoHandler {
            id: id.to_string(),
        })?;
        debug!(runner = %id, container = runner.is_container(), "runner hierarchy created");
        Ok(runner)
    }

    fn build(factory: &RunnerFactory, resource: &RunnerResource) -> Option<Box<dyn Runner>> {
        let mut runner = factory.create(resource)?;
        for child_resource in resource.children() {
            let Some(child) = Self::build(factory, child_resource) else {
                warn!(resource = %child_resource.id(), "no handler for child resource");
                continue;
            };
            match runner.as_sandbox_mut() {
                Some(sandbox) => sandbox.add_child(child, None),
                None => warn!(
                    runner = %runner.id(),
                    child = %child.id(),
                    "runner is not a container; child dropped"
                ),
            }
        }
        Some(runner)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
