//! # Artifact Runner
//!
//! A synchronous, event-driven runtime where runners own state, natures
//! expose capabilities, and sandboxes route events between their children.
//!
//! ## Core Concepts
//!
//! Every runner pairs two things:
//! - [`Nature`] = what a runner can do (capabilities plus an event bus)
//! - [`Attitude`] = what a runner is doing (a finite-state machine)
//!
//! A [`Module`] is a leaf runner. A [`Sandbox`] owns child runners and
//! routes the events they dispatch to capabilities named by path, such as
//! `"consumer.onLoaderReady"`.
//!
//! ## Architecture
//!
//! ```text
//! ResourceSpec (JSON)
//!     │
//!     ▼ import()
//! RunnerResource tree ──► RunnerFactory.create()
//!                               │
//!                               ▼
//!                         Sandbox "app"
//!                          │   ├─ own Nature ◄───────────── re-dispatch
//!                          │   └─ EventRouteCache              ▲
//!                          │                                   │
//!            ┌─────────────┴────────────┐                      │
//!            ▼                          ▼                      │
//!      Module "loader"            Module "consumer"            │
//!        Nature.dispatch("onReady")     ▲                      │
//!            │                          │                      │
//!            └─► route "loader/onReady" ┴─► consumer.onLoaderReady
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Dispatch is synchronous** - every listener runs before `dispatch` returns
//! 2. **Lower priority runs first** - ties keep registration order
//! 3. **The initial state is always reachable** - from every state
//! 4. **Routes resolve once** - until the sandbox resets
//! 5. **Only wired children route** - a removed child's events stay local
//! 6. **Disposal is terminal** - a disposed runner never initiates again
//!
//! ## Example
//!
//! ```ignore
//! use artifact_runner::{Runner, Runtime, Trait};
//! use serde_json::Value;
//!
//! let mut runtime = Runtime::from_json(r#"{
//!     "id": "app",
//!     "events": { "loader": { "onReady": ["consumer.onLoaderReady"] } },
//!     "children": [{ "id": "loader" }, { "id": "consumer" }]
//! }"#)?;
//!
//! runtime.resources_mut().get_mut("consumer").unwrap().traits.push(
//!     Trait::new().with("onLoaderReady", |_, payload, _| {
//!         println!("loader ready: {payload}");
//!         Value::Null
//!     }),
//! );
//!
//! let mut app = runtime.create("app", false)?;
//! app.init(None);
//!
//! let loader = app.as_sandbox().unwrap().get_child("loader", false).unwrap();
//! loader.nature().unwrap().dispatch("onReady", None);
//! ```
//!
//! ## What This Is Not
//!
//! - Not thread-safe: handles are `Rc` based and stay on one thread
//! - Not asynchronous: there is no queue between dispatch and delivery
//! - Not persistent: resources can be exported, runner state cannot

// Core modules
mod attitude;
mod bus;
mod core;
mod error;
mod factory;
mod module;
mod nature;
mod resource;
mod route_cache;
mod runner;
mod runtime;
mod sandbox;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;


// Re-export core types
pub use crate::core::{AsAny, Detail, EventMeta, EventType, Listener, Payload, ALL_TYPES};

// Re-export error types
pub use crate::error::RunnerError;

// Re-export the event bus
pub use bus::{EventBus, DEFAULT_PRIORITY};

// Re-export state machine types
pub use attitude::{merge_detail, Attitude, State, Transition, Transitions, STATELESS};

// Re-export nature types
pub use nature::{Capability, Member, Nature, Trait, WeakNature};

// Re-export runner types
pub use module::Module;
pub use runner::{ChildKey, Controller, Runner};
pub use sandbox::Sandbox;

// Re-export routing types
pub use route_cache::{Destination, EventRouteCache, Route, RouteKey, OWN_NATURE};

// Re-export resource and factory types
pub use factory::{FactoryItem, Handler, RunnerFactory, Wrapper};
pub use resource::{EventMap, ResourceSpec, RunnerProfile, RunnerResource};

// Re-export runtime
pub use runtime::{Runtime, ROOT_ID};
