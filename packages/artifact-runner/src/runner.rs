//! The runner contract and the lifecycle shared by modules and sandboxes.
//!
//! # Lifecycle
//!
//! ```text
//! new ──setup──► configured ──init──► initiated ──reset──► configured ──init──► ...
//!                                                                     │
//!                                 any state ──dispose──► disposed (terminal)
//! ```
//!
//! `setup` may be called any number of times before `init`; each call
//! replaces the previous configuration. `init` on an initiated runner and
//! `reset` on a configured runner are no-ops. The nature and the attitude
//! survive `reset` and are reused by the next `init`.

use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::attitude::{Attitude, State};
use crate::core::{AsAny, Payload};
use crate::nature::Nature;
use crate::resource::RunnerProfile;
use crate::sandbox::Sandbox;

/// Hooks a runner calls on its controller.
///
/// Both hooks are optional. Capabilities reach the concrete controller
/// through [`Nature::with_controller`].
pub trait Controller: AsAny {
    /// Called at the end of `init` with the runner's attitude.
    fn qualify(&self, _attitude: &Attitude, _details: Option<&Payload>) {}

    /// Called at the end of `reset`.
    fn disqualify(&self) {}
}

/// A lifecycle-managed unit binding a controller to a nature and an attitude.
pub trait Runner {
    fn id(&self) -> &str;

    /// Store the controller and copy the profile.
    fn setup(&mut self, controller: Option<Rc<dyn Controller>>, profile: Option<&RunnerProfile>);

    fn init(&mut self, details: Option<&Payload>);

    fn reset(&mut self);

    /// Reset and release everything. A disposed runner cannot be initiated.
    fn dispose(&mut self);

    fn is_initiated(&self) -> bool;

    fn is_disposed(&self) -> bool;

    /// The nature, present from the first `init` until `dispose`.
    fn nature(&self) -> Option<Nature>;

    /// The attitude, present from the first `init` until `dispose`.
    fn attitude(&self) -> Option<Attitude>;

    fn parent_id(&self) -> Option<&str>;

    /// Written by the owning sandbox on add and remove.
    fn set_parent(&mut self, parent: Option<String>);

    fn is_container(&self) -> bool {
        false
    }

    fn as_sandbox(&self) -> Option<&Sandbox> {
        None
    }

    fn as_sandbox_mut(&mut self) -> Option<&mut Sandbox> {
        None
    }
}

impl fmt::Debug for dyn Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("id", &self.id())
            .field("container", &self.is_container())
            .field("initiated", &self.is_initiated())
            .finish()
    }
}

/// Locates a child of a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKey<'a> {
    Id(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for ChildKey<'a> {
    fn from(id: &'a str) -> Self {
        ChildKey::Id(id)
    }
}

impl From<usize> for ChildKey<'_> {
    fn from(index: usize) -> Self {
        ChildKey::Index(index)
    }
}

// =============================================================================
// Shared lifecycle
// =============================================================================

/// Configuration and identity state common to every runner kind.
pub(crate) struct RunnerCore {
    pub(crate) id: String,
    pub(crate) parent_id: Option<String>,
    pub(crate) controller: Option<Rc<dyn Controller>>,
    pub(crate) profile: RunnerProfile,
    pub(crate) nature: Option<Nature>,
    pub(crate) attitude: Option<Attitude>,
    pub(crate) initiated: bool,
    pub(crate) disposed: bool,
}

impl RunnerCore {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            controller: None,
            profile: RunnerProfile::default(),
            nature: None,
            attitude: None,
            initiated: false,
            disposed: false,
        }
    }

    pub(crate) fn setup(&mut self, controller: Option<Rc<dyn Controller>>, profile: Option<&RunnerProfile>) {
        if let Some(profile) = profile {
            self.profile = profile.clone();
        }
        self.controller = controller;
    }

    /// Whether `init` should run; logs the refusal after dispose.
    pub(crate) fn can_init(&self) -> bool {
        if self.disposed {
            warn!(runner = %self.id, "init after dispose ignored");
            return false;
        }
        !self.initiated
    }

    /// First half of `init`: create or reuse the nature and attitude, hand
    /// the controller to the nature, build the states and install the traits.
    pub(crate) fn prepare<F>(&mut self, notify: F) -> (Nature, Attitude)
    where
        F: FnOnce(&Nature) -> Box<dyn Fn(&State)>,
    {
        let nature = self
            .nature
            .get_or_insert_with(|| Nature::new(self.id.clone()))
            .clone();
        let attitude = match &self.attitude {
            Some(attitude) => attitude.clone(),
            None => {
                let attitude = Attitude::with_notify(notify(&nature));
                self.attitude = Some(attitude.clone());
                attitude
            }
        };

        nature.set_controller(self.controller.clone());
        attitude.set_states(
            self.profile.states.as_ref(),
            self.profile.initial_state.as_deref(),
        );
        for value in &self.profile.traits {
            nature.add_trait(value);
        }
        (nature, attitude)
    }

    /// Last half of `init`.
    pub(crate) fn qualify(&mut self, attitude: &Attitude, details: Option<&Payload>) {
        if let Some(controller) = self.controller.clone() {
            controller.qualify(attitude, details);
        }
        self.initiated = true;
        debug!(runner = %self.id, state = %attitude.current_name(), "runner initiated");
    }

    /// Remove the traits and collapse the attitude.
    pub(crate) fn release(&mut self) {
        if let Some(nature) = &self.nature {
            for value in &self.profile.traits {
                nature.remove_trait(value);
            }
        }
        if let Some(attitude) = &self.attitude {
            attitude.unset_states();
        }
    }

    pub(crate) fn disqualify(&mut self) {
        if let Some(controller) = self.controller.clone() {
            controller.disqualify();
        }
        self.initiated = false;
        debug!(runner = %self.id, "runner reset");
    }

    /// Drop every reference; the runner becomes terminal.
    pub(crate) fn clear(&mut self) {
        if let Some(nature) = self.nature.take() {
            nature.set_controller(None);
        }
        self.attitude = None;
        self.controller = None;
        self.profile = RunnerProfile::default();
        self.parent_id = None;
        self.disposed = true;
        debug!(runner = %self.id, "runner disposed");
    }
}

impl fmt::Debug for RunnerCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerCore")
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .field("initiated", &self.initiated)
            .field("disposed", &self.disposed)
            .finish()
    }
}
