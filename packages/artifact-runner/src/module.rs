//! Leaf runner.
//!
//! A module re-dispatches every state its attitude enters (or updates) on
//! its nature, with the state name as event type and the state snapshot as
//! payload. A parent sandbox routes those events like any other.
//!
//! # Example
//!
//! ```ignore
//! let mut player = Module::new("player");
//! player.setup(
//!     Some(Rc::new(PlayerController::default())),
//!     Some(&RunnerProfile::new()
//!         .with_states(transitions! { "play" => ["pause"], "pause" => ["play"] })
//!         .with_trait(Trait::new().with("load", load))),
//! );
//! player.init(None);
//! player.nature().unwrap().call("load", None);
//! ```

use std::rc::Rc;

use tracing::trace;

use crate::attitude::{Attitude, State};
use crate::core::Payload;
use crate::nature::Nature;
use crate::resource::RunnerProfile;
use crate::runner::{Controller, Runner, RunnerCore};

/// A runner without children.
#[derive(Debug)]
pub struct Module {
    core: RunnerCore,
}

impl Module {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            core: RunnerCore::new(id),
        }
    }
}

impl Runner for Module {
    fn id(&self) -> &str {
        &self.core.id
    }

    fn setup(&mut self, controller: Option<Rc<dyn Controller>>, profile: Option<&RunnerProfile>) {
        self.core.setup(controller, profile);
    }

    fn init(&mut self, details: Option<&Payload>) {
        if !self.core.can_init() {
            return;
        }
        let (_, attitude) = self.core.prepare(|nature| {
            let nature = nature.downgrade();
            Box::new(move |state: &State| {
                if let Some(nature) = nature.upgrade() {
                    trace!(runner = %nature.id(), state = %state.name(), "state notified");
                    nature.dispatch(state.name(), Some(&state.to_payload()));
                }
            })
        });
        self.core.qualify(&attitude, details);
    }

    fn reset(&mut self) {
        if !self.core.initiated {
            return;
        }
        self.core.release();
        self.core.disqualify();
    }

    fn dispose(&mut self) {
        if self.core.disposed {
            return;
        }
        self.reset();
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EventMeta, Listener};
    use crate::nature::Trait;
    use crate::testing::{CallLog, RecordingController};
    use crate::transitions;
    use serde_json::json;
    use std::cell::RefCell;

    fn player_profile() -> RunnerProfile {
        RunnerProfile::new()
            .with_states(transitions! {
                "play" => ["pause"],
                "pause" => ["play", "stop"],
                "stop" => ["play"],
            })
            .with_initial_state("stop")
            .with_trait(Trait::new().with("load", |nature, _, _| json!(nature.id())))
    }

    #[test]
    fn test_init_creates_nature_and_attitude() {
        let mut module = Module::new("player");
        module.setup(None, Some(&player_profile()));
        assert!(module.nature().is_none());

        module.init(None);

        assert!(module.is_initiated());
        let nature = module.nature().unwrap();
        assert_eq!(nature.id(), "player");
        assert_eq!(nature.call("load", None), Some(json!("player")));
        assert_eq!(module.attitude().unwrap().current_name(), "stop");
    }

    #[test]
    fn test_setup_copies_profile() {
        let mut profile = player_profile();
        let mut module = Module::new("player");
        module.setup(None, Some(&profile));

        profile.initial_state = Some("play".to_string());
        profile.traits.clear();
        module.init(None);

        assert_eq!(module.attitude().unwrap().current_name(), "stop");
        assert!(module.nature().unwrap().has_capability("load"));
    }

    #[test]
    fn test_setup_twice_overwrites() {
        let mut module = Module::new("player");
        module.setup(None, Some(&player_profile()));
        module.setup(None, Some(&RunnerProfile::new().with_initial_state("idle")));
        module.init(None);

        assert_eq!(module.attitude().unwrap().current_name(), "idle");
        assert!(!module.nature().unwrap().has_capability("load"));
    }

    #[test]
    fn test_controller_hooks() {
        let log = CallLog::new();
        let controller = Rc::new(RecordingController::new(&log));
        let mut module = Module::new("player");
        module.setup(Some(controller.clone()), Some(&player_profile()));

        module.init(Some(&json!({"volume": 3})));
        module.init(None);
        module.reset();
        module.reset();

        assert_eq!(log.entries(), vec!["qualify:stop", "disqualify"]);
        assert_eq!(controller.last_details(), Some(json!({"volume": 3})));
    }

    #[test]
    fn test_controller_reachable_from_nature() {
        let log = CallLog::new();
        let mut module = Module::new("player");
        module.setup(Some(Rc::new(RecordingController::new(&log))), None);
        module.init(None);

        let found = module
            .nature()
            .unwrap()
            .with_controller(|c: &RecordingController| c.log().len());
        assert_eq!(found, Some(1));
    }

    #[test]
    fn test_state_changes_dispatch_on_nature() {
        let mut module = Module::new("player");
        module.setup(None, Some(&player_profile()));
        module.init(None);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        module.nature().unwrap().on(
            "*",
            &Listener::new(move |payload: &Payload, meta: &EventMeta<Nature>| {
                sink.borrow_mut()
                    .push((meta.event_type.clone(), payload["name"].clone()));
            }),
        );

        let attitude = module.attitude().unwrap();
        assert!(attitude.change("play", None));
        assert!(!attitude.change("play", None));

        assert_eq!(
            *seen.borrow(),
            vec![
                ("play".to_string(), json!("play")),
                ("play".to_string(), json!("play")),
            ]
        );
    }

    #[test]
    fn test_reset_keeps_nature_and_attitude() {
        let mut module = Module::new("player");
        module.setup(None, Some(&player_profile()));
        module.init(None);
        let nature = module.nature().unwrap();
        let attitude = module.attitude().unwrap();
        attitude.change("play", None);

        module.reset();

        assert!(!module.is_initiated());
        assert!(!nature.has_capability("load"));
        assert_eq!(attitude.state_names(), vec!["stateless"]);

        module.init(None);
        assert!(module.nature().unwrap().ptr_eq(&nature));
        assert_eq!(attitude.current_name(), "stop");
        assert!(nature.has_capability("load"));
    }

    #[test]
    fn test_notify_survives_reset_cycle() {
        let mut module = Module::new("player");
        module.setup(None, Some(&player_profile()));
        module.init(None);
        module.reset();
        module.init(None);

        let hits = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&hits);
        module
            .nature()
            .unwrap()
            .on("play", &Listener::new(move |_, _| *counter.borrow_mut() += 1));

        module.attitude().unwrap().change("play", None);
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn test_dispose_is_terminal() {
        let log = CallLog::new();
        let mut module = Module::new("player");
        module.setup(Some(Rc::new(RecordingController::new(&log))), Some(&player_profile()));
        module.init(None);

        module.dispose();

        assert!(module.is_disposed());
        assert!(!module.is_initiated());
        assert!(module.nature().is_none());
        assert!(module.attitude().is_none());
        assert_eq!(log.entries(), vec!["qualify:stop", "disqualify"]);

        module.init(None);
        assert!(!module.is_initiated());
        assert!(module.nature().is_none());
    }

    #[test]
    fn test_dispose_without_init() {
        let mut module = Module::new("player");
        module.dispose();
        assert!(module.is_disposed());
        assert!(module.nature().is_none());
    }
}
