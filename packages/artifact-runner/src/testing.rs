//! Testing utilities for runners and their routing.
//!
//! # Feature Flag
//!
//! This module is only available with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! artifact-runner = { version = "0.1", features = ["testing"] }
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use artifact_runner::testing::{recording_trait, CallLog, RecordingController};
//!
//! let log = CallLog::new();
//! let mut consumer = Module::new("consumer");
//! consumer.setup(
//!     Some(Rc::new(RecordingController::new(&log))),
//!     Some(&RunnerProfile::new().with_trait(recording_trait(&log, &["onLoaderReady"]))),
//! );
//!
//! // ... build a sandbox, dispatch ...
//!
//! assert_eq!(log.entries(), vec!["qualify:stateless", "consumer.onLoaderReady"]);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use crate::attitude::Attitude;
use crate::core::Payload;
use crate::nature::Trait;
use crate::runner::Controller;

/// Shared, ordered record of calls.
///
/// Clones append to the same log, so one log can follow several
/// controllers and capabilities and assert their interleaving.
#[derive(Clone, Debug, Default)]
pub struct CallLog {
    entries: Rc<RefCell<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }

    /// How often `entry` was recorded.
    pub fn count(&self, entry: &str) -> usize {
        self.entries.borrow().iter().filter(|e| *e == entry).count()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.count(entry) > 0
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

/// Controller that records its hooks and keeps what `qualify` received.
///
/// Entries are `qualify:<state>` and `disqualify`, prefixed with
/// `<label>:` for labeled controllers.
#[derive(Debug)]
pub struct RecordingController {
    log: CallLog,
    label: Option<String>,
    details: RefCell<Option<Payload>>,
    attitude: RefCell<Option<Attitude>>,
}

impl RecordingController {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            label: None,
            details: RefCell::new(None),
            attitude: RefCell::new(None),
        }
    }

    pub fn labeled(log: &CallLog, label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::new(log)
        }
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Details of the most recent `qualify`.
    pub fn last_details(&self) -> Option<Payload> {
        self.details.borrow().clone()
    }

    /// The attitude handed to the most recent `qualify`.
    pub fn attitude(&self) -> Option<Attitude> {
        self.attitude.borrow().clone()
    }

    fn record(&self, entry: String) {
        match &self.label {
            Some(label) => self.log.push(format!("{label}:{entry}")),
            None => self.log.push(entry),
        }
    }
}

impl Controller for RecordingController {
    fn qualify(&self, attitude: &Attitude, details: Option<&Payload>) {
        *self.details.borrow_mut() = details.cloned();
        *self.attitude.borrow_mut() = Some(attitude.clone());
        self.record(format!("qualify:{}", attitude.current_name()));
    }

    fn disqualify(&self) {
        self.record("disqualify".to_string());
    }
}

/// A trait whose capabilities record `<runner id>.<name>` and return the
/// payload they received.
pub fn recording_trait(log: &CallLog, names: &[&str]) -> Trait {
    names.iter().fold(Trait::new(), |value, name| {
        let log = log.clone();
        let name = name.to_string();
        value.with(name.clone(), move |nature, payload, _meta| {
            log.push(format!("{}.{}", nature.id(), name));
            payload.clone()
        })
    })
}

/// Install a `tracing` subscriber for the current test binary.
///
/// Honors `RUST_LOG`; repeated calls are harmless.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
