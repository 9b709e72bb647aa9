//! Structured error types for the runner hierarchy.
//!
//! `RunnerError` provides pattern-matchable configuration errors.
//!
//! # What Is Not An Error
//!
//! Expected, frequent outcomes are signalled with plain return values and
//! never surface here:
//!
//! - an illegal state transition returns `false`
//! - dispatching a type nobody listens to returns `false`
//! - registering or removing without a type is a no-op
//! - `init` on an initiated runner, `reset` on a reset runner are no-ops
//! - an event with no entry in a sandbox event map simply has no destinations
//!
//! # Example
//!
//! ```ignore
//! use artifact_runner::{RunnerError, RunnerResource};
//!
//! let mut root = RunnerResource::root("root");
//! root.add_resource("player")?;
//! match root.add_resource("player") {
//!     Err(RunnerError::DuplicateResource { id }) => eprintln!("{id} already defined"),
//!     _ => unreachable!(),
//! }
//! ```

use thiserror::Error;

/// Configuration errors raised at the call site.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A resource or runner was requested without an id.
    #[error("id not defined")]
    MissingId,

    /// A resource id is already present in the resource tree.
    #[error("resource with the id `{id}` already defined")]
    DuplicateResource {
        /// The conflicting id.
        id: String,
    },

    /// An event type pattern failed to compile.
    #[error("invalid event type pattern `{pattern}`")]
    InvalidPattern {
        /// The pattern source as given.
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A dotted destination path of an event map does not resolve.
    #[error("route `{path}` for `{origin}`/`{event_type}` does not resolve at `{segment}`")]
    UnresolvedRoute {
        /// Origin key of the event map entry (`"nature"` for the sandbox itself).
        origin: String,
        /// Event type of the event map entry.
        event_type: String,
        /// The full dotted path.
        path: String,
        /// The first segment that did not resolve.
        segment: String,
    },

    /// No factory handler accepts the resource.
    #[error("no factory handler accepts resource `{id}`")]
    NoHandler {
        /// Id of the unhandled resource.
        id: String,
    },

    /// A resource document could not be parsed.
    #[error("invalid resource document: {0}")]
    Config(#[from] serde_json::Error),
}
