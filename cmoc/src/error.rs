//! The fatal error taxonomy of the orchestration core.
//!
//! Every variant here names the scheduler, action, attribute and index
//! involved, per the propagation rule: all errors except non-convergence are
//! surfaced to the process with a formatted message identifying exactly what
//! went wrong. The core itself never calls `process::exit`; it is up to the
//! host to decide how "fatal" manifests (abort, log-and-exit, etc).

use derive_more::{Display, Error};

/// Result alias for fallible core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// The taxonomy of fatal (and one recoverable) error conditions described in
/// the core's error handling design.
#[derive(Debug, Clone, Display, Error)]
pub enum CoreError {
    /// Duplicate redefinition of a dataitem with an incompatible signature.
    #[display(
        "configuration error: dataitem \"{window}.{attr}\" was registered twice with incompatible signatures"
    )]
    IncompatibleRedefinition { window: String, attr: String },

    /// The physics module's backing library could not be loaded.
    #[display("configuration error: physics module library \"{library}\" could not be loaded")]
    ModuleLibraryMissing { library: String },

    /// An action was added to a scheduler under a name already in use.
    #[display("configuration error: action name \"{action}\" is already registered in scheduler \"{scheduler}\"")]
    DuplicateActionName { scheduler: String, action: String },

    /// `reads`/`writes` was called for an action not registered in the scheduler.
    #[display("scheduling error: action \"{action}\" is not registered in scheduler \"{scheduler}\"")]
    ActionNotRegistered { scheduler: String, action: String },

    /// An IN port has no matching OUT port anywhere in the scheduler.
    #[display(
        "scheduling error in scheduler \"{scheduler}\": could not find matching output for action \"{action}\" of attr: {attr} index: {index}"
    )]
    UnresolvedInput {
        scheduler: String,
        action: String,
        attr: String,
        index: usize,
    },

    /// An OUT port has no matching IN port anywhere in the scheduler.
    #[display(
        "scheduling error in scheduler \"{scheduler}\": could not find matching input for action \"{action}\" of attr: {attr} index: {index}"
    )]
    UnresolvedOutput {
        scheduler: String,
        action: String,
        attr: String,
        index: usize,
    },

    /// Two actions both expose an OUT port on the same `(attr, index)`, so an
    /// IN port requesting it is ambiguous.
    #[display(
        "scheduling error in scheduler \"{scheduler}\": duplicate input. action \"{action}\" can take input (attr: {attr} index: {index}) from either action \"{candidate}\" or action \"{existing}\""
    )]
    DuplicateProducer {
        scheduler: String,
        action: String,
        attr: String,
        index: usize,
        candidate: String,
        existing: String,
    },

    /// An OUT port's producer is already bound to a different consumer.
    #[display(
        "scheduling error in scheduler \"{scheduler}\": duplicate output. action \"{action}\" can provide output to either action \"{candidate}\" or action \"{existing}\""
    )]
    DuplicateConsumer {
        scheduler: String,
        action: String,
        candidate: String,
        existing: String,
    },

    /// A port slot remained unlinked after the dependency graph was built.
    #[display(
        "scheduling error in scheduler \"{scheduler}\": dangling port on action \"{action}\" (attr: {attr} index: {index})"
    )]
    DanglingPort {
        scheduler: String,
        action: String,
        attr: String,
        index: usize,
    },

    /// The topological sort stalled with actions remaining: a cycle exists.
    #[display(
        "scheduling error in scheduler \"{scheduler}\": cycle detected in the dependency graph, {remaining} action(s) unresolved"
    )]
    CycleDetected { scheduler: String, remaining: usize },

    /// `schedule()` was called a second time.
    #[display("scheduler \"{scheduler}\" has already been scheduled")]
    AlreadyScheduled { scheduler: String },

    /// An operation requiring `schedule()` to have run was invoked too early.
    #[display("scheduler \"{scheduler}\" has not been scheduled")]
    NotScheduled { scheduler: String },

    /// A non-optional dataitem handle lookup returned an absent handle.
    #[display(
        "action \"{action}\" cannot access dataitem \"{attr}\" (port {index}) as it does not exist"
    )]
    MissingDataItem {
        action: String,
        attr: String,
        index: usize,
    },

    /// Interpolation needed the previous value but it was absent.
    #[display("interpolation error: could not find the old dataitem for attribute \"{attr}\"")]
    MissingOldValue { attr: String },

    /// The reserved `t_old = -1` anchor, explicitly unimplemented upstream.
    #[display(
        "interpolation error: anchor time_old = -1 is reserved and unsupported (attribute \"{attr}\")"
    )]
    ReservedAnchor { attr: String },

    /// Any anchor convention other than 0, -0.5, or the reserved -1.
    #[display(
        "interpolation error: unsupported interpolation anchor time_old = {time_old} (attribute \"{attr}\")"
    )]
    UnsupportedAnchor { attr: String, time_old: f64 },

    /// `alpha` fell outside `[-1e-6, 1+1e-6]`.
    #[display(
        "interpolation error: alpha {alpha} is out of range for attribute \"{attr}\""
    )]
    InvalidAlpha { attr: String, alpha: f64 },

    /// The restart-info file was required (`t != 0`) but missing.
    #[display("restart error: restart-info file \"{path}\" not found")]
    RestartInfoNotFound { path: String },

    /// The restart-info file could not be written.
    #[display("restart error: could not write restart-info file \"{path}\": {reason}")]
    RestartInfoUnwritable { path: String, reason: String },

    /// A numeric-library operation was asked to operate on an absent handle.
    #[display("numeric library error: handle for \"{context}\" is absent")]
    AbsentHandle { context: String },
}
