//! Contracts between the bridge and an external build manager
//!
//! A manager accepts update requests, runs them on its own schedule and
//! reports progress to every advised [`UpdateSolutionEvents`] sink. The
//! bridge never drives the build itself; it only sees the start/end
//! envelope through these two traits.

use std::sync::Arc;

use crate::types::{EventsCookie, HierarchyId, HostStatus, UpdateRequest};

/// Lifecycle callbacks delivered by a build manager
///
/// Order per update: `update_begin`, `update_start`, any number of
/// `active_config_changed` / `update_cancel`, then exactly one
/// `update_done`. Implementations return [`HostStatus::OK`] unless they
/// want the manager to treat the call as failed.
pub trait UpdateSolutionEvents: Send + Sync {
    /// Called before any build action. Setting `cancel_update` to `true`
    /// vetoes the update.
    fn update_begin(&self, cancel_update: &mut bool) -> HostStatus;

    /// Called before the first project configuration is built.
    fn update_start(&self, cancel_update: &mut bool) -> HostStatus;

    /// The active configuration of a project changed.
    fn active_config_changed(&self, hierarchy: &HierarchyId) -> HostStatus;

    /// The update is being cancelled. `update_done` still follows.
    fn update_cancel(&self) -> HostStatus;

    /// The whole update finished.
    ///
    /// `succeeded` is true if no action failed, `modified` if any action
    /// succeeded, `cancelled` if the update was cancelled.
    fn update_done(&self, succeeded: bool, modified: bool, cancelled: bool) -> HostStatus;
}

/// An external build manager
pub trait SolutionBuildManager: Send + Sync {
    /// Ask the manager to start updating the requested targets.
    ///
    /// Returns immediately. [`HostStatus::OK`] means the update was
    /// accepted, not that it finished or succeeded.
    fn start_update(&self, request: &UpdateRequest) -> HostStatus;

    /// Register an event sink, returning the cookie needed to remove it.
    fn advise_update_events(
        &self,
        sink: Arc<dyn UpdateSolutionEvents>,
    ) -> Result<EventsCookie, HostStatus>;

    /// Remove a previously advised sink.
    fn unadvise_update_events(&self, cookie: EventsCookie) -> HostStatus;
}
