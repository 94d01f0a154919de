//! Event sink that turns the manager's lifecycle callbacks into one result

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::completion::CompletionSource;
use crate::error::BridgeError;
use crate::manager::{SolutionBuildManager, UpdateSolutionEvents};
use crate::types::{BuildOutcome, EventsCookie, HierarchyId, HostStatus};

/// Listener lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Created, cookie not yet known
    Registering,
    /// Advised, no callback seen yet
    AwaitingBegin,
    /// Begin seen, waiting for the terminal event
    InProgress,
    /// Terminal event handled, further callbacks are ignored
    Done,
}

struct Inner {
    state: ListenerState,
    cookie: Option<EventsCookie>,
    /// Outcome of an `update_done` that arrived before the cookie did
    parked: Option<BuildOutcome>,
}

/// Sink advised for exactly one submitted update
pub struct BuildListener {
    manager: Weak<dyn SolutionBuildManager>,
    completion: CompletionSource,
    inner: Mutex<Inner>,
}

impl BuildListener {
    pub fn new(manager: &Arc<dyn SolutionBuildManager>, completion: CompletionSource) -> Self {
        Self {
            manager: Arc::downgrade(manager),
            completion,
            inner: Mutex::new(Inner {
                state: ListenerState::Registering,
                cookie: None,
                parked: None,
            }),
        }
    }

    pub fn state(&self) -> ListenerState {
        self.inner.lock().state
    }

    /// Hand over the cookie returned by advise.
    ///
    /// If the update already finished, the cookie is released and the
    /// parked outcome resolved right away.
    pub fn attach_cookie(&self, cookie: EventsCookie) {
        let parked = {
            let mut inner = self.inner.lock();
            if inner.state == ListenerState::Done {
                inner.parked.take()
            } else {
                inner.cookie = Some(cookie);
                if inner.state == ListenerState::Registering {
                    inner.state = ListenerState::AwaitingBegin;
                }
                None
            }
        };

        if let Some(outcome) = parked {
            tracing::debug!("Update finished before events {} were attached", cookie);
            self.finish(cookie, outcome);
        }
    }

    /// Abandon the listener without a cookie, e.g. when advise failed.
    pub fn abandon(&self) {
        self.inner.lock().state = ListenerState::Done;
        self.completion.resolve(false);
    }

    fn enter_in_progress(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            ListenerState::Registering | ListenerState::AwaitingBegin => {
                inner.state = ListenerState::InProgress;
            }
            ListenerState::InProgress => {}
            ListenerState::Done => {
                tracing::warn!("Build listener got a begin notification after done");
            }
        }
    }

    /// Release the cookie, then publish the result.
    fn finish(&self, cookie: EventsCookie, outcome: BuildOutcome) {
        match self.manager.upgrade() {
            Some(manager) => {
                let status = manager.unadvise_update_events(cookie);
                if !status.is_ok() {
                    tracing::warn!("{}", BridgeError::UnadviseFailed { cookie, status });
                }
            }
            None => {
                tracing::debug!("Build manager dropped before events {} were released", cookie);
            }
        }

        match outcome {
            BuildOutcome::Succeeded => tracing::info!("Build succeeded"),
            BuildOutcome::Failed => tracing::warn!("{}", BridgeError::BuildFailed),
            BuildOutcome::Cancelled => tracing::warn!("{}", BridgeError::BuildCancelled),
        }

        self.completion.resolve(outcome.into());
    }
}

impl UpdateSolutionEvents for BuildListener {
    fn update_begin(&self, cancel_update: &mut bool) -> HostStatus {
        *cancel_update = false;
        self.enter_in_progress();
        HostStatus::OK
    }

    fn update_start(&self, cancel_update: &mut bool) -> HostStatus {
        *cancel_update = false;
        self.enter_in_progress();
        HostStatus::OK
    }

    fn active_config_changed(&self, hierarchy: &HierarchyId) -> HostStatus {
        tracing::trace!("Active configuration changed for {}", hierarchy);
        HostStatus::OK
    }

    fn update_cancel(&self) -> HostStatus {
        tracing::debug!("Build manager is cancelling the update");
        HostStatus::OK
    }

    fn update_done(&self, succeeded: bool, modified: bool, cancelled: bool) -> HostStatus {
        let outcome = BuildOutcome::classify(succeeded, cancelled);
        tracing::debug!(succeeded, modified, cancelled, %outcome, "Update done");

        let cookie = {
            let mut inner = self.inner.lock();
            if inner.state == ListenerState::Done {
                tracing::warn!("Ignoring repeated update done notification");
                return HostStatus::OK;
            }
            inner.state = ListenerState::Done;
            let cookie = inner.cookie.take();
            if cookie.is_none() {
                inner.parked = Some(outcome);
            }
            cookie
        };

        if let Some(cookie) = cookie {
            self.finish(cookie, outcome);
        }
        HostStatus::OK
    }
}
