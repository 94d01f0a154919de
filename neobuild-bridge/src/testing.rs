//! In-memory build manager for unit tests

use std::sync::Arc;

use parking_lot::Mutex;

use crate::completion::BuildFuture;
use crate::manager::{SolutionBuildManager, UpdateSolutionEvents};
use crate::types::{EventsCookie, HostStatus, UpdateRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerCall {
    Start,
    Advise,
    Unadvise(EventsCookie),
}

#[derive(Default)]
struct State {
    calls: Vec<ManagerCall>,
    requests: Vec<UpdateRequest>,
    sinks: Vec<(EventsCookie, Arc<dyn UpdateSolutionEvents>)>,
    next_cookie: u32,
    observed: Option<BuildFuture>,
    seen_at_unadvise: Option<Option<bool>>,
}

/// Records every call and lets the test fire events by hand
pub struct FakeBuildManager {
    start_status: HostStatus,
    advise_status: HostStatus,
    state: Mutex<State>,
}

impl FakeBuildManager {
    pub fn accepting() -> Self {
        Self {
            start_status: HostStatus::OK,
            advise_status: HostStatus::OK,
            state: Mutex::new(State::default()),
        }
    }

    pub fn rejecting(status: HostStatus) -> Self {
        Self {
            start_status: status,
            ..Self::accepting()
        }
    }

    pub fn refusing_advise(status: HostStatus) -> Self {
        Self {
            advise_status: status,
            ..Self::accepting()
        }
    }

    pub fn calls(&self) -> Vec<ManagerCall> {
        self.state.lock().calls.clone()
    }

    pub fn advise_count(&self) -> usize {
        self.count(|c| matches!(c, ManagerCall::Advise))
    }

    pub fn unadvise_count(&self) -> usize {
        self.count(|c| matches!(c, ManagerCall::Unadvise(_)))
    }

    fn count(&self, pred: impl Fn(&ManagerCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn last_request(&self) -> Option<UpdateRequest> {
        self.state.lock().requests.last().cloned()
    }

    /// The most recently advised sink, even if it has since been unadvised
    pub fn sink(&self) -> Arc<dyn UpdateSolutionEvents> {
        self.state
            .lock()
            .sinks
            .last()
            .map(|(_, sink)| sink.clone())
            .expect("no sink advised")
    }

    /// Record what `future` reports at the moment unadvise is called
    pub fn observe_on_unadvise(&self, future: BuildFuture) {
        self.state.lock().observed = Some(future);
    }

    pub fn result_seen_at_unadvise(&self) -> Option<Option<bool>> {
        self.state.lock().seen_at_unadvise
    }
}

impl SolutionBuildManager for FakeBuildManager {
    fn start_update(&self, request: &UpdateRequest) -> HostStatus {
        let mut state = self.state.lock();
        state.calls.push(ManagerCall::Start);
        state.requests.push(request.clone());
        self.start_status
    }

    fn advise_update_events(
        &self,
        sink: Arc<dyn UpdateSolutionEvents>,
    ) -> Result<EventsCookie, HostStatus> {
        let mut state = self.state.lock();
        state.calls.push(ManagerCall::Advise);
        if !self.advise_status.is_ok() {
            return Err(self.advise_status);
        }
        state.next_cookie += 1;
        let cookie = EventsCookie(state.next_cookie);
        state.sinks.push((cookie, sink));
        Ok(cookie)
    }

    fn unadvise_update_events(&self, cookie: EventsCookie) -> HostStatus {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.calls.push(ManagerCall::Unadvise(cookie));
        if let Some(future) = &state.observed {
            state.seen_at_unadvise = Some(future.try_result());
        }
        HostStatus::OK
    }
}
