//! Build manager that runs configured commands per target
//!
//! `start_update` only queues; the update runs when the owner calls
//! [`ProcessBuildManager::pump`], which delivers every lifecycle callback on
//! the calling thread. That keeps the manager a single event source and
//! guarantees that a caller which advises right after starting never
//! misses the first event.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;
use indexmap::IndexMap;
use neobuild_bridge::{
    EventsCookie,
    HierarchyId,
    HostStatus,
    SolutionBuildManager,
    UpdateFlags,
    UpdateRequest,
    UpdateSolutionEvents,
};
use parking_lot::Mutex;

use crate::config::{HostConfig, TargetConfig};
use crate::runner::CommandRunner;
use crate::types::{BuildEvent, BuildEventType, BuildStep, StepResult, now_ms};

#[derive(Default)]
struct HostState {
    sinks: IndexMap<EventsCookie, Arc<dyn UpdateSolutionEvents>>,
    next_cookie: u32,
    queued: Option<UpdateRequest>,
    running: bool,
}

/// Terminal flags reported with `update_done`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UpdateSummary {
    succeeded: bool,
    modified: bool,
    cancelled: bool,
}

pub struct ProcessBuildManager {
    targets: IndexMap<HierarchyId, TargetConfig>,
    state: Mutex<HostState>,
    cancel_flag: Arc<AtomicBool>,
    event_sender: Option<Sender<BuildEvent>>,
}

impl ProcessBuildManager {
    pub fn new(targets: IndexMap<HierarchyId, TargetConfig>) -> Self {
        Self {
            targets,
            state: Mutex::new(HostState::default()),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            event_sender: None,
        }
    }

    pub fn from_config(config: &HostConfig) -> Self {
        Self::new(
            config
                .targets
                .iter()
                .map(|(name, target)| (HierarchyId::new(name), target.clone()))
                .collect(),
        )
    }

    /// Stream output and progress events to `sender`
    pub fn with_event_sender(mut self, sender: Sender<BuildEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Configured targets in declaration order
    pub fn target_names(&self) -> impl Iterator<Item = &HierarchyId> {
        self.targets.keys()
    }

    /// Whether an update is queued or running
    pub fn is_busy(&self) -> bool {
        let state = self.state.lock();
        state.running || state.queued.is_some()
    }

    pub fn advised_count(&self) -> usize {
        self.state.lock().sinks.len()
    }

    /// Cancel the queued or running update.
    ///
    /// Returns false if there was nothing to cancel.
    pub fn cancel(&self) -> bool {
        if !self.is_busy() {
            return false;
        }
        tracing::info!("Cancelling build");
        self.cancel_flag.store(true, Ordering::Relaxed);
        true
    }

    /// Run the queued update, if any, on the calling thread.
    ///
    /// Returns false when nothing was queued.
    pub fn pump(&self) -> bool {
        let request = {
            let mut state = self.state.lock();
            if state.running {
                return false;
            }
            match state.queued.take() {
                Some(request) => {
                    state.running = true;
                    request
                }
                None => return false,
            }
        };

        let summary = self.run_update(&request);
        self.state.lock().running = false;

        self.dispatch(|sink| {
            sink.update_done(summary.succeeded, summary.modified, summary.cancelled)
        });
        true
    }

    fn run_update(&self, request: &UpdateRequest) -> UpdateSummary {
        self.emit(
            BuildEventType::Started,
            None,
            format!("Updating {} target(s)", request.len()),
            None,
        );

        let mut cancelled = self.veto_requested(|sink, cancel| sink.update_begin(cancel))
            || self.veto_requested(|sink, cancel| sink.update_start(cancel));
        let mut succeeded = true;
        let mut modified = false;

        for (index, (hierarchy, flags)) in request.iter().enumerate() {
            if cancelled || self.cancel_flag.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }
            self.dispatch(|sink| sink.active_config_changed(hierarchy));

            let Some(target) = self.targets.get(hierarchy) else {
                tracing::error!("Target {} disappeared from the configuration", hierarchy);
                succeeded = false;
                continue;
            };

            for step in steps_for(flags) {
                match self.run_step(hierarchy, target, step) {
                    Ok(result) if result.cancelled => {
                        cancelled = true;
                        break;
                    }
                    Ok(result) if result.success => modified = true,
                    Ok(result) => {
                        tracing::warn!(
                            "[{}] {} failed with exit code {}",
                            hierarchy,
                            step,
                            result.exit_code
                        );
                        succeeded = false;
                        break;
                    }
                    Err(e) => {
                        tracing::error!("[{}] {}", hierarchy, e);
                        self.emit(BuildEventType::Error, Some(hierarchy), e.to_string(), None);
                        succeeded = false;
                        break;
                    }
                }
            }

            if !cancelled {
                let progress = (index + 1) as f32 / request.len() as f32 * 100.0;
                self.emit(
                    BuildEventType::Progress,
                    Some(hierarchy),
                    format!("Finished {}", hierarchy),
                    Some(progress),
                );
            }
        }

        if cancelled {
            self.dispatch(|sink| sink.update_cancel());
            self.emit(BuildEventType::Cancelled, None, "Build cancelled".to_string(), None);
            return UpdateSummary {
                succeeded: false,
                modified,
                cancelled: true,
            };
        }

        if succeeded {
            self.emit(BuildEventType::Completed, None, "Build succeeded".to_string(), Some(100.0));
        } else {
            self.emit(BuildEventType::Failed, None, "Build failed".to_string(), None);
        }
        UpdateSummary {
            succeeded,
            modified,
            cancelled: false,
        }
    }

    fn run_step(
        &self,
        hierarchy: &HierarchyId,
        target: &TargetConfig,
        step: BuildStep,
    ) -> Result<StepResult, crate::error::HostError> {
        let spec = match step {
            BuildStep::Build => &target.build,
            BuildStep::Clean => match &target.clean {
                Some(spec) => spec,
                None => {
                    tracing::debug!("[{}] no clean command configured", hierarchy);
                    return Ok(StepResult {
                        success: true,
                        exit_code: 0,
                        cancelled: false,
                        duration_ms: 0,
                    });
                }
            },
        };

        let runner = CommandRunner::new(self.cancel_flag.clone(), self.event_sender.clone());
        let result = runner.run(hierarchy.as_str(), spec, target.cwd.as_deref(), &target.env)?;
        tracing::info!(
            "[{}] {} finished in {:.1}s (exit code {})",
            hierarchy,
            step,
            result.duration_ms as f64 / 1000.0,
            result.exit_code
        );
        Ok(result)
    }

    /// Call `f` on a snapshot of the advised sinks.
    ///
    /// The lock is not held during the calls, so sinks may unadvise.
    fn dispatch(&self, mut f: impl FnMut(&dyn UpdateSolutionEvents) -> HostStatus) {
        let sinks: Vec<(EventsCookie, Arc<dyn UpdateSolutionEvents>)> = self
            .state
            .lock()
            .sinks
            .iter()
            .map(|(cookie, sink)| (*cookie, sink.clone()))
            .collect();
        for (cookie, sink) in sinks {
            let status = f(sink.as_ref());
            if !status.is_ok() {
                tracing::debug!("Event sink {} returned {}", cookie, status);
            }
        }
    }

    /// Dispatch a cancellable notification, reporting whether any sink
    /// asked to cancel.
    fn veto_requested(
        &self,
        f: impl Fn(&dyn UpdateSolutionEvents, &mut bool) -> HostStatus,
    ) -> bool {
        let mut vetoed = false;
        self.dispatch(|sink| {
            let mut cancel = false;
            let status = f(sink, &mut cancel);
            vetoed |= cancel;
            status
        });
        if vetoed {
            tracing::info!("An event sink vetoed the update");
        }
        vetoed
    }

    fn emit(
        &self,
        event_type: BuildEventType,
        target: Option<&HierarchyId>,
        message: String,
        progress: Option<f32>,
    ) {
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(BuildEvent {
                event_type,
                target: target.map(|t| t.to_string()),
                message,
                progress,
                timestamp: now_ms(),
            });
        }
    }
}

fn steps_for(flags: UpdateFlags) -> Vec<BuildStep> {
    let mut steps = Vec::new();
    if flags.contains(UpdateFlags::OPERATION_CLEAN) {
        steps.push(BuildStep::Clean);
    }
    if flags.contains(UpdateFlags::OPERATION_BUILD) {
        steps.push(BuildStep::Build);
    }
    steps
}

impl SolutionBuildManager for ProcessBuildManager {
    fn start_update(&self, request: &UpdateRequest) -> HostStatus {
        if request.flags().len() != request.hierarchies().len() {
            tracing::warn!("Rejecting update: flag array does not match targets");
            return HostStatus::INVALID_ARG;
        }
        if let Some((hierarchy, _)) = request.iter().find(|(h, _)| !self.targets.contains_key(*h)) {
            tracing::warn!("Rejecting update: unknown target {}", hierarchy);
            return HostStatus::INVALID_ARG;
        }
        if request.iter().any(|(_, flags)| steps_for(flags).is_empty()) {
            tracing::warn!("Rejecting update: no operation requested");
            return HostStatus::INVALID_ARG;
        }

        let mut state = self.state.lock();
        if state.running || state.queued.is_some() {
            tracing::warn!("Rejecting update: a build is already in progress");
            return HostStatus::BUSY;
        }
        self.cancel_flag.store(false, Ordering::Relaxed);
        state.queued = Some(request.clone());
        HostStatus::OK
    }

    fn advise_update_events(
        &self,
        sink: Arc<dyn UpdateSolutionEvents>,
    ) -> Result<EventsCookie, HostStatus> {
        let mut state = self.state.lock();
        state.next_cookie += 1;
        let cookie = EventsCookie(state.next_cookie);
        state.sinks.insert(cookie, sink);
        Ok(cookie)
    }

    fn unadvise_update_events(&self, cookie: EventsCookie) -> HostStatus {
        match self.state.lock().sinks.shift_remove(&cookie) {
            Some(_) => HostStatus::OK,
            None => HostStatus::INVALID_ARG,
        }
    }
}
