//! Submits builds to a manager and exposes completion as a future

use std::sync::Arc;

use crate::completion::{BuildFuture, CompletionSource};
use crate::error::BridgeError;
use crate::listener::BuildListener;
use crate::manager::{SolutionBuildManager, UpdateSolutionEvents};
use crate::types::{OperationKind, ProjectRef, UpdateRequest};

/// Builds projects through an external [`SolutionBuildManager`]
#[derive(Clone)]
pub struct ProjectBuilder {
    manager: Arc<dyn SolutionBuildManager>,
    operation: OperationKind,
}

impl ProjectBuilder {
    pub fn new(manager: Arc<dyn SolutionBuildManager>) -> Self {
        Self {
            manager,
            operation: OperationKind::Build,
        }
    }

    /// Use `operation` for every target of later submissions
    pub fn with_operation(mut self, operation: OperationKind) -> Self {
        self.operation = operation;
        self
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    /// Start building `projects` and return a future for the result.
    ///
    /// Never blocks. The future resolves to `true` only if the manager
    /// reports a successful, uncancelled update. A rejected start resolves
    /// `false` immediately without advising any events.
    pub fn build_async<T: ProjectRef>(&self, projects: &[T]) -> BuildFuture {
        let request = UpdateRequest::new(self.operation, projects);
        tracing::info!(
            "Starting {} of {} project(s): [{}]",
            self.operation,
            request.len(),
            request
                .hierarchies()
                .iter()
                .map(|h| h.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        // Returns as soon as the update is queued; completion comes later
        // through the advised listener.
        let status = self.manager.start_update(&request);
        if !status.is_ok() {
            tracing::warn!("{}", BridgeError::StartRejected { status });
            return BuildFuture::ready(false);
        }

        let (completion, future) = CompletionSource::new();
        let listener = Arc::new(BuildListener::new(&self.manager, completion));
        let sink: Arc<dyn UpdateSolutionEvents> = listener.clone();

        match self.manager.advise_update_events(sink) {
            Ok(cookie) => {
                tracing::debug!("Advised build events {}", cookie);
                listener.attach_cookie(cookie);
            }
            Err(status) => {
                tracing::error!("{}", BridgeError::AdviseRejected { status });
                listener.abandon();
            }
        }

        future
    }
}
