//! Async bridge over a callback-driven build manager
//!
//! A build manager (an IDE's build subsystem, or the process runner in
//! `neobuild-host`) accepts update requests and reports their lifecycle
//! through advised event sinks. [`ProjectBuilder`] submits a request,
//! advises a one-shot listener and hands the caller a [`BuildFuture`] that
//! resolves once the manager reports the update done.
//!
//! ```text
//! caller --build_async--> ProjectBuilder --start_update--> manager
//!   ^                          |                             |
//!   |                      advise(listener)          callbacks on the
//!   |                          v                      manager's thread
//! BuildFuture <--resolve-- BuildListener <--update_done------+
//! ```

mod builder;
mod completion;
mod error;
mod listener;
mod manager;
mod types;

#[cfg(test)]
mod testing;

pub use builder::ProjectBuilder;

pub use completion::{BuildFuture, CompletionSource};

pub use error::BridgeError;

pub use listener::{BuildListener, ListenerState};

pub use manager::{SolutionBuildManager, UpdateSolutionEvents};

pub use types::{
    BuildOutcome,
    EventsCookie,
    HierarchyId,
    HostStatus,
    OperationKind,
    ProjectRef,
    UpdateFlags,
    UpdateRequest,
};
