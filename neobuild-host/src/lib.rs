//! Process-backed build manager
//!
//! Implements the [`neobuild_bridge::SolutionBuildManager`] contract by
//! running the commands configured for each target:
//! - TOML configuration with environment overrides
//! - Queued updates, run on the owner's thread by `pump`
//! - Streaming output and progress events
//! - Cancellation that kills the running command

mod config;
mod error;
mod manager;
mod runner;
mod types;

pub use config::{
    CONFIG_FILE_NAME,
    CommandSpec,
    HostConfig,
    LogConfig,
    TargetConfig,
};

pub use error::HostError;

pub use manager::ProcessBuildManager;

pub use runner::CommandRunner;

pub use types::{
    BuildEvent,
    BuildEventType,
    BuildStep,
    StepResult,
};
