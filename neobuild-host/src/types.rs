//! Build host types

use serde::{Deserialize, Serialize};

/// Build event emitted while an update runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildEvent {
    pub event_type: BuildEventType,
    /// Target the event belongs to, `None` for update-wide events
    pub target: Option<String>,
    pub message: String,
    pub progress: Option<f32>, // 0.0 - 100.0
    pub timestamp: u64,
}

/// Types of build events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildEventType {
    Started,
    Progress,
    Output,
    Warning,
    Error,
    Completed,
    Failed,
    Cancelled,
}

/// Which command of a target a step runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    Clean,
    Build,
}

impl BuildStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStep::Clean => "clean",
            BuildStep::Build => "build",
        }
    }
}

impl std::fmt::Display for BuildStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of running one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub success: bool,
    pub exit_code: i32,
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// Get current timestamp in ms
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
