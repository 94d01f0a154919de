use std::time::Duration;

use thiserror::Error;

use crate::types::{EventsCookie, HostStatus};

/// Reasons a submission does not end in a successful build
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("build manager rejected the update: {status}")]
    StartRejected { status: HostStatus },

    #[error("build manager refused the event sink: {status}")]
    AdviseRejected { status: HostStatus },

    #[error("unadvising events {cookie} failed: {status}")]
    UnadviseFailed { cookie: EventsCookie, status: HostStatus },

    #[error("build failed")]
    BuildFailed,

    #[error("build was cancelled")]
    BuildCancelled,

    #[error("build did not finish within {0:?}")]
    TimedOut(Duration),
}
