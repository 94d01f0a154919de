//! Data types shared between the bridge and build managers

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Status code returned by every call across the manager boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostStatus(pub i32);

impl HostStatus {
    /// Canonical success sentinel
    pub const OK: HostStatus = HostStatus(0);
    /// Unspecified failure
    pub const FAIL: HostStatus = HostStatus(0x8000_4005_u32 as i32);
    /// An argument was not understood by the manager
    pub const INVALID_ARG: HostStatus = HostStatus(0x8007_0057_u32 as i32);
    /// The manager is already running an update
    pub const BUSY: HostStatus = HostStatus(0x8001_010A_u32 as i32);

    pub fn is_ok(self) -> bool {
        self == HostStatus::OK
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0 as u32)
    }
}

/// Cookie handed out by a manager when an event sink is advised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventsCookie(pub u32);

impl fmt::Display for EventsCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a project in the manager's addressing scheme
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HierarchyId(Arc<str>);

impl HierarchyId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HierarchyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Something that can be submitted as a build target
pub trait ProjectRef {
    fn hierarchy(&self) -> HierarchyId;
}

impl ProjectRef for HierarchyId {
    fn hierarchy(&self) -> HierarchyId {
        self.clone()
    }
}

impl ProjectRef for str {
    fn hierarchy(&self) -> HierarchyId {
        HierarchyId::new(self)
    }
}

impl ProjectRef for String {
    fn hierarchy(&self) -> HierarchyId {
        HierarchyId::new(self)
    }
}

impl<T: ProjectRef + ?Sized> ProjectRef for &T {
    fn hierarchy(&self) -> HierarchyId {
        (**self).hierarchy()
    }
}

/// Per-target update flags understood by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UpdateFlags(pub u32);

impl UpdateFlags {
    pub const NONE: UpdateFlags = UpdateFlags(0);
    pub const OPERATION_BUILD: UpdateFlags = UpdateFlags(0x0001_0000);
    pub const OPERATION_CLEAN: UpdateFlags = UpdateFlags(0x0010_0000);

    pub fn contains(self, other: UpdateFlags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl std::ops::BitOr for UpdateFlags {
    type Output = UpdateFlags;

    fn bitor(self, rhs: UpdateFlags) -> UpdateFlags {
        UpdateFlags(self.0 | rhs.0)
    }
}

/// The kind of update requested for every target of a submission
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationKind {
    #[default]
    Build,
    Clean,
    Rebuild,
}

impl OperationKind {
    pub fn flags(self) -> UpdateFlags {
        match self {
            OperationKind::Build => UpdateFlags::OPERATION_BUILD,
            OperationKind::Clean => UpdateFlags::OPERATION_CLEAN,
            OperationKind::Rebuild => UpdateFlags::OPERATION_CLEAN | UpdateFlags::OPERATION_BUILD,
        }
    }
}

/// An immutable request to update a set of targets
///
/// `flags` is parallel to `hierarchies`: entry `i` holds the operation for
/// target `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    hierarchies: Vec<HierarchyId>,
    flags: Vec<UpdateFlags>,
    default_flags: UpdateFlags,
}

impl UpdateRequest {
    pub fn new<T: ProjectRef>(kind: OperationKind, targets: &[T]) -> Self {
        let hierarchies: Vec<HierarchyId> = targets.iter().map(ProjectRef::hierarchy).collect();
        let flags = vec![kind.flags(); hierarchies.len()];
        Self {
            hierarchies,
            flags,
            default_flags: kind.flags(),
        }
    }

    pub fn hierarchies(&self) -> &[HierarchyId] {
        &self.hierarchies
    }

    pub fn flags(&self) -> &[UpdateFlags] {
        &self.flags
    }

    pub fn default_flags(&self) -> UpdateFlags {
        self.default_flags
    }

    pub fn len(&self) -> usize {
        self.hierarchies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hierarchies.is_empty()
    }

    /// Iterate targets together with their flags
    pub fn iter(&self) -> impl Iterator<Item = (&HierarchyId, UpdateFlags)> {
        self.hierarchies.iter().zip(self.flags.iter().copied())
    }
}

/// How a finished update ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BuildOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

impl BuildOutcome {
    /// Classify the flags reported with the terminal event.
    ///
    /// Cancellation wins over success.
    pub fn classify(succeeded: bool, cancelled: bool) -> Self {
        if cancelled {
            BuildOutcome::Cancelled
        } else if succeeded {
            BuildOutcome::Succeeded
        } else {
            BuildOutcome::Failed
        }
    }

    pub fn is_success(self) -> bool {
        self == BuildOutcome::Succeeded
    }
}

impl From<BuildOutcome> for bool {
    fn from(outcome: BuildOutcome) -> bool {
        outcome.is_success()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_classify_priority() {
        assert_eq!(BuildOutcome::classify(true, true), BuildOutcome::Cancelled);
        assert_eq!(BuildOutcome::classify(true, false), BuildOutcome::Succeeded);
        assert_eq!(BuildOutcome::classify(false, false), BuildOutcome::Failed);
        assert_eq!(BuildOutcome::classify(false, true), BuildOutcome::Cancelled);

        assert!(!bool::from(BuildOutcome::classify(true, true)));
        assert!(bool::from(BuildOutcome::classify(true, false)));
    }

    #[test]
    fn test_request_flags_are_parallel() {
        let request = UpdateRequest::new(OperationKind::Build, &["app", "core", "ui"]);
        assert_eq!(request.len(), 3);
        assert_eq!(request.flags().len(), request.hierarchies().len());
        assert!(request.flags().iter().all(|f| *f == UpdateFlags::OPERATION_BUILD));
        assert_eq!(request.hierarchies()[1].as_str(), "core");
        assert_eq!(request.default_flags(), UpdateFlags::OPERATION_BUILD);
    }

    #[test]
    fn test_empty_request() {
        let request = UpdateRequest::new::<&str>(OperationKind::Build, &[]);
        assert!(request.is_empty());
        assert!(request.flags().is_empty());
    }

    #[test]
    fn test_operation_kind_strings() {
        assert_eq!(OperationKind::from_str("rebuild").unwrap(), OperationKind::Rebuild);
        assert_eq!(OperationKind::Clean.to_string(), "clean");
        assert!(OperationKind::from_str("deploy").is_err());
        assert_eq!(OperationKind::iter().count(), 3);

        let rebuild = OperationKind::Rebuild.flags();
        assert!(rebuild.contains(UpdateFlags::OPERATION_BUILD));
        assert!(rebuild.contains(UpdateFlags::OPERATION_CLEAN));
        assert!(!OperationKind::Build.flags().contains(UpdateFlags::OPERATION_CLEAN));
    }

    #[test]
    fn test_status_display() {
        assert!(HostStatus::OK.is_ok());
        assert!(!HostStatus::FAIL.is_ok());
        assert_eq!(HostStatus::FAIL.to_string(), "0x80004005");
    }
}
