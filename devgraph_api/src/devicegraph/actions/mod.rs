//! Actions turning one snapshot into another.
//!
//! `diff()` compares an origin and a target snapshot and plans the ordered
//! actions that transform the first into the second. `apply_actions()`
//! replays such a plan onto a snapshot.

use serde::Serialize;

use crate::{primitives::bytes::ByteCount, Sid};

use super::{
    device::{Device, DeviceDetails},
    edges::EdgeKind,
    types::FileSystemType,
};

mod apply;
mod diff;

pub use diff::diff;

/// What an action does.
///
/// Every variant carries the data needed to replay it, so a plan can be
/// applied without looking at the target snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Creates a device and connects it to its parents.
    Create {
        device: Device,
        parents: Vec<(Sid, EdgeKind)>,
    },

    /// Deletes a device, dropping its remaining edges.
    Delete { device: Sid },

    /// Shrinks or grows a device.
    Resize {
        device: Sid,
        from: ByteCount,
        to: ByteCount,
    },

    /// Creates a new filesystem of another type in place of the old one.
    Reformat {
        device: Sid,
        from: FileSystemType,
        to: FileSystemType,
    },

    SetMountPoint {
        device: Sid,
        from: Option<String>,
        to: Option<String>,
    },

    Rename {
        device: Sid,
        from: Option<String>,
        to: Option<String>,
    },

    /// Any other change of attributes.
    Reconfigure {
        device: Sid,
        details: DeviceDetails,
    },

    /// Connects two devices that exist before and after the plan.
    Attach {
        parent: Sid,
        child: Sid,
        kind: EdgeKind,
    },

    /// Disconnects two devices that exist before and after the plan.
    Detach {
        parent: Sid,
        child: Sid,
        kind: EdgeKind,
    },
}

impl ActionKind {
    /// Device the action is about. For edges, the child.
    pub fn subject(&self) -> Sid {
        match self {
            Self::Create { device, .. } => device.sid(),
            Self::Delete { device }
            | Self::Resize { device, .. }
            | Self::Reformat { device, .. }
            | Self::SetMountPoint { device, .. }
            | Self::Rename { device, .. }
            | Self::Reconfigure { device, .. } => *device,
            Self::Attach { child, .. } | Self::Detach { child, .. } => *child,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Delete { .. } => "delete",
            Self::Resize { from, to, .. } if to < from => "shrink",
            Self::Resize { .. } => "grow",
            Self::Reformat { .. } => "reformat",
            Self::SetMountPoint { .. } => "set-mount-point",
            Self::Rename { .. } => "rename",
            Self::Reconfigure { .. } => "reconfigure",
            Self::Attach { .. } => "attach",
            Self::Detach { .. } => "detach",
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, Self::Create { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }

    /// Whether the action destroys data.
    pub fn is_destructive(&self) -> bool {
        match self {
            Self::Delete { .. } | Self::Reformat { .. } => true,
            Self::Resize { from, to, .. } => to < from,
            _ => false,
        }
    }
}

/// One step of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub kind: ActionKind,

    /// Human-readable description, e.g. "Create partition /dev/sda1 (10.00 GiB)".
    pub description: String,

    /// Positions, in the plan, of the actions that must run before this one.
    /// They always point to earlier positions.
    pub dependencies: Vec<usize>,
}

/// Serializable view of an action.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ActionSummary {
    pub position: usize,
    pub action: &'static str,
    pub device: Sid,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<usize>,
}

/// An ordered plan of actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actiongraph {
    pub(crate) actions: Vec<Action>,
}

impl Actiongraph {
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> + '_ {
        self.actions.iter()
    }

    /// Descriptions in plan order.
    pub fn descriptions(&self) -> Vec<&str> {
        self.actions
            .iter()
            .map(|action| action.description.as_str())
            .collect()
    }

    pub fn summaries(&self) -> Vec<ActionSummary> {
        self.actions
            .iter()
            .enumerate()
            .map(|(position, action)| ActionSummary {
                position,
                action: action.kind.name(),
                device: action.kind.subject(),
                description: action.description.clone(),
                dependencies: action.dependencies.clone(),
            })
            .collect()
    }

    /// Position of the first action matching the predicate.
    pub fn position(&self, predicate: impl Fn(&ActionKind) -> bool) -> Option<usize> {
        self.actions.iter().position(|action| predicate(&action.kind))
    }
}

impl<'a> IntoIterator for &'a Actiongraph {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}
