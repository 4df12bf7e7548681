use serde::{Deserialize, Serialize};

use crate::Sid;

use super::{
    cardinality::ValidCardinality,
    device::Device,
    edges::EdgeKind,
    types::{DeviceKind, DeviceKindFlag, FileSystemType},
};

/// Renders a device into a pretty string suitable for error messages.
pub(crate) fn pretty_device(device: &Device) -> String {
    match device.name() {
        Some(name) => format!("'{name}'"),
        None => device.describe(),
    }
}

/// Errors reported by devicegraph operations.
///
/// Queries report absence with `Option`; these errors come from mutations,
/// removals, diffs and loading.
#[derive(thiserror::Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DevicegraphError {
    #[error("Device with sid {0} not found")]
    NotFound(Sid),

    #[error("Invalid argument {device}: {reason}")]
    InvalidArgument { device: String, reason: String },

    #[error(transparent)]
    GraphIntegrity(#[from] IntegrityError),

    #[error("Operation '{operation}' is not supported by {device}")]
    Unsupported { device: String, operation: String },
}

impl DevicegraphError {
    pub(crate) fn invalid_argument(device: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            device: device.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(device: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            device: device.into(),
            operation: operation.into(),
        }
    }
}

/// Structural violations of a devicegraph.
#[derive(thiserror::Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum IntegrityError {
    #[error("Device {device} of kind '{kind}' is invalid: {body}")]
    BasicCheckFailed {
        device: String,
        kind: DeviceKind,
        body: String,
    },

    #[error("Sid {0} is used by more than one device")]
    DuplicateSid(Sid),

    #[error("Name '{name}' is used by more than one device")]
    DuplicateName { name: String },

    #[error("Edge {parent} -> {child} references a device that is not in the graph")]
    DanglingReference { parent: Sid, child: Sid },

    #[error("Sid index is out of sync with the graph for sid {0}")]
    IndexMismatch(Sid),

    #[error("Dependency cycle through {device}")]
    Cycle { device: String },

    #[error(
        "Edge '{kind}' cannot connect {parent} (of kind '{parent_kind}') to {child} \
            (of kind '{child_kind}'). Edges of kind '{kind}' go from {valid_parents} \
            to {valid_children}"
    )]
    InvalidEdge {
        kind: EdgeKind,
        parent: String,
        parent_kind: DeviceKind,
        child: String,
        child_kind: DeviceKind,
        valid_parents: DeviceKindFlag,
        valid_children: DeviceKindFlag,
    },

    #[error("Devices {parent} and {child} are connected more than once")]
    DuplicateEdge { parent: String, child: String },

    #[error(
        "Device {device} of kind '{kind}' has {parent_count} parent(s), \
            expected {expected}"
    )]
    InvalidParentCount {
        device: String,
        kind: DeviceKind,
        parent_count: usize,
        expected: ValidCardinality,
    },

    #[error("Device {device} has more than {max} parent(s) through '{kind}' edges")]
    TooManyEdges {
        device: String,
        kind: EdgeKind,
        max: usize,
    },

    #[error(
        "Devices {first} and {second} cannot both use {parent}: \
            a device can only be used by one other device"
    )]
    ForbiddenSharing {
        parent: String,
        first: String,
        second: String,
    },

    #[error(
        "Filesystem {device} of type '{fs_type}' spans {device_count} devices, only \
            btrfs supports multiple devices"
    )]
    MultiDeviceFilesystem {
        device: String,
        fs_type: FileSystemType,
        device_count: usize,
    },

    #[error("Partition {device} at {region} ends after the end of its device ({device_size})")]
    RegionOutsideDevice {
        device: String,
        region: String,
        device_size: String,
    },

    #[error("Actions for {count} device(s) depend on each other in a cycle")]
    ActionCycle { count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            DevicegraphError::NotFound(Sid(42)).to_string(),
            "Device with sid 42 not found"
        );

        let err: DevicegraphError = IntegrityError::InvalidParentCount {
            device: "'/dev/sda1'".into(),
            kind: DeviceKind::Partition,
            parent_count: 0,
            expected: ValidCardinality::new_exact(1),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Device '/dev/sda1' of kind 'partition' has 0 parent(s), expected exactly 1"
        );

        let err = IntegrityError::InvalidEdge {
            kind: EdgeKind::VG_OF,
            parent: "'/dev/sda'".into(),
            parent_kind: DeviceKind::Disk,
            child: "'/dev/system'".into(),
            child_kind: DeviceKind::LvmVg,
            valid_parents: DeviceKindFlag::LvmPv,
            valid_children: DeviceKindFlag::LvmVg,
        };
        assert_eq!(
            err.to_string(),
            "Edge 'vg-of' cannot connect '/dev/sda' (of kind 'disk') to '/dev/system' \
                (of kind 'lvm-vg'). Edges of kind 'vg-of' go from lvm-pv to lvm-vg"
        );
    }

    #[test]
    fn test_serialize() {
        let err = DevicegraphError::unsupported("'/dev/xvda1'", "resize");
        let yaml = serde_yaml::to_string(&err).unwrap();
        assert!(yaml.contains("unsupported"));
        let back: DevicegraphError = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, err);
    }
}
