//! Display implementations for the types in the devicegraph module.

use std::fmt::Display;

use super::{
    actions::{Action, Actiongraph},
    device::Device,
    edges::{ComponentRole, Edge, EdgeKind},
    registry::FreeSpace,
    types::{
        BitFlagsBackingEnumVec, CacheMode, Capability, DeviceKind, DeviceKindFlag, DiskTransport,
        EncryptionType, FileSystemType, PartitionTableType, PartitionType, RaidLevel,
    },
};

/// Implements Display through the strum name of each variant.
macro_rules! display_as_static_str {
    ($($kind:ident),* $(,)?) => {
        $(
            impl Display for $kind {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    let name: &'static str = self.into();
                    write!(f, "{name}")
                }
            }
        )*
    };
}

display_as_static_str!(
    DeviceKind,
    Capability,
    RaidLevel,
    PartitionTableType,
    PartitionType,
    FileSystemType,
    CacheMode,
    EncryptionType,
    DiskTransport,
);

impl Display for ComponentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", EdgeKind::Component(*self).name())
    }
}

impl Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Display for DeviceKindFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.user_readable())
    }
}

impl Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.describe())
    }
}

impl Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -[{}]-> {}", self.parent, self.kind, self.child)
    }
}

impl Display for FreeSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} free on {} at {}",
            self.region.size(),
            self.device_name,
            self.region
        )
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description)
    }
}

impl Display for Actiongraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "(no actions)");
        }

        for (position, action) in self.actions().iter().enumerate() {
            if position > 0 {
                writeln!(f)?;
            }
            write!(f, "{:>3}. {action}", position + 1)?;
        }

        Ok(())
    }
}
