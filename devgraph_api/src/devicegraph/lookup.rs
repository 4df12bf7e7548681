//! Name resolution.
//!
//! A name is resolved in tiers, cheapest first:
//!
//! 1. the kernel name of a block device or the name of a volume group;
//! 2. the udev names known for a block device;
//! 3. the same two tiers on the alternative names derived from crypttab;
//! 4. a lookup on the live system, mapped back by sid. It is only attempted
//!    while the probed snapshot still matches the system.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::{
    constants::{DISK_BY_LABEL_DIRECTORY, DISK_BY_UUID_DIRECTORY},
    Sid,
};

use super::{device::Device, edges::EdgeKind, graph::Devicegraph, types::Capability};

/// Lookup of device names on the live system.
pub trait SystemLookup {
    /// Finds the device of the probed snapshot that `name` refers to on the
    /// system, typically by following symbolic links under /dev.
    fn find_by_any_name(&self, probed: &Devicegraph, name: &str) -> Option<Sid>;
}

/// State of the system needed by the last resolution tier.
#[derive(Clone, Copy)]
pub struct SystemContext<'a> {
    /// Snapshot probed from the system.
    pub probed: &'a Devicegraph,

    /// Whether changes were committed to the system after probing. If so,
    /// the probed snapshot no longer matches the system.
    pub committed: bool,

    pub lookup: &'a dyn SystemLookup,
}

impl<'a> SystemContext<'a> {
    pub fn new(probed: &'a Devicegraph, committed: bool, lookup: &'a dyn SystemLookup) -> Self {
        Self {
            probed,
            committed,
            lookup,
        }
    }

    /// Whether a system lookup can be trusted.
    pub fn lookup_possible(&self) -> bool {
        !self.committed
    }
}

/// System lookup following the symbolic links of a /dev tree.
#[derive(Debug, Clone)]
pub struct UdevLookup {
    /// Directory the /dev tree lives in, "/" on a running system.
    pub root: PathBuf,
}

impl Default for UdevLookup {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }
}

impl UdevLookup {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Kernel name the given path resolves to, relative to the root.
    fn resolve(&self, name: &str) -> Option<String> {
        let root = fs::canonicalize(&self.root).ok()?;
        let target = fs::canonicalize(root.join(name.trim_start_matches('/'))).ok()?;
        let relative = target.strip_prefix(&root).ok()?;
        Some(format!("/{}", relative.display()))
    }
}

impl SystemLookup for UdevLookup {
    fn find_by_any_name(&self, probed: &Devicegraph, name: &str) -> Option<Sid> {
        let kernel_name = self.resolve(name)?;
        debug!("'{name}' resolves to '{kernel_name}' on the system");
        probed.find_by_name(&kernel_name).map(Device::sid)
    }
}

impl Devicegraph {
    /// Finds a block device by its kernel name, or a volume group by its
    /// name (e.g. "/dev/system").
    pub fn find_by_name(&self, name: &str) -> Option<&Device> {
        self.raw_devices().find(|device| {
            (device.is(Capability::BlkDevice) || device.is(Capability::NamedContainer))
                && device.name() == Some(name)
        })
    }

    /// Every udev name of a device: the recorded ones plus the by-uuid and
    /// by-label links of the filesystem on it.
    pub fn udev_full_all(&self, sid: Sid) -> Vec<String> {
        let Some(device) = self.find(sid) else {
            return Vec::new();
        };

        let mut names = device.udev_names().to_vec();
        for fs in self.children_by_edge(sid, EdgeKind::FormattedAs) {
            if let Some(uuid) = fs.fs_uuid() {
                names.push(format!("{DISK_BY_UUID_DIRECTORY}/{uuid}"));
            }
            if let Some(label) = fs.fs_label() {
                names.push(format!("{DISK_BY_LABEL_DIRECTORY}/{label}"));
            }
        }
        names
    }

    /// Finds a block device by any of its udev names.
    pub fn find_by_udev_name(&self, name: &str) -> Option<&Device> {
        self.blk_devices()
            .into_iter()
            .find(|device| self.udev_full_all(device.sid()).iter().any(|udev| udev == name))
    }

    /// Alternative names of a device name, replacing the crypttab name of an
    /// encryption layer with its device-mapper name.
    ///
    /// For instance, with an encryption layer probed as
    /// "/dev/mapper/cr-auto-1" and listed as "cr_home" in crypttab,
    /// "/dev/mapper/cr_home" has "/dev/mapper/cr-auto-1" as alternative.
    pub fn alternative_names(&self, name: &str) -> Vec<String> {
        self.encryptions()
            .into_iter()
            .filter_map(|encryption| {
                let crypttab_name = encryption.crypttab_name()?;
                let dm_name = encryption.dm_table_name()?;
                if crypttab_name.is_empty() || !name.contains(crypttab_name) {
                    return None;
                }
                let alternative = name.replacen(crypttab_name, dm_name, 1);
                (alternative != name).then_some(alternative)
            })
            .collect()
    }

    /// Finds a device by any of its names, trying the tiers described in the
    /// module documentation.
    ///
    /// Unknown names are not an error, they just return `None`. Without a
    /// system context, or once changes were committed, the system lookup is
    /// skipped.
    pub fn find_by_any_name(
        &self,
        name: &str,
        alternative_names: bool,
        system: Option<&SystemContext>,
    ) -> Option<&Device> {
        let mut candidates = vec![name.to_string()];
        if alternative_names {
            candidates.extend(self.alternative_names(name));
        }

        for candidate in &candidates {
            if let Some(device) = self.find_by_name(candidate) {
                info!("Device {} found by its name {candidate}", device.describe());
                return Some(device);
            }
            if let Some(device) = self.find_by_udev_name(candidate) {
                info!("Device {} found by its udev name {candidate}", device.describe());
                return Some(device);
            }
        }

        let Some(system) = system else {
            debug!("No system lookup available to find {name}");
            return None;
        };
        if !system.lookup_possible() {
            info!("System lookup cannot be used to find {name}");
            return None;
        }

        for candidate in &candidates {
            let Some(sid) = system.lookup.find_by_any_name(system.probed, candidate) else {
                info!("Device {candidate} not found via system lookup");
                continue;
            };

            match self.find(sid) {
                Some(device) => {
                    info!("Result of system lookup for {candidate}: {}", device.describe());
                    return Some(device);
                }
                None => info!("Device {candidate} (sid {sid}) no longer exists"),
            }
        }

        None
    }

    /// Tiers that only look at the graph itself, without alternatives.
    pub(crate) fn find_by_structural_name(&self, name: &str) -> Option<Sid> {
        self.find_by_name(name)
            .or_else(|| self.find_by_udev_name(name))
            .map(Device::sid)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, os::unix::fs::symlink};

    use crate::{
        devicegraph::{test_utils, types::FileSystemType},
        primitives::bytes::ByteCount,
    };

    use super::*;

    /// System lookup answering from a fixed table.
    struct StaticLookup(BTreeMap<String, Sid>);

    impl SystemLookup for StaticLookup {
        fn find_by_any_name(&self, _probed: &Devicegraph, name: &str) -> Option<Sid> {
            self.0.get(name).copied()
        }
    }

    #[test]
    fn test_find_by_name() {
        let graph = test_utils::lvm_scenario();
        assert_eq!(graph.find_by_name("/dev/sda1").unwrap().name(), Some("/dev/sda1"));
        assert_eq!(graph.find_by_name("/dev/vg0").unwrap().kind(), crate::DeviceKind::LvmVg);
        assert!(graph.find_by_name("/dev/nonexistent").is_none());
        assert!(graph.find_by_any_name("/dev/nonexistent", true, None).is_none());
    }

    #[test]
    fn test_find_by_udev_name() {
        let mut graph = Devicegraph::new();
        let sda = graph.create_disk("/dev/sda", ByteCount::from_gib(10)).unwrap();
        graph
            .set_udev_names(sda, vec!["/dev/disk/by-id/ata-disk1".into()])
            .unwrap();
        let sdb = graph.create_disk("/dev/sdb", ByteCount::from_gib(10)).unwrap();
        let fs = graph.create_filesystem(&[sdb], FileSystemType::Ext4).unwrap();
        let idx = graph.node_index(fs).unwrap();
        graph.inner[idx].details = crate::DeviceDetails::BlkFilesystem {
            fs_type: FileSystemType::Ext4,
            label: Some("data".into()),
            uuid: Some("1234".into()),
            mount_point: None,
        };

        let found = |name: &str| graph.find_by_any_name(name, false, None).map(Device::sid);
        assert_eq!(found("/dev/disk/by-id/ata-disk1"), Some(sda));
        assert_eq!(found("/dev/disk/by-uuid/1234"), Some(sdb));
        assert_eq!(found("/dev/disk/by-label/data"), Some(sdb));
        assert_eq!(found("/dev/disk/by-label/other"), None);
    }

    #[test]
    fn test_alternative_names() {
        let graph = test_utils::encrypted_scenario();
        let encryption = graph.find_by_name("/dev/mapper/cr_sda4").unwrap().sid();

        assert_eq!(
            graph.alternative_names("/dev/mapper/cr_home"),
            vec!["/dev/mapper/cr_sda4".to_string()]
        );
        assert!(graph.alternative_names("/dev/sda1").is_empty());

        assert_eq!(
            graph
                .find_by_any_name("/dev/mapper/cr_home", true, None)
                .map(Device::sid),
            Some(encryption)
        );
        assert!(graph
            .find_by_any_name("/dev/mapper/cr_home", false, None)
            .is_none());
    }

    #[test]
    fn test_system_lookup() {
        let probed = test_utils::lvm_scenario();
        let sdb1 = probed.find_by_name("/dev/sdb1").unwrap().sid();
        let vg1 = probed.find_by_name("/dev/vg1").unwrap().sid();
        let lookup = StaticLookup(BTreeMap::from([
            ("/dev/disk/by-id/part-b1".to_string(), sdb1),
            ("/dev/disk/by-id/vg1-thing".to_string(), vg1),
        ]));

        let mut target = probed.duplicate();
        target.remove_lvm_vg(vg1).unwrap();

        let context = SystemContext::new(&probed, false, &lookup);
        assert_eq!(
            target
                .find_by_any_name("/dev/disk/by-id/part-b1", true, Some(&context))
                .map(Device::sid),
            Some(sdb1)
        );

        // Found on the system, but gone from the target.
        assert!(target
            .find_by_any_name("/dev/disk/by-id/vg1-thing", true, Some(&context))
            .is_none());

        // Committed: the system no longer matches the probed snapshot.
        let committed = SystemContext::new(&probed, true, &lookup);
        assert!(!committed.lookup_possible());
        assert!(target
            .find_by_any_name("/dev/disk/by-id/part-b1", true, Some(&committed))
            .is_none());
    }

    #[test]
    fn test_udev_lookup() {
        let root = tempfile::tempdir().unwrap();
        let by_id = root.path().join("dev/disk/by-id");
        std::fs::create_dir_all(&by_id).unwrap();
        std::fs::write(root.path().join("dev/sda1"), "").unwrap();
        symlink("../../sda1", by_id.join("ata-disk1-part1")).unwrap();

        let probed = test_utils::lvm_scenario();
        let sda1 = probed.find_by_name("/dev/sda1").unwrap().sid();
        let lookup = UdevLookup::new(root.path());

        assert_eq!(
            lookup.find_by_any_name(&probed, "/dev/disk/by-id/ata-disk1-part1"),
            Some(sda1)
        );
        assert_eq!(lookup.find_by_any_name(&probed, "/dev/disk/by-id/missing"), None);

        let context = SystemContext::new(&probed, false, &lookup);
        assert_eq!(
            probed
                .find_by_any_name("/dev/disk/by-id/ata-disk1-part1", false, Some(&context))
                .map(Device::sid),
            Some(sda1)
        );
    }
}
