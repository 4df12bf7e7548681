//! Sample devicegraphs shared by the unit tests.

use crate::{
    primitives::{bytes::ByteCount, region::Region},
    Sid,
};

use super::{
    graph::Devicegraph,
    types::{CacheMode, EncryptionType, FileSystemType, PartitionTableType, PartitionType, RaidLevel},
};

const GIB: u64 = 1 << 30;

/// Adds a primary partition starting at `start_mib` and spanning `size_gib`.
fn partition(graph: &mut Devicegraph, table: Sid, name: &str, start_mib: u64, size_gib: u64) -> Sid {
    graph
        .create_partition(
            table,
            name,
            Region::from_bytes(
                ByteCount::from_mib(start_mib),
                ByteCount::from_gib(size_gib),
                512,
            ),
            PartitionType::Primary,
        )
        .unwrap()
}

/// Adds a gpt disk with consecutive partitions of the given sizes, the first
/// one starting at 1 MiB. Returns the disk and its partitions.
fn gpt_disk(graph: &mut Devicegraph, name: &str, size_gib: u64, sizes: &[u64]) -> (Sid, Vec<Sid>) {
    let disk = graph.create_disk(name, ByteCount::from_gib(size_gib)).unwrap();
    let table = graph
        .create_partition_table(disk, PartitionTableType::Gpt)
        .unwrap();

    let mut start_mib = 1;
    let partitions = sizes
        .iter()
        .enumerate()
        .map(|(i, size)| {
            let sid = partition(graph, table, &format!("{name}{}", i + 1), start_mib, *size);
            start_mib += size * GIB / (1 << 20);
            sid
        })
        .collect();
    (disk, partitions)
}

/// Disks /dev/dev0 to /dev/dev{n-1}, 100 GiB each.
pub(crate) fn numbered_disks(n: usize) -> Devicegraph {
    let mut graph = Devicegraph::new();
    for i in 0..n {
        graph
            .create_disk(&format!("/dev/dev{i}"), ByteCount::from_gib(100))
            .unwrap();
    }
    graph
}

/// Two volume groups: vg0 on sda1 and sda2, vg1 on sdb1. sda3 is unused.
///
/// ```text
/// sda ── gpt ─┬─ sda1 ── pv ─┐
///             ├─ sda2 ── pv ─┴─ vg0 ─┬─ lv1
///             └─ sda3                └─ lv2
/// sdb ── gpt ─── sdb1 ── pv ─── vg1 ─── lv1
/// ```
pub(crate) fn lvm_scenario() -> Devicegraph {
    let mut graph = Devicegraph::new();
    let (_, sda) = gpt_disk(&mut graph, "/dev/sda", 100, &[10, 10, 20]);
    let (_, sdb) = gpt_disk(&mut graph, "/dev/sdb", 50, &[40]);

    let vg0 = graph.create_lvm_vg("vg0", ByteCount::from_mib(4)).unwrap();
    graph.add_lvm_pv(vg0, sda[0]).unwrap();
    graph.add_lvm_pv(vg0, sda[1]).unwrap();
    graph
        .create_lvm_lv(vg0, "lv1", ByteCount::from_gib(5))
        .unwrap();
    graph
        .create_lvm_lv(vg0, "lv2", ByteCount::from_gib(5))
        .unwrap();

    let vg1 = graph.create_lvm_vg("vg1", ByteCount::from_mib(4)).unwrap();
    graph.add_lvm_pv(vg1, sdb[0]).unwrap();
    graph
        .create_lvm_lv(vg1, "lv1", ByteCount::from_gib(20))
        .unwrap();

    graph.check().unwrap();
    graph
}

/// A volume group on top of a mirror and a plain partition.
///
/// ```text
/// sda ── gpt ─┬─ sda1 ─────────┐
///             ├─ sda2 ── swap  ├─ md0 ── pv ─┐
///             └─ sda3 ── pv ───┼─────────────┴─ data ─┬─ home ── ext4
/// sdb ── gpt ─── sdb1 ─────────┘                      └─ srv
/// sdc
/// ```
pub(crate) fn md_scenario() -> Devicegraph {
    let mut graph = Devicegraph::new();
    let (_, sda) = gpt_disk(&mut graph, "/dev/sda", 100, &[10, 2, 40]);
    let (_, sdb) = gpt_disk(&mut graph, "/dev/sdb", 100, &[10]);
    graph
        .create_disk("/dev/sdc", ByteCount::from_gib(100))
        .unwrap();

    let swap = graph
        .create_filesystem(&[sda[1]], FileSystemType::Swap)
        .unwrap();
    graph.set_mount_point(swap, Some("swap")).unwrap();

    let md0 = graph
        .create_md("/dev/md0", RaidLevel::Raid1, &[sda[0], sdb[0]])
        .unwrap();

    let data = graph.create_lvm_vg("data", ByteCount::from_mib(4)).unwrap();
    graph.add_lvm_pv(data, md0).unwrap();
    graph.add_lvm_pv(data, sda[2]).unwrap();
    let home = graph
        .create_lvm_lv(data, "home", ByteCount::from_gib(30))
        .unwrap();
    graph
        .create_lvm_lv(data, "srv", ByteCount::from_gib(10))
        .unwrap();

    let fs = graph
        .create_filesystem(&[home], FileSystemType::Ext4)
        .unwrap();
    graph.set_mount_point(fs, Some("/home")).unwrap();

    graph.check().unwrap();
    graph
}

/// Two bcaches sharing the caching set on an nvme disk.
///
/// ```text
/// sda ─────────────────── bcache0 ── ext4
/// nvme0n1 ── cset ─┬───────┘
///                  └───── bcache1
/// sdb ─────────────────────┘
/// ```
pub(crate) fn bcache_scenario() -> Devicegraph {
    let mut graph = Devicegraph::new();
    let sda = graph
        .create_disk("/dev/sda", ByteCount::from_gib(100))
        .unwrap();
    let sdb = graph
        .create_disk("/dev/sdb", ByteCount::from_gib(200))
        .unwrap();
    let nvme = graph
        .create_disk("/dev/nvme0n1", ByteCount::from_gib(20))
        .unwrap();

    let cset = graph.create_bcache_cset(nvme).unwrap();
    let bcache0 = graph
        .create_bcache("/dev/bcache0", sda, Some(cset), CacheMode::Writeback)
        .unwrap();
    graph
        .create_bcache("/dev/bcache1", sdb, Some(cset), CacheMode::Writethrough)
        .unwrap();

    let fs = graph
        .create_filesystem(&[bcache0], FileSystemType::Ext4)
        .unwrap();
    graph.set_mount_point(fs, Some("/srv")).unwrap();

    graph.check().unwrap();
    graph
}

/// A disk with an encrypted /home.
///
/// ```text
/// sda ── gpt ─┬─ sda1 ── vfat (/boot/efi)
///             ├─ sda2 ── btrfs (/)
///             ├─ sda3
///             └─ sda4 ── cr_sda4 ── ext4 (/home)
/// ```
pub(crate) fn encrypted_scenario() -> Devicegraph {
    let mut graph = Devicegraph::new();
    let (_, sda) = gpt_disk(&mut graph, "/dev/sda", 120, &[1, 40, 20, 40]);

    let efi = graph
        .create_filesystem(&[sda[0]], FileSystemType::Vfat)
        .unwrap();
    graph.set_mount_point(efi, Some("/boot/efi")).unwrap();
    let root = graph
        .create_filesystem(&[sda[1]], FileSystemType::Btrfs)
        .unwrap();
    graph.set_mount_point(root, Some("/")).unwrap();

    let encryption = graph
        .encrypt(sda[3], "cr_sda4", EncryptionType::Luks2)
        .unwrap();
    graph
        .set_crypttab_name(encryption, Some("cr_home"))
        .unwrap();
    let home = graph
        .create_filesystem(&[encryption], FileSystemType::Ext4)
        .unwrap();
    graph.set_mount_point(home, Some("/home")).unwrap();

    graph.check().unwrap();
    graph
}
