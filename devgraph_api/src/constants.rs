// Device paths

/// Directory holding the kernel device nodes.
pub const DEV_DIRECTORY: &str = "/dev";

/// Prefix of device-mapper names.
pub const DEV_MAPPER_PREFIX: &str = "/dev/mapper/";

/// Udev directory with links named after filesystem UUIDs.
pub const DISK_BY_UUID_DIRECTORY: &str = "/dev/disk/by-uuid";

/// Udev directory with links named after filesystem labels.
pub const DISK_BY_LABEL_DIRECTORY: &str = "/dev/disk/by-label";

/// Udev directory with links named after GPT partition UUIDs.
pub const DISK_BY_PARTUUID_DIRECTORY: &str = "/dev/disk/by-partuuid";

// Geometry

/// Logical block size assumed when a region does not state one.
pub const DEFAULT_BLOCK_SIZE: u64 = 512;

/// Alignment of the start of new partitions, 1 MiB.
pub const PARTITION_ALIGNMENT: u64 = 1 << 20;

/// Sectors reserved at the end of a GPT disk for the backup header and table.
pub const GPT_BACKUP_SECTORS: u64 = 33;

// Files

/// Default location of the crypttab file.
pub const CRYPTTAB_PATH: &str = "/etc/crypttab";

/// Comment marker used by crypttab and fstab-like files.
pub const COMMENT_MARKER: char = '#';
