//! /etc/crypttab support.
//!
//! Encryption layers may be probed under a device-mapper name that differs
//! from the one used in crypttab (and thus in fstab). Recording the crypttab
//! name on each encryption layer lets the name resolver try the probed name
//! as an alternative.

use std::{fs, path::Path};

use anyhow::{bail, Context, Error};
use log::{debug, warn};

use crate::{
    constants::{
        COMMENT_MARKER, DISK_BY_LABEL_DIRECTORY, DISK_BY_PARTUUID_DIRECTORY,
        DISK_BY_UUID_DIRECTORY,
    },
    Sid,
};

use super::{edges::EdgeKind, graph::Devicegraph};

/// One line of a crypttab file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrypttabEntry {
    /// Name of the device-mapper device to create.
    pub name: String,

    /// Underlying device, as written in the file (a path or a `UUID=`,
    /// `LABEL=` or `PARTUUID=` spec).
    pub device: String,

    /// Key file. `None` when the password is asked interactively.
    pub key_file: Option<String>,

    pub options: Vec<String>,
}

impl CrypttabEntry {
    /// Path of the underlying device, translating `UUID=`, `LABEL=` and
    /// `PARTUUID=` specs into their udev links.
    pub fn device_path(&self) -> String {
        let specs = [
            ("UUID=", DISK_BY_UUID_DIRECTORY),
            ("LABEL=", DISK_BY_LABEL_DIRECTORY),
            ("PARTUUID=", DISK_BY_PARTUUID_DIRECTORY),
        ];

        specs
            .iter()
            .find_map(|(prefix, directory)| {
                self.device
                    .strip_prefix(prefix)
                    .map(|value| format!("{directory}/{value}"))
            })
            .unwrap_or_else(|| self.device.clone())
    }
}

/// Parsed contents of a crypttab file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Crypttab {
    pub entries: Vec<CrypttabEntry>,
}

impl Crypttab {
    /// Parses crypttab contents. Comments and blank lines are ignored.
    pub fn parse(contents: &str) -> Result<Self, Error> {
        let mut entries = Vec::new();

        for (number, line) in contents.lines().enumerate() {
            let line = match line.find(COMMENT_MARKER) {
                Some(position) => &line[..position],
                None => line,
            };
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            if fields.len() < 2 {
                bail!(
                    "Line {}: expected at least a name and a device, found '{}'",
                    number + 1,
                    line.trim()
                );
            }

            entries.push(CrypttabEntry {
                name: fields[0].to_string(),
                device: fields[1].to_string(),
                key_file: fields
                    .get(2)
                    .filter(|key| **key != "none" && **key != "-")
                    .map(|key| key.to_string()),
                options: fields
                    .get(3)
                    .map(|options| options.split(',').map(str::to_string).collect())
                    .unwrap_or_default(),
            });
        }

        Ok(Self { entries })
    }

    /// Reads and parses a crypttab file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read crypttab file '{}'", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse crypttab file '{}'", path.display()))
    }

    /// Renders the entries back into crypttab syntax.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                let mut fields = vec![
                    entry.name.clone(),
                    entry.device.clone(),
                    entry.key_file.clone().unwrap_or_else(|| "none".into()),
                ];
                if !entry.options.is_empty() {
                    fields.push(entry.options.join(","));
                }
                fields.join(" ") + "\n"
            })
            .collect()
    }
}

impl Devicegraph {
    /// Records the crypttab name of every encryption layer referenced by the
    /// crypttab entries. Returns how many layers were updated.
    ///
    /// Entries whose device cannot be found, or that is not encrypted, are
    /// skipped.
    pub fn save_crypttab_names(&mut self, crypttab: &Crypttab) -> usize {
        let mut updated = 0;

        for entry in &crypttab.entries {
            let Some(encryption) = self.encryption_for(&entry.device_path()) else {
                debug!("No encryption layer for crypttab entry '{}'", entry.name);
                continue;
            };

            match self.set_crypttab_name(encryption, Some(&entry.name)) {
                Ok(()) => updated += 1,
                Err(e) => warn!("Cannot save crypttab name '{}': {e}", entry.name),
            }
        }

        updated
    }

    /// Encryption layer sitting on the device with the given name.
    fn encryption_for(&self, device_name: &str) -> Option<Sid> {
        let device = self.find_by_structural_name(device_name)?;
        self.children_by_edge(device, EdgeKind::EncryptionOf)
            .first()
            .map(|encryption| encryption.sid())
    }
}
