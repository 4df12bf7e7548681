use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::cli::ResolveOptions;

/// Location of the configuration file when none is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/devgraph/config.yaml";

/// Definition of devgraph's configuration file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DevgraphConfig {
    /// Devicegraph probed from the running system. Names that only the
    /// system knows are resolved against it.
    #[serde(default)]
    pub probed: Option<PathBuf>,

    /// Whether the probed devicegraph was already committed to the system,
    /// in which case the system no longer matches it.
    #[serde(default)]
    pub committed: bool,

    /// Derive alternative names from crypttab names.
    #[serde(default = "default_true")]
    pub alternative_names: bool,

    /// Ask the running system about names found nowhere else.
    #[serde(default = "default_true")]
    pub system_lookup: bool,

    /// Crypttab whose entry names are recorded on the encryption layers.
    #[serde(default)]
    pub crypttab: Option<PathBuf>,

    /// Root of the filesystem holding /dev. Default is "/".
    #[serde(default = "default_udev_root")]
    pub udev_root: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_udev_root() -> PathBuf {
    PathBuf::from("/")
}

impl Default for DevgraphConfig {
    fn default() -> Self {
        Self {
            probed: None,
            committed: false,
            alternative_names: true,
            system_lookup: true,
            crypttab: None,
            udev_root: default_udev_root(),
        }
    }
}

impl DevgraphConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration '{}'", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse configuration '{}'", path.display()))
    }

    /// Loads the given configuration file. Without one, loads the default
    /// file when it exists and falls back to the default values otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            Self::load(default_path)
        } else {
            debug!("No configuration at '{DEFAULT_CONFIG_PATH}', using defaults");
            Ok(Self::default())
        }
    }

    /// Applies the command line flags on top of the file values.
    pub fn with_overrides(mut self, options: &ResolveOptions) -> Self {
        if let Some(probed) = &options.probed {
            self.probed = Some(probed.clone());
        }
        if let Some(crypttab) = &options.crypttab {
            self.crypttab = Some(crypttab.clone());
        }
        if options.committed {
            self.committed = true;
        }
        if options.no_alternative_names {
            self.alternative_names = false;
        }
        if options.no_system_lookup {
            self.system_lookup = false;
        }
        self
    }
}
