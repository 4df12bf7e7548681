use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};

use clap::{Args, Parser, Subcommand};
use devgraph_api::DeviceKind;
use log::LevelFilter;

use crate::DEVGRAPH_VERSION;

#[derive(Parser, Debug)]
#[clap(version = DEVGRAPH_VERSION)]
pub struct Cli {
    /// Logging verbosity [OFF, ERROR, WARN, INFO, DEBUG, TRACE]
    #[arg(global = true, short, long, default_value_t = LevelFilter::Warn)]
    pub verbosity: LevelFilter,

    /// Path to the configuration file
    #[arg(global = true, short, long)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

/// How results are printed.
#[derive(clap::ValueEnum, Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum OutputFormat {
    #[default]
    Text,
    Yaml,
}

/// Flags overriding the name resolution settings of the configuration file.
#[derive(Args, Clone, Debug, Default, Eq, PartialEq)]
pub struct ResolveOptions {
    /// Devicegraph probed from the running system
    #[arg(long)]
    pub probed: Option<PathBuf>,

    /// The probed devicegraph was already committed to the system
    #[arg(long)]
    pub committed: bool,

    /// Crypttab whose entry names are recorded on the encryption layers
    #[arg(long)]
    pub crypttab: Option<PathBuf>,

    /// Do not derive alternative names from crypttab names
    #[arg(long)]
    pub no_alternative_names: bool,

    /// Do not ask the running system about unknown names
    #[arg(long)]
    pub no_system_lookup: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a devicegraph file
    Check {
        /// Devicegraph file (.xml, .yaml or .yml)
        #[clap(index = 1)]
        graph: PathBuf,
    },

    /// List the devices of a devicegraph
    List {
        /// Devicegraph file (.xml, .yaml or .yml)
        #[clap(index = 1)]
        graph: PathBuf,

        /// Only list devices of this kind, e.g. "lvm-vg"
        #[clap(short, long)]
        kind: Option<DeviceKind>,

        #[clap(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Print the devices of a devicegraph as a tree
    Tree {
        /// Devicegraph file (.xml, .yaml or .yml)
        #[clap(index = 1)]
        graph: PathBuf,
    },

    /// Print the ordered actions turning one devicegraph into another
    Diff {
        /// Devicegraph the actions start from
        #[clap(index = 1)]
        origin: PathBuf,

        /// Devicegraph the actions lead to
        #[clap(index = 2)]
        target: PathBuf,

        #[clap(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Remove a device together with everything built on it
    Remove {
        /// Devicegraph file (.xml, .yaml or .yml)
        #[clap(index = 1)]
        graph: PathBuf,

        /// Name of the device to remove
        #[clap(index = 2)]
        name: String,

        /// Where to save the resulting devicegraph. Default is to overwrite
        /// the input file
        #[clap(short, long)]
        output: Option<PathBuf>,

        #[clap(flatten)]
        resolve: ResolveOptions,
    },

    /// Find the device a name refers to
    Resolve {
        /// Devicegraph file (.xml, .yaml or .yml)
        #[clap(index = 1)]
        graph: PathBuf,

        /// Kernel name, udev link or crypttab name of the device
        #[clap(index = 2)]
        name: String,

        #[clap(flatten)]
        resolve: ResolveOptions,
    },

    /// Convert a devicegraph between XML and YAML
    Convert {
        /// Input file, the format is taken from its extension
        #[clap(index = 1)]
        input: PathBuf,

        /// Output file, the format is taken from its extension
        #[clap(index = 2)]
        output: PathBuf,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Check { .. } => "check",
            Commands::List { .. } => "list",
            Commands::Tree { .. } => "tree",
            Commands::Diff { .. } => "diff",
            Commands::Remove { .. } => "remove",
            Commands::Resolve { .. } => "resolve",
            Commands::Convert { .. } => "convert",
        }
    }
}

impl Display for Commands {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.name())
    }
}
