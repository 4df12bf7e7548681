use std::path::Path;

use anyhow::{bail, Context, Error};
use devgraph_api::{
    devicegraph::{actions::diff, crypttab::Crypttab, document::DeviceEntry},
    Device, DeviceKind, Devicegraph, DevicegraphDocument, EdgeKind, Sid, SystemContext,
    UdevLookup,
};
use log::{debug, info};

use crate::{
    cli::{Cli, Commands, OutputFormat, ResolveOptions},
    config::DevgraphConfig,
};

/// Runs the command and returns what it prints.
pub fn run(cli: &Cli) -> Result<String, Error> {
    debug!("Running '{}'", cli.command);
    match &cli.command {
        Commands::Check { graph } => check(graph),
        Commands::List {
            graph,
            kind,
            format,
        } => list(graph, *kind, *format),
        Commands::Tree { graph } => tree(graph),
        Commands::Diff {
            origin,
            target,
            format,
        } => diff_graphs(origin, target, *format),
        Commands::Remove {
            graph,
            name,
            output,
            resolve,
        } => {
            let config = load_config(cli.config.as_deref(), resolve)?;
            remove(graph, name, output.as_deref(), &config)
        }
        Commands::Resolve {
            graph,
            name,
            resolve,
        } => {
            let config = load_config(cli.config.as_deref(), resolve)?;
            resolve_name(graph, name, &config)
        }
        Commands::Convert { input, output } => convert(input, output),
    }
}

fn load_config(path: Option<&Path>, options: &ResolveOptions) -> Result<DevgraphConfig, Error> {
    Ok(DevgraphConfig::load_or_default(path)?.with_overrides(options))
}

fn check(path: &Path) -> Result<String, Error> {
    let graph = Devicegraph::load(path)?;
    Ok(format!(
        "{}: {} device(s), {} holder(s), valid",
        path.display(),
        graph.len(),
        graph.edge_count()
    ))
}

fn list(path: &Path, kind: Option<DeviceKind>, format: OutputFormat) -> Result<String, Error> {
    let graph = Devicegraph::load(path)?;
    let devices: Vec<&Device> = match kind {
        Some(kind) => graph.all_of_kind(kind),
        None => graph.devices(),
    };

    match format {
        OutputFormat::Text => Ok(devices
            .iter()
            .map(|device| {
                let size = device
                    .size()
                    .map(|size| size.to_human_readable())
                    .unwrap_or_default();
                let kind: &'static str = device.kind().into();
                format!(
                    "{:>5}  {:<16} {:<28} {size}",
                    device.sid(),
                    kind,
                    device.display_name()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")),
        OutputFormat::Yaml => {
            let entries: Vec<DeviceEntry> = devices.into_iter().map(DeviceEntry::from).collect();
            serde_yaml::to_string(&entries).context("Failed to serialize devices")
        }
    }
}

fn tree(path: &Path) -> Result<String, Error> {
    Devicegraph::load(path)?
        .to_tree_string()
        .context("Failed to render devicegraph tree")
}

fn diff_graphs(origin: &Path, target: &Path, format: OutputFormat) -> Result<String, Error> {
    let origin = Devicegraph::load(origin)?;
    let target = Devicegraph::load(target)?;
    let plan = diff(&origin, &target)?;
    info!("Planned {} action(s)", plan.len());

    match format {
        OutputFormat::Text => Ok(plan.to_string()),
        OutputFormat::Yaml => {
            serde_yaml::to_string(&plan.summaries()).context("Failed to serialize actions")
        }
    }
}

/// Resolves `name` in the graph. The system lookup only runs against the
/// probed graph of the configuration, never without one.
fn find_sid(graph: &Devicegraph, name: &str, config: &DevgraphConfig) -> Result<Sid, Error> {
    let probed = match &config.probed {
        Some(path) if config.system_lookup => Some(Devicegraph::load(path)?),
        Some(_) => None,
        None => {
            if config.system_lookup {
                debug!("No probed devicegraph configured, skipping system lookup");
            }
            None
        }
    };
    let lookup = UdevLookup::new(&config.udev_root);
    let system = probed
        .as_ref()
        .map(|probed| SystemContext::new(probed, config.committed, &lookup));

    match graph.find_by_any_name(name, config.alternative_names, system.as_ref()) {
        Some(device) => Ok(device.sid()),
        None => bail!("No device found for name '{name}'"),
    }
}

/// Loads the graph, recording the crypttab names of the configuration first.
fn load_for_resolution(path: &Path, config: &DevgraphConfig) -> Result<Devicegraph, Error> {
    let mut graph = Devicegraph::load(path)?;
    if let Some(crypttab) = &config.crypttab {
        let updated = graph.save_crypttab_names(&Crypttab::load(crypttab)?);
        debug!("Recorded {updated} crypttab name(s)");
    }
    Ok(graph)
}

fn resolve_name(path: &Path, name: &str, config: &DevgraphConfig) -> Result<String, Error> {
    let graph = load_for_resolution(path, config)?;
    let sid = find_sid(&graph, name, config)?;
    Ok(graph.try_find(sid)?.describe())
}

fn remove(
    path: &Path,
    name: &str,
    output: Option<&Path>,
    config: &DevgraphConfig,
) -> Result<String, Error> {
    // Crypttab names only help finding the device, they are not saved.
    let mut graph = Devicegraph::load(path)?;
    let sid = find_sid(&load_for_resolution(path, config)?, name, config)?;
    let origin = graph.duplicate();

    let removed = remove_device(&mut graph, sid)?;
    info!("Removed {} device(s)", removed.len());

    let output = output.unwrap_or(path);
    graph.save(output)?;
    debug!("Saved devicegraph to '{}'", output.display());

    Ok(diff(&origin, &graph)?.to_string())
}

/// Removes the device with the remover that fits its kind.
fn remove_device(graph: &mut Devicegraph, sid: Sid) -> Result<Vec<Sid>, Error> {
    let device = graph.try_find(sid)?;
    let removed = match device.kind() {
        DeviceKind::Partition => {
            let table = parent_sid(graph, sid, EdgeKind::PARTITION_OF)?;
            graph.delete_partition(table, sid)?
        }
        DeviceKind::LvmLv => {
            let vg = parent_sid(graph, sid, EdgeKind::LV_OF)?;
            graph.delete_lvm_lv(vg, sid)?
        }
        DeviceKind::Bcache => graph.remove_bcache(sid)?,
        DeviceKind::Md => graph.remove_md(sid)?,
        DeviceKind::LvmVg => graph.remove_lvm_vg(sid)?,
        DeviceKind::Nfs => graph.remove_nfs(sid)?,
        _ => graph.remove(sid)?,
    };
    Ok(removed)
}

fn parent_sid(graph: &Devicegraph, sid: Sid, kind: EdgeKind) -> Result<Sid, Error> {
    match graph.parents_by_edge(sid, kind).first() {
        Some(parent) => Ok(parent.sid()),
        None => bail!("Device with sid {sid} has no parent through [{kind}]"),
    }
}

fn convert(input: &Path, output: &Path) -> Result<String, Error> {
    let document = DevicegraphDocument::load(input)?;
    let graph = Devicegraph::from_document(&document)
        .with_context(|| format!("Invalid devicegraph in '{}'", input.display()))?;
    graph.save(output)?;
    Ok(format!(
        "Converted '{}' to '{}' ({} device(s))",
        input.display(),
        output.display(),
        graph.len()
    ))
}
