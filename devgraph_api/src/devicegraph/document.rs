//! On-disk representation of a devicegraph.
//!
//! A document is a flat list of devices followed by a flat list of holders
//! (edges), the same shape libstorage uses for its XML device trees. The
//! same structure is also read and written as YAML.

use std::{fs, path::Path};

use anyhow::{bail, Context, Error};
use log::{debug, trace};
use quick_xml::{
    events::{BytesDecl, Event},
    Writer,
};
use serde::{Deserialize, Serialize};

use crate::{
    primitives::{bytes::ByteCount, region::Region},
    Sid,
};

use super::{
    builder::DevicegraphBuilder,
    device::Device,
    edges::{Edge, EdgeKind},
    error::DevicegraphError,
    graph::Devicegraph,
    types::{
        CacheMode, DeviceKind, DiskTransport, EncryptionType, FileSystemType, PartitionTableType,
        PartitionType, RaidLevel,
    },
};

const XML_HEADER_VERSION: &str = "1.0";
const XML_HEADER_ENCODING: &str = "UTF-8";
const XML_ROOT: &str = "Devicegraph";

/// Serialization format of a document, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Xml,
    Yaml,
}

impl DocumentFormat {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("xml") => Ok(Self::Xml),
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            _ => bail!(
                "Cannot tell the format of '{}', expected a .xml, .yaml or .yml file",
                path.display()
            ),
        }
    }
}

/// A devicegraph as stored in a file.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename = "Devicegraph")]
pub struct DevicegraphDocument {
    #[serde(rename = "device", default)]
    pub devices: Vec<DeviceEntry>,

    #[serde(rename = "holder", default)]
    pub holders: Vec<HolderEntry>,
}

/// One device of a document. Attributes that do not apply to the kind are
/// left out.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DeviceEntry {
    pub sid: Sid,

    pub kind: DeviceKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "udev-name", default, skip_serializing_if = "Vec::is_empty")]
    pub udev_names: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<ByteCount>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<DiskTransport>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<RaidLevel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_type: Option<PartitionTableType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_type: Option<PartitionType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent_size: Option<ByteCount>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_mode: Option<CacheMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_type: Option<EncryptionType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypttab_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_type: Option<FileSystemType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl DeviceEntry {
    /// An entry with only the mandatory fields set.
    pub fn new(sid: Sid, kind: DeviceKind, name: Option<&str>) -> Self {
        Self {
            sid,
            kind,
            name: name.map(str::to_string),
            udev_names: Vec::new(),
            size: None,
            transport: None,
            level: None,
            table_type: None,
            region: None,
            partition_type: None,
            extent_size: None,
            cache_mode: None,
            uuid: None,
            encryption_type: None,
            crypttab_name: None,
            fs_type: None,
            label: None,
            mount_point: None,
            server: None,
            path: None,
        }
    }

    /// Identifies the entry in error messages.
    pub(crate) fn describe(&self) -> String {
        match &self.name {
            Some(name) => format!("'{name}'"),
            None => format!("{} with sid {}", self.kind, self.sid),
        }
    }
}

/// One edge of a document, from `source` (parent) to `target` (child).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct HolderEntry {
    pub kind: EdgeKind,
    pub source: Sid,
    pub target: Sid,
}

impl From<Edge> for HolderEntry {
    fn from(edge: Edge) -> Self {
        Self {
            kind: edge.kind,
            source: edge.parent,
            target: edge.child,
        }
    }
}

impl From<HolderEntry> for Edge {
    fn from(holder: HolderEntry) -> Self {
        Self {
            parent: holder.source,
            child: holder.target,
            kind: holder.kind,
        }
    }
}

impl DevicegraphDocument {
    pub fn from_xml(xml: &str) -> Result<Self, Error> {
        quick_xml::de::from_str(xml).context("Failed to parse devicegraph XML")
    }

    pub fn to_xml(&self) -> Result<String, Error> {
        let mut data = Vec::new();
        let mut writer = Writer::new_with_indent(&mut data, b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new(
                XML_HEADER_VERSION,
                Some(XML_HEADER_ENCODING),
                None,
            )))
            .context("Failed to write XML declaration")?;
        writer
            .write_serializable(XML_ROOT, self)
            .context("Failed to serialize devicegraph to XML")?;

        String::from_utf8(data).context("Serialized XML is not valid UTF-8")
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        serde_yaml::from_str(yaml).context("Failed to parse devicegraph YAML")
    }

    pub fn to_yaml(&self) -> Result<String, Error> {
        serde_yaml::to_string(self).context("Failed to serialize devicegraph to YAML")
    }

    pub fn parse(contents: &str, format: DocumentFormat) -> Result<Self, Error> {
        match format {
            DocumentFormat::Xml => Self::from_xml(contents),
            DocumentFormat::Yaml => Self::from_yaml(contents),
        }
    }

    pub fn render(&self, format: DocumentFormat) -> Result<String, Error> {
        match format {
            DocumentFormat::Xml => self.to_xml(),
            DocumentFormat::Yaml => self.to_yaml(),
        }
    }

    /// Reads a document, choosing the format from the file extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let format = DocumentFormat::from_path(path)?;
        debug!("Loading devicegraph document from '{}'", path.display());
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        Self::parse(&contents, format)
            .with_context(|| format!("Failed to load devicegraph from '{}'", path.display()))
    }

    /// Writes the document, choosing the format from the file extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let contents = self.render(DocumentFormat::from_path(path)?)?;
        debug!("Saving devicegraph document to '{}'", path.display());
        fs::write(path, contents).with_context(|| format!("Failed to write '{}'", path.display()))
    }
}

impl Devicegraph {
    /// Builds a snapshot from a document, checking every structural rule.
    pub fn from_document(document: &DevicegraphDocument) -> Result<Self, DevicegraphError> {
        let mut builder = DevicegraphBuilder::default();
        for entry in &document.devices {
            builder.add_device(Device::try_from(entry)?);
        }
        for holder in &document.holders {
            builder.add_edge(Edge::from(*holder));
        }
        builder.build()
    }

    /// Document holding the devices and edges of the snapshot, both sorted.
    pub fn to_document(&self) -> DevicegraphDocument {
        let document = DevicegraphDocument {
            devices: self.devices().into_iter().map(DeviceEntry::from).collect(),
            holders: self.edges().into_iter().map(HolderEntry::from).collect(),
        };
        trace!(
            "Built document with {} device(s) and {} holder(s)",
            document.devices.len(),
            document.holders.len()
        );
        document
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let document = DevicegraphDocument::load(path)?;
        Self::from_document(&document)
            .with_context(|| format!("Invalid devicegraph in '{}'", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        self.to_document().save(path)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::devicegraph::{error::IntegrityError, test_utils};

    use super::*;

    const SMALL_YAML: &str = indoc! {"
        device:
        - sid: 1
          kind: disk
          name: /dev/sda
          udev-name:
          - /dev/disk/by-id/ata-disk1
          size: 10G
          transport: sata
        - sid: 2
          kind: partition-table
          table-type: gpt
        - sid: 3
          kind: partition
          name: /dev/sda1
          region:
            start: 2048
            length: 2097152
          partition-type: primary
        - sid: 4
          kind: blk-filesystem
          fs-type: ext4
          label: root
          mount-point: /
        holder:
        - kind: table-of
          source: 1
          target: 2
        - kind: partition-of
          source: 2
          target: 3
        - kind: formatted-as
          source: 3
          target: 4
    "};

    #[test]
    fn test_load_yaml() {
        let document = DevicegraphDocument::from_yaml(SMALL_YAML).unwrap();
        assert_eq!(document.devices.len(), 4);
        assert_eq!(document.holders.len(), 3);

        let graph = Devicegraph::from_document(&document).unwrap();
        let sda = graph.find_by_name("/dev/sda").unwrap();
        assert_eq!(sda.sid(), Sid(1));
        assert_eq!(sda.size(), Some(ByteCount::from_gib(10)));
        assert_eq!(sda.udev_names(), ["/dev/disk/by-id/ata-disk1"]);

        let sda1 = graph.find_by_name("/dev/sda1").unwrap();
        assert_eq!(sda1.size(), Some(ByteCount::from_gib(1)));
        assert_eq!(sda1.region().unwrap().block_size, 512);
        assert_eq!(graph.find_by_mount_point("/").unwrap().fs_label(), Some("root"));

        // New devices never reuse the loaded sids.
        let mut graph = graph;
        let sdb = graph.create_disk("/dev/sdb", ByteCount::from_gib(1)).unwrap();
        assert!(sdb > Sid(4));
    }

    #[test]
    fn test_document_roundtrip() {
        for graph in [
            test_utils::lvm_scenario(),
            test_utils::md_scenario(),
            test_utils::bcache_scenario(),
            test_utils::encrypted_scenario(),
        ] {
            let document = graph.to_document();

            let yaml = document.to_yaml().unwrap();
            assert_eq!(DevicegraphDocument::from_yaml(&yaml).unwrap(), document);
            assert_eq!(Devicegraph::from_document(&document).unwrap(), graph);

            let xml = document.to_xml().unwrap();
            assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
            assert_eq!(DevicegraphDocument::from_xml(&xml).unwrap(), document);
        }
    }

    #[test]
    fn test_load_xml() {
        let xml = indoc! {r#"
            <?xml version="1.0" encoding="UTF-8"?>
            <Devicegraph>
              <device>
                <sid>10</sid>
                <kind>disk</kind>
                <name>/dev/vda</name>
                <size>20G</size>
                <transport>unknown</transport>
              </device>
              <device>
                <sid>11</sid>
                <kind>blk-filesystem</kind>
                <fs-type>xfs</fs-type>
                <uuid>abcd</uuid>
              </device>
              <holder>
                <kind>formatted-as</kind>
                <source>10</source>
                <target>11</target>
              </holder>
            </Devicegraph>
        "#};

        let graph = Devicegraph::from_document(&DevicegraphDocument::from_xml(xml).unwrap()).unwrap();
        assert_eq!(graph.len(), 2);
        let vda = graph.find_by_name("/dev/vda").unwrap();
        assert_eq!(vda.size(), Some(ByteCount::from_gib(20)));
        assert_eq!(graph.children(vda.sid())[0].fs_uuid(), Some("abcd"));
    }

    #[test]
    fn test_invalid_documents() {
        // Missing mandatory attribute.
        let document = DevicegraphDocument::from_yaml(indoc! {"
            device:
            - sid: 1
              kind: disk
              name: /dev/sda
        "})
        .unwrap();
        assert!(matches!(
            Devicegraph::from_document(&document),
            Err(DevicegraphError::InvalidArgument { .. })
        ));

        // Holder pointing nowhere.
        let mut document = DevicegraphDocument::from_yaml(SMALL_YAML).unwrap();
        document.holders.push(HolderEntry {
            kind: EdgeKind::FormattedAs,
            source: Sid(1),
            target: Sid(99),
        });
        assert_eq!(
            Devicegraph::from_document(&document),
            Err(DevicegraphError::GraphIntegrity(IntegrityError::DanglingReference {
                parent: Sid(1),
                child: Sid(99)
            }))
        );

        // Partition without its table.
        let mut document = DevicegraphDocument::from_yaml(SMALL_YAML).unwrap();
        document.holders.remove(1);
        assert!(matches!(
            Devicegraph::from_document(&document),
            Err(DevicegraphError::GraphIntegrity(IntegrityError::InvalidParentCount { .. }))
        ));

        // Regions whose end cannot be computed, or past the end of the disk.
        let huge = SMALL_YAML.replace("length: 2097152", "length: 18446744073709551615");
        let document = DevicegraphDocument::from_yaml(&huge).unwrap();
        assert!(matches!(
            Devicegraph::from_document(&document),
            Err(DevicegraphError::GraphIntegrity(IntegrityError::BasicCheckFailed { .. }))
        ));

        let past_end = SMALL_YAML.replace("length: 2097152", "length: 41943040");
        let document = DevicegraphDocument::from_yaml(&past_end).unwrap();
        assert_eq!(
            Devicegraph::from_document(&document),
            Err(DevicegraphError::GraphIntegrity(IntegrityError::RegionOutsideDevice {
                device: "'/dev/sda1'".into(),
                region: "[2048, 41943040, 512 B]".into(),
                device_size: "10.00 GiB".into(),
            }))
        );

        // Unknown fields are rejected.
        assert!(DevicegraphDocument::from_yaml(indoc! {"
            device:
            - sid: 1
              kind: disk
              colour: blue
        "})
        .is_err());
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let graph = test_utils::encrypted_scenario();

        for file in ["graph.xml", "graph.yaml"] {
            let path = dir.path().join(file);
            graph.save(&path).unwrap();
            assert_eq!(Devicegraph::load(&path).unwrap(), graph);
        }

        assert!(graph.save(dir.path().join("graph.json")).is_err());
        assert!(Devicegraph::load(dir.path().join("missing.xml")).is_err());
        assert_eq!(
            DocumentFormat::from_path("/tmp/probed.yml").unwrap(),
            DocumentFormat::Yaml
        );
    }
}
