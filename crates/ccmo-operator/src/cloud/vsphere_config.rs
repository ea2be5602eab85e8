//! The vSphere CCM cloud config. Accepts the YAML form and the legacy INI form, always
//! writes YAML.

use std::collections::BTreeMap;

use ini::{Ini, Properties};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    cloud::ini_config::{self, FieldKind, FieldSpec, TypedSection},
    error::{OperatorError, OperatorResult},
};

fn is_zero(n: &u32) -> bool {
    *n == 0
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Global {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default, rename = "server", skip_serializing_if = "String::is_empty")]
    pub vcenter_ip: String,
    #[serde(default, rename = "port", skip_serializing_if = "is_zero")]
    pub vcenter_port: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub insecure_flag: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datacenters: Vec<String>,
    #[serde(default, rename = "soapRoundtripCount", skip_serializing_if = "is_zero")]
    pub round_tripper_count: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ca_file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thumbprint: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secrets_directory: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub api_disable: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_binding: String,
    #[serde(default, rename = "ipFamily", skip_serializing_if = "Vec::is_empty")]
    pub ip_family_priority: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VirtualCenterConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default, rename = "server", skip_serializing_if = "String::is_empty")]
    pub vcenter_ip: String,
    #[serde(default, rename = "port", skip_serializing_if = "is_zero")]
    pub vcenter_port: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub insecure_flag: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datacenters: Vec<String>,
    #[serde(default, rename = "soapRoundtripCount", skip_serializing_if = "is_zero")]
    pub round_tripper_count: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ca_file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thumbprint: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_namespace: String,
    #[serde(default, rename = "ipFamily", skip_serializing_if = "Vec::is_empty")]
    pub ip_family_priority: Vec<String>,
}

/// vSphere tag categories that become the zone and region node labels.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
pub struct Labels {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zone: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,
}

impl Labels {
    fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Nodes {
    #[serde(default, rename = "internalNetworkSubnetCidr", skip_serializing_if = "String::is_empty")]
    pub internal_network_subnet_cidr: String,
    #[serde(default, rename = "externalNetworkSubnetCidr", skip_serializing_if = "String::is_empty")]
    pub external_network_subnet_cidr: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub internal_vm_network_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub external_vm_network_name: String,
    #[serde(default, rename = "excludeInternalNetworkSubnetCidr", skip_serializing_if = "String::is_empty")]
    pub exclude_internal_network_subnet_cidr: String,
    #[serde(default, rename = "excludeExternalNetworkSubnetCidr", skip_serializing_if = "String::is_empty")]
    pub exclude_external_network_subnet_cidr: String,
}

impl Nodes {
    fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
pub struct CpiConfig {
    #[serde(default)]
    pub global: Global,
    /// Keyed by the name of the `[VirtualCenter "..."]` section or YAML entry.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vcenter: BTreeMap<String, VirtualCenterConfig>,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    #[serde(default, skip_serializing_if = "Nodes::is_empty")]
    pub nodes: Nodes,
}

const GLOBAL_FIELDS: &[FieldSpec] = &[
    ("user", FieldKind::Text),
    ("password", FieldKind::Text),
    ("server", FieldKind::Text),
    ("port", FieldKind::Text),
    ("insecure-flag", FieldKind::Flag),
    ("datacenters", FieldKind::Text),
    ("soap-roundtrip-count", FieldKind::Number),
    ("ca-file", FieldKind::Text),
    ("thumbprint", FieldKind::Text),
    ("secret-name", FieldKind::Text),
    ("secret-namespace", FieldKind::Text),
    ("secrets-directory", FieldKind::Text),
];

const VIRTUAL_CENTER_FIELDS: &[FieldSpec] = &[
    ("user", FieldKind::Text),
    ("password", FieldKind::Text),
    ("server", FieldKind::Text),
    ("port", FieldKind::Text),
    ("insecure-flag", FieldKind::Flag),
    ("datacenters", FieldKind::Text),
    ("soap-roundtrip-count", FieldKind::Number),
    ("ca-file", FieldKind::Text),
    ("thumbprint", FieldKind::Text),
    ("secret-name", FieldKind::Text),
    ("secret-namespace", FieldKind::Text),
    ("ip-family", FieldKind::Text),
];

const LABELS_FIELDS: &[FieldSpec] = &[("zone", FieldKind::Text), ("region", FieldKind::Text)];

const NODES_FIELDS: &[FieldSpec] = &[
    ("internal-network-subnet-cidr", FieldKind::Text),
    ("external-network-subnet-cidr", FieldKind::Text),
    ("internal-vm-network-name", FieldKind::Text),
    ("external-vm-network-name", FieldKind::Text),
    ("exclude-internal-network-subnet-cidr", FieldKind::Text),
    ("exclude-external-network-subnet-cidr", FieldKind::Text),
];

const VIRTUAL_CENTER_SECTION: &str = "VirtualCenter";

/// Parses the YAML form first and falls back to the legacy INI form.
pub fn read_config(source: &str) -> OperatorResult<CpiConfig> {
    if source.is_empty() {
        return Err(OperatorError::Transform("vSphere config is empty".to_string()));
    }
    match serde_yaml::from_str::<CpiConfig>(source) {
        Ok(cfg) => {
            debug!("vSphere config parsed as yaml");
            Ok(cfg)
        }
        Err(yaml_err) => {
            debug!(error = %yaml_err, "vSphere config is not yaml, falling back to ini");
            read_ini(source)
                .map_err(|e| OperatorError::Transform(format!("ini config parsing failed: {e}")))
        }
    }
}

pub fn marshal_config(cfg: &CpiConfig) -> OperatorResult<String> {
    serde_yaml::to_string(cfg)
        .map_err(|e| OperatorError::Transform(format!("can not marshal config into yaml: {e}")))
}

fn sections<'a>(cfg: &'a Ini, name: &'a str) -> impl Iterator<Item = &'a Properties> + 'a {
    cfg.iter()
        .filter(move |(section, _)| section.is_some_and(|s| s.eq_ignore_ascii_case(name)))
        .map(|(_, props)| props)
}

/// `VirtualCenter "10.0.0.1"` yields `10.0.0.1`.
fn virtual_center_name(section: &str) -> Option<&str> {
    let (name, server) = section.split_once(char::is_whitespace)?;
    name.eq_ignore_ascii_case(VIRTUAL_CENTER_SECTION)
        .then(|| server.trim().trim_matches('"'))
}

fn port(section: &TypedSection, context: &str) -> OperatorResult<u32> {
    let value = section.get("port");
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse()
        .map_err(|e| OperatorError::Transform(format!("invalid port parameter for {context}: {e}")))
}

fn count(section: &TypedSection) -> OperatorResult<u32> {
    section
        .get("soap-roundtrip-count")
        .parse()
        .map_err(|e| OperatorError::Transform(format!("invalid soap-roundtrip-count: {e}")))
}

fn split_datacenters(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|dc| !dc.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_ini(source: &str) -> OperatorResult<CpiConfig> {
    let ini = ini_config::load(source)?;

    let global = TypedSection::parse(sections(&ini, "Global"), GLOBAL_FIELDS)?;
    let labels = TypedSection::parse(sections(&ini, "Labels"), LABELS_FIELDS)?;
    let nodes = TypedSection::parse(sections(&ini, "Nodes"), NODES_FIELDS)?;

    let mut grouped: BTreeMap<String, Vec<&Properties>> = BTreeMap::new();
    for (name, props) in ini.iter() {
        if let Some(server) = name.and_then(virtual_center_name) {
            grouped.entry(server.to_string()).or_default().push(props);
        }
    }

    let mut vcenter = BTreeMap::new();
    for (name, props) in grouped {
        let vc = TypedSection::parse(props, VIRTUAL_CENTER_FIELDS)?;
        let server = match vc.get("server") {
            "" => name.clone(),
            server => server.to_string(),
        };
        let ip_family_priority = match vc.get("ip-family") {
            "" => Vec::new(),
            family => vec![family.to_string()],
        };
        let config = VirtualCenterConfig {
            user: vc.get("user").to_string(),
            password: vc.get("password").to_string(),
            vcenter_ip: server,
            vcenter_port: port(&vc, &format!("vc {name}"))?,
            insecure_flag: vc.get("insecure-flag") == "true",
            datacenters: split_datacenters(vc.get("datacenters")),
            round_tripper_count: count(&vc)?,
            ca_file: vc.get("ca-file").to_string(),
            thumbprint: vc.get("thumbprint").to_string(),
            secret_name: vc.get("secret-name").to_string(),
            secret_namespace: vc.get("secret-namespace").to_string(),
            ip_family_priority,
        };
        vcenter.insert(name, config);
    }

    Ok(CpiConfig {
        global: Global {
            user: global.get("user").to_string(),
            password: global.get("password").to_string(),
            vcenter_ip: global.get("server").to_string(),
            vcenter_port: port(&global, "global")?,
            insecure_flag: global.get("insecure-flag") == "true",
            datacenters: split_datacenters(global.get("datacenters")),
            round_tripper_count: count(&global)?,
            ca_file: global.get("ca-file").to_string(),
            thumbprint: global.get("thumbprint").to_string(),
            secret_name: global.get("secret-name").to_string(),
            secret_namespace: global.get("secret-namespace").to_string(),
            secrets_directory: global.get("secrets-directory").to_string(),
            ..Default::default()
        },
        vcenter,
        labels: Labels {
            zone: labels.get("zone").to_string(),
            region: labels.get("region").to_string(),
        },
        nodes: Nodes {
            internal_network_subnet_cidr: nodes.get("internal-network-subnet-cidr").to_string(),
            external_network_subnet_cidr: nodes.get("external-network-subnet-cidr").to_string(),
            internal_vm_network_name: nodes.get("internal-vm-network-name").to_string(),
            external_vm_network_name: nodes.get("external-vm-network-name").to_string(),
            exclude_internal_network_subnet_cidr: nodes
                .get("exclude-internal-network-subnet-cidr")
                .to_string(),
            exclude_external_network_subnet_cidr: nodes
                .get("exclude-external-network-subnet-cidr")
                .to_string(),
        },
    })
}
