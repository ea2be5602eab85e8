use std::net::Ipv4Addr;

use serde_json::json;

use crate::{
    api::{
        infrastructure::{VSpherePlatformNodeNetworking, VSpherePlatformSpec, VSpherePlatformStatus},
        Infrastructure, Network, PlatformType,
    },
    cloud::{
        ini_config,
        render_provider,
        template::{validate_images, TemplateSource, ValueRule},
        vsphere_config::{self, CpiConfig, VirtualCenterConfig},
        CloudProviderAssets,
    },
    config::{FeatureGateAccess, OperatorConfig},
    error::{OperatorError, OperatorResult},
    template_source,
};

const PROVIDER_NAME: &str = "vsphere";

const TEMPLATES: &[TemplateSource] = &[
    template_source!(Deployment, "vsphere/deployment.yaml"),
];

const VALUE_RULES: &[(&str, ValueRule)] = &[
    ("images", ValueRule::Required),
    ("infrastructureName", ValueRule::RequiredString),
    ("globalCredsSecretNamespace", ValueRule::RequiredString),
    ("globalCredsSecretName", ValueRule::RequiredString),
    ("cloudproviderName", ValueRule::RequiredString),
];

/// Credentials secret the CCM reads from the managed namespace.
const GLOBAL_CREDS_SECRET_NAME: &str = "vsphere-cloud-credentials";

pub fn new_provider_assets(config: &OperatorConfig) -> OperatorResult<Box<dyn CloudProviderAssets>> {
    let ccm_image = config.images_reference.cloud_controller_manager_vsphere.as_str();
    validate_images(PROVIDER_NAME, &[("CloudControllerManager", ccm_image)])?;

    let values = json!({
        "images": { "cloudControllerManager": ccm_image },
        "infrastructureName": config.infrastructure_name,
        "globalCredsSecretNamespace": config.managed_namespace,
        "globalCredsSecretName": GLOBAL_CREDS_SECRET_NAME,
        "cloudproviderName": config.platform_name(),
    });
    render_provider(
        PROVIDER_NAME,
        TEMPLATES,
        VALUE_RULES,
        values.as_object().cloned().unwrap_or_default(),
        config,
    )
}

/// Tag categories on vSphere clusters and datacenters that drive the topology labels.
const REGION_LABEL_VALUE: &str = "openshift-region";
const ZONE_LABEL_VALUE: &str = "openshift-zone";

/// OVN-Kubernetes internal address, never a node address.
const OVN_INTERNAL_ADDRESS: &str = "fd69::2/128";

fn is_ipv4(addr: &str) -> bool {
    addr.split('/').next().is_some_and(|ip| ip.parse::<Ipv4Addr>().is_ok())
}

/// Dual stack clusters have exactly two service networks. The first one decides the IP
/// family priority, and the cluster VIPs are excluded from node addresses.
fn set_dual_stack(
    cfg: &mut CpiConfig,
    status: Option<&VSpherePlatformStatus>,
    networking: &mut VSpherePlatformNodeNetworking,
    network: Option<&Network>,
) {
    let Some(service_network) = network.map(|n| &n.spec.service_network).filter(|s| s.len() == 2) else {
        return;
    };
    cfg.global.ip_family_priority = if is_ipv4(&service_network[0]) {
        vec!["ipv4".to_string(), "ipv6".to_string()]
    } else {
        vec!["ipv6".to_string(), "ipv4".to_string()]
    };

    let vips = status
        .into_iter()
        .flat_map(|s| s.api_server_internal_ips.iter().chain(&s.ingress_ips))
        .map(|addr| {
            if is_ipv4(addr) {
                format!("{addr}/32")
            } else {
                format!("{addr}/128")
            }
        })
        .chain(std::iter::once(OVN_INTERNAL_ADDRESS.to_string()));
    for cidr in vips {
        networking.external.exclude_network_subnet_cidr.push(cidr.clone());
        networking.internal.exclude_network_subnet_cidr.push(cidr);
    }
}

fn set_nodes(cfg: &mut CpiConfig, networking: &VSpherePlatformNodeNetworking) {
    let nodes = &mut cfg.nodes;
    nodes.external_vm_network_name = networking.external.network.clone();
    nodes.external_network_subnet_cidr = networking.external.network_subnet_cidr.join(",");
    nodes.exclude_external_network_subnet_cidr = networking.external.exclude_network_subnet_cidr.join(",");

    nodes.internal_vm_network_name = networking.internal.network.clone();
    nodes.internal_network_subnet_cidr = networking.internal.network_subnet_cidr.join(",");
    nodes.exclude_internal_network_subnet_cidr = networking.internal.exclude_network_subnet_cidr.join(",");
}

/// vCenters from the platform spec replace same-named entries. Every failure domain datacenter is
/// added to its vCenter.
fn set_virtual_centers(cfg: &mut CpiConfig, spec: &VSpherePlatformSpec) {
    for vcenter in &spec.vcenters {
        cfg.vcenter.insert(
            vcenter.server.clone(),
            VirtualCenterConfig {
                vcenter_ip: vcenter.server.clone(),
                vcenter_port: vcenter.port.into(),
                datacenters: vcenter.datacenters.clone(),
                ..Default::default()
            },
        );
    }

    for fd in &spec.failure_domains {
        let datacenter = &fd.topology.datacenter;
        let vcenter = cfg
            .vcenter
            .entry(fd.server.clone())
            .or_insert_with(|| VirtualCenterConfig {
                vcenter_ip: fd.server.clone(),
                ..Default::default()
            });
        if !vcenter.datacenters.contains(datacenter) {
            vcenter.datacenters.push(datacenter.clone());
        }
    }
}

/// Converts the legacy config to YAML and fills vCenters, labels and node networking from
/// the Infrastructure platform spec.
pub fn cloud_config_transformer(
    source: &str,
    infra: &Infrastructure,
    network: Option<&Network>,
    _feature_gates: Option<&FeatureGateAccess>,
) -> OperatorResult<String> {
    let Some(status) = infra
        .platform_status()
        .filter(|ps| ps.type_ == PlatformType::VSphere)
    else {
        return Err(OperatorError::WrongPlatform(format!(
            "to be {}",
            PlatformType::VSphere
        )));
    };

    let mut cfg = vsphere_config::read_config(source).map_err(ini_config::read_error)?;

    if let Some(spec) = infra.spec.platform_spec.as_ref().and_then(|p| p.vsphere.as_ref()) {
        let mut networking = spec.node_networking.clone();
        set_dual_stack(&mut cfg, status.vsphere.as_ref(), &mut networking, network);
        set_nodes(&mut cfg, &networking);
        set_virtual_centers(&mut cfg, spec);

        // Single failure domain installs keep working without topology labels.
        if spec.failure_domains.len() > 1 {
            cfg.labels.zone = ZONE_LABEL_VALUE.to_string();
            cfg.labels.region = REGION_LABEL_VALUE.to_string();
        }
    }

    vsphere_config::marshal_config(&cfg)
}
