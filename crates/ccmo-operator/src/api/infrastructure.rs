use std::fmt;

use kube::CustomResource;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "Infrastructure",
    plural = "infrastructures",
    derive = "PartialEq",
    status = "InfrastructureStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureSpec {
    #[serde(default)]
    pub cloud_config: ConfigMapFileReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_spec: Option<PlatformSpec>,
}

/// Platform specific desired configuration. Only vSphere carries anything the operator reads.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
pub struct PlatformSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vsphere: Option<VSpherePlatformSpec>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VSpherePlatformSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vcenters: Vec<VSpherePlatformVCenterSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failure_domains: Vec<VSpherePlatformFailureDomainSpec>,
    #[serde(default)]
    pub node_networking: VSpherePlatformNodeNetworking,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
pub struct VSpherePlatformVCenterSpec {
    pub server: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub datacenters: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
pub struct VSpherePlatformFailureDomainSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub zone: String,
    pub server: String,
    #[serde(default)]
    pub topology: VSpherePlatformTopology,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
pub struct VSpherePlatformTopology {
    #[serde(default)]
    pub datacenter: String,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
pub struct VSpherePlatformNodeNetworking {
    #[serde(default)]
    pub external: VSpherePlatformNodeNetworkingSpec,
    #[serde(default)]
    pub internal: VSpherePlatformNodeNetworkingSpec,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VSpherePlatformNodeNetworkingSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network: String,
    #[serde(default, rename = "networkSubnetCidr", skip_serializing_if = "Vec::is_empty")]
    pub network_subnet_cidr: Vec<String>,
    #[serde(default, rename = "excludeNetworkSubnetCidr", skip_serializing_if = "Vec::is_empty")]
    pub exclude_network_subnet_cidr: Vec<String>,
}

/// Points at the user supplied cloud provider config in `openshift-config`.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
pub struct ConfigMapFileReference {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureStatus {
    #[serde(default)]
    pub infrastructure_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_status: Option<PlatformStatus>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub control_plane_topology: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub infrastructure_topology: String,
}

pub const SINGLE_REPLICA_TOPOLOGY: &str = "SingleReplica";

impl Infrastructure {
    pub fn platform_status(&self) -> Option<&PlatformStatus> {
        self.status.as_ref()?.platform_status.as_ref()
    }

    pub fn platform_type(&self) -> Option<&PlatformType> {
        self.platform_status().map(|ps| &ps.type_)
    }
}

/// The `type` discriminator of `status.platformStatus`. Unknown values are kept verbatim.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(from = "String", into = "String")]
pub enum PlatformType {
    AWS,
    Azure,
    BareMetal,
    GCP,
    Libvirt,
    OpenStack,
    None,
    VSphere,
    Ovirt,
    IBMCloud,
    KubeVirt,
    EquinixMetal,
    PowerVS,
    AlibabaCloud,
    Nutanix,
    External,
    Other(String),
    #[default]
    Unset,
}

impl PlatformType {
    pub fn as_str(&self) -> &str {
        match self {
            PlatformType::AWS => "AWS",
            PlatformType::Azure => "Azure",
            PlatformType::BareMetal => "BareMetal",
            PlatformType::GCP => "GCP",
            PlatformType::Libvirt => "Libvirt",
            PlatformType::OpenStack => "OpenStack",
            PlatformType::None => "None",
            PlatformType::VSphere => "VSphere",
            PlatformType::Ovirt => "oVirt",
            PlatformType::IBMCloud => "IBMCloud",
            PlatformType::KubeVirt => "KubeVirt",
            PlatformType::EquinixMetal => "EquinixMetal",
            PlatformType::PowerVS => "PowerVS",
            PlatformType::AlibabaCloud => "AlibabaCloud",
            PlatformType::Nutanix => "Nutanix",
            PlatformType::External => "External",
            PlatformType::Other(other) => other,
            PlatformType::Unset => "",
        }
    }

    pub fn is_unset(&self) -> bool {
        self.as_str().is_empty()
    }
}

impl From<String> for PlatformType {
    fn from(value: String) -> Self {
        PlatformType::from(value.as_str())
    }
}

impl From<&str> for PlatformType {
    fn from(value: &str) -> Self {
        match value {
            "AWS" => PlatformType::AWS,
            "Azure" => PlatformType::Azure,
            "BareMetal" => PlatformType::BareMetal,
            "GCP" => PlatformType::GCP,
            "Libvirt" => PlatformType::Libvirt,
            "OpenStack" => PlatformType::OpenStack,
            "None" => PlatformType::None,
            "VSphere" => PlatformType::VSphere,
            "oVirt" => PlatformType::Ovirt,
            "IBMCloud" => PlatformType::IBMCloud,
            "KubeVirt" => PlatformType::KubeVirt,
            "EquinixMetal" => PlatformType::EquinixMetal,
            "PowerVS" => PlatformType::PowerVS,
            "AlibabaCloud" => PlatformType::AlibabaCloud,
            "Nutanix" => PlatformType::Nutanix,
            "External" => PlatformType::External,
            "" => PlatformType::Unset,
            other => PlatformType::Other(other.to_string()),
        }
    }
}

impl From<PlatformType> for String {
    fn from(value: PlatformType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PlatformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
pub struct PlatformStatus {
    #[serde(rename = "type", default)]
    pub type_: PlatformType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsPlatformStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzurePlatformStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp: Option<GcpPlatformStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ibmcloud: Option<IbmCloudPlatformStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub powervs: Option<PowerVsPlatformStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alibabacloud: Option<AlibabaCloudPlatformStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vsphere: Option<VSpherePlatformStatus>,
}

impl PlatformStatus {
    pub fn new(type_: PlatformType) -> Self {
        Self {
            type_,
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AwsPlatformStatus {
    #[serde(default)]
    pub region: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_endpoints: Vec<ServiceEndpoint>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AzurePlatformStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_group_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cloud_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arm_endpoint: String,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GcpPlatformStatus {
    #[serde(default, rename = "projectID")]
    pub project_id: String,
    #[serde(default)]
    pub region: String,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IbmCloudPlatformStatus {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub resource_group_name: String,
    #[serde(default, rename = "providerType")]
    pub provider_type: String,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PowerVsPlatformStatus {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_endpoints: Vec<ServiceEndpoint>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AlibabaCloudPlatformStatus {
    #[serde(default)]
    pub region: String,
}

/// Virtual IPs that must never be reported as node addresses.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
pub struct VSpherePlatformStatus {
    #[serde(default, rename = "apiServerInternalIPs", skip_serializing_if = "Vec::is_empty")]
    pub api_server_internal_ips: Vec<String>,
    #[serde(default, rename = "ingressIPs", skip_serializing_if = "Vec::is_empty")]
    pub ingress_ips: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct ServiceEndpoint {
    pub name: String,
    pub url: String,
}
