use std::collections::BTreeSet;

use crate::{
    api::{FeatureGate, PlatformStatus, PlatformType},
    error::{OperatorError, OperatorResult},
};

/// Gates the cloud controller manager binaries understand. Anything else is dropped
/// before the `--feature-gates` flag is built.
pub const UPSTREAM_CLOUD_FEATURE_GATES: &[&str] = &[
    "CloudControllerManagerWatchBasedRoutesReconciliation",
    "CloudControllerManagerWebhook",
    "CloudDualStackNodeIPs",
    "StableLoadBalancerNodeSet",
];

pub const EXTERNAL_CLOUD_PROVIDER_GATE: &str = "ExternalCloudProvider";

const CUSTOM_NO_UPGRADE: &str = "CustomNoUpgrade";

/// Snapshot of the cluster feature gates for the running payload version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureGateAccess {
    enabled: BTreeSet<String>,
    disabled: BTreeSet<String>,
}

impl FeatureGateAccess {
    pub fn new<E, D>(enabled: E, disabled: D) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            enabled: enabled.into_iter().map(Into::into).collect(),
            disabled: disabled.into_iter().map(Into::into).collect(),
        }
    }

    /// Prefers the status entry rendered for `release_version`, then the newest entry,
    /// then the `spec.customNoUpgrade` lists.
    pub fn from_feature_gate(feature_gate: &FeatureGate, release_version: &str) -> Self {
        let details = feature_gate.status.as_ref().and_then(|status| {
            status
                .feature_gates
                .iter()
                .find(|d| d.version == release_version)
                .or_else(|| status.feature_gates.first())
        });

        if let Some(details) = details {
            return Self::new(
                details.enabled.iter().map(|a| a.name.clone()),
                details.disabled.iter().map(|a| a.name.clone()),
            );
        }

        match (&feature_gate.spec.custom_no_upgrade, feature_gate.spec.feature_set.as_str()) {
            (Some(custom), CUSTOM_NO_UPGRADE) => {
                Self::new(custom.enabled.clone(), custom.disabled.clone())
            }
            _ => Self::default(),
        }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    /// Splits the known gates by state, keeping only names in `filter`. Both lists are sorted.
    pub fn enabled_disabled(&self, filter: &[&str]) -> (Vec<String>, Vec<String>) {
        let keep = |names: &BTreeSet<String>| {
            names
                .iter()
                .filter(|n| filter.contains(&n.as_str()))
                .cloned()
                .collect::<Vec<_>>()
        };
        (keep(&self.enabled), keep(&self.disabled))
    }
}

/// `A=true,B=false`, enabled gates first.
pub fn build_feature_gate_string(enabled: &[String], disabled: &[String]) -> String {
    enabled
        .iter()
        .map(|g| format!("{g}=true"))
        .chain(disabled.iter().map(|g| format!("{g}=false")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Command line flag passed to the CCM, empty when there is nothing to pass.
pub fn feature_gates_flag(access: Option<&FeatureGateAccess>) -> String {
    let Some(access) = access else {
        return String::new();
    };
    let (enabled, disabled) = access.enabled_disabled(UPSTREAM_CLOUD_FEATURE_GATES);
    if enabled.is_empty() && disabled.is_empty() {
        return String::new();
    }
    format!(
        "--feature-gates={}",
        build_feature_gate_string(&enabled, &disabled)
    )
}

/// Whether the platform should run an out-of-tree cloud controller manager.
///
/// Some platforms only ship an external provider. The rest switch over through the
/// `ExternalCloudProvider` gate (or its per-platform variant), so without a gate
/// snapshot they stay in-tree.
pub fn is_cloud_provider_external(
    platform_status: &PlatformStatus,
    access: Option<&FeatureGateAccess>,
) -> OperatorResult<bool> {
    let gated = |specific: Option<&str>| {
        access.is_some_and(|a| {
            a.is_enabled(EXTERNAL_CLOUD_PROVIDER_GATE) || specific.is_some_and(|s| a.is_enabled(s))
        })
    };

    let external = match &platform_status.type_ {
        PlatformType::Unset => {
            return Err(OperatorError::InvalidInfrastructure(
                "no platform provider found on infrastructure".to_string(),
            ))
        }
        PlatformType::AlibabaCloud
        | PlatformType::IBMCloud
        | PlatformType::PowerVS
        | PlatformType::Nutanix
        | PlatformType::External => true,
        PlatformType::Azure if is_azure_stack_hub(platform_status) => true,
        PlatformType::Azure => gated(Some("ExternalCloudProviderAzure")),
        PlatformType::GCP => gated(Some("ExternalCloudProviderGCP")),
        PlatformType::AWS | PlatformType::VSphere | PlatformType::OpenStack => gated(None),
        _ => false,
    };
    Ok(external)
}

pub fn is_azure_stack_hub(platform_status: &PlatformStatus) -> bool {
    platform_status.type_ == PlatformType::Azure
        && platform_status
            .azure
            .as_ref()
            .is_some_and(|a| a.cloud_name == "AzureStackCloud")
}
