use kube::CustomResource;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "FeatureGate",
    plural = "featuregates",
    derive = "PartialEq",
    status = "FeatureGateStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct FeatureGateSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub feature_set: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_no_upgrade: Option<CustomFeatureGates>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
pub struct CustomFeatureGates {
    #[serde(default)]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub disabled: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FeatureGateStatus {
    #[serde(default)]
    pub feature_gates: Vec<FeatureGateDetails>,
}

/// Rendered gate state for one payload version.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
pub struct FeatureGateDetails {
    pub version: String,
    #[serde(default)]
    pub enabled: Vec<FeatureGateAttributes>,
    #[serde(default)]
    pub disabled: Vec<FeatureGateAttributes>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct FeatureGateAttributes {
    pub name: String,
}

impl FeatureGateAttributes {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}
