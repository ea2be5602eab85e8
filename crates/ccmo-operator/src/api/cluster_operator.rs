use std::fmt;

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "ClusterOperator",
    plural = "clusteroperators",
    derive = "PartialEq",
    status = "ClusterOperatorStatus",
    schema = "disabled"
)]
pub struct ClusterOperatorSpec {}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOperatorStatus {
    #[serde(default)]
    pub conditions: Vec<ClusterOperatorStatusCondition>,
    #[serde(default)]
    pub versions: Vec<OperandVersion>,
    #[serde(default)]
    pub related_objects: Vec<ObjectReference>,
    /// Opaque to this operator. Carried through so status writes do not drop it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOperatorStatusCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl ClusterOperatorStatusCondition {
    pub fn new(type_: &str, status: ConditionStatus, reason: &str, message: &str) -> Self {
        Self {
            type_: type_.to_string(),
            status,
            last_transition_time: None,
            reason: reason.to_string(),
            message: message.to_string(),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct OperandVersion {
    pub name: String,
    pub version: String,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct ObjectReference {
    #[serde(default)]
    pub group: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    pub name: String,
}

impl ClusterOperatorStatus {
    pub fn condition(&self, type_: &str) -> Option<&ClusterOperatorStatusCondition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Upserts by type. The transition time only moves when the status flips,
    /// reason and message are always taken from `new`.
    pub fn set_condition(&mut self, new: ClusterOperatorStatusCondition) {
        match self.conditions.iter_mut().find(|c| c.type_ == new.type_) {
            Some(existing) => {
                if existing.status != new.status || existing.last_transition_time.is_none() {
                    existing.status = new.status;
                    existing.last_transition_time =
                        new.last_transition_time.or_else(|| Some(Time(Utc::now())));
                }
                existing.reason = new.reason;
                existing.message = new.message;
            }
            None => {
                let mut new = new;
                if new.last_transition_time.is_none() {
                    new.last_transition_time = Some(Time(Utc::now()));
                }
                self.conditions.push(new);
            }
        }
    }

    pub fn remove_condition(&mut self, type_: &str) {
        self.conditions.retain(|c| c.type_ != type_);
    }
}
