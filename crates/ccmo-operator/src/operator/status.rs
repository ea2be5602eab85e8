//! ClusterOperator bookkeeping. Every writer goes through [`StatusClient::sync_status`], which
//! merges conditions by type and skips the write when nothing changed.

use std::{fmt, sync::Arc};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, info};

use crate::{
    api::{
        ClusterOperator, ClusterOperatorSpec, ClusterOperatorStatus, ClusterOperatorStatusCondition,
        ConditionStatus, ObjectReference, OperandVersion,
    },
    constants::{
        CLUSTER_OPERATOR_NAME, CONDITION_AVAILABLE, CONDITION_CLOUD_CONTROLLER_OWNER,
        CONDITION_DEGRADED, CONDITION_PROGRESSING, CONDITION_UPGRADEABLE, OPERATOR_NAMESPACE,
        OPERATOR_VERSION_NAME, REASON_AS_EXPECTED, REASON_SYNCING_FAILED, REASON_SYNCING_RESOURCES,
    },
    error::OperatorResult,
    operator::client::OperatorKubeClient,
};

pub fn condition(
    type_: &str,
    status: ConditionStatus,
    reason: &str,
    message: &str,
) -> ClusterOperatorStatusCondition {
    ClusterOperatorStatusCondition::new(type_, status, reason, message)
}

/// `operator: 4.16.0, other: 1.0`
pub fn print_operand_versions(versions: &[OperandVersion]) -> String {
    versions
        .iter()
        .map(|v| format!("{}: {}", v.name, v.version))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Clone)]
pub struct StatusClient {
    kube: Arc<dyn OperatorKubeClient>,
    managed_namespace: String,
    release_version: String,
}

impl StatusClient {
    pub fn new(kube: Arc<dyn OperatorKubeClient>, managed_namespace: &str, release_version: &str) -> Self {
        Self {
            kube,
            managed_namespace: managed_namespace.to_string(),
            release_version: release_version.to_string(),
        }
    }

    pub fn release_version(&self) -> &str {
        &self.release_version
    }

    pub fn desired_versions(&self) -> Vec<OperandVersion> {
        vec![OperandVersion {
            name: OPERATOR_VERSION_NAME.to_string(),
            version: self.release_version.clone(),
        }]
    }

    pub fn related_objects(&self) -> Vec<ObjectReference> {
        vec![
            ObjectReference {
                resource: "namespaces".to_string(),
                name: OPERATOR_NAMESPACE.to_string(),
                ..Default::default()
            },
            ObjectReference {
                group: "config.openshift.io".to_string(),
                resource: "clusteroperators".to_string(),
                name: CLUSTER_OPERATOR_NAME.to_string(),
                ..Default::default()
            },
            ObjectReference {
                resource: "namespaces".to_string(),
                name: self.managed_namespace.clone(),
                ..Default::default()
            },
        ]
    }

    pub async fn get_or_create(&self) -> OperatorResult<ClusterOperator> {
        if let Some(co) = self.kube.get_cluster_operator().await? {
            return Ok(co);
        }
        info!("ClusterOperator does not exist, creating a new one.");
        let co = ClusterOperator {
            metadata: ObjectMeta {
                name: Some(CLUSTER_OPERATOR_NAME.to_string()),
                ..Default::default()
            },
            spec: ClusterOperatorSpec {},
            status: None,
        };
        match self.kube.create_cluster_operator(&co).await {
            // Another replica created it first.
            Err(e) if e.is_conflict() => {
                debug!("ClusterOperator already exists, reading it back");
                self.kube.get_cluster_operator().await?.ok_or(e)
            }
            result => result,
        }
    }

    /// Available=True and the rest settled, versions set to the running release.
    pub async fn set_available(&self, overrides: &[ClusterOperatorStatusCondition]) -> OperatorResult<()> {
        let co = self.get_or_create().await?;
        let versions = self.desired_versions();
        let conditions = vec![
            condition(
                CONDITION_AVAILABLE,
                ConditionStatus::True,
                REASON_AS_EXPECTED,
                &format!(
                    "Cluster Cloud Controller Manager Operator is available at {}",
                    print_operand_versions(&versions)
                ),
            ),
            condition(CONDITION_PROGRESSING, ConditionStatus::False, REASON_AS_EXPECTED, ""),
            condition(CONDITION_DEGRADED, ConditionStatus::False, REASON_AS_EXPECTED, ""),
            condition(CONDITION_UPGRADEABLE, ConditionStatus::True, REASON_AS_EXPECTED, ""),
        ];
        debug!("Syncing status: available");
        self.sync_status(co, conditions, overrides, Some(versions)).await
    }

    /// Progressing=True. Available and Degraded are left alone.
    pub async fn set_progressing(&self, overrides: &[ClusterOperatorStatusCondition]) -> OperatorResult<()> {
        let co = self.get_or_create().await?;
        let message = format!(
            "Progressing towards {}",
            print_operand_versions(&self.desired_versions())
        );
        debug!("Syncing status: {message}");
        let conditions = vec![
            condition(
                CONDITION_PROGRESSING,
                ConditionStatus::True,
                REASON_SYNCING_RESOURCES,
                &message,
            ),
            condition(CONDITION_UPGRADEABLE, ConditionStatus::True, REASON_AS_EXPECTED, ""),
        ];
        self.sync_status(co, conditions, overrides, None).await
    }

    /// Degraded=True with the reconcile error. Available and Progressing are left alone.
    pub async fn set_degraded(
        &self,
        reconcile_err: &(dyn fmt::Display + Sync),
        overrides: &[ClusterOperatorStatusCondition],
    ) -> OperatorResult<()> {
        let co = self.get_or_create().await?;
        let desired = self.desired_versions();
        let current = co.status.as_ref().map(|s| s.versions.as_slice()).unwrap_or_default();

        let message = if desired.as_slice() != current {
            format!(
                "Failed when progressing towards {} because {reconcile_err}",
                print_operand_versions(&desired)
            )
        } else {
            format!(
                "Failed to resync for {} because {reconcile_err}",
                print_operand_versions(&desired)
            )
        };
        info!("Syncing status: degraded: {message}");

        let conditions = vec![
            condition(CONDITION_DEGRADED, ConditionStatus::True, REASON_SYNCING_FAILED, &message),
            condition(CONDITION_UPGRADEABLE, ConditionStatus::False, REASON_AS_EXPECTED, ""),
        ];
        self.sync_status(co, conditions, overrides, None).await
    }

    /// Conditions owned by one of the sub-controllers. Versions are stamped as well.
    pub async fn set_controller_conditions(
        &self,
        conditions: Vec<ClusterOperatorStatusCondition>,
    ) -> OperatorResult<()> {
        let co = self.get_or_create().await?;
        self.sync_status(co, conditions, &[], Some(self.desired_versions())).await
    }

    pub async fn clear_cloud_controller_owner(&self) -> OperatorResult<()> {
        let mut co = self.get_or_create().await?;
        let Some(status) = co.status.as_mut() else {
            return Ok(());
        };
        if status.condition(CONDITION_CLOUD_CONTROLLER_OWNER).is_none() {
            return Ok(());
        }
        status.remove_condition(CONDITION_CLOUD_CONTROLLER_OWNER);
        self.kube.update_cluster_operator_status(&co).await?;
        Ok(())
    }

    /// Upserts `conditions` then `overrides`, refreshes relatedObjects and writes the status
    /// only if it differs from what was read.
    async fn sync_status(
        &self,
        mut co: ClusterOperator,
        conditions: Vec<ClusterOperatorStatusCondition>,
        overrides: &[ClusterOperatorStatusCondition],
        versions: Option<Vec<OperandVersion>>,
    ) -> OperatorResult<()> {
        let before = co.status.clone().unwrap_or_default();
        let status: &mut ClusterOperatorStatus = co.status.get_or_insert_with(Default::default);

        if let Some(versions) = versions {
            status.versions = versions;
        }

        for c in conditions.into_iter().chain(overrides.iter().cloned()) {
            status.set_condition(c);
        }
        let related = self.related_objects();
        if status.related_objects != related {
            status.related_objects = related;
        }

        if *status == before {
            debug!("ClusterOperator status unchanged");
            return Ok(());
        }
        self.kube.update_cluster_operator_status(&co).await?;
        Ok(())
    }
}
