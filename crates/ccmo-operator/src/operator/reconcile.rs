use std::{path::PathBuf, sync::Arc};

use kube::{api::DynamicObject, runtime::controller::Action};
use tracing::{debug, error, info, warn};

use crate::{
    api::{ClusterOperator, ClusterOperatorStatusCondition, ConditionStatus, Infrastructure, PlatformType},
    cloud,
    config::{self, check_infrastructure, is_cloud_provider_external, FeatureGateAccess},
    constants::{
        CLOUD_CONFIG_CONTROLLER_AVAILABLE, CLOUD_CONFIG_CONTROLLER_DEGRADED,
        CONDITION_CLOUD_CONTROLLER_OWNER, CONDITION_UPGRADEABLE, REASON_PLATFORM_TECH_PREVIEW,
        TRUSTED_CA_CONTROLLER_AVAILABLE, TRUSTED_CA_CONTROLLER_DEGRADED,
    },
    error::{OperatorError, OperatorResult},
    k8s::Resource,
    operator::{
        client::OperatorKubeClient,
        status::{condition, StatusClient},
    },
    watcher::ObjectWatcher,
};

pub struct Context {
    pub kube: Arc<dyn OperatorKubeClient>,
    pub status: StatusClient,
    pub watcher: Arc<ObjectWatcher>,
    pub images_file: PathBuf,
    pub managed_namespace: String,
}

impl Context {
    pub fn new(
        kube: Arc<dyn OperatorKubeClient>,
        watcher: Arc<ObjectWatcher>,
        images_file: PathBuf,
        managed_namespace: &str,
        release_version: &str,
    ) -> Self {
        Self {
            status: StatusClient::new(kube.clone(), managed_namespace, release_version),
            kube,
            watcher,
            images_file,
            managed_namespace: managed_namespace.to_string(),
        }
    }
}

pub async fn reconcile(_co: Arc<ClusterOperator>, context: Arc<Context>) -> OperatorResult<Action> {
    sync_cluster(&context).await?;
    Ok(Action::await_change())
}

/// Sets Degraded for `err` and hands the error back for the caller to return. A failed status
/// write replaces the original error.
async fn degrade(
    context: &Context,
    err: OperatorError,
    overrides: &[ClusterOperatorStatusCondition],
) -> OperatorError {
    match context.status.set_degraded(&err, overrides).await {
        Ok(()) => err,
        Err(status_err) => {
            error!("Error syncing ClusterOperatorStatus: {status_err}");
            status_err
        }
    }
}

pub async fn sync_cluster(context: &Context) -> OperatorResult<()> {
    let mut overrides = Vec::new();

    let feature_gates = match context.kube.get_feature_gate().await {
        Ok(fg) => fg.map(|fg| {
            FeatureGateAccess::from_feature_gate(&fg, context.status.release_version())
        }),
        Err(e) => {
            error!("Unable to retrieve FeatureGate object: {e}");
            return Err(degrade(context, e, &overrides).await);
        }
    };

    let infra = match context.kube.get_infrastructure().await {
        Ok(Some(infra)) => infra,
        Ok(None) => {
            info!("Infrastructure cluster does not exist. Skipping...");
            return context.status.set_available(&overrides).await;
        }
        Err(e) => {
            error!("Unable to retrieve Infrastructure object: {e}");
            return Err(degrade(context, e, &overrides).await);
        }
    };

    if infra.platform_type() == Some(&PlatformType::AlibabaCloud) {
        info!("Alibaba platform type is detected, upgrades are not allowed.");
        overrides.push(condition(
            CONDITION_UPGRADEABLE,
            ConditionStatus::False,
            REASON_PLATFORM_TECH_PREVIEW,
            "Alibaba platform is currently tech preview, upgrades are not allowed.",
        ));
    }

    if !provisioning_allowed(context, &infra, feature_gates.as_ref(), &overrides).await? {
        return Ok(());
    }

    let proxy = match context.kube.get_proxy().await {
        Ok(proxy) => proxy,
        Err(e) => {
            error!("Unable to retrieve Proxy object: {e}");
            return Err(degrade(context, e, &overrides).await);
        }
    };

    let operator_config = match config::compose(
        Some(&infra),
        proxy.as_ref(),
        &context.images_file,
        &context.managed_namespace,
        feature_gates.as_ref(),
    ) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to build operator config: {e}");
            return Err(degrade(context, e, &overrides).await);
        }
    };

    let updated = match sync_resources(context, &operator_config).await {
        Ok(updated) => updated,
        Err(e) => {
            error!("Unable to sync operands: {e}");
            return Err(degrade(context, e, &overrides).await);
        }
    };
    if updated {
        context.status.set_progressing(&overrides).await?;
    }

    context.status.set_available(&overrides).await?;
    context.status.clear_cloud_controller_owner().await
}

async fn provisioning_allowed(
    context: &Context,
    infra: &Infrastructure,
    feature_gates: Option<&FeatureGateAccess>,
    overrides: &[ClusterOperatorStatusCondition],
) -> OperatorResult<bool> {
    let co = context.status.get_or_create().await?;
    let status = co.status.unwrap_or_default();
    let is_true = |type_: &str| status.condition(type_).is_some_and(|c| c.is_true());

    if let Some(degraded) = [CLOUD_CONFIG_CONTROLLER_DEGRADED, TRUSTED_CA_CONTROLLER_DEGRADED]
        .into_iter()
        .filter_map(|t| status.condition(t))
        .find(|c| c.is_true())
    {
        let err = OperatorError::ControllerDegraded {
            condition: degraded.type_.clone(),
            message: degraded.message.clone(),
        };
        return Err(degrade(context, err, overrides).await);
    }

    let owned_by_ccm = is_true(CONDITION_CLOUD_CONTROLLER_OWNER);
    let controllers_available =
        is_true(CLOUD_CONFIG_CONTROLLER_AVAILABLE) && is_true(TRUSTED_CA_CONTROLLER_AVAILABLE);
    if !controllers_available && !owned_by_ccm {
        debug!("Cloud config and trusted CA controllers are not available yet");
        return Ok(false);
    }

    let platform_status = match check_infrastructure(Some(infra)) {
        Ok(platform_status) => platform_status,
        Err(e) => return Err(degrade(context, e, overrides).await),
    };

    if platform_status.type_ == PlatformType::External {
        debug!("'External' platform type is detected, do nothing.");
        context.status.set_available(overrides).await?;
        return Ok(false);
    }

    if owned_by_ccm {
        return Ok(true);
    }

    match is_cloud_provider_external(platform_status, feature_gates) {
        Ok(true) => Ok(true),
        Ok(false) => {
            info!("Platform does not require an external cloud provider. Skipping...");
            context.status.set_available(overrides).await?;
            Ok(false)
        }
        Err(e) => {
            error!("Could not determine external cloud provider state: {e}");
            Err(degrade(context, e, overrides).await)
        }
    }
}

/// Whether the object was just created or its spec moved to a new generation.
fn resource_changed(live: Option<&DynamicObject>, applied: &DynamicObject) -> bool {
    match live {
        None => true,
        Some(live) => {
            live.metadata.creation_timestamp != applied.metadata.creation_timestamp
                || live.metadata.generation != applied.metadata.generation
        }
    }
}

async fn sync_resources(context: &Context, config: &config::OperatorConfig) -> OperatorResult<bool> {
    let resources = cloud::get_resources(config)?;
    apply_resources(context, &resources).await
}

async fn apply_resources(context: &Context, resources: &[Resource]) -> OperatorResult<bool> {
    let mut updated = false;
    for resource in resources {
        let live = context.kube.get_object(resource).await?;
        let applied = context.kube.apply(resource).await?;
        if resource_changed(live.as_ref(), &applied) {
            info!(kind = %resource.group_kind(), name = resource.name(), "Resource was created or updated");
            updated = true;
        }

        context.watcher.watch(&resource.to_dynamic()?).await.inspect_err(|e| {
            warn!(
                kind = %resource.group_kind(),
                name = resource.name(),
                "Unable to establish watch on object: {e}"
            );
        })?;
    }
    if !resources.is_empty() {
        debug!("Resources applied successfully.");
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::{
        api::{
            feature_gate::{FeatureGateAttributes, FeatureGateDetails, FeatureGateStatus},
            infrastructure::InfrastructureStatus,
            ClusterOperatorSpec, ClusterOperatorStatus, FeatureGate, FeatureGateSpec,
            InfrastructureSpec, PlatformStatus,
        },
        constants::{
            CLUSTER_OPERATOR_NAME, CONDITION_AVAILABLE, CONDITION_DEGRADED, CONDITION_PROGRESSING,
            REASON_AS_EXPECTED, REASON_SYNCING_RESOURCES,
        },
        operator::testing::{FakeCluster, FakeState},
        watcher::testing::RecordingCache,
    };

    const NS: &str = "openshift-cloud-controller-manager";
    const VERSION: &str = "4.16.0";

    struct Harness {
        cluster: Arc<FakeCluster>,
        context: Context,
        _images: tempfile::NamedTempFile,
    }

    fn harness(setup: impl FnOnce(&mut FakeState)) -> Harness {
        let mut images = tempfile::NamedTempFile::new().unwrap();
        write!(
            images,
            r#"{{"cloudControllerManagerAWS": "quay.io/aws-ccm:v1", "cloudControllerManagerAlibaba": "quay.io/ali-ccm:v1"}}"#
        )
        .unwrap();
        let cluster = Arc::new(FakeCluster::with(setup));
        let watcher = Arc::new(ObjectWatcher::new(Arc::new(RecordingCache::default())));
        let context = Context::new(
            cluster.clone(),
            watcher,
            images.path().to_path_buf(),
            NS,
            VERSION,
        );
        Harness {
            cluster,
            context,
            _images: images,
        }
    }

    fn infra(platform: PlatformType) -> Infrastructure {
        let mut infra = Infrastructure::new("cluster", InfrastructureSpec::default());
        infra.status = Some(InfrastructureStatus {
            infrastructure_name: "my-cluster".into(),
            platform_status: Some(PlatformStatus::new(platform)),
            control_plane_topology: "HighlyAvailable".into(),
            ..Default::default()
        });
        infra
    }

    fn external_gate() -> FeatureGate {
        let mut fg = FeatureGate::new("cluster", FeatureGateSpec::default());
        fg.status = Some(FeatureGateStatus {
            feature_gates: vec![FeatureGateDetails {
                version: VERSION.into(),
                enabled: vec![FeatureGateAttributes::new("ExternalCloudProvider")],
                disabled: vec![],
            }],
        });
        fg
    }

    /// ClusterOperator as left behind by the two sub-controllers.
    fn operator_with(conditions: &[(&str, ConditionStatus, &str)]) -> ClusterOperator {
        let mut co = ClusterOperator::new(CLUSTER_OPERATOR_NAME, ClusterOperatorSpec {});
        co.metadata.resource_version = Some("0".into());
        let mut status = ClusterOperatorStatus::default();
        for (type_, s, message) in conditions {
            status.set_condition(condition(type_, *s, REASON_AS_EXPECTED, message));
        }
        co.status = Some(status);
        co
    }

    fn controllers_available() -> ClusterOperator {
        operator_with(&[
            (CLOUD_CONFIG_CONTROLLER_AVAILABLE, ConditionStatus::True, ""),
            (TRUSTED_CA_CONTROLLER_AVAILABLE, ConditionStatus::True, ""),
        ])
    }

    fn status_of(cluster: &FakeCluster) -> ClusterOperatorStatus {
        cluster.cluster_operator().unwrap().status.unwrap()
    }

    fn assert_settled_available(status: &ClusterOperatorStatus) {
        assert!(status.condition(CONDITION_AVAILABLE).unwrap().is_true());
        for t in [CONDITION_AVAILABLE, CONDITION_DEGRADED, CONDITION_PROGRESSING] {
            assert_eq!(status.condition(t).unwrap().reason, REASON_AS_EXPECTED, "{t}");
        }
        assert_eq!(
            status.condition(CONDITION_DEGRADED).unwrap().status,
            ConditionStatus::False
        );
        assert_eq!(
            status.condition(CONDITION_PROGRESSING).unwrap().status,
            ConditionStatus::False
        );
    }

    #[tokio::test]
    async fn story_missing_infrastructure_reports_available() {
        let h = harness(|_| {});

        sync_cluster(&h.context).await.unwrap();

        assert_settled_available(&status_of(&h.cluster));
        assert_eq!(h.cluster.object_count(), 0);
    }

    #[tokio::test]
    async fn story_aws_without_feature_gate_stays_in_tree() {
        let h = harness(|state| {
            state.infrastructure = Some(infra(PlatformType::AWS));
            state.cluster_operator = Some(controllers_available());
        });

        sync_cluster(&h.context).await.unwrap();

        assert_settled_available(&status_of(&h.cluster));
        assert_eq!(h.cluster.object_count(), 0);
    }

    #[tokio::test]
    async fn story_aws_first_reconcile_progresses_then_settles() {
        let h = harness(|state| {
            state.infrastructure = Some(infra(PlatformType::AWS));
            state.feature_gate = Some(external_gate());
            state.cluster_operator = Some(controllers_available());
        });

        sync_cluster(&h.context).await.unwrap();

        // Deployment, PodDisruptionBudget and Service.
        assert_eq!(h.cluster.object_count(), 3);
        let progressed = |history: &[ClusterOperatorStatus]| {
            history
                .iter()
                .filter(|s| {
                    s.condition(CONDITION_PROGRESSING).is_some_and(|c| {
                        c.is_true() && c.reason == REASON_SYNCING_RESOURCES
                    })
                })
                .count()
        };
        let history = h.cluster.state.lock().unwrap().status_history.clone();
        assert_eq!(progressed(&history), 1);
        let status = status_of(&h.cluster);
        assert_settled_available(&status);
        assert_eq!(status.versions[0].version, VERSION);

        sync_cluster(&h.context).await.unwrap();

        let history = h.cluster.state.lock().unwrap().status_history.clone();
        assert_eq!(progressed(&history), 1);
        assert_settled_available(&status_of(&h.cluster));
        assert_eq!(h.cluster.object_count(), 3);
    }

    #[tokio::test]
    async fn story_sub_controllers_not_ready_means_no_work() {
        let h = harness(|state| {
            state.infrastructure = Some(infra(PlatformType::AWS));
            state.feature_gate = Some(external_gate());
            state.cluster_operator = Some(operator_with(&[(
                CLOUD_CONFIG_CONTROLLER_AVAILABLE,
                ConditionStatus::True,
                "",
            )]));
        });

        sync_cluster(&h.context).await.unwrap();

        assert_eq!(h.cluster.object_count(), 0);
        assert_eq!(h.cluster.status_writes(), 0);
    }

    #[tokio::test]
    async fn story_degraded_sub_controller_blocks_provisioning() {
        let h = harness(|state| {
            state.infrastructure = Some(infra(PlatformType::AWS));
            state.feature_gate = Some(external_gate());
            state.cluster_operator = Some(operator_with(&[
                (CLOUD_CONFIG_CONTROLLER_AVAILABLE, ConditionStatus::True, ""),
                (TRUSTED_CA_CONTROLLER_AVAILABLE, ConditionStatus::True, ""),
                (TRUSTED_CA_CONTROLLER_DEGRADED, ConditionStatus::True, "bad bundle"),
            ]));
        });

        let err = sync_cluster(&h.context).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "failed to apply resources because TrustedCABundleControllerControllerDegraded condition is set to True: bad bundle"
        );
        let degraded = status_of(&h.cluster).condition(CONDITION_DEGRADED).cloned().unwrap();
        assert!(degraded.is_true());
        assert!(degraded.message.ends_with("bad bundle"));
        assert_eq!(h.cluster.object_count(), 0);
    }

    #[tokio::test]
    async fn story_owner_marker_skips_the_feature_gate_check() {
        let h = harness(|state| {
            state.infrastructure = Some(infra(PlatformType::AWS));
            state.cluster_operator = Some(operator_with(&[(
                CONDITION_CLOUD_CONTROLLER_OWNER,
                ConditionStatus::True,
                "",
            )]));
        });

        sync_cluster(&h.context).await.unwrap();

        assert_eq!(h.cluster.object_count(), 3);
        let status = status_of(&h.cluster);
        assert!(status.condition(CONDITION_CLOUD_CONTROLLER_OWNER).is_none());
        assert!(status.condition(CONDITION_AVAILABLE).unwrap().is_true());
    }

    #[tokio::test]
    async fn story_external_platform_has_nothing_to_manage() {
        let h = harness(|state| {
            state.infrastructure = Some(infra(PlatformType::External));
            state.cluster_operator = Some(controllers_available());
        });

        sync_cluster(&h.context).await.unwrap();

        assert_settled_available(&status_of(&h.cluster));
        assert_eq!(h.cluster.object_count(), 0);
    }

    #[tokio::test]
    async fn story_alibaba_is_never_upgradeable() {
        let h = harness(|state| {
            state.infrastructure = Some(infra(PlatformType::AlibabaCloud));
            state.cluster_operator = Some(controllers_available());
        });

        sync_cluster(&h.context).await.unwrap();

        let status = status_of(&h.cluster);
        let upgradeable = status.condition(CONDITION_UPGRADEABLE).unwrap();
        assert_eq!(upgradeable.status, ConditionStatus::False);
        assert_eq!(upgradeable.reason, REASON_PLATFORM_TECH_PREVIEW);
        assert!(status.condition(CONDITION_AVAILABLE).unwrap().is_true());
        // Alibaba always runs out of tree: deployment plus disruption budget.
        assert_eq!(h.cluster.object_count(), 2);
    }

    #[tokio::test]
    async fn story_infrastructure_read_failure_degrades() {
        let h = harness(|state| {
            state.infrastructure_error = Some(500);
        });

        let err = sync_cluster(&h.context).await.unwrap_err();

        assert!(!err.is_not_found());
        let degraded = status_of(&h.cluster).condition(CONDITION_DEGRADED).cloned().unwrap();
        assert!(degraded.is_true());
        assert!(degraded.message.starts_with("Failed when progressing towards operator: 4.16.0"));
    }

    #[tokio::test]
    async fn story_missing_image_degrades_without_applying() {
        let h = harness(|state| {
            state.infrastructure = Some(infra(PlatformType::GCP));
            state.cluster_operator = Some(controllers_available());
            let mut fg = external_gate();
            fg.status.as_mut().unwrap().feature_gates[0]
                .enabled
                .push(FeatureGateAttributes::new("ExternalCloudProviderGCP"));
            state.feature_gate = Some(fg);
        });

        let err = sync_cluster(&h.context).await.unwrap_err();

        assert!(matches!(err, OperatorError::MissingImages { .. }));
        assert_eq!(h.cluster.object_count(), 0);
        assert!(status_of(&h.cluster).condition(CONDITION_DEGRADED).unwrap().is_true());
    }

    #[test]
    fn unchanged_generation_is_not_an_update() {
        let mut live = DynamicObject::new("x", &crate::k8s::ResourceKind::Deployment.api_resource());
        live.metadata.generation = Some(3);
        let mut applied = live.clone();
        assert!(!resource_changed(Some(&live), &applied));
        applied.metadata.generation = Some(4);
        assert!(resource_changed(Some(&live), &applied));
        assert!(resource_changed(None, &applied));
    }
}
