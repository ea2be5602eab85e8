//! Keeps `{managed namespace}/cloud-conf` in line with the cluster cloud provider config,
//! rewritten for the external CCM of the current platform.

use std::{collections::BTreeMap, sync::Arc};

use k8s_openapi::{api::core::v1::ConfigMap, apimachinery::pkg::apis::meta::v1::ObjectMeta};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    api::{ClusterOperator, ConditionStatus, Infrastructure, PlatformType},
    cloud,
    config::{check_infrastructure, FeatureGateAccess},
    constants::{
        CLOUD_CONFIG_CONTROLLER_AVAILABLE, CLOUD_CONFIG_CONTROLLER_DEGRADED, CLOUD_CONFIG_KEY,
        MANAGED_CLOUD_CONFIG_MAP, OPENSHIFT_CONFIG_NAMESPACE, OPENSHIFT_MANAGED_CONFIG_NAMESPACE,
        REASON_AS_EXPECTED, REASON_SYNCING_FAILED, SYNCED_CLOUD_CONFIG_MAP,
    },
    error::{OperatorError, OperatorResult},
    k8s::Resource,
    operator::{
        client::OperatorKubeClient,
        status::{condition, StatusClient},
    },
};

const EXCLUDE_MASTER_FROM_STANDARD_LB: &str = "excludeMasterFromStandardLB";

pub struct CloudConfigContext {
    pub kube: Arc<dyn OperatorKubeClient>,
    pub status: StatusClient,
    pub managed_namespace: String,
}

pub async fn reconcile(
    _co: Arc<ClusterOperator>,
    context: Arc<CloudConfigContext>,
) -> OperatorResult<kube::runtime::controller::Action> {
    sync_cloud_config(&context).await?;
    Ok(kube::runtime::controller::Action::await_change())
}

/// Runs one sync and records the outcome on the ClusterOperator.
pub async fn sync_cloud_config(context: &CloudConfigContext) -> OperatorResult<()> {
    match sync(context).await {
        Ok(()) => {
            let message = "Cloud Config Controller works as expected";
            context
                .status
                .set_controller_conditions(vec![
                    condition(CLOUD_CONFIG_CONTROLLER_AVAILABLE, ConditionStatus::True, REASON_AS_EXPECTED, message),
                    condition(CLOUD_CONFIG_CONTROLLER_DEGRADED, ConditionStatus::False, REASON_AS_EXPECTED, message),
                ])
                .await
        }
        Err(e) => {
            warn!("Cloud config sync failed: {e}");
            let message = format!("Cloud Config Controller failed to sync cloud config: {e}");
            context
                .status
                .set_controller_conditions(vec![
                    condition(CLOUD_CONFIG_CONTROLLER_AVAILABLE, ConditionStatus::False, REASON_SYNCING_FAILED, &message),
                    condition(CLOUD_CONFIG_CONTROLLER_DEGRADED, ConditionStatus::True, REASON_SYNCING_FAILED, &message),
                ])
                .await?;
            Err(e)
        }
    }
}

async fn sync(context: &CloudConfigContext) -> OperatorResult<()> {
    let infra = context.kube.get_infrastructure().await?.ok_or_else(|| {
        OperatorError::InvalidInfrastructure("infrastructure resource not found".to_string())
    })?;
    let platform_status = check_infrastructure(Some(&infra))?;

    let source = source_config_map(context, &infra).await?;
    let mut data = normalize_source(&source, &infra)?;

    if platform_status.type_ == PlatformType::Azure {
        if let Some(cloud_conf) = data.get_mut(CLOUD_CONFIG_KEY) {
            *cloud_conf = default_exclude_master_from_lb(cloud_conf)?;
        }
    }

    if let Some(transform) = cloud::cloud_config_transformer(platform_status) {
        let network = context.kube.get_network().await?;
        let feature_gates = context.kube.get_feature_gate().await?.map(|fg| {
            FeatureGateAccess::from_feature_gate(&fg, context.status.release_version())
        });
        let current = data.get(CLOUD_CONFIG_KEY).map(String::as_str).unwrap_or_default();
        let transformed = transform(current, &infra, network.as_ref(), feature_gates.as_ref())?;
        data.insert(CLOUD_CONFIG_KEY.to_string(), transformed);
    }

    let target = ConfigMap {
        metadata: ObjectMeta {
            name: Some(SYNCED_CLOUD_CONFIG_MAP.to_string()),
            namespace: Some(context.managed_namespace.clone()),
            ..Default::default()
        },
        data: Some(data),
        binary_data: source.binary_data.clone(),
        immutable: source.immutable,
    };

    let live = context
        .kube
        .get_config_map(&context.managed_namespace, SYNCED_CLOUD_CONFIG_MAP)
        .await?;
    if live.as_ref().is_some_and(|live| same_content(live, &target)) {
        info!("source and target cloud-config content are equal, no sync needed");
        return Ok(());
    }

    context.kube.apply(&Resource::ConfigMap(target)).await?;
    info!(namespace = %context.managed_namespace, "Synced {SYNCED_CLOUD_CONFIG_MAP} ConfigMap");
    Ok(())
}

/// The managed copy written by the installer wins, the user ConfigMap referenced from the
/// Infrastructure object is the fallback. Platforms without a cloud config get an empty one.
async fn source_config_map(context: &CloudConfigContext, infra: &Infrastructure) -> OperatorResult<ConfigMap> {
    if let Some(cm) = context
        .kube
        .get_config_map(OPENSHIFT_MANAGED_CONFIG_NAMESPACE, MANAGED_CLOUD_CONFIG_MAP)
        .await?
    {
        return Ok(cm);
    }
    warn!("managed cloud-config is not found, falling back to infrastructure config");

    let name = infra.spec.cloud_config.name.as_str();
    if name.is_empty() {
        debug!("Infrastructure references no cloud config, syncing an empty one");
        return Ok(ConfigMap {
            data: Some(BTreeMap::from([(CLOUD_CONFIG_KEY.to_string(), String::new())])),
            ..Default::default()
        });
    }
    context
        .kube
        .get_config_map(OPENSHIFT_CONFIG_NAMESPACE, name)
        .await?
        .ok_or_else(|| {
            OperatorError::Transform(format!(
                "cloud config {OPENSHIFT_CONFIG_NAMESPACE}/{name} referenced by infrastructure is not found"
            ))
        })
}

/// Moves the config stored under the Infrastructure key to `cloud.conf`.
fn normalize_source(source: &ConfigMap, infra: &Infrastructure) -> OperatorResult<BTreeMap<String, String>> {
    let mut data = source.data.clone().unwrap_or_default();
    if data.contains_key(CLOUD_CONFIG_KEY) {
        return Ok(data);
    }

    let infra_key = infra.spec.cloud_config.key.as_str();
    match data.remove(infra_key) {
        Some(value) => {
            data.insert(CLOUD_CONFIG_KEY.to_string(), value);
            Ok(data)
        }
        None => Err(OperatorError::Transform(format!(
            "key {infra_key} specified in infra resource does not found in source configmap {}/{}",
            source.metadata.namespace.as_deref().unwrap_or_default(),
            source.metadata.name.as_deref().unwrap_or_default(),
        ))),
    }
}

fn default_exclude_master_from_lb(cloud_conf: &str) -> OperatorResult<String> {
    let mut cfg: serde_json::Map<String, Value> = serde_json::from_str(cloud_conf)
        .map_err(|e| OperatorError::Transform(format!("cloudConfigContent is not a valid json: {e}")))?;
    if cfg.get(EXCLUDE_MASTER_FROM_STANDARD_LB).map_or(true, Value::is_null) {
        cfg.insert(EXCLUDE_MASTER_FROM_STANDARD_LB.to_string(), Value::Bool(false));
    }
    Ok(serde_json::to_string(&cfg)?)
}

fn same_content(live: &ConfigMap, desired: &ConfigMap) -> bool {
    live.immutable == desired.immutable
        && live.data == desired.data
        && live.binary_data == desired.binary_data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{
            infrastructure::{AzurePlatformStatus, ConfigMapFileReference, InfrastructureStatus},
            InfrastructureSpec, PlatformStatus,
        },
        operator::testing::FakeCluster,
    };

    const NS: &str = "openshift-cloud-controller-manager";

    fn infra(platform_status: PlatformStatus) -> Infrastructure {
        let mut infra = Infrastructure::new(
            "cluster",
            InfrastructureSpec {
                cloud_config: ConfigMapFileReference {
                    name: "cloud-provider-config".into(),
                    key: "config".into(),
                },
                ..Default::default()
            },
        );
        infra.status = Some(InfrastructureStatus {
            platform_status: Some(platform_status),
            ..Default::default()
        });
        infra
    }

    fn config_map(namespace: &str, name: &str, data: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(namespace.into()),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    fn context(cluster: &Arc<FakeCluster>) -> CloudConfigContext {
        CloudConfigContext {
            kube: cluster.clone(),
            status: StatusClient::new(cluster.clone(), NS, "1.0"),
            managed_namespace: NS.into(),
        }
    }

    fn synced(cluster: &FakeCluster) -> String {
        cluster
            .config_map(NS, SYNCED_CLOUD_CONFIG_MAP)
            .and_then(|cm| cm.data)
            .and_then(|d| d.get(CLOUD_CONFIG_KEY).cloned())
            .unwrap()
    }

    fn controller_condition(cluster: &FakeCluster, type_: &str) -> ConditionStatus {
        cluster
            .cluster_operator()
            .unwrap()
            .status
            .unwrap()
            .condition(type_)
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn story_managed_config_is_transformed_and_synced() {
        let cluster = Arc::new(FakeCluster::with(|state| {
            state.infrastructure = Some(infra(PlatformStatus::new(PlatformType::AWS)));
        }));
        cluster.put_config_map(config_map(
            OPENSHIFT_MANAGED_CONFIG_NAMESPACE,
            MANAGED_CLOUD_CONFIG_MAP,
            &[("cloud.conf", "[Global]\nZone = a\n")],
        ));

        sync_cloud_config(&context(&cluster)).await.unwrap();

        let synced = synced(&cluster);
        assert!(synced.contains("ClusterServiceLoadBalancerHealthProbeMode"));
        assert!(synced.contains("Zone"));
        assert_eq!(
            controller_condition(&cluster, CLOUD_CONFIG_CONTROLLER_AVAILABLE),
            ConditionStatus::True
        );
        assert_eq!(
            controller_condition(&cluster, CLOUD_CONFIG_CONTROLLER_DEGRADED),
            ConditionStatus::False
        );
    }

    #[tokio::test]
    async fn story_user_config_key_is_renamed() {
        let cluster = Arc::new(FakeCluster::with(|state| {
            state.infrastructure = Some(infra(PlatformStatus::new(PlatformType::GCP)));
        }));
        cluster.put_config_map(config_map(
            OPENSHIFT_CONFIG_NAMESPACE,
            "cloud-provider-config",
            &[("config", "[global]\nproject-id = p\n")],
        ));

        sync_cloud_config(&context(&cluster)).await.unwrap();

        let cm = cluster.config_map(NS, SYNCED_CLOUD_CONFIG_MAP).unwrap();
        let data = cm.data.unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[CLOUD_CONFIG_KEY], "[global]\nproject-id = p\n");
    }

    #[tokio::test]
    async fn story_unchanged_config_is_not_rewritten() {
        let cluster = Arc::new(FakeCluster::with(|state| {
            state.infrastructure = Some(infra(PlatformStatus::new(PlatformType::GCP)));
        }));
        cluster.put_config_map(config_map(
            OPENSHIFT_MANAGED_CONFIG_NAMESPACE,
            MANAGED_CLOUD_CONFIG_MAP,
            &[("cloud.conf", "x")],
        ));
        let context = context(&cluster);

        sync_cloud_config(&context).await.unwrap();
        sync_cloud_config(&context).await.unwrap();

        assert_eq!(cluster.state.lock().unwrap().applies, 1);
    }

    #[tokio::test]
    async fn story_missing_infra_key_degrades_the_controller() {
        let cluster = Arc::new(FakeCluster::with(|state| {
            state.infrastructure = Some(infra(PlatformStatus::new(PlatformType::GCP)));
        }));
        cluster.put_config_map(config_map(
            OPENSHIFT_CONFIG_NAMESPACE,
            "cloud-provider-config",
            &[("other", "x")],
        ));

        let err = sync_cloud_config(&context(&cluster)).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "key config specified in infra resource does not found in source configmap openshift-config/cloud-provider-config"
        );
        assert_eq!(
            controller_condition(&cluster, CLOUD_CONFIG_CONTROLLER_DEGRADED),
            ConditionStatus::True
        );
        assert!(cluster.config_map(NS, SYNCED_CLOUD_CONFIG_MAP).is_none());
    }

    #[tokio::test]
    async fn story_azure_keeps_masters_in_the_standard_lb() {
        let mut ps = PlatformStatus::new(PlatformType::Azure);
        ps.azure = Some(AzurePlatformStatus {
            cloud_name: "AzurePublicCloud".into(),
            ..Default::default()
        });
        let cluster = Arc::new(FakeCluster::with(|state| {
            state.infrastructure = Some(infra(ps));
        }));
        cluster.put_config_map(config_map(
            OPENSHIFT_MANAGED_CONFIG_NAMESPACE,
            MANAGED_CLOUD_CONFIG_MAP,
            &[("cloud.conf", r#"{"resourceGroup": "rg"}"#)],
        ));

        sync_cloud_config(&context(&cluster)).await.unwrap();

        let out: Value = serde_json::from_str(&synced(&cluster)).unwrap();
        assert_eq!(out[EXCLUDE_MASTER_FROM_STANDARD_LB], false);
        assert_eq!(out["cloud"], "AzurePublicCloud");
        assert_eq!(out["resourceGroup"], "rg");
    }

    #[test]
    fn explicit_exclude_master_setting_is_kept() {
        let out = default_exclude_master_from_lb(r#"{"excludeMasterFromStandardLB": true}"#).unwrap();
        assert_eq!(out, r#"{"excludeMasterFromStandardLB":true}"#);
        assert!(default_exclude_master_from_lb("[Global]").is_err());
    }
}
