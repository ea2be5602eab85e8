//! Publishes `{managed namespace}/ccm-trusted-ca`: the system trust bundle merged with the
//! proxy's additional CAs and any CA bundle shipped inside the synced cloud config.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use k8s_openapi::{api::core::v1::ConfigMap, apimachinery::pkg::apis::meta::v1::ObjectMeta};
use kube::runtime::controller::Action;
use tracing::{debug, info, warn};

use crate::{
    api::{ClusterOperator, ConditionStatus, Proxy},
    constants::{
        CLOUD_CONFIG_CA_BUNDLE_KEY, OPENSHIFT_CONFIG_NAMESPACE, REASON_AS_EXPECTED,
        REASON_SYNCING_FAILED, SYNCED_CLOUD_CONFIG_MAP, TRUSTED_CA_BUNDLE_KEY,
        TRUSTED_CA_CONFIG_MAP, TRUSTED_CA_CONTROLLER_AVAILABLE, TRUSTED_CA_CONTROLLER_DEGRADED,
    },
    error::{OperatorError, OperatorResult},
    k8s::Resource,
    operator::{
        client::OperatorKubeClient,
        status::{condition, StatusClient},
    },
};

const CERTIFICATE_PEM_TAG: &str = "CERTIFICATE";

pub struct TrustedCaContext {
    pub kube: Arc<dyn OperatorKubeClient>,
    pub status: StatusClient,
    pub managed_namespace: String,
    pub trust_bundle_path: PathBuf,
}

pub async fn reconcile(_co: Arc<ClusterOperator>, context: Arc<TrustedCaContext>) -> OperatorResult<Action> {
    sync_trusted_ca(&context).await?;
    Ok(Action::await_change())
}

pub async fn sync_trusted_ca(context: &TrustedCaContext) -> OperatorResult<()> {
    match sync(context).await {
        Ok(()) => set_available(context).await,
        Err(e) => {
            warn!("Trusted CA bundle sync failed: {e}");
            let message = format!("Trusted CA Bundle Controller failed to sync cloud config: {e}");
            context
                .status
                .set_controller_conditions(vec![
                    condition(TRUSTED_CA_CONTROLLER_AVAILABLE, ConditionStatus::False, REASON_SYNCING_FAILED, &message),
                    condition(TRUSTED_CA_CONTROLLER_DEGRADED, ConditionStatus::True, REASON_SYNCING_FAILED, &message),
                ])
                .await?;
            Err(e)
        }
    }
}

async fn set_available(context: &TrustedCaContext) -> OperatorResult<()> {
    let message = "Trusted CA Bundle Controller works as expected";
    context
        .status
        .set_controller_conditions(vec![
            condition(TRUSTED_CA_CONTROLLER_AVAILABLE, ConditionStatus::True, REASON_AS_EXPECTED, message),
            condition(TRUSTED_CA_CONTROLLER_DEGRADED, ConditionStatus::False, REASON_AS_EXPECTED, message),
        ])
        .await
}

async fn sync(context: &TrustedCaContext) -> OperatorResult<()> {
    let Some(proxy) = context.kube.get_proxy().await? else {
        info!("proxy not found, trusted CA bundle reconciliation skipped");
        return Ok(());
    };

    let system_bundle = system_trust_bundle(context).await?;
    let (proxy_bundle, merged) = add_proxy_ca_bundle(context, &proxy, system_bundle).await?;
    let merged = add_cloud_config_ca_bundle(context, proxy_bundle.as_deref(), merged).await?;

    let target = ConfigMap {
        metadata: ObjectMeta {
            name: Some(TRUSTED_CA_CONFIG_MAP.to_string()),
            namespace: Some(context.managed_namespace.clone()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            TRUSTED_CA_BUNDLE_KEY.to_string(),
            String::from_utf8_lossy(&merged).into_owned(),
        )])),
        ..Default::default()
    };

    let live = context
        .kube
        .get_config_map(&context.managed_namespace, TRUSTED_CA_CONFIG_MAP)
        .await?;
    if live.is_some_and(|live| live.data == target.data) {
        debug!("{TRUSTED_CA_CONFIG_MAP} is up to date");
        return Ok(());
    }
    context.kube.apply(&Resource::ConfigMap(target)).await?;
    info!(namespace = %context.managed_namespace, "Synced {TRUSTED_CA_CONFIG_MAP} ConfigMap");
    Ok(())
}

async fn system_trust_bundle(context: &TrustedCaContext) -> OperatorResult<Vec<u8>> {
    let bundle = tokio::fs::read(&context.trust_bundle_path).await.map_err(|e| {
        OperatorError::TrustBundle(format!(
            "failed to read system trust bundle {}: {e}",
            context.trust_bundle_path.display()
        ))
    })?;
    certificate_data(&bundle)
        .map_err(|e| OperatorError::TrustBundle(format!("system trust bundle is invalid: {e}")))?;
    Ok(bundle)
}

/// Returns the proxy's additional bundle, if any, together with the bundle merged so far.
/// A missing trusted CA ConfigMap is not fatal, the system bundle is used alone.
async fn add_proxy_ca_bundle(
    context: &TrustedCaContext,
    proxy: &Proxy,
    system_bundle: Vec<u8>,
) -> OperatorResult<(Option<Vec<u8>>, Vec<u8>)> {
    let name = proxy.spec.trusted_ca.name.as_str();
    if name.is_empty() {
        return Ok((None, system_bundle));
    }

    let cm = match context.kube.get_config_map(OPENSHIFT_CONFIG_NAMESPACE, name).await {
        Ok(Some(cm)) => cm,
        Ok(None) => {
            warn!("proxy trusted CA ConfigMap {OPENSHIFT_CONFIG_NAMESPACE}/{name} not found, using system trust bundle");
            return Ok((None, system_bundle));
        }
        Err(e) => {
            warn!("failed to get proxy trusted CA ConfigMap {OPENSHIFT_CONFIG_NAMESPACE}/{name}: {e}, using system trust bundle");
            return Ok((None, system_bundle));
        }
    };

    let proxy_bundle = config_map_data(&cm, TRUSTED_CA_BUNDLE_KEY)?;
    certificate_data(&proxy_bundle)?;
    let merged = merge_ca_bundles(&proxy_bundle, &system_bundle)?;
    Ok((Some(proxy_bundle), merged))
}

async fn add_cloud_config_ca_bundle(
    context: &TrustedCaContext,
    proxy_bundle: Option<&[u8]>,
    merged: Vec<u8>,
) -> OperatorResult<Vec<u8>> {
    let Some(cm) = context
        .kube
        .get_config_map(&context.managed_namespace, SYNCED_CLOUD_CONFIG_MAP)
        .await?
    else {
        debug!("synced cloud config not found, no cloud CA bundle to merge");
        return Ok(merged);
    };
    let Some(bundle) = cm
        .data
        .as_ref()
        .and_then(|d| d.get(CLOUD_CONFIG_CA_BUNDLE_KEY))
        .map(|b| b.as_bytes().to_vec())
    else {
        return Ok(merged);
    };
    if proxy_bundle == Some(bundle.as_slice()) {
        return Ok(merged);
    }
    if let Err(e) = certificate_data(&bundle) {
        warn!("cloud config CA bundle is not valid, skipping it: {e}");
        return Ok(merged);
    }
    merge_ca_bundles(&bundle, &merged)
}

/// Reads a non-empty value from a ConfigMap's `data`.
fn config_map_data(cm: &ConfigMap, key: &str) -> OperatorResult<Vec<u8>> {
    let name = cm.metadata.name.as_deref().unwrap_or_default();
    let value = cm
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .ok_or_else(|| OperatorError::TrustBundle(format!("ConfigMap {name} is missing {key}")))?;
    if value.is_empty() {
        return Err(OperatorError::TrustBundle(format!(
            "data key {key} is empty from ConfigMap {name}"
        )));
    }
    Ok(value.as_bytes().to_vec())
}

/// Checks that the bundle holds only x509 certificates and returns how many.
pub fn certificate_data(bundle: &[u8]) -> OperatorResult<usize> {
    let blocks = pem::parse_many(bundle)
        .map_err(|e| OperatorError::TrustBundle(format!("failed to parse certificate PEM: {e}")))?;
    if blocks.is_empty() {
        return Err(OperatorError::TrustBundle("failed to parse certificate PEM".to_string()));
    }
    for block in &blocks {
        if block.tag() != CERTIFICATE_PEM_TAG {
            return Err(OperatorError::TrustBundle(format!(
                "invalid certificate PEM, must be of type \"{CERTIFICATE_PEM_TAG}\""
            )));
        }
        x509_parser::parse_x509_certificate(block.contents()).map_err(|e| {
            OperatorError::TrustBundle(format!("failed to parse certificate: {e}"))
        })?;
    }
    Ok(blocks.len())
}

/// `additional` goes first, separated from the system bundle by a newline.
pub fn merge_ca_bundles(additional: &[u8], system: &[u8]) -> OperatorResult<Vec<u8>> {
    if additional.is_empty() {
        return Err(OperatorError::TrustBundle(
            "failed to merge ca bundles, additional trust bundle is empty".to_string(),
        ));
    }
    if system.is_empty() {
        return Err(OperatorError::TrustBundle(
            "failed to merge ca bundles, system trust bundle is empty".to_string(),
        ));
    }
    let mut merged = Vec::with_capacity(additional.len() + system.len() + 1);
    merged.extend_from_slice(additional);
    merged.push(b'\n');
    merged.extend_from_slice(system);
    certificate_data(&merged)?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::ProxySpec,
        constants::CLOUD_CONFIG_KEY,
        operator::testing::FakeCluster,
    };
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
    use tempfile::NamedTempFile;

    const NS: &str = "openshift-cloud-controller-manager";

    fn ca_pem(common_name: &str) -> String {
        let key_pair = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        params.distinguished_name = dn;
        params.self_signed(&key_pair).unwrap().pem()
    }

    fn bundle_file(contents: &str) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), contents).unwrap();
        file
    }

    fn proxy(trusted_ca: &str) -> Proxy {
        let mut spec = ProxySpec::default();
        spec.trusted_ca.name = trusted_ca.to_string();
        Proxy::new("cluster", spec)
    }

    fn config_map(namespace: &str, name: &str, key: &str, value: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(namespace.into()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(key.to_string(), value.to_string())])),
            ..Default::default()
        }
    }

    fn context(cluster: &Arc<FakeCluster>, bundle: &NamedTempFile) -> TrustedCaContext {
        TrustedCaContext {
            kube: cluster.clone(),
            status: StatusClient::new(cluster.clone(), NS, "1.0"),
            managed_namespace: NS.into(),
            trust_bundle_path: bundle.path().to_path_buf(),
        }
    }

    fn published(cluster: &FakeCluster) -> String {
        cluster
            .config_map(NS, TRUSTED_CA_CONFIG_MAP)
            .and_then(|cm| cm.data)
            .map(|d| d[TRUSTED_CA_BUNDLE_KEY].clone())
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
    async fn story_missing_proxy_is_not_an_error() {
        let cluster = Arc::new(FakeCluster::default());
        let bundle = bundle_file(&ca_pem("system"));

        sync_trusted_ca(&context(&cluster, &bundle)).await.unwrap();

        assert!(cluster.config_map(NS, TRUSTED_CA_CONFIG_MAP).is_none());
        assert_eq!(
            controller_condition(&cluster, TRUSTED_CA_CONTROLLER_AVAILABLE),
            ConditionStatus::True
        );
    }

    #[tokio::test]
    async fn story_system_bundle_is_published_without_proxy_ca() {
        let system = ca_pem("system");
        let cluster = Arc::new(FakeCluster::with(|state| state.proxy = Some(proxy(""))));
        let bundle = bundle_file(&system);

        sync_trusted_ca(&context(&cluster, &bundle)).await.unwrap();

        assert_eq!(published(&cluster), system);
    }

    #[tokio::test]
    async fn story_proxy_and_cloud_bundles_are_merged_ahead_of_system() {
        let system = ca_pem("system");
        let additional = ca_pem("proxy");
        let cloud = ca_pem("cloud");
        let cluster = Arc::new(FakeCluster::with(|state| {
            state.proxy = Some(proxy("user-ca-bundle"));
        }));
        cluster.put_config_map(config_map(
            OPENSHIFT_CONFIG_NAMESPACE,
            "user-ca-bundle",
            TRUSTED_CA_BUNDLE_KEY,
            &additional,
        ));
        let mut cloud_conf = config_map(NS, SYNCED_CLOUD_CONFIG_MAP, CLOUD_CONFIG_KEY, "[Global]");
        cloud_conf
            .data
            .as_mut()
            .unwrap()
            .insert(CLOUD_CONFIG_CA_BUNDLE_KEY.to_string(), cloud.clone());
        cluster.put_config_map(cloud_conf);
        let bundle = bundle_file(&system);

        sync_trusted_ca(&context(&cluster, &bundle)).await.unwrap();

        let out = published(&cluster);
        assert_eq!(out, format!("{cloud}\n{additional}\n{system}"));
        assert_eq!(certificate_data(out.as_bytes()).unwrap(), 3);
    }

    #[tokio::test]
    async fn story_cloud_bundle_equal_to_proxy_bundle_is_not_duplicated() {
        let system = ca_pem("system");
        let additional = ca_pem("proxy");
        let cluster = Arc::new(FakeCluster::with(|state| {
            state.proxy = Some(proxy("user-ca-bundle"));
        }));
        cluster.put_config_map(config_map(
            OPENSHIFT_CONFIG_NAMESPACE,
            "user-ca-bundle",
            TRUSTED_CA_BUNDLE_KEY,
            &additional,
        ));
        cluster.put_config_map(config_map(NS, SYNCED_CLOUD_CONFIG_MAP, CLOUD_CONFIG_CA_BUNDLE_KEY, &additional));
        let bundle = bundle_file(&system);

        sync_trusted_ca(&context(&cluster, &bundle)).await.unwrap();

        assert_eq!(published(&cluster), format!("{additional}\n{system}"));
    }

    #[tokio::test]
    async fn story_missing_proxy_configmap_falls_back_to_system_bundle() {
        let system = ca_pem("system");
        let cluster = Arc::new(FakeCluster::with(|state| {
            state.proxy = Some(proxy("user-ca-bundle"));
        }));
        let bundle = bundle_file(&system);

        sync_trusted_ca(&context(&cluster, &bundle)).await.unwrap();

        assert_eq!(published(&cluster), system);
    }

    #[tokio::test]
    async fn story_invalid_proxy_bundle_degrades_the_controller() {
        let cluster = Arc::new(FakeCluster::with(|state| {
            state.proxy = Some(proxy("user-ca-bundle"));
        }));
        let key_pem = KeyPair::generate().unwrap().serialize_pem();
        cluster.put_config_map(config_map(
            OPENSHIFT_CONFIG_NAMESPACE,
            "user-ca-bundle",
            TRUSTED_CA_BUNDLE_KEY,
            &key_pem,
        ));
        let bundle = bundle_file(&ca_pem("system"));

        let err = sync_trusted_ca(&context(&cluster, &bundle)).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "invalid certificate PEM, must be of type \"CERTIFICATE\""
        );
        assert_eq!(
            controller_condition(&cluster, TRUSTED_CA_CONTROLLER_DEGRADED),
            ConditionStatus::True
        );
        assert!(cluster.config_map(NS, TRUSTED_CA_CONFIG_MAP).is_none());
    }

    #[tokio::test]
    async fn story_unreadable_system_bundle_degrades_the_controller() {
        let cluster = Arc::new(FakeCluster::with(|state| state.proxy = Some(proxy(""))));
        let bundle = bundle_file("not a certificate");

        let err = sync_trusted_ca(&context(&cluster, &bundle)).await.unwrap_err();

        assert!(err.to_string().starts_with("system trust bundle is invalid"));
        assert_eq!(
            controller_condition(&cluster, TRUSTED_CA_CONTROLLER_AVAILABLE),
            ConditionStatus::False
        );
    }

    #[test]
    fn empty_bundles_are_not_merged() {
        let ca = ca_pem("ca");
        assert_eq!(
            merge_ca_bundles(b"", ca.as_bytes()).unwrap_err().to_string(),
            "failed to merge ca bundles, additional trust bundle is empty"
        );
        assert_eq!(
            merge_ca_bundles(ca.as_bytes(), b"").unwrap_err().to_string(),
            "failed to merge ca bundles, system trust bundle is empty"
        );
    }

    #[test]
    fn configmap_values_must_be_present_and_non_empty() {
        let cm = config_map("openshift-config", "user-ca-bundle", TRUSTED_CA_BUNDLE_KEY, "");
        assert_eq!(
            config_map_data(&cm, TRUSTED_CA_BUNDLE_KEY).unwrap_err().to_string(),
            "data key ca-bundle.crt is empty from ConfigMap user-ca-bundle"
        );
        assert_eq!(
            config_map_data(&cm, "other").unwrap_err().to_string(),
            "ConfigMap user-ca-bundle is missing other"
        );
    }

    #[test]
    fn garbage_between_certificates_is_rejected() {
        let mangled = "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n";
        assert!(certificate_data(mangled.as_bytes())
            .unwrap_err()
            .to_string()
            .starts_with("failed to parse certificate"));
    }
}
