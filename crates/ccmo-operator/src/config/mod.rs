//! Operator configuration composed fresh on every reconcile from the cluster singletons and
//! the mounted images file.

use std::path::Path;

use tracing::error;

use crate::{
    api::{infrastructure::SINGLE_REPLICA_TOPOLOGY, Infrastructure, PlatformStatus, Proxy, ProxyStatus},
    error::{OperatorError, OperatorResult},
};

pub mod feature_gates;
pub mod images;

pub use feature_gates::{FeatureGateAccess, feature_gates_flag, is_cloud_provider_external};
pub use images::ImagesReference;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperatorConfig {
    pub managed_namespace: String,
    pub images_reference: ImagesReference,
    pub is_single_replica: bool,
    pub infrastructure_name: String,
    pub platform_status: PlatformStatus,
    pub cluster_proxy: Option<ProxyStatus>,
    /// Ready to use `--feature-gates=...` flag, empty when no gates apply.
    pub feature_gates: String,
}

impl OperatorConfig {
    /// Platform type as written on the Infrastructure object, e.g. `AWS`.
    pub fn platform_name(&self) -> &str {
        self.platform_status.type_.as_str()
    }
}

/// Fails early when the Infrastructure object cannot tell which cloud we are on.
pub fn check_infrastructure(infra: Option<&Infrastructure>) -> OperatorResult<&PlatformStatus> {
    let platform_status = infra.and_then(Infrastructure::platform_status).ok_or_else(|| {
        OperatorError::InvalidInfrastructure(
            "platform status is not populated on infrastructure".to_string(),
        )
    })?;
    if platform_status.type_.is_unset() {
        return Err(OperatorError::InvalidInfrastructure(
            "no platform provider found on infrastructure".to_string(),
        ));
    }
    Ok(platform_status)
}

pub fn compose(
    infra: Option<&Infrastructure>,
    proxy: Option<&Proxy>,
    images_file: &Path,
    managed_namespace: &str,
    feature_gates: Option<&FeatureGateAccess>,
) -> OperatorResult<OperatorConfig> {
    let platform_status = check_infrastructure(infra).inspect_err(|e| {
        error!("Unable to get platform from infrastructure: {e}");
    })?;

    let images_reference = ImagesReference::from_json_file(images_file).inspect_err(|e| {
        error!(images_file = %images_file.display(), "Unable to decode images file: {e}");
    })?;

    // check_infrastructure guarantees the status is there
    let status = infra.and_then(|i| i.status.as_ref());

    Ok(OperatorConfig {
        managed_namespace: managed_namespace.to_string(),
        images_reference,
        is_single_replica: status
            .is_some_and(|s| s.control_plane_topology == SINGLE_REPLICA_TOPOLOGY),
        infrastructure_name: status
            .map(|s| s.infrastructure_name.clone())
            .unwrap_or_default(),
        platform_status: platform_status.clone(),
        cluster_proxy: proxy.and_then(|p| p.status.clone()),
        feature_gates: feature_gates_flag(feature_gates),
    })
}
