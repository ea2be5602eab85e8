//! Well-known names shared across rendering, reconcile and status reporting.

pub const CLUSTER_OPERATOR_NAME: &str = "cloud-controller-manager";
pub const OPERATOR_NAMESPACE: &str = "openshift-cloud-controller-manager-operator";
pub const OPENSHIFT_CONFIG_NAMESPACE: &str = "openshift-config";
pub const OPENSHIFT_MANAGED_CONFIG_NAMESPACE: &str = "openshift-config-managed";

/// Field manager used for every server-side apply issued by the operator.
pub const FIELD_MANAGER: &str = "cluster-cloud-controller-manager-operator";
pub const LEADER_LEASE_NAME: &str = "cluster-cloud-controller-manager-leader";

pub const OPERATOR_VERSION_NAME: &str = "operator";

// Container names that receive image substitution.
pub const CLOUD_CONTROLLER_MANAGER_CONTAINER: &str = "cloud-controller-manager";
pub const CLOUD_NODE_MANAGER_CONTAINER: &str = "cloud-node-manager";

pub const CCM_SELECTOR_LABEL: &str = "infrastructure.openshift.io/cloud-controller-manager";
pub const K8S_APP_LABEL: &str = "k8s-app";

pub const CCM_HTTPS_PORT: i32 = 10258;
pub const CCM_WEBHOOK_PORT: i32 = 10260;

// ClusterOperator condition types.
pub const CONDITION_AVAILABLE: &str = "Available";
pub const CONDITION_PROGRESSING: &str = "Progressing";
pub const CONDITION_DEGRADED: &str = "Degraded";
pub const CONDITION_UPGRADEABLE: &str = "Upgradeable";
pub const CONDITION_CLOUD_CONTROLLER_OWNER: &str = "CloudControllerOwner";

pub const CLOUD_CONFIG_CONTROLLER_AVAILABLE: &str = "CloudConfigControllerAvailable";
pub const CLOUD_CONFIG_CONTROLLER_DEGRADED: &str = "CloudConfigControllerDegraded";
pub const TRUSTED_CA_CONTROLLER_AVAILABLE: &str = "TrustedCABundleControllerControllerAvailable";
pub const TRUSTED_CA_CONTROLLER_DEGRADED: &str = "TrustedCABundleControllerControllerDegraded";

// Condition reasons.
pub const REASON_AS_EXPECTED: &str = "AsExpected";
pub const REASON_INITIALIZING: &str = "Initializing";
pub const REASON_SYNCING_RESOURCES: &str = "SyncingResources";
pub const REASON_SYNCING_FAILED: &str = "SyncingFailed";
pub const REASON_PLATFORM_TECH_PREVIEW: &str = "PlatformTechPreview";

// Cloud config sync.
pub const MANAGED_CLOUD_CONFIG_MAP: &str = "kube-cloud-config";
pub const SYNCED_CLOUD_CONFIG_MAP: &str = "cloud-conf";
pub const CLOUD_CONFIG_KEY: &str = "cloud.conf";

// Trusted CA bundle.
pub const TRUSTED_CA_CONFIG_MAP: &str = "ccm-trusted-ca";
pub const TRUSTED_CA_BUNDLE_KEY: &str = "ca-bundle.crt";
pub const CLOUD_CONFIG_CA_BUNDLE_KEY: &str = "ca-bundle.pem";
pub const SYSTEM_TRUST_BUNDLE_PATH: &str = "/etc/pki/ca-trust/extracted/pem/tls-ca-bundle.pem";
