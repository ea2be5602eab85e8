//! Typed views of the `config.openshift.io/v1` objects this operator reads and writes.
//! Only the fields the operator looks at are modelled.

pub mod cluster_operator;
pub mod feature_gate;
pub mod infrastructure;
pub mod network;
pub mod proxy;

pub use cluster_operator::{
    ClusterOperator, ClusterOperatorSpec, ClusterOperatorStatus, ClusterOperatorStatusCondition,
    ConditionStatus, ObjectReference, OperandVersion,
};
pub use feature_gate::{FeatureGate, FeatureGateSpec};
pub use infrastructure::{Infrastructure, InfrastructureSpec, PlatformStatus, PlatformType};
pub use network::{Network, NetworkSpec};
pub use proxy::{Proxy, ProxySpec, ProxyStatus};

/// Name of every cluster-scoped config singleton.
pub const CLUSTER_SINGLETON_NAME: &str = "cluster";
