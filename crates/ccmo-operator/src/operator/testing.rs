//! In-memory cluster for reconcile stories.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::{api::core::v1::ConfigMap, apimachinery::pkg::apis::meta::v1::Time};
use kube::api::DynamicObject;

use crate::{
    api::{ClusterOperator, ClusterOperatorStatus, FeatureGate, Infrastructure, Network, Proxy},
    error::{OperatorError, OperatorResult},
    k8s::Resource,
    operator::client::OperatorKubeClient,
};

#[derive(Default)]
pub struct FakeState {
    pub infrastructure: Option<Infrastructure>,
    /// Makes Infrastructure reads fail with this status code.
    pub infrastructure_error: Option<u16>,
    pub feature_gate: Option<FeatureGate>,
    pub proxy: Option<Proxy>,
    pub network: Option<Network>,
    pub cluster_operator: Option<ClusterOperator>,
    pub config_maps: BTreeMap<(String, String), ConfigMap>,
    pub objects: BTreeMap<String, DynamicObject>,
    /// Every status written, oldest first.
    pub status_history: Vec<ClusterOperatorStatus>,
    pub applies: usize,
}

#[derive(Default)]
pub struct FakeCluster {
    pub state: Mutex<FakeState>,
    resource_version: AtomicU64,
}

fn object_key(resource: &Resource) -> String {
    format!(
        "{}/{}/{}",
        resource.group_kind(),
        resource.namespace().unwrap_or_default(),
        resource.name()
    )
}

impl FakeCluster {
    pub fn with(setup: impl FnOnce(&mut FakeState)) -> Self {
        let cluster = Self::default();
        setup(&mut cluster.state.lock().unwrap());
        cluster
    }

    pub fn put_config_map(&self, cm: ConfigMap) {
        let key = (
            cm.metadata.namespace.clone().unwrap_or_default(),
            cm.metadata.name.clone().unwrap_or_default(),
        );
        self.state.lock().unwrap().config_maps.insert(key, cm);
    }

    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.state
            .lock()
            .unwrap()
            .config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn cluster_operator(&self) -> Option<ClusterOperator> {
        self.state.lock().unwrap().cluster_operator.clone()
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    pub fn status_writes(&self) -> usize {
        self.state.lock().unwrap().status_history.len()
    }

    fn next_resource_version(&self) -> String {
        (self.resource_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

#[async_trait]
impl OperatorKubeClient for FakeCluster {
    async fn get_infrastructure(&self) -> OperatorResult<Option<Infrastructure>> {
        let state = self.state.lock().unwrap();
        if let Some(code) = state.infrastructure_error {
            return Err(OperatorError::api(code, "InternalError", "infrastructure unavailable"));
        }
        Ok(state.infrastructure.clone())
    }

    async fn get_feature_gate(&self) -> OperatorResult<Option<FeatureGate>> {
        Ok(self.state.lock().unwrap().feature_gate.clone())
    }

    async fn get_proxy(&self) -> OperatorResult<Option<Proxy>> {
        Ok(self.state.lock().unwrap().proxy.clone())
    }

    async fn get_network(&self) -> OperatorResult<Option<Network>> {
        Ok(self.state.lock().unwrap().network.clone())
    }

    async fn get_cluster_operator(&self) -> OperatorResult<Option<ClusterOperator>> {
        Ok(self.cluster_operator())
    }

    async fn create_cluster_operator(&self, co: &ClusterOperator) -> OperatorResult<ClusterOperator> {
        let resource_version = self.next_resource_version();
        let mut state = self.state.lock().unwrap();
        if state.cluster_operator.is_some() {
            return Err(OperatorError::api(409, "AlreadyExists", "clusteroperator exists"));
        }
        let mut created = co.clone();
        // Status is ignored on create.
        created.status = None;
        created.metadata.resource_version = Some(resource_version);
        state.cluster_operator = Some(created.clone());
        Ok(created)
    }

    async fn update_cluster_operator_status(
        &self,
        co: &ClusterOperator,
    ) -> OperatorResult<ClusterOperator> {
        let resource_version = self.next_resource_version();
        let mut state = self.state.lock().unwrap();
        let Some(live) = state.cluster_operator.as_ref() else {
            return Err(OperatorError::api(404, "NotFound", "clusteroperator not found"));
        };
        if live.metadata.resource_version != co.metadata.resource_version {
            return Err(OperatorError::api(409, "Conflict", "the object has been modified"));
        }
        let mut updated = co.clone();
        updated.metadata.resource_version = Some(resource_version);
        state.cluster_operator = Some(updated.clone());
        state
            .status_history
            .push(updated.status.clone().unwrap_or_default());
        Ok(updated)
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> OperatorResult<Option<ConfigMap>> {
        Ok(self.config_map(namespace, name))
    }

    async fn get_object(&self, resource: &Resource) -> OperatorResult<Option<DynamicObject>> {
        Ok(self.state.lock().unwrap().objects.get(&object_key(resource)).cloned())
    }

    async fn apply(&self, resource: &Resource) -> OperatorResult<DynamicObject> {
        let resource_version = self.next_resource_version();
        let key = object_key(resource);
        let mut obj = resource.to_dynamic()?;

        let mut state = self.state.lock().unwrap();
        state.applies += 1;
        match state.objects.get(&key) {
            None => {
                obj.metadata.generation = Some(1);
                obj.metadata.creation_timestamp = Some(Time(Utc::now()));
            }
            Some(live) => {
                let bump = i64::from(live.data != obj.data);
                obj.metadata.generation = live.metadata.generation.map(|g| g + bump);
                obj.metadata.creation_timestamp = live.metadata.creation_timestamp.clone();
            }
        }
        obj.metadata.resource_version = Some(resource_version);

        if let Resource::ConfigMap(cm) = resource {
            let cm_key = (
                resource.namespace().unwrap_or_default().to_string(),
                resource.name().to_string(),
            );
            let mut stored = cm.clone();
            stored.metadata.resource_version = obj.metadata.resource_version.clone();
            state.config_maps.insert(cm_key, stored);
        }
        state.objects.insert(key, obj.clone());
        Ok(obj)
    }
}
