//! Narrow view of the API server used by the controllers, so reconcile logic can run
//! against an in-memory cluster in tests.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    api::{Api, DynamicObject, Patch, PatchParams, PostParams},
    Client,
};
use tracing::{debug, trace};

#[cfg(test)]
use mockall::automock;

use crate::{
    api::{ClusterOperator, FeatureGate, Infrastructure, Network, Proxy, CLUSTER_SINGLETON_NAME},
    constants::{CLUSTER_OPERATOR_NAME, FIELD_MANAGER},
    error::OperatorResult,
    k8s::Resource,
};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait OperatorKubeClient: Send + Sync {
    async fn get_infrastructure(&self) -> OperatorResult<Option<Infrastructure>>;

    async fn get_feature_gate(&self) -> OperatorResult<Option<FeatureGate>>;

    async fn get_proxy(&self) -> OperatorResult<Option<Proxy>>;

    async fn get_network(&self) -> OperatorResult<Option<Network>>;

    async fn get_cluster_operator(&self) -> OperatorResult<Option<ClusterOperator>>;

    async fn create_cluster_operator(&self, co: &ClusterOperator) -> OperatorResult<ClusterOperator>;

    /// Writes the status subresource. The passed object carries the resourceVersion it
    /// was read at, so concurrent writers get a conflict.
    async fn update_cluster_operator_status(
        &self,
        co: &ClusterOperator,
    ) -> OperatorResult<ClusterOperator>;

    async fn get_config_map(&self, namespace: &str, name: &str) -> OperatorResult<Option<ConfigMap>>;

    /// Live state of a rendered resource, if it exists.
    async fn get_object(&self, resource: &Resource) -> OperatorResult<Option<DynamicObject>>;

    /// Server side apply, forcing ownership of conflicting fields.
    async fn apply(&self, resource: &Resource) -> OperatorResult<DynamicObject>;
}

#[derive(Clone)]
pub struct KubeOperatorClient {
    client: Client,
}

impl KubeOperatorClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn dynamic_api(&self, resource: &Resource) -> Api<DynamicObject> {
        let kind = resource.kind();
        let ar = kind.api_resource();
        match resource.namespace() {
            Some(namespace) if kind.is_namespaced() => {
                Api::namespaced_with(self.client.clone(), namespace, &ar)
            }
            _ => Api::all_with(self.client.clone(), &ar),
        }
    }
}

#[async_trait]
impl OperatorKubeClient for KubeOperatorClient {
    async fn get_infrastructure(&self) -> OperatorResult<Option<Infrastructure>> {
        let api: Api<Infrastructure> = Api::all(self.client.clone());
        Ok(api.get_opt(CLUSTER_SINGLETON_NAME).await?)
    }

    async fn get_feature_gate(&self) -> OperatorResult<Option<FeatureGate>> {
        let api: Api<FeatureGate> = Api::all(self.client.clone());
        Ok(api.get_opt(CLUSTER_SINGLETON_NAME).await?)
    }

    async fn get_proxy(&self) -> OperatorResult<Option<Proxy>> {
        let api: Api<Proxy> = Api::all(self.client.clone());
        Ok(api.get_opt(CLUSTER_SINGLETON_NAME).await?)
    }

    async fn get_network(&self) -> OperatorResult<Option<Network>> {
        let api: Api<Network> = Api::all(self.client.clone());
        Ok(api.get_opt(CLUSTER_SINGLETON_NAME).await?)
    }

    async fn get_cluster_operator(&self) -> OperatorResult<Option<ClusterOperator>> {
        let api: Api<ClusterOperator> = Api::all(self.client.clone());
        Ok(api.get_opt(CLUSTER_OPERATOR_NAME).await?)
    }

    async fn create_cluster_operator(&self, co: &ClusterOperator) -> OperatorResult<ClusterOperator> {
        let api: Api<ClusterOperator> = Api::all(self.client.clone());
        let created = api.create(&PostParams::default(), co).await?;
        debug!(name = CLUSTER_OPERATOR_NAME, "Created ClusterOperator");
        Ok(created)
    }

    async fn update_cluster_operator_status(
        &self,
        co: &ClusterOperator,
    ) -> OperatorResult<ClusterOperator> {
        let api: Api<ClusterOperator> = Api::all(self.client.clone());
        let data = serde_json::to_vec(co)?;
        Ok(api
            .replace_status(CLUSTER_OPERATOR_NAME, &PostParams::default(), data)
            .await?)
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> OperatorResult<Option<ConfigMap>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_object(&self, resource: &Resource) -> OperatorResult<Option<DynamicObject>> {
        Ok(self.dynamic_api(resource).get_opt(resource.name()).await?)
    }

    async fn apply(&self, resource: &Resource) -> OperatorResult<DynamicObject> {
        let params = PatchParams::apply(FIELD_MANAGER).force();
        let data = serde_json::to_value(resource)?;
        trace!(
            kind = %resource.group_kind(),
            "Applying {}: \n{}",
            resource.name(),
            serde_yaml::to_string(&data)?
        );
        Ok(self
            .dynamic_api(resource)
            .patch(resource.name(), &params, &Patch::Apply(data))
            .await?)
    }
}
