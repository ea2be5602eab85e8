pub mod client;
pub mod cloud_config;
pub mod leader;
pub mod reconcile;
pub mod status;
pub mod trusted_ca;

#[cfg(test)]
pub(crate) mod testing;

use std::{fmt::Debug, future::Future, path::PathBuf, sync::Arc, time::Duration};

use ccmo_common::settings::Settings;
use futures::{future::BoxFuture, stream, FutureExt, StreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    runtime::{controller::Action, reflector::ObjectRef, watcher, Controller},
    Api, Client, Resource as KubeResource,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::{
    api::{ClusterOperator, FeatureGate, Infrastructure, Network, Proxy},
    constants::{
        CLUSTER_OPERATOR_NAME, OPENSHIFT_CONFIG_NAMESPACE, OPENSHIFT_MANAGED_CONFIG_NAMESPACE,
        OPERATOR_NAMESPACE, SYSTEM_TRUST_BUNDLE_PATH,
    },
    error::{OperatorError, OperatorResult},
    operator::{
        client::KubeOperatorClient,
        cloud_config::CloudConfigContext,
        leader::{default_identity, LeaderElector},
        reconcile::Context,
        status::StatusClient,
        trusted_ca::TrustedCaContext,
    },
    watcher::{kube_cache::KubeInformerCache, ObjectWatcher},
};

type ClusterOperatorController = Controller<ClusterOperator>;

/// Every watched object funnels into a reconcile of the single ClusterOperator.
fn cluster_operator_ref<K>(_: K) -> Option<ObjectRef<ClusterOperator>> {
    Some(ObjectRef::new(CLUSTER_OPERATOR_NAME))
}

fn cluster_operator_controller(client: &Client) -> ClusterOperatorController {
    Controller::new(
        Api::<ClusterOperator>::all(client.clone()),
        watcher::Config::default().fields(&format!("metadata.name={CLUSTER_OPERATOR_NAME}")),
    )
}

fn watch_singleton<K>(controller: ClusterOperatorController, client: &Client) -> ClusterOperatorController
where
    K: KubeResource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    controller.watches(Api::<K>::all(client.clone()), watcher::Config::default(), cluster_operator_ref)
}

fn watch_config_maps(
    controller: ClusterOperatorController,
    client: &Client,
    namespace: &str,
) -> ClusterOperatorController {
    controller.watches(
        Api::<ConfigMap>::namespaced(client.clone(), namespace),
        watcher::Config::default(),
        cluster_operator_ref,
    )
}

async fn drive<Ctx, F, Fut>(
    name: &'static str,
    controller: ClusterOperatorController,
    reconcile: F,
    context: Arc<Ctx>,
) where
    Ctx: Send + Sync + 'static,
    F: FnMut(Arc<ClusterOperator>, Arc<Ctx>) -> Fut,
    Fut: Future<Output = OperatorResult<Action>> + Send + 'static,
{
    controller
        .shutdown_on_signal()
        .run(reconcile, on_error::<Ctx>, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _)) => debug!(controller = name, "Reconciled {}", obj.name),
                Err(e) => warn!(controller = name, "Reconcile failed: {e}"),
            }
        })
        .await;
    info!(controller = name, "Controller stopped");
}

fn on_error<Ctx>(_co: Arc<ClusterOperator>, error: &OperatorError, _context: Arc<Ctx>) -> Action {
    warn!("Reconciliation error: {error}");
    Action::requeue(Duration::from_secs(5))
}

/// Blocks until this replica leads, when leader election is enabled. The returned future
/// resolves when leadership is lost. Nothing is written to the cluster before this returns.
async fn lead(client: &Client, settings: &Settings) -> BoxFuture<'static, ()> {
    if !settings.leader_election.enabled {
        return futures::future::pending().boxed();
    }
    let elector = Arc::new(LeaderElector::new(
        client.clone(),
        &settings.leader_election,
        &default_identity(),
    ));
    let mut guard = elector.acquire().await;
    async move { guard.lost().await }.boxed()
}

/// Runs the main controller that provisions the platform CCM.
pub async fn run_operator(settings: &Settings) -> OperatorResult<()> {
    let client = Client::try_default().await?;
    let kube = Arc::new(KubeOperatorClient::new(client.clone()));
    let cache = Arc::new(KubeInformerCache::new(client.clone(), &settings.managed_namespace));
    let object_watcher = Arc::new(ObjectWatcher::new(cache));
    let events = object_watcher
        .event_stream()
        .ok_or_else(|| OperatorError::Runtime(anyhow::anyhow!("watch events already taken")))?;

    let context = Arc::new(Context::new(
        kube,
        object_watcher,
        settings.images_file.clone(),
        &settings.managed_namespace,
        &settings.release_version,
    ));
    let lost = lead(&client, settings).await;
    context.status.get_or_create().await?;
    info!(
        namespace = %settings.managed_namespace,
        version = %settings.release_version,
        "Starting cloud controller manager operator"
    );

    // Changes to applied operands arrive through the object watcher.
    let operand_changes = stream::unfold(events, |mut rx| async move {
        rx.recv().await.map(|_| ((), rx))
    });

    let mut controller = cluster_operator_controller(&client);
    controller = watch_singleton::<Infrastructure>(controller, &client);
    controller = watch_singleton::<FeatureGate>(controller, &client);
    controller = watch_singleton::<Proxy>(controller, &client);
    controller = watch_config_maps(controller, &client, OPERATOR_NAMESPACE);
    let controller = controller.reconcile_all_on(operand_changes);

    tokio::select! {
        _ = drive("cloud-controller-manager", controller, reconcile::reconcile, context) => Ok(()),
        _ = lost => Err(OperatorError::Runtime(anyhow::anyhow!("leader election lost"))),
    }
}

/// Runs the cloud-config and trusted CA sync controllers side by side.
pub async fn run_config_sync(settings: &Settings) -> OperatorResult<()> {
    let client = Client::try_default().await?;
    let kube = Arc::new(KubeOperatorClient::new(client.clone()));
    let status = StatusClient::new(kube.clone(), &settings.managed_namespace, &settings.release_version);

    let cloud_config_context = Arc::new(CloudConfigContext {
        kube: kube.clone(),
        status: status.clone(),
        managed_namespace: settings.managed_namespace.clone(),
    });
    let trusted_ca_context = Arc::new(TrustedCaContext {
        kube,
        status,
        managed_namespace: settings.managed_namespace.clone(),
        trust_bundle_path: settings
            .trust_bundle_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SYSTEM_TRUST_BUNDLE_PATH)),
    });

    let lost = lead(&client, settings).await;
    cloud_config_context.status.get_or_create().await?;
    info!(namespace = %settings.managed_namespace, "Starting config sync controllers");

    let mut cloud_config = cluster_operator_controller(&client);
    cloud_config = watch_singleton::<Infrastructure>(cloud_config, &client);
    cloud_config = watch_singleton::<Network>(cloud_config, &client);
    cloud_config = watch_singleton::<FeatureGate>(cloud_config, &client);
    cloud_config = watch_config_maps(cloud_config, &client, OPENSHIFT_CONFIG_NAMESPACE);
    cloud_config = watch_config_maps(cloud_config, &client, OPENSHIFT_MANAGED_CONFIG_NAMESPACE);
    cloud_config = watch_config_maps(cloud_config, &client, &settings.managed_namespace);

    let mut trusted_ca = cluster_operator_controller(&client);
    trusted_ca = watch_singleton::<Proxy>(trusted_ca, &client);
    trusted_ca = watch_config_maps(trusted_ca, &client, OPENSHIFT_CONFIG_NAMESPACE);
    trusted_ca = watch_config_maps(trusted_ca, &client, &settings.managed_namespace);

    let controllers = futures::future::join(
        drive(
            "cloud-config-sync",
            cloud_config,
            cloud_config::reconcile,
            cloud_config_context,
        ),
        drive(
            "trusted-ca-bundle",
            trusted_ca,
            trusted_ca::reconcile,
            trusted_ca_context,
        ),
    );

    tokio::select! {
        _ = controllers => Ok(()),
        _ = lost => Err(OperatorError::Runtime(anyhow::anyhow!("leader election lost"))),
    }
}
