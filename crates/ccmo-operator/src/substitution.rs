//! Pure rewrites applied on top of rendered provider resources. Inputs are only borrowed;
//! every helper builds its result from scratch or hands the input back untouched.

use std::borrow::Cow;

use k8s_openapi::api::core::v1::{EnvVar, PodSpec};
use tracing::debug;

use crate::{
    api::{PlatformType, ProxyStatus},
    config::OperatorConfig,
    constants::{CLOUD_CONTROLLER_MANAGER_CONTAINER, CLOUD_NODE_MANAGER_CONTAINER},
    k8s::Resource,
};

/// Image for the `cloud-controller-manager` container of the configured platform.
pub fn controller_image(config: &OperatorConfig) -> &str {
    let images = &config.images_reference;
    let image = match config.platform_status.type_ {
        PlatformType::AWS => &images.cloud_controller_manager_aws,
        PlatformType::Azure => &images.cloud_controller_manager_azure,
        PlatformType::GCP => &images.cloud_controller_manager_gcp,
        PlatformType::IBMCloud => &images.cloud_controller_manager_ibm,
        PlatformType::OpenStack => &images.cloud_controller_manager_openstack,
        PlatformType::VSphere => &images.cloud_controller_manager_vsphere,
        PlatformType::PowerVS => &images.cloud_controller_manager_powervs,
        PlatformType::AlibabaCloud => &images.cloud_controller_manager_alibaba,
        PlatformType::Nutanix => &images.cloud_controller_manager_nutanix,
        _ => return "",
    };
    image
}

/// Image for the `cloud-node-manager` container, only Azure ships one.
pub fn node_image(config: &OperatorConfig) -> &str {
    match config.platform_status.type_ {
        PlatformType::Azure => config.images_reference.cloud_node_manager_azure.as_str(),
        _ => "",
    }
}

pub fn proxy_env_vars(proxy: Option<&ProxyStatus>) -> Vec<EnvVar> {
    let Some(proxy) = proxy else {
        return Vec::new();
    };
    [
        ("HTTP_PROXY", &proxy.http_proxy),
        ("HTTPS_PROXY", &proxy.https_proxy),
        ("NO_PROXY", &proxy.no_proxy),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(name, value)| EnvVar {
        name: name.to_string(),
        value: Some(value.clone()),
        ..Default::default()
    })
    .collect()
}

fn pod_with_proxy(pod: &PodSpec, env: &[EnvVar]) -> PodSpec {
    PodSpec {
        containers: pod
            .containers
            .iter()
            .map(|c| {
                debug!(container = %c.name, "Substituting proxy settings");
                let mut container = c.clone();
                container
                    .env
                    .get_or_insert_with(Vec::new)
                    .extend(env.iter().cloned());
                container
            })
            .collect(),
        ..pod.clone()
    }
}

fn pod_with_images(pod: &PodSpec, controller: &str, node: &str) -> PodSpec {
    PodSpec {
        containers: pod
            .containers
            .iter()
            .map(|c| {
                let image = match c.name.as_str() {
                    CLOUD_CONTROLLER_MANAGER_CONTAINER => controller,
                    CLOUD_NODE_MANAGER_CONTAINER => node,
                    _ => "",
                };
                let mut container = c.clone();
                if !image.is_empty() {
                    container.image = Some(image.to_string());
                }
                container
            })
            .collect(),
        ..pod.clone()
    }
}

/// Maps the pod template of workload resources, other kinds are cloned as is.
fn map_pod_spec(res: &Resource, f: impl Fn(&PodSpec) -> PodSpec) -> Resource {
    let mut out = res.clone();
    let template = match &mut out {
        Resource::Deployment(d) => d.spec.as_mut().map(|s| &mut s.template),
        Resource::DaemonSet(d) => d.spec.as_mut().map(|s| &mut s.template),
        _ => None,
    };
    if let Some(pod) = template.and_then(|t| t.spec.as_mut()) {
        *pod = f(pod);
    }
    out
}

/// Appends cluster proxy env vars to every workload container. Returns the input itself
/// when there is no proxy to apply.
pub fn substitute_proxy<'a>(
    proxy: Option<&ProxyStatus>,
    resources: &'a [Resource],
) -> Cow<'a, [Resource]> {
    let env = proxy_env_vars(proxy);
    if env.is_empty() {
        return Cow::Borrowed(resources);
    }
    Cow::Owned(
        resources
            .iter()
            .map(|r| map_pod_spec(r, |pod| pod_with_proxy(pod, &env)))
            .collect(),
    )
}

pub fn substitute_images(config: &OperatorConfig, resources: &[Resource]) -> Vec<Resource> {
    let (controller, node) = (controller_image(config), node_image(config));
    resources
        .iter()
        .map(|r| map_pod_spec(r, |pod| pod_with_images(pod, controller, node)))
        .collect()
}

pub fn substitute_single_replica(is_single_replica: bool, resources: &[Resource]) -> Vec<Resource> {
    resources
        .iter()
        .map(|r| match r {
            Resource::Deployment(d) if is_single_replica => {
                let mut d = d.clone();
                if let Some(spec) = d.spec.as_mut() {
                    spec.replicas = Some(1);
                }
                Resource::Deployment(d)
            }
            other => other.clone(),
        })
        .collect()
}

/// Namespace is always forced; the API server drops it for cluster scoped kinds.
pub fn substitute_namespace(namespace: &str, resources: &[Resource]) -> Vec<Resource> {
    resources
        .iter()
        .map(|r| {
            let mut r = r.clone();
            r.meta_mut().namespace = Some(namespace.to_string());
            r
        })
        .collect()
}

/// Runs every substitution in order: namespace, images, single replica, proxy.
pub fn substitute(config: &OperatorConfig, resources: &[Resource]) -> Vec<Resource> {
    let resources = substitute_namespace(&config.managed_namespace, resources);
    let resources = substitute_images(config, &resources);
    let resources = substitute_single_replica(config.is_single_replica, &resources);
    substitute_proxy(config.cluster_proxy.as_ref(), &resources).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PlatformStatus;
    use crate::config::ImagesReference;
    use k8s_openapi::{
        api::{
            apps::v1::{DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec},
            core::v1::{ConfigMap, Container, PodTemplateSpec},
        },
        apimachinery::pkg::apis::meta::v1::ObjectMeta,
    };

    fn pod(containers: &[(&str, &str)]) -> PodTemplateSpec {
        PodTemplateSpec {
            spec: Some(PodSpec {
                containers: containers
                    .iter()
                    .map(|(name, image)| Container {
                        name: name.to_string(),
                        image: Some(image.to_string()),
                        env: Some(vec![EnvVar {
                            name: "EXISTING".into(),
                            value: Some("1".into()),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn deployment(replicas: i32) -> Resource {
        Resource::from(Deployment {
            metadata: ObjectMeta {
                name: Some("ccm".into()),
                namespace: Some("template-ns".into()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                template: pod(&[
                    (CLOUD_CONTROLLER_MANAGER_CONTAINER, "old"),
                    ("sidecar", "sidecar:1"),
                ]),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn daemonset() -> Resource {
        Resource::from(DaemonSet {
            metadata: ObjectMeta {
                name: Some("cnm".into()),
                ..Default::default()
            },
            spec: Some(DaemonSetSpec {
                template: pod(&[(CLOUD_NODE_MANAGER_CONTAINER, "old")]),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn containers(res: &Resource) -> Vec<Container> {
        match res {
            Resource::Deployment(d) => d.spec.clone().unwrap().template.spec.unwrap().containers,
            Resource::DaemonSet(d) => d.spec.clone().unwrap().template.spec.unwrap().containers,
            _ => vec![],
        }
    }

    fn azure_config() -> OperatorConfig {
        OperatorConfig {
            managed_namespace: "openshift-cloud-controller-manager".into(),
            images_reference: ImagesReference {
                cloud_controller_manager_azure: "azure-ccm:new".into(),
                cloud_node_manager_azure: "azure-cnm:new".into(),
                ..Default::default()
            },
            platform_status: PlatformStatus::new(PlatformType::Azure),
            ..Default::default()
        }
    }

    #[test]
    fn images_are_replaced_by_container_name_only() {
        let input = vec![deployment(2), daemonset()];
        let out = substitute_images(&azure_config(), &input);

        let ccm = containers(&out[0]);
        assert_eq!(ccm[0].image.as_deref(), Some("azure-ccm:new"));
        assert_eq!(ccm[1].image.as_deref(), Some("sidecar:1"));
        assert_eq!(containers(&out[1])[0].image.as_deref(), Some("azure-cnm:new"));
        assert_eq!(input, vec![deployment(2), daemonset()]);
    }

    #[test]
    fn proxy_appends_only_set_values() {
        let input = vec![deployment(2)];
        let proxy = ProxyStatus {
            https_proxy: "https://proxy:3128".into(),
            ..Default::default()
        };
        let out = substitute_proxy(Some(&proxy), &input);

        assert!(matches!(out, Cow::Owned(_)));
        for container in containers(&out[0]) {
            let env = container.env.unwrap();
            assert_eq!(env.len(), 2);
            assert_eq!(env[0].name, "EXISTING");
            assert_eq!(env[1].name, "HTTPS_PROXY");
            assert_eq!(env[1].value.as_deref(), Some("https://proxy:3128"));
        }
        assert_eq!(input, vec![deployment(2)]);
    }

    #[test]
    fn empty_proxy_borrows_the_input() {
        let input = vec![deployment(2), Resource::from(ConfigMap::default())];
        assert!(matches!(substitute_proxy(None, &input), Cow::Borrowed(_)));
        let empty = ProxyStatus::default();
        let out = substitute_proxy(Some(&empty), &input);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out.as_ref(), input.as_slice());
    }

    #[test]
    fn single_replica_forces_one() {
        let input = vec![deployment(2)];
        let single = substitute_single_replica(true, &input);
        let multi = substitute_single_replica(false, &input);

        let replicas = |r: &Resource| match r {
            Resource::Deployment(d) => d.spec.as_ref().unwrap().replicas,
            _ => None,
        };
        assert_eq!(replicas(&single[0]), Some(1));
        assert_eq!(replicas(&multi[0]), Some(2));
    }

    #[test]
    fn substitute_is_repeatable() {
        let mut config = azure_config();
        config.is_single_replica = true;
        config.cluster_proxy = Some(ProxyStatus {
            no_proxy: ".cluster.local".into(),
            ..Default::default()
        });
        let input = vec![deployment(2), daemonset()];

        let first = substitute(&config, &input);
        let second = substitute(&config, &input);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert!(first
            .iter()
            .all(|r| r.namespace() == Some("openshift-cloud-controller-manager")));
    }
}
