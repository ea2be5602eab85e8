use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        core::v1::{Service, ServicePort, ServiceSpec},
        policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec},
    },
    apimachinery::pkg::{
        apis::meta::v1::{LabelSelector, ObjectMeta},
        util::intstr::IntOrString,
    },
};

use crate::{
    config::OperatorConfig,
    constants::{CCM_HTTPS_PORT, CCM_SELECTOR_LABEL, CCM_WEBHOOK_PORT, K8S_APP_LABEL},
    k8s::Resource,
};

fn resource_name(config: &OperatorConfig) -> String {
    format!("{}-cloud-controller-manager", config.platform_name().to_lowercase())
}

fn selector_labels(config: &OperatorConfig) -> BTreeMap<String, String> {
    BTreeMap::from([(
        CCM_SELECTOR_LABEL.to_string(),
        config.platform_name().to_string(),
    )])
}

/// Keeps at least one CCM replica through voluntary disruptions.
pub fn pod_disruption_budget(config: &OperatorConfig) -> PodDisruptionBudget {
    PodDisruptionBudget {
        metadata: ObjectMeta {
            name: Some(resource_name(config)),
            namespace: Some(config.managed_namespace.clone()),
            ..Default::default()
        },
        spec: Some(PodDisruptionBudgetSpec {
            min_available: Some(IntOrString::Int(1)),
            selector: Some(LabelSelector {
                match_labels: Some(selector_labels(config)),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// ClusterIP service in front of the CCM secure port and its webhook server.
pub fn service(config: &OperatorConfig) -> Service {
    let name = resource_name(config);
    Service {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(config.managed_namespace.clone()),
            labels: Some(BTreeMap::from([(K8S_APP_LABEL.to_string(), name)])),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            ports: Some(vec![
                ServicePort {
                    name: Some("https".to_string()),
                    port: CCM_HTTPS_PORT,
                    ..Default::default()
                },
                ServicePort {
                    name: Some("webhooks".to_string()),
                    port: CCM_WEBHOOK_PORT,
                    target_port: Some(IntOrString::Int(CCM_WEBHOOK_PORT)),
                    ..Default::default()
                },
            ]),
            selector: Some(selector_labels(config)),
            session_affinity: Some("None".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn common_resources(config: &OperatorConfig, with_service: bool) -> Vec<Resource> {
    let mut resources = Vec::new();
    if !config.is_single_replica {
        resources.push(pod_disruption_budget(config).into());
    }
    if with_service {
        resources.push(service(config).into());
    }
    resources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{PlatformStatus, PlatformType};

    fn config(single: bool) -> OperatorConfig {
        OperatorConfig {
            managed_namespace: "openshift-cloud-controller-manager".into(),
            is_single_replica: single,
            platform_status: PlatformStatus::new(PlatformType::AWS),
            ..Default::default()
        }
    }

    #[test]
    fn pdb_selects_platform_pods() {
        let pdb = pod_disruption_budget(&config(false));
        assert_eq!(pdb.metadata.name.as_deref(), Some("aws-cloud-controller-manager"));
        let spec = pdb.spec.unwrap();
        assert_eq!(spec.min_available, Some(IntOrString::Int(1)));
        assert_eq!(
            spec.selector.unwrap().match_labels.unwrap()[CCM_SELECTOR_LABEL],
            "AWS"
        );
    }

    #[test]
    fn service_exposes_fixed_ports() {
        let svc = service(&config(false));
        let ports: Vec<i32> = svc.spec.unwrap().ports.unwrap().iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![10258, 10260]);
    }

    #[test]
    fn single_replica_skips_pdb() {
        assert_eq!(common_resources(&config(true), false).len(), 0);
        assert_eq!(common_resources(&config(true), true).len(), 1);
        assert_eq!(common_resources(&config(false), true).len(), 2);
    }
}
