use serde_json::json;

use crate::{
    cloud::{
        render_provider,
        template::{validate_images, TemplateSource, ValueRule},
        CloudProviderAssets,
    },
    config::OperatorConfig,
    error::OperatorResult,
    template_source,
};

const PROVIDER_NAME: &str = "nutanix";

const TEMPLATES: &[TemplateSource] = &[
    template_source!(Deployment, "nutanix/deployment.yaml"),
    template_source!(Role, "nutanix/role.yaml"),
    template_source!(RoleBinding, "nutanix/rolebinding.yaml"),
    template_source!(ClusterRole, "nutanix/clusterrole.yaml"),
    template_source!(ClusterRoleBinding, "nutanix/clusterrolebinding.yaml"),
];

const VALUE_RULES: &[(&str, ValueRule)] = &[
    ("images", ValueRule::Required),
    ("infrastructureName", ValueRule::RequiredString),
    ("globalCredsSecretNamespace", ValueRule::RequiredString),
    ("globalCredsSecretName", ValueRule::RequiredString),
    ("cloudproviderName", ValueRule::RequiredString),
];

/// Credentials secret the CCM reads from the managed namespace.
const GLOBAL_CREDS_SECRET_NAME: &str = "nutanix-credentials";

pub fn new_provider_assets(config: &OperatorConfig) -> OperatorResult<Box<dyn CloudProviderAssets>> {
    let ccm_image = config.images_reference.cloud_controller_manager_nutanix.as_str();
    validate_images(PROVIDER_NAME, &[("CloudControllerManager", ccm_image)])?;

    let values = json!({
        "images": { "cloudControllerManager": ccm_image },
        "infrastructureName": config.infrastructure_name,
        "globalCredsSecretNamespace": config.managed_namespace,
        "globalCredsSecretName": GLOBAL_CREDS_SECRET_NAME,
        "cloudproviderName": config.platform_name(),
    });
    render_provider(
        PROVIDER_NAME,
        TEMPLATES,
        VALUE_RULES,
        values.as_object().cloned().unwrap_or_default(),
        config,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::PlatformType, cloud::testing::config_for, k8s::ResourceKind};

    #[test]
    fn renders_deployment_and_rbac() {
        let assets = new_provider_assets(&config_for(PlatformType::Nutanix)).unwrap();
        let kinds: Vec<_> = assets.rendered_resources().iter().map(|r| r.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Deployment,
                ResourceKind::Role,
                ResourceKind::RoleBinding,
                ResourceKind::ClusterRole,
                ResourceKind::ClusterRoleBinding,
            ]
        );
    }

    #[test]
    fn credentials_secret_points_at_managed_namespace() {
        let mut config = config_for(PlatformType::Nutanix);
        config.managed_namespace = "ccm".into();
        let assets = new_provider_assets(&config).unwrap();
        let rendered = serde_json::to_value(&assets.rendered_resources()[0]).unwrap();
        let env = &rendered["spec"]["template"]["spec"]["containers"][0]["env"];
        assert_eq!(env[0]["value"], "ccm");
        assert_eq!(env[1]["value"], GLOBAL_CREDS_SECRET_NAME);
    }
}
