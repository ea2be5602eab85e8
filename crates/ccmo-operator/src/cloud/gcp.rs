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

const PROVIDER_NAME: &str = "gcp";

const TEMPLATES: &[TemplateSource] = &[
    template_source!(Deployment, "gcp/deployment.yaml"),
    template_source!(ClusterRole, "gcp/clusterrole.yaml"),
    template_source!(ClusterRoleBinding, "gcp/clusterrolebinding.yaml"),
    template_source!(ValidatingAdmissionPolicyBinding, "gcp/validating-admission-policy-binding.yaml"),
    template_source!(ValidatingAdmissionPolicy, "gcp/validating-admission-policy.yaml"),
];

const VALUE_RULES: &[(&str, ValueRule)] = &[
    ("images", ValueRule::Required),
    ("infrastructureName", ValueRule::RequiredString),
    ("cloudproviderName", ValueRule::RequiredString),
];

pub fn new_provider_assets(config: &OperatorConfig) -> OperatorResult<Box<dyn CloudProviderAssets>> {
    let ccm_image = config.images_reference.cloud_controller_manager_gcp.as_str();
    validate_images(PROVIDER_NAME, &[("CloudControllerManager", ccm_image)])?;

    let values = json!({
        "images": { "cloudControllerManager": ccm_image },
        "infrastructureName": config.infrastructure_name,
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
