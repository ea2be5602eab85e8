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

const PROVIDER_NAME: &str = "alibaba";

const TEMPLATES: &[TemplateSource] = &[template_source!(Deployment, "alibaba/deployment.yaml")];

const VALUE_RULES: &[(&str, ValueRule)] = &[
    ("images", ValueRule::Required),
    ("cloudproviderName", ValueRule::RequiredString),
];

pub fn new_provider_assets(config: &OperatorConfig) -> OperatorResult<Box<dyn CloudProviderAssets>> {
    let ccm_image = config.images_reference.cloud_controller_manager_alibaba.as_str();
    validate_images(PROVIDER_NAME, &[("CloudControllerManager", ccm_image)])?;

    let values = json!({
        "images": { "cloudControllerManager": ccm_image },
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
