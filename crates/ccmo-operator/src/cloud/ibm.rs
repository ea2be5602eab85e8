use serde_json::json;

use crate::{
    api::PlatformType,
    cloud::{
        render_provider,
        template::{validate_images, TemplateSource, ValueRule},
        CloudProviderAssets,
    },
    config::OperatorConfig,
    error::OperatorResult,
    template_source,
};

const PROVIDER_NAME: &str = "ibm";

const TEMPLATES: &[TemplateSource] = &[template_source!(Deployment, "ibm/deployment.yaml")];

const VALUE_RULES: &[(&str, ValueRule)] = &[
    ("images", ValueRule::Required),
    ("enablePublicEndpoint", ValueRule::RequiredString),
    ("cloudproviderName", ValueRule::RequiredString),
];

pub fn new_provider_assets(config: &OperatorConfig) -> OperatorResult<Box<dyn CloudProviderAssets>> {
    let ccm_image = config.images_reference.cloud_controller_manager_ibm.as_str();
    validate_images(PROVIDER_NAME, &[("CloudControllerManager", ccm_image)])?;

    // Power VS clusters reach the VPC API over its public endpoint.
    let public_endpoint = config.platform_status.type_ == PlatformType::PowerVS;
    let values = json!({
        "images": { "cloudControllerManager": ccm_image },
        "enablePublicEndpoint": public_endpoint.to_string(),
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
    use crate::{cloud::testing::config_for, k8s::Resource};

    #[test]
    fn private_endpoint_on_ibm_cloud() {
        let assets = new_provider_assets(&config_for(PlatformType::IBMCloud)).unwrap();
        let Resource::Deployment(d) = &assets.rendered_resources()[0] else {
            panic!("expected a deployment");
        };
        let container = &d.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0];
        let env = container.env.as_ref().unwrap();
        let public = env.iter().find(|e| e.name == "VPCCTL_PUBLIC_ENDPOINT").unwrap();
        assert_eq!(public.value.as_deref(), Some("false"));
        assert_eq!(container.image.as_deref(), Some("ibm-ccm:test"));
    }
}
