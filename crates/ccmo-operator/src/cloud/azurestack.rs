use serde_json::json;

use crate::{
    api::{Infrastructure, Network},
    cloud::{
        azure::{parse_json_config, string_field, AZURE_STACK_CLOUD, VM_TYPE_STANDARD},
        render_provider,
        template::{validate_images, TemplateSource, ValueRule},
        CloudProviderAssets,
    },
    config::{feature_gates::is_azure_stack_hub, FeatureGateAccess, OperatorConfig},
    error::{OperatorError, OperatorResult},
    template_source,
};

const PROVIDER_NAME: &str = "azurestack";

const TEMPLATES: &[TemplateSource] = &[
    template_source!(Deployment, "azurestack/cloud-controller-manager-deployment.yaml"),
    template_source!(DaemonSet, "azurestack/cloud-node-manager-daemonset.yaml"),
];

const VALUE_RULES: &[(&str, ValueRule)] = &[
    ("images", ValueRule::Required),
    ("infrastructureName", ValueRule::RequiredString),
    ("cloudproviderName", ValueRule::RequiredString),
];

pub fn new_provider_assets(config: &OperatorConfig) -> OperatorResult<Box<dyn CloudProviderAssets>> {
    let images = &config.images_reference;
    validate_images(
        PROVIDER_NAME,
        &[
            ("Operator", images.cloud_controller_manager_operator.as_str()),
            ("CloudControllerManager", images.cloud_controller_manager_azure.as_str()),
            ("CloudNodeManager", images.cloud_node_manager_azure.as_str()),
        ],
    )?;

    let values = json!({
        "images": {
            "operator": images.cloud_controller_manager_operator,
            "cloudControllerManager": images.cloud_controller_manager_azure,
            "cloudNodeManager": images.cloud_node_manager_azure,
        },
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

pub fn cloud_config_transformer(
    source: &str,
    infra: &Infrastructure,
    _network: Option<&Network>,
    _feature_gates: Option<&FeatureGateAccess>,
) -> OperatorResult<String> {
    if !infra.platform_status().is_some_and(is_azure_stack_hub) {
        return Err(OperatorError::WrongPlatform(format!(
            "CloudName to be {AZURE_STACK_CLOUD}"
        )));
    }
    let mut cfg = parse_json_config(source)?;
    if string_field(&cfg, "vmType").is_empty() {
        cfg.insert("vmType".to_string(), VM_TYPE_STANDARD.into());
    }
    Ok(serde_json::to_string(&cfg)?)
}
