use serde_json::{json, Map, Value};

use crate::{
    api::{Infrastructure, Network, PlatformType},
    cloud::{
        render_provider,
        template::{validate_images, TemplateSource, ValueRule},
        CloudProviderAssets,
    },
    config::{feature_gates::is_azure_stack_hub, FeatureGateAccess, OperatorConfig},
    error::{OperatorError, OperatorResult},
    template_source,
};

const PROVIDER_NAME: &str = "azure";

const TEMPLATES: &[TemplateSource] = &[
    template_source!(Deployment, "azure/cloud-controller-manager-deployment.yaml"),
    template_source!(DaemonSet, "azure/cloud-node-manager-daemonset.yaml"),
];

const VALUE_RULES: &[(&str, ValueRule)] = &[
    ("images", ValueRule::Required),
    ("infrastructureName", ValueRule::RequiredString),
    ("cloudproviderName", ValueRule::RequiredString),
];

pub const AZURE_PUBLIC_CLOUD: &str = "AzurePublicCloud";
pub const AZURE_STACK_CLOUD: &str = "AzureStackCloud";

const VALID_CLOUD_NAMES: &[&str] = &[
    AZURE_PUBLIC_CLOUD,
    "AzureUSGovernmentCloud",
    "AzureChinaCloud",
    "AzureGermanCloud",
    AZURE_STACK_CLOUD,
];

pub const VM_TYPE_STANDARD: &str = "standard";
const HEALTH_PROBE_MODE_SHARED: &str = "shared";

pub fn new_provider_assets(config: &OperatorConfig) -> OperatorResult<Box<dyn CloudProviderAssets>> {
    let images = &config.images_reference;
    validate_images(
        PROVIDER_NAME,
        &[
            ("CloudControllerManager", images.cloud_controller_manager_azure.as_str()),
            ("CloudControllerManagerOperator", images.cloud_controller_manager_operator.as_str()),
            ("CloudNodeManager", images.cloud_node_manager_azure.as_str()),
        ],
    )?;

    let values = json!({
        "images": {
            "cloudControllerManager": images.cloud_controller_manager_azure,
            "operator": images.cloud_controller_manager_operator,
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

/// Public Azure clouds only. Azure Stack Hub has its own transformer.
fn is_azure(infra: &Infrastructure) -> bool {
    infra
        .platform_status()
        .is_some_and(|ps| ps.type_ == PlatformType::Azure && !is_azure_stack_hub(ps))
}

/// Parses a JSON cloud config into an object, keeping fields this operator does not know.
pub(crate) fn parse_json_config(source: &str) -> OperatorResult<Map<String, Value>> {
    let parsed: Value = serde_json::from_str(source).map_err(|e| {
        OperatorError::Transform(format!("failed to unmarshal the cloud.conf: {e}"))
    })?;
    match parsed {
        Value::Object(map) => Ok(map),
        other => Err(OperatorError::Transform(format!(
            "failed to unmarshal the cloud.conf: expected an object, found {other}"
        ))),
    }
}

pub(crate) fn string_field<'a>(cfg: &'a Map<String, Value>, key: &str) -> &'a str {
    cfg.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Pins the cloud name to the one recorded on the Infrastructure object and forces the
/// standard VM type and a shared load balancer health check mode.
pub fn cloud_config_transformer(
    source: &str,
    infra: &Infrastructure,
    _network: Option<&Network>,
    _feature_gates: Option<&FeatureGateAccess>,
) -> OperatorResult<String> {
    if !is_azure(infra) {
        return Err(OperatorError::WrongPlatform(format!(
            "CloudName to be {AZURE_PUBLIC_CLOUD}"
        )));
    }
    let mut cfg = parse_json_config(source)?;

    let cloud = match infra
        .platform_status()
        .and_then(|ps| ps.azure.as_ref())
        .map(|azure| azure.cloud_name.as_str())
        .filter(|name| !name.is_empty())
    {
        Some(name) if !VALID_CLOUD_NAMES.contains(&name) => {
            return Err(OperatorError::Transform(format!(
                "status.platformStatus.azure.cloudName: Unsupported value: \"{name}\": supported values: \"{}\"",
                VALID_CLOUD_NAMES.join("\", \"")
            )));
        }
        Some(name) => name,
        None => AZURE_PUBLIC_CLOUD,
    };

    let configured = string_field(&cfg, "cloud");
    if !configured.is_empty() && !configured.eq_ignore_ascii_case(cloud) {
        return Err(OperatorError::Transform(
            "invalid user-provided cloud.conf: \"cloud\" field in user-provided cloud.conf conflicts with infrastructure object"
                .to_string(),
        ));
    }
    cfg.insert("cloud".to_string(), cloud.into());

    if string_field(&cfg, "vmType").is_empty() {
        cfg.insert("vmType".to_string(), VM_TYPE_STANDARD.into());
    }
    cfg.insert(
        "clusterServiceLoadBalancerHealthProbeMode".to_string(),
        HEALTH_PROBE_MODE_SHARED.into(),
    );

    Ok(serde_json::to_string(&cfg)?)
}
