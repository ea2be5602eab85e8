use ini::{Ini, Properties};
use serde_json::json;
use tracing::info;

use crate::{
    api::{Infrastructure, Network, PlatformType},
    cloud::{
        ini_config,
        render_provider,
        template::{validate_images, TemplateSource, ValueRule},
        CloudProviderAssets,
    },
    config::{FeatureGateAccess, OperatorConfig},
    error::{OperatorError, OperatorResult},
    template_source,
};

const PROVIDER_NAME: &str = "openstack";

const TEMPLATES: &[TemplateSource] = &[template_source!(Deployment, "openstack/deployment.yaml")];

const VALUE_RULES: &[(&str, ValueRule)] = &[
    ("images", ValueRule::Required),
    ("cloudproviderName", ValueRule::RequiredString),
    ("featureGates", ValueRule::OptionalString),
    ("infrastructureName", ValueRule::RequiredString),
];

/// In-tree settings that must still hold their installer defaults before they are dropped.
const LEGACY_GLOBAL_KEYS: &[(&str, &str)] = &[
    ("secret-name", "openstack-credentials"),
    ("secret-namespace", "kube-system"),
    ("kubeconfig-path", ""),
];

const CLOUDS_GLOBAL_KEYS: &[(&str, &str)] = &[
    ("use-clouds", "true"),
    ("clouds-file", "/etc/openstack/secret/clouds.yaml"),
    ("cloud", "openstack"),
];

const LOAD_BALANCER_DEFAULTS: &[(&str, &str)] = &[
    ("max-shared-lb", "1"),
    ("manage-security-groups", "true"),
];

pub fn new_provider_assets(config: &OperatorConfig) -> OperatorResult<Box<dyn CloudProviderAssets>> {
    let ccm_image = config.images_reference.cloud_controller_manager_openstack.as_str();
    validate_images(PROVIDER_NAME, &[("CloudControllerManager", ccm_image)])?;

    let values = json!({
        "images": { "cloudControllerManager": ccm_image },
        "cloudproviderName": config.platform_name(),
        "featureGates": config.feature_gates,
        "infrastructureName": config.infrastructure_name,
    });
    render_provider(
        PROVIDER_NAME,
        TEMPLATES,
        VALUE_RULES,
        values.as_object().cloned().unwrap_or_default(),
        config,
    )
}

fn drop_legacy_global(cfg: &mut Ini) -> OperatorResult<()> {
    let Some(global) = cfg.section_mut(Some("Global")) else {
        return Ok(());
    };
    info!("[Global] section found; dropping any legacy settings");
    for (key, default) in LEGACY_GLOBAL_KEYS {
        // An absent key reads as empty.
        if global.get(key).unwrap_or_default() != *default {
            return Err(OperatorError::Transform(format!(
                "'[Global] {key}' is set to a non-default value"
            )));
        }
        global.remove(key);
    }
    Ok(())
}

/// Rewrites an in-tree OpenStack cloud config for the external CCM, which reads its
/// credentials from a mounted clouds.yaml.
pub fn cloud_config_transformer(
    source: &str,
    infra: &Infrastructure,
    _network: Option<&Network>,
    _feature_gates: Option<&FeatureGateAccess>,
) -> OperatorResult<String> {
    if infra.platform_type() != Some(&PlatformType::OpenStack) {
        return Err(OperatorError::WrongPlatform(format!(
            "to be {}",
            PlatformType::OpenStack
        )));
    }
    let mut cfg = ini_config::load(source).map_err(ini_config::read_error)?;

    drop_legacy_global(&mut cfg)?;
    for (key, value) in CLOUDS_GLOBAL_KEYS {
        cfg.with_section(Some("Global")).set(*key, *value);
    }

    if cfg.section(Some("BlockStorage")).is_some() {
        info!("[BlockStorage] section found; dropping section");
        cfg.delete(Some("BlockStorage"));
    }

    // A bare `with_section` does not create the section, `entry` does.
    let load_balancer = cfg
        .entry(Some("LoadBalancer".to_string()))
        .or_insert_with(Properties::new);
    load_balancer.remove("use-octavia");
    for (key, value) in LOAD_BALANCER_DEFAULTS {
        if !load_balancer.contains_key(key) {
            load_balancer.insert(*key, *value);
        }
    }

    ini_config::write(&cfg)
}
