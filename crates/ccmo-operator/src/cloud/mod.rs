//! Per platform asset providers. Each provider validates its images, renders its embedded
//! templates and hands back ready to apply resources. Platforms are looked up through a
//! registration table keyed by platform type.

use std::collections::HashMap;

use lazy_static::lazy_static;
use tracing::{info, warn};

use crate::{
    api::{Infrastructure, Network, PlatformStatus, PlatformType},
    config::{feature_gates::is_azure_stack_hub, FeatureGateAccess, OperatorConfig},
    error::{OperatorError, OperatorResult},
    k8s::Resource,
    substitution,
};

pub mod common;
pub mod ini_config;
pub mod template;

pub mod alibaba;
pub mod aws;
pub mod azure;
pub mod azurestack;
pub mod gcp;
pub mod ibm;
pub mod nutanix;
pub mod openstack;
pub mod powervs;
pub mod vsphere;
pub mod vsphere_config;

use template::{render_templates, validate_template_values, TemplateSource, TemplateValues, ValueRule};

pub trait CloudProviderAssets: Send + Sync {
    /// Rendered resources in template declaration order.
    fn rendered_resources(&self) -> &[Resource];
}

/// Resources rendered from a provider's templates.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedAssets {
    resources: Vec<Resource>,
}

impl CloudProviderAssets for RenderedAssets {
    fn rendered_resources(&self) -> &[Resource] {
        &self.resources
    }
}

/// Shared tail of every provider constructor: validate values, then render.
pub(crate) fn render_provider(
    provider: &str,
    templates: &[TemplateSource],
    rules: &[(&str, ValueRule)],
    values: TemplateValues,
    config: &OperatorConfig,
) -> OperatorResult<Box<dyn CloudProviderAssets>> {
    validate_template_values(&values, rules).map_err(|reason| OperatorError::TemplateValue {
        provider: provider.to_string(),
        reason,
    })?;
    let resources = render_templates(templates, &values, &config.managed_namespace)?;
    Ok(Box::new(RenderedAssets { resources }))
}

pub type AssetsConstructor = fn(&OperatorConfig) -> OperatorResult<Box<dyn CloudProviderAssets>>;

/// Rewrites a user supplied cloud provider config into what the external CCM expects.
pub type CloudConfigTransformer = fn(
    &str,
    &Infrastructure,
    Option<&Network>,
    Option<&FeatureGateAccess>,
) -> OperatorResult<String>;

struct PlatformEntry {
    constructor: AssetsConstructor,
    transformer: Option<CloudConfigTransformer>,
    /// Whether a Service is synthesized next to the provider resources.
    with_service: bool,
}

fn entry(
    constructor: AssetsConstructor,
    transformer: Option<CloudConfigTransformer>,
    with_service: bool,
) -> PlatformEntry {
    PlatformEntry {
        constructor,
        transformer,
        with_service,
    }
}

fn transformer(f: CloudConfigTransformer) -> Option<CloudConfigTransformer> {
    Some(f)
}

lazy_static! {
    static ref PLATFORMS: HashMap<PlatformType, PlatformEntry> = HashMap::from([
        (
            PlatformType::AWS,
            entry(aws::new_provider_assets, transformer(aws::cloud_config_transformer), true),
        ),
        (
            PlatformType::Azure,
            entry(azure::new_provider_assets, transformer(azure::cloud_config_transformer), true),
        ),
        (PlatformType::GCP, entry(gcp::new_provider_assets, None, false)),
        (PlatformType::IBMCloud, entry(ibm::new_provider_assets, None, false)),
        (
            PlatformType::OpenStack,
            entry(
                openstack::new_provider_assets,
                transformer(openstack::cloud_config_transformer),
                false,
            ),
        ),
        (
            PlatformType::PowerVS,
            entry(powervs::new_provider_assets, transformer(powervs::cloud_config_transformer), false),
        ),
        (PlatformType::AlibabaCloud, entry(alibaba::new_provider_assets, None, false)),
        (PlatformType::Nutanix, entry(nutanix::new_provider_assets, None, false)),
        (
            PlatformType::VSphere,
            entry(vsphere::new_provider_assets, transformer(vsphere::cloud_config_transformer), false),
        ),
    ]);

    static ref AZURE_STACK: PlatformEntry = entry(
        azurestack::new_provider_assets,
        transformer(azurestack::cloud_config_transformer),
        false,
    );
}

fn platform_entry(platform_status: &PlatformStatus) -> Option<&'static PlatformEntry> {
    if is_azure_stack_hub(platform_status) {
        return Some(&*AZURE_STACK);
    }
    PLATFORMS.get(&platform_status.type_)
}

pub fn is_platform_supported(platform_status: &PlatformStatus) -> bool {
    platform_entry(platform_status).is_some()
}

pub fn cloud_config_transformer(platform_status: &PlatformStatus) -> Option<CloudConfigTransformer> {
    platform_entry(platform_status).and_then(|e| e.transformer)
}

/// Everything the operator should apply for the configured platform. Unsupported platforms
/// yield no resources.
pub fn get_resources(config: &OperatorConfig) -> OperatorResult<Vec<Resource>> {
    let Some(entry) = platform_entry(&config.platform_status) else {
        warn!(platform = %config.platform_status.type_, "No recognized cloud provider platform found in infrastructure");
        return Ok(Vec::new());
    };
    info!(platform = %config.platform_status.type_, "Rendering cloud controller manager resources");

    let assets = (entry.constructor)(config)?;
    let mut resources = substitution::substitute(config, assets.rendered_resources());
    resources.extend(common::common_resources(config, entry.with_service));
    Ok(resources)
}
