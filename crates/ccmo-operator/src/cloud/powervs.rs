use std::fmt::Write;

use serde_json::json;

use crate::{
    api::{Infrastructure, Network, PlatformType},
    cloud::{
        render_provider,
        template::{validate_images, TemplateSource, ValueRule},
        CloudProviderAssets,
    },
    config::{FeatureGateAccess, OperatorConfig},
    error::{OperatorError, OperatorResult},
    template_source,
};

const PROVIDER_NAME: &str = "powervs";

const TEMPLATES: &[TemplateSource] = &[template_source!(Deployment, "powervs/deployment.yaml")];

const VALUE_RULES: &[(&str, ValueRule)] = &[
    ("images", ValueRule::Required),
    ("cloudproviderName", ValueRule::RequiredString),
];

pub fn new_provider_assets(config: &OperatorConfig) -> OperatorResult<Box<dyn CloudProviderAssets>> {
    let ccm_image = config.images_reference.cloud_controller_manager_powervs.as_str();
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

/// Appends one `[ServiceOverride "<n>"]` section per custom service endpoint.
pub fn cloud_config_transformer(
    source: &str,
    infra: &Infrastructure,
    _network: Option<&Network>,
    _feature_gates: Option<&FeatureGateAccess>,
) -> OperatorResult<String> {
    let Some(status) = infra
        .platform_status()
        .filter(|ps| ps.type_ == PlatformType::PowerVS)
    else {
        return Err(OperatorError::WrongPlatform(format!(
            "to be {}",
            PlatformType::PowerVS
        )));
    };

    let endpoints = status
        .powervs
        .as_ref()
        .map(|p| p.service_endpoints.as_slice())
        .unwrap_or_default();

    let mut out = source.to_string();
    for (idx, endpoint) in endpoints.iter().enumerate() {
        write!(
            out,
            "\n[ServiceOverride \"{idx}\"]\n\tService = {}\n\tURL = {}\n",
            endpoint.name, endpoint.url
        )
        .map_err(|e| {
            OperatorError::Transform(format!(
                "failed to append service overrides section for cloud.conf: {e}"
            ))
        })?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{
            infrastructure::{InfrastructureStatus, PowerVsPlatformStatus, ServiceEndpoint},
            InfrastructureSpec, PlatformStatus,
        },
        cloud::testing::config_for,
    };

    fn infra(platform: PlatformType, endpoints: Vec<ServiceEndpoint>) -> Infrastructure {
        let mut infra = Infrastructure::new("cluster", InfrastructureSpec::default());
        let mut ps = PlatformStatus::new(platform);
        ps.powervs = Some(PowerVsPlatformStatus {
            service_endpoints: endpoints,
            ..Default::default()
        });
        infra.status = Some(InfrastructureStatus {
            platform_status: Some(ps),
            ..Default::default()
        });
        infra
    }

    const SOURCE: &str = "[global]\nversion = 1.1.0\n";

    #[test]
    fn renders_with_powervs_image() {
        let assets = new_provider_assets(&config_for(PlatformType::PowerVS)).unwrap();
        let rendered = serde_json::to_string(&assets.rendered_resources()[0]).unwrap();
        assert!(rendered.contains("powervs-ccm:test"));
    }

    #[test]
    fn no_endpoints_leaves_source_untouched() {
        let out = cloud_config_transformer(SOURCE, &infra(PlatformType::PowerVS, vec![]), None, None)
            .unwrap();
        assert_eq!(out, SOURCE);
    }

    #[test]
    fn endpoints_become_service_overrides() {
        let endpoints = vec![
            ServiceEndpoint {
                name: "iam".into(),
                url: "https://private.iam.cloud.ibm.com".into(),
            },
            ServiceEndpoint {
                name: "pi".into(),
                url: "https://dal.power-iaas.cloud.ibm.com".into(),
            },
        ];
        let out = cloud_config_transformer(SOURCE, &infra(PlatformType::PowerVS, endpoints), None, None)
            .unwrap();
        assert_eq!(
            out,
            format!(
                "{SOURCE}\n[ServiceOverride \"0\"]\n\tService = iam\n\tURL = https://private.iam.cloud.ibm.com\n\n[ServiceOverride \"1\"]\n\tService = pi\n\tURL = https://dal.power-iaas.cloud.ibm.com\n"
            )
        );
    }

    #[test]
    fn other_platforms_are_rejected() {
        let err = cloud_config_transformer(SOURCE, &infra(PlatformType::IBMCloud, vec![]), None, None)
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid platform, expected to be PowerVS");
    }
}
