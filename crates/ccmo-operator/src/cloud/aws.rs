use std::collections::BTreeMap;

use ini::{Ini, Properties};
use serde_json::json;
use tracing::{debug, info};

use crate::{
    api::{Infrastructure, Network},
    cloud::{
        ini_config::{self, FieldKind, FieldSpec, TypedSection},
        render_provider,
        template::{validate_images, TemplateSource, ValueRule},
        CloudProviderAssets,
    },
    config::{FeatureGateAccess, OperatorConfig},
    error::OperatorResult,
    template_source,
};

const PROVIDER_NAME: &str = "aws";

const TEMPLATES: &[TemplateSource] = &[template_source!(Deployment, "aws/deployment.yaml")];

const VALUE_RULES: &[(&str, ValueRule)] = &[
    ("images", ValueRule::Required),
    ("infrastructureName", ValueRule::RequiredString),
    ("cloudproviderName", ValueRule::RequiredString),
    ("featureGates", ValueRule::OptionalString),
];

/// Bare minimum the AWS CCM needs to start when the cluster has no cloud config.
const DEFAULT_CONFIG: &str = "[Global]\n";

const NLB_SECURITY_GROUP_GATE: &str = "AWSServiceLBNetworkSecurityGroup";

const GLOBAL_SECTION: &str = "Global";
const SERVICE_OVERRIDE_SECTION: &str = "ServiceOverride";

/// `[Global]` fields the AWS CCM understands, in the order it declares them.
const GLOBAL_FIELDS: &[FieldSpec] = &[
    ("Zone", FieldKind::Text),
    ("VPC", FieldKind::Text),
    ("SubnetID", FieldKind::Text),
    ("RouteTableID", FieldKind::Text),
    ("RoleARN", FieldKind::Text),
    ("SourceARN", FieldKind::Text),
    ("KubernetesClusterTag", FieldKind::Text),
    ("KubernetesClusterID", FieldKind::Text),
    ("DisableSecurityGroupIngress", FieldKind::Flag),
    ("ElbSecurityGroup", FieldKind::Text),
    ("NodeIPFamilies", FieldKind::List),
    ("ClusterServiceLoadBalancerHealthProbeMode", FieldKind::Text),
    ("ClusterServiceSharedLoadBalancerHealthProbePort", FieldKind::Number),
    ("ClusterServiceSharedLoadBalancerHealthProbePath", FieldKind::Text),
    ("NLBSecurityGroupMode", FieldKind::Text),
];

const SERVICE_OVERRIDE_FIELDS: &[FieldSpec] = &[
    ("Service", FieldKind::Text),
    ("Region", FieldKind::Text),
    ("URL", FieldKind::Text),
    ("SigningRegion", FieldKind::Text),
    ("SigningMethod", FieldKind::Text),
    ("SigningName", FieldKind::Text),
];

/// The AWS cloud config as the CCM reads it.
struct AwsCloudConfig {
    global: TypedSection,
    /// Keyed by override id.
    service_overrides: BTreeMap<String, TypedSection>,
}

/// `ServiceOverride "1"` yields `1`. Section names match case-insensitively.
fn service_override_id(section: &str) -> Option<String> {
    let (name, id) = section.split_once(char::is_whitespace)?;
    name.eq_ignore_ascii_case(SERVICE_OVERRIDE_SECTION)
        .then(|| id.trim().trim_matches('"').to_string())
}

impl AwsCloudConfig {
    fn parse(source: &str) -> OperatorResult<Self> {
        let cfg = ini_config::load(source)?;

        let global = cfg
            .iter()
            .filter(|(name, _)| name.is_some_and(|n| n.eq_ignore_ascii_case(GLOBAL_SECTION)))
            .map(|(_, props)| props);
        let global = TypedSection::parse(global, GLOBAL_FIELDS)?;

        let mut grouped: BTreeMap<String, Vec<&Properties>> = BTreeMap::new();
        for (name, props) in cfg.iter() {
            match name.and_then(service_override_id) {
                Some(id) => grouped.entry(id).or_default().push(props),
                None if name.is_some_and(|n| !n.eq_ignore_ascii_case(GLOBAL_SECTION)) => {
                    debug!(section = name, "Dropping unknown cloud config section");
                }
                None => {}
            }
        }
        let service_overrides = grouped
            .into_iter()
            .map(|(id, props)| Ok((id, TypedSection::parse(props, SERVICE_OVERRIDE_FIELDS)?)))
            .collect::<OperatorResult<_>>()?;

        Ok(Self {
            global,
            service_overrides,
        })
    }

    /// Sections are sorted by name, which puts `[Global]` ahead of the overrides.
    fn write(&self) -> OperatorResult<String> {
        let mut sections: Vec<(String, &TypedSection)> = self
            .service_overrides
            .iter()
            .map(|(id, section)| (format!("{SERVICE_OVERRIDE_SECTION} \"{id}\""), section))
            .collect();
        sections.push((GLOBAL_SECTION.to_string(), &self.global));
        sections.sort_by(|a, b| a.0.cmp(&b.0));

        let mut cfg = Ini::new();
        for (name, section) in sections {
            section.write_into(&mut cfg, &name);
        }
        ini_config::write(&cfg)
    }
}

pub fn new_provider_assets(config: &OperatorConfig) -> OperatorResult<Box<dyn CloudProviderAssets>> {
    let ccm_image = config.images_reference.cloud_controller_manager_aws.as_str();
    validate_images(PROVIDER_NAME, &[("CloudControllerManager", ccm_image)])?;

    let values = json!({
        "images": { "cloudControllerManager": ccm_image },
        "infrastructureName": config.infrastructure_name,
        "cloudproviderName": config.platform_name(),
        "featureGates": config.feature_gates,
    });
    render_provider(
        PROVIDER_NAME,
        TEMPLATES,
        VALUE_RULES,
        values.as_object().cloned().unwrap_or_default(),
        config,
    )
}

/// Injects OpenShift defaults into the `[Global]` section. An empty source yields a minimal
/// config. Keys the AWS CCM does not know are dropped.
pub fn cloud_config_transformer(
    source: &str,
    _infra: &Infrastructure,
    _network: Option<&Network>,
    feature_gates: Option<&FeatureGateAccess>,
) -> OperatorResult<String> {
    let source = if source.trim().is_empty() {
        DEFAULT_CONFIG
    } else {
        source
    };
    let mut cfg = AwsCloudConfig::parse(source).map_err(ini_config::read_error)?;

    if cfg.global.get("ClusterServiceLoadBalancerHealthProbeMode").is_empty() {
        // Cluster scoped services share the kube-proxy health check served by OVN.
        cfg.global.set("ClusterServiceLoadBalancerHealthProbeMode", "Shared");
    }

    if feature_gates.is_some_and(|g| g.is_enabled(NLB_SECURITY_GROUP_GATE))
        && cfg.global.get("NLBSecurityGroupMode") != "Managed"
    {
        info!("Enforcing cloud provider AWS configuration NLBSecurityGroupMode to Managed");
        cfg.global.set("NLBSecurityGroupMode", "Managed");
    }

    cfg.write()
}
