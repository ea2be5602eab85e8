//! Embedded manifest templates and their strict rendering into typed resources.

use minijinja::{Environment, UndefinedBehavior};
use serde_json::{Map, Value};
use tracing::error;

use crate::{
    error::{OperatorError, OperatorResult},
    k8s::{Resource, ResourceKind},
};

/// Values handed to every template of a provider.
pub type TemplateValues = Map<String, Value>;

/// A manifest template compiled into the binary, paired with the type it must decode into.
#[derive(Debug, Clone, Copy)]
pub struct TemplateSource {
    pub kind: ResourceKind,
    pub path: &'static str,
    pub source: &'static str,
}

/// `template_source!(Deployment, "aws/deployment.yaml")` embeds `assets/aws/deployment.yaml`.
#[macro_export]
macro_rules! template_source {
    ($kind:ident, $path:literal) => {
        $crate::cloud::template::TemplateSource {
            kind: $crate::k8s::ResourceKind::$kind,
            path: $path,
            source: include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/", $path)),
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRule {
    /// Key present and not null.
    Required,
    /// Key present and a string.
    RequiredString,
    /// String when present.
    OptionalString,
}

pub fn validate_template_values(
    values: &TemplateValues,
    rules: &[(&str, ValueRule)],
) -> Result<(), String> {
    for (key, rule) in rules {
        let value = values.get(*key).filter(|v| !v.is_null());
        match (rule, value) {
            (ValueRule::Required | ValueRule::RequiredString, None) => {
                return Err(format!("{key}: required"));
            }
            (ValueRule::RequiredString | ValueRule::OptionalString, Some(v)) if !v.is_string() => {
                return Err(format!("{key}: {v} does not validate as string"));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Lists every empty image in declaration order.
pub fn validate_images(provider: &str, images: &[(&str, &str)]) -> OperatorResult<()> {
    let missing: Vec<String> = images
        .iter()
        .filter(|(_, image)| image.is_empty())
        .map(|(field, _)| format!("{field}: non zero value required"))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(OperatorError::MissingImages {
        provider: provider.to_string(),
        fields: missing.join(";"),
    })
}

fn template_env() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env
}

/// Renders each template in order, decodes it strictly and pins its namespace.
pub fn render_templates(
    sources: &[TemplateSource],
    values: &TemplateValues,
    namespace: &str,
) -> OperatorResult<Vec<Resource>> {
    let env = template_env();
    sources
        .iter()
        .map(|source| {
            let mut resource = render(&env, source, values).inspect_err(|e| {
                error!(path = source.path, "Cannot render embedded template: {e}");
            })?;
            resource.meta_mut().namespace = Some(namespace.to_string());
            Ok(resource)
        })
        .collect()
}

fn render(
    env: &Environment<'_>,
    source: &TemplateSource,
    values: &TemplateValues,
) -> OperatorResult<Resource> {
    let render_err = |reason: String| OperatorError::Render {
        path: source.path.to_string(),
        reason,
    };
    let text = env
        .render_str(source.source, values)
        .map_err(|e| render_err(format!("can not render template: {e}")))?;
    decode_strict(source.kind, &text).map_err(render_err)
}

/// Decodes YAML into `kind`, rejecting documents of another kind and fields the typed
/// object does not know about.
pub fn decode_strict(kind: ResourceKind, text: &str) -> Result<Resource, String> {
    let raw: Value = serde_yaml::from_str(text).map_err(|e| e.to_string())?;

    let ar = kind.api_resource();
    let field = |name: &str| raw.get(name).and_then(Value::as_str).unwrap_or_default();
    if field("apiVersion") != ar.api_version || field("kind") != ar.kind {
        return Err(format!(
            "expected {}/{}, found {}/{}",
            ar.api_version,
            ar.kind,
            field("apiVersion"),
            field("kind")
        ));
    }

    let resource = kind.decode(raw.clone()).map_err(|e| e.to_string())?;
    let typed = serde_json::to_value(&resource).map_err(|e| e.to_string())?;
    if let Some(path) = first_unknown_field(&raw, &typed, String::new()) {
        return Err(format!("unknown field \"{path}\""));
    }
    Ok(resource)
}

fn first_unknown_field(raw: &Value, typed: &Value, path: String) -> Option<String> {
    match (raw, typed) {
        (Value::Object(raw), Value::Object(typed)) => raw
            .iter()
            .filter(|(_, v)| !v.is_null())
            .find_map(|(key, value)| {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                match typed.get(key) {
                    None => Some(child),
                    Some(t) => first_unknown_field(value, t, child),
                }
            }),
        (Value::Array(raw), Value::Array(typed)) => raw
            .iter()
            .zip(typed)
            .enumerate()
            .find_map(|(i, (r, t))| first_unknown_field(r, t, format!("{path}[{i}]"))),
        _ => None,
    }
}
