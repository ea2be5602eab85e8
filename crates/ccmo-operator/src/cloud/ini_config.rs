//! INI helpers shared by the cloud config transformers.

use ini::{EscapePolicy, Ini, ParseOption, Properties, WriteOption};
use tracing::debug;

use crate::error::{OperatorError, OperatorResult};

/// Quotes are kept verbatim so section names like `ServiceOverride "0"` survive a round trip.
pub fn load(source: &str) -> OperatorResult<Ini> {
    let opt = ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..Default::default()
    };
    Ini::load_from_str_opt(source, opt).map_err(|e| {
        OperatorError::Transform(format!("failed to parse INI file: {e}"))
    })
}

/// Prefixes a load or parse failure the way every transformer reports it.
pub fn read_error(e: OperatorError) -> OperatorError {
    OperatorError::Transform(format!("failed to read the cloud.conf: {e}"))
}

pub fn write(cfg: &Ini) -> OperatorResult<String> {
    let mut buf = Vec::new();
    let opt = WriteOption {
        escape_policy: EscapePolicy::Nothing,
        ..Default::default()
    };
    cfg.write_to_opt(&mut buf, opt)
        .map_err(|e| OperatorError::Transform(format!("failed to write INI file: {e}")))?;
    String::from_utf8(buf).map_err(|e| OperatorError::Transform(e.to_string()))
}

/// How a declared field is read from and written back to INI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Written only when non-empty.
    Text,
    /// Always written, `false` when absent.
    Flag,
    /// Always written, `0` when absent.
    Number,
    /// Repeated keys, written comma separated when non-empty.
    List,
}

pub type FieldSpec = (&'static str, FieldKind);

/// A section reduced to its declared fields. Keys are matched case-insensitively, unknown
/// keys are dropped and values are kept in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedSection {
    values: Vec<(&'static str, String)>,
}

fn parse_flag(key: &str, value: &str) -> OperatorResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "no" | "off" | "0" => Ok(false),
        "true" | "yes" | "on" | "1" => Ok(true),
        _ => Err(invalid_value(key, value)),
    }
}

fn invalid_value(key: &str, value: &str) -> OperatorError {
    OperatorError::Transform(format!(
        "failed to parse INI file: invalid value {value:?} for {key}"
    ))
}

fn values_of<'p>(props: &[&'p Properties], name: &str) -> Vec<&'p str> {
    props
        .iter()
        .flat_map(|p| p.iter())
        .filter(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.trim())
        .collect()
}

impl TypedSection {
    /// Merges every `props` in order, so a later section or key wins for single valued fields.
    pub fn parse<'a>(
        props: impl IntoIterator<Item = &'a Properties>,
        fields: &[FieldSpec],
    ) -> OperatorResult<Self> {
        let props: Vec<&Properties> = props.into_iter().collect();

        for (key, _) in props.iter().flat_map(|p| p.iter()) {
            if !fields.iter().any(|(name, _)| key.eq_ignore_ascii_case(name)) {
                debug!(key, "Dropping unknown cloud config key");
            }
        }

        let values = fields
            .iter()
            .map(|&(name, kind)| {
                let found = values_of(&props, name);
                let last = found.last().copied().unwrap_or_default();
                let value = match kind {
                    FieldKind::Text => last.to_string(),
                    FieldKind::Flag => parse_flag(name, last)?.to_string(),
                    FieldKind::Number if last.is_empty() => "0".to_string(),
                    FieldKind::Number => last
                        .parse::<i64>()
                        .map_err(|_| invalid_value(name, last))?
                        .to_string(),
                    FieldKind::List => found
                        .iter()
                        .flat_map(|v| v.split(','))
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .collect::<Vec<_>>()
                        .join(","),
                };
                Ok((name, value))
            })
            .collect::<OperatorResult<_>>()?;
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> &str {
        self.values
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or_default()
    }

    /// Only declared fields can be set.
    pub fn set(&mut self, key: &str, value: &str) {
        if let Some((_, v)) = self.values.iter_mut().find(|(name, _)| *name == key) {
            *v = value.to_string();
        }
    }

    /// Appends the non-empty values to `section` of `cfg`.
    pub fn write_into(&self, cfg: &mut Ini, section: &str) {
        for (key, value) in self.values.iter().filter(|(_, v)| !v.is_empty()) {
            cfg.with_section(Some(section)).set(*key, value.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[FieldSpec] = &[
        ("Zone", FieldKind::Text),
        ("Enabled", FieldKind::Flag),
        ("Port", FieldKind::Number),
        ("Families", FieldKind::List),
    ];

    fn typed(source: &str) -> OperatorResult<TypedSection> {
        let cfg = load(source).unwrap();
        TypedSection::parse(cfg.section(Some("Global")), FIELDS)
    }

    #[test]
    fn typed_section_follows_declaration_order() {
        let section = typed("[Global]\nport = 43\nBogus = x\nzone = a\nFamilies = ipv4\nFamilies = ipv6\n").unwrap();

        let mut cfg = Ini::new();
        section.write_into(&mut cfg, "Global");
        let keys: Vec<_> = cfg.section(Some("Global")).unwrap().iter().collect();
        assert_eq!(
            keys,
            vec![("Zone", "a"), ("Enabled", "false"), ("Port", "43"), ("Families", "ipv4,ipv6")]
        );
    }

    #[test]
    fn empty_text_is_not_written() {
        let mut section = typed("[Global]\nZone =\n").unwrap();
        let mut cfg = Ini::new();
        section.write_into(&mut cfg, "Global");
        assert!(!cfg.section(Some("Global")).unwrap().contains_key("Zone"));

        section.set("Zone", "b");
        section.set("Unknown", "c");
        assert_eq!(section.get("Zone"), "b");
        assert_eq!(section.get("Unknown"), "");
    }

    #[test]
    fn malformed_typed_values_are_rejected() {
        let err = typed("[Global]\nEnabled = maybe\n").unwrap_err();
        assert!(matches!(err, OperatorError::Transform(_)));
        assert!(typed("[Global]\nPort = eighty\n").is_err());
        assert_eq!(typed("[Global]\nEnabled = yes\n").unwrap().get("Enabled"), "true");
    }

    #[test]
    fn broken_ini_is_a_transform_error() {
        let err = load("[Global\nfoo=bar").unwrap_err();
        assert!(matches!(err, OperatorError::Transform(_)));
    }
}
