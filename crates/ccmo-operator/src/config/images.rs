use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{OperatorError, OperatorResult};

/// Image pull specs injected by the release payload through the
/// `cloud-controller-manager-images` ConfigMap. Missing keys stay empty.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ImagesReference {
    #[serde(rename = "cloudControllerManagerOperator")]
    pub cloud_controller_manager_operator: String,
    #[serde(rename = "cloudControllerManagerAlibaba")]
    pub cloud_controller_manager_alibaba: String,
    #[serde(rename = "cloudControllerManagerAWS")]
    pub cloud_controller_manager_aws: String,
    #[serde(rename = "cloudControllerManagerAzure")]
    pub cloud_controller_manager_azure: String,
    #[serde(rename = "cloudNodeManagerAzure")]
    pub cloud_node_manager_azure: String,
    #[serde(rename = "cloudControllerManagerGCP")]
    pub cloud_controller_manager_gcp: String,
    #[serde(rename = "cloudControllerManagerIBM")]
    pub cloud_controller_manager_ibm: String,
    #[serde(rename = "cloudControllerManagerOpenStack")]
    pub cloud_controller_manager_openstack: String,
    #[serde(rename = "cloudControllerManagerVSphere")]
    pub cloud_controller_manager_vsphere: String,
    #[serde(rename = "cloudControllerManagerPowerVS")]
    pub cloud_controller_manager_powervs: String,
    #[serde(rename = "cloudControllerManagerNutanix")]
    pub cloud_controller_manager_nutanix: String,
}

impl ImagesReference {
    pub fn from_json_file(path: &Path) -> OperatorResult<Self> {
        let images_err = |reason: String| OperatorError::ImagesFile {
            path: path.display().to_string(),
            reason,
        };
        let data = fs::read(path).map_err(|e| images_err(e.to_string()))?;
        // Going through a map keeps the last value of a repeated key.
        let raw: serde_json::Value =
            serde_json::from_slice(&data).map_err(|e| images_err(e.to_string()))?;
        serde_json::from_value(raw).map_err(|e| images_err(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn unknown_keys_are_ignored_and_missing_keys_default_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"cloudControllerManagerAWS": "quay.io/aws:1", "someOtherImage": "x"}}"#
        )
        .unwrap();

        let images = ImagesReference::from_json_file(file.path()).unwrap();
        assert_eq!(images.cloud_controller_manager_aws, "quay.io/aws:1");
        assert!(images.cloud_controller_manager_azure.is_empty());
    }

    #[test]
    fn duplicate_keys_take_the_last_value() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"cloudControllerManagerGCP": "first", "cloudControllerManagerGCP": "second"}}"#
        )
        .unwrap();

        let images = ImagesReference::from_json_file(file.path()).unwrap();
        assert_eq!(images.cloud_controller_manager_gcp, "second");
    }

    #[test]
    fn missing_or_malformed_file_is_an_images_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImagesReference::from_json_file(&dir.path().join("images.json")).unwrap_err();
        assert!(matches!(err, OperatorError::ImagesFile { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = ImagesReference::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, OperatorError::ImagesFile { .. }));
    }
}
