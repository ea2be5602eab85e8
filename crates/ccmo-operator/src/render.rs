//! Offline rendering of the platform manifests, used by the installer to bootstrap a cluster
//! before the operator itself runs.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::info;

use crate::{
    api::Infrastructure,
    cloud, config,
    error::{OperatorError, OperatorResult},
    k8s::Resource,
};

fn check_dir(path: &Path) -> Result<(), String> {
    let meta = fs::metadata(path).map_err(|e| e.to_string())?;
    if !meta.is_dir() {
        return Err(format!("{:?} is not a directory", path));
    }
    Ok(())
}

fn check_file(path: &Path) -> Result<(), String> {
    let meta = fs::metadata(path).map_err(|e| e.to_string())?;
    if !meta.is_file() {
        return Err(format!("{:?} is not a regular file", path));
    }
    if meta.len() == 0 {
        return Err(format!("{:?} is empty", path));
    }
    Ok(())
}

/// Both problems are reported at once.
pub fn validate(dest_dir: &Path, infrastructure_file: &Path) -> OperatorResult<()> {
    let errors: Vec<String> = [
        check_dir(dest_dir).map_err(|e| format!("error reading --dest-dir: {e}")),
        check_file(infrastructure_file)
            .map_err(|e| format!("error reading --cluster-infrastructure-file: {e}")),
    ]
    .into_iter()
    .filter_map(Result::err)
    .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(OperatorError::Runtime(anyhow::anyhow!("[{}]", errors.join(", "))))
    }
}

/// Accepts the Infrastructure object as YAML or JSON.
pub fn read_infrastructure(path: &Path) -> OperatorResult<Infrastructure> {
    let data = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&data)?)
}

fn file_name(index: usize, resource: &Resource) -> String {
    let kind = resource.kind().api_resource().kind.to_lowercase();
    format!("{index:02}-{kind}-{}.yaml", resource.name())
}

/// Writes every resource of the infrastructure's platform into `dest_dir` and returns the
/// written paths in render order.
pub fn render(
    dest_dir: &Path,
    infrastructure_file: &Path,
    images_file: &Path,
    managed_namespace: &str,
) -> OperatorResult<Vec<PathBuf>> {
    validate(dest_dir, infrastructure_file)?;
    let infra = read_infrastructure(infrastructure_file)?;

    let config = config::compose(Some(&infra), None, images_file, managed_namespace, None)?;
    let resources = cloud::get_resources(&config)?;
    info!(platform = %config.platform_name(), count = resources.len(), "Rendering manifests");

    resources
        .iter()
        .enumerate()
        .map(|(index, resource)| {
            let path = dest_dir.join(file_name(index, resource));
            fs::write(&path, serde_yaml::to_string(resource)?)?;
            Ok(path)
        })
        .collect()
}
