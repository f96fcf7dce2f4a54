//! Deploy configuration (`deploy.json`) and its command line overrides.

use super::{read_config, resolve_dirs};
use crate::control::{self, ControlFile};
use crate::error::ExitError;
use crate::template::MAIN_TEMPLATE;
use crate::{paths, ui};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Region used when neither the command line nor the config names one.
pub const DEFAULT_LOCATION: &str = "eastus";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupSection {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub parameters_file: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageAccountSection {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub container: String,
    /// Resource group holding the storage account.
    #[serde(default, alias = "resourceGroup")]
    pub group_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDeployConfig {
    #[serde(default)]
    dirs: BTreeMap<String, PathBuf>,
    #[serde(default)]
    resource_group: ResourceGroupSection,
    #[serde(default)]
    storage_account: StorageAccountSection,
}

/// Command line values that replace config values when given.
#[derive(Debug, Clone, Default)]
pub struct DeployOverrides {
    pub storage_account: Option<String>,
    pub container: Option<String>,
    pub storage_group: Option<String>,
    pub group_name: Option<String>,
    pub location: Option<String>,
    pub parameters_file: Option<PathBuf>,
}

/// The command a configuration is validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Upload,
    Deploy,
}

#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub app_root: PathBuf,
    pub dirs: BTreeMap<String, PathBuf>,
    pub resource_group: ResourceGroupSection,
    pub storage_account: StorageAccountSection,
    pub control_file: PathBuf,
}

fn replace(value: &mut String, new: Option<&String>) {
    if let Some(new) = new.filter(|v| !v.trim().is_empty()) {
        value.clone_from(new);
    }
}

impl DeployConfig {
    /// Load a deploy configuration, apply overrides and validate it.
    ///
    /// Creates the control file when it does not exist yet.
    pub fn load(
        app_root: &Path,
        file: &Path,
        overrides: &DeployOverrides,
        action: Action,
    ) -> Result<Self> {
        let raw: RawDeployConfig = read_config("Deploy", file)?;
        let config = Self::resolve(app_root, raw, overrides);

        let problems = config.validate(action);
        if !problems.is_empty() {
            ui::error(&format!("Errors have been detected: {}", problems.len()));
            for problem in &problems {
                println!(" - {problem}");
            }
            return Err(ExitError::Validation {
                count: problems.len(),
            }
            .into());
        }

        if !config.resource_group.name.trim().is_empty() {
            ControlFile::ensure(&config.control_file, &config.resource_group.name)?;
        }
        Ok(config)
    }

    fn resolve(app_root: &Path, raw: RawDeployConfig, overrides: &DeployOverrides) -> Self {
        let mut resource_group = raw.resource_group;
        let mut storage_account = raw.storage_account;

        replace(
            &mut storage_account.name,
            overrides.storage_account.as_ref(),
        );
        replace(&mut storage_account.container, overrides.container.as_ref());
        replace(
            &mut storage_account.group_name,
            overrides.storage_group.as_ref(),
        );
        replace(&mut resource_group.name, overrides.group_name.as_ref());
        replace(&mut resource_group.location, overrides.location.as_ref());
        if let Some(parameters) = &overrides.parameters_file {
            resource_group.parameters_file = parameters.to_string_lossy().into_owned();
        }

        Self {
            app_root: app_root.to_path_buf(),
            dirs: resolve_dirs(app_root, raw.dirs),
            resource_group,
            storage_account,
            control_file: control::control_file_path(app_root),
        }
    }

    /// Problems that prevent `action` from running.
    pub fn validate(&self, action: Action) -> Vec<String> {
        let mut problems = Vec::new();

        if action == Action::Deploy && self.resource_group.name.trim().is_empty() {
            problems.push(
                "Resource group name has not been specified. Use -g or --groupname or set in the configuration file"
                    .to_string(),
            );
        }
        if self.storage_account.name.trim().is_empty() {
            problems.push(
                "Storage account name has not been specified. Use -s or --saname or set in the configuration file"
                    .to_string(),
            );
        }
        if self.storage_account.container.trim().is_empty() {
            problems.push(
                "Container name must be specified. Use -n or --container or set in the configuration file"
                    .to_string(),
            );
        }

        problems
    }

    /// Directory whose files are uploaded to blob storage.
    pub fn working_dir(&self) -> Result<&Path> {
        self.dirs
            .get("working")
            .map(PathBuf::as_path)
            .context("Deploy configuration has no \"working\" entry in \"dirs\"")
    }

    pub fn location(&self) -> &str {
        if self.resource_group.location.trim().is_empty() {
            DEFAULT_LOCATION
        } else {
            &self.resource_group.location
        }
    }

    pub fn parameters_path(&self) -> PathBuf {
        if self.resource_group.parameters_file.trim().is_empty() {
            self.app_root.join("local").join("parameters.json")
        } else {
            paths::resolve(&self.app_root, &self.resource_group.parameters_file)
        }
    }

    /// URI of the main template in the configured container.
    pub fn template_uri(&self) -> String {
        azkit::Endpoints::default().blob_url(
            &self.storage_account.name,
            &self.storage_account.container,
            MAIN_TEMPLATE,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SAMPLE: &str = r#"{
        "dirs": { "working": "build/working/production" },
        "resourceGroup": { "name": "chef-ama", "location": "westeurope" },
        "storageAccount": { "name": "chefama", "container": "templates", "groupName": "storage-rg" }
    }"#;

    fn parse(json: &str, overrides: &DeployOverrides) -> DeployConfig {
        let raw: RawDeployConfig = serde_json::from_str(json).unwrap();
        DeployConfig::resolve(Path::new("/repo"), raw, overrides)
    }

    #[test]
    fn test_resolve_sample() {
        let config = parse(SAMPLE, &DeployOverrides::default());
        assert_eq!(
            config.working_dir().unwrap(),
            Path::new("/repo/build/working/production")
        );
        assert_eq!(config.resource_group.name, "chef-ama");
        assert_eq!(config.location(), "westeurope");
        assert_eq!(config.storage_account.group_name, "storage-rg");
        assert_eq!(config.control_file, PathBuf::from("/repo/.deploy"));
        assert!(config.validate(Action::Deploy).is_empty());
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let config = parse(r#"{ "dirs": {} }"#, &DeployOverrides::default());
        assert_eq!(config.resource_group.name, "");
        assert_eq!(config.storage_account.container, "");
        assert_eq!(config.location(), DEFAULT_LOCATION);
        assert!(config.working_dir().is_err());
    }

    #[test]
    fn test_resource_group_alias() {
        let config = parse(
            r#"{ "storageAccount": { "name": "chefama", "container": "c", "resourceGroup": "legacy-rg" } }"#,
            &DeployOverrides::default(),
        );
        assert_eq!(config.storage_account.group_name, "legacy-rg");
    }

    #[test]
    fn test_overrides_replace_config() {
        let overrides = DeployOverrides {
            storage_account: Some("otherama".to_string()),
            container: Some("nightly".to_string()),
            storage_group: Some("other-rg".to_string()),
            group_name: Some("chef-ama-ci".to_string()),
            location: Some("eastus2".to_string()),
            parameters_file: Some(PathBuf::from("ci/parameters.json")),
        };
        let config = parse(SAMPLE, &overrides);

        assert_eq!(config.storage_account.name, "otherama");
        assert_eq!(config.storage_account.container, "nightly");
        assert_eq!(config.storage_account.group_name, "other-rg");
        assert_eq!(config.resource_group.name, "chef-ama-ci");
        assert_eq!(config.location(), "eastus2");
        assert_eq!(
            config.parameters_path(),
            PathBuf::from("/repo/ci/parameters.json")
        );
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let overrides = DeployOverrides {
            storage_account: Some(String::new()),
            ..DeployOverrides::default()
        };
        let config = parse(SAMPLE, &overrides);
        assert_eq!(config.storage_account.name, "chefama");
    }

    #[test]
    fn test_default_parameters_path() {
        let config = parse(SAMPLE, &DeployOverrides::default());
        assert_eq!(
            config.parameters_path(),
            PathBuf::from("/repo/local/parameters.json")
        );
    }

    #[test]
    fn test_template_uri() {
        let config = parse(SAMPLE, &DeployOverrides::default());
        assert_eq!(
            config.template_uri(),
            "https://chefama.blob.core.windows.net/templates/mainTemplate.json"
        );
    }

    #[test]
    fn test_validate_upload() {
        let json = r#"{ "resourceGroup": { "name": "" } }"#;
        let config = parse(json, &DeployOverrides::default());
        let problems = config.validate(Action::Upload);
        assert_eq!(problems.len(), 2);
        assert!(problems[0].starts_with("Storage account name"));
        assert!(problems[1].starts_with("Container name"));
    }

    #[test]
    fn test_validate_deploy_requires_group() {
        let config = parse(
            r#"{ "storageAccount": { "name": "chefama", "container": "templates" } }"#,
            &DeployOverrides::default(),
        );
        assert!(config.validate(Action::Upload).is_empty());
        let problems = config.validate(Action::Deploy);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("Resource group name"));
    }

    #[test]
    fn test_load_validation_failure() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("deploy.json");
        fs::write(&file, r#"{ "dirs": {} }"#).unwrap();

        let overrides = DeployOverrides::default();
        let err = DeployConfig::load(temp.path(), &file, &overrides, Action::Upload).unwrap_err();
        let exit = err.downcast_ref::<ExitError>().unwrap();
        assert_eq!(exit.code(), 1);
        assert!(!temp.path().join(".deploy").exists());
    }

    #[test]
    fn test_load_missing_file() {
        let temp = tempfile::tempdir().unwrap();
        let err = DeployConfig::load(
            temp.path(),
            &temp.path().join("deploy.json"),
            &DeployOverrides::default(),
            Action::Deploy,
        )
        .unwrap_err();
        assert_eq!(err.downcast_ref::<ExitError>().unwrap().code(), 2);
    }

    #[test]
    fn test_load_creates_control_file() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("deploy.json");
        fs::write(&file, SAMPLE).unwrap();

        let overrides = DeployOverrides::default();
        let config = DeployConfig::load(temp.path(), &file, &overrides, Action::Deploy).unwrap();
        let control = ControlFile::load(&config.control_file).unwrap();
        assert_eq!(control.iteration("chef-ama"), Some(1));
    }

    #[test]
    fn test_upload_without_group_skips_control_file() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("deploy.json");
        fs::write(
            &file,
            r#"{ "storageAccount": { "name": "chefama", "container": "templates" } }"#,
        )
        .unwrap();

        let overrides = DeployOverrides::default();
        let config = DeployConfig::load(temp.path(), &file, &overrides, Action::Upload).unwrap();
        assert!(!config.control_file.exists());
    }
}
