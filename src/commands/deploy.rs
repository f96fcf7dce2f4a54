//! `amakit upload` and `amakit deploy`.
//!
//! Upload pushes the working tree to a blob container. Deploy rotates the
//! test resource group and deploys the uploaded main template into the new
//! group.

use anyhow::{Context as _, Result, bail};
use azkit::{BlobTarget, Client, Credentials, DeploymentRequest};
use chrono::NaiveDate;
use colored::Colorize;
use rayon::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::Context;
use crate::cli::{AzureArgs, DeployArgs, UploadArgs};
use crate::config::{Action, DeployConfig, DeployOverrides};
use crate::control::{self, ControlFile};
use crate::error::ExitError;
use crate::{fsutil, paths, progress, template, ui};

// ============================================================================
// Entry points
// ============================================================================

pub fn upload(ctx: &Context, args: UploadArgs) -> Result<()> {
    let overrides = DeployOverrides {
        storage_account: args.azure.storage_account.clone(),
        container: args.azure.container.clone(),
        storage_group: args.storage_group.clone(),
        ..DeployOverrides::default()
    };
    let config = load_config(ctx, &args.azure, &overrides, Action::Upload)?;
    let client = connect(ctx, &args.azure)?;

    upload_with(ctx, &config, &client, args.jobs)
}

pub fn deploy(ctx: &Context, args: DeployArgs) -> Result<()> {
    let overrides = DeployOverrides {
        storage_account: args.azure.storage_account.clone(),
        container: args.azure.container.clone(),
        group_name: args.group_name.clone(),
        location: args.location.clone(),
        parameters_file: args.parameters.clone(),
        ..DeployOverrides::default()
    };
    let config = load_config(ctx, &args.azure, &overrides, Action::Deploy)?;
    let parameters = read_parameters(&config)?;
    let client = connect(ctx, &args.azure)?;

    let today = chrono::Utc::now().date_naive();
    rotate_and_deploy(ctx, &config, &client, parameters, today)?;
    Ok(())
}

fn load_config(
    ctx: &Context,
    azure: &AzureArgs,
    overrides: &DeployOverrides,
    action: Action,
) -> Result<DeployConfig> {
    let file = paths::config_file(
        &ctx.root,
        azure.config.as_deref(),
        paths::DEPLOY_CONFIG_FILE,
    );
    DeployConfig::load(&ctx.root, &file, overrides, action)
}

/// Log in with the service principal for the subscription.
fn connect(ctx: &Context, azure: &AzureArgs) -> Result<Client> {
    let auth_file = match &azure.auth_file {
        Some(path) => paths::expand(&path.to_string_lossy()),
        None => paths::default_credentials_file()?,
    };
    let credentials = Credentials::from_file(&auth_file, &azure.subscription)?;

    let spinner = progress::spinner("Logging in to Azure", ctx.quiet);
    match Client::connect(&credentials, &azure.subscription) {
        Ok(client) => {
            let message = format!("Logged in to subscription {}", azure.subscription);
            progress::finish_success(&spinner, &message);
            Ok(client)
        }
        Err(err) => {
            progress::finish_error(&spinner, "Login failed");
            Err(err).context("Could not authenticate with Azure")
        }
    }
}

// ============================================================================
// Upload
// ============================================================================

/// Outcome of an upload run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub failed: Vec<(String, String)>,
}

/// Check the storage resources exist and upload every file of the working
/// tree in parallel.
pub fn upload_with(
    ctx: &Context,
    config: &DeployConfig,
    client: &Client,
    jobs: usize,
) -> Result<()> {
    let storage = &config.storage_account;
    let root = config.working_dir()?;

    ui::header("Storage");
    ui::kv("Resource group", &storage.group_name);
    ui::kv("Account", &storage.name);
    ui::kv("Container", &storage.container);

    // An empty group name cannot be looked up
    let group_exists =
        !storage.group_name.is_empty() && client.resource_group_exists(&storage.group_name)?;
    let account_exists = client.storage_account_exists(&storage.name)?;
    let container_exists = group_exists
        && account_exists
        && client.container_exists(&storage.group_name, &storage.name, &storage.container)?;

    if !(group_exists && account_exists && container_exists) {
        ui::error(&format!(
            "Resource Group \"{}\" exists: {group_exists}",
            storage.group_name
        ));
        ui::error(&format!(
            "Storage Account \"{}\" exists: {account_exists}",
            storage.name
        ));
        ui::error(&format!(
            "Container \"{}\" exists: {container_exists}",
            storage.container
        ));
        ui::error("Errors have occurred, please ensure that all the above resources exist");
        return Err(ExitError::ResourcesMissing.into());
    }

    let target = BlobTarget {
        account: storage.name.clone(),
        container: storage.container.clone(),
        key: client.storage_key(&storage.group_name, &storage.name)?,
    };

    let summary = upload_tree(ctx, client, &target, root, jobs)?;

    println!();
    if summary.failed.is_empty() {
        ui::success(&format!(
            "Uploaded {} files to {}",
            summary.uploaded, target.container
        ));
        return Ok(());
    }

    ui::warn(&format!(
        "Uploaded {}, {} failed",
        summary.uploaded,
        summary.failed.len()
    ));
    if !ctx.quiet {
        for (name, error) in &summary.failed {
            println!("  {} {} - {}", "✗".red(), name, error.dimmed());
        }
    }
    let total = summary.uploaded + summary.failed.len();
    bail!("{} of {total} uploads failed", summary.failed.len())
}

fn upload_tree(
    ctx: &Context,
    client: &Client,
    target: &BlobTarget,
    root: &Path,
    jobs: usize,
) -> Result<UploadSummary> {
    let files = fsutil::list_files(root)?;
    ui::kv("Files", &files.len().to_string());
    ui::kv("Parallel jobs", &jobs.to_string());
    println!();

    let pb = progress::bar(files.len() as u64, ctx.quiet);
    let uploaded = AtomicUsize::new(0);
    let failed: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .context("Could not start upload workers")?;

    pool.install(|| {
        files.par_iter().for_each(|file| {
            let result = fsutil::blob_name(root, file).and_then(|name| {
                pb.set_message(ui::truncate_path(&name, 40));
                let data = fs::read(file)
                    .with_context(|| format!("Could not read {}", file.display()))?;
                client.upload_blob(target, &name, &data)?;
                Ok(name)
            });

            match result {
                Ok(_) => {
                    uploaded.fetch_add(1, Ordering::Relaxed);
                    pb.suspend(|| println!("SUCCESS upload file: {}", file.display()));
                }
                Err(err) => {
                    pb.suspend(|| println!("FAILED to upload: {}: {err:#}", file.display()));
                    failed
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push((file.display().to_string(), format!("{err:#}")));
                }
            }
            pb.inc(1);
        });
    });

    pb.finish_and_clear();

    let mut failed = failed.into_inner().unwrap_or_else(|e| e.into_inner());
    failed.sort();
    Ok(UploadSummary {
        uploaded: uploaded.load(Ordering::Relaxed),
        failed,
    })
}

// ============================================================================
// Deploy
// ============================================================================

/// Resource groups touched by one deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
    pub previous: String,
    pub deleted: bool,
    pub group: String,
    pub deployment: String,
}

/// The `parameters` member of the configured parameters file.
fn read_parameters(config: &DeployConfig) -> Result<Value> {
    let path = config.parameters_path();
    ui::info(&format!("Reading parameters file: {}", path.display()));
    if !path.exists() {
        ui::error("Cannot find parameters file");
        return Err(ExitError::ParametersNotFound { path }.into());
    }

    let doc = template::read_json(&path)?;
    Ok(doc
        .get("parameters")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new())))
}

/// Deployment name for a group on a given day.
pub fn deployment_name(group: &str, date: NaiveDate) -> String {
    format!("{}-{}", group.to_lowercase(), date.format("%Y%m%d"))
}

/// Delete the previous resource group, create the next one and deploy the
/// main template into it, waiting until the deployment finishes.
///
/// The control file is rewritten before the new group is created, so a
/// failed run never reuses a group name.
pub fn rotate_and_deploy(
    ctx: &Context,
    config: &DeployConfig,
    client: &Client,
    parameters: Value,
    date: NaiveDate,
) -> Result<Rotation> {
    let base = &config.resource_group.name;
    let mut control = ControlFile::load(&config.control_file)?;
    let (previous_iteration, next_iteration) = control.advance(base)?;

    let previous = control::group_name(base, previous_iteration);
    ui::header(&format!("Resource Group: {previous}"));

    let deleted = if client.resource_group_exists(&previous)? {
        ui::info("exists, deleting");
        // Deletion continues in Azure; only the request is awaited
        match client.delete_resource_group(&previous) {
            Ok(()) => true,
            Err(err) => {
                ui::warn(&format!("Could not delete {previous}: {err}"));
                false
            }
        }
    } else {
        ui::dim("does not exist");
        false
    };

    control.save(&config.control_file)?;
    log::info!("Iteration for {base} is now {next_iteration}");

    let group = control::group_name(base, next_iteration);
    let location = config.location();
    ui::header(&format!("Creating Resource Group: {group}"));
    ui::kv("Location", location);
    let created = client
        .create_resource_group(&group, location)
        .with_context(|| format!("Failed to create the resource group {group}"))?;
    if let Some(state) = &created.provisioning_state {
        log::debug!("Resource group {group} is {state}");
    }

    let template_uri = config.template_uri();
    let deployment = deployment_name(&group, date);
    ui::info(&format!("Deploying template: {template_uri}"));
    if ctx.verbose > 0 {
        ui::kv("Deployment", &deployment);
    }

    let request = DeploymentRequest::linked(template_uri, parameters);
    client
        .create_deployment(&group, &deployment, &request)
        .with_context(|| format!("Failed to deploy the template into {group}"))?;

    let spinner = progress::spinner(&format!("Waiting for {deployment}"), ctx.quiet);
    match client.wait_for_deployment(&group, &deployment) {
        Ok(_) => spinner.finish_and_clear(),
        Err(err) => {
            progress::finish_error(&spinner, &format!("{deployment} did not succeed"));
            return Err(err)
                .with_context(|| format!("Failed to deploy the template into {group}"));
        }
    }

    ui::success(&format!("Deployment {deployment} succeeded"));
    Ok(Rotation {
        previous,
        deleted,
        group,
        deployment,
    })
}
