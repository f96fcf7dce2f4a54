//! `amakit build`: assemble, patch and package the Managed Application.

use anyhow::{Context as _, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::Context;
use crate::cli::{BuildArgs, BuildCommand, InitArgs, PackageArgs, PatchArgs, StagingArgs};
use crate::config::{BuildConfig, Stage};
use crate::package::{self, BuildInfo};
use crate::template::{self, MAIN_TEMPLATE, UI_DEFINITION};
use crate::{devops, fsutil, paths, ui};

/// Environment variable holding the URL verification API key.
pub const ENV_VERIFY_URL_API_KEY: &str = "VERIFY_URL_API_KEY";

pub fn run(ctx: &Context, args: BuildArgs) -> Result<()> {
    let file = paths::config_file(
        &ctx.root,
        args.config.as_deref(),
        paths::BUILD_CONFIG_FILE,
    );
    let load = |work_dir: Option<&Path>| BuildConfig::load(&ctx.root, &file, work_dir);

    match args.command {
        BuildCommand::Init(init_args) => init(ctx, &load(None)?, &init_args),
        BuildCommand::Copy => copy(ctx, &load(None)?),
        BuildCommand::Patch(patch_args) => {
            let config = load(patch_args.directory.as_deref())?;
            patch(ctx, &config, &patch_args, verify_api_key().as_deref())
        }
        BuildCommand::Staging(staging_args) => {
            let config = load(staging_args.directory.as_deref())?;
            staging(ctx, &config, &staging_args)
        }
        BuildCommand::Package(package_args) => {
            package(ctx, &load(None)?, &package_args, &BuildInfo::from_env())
        }
        BuildCommand::Run(run_args) => {
            let config = load(run_args.directory.as_deref())?;

            ui::step(1, 5, "Initialising build directory");
            init(ctx, &config, &run_args.init())?;
            ui::step(2, 5, "Copying files");
            copy(ctx, &config)?;
            ui::step(3, 5, "Patching templates");
            patch(ctx, &config, &run_args.patch(), verify_api_key().as_deref())?;
            ui::step(4, 5, "Creating staging files");
            staging(ctx, &config, &run_args.staging())?;
            ui::step(5, 5, "Packaging files");
            package(ctx, &config, &run_args.package(), &BuildInfo::from_env())
        }
    }
}

fn verify_api_key() -> Option<String> {
    std::env::var(ENV_VERIFY_URL_API_KEY)
        .ok()
        .filter(|key| !key.is_empty())
}

/// Create the output and working directories, removing the build
/// directory first unless `--no-clean` was given.
pub fn init(ctx: &Context, config: &BuildConfig, args: &InitArgs) -> Result<()> {
    let dirs = &config.dirs;

    if !args.no_clean && dirs.build.exists() {
        ui::info(&format!("Removing build directory: {}", dirs.build.display()));
        fs::remove_dir_all(&dirs.build)
            .with_context(|| format!("Could not remove {}", dirs.build.display()))?;
    }

    if !dirs.output.exists() {
        ui::info(&format!("Creating output directory: {}", dirs.output.display()));
        fs::create_dir_all(&dirs.output)
            .with_context(|| format!("Could not create {}", dirs.output.display()))?;
    }

    for stage in Stage::ALL {
        let dir = dirs.working.get(stage);
        if !dir.exists() {
            ui::info(&format!("Creating {stage} directory: {}", dir.display()));
            fs::create_dir_all(dir)
                .with_context(|| format!("Could not create {}", dir.display()))?;
        }
    }

    if ctx.verbose > 0 {
        for (name, dir) in &dirs.extra {
            ui::kv(name, &dir.display().to_string());
        }
    }

    Ok(())
}

/// Copy the configured files into the production tree.
pub fn copy(_ctx: &Context, config: &BuildConfig) -> Result<()> {
    let production = config.production_dir();

    for file in &config.files {
        let source = paths::resolve(&config.dirs.app_root, &file.source);
        let target = paths::resolve(production, &file.target);

        ui::info(&format!("Copying: {} -> {}", source.display(), target.display()));
        let dest = fsutil::copy_entry(&source, &target)?;
        log::debug!("Copied to {}", dest.display());
    }

    Ok(())
}

/// Inline function code and config into their templates, then patch the
/// main template base URL and the UI definition API key.
///
/// Missing files are reported to the pipeline and counted; the step fails
/// after every function has been processed.
pub fn patch(
    ctx: &Context,
    config: &BuildConfig,
    args: &PatchArgs,
    api_key: Option<&str>,
) -> Result<()> {
    let base_url = args.base_url.as_str();
    let production = config.production_dir();
    let app_root = &config.dirs.app_root;
    let mut problems = 0;

    for function in &config.functions {
        let template_file = paths::resolve(production, &function.template_file);
        ui::info(&format!("Patching File: {}", template_file.display()));

        let config_file = paths::resolve(app_root, &function.config);
        let function_config = if config_file.exists() {
            Some(template::read_json(&config_file)?)
        } else {
            devops::error(&format!(
                "Function configuration file cannot be found: {}",
                config_file.display()
            ));
            problems += 1;
            None
        };

        let mut code = serde_json::Map::new();
        for (name, path) in &function.code_files {
            match encode_code_file(&paths::resolve(app_root, path)) {
                Ok(encoded) => {
                    code.insert(name.clone(), Value::String(encoded));
                }
                Err(message) => {
                    devops::error(&message);
                    problems += 1;
                }
            }
        }

        if !template_file.exists() {
            devops::error(&format!(
                "Template file cannot be found: {}",
                template_file.display()
            ));
            problems += 1;
            continue;
        }

        // Only a fully resolved function is written into its template
        if let Some(function_config) = function_config
            && code.len() == function.code_files.len()
        {
            template::patch_file(&template_file, |doc| {
                template::inline_function(doc, code, function_config)
            })?;
        }
    }

    let main_template = production.join(MAIN_TEMPLATE);
    if main_template.exists() {
        if !base_url.is_empty() {
            ui::info(&format!("Patching main template: {}", main_template.display()));
            template::patch_file(&main_template, |doc| {
                template::set_base_url(doc, base_url)
            })?;
        }
    } else {
        let message = format!("Unable to find main template: {}", main_template.display());
        devops::error(&message);
        problems += 1;
    }

    let ui_definition = production.join(UI_DEFINITION);
    if let Some(key) = api_key
        && ui_definition.exists()
    {
        ui::info(&format!("Patching {UI_DEFINITION} with API key"));
        template::patch_file(&ui_definition, |doc| {
            template::set_verify_api_key(doc, key)
        })?;
    }

    if problems > 0 {
        bail!("Patching failed with {problems} problem(s)");
    }
    if !ctx.quiet {
        ui::success("Templates patched");
    }
    Ok(())
}

/// Base64 content of a function code file, or the problem to report.
fn encode_code_file(path: &Path) -> std::result::Result<String, String> {
    if !path.exists() {
        return Err(format!("Function file cannot be found: {}", path.display()));
    }
    fs::read(path)
        .map(|bytes| STANDARD.encode(bytes))
        .map_err(|err| format!("Function file cannot be read: {}: {err}", path.display()))
}

/// Copy the production tree to staging and point the staging main
/// template at the staging URL.
pub fn staging(ctx: &Context, config: &BuildConfig, args: &StagingArgs) -> Result<()> {
    let url = args.url.as_str();
    let staging = config.staging_dir();
    ui::info("Creating staging files");

    let copied = fsutil::copy_tree(config.production_dir(), staging)?;
    log::info!("Copied {copied} files to {}", staging.display());

    let main_template = staging.join(MAIN_TEMPLATE);
    if !main_template.exists() {
        let message = format!("Unable to find main template: {}", main_template.display());
        devops::error(&message);
        bail!("Staging main template is missing");
    }

    if !url.is_empty() {
        ui::info(&format!("Patching main template: {}", main_template.display()));
        template::patch_file(&main_template, |doc| template::set_base_url(doc, url))?;
    }

    if !ctx.quiet {
        ui::success("Staging files created");
    }
    Ok(())
}

/// Zip each working tree into the output directory and publish the zip
/// paths as pipeline variables.
pub fn package(
    ctx: &Context,
    config: &BuildConfig,
    args: &PackageArgs,
    info: &BuildInfo,
) -> Result<()> {
    ui::info("Packaging files");
    let mut failures = 0;

    for stage in Stage::ALL {
        let working = config.dirs.working.get(stage);
        let file_name = package::package_file_name(
            &config.package.name,
            &args.package_version,
            info,
            stage,
        );
        let zip_path = config.dirs.output.join(&file_name);

        match package::zip_dir(working, &zip_path) {
            Ok(count) => {
                ui::success(&format!("Packaging Successful: {file_name}"));
                if ctx.verbose > 0 {
                    let size = fs::metadata(&zip_path).map(|m| m.len()).unwrap_or(0);
                    ui::kv("Files", &count.to_string());
                    ui::kv("Size", &ui::format_size(size));
                }

                devops::set_variable(
                    &output_variable(&args.output_var, stage),
                    &zip_path.display().to_string(),
                    None,
                );

                // The UI definition carries the API key and the tree is uploaded later
                let ui_definition = working.join(UI_DEFINITION);
                if ui_definition.exists() {
                    let path = ui_definition.display();
                    ui::info(&format!("Removing UI definition file: {path}"));
                    fs::remove_file(&ui_definition)
                        .with_context(|| format!("Could not remove {path}"))?;
                }
            }
            Err(err) => {
                devops::error(&format!("Packaging Failed: {err:#}"));
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("Packaging failed for {failures} working tree(s)");
    }
    Ok(())
}

/// Pipeline variable for a stage's zip path.
pub fn output_variable(base: &str, stage: Stage) -> String {
    match stage {
        Stage::Production => base.to_string(),
        Stage::Staging => format!("{base}_STAGING"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::path::PathBuf;

    fn ctx(root: &Path) -> Context {
        Context {
            verbose: 0,
            quiet: true,
            root: root.to_path_buf(),
        }
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    const MAIN: &str = r#"{
        "$schema": "https://schema.management.azure.com/schemas/2015-01-01/deploymentTemplate.json#",
        "parameters": { "baseUrl": { "type": "string", "defaultValue": "" } }
    }"#;

    const FUNCTIONS: &str = r#"{
        "variables": { "code": {} },
        "resources": [ { "type": "Microsoft.Web/sites/functions", "properties": { "config": {} } } ]
    }"#;

    /// Lay out a small source tree and return its build config.
    fn fixture(root: &Path) -> BuildConfig {
        write(&root.join("src/mainTemplate.json"), MAIN);
        write(
            &root.join("src/createUiDefinition.json"),
            r#"{"parameters":{"outputs":{}}}"#,
        );
        write(&root.join("src/nested/functions.json"), FUNCTIONS);
        write(
            &root.join("functions/config.json"),
            r#"{"bindings":[{"type":"timerTrigger"}]}"#,
        );
        write(
            &root.join("functions/run.csx"),
            "public static void Run() {}",
        );

        let json = r#"{
            "dirs": { "build": "build" },
            "files": [
                { "source": "src/mainTemplate.json", "target": "." },
                { "source": "src/createUiDefinition.json", "target": "." },
                { "source": "src/nested", "target": "nested" }
            ],
            "functions": [
                {
                    "template_file": "nested/functions.json",
                    "config": "functions/config.json",
                    "code_files": { "run.csx": "functions/run.csx" }
                }
            ],
            "package": { "name": "chef-ama" }
        }"#;
        write(&root.join("build.json"), json);
        BuildConfig::load(root, &root.join("build.json"), None).unwrap()
    }

    fn patch_args(base_url: &str) -> PatchArgs {
        PatchArgs {
            base_url: base_url.to_string(),
            directory: None,
        }
    }

    fn staging_args(url: &str) -> StagingArgs {
        StagingArgs {
            url: url.to_string(),
            directory: None,
        }
    }

    fn package_args() -> PackageArgs {
        PackageArgs {
            package_version: "1.0.0".to_string(),
            output_var: "AMA_ZIP_PATH".to_string(),
        }
    }

    #[test]
    fn test_init_creates_directories() {
        let temp = tempfile::tempdir().unwrap();
        let config = fixture(temp.path());
        let stale = config.dirs.build.join("stale.txt");
        write(&stale, "old");

        init(&ctx(temp.path()), &config, &InitArgs { no_clean: false }).unwrap();

        assert!(!stale.exists());
        assert!(config.dirs.output.is_dir());
        assert!(config.production_dir().is_dir());
        assert!(config.staging_dir().is_dir());
    }

    #[test]
    fn test_init_no_clean_keeps_build_dir() {
        let temp = tempfile::tempdir().unwrap();
        let config = fixture(temp.path());
        let kept = config.dirs.build.join("kept.txt");
        write(&kept, "keep");

        init(&ctx(temp.path()), &config, &InitArgs { no_clean: true }).unwrap();
        assert!(kept.exists());
    }

    #[test]
    fn test_copy_files() {
        let temp = tempfile::tempdir().unwrap();
        let config = fixture(temp.path());
        init(&ctx(temp.path()), &config, &InitArgs { no_clean: false }).unwrap();

        copy(&ctx(temp.path()), &config).unwrap();

        let production = config.production_dir();
        assert!(production.join(MAIN_TEMPLATE).is_file());
        assert!(production.join(UI_DEFINITION).is_file());
        assert!(production.join("nested/functions.json").is_file());
    }

    #[test]
    fn test_copy_missing_source_fails() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = fixture(temp.path());
        config.files.push(crate::config::build::FileCopy {
            source: PathBuf::from("src/missing.json"),
            target: PathBuf::from("."),
        });
        init(&ctx(temp.path()), &config, &InitArgs { no_clean: false }).unwrap();

        assert!(copy(&ctx(temp.path()), &config).is_err());
    }

    #[test]
    fn test_patch_inlines_function_and_base_url() {
        let temp = tempfile::tempdir().unwrap();
        let config = fixture(temp.path());
        let ctx = ctx(temp.path());
        init(&ctx, &config, &InitArgs { no_clean: false }).unwrap();
        copy(&ctx, &config).unwrap();

        let args = patch_args("https://chefama.blob.core.windows.net/templates");
        patch(&ctx, &config, &args, Some("k3y")).unwrap();

        let production = config.production_dir();
        let functions = template::read_json(&production.join("nested/functions.json")).unwrap();
        assert_eq!(
            functions["variables"]["code"]["run.csx"],
            STANDARD.encode("public static void Run() {}")
        );
        assert_eq!(
            functions["resources"][0]["properties"]["config"]["bindings"][0]["type"],
            "timerTrigger"
        );

        let main = template::read_json(&production.join(MAIN_TEMPLATE)).unwrap();
        assert_eq!(
            main["parameters"]["baseUrl"]["defaultValue"],
            "https://chefama.blob.core.windows.net/templates"
        );
        let ui_def = template::read_json(&production.join(UI_DEFINITION)).unwrap();
        assert_eq!(ui_def["parameters"]["outputs"]["verifyURLApiKey"], "k3y");

        // Key order of the source template survives the rewrite
        let content = fs::read_to_string(production.join(MAIN_TEMPLATE)).unwrap();
        assert!(content.starts_with("{\n    \"$schema\""));
    }

    #[test]
    fn test_patch_without_base_url_leaves_main_template() {
        let temp = tempfile::tempdir().unwrap();
        let config = fixture(temp.path());
        let ctx = ctx(temp.path());
        init(&ctx, &config, &InitArgs { no_clean: false }).unwrap();
        copy(&ctx, &config).unwrap();

        patch(&ctx, &config, &patch_args(""), None).unwrap();

        let production = config.production_dir();
        let main = template::read_json(&production.join(MAIN_TEMPLATE)).unwrap();
        assert_eq!(main["parameters"]["baseUrl"]["defaultValue"], "");
        let ui_def = template::read_json(&production.join(UI_DEFINITION)).unwrap();
        let outputs = &ui_def["parameters"]["outputs"];
        assert!(outputs.get("verifyURLApiKey").is_none());
    }

    #[test]
    fn test_patch_counts_missing_files() {
        let temp = tempfile::tempdir().unwrap();
        let config = fixture(temp.path());
        let ctx = ctx(temp.path());
        init(&ctx, &config, &InitArgs { no_clean: false }).unwrap();
        copy(&ctx, &config).unwrap();
        fs::remove_file(temp.path().join("functions/run.csx")).unwrap();
        fs::remove_file(config.production_dir().join(MAIN_TEMPLATE)).unwrap();

        let err = patch(&ctx, &config, &patch_args("https://x"), None).unwrap_err();
        assert!(err.to_string().contains("2 problem(s)"));

        // The incomplete function was not written into its template
        let nested = config.production_dir().join("nested/functions.json");
        let functions = template::read_json(&nested).unwrap();
        assert_eq!(functions["variables"]["code"], serde_json::json!({}));
    }

    #[test]
    fn test_unreadable_code_file_counts_as_problem() {
        let temp = tempfile::tempdir().unwrap();
        let config = fixture(temp.path());
        let ctx = ctx(temp.path());
        init(&ctx, &config, &InitArgs { no_clean: false }).unwrap();
        copy(&ctx, &config).unwrap();
        let code_file = temp.path().join("functions/run.csx");
        fs::remove_file(&code_file).unwrap();
        fs::create_dir(&code_file).unwrap();

        let err = patch(&ctx, &config, &patch_args(""), None).unwrap_err();
        assert!(err.to_string().contains("1 problem(s)"));
    }

    #[test]
    fn test_encode_code_file_messages() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("run.csx");
        write(&file, "public static void Run() {}");
        let encoded = encode_code_file(&file).unwrap();
        assert_eq!(encoded, STANDARD.encode("public static void Run() {}"));

        let missing = temp.path().join("missing.csx");
        let message = encode_code_file(&missing).unwrap_err();
        assert!(message.starts_with("Function file cannot be found: "));

        // A directory exists but cannot be read as a file
        let message = encode_code_file(temp.path()).unwrap_err();
        let prefix = format!("Function file cannot be read: {}: ", temp.path().display());
        assert!(message.starts_with(&prefix));
        assert!(message.len() > prefix.len());
    }

    #[test]
    fn test_staging_copies_and_patches() {
        let temp = tempfile::tempdir().unwrap();
        let config = fixture(temp.path());
        let ctx = ctx(temp.path());
        init(&ctx, &config, &InitArgs { no_clean: false }).unwrap();
        copy(&ctx, &config).unwrap();

        let args = staging_args("https://staging.example.com/ama");
        staging(&ctx, &config, &args).unwrap();

        let staged = template::read_json(&config.staging_dir().join(MAIN_TEMPLATE)).unwrap();
        assert_eq!(
            staged["parameters"]["baseUrl"]["defaultValue"],
            "https://staging.example.com/ama"
        );
        let main = config.production_dir().join(MAIN_TEMPLATE);
        let production = template::read_json(&main).unwrap();
        assert_eq!(production["parameters"]["baseUrl"]["defaultValue"], "");
        let staged_functions = config.staging_dir().join("nested/functions.json");
        assert!(staged_functions.is_file());
    }

    #[test]
    fn test_staging_without_main_template_fails() {
        let temp = tempfile::tempdir().unwrap();
        let config = fixture(temp.path());
        let ctx = ctx(temp.path());
        init(&ctx, &config, &InitArgs { no_clean: false }).unwrap();

        assert!(staging(&ctx, &config, &staging_args("")).is_err());
    }

    #[test]
    fn test_package_zips_both_trees() {
        let temp = tempfile::tempdir().unwrap();
        let config = fixture(temp.path());
        let ctx = ctx(temp.path());
        init(&ctx, &config, &InitArgs { no_clean: false }).unwrap();
        copy(&ctx, &config).unwrap();
        staging(&ctx, &config, &staging_args("")).unwrap();

        let info = BuildInfo::from_vars(Some("Schedule"), Some("Main"));
        package(&ctx, &config, &package_args(), &info).unwrap();

        let output = &config.dirs.output;
        let production_zip = output.join("chef-ama-1.0.0-nightly-main-production.zip");
        let staging_zip = output.join("chef-ama-1.0.0-nightly-main-staging.zip");
        assert!(production_zip.is_file());
        assert!(staging_zip.is_file());

        // Zipped trees keep the UI definition; working trees lose it
        let mut archive = zip::ZipArchive::new(File::open(&production_zip).unwrap()).unwrap();
        assert!(archive.by_name(UI_DEFINITION).is_ok());
        assert!(!config.production_dir().join(UI_DEFINITION).exists());
        assert!(!config.staging_dir().join(UI_DEFINITION).exists());
    }

    #[test]
    fn test_package_missing_working_tree_fails() {
        let temp = tempfile::tempdir().unwrap();
        let config = fixture(temp.path());
        fs::create_dir_all(&config.dirs.output).unwrap();

        let info = BuildInfo::from_vars(None, None);
        let ctx = ctx(temp.path());
        let err = package(&ctx, &config, &package_args(), &info).unwrap_err();
        assert!(err.to_string().contains("2 working tree(s)"));
    }

    #[test]
    fn test_output_variable() {
        assert_eq!(
            output_variable("AMA_ZIP_PATH", Stage::Production),
            "AMA_ZIP_PATH"
        );
        assert_eq!(
            output_variable("AMA_ZIP_PATH", Stage::Staging),
            "AMA_ZIP_PATH_STAGING"
        );
    }
}
