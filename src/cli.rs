use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::paths::ENV_ROOT;

#[derive(Parser)]
#[command(name = "amakit")]
#[command(author = "Chef Partner Engineering")]
#[command(version)]
#[command(
    about = "Build, package and deploy the Chef Automate Azure Managed Application",
    long_about = None
)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Application root holding the templates and config files
    #[arg(long, global = true, env = ENV_ROOT, value_name = "DIR")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build the Managed Application package
    Build(BuildArgs),

    /// Upload the working tree to blob storage
    Upload(UploadArgs),

    /// Rotate the resource group and deploy the template
    Deploy(DeployArgs),

    /// Export a JSON object from an environment variable as pipeline variables
    Variables {
        /// Environment variable holding the JSON object
        variable: String,

        /// Prefix for the exported variable names
        #[arg(short, long, default_value = "")]
        prefix: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Build
// ============================================================================

#[derive(Args)]
pub struct BuildArgs {
    /// Build configuration file [default: <root>/build.json]
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: BuildCommand,
}

#[derive(Subcommand)]
pub enum BuildCommand {
    /// Create the build directories
    Init(InitArgs),

    /// Copy files into the production working directory
    Copy,

    /// Inline function code and config into the templates
    Patch(PatchArgs),

    /// Create the staging copy of the production tree
    Staging(StagingArgs),

    /// Zip each working tree
    Package(PackageArgs),

    /// Run init, copy, patch, staging and package in sequence
    Run(RunArgs),
}

#[derive(Args, Clone)]
pub struct InitArgs {
    /// Keep an existing build directory
    #[arg(long)]
    pub no_clean: bool,
}

#[derive(Args, Clone)]
pub struct PatchArgs {
    /// Base URL to set as the mainTemplate baseUrl default
    #[arg(short, long = "baseurl", default_value = "")]
    pub base_url: String,

    /// Working directory override
    #[arg(short, long, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Args, Clone)]
pub struct StagingArgs {
    /// Base URL to set in the staging mainTemplate
    #[arg(short, long, default_value = "")]
    pub url: String,

    /// Working directory override
    #[arg(short, long, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Args, Clone)]
pub struct PackageArgs {
    /// Version embedded in the zip file names
    #[arg(long = "version", value_name = "VERSION", default_value = "0.0.1")]
    pub package_version: String,

    /// Pipeline variable receiving the production zip path
    #[arg(long = "outputvar", value_name = "NAME", default_value = "AMA_ZIP_PATH")]
    pub output_var: String,
}

#[derive(Args, Clone)]
pub struct RunArgs {
    /// Keep an existing build directory
    #[arg(long)]
    pub no_clean: bool,

    /// Base URL for the production mainTemplate
    #[arg(short, long = "baseurl", default_value = "")]
    pub base_url: String,

    /// Base URL for the staging mainTemplate
    #[arg(short, long, default_value = "")]
    pub url: String,

    /// Working directory override
    #[arg(short, long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Version embedded in the zip file names
    #[arg(long = "version", value_name = "VERSION", default_value = "0.0.1")]
    pub package_version: String,

    /// Pipeline variable receiving the production zip path
    #[arg(long = "outputvar", value_name = "NAME", default_value = "AMA_ZIP_PATH")]
    pub output_var: String,
}

impl RunArgs {
    pub fn init(&self) -> InitArgs {
        InitArgs {
            no_clean: self.no_clean,
        }
    }

    pub fn patch(&self) -> PatchArgs {
        PatchArgs {
            base_url: self.base_url.clone(),
            directory: self.directory.clone(),
        }
    }

    pub fn staging(&self) -> StagingArgs {
        StagingArgs {
            url: self.url.clone(),
            directory: self.directory.clone(),
        }
    }

    pub fn package(&self) -> PackageArgs {
        PackageArgs {
            package_version: self.package_version.clone(),
            output_var: self.output_var.clone(),
        }
    }
}

// ============================================================================
// Deploy
// ============================================================================

/// Options shared by the commands that talk to Azure.
#[derive(Args, Clone)]
pub struct AzureArgs {
    /// Subscription to work in
    pub subscription: String,

    /// Deploy configuration file [default: <root>/deploy.json]
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Service principal credentials file [default: ~/.azure/credentials]
    #[arg(short, long = "authfile", value_name = "FILE")]
    pub auth_file: Option<PathBuf>,

    /// Storage account name
    #[arg(short = 's', long = "saname", value_name = "NAME")]
    pub storage_account: Option<String>,

    /// Blob container name
    #[arg(short = 'n', long, value_name = "NAME")]
    pub container: Option<String>,
}

#[derive(Args)]
pub struct UploadArgs {
    #[command(flatten)]
    pub azure: AzureArgs,

    /// Resource group holding the storage account
    #[arg(short = 'G', long = "groupname", value_name = "NAME")]
    pub storage_group: Option<String>,

    /// Number of parallel uploads
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,
}

#[derive(Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub azure: AzureArgs,

    /// Location of the new resource group
    #[arg(short, long)]
    pub location: Option<String>,

    /// Base name of the rotated resource group
    #[arg(short = 'g', long = "groupname", value_name = "NAME")]
    pub group_name: Option<String>,

    /// ARM parameters file [default: <root>/local/parameters.json]
    #[arg(short, long, value_name = "FILE")]
    pub parameters: Option<PathBuf>,
}
