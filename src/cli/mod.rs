//! Command-line interface definitions for the `ironsmith` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `ironsmith` binary.
#[derive(Debug, Parser)]
#[command(
    name = "ironsmith",
    about = "Reserve, deploy, and retire bare-metal instances",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Report which requested instances already exist.
    #[command(
        name = "check",
        about = "Report which requested instances already exist"
    )]
    Check(CheckCommand),
    /// Reserve one node per requested instance.
    #[command(name = "reserve", about = "Reserve one node per requested instance")]
    Reserve(ReserveCommand),
    /// Deploy one instance onto an already-reserved node.
    #[command(
        name = "deploy",
        about = "Deploy one instance onto an already-reserved node"
    )]
    Deploy(DeployCommand),
    /// Wait for a deployment to reach the active state.
    #[command(
        name = "wait",
        about = "Wait for a deployment to reach the active state"
    )]
    Wait(WaitCommand),
    /// Undeploy an instance and release its node.
    #[command(name = "undeploy", about = "Undeploy an instance and release its node")]
    Undeploy(UndeployCommand),
    /// Work with container image manifests.
    #[command(name = "images", about = "Work with container image manifests")]
    Images(ImagesCommand),
}

/// Arguments for the `ironsmith check` subcommand.
#[derive(Args, Debug)]
pub(crate) struct CheckCommand {
    /// YAML file listing the requested instances.
    #[arg(long, value_name = "PATH")]
    pub(crate) file: String,
}

/// Arguments for the `ironsmith reserve` subcommand.
#[derive(Args, Debug)]
pub(crate) struct ReserveCommand {
    /// YAML file listing the requested instances.
    #[arg(long, value_name = "PATH")]
    pub(crate) file: String,
}

/// Arguments for the `ironsmith deploy` subcommand.
#[derive(Args, Debug)]
pub(crate) struct DeployCommand {
    /// YAML file describing the single instance to deploy.
    #[arg(long, value_name = "PATH")]
    pub(crate) file: String,
    /// Reserved node to deploy onto.
    #[arg(long, value_name = "NODE")]
    pub(crate) node: String,
    /// Extra SSH public key file installed on the instance, one key per
    /// line. May be repeated.
    #[arg(long, value_name = "PATH")]
    pub(crate) ssh_key_file: Vec<String>,
}

/// Arguments for the `ironsmith wait` subcommand.
#[derive(Args, Debug)]
pub(crate) struct WaitCommand {
    /// UUID of the instance to wait for.
    #[arg(value_name = "UUID")]
    pub(crate) uuid: String,
    /// Give up after this many seconds.
    #[arg(long, value_name = "SECONDS", default_value_t = 3600)]
    pub(crate) timeout: u64,
}

/// Arguments for the `ironsmith undeploy` subcommand.
#[derive(Args, Debug)]
pub(crate) struct UndeployCommand {
    /// Hostname or UUID of the instance to undeploy.
    #[arg(value_name = "INSTANCE")]
    pub(crate) instance: String,
    /// Give up after this many seconds once teardown starts.
    #[arg(long, value_name = "SECONDS", default_value_t = 1800)]
    pub(crate) timeout: u64,
}

/// Arguments for the `ironsmith images` subcommand family.
#[derive(Args, Debug)]
pub(crate) struct ImagesCommand {
    /// Manifest operation to perform.
    #[command(subcommand)]
    pub(crate) action: ImagesAction,
}

/// Manifest operations.
#[derive(Debug, Subcommand)]
pub(crate) enum ImagesAction {
    /// Render a templated manifest into a concrete image list.
    #[command(
        name = "prepare",
        about = "Render a templated manifest into a concrete image list"
    )]
    Prepare(PrepareCommand),
    /// Build every image listed in plain manifests.
    #[command(name = "build", about = "Build every image listed in plain manifests")]
    Build(BuildCommand),
}

/// Arguments for `ironsmith images prepare`.
#[derive(Args, Debug)]
pub(crate) struct PrepareCommand {
    /// Templated manifest file to render.
    #[arg(long, value_name = "PATH")]
    pub(crate) template: String,
    /// Registry and namespace prefix for rendered image names.
    #[arg(long, value_name = "NAMESPACE")]
    pub(crate) namespace: Option<String>,
    /// Registry and namespace for Ceph images.
    #[arg(long, value_name = "NAMESPACE")]
    pub(crate) ceph_namespace: Option<String>,
    /// Ceph image name.
    #[arg(long, value_name = "NAME")]
    pub(crate) ceph_image: Option<String>,
    /// Ceph image tag.
    #[arg(long, value_name = "TAG")]
    pub(crate) ceph_tag: Option<String>,
    /// Image name prefix.
    #[arg(long, value_name = "PREFIX")]
    pub(crate) name_prefix: Option<String>,
    /// Image name suffix.
    #[arg(long, value_name = "SUFFIX")]
    pub(crate) name_suffix: Option<String>,
    /// Image tag.
    #[arg(long, value_name = "TAG")]
    pub(crate) tag: Option<String>,
    /// Neutron driver selector for template conditionals.
    #[arg(long, value_name = "DRIVER")]
    pub(crate) neutron_driver: Option<String>,
    /// Logging backend selector for template conditionals.
    #[arg(long, value_name = "BACKEND")]
    pub(crate) logging: Option<String>,
    /// Registry rendered images should be pushed to.
    #[arg(long, value_name = "REGISTRY")]
    pub(crate) push_destination: Option<String>,
}

/// Arguments for `ironsmith images build`.
#[derive(Args, Debug)]
pub(crate) struct BuildCommand {
    /// Plain manifest file naming the images to build. May be repeated.
    #[arg(long, value_name = "PATH", required = true)]
    pub(crate) manifest: Vec<String>,
    /// Configuration file forwarded to the build tool. May be repeated.
    #[arg(long, value_name = "PATH")]
    pub(crate) config_file: Vec<String>,
    /// Build tool executable to invoke.
    #[arg(long, value_name = "PROGRAM", default_value = "kolla-build")]
    pub(crate) build_tool: String,
}
