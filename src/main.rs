//! Binary entry point for the ironsmith CLI.

use std::io::{self, Write};
use std::process;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ironsmith::config::read_ssh_key_file;
use ironsmith::{
    ConfigError, DeployError, DeployOrchestrator, ImageBuilder, ImageError, MetalClient,
    MetalConfig, RequestFileError, TemplateVars, load_batch, load_single, resolve_template_file,
};

mod cli;

use cli::{
    BuildCommand, CheckCommand, Cli, DeployCommand, ImagesAction, ImagesCommand, PrepareCommand,
    ReserveCommand, UndeployCommand, WaitCommand,
};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    InstanceFile(#[from] RequestFileError),
    #[error("invalid instance UUID `{uuid}`: {message}")]
    InvalidUuid { uuid: String, message: String },
    #[error("{0}")]
    Deploy(#[from] DeployError),
    #[error("{0}")]
    Image(#[from] ImageError),
    #[error("failed to render output: {0}")]
    Render(String),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Check(command) => check(&command).await,
        Cli::Reserve(command) => reserve(&command).await,
        Cli::Deploy(command) => deploy(&command).await,
        Cli::Wait(command) => wait(&command).await,
        Cli::Undeploy(command) => undeploy(&command).await,
        Cli::Images(ImagesCommand { action }) => match action {
            ImagesAction::Prepare(command) => prepare_images(&command),
            ImagesAction::Build(command) => build_images(&command),
        },
    }
}

fn orchestrator() -> Result<DeployOrchestrator<MetalClient>, CliError> {
    let config = MetalConfig::load_without_cli_args()?;
    let session = config.session()?;
    let defaults = config.as_defaults()?;
    Ok(DeployOrchestrator::new(MetalClient::new(session), defaults))
}

async fn check(command: &CheckCommand) -> Result<(), CliError> {
    let requests = load_batch(&command.file)?;
    let existing = orchestrator()?.check_existing(&requests).await?;
    print_json(&existing)
}

async fn reserve(command: &ReserveCommand) -> Result<(), CliError> {
    let requests = load_batch(&command.file)?;
    let reservations = orchestrator()?.reserve_all(&requests).await?;
    print_json(&reservations)
}

async fn deploy(command: &DeployCommand) -> Result<(), CliError> {
    let request = load_single(&command.file)?;

    let config = MetalConfig::load_without_cli_args()?;
    let mut ssh_keys = config.ssh_keys()?;
    for path in &command.ssh_key_file {
        ssh_keys.extend(read_ssh_key_file(path)?);
    }

    let workflows = DeployOrchestrator::new(MetalClient::new(config.session()?), config.as_defaults()?);
    let instance = workflows.deploy(&request, &command.node, &ssh_keys).await?;
    print_json(&instance)
}

async fn wait(command: &WaitCommand) -> Result<(), CliError> {
    let uuid = Uuid::parse_str(&command.uuid).map_err(|err| CliError::InvalidUuid {
        uuid: command.uuid.clone(),
        message: err.to_string(),
    })?;
    let instance = orchestrator()?
        .wait_for_deployment(uuid, Duration::from_secs(command.timeout))
        .await?;
    print_json(&instance)
}

async fn undeploy(command: &UndeployCommand) -> Result<(), CliError> {
    orchestrator()?
        .undeploy(&command.instance, Duration::from_secs(command.timeout))
        .await?;
    print_json(&serde_json::json!({ "undeployed": command.instance.clone() }))
}

fn prepare_images(command: &PrepareCommand) -> Result<(), CliError> {
    let defaults = TemplateVars::default();
    let vars = TemplateVars {
        namespace: command.namespace.clone().unwrap_or(defaults.namespace),
        ceph_namespace: command
            .ceph_namespace
            .clone()
            .unwrap_or(defaults.ceph_namespace),
        ceph_image: command.ceph_image.clone().unwrap_or(defaults.ceph_image),
        ceph_tag: command.ceph_tag.clone().unwrap_or(defaults.ceph_tag),
        name_prefix: command.name_prefix.clone().unwrap_or(defaults.name_prefix),
        name_suffix: command.name_suffix.clone().unwrap_or(defaults.name_suffix),
        tag: command.tag.clone().unwrap_or(defaults.tag),
        neutron_driver: command.neutron_driver.clone(),
        logging: command.logging.clone().unwrap_or(defaults.logging),
        push_destination: command.push_destination.clone(),
    };
    let entries = resolve_template_file(&command.template, &vars)?;
    print_json(&entries)
}

fn build_images(command: &BuildCommand) -> Result<(), CliError> {
    let builder = ImageBuilder::with_process_runner(command.manifest.clone())
        .with_build_tool(&command.build_tool);
    let stdout = builder.build_images(&command.config_file)?;
    write!(io::stdout(), "{stdout}").ok();
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|err| CliError::Render(err.to_string()))?;
    writeln!(io::stdout(), "{rendered}").ok();
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
