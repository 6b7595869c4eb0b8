//! Container image manifest resolution and delegated image builds.
//!
//! Manifests name the container images a deployment needs. This module
//! renders templated manifests against substitution variables and drives the
//! external build tool over the resolved image set.

use std::ffi::OsString;

use tracing::info;

mod error;
mod manifest;
mod types;

pub use error::ImageError;
pub use manifest::{
    ImageEntry, TemplateVars, load_manifest, logical_image_name, resolve_template,
    resolve_template_file, resolve_template_filtered,
};
pub use types::{CommandOutput, CommandRunner, ProcessCommandRunner};

/// Build tool invoked when none is configured.
pub const DEFAULT_BUILD_TOOL: &str = "kolla-build";

/// Drives the external image build tool over manifest-listed images.
#[derive(Clone, Debug)]
pub struct ImageBuilder<R: CommandRunner> {
    manifest_paths: Vec<String>,
    build_tool: String,
    runner: R,
}

impl ImageBuilder<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    #[must_use]
    pub fn with_process_runner(manifest_paths: Vec<String>) -> Self {
        Self::new(manifest_paths, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> ImageBuilder<R> {
    /// Creates a builder over the given manifest files using the provided
    /// runner and the default build tool.
    #[must_use]
    pub fn new(manifest_paths: Vec<String>, runner: R) -> Self {
        Self {
            manifest_paths,
            build_tool: DEFAULT_BUILD_TOOL.to_owned(),
            runner,
        }
    }

    /// Overrides the build tool executable.
    #[must_use]
    pub fn with_build_tool(mut self, build_tool: impl Into<String>) -> Self {
        self.build_tool = build_tool.into();
        self
    }

    /// Builds every image listed in the configured manifests, passing each
    /// `config_files` entry to the build tool via `--config-file`.
    ///
    /// Images are handed to the tool as bare logical names sorted by full
    /// image reference, with repeated logical names passed once. The child
    /// process inherits the current environment. Returns the tool's captured
    /// stdout.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::FileRead`] or [`ImageError::Manifest`] when a
    /// manifest cannot be loaded, [`ImageError::Spawn`] when the tool cannot
    /// be started, and [`ImageError::CommandFailure`] when it exits non-zero.
    pub fn build_images(&self, config_files: &[String]) -> Result<String, ImageError> {
        let mut entries = Vec::new();
        for path in &self.manifest_paths {
            entries.extend(load_manifest(path)?);
        }
        entries.sort_by(|a, b| a.imagename.cmp(&b.imagename));

        let mut args = Vec::new();
        for config_file in config_files {
            args.push(OsString::from("--config-file"));
            args.push(OsString::from(config_file));
        }
        let mut names: Vec<String> = Vec::with_capacity(entries.len());
        for entry in &entries {
            if let Some(name) = logical_image_name(&entry.imagename) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        args.extend(names.into_iter().map(OsString::from));

        info!("running {} {}", self.build_tool, render_args(&args));
        let output = self.runner.run(&self.build_tool, &args)?;
        if output.is_success() {
            return Ok(output.stdout);
        }

        let status_text = output
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        Err(ImageError::CommandFailure {
            program: self.build_tool.clone(),
            status: output.code,
            status_text,
            stderr: output.stderr,
        })
    }
}

fn render_args(args: &[OsString]) -> String {
    args.iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
