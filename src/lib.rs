//! Core library for the ironsmith bare-metal deployment toolkit.
//!
//! The crate exposes a provisioner abstraction for reserving and deploying
//! bare-metal nodes, the workflows that drive it with per-flow compensation
//! semantics (reserve → deploy → wait → undeploy), and a secondary component
//! that resolves templated container image manifests for an external build
//! tool.

pub mod config;
pub mod deploy;
pub mod images;
pub mod metal;
pub mod provisioner;
pub mod request;
pub mod source;
pub mod test_support;
pub mod util;
pub mod validate;

pub use config::{ConfigError, MetalConfig};
pub use deploy::{
    DEPLOYMENT_WAIT_TIMEOUT, DeployDefaults, DeployError, DeployErrorKind, DeployOrchestrator,
    ExistingInstances, ReleaseFailure, ReleaseReport, Reservation, UNDEPLOY_WAIT_TIMEOUT,
};
pub use images::{
    CommandOutput, CommandRunner, ImageBuilder, ImageEntry, ImageError, ProcessCommandRunner,
    TemplateVars, load_manifest, logical_image_name, resolve_template, resolve_template_file,
    resolve_template_filtered,
};
pub use metal::{MetalClient, Session};
pub use provisioner::{
    Instance, InstanceConfig, InstanceState, NodeHandle, ProvisionSpec, Provisioner,
    ProvisionerError, ProvisionerFuture, ReserveSpec, UserAccount,
};
pub use request::{InstanceRequest, NicSpec, RequestFileError, load_batch, load_single};
pub use source::{ImageSource, SourceError};
pub use validate::{ValidatedInstance, ValidationError, validate_batch};
