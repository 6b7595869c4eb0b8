//! Instance request records.
//!
//! An [`InstanceRequest`] describes one desired bare-metal instance as
//! supplied by the caller, usually deserialized from a YAML or JSON batch
//! file. Requests are ephemeral parameter objects: validation produces
//! normalized copies and nothing here is ever persisted.
//!
//! Unknown keys are rejected during deserialization so a typoed field fails
//! loudly instead of silently deploying with a default.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::{expand_tilde, read_to_string_ambient};

/// Description of one desired bare-metal instance.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceRequest {
    /// Name of a specific candidate node to pin the reservation to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Hostname of the deployed instance. Defaults from `name` during
    /// validation and must be unique within a batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Whole-disk image identifier or URL. Defaults during validation so
    /// source resolution always has a candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Checksum value or checksum-file URL for `image`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_checksum: Option<String>,
    /// Kernel image for partition-style booting. Requires `image_ramdisk`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_kernel: Option<String>,
    /// Ramdisk image for partition-style booting. Requires `image_kernel`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ramdisk: Option<String>,
    /// Node capabilities the reservation must match.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capabilities: BTreeMap<String, serde_json::Value>,
    /// Deployment profile, folded into `capabilities` as `profile` when the
    /// reservation is requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Resource class the reserved node must belong to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_class: Option<String>,
    /// Traits the reserved node must expose.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traits: Vec<String>,
    /// Network interfaces to attach. Defaults to a single interface on the
    /// configured provisioning network when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nics: Option<Vec<NicSpec>>,
    /// Root partition size in gibibytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_size_gb: Option<u32>,
    /// Swap size in mebibytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_size_mb: Option<u32>,
}

impl InstanceRequest {
    /// Returns the candidate list for reservation.
    ///
    /// A request naming a specific node pins the reservation to that single
    /// candidate; otherwise any node matching the other constraints may be
    /// picked by the service. An empty name means "any node", same as no
    /// name at all.
    #[must_use]
    pub fn candidates(&self) -> Option<Vec<String>> {
        self.name
            .clone()
            .filter(|name| !name.is_empty())
            .map(|name| vec![name])
    }

    /// Returns the capabilities with `profile` folded in as a capability.
    #[must_use]
    pub fn merged_capabilities(&self) -> BTreeMap<String, serde_json::Value> {
        let mut capabilities = self.capabilities.clone();
        if let Some(profile) = &self.profile {
            capabilities.insert(
                String::from("profile"),
                serde_json::Value::String(profile.clone()),
            );
        }
        capabilities
    }
}

/// One requested network interface.
///
/// At most one of `network` and `port` may be set: a network lets the
/// service allocate a port, while a port attaches a pre-created one.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NicSpec {
    /// Network to allocate a port on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Pre-created port to attach.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Fixed IP address to request on the allocated port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_ip: Option<String>,
    /// Subnet to allocate the port from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
}

impl NicSpec {
    /// Builds an interface on the named network.
    #[must_use]
    pub fn on_network(network: &str) -> Self {
        Self {
            network: Some(network.to_owned()),
            ..Self::default()
        }
    }
}

/// Loads a batch of instance requests from a YAML file holding a bare
/// sequence of request mappings.
///
/// # Errors
///
/// Returns [`RequestFileError`] when the file cannot be read or parsed.
pub fn load_batch(path: &str) -> Result<Vec<InstanceRequest>, RequestFileError> {
    let text = read_request_file(path)?;
    serde_yaml::from_str(&text).map_err(|err| RequestFileError::Parse {
        path: expand_tilde(path),
        message: err.to_string(),
    })
}

/// Loads a single instance request from a YAML file holding one request
/// mapping.
///
/// # Errors
///
/// Returns [`RequestFileError`] when the file cannot be read or parsed.
pub fn load_single(path: &str) -> Result<InstanceRequest, RequestFileError> {
    let text = read_request_file(path)?;
    serde_yaml::from_str(&text).map_err(|err| RequestFileError::Parse {
        path: expand_tilde(path),
        message: err.to_string(),
    })
}

fn read_request_file(path: &str) -> Result<String, RequestFileError> {
    let expanded = expand_tilde(path);
    read_to_string_ambient(&expanded).map_err(|message| RequestFileError::FileRead {
        path: expanded,
        message,
    })
}

/// Errors raised while loading instance request files.
#[derive(Debug, Error)]
pub enum RequestFileError {
    /// Raised when the file cannot be read from disk.
    #[error("failed to read instance file `{path}`: {message}")]
    FileRead {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when the file contents are not valid request YAML.
    #[error("failed to parse instance file `{path}`: {message}")]
    Parse {
        /// Expanded path that failed to parse.
        path: String,
        /// Parse error reported by the YAML deserializer.
        message: String,
    },
}
