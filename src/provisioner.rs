//! Provisioning service abstraction.
//!
//! The [`Provisioner`] trait is the seam between the deployment workflows
//! and the bare-metal provisioning service. The production implementation
//! talks to the service over HTTP (see [`crate::metal`]); tests substitute a
//! scripted double. The facade holds no retry or caching logic; resilience
//! and compensation are the workflows' responsibility.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::request::NicSpec;
use crate::source::ImageSource;

/// Boxed future returned by [`Provisioner`] operations.
pub type ProvisionerFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ProvisionerError>> + Send + 'a>>;

/// Operations the deployment workflows require from the provisioning
/// service.
pub trait Provisioner: Send + Sync {
    /// Reserves one node matching the given constraints.
    ///
    /// The service is the sole arbiter of conflicting claims; a successful
    /// return means the node is exclusively held until released or
    /// provisioned.
    fn reserve_node<'a>(&'a self, spec: &'a ReserveSpec) -> ProvisionerFuture<'a, NodeHandle>;

    /// Starts provisioning an instance onto a previously reserved node.
    ///
    /// Returns the instance record in its initial deploying state; callers
    /// poll [`Provisioner::wait_for_provisioning`] for completion.
    fn provision_node<'a>(&'a self, spec: &'a ProvisionSpec) -> ProvisionerFuture<'a, Instance>;

    /// Looks up an instance by hostname or UUID.
    fn show_instance<'a>(&'a self, ident: &'a str) -> ProvisionerFuture<'a, Instance>;

    /// Blocks until every listed instance finishes provisioning or the
    /// timeout elapses.
    fn wait_for_provisioning<'a>(
        &'a self,
        uuids: &'a [Uuid],
        timeout: Duration,
    ) -> ProvisionerFuture<'a, Vec<Instance>>;

    /// Releases a node, tearing down any instance provisioned on it.
    ///
    /// With `wait` set the call blocks until the teardown completes or the
    /// given bound elapses; with `None` it returns as soon as the service
    /// accepts the request. Used both for real teardown and for releasing a
    /// reservation that never got provisioned.
    fn unprovision_node<'a>(
        &'a self,
        node: &'a str,
        wait: Option<Duration>,
    ) -> ProvisionerFuture<'a, ()>;
}

/// Constraints for reserving one node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReserveSpec {
    /// Resource class the node must belong to.
    pub resource_class: String,
    /// Capabilities the node must match, profile already folded in.
    pub capabilities: BTreeMap<String, serde_json::Value>,
    /// `None` to accept any matching node, or a single-element list pinning
    /// a specific node by name.
    pub candidates: Option<Vec<String>>,
    /// Traits the node must expose.
    pub traits: Vec<String>,
}

/// Everything needed to provision one instance onto a reserved node.
#[derive(Clone, Debug, PartialEq)]
pub struct ProvisionSpec {
    /// Identifier of the reserved node.
    pub node: String,
    /// Hostname the instance will be deployed under.
    pub hostname: String,
    /// First-boot configuration for the instance.
    pub config: InstanceConfig,
    /// Resolved image acquisition method.
    pub source: ImageSource,
    /// Network interfaces to attach.
    pub nics: Vec<NicSpec>,
    /// Root partition size in gibibytes.
    pub root_size_gb: u32,
    /// Swap size in mebibytes, if any.
    pub swap_size_mb: Option<u32>,
}

/// First-boot configuration applied to a provisioned instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct InstanceConfig {
    /// SSH public keys granted to every configured user.
    pub ssh_keys: Vec<String>,
    /// Accounts created on first boot.
    pub users: Vec<UserAccount>,
}

impl InstanceConfig {
    /// Builds a configuration granting the given SSH public keys.
    #[must_use]
    pub const fn new(ssh_keys: Vec<String>) -> Self {
        Self {
            ssh_keys,
            users: Vec::new(),
        }
    }

    /// Adds an account to create on first boot.
    pub fn add_user(&mut self, user: UserAccount) {
        self.users.push(user);
    }
}

/// One account created on a provisioned instance.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UserAccount {
    /// Login name.
    pub name: String,
    /// Whether the account is an administrative account.
    pub admin: bool,
    /// Whether the account gets passwordless sudo.
    pub sudo: bool,
}

/// Opaque identifier of a reserved node.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NodeHandle {
    /// Service-side node identifier.
    pub id: String,
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.id)
    }
}

/// Provisioning state reported by the service for an instance.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    /// Provisioning is still in progress.
    Deploying,
    /// The instance is provisioned and reachable.
    Active,
    /// Provisioning failed on the service side.
    Error,
    /// Any state this client does not model.
    #[serde(other)]
    Unknown,
}

/// An instance as reported by the provisioning service.
///
/// The service owns these records; this client holds transient copies for
/// the duration of a workflow call.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Instance {
    /// Service-assigned instance identifier.
    pub uuid: Uuid,
    /// Hostname the instance was deployed under.
    pub hostname: String,
    /// Identifier of the underlying node resource.
    pub node: String,
    /// Current provisioning state.
    pub state: InstanceState,
    /// Addresses per attached network.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ip_addresses: BTreeMap<String, Vec<String>>,
}

/// Errors surfaced by [`Provisioner`] operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProvisionerError {
    /// The reservation was rejected or no candidate node matched.
    #[error("reservation failed: {message}")]
    Reservation {
        /// Service-supplied failure detail.
        message: String,
    },
    /// Provisioning was rejected or failed on the service side.
    #[error("provisioning failed: {message}")]
    Provision {
        /// Service-supplied failure detail.
        message: String,
    },
    /// Teardown was rejected or failed on the service side.
    #[error("unprovisioning failed: {message}")]
    Unprovision {
        /// Service-supplied failure detail.
        message: String,
    },
    /// The requested instance does not exist.
    #[error("instance {ident} was not found")]
    NotFound {
        /// Hostname or UUID used for the lookup.
        ident: String,
    },
    /// A bounded wait elapsed before the service reached the awaited state.
    #[error("timed out after {}s", .timeout.as_secs())]
    Timeout {
        /// The bound that elapsed.
        timeout: Duration,
    },
    /// Transport failures and any service error without a more specific
    /// kind.
    #[error("provisioning service error: {message}")]
    Service {
        /// Failure detail.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn config_collects_users() {
        let mut config = InstanceConfig::new(vec![String::from("ssh-ed25519 AAAA test")]);
        config.add_user(UserAccount {
            name: String::from("metal-admin"),
            admin: true,
            sudo: true,
        });
        assert_eq!(config.users.len(), 1);
        assert_eq!(
            config.users.first().map(|user| user.name.as_str()),
            Some("metal-admin")
        );
    }

    #[rstest]
    #[case("\"deploying\"", InstanceState::Deploying)]
    #[case("\"active\"", InstanceState::Active)]
    #[case("\"error\"", InstanceState::Error)]
    #[case("\"wiping\"", InstanceState::Unknown)]
    fn instance_state_parses_service_strings(
        #[case] payload: &str,
        #[case] expected: InstanceState,
    ) {
        let state: InstanceState =
            serde_json::from_str(payload).expect("state should deserialize");
        assert_eq!(state, expected);
    }

    #[rstest]
    fn timeout_error_formats_seconds() {
        let err = ProvisionerError::Timeout {
            timeout: Duration::from_secs(3600),
        };
        assert_eq!(err.to_string(), "timed out after 3600s");
    }
}
