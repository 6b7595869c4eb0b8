//! Bare-metal deployment workflows.
//!
//! [`DeployOrchestrator`] drives the reservation, provisioning, wait and
//! teardown flows against a [`Provisioner`]. The failure policy differs per
//! flow and is deliberate: a failed batch reservation releases every node it
//! reserved, a failed single-node provisioning releases that node, a timed
//! out wait releases nothing so the caller can inspect or retry, and an
//! explicit undeploy propagates teardown failures instead of absorbing
//! them.

mod error;

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::provisioner::{
    Instance, InstanceConfig, Provisioner, ProvisionerError, ProvisionSpec, ReserveSpec,
    UserAccount,
};
use crate::request::{InstanceRequest, NicSpec};
use crate::validate::{validate_batch, ValidationError};

pub use error::{DeployError, DeployErrorKind, ReleaseFailure, ReleaseReport};

/// Default bound for waiting on a deployment to finish.
pub const DEPLOYMENT_WAIT_TIMEOUT: Duration = Duration::from_secs(3600);
/// Default bound for waiting on an undeploy to finish.
pub const UNDEPLOY_WAIT_TIMEOUT: Duration = Duration::from_secs(1800);

const DEFAULT_RESOURCE_CLASS: &str = "baremetal";
const DEFAULT_IMAGE: &str = "baremetal-full";
const DEFAULT_NETWORK: &str = "provisioning";
// One gibibyte below the nominal 50 GiB disk to leave room for partitioning
// and the config drive.
const DEFAULT_ROOT_SIZE_GB: u32 = 49;
const DEFAULT_SSH_USER: &str = "metal-admin";

/// Per-deployment fallbacks applied when a request leaves a field unset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployDefaults {
    /// Resource class used when a request names none.
    pub resource_class: String,
    /// Image used when a request names none.
    pub image: String,
    /// Network for the single default interface.
    pub network: String,
    /// Root partition size in gibibytes.
    pub root_size_gb: u32,
    /// Login name of the administrative account created on each instance.
    pub ssh_user: String,
}

impl Default for DeployDefaults {
    fn default() -> Self {
        Self {
            resource_class: String::from(DEFAULT_RESOURCE_CLASS),
            image: String::from(DEFAULT_IMAGE),
            network: String::from(DEFAULT_NETWORK),
            root_size_gb: DEFAULT_ROOT_SIZE_GB,
            ssh_user: String::from(DEFAULT_SSH_USER),
        }
    }
}

/// One granted reservation: the node held and the request it serves.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Reservation {
    /// Identifier of the reserved node.
    pub node: String,
    /// The normalized request the node was reserved for.
    pub instance: InstanceRequest,
}

/// Result of checking which requested instances already exist.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ExistingInstances {
    /// Instances that already exist, with their live records.
    pub instances: Vec<Instance>,
    /// Requests whose hostnames matched nothing.
    pub not_found: Vec<InstanceRequest>,
}

/// Drives the deployment workflows against one provisioning service.
pub struct DeployOrchestrator<P> {
    provisioner: P,
    defaults: DeployDefaults,
}

impl<P: Provisioner> DeployOrchestrator<P> {
    /// Creates an orchestrator with the given fallbacks.
    #[must_use]
    pub const fn new(provisioner: P, defaults: DeployDefaults) -> Self {
        Self {
            provisioner,
            defaults,
        }
    }

    /// Reserves one node per requested instance, in input order.
    ///
    /// Reservations are sequential so the allocation order matches the
    /// request list and the compensation sweep only ever walks a prefix of
    /// granted reservations. On any failure every node reserved so far is
    /// released and the error carries the sweep's record; no partial success
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when validation or any reservation fails.
    pub async fn reserve_all(
        &self,
        requests: &[InstanceRequest],
    ) -> Result<Vec<Reservation>, DeployError> {
        let validated = validate_batch(requests, &self.defaults.image)?;

        let mut reservations: Vec<Reservation> = Vec::with_capacity(validated.len());
        for instance in validated {
            debug!(
                "trying to reserve a node for instance {}",
                instance.hostname()
            );
            let spec = ReserveSpec {
                resource_class: instance
                    .request()
                    .resource_class
                    .clone()
                    .unwrap_or_else(|| self.defaults.resource_class.clone()),
                capabilities: instance.request().merged_capabilities(),
                candidates: instance.request().candidates(),
                traits: instance.request().traits.clone(),
            };
            match self.provisioner.reserve_node(&spec).await {
                Ok(node) => {
                    info!(
                        "reserved node {node} for instance {}",
                        instance.hostname()
                    );
                    reservations.push(Reservation {
                        node: node.id,
                        instance: instance.into_request(),
                    });
                }
                Err(err) => {
                    error!(
                        "reservation for instance {} failed, cleaning up",
                        instance.hostname()
                    );
                    let held: Vec<String> = reservations
                        .iter()
                        .map(|reservation| reservation.node.clone())
                        .collect();
                    let report = self.release_nodes(&held).await;
                    return Err(DeployError::from(err).with_compensation(report));
                }
            }
        }
        Ok(reservations)
    }

    /// Provisions one instance onto a previously reserved node.
    ///
    /// The instance configuration grants the supplied SSH keys and creates
    /// one administrative account with sudo. On failure the reservation on
    /// `node` is released so another caller can retry against a fresh node.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when validation, source resolution or
    /// provisioning fails.
    pub async fn deploy(
        &self,
        request: &InstanceRequest,
        node: &str,
        ssh_keys: &[String],
    ) -> Result<Instance, DeployError> {
        let validated = validate_batch(std::slice::from_ref(request), &self.defaults.image)?;
        let Some(instance) = validated.into_iter().next() else {
            return Err(DeployError::new(
                DeployErrorKind::Validation,
                "no instance to deploy",
            ));
        };

        let source = instance
            .source()
            .map_err(|source| ValidationError::Source {
                hostname: instance.hostname().to_owned(),
                source,
            })?;

        let mut config = InstanceConfig::new(ssh_keys.to_vec());
        config.add_user(UserAccount {
            name: self.defaults.ssh_user.clone(),
            admin: true,
            sudo: true,
        });

        let spec = ProvisionSpec {
            node: node.to_owned(),
            hostname: instance.hostname().to_owned(),
            config,
            source,
            nics: instance
                .request()
                .nics
                .clone()
                .unwrap_or_else(|| vec![NicSpec::on_network(&self.defaults.network)]),
            root_size_gb: instance
                .request()
                .root_size_gb
                .unwrap_or(self.defaults.root_size_gb),
            swap_size_mb: instance.request().swap_size_mb,
        };

        debug!(
            "starting provisioning of {} on node {node}",
            spec.hostname
        );
        match self.provisioner.provision_node(&spec).await {
            Ok(deployed) => {
                info!("started provisioning of {} on node {node}", spec.hostname);
                Ok(deployed)
            }
            Err(err) => {
                error!(
                    "provisioning of {} on node {node} failed",
                    spec.hostname
                );
                let report = self.release_nodes(std::slice::from_ref(&spec.node)).await;
                Err(DeployError::from(err).with_compensation(report))
            }
        }
    }

    /// Waits until a previously started deployment finishes.
    ///
    /// Nothing is released on failure or timeout; the node stays attached
    /// so the caller can inspect, retry the wait or explicitly undeploy.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when the deployment fails or the timeout
    /// elapses.
    pub async fn wait_for_deployment(
        &self,
        uuid: Uuid,
        timeout: Duration,
    ) -> Result<Instance, DeployError> {
        debug!("waiting for instance {uuid} to provision");
        let uuids = [uuid];
        let mut instances = self
            .provisioner
            .wait_for_provisioning(&uuids, timeout)
            .await?;
        let instance = instances.pop().ok_or_else(|| {
            DeployError::new(
                DeployErrorKind::Service,
                format!("service returned no instance for {uuid}"),
            )
        })?;
        info!("successfully provisioned instance {}", instance.hostname);
        Ok(instance)
    }

    /// Tears down a previously deployed instance, idempotently.
    ///
    /// An instance that cannot be looked up is treated as already deleted.
    /// Teardown failures are not absorbed: an explicit undeploy failing is
    /// actionable and must reach the caller.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when the release itself fails or exceeds the
    /// timeout.
    pub async fn undeploy(&self, ident: &str, timeout: Duration) -> Result<(), DeployError> {
        let instance = match self.provisioner.show_instance(ident).await {
            Ok(instance) => instance,
            Err(err) => {
                warn!("cannot get instance {ident}, assuming already deleted: {err}");
                return Ok(());
            }
        };

        debug!("unprovisioning instance {}", instance.hostname);
        self.provisioner
            .unprovision_node(&instance.node, Some(timeout))
            .await?;
        info!("successfully unprovisioned {}", instance.hostname);
        Ok(())
    }

    /// Splits requested instances into already-deployed and absent ones.
    ///
    /// A lookup that matches a node whose instance carries a different
    /// hostname is a hard error: the match came from the node name, and
    /// proceeding would operate on the wrong machine.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when validation fails, a lookup fails for a
    /// reason other than absence, or a hostname collision is detected.
    pub async fn check_existing(
        &self,
        requests: &[InstanceRequest],
    ) -> Result<ExistingInstances, DeployError> {
        let validated = validate_batch(requests, &self.defaults.image)?;

        let mut existing = ExistingInstances::default();
        for instance in validated {
            match self.provisioner.show_instance(instance.hostname()).await {
                Ok(found) => {
                    if !found.hostname.is_empty() && found.hostname != instance.hostname() {
                        return Err(DeployError::new(
                            DeployErrorKind::Conflict,
                            format!(
                                "requested hostname {} was not found, but the deployed \
                                 node {} has a matching name; rename the node or use a \
                                 different hostname",
                                instance.hostname(),
                                found.uuid
                            ),
                        ));
                    }
                    existing.instances.push(found);
                }
                Err(ProvisionerError::NotFound { .. }) => {
                    existing.not_found.push(instance.into_request());
                }
                Err(err) => {
                    return Err(DeployError::new(
                        DeployErrorKind::Service,
                        format!(
                            "failed to request instance information for hostname {}: {err}",
                            instance.hostname()
                        ),
                    ));
                }
            }
        }

        if !existing.instances.is_empty() {
            info!(
                "found existing instances: {}",
                existing
                    .instances
                    .iter()
                    .map(|found| format!("{} (on node {})", found.hostname, found.uuid))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        if !existing.not_found.is_empty() {
            info!(
                "instance(s) {} do not exist",
                existing
                    .not_found
                    .iter()
                    .filter_map(|request| request.hostname.as_deref())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Ok(existing)
    }

    /// Releases reservations best-effort, never failing.
    ///
    /// Inner failures are logged and collected into the returned report so
    /// they cannot mask whatever primary error triggered the sweep.
    async fn release_nodes(&self, nodes: &[String]) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        for node in nodes {
            debug!("removing reservation from node {node}");
            match self.provisioner.unprovision_node(node, None).await {
                Ok(()) => {
                    info!("removed reservation from node {node}");
                    report.released.push(node.clone());
                }
                Err(err) => {
                    warn!("unable to release node {node}, moving on: {err}");
                    report.failures.push(ReleaseFailure {
                        node: node.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
        report
    }
}
