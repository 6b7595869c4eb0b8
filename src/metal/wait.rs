//! Polling loops for deployment completion and node release.

use std::time::{Duration, Instant};

use tokio::time::sleep;
use uuid::Uuid;

use crate::provisioner::{Instance, InstanceState, ProvisionerError};

use super::MetalClient;

enum Assessment {
    Ready,
    Failed { uuid: Uuid },
    Pending,
}

fn assess(instances: &[Instance]) -> Assessment {
    if let Some(failed) = instances
        .iter()
        .find(|instance| instance.state == InstanceState::Error)
    {
        return Assessment::Failed { uuid: failed.uuid };
    }
    if instances
        .iter()
        .all(|instance| instance.state == InstanceState::Active)
    {
        return Assessment::Ready;
    }
    Assessment::Pending
}

impl MetalClient {
    /// Polls the listed instances until all are active, any reaches the
    /// error state, or the timeout elapses.
    pub(in crate::metal) async fn poll_deployment(
        &self,
        uuids: &[Uuid],
        timeout: Duration,
    ) -> Result<Vec<Instance>, ProvisionerError> {
        let deadline = Instant::now() + timeout;
        while Instant::now() <= deadline {
            let mut snapshots = Vec::with_capacity(uuids.len());
            for uuid in uuids {
                let ident = uuid.to_string();
                let Some(instance) = self.fetch_instance(&ident).await? else {
                    return Err(ProvisionerError::Provision {
                        message: format!("instance {uuid} disappeared while deploying"),
                    });
                };
                snapshots.push(instance);
            }
            match assess(&snapshots) {
                Assessment::Ready => return Ok(snapshots),
                Assessment::Failed { uuid } => {
                    return Err(ProvisionerError::Provision {
                        message: format!("instance {uuid} reached error state"),
                    });
                }
                Assessment::Pending => sleep(self.poll_interval).await,
            }
        }
        Err(ProvisionerError::Timeout { timeout })
    }

    /// Polls a node until its instance is gone or the timeout elapses.
    pub(in crate::metal) async fn poll_release(
        &self,
        node: &str,
        timeout: Duration,
    ) -> Result<(), ProvisionerError> {
        let deadline = Instant::now() + timeout;
        while Instant::now() <= deadline {
            if self.fetch_node_instance(node).await?.is_none() {
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }
        Err(ProvisionerError::Timeout { timeout })
    }
}
