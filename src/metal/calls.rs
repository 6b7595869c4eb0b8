//! Endpoint calls for the provisioning service client.

use reqwest::StatusCode;

use crate::provisioner::{Instance, NodeHandle, ProvisionSpec, ProvisionerError, ReserveSpec};

use super::wire::{ErrorBody, InstanceEnvelope, ProvisionRequest, ReservationRequest};
use super::{HTTP_CLIENT, MetalClient};

impl MetalClient {
    /// Reserves one node matching the given constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionerError::Reservation`] when the service rejects
    /// the request and [`ProvisionerError::Service`] on transport failures.
    pub(in crate::metal) async fn create_reservation(
        &self,
        spec: &ReserveSpec,
    ) -> Result<NodeHandle, ProvisionerError> {
        let url = self.session.url("/v1/reservations");
        let payload = ReservationRequest::from(spec);

        let response = HTTP_CLIENT
            .post(&url)
            .header("X-Auth-Token", &self.session.token)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ProvisionerError::Service {
                message: err.to_string(),
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| ProvisionerError::Service {
                message: err.to_string(),
            })?;

        if status.is_success() {
            let parsed: super::wire::ReservationResponse = serde_json::from_slice(&body)
                .map_err(|err| ProvisionerError::Service {
                    message: err.to_string(),
                })?;
            return Ok(parsed.node);
        }

        Err(ProvisionerError::Reservation {
            message: error_message(status, &body),
        })
    }

    /// Starts provisioning an instance onto a reserved node.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionerError::Provision`] when the service rejects the
    /// request and [`ProvisionerError::Service`] on transport failures.
    pub(in crate::metal) async fn start_provisioning(
        &self,
        spec: &ProvisionSpec,
    ) -> Result<Instance, ProvisionerError> {
        let url = self.session.url(&format!("/v1/nodes/{}/instance", spec.node));
        let payload = ProvisionRequest::from(spec);

        let response = HTTP_CLIENT
            .post(&url)
            .header("X-Auth-Token", &self.session.token)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ProvisionerError::Service {
                message: err.to_string(),
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| ProvisionerError::Service {
                message: err.to_string(),
            })?;

        if status.is_success() {
            let parsed: InstanceEnvelope =
                serde_json::from_slice(&body).map_err(|err| ProvisionerError::Service {
                    message: err.to_string(),
                })?;
            return Ok(parsed.instance);
        }

        Err(ProvisionerError::Provision {
            message: error_message(status, &body),
        })
    }

    /// Looks up an instance by hostname or UUID.
    ///
    /// Returns `Ok(None)` when the service reports the instance as absent,
    /// letting callers distinguish "gone" from a failed lookup.
    pub(in crate::metal) async fn fetch_instance(
        &self,
        ident: &str,
    ) -> Result<Option<Instance>, ProvisionerError> {
        let url = self.session.url(&format!("/v1/instances/{ident}"));
        self.fetch_instance_at(&url).await
    }

    /// Looks up the instance currently provisioned on a node, if any.
    pub(in crate::metal) async fn fetch_node_instance(
        &self,
        node: &str,
    ) -> Result<Option<Instance>, ProvisionerError> {
        let url = self.session.url(&format!("/v1/nodes/{node}/instance"));
        self.fetch_instance_at(&url).await
    }

    async fn fetch_instance_at(&self, url: &str) -> Result<Option<Instance>, ProvisionerError> {
        let response = HTTP_CLIENT
            .get(url)
            .header("X-Auth-Token", &self.session.token)
            .send()
            .await
            .map_err(|err| ProvisionerError::Service {
                message: err.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| ProvisionerError::Service {
                message: err.to_string(),
            })?;

        if status.is_success() {
            let parsed: InstanceEnvelope =
                serde_json::from_slice(&body).map_err(|err| ProvisionerError::Service {
                    message: err.to_string(),
                })?;
            return Ok(Some(parsed.instance));
        }

        Err(ProvisionerError::Service {
            message: error_message(status, &body),
        })
    }

    /// Asks the service to release a node and tear down its instance.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionerError::Unprovision`] when the service rejects
    /// the request and [`ProvisionerError::Service`] on transport failures.
    pub(in crate::metal) async fn delete_instance(
        &self,
        node: &str,
    ) -> Result<(), ProvisionerError> {
        let url = self.session.url(&format!("/v1/nodes/{node}/instance"));

        let response = HTTP_CLIENT
            .delete(&url)
            .header("X-Auth-Token", &self.session.token)
            .send()
            .await
            .map_err(|err| ProvisionerError::Service {
                message: err.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| ProvisionerError::Service {
                message: err.to_string(),
            })?;

        Err(ProvisionerError::Unprovision {
            message: error_message(status, &body),
        })
    }
}

/// Formats a failed response into a one-line message, preferring the
/// service's structured error body over raw text.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
        return format!("status {}: {}", status.as_u16(), parsed.message);
    }
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {trimmed}", status.as_u16())
    }
}
