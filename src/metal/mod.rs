//! HTTP client for the bare-metal provisioning service.
//!
//! [`MetalClient`] implements [`Provisioner`] against the service's REST
//! API. Each trait method maps to one endpoint plus, for the waiting
//! operations, a polling loop over instance lookups. The client carries no
//! retry logic; failed calls surface as [`ProvisionerError`] values for the
//! workflows to compensate on.

mod calls;
mod wait;
mod wire;

use std::sync::LazyLock;
use std::time::Duration;

use crate::provisioner::{
    Instance, NodeHandle, Provisioner, ProvisionerError, ProvisionerFuture, ProvisionSpec,
    ReserveSpec,
};
use uuid::Uuid;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_secs(5);

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Authenticated session against the provisioning service.
#[derive(Clone)]
pub struct Session {
    endpoint: String,
    token: String,
}

impl Session {
    /// Builds a session from the service endpoint and an auth token.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint.trim_end_matches('/'))
    }
}

// Hand-written so the auth token never reaches logs or test output.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Provisioning service client bound to one [`Session`].
#[derive(Clone)]
pub struct MetalClient {
    session: Session,
    poll_interval: Duration,
}

impl MetalClient {
    /// Constructs a client from an authenticated session.
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self {
            session,
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl Provisioner for MetalClient {
    fn reserve_node<'a>(&'a self, spec: &'a ReserveSpec) -> ProvisionerFuture<'a, NodeHandle> {
        Box::pin(async move { self.create_reservation(spec).await })
    }

    fn provision_node<'a>(&'a self, spec: &'a ProvisionSpec) -> ProvisionerFuture<'a, Instance> {
        Box::pin(async move { self.start_provisioning(spec).await })
    }

    fn show_instance<'a>(&'a self, ident: &'a str) -> ProvisionerFuture<'a, Instance> {
        Box::pin(async move {
            self.fetch_instance(ident)
                .await?
                .ok_or_else(|| ProvisionerError::NotFound {
                    ident: ident.to_owned(),
                })
        })
    }

    fn wait_for_provisioning<'a>(
        &'a self,
        uuids: &'a [Uuid],
        timeout: Duration,
    ) -> ProvisionerFuture<'a, Vec<Instance>> {
        Box::pin(async move { self.poll_deployment(uuids, timeout).await })
    }

    fn unprovision_node<'a>(
        &'a self,
        node: &'a str,
        wait: Option<Duration>,
    ) -> ProvisionerFuture<'a, ()> {
        Box::pin(async move {
            self.delete_instance(node).await?;
            if let Some(timeout) = wait {
                self.poll_release(node, timeout).await?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://metal.example.test", "/v1/reservations")]
    #[case("https://metal.example.test/", "/v1/reservations")]
    fn session_joins_endpoint_and_path(#[case] endpoint: &str, #[case] path: &str) {
        let session = Session::new(endpoint, "token");
        assert_eq!(
            session.url(path),
            "https://metal.example.test/v1/reservations"
        );
    }

    #[rstest]
    fn debug_output_redacts_the_token() {
        let session = Session::new("https://metal.example.test", "s3cret");
        let rendered = format!("{session:?}");
        assert!(rendered.contains("https://metal.example.test"));
        assert!(!rendered.contains("s3cret"), "rendered: {rendered}");
        assert!(rendered.contains("<redacted>"));
    }
}
