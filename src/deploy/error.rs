//! Error result type shared by the deployment workflows.
//!
//! Every workflow entry point reports failure as one [`DeployError`]: a
//! closed error kind, a human-readable message and, where a compensation
//! sweep ran, the record of what that sweep did. Compensation outcomes never
//! replace the primary failure; they ride along as diagnostics.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::provisioner::ProvisionerError;
use crate::validate::ValidationError;

/// Closed set of failure kinds reported by the workflows.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum DeployErrorKind {
    /// Request batch failed schema or uniqueness checks.
    Validation,
    /// Image source fields were inconsistent.
    Source,
    /// The provisioning service rejected a reservation.
    Reservation,
    /// Provisioning failed or an instance reached the error state.
    Provision,
    /// Teardown of a provisioned instance failed.
    Unprovision,
    /// A requested instance does not exist.
    NotFound,
    /// A bounded wait elapsed.
    Timeout,
    /// A lookup matched a different resource than requested.
    Conflict,
    /// Transport failures and unclassified service errors.
    Service,
}

impl fmt::Display for DeployErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "ValidationError",
            Self::Source => "SourceError",
            Self::Reservation => "ReservationError",
            Self::Provision => "ProvisionError",
            Self::Unprovision => "UnprovisionError",
            Self::NotFound => "NotFoundError",
            Self::Timeout => "TimeoutError",
            Self::Conflict => "ConflictError",
            Self::Service => "ServiceError",
        };
        formatter.write_str(name)
    }
}

/// Failure returned by a deployment workflow entry point.
#[derive(Clone, Debug, Error, PartialEq, Serialize)]
#[error("{kind}: {message}")]
pub struct DeployError {
    kind: DeployErrorKind,
    message: String,
    #[serde(skip_serializing_if = "ReleaseReport::is_empty")]
    compensation: ReleaseReport,
}

impl DeployError {
    /// Builds an error with no compensation record.
    #[must_use]
    pub fn new(kind: DeployErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            compensation: ReleaseReport::default(),
        }
    }

    /// Attaches the record of a compensation sweep.
    #[must_use]
    pub fn with_compensation(mut self, compensation: ReleaseReport) -> Self {
        self.compensation = compensation;
        self
    }

    /// The failure kind.
    #[must_use]
    pub const fn kind(&self) -> DeployErrorKind {
        self.kind
    }

    /// The failure detail without the kind prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// What the compensation sweep released and what it could not.
    #[must_use]
    pub const fn compensation(&self) -> &ReleaseReport {
        &self.compensation
    }
}

impl From<ValidationError> for DeployError {
    fn from(err: ValidationError) -> Self {
        let kind = match err {
            ValidationError::Source { .. } => DeployErrorKind::Source,
            _ => DeployErrorKind::Validation,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<ProvisionerError> for DeployError {
    fn from(err: ProvisionerError) -> Self {
        let kind = match &err {
            ProvisionerError::Reservation { .. } => DeployErrorKind::Reservation,
            ProvisionerError::Provision { .. } => DeployErrorKind::Provision,
            ProvisionerError::Unprovision { .. } => DeployErrorKind::Unprovision,
            ProvisionerError::NotFound { .. } => DeployErrorKind::NotFound,
            ProvisionerError::Timeout { .. } => DeployErrorKind::Timeout,
            ProvisionerError::Service { .. } => DeployErrorKind::Service,
        };
        let message = match err {
            ProvisionerError::Reservation { message }
            | ProvisionerError::Provision { message }
            | ProvisionerError::Unprovision { message }
            | ProvisionerError::Service { message } => message,
            other @ (ProvisionerError::NotFound { .. } | ProvisionerError::Timeout { .. }) => {
                other.to_string()
            }
        };
        Self::new(kind, message)
    }
}

/// Record of one best-effort release sweep.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ReleaseReport {
    /// Nodes whose reservations were released.
    pub released: Vec<String>,
    /// Nodes the sweep could not release.
    pub failures: Vec<ReleaseFailure>,
}

impl ReleaseReport {
    /// Whether the sweep did nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.released.is_empty() && self.failures.is_empty()
    }
}

/// One node a compensation sweep failed to release.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ReleaseFailure {
    /// Identifier of the node still holding its reservation.
    pub node: String,
    /// Why the release failed.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn display_prefixes_kind_name() {
        let err = DeployError::new(DeployErrorKind::Reservation, "no candidate node matched");
        assert_eq!(
            err.to_string(),
            "ReservationError: no candidate node matched"
        );
    }

    #[rstest]
    fn provisioner_errors_map_to_kinds() {
        let err = DeployError::from(ProvisionerError::Reservation {
            message: String::from("over capacity"),
        });
        assert_eq!(err.kind(), DeployErrorKind::Reservation);
        assert_eq!(err.message(), "over capacity");

        let not_found = DeployError::from(ProvisionerError::NotFound {
            ident: String::from("compute-0"),
        });
        assert_eq!(not_found.kind(), DeployErrorKind::NotFound);
        assert_eq!(not_found.message(), "instance compute-0 was not found");
    }

    #[rstest]
    fn source_violations_keep_their_own_kind() {
        let err = DeployError::from(ValidationError::DuplicateHostname {
            hostname: String::from("compute-0"),
        });
        assert_eq!(err.kind(), DeployErrorKind::Validation);

        let source_err = DeployError::from(ValidationError::Source {
            hostname: String::from("compute-0"),
            source: crate::source::SourceError::Missing,
        });
        assert_eq!(source_err.kind(), DeployErrorKind::Source);
    }

    #[rstest]
    fn compensation_rides_along_without_changing_display() {
        let report = ReleaseReport {
            released: vec![String::from("node-1")],
            failures: vec![ReleaseFailure {
                node: String::from("node-2"),
                message: String::from("status 500"),
            }],
        };
        let err = DeployError::new(DeployErrorKind::Reservation, "over capacity")
            .with_compensation(report.clone());
        assert_eq!(err.to_string(), "ReservationError: over capacity");
        assert_eq!(err.compensation(), &report);
    }
}
