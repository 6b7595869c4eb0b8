//! Batch validation and normalization of instance requests.
//!
//! Validation never mutates the caller's records. Each request is copied,
//! defaulted (hostname from node name, image from the configured default)
//! and checked, and the normalized copies are handed back as
//! [`ValidatedInstance`] values. Any violation aborts the whole batch; no
//! partially validated result is ever returned.

use thiserror::Error;

use crate::request::InstanceRequest;
use crate::source::{ImageSource, SourceError};

const HOSTNAME_MIN_LEN: usize = 2;
const HOSTNAME_MAX_LEN: usize = 255;
const MIN_ROOT_SIZE_GB: u32 = 4;
const MIN_SWAP_SIZE_MB: u32 = 64;

/// A normalized instance request with a guaranteed hostname.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedInstance {
    hostname: String,
    request: InstanceRequest,
}

impl ValidatedInstance {
    /// Hostname the instance will be deployed under.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// The normalized request record.
    #[must_use]
    pub const fn request(&self) -> &InstanceRequest {
        &self.request
    }

    /// Consumes the wrapper and returns the normalized request.
    #[must_use]
    pub fn into_request(self) -> InstanceRequest {
        self.request
    }

    /// Resolves the image source from the normalized record.
    ///
    /// Deployment resolves the source again right before provisioning
    /// rather than caching the validation-time result, because callers may
    /// hold requests across validation runs with different defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the record's image fields are
    /// inconsistent.
    pub fn source(&self) -> Result<ImageSource, SourceError> {
        ImageSource::detect(
            self.request.image.as_deref(),
            self.request.image_checksum.as_deref(),
            self.request.image_kernel.as_deref(),
            self.request.image_ramdisk.as_deref(),
        )
    }
}

/// Validates a batch of instance requests and returns normalized copies.
///
/// Normalization fills `hostname` from `name` and `image` from
/// `default_image`. The batch is then checked for resolvable image sources,
/// uniqueness of hostnames and node names, and structural bounds (hostname
/// length, size minimums, interface shape). Uniqueness is checked before the
/// bounds so a duplicated hostname is always reported as a duplicate.
///
/// # Errors
///
/// Returns [`ValidationError`] describing the first violation found; the
/// caller must discard the batch on error.
pub fn validate_batch(
    requests: &[InstanceRequest],
    default_image: &str,
) -> Result<Vec<ValidatedInstance>, ValidationError> {
    let normalized: Vec<ValidatedInstance> = requests
        .iter()
        .enumerate()
        .map(|(index, request)| normalize(index, request, default_image))
        .collect::<Result<_, _>>()?;

    let mut seen_hostnames = Vec::new();
    let mut seen_names = Vec::new();
    for instance in &normalized {
        instance
            .source()
            .map_err(|source| ValidationError::Source {
                hostname: instance.hostname.clone(),
                source,
            })?;
        if seen_hostnames.contains(&instance.hostname) {
            return Err(ValidationError::DuplicateHostname {
                hostname: instance.hostname.clone(),
            });
        }
        seen_hostnames.push(instance.hostname.clone());
        if let Some(name) = instance
            .request
            .name
            .clone()
            .filter(|name| !name.is_empty())
        {
            if seen_names.contains(&name) {
                return Err(ValidationError::DuplicateName { name });
            }
            seen_names.push(name);
        }
    }

    for instance in &normalized {
        check_bounds(&instance.hostname, &instance.request)?;
    }
    Ok(normalized)
}

fn normalize(
    index: usize,
    original: &InstanceRequest,
    default_image: &str,
) -> Result<ValidatedInstance, ValidationError> {
    let mut request = original.clone();
    // An empty hostname counts as absent and defaults from the node name.
    if request.hostname.as_deref().is_none_or(str::is_empty) {
        request.hostname = request.name.clone();
    }
    let Some(hostname) = request.hostname.clone().filter(|name| !name.is_empty()) else {
        return Err(ValidationError::MissingHostname { index });
    };
    if request.image.is_none() {
        request.image = Some(default_image.to_owned());
    }
    Ok(ValidatedInstance { hostname, request })
}

fn check_bounds(hostname: &str, request: &InstanceRequest) -> Result<(), ValidationError> {
    let length = hostname.chars().count();
    if !(HOSTNAME_MIN_LEN..=HOSTNAME_MAX_LEN).contains(&length) {
        return Err(ValidationError::HostnameLength {
            hostname: hostname.to_owned(),
        });
    }
    if let Some(size) = request.root_size_gb {
        if size < MIN_ROOT_SIZE_GB {
            return Err(ValidationError::RootSizeTooSmall {
                hostname: hostname.to_owned(),
                requested: size,
            });
        }
    }
    if let Some(size) = request.swap_size_mb {
        if size < MIN_SWAP_SIZE_MB {
            return Err(ValidationError::SwapSizeTooSmall {
                hostname: hostname.to_owned(),
                requested: size,
            });
        }
    }
    for nic in request.nics.as_deref().unwrap_or_default() {
        if nic.network.is_some() && nic.port.is_some() {
            return Err(ValidationError::NicShape {
                hostname: hostname.to_owned(),
            });
        }
    }
    Ok(())
}

/// Errors raised while validating a batch of instance requests.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ValidationError {
    /// Raised when a request supplies neither a hostname nor a node name to
    /// default it from.
    #[error("instance at index {index} has neither hostname nor name")]
    MissingHostname {
        /// Position of the offending request in the batch.
        index: usize,
    },
    /// Raised when a hostname falls outside the permitted length bounds.
    #[error(
        "hostname {hostname:?} must be between {HOSTNAME_MIN_LEN} and \
         {HOSTNAME_MAX_LEN} characters"
    )]
    HostnameLength {
        /// The offending hostname.
        hostname: String,
    },
    /// Raised when two requests in a batch share a hostname.
    #[error("hostname {hostname} is used more than once")]
    DuplicateHostname {
        /// The duplicated hostname.
        hostname: String,
    },
    /// Raised when two requests in a batch pin the same node name.
    #[error("node {name} is requested more than once")]
    DuplicateName {
        /// The duplicated node name.
        name: String,
    },
    /// Raised when a root partition size is below the minimum.
    #[error(
        "root size of {requested} GiB for {hostname} is below the minimum \
         of {MIN_ROOT_SIZE_GB} GiB"
    )]
    RootSizeTooSmall {
        /// Hostname of the offending request.
        hostname: String,
        /// Requested root size in gibibytes.
        requested: u32,
    },
    /// Raised when a swap size is below the minimum.
    #[error(
        "swap size of {requested} MiB for {hostname} is below the minimum \
         of {MIN_SWAP_SIZE_MB} MiB"
    )]
    SwapSizeTooSmall {
        /// Hostname of the offending request.
        hostname: String,
        /// Requested swap size in mebibytes.
        requested: u32,
    },
    /// Raised when a network interface sets both `network` and `port`.
    #[error("interface for {hostname} must set at most one of network and port")]
    NicShape {
        /// Hostname of the offending request.
        hostname: String,
    },
    /// Raised when a request's image fields cannot be resolved to a source.
    #[error("image source for {hostname} is invalid: {source}")]
    Source {
        /// Hostname of the offending request.
        hostname: String,
        /// The underlying resolution failure.
        #[source]
        source: SourceError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::NicSpec;
    use rstest::{fixture, rstest};

    const DEFAULT_IMAGE: &str = "metal-full";

    #[fixture]
    fn named_request() -> InstanceRequest {
        InstanceRequest {
            name: Some(String::from("node-1")),
            ..InstanceRequest::default()
        }
    }

    #[rstest]
    fn defaults_hostname_and_image(named_request: InstanceRequest) {
        let validated = validate_batch(&[named_request.clone()], DEFAULT_IMAGE)
            .expect("named request should validate");
        let instance = validated.first().expect("one instance expected");
        assert_eq!(instance.hostname(), "node-1");
        assert_eq!(instance.request().image.as_deref(), Some(DEFAULT_IMAGE));
        // The caller's record is untouched.
        assert_eq!(named_request.hostname, None);
        assert_eq!(named_request.image, None);
    }

    #[rstest]
    fn explicit_hostname_wins_over_name() {
        let request = InstanceRequest {
            name: Some(String::from("node-1")),
            hostname: Some(String::from("compute-0")),
            ..InstanceRequest::default()
        };
        let validated =
            validate_batch(&[request], DEFAULT_IMAGE).expect("request should validate");
        assert_eq!(
            validated.first().map(ValidatedInstance::hostname),
            Some("compute-0")
        );
    }

    #[rstest]
    fn empty_hostname_defaults_from_name() {
        let request = InstanceRequest {
            name: Some(String::from("node-1")),
            hostname: Some(String::new()),
            ..InstanceRequest::default()
        };
        let validated =
            validate_batch(&[request], DEFAULT_IMAGE).expect("request should validate");
        assert_eq!(
            validated.first().map(ValidatedInstance::hostname),
            Some("node-1")
        );
    }

    #[rstest]
    fn validation_is_idempotent(named_request: InstanceRequest) {
        let first = validate_batch(&[named_request], DEFAULT_IMAGE).expect("first pass");
        let requests: Vec<InstanceRequest> = first
            .iter()
            .map(|instance| instance.request().clone())
            .collect();
        let second = validate_batch(&requests, DEFAULT_IMAGE).expect("second pass");
        assert_eq!(first, second);
    }

    #[rstest]
    fn duplicate_hostname_reported_before_length_bounds() {
        let batch = vec![
            InstanceRequest {
                hostname: Some(String::from("a")),
                ..InstanceRequest::default()
            },
            InstanceRequest {
                hostname: Some(String::from("a")),
                ..InstanceRequest::default()
            },
        ];
        let err = validate_batch(&batch, DEFAULT_IMAGE).expect_err("duplicates should fail");
        assert_eq!(
            err,
            ValidationError::DuplicateHostname {
                hostname: String::from("a")
            }
        );
        assert!(err.to_string().contains("a is used more than once"));
    }

    #[rstest]
    fn rejects_duplicate_name() {
        let batch = vec![
            InstanceRequest {
                name: Some(String::from("node-1")),
                hostname: Some(String::from("compute-0")),
                ..InstanceRequest::default()
            },
            InstanceRequest {
                name: Some(String::from("node-1")),
                hostname: Some(String::from("compute-1")),
                ..InstanceRequest::default()
            },
        ];
        let err = validate_batch(&batch, DEFAULT_IMAGE).expect_err("duplicates should fail");
        assert_eq!(
            err,
            ValidationError::DuplicateName {
                name: String::from("node-1")
            }
        );
        assert!(err.to_string().contains("requested more than once"));
    }

    #[rstest]
    fn rejects_request_without_hostname_or_name() {
        let err = validate_batch(&[InstanceRequest::default()], DEFAULT_IMAGE)
            .expect_err("anonymous request should fail");
        assert_eq!(err, ValidationError::MissingHostname { index: 0 });
    }

    #[rstest]
    fn rejects_single_character_hostname() {
        let batch = vec![InstanceRequest {
            hostname: Some(String::from("x")),
            ..InstanceRequest::default()
        }];
        let err = validate_batch(&batch, DEFAULT_IMAGE).expect_err("short hostname should fail");
        assert_eq!(
            err,
            ValidationError::HostnameLength {
                hostname: String::from("x")
            }
        );
    }

    #[rstest]
    fn rejects_overlong_hostname() {
        let batch = vec![InstanceRequest {
            hostname: Some("h".repeat(256)),
            ..InstanceRequest::default()
        }];
        let err = validate_batch(&batch, DEFAULT_IMAGE).expect_err("long hostname should fail");
        assert!(matches!(err, ValidationError::HostnameLength { .. }));
    }

    #[rstest]
    #[case(Some(3), None)]
    #[case(None, Some(32))]
    fn rejects_sizes_below_minimum(#[case] root: Option<u32>, #[case] swap: Option<u32>) {
        let batch = vec![InstanceRequest {
            hostname: Some(String::from("compute-0")),
            root_size_gb: root,
            swap_size_mb: swap,
            ..InstanceRequest::default()
        }];
        let err = validate_batch(&batch, DEFAULT_IMAGE).expect_err("undersized request");
        match (root, swap) {
            (Some(_), _) => assert!(matches!(err, ValidationError::RootSizeTooSmall { .. })),
            _ => assert!(matches!(err, ValidationError::SwapSizeTooSmall { .. })),
        }
    }

    #[rstest]
    fn accepts_sizes_at_minimum() {
        let batch = vec![InstanceRequest {
            hostname: Some(String::from("compute-0")),
            root_size_gb: Some(4),
            swap_size_mb: Some(64),
            ..InstanceRequest::default()
        }];
        validate_batch(&batch, DEFAULT_IMAGE).expect("minimum sizes should pass");
    }

    #[rstest]
    fn rejects_nic_with_network_and_port() {
        let batch = vec![InstanceRequest {
            hostname: Some(String::from("compute-0")),
            nics: Some(vec![NicSpec {
                network: Some(String::from("ctlplane")),
                port: Some(String::from("port-0")),
                ..NicSpec::default()
            }]),
            ..InstanceRequest::default()
        }];
        let err = validate_batch(&batch, DEFAULT_IMAGE).expect_err("shape violation");
        assert!(matches!(err, ValidationError::NicShape { .. }));
    }

    #[rstest]
    fn rejects_unresolvable_source() {
        let batch = vec![InstanceRequest {
            hostname: Some(String::from("compute-0")),
            image_kernel: Some(String::from("vmlinuz")),
            ..InstanceRequest::default()
        }];
        let err = validate_batch(&batch, DEFAULT_IMAGE).expect_err("half a pair should fail");
        assert!(matches!(
            err,
            ValidationError::Source {
                source: SourceError::IncompletePair { .. },
                ..
            }
        ));
        assert!(err.to_string().contains("compute-0"));
    }

    #[rstest]
    fn resolves_source_from_validated_instance(named_request: InstanceRequest) {
        let validated =
            validate_batch(&[named_request], DEFAULT_IMAGE).expect("request should validate");
        let source = validated
            .first()
            .expect("one instance expected")
            .source()
            .expect("defaulted image should resolve");
        assert_eq!(
            source,
            ImageSource::Disk {
                image: String::from(DEFAULT_IMAGE),
                checksum: None,
            }
        );
    }
}
