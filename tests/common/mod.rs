//! Shared request fixtures for the workflow behaviour suites.

use ironsmith::InstanceRequest;

/// Builds a request pinning the named node.
pub fn named_request(name: &str) -> InstanceRequest {
    InstanceRequest {
        name: Some(name.to_owned()),
        ..InstanceRequest::default()
    }
}

/// Builds a request for the given hostname on any node.
pub fn hostname_request(hostname: &str) -> InstanceRequest {
    InstanceRequest {
        hostname: Some(hostname.to_owned()),
        ..InstanceRequest::default()
    }
}
