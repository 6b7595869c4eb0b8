//! Request and response payloads for the provisioning service API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::provisioner::{Instance, NodeHandle, ProvisionSpec, ReserveSpec, UserAccount};
use crate::request::NicSpec;
use crate::source::ImageSource;

#[derive(Serialize)]
pub(in crate::metal) struct ReservationRequest {
    resource_class: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    capabilities: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidates: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    traits: Vec<String>,
}

impl From<&ReserveSpec> for ReservationRequest {
    fn from(spec: &ReserveSpec) -> Self {
        Self {
            resource_class: spec.resource_class.clone(),
            capabilities: spec.capabilities.clone(),
            candidates: spec.candidates.clone(),
            traits: spec.traits.clone(),
        }
    }
}

#[derive(Deserialize)]
pub(in crate::metal) struct ReservationResponse {
    pub(in crate::metal) node: NodeHandle,
}

#[derive(Serialize)]
pub(in crate::metal) struct ProvisionRequest {
    hostname: String,
    image: ImageSource,
    nics: Vec<NicSpec>,
    root_size_gb: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    swap_size_mb: Option<u32>,
    ssh_keys: Vec<String>,
    users: Vec<UserAccount>,
}

impl From<&ProvisionSpec> for ProvisionRequest {
    fn from(spec: &ProvisionSpec) -> Self {
        Self {
            hostname: spec.hostname.clone(),
            image: spec.source.clone(),
            nics: spec.nics.clone(),
            root_size_gb: spec.root_size_gb,
            swap_size_mb: spec.swap_size_mb,
            ssh_keys: spec.config.ssh_keys.clone(),
            users: spec.config.users.clone(),
        }
    }
}

#[derive(Deserialize)]
pub(in crate::metal) struct InstanceEnvelope {
    pub(in crate::metal) instance: Instance,
}

#[derive(Deserialize)]
pub(in crate::metal) struct ErrorBody {
    pub(in crate::metal) message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioner::InstanceConfig;
    use rstest::rstest;

    #[rstest]
    fn reservation_payload_omits_empty_constraints() {
        let spec = ReserveSpec {
            resource_class: String::from("baremetal"),
            ..ReserveSpec::default()
        };
        let payload =
            serde_json::to_value(ReservationRequest::from(&spec)).expect("payload serializes");
        assert_eq!(
            payload,
            serde_json::json!({ "resource_class": "baremetal" })
        );
    }

    #[rstest]
    fn reservation_payload_carries_all_constraints() {
        let mut capabilities = BTreeMap::new();
        capabilities.insert(String::from("profile"), serde_json::json!("compute"));
        let spec = ReserveSpec {
            resource_class: String::from("baremetal"),
            capabilities,
            candidates: Some(vec![String::from("node-1")]),
            traits: vec![String::from("CUSTOM_GPU")],
        };
        let payload =
            serde_json::to_value(ReservationRequest::from(&spec)).expect("payload serializes");
        assert_eq!(
            payload,
            serde_json::json!({
                "resource_class": "baremetal",
                "capabilities": { "profile": "compute" },
                "candidates": ["node-1"],
                "traits": ["CUSTOM_GPU"],
            })
        );
    }

    #[rstest]
    fn provision_payload_tags_image_source() {
        let mut config = InstanceConfig::new(vec![String::from("ssh-ed25519 AAAA test")]);
        config.add_user(UserAccount {
            name: String::from("metal-admin"),
            admin: true,
            sudo: true,
        });
        let spec = ProvisionSpec {
            node: String::from("node-1"),
            hostname: String::from("compute-0"),
            config,
            source: ImageSource::KernelRamdisk {
                kernel: String::from("vmlinuz"),
                ramdisk: String::from("initrd"),
            },
            nics: vec![NicSpec::on_network("ctlplane")],
            root_size_gb: 49,
            swap_size_mb: None,
        };
        let payload =
            serde_json::to_value(ProvisionRequest::from(&spec)).expect("payload serializes");
        assert_eq!(
            payload.get("image"),
            Some(&serde_json::json!({
                "type": "kernel_ramdisk",
                "kernel": "vmlinuz",
                "ramdisk": "initrd",
            }))
        );
        assert!(payload.get("swap_size_mb").is_none());
        assert_eq!(
            payload.get("users"),
            Some(&serde_json::json!([
                { "name": "metal-admin", "admin": true, "sudo": true }
            ]))
        );
    }

    #[rstest]
    fn instance_envelope_parses_service_shape() {
        let envelope: InstanceEnvelope = serde_json::from_value(serde_json::json!({
            "instance": {
                "uuid": "3d1c9a1c-5bd0-44d6-a2ba-f1cf80fab000",
                "hostname": "compute-0",
                "node": "node-1",
                "state": "active",
                "ip_addresses": { "ctlplane": ["192.0.2.10"] },
            }
        }))
        .expect("envelope parses");
        assert_eq!(envelope.instance.hostname, "compute-0");
        assert_eq!(
            envelope
                .instance
                .ip_addresses
                .get("ctlplane")
                .map(Vec::as_slice),
            Some([String::from("192.0.2.10")].as_slice())
        );
    }
}
