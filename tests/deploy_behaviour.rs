//! Behaviour tests for the deploy, wait, undeploy, and existence-check
//! workflows.

mod common;

use std::time::Duration;

use common::{hostname_request, named_request};
use ironsmith::test_support::{
    ProvisionerCall, ScriptedProvisioner, sample_instance,
};
use ironsmith::{
    DeployDefaults, DeployErrorKind, DeployOrchestrator, InstanceState, ProvisionerError,
};
use uuid::Uuid;

fn orchestrator(provisioner: &ScriptedProvisioner) -> DeployOrchestrator<ScriptedProvisioner> {
    DeployOrchestrator::new(provisioner.clone(), DeployDefaults::default())
}

#[tokio::test]
async fn a_failed_provisioning_releases_only_its_own_node() {
    let provisioner = ScriptedProvisioner::new();
    provisioner.push_provision(Err(ProvisionerError::Provision {
        message: String::from("image unavailable"),
    }));
    provisioner.push_unprovision(Ok(()));

    let err = orchestrator(&provisioner)
        .deploy(&hostname_request("compute-0"), "node-1", &[])
        .await
        .expect_err("provisioning failure must surface");

    assert_eq!(err.kind(), DeployErrorKind::Provision);
    assert_eq!(provisioner.released_nodes(), vec![String::from("node-1")]);
}

#[tokio::test]
async fn a_successful_deploy_carries_keys_and_admin_user() {
    let provisioner = ScriptedProvisioner::new();
    provisioner.push_provision(Ok(sample_instance(
        "compute-0",
        "node-1",
        InstanceState::Deploying,
    )));

    let keys = vec![String::from("ssh-ed25519 AAAA test")];
    let instance = orchestrator(&provisioner)
        .deploy(&hostname_request("compute-0"), "node-1", &keys)
        .await
        .expect("deploy should start");
    assert_eq!(instance.state, InstanceState::Deploying);

    let calls = provisioner.calls();
    let Some(ProvisionerCall::Provision(spec)) = calls.first() else {
        panic!("expected a provision call, got {calls:?}");
    };
    assert_eq!(spec.config.ssh_keys, keys);
    let admin = spec.config.users.first().expect("one admin account");
    assert!(admin.admin && admin.sudo);
}

#[tokio::test]
async fn a_timed_out_wait_leaves_the_node_attached() {
    let provisioner = ScriptedProvisioner::new();
    provisioner.push_wait(Err(ProvisionerError::Timeout {
        timeout: Duration::from_secs(3600),
    }));

    let err = orchestrator(&provisioner)
        .wait_for_deployment(Uuid::new_v4(), Duration::from_secs(3600))
        .await
        .expect_err("timeout must surface");

    assert_eq!(err.kind(), DeployErrorKind::Timeout);
    assert!(provisioner.released_nodes().is_empty());
    assert!(err.compensation().is_empty());
}

#[tokio::test]
async fn undeploying_a_missing_instance_succeeds_without_releasing() {
    let provisioner = ScriptedProvisioner::new();
    provisioner.push_show(Err(ProvisionerError::NotFound {
        ident: String::from("compute-0"),
    }));

    orchestrator(&provisioner)
        .undeploy("compute-0", Duration::from_secs(1800))
        .await
        .expect("missing instance counts as already deleted");

    assert!(provisioner.released_nodes().is_empty());
}

#[tokio::test]
async fn undeploy_waits_on_the_teardown_and_propagates_failures() {
    let provisioner = ScriptedProvisioner::new();
    provisioner.push_show(Ok(sample_instance(
        "compute-0",
        "node-1",
        InstanceState::Active,
    )));
    provisioner.push_unprovision(Err(ProvisionerError::Unprovision {
        message: String::from("status 500"),
    }));

    let err = orchestrator(&provisioner)
        .undeploy("compute-0", Duration::from_secs(1800))
        .await
        .expect_err("an explicit undeploy failing is actionable");

    assert_eq!(err.kind(), DeployErrorKind::Unprovision);
    let calls = provisioner.calls();
    assert!(matches!(
        calls.get(1),
        Some(ProvisionerCall::Unprovision { wait, .. })
            if *wait == Some(Duration::from_secs(1800))
    ));
}

#[tokio::test]
async fn existence_check_treats_foreign_hostnames_as_fatal() {
    let provisioner = ScriptedProvisioner::new();
    provisioner.push_show(Ok(sample_instance(
        "someone-else",
        "node-1",
        InstanceState::Active,
    )));

    let err = orchestrator(&provisioner)
        .check_existing(&[named_request("node-1")])
        .await
        .expect_err("a lookup matching the wrong hostname must abort");

    assert_eq!(err.kind(), DeployErrorKind::Conflict);
}
