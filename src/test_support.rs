//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use uuid::Uuid;

use crate::images::{CommandOutput, CommandRunner, ImageError};
use crate::provisioner::{
    Instance, InstanceState, NodeHandle, Provisioner, ProvisionerError, ProvisionerFuture,
    ProvisionSpec, ReserveSpec,
};

/// One operation observed by [`ScriptedProvisioner`], in call order.
#[derive(Clone, Debug, PartialEq)]
pub enum ProvisionerCall {
    /// A reservation attempt with the given constraints.
    Reserve(ReserveSpec),
    /// A provisioning attempt with the given spec.
    Provision(ProvisionSpec),
    /// An instance lookup by hostname or UUID.
    Show {
        /// Identifier passed to the lookup.
        ident: String,
    },
    /// A bounded wait for the given instances.
    Wait {
        /// Instance UUIDs waited on.
        uuids: Vec<Uuid>,
        /// Wait bound.
        timeout: Duration,
    },
    /// A release of the given node.
    Unprovision {
        /// Node identifier.
        node: String,
        /// Wait bound, if the caller asked to block.
        wait: Option<Duration>,
    },
}

#[derive(Debug, Default)]
struct State {
    reserve: VecDeque<Result<NodeHandle, ProvisionerError>>,
    provision: VecDeque<Result<Instance, ProvisionerError>>,
    show: VecDeque<Result<Instance, ProvisionerError>>,
    wait: VecDeque<Result<Vec<Instance>, ProvisionerError>>,
    unprovision: VecDeque<Result<(), ProvisionerError>>,
    calls: Vec<ProvisionerCall>,
}

/// Scripted provisioner returning pre-seeded results in FIFO order.
///
/// Each operation pops the next queued result for that operation and records
/// the call. Running past the end of a queue yields a service error so a
/// test with too few seeded responses fails loudly instead of hanging.
#[derive(Clone, Debug, Default)]
pub struct ScriptedProvisioner {
    state: Arc<Mutex<State>>,
}

impl ScriptedProvisioner {
    /// Creates a provisioner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Queues the next `reserve_node` result.
    pub fn push_reserve(&self, result: Result<NodeHandle, ProvisionerError>) {
        self.state().reserve.push_back(result);
    }

    /// Queues the next `provision_node` result.
    pub fn push_provision(&self, result: Result<Instance, ProvisionerError>) {
        self.state().provision.push_back(result);
    }

    /// Queues the next `show_instance` result.
    pub fn push_show(&self, result: Result<Instance, ProvisionerError>) {
        self.state().show.push_back(result);
    }

    /// Queues the next `wait_for_provisioning` result.
    pub fn push_wait(&self, result: Result<Vec<Instance>, ProvisionerError>) {
        self.state().wait.push_back(result);
    }

    /// Queues the next `unprovision_node` result.
    pub fn push_unprovision(&self, result: Result<(), ProvisionerError>) {
        self.state().unprovision.push_back(result);
    }

    /// Returns a snapshot of all calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ProvisionerCall> {
        self.state().calls.clone()
    }

    /// Returns the nodes released so far, in release order.
    #[must_use]
    pub fn released_nodes(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                ProvisionerCall::Unprovision { node, .. } => Some(node.clone()),
                _ => None,
            })
            .collect()
    }

    /// Counts recorded `reserve_node` calls.
    #[must_use]
    pub fn reserve_calls(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| matches!(call, ProvisionerCall::Reserve(_)))
            .count()
    }
}

fn exhausted(operation: &str) -> ProvisionerError {
    ProvisionerError::Service {
        message: format!("no scripted response for {operation}"),
    }
}

impl Provisioner for ScriptedProvisioner {
    fn reserve_node<'a>(&'a self, spec: &'a ReserveSpec) -> ProvisionerFuture<'a, NodeHandle> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(ProvisionerCall::Reserve(spec.clone()));
            state
                .reserve
                .pop_front()
                .unwrap_or_else(|| Err(exhausted("reserve_node")))
        })
    }

    fn provision_node<'a>(&'a self, spec: &'a ProvisionSpec) -> ProvisionerFuture<'a, Instance> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(ProvisionerCall::Provision(spec.clone()));
            state
                .provision
                .pop_front()
                .unwrap_or_else(|| Err(exhausted("provision_node")))
        })
    }

    fn show_instance<'a>(&'a self, ident: &'a str) -> ProvisionerFuture<'a, Instance> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(ProvisionerCall::Show {
                ident: ident.to_owned(),
            });
            state
                .show
                .pop_front()
                .unwrap_or_else(|| Err(exhausted("show_instance")))
        })
    }

    fn wait_for_provisioning<'a>(
        &'a self,
        uuids: &'a [Uuid],
        timeout: Duration,
    ) -> ProvisionerFuture<'a, Vec<Instance>> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(ProvisionerCall::Wait {
                uuids: uuids.to_vec(),
                timeout,
            });
            state
                .wait
                .pop_front()
                .unwrap_or_else(|| Err(exhausted("wait_for_provisioning")))
        })
    }

    fn unprovision_node<'a>(
        &'a self,
        node: &'a str,
        wait: Option<Duration>,
    ) -> ProvisionerFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(ProvisionerCall::Unprovision {
                node: node.to_owned(),
                wait,
            });
            state
                .unprovision
                .pop_front()
                .unwrap_or_else(|| Err(exhausted("unprovision_node")))
        })
    }
}

/// Builds an instance record for tests.
#[must_use]
pub fn sample_instance(hostname: &str, node: &str, state: InstanceState) -> Instance {
    Instance {
        uuid: Uuid::new_v4(),
        hostname: hostname.to_owned(),
        node: node.to_owned(),
        state,
        ip_addresses: BTreeMap::new(),
    }
}

/// Builds a reserved node handle for tests.
#[must_use]
pub fn sample_node(id: &str) -> NodeHandle {
    NodeHandle { id: id.to_owned() }
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic build tool outcomes without spawning
/// processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: std::rc::Rc<std::cell::RefCell<VecDeque<CommandOutput>>>,
    invocations: std::rc::Rc<std::cell::RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a successful exit status with the given stdout.
    pub fn push_success(&self, stdout: impl Into<String>) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        });
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32, stderr: impl Into<String>) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        });
    }

    /// Pushes a response with no exit code to simulate abnormal termination.
    pub fn push_missing_exit_code(&self) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code: None,
            stdout: String::new(),
            stderr: String::new(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ImageError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| ImageError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets environment variables while holding the global mutex.
    #[must_use]
    pub fn set_vars(pairs: &[(&str, &str)]) -> Self {
        let guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: environment mutation is serialised by `ENV_LOCK`.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }
        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(value) => env::set_var(key, value),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
