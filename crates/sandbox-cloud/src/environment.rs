use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use async_trait::async_trait;
use sandbox::{ExecOutcome, ExecRequest, Result, SandboxEnvironment, SandboxError};
use tracing::{info, warn};

use crate::config::CloudConfig;
use crate::invocation::{DEFAULT_TIMEOUT_SECS, Dispatcher, Operation, build_script};
use crate::provision::{self, InstanceHandle};
use crate::services::{CommandRelay, ControlPlane, ObjectStore};
use crate::tags::{self, MARKER_TAG_KEY, MARKER_TAG_VALUE};
use crate::transfer;

/// Per-environment service clients. Each environment owns its own set, so
/// test doubles and concurrent samples need no process-global state.
#[derive(Clone)]
pub struct ServiceClients {
    pub control_plane: Arc<dyn ControlPlane>,
    pub relay: Arc<dyn CommandRelay>,
    pub store: Arc<dyn ObjectStore>,
}

/// A sandbox backed by one dedicated cloud instance.
pub struct CloudSandboxEnvironment {
    config: CloudConfig,
    instance_id: String,
    clients: ServiceClients,
}

impl CloudSandboxEnvironment {
    /// Provision an instance for one sample and wait until its relay agent
    /// is reachable. Fatal on provisioning or readiness failure.
    pub async fn sample_init(
        clients: ServiceClients,
        config: CloudConfig,
        task_name: &str,
    ) -> Result<Self> {
        let handle = provision::provision(
            clients.control_plane.as_ref(),
            clients.relay.as_ref(),
            &config,
            task_name,
        )
        .await?;
        Ok(Self::attach(clients, handle))
    }

    /// Wrap an already-provisioned instance.
    pub fn attach(clients: ServiceClients, handle: InstanceHandle) -> Self {
        Self {
            config: handle.config,
            instance_id: handle.instance_id,
            clients,
        }
    }

    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher {
            relay: self.clients.relay.as_ref(),
            store: self.clients.store.as_ref(),
            config: &self.config,
            instance_id: &self.instance_id,
        }
    }

    /// Terminate the instances behind a finished sample.
    ///
    /// An interrupted run deliberately leaves instances running for
    /// postmortem inspection; they are picked up later by [`bulk_cleanup`].
    pub async fn sample_cleanup(
        environments: &[CloudSandboxEnvironment],
        interrupted: bool,
    ) -> Result<()> {
        if interrupted {
            warn!("run interrupted, leaving instances for inspection");
            return Ok(());
        }
        for env in environments {
            env.clients
                .control_plane
                .terminate_instances(std::slice::from_ref(&env.instance_id))
                .await
                .map_err(|e| SandboxError::Service(e.to_string()))?;
            info!(instance_id = %env.instance_id, "instance terminated");
        }
        Ok(())
    }
}

#[async_trait]
impl SandboxEnvironment for CloudSandboxEnvironment {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    async fn exec(&self, request: &ExecRequest<'_>) -> Result<ExecOutcome> {
        let timeout_secs = request.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let script = build_script(request.cmd, request.env, request.cwd);
        self.dispatcher()
            .run(script, Operation::Exec, timeout_secs)
            .await
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        transfer::read_file(&self.dispatcher(), path).await
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        transfer::write_file(&self.dispatcher(), path, contents).await
    }
}

/// How [`bulk_cleanup`] decides whether to ask before terminating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Prompt on stdin when it is a terminal and `CI` is unset.
    Interactive,
    /// Never prompt (tests, scripted cleanup).
    AssumeYes,
}

/// Find every non-terminated instance carrying the marker tag and terminate
/// the lot in one batch call.
pub async fn bulk_cleanup(
    control_plane: &dyn ControlPlane,
    confirmation: Confirmation,
) -> Result<()> {
    let filters = [
        tags::tag_filter(MARKER_TAG_KEY, MARKER_TAG_VALUE),
        tags::active_state_filter(),
    ];
    let instances = control_plane
        .describe_instances(&filters)
        .await
        .map_err(|e| SandboxError::Service(e.to_string()))?;

    if instances.is_empty() {
        println!("No sandbox instances found to clean up.");
        return Ok(());
    }

    for instance in &instances {
        println!("{}  {}", instance.instance_id, instance.name());
    }

    if confirmation == Confirmation::Interactive
        && should_prompt()
        && !confirm_termination(instances.len())?
    {
        println!("Cancelled.");
        return Ok(());
    }

    let ids: Vec<String> = instances
        .iter()
        .map(|i| i.instance_id.clone())
        .collect();
    control_plane
        .terminate_instances(&ids)
        .await
        .map_err(|e| SandboxError::Service(e.to_string()))?;

    info!(count = ids.len(), "terminated sandbox instances");
    Ok(())
}

/// Prompt only in an interactive shell outside CI.
fn should_prompt() -> bool {
    io::stdin().is_terminal() && std::env::var_os("CI").is_none()
}

fn confirm_termination(count: usize) -> Result<bool> {
    print!("Terminate all {count} instances above? [y/N] ");
    io::stdout()
        .flush()
        .map_err(|e| SandboxError::Io(e.to_string()))?;
    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .map_err(|e| SandboxError::Io(e.to_string()))?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Targeted cleanup by instance id is not supported; fail loudly rather
/// than silently succeeding.
pub async fn cleanup_by_id(_id: &str) -> Result<()> {
    Err(SandboxError::NotImplemented("cleanup by instance id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cleanup_by_id_fails_loudly() {
        let err = cleanup_by_id("i-123").await.unwrap_err();
        assert!(matches!(err, SandboxError::NotImplemented(_)));
    }
}
