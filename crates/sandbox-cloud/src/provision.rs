use std::time::Duration;

use sandbox::{Result, SandboxError};
use tracing::info;

use crate::config::CloudConfig;
use crate::retry::{RetryPolicy, retry_fixed};
use crate::services::{CommandRelay, ControlPlane, LaunchSpec, PingStatus};
use crate::tags::{MARKER_TAG_KEY, MARKER_TAG_VALUE};

/// Tag recording which task an instance was provisioned for.
pub(crate) const TASK_TAG_KEY: &str = "sandbox_task";

/// Agent registration after boot is a bounded-latency event, so a fixed
/// delay with no backoff growth is enough. 20 x 30s ~ 10 minutes.
const READINESS_POLICY: RetryPolicy = RetryPolicy {
    attempts: 20,
    delay: Duration::from_secs(30),
};

/// One provisioned compute instance, owned exclusively by one environment
/// for the lifetime of a sample.
#[derive(Debug, Clone)]
pub struct InstanceHandle {
    pub instance_id: String,
    pub region: String,
    pub config: CloudConfig,
}

/// Launch one instance, wait for it to run, then wait for its relay agent.
///
/// Control-plane errors propagate unmodified; provisioning failures are
/// rarely transient and are not retried here.
pub(crate) async fn provision(
    control_plane: &dyn ControlPlane,
    relay: &dyn CommandRelay,
    config: &CloudConfig,
    task_name: &str,
) -> Result<InstanceHandle> {
    let mut tags = config.extra_tags.clone();
    tags.push("Name", format!("cloud_sandbox_{task_name}"));
    tags.push(TASK_TAG_KEY, task_name);
    tags.push(MARKER_TAG_KEY, MARKER_TAG_VALUE);

    let spec = LaunchSpec {
        image_id: config.image_id.clone(),
        instance_type: config.instance_type.clone(),
        security_group_id: config.security_group_id.clone(),
        subnet_id: config.subnet_id.clone(),
        instance_profile: config.instance_profile.clone(),
        tags,
        min_count: 1,
        max_count: 1,
    };

    let instance_id = control_plane
        .launch_instance(&spec)
        .await
        .map_err(|e| SandboxError::Provisioning(e.to_string()))?;

    info!(instance_id = %instance_id, task = task_name, "instance launched");

    control_plane
        .wait_until_running(&instance_id)
        .await
        .map_err(|e| SandboxError::Provisioning(e.to_string()))?;

    await_agent_ready(relay, &instance_id).await?;

    Ok(InstanceHandle {
        instance_id,
        region: config.region.clone(),
        config: config.clone(),
    })
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct NotReady(String);

/// Poll the relay inventory until the instance's agent registers online.
///
/// Ready only when exactly one matching record exists and it is online.
/// Exhaustion is fatal to sample setup; there is no fallback.
pub(crate) async fn await_agent_ready(relay: &dyn CommandRelay, instance_id: &str) -> Result<()> {
    retry_fixed(READINESS_POLICY, || async move {
        let agents = relay
            .describe_agents(instance_id)
            .await
            .map_err(|e| NotReady(e.to_string()))?;
        match agents.as_slice() {
            [agent] if agent.ping_status == PingStatus::Online => Ok(()),
            _ => Err(NotReady(format!(
                "agent not online ({} inventory records)",
                agents.len()
            ))),
        }
    })
    .await
    .map_err(|e| SandboxError::ReadinessTimeout(format!("instance {instance_id}: {e}")))?;

    info!(instance_id = %instance_id, "agent online");
    Ok(())
}
