//! Contracts for the three external services this crate orchestrates.
//!
//! None of them is implemented here. Production wires in real clients; tests
//! wire in in-memory doubles. The contracts are deliberately narrow: only
//! the calls the sandbox engine needs.

use std::fmt;
use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;

use crate::tags::{Filter, TagSet};

/// Error from a control-plane or relay call.
#[derive(Debug, thiserror::Error)]
#[error("{service}: {detail}")]
pub struct ServiceError {
    pub service: &'static str,
    pub detail: String,
}

impl ServiceError {
    pub fn new(service: &'static str, detail: impl Into<String>) -> Self {
        Self {
            service,
            detail: detail.into(),
        }
    }
}

/// Error from an object-store call. Absence is typed: a missing stream
/// object is the expected representation of "no output" and must never be
/// conflated with a transport failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no such object: {0}")]
    NotFound(String),

    #[error("object store call failed: {0}")]
    Service(String),
}

/// Request to launch compute instances.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub image_id: String,
    pub instance_type: String,
    pub security_group_id: String,
    pub subnet_id: String,
    pub instance_profile: String,
    pub tags: TagSet,
    /// Sandbox use always requests exactly one instance (min == max == 1).
    pub min_count: u32,
    pub max_count: u32,
}

/// One instance as reported by `describe_instances`.
#[derive(Debug, Clone)]
pub struct InstanceSummary {
    pub instance_id: String,
    pub state: String,
    pub tags: TagSet,
}

impl InstanceSummary {
    /// Value of the `Name` tag, or empty.
    pub fn name(&self) -> &str {
        self.tags.get("Name").unwrap_or("")
    }
}

/// The service that creates, observes, and terminates compute instances.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Launch instances per `spec` and return the id of the one created.
    async fn launch_instance(&self, spec: &LaunchSpec) -> Result<String, ServiceError>;

    /// Block until the instance reports running, under the control plane's
    /// own polling and timeout policy.
    async fn wait_until_running(&self, instance_id: &str) -> Result<(), ServiceError>;

    async fn terminate_instances(&self, instance_ids: &[String]) -> Result<(), ServiceError>;

    async fn describe_instances(
        &self,
        filters: &[Filter],
    ) -> Result<Vec<InstanceSummary>, ServiceError>;
}

/// Relay-agent reachability as reported by the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingStatus {
    Online,
    ConnectionLost,
    Inactive,
}

/// One agent record from the relay inventory.
#[derive(Debug, Clone)]
pub struct AgentSummary {
    pub instance_id: String,
    pub ping_status: PingStatus,
}

/// Lifecycle state of one relay invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Pending,
    InProgress,
    Delayed,
    Success,
    Cancelled,
    TimedOut,
    Failed,
}

impl CommandState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Cancelled | Self::TimedOut | Self::Failed
        )
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Delayed => "delayed",
            Self::Success => "success",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed-out",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Status of one invocation on one instance.
#[derive(Debug, Clone, Copy)]
pub struct InvocationStatus {
    pub state: CommandState,
    /// Exit code of the remote script, when the relay has one.
    pub response_code: Option<i32>,
}

/// A command batch submitted to the relay.
#[derive(Debug)]
pub struct CommandSpec<'a> {
    pub instance_id: &'a str,
    /// POSIX shell lines, run top to bottom.
    pub commands: &'a [String],
    /// Execution timeout enforced by the relay agent itself.
    pub timeout_secs: u64,
    /// Bucket the relay mirrors stdout/stderr into.
    pub output_bucket: &'a str,
    /// Per-invocation key prefix under which the streams land (see
    /// [`CommandRelay`] docs for the layout).
    pub output_key_prefix: &'a str,
}

/// The intermediary that delivers shell commands to instances and mirrors
/// their output into the object store.
///
/// Output layout contract: for a submission with prefix `p` that is assigned
/// command id `c` and targets instance `i`, the streams land at
/// `{p}{c}/{i}/stdout` and `{p}{c}/{i}/stderr`. An empty stream produces no
/// object at all.
#[async_trait]
pub trait CommandRelay: Send + Sync {
    /// Submit a command batch; returns the relay-assigned command id.
    async fn send_command(&self, spec: &CommandSpec<'_>) -> Result<String, ServiceError>;

    async fn invocation_status(
        &self,
        command_id: &str,
        instance_id: &str,
    ) -> Result<InvocationStatus, ServiceError>;

    /// Best-effort cancellation of an in-flight command.
    async fn cancel_command(
        &self,
        command_id: &str,
        instance_ids: &[String],
    ) -> Result<(), ServiceError>;

    /// Inventory records for one instance's relay agent.
    async fn describe_agents(&self, instance_id: &str) -> Result<Vec<AgentSummary>, ServiceError>;
}

/// HTTP method a presigned URL grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresignMethod {
    Get,
    Put,
}

/// The shared object store. Safety across concurrent invocations relies
/// entirely on per-invocation key uniqueness, not access control.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError>;

    /// Fetch an object, optionally limited to a byte range.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<Range<u64>>,
    ) -> Result<Vec<u8>, StoreError>;

    /// Size of the object in bytes.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<u64, StoreError>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// Delete every object whose key starts with `prefix`.
    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<(), StoreError>;

    /// Time-limited, credential-embedding URL granting direct access to one
    /// object without exposing long-lived credentials to the instance.
    async fn presign_url(
        &self,
        method: PresignMethod,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, StoreError>;
}
