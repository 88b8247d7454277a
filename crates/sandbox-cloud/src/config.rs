use std::env;

use sandbox::{Result, SandboxError};

use crate::tags::TagSet;

pub(crate) const DEFAULT_INSTANCE_TYPE: &str = "t3a.large";

const ENV_PREFIX: &str = "SANDBOX_CLOUD_";

/// Immutable configuration for one cloud sandbox environment.
///
/// All fields are resolved once at assembly time, not per call. Network,
/// security-group, subnet, profile, and bucket values come from the
/// infrastructure template consumed at deploy time; this crate only reads
/// them.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub region: String,
    pub vpc_id: String,
    pub security_group_id: String,
    pub subnet_id: String,
    pub image_id: String,
    pub instance_type: String,
    /// Identity profile granting the instance relay-agent permissions and
    /// least-privilege access to the one bucket.
    pub instance_profile: String,
    pub bucket: String,
    /// Prefix for every object key this environment writes. Never starts
    /// with `/` (rejected at construction).
    pub key_prefix: String,
    pub extra_tags: TagSet,
}

impl CloudConfig {
    pub fn builder() -> CloudConfigBuilder {
        CloudConfigBuilder::default()
    }

    /// Assemble a configuration from `SANDBOX_CLOUD_*` environment
    /// variables (`REGION`, `VPC_ID`, `SECURITY_GROUP_ID`, `SUBNET_ID`,
    /// `IMAGE_ID`, `INSTANCE_TYPE`, `INSTANCE_PROFILE`, `BUCKET`,
    /// `KEY_PREFIX`, `EXTRA_TAGS`).
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(v) = env_var("REGION") {
            builder = builder.region(v);
        }
        if let Some(v) = env_var("VPC_ID") {
            builder = builder.vpc_id(v);
        }
        if let Some(v) = env_var("SECURITY_GROUP_ID") {
            builder = builder.security_group_id(v);
        }
        if let Some(v) = env_var("SUBNET_ID") {
            builder = builder.subnet_id(v);
        }
        if let Some(v) = env_var("IMAGE_ID") {
            builder = builder.image_id(v);
        }
        if let Some(v) = env_var("INSTANCE_TYPE") {
            builder = builder.instance_type(v);
        }
        if let Some(v) = env_var("INSTANCE_PROFILE") {
            builder = builder.instance_profile(v);
        }
        if let Some(v) = env_var("BUCKET") {
            builder = builder.bucket(v);
        }
        if let Some(v) = env_var("KEY_PREFIX") {
            builder = builder.key_prefix(v);
        }
        if let Some(v) = env_var("EXTRA_TAGS") {
            builder = builder.extra_tags(TagSet::parse(&v)?);
        }
        builder.build()
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{name}"))
        .ok()
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Default)]
pub struct CloudConfigBuilder {
    region: Option<String>,
    vpc_id: Option<String>,
    security_group_id: Option<String>,
    subnet_id: Option<String>,
    image_id: Option<String>,
    instance_type: Option<String>,
    instance_profile: Option<String>,
    bucket: Option<String>,
    key_prefix: Option<String>,
    extra_tags: Option<TagSet>,
}

impl CloudConfigBuilder {
    pub fn region(mut self, v: impl Into<String>) -> Self {
        self.region = Some(v.into());
        self
    }

    pub fn vpc_id(mut self, v: impl Into<String>) -> Self {
        self.vpc_id = Some(v.into());
        self
    }

    pub fn security_group_id(mut self, v: impl Into<String>) -> Self {
        self.security_group_id = Some(v.into());
        self
    }

    pub fn subnet_id(mut self, v: impl Into<String>) -> Self {
        self.subnet_id = Some(v.into());
        self
    }

    pub fn image_id(mut self, v: impl Into<String>) -> Self {
        self.image_id = Some(v.into());
        self
    }

    pub fn instance_type(mut self, v: impl Into<String>) -> Self {
        self.instance_type = Some(v.into());
        self
    }

    pub fn instance_profile(mut self, v: impl Into<String>) -> Self {
        self.instance_profile = Some(v.into());
        self
    }

    pub fn bucket(mut self, v: impl Into<String>) -> Self {
        self.bucket = Some(v.into());
        self
    }

    pub fn key_prefix(mut self, v: impl Into<String>) -> Self {
        self.key_prefix = Some(v.into());
        self
    }

    pub fn extra_tags(mut self, tags: TagSet) -> Self {
        self.extra_tags = Some(tags);
        self
    }

    /// Validate and apply defaults (instance type, empty key prefix).
    pub fn build(self) -> Result<CloudConfig> {
        let key_prefix = self.key_prefix.unwrap_or_default();
        if key_prefix.starts_with('/') {
            return Err(SandboxError::InvalidConfig(format!(
                "key prefix '{key_prefix}' must not start with '/'"
            )));
        }

        Ok(CloudConfig {
            region: require(self.region, "region")?,
            vpc_id: require(self.vpc_id, "vpc_id")?,
            security_group_id: require(self.security_group_id, "security_group_id")?,
            subnet_id: require(self.subnet_id, "subnet_id")?,
            image_id: require(self.image_id, "image_id")?,
            instance_type: self
                .instance_type
                .unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.to_string()),
            instance_profile: require(self.instance_profile, "instance_profile")?,
            bucket: require(self.bucket, "bucket")?,
            key_prefix,
            extra_tags: self.extra_tags.unwrap_or_default(),
        })
    }
}

fn require(value: Option<String>, field: &'static str) -> Result<String> {
    value.ok_or_else(|| SandboxError::InvalidConfig(format!("missing required field: {field}")))
}
