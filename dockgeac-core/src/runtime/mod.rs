//! Runtime adapter abstraction.
//!
//! The engine drives the container runtime through the [`RuntimeAdapter`]
//! trait: plan-driven lifecycle operations on top of the CLI driver and the
//! lock store. The Apple `container` implementation is one variant; tests
//! use a mock command runner underneath the same adapter.

use crate::compose::Plan;
use crate::driver::LogStream;
use crate::error::Result;
use crate::status::StackStatusCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod apple;
mod output;

pub use apple::AppleContainerAdapter;

/// Observed state of one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Stopped,
    Created,
    #[default]
    Unknown,
}

impl ContainerState {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "running" => ContainerState::Running,
            "stopped" | "exited" => ContainerState::Stopped,
            "created" => ContainerState::Created,
            _ => ContainerState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Running => "running",
            ContainerState::Stopped => "stopped",
            ContainerState::Created => "created",
            ContainerState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed status record parsed from the runtime's JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub state: ContainerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

impl ContainerStatus {
    /// Placeholder for a locked service with no matching container.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self { name: name.into(), state: ContainerState::Unknown, exit_code: None, started_at: None }
    }
}

/// One image known to the runtime, with its usage count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub in_use_count: usize,
}

/// Invocation description for an interactive exec, spawned by the terminal
/// layer rather than the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecSpec {
    pub command: String,
    pub args: Vec<String>,
}

/// Capability set the engine needs from a runtime.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// Adapter name (for logging).
    fn name(&self) -> &str;

    /// Availability probe (`system status`, exit 0 = available).
    async fn available(&self) -> bool;

    /// Runtime version string.
    async fn version(&self) -> Result<String>;

    /// Realise a plan as containers, in dependency order. Creates a fresh
    /// lock record on success. Already-created containers are not rolled
    /// back when a later service fails.
    async fn deploy(&self, plan: &Plan) -> Result<()>;

    async fn start_stack(&self, stack: &str, service: Option<&str>) -> Result<()>;
    async fn stop_stack(&self, stack: &str, service: Option<&str>) -> Result<()>;
    async fn restart_stack(&self, stack: &str, service: Option<&str>) -> Result<()>;

    /// Stop and delete the stack's containers, optionally removing its
    /// declared volumes, then delete the lock record.
    async fn down_stack(&self, stack: &str, remove_volumes: bool) -> Result<()>;

    /// Per-service container status for one stack.
    async fn service_status(&self, stack: &str) -> Result<BTreeMap<String, ContainerStatus>>;

    /// Roll up every observed container into per-stack status codes.
    async fn all_stack_status(&self) -> Result<BTreeMap<String, StackStatusCode>>;

    /// Current container inventory.
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerStatus>>;

    /// Ensure an image is present, pulling it unless it is local-only.
    async fn pull_image(&self, image: &str) -> Result<()>;

    async fn image_list(&self) -> Result<Vec<ImageRecord>>;

    /// Delete an image; refuses while containers still use it.
    async fn delete_image(&self, reference: &str) -> Result<()>;

    async fn network_list(&self) -> Result<Vec<String>>;

    /// Stream a service's logs.
    async fn logs(
        &self,
        stack: &str,
        service: &str,
        tail: Option<u32>,
        follow: bool,
    ) -> Result<LogStream>;

    /// Invocation description for an interactive shell in a service.
    async fn exec_spec(&self, stack: &str, service: &str, command: &str) -> Result<ExecSpec>;
}
