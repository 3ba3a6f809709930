//! Deployment plan types.
//!
//! A [`Plan`] is the normalised, validated output of the compose compiler
//! and the unit the runtime adapter acts on. Plans are immutable values;
//! service iteration order is deterministic but only `depends_on` carries
//! ordering semantics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Compiled deployment plan for one stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub stack_name: String,

    /// Service name to service plan.
    pub services: BTreeMap<String, ServicePlan>,

    /// Declared top-level networks.
    #[serde(default)]
    pub networks: Vec<String>,

    /// Declared top-level volumes.
    #[serde(default)]
    pub volumes: Vec<String>,
}

/// One service within a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePlan {
    /// Container image reference. Required and non-empty in a deployable plan.
    pub image: String,

    /// Command override, split on whitespace at invocation time.
    #[serde(default)]
    pub command: Option<String>,

    /// Environment variables.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Port mappings (e.g. "8080:80").
    #[serde(default)]
    pub ports: Vec<String>,

    /// Volume mounts (e.g. "data:/var/lib/data").
    #[serde(default)]
    pub volumes: Vec<String>,

    /// Networks to attach.
    #[serde(default)]
    pub networks: Vec<String>,

    #[serde(default)]
    pub working_dir: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    /// Services that must be created before this one.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A single compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The offending key (e.g. `deploy`).
    pub key: String,
    /// Dotted document path (e.g. `services.web.deploy`).
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        key: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self { key: key.into(), path: path.into(), message: message.into() }
    }
}

/// Result of compiling a compose document.
///
/// A plan is produced even when `errors` is non-empty; callers decide
/// whether to proceed. Non-empty `errors` means the plan must not deploy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResult {
    pub plan: Plan,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl CompileResult {
    pub fn is_deployable(&self) -> bool {
        self.errors.is_empty()
    }

    /// Concatenated `path: message` list, one error per line.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|d| format!("{}: {}", d.path, d.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
