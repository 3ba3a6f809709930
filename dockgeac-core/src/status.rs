//! Stack status codes and the per-stack roll-up.

use crate::runtime::ContainerState;
use serde::{Deserialize, Serialize};

/// Aggregate status of one stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StackStatusCode {
    Unknown,
    /// Compose file present, never deployed.
    CreatedFile,
    /// Containers created but none started.
    CreatedStack,
    Running,
    Exited,
}

impl StackStatusCode {
    /// Numeric code used on the wire by the facade.
    pub fn code(&self) -> u8 {
        match self {
            StackStatusCode::Unknown => 0,
            StackStatusCode::CreatedFile => 1,
            StackStatusCode::CreatedStack => 2,
            StackStatusCode::Running => 3,
            StackStatusCode::Exited => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StackStatusCode::Unknown => "UNKNOWN",
            StackStatusCode::CreatedFile => "CREATED_FILE",
            StackStatusCode::CreatedStack => "CREATED_STACK",
            StackStatusCode::Running => "RUNNING",
            StackStatusCode::Exited => "EXITED",
        }
    }
}

impl std::fmt::Display for StackStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reduce per-container states to a single stack-level status.
///
/// Tie-break order: unanimity first, then any-running, then any-stopped.
pub fn rollup(states: &[ContainerState]) -> StackStatusCode {
    if states.is_empty() {
        return StackStatusCode::Unknown;
    }
    if states.iter().all(|s| *s == ContainerState::Running) {
        return StackStatusCode::Running;
    }
    if states.iter().all(|s| *s == ContainerState::Stopped) {
        return StackStatusCode::Exited;
    }
    if states.iter().all(|s| *s == ContainerState::Created) {
        return StackStatusCode::CreatedStack;
    }
    if states.iter().any(|s| *s == ContainerState::Running) {
        return StackStatusCode::Running;
    }
    if states.iter().any(|s| *s == ContainerState::Stopped) {
        return StackStatusCode::Exited;
    }
    StackStatusCode::Unknown
}
