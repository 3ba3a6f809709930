//! dockgeac core library
//!
//! Runtime orchestration engine for compose-defined stacks on Apple's
//! `container` CLI: compose compiler, runtime adapter, lock store, stack
//! lifecycle engine and background observer.

pub mod compose;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod lockstore;
pub mod observer;
pub mod paths;
pub mod reference;
pub mod runtime;
pub mod status;

// Re-export commonly used items
pub use compose::{CompileResult, Diagnostic, Plan, ServicePlan};
pub use config::Settings;
pub use driver::{CliOutput, CommandRunner, ContainerCli, LogStream};
pub use engine::{Stack, StackEngine, ACCEPTED_COMPOSE_FILE_NAMES, DEFAULT_COMPOSE_FILE_NAME};
pub use error::{DockgeacError, Result};
pub use lockstore::{LockRecord, LockStore, LockedService};
pub use observer::{Observer, ObserverEvent, DEFAULT_POLL_INTERVAL};
pub use runtime::{
    AppleContainerAdapter, ContainerState, ContainerStatus, ExecSpec, ImageRecord, RuntimeAdapter,
};
pub use status::{rollup, StackStatusCode};
