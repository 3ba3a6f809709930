//! Stack lifecycle engine.
//!
//! Owns the per-stack compose files on disk and drives the runtime adapter
//! through the save → deploy → start/stop/restart/update/down/delete
//! lifecycle. Stack state is derived on demand from filesystem presence,
//! the lock store and runtime observation; it is never persisted as a
//! field. Mutating operations hold a per-stack mutex so concurrent deploys
//! of the same stack cannot race on the lock record.

use crate::compose::{self, Plan};
use crate::config::Settings;
use crate::error::{DockgeacError, Result};
use crate::lockstore::LockStore;
use crate::runtime::{ContainerStatus, RuntimeAdapter};
use crate::status::StackStatusCode;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, instrument, warn};

/// Compose file names accepted on disk; first match wins in lookup order.
pub const ACCEPTED_COMPOSE_FILE_NAMES: &[&str] =
    &["compose.yaml", "compose.yml", "docker-compose.yml", "docker-compose.yaml"];

/// Default compose file name for newly created stacks.
pub const DEFAULT_COMPOSE_FILE_NAME: &str = "compose.yaml";

/// In-memory stack entity, created lazily on demand.
#[derive(Debug, Clone)]
pub struct Stack {
    pub name: String,
    pub compose_yaml: String,
    pub compose_env: String,
    pub status: StackStatusCode,
    pub compose_file_name: String,
    /// False for stacks observed at the runtime with no compose file here.
    pub is_managed: bool,
}

impl Stack {
    /// Presentation object consumed by the transport layer.
    pub fn to_json(&self, endpoint: &str, settings: &Settings) -> serde_json::Value {
        json!({
            "name": self.name,
            "status": self.status.code(),
            "tags": [],
            "isManagedByDockge": self.is_managed,
            "composeFileName": self.compose_file_name,
            "endpoint": endpoint,
            "composeYAML": self.compose_yaml,
            "composeENV": self.compose_env,
            "primaryHostname": settings.hostname_for(endpoint),
        })
    }
}

/// Per-stack lifecycle engine over a runtime adapter and the lock store.
pub struct StackEngine {
    stacks_dir: PathBuf,
    adapter: Arc<dyn RuntimeAdapter>,
    locks: Arc<LockStore>,
    settings: Settings,
    mutexes: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    list_cache: RwLock<Option<BTreeMap<String, Stack>>>,
}

impl StackEngine {
    pub fn new(
        stacks_dir: impl Into<PathBuf>,
        adapter: Arc<dyn RuntimeAdapter>,
        locks: Arc<LockStore>,
        settings: Settings,
    ) -> Self {
        Self {
            stacks_dir: stacks_dir.into(),
            adapter,
            locks,
            settings,
            mutexes: std::sync::Mutex::new(HashMap::new()),
            list_cache: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Save a stack's compose file and `.env`.
    ///
    /// `is_add` requires the stack directory to not exist yet; otherwise it
    /// must already exist.
    #[instrument(skip(self, compose_yaml, compose_env))]
    pub async fn save(
        &self,
        name: &str,
        compose_yaml: &str,
        compose_env: &str,
        is_add: bool,
    ) -> Result<()> {
        validate_stack_name(name)?;

        // The document must at least round-trip as YAML before it lands on
        // disk; full policy checks happen at deploy time.
        serde_yaml::from_str::<serde_yaml::Value>(compose_yaml)
            .map_err(|e| DockgeacError::Validation(format!("Invalid YAML: {}", e)))?;
        compose::env::validate(compose_env)?;

        let _guard = self.lock_stack(name).await;

        let dir = self.stack_dir(name);
        if is_add {
            if dir.exists() {
                return Err(DockgeacError::Validation(format!("Stack {} already exists", name)));
            }
            std::fs::create_dir_all(&dir)
                .map_err(|e| DockgeacError::Io { path: dir.clone(), source: e })?;
        } else if !dir.exists() {
            return Err(DockgeacError::NotFound(format!("Stack {} not found", name)));
        }

        let file_name = self
            .compose_file_name(name)
            .unwrap_or_else(|| DEFAULT_COMPOSE_FILE_NAME.to_string());
        let compose_path = dir.join(&file_name);
        std::fs::write(&compose_path, compose_yaml)
            .map_err(|e| DockgeacError::Io { path: compose_path, source: e })?;

        let env_path = dir.join(".env");
        if !compose_env.trim().is_empty() || env_path.exists() {
            std::fs::write(&env_path, compose_env)
                .map_err(|e| DockgeacError::Io { path: env_path, source: e })?;
        }

        info!(stack = %name, added = is_add, "Stack saved");
        self.invalidate_cache().await;
        Ok(())
    }

    /// Compile and deploy a stack, then record the compose fingerprint.
    #[instrument(skip(self))]
    pub async fn deploy(&self, name: &str) -> Result<()> {
        let _guard = self.lock_stack(name).await;
        self.deploy_locked(name).await?;
        self.invalidate_cache().await;
        Ok(())
    }

    /// Start a stack's containers.
    ///
    /// A file-managed stack that was never deployed (no lock record) is
    /// deployed instead, as is one whose containers the runtime no longer
    /// knows ("not found").
    #[instrument(skip(self))]
    pub async fn start(&self, name: &str) -> Result<()> {
        let _guard = self.lock_stack(name).await;

        let file_managed = self.is_file_managed(name);
        if file_managed && self.locks.read(name).is_none() {
            debug!(stack = %name, "No lock record; deploying instead of starting");
            self.deploy_locked(name).await?;
            self.invalidate_cache().await;
            return Ok(());
        }

        match self.adapter.start_stack(name, None).await {
            Ok(()) => {
                self.invalidate_cache().await;
                Ok(())
            }
            Err(e) if e.is_not_found() && file_managed => {
                debug!(stack = %name, "Runtime lost the containers; redeploying");
                self.deploy_locked(name).await?;
                self.invalidate_cache().await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    pub async fn stop(&self, name: &str) -> Result<()> {
        let _guard = self.lock_stack(name).await;
        self.adapter.stop_stack(name, None).await?;
        self.invalidate_cache().await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn restart(&self, name: &str) -> Result<()> {
        let _guard = self.lock_stack(name).await;
        self.adapter.restart_stack(name, None).await?;
        self.invalidate_cache().await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn down(&self, name: &str, remove_volumes: bool) -> Result<()> {
        let _guard = self.lock_stack(name).await;
        self.adapter.down_stack(name, remove_volumes).await?;
        self.invalidate_cache().await;
        Ok(())
    }

    /// Pull fresh images and, if the stack is running, recreate it.
    #[instrument(skip(self))]
    pub async fn update(&self, name: &str) -> Result<()> {
        let _guard = self.lock_stack(name).await;

        let plan = self.compile_stack(name)?;
        for service in plan.services.values() {
            self.adapter.pull_image(&service.image).await?;
        }

        if self.status_of(name).await? != StackStatusCode::Running {
            debug!(stack = %name, "Stack not running; images refreshed only");
            return Ok(());
        }

        let plan = self.compile_stack(name)?;
        self.adapter.down_stack(name, false).await?;
        self.adapter.deploy(&plan).await?;
        self.record_fingerprint(name)?;

        info!(stack = %name, "Stack updated");
        self.invalidate_cache().await;
        Ok(())
    }

    /// Take the stack down (best effort) and remove its directory.
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<()> {
        let _guard = self.lock_stack(name).await;

        if let Err(e) = self.adapter.down_stack(name, false).await {
            warn!(stack = %name, error = %e, "Down failed during delete; removing files anyway");
        }

        let dir = self.stack_dir(name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .map_err(|e| DockgeacError::Io { path: dir, source: e })?;
        }

        info!(stack = %name, "Stack deleted");
        self.invalidate_cache().await;
        Ok(())
    }

    /// One stack entity, from disk or from runtime observation.
    pub async fn get_stack(&self, name: &str) -> Result<Stack> {
        if self.is_file_managed(name) {
            let (yaml, env, file_name) = self.read_compose(name)?;
            let status = self.status_of(name).await?;
            return Ok(Stack {
                name: name.to_string(),
                compose_yaml: yaml,
                compose_env: env,
                status,
                compose_file_name: file_name,
                is_managed: true,
            });
        }

        let statuses = self.adapter.all_stack_status().await?;
        match statuses.get(name) {
            Some(status) => Ok(Stack {
                name: name.to_string(),
                compose_yaml: String::new(),
                compose_env: String::new(),
                status: *status,
                compose_file_name: DEFAULT_COMPOSE_FILE_NAME.to_string(),
                is_managed: false,
            }),
            None => Err(DockgeacError::NotFound(format!("Stack {} not found", name))),
        }
    }

    /// All stacks: every directory with a compose file, overlaid with the
    /// statuses the adapter reports, plus externally-managed stacks the
    /// runtime knows that have no files here.
    pub async fn get_stack_list(&self) -> Result<BTreeMap<String, Stack>> {
        if let Some(cached) = self.list_cache.read().await.clone() {
            return Ok(cached);
        }

        let mut stacks: BTreeMap<String, Stack> = BTreeMap::new();

        if let Ok(entries) = std::fs::read_dir(&self.stacks_dir) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if !entry.path().is_dir() {
                    continue;
                }
                let Some(file_name) = self.compose_file_name(&name) else {
                    continue;
                };
                let (yaml, env, _) = self.read_compose(&name).unwrap_or_default();
                stacks.insert(
                    name.clone(),
                    Stack {
                        name,
                        compose_yaml: yaml,
                        compose_env: env,
                        status: StackStatusCode::CreatedFile,
                        compose_file_name: file_name,
                        is_managed: true,
                    },
                );
            }
        }

        for (name, status) in self.adapter.all_stack_status().await? {
            match stacks.get_mut(&name) {
                Some(stack) => stack.status = status,
                None => {
                    stacks.insert(
                        name.clone(),
                        Stack {
                            name,
                            compose_yaml: String::new(),
                            compose_env: String::new(),
                            status,
                            compose_file_name: DEFAULT_COMPOSE_FILE_NAME.to_string(),
                            is_managed: false,
                        },
                    );
                }
            }
        }

        *self.list_cache.write().await = Some(stacks.clone());
        Ok(stacks)
    }

    /// Per-service container status for one stack.
    pub async fn service_status_list(
        &self,
        name: &str,
    ) -> Result<BTreeMap<String, ContainerStatus>> {
        self.adapter.service_status(name).await
    }

    /// Derived status of a single stack.
    pub async fn status_of(&self, name: &str) -> Result<StackStatusCode> {
        let statuses = self.adapter.all_stack_status().await?;
        if let Some(status) = statuses.get(name) {
            return Ok(*status);
        }
        if self.is_file_managed(name) {
            Ok(StackStatusCode::CreatedFile)
        } else {
            Ok(StackStatusCode::Unknown)
        }
    }

    // Deploy while already holding the stack mutex.
    async fn deploy_locked(&self, name: &str) -> Result<()> {
        let plan = self.compile_stack(name)?;
        self.adapter.deploy(&plan).await?;
        self.record_fingerprint(name)?;
        info!(stack = %name, "Stack deployed");
        Ok(())
    }

    /// Substitute the env file into the compose text and compile it,
    /// failing on any compiler error.
    fn compile_stack(&self, name: &str) -> Result<Plan> {
        let (yaml, env, _) = self.read_compose(name)?;
        let vars = compose::env::parse(&env);
        let substituted = compose::env::substitute(&yaml, &vars);

        let result = compose::compile(&substituted, name);
        if !result.is_deployable() {
            return Err(DockgeacError::Preflight(result.error_summary()));
        }
        Ok(result.plan)
    }

    /// After a successful deploy, stamp the lock record with the on-disk
    /// compose fingerprint so drift can be detected later.
    fn record_fingerprint(&self, name: &str) -> Result<()> {
        let (yaml, _, _) = self.read_compose(name)?;
        if let Some(mut record) = self.locks.read(name) {
            record.fingerprint = LockStore::fingerprint(&yaml);
            self.locks.write(name, &record)?;
        }
        Ok(())
    }

    fn stack_dir(&self, name: &str) -> PathBuf {
        self.stacks_dir.join(name)
    }

    fn compose_file_name(&self, name: &str) -> Option<String> {
        let dir = self.stack_dir(name);
        ACCEPTED_COMPOSE_FILE_NAMES
            .iter()
            .find(|candidate| dir.join(candidate).exists())
            .map(|s| s.to_string())
    }

    fn is_file_managed(&self, name: &str) -> bool {
        self.compose_file_name(name).is_some()
    }

    fn read_compose(&self, name: &str) -> Result<(String, String, String)> {
        let file_name = self
            .compose_file_name(name)
            .ok_or_else(|| DockgeacError::NotFound(format!("Stack {} not found", name)))?;
        let dir = self.stack_dir(name);

        let compose_path = dir.join(&file_name);
        let yaml = std::fs::read_to_string(&compose_path)
            .map_err(|e| DockgeacError::Io { path: compose_path, source: e })?;

        let env_path = dir.join(".env");
        let env = if env_path.exists() {
            std::fs::read_to_string(&env_path)
                .map_err(|e| DockgeacError::Io { path: env_path, source: e })?
        } else {
            String::new()
        };

        Ok((yaml, env, file_name))
    }

    async fn lock_stack(&self, name: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut mutexes = self.mutexes.lock().expect("stack mutex map poisoned");
            mutexes.entry(name.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        mutex.lock_owned().await
    }

    async fn invalidate_cache(&self) {
        *self.list_cache.write().await = None;
    }
}

/// Stack names are path components and container-name segments; the
/// character set is part of the external contract.
pub fn validate_stack_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(DockgeacError::Validation(
            "Stack name can only contain [a-z][0-9] _ - only".to_string(),
        ))
    }
}
