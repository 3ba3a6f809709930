//! Public API facade.
//!
//! Request-validated entry points consumed by the transport layer. Every
//! operation type-checks its arguments, invokes the engine, and answers
//! with an `{ok: true, ...}` or `{ok: false, msg}` envelope. Authentication
//! is the transport's job and happens before a payload reaches this module.

use dockgeac_core::compose;
use dockgeac_core::error::{DockgeacError, Result};
use dockgeac_core::{RuntimeAdapter, StackEngine};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// Facade over the stack engine and runtime adapter.
pub struct Facade {
    engine: Arc<StackEngine>,
    adapter: Arc<dyn RuntimeAdapter>,
    /// Endpoint identifier echoed in stack presentation objects.
    endpoint: String,
}

impl Facade {
    pub fn new(engine: Arc<StackEngine>, adapter: Arc<dyn RuntimeAdapter>, endpoint: String) -> Self {
        Self { engine, adapter, endpoint }
    }

    /// Dispatch one named operation. Never fails: errors become
    /// `{ok: false, msg}` envelopes.
    #[instrument(skip(self, payload))]
    pub async fn handle(&self, operation: &str, payload: &Value) -> Value {
        let result = match operation {
            "deployStack" => self.deploy_stack(payload).await,
            "saveStack" => self.save_stack(payload).await,
            "deleteStack" => self.delete_stack(payload).await,
            "getStack" => self.get_stack(payload).await,
            "requestStackList" => self.request_stack_list().await,
            "startStack" => self.start_stack(payload).await,
            "stopStack" => self.stop_stack(payload).await,
            "restartStack" => self.restart_stack(payload).await,
            "updateStack" => self.update_stack(payload).await,
            "downStack" => self.down_stack(payload).await,
            "serviceStatusList" => self.service_status_list(payload).await,
            "getDockerNetworkList" => self.network_list().await,
            "getContainerImageList" => self.image_list().await,
            "deleteContainerImage" => self.delete_image(payload).await,
            "checkComposeCompat" => self.check_compose_compat(payload),
            other => Err(DockgeacError::Validation(format!("Unknown operation {}", other))),
        };

        match result {
            Ok(value) => value,
            Err(e) => json!({"ok": false, "msg": e.to_string()}),
        }
    }

    async fn save_stack(&self, payload: &Value) -> Result<Value> {
        let name = require_str(payload, "name")?;
        let yaml = require_str(payload, "composeYAML")?;
        let env = optional_str(payload, "composeENV");
        let is_add = optional_bool(payload, "isAdd", false)?;

        self.engine.save(&name, &yaml, &env, is_add).await?;
        Ok(json!({"ok": true, "msg": "Saved"}))
    }

    async fn deploy_stack(&self, payload: &Value) -> Result<Value> {
        let name = require_str(payload, "name")?;
        let yaml = require_str(payload, "composeYAML")?;
        let env = optional_str(payload, "composeENV");
        let is_add = optional_bool(payload, "isAdd", false)?;

        self.engine.save(&name, &yaml, &env, is_add).await?;
        self.engine.deploy(&name).await?;
        info!(stack = %name, "Stack deployed via API");
        Ok(json!({"ok": true, "msg": "Deployed"}))
    }

    async fn delete_stack(&self, payload: &Value) -> Result<Value> {
        let name = require_str(payload, "name")?;
        self.engine.delete(&name).await?;
        Ok(json!({"ok": true, "msg": "Deleted"}))
    }

    async fn get_stack(&self, payload: &Value) -> Result<Value> {
        let name = require_str(payload, "name")?;
        let stack = self.engine.get_stack(&name).await?;
        Ok(json!({
            "ok": true,
            "stack": stack.to_json(&self.endpoint, self.engine.settings()),
        }))
    }

    async fn request_stack_list(&self) -> Result<Value> {
        let stacks = self.engine.get_stack_list().await?;
        let list: BTreeMap<String, Value> = stacks
            .into_iter()
            .map(|(name, stack)| (name, stack.to_json(&self.endpoint, self.engine.settings())))
            .collect();
        Ok(json!({"ok": true, "stackList": list}))
    }

    async fn start_stack(&self, payload: &Value) -> Result<Value> {
        let name = require_str(payload, "name")?;
        self.engine.start(&name).await?;
        Ok(json!({"ok": true, "msg": "Started"}))
    }

    async fn stop_stack(&self, payload: &Value) -> Result<Value> {
        let name = require_str(payload, "name")?;
        self.engine.stop(&name).await?;
        Ok(json!({"ok": true, "msg": "Stopped"}))
    }

    async fn restart_stack(&self, payload: &Value) -> Result<Value> {
        let name = require_str(payload, "name")?;
        self.engine.restart(&name).await?;
        Ok(json!({"ok": true, "msg": "Restarted"}))
    }

    async fn update_stack(&self, payload: &Value) -> Result<Value> {
        let name = require_str(payload, "name")?;
        self.engine.update(&name).await?;
        Ok(json!({"ok": true, "msg": "Updated"}))
    }

    async fn down_stack(&self, payload: &Value) -> Result<Value> {
        let name = require_str(payload, "name")?;
        let remove_volumes = optional_bool(payload, "removeVolumes", false)?;
        self.engine.down(&name, remove_volumes).await?;
        Ok(json!({"ok": true, "msg": "Down"}))
    }

    async fn service_status_list(&self, payload: &Value) -> Result<Value> {
        let name = require_str(payload, "name")?;
        let statuses = self.engine.service_status_list(&name).await?;
        Ok(json!({"ok": true, "serviceStatusList": statuses}))
    }

    async fn network_list(&self) -> Result<Value> {
        let networks = self.adapter.network_list().await?;
        Ok(json!({"ok": true, "networkList": networks}))
    }

    async fn image_list(&self) -> Result<Value> {
        let images = self.adapter.image_list().await?;
        Ok(json!({"ok": true, "imageList": images}))
    }

    async fn delete_image(&self, payload: &Value) -> Result<Value> {
        let image = require_str(payload, "imageName")?;
        self.adapter.delete_image(&image).await?;
        Ok(json!({"ok": true, "msg": "Image deleted"}))
    }

    /// Validate-only compiler pass; diagnostics are data, not failures.
    fn check_compose_compat(&self, payload: &Value) -> Result<Value> {
        let yaml = require_str(payload, "composeYAML")?;
        let name = optional_str_or(payload, "name", "compat-check");
        let (errors, warnings) = compose::validate(&yaml, &name);
        Ok(json!({"ok": true, "errors": errors, "warnings": warnings}))
    }
}

fn require_str(payload: &Value, key: &str) -> Result<String> {
    match payload.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(DockgeacError::Validation(format!("{} must be a string", key))),
    }
}

fn optional_str(payload: &Value, key: &str) -> String {
    payload.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn optional_str_or(payload: &Value, key: &str, default: &str) -> String {
    payload.get(key).and_then(Value::as_str).unwrap_or(default).to_string()
}

fn optional_bool(payload: &Value, key: &str, default: bool) -> Result<bool> {
    match payload.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(DockgeacError::Validation(format!("{} must be a boolean", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockgeac_core::{AppleContainerAdapter, ContainerCli, LockStore, Settings};
    use tempfile::TempDir;

    /// Facade over a real engine whose runtime binary does not exist; only
    /// operations that never reach the CLI are expected to succeed.
    fn facade() -> (TempDir, Facade) {
        let data = TempDir::new().unwrap();
        let stacks_dir = data.path().join("stacks");
        std::fs::create_dir_all(&stacks_dir).unwrap();

        let runner = Arc::new(ContainerCli::with_binary("/nonexistent/container-cli"));
        let locks = Arc::new(LockStore::new(data.path().join("locks")));
        let adapter: Arc<dyn RuntimeAdapter> =
            Arc::new(AppleContainerAdapter::new(runner, locks.clone()));
        let engine = Arc::new(StackEngine::new(stacks_dir, adapter.clone(), locks, Settings::default()));

        (data, Facade::new(engine, adapter, "localhost".to_string()))
    }

    #[tokio::test]
    async fn test_unknown_operation_is_rejected() {
        let (_data, facade) = facade();
        let response = facade.handle("nope", &json!({})).await;
        assert_eq!(response["ok"], false);
        assert!(response["msg"].as_str().unwrap().contains("Unknown operation"));
    }

    #[tokio::test]
    async fn test_argument_type_validation() {
        let (_data, facade) = facade();

        let response = facade.handle("startStack", &json!({"name": 42})).await;
        assert_eq!(response["ok"], false);
        assert_eq!(response["msg"], "name must be a string");

        let response = facade
            .handle("downStack", &json!({"name": "ok", "removeVolumes": "yes"}))
            .await;
        assert_eq!(response["ok"], false);
        assert_eq!(response["msg"], "removeVolumes must be a boolean");
    }

    #[tokio::test]
    async fn test_save_stack_round_trip() {
        let (data, facade) = facade();

        let response = facade
            .handle(
                "saveStack",
                &json!({
                    "name": "blog",
                    "composeYAML": "services:\n  web:\n    image: nginx\n",
                    "composeENV": "",
                    "isAdd": true
                }),
            )
            .await;
        assert_eq!(response["ok"], true);
        assert!(data.path().join("stacks/blog/compose.yaml").exists());
    }

    #[tokio::test]
    async fn test_save_stack_bad_name_envelope() {
        let (_data, facade) = facade();

        let response = facade
            .handle(
                "saveStack",
                &json!({"name": "Bad Name", "composeYAML": "services: {}\n", "isAdd": true}),
            )
            .await;
        assert_eq!(response["ok"], false);
        assert_eq!(response["msg"], "Stack name can only contain [a-z][0-9] _ - only");
    }

    #[tokio::test]
    async fn test_check_compose_compat_reports_diagnostics() {
        let (_data, facade) = facade();

        let response = facade
            .handle(
                "checkComposeCompat",
                &json!({"composeYAML": "services:\n  web:\n    image: nginx\n    deploy: {}\n    restart: always\n"}),
            )
            .await;
        assert_eq!(response["ok"], true);

        let errors = response["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["path"], "services.web.deploy");

        let warnings = response["warnings"].as_array().unwrap();
        assert!(warnings.iter().any(|w| w["key"] == "restart"));
    }
}
