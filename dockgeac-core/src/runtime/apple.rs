//! Runtime adapter for Apple's `container` CLI.
//!
//! Translates plan operations into ordered CLI invocations and keeps the
//! per-stack lock store in step with what was actually created. Ownership
//! discipline: with a lock record, only the containers listed in it are
//! ever started, stopped or deleted.

use super::output;
use super::{ContainerStatus, ExecSpec, ImageRecord, RuntimeAdapter};
use crate::compose::Plan;
use crate::driver::{CommandRunner, LogStream};
use crate::error::{DockgeacError, Result};
use crate::lockstore::{LockRecord, LockStore, LockedService};
use crate::reference;
use crate::status::{rollup, StackStatusCode};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Naming contract: `dockgeac_<stack>_<service>_<index>`. External tooling
/// relies on the prefix to recover stack membership.
pub const CONTAINER_PREFIX: &str = "dockgeac_";

/// Reserved stack name, filtered from all status listings.
pub const RESERVED_STACK_NAME: &str = "dockge";

/// Build the conventional container name for a service instance.
pub fn container_name(stack: &str, service: &str, index: u32) -> String {
    format!("{}{}_{}_{}", CONTAINER_PREFIX, stack, service, index)
}

/// Infer the owning stack from a container name.
///
/// Fallback only: lock records are authoritative, and stacks whose names
/// contain underscores cannot be recovered this way.
pub fn infer_stack_name(container: &str) -> Option<String> {
    let tail = container.strip_prefix(CONTAINER_PREFIX)?;
    let stack = tail.split('_').next().unwrap_or_default();
    if stack.is_empty() {
        None
    } else {
        Some(stack.to_string())
    }
}

/// Adapter implementation over the CLI driver and the lock store.
pub struct AppleContainerAdapter {
    runner: Arc<dyn CommandRunner>,
    locks: Arc<LockStore>,
}

impl AppleContainerAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>, locks: Arc<LockStore>) -> Self {
        Self { runner, locks }
    }

    async fn run(&self, args: &[&str]) -> crate::driver::CliOutput {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.runner.run(&args).await
    }

    /// Container names targeted by a start/stop/restart.
    ///
    /// With a lock record the listed containers (narrowed to one service if
    /// given); without one, the single name `stack` covers legacy external
    /// containers, and a named service targets nothing.
    fn targets(&self, stack: &str, service: Option<&str>) -> Vec<String> {
        match self.locks.read(stack) {
            Some(record) => match service {
                Some(service) => record
                    .services
                    .get(service)
                    .map(|s| vec![s.container_name.clone()])
                    .unwrap_or_default(),
                None => record.container_names(),
            },
            None => match service {
                None => vec![stack.to_string()],
                Some(_) => Vec::new(),
            },
        }
    }

    /// Is an image present in the local store?
    async fn image_present(&self, image: &str) -> bool {
        let out = self.run(&["image", "list", "--format", "json"]).await;
        if !out.success() {
            return false;
        }
        output::parse_records(&out.stdout)
            .iter()
            .filter_map(|record| {
                output::read_str(record, &["reference", "name", "Name", "repository"])
            })
            .any(|local| reference::same_image(&local, image))
    }

    /// The container backing one service, from the lock record when
    /// available, otherwise by naming convention.
    fn service_container(&self, stack: &str, service: &str) -> String {
        self.locks
            .read(stack)
            .and_then(|record| record.services.get(service).map(|s| s.container_name.clone()))
            .unwrap_or_else(|| container_name(stack, service, 1))
    }
}

#[async_trait]
impl RuntimeAdapter for AppleContainerAdapter {
    fn name(&self) -> &str {
        "apple-container"
    }

    async fn available(&self) -> bool {
        self.run(&["system", "status"]).await.success()
    }

    async fn version(&self) -> Result<String> {
        let out = self.run(&["--version"]).await;
        if out.success() {
            return Ok(out.stdout.trim().to_string());
        }
        let out = self.run(&["version"]).await;
        if out.success() {
            return Ok(out.stdout.trim().to_string());
        }
        Err(DockgeacError::runtime("Failed to read runtime version", out.stderr))
    }

    #[instrument(skip(self, plan), fields(stack = %plan.stack_name))]
    async fn deploy(&self, plan: &Plan) -> Result<()> {
        let order = deploy_order(plan);
        info!(services = ?order, "Deploying stack");

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut created: BTreeMap<String, LockedService> = BTreeMap::new();

        for service_name in &order {
            let service = &plan.services[service_name];
            self.pull_image(&service.image).await?;

            let container = container_name(&plan.stack_name, service_name, 1);
            let mut args: Vec<String> = vec![
                "run".to_string(),
                "-d".to_string(),
                "--name".to_string(),
                container.clone(),
            ];
            for port in &service.ports {
                args.push("-p".to_string());
                args.push(port.clone());
            }
            for (key, value) in &service.environment {
                args.push("-e".to_string());
                args.push(format!("{}={}", key, value));
            }
            for volume in &service.volumes {
                args.push("-v".to_string());
                args.push(volume.clone());
            }
            for network in &service.networks {
                args.push("--network".to_string());
                args.push(network.clone());
            }
            if let Some(working_dir) = &service.working_dir {
                args.push("-w".to_string());
                args.push(working_dir.clone());
            }
            if let Some(user) = &service.user {
                args.push("--user".to_string());
                args.push(user.clone());
            }
            args.push(service.image.clone());
            if let Some(command) = &service.command {
                args.extend(command.split_whitespace().map(str::to_string));
            }

            let out = self.runner.run(&args).await;
            if !out.success() {
                // Earlier services stay up; there is no rollback.
                return Err(DockgeacError::runtime(
                    format!("Failed to create container for service '{}'", service_name),
                    out.stderr,
                ));
            }

            let container_id = {
                let id = out.stdout.trim();
                if id.is_empty() { None } else { Some(id.to_string()) }
            };

            info!(service = %service_name, container = %container, "Container created");
            created.insert(
                service_name.clone(),
                LockedService {
                    container_name: container,
                    image: service.image.clone(),
                    created_at: now.clone(),
                    container_id,
                },
            );
        }

        // The fingerprint is rewritten by the stack engine once the deploy
        // as a whole has succeeded.
        let record = LockRecord {
            stack_name: plan.stack_name.clone(),
            fingerprint: String::new(),
            services: created,
            networks: plan.networks.clone(),
            volumes: plan.volumes.clone(),
            last_deployed: now,
        };
        self.locks.write(&plan.stack_name, &record)
    }

    #[instrument(skip(self))]
    async fn start_stack(&self, stack: &str, service: Option<&str>) -> Result<()> {
        for container in self.targets(stack, service) {
            let out = self.run(&["start", &container]).await;
            if !out.success() {
                return Err(DockgeacError::runtime(
                    format!("Failed to start container {}", container),
                    out.stderr,
                ));
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop_stack(&self, stack: &str, service: Option<&str>) -> Result<()> {
        for container in self.targets(stack, service) {
            let out = self.run(&["stop", &container]).await;
            if !out.success() {
                return Err(DockgeacError::runtime(
                    format!("Failed to stop container {}", container),
                    out.stderr,
                ));
            }
        }
        Ok(())
    }

    async fn restart_stack(&self, stack: &str, service: Option<&str>) -> Result<()> {
        self.stop_stack(stack, service).await?;
        self.start_stack(stack, service).await
    }

    #[instrument(skip(self))]
    async fn down_stack(&self, stack: &str, remove_volumes: bool) -> Result<()> {
        match self.locks.read(stack) {
            Some(record) => {
                for container in record.container_names() {
                    let out = self.run(&["stop", &container]).await;
                    if !out.success() {
                        debug!(container = %container, "Stop before delete failed; continuing");
                    }
                }
                for container in record.container_names() {
                    let out = self.run(&["delete", &container]).await;
                    if !out.success() {
                        return Err(DockgeacError::runtime(
                            format!("Failed to delete container {}", container),
                            out.stderr,
                        ));
                    }
                }
                if remove_volumes {
                    for volume in &record.volumes {
                        let out = self.run(&["volume", "delete", volume]).await;
                        if !out.success() {
                            warn!(volume = %volume, stderr = %out.stderr, "Failed to delete volume");
                        }
                    }
                }
                self.locks.delete(stack)?;
                info!(stack = %stack, "Stack taken down");
                Ok(())
            }
            None => {
                // Externally created singleton: a container literally named
                // after the stack.
                let _ = self.run(&["stop", stack]).await;
                let out = self.run(&["delete", stack]).await;
                if !out.success() {
                    return Err(DockgeacError::runtime(
                        format!("Failed to delete container {}", stack),
                        out.stderr,
                    ));
                }
                Ok(())
            }
        }
    }

    async fn service_status(&self, stack: &str) -> Result<BTreeMap<String, ContainerStatus>> {
        let containers = self.list_containers(true).await?;

        match self.locks.read(stack) {
            Some(record) => Ok(record
                .services
                .iter()
                .map(|(service, locked)| {
                    let status = containers
                        .iter()
                        .find(|c| c.name == locked.container_name)
                        .cloned()
                        .unwrap_or_else(|| ContainerStatus::unknown(&locked.container_name));
                    (service.clone(), status)
                })
                .collect()),
            None => Ok(containers
                .into_iter()
                .filter(|c| {
                    c.name == stack || infer_stack_name(&c.name).as_deref() == Some(stack)
                })
                .map(|c| (c.name.clone(), c))
                .collect()),
        }
    }

    async fn all_stack_status(&self) -> Result<BTreeMap<String, StackStatusCode>> {
        // Lock records are the authoritative container-to-stack map; prefix
        // inference and the container's own name are fallbacks.
        let mut owner: HashMap<String, String> = HashMap::new();
        let locked_stacks = self.locks.list_all();
        for stack in &locked_stacks {
            if let Some(record) = self.locks.read(stack) {
                for container in record.container_names() {
                    owner.insert(container, stack.clone());
                }
            }
        }

        let containers = self.list_containers(true).await?;
        let mut grouped: BTreeMap<String, Vec<super::ContainerState>> = BTreeMap::new();
        for container in containers {
            let stack = owner
                .get(&container.name)
                .cloned()
                .or_else(|| infer_stack_name(&container.name))
                .unwrap_or_else(|| container.name.clone());
            if stack == RESERVED_STACK_NAME {
                continue;
            }
            grouped.entry(stack).or_default().push(container.state);
        }

        let mut statuses: BTreeMap<String, StackStatusCode> =
            grouped.into_iter().map(|(stack, states)| (stack, rollup(&states))).collect();

        // Locked stacks with no observed containers still appear, as unknown.
        for stack in locked_stacks {
            statuses.entry(stack).or_insert(StackStatusCode::Unknown);
        }

        Ok(statuses)
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerStatus>> {
        let out = if all {
            self.run(&["list", "--all", "--format", "json"]).await
        } else {
            self.run(&["list", "--format", "json"]).await
        };
        if !out.success() {
            return Err(DockgeacError::runtime("Failed to list containers", out.stderr));
        }
        Ok(output::parse_containers(&out.stdout))
    }

    #[instrument(skip(self))]
    async fn pull_image(&self, image: &str) -> Result<()> {
        if reference::is_local_only(image) {
            if self.image_present(image).await {
                return Ok(());
            }
            return Err(DockgeacError::NotFound(format!("Local image {} not found", image)));
        }

        let out = self.run(&["image", "pull", image]).await;
        if out.success() {
            return Ok(());
        }

        // Offline tolerance: a failed pull is fine as long as the image is
        // already in the local store.
        if self.image_present(image).await {
            warn!(image = %image, "Pull failed; using local copy");
            return Ok(());
        }
        Err(DockgeacError::runtime(format!("Failed to pull image {}", image), out.stderr))
    }

    async fn image_list(&self) -> Result<Vec<ImageRecord>> {
        let images_out = self.run(&["image", "list", "--format", "json"]).await;
        if !images_out.success() {
            return Err(DockgeacError::runtime("Failed to list images", images_out.stderr));
        }

        let containers_out = self.run(&["list", "--all", "--format", "json"]).await;
        if !containers_out.success() {
            return Err(DockgeacError::runtime("Failed to list containers", containers_out.stderr));
        }
        let in_use = output::parse_container_images(&containers_out.stdout);

        let mut images = Vec::new();
        for record in output::parse_records(&images_out.stdout) {
            let Some(image_ref) =
                output::read_str(&record, &["reference", "name", "Name", "repository"])
            else {
                continue;
            };
            let digest = output::read_str(&record, &["digest", "Digest"]);

            let in_use_count = in_use
                .iter()
                .filter(|used| {
                    digest.as_deref() == Some(used.as_str())
                        || reference::same_image(used, &image_ref)
                })
                .count();

            images.push(ImageRecord { reference: image_ref, digest, in_use_count });
        }
        Ok(images)
    }

    async fn delete_image(&self, image_ref: &str) -> Result<()> {
        let images = self.image_list().await?;
        if let Some(image) = images.iter().find(|i| {
            reference::same_image(&i.reference, image_ref) || i.digest.as_deref() == Some(image_ref)
        }) {
            if image.in_use_count > 0 {
                return Err(DockgeacError::Validation(format!(
                    "Image {} is in use by {} container(s)",
                    image_ref, image.in_use_count
                )));
            }
        }

        let out = self.run(&["image", "delete", image_ref]).await;
        if !out.success() {
            return Err(DockgeacError::runtime(
                format!("Failed to delete image {}", image_ref),
                out.stderr,
            ));
        }
        Ok(())
    }

    async fn network_list(&self) -> Result<Vec<String>> {
        let out = self.run(&["network", "list", "--format", "json"]).await;
        if !out.success() {
            return Err(DockgeacError::runtime("Failed to list networks", out.stderr));
        }
        Ok(output::parse_records(&out.stdout)
            .iter()
            .filter_map(|record| output::read_str(record, &["name", "Name", "id", "ID"]))
            .collect())
    }

    async fn logs(
        &self,
        stack: &str,
        service: &str,
        tail: Option<u32>,
        follow: bool,
    ) -> Result<LogStream> {
        let container = self.service_container(stack, service);
        let mut args = vec!["logs".to_string()];
        if let Some(tail) = tail {
            args.push("--tail".to_string());
            args.push(tail.to_string());
        }
        if follow {
            args.push("--follow".to_string());
        }
        args.push(container);
        self.runner.stream(&args).await
    }

    async fn exec_spec(&self, stack: &str, service: &str, command: &str) -> Result<ExecSpec> {
        let container = self.service_container(stack, service);
        let mut args = vec!["exec".to_string(), "-it".to_string(), container];
        args.extend(command.split_whitespace().map(str::to_string));
        Ok(ExecSpec { command: "container".to_string(), args })
    }
}

/// Topological order over `depends_on`.
///
/// Edges to missing services are ignored; cycles are broken by visitation
/// order (the compiler warns about them separately).
fn deploy_order(plan: &Plan) -> Vec<String> {
    fn visit(name: &str, plan: &Plan, visited: &mut BTreeSet<String>, order: &mut Vec<String>) {
        if !visited.insert(name.to_string()) {
            return;
        }
        if let Some(service) = plan.services.get(name) {
            for dep in &service.depends_on {
                if plan.services.contains_key(dep.as_str()) {
                    visit(dep, plan, visited, order);
                }
            }
        }
        order.push(name.to_string());
    }

    let mut visited = BTreeSet::new();
    let mut order = Vec::new();
    for name in plan.services.keys() {
        visit(name, plan, &mut visited, &mut order);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::ServicePlan;

    fn plan_with_deps(edges: &[(&str, &[&str])]) -> Plan {
        let mut plan = Plan { stack_name: "s".to_string(), ..Default::default() };
        for (name, deps) in edges {
            plan.services.insert(
                name.to_string(),
                ServicePlan {
                    image: format!("{}:latest", name),
                    depends_on: deps.iter().map(|d| d.to_string()).collect(),
                    ..Default::default()
                },
            );
        }
        plan
    }

    #[test]
    fn test_container_naming_contract() {
        assert_eq!(container_name("blog", "web", 1), "dockgeac_blog_web_1");
    }

    #[test]
    fn test_infer_stack_name() {
        assert_eq!(infer_stack_name("dockgeac_blog_web_1").as_deref(), Some("blog"));
        assert_eq!(infer_stack_name("unrelated"), None);
        assert_eq!(infer_stack_name("dockgeac_"), None);
    }

    #[test]
    fn test_deploy_order_respects_dependencies() {
        let plan =
            plan_with_deps(&[("web", &["api", "cache"]), ("api", &["db"]), ("cache", &[]), ("db", &[])]);
        let order = deploy_order(&plan);

        let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(pos("db") < pos("api"));
        assert!(pos("api") < pos("web"));
        assert!(pos("cache") < pos("web"));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_deploy_order_ignores_missing_dependency() {
        let plan = plan_with_deps(&[("web", &["ghost"])]);
        assert_eq!(deploy_order(&plan), vec!["web".to_string()]);
    }

    #[test]
    fn test_deploy_order_breaks_cycles() {
        let plan = plan_with_deps(&[("a", &["b"]), ("b", &["a"])]);
        let order = deploy_order(&plan);
        assert_eq!(order.len(), 2);
    }
}
