//! Compose compiler.
//!
//! Turns user-supplied compose YAML into a validated, normalised [`Plan`],
//! rejecting features the target runtime cannot honour. Diagnostics are
//! values, not errors: compilation always returns a plan plus accumulated
//! errors and warnings, and the caller decides whether to deploy.

use super::types::{CompileResult, Diagnostic, Plan, ServicePlan};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Service keys the compiler understands and carries into the plan (or
/// deliberately accepts and drops).
const SUPPORTED_SERVICE_KEYS: &[&str] = &[
    "image",
    "command",
    "entrypoint",
    "environment",
    "env_file",
    "ports",
    "volumes",
    "networks",
    "working_dir",
    "user",
    "depends_on",
    "container_name",
    "stdin_open",
    "tty",
    "restart",
];

/// Service keys the target runtime cannot honour. Their presence is an error.
const BLOCKED_SERVICE_KEYS: &[&str] = &[
    "deploy",
    "profiles",
    "secrets",
    "configs",
    "healthcheck",
    "build",
    "cap_add",
    "cap_drop",
    "cgroup_parent",
    "devices",
    "dns",
    "dns_search",
    "domainname",
    "external_links",
    "extra_hosts",
    "init",
    "ipc",
    "isolation",
    "labels",
    "links",
    "logging",
    "network_mode",
    "pid",
    "platform",
    "privileged",
    "read_only",
    "security_opt",
    "shm_size",
    "sysctls",
    "tmpfs",
    "ulimits",
    "userns_mode",
];

const SUPPORTED_TOP_LEVEL_KEYS: &[&str] = &["services", "networks", "volumes", "version", "name"];

/// Compile a compose document into a plan plus diagnostics.
///
/// Pure: repeated calls on the same input produce equal results.
pub fn compile(yaml_text: &str, stack_name: &str) -> CompileResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut plan = Plan { stack_name: stack_name.to_string(), ..Default::default() };

    if yaml_text.trim().is_empty() {
        errors.push(Diagnostic::new("compose", "compose", "Empty compose file"));
        return CompileResult { plan, errors, warnings };
    }

    let doc: Value = match serde_yaml::from_str(yaml_text) {
        Ok(doc) => doc,
        Err(e) => {
            errors.push(Diagnostic::new("compose", "compose", e.to_string()));
            return CompileResult { plan, errors, warnings };
        }
    };

    let Some(root) = doc.as_mapping() else {
        errors.push(Diagnostic::new("compose", "compose", "Invalid compose file: not an object"));
        return CompileResult { plan, errors, warnings };
    };

    for (key, _) in root {
        if let Some(key) = key.as_str() {
            if !SUPPORTED_TOP_LEVEL_KEYS.contains(&key) {
                errors.push(Diagnostic::new(
                    key,
                    key,
                    format!("Unsupported top-level key '{}'", key),
                ));
            }
        }
    }

    let Some(services) = get_key(root, "services").and_then(Value::as_mapping) else {
        errors.push(Diagnostic::new("services", "services", "No services defined"));
        return CompileResult { plan, errors, warnings };
    };

    for (name, body) in services {
        let Some(name) = name.as_str() else { continue };
        let service_path = format!("services.{}", name);

        let Some(body) = body.as_mapping() else {
            errors.push(Diagnostic::new(
                name,
                service_path,
                format!("Service '{}' must be a mapping", name),
            ));
            continue;
        };

        match compile_service(name, body, &service_path, &mut errors, &mut warnings) {
            Some(service) => {
                plan.services.insert(name.to_string(), service);
            }
            None => continue,
        }
    }

    plan.networks = top_level_names(root, "networks");
    plan.volumes = top_level_names(root, "volumes");

    warn_on_dependency_cycles(&plan, &mut warnings);

    debug!(
        stack = %stack_name,
        services = plan.services.len(),
        errors = errors.len(),
        warnings = warnings.len(),
        "Compiled compose document"
    );

    CompileResult { plan, errors, warnings }
}

/// Validate-only entry point: diagnostics without the plan.
pub fn validate(yaml_text: &str, stack_name: &str) -> (Vec<Diagnostic>, Vec<Diagnostic>) {
    let result = compile(yaml_text, stack_name);
    (result.errors, result.warnings)
}

fn compile_service(
    name: &str,
    body: &Mapping,
    service_path: &str,
    errors: &mut Vec<Diagnostic>,
    warnings: &mut Vec<Diagnostic>,
) -> Option<ServicePlan> {
    for (key, _) in body {
        let Some(key) = key.as_str() else { continue };
        let key_path = format!("{}.{}", service_path, key);
        if BLOCKED_SERVICE_KEYS.contains(&key) {
            errors.push(Diagnostic::new(
                key,
                key_path,
                format!("Unsupported key '{}': the target runtime cannot honour it", key),
            ));
        } else if !SUPPORTED_SERVICE_KEYS.contains(&key) {
            warnings.push(Diagnostic::new(key, key_path, format!("Unknown key '{}' ignored", key)));
        }
    }

    let image = get_key(body, "image").and_then(scalar_to_string).unwrap_or_default();
    if image.is_empty() {
        errors.push(Diagnostic::new(
            "image",
            format!("{}.image", service_path),
            format!("Service '{}' has no image", name),
        ));
        return None;
    }

    if get_key(body, "restart").is_some() {
        warnings.push(Diagnostic::new(
            "restart",
            format!("{}.restart", service_path),
            "restart is parsed but not enforced by the runtime".to_string(),
        ));
    }

    let mut service = ServicePlan { image, ..Default::default() };

    if let Some(value) = get_key(body, "environment") {
        service.environment = normalise_environment(value);
    }

    if let Some(value) = get_key(body, "depends_on") {
        service.depends_on = match value {
            Value::Sequence(items) => items.iter().filter_map(scalar_to_string).collect(),
            Value::Mapping(map) => {
                warnings.push(Diagnostic::new(
                    "depends_on",
                    format!("{}.depends_on", service_path),
                    "depends_on conditions are ignored".to_string(),
                ));
                map.iter().filter_map(|(k, _)| k.as_str().map(str::to_string)).collect()
            }
            _ => Vec::new(),
        };
    }

    service.command = get_key(body, "command").and_then(stringify);
    service.working_dir = get_key(body, "working_dir").and_then(stringify);
    service.user = get_key(body, "user").and_then(stringify);

    service.ports = string_sequence(body, "ports");
    service.volumes = string_sequence(body, "volumes");
    service.networks = string_sequence(body, "networks");

    Some(service)
}

/// Environment in mapping form passes through (nulls become empty strings);
/// sequence form splits each item on the first `=`.
fn normalise_environment(value: &Value) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    match value {
        Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key) = key.as_str() else { continue };
                env.insert(key.to_string(), scalar_to_string(value).unwrap_or_default());
            }
        }
        Value::Sequence(items) => {
            for item in items {
                let Some(item) = scalar_to_string(item) else { continue };
                match item.split_once('=') {
                    Some((key, value)) => env.insert(key.to_string(), value.to_string()),
                    None => env.insert(item, String::new()),
                };
            }
        }
        _ => {}
    }
    env
}

/// Top-level `networks`/`volumes` surface as their declared name list.
fn top_level_names(root: &Mapping, key: &str) -> Vec<String> {
    match get_key(root, key) {
        Some(Value::Mapping(map)) => {
            map.iter().filter_map(|(k, _)| k.as_str().map(str::to_string)).collect()
        }
        Some(Value::Sequence(items)) => items.iter().filter_map(scalar_to_string).collect(),
        _ => Vec::new(),
    }
}

/// Dependency cycles are not a deploy blocker (the adapter falls back to
/// visitation order) but they deserve a diagnostic.
fn warn_on_dependency_cycles(plan: &Plan, warnings: &mut Vec<Diagnostic>) {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        name: &str,
        plan: &Plan,
        marks: &mut BTreeMap<String, Mark>,
        cycle_member: &mut Option<String>,
    ) {
        match marks.get(name) {
            Some(Mark::Done) => return,
            Some(Mark::Visiting) => {
                cycle_member.get_or_insert_with(|| name.to_string());
                return;
            }
            None => {}
        }
        marks.insert(name.to_string(), Mark::Visiting);
        if let Some(service) = plan.services.get(name) {
            for dep in &service.depends_on {
                if plan.services.contains_key(dep) {
                    visit(dep, plan, marks, cycle_member);
                }
            }
        }
        marks.insert(name.to_string(), Mark::Done);
    }

    let mut marks = BTreeMap::new();
    let mut cycle_member = None;
    for name in plan.services.keys() {
        visit(name, plan, &mut marks, &mut cycle_member);
    }

    if let Some(name) = cycle_member {
        warnings.push(Diagnostic::new(
            "depends_on",
            format!("services.{}.depends_on", name),
            format!("Dependency cycle involving '{}'; services start in visitation order", name),
        ));
    }
}

/// Mapping lookup by string key, independent of the yaml value key type.
fn get_key<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.iter().find(|(k, _)| k.as_str() == Some(key)).map(|(_, v)| v)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Stringify a scalar, or join a sequence of scalars with spaces (compose
/// allows `command` in both forms).
fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Sequence(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" "))
            }
        }
        other => scalar_to_string(other),
    }
}

/// A list-valued service key, taken only when it actually is a sequence.
fn string_sequence(body: &Mapping, key: &str) -> Vec<String> {
    match get_key(body, key) {
        Some(Value::Sequence(items)) => items.iter().filter_map(scalar_to_string).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        let result = compile("   \n ", "s");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "Empty compose file");
    }

    #[test]
    fn test_non_mapping_root() {
        let result = compile("- a\n- b\n", "s");
        assert_eq!(result.errors[0].message, "Invalid compose file: not an object");
    }

    #[test]
    fn test_no_services() {
        let result = compile("version: '3'\n", "s");
        assert!(result.errors.iter().any(|d| d.message == "No services defined"));
    }

    #[test]
    fn test_unknown_top_level_key_is_error() {
        let result = compile("services:\n  web:\n    image: nginx\nx-custom: 1\n", "s");
        assert!(result.errors.iter().any(|d| d.path == "x-custom"));
    }

    #[test]
    fn test_blocked_key_paths() {
        for key in BLOCKED_SERVICE_KEYS {
            let yaml = format!("services:\n  svc:\n    image: nginx\n    {}: anything\n", key);
            let result = compile(&yaml, "s");
            let expected = format!("services.svc.{}", key);
            assert!(
                result.errors.iter().any(|d| d.path == expected),
                "expected error at {}",
                expected
            );
        }
    }

    #[test]
    fn test_unknown_service_key_is_warning() {
        let result = compile("services:\n  web:\n    image: nginx\n    bogus: 1\n", "s");
        assert!(result.errors.is_empty());
        assert!(result.warnings.iter().any(|d| d.path == "services.web.bogus"));
    }

    #[test]
    fn test_missing_image_skips_service() {
        let result = compile("services:\n  web:\n    command: run\n", "s");
        assert!(result.errors.iter().any(|d| d.path == "services.web.image"));
        assert!(result.plan.services.is_empty());
    }

    #[test]
    fn test_restart_is_warning_only() {
        let result = compile("services:\n  web:\n    image: nginx\n    restart: always\n", "s");
        assert!(result.errors.is_empty());
        assert!(result
            .warnings
            .iter()
            .any(|d| d.path == "services.web.restart" && d.message.contains("not enforced")));
    }

    #[test]
    fn test_environment_mapping_form() {
        let yaml = "services:\n  web:\n    image: nginx\n    environment:\n      A: 1\n      B:\n      C: true\n";
        let result = compile(yaml, "s");
        let env = &result.plan.services["web"].environment;
        assert_eq!(env["A"], "1");
        assert_eq!(env["B"], "");
        assert_eq!(env["C"], "true");
    }

    #[test]
    fn test_environment_sequence_form() {
        let yaml =
            "services:\n  web:\n    image: nginx\n    environment:\n      - A=1=2\n      - FLAG\n";
        let result = compile(yaml, "s");
        let env = &result.plan.services["web"].environment;
        assert_eq!(env["A"], "1=2");
        assert_eq!(env["FLAG"], "");
    }

    #[test]
    fn test_depends_on_mapping_form_warns() {
        let yaml = "services:\n  web:\n    image: nginx\n    depends_on:\n      db:\n        condition: service_healthy\n  db:\n    image: postgres\n";
        let result = compile(yaml, "s");
        assert_eq!(result.plan.services["web"].depends_on, vec!["db".to_string()]);
        assert!(result.warnings.iter().any(|d| d.message.contains("conditions are ignored")));
    }

    #[test]
    fn test_command_sequence_joined() {
        let yaml = "services:\n  web:\n    image: nginx\n    command: [\"nginx\", \"-g\", \"daemon off;\"]\n";
        let result = compile(yaml, "s");
        assert_eq!(result.plan.services["web"].command.as_deref(), Some("nginx -g daemon off;"));
    }

    #[test]
    fn test_top_level_networks_and_volumes() {
        let yaml = "services:\n  web:\n    image: nginx\nnetworks:\n  frontend:\n  backend:\nvolumes:\n  data:\n";
        let result = compile(yaml, "s");
        assert_eq!(result.plan.networks, vec!["frontend", "backend"]);
        assert_eq!(result.plan.volumes, vec!["data"]);
    }

    #[test]
    fn test_dependency_cycle_warns_but_deployable() {
        let yaml = "services:\n  a:\n    image: x\n    depends_on: [b]\n  b:\n    image: y\n    depends_on: [a]\n";
        let result = compile(yaml, "s");
        assert!(result.is_deployable());
        assert!(result.warnings.iter().any(|d| d.message.contains("cycle")));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let yaml = "services:\n  b:\n    image: bee\n  a:\n    image: ay\n    depends_on: [b]\n    bogus: 1\n";
        let first = compile(yaml, "s");
        let second = compile(yaml, "s");
        assert_eq!(first, second);
    }

    #[test]
    fn test_validate_returns_diagnostics_only() {
        let (errors, warnings) =
            validate("services:\n  web:\n    image: nginx\n    deploy: {}\n", "s");
        assert_eq!(errors.len(), 1);
        assert!(warnings.is_empty());
    }
}
