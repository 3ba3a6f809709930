//! Tolerant parsing of the runtime CLI's JSON output.
//!
//! The CLI emits either one JSON document or JSONL depending on the
//! subcommand and version, with field casing that has drifted across
//! releases. Readers here accept every observed spelling and a nested
//! `configuration` object carrying the same fields.

use super::{ContainerState, ContainerStatus};
use serde_json::Value;

/// Label marking runtime-internal builder containers, which are filtered
/// from every listing.
const BUILDER_ROLE_LABEL: &str = "com.apple.container.resource.role";

/// Parse `--format json` output into a list of JSON records.
///
/// One full parse is attempted first; on failure (or a non-array scalar)
/// the output is treated as JSONL, dropping lines that fail to parse. A
/// single-object document is wrapped as a one-element list.
pub fn parse_records(stdout: &str) -> Vec<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(stdout) {
        match value {
            Value::Array(items) => return items,
            Value::Object(_) => return vec![value],
            _ => {}
        }
    }

    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .collect()
}

/// Parse container-list output into typed statuses, dropping builder
/// containers and records with no recognisable name.
pub fn parse_containers(stdout: &str) -> Vec<ContainerStatus> {
    parse_records(stdout)
        .iter()
        .filter(|record| !is_builder(record))
        .filter_map(container_from_value)
        .collect()
}

/// Read one container record, tolerating casing variants and the nested
/// `configuration` object.
pub fn container_from_value(record: &Value) -> Option<ContainerStatus> {
    let name = read_str(record, &["name", "Name", "Names", "id", "ID"])?;
    let state = read_str(record, &["state", "State", "status", "Status"])
        .map(|s| ContainerState::parse(&s))
        .unwrap_or_default();

    Some(ContainerStatus {
        name,
        state,
        exit_code: read_i64(record, &["exitCode", "ExitCode"]),
        started_at: read_str(record, &["startedAt", "StartedAt", "startedDate"]),
    })
}

/// The image reference a container was created from, if reported.
pub fn container_image(record: &Value) -> Option<String> {
    read_str(record, &["image", "Image"])
}

/// Image references of every non-builder container in a listing, one entry
/// per container. Used for image usage counting.
pub fn parse_container_images(stdout: &str) -> Vec<String> {
    parse_records(stdout)
        .iter()
        .filter(|record| !is_builder(record))
        .filter_map(container_image)
        .collect()
}

/// Read a string field by any of its spellings, directly or under
/// `configuration`. Array-valued fields (docker-style `Names`) yield their
/// first element.
pub fn read_str(record: &Value, keys: &[&str]) -> Option<String> {
    for scope in [Some(record), record.get("configuration")].into_iter().flatten() {
        for key in keys {
            match scope.get(key) {
                Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
                Some(Value::Array(items)) => {
                    if let Some(Value::String(s)) = items.first() {
                        if !s.is_empty() {
                            return Some(s.clone());
                        }
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// Read an integer field by any of its spellings.
pub fn read_i64(record: &Value, keys: &[&str]) -> Option<i64> {
    for scope in [Some(record), record.get("configuration")].into_iter().flatten() {
        for key in keys {
            if let Some(value) = scope.get(key) {
                if let Some(n) = value.as_i64() {
                    return Some(n);
                }
            }
        }
    }
    None
}

fn is_builder(record: &Value) -> bool {
    for scope in [Some(record), record.get("configuration")].into_iter().flatten() {
        if let Some(labels) = scope.get("labels") {
            if labels.get(BUILDER_ROLE_LABEL).and_then(Value::as_str) == Some("builder") {
                return true;
            }
        }
    }
    false
}
