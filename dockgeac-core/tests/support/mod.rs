//! Shared test support: a mock command runner returning prerecorded
//! `(stdout, stderr, exit code)` triples, so the whole engine can be
//! exercised without the real runtime.

use async_trait::async_trait;
use dockgeac_core::driver::{CliOutput, CommandRunner, LogStream};
use dockgeac_core::error::Result;
use std::sync::Mutex;

/// Rule-based mock runner.
///
/// Rules match on an argument prefix; the longest matching prefix wins,
/// with later rules beating earlier ones on ties. Unmatched invocations
/// succeed with empty output (which parses as an empty JSON listing).
#[derive(Default)]
pub struct MockRunner {
    rules: Mutex<Vec<(Vec<String>, CliOutput)>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a response for invocations starting with `prefix`.
    pub fn on(&self, prefix: &[&str], output: CliOutput) {
        self.rules
            .lock()
            .unwrap()
            .push((prefix.iter().map(|s| s.to_string()).collect(), output));
    }

    pub fn ok(stdout: &str) -> CliOutput {
        CliOutput { stdout: stdout.to_string(), stderr: String::new(), exit_code: 0 }
    }

    pub fn fail(stderr: &str) -> CliOutput {
        CliOutput { stdout: String::new(), stderr: stderr.to_string(), exit_code: 1 }
    }

    /// Every invocation seen so far.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Was any invocation made whose arguments start with `prefix`?
    pub fn saw(&self, prefix: &[&str]) -> bool {
        self.calls().iter().any(|call| starts_with(call, prefix))
    }
}

fn starts_with(call: &[String], prefix: &[&str]) -> bool {
    call.len() >= prefix.len() && call.iter().zip(prefix).all(|(a, b)| a == b)
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, args: &[String]) -> CliOutput {
        self.calls.lock().unwrap().push(args.to_vec());

        let rules = self.rules.lock().unwrap();
        let mut best: Option<&(Vec<String>, CliOutput)> = None;
        for rule in rules.iter() {
            let prefix: Vec<&str> = rule.0.iter().map(String::as_str).collect();
            if starts_with(args, &prefix) {
                let better = match best {
                    Some((current, _)) => rule.0.len() >= current.len(),
                    None => true,
                };
                if better {
                    best = Some(rule);
                }
            }
        }
        best.map(|(_, output)| output.clone()).unwrap_or_default()
    }

    async fn stream(&self, args: &[String]) -> Result<LogStream> {
        self.calls.lock().unwrap().push(args.to_vec());
        // Closed channel: the stream ends immediately.
        let (_tx, rx) = tokio::sync::mpsc::channel(1);
        Ok(LogStream::new(rx, None))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
