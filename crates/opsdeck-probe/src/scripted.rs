//! Scripted [`CommandRunner`] for tests and dry runs.
//!
//! Rules match on a substring of the rendered command line; the first
//! matching rule wins. Unmatched commands behave like a missing binary.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{ProbeError, ProbeResult};
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};

#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<(String, CommandOutput)>,
    available: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer any command whose rendered line contains `pattern`.
    pub fn on(mut self, pattern: &str, output: CommandOutput) -> Self {
        if let Some(program) = pattern.split_whitespace().next() {
            self.available.insert(program.to_string());
        }
        self.rules.push((pattern.to_string(), output));
        self
    }

    /// Make `locate(program)` succeed without scripting any output.
    pub fn with_program(mut self, program: &str) -> Self {
        self.available.insert(program.to_string());
        self
    }

    /// Rendered command lines seen so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> ProbeResult<CommandOutput> {
        let line = spec.display();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(line.clone());
        }
        self.rules
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, out)| out.clone())
            .ok_or_else(|| ProbeError::NotFound(spec.program.clone()))
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.available
            .contains(program)
            .then(|| PathBuf::from("/usr/bin").join(program))
    }
}
